/*
 * SPDX-FileCopyrightText: 2025 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Grid scheduling: blocks, slices, and the sub-step rotation.
//!
//! The movie and user axes are cut into *W* bands each, yielding a *W* × *W*
//! grid of blocks. Each worker owns one movie band for the whole run; in
//! sub-step *j* of a round, worker *k* processes the block at user column
//! (*k* + *j*) mod *W*, so the *W* blocks touched in a sub-step lie on a
//! (wrapped) diagonal and no two workers share a movie or a user. After each
//! sub-step the workers are joined and the columns rotate; after *W*
//! sub-steps every block has been processed exactly once, which together
//! with the cursor protocol means every rating has been applied exactly
//! once.
//!
//! Within a block, a worker scans its movies in order. Each movie resumes
//! from its [edge cursor](super::cursors::EdgeCursors), consumes arcs while
//! their destination is below the top of the current user column, and leaves
//! the cursor at the first arc past it, ready for the next sub-step. When a
//! column ends at the top of the user axis the cursor is reset, so the next
//! round starts from the beginning of the list.
//!
//! The finer-grained variants subdivide a block on the user axis into
//! sub-columns of [`users_per_slice`](crate::sgd::Sgd::users_per_slice)
//! users, and optionally on the movie axis into bands of
//! [`movies_per_slice`](crate::sgd::Sgd::movies_per_slice) movies, shrinking
//! the working set of the innermost loops.

use super::cursors::EdgeCursors;
use crate::graph::RatingGraph;
use rayon::prelude::*;
use std::ops::Range;
use std::time::Instant;

/// One worker's assignment: a movie band, fixed for the whole run, and the
/// user column it processes in the current sub-step.
#[derive(Debug, Clone)]
pub(crate) struct WorkItem {
    pub(crate) movies: Range<usize>,
    pub(crate) users: Range<usize>,
    /// Gradient updates applied by this worker in the last sub-step.
    pub(crate) updates: u64,
    /// Time taken by the last sub-step.
    pub(crate) nanos: u128,
}

/// The `W` × `W` grid: the work items, positioned on the diagonal, and the
/// column bounds used to rotate them.
pub(crate) struct Grid {
    pub(crate) items: Vec<WorkItem>,
    columns: Vec<Range<usize>>,
}

impl Grid {
    /// Splits the axes of the graph into `workers` bands per side.
    ///
    /// Bands have ⌊len / workers⌋ elements, with the last band absorbing the
    /// remainder. Worker `k` starts at user column `k`.
    pub(crate) fn new(graph: &RatingGraph, workers: usize) -> Self {
        let movies_per_worker = graph.num_movies() / workers;
        let users_per_worker = graph.num_users() / workers;
        let mut items = Vec::with_capacity(workers);
        let mut columns = Vec::with_capacity(workers);
        for k in 0..workers {
            let movie_end = if k == workers - 1 {
                graph.num_movies()
            } else {
                (k + 1) * movies_per_worker
            };
            let user_end = if k == workers - 1 {
                graph.num_users()
            } else {
                (k + 1) * users_per_worker
            };
            let column = k * users_per_worker..user_end;
            items.push(WorkItem {
                movies: k * movies_per_worker..movie_end,
                users: column.clone(),
                updates: 0,
                nanos: 0,
            });
            columns.push(column);
        }
        Self { items, columns }
    }

    /// Pre-positions the edge cursors of every movie band at its owner's
    /// starting user column.
    pub(crate) fn advance_cursors(
        &self,
        graph: &RatingGraph,
        cursors: &EdgeCursors,
        pool: &rayon::ThreadPool,
    ) {
        pool.install(|| {
            self.items
                .par_iter()
                .with_max_len(1)
                .for_each(|wi| cursors.advance_to_user(graph, wi.movies.clone(), wi.users.start));
        });
    }

    /// Runs one round: `W` sub-steps with a barrier and a column rotation
    /// between them.
    ///
    /// `kernel` is invoked once per in-range arc as `(movie, user, rating)`.
    /// Returns the number of updates applied.
    pub(crate) fn run_round(
        &mut self,
        graph: &RatingGraph,
        cursors: &EdgeCursors,
        pool: &rayon::ThreadPool,
        users_per_slice: usize,
        movies_per_slice: usize,
        kernel: &(impl Fn(usize, usize, u32) + Sync),
    ) -> u64 {
        let workers = self.items.len();
        let mut updates = 0;
        for sub_step in 0..workers {
            pool.install(|| {
                self.items.par_iter_mut().with_max_len(1).for_each(|wi| {
                    process_block(graph, cursors, wi, users_per_slice, movies_per_slice, kernel)
                });
            });
            // The join above is the sub-step barrier: every update of this
            // sub-step happens before any update of the next one.
            for (k, wi) in self.items.iter_mut().enumerate() {
                updates += wi.updates;
                wi.users = self.columns[(k + sub_step + 1) % workers].clone();
            }
            log::debug!(
                "Sub-step {sub_step}: {:?}",
                self.items
                    .iter()
                    .map(|wi| (wi.updates, wi.nanos / 1_000_000))
                    .collect::<Vec<_>>()
            );
        }
        updates
    }
}

/// Processes one block: the work item's movie band against its current user
/// column, sliced along one or both axes.
///
/// `users_per_slice` and `movies_per_slice` are clamped to the block size,
/// so the plain block variant is the degenerate case of a single slice.
fn process_block(
    graph: &RatingGraph,
    cursors: &EdgeCursors,
    wi: &mut WorkItem,
    users_per_slice: usize,
    movies_per_slice: usize,
    kernel: &(impl Fn(usize, usize, u32) + Sync),
) {
    let start = Instant::now();
    let mut updates = 0;

    let mut slice_end = wi.users.start;
    while slice_end < wi.users.end {
        slice_end = slice_end.saturating_add(users_per_slice).min(wi.users.end);
        let mut band_end = wi.movies.start;
        while band_end < wi.movies.end {
            let band_start = band_end;
            band_end = band_end.saturating_add(movies_per_slice).min(wi.movies.end);
            for movie in band_start..band_end {
                updates += process_row(graph, cursors, movie, slice_end, kernel);
            }
        }
    }

    wi.updates = updates;
    wi.nanos = start.elapsed().as_nanos();
}

/// Scans one movie from its cursor up to (but excluding) the given user
/// index, applying `kernel` to each arc; resets the cursor if the scan ended
/// at the top of the user axis. Returns the number of arcs consumed.
pub(super) fn process_row(
    graph: &RatingGraph,
    cursors: &EdgeCursors,
    movie: usize,
    user_end: usize,
    kernel: &impl Fn(usize, usize, u32),
) -> u64 {
    let dsts = graph.successors(movie);
    let ratings = graph.ratings(movie);
    let bound = graph.user_node(user_end);

    let resume = cursors.get(movie);
    let mut cursor = resume;
    while cursor < dsts.len() && dsts[cursor] < bound {
        kernel(movie, dsts[cursor], ratings[cursor]);
        cursor += 1;
    }
    cursors.add_updates(movie, cursor - resume);
    // The scan just looked at the last user: the next visit starts over.
    cursors.set(movie, if user_end == graph.num_users() { 0 } else { cursor });
    (cursor - resume) as u64
}
