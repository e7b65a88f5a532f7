/*
 * SPDX-FileCopyrightText: 2025 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! The unpartitioned baseline schedulers.
//!
//! Neither variant partitions the user axis: different workers may update
//! the same user vector at the same time. The races are benign in the
//! Hogwild sense and are the point of these baselines, which bound from
//! below (full row) and above (one arc at a time) the interleaving that the
//! grid schedulers avoid by construction.

use super::cursors::EdgeCursors;
use crate::graph::RatingGraph;
use crossbeam_channel::TryRecvError;
use rayon::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Runs one full-row round: every movie's whole successor list, movies in
/// parallel.
///
/// Each movie is owned by exactly one task, so movie state has a single
/// writer; user vectors are updated without synchronization.
pub(crate) fn run_full_row_round(
    graph: &RatingGraph,
    cursors: &EdgeCursors,
    pool: &rayon::ThreadPool,
    kernel: &(impl Fn(usize, usize, u32) + Sync),
) {
    pool.install(|| {
        (0..graph.num_movies()).into_par_iter().for_each(|movie| {
            for (&user, &rating) in graph.successors(movie).iter().zip(graph.ratings(movie)) {
                kernel(movie, user, rating);
            }
            cursors.add_updates(movie, graph.outdegree(movie));
        });
    });
}

/// Runs one edge-movie round: a shared queue holds each movie at most once;
/// a worker pops a movie, applies a single arc, and requeues the movie until
/// its list is exhausted, then resets its cursor.
///
/// `order` is the (shuffled) sequence in which movies are first enqueued.
pub(crate) fn run_edge_movie_round(
    graph: &RatingGraph,
    cursors: &EdgeCursors,
    pool: &rayon::ThreadPool,
    order: &[usize],
    kernel: &(impl Fn(usize, usize, u32) + Sync),
) {
    let (tx, rx) = crossbeam_channel::unbounded();
    for &movie in order {
        tx.send(movie).unwrap();
    }
    let remaining = AtomicUsize::new(graph.num_ratings());

    pool.broadcast(|_| loop {
        match rx.try_recv() {
            Ok(movie) => {
                let cursor = cursors.get(movie);
                let user = graph.successors(movie)[cursor];
                kernel(movie, user, graph.ratings(movie)[cursor]);
                cursors.add_updates(movie, 1);
                remaining.fetch_sub(1, Ordering::Relaxed);
                if cursor + 1 == graph.outdegree(movie) {
                    cursors.set(movie, 0);
                } else {
                    cursors.set(movie, cursor + 1);
                    tx.send(movie).unwrap();
                }
            }
            Err(TryRecvError::Empty) => {
                // The queue may refill: a movie is in flight on another
                // worker until its arc count reaches zero.
                if remaining.load(Ordering::Relaxed) == 0 {
                    break;
                }
                std::hint::spin_loop();
            }
            Err(TryRecvError::Disconnected) => break,
        }
    });
}
