/*
 * SPDX-FileCopyrightText: 2025 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! The marching-slices scheduler.
//!
//! The user axis is cut into *S* slices of fixed width, each gated by its
//! own spinlock. Every worker owns a movie band for the whole run and
//! marches it across the slices, starting at a staggered position, wrapping
//! at the top of the axis, and stopping after it has processed each slice a
//! fixed number of times. Unlike the grid schedulers there is no barrier:
//! workers drift ahead of or behind one another freely, and the locks alone
//! guarantee that no two of them ever hold the same user slice.
//!
//! A failed `try_lock` is not an error: it is tallied in the worker's
//! conflict counter and followed by a blocking acquisition.

use super::cursors::EdgeCursors;
use crate::graph::RatingGraph;
use crossbeam_utils::CachePadded;
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// A test-and-test-and-set spinlock.
///
/// `try_lock` is a single compare-and-swap, so failed attempts can be
/// counted without blocking; `lock` spins on a plain load between attempts
/// to avoid hammering the cache line.
pub(crate) struct SpinLock {
    locked: AtomicBool,
}

impl SpinLock {
    pub(crate) fn new() -> Self {
        Self {
            locked: AtomicBool::new(false),
        }
    }

    #[inline(always)]
    pub(crate) fn try_lock(&self) -> bool {
        self.locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    pub(crate) fn lock(&self) {
        while !self.try_lock() {
            while self.locked.load(Ordering::Relaxed) {
                std::hint::spin_loop();
            }
        }
    }

    #[inline(always)]
    pub(crate) fn unlock(&self) {
        self.locked.store(false, Ordering::Release);
    }

    #[inline(always)]
    pub(crate) fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }
}

/// Per-worker diagnostics of a marching-slices run.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct MarchWorker {
    pub(crate) updates: u64,
    pub(crate) conflicts: u64,
    pub(crate) nanos: u128,
}

/// Runs the whole marching-slices schedule and returns the per-worker
/// diagnostics.
///
/// `rounds` is the number of times each worker processes each slice, so the
/// run applies every rating `rounds` times. The lock array is allocated on
/// entry, one cache line per lock, and freed on return.
pub(crate) fn run_march(
    graph: &RatingGraph,
    cursors: &EdgeCursors,
    pool: &rayon::ThreadPool,
    workers: usize,
    users_per_slice: usize,
    rounds: usize,
    kernel: &(impl Fn(usize, usize, u32) + Sync),
) -> Vec<MarchWorker> {
    let num_users = graph.num_users();
    let users_per_slice = users_per_slice.clamp(1, num_users);
    let num_slices = num_users.div_ceil(users_per_slice);

    let mut locks = Vec::with_capacity(num_slices);
    locks.extend((0..num_slices).map(|_| CachePadded::new(SpinLock::new())));
    log::info!("Marching {num_slices} slices of {users_per_slice} users with {workers} workers");

    // Stagger the starting slices and pre-position the cursors there.
    let movies_per_worker = graph.num_movies() / workers;
    let mut items = Vec::with_capacity(workers);
    for k in 0..workers {
        let movie_end = if k == workers - 1 {
            graph.num_movies()
        } else {
            (k + 1) * movies_per_worker
        };
        let start_slice = num_slices / workers * k;
        items.push((k * movies_per_worker..movie_end, start_slice));
    }
    pool.install(|| {
        items.par_iter().with_max_len(1).for_each(|(movies, start_slice)| {
            cursors.advance_to_user(graph, movies.clone(), start_slice * users_per_slice);
        });
    });

    let mut reports = vec![MarchWorker::default(); workers];
    pool.install(|| {
        items
            .par_iter()
            .zip(reports.par_iter_mut())
            .with_max_len(1)
            .for_each(|((movies, start_slice), report)| {
                let start = Instant::now();
                let mut slice = *start_slice;
                for _ in 0..rounds * num_slices {
                    if !locks[slice].try_lock() {
                        report.conflicts += 1;
                        locks[slice].lock();
                    }

                    let slice_end = ((slice + 1) * users_per_slice).min(num_users);
                    for movie in movies.clone() {
                        report.updates +=
                            super::grid::process_row(graph, cursors, movie, slice_end, kernel);
                    }

                    locks[slice].unlock();
                    slice += 1;
                    if slice == num_slices {
                        slice = 0;
                    }
                }
                report.nanos = start.elapsed().as_nanos();
            });
    });

    for (k, report) in reports.iter().enumerate() {
        log::info!(
            "March worker {k}: {} updates, {} conflicts, {} s",
            report.updates,
            report.conflicts,
            report.nanos as f64 / 1E9
        );
    }
    debug_assert!(locks.iter().all(|lock| !lock.is_locked()));
    reports
}

#[cfg(test)]
mod test {
    use super::*;
    use anyhow::Result;

    fn thread_pool(num_threads: usize) -> rayon::ThreadPool {
        rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build()
            .unwrap()
    }

    #[test]
    fn test_spinlock() {
        let lock = SpinLock::new();
        assert!(lock.try_lock());
        assert!(lock.is_locked());
        assert!(!lock.try_lock());
        lock.unlock();
        assert!(!lock.is_locked());
        lock.lock();
        assert!(lock.is_locked());
        lock.unlock();
    }

    #[test]
    fn test_march_terminates_and_covers() -> Result<()> {
        // 4 workers over 8 slices; every worker must finish its slice quota
        // and leave every lock open.
        let num_movies = 8;
        let num_users = 16;
        let arcs = (0..num_movies)
            .flat_map(|m| {
                (0..num_users)
                    .filter(move |u| (m + u) % 2 == 0)
                    .map(move |u| (m, num_movies + u, (u % 5 + 1) as u32))
            })
            .collect::<Vec<_>>();
        let g = RatingGraph::new(num_movies, num_users, arcs)?;
        let workers = 4;
        let pool = thread_pool(workers);
        let cursors = EdgeCursors::new(g.num_movies());
        let rounds = 3;

        let kernel = |_, _, _| {};
        let reports = run_march(&g, &cursors, &pool, workers, num_users / 8, rounds, &kernel);

        assert_eq!(reports.len(), workers);
        let total: u64 = reports.iter().map(|r| r.updates).sum();
        assert_eq!(total, (g.num_ratings() * rounds) as u64);
        // Every rating was applied exactly `rounds` times.
        for movie in 0..g.num_movies() {
            assert_eq!(cursors.updates(movie), g.outdegree(movie) * rounds);
        }
        Ok(())
    }

    #[test]
    fn test_march_single_worker_wide_slices() -> Result<()> {
        let g = RatingGraph::new(2, 3, [(0, 2, 1), (0, 4, 2), (1, 3, 3)])?;
        let pool = thread_pool(1);
        let cursors = EdgeCursors::new(2);
        // A slice wider than the user axis is clamped to a single slice.
        let reports = run_march(&g, &cursors, &pool, 1, 100, 2, &|_, _, _| {});
        assert_eq!(reports[0].updates, (g.num_ratings() * 2) as u64);
        assert_eq!(reports[0].conflicts, 0);
        Ok(())
    }
}
