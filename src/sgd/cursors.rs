/*
 * SPDX-FileCopyrightText: 2025 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

use crate::graph::RatingGraph;
use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Per-movie scheduling state: the edge cursor and the update counter.
///
/// The cursor of a movie is the offset into its successor list at which the
/// next visit resumes; it persists across the sub-steps of a round and is
/// reset once the scan reaches the top of the user axis. It is kept here, in
/// arrays parallel to the movie ids, rather than in the model: it is
/// scheduling state, not model state. The values are atomics only because
/// the arrays are shared among workers; every movie has a single writer at
/// any point of a round, so all accesses are relaxed.
pub(crate) struct EdgeCursors {
    cursors: Box<[AtomicUsize]>,
    updates: Box<[AtomicUsize]>,
}

impl EdgeCursors {
    pub(crate) fn new(num_movies: usize) -> Self {
        let mut cursors = Vec::with_capacity(num_movies);
        cursors.extend((0..num_movies).map(|_| AtomicUsize::new(0)));
        let mut updates = Vec::with_capacity(num_movies);
        updates.extend((0..num_movies).map(|_| AtomicUsize::new(0)));
        Self {
            cursors: cursors.into_boxed_slice(),
            updates: updates.into_boxed_slice(),
        }
    }

    #[inline(always)]
    pub(crate) fn get(&self, movie: usize) -> usize {
        self.cursors[movie].load(Ordering::Relaxed)
    }

    #[inline(always)]
    pub(crate) fn set(&self, movie: usize, cursor: usize) {
        self.cursors[movie].store(cursor, Ordering::Relaxed);
    }

    #[inline(always)]
    pub(crate) fn add_updates(&self, movie: usize, count: usize) {
        self.updates[movie].fetch_add(count, Ordering::Relaxed);
    }

    #[inline(always)]
    pub(crate) fn updates(&self, movie: usize) -> usize {
        self.updates[movie].load(Ordering::Relaxed)
    }

    /// Pre-positions the cursors of a range of movies so that the first arc
    /// visited by the range's owner is the first one at or beyond the given
    /// starting user index.
    ///
    /// Successor lists are sorted by destination, so the position is found
    /// by binary search; the scan then never has to look at arcs below its
    /// initial user column.
    pub(crate) fn advance_to_user(&self, graph: &RatingGraph, movies: Range<usize>, user_start: usize) {
        let bound = graph.user_node(user_start);
        for movie in movies {
            self.set(movie, graph.successors(movie).partition_point(|&dst| dst < bound));
        }
    }
}
