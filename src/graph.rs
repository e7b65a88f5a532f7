/*
 * SPDX-FileCopyrightText: 2025 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! An immutable bipartite rating graph in compressed sparse row form.
//!
//! Nodes share a single id space: identifiers 0‥*M* − 1 are movies,
//! identifiers *M*‥*M* + *U* − 1 are users. Every arc goes from a movie to a
//! user and carries an integer rating; users have no outgoing arcs. Within
//! each movie's successor list, arcs are sorted by destination, which is the
//! invariant the schedulers depend on: a scan over a successor list may stop
//! at the first destination past its user range, as no later arc can re-enter
//! the range.

use anyhow::{ensure, Result};

/// An immutable bipartite graph of movies, users, and integer ratings.
///
/// The graph is stored as offsets into two parallel arrays of destinations
/// and ratings, one slice per movie. Only the topology lives here; the
/// mutable per-node state of a computation is kept in
/// [`Factors`](crate::model::Factors) and in the schedulers.
///
/// # Examples
///
/// ```
/// use parsgd::graph::RatingGraph;
///
/// // Two movies (0, 1) and two users (2, 3).
/// let g = RatingGraph::from_arcs([(0, 2, 1), (0, 3, 2), (1, 2, 3), (1, 3, 4)])?;
/// assert_eq!(g.num_movies(), 2);
/// assert_eq!(g.num_users(), 2);
/// assert_eq!(g.num_ratings(), 4);
/// assert_eq!(g.successors(0), &[2, 3]);
/// assert_eq!(g.ratings(1), &[3, 4]);
/// # Ok::<(), anyhow::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RatingGraph {
    num_movies: usize,
    num_users: usize,
    /// For each movie, the start of its arcs in `dsts`/`ratings`;
    /// `offsets[num_movies]` is the total number of arcs.
    offsets: Box<[usize]>,
    /// Arc destinations (user node ids), sorted within each movie.
    dsts: Box<[usize]>,
    /// Arc ratings, parallel to `dsts`.
    ratings: Box<[u32]>,
}

impl RatingGraph {
    /// Creates a graph with the given number of movies and users from an
    /// iterator of `(movie, user, rating)` triples.
    ///
    /// Destinations are user *node ids*, that is, user indices biased by the
    /// number of movies. Arcs may be passed in any order: successor lists are
    /// sorted during construction.
    ///
    /// # Errors
    ///
    /// Returns an error if an arc source is not a movie, if an arc
    /// destination is not a user, or if some movie has no arcs (movies are
    /// exactly the nodes of nonzero outdegree, so such a graph would not be
    /// bipartite with the declared shape).
    pub fn new(
        num_movies: usize,
        num_users: usize,
        arcs: impl IntoIterator<Item = (usize, usize, u32)>,
    ) -> Result<Self> {
        let mut arcs = arcs.into_iter().collect::<Vec<_>>();
        for &(src, dst, _) in &arcs {
            ensure!(
                src < num_movies,
                "Arc ({src}, {dst}) does not originate at a movie (there are {num_movies} movies)"
            );
            ensure!(
                (num_movies..num_movies + num_users).contains(&dst),
                "Arc ({src}, {dst}) does not terminate at a user (user ids are {num_movies}..{})",
                num_movies + num_users
            );
        }
        arcs.sort_unstable_by_key(|&(src, dst, _)| (src, dst));

        let mut offsets = Vec::with_capacity(num_movies + 1);
        let mut dsts = Vec::with_capacity(arcs.len());
        let mut ratings = Vec::with_capacity(arcs.len());
        offsets.push(0);
        for (src, dst, rating) in arcs {
            while offsets.len() <= src {
                offsets.push(dsts.len());
            }
            dsts.push(dst);
            ratings.push(rating);
        }
        while offsets.len() <= num_movies {
            offsets.push(dsts.len());
        }

        let graph = Self {
            num_movies,
            num_users,
            offsets: offsets.into_boxed_slice(),
            dsts: dsts.into_boxed_slice(),
            ratings: ratings.into_boxed_slice(),
        };
        for movie in 0..num_movies {
            ensure!(
                graph.outdegree(movie) > 0,
                "Node {movie} lies in the movie range but has no ratings"
            );
        }
        Ok(graph)
    }

    /// Creates a graph from an iterator of `(movie, user, rating)` triples,
    /// inferring the number of movies and users.
    ///
    /// The number of movies is one past the largest source; every node id
    /// past that is a user. See [`new`](Self::new) for the conventions and
    /// failure modes.
    pub fn from_arcs(arcs: impl IntoIterator<Item = (usize, usize, u32)>) -> Result<Self> {
        let arcs = arcs.into_iter().collect::<Vec<_>>();
        ensure!(!arcs.is_empty(), "The graph has no ratings");
        let num_movies = arcs.iter().map(|&(src, _, _)| src).max().unwrap() + 1;
        let num_nodes = arcs
            .iter()
            .map(|&(_, dst, _)| dst)
            .max()
            .unwrap()
            .max(num_movies - 1)
            + 1;
        ensure!(
            num_nodes > num_movies,
            "The graph has no users (largest node id is {})",
            num_nodes - 1
        );
        Self::new(num_movies, num_nodes - num_movies, arcs)
    }

    /// Returns the number of movies *M*.
    #[inline(always)]
    pub fn num_movies(&self) -> usize {
        self.num_movies
    }

    /// Returns the number of users *U*.
    #[inline(always)]
    pub fn num_users(&self) -> usize {
        self.num_users
    }

    /// Returns the number of nodes, *M* + *U*.
    #[inline(always)]
    pub fn num_nodes(&self) -> usize {
        self.num_movies + self.num_users
    }

    /// Returns the number of ratings *R*.
    #[inline(always)]
    pub fn num_ratings(&self) -> usize {
        self.dsts.len()
    }

    /// Returns the node id of the user with the given index.
    #[inline(always)]
    pub fn user_node(&self, user_index: usize) -> usize {
        self.num_movies + user_index
    }

    /// Returns the outdegree of a movie.
    #[inline(always)]
    pub fn outdegree(&self, movie: usize) -> usize {
        self.offsets[movie + 1] - self.offsets[movie]
    }

    /// Returns the successors of a movie, sorted by destination.
    #[inline(always)]
    pub fn successors(&self, movie: usize) -> &[usize] {
        &self.dsts[self.offsets[movie]..self.offsets[movie + 1]]
    }

    /// Returns the ratings of a movie, parallel to
    /// [`successors`](Self::successors).
    #[inline(always)]
    pub fn ratings(&self, movie: usize) -> &[u32] {
        &self.ratings[self.offsets[movie]..self.offsets[movie + 1]]
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_sorts_successors() -> Result<()> {
        let g = RatingGraph::from_arcs([(0, 4, 5), (0, 2, 1), (1, 3, 2), (0, 3, 3)])?;
        assert_eq!(g.num_movies(), 2);
        assert_eq!(g.num_users(), 3);
        assert_eq!(g.successors(0), &[2, 3, 4]);
        assert_eq!(g.ratings(0), &[1, 3, 5]);
        assert_eq!(g.successors(1), &[3]);
        Ok(())
    }

    #[test]
    fn test_explicit_shape_allows_trailing_users() -> Result<()> {
        // User 4 has no ratings but is part of the declared shape.
        let g = RatingGraph::new(2, 3, [(0, 2, 1), (1, 3, 2)])?;
        assert_eq!(g.num_users(), 3);
        assert_eq!(g.num_ratings(), 2);
        Ok(())
    }

    #[test]
    fn test_rejects_arc_into_movie() {
        assert!(RatingGraph::new(2, 2, [(0, 1, 5)]).is_err());
    }

    #[test]
    fn test_rejects_arc_from_user() {
        assert!(RatingGraph::new(1, 2, [(0, 1, 5), (1, 2, 5)]).is_err());
    }

    #[test]
    fn test_rejects_movie_without_ratings() {
        // Node 1 would be a movie (ids 0..2) but has no arcs.
        assert!(RatingGraph::new(2, 2, [(0, 2, 5), (0, 3, 5)]).is_err());
    }
}
