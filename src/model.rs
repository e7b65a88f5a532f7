/*
 * SPDX-FileCopyrightText: 2025 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! The latent-vector model and the single-edge gradient update.
//!
//! [`Factors`] owns one real vector of fixed dimension per node, stored as a
//! single flat slice. During training the slice is shared among worker
//! threads via [`SyncCell`]s; the schedulers guarantee by construction that
//! writes to the same node are never concurrent, except where a benign race
//! is documented (see [`Algo::NodeMovie`](crate::sgd::Algo::NodeMovie)).

use crate::graph::RatingGraph;
use crate::{MAXVAL, MINVAL};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use sync_cell_slice::{SyncCell, SyncSlice};

/// The latent vectors of all nodes of a [`RatingGraph`].
///
/// Vectors are initialized to uniform pseudorandom values in (−1, 1) from a
/// fixed seed, so two runs with the same seed start from identical models.
///
/// # Examples
///
/// ```
/// use parsgd::graph::RatingGraph;
/// use parsgd::model::Factors;
///
/// let g = RatingGraph::from_arcs([(0, 1, 5)])?;
/// let factors = Factors::new(&g, 20, parsgd::SEED);
/// assert_eq!(factors.dim(), 20);
/// assert!(factors.vector(0).iter().all(|x| (-1.0..1.0).contains(x)));
/// # Ok::<(), anyhow::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Factors {
    dim: usize,
    vectors: Box<[f64]>,
}

impl Factors {
    /// Creates latent vectors for all nodes of the given graph, filled with
    /// uniform pseudorandom values in (−1, 1) generated from `seed`.
    pub fn new(graph: &RatingGraph, dim: usize, seed: u64) -> Self {
        let mut rng = SmallRng::seed_from_u64(seed);
        let mut vectors = vec![0.0; graph.num_nodes() * dim].into_boxed_slice();
        for x in vectors.iter_mut() {
            *x = rng.random_range(-1.0..1.0);
        }
        Self { dim, vectors }
    }

    /// Creates factors from raw per-node vectors, concatenated in node
    /// order, as returned by [`vector`](Self::vector).
    ///
    /// # Panics
    ///
    /// Panics if the length of `vectors` is not a multiple of `dim`.
    pub fn from_raw(dim: usize, vectors: Vec<f64>) -> Self {
        assert_eq!(
            vectors.len() % dim,
            0,
            "{} values cannot be vectors of dimension {dim}",
            vectors.len()
        );
        Self {
            dim,
            vectors: vectors.into_boxed_slice(),
        }
    }

    /// Returns the dimension of the latent vectors.
    #[inline(always)]
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Returns the number of nodes this model covers.
    #[inline(always)]
    pub fn num_nodes(&self) -> usize {
        self.vectors.len() / self.dim
    }

    /// Returns the latent vector of a node.
    #[inline(always)]
    pub fn vector(&self, node: usize) -> &[f64] {
        &self.vectors[node * self.dim..(node + 1) * self.dim]
    }

    /// Exposes the whole model as a slice of [`SyncCell`]s for shared
    /// mutation by worker threads.
    pub(crate) fn sync_cells(&mut self) -> &[SyncCell<f64>] {
        self.vectors.as_sync_slice()
    }
}

/// Returns the dot product of two vectors.
#[inline(always)]
pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    let mut dp = 0.0;
    for (x, y) in a.iter().zip(b) {
        dp += x * y;
    }
    dp
}

/// Returns the predicted rating of a (movie, user) pair, clamped to the
/// [`MINVAL`]..[`MAXVAL`] interval.
///
/// The clamp is applied only when predicting for evaluation; gradient
/// updates use the raw dot product.
#[inline(always)]
pub fn predict(movie: &[f64], user: &[f64]) -> f64 {
    dot(movie, user).clamp(MINVAL, MAXVAL)
}

/// Applies one regularized SGD step for a single rating arc, mutating the
/// latent vectors of both endpoints in place.
///
/// The update reads the pre-update values of both vectors on each component,
/// so the user update sees the movie value from before the movie update, as
/// in the standard joint step.
///
/// # Safety
///
/// The caller must guarantee that no other thread concurrently writes the
/// movie's cells, and that concurrent writes to the user's cells happen only
/// under a scheduling discipline that documents the race as benign.
#[inline(always)]
pub(crate) unsafe fn gradient_step(
    cells: &[SyncCell<f64>],
    dim: usize,
    movie: usize,
    user: usize,
    rating: f64,
    step: f64,
    lambda: f64,
) {
    let m = movie * dim;
    let u = user * dim;

    let mut dp = 0.0;
    for i in 0..dim {
        dp += cells[m + i].get() * cells[u + i].get();
    }
    let err = rating - dp;

    for i in 0..dim {
        let movie_val = cells[m + i].get();
        let user_val = cells[u + i].get();
        cells[m + i].set(movie_val + step * (err * user_val - lambda * movie_val));
        cells[u + i].set(user_val + step * (err * movie_val - lambda * user_val));
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn step_on(vectors: &mut Vec<f64>, dim: usize, rating: f64, step: f64, lambda: f64) {
        let cells = vectors.as_sync_slice();
        // SAFETY: single-threaded.
        unsafe {
            gradient_step(cells, dim, 0, 1, rating, step, lambda);
        }
    }

    #[test]
    fn test_single_update() {
        // One movie, one user, rating 3: err = 3 − <(1, 0), (0, 1)> = 3.
        let mut vectors = vec![1.0, 0.0, 0.0, 1.0];
        step_on(&mut vectors, 2, 3.0, 0.001, 0.0);
        assert_eq!(vectors, vec![1.0, 0.003, 0.003, 1.0]);
    }

    #[test]
    fn test_exact_rating_shrinks_by_regularization() {
        // If the rating is exactly the prediction, the step reduces to pure
        // weight decay: each component shrinks by a factor of 1 − ηλ.
        let movie = [0.5, -0.25, 0.125];
        let user = [0.5, 0.5, -2.0];
        let rating = dot(&movie, &user);
        let (step, lambda) = (0.01, 0.1);
        let mut vectors = movie.iter().chain(&user).copied().collect::<Vec<_>>();
        step_on(&mut vectors, 3, rating, step, lambda);
        for (x, orig) in vectors.iter().zip(movie.iter().chain(&user)) {
            assert!((x - orig * (1.0 - step * lambda)).abs() < 1E-12);
        }
    }

    #[test]
    fn test_zero_step_is_identity() {
        let mut vectors = vec![0.3, -0.7, 0.9, 0.1];
        let orig = vectors.clone();
        step_on(&mut vectors, 2, 5.0, 0.0, 0.001);
        assert_eq!(vectors, orig);
    }

    #[test]
    fn test_deterministic_initialization() -> anyhow::Result<()> {
        let g = RatingGraph::from_arcs([(0, 2, 1), (1, 2, 2), (1, 3, 3)])?;
        let a = Factors::new(&g, 20, crate::SEED);
        let b = Factors::new(&g, 20, crate::SEED);
        assert_eq!(a, b);
        let c = Factors::new(&g, 20, crate::SEED + 1);
        assert_ne!(a, c);
        Ok(())
    }

    #[test]
    fn test_initialization_range() -> anyhow::Result<()> {
        let g = RatingGraph::from_arcs([(0, 1, 1)])?;
        let factors = Factors::new(&g, 100, 0);
        for node in 0..g.num_nodes() {
            assert!(factors.vector(node).iter().all(|x| (-1.0..1.0).contains(x)));
        }
        Ok(())
    }
}
