/*
 * SPDX-FileCopyrightText: 2025 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Root-mean-square error of a model against the observed ratings.

use crate::graph::RatingGraph;
use crate::model::{predict, Factors};
use kahan::KahanSum;
use log::warn;
use rayon::prelude::*;

/// The error of a model over all ratings of a graph.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rmse {
    /// The sum over all ratings of the squared prediction error.
    pub total: f64,
    /// √(`total` / *R*).
    pub root_mean: f64,
}

/// Computes the squared prediction error summed over all ratings, in
/// parallel, and its root mean.
///
/// Predictions are clamped as in [`predict`]; a prediction that is not a
/// normal floating-point number is reported with a warning, but the
/// computation continues. Each movie row is accumulated with a compensated
/// sum, so the result is reproducible across worker counts up to the
/// reordering of the final reduction.
pub fn rmse(graph: &RatingGraph, factors: &Factors) -> Rmse {
    let total = (0..graph.num_movies())
        .into_par_iter()
        .map(|movie| {
            let movie_vector = factors.vector(movie);
            let mut row = KahanSum::<f64>::new();
            for (&user, &rating) in graph.successors(movie).iter().zip(graph.ratings(movie)) {
                let pred = predict(movie_vector, factors.vector(user));
                if !pred.is_normal() {
                    warn!("Non-normal prediction {pred} for rating ({movie}, {user})");
                }
                let err = pred - rating as f64;
                row += err * err;
            }
            row.sum()
        })
        .sum::<f64>();

    let num_ratings = graph.num_ratings();
    Rmse {
        total,
        root_mean: if num_ratings == 0 {
            0.0
        } else {
            (total / num_ratings as f64).sqrt()
        },
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_exact_model_has_zero_error() -> anyhow::Result<()> {
        let g = RatingGraph::from_arcs([(0, 1, 2)])?;
        // <(2, 0), (1, 3)> = 2, exactly the rating.
        let factors = Factors::from_raw(2, vec![2.0, 0.0, 1.0, 3.0]);
        let rmse = rmse(&g, &factors);
        assert_eq!(rmse.total, 0.0);
        assert_eq!(rmse.root_mean, 0.0);
        Ok(())
    }

    #[test]
    fn test_known_error() -> anyhow::Result<()> {
        let g = RatingGraph::from_arcs([(0, 1, 3), (0, 2, 1)])?;
        // Predictions are 1 and 2: squared errors 4 and 1.
        let factors = Factors::from_raw(1, vec![1.0, 1.0, 2.0]);
        let rmse = rmse(&g, &factors);
        assert!((rmse.total - 5.0).abs() < 1E-12);
        assert!((rmse.root_mean - (2.5_f64).sqrt()).abs() < 1E-12);
        Ok(())
    }
}
