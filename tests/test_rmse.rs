/*
 * SPDX-FileCopyrightText: 2025 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

use anyhow::Result;
use parsgd::prelude::*;

fn thread_pool(num_threads: usize) -> rayon::ThreadPool {
    rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .build()
        .unwrap()
}

#[test]
fn test_rmse_independent_of_worker_count() -> Result<()> {
    // The evaluator reduction is commutative-associative; different worker
    // counts may only reorder floating-point additions.
    let arcs = (0..50)
        .flat_map(|movie| {
            (0..40)
                .filter(move |user| (movie + user) % 4 != 0)
                .map(move |user| (movie, 50 + user, (user % 5 + 1) as u32))
        })
        .collect::<Vec<_>>();
    let graph = RatingGraph::new(50, 40, arcs)?;
    let factors = Factors::new(&graph, parsgd::LATENT_VECTOR_SIZE, parsgd::SEED);

    let reference = thread_pool(1).install(|| rmse(&graph, &factors));
    for workers in [2, 3, 7] {
        let pool = thread_pool(workers);
        let result = pool.install(|| rmse(&graph, &factors));
        let tolerance = 1E-9 * graph.num_ratings() as f64;
        assert!(
            (result.total - reference.total).abs() <= tolerance,
            "{workers} workers: {} vs {}",
            result.total,
            reference.total
        );
    }
    Ok(())
}

#[test]
fn test_rmse_matches_serial_computation() -> Result<()> {
    let graph = RatingGraph::new(3, 5, [(0, 3, 1), (0, 5, 2), (1, 4, 3), (2, 6, 4), (2, 7, 5)])?;
    let factors = Factors::new(&graph, 4, parsgd::SEED);

    let mut expected = 0.0;
    for movie in 0..graph.num_movies() {
        for (&user, &rating) in graph.successors(movie).iter().zip(graph.ratings(movie)) {
            let err = parsgd::model::dot(factors.vector(movie), factors.vector(user))
                - rating as f64;
            expected += err * err;
        }
    }

    let rmse = rmse(&graph, &factors);
    assert!((rmse.total - expected).abs() < 1E-9);
    assert!((rmse.root_mean - (expected / graph.num_ratings() as f64).sqrt()).abs() < 1E-12);
    Ok(())
}
