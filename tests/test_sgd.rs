/*
 * SPDX-FileCopyrightText: 2025 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

use anyhow::Result;
use parsgd::prelude::*;

/// An irregular test graph: 9 movies, 11 users, degrees that do not divide
/// the worker counts used below.
fn test_graph() -> Result<RatingGraph> {
    let arcs = (0..9)
        .flat_map(|movie| {
            (0..11)
                .filter(move |user| (movie * 7 + user * 5) % 3 != 0)
                .map(move |user| (movie, 9 + user, (user % 5 + 1) as u32))
        })
        .collect::<Vec<_>>();
    RatingGraph::new(9, 11, arcs)
}

const ALL_ALGOS: [Algo; 6] = [
    Algo::NodeMovie,
    Algo::EdgeMovie,
    Algo::Block,
    Algo::BlockAndSliceUsers,
    Algo::BlockAndSliceBoth,
    Algo::SliceMarch,
];

#[test]
fn test_every_algo_applies_every_rating_once_per_round() -> Result<()> {
    let graph = test_graph()?;
    for algo in ALL_ALGOS {
        for workers in [1, 2, 3] {
            let mut factors = Factors::new(&graph, 4, parsgd::SEED);
            let mut sgd = Sgd::new(&graph);
            sgd.algo(algo)
                .num_threads(Some(workers))
                .users_per_slice(3)
                .movies_per_slice(2);
            let report = sgd.run(&mut factors)?;

            assert_eq!(report.rounds, algo.default_rounds());
            assert_eq!(
                report.total_updates,
                (graph.num_ratings() * report.rounds) as u64,
                "{algo} with {workers} workers"
            );
            for movie in 0..graph.num_movies() {
                assert_eq!(
                    report.movie_updates[movie],
                    graph.outdegree(movie) * report.rounds,
                    "{algo} with {workers} workers, movie {movie}"
                );
            }
        }
    }
    Ok(())
}

#[test]
fn test_deterministic_initialization() -> Result<()> {
    let graph = test_graph()?;
    let a = Factors::new(&graph, parsgd::LATENT_VECTOR_SIZE, parsgd::SEED);
    let b = Factors::new(&graph, parsgd::LATENT_VECTOR_SIZE, parsgd::SEED);
    for node in 0..graph.num_nodes() {
        assert_eq!(a.vector(node), b.vector(node));
    }
    Ok(())
}

#[test]
fn test_grid_training_is_deterministic() -> Result<()> {
    // The grid discipline gives every cell a single writer and a fixed
    // update order, so two runs with the same configuration agree exactly.
    let graph = test_graph()?;
    let mut runs = Vec::new();
    for _ in 0..2 {
        let mut factors = Factors::new(&graph, 8, parsgd::SEED);
        let mut sgd = Sgd::new(&graph);
        sgd.algo(Algo::BlockAndSliceBoth)
            .num_threads(Some(2))
            .users_per_slice(2)
            .movies_per_slice(3);
        sgd.run(&mut factors)?;
        runs.push(factors);
    }
    assert_eq!(runs[0], runs[1]);
    Ok(())
}

#[test]
fn test_rms_error_decreases() -> Result<()> {
    let graph = test_graph()?;
    for algo in [Algo::BlockAndSliceBoth, Algo::NodeMovie] {
        let mut factors = Factors::new(&graph, parsgd::LATENT_VECTOR_SIZE, parsgd::SEED);
        let before = rmse(&graph, &factors).root_mean;
        let mut sgd = Sgd::new(&graph);
        sgd.algo(algo).schedule(StepSchedule::Intel).num_threads(Some(2));
        sgd.run(&mut factors)?;
        let after = rmse(&graph, &factors).root_mean;
        assert!(
            after < before,
            "{algo}: RMS error went from {before} to {after}"
        );
    }
    Ok(())
}

#[test]
fn test_more_rounds_help() -> Result<()> {
    let graph = test_graph()?;
    let mut short = Factors::new(&graph, parsgd::LATENT_VECTOR_SIZE, parsgd::SEED);
    let mut long = Factors::new(&graph, parsgd::LATENT_VECTOR_SIZE, parsgd::SEED);
    let mut sgd = Sgd::new(&graph);
    sgd.num_threads(Some(2));
    sgd.rounds(Some(1)).run(&mut short)?;
    sgd.rounds(Some(8)).run(&mut long)?;
    assert!(rmse(&graph, &long).root_mean <= rmse(&graph, &short).root_mean);
    Ok(())
}

#[test]
fn test_march_with_many_workers_terminates() -> Result<()> {
    // 4 workers marching 8 slices; the run must terminate with the exact
    // update counts even though the workers drift freely.
    let num_movies = 8;
    let num_users = 24;
    let arcs = (0..num_movies)
        .flat_map(|movie| {
            (0..num_users).map(move |user| (movie, num_movies + user, (user % 5 + 1) as u32))
        })
        .collect::<Vec<_>>();
    let graph = RatingGraph::new(num_movies, num_users, arcs)?;

    let mut factors = Factors::new(&graph, 4, parsgd::SEED);
    let mut sgd = Sgd::new(&graph);
    sgd.algo(Algo::SliceMarch)
        .num_threads(Some(4))
        .users_per_slice(num_users / 8);
    let report = sgd.run(&mut factors)?;

    assert_eq!(
        report.total_updates,
        (graph.num_ratings() * report.rounds) as u64
    );
    Ok(())
}

#[test]
fn test_zero_rounds_leave_model_untouched() -> Result<()> {
    let graph = test_graph()?;
    let mut factors = Factors::new(&graph, 4, parsgd::SEED);
    let orig = factors.clone();
    let mut sgd = Sgd::new(&graph);
    sgd.rounds(Some(0));
    let report = sgd.run(&mut factors)?;
    assert_eq!(report.total_updates, 0);
    assert_eq!(factors, orig);
    Ok(())
}

#[test]
fn test_rejects_mismatched_model() -> Result<()> {
    let graph = test_graph()?;
    let other = RatingGraph::from_arcs([(0, 1, 1)])?;
    let mut factors = Factors::new(&other, 4, parsgd::SEED);
    assert!(Sgd::new(&graph).run(&mut factors).is_err());
    Ok(())
}
