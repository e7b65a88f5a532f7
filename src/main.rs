/*
 * SPDX-FileCopyrightText: 2025 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

use anyhow::{ensure, Context, Result};
use clap::Parser;
use dsi_progress_logger::prelude::*;
use log::info;
use parsgd::prelude::*;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(
    about = "Computes a matrix factorization of a bipartite rating graph by parallel stochastic gradient descent.",
    version
)]
struct CliArgs {
    /// The ratings file: one `movie user rating` triple of nonnegative
    /// integers per line, whitespace-separated. Movies and users are
    /// numbered independently from 0; lines starting with `#` are ignored.
    input: PathBuf,

    #[arg(long, value_enum, default_value_t = Algo::BlockAndSliceBoth)]
    /// The scheduling strategy.
    algo: Algo,

    #[arg(long, value_enum, default_value_t = StepSchedule::Intel)]
    /// The step-size schedule.
    learn: StepSchedule,

    #[arg(long = "usersPerBlk", default_value_t = 2048)]
    /// Users per block slice.
    users_per_block_slice: usize,

    #[arg(long = "moviesPerBlk", default_value_t = 512)]
    /// Movies per block slice (blockAndSliceBoth only).
    movies_per_block_slice: usize,

    #[arg(long = "verifyPerIter")]
    /// Compute and log the RMS error before every round.
    verify_per_iter: bool,

    #[arg(short = 'j', long = "activeThreads")]
    /// The number of worker threads. Defaults to the number of cores.
    active_threads: Option<usize>,

    #[arg(long)]
    /// The number of rounds. Defaults to 5 for the grid strategies and 10
    /// for the others.
    rounds: Option<usize>,

    #[arg(long, default_value_t = parsgd::LATENT_VECTOR_SIZE)]
    /// The dimension of the latent vectors.
    dim: usize,

    #[arg(long, default_value_t = parsgd::SEED)]
    /// The seed for the pseudorandom initialization of the latent vectors.
    seed: u64,

    #[arg(long = "countRatings")]
    /// Log how many ratings fall in each worker-sized band of the user axis.
    count_ratings: bool,
}

/// Reads `movie user rating` triples and assembles the rating graph, biasing
/// user ids past the movies as the core expects.
fn load_ratings(path: &PathBuf) -> Result<RatingGraph> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Could not open {}", path.display()))?;

    let mut pl = progress_logger![item_name = "rating"];
    pl.start(format!("Reading ratings from {}...", path.display()));

    let mut triples = Vec::new();
    let mut num_movies = 0;
    let mut num_users = 0;
    for (line_number, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("Could not read line {}", line_number + 1))?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut fields = line.split_whitespace();
        let mut field = || {
            fields
                .next()
                .with_context(|| format!("Line {}: expected three fields", line_number + 1))
        };
        let movie = field()?
            .parse::<usize>()
            .with_context(|| format!("Line {}: bad movie id", line_number + 1))?;
        let user = field()?
            .parse::<usize>()
            .with_context(|| format!("Line {}: bad user id", line_number + 1))?;
        let rating = field()?
            .parse::<u32>()
            .with_context(|| format!("Line {}: bad rating", line_number + 1))?;
        num_movies = num_movies.max(movie + 1);
        num_users = num_users.max(user + 1);
        triples.push((movie, user, rating));
        pl.light_update();
    }
    pl.done();

    ensure!(!triples.is_empty(), "{} contains no ratings", path.display());
    RatingGraph::new(
        num_movies,
        num_users,
        triples
            .into_iter()
            .map(|(movie, user, rating)| (movie, num_movies + user, rating)),
    )
}

/// Logs how many ratings fall in each worker-sized band of the user axis,
/// an indicator of how balanced the user columns will be.
fn count_ratings(graph: &RatingGraph, workers: usize) {
    let mut ratings_per_user = vec![0_usize; graph.num_users()];
    for movie in 0..graph.num_movies() {
        for &user in graph.successors(movie) {
            ratings_per_user[user - graph.num_movies()] += 1;
        }
    }
    let users_per_worker = graph.num_users() / workers;
    for band in 0..workers {
        let start = band * users_per_worker;
        let end = if band == workers - 1 {
            graph.num_users()
        } else {
            start + users_per_worker
        };
        let count: usize = ratings_per_user[start..end].iter().sum();
        info!("Users [{start}, {end}): {count} ratings");
    }
}

fn main() -> Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .try_init()?;

    let args = CliArgs::parse();

    let graph = load_ratings(&args.input)?;
    info!(
        "Input initialized, num users = {}, num movies = {}",
        graph.num_users(),
        graph.num_movies()
    );

    let workers = args
        .active_threads
        .unwrap_or_else(rayon::current_num_threads)
        .max(1);
    if args.count_ratings {
        count_ratings(&graph, workers);
    }

    let mut factors = Factors::new(&graph, args.dim, args.seed);

    let mut sgd = Sgd::new(&graph);
    sgd.algo(args.algo)
        .schedule(args.learn)
        .rounds(args.rounds)
        .users_per_slice(args.users_per_block_slice)
        .movies_per_slice(args.movies_per_block_slice)
        .rmse_per_round(args.verify_per_iter)
        .num_threads(Some(workers))
        .seed(args.seed);

    let start = Instant::now();
    let report = sgd.run(&mut factors)?;
    let elapsed = start.elapsed();
    info!(
        "Applied {} updates in {} rounds",
        report.total_updates, report.rounds
    );
    if args.algo == Algo::SliceMarch {
        info!("Slice acquisition conflicts: {}", report.conflicts);
    }

    let rmse = rmse(&graph, &factors);
    println!(
        "Root Mean Square Error after training: {} {}",
        rmse.total, rmse.root_mean
    );
    println!(
        "SUMMARY Movies {} Users {} Ratings {} usersPerBlockSlice {} moviesPerBlockSlice {} Time {}",
        graph.num_movies(),
        graph.num_users(),
        graph.num_ratings(),
        args.users_per_block_slice,
        args.movies_per_block_slice,
        elapsed.as_secs_f64()
    );

    Ok(())
}
