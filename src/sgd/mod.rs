/*
 * SPDX-FileCopyrightText: 2025 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! The training driver and its scheduling strategies.
//!
//! [`Sgd`] is configured with setters and run with [`run`](Sgd::run), which
//! iterates over all ratings of a [`RatingGraph`] for a fixed number of
//! rounds, applying the regularized gradient update to the latent vectors of
//! both endpoints of each rating. A round applies every rating exactly once;
//! how the ratings are spread over the worker threads is decided by the
//! [`Algo`] in use.
//!
//! The update itself is a handful of fused multiply-adds; all the
//! engineering is in the schedulers, which bound how often two workers may
//! touch the same latent vector at the same time. There are three families:
//! the grid variants partition both axes and rotate user columns with
//! barriers, the queue variants do not partition at all and let user writes
//! race benignly, and the marching variant gates user slices with locks and
//! runs without barriers. See [`Algo`] for the full list.

use crate::graph::RatingGraph;
use crate::model::{gradient_step, Factors};
use crate::rmse::rmse;
use crate::schedule::StepSchedule;
use crate::{LAMBDA, MAX_MOVIE_UPDATES};
use anyhow::{ensure, Context, Result};
use dsi_progress_logger::prelude::*;
use log::info;
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

mod cursors;
pub(crate) mod grid;
mod march;
mod queue;

use cursors::EdgeCursors;

/// Selects the scheduling strategy used to spread rating updates over the
/// worker threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Algo {
    /// One task per movie, whole successor list per task. User vectors are
    /// written without synchronization (a benign, Hogwild-style race).
    #[value(name = "nodeMovie")]
    NodeMovie,
    /// One arc per task, grouped by movie: each movie is requeued after each
    /// of its arcs, so updates of different movies interleave arc by arc.
    /// User races as in [`NodeMovie`](Algo::NodeMovie).
    #[value(name = "edgeMovie")]
    EdgeMovie,
    /// Block grid: both axes are partitioned among the workers and the user
    /// columns rotate with a barrier after each sub-step, so all writes are
    /// exclusive by construction.
    #[value(name = "block")]
    Block,
    /// [`Block`](Algo::Block), with each block further cut into user
    /// sub-columns to shrink the inner working set.
    #[value(name = "blockAndSliceUsers")]
    BlockAndSliceUsers,
    /// [`BlockAndSliceUsers`](Algo::BlockAndSliceUsers), with the movie axis
    /// of each block also cut into bands. The default.
    #[default]
    #[value(name = "blockAndSliceBoth")]
    BlockAndSliceBoth,
    /// Lock-gated user slices marched over by free-running workers; no
    /// barriers, no fixed sub-step structure.
    #[value(name = "sliceMarch")]
    SliceMarch,
}

impl Algo {
    /// Returns the default number of rounds of this strategy.
    pub fn default_rounds(&self) -> usize {
        match self {
            Algo::NodeMovie | Algo::EdgeMovie => 10,
            _ => MAX_MOVIE_UPDATES,
        }
    }
}

impl std::fmt::Display for Algo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Algo::NodeMovie => f.write_str("nodeMovie"),
            Algo::EdgeMovie => f.write_str("edgeMovie"),
            Algo::Block => f.write_str("block"),
            Algo::BlockAndSliceUsers => f.write_str("blockAndSliceUsers"),
            Algo::BlockAndSliceBoth => f.write_str("blockAndSliceBoth"),
            Algo::SliceMarch => f.write_str("sliceMarch"),
        }
    }
}

/// Summary statistics of a training run.
#[derive(Debug, Clone)]
pub struct TrainReport {
    /// The number of rounds run.
    pub rounds: usize,
    /// Gradient updates applied, summed over all workers. One round applies
    /// one update per rating.
    pub total_updates: u64,
    /// Gradient updates applied to each movie.
    pub movie_updates: Box<[usize]>,
    /// Failed slice acquisitions ([`Algo::SliceMarch`] only).
    pub conflicts: u64,
}

/// A configured training run over a [`RatingGraph`].
///
/// # Examples
///
/// ```
/// use parsgd::prelude::*;
///
/// let graph = RatingGraph::from_arcs([
///     (0, 2, 1), (0, 3, 2), (1, 2, 3), (1, 3, 4),
/// ])?;
/// let mut factors = Factors::new(&graph, parsgd::LATENT_VECTOR_SIZE, parsgd::SEED);
///
/// let mut sgd = Sgd::new(&graph);
/// sgd.algo(Algo::BlockAndSliceBoth).num_threads(Some(2));
/// let report = sgd.run(&mut factors)?;
///
/// assert_eq!(report.total_updates, 4 * report.rounds as u64);
/// let rmse = rmse(&graph, &factors);
/// assert!(rmse.root_mean.is_finite());
/// # Ok::<(), anyhow::Error>(())
/// ```
pub struct Sgd<'a> {
    graph: &'a RatingGraph,
    algo: Algo,
    schedule: StepSchedule,
    rounds: Option<usize>,
    users_per_slice: usize,
    movies_per_slice: usize,
    lambda: f64,
    march_step_round: usize,
    rmse_per_round: bool,
    num_threads: Option<usize>,
    seed: u64,
}

impl<'a> Sgd<'a> {
    /// Creates a training run over the given graph with default settings:
    /// the [`BlockAndSliceBoth`](Algo::BlockAndSliceBoth) scheduler, the
    /// [`Intel`](StepSchedule::Intel) schedule, 2048 users and 512 movies
    /// per block slice.
    pub fn new(graph: &'a RatingGraph) -> Self {
        Self {
            graph,
            algo: Algo::default(),
            schedule: StepSchedule::default(),
            rounds: None,
            users_per_slice: 2048,
            movies_per_slice: 512,
            lambda: LAMBDA,
            march_step_round: 0,
            rmse_per_round: false,
            num_threads: None,
            seed: crate::SEED,
        }
    }

    /// Sets the scheduling strategy.
    pub fn algo(&mut self, algo: Algo) -> &mut Self {
        self.algo = algo;
        self
    }

    /// Sets the step-size schedule.
    pub fn schedule(&mut self, schedule: StepSchedule) -> &mut Self {
        self.schedule = schedule;
        self
    }

    /// Sets the number of rounds. `None` selects the strategy's default
    /// (see [`Algo::default_rounds`]).
    pub fn rounds(&mut self, rounds: Option<usize>) -> &mut Self {
        self.rounds = rounds;
        self
    }

    /// Sets the width, in users, of a block slice.
    ///
    /// # Panics
    ///
    /// Panics if `users_per_slice` is zero.
    pub fn users_per_slice(&mut self, users_per_slice: usize) -> &mut Self {
        assert!(users_per_slice > 0, "Slices must contain at least one user");
        self.users_per_slice = users_per_slice;
        self
    }

    /// Sets the width, in movies, of a block sub-band
    /// ([`BlockAndSliceBoth`](Algo::BlockAndSliceBoth) only).
    ///
    /// # Panics
    ///
    /// Panics if `movies_per_slice` is zero.
    pub fn movies_per_slice(&mut self, movies_per_slice: usize) -> &mut Self {
        assert!(movies_per_slice > 0, "Slices must contain at least one movie");
        self.movies_per_slice = movies_per_slice;
        self
    }

    /// Sets the regularization constant λ.
    pub fn lambda(&mut self, lambda: f64) -> &mut Self {
        self.lambda = lambda;
        self
    }

    /// Sets the round whose step size the marching-slices scheduler uses for
    /// its whole run (it has no global round structure to vary the step
    /// over). The default is 0.
    pub fn march_step_round(&mut self, round: usize) -> &mut Self {
        self.march_step_round = round;
        self
    }

    /// If true, computes and logs the RMS error before every round.
    pub fn rmse_per_round(&mut self, rmse_per_round: bool) -> &mut Self {
        self.rmse_per_round = rmse_per_round;
        self
    }

    /// Sets the number of worker threads. `None` uses one worker per
    /// available core.
    pub fn num_threads(&mut self, num_threads: Option<usize>) -> &mut Self {
        self.num_threads = num_threads;
        self
    }

    /// Sets the seed used to shuffle the movie queue between rounds
    /// ([`EdgeMovie`](Algo::EdgeMovie) only).
    pub fn seed(&mut self, seed: u64) -> &mut Self {
        self.seed = seed;
        self
    }

    /// Trains the given model in place and returns the run statistics.
    pub fn run(&self, factors: &mut Factors) -> Result<TrainReport> {
        let graph = self.graph;
        ensure!(
            factors.num_nodes() == graph.num_nodes(),
            "The model covers {} nodes but the graph has {}",
            factors.num_nodes(),
            graph.num_nodes()
        );

        let workers = self
            .num_threads
            .unwrap_or_else(rayon::current_num_threads)
            .max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
            .context("Could not create thread pool")?;

        let rounds = self.rounds.unwrap_or_else(|| self.algo.default_rounds());
        let cursors = EdgeCursors::new(graph.num_movies());
        let dim = factors.dim();
        let lambda = self.lambda;

        info!("Algorithm: {}", self.algo);
        info!("Schedule: {}", self.schedule);
        info!("Running {rounds} rounds on {workers} workers");

        let mut pl = progress_logger![item_name = "round", expected_updates = Some(rounds)];
        pl.start("Training...");

        let mut total_updates = 0;
        let mut conflicts = 0;

        match self.algo {
            Algo::NodeMovie => {
                for round in 0..rounds {
                    let step = self.before_round(round, factors, true);
                    let cells = factors.sync_cells();
                    // SAFETY: each movie is owned by exactly one task; user
                    // writes race benignly (Hogwild semantics).
                    let kernel = move |movie: usize, user: usize, rating: u32| unsafe {
                        gradient_step(cells, dim, movie, user, rating as f64, step, lambda)
                    };
                    queue::run_full_row_round(graph, &cursors, &pool, &kernel);
                    total_updates += graph.num_ratings() as u64;
                    pl.update();
                }
            }
            Algo::EdgeMovie => {
                let mut order = (0..graph.num_movies()).collect::<Vec<_>>();
                for round in 0..rounds {
                    if round != 0 {
                        let mut rng = SmallRng::seed_from_u64(self.seed.wrapping_add(round as u64));
                        order.shuffle(&mut rng);
                    }
                    let step = self.before_round(round, factors, true);
                    let cells = factors.sync_cells();
                    // SAFETY: a movie sits in the queue at most once, so it
                    // has one writer at a time; user writes race benignly.
                    let kernel = move |movie: usize, user: usize, rating: u32| unsafe {
                        gradient_step(cells, dim, movie, user, rating as f64, step, lambda)
                    };
                    queue::run_edge_movie_round(graph, &cursors, &pool, &order, &kernel);
                    total_updates += graph.num_ratings() as u64;
                    pl.update();
                }
            }
            Algo::Block | Algo::BlockAndSliceUsers | Algo::BlockAndSliceBoth => {
                let (users_per_slice, movies_per_slice) = match self.algo {
                    Algo::Block => (usize::MAX, usize::MAX),
                    Algo::BlockAndSliceUsers => (self.users_per_slice, usize::MAX),
                    _ => (self.users_per_slice, self.movies_per_slice),
                };
                let mut grid = grid::Grid::new(graph, workers);
                grid.advance_cursors(graph, &cursors, &pool);
                for round in 0..rounds {
                    let step = self.before_round(round, factors, false);
                    let cells = factors.sync_cells();
                    // SAFETY: in every sub-step the workers own disjoint
                    // movie bands and disjoint user columns, so each cell
                    // has a single writer.
                    let kernel = move |movie: usize, user: usize, rating: u32| unsafe {
                        gradient_step(cells, dim, movie, user, rating as f64, step, lambda)
                    };
                    total_updates += grid.run_round(
                        graph,
                        &cursors,
                        &pool,
                        users_per_slice,
                        movies_per_slice,
                        &kernel,
                    );
                    pl.update();
                }
            }
            Algo::SliceMarch => {
                let step = self.schedule.step(self.march_step_round);
                info!("Step size: {step}");
                let cells = factors.sync_cells();
                // SAFETY: movie bands are disjoint and a slice lock must be
                // held to touch its users, so each cell has a single writer.
                let kernel = move |movie: usize, user: usize, rating: u32| unsafe {
                    gradient_step(cells, dim, movie, user, rating as f64, step, lambda)
                };
                let reports = march::run_march(
                    graph,
                    &cursors,
                    &pool,
                    workers,
                    self.users_per_slice,
                    rounds,
                    &kernel,
                );
                for report in reports {
                    total_updates += report.updates;
                    conflicts += report.conflicts;
                }
                pl.update_with_count(rounds);
            }
        }

        pl.done();

        Ok(TrainReport {
            rounds,
            total_updates,
            movie_updates: (0..graph.num_movies())
                .map(|movie| cursors.updates(movie))
                .collect(),
            conflicts,
        })
    }

    /// Returns the step size of the round, logging it together with the
    /// current RMS error when per-round evaluation is enabled.
    ///
    /// The queue-based variants pass `always_log_step` so the step size is
    /// reported every round; the grid variants stay silent unless they are
    /// evaluating.
    fn before_round(&self, round: usize, factors: &Factors, always_log_step: bool) -> f64 {
        let step = self.schedule.step(round);
        if self.rmse_per_round {
            let rmse = rmse(self.graph, factors);
            info!(
                "Step size: {step}; RMS error: {} {}",
                rmse.total, rmse.root_mean
            );
        } else if always_log_step {
            info!("Step size: {step}");
        }
        step
    }
}
