/*
 * SPDX-FileCopyrightText: 2025 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

#![doc = include_str!("../README.md")]

pub mod graph;
pub mod model;
pub mod rmse;
pub mod schedule;
pub mod sgd;

/// Number of components of a latent vector.
///
/// This is the default dimension used by the [driver](crate::sgd::Sgd);
/// [`Factors`](crate::model::Factors) accepts any dimension at construction.
pub const LATENT_VECTOR_SIZE: usize = 20;

/// Default number of rounds for the grid and marching-slices schedulers.
pub const MAX_MOVIE_UPDATES: usize = 5;

/// Lower clamp applied to predictions during evaluation.
pub const MINVAL: f64 = -1E100;

/// Upper clamp applied to predictions during evaluation.
pub const MAXVAL: f64 = 1E100;

/// Base learning rate (γ) of the step-size schedules.
pub const LEARNING_RATE: f64 = 0.001;

/// Per-round decay rate of the step-size schedules.
pub const DECAY_RATE: f64 = 0.9;

/// Default regularization constant (λ) of the gradient update.
pub const LAMBDA: f64 = 0.001;

/// Initial step size of the Bottou schedule.
pub const BOTTOU_INIT: f64 = 0.1;

/// Default seed for the latent-vector initialization.
pub const SEED: u64 = 4562727;

pub mod prelude {
    pub use crate::graph::RatingGraph;
    pub use crate::model::Factors;
    pub use crate::rmse::rmse;
    pub use crate::schedule::StepSchedule;
    pub use crate::sgd::{Algo, Sgd};
}
