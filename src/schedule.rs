/*
 * SPDX-FileCopyrightText: 2025 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Step-size schedules.
//!
//! A schedule is a pure function from the round number to a positive step
//! size. The four variants are the ones found in the matrix-factorization
//! literature and are named after their provenance.

use crate::{BOTTOU_INIT, DECAY_RATE, LAMBDA, LEARNING_RATE};

/// Selects the step-size schedule used for gradient updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum StepSchedule {
    /// γ · δʳ.
    #[default]
    #[value(name = "Intel")]
    Intel,
    /// γ · 1.5 / (1 + δ · (r + 1)¹·⁵).
    #[value(name = "Purdue")]
    Purdue,
    /// β / (1 + β λ r), where β is the Bottou initial step.
    #[value(name = "Bottou")]
    Bottou,
    /// 1 / (r + 1).
    #[value(name = "Inv")]
    Inv,
}

impl StepSchedule {
    /// Returns the step size for the given round.
    pub fn step(&self, round: usize) -> f64 {
        let r = round as f64;
        match self {
            StepSchedule::Intel => LEARNING_RATE * DECAY_RATE.powf(r),
            StepSchedule::Purdue => LEARNING_RATE * 1.5 / (1.0 + DECAY_RATE * (r + 1.0).powf(1.5)),
            StepSchedule::Bottou => BOTTOU_INIT / (1.0 + BOTTOU_INIT * LAMBDA * r),
            StepSchedule::Inv => 1.0 / (r + 1.0),
        }
    }
}

impl std::fmt::Display for StepSchedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepSchedule::Intel => f.write_str("Intel"),
            StepSchedule::Purdue => f.write_str("Purdue"),
            StepSchedule::Bottou => f.write_str("Bottou"),
            StepSchedule::Inv => f.write_str("Inv"),
        }
    }
}
