// shp-scheduler: self-healing schedule synthesis for time-triggered networks
// Copyright (C) 2024 The shp-scheduler developers
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

//! The scheduling engine: constraint formulation, the one-shot and incremental drivers, and the
//! independent schedule validator.
//!
//! Both drivers share the same constraint model. The one-shot driver emits the whole model and
//! solves once; the incremental driver schedules a fixed number of frames per iteration,
//! pinning the results of earlier iterations so later ones cannot move them. After either
//! driver finishes, [`validator::check_schedule`] re-verifies the schedule from first
//! principles.

use good_lp::ResolutionError;
use log::info;
use thiserror::Error;

use crate::network::{Network, NetworkError};

pub(crate) mod constraints;
pub mod milp;
pub mod validator;

use constraints::{schedule_batch, SolverSettings};
pub use validator::ScheduleViolation;

/// The scheduling algorithm to run.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Algorithm {
    /// Emit the entire model at once and solve it in a single invocation.
    OneShot,
    /// Schedule the traffic in batches, fixing each batch before the next one is solved.
    Incremental {
        /// Number of frames scheduled per iteration, at least 1.
        frames_per_iteration: usize,
    },
}

/// Parameters of a scheduler run, read from the scheduler parameter document.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct ScheduleParams {
    /// The algorithm to run.
    pub algorithm: Algorithm,
    /// Relative MIP gap below which the solver may stop.
    pub mip_gap: f64,
    /// Wall-clock limit for a single solver invocation, in seconds.
    pub time_limit: f64,
}

/// Error while scheduling a network.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The network was not prepared, or its state is inconsistent.
    #[error("network error: {0}")]
    Network(#[from] NetworkError),
    /// The solver found no feasible schedule in the given iteration (the one-shot driver always
    /// reports iteration 0).
    #[error("no feasible schedule exists in iteration {iteration}: {source}")]
    Infeasible {
        /// Iteration in which the solver gave up.
        iteration: usize,
        /// Error reported by the solver.
        source: ResolutionError,
    },
    /// The produced schedule violates its own constraints. This is a bug in the constraint
    /// emission or the solver configuration, never a property of the input.
    #[error("the produced schedule violates its constraints: {0}")]
    Violation(#[from] ScheduleViolation),
}

/// Schedule all transmission times of the network with the given parameters, then verify the
/// result independently of the solver.
pub fn schedule_network(net: &mut Network, params: &ScheduleParams) -> Result<(), SchedulerError> {
    if !net.is_prepared() {
        return Err(NetworkError::NotPrepared.into());
    }
    let settings = SolverSettings {
        mip_gap: params.mip_gap,
        time_limit: params.time_limit,
    };
    match params.algorithm {
        Algorithm::OneShot => one_shot(net, &settings)?,
        Algorithm::Incremental {
            frames_per_iteration,
        } => incremental(net, &settings, frames_per_iteration.max(1))?,
    }
    validator::check_schedule(net)?;
    Ok(())
}

/// Materialize the model for all frames at once and solve it in a single invocation.
fn one_shot(net: &mut Network, settings: &SolverSettings) -> Result<(), SchedulerError> {
    let num = net.num_frames();
    info!("scheduling all {num} frames in one shot");
    schedule_batch(net, 0..num, settings).map_err(|source| SchedulerError::Infeasible {
        iteration: 0,
        source,
    })
}

/// Schedule the traffic in batches of `frames_per_iteration`, in input order. Every iteration
/// solves the current batch against the already-fixed frames and the SHP reservation; a solver
/// failure reports the iteration number.
fn incremental(
    net: &mut Network,
    settings: &SolverSettings,
    frames_per_iteration: usize,
) -> Result<(), SchedulerError> {
    let num = net.num_frames();
    let mut iteration = 0;
    for start in (0..num).step_by(frames_per_iteration) {
        let batch = start..num.min(start + frames_per_iteration);
        info!(
            "iteration {iteration}: scheduling frames {}..{} of {num}",
            batch.start, batch.end
        );
        schedule_batch(net, batch, settings)
            .map_err(|source| SchedulerError::Infeasible { iteration, source })?;
        iteration += 1;
    }
    Ok(())
}
