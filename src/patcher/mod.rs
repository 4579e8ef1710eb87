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

//! Repair of a single link whose schedule has become invalid (e.g. after a failover).
//!
//! A [`PatchBundle`] describes the situation on that link: the transmissions that must not move
//! (the *fixed* traffic and the SHP reservation) and the frames that need a new place, each with
//! a per-instance feasible range. Two repair modes exist: [`PatchBundle::patch`] places every
//! frame in the earliest free interval (fast, first-fit), and [`PatchBundle::optimize`] runs an
//! incremental MILP that maximizes the slack between adjacent transmissions. All times in this
//! module are already expressed in time slots.

use good_lp::{
    constraint,
    solvers::coin_cbc::{coin_cbc as create_solver, CoinCbcProblem},
    variable, Expression, ProblemVariables, ResolutionError, Solution, SolverModel, Variable,
};
use log::{debug, info};
use thiserror::Error;

use crate::network::{SelfHealingProtocol, UNSCHEDULED};
use crate::scheduler::milp::{indicator, or_all};

mod intervals;

pub use intervals::IntervalList;

// the objective weights are shared with the full scheduler
use crate::scheduler::constraints::{FRAME_SLACK_WEIGHT, LINK_SLACK_WEIGHT};

/// A transmission that may not move: its tight-bound start variable, its start slot, and its
/// duration in slots.
#[derive(Debug, Clone, Copy)]
struct Pinned {
    /// The solver variable, with lower = upper = `start`.
    var: Variable,
    /// First slot of the transmission.
    start: i64,
    /// Duration in slots.
    time: i64,
}

/// One pinned transmission of the fixed traffic: `[start, end]` with an inclusive end slot.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct FixedSlot {
    /// First slot of the transmission.
    pub start: i64,
    /// Last slot of the transmission (inclusive, `start + time - 1`).
    pub end: i64,
}

/// A frame of the fixed traffic: its transmissions on the patched link must not move.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct FixedFrame {
    /// External identifier of the frame.
    pub id: usize,
    /// One pinned transmission per instance.
    pub slots: Vec<FixedSlot>,
}

/// The feasible start range of one instance of a frame to allocate.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct TransmissionRange {
    /// Earliest feasible start.
    pub min: i64,
    /// Latest feasible start.
    pub max: i64,
}

/// A frame that needs a new place on the patched link.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct PatchFrame {
    /// External identifier of the frame.
    id: usize,
    /// Number of slots each transmission occupies.
    time_slots: i64,
    /// Feasible start range per instance.
    ranges: Vec<TransmissionRange>,
    /// Allocated start per instance, [`UNSCHEDULED`] until placed.
    transmission: Vec<i64>,
}

impl PatchFrame {
    /// Create a frame to allocate with all instances unplaced.
    pub fn new(id: usize, time_slots: i64, ranges: Vec<TransmissionRange>) -> Self {
        let transmission = vec![UNSCHEDULED; ranges.len()];
        Self {
            id,
            time_slots,
            ranges,
            transmission,
        }
    }

    /// External identifier of the frame.
    pub fn id(&self) -> usize {
        self.id
    }

    /// Number of slots each transmission occupies.
    pub fn time_slots(&self) -> i64 {
        self.time_slots
    }

    /// Number of instances.
    pub fn num_instances(&self) -> usize {
        self.ranges.len()
    }

    /// Feasible start range of the given instance.
    pub fn range(&self, instance: usize) -> TransmissionRange {
        self.ranges[instance]
    }

    /// Allocated start of the given instance, [`UNSCHEDULED`] until placed.
    pub fn transmission(&self, instance: usize) -> i64 {
        self.transmission[instance]
    }
}

/// Error while repairing a link.
#[derive(Debug, Error)]
pub enum PatchError {
    /// The heuristic found no free interval for an instance of a frame.
    #[error("frame {frame} cannot be placed on the link (instance {instance})")]
    Unschedulable {
        /// Frame that could not be placed.
        frame: usize,
        /// Instance that could not be placed.
        instance: usize,
    },
    /// The MILP found no feasible placement for the frame added in the given iteration.
    #[error("no feasible placement exists in iteration {iteration}: {source}")]
    Infeasible {
        /// Iteration (frame index) in which the solver gave up.
        iteration: usize,
        /// Error reported by the solver.
        source: ResolutionError,
    },
}

/// Everything the patcher knows about the link under repair.
#[derive(Clone, PartialEq, Debug)]
pub struct PatchBundle {
    /// Identifier of the link under repair.
    pub link_id: usize,
    /// The SHP reservation, with `period == 0` when disabled.
    pub protocol: SelfHealingProtocol,
    /// The scheduling cycle length in slots.
    pub hyperperiod: i64,
    /// Traffic that must not move.
    pub fixed: Vec<FixedFrame>,
    /// Traffic that needs a new place.
    pub traffic: Vec<PatchFrame>,
}

impl PatchBundle {
    /// The reserved SHP intervals within the hyperperiod, as `(start, end)` half-open slot
    /// ranges.
    fn reservation_slots(&self) -> Vec<(i64, i64)> {
        if self.protocol.period <= 0 {
            return Vec::new();
        }
        (0..self.hyperperiod / self.protocol.period)
            .map(|k| {
                let start = k * self.protocol.period;
                (start, start + self.protocol.time)
            })
            .collect()
    }

    /// Place every frame with the first-fit heuristic.
    ///
    /// The busy intervals of the fixed traffic and the SHP reservation seed a sorted interval
    /// list; every instance of every frame (in input order) is then placed at the earliest
    /// feasible start within its range. Fails on the first instance that does not fit; already
    /// placed instances keep their starts so the caller can inspect how far the repair came.
    pub fn patch(&mut self) -> Result<(), PatchError> {
        let mut busy = IntervalList::new();
        for (start, end) in self.reservation_slots() {
            busy.insert(start, end);
        }
        for frame in self.fixed.iter() {
            for slot in frame.slots.iter() {
                busy.insert(slot.start, slot.end + 1);
            }
        }
        info!(
            "patching link {}: {} busy intervals, {} frames to place",
            self.link_id,
            busy.len(),
            self.traffic.len()
        );

        for pos in 0..self.traffic.len() {
            let frame = &self.traffic[pos];
            let (id, len) = (frame.id, frame.time_slots);
            for instance in 0..frame.num_instances() {
                let range = self.traffic[pos].ranges[instance];
                match busy.allocate(range.min, range.max, len) {
                    Some(start) => self.traffic[pos].transmission[instance] = start,
                    None => {
                        return Err(PatchError::Unschedulable {
                            frame: id,
                            instance,
                        })
                    }
                }
            }
            debug!("placed frame {id}");
        }
        Ok(())
    }

    /// Re-optimize the link with the incremental MILP.
    ///
    /// Frames are added one per iteration. Each iteration maximizes the weighted sum of the
    /// frame's slack (its distance to the instance range borders) and a fresh link slack (the
    /// distance between adjacent transmissions), subject to contention against the fixed
    /// traffic, the SHP reservation, and every frame fixed in an earlier iteration.
    pub fn optimize(&mut self) -> Result<(), PatchError> {
        for pos in 0..self.traffic.len() {
            self.optimize_one(pos)
                .map_err(|source| PatchError::Infeasible {
                    iteration: pos,
                    source,
                })?;
        }
        Ok(())
    }

    /// Build and solve the model of one iteration, placing the frame at `pos`.
    fn optimize_one(&mut self, pos: usize) -> Result<(), ResolutionError> {
        let mut p = ProblemVariables::new();

        // the frame to place: one free variable per instance, bounded by its range
        let frame = &self.traffic[pos];
        let starts: Vec<Variable> = frame
            .ranges
            .iter()
            .map(|r| p.add(variable().integer().min(r.min as f64).max(r.max as f64)))
            .collect();

        // frame slack, bounded by the widest instance range
        let slack_bound = frame
            .ranges
            .iter()
            .map(|r| r.max - r.min)
            .max()
            .unwrap_or(0);
        let fd = p.add(variable().integer().min(0).max(slack_bound as f64));
        // a single link slack for this iteration
        let ld = p.add(
            variable()
                .integer()
                .min(0)
                .max(self.hyperperiod as f64),
        );

        // everything already pinned enters as a tight-bound variable: the reservation slots
        // first, then the fixed traffic, then the frames placed in earlier iterations
        let mut pinned: Vec<Pinned> = Vec::new();
        let pin = |p: &mut ProblemVariables, start: i64, time: i64| Pinned {
            var: p.add(variable().integer().min(start as f64).max(start as f64)),
            start,
            time,
        };
        for (start, end) in self.reservation_slots() {
            pinned.push(pin(&mut p, start, end - start));
        }
        for fixed in self.fixed.iter() {
            for slot in fixed.slots.iter() {
                pinned.push(pin(&mut p, slot.start, slot.end + 1 - slot.start));
            }
        }
        for earlier in self.traffic[..pos].iter() {
            for instance in 0..earlier.num_instances() {
                pinned.push(pin(&mut p, earlier.transmission[instance], earlier.time_slots));
            }
        }

        // contention gadget variables for every pinned transmission an instance range can reach
        let time_cur = frame.time_slots;
        let mut gadgets: Vec<(usize, usize, Variable, Variable, Variable)> = Vec::new();
        for (instance, range) in frame.ranges.iter().enumerate() {
            for (prev, pre) in pinned.iter().enumerate() {
                let reachable =
                    range.min < pre.start + pre.time && pre.start < range.max + time_cur;
                if !reachable {
                    continue;
                }
                gadgets.push((
                    instance,
                    prev,
                    p.add(variable().binary()),
                    p.add(variable().binary()),
                    p.add(variable().integer().min(1).max(1)),
                ));
            }
        }

        let objective = FRAME_SLACK_WEIGHT * fd + LINK_SLACK_WEIGHT * ld;
        let mut model = create_solver(p.maximise(objective));
        configure(&mut model);

        // keep the frame slack below the distance to both range borders of every instance
        for (instance, range) in self.traffic[pos].ranges.iter().enumerate() {
            let s = starts[instance];
            model.add_constraint(constraint!(s - fd >= range.min as f64));
            model.add_constraint(constraint!(s + fd <= range.max as f64));
        }

        // link-slack-padded disjoint ordering against every reachable pinned transmission
        let big_m = 4.0 * self.hyperperiod as f64;
        for &(instance, prev, x, y, one) in gadgets.iter() {
            let s = starts[instance];
            let pre = pinned[prev];
            or_all(&mut model, one, &[x, y]);
            indicator(
                &mut model,
                x,
                Expression::from(pre.var) - s - ld,
                time_cur as f64,
                big_m,
            );
            indicator(
                &mut model,
                y,
                Expression::from(s) - pre.var - ld,
                pre.time as f64,
                big_m,
            );
        }

        let inner = model.as_inner();
        info!(
            "optimizing frame {} ({} rows, {} cols)",
            self.traffic[pos].id,
            inner.num_rows(),
            inner.num_cols()
        );
        let solution = model.solve()?;
        for (instance, s) in starts.iter().enumerate() {
            self.traffic[pos].transmission[instance] = solution.value(*s).round() as i64;
        }
        Ok(())
    }

}

/// Silence and parallelize CBC the same way the scheduler does.
fn configure(model: &mut CoinCbcProblem) {
    #[cfg(any(test, feature = "hide-cbc-output"))]
    model.set_parameter("logLevel", "0");
    #[cfg(feature = "cbc-parallel")]
    model.set_parameter("threads", &format!("{}", num_cpus::get().min(8)));
    let _ = model;
}
