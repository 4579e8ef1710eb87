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

//! Translation of a prepared [`Network`] into an MILP model, and the solve-and-store step shared
//! by the one-shot and incremental drivers.
//!
//! Every call to [`schedule_batch`] builds a fresh model: offset variables for the frames of the
//! current batch, tight-bound variables for every frame scheduled in an earlier iteration and
//! for the SHP reservation, the slack variables of the objective, and the four constraint
//! classes (path dependency, end-to-end, contention-freedom, and SHP avoidance, which falls
//! out of treating the reservation as a frame). Rebuilding with tight bounds is how fixing
//! works: a variable with `lb = ub = v` is an equality constraint, and slacks of earlier
//! iterations simply never enter the new objective.

use std::{collections::HashMap, ops::Range};

use good_lp::{
    constraint,
    solvers::coin_cbc::{coin_cbc as create_solver, CoinCbcProblem},
    variable, Expression, ProblemVariables, ResolutionError, Solution, SolverModel, Variable,
};
use itertools::Itertools;
use log::{debug, info};

use crate::network::{Frame, Network, UNSCHEDULED};

use super::milp::{indicator, or_all};

/// Objective weight of the per-frame slack variables.
pub(crate) const FRAME_SLACK_WEIGHT: f64 = 0.9;
/// Objective weight of the per-link slack variables.
pub(crate) const LINK_SLACK_WEIGHT: f64 = 0.1;

/// Solver parameters shared by all drivers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct SolverSettings {
    /// Relative MIP gap below which the solver may stop.
    pub mip_gap: f64,
    /// Wall-clock limit for a single solve, in seconds.
    pub time_limit: f64,
}

impl SolverSettings {
    /// Apply the settings to a CBC model.
    pub(crate) fn apply(&self, model: &mut CoinCbcProblem) {
        #[cfg(any(test, feature = "hide-cbc-output"))]
        model.set_parameter("logLevel", "0");
        #[cfg(feature = "cbc-parallel")]
        model.set_parameter("threads", &format!("{}", num_cpus::get().min(8)));
        model.set_parameter("seconds", &format!("{}", self.time_limit));
        model.set_parameter("ratio", &format!("{}", self.mip_gap));
    }
}

/// All variables of one scheduling model.
///
/// The solver handles live only as long as the model of the current iteration; offsets keep
/// their scheduled times, never their variables.
struct ModelVars {
    /// Offset start variables, `[frame position][arena index][instance][replica]`, covering all
    /// frames up to the end of the current batch (earlier ones with tight bounds).
    offsets: Vec<Vec<Vec<Vec<Variable>>>>,
    /// Reservation start variables, `[arena index][instance]`, tight at `instance * period`.
    reservation: Vec<Vec<Variable>>,
    /// Per-frame slack of the current batch, keyed by frame position.
    frame_slack: HashMap<usize, Variable>,
    /// Per-link slack of the current iteration, indexed by link id.
    link_slack: Vec<Variable>,
    /// One entry per potentially colliding pair of offset cells.
    contention: Vec<ContentionPair>,
}

/// The variables and coefficients of one contention-freedom gadget, keeping two offset cells
/// on the same link from overlapping.
struct ContentionPair {
    /// Start variable of the cell currently being added.
    cur: Variable,
    /// Start variable of the cell added earlier (or of the SHP reservation).
    prev: Variable,
    /// Link both cells transmit on.
    link: usize,
    /// Transmission duration of the current cell.
    time_cur: f64,
    /// Transmission duration of the earlier cell.
    time_prev: f64,
    /// Binary selecting `prev` after `cur`.
    x: Variable,
    /// Binary selecting `cur` after `prev`.
    y: Variable,
    /// Binary fixed to 1, or-constrained over `x` and `y`.
    one: Variable,
}

/// Build the model for the given batch, solve it, and store the resulting transmission times in
/// the batch frames' offsets. Frames before `batch.start` must already be scheduled; their
/// values enter the model as tight-bound variables.
pub(crate) fn schedule_batch(
    net: &mut Network,
    batch: Range<usize>,
    settings: &SolverSettings,
) -> Result<(), ResolutionError> {
    let mut problem = ProblemVariables::new();
    let vars = setup_vars(&mut problem, net, &batch);
    let objective = objective(&vars);

    let mut model = create_solver(problem.maximise(objective));
    settings.apply(&mut model);

    setup_constraints(&mut model, &vars, net, &batch);

    let inner = model.as_inner();
    info!(
        "solving the MILP model: {} rows, {} cols",
        inner.num_rows(),
        inner.num_cols()
    );
    let solution = model.solve()?;

    save_offsets(net, &vars, &batch, &solution);
    Ok(())
}

/// Create all variables of the model.
fn setup_vars(p: &mut ProblemVariables, net: &Network, batch: &Range<usize>) -> ModelVars {
    let hyperperiod = net.hyperperiod() as f64;

    let mut vars = ModelVars {
        offsets: offset_variables(p, net, batch),
        reservation: reservation_variables(p, net),
        frame_slack: frame_slack_variables(p, net, batch),
        link_slack: link_slack_variables(p, net, hyperperiod),
        contention: Vec::new(),
    };
    contention_variables(p, net, batch, &mut vars);
    vars
}

/// Create the offset start variables for all frames up to the end of the batch.
///
/// Batch frames get the full feasible window `[starting + inst * period + repl * time,
/// deadline - time + inst * period - repl * time]`; frames of earlier iterations are pinned to
/// their already-scheduled start.
fn offset_variables(
    p: &mut ProblemVariables,
    net: &Network,
    batch: &Range<usize>,
) -> Vec<Vec<Vec<Vec<Variable>>>> {
    net.frames()[..batch.end]
        .iter()
        .enumerate()
        .map(|(pos, frame)| {
            let free = pos >= batch.start;
            frame
                .offsets()
                .iter()
                .map(|offset| {
                    let time = offset.time();
                    (0..offset.num_instances() as i64)
                        .map(|inst| {
                            (0..offset.num_replicas() as i64)
                                .map(|repl| {
                                    if free {
                                        let lb = frame.starting() + inst * frame.period() + repl * time;
                                        let ub = frame.deadline() - time + inst * frame.period()
                                            - repl * time;
                                        p.add(variable().integer().min(lb as f64).max(ub as f64))
                                    } else {
                                        let v = offset.transmission(inst as usize, repl as usize)
                                            as f64;
                                        p.add(variable().integer().min(v).max(v))
                                    }
                                })
                                .collect()
                        })
                        .collect()
                })
                .collect()
        })
        .collect()
}

/// Create the pre-fixed start variables of the SHP reservation (lower = upper =
/// `instance * period`).
fn reservation_variables(p: &mut ProblemVariables, net: &Network) -> Vec<Vec<Variable>> {
    let Some(reservation) = net.reservation() else {
        return Vec::new();
    };
    reservation
        .offsets()
        .iter()
        .map(|offset| {
            (0..offset.num_instances())
                .map(|inst| {
                    let v = offset.transmission(inst, 0) as f64;
                    p.add(variable().integer().min(v).max(v))
                })
                .collect()
        })
        .collect()
}

/// Create one slack variable per batch frame, bounded by its end-to-end delay (0 when the frame
/// carries no end-to-end bound).
fn frame_slack_variables(
    p: &mut ProblemVariables,
    net: &Network,
    batch: &Range<usize>,
) -> HashMap<usize, Variable> {
    batch
        .clone()
        .map(|pos| {
            let ub = net.frames()[pos].end_to_end() as f64;
            (pos, p.add(variable().integer().min(0).max(ub)))
        })
        .collect()
}

/// Create one slack variable per link, bounded by the hyperperiod. A fresh set is created for
/// every iteration; the slacks of earlier iterations never re-enter the objective.
fn link_slack_variables(
    p: &mut ProblemVariables,
    net: &Network,
    hyperperiod: f64,
) -> Vec<Variable> {
    (0..=net.higher_link_id())
        .map(|_| p.add(variable().integer().min(0).max(hyperperiod)))
        .collect()
}

/// Enumerate every pair of offset cells that can collide and create the gadget variables for
/// each: two binaries `x`, `y` and a third one fixed to 1 that is or-constrained over them.
///
/// A batch cell is compared against the reservation and against every cell of an earlier frame
/// (fixed frames and batch frames added before it) transmitting on the same link. Two cells can
/// collide when their reachable windows overlap; the window of instance `k` is the half-open
/// `(period * k + starting + 1, period * k + deadline + 1)` interval.
fn contention_variables(
    p: &mut ProblemVariables,
    net: &Network,
    batch: &Range<usize>,
    vars: &mut ModelVars,
) {
    let frames = net.frames();
    for pos in batch.clone() {
        let frame = &frames[pos];
        for (index, offset) in frame.offsets().iter().enumerate() {
            let link = offset.link_id();
            // the reservation is checked first, then every frame added before this one
            let previous = net
                .reservation()
                .map(|r| (usize::MAX, r))
                .into_iter()
                .chain(frames[..pos].iter().enumerate());
            for (pre_pos, pre_frame) in previous {
                let Some(pre_index) = pre_frame.offset_index_by_link(link) else {
                    continue;
                };
                let pre_offset = &pre_frame.offsets()[pre_index];
                for inst in 0..offset.num_instances() {
                    for pre_inst in 0..pre_offset.num_instances() {
                        if !windows_overlap(frame, inst, pre_frame, pre_inst) {
                            continue;
                        }
                        for repl in 0..offset.num_replicas() {
                            for pre_repl in 0..pre_offset.num_replicas() {
                                let cur = vars.offsets[pos][index][inst][repl];
                                let prev = if pre_pos == usize::MAX {
                                    vars.reservation[pre_index][pre_inst]
                                } else {
                                    vars.offsets[pre_pos][pre_index][pre_inst][pre_repl]
                                };
                                vars.contention.push(ContentionPair {
                                    cur,
                                    prev,
                                    link,
                                    time_cur: offset.time() as f64,
                                    time_prev: pre_offset.time() as f64,
                                    x: p.add(variable().binary()),
                                    y: p.add(variable().binary()),
                                    one: p.add(variable().integer().min(1).max(1)),
                                });
                            }
                        }
                    }
                }
            }
        }
    }
}

/// Whether the reachable windows of two frame instances overlap (half-open intervals, shifted
/// by one slot).
fn windows_overlap(a: &Frame, inst_a: usize, b: &Frame, inst_b: usize) -> bool {
    let min1 = a.period() * inst_a as i64 + a.starting() + 1;
    let max1 = a.period() * inst_a as i64 + a.deadline() + 1;
    let min2 = b.period() * inst_b as i64 + b.starting() + 1;
    let max2 = b.period() * inst_b as i64 + b.deadline() + 1;
    (min1 <= min2 && min2 < max1) || (min2 <= min1 && min1 < max2)
}

/// The objective: maximize the weighted sum of all frame and link slacks.
fn objective(vars: &ModelVars) -> Expression {
    let frame: Expression = vars
        .frame_slack
        .values()
        .map(|&v| FRAME_SLACK_WEIGHT * v)
        .sum();
    let link: Expression = vars
        .link_slack
        .iter()
        .map(|&v| LINK_SLACK_WEIGHT * v)
        .sum();
    frame + link
}

/// Emit all constraint classes, logging the number of equations each class contributes.
fn setup_constraints(
    model: &mut CoinCbcProblem,
    vars: &ModelVars,
    net: &Network,
    batch: &Range<usize>,
) {
    let mut rows = model.as_inner().num_rows();

    path_dependent(model, vars, net, batch);
    let new_rows = model.as_inner().num_rows();
    debug!("{} equations for `path_dependent`", new_rows - rows);
    rows = new_rows;

    end_to_end(model, vars, net, batch);
    let new_rows = model.as_inner().num_rows();
    debug!("{} equations for `end_to_end`", new_rows - rows);
    rows = new_rows;

    contention_free(model, vars, net);
    let new_rows = model.as_inner().num_rows();
    debug!("{} equations for `contention_free`", new_rows - rows);

    debug!("{new_rows} total equations");
}

/// Consecutive hops of every path must be separated by the transmission duration plus the
/// minimum switch processing time, padded by the frame slack:
/// `s_next - s_cur - fd >= time_cur + switch_min_time`.
fn path_dependent(
    model: &mut impl SolverModel,
    vars: &ModelVars,
    net: &Network,
    batch: &Range<usize>,
) {
    let smt = net.switch_min_time();
    for pos in batch.clone() {
        let frame = &net.frames()[pos];
        let fd = vars.frame_slack[&pos];
        for path in frame.paths() {
            for (cur, next) in path.offsets().iter().copied().tuple_windows() {
                let distance = (frame.offsets()[cur].time() + smt) as f64;
                for inst in 0..frame.offsets()[cur].num_instances() {
                    let s_cur = vars.offsets[pos][cur][inst][0];
                    let s_next = vars.offsets[pos][next][inst][0];
                    model.add_constraint(constraint!(s_next - s_cur - fd >= distance));
                }
            }
        }
    }
}

/// Bound the first-to-last-hop latency of every path of every frame with an end-to-end bound,
/// and tighten the first and last hop against the window borders by the frame slack:
///
/// ```text
/// s_last - s_first          <= e2e - time_first
/// s_first - fd              >= starting + inst * period
/// s_last + fd               <= deadline + inst * period - time_last
/// ```
fn end_to_end(model: &mut impl SolverModel, vars: &ModelVars, net: &Network, batch: &Range<usize>) {
    for pos in batch.clone() {
        let frame = &net.frames()[pos];
        if frame.end_to_end() == 0 {
            continue;
        }
        let fd = vars.frame_slack[&pos];
        for path in frame.paths() {
            let first = path.offsets()[0];
            let last = path.offsets()[path.offsets().len() - 1];
            let time_first = frame.offsets()[first].time();
            let time_last = frame.offsets()[last].time();
            for inst in 0..frame.offsets()[first].num_instances() {
                let s_first = vars.offsets[pos][first][inst][0];
                let s_last = vars.offsets[pos][last][inst][0];
                let bound = (frame.end_to_end() - time_first) as f64;
                model.add_constraint(constraint!(s_last - s_first <= bound));
                let earliest = (frame.starting() + frame.period() * inst as i64) as f64;
                model.add_constraint(constraint!(s_first - fd >= earliest));
                let latest =
                    (frame.deadline() + frame.period() * inst as i64 - time_last) as f64;
                model.add_constraint(constraint!(s_last + fd <= latest));
            }
        }
    }
}

/// Emit the contention-freedom gadget for every enumerated pair: one of the two binaries must be
/// active, and the active one implies a link-slack-padded disjoint ordering of the two
/// transmissions.
fn contention_free(model: &mut impl SolverModel, vars: &ModelVars, net: &Network) {
    let big_m = 4.0 * net.hyperperiod() as f64;
    for pair in vars.contention.iter() {
        let ld = vars.link_slack[pair.link];
        or_all(model, pair.one, &[pair.x, pair.y]);
        indicator(
            model,
            pair.x,
            Expression::from(pair.prev) - pair.cur - ld,
            pair.time_cur,
            big_m,
        );
        indicator(
            model,
            pair.y,
            Expression::from(pair.cur) - pair.prev - ld,
            pair.time_prev,
            big_m,
        );
    }
}

/// Copy the solved start times of the batch frames back into their offsets.
fn save_offsets(
    net: &mut Network,
    vars: &ModelVars,
    batch: &Range<usize>,
    solution: &impl Solution,
) {
    for pos in batch.clone() {
        let frame = &mut net.frames_mut()[pos];
        for index in 0..frame.offsets().len() {
            let (instances, replicas) = {
                let offset = &frame.offsets()[index];
                (offset.num_instances(), offset.num_replicas())
            };
            for inst in 0..instances {
                for repl in 0..replicas {
                    let value = solution.value(vars.offsets[pos][index][inst][repl]).round() as i64;
                    debug_assert_ne!(value, UNSCHEDULED);
                    frame.offset_mut(index).set_transmission(inst, repl, value);
                }
            }
        }
    }
}
