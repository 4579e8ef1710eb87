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

//! Independent verification of a produced schedule.
//!
//! The validator knows nothing about the solver or the constraint formulation: it re-reads the
//! stored transmission times and re-checks the scheduling invariants from first principles
//! (window containment, contention-freedom, SHP avoidance, path dependency, end-to-end bound).
//! It runs after every driver; a violation means a bug in the constraint emission or a
//! misconfigured solver, never a property of the input, so the driver fails without producing
//! output. All transmission windows are half-open `[start, start + time)` intervals.

use thiserror::Error;

use crate::network::{Frame, Network, UNSCHEDULED};

/// A violation of the scheduling invariants, with the offset cell that exposes it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScheduleViolation {
    /// An offset cell was never assigned a transmission time.
    #[error("frame {frame} has no transmission time on link {link} (instance {instance}, replica {replica})")]
    Unscheduled {
        /// Frame id of the cell.
        frame: usize,
        /// Link id of the cell.
        link: usize,
        /// Instance of the cell.
        instance: usize,
        /// Replica of the cell.
        replica: usize,
    },
    /// A transmission lies outside `[period * inst + starting, period * inst + deadline - time]`.
    #[error("the transmission time of frame {frame} on link {link} (instance {instance}, replica {replica}) lies outside its window")]
    OutsideWindow {
        /// Frame id of the cell.
        frame: usize,
        /// Link id of the cell.
        link: usize,
        /// Instance of the cell.
        instance: usize,
        /// Replica of the cell.
        replica: usize,
    },
    /// A transmission overlaps a reserved SHP slot.
    #[error("frame {frame} collides with the self-healing protocol on link {link} (instance {instance}, replica {replica})")]
    ReservationCollision {
        /// Frame id of the cell.
        frame: usize,
        /// Link id of the cell.
        link: usize,
        /// Instance of the cell.
        instance: usize,
        /// Replica of the cell.
        replica: usize,
    },
    /// Two transmissions overlap on the same link.
    #[error("frames {frame} and {other} collide on link {link} (instance {instance}, replica {replica})")]
    Collision {
        /// Frame id of the later cell.
        frame: usize,
        /// Frame id of the earlier cell.
        other: usize,
        /// Link id both cells transmit on.
        link: usize,
        /// Instance of the later cell.
        instance: usize,
        /// Replica of the later cell.
        replica: usize,
    },
    /// Two consecutive hops of a path are closer than the transmission duration plus the switch
    /// minimum time.
    #[error("frame {frame} hops from link {link} to link {next_link} too early (instance {instance})")]
    PathDependency {
        /// Frame id.
        frame: usize,
        /// Link of the earlier hop.
        link: usize,
        /// Link of the later hop.
        next_link: usize,
        /// Instance of the transmission.
        instance: usize,
    },
    /// The first-to-last-hop latency of a path exceeds the end-to-end bound.
    #[error("frame {frame} exceeds its end-to-end delay towards receiver {receiver} (instance {instance})")]
    EndToEndExceeded {
        /// Frame id.
        frame: usize,
        /// Receiver of the path.
        receiver: usize,
        /// Instance of the transmission.
        instance: usize,
    },
}

/// Verify the schedule of the whole network, reporting the first violation found.
///
/// The check is deterministic and read-only; running it twice on the same schedule yields the
/// same verdict.
pub fn check_schedule(net: &Network) -> Result<(), ScheduleViolation> {
    for (pos, frame) in net.frames().iter().enumerate() {
        check_windows(frame)?;
        check_reservation(net, frame)?;
        check_collisions(net, frame, pos)?;
        check_paths(net, frame)?;
    }
    Ok(())
}

/// Every cell must be scheduled within
/// `[period * inst + starting, period * inst + deadline - time]` (invariant on the feasible
/// window of each instance).
fn check_windows(frame: &Frame) -> Result<(), ScheduleViolation> {
    for offset in frame.offsets() {
        for inst in 0..offset.num_instances() {
            for repl in 0..offset.num_replicas() {
                let s = offset.transmission(inst, repl);
                if s == UNSCHEDULED {
                    return Err(ScheduleViolation::Unscheduled {
                        frame: frame.id(),
                        link: offset.link_id(),
                        instance: inst,
                        replica: repl,
                    });
                }
                let lb = frame.period() * inst as i64 + frame.starting();
                let ub = frame.period() * inst as i64 + frame.deadline() - offset.time();
                if s < lb || s > ub {
                    return Err(ScheduleViolation::OutsideWindow {
                        frame: frame.id(),
                        link: offset.link_id(),
                        instance: inst,
                        replica: repl,
                    });
                }
            }
        }
    }
    Ok(())
}

/// No transmission may overlap a reserved SHP slot on its link.
fn check_reservation(net: &Network, frame: &Frame) -> Result<(), ScheduleViolation> {
    let Some(reservation) = net.reservation() else {
        return Ok(());
    };
    for offset in frame.offsets() {
        let Some(prot) = reservation.offset_by_link(offset.link_id()) else {
            continue;
        };
        for inst in 0..offset.num_instances() {
            for repl in 0..offset.num_replicas() {
                let s = offset.transmission(inst, repl);
                for prot_inst in 0..prot.num_instances() {
                    let p = prot.transmission(prot_inst, 0);
                    if p < s + offset.time() && s < p + prot.time() {
                        return Err(ScheduleViolation::ReservationCollision {
                            frame: frame.id(),
                            link: offset.link_id(),
                            instance: inst,
                            replica: repl,
                        });
                    }
                }
            }
        }
    }
    Ok(())
}

/// No two transmissions of different frames may overlap on the same link.
fn check_collisions(net: &Network, frame: &Frame, pos: usize) -> Result<(), ScheduleViolation> {
    for offset in frame.offsets() {
        for pre_frame in net.frames()[..pos].iter() {
            let Some(pre_offset) = pre_frame.offset_by_link(offset.link_id()) else {
                continue;
            };
            for inst in 0..offset.num_instances() {
                for repl in 0..offset.num_replicas() {
                    let s = offset.transmission(inst, repl);
                    for pre_inst in 0..pre_offset.num_instances() {
                        for pre_repl in 0..pre_offset.num_replicas() {
                            let p = pre_offset.transmission(pre_inst, pre_repl);
                            if p < s + offset.time() && s < p + pre_offset.time() {
                                return Err(ScheduleViolation::Collision {
                                    frame: frame.id(),
                                    other: pre_frame.id(),
                                    link: offset.link_id(),
                                    instance: inst,
                                    replica: repl,
                                });
                            }
                        }
                    }
                }
            }
        }
    }
    Ok(())
}

/// Consecutive hops of every path must respect the switch minimum time, and paths with an
/// end-to-end bound must meet it.
fn check_paths(net: &Network, frame: &Frame) -> Result<(), ScheduleViolation> {
    let smt = net.switch_min_time();
    for path in frame.paths() {
        for pair in path.offsets().windows(2) {
            let (cur, next) = (&frame.offsets()[pair[0]], &frame.offsets()[pair[1]]);
            for inst in 0..cur.num_instances() {
                if next.transmission(inst, 0) - cur.transmission(inst, 0) < cur.time() + smt {
                    return Err(ScheduleViolation::PathDependency {
                        frame: frame.id(),
                        link: cur.link_id(),
                        next_link: next.link_id(),
                        instance: inst,
                    });
                }
            }
        }
        if frame.end_to_end() > 0 {
            let first = &frame.offsets()[path.offsets()[0]];
            let last = &frame.offsets()[path.offsets()[path.offsets().len() - 1]];
            for inst in 0..first.num_instances() {
                let latency = last.transmission(inst, 0) - first.transmission(inst, 0);
                if latency > frame.end_to_end() - first.time() {
                    return Err(ScheduleViolation::EndToEndExceeded {
                        frame: frame.id(),
                        receiver: path.receiver(),
                        instance: inst,
                    });
                }
            }
        }
    }
    Ok(())
}
