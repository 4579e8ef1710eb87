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

//! The domain model and the network preparation pipeline.
//!
//! [`Network`] is the engine context: the topology (a directed graph of [`Node`]s and [`Link`]s),
//! the traffic registry, the optional SHP bandwidth reservation, and everything
//! [`Network::prepare`] derives from them: the hyperperiod, the materialized offset arenas, the
//! id-indexed accelerator arrays, and the time-slot normalization. It is created once per run and
//! threaded through every operation; nothing in this crate is process-global.

use std::collections::HashMap;

use log::{debug, info};
use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use thiserror::Error;

mod frame;
mod link;
mod node;

pub use frame::{Frame, FrameRole, FrameTiming, Offset, Path, UNSCHEDULED};
pub use link::{Link, LinkKind};
pub use node::{Node, NodeKind};

/// The periodic bandwidth reservation of the Self-Healing Protocol, in the time unit of the
/// surrounding document (nanoseconds before normalization, slots afterwards).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct SelfHealingProtocol {
    /// Period of the reservation; 0 disables the protocol.
    pub period: i64,
    /// Length of each reserved slot.
    pub time: i64,
}

/// Error produced while populating or preparing a [`Network`].
#[derive(Debug, Error)]
pub enum NetworkError {
    /// A link was declared with a non-positive speed.
    #[error("link {link} has a non-positive speed of {speed} MB/s")]
    NonPositiveSpeed {
        /// Offending link id.
        link: usize,
        /// Declared speed.
        speed: i64,
    },
    /// A frame was declared with a non-positive period.
    #[error("frame {frame} has a non-positive period of {period}")]
    NonPositivePeriod {
        /// Offending frame id.
        frame: usize,
        /// Declared period.
        period: i64,
    },
    /// A frame's deadline lies outside `[0, period]`.
    #[error("the deadline {deadline} of frame {frame} is negative or larger than its period")]
    InvalidDeadline {
        /// Offending frame id.
        frame: usize,
        /// Declared deadline.
        deadline: i64,
    },
    /// A frame was declared with a non-positive size.
    #[error("frame {frame} has a non-positive size of {size} bytes")]
    NonPositiveSize {
        /// Offending frame id.
        frame: usize,
        /// Declared size.
        size: i64,
    },
    /// A frame's starting time lies outside `[0, deadline)`.
    #[error("the starting time {starting} of frame {frame} is negative or not before its deadline")]
    InvalidStartingTime {
        /// Offending frame id.
        frame: usize,
        /// Declared starting time.
        starting: i64,
    },
    /// A frame's end-to-end delay lies outside `[0, deadline)`.
    #[error("the end-to-end delay {end_to_end} of frame {frame} is negative or not below its deadline")]
    InvalidEndToEnd {
        /// Offending frame id.
        frame: usize,
        /// Declared end-to-end delay.
        end_to_end: i64,
    },
    /// The switch minimum processing time is negative.
    #[error("the switch minimum time {0} is negative")]
    NegativeSwitchTime(i64),
    /// The SHP reservation parameters are inconsistent.
    #[error("the self-healing protocol reservation ({period}, {time}) is invalid")]
    InvalidReservation {
        /// Declared protocol period.
        period: i64,
        /// Declared reservation length.
        time: i64,
    },
    /// Two nodes share the same id.
    #[error("node id {0} is declared twice")]
    DuplicateNode(usize),
    /// Two connections share the same link id.
    #[error("link id {0} is emitted by more than one node")]
    DuplicateLink(usize),
    /// A connection references a node that does not exist.
    #[error("the connection references the undeclared node {0}")]
    UnknownNode(usize),
    /// A path references a link that does not exist.
    #[error("frame {frame} routes over the undeclared link {link}")]
    UnknownLink {
        /// Offending frame id.
        frame: usize,
        /// Undeclared link id.
        link: usize,
    },
    /// A path references a receiver the frame does not declare.
    #[error("frame {frame} has no receiver {receiver}")]
    UnknownReceiver {
        /// Offending frame id.
        frame: usize,
        /// Undeclared receiver id.
        receiver: usize,
    },
    /// A path was declared twice for the same receiver.
    #[error("frame {frame} declares two paths towards receiver {receiver}")]
    DuplicatePath {
        /// Offending frame id.
        frame: usize,
        /// Receiver with two paths.
        receiver: usize,
    },
    /// A path contains no links.
    #[error("the path of frame {frame} towards receiver {receiver} is empty")]
    EmptyPath {
        /// Offending frame id.
        frame: usize,
        /// Receiver of the empty path.
        receiver: usize,
    },
    /// Two frames share the same id.
    #[error("frame id {0} is declared twice")]
    DuplicateFrame(usize),
    /// The traffic description contains no frames.
    #[error("the traffic description contains no frames")]
    NoFrames,
    /// The least common multiple of all periods exceeds the integer range.
    #[error("the hyperperiod overflows while folding in the period {0}")]
    HyperperiodOverflow(i64),
    /// An operation that requires a prepared network was invoked too early.
    #[error("the network has not been prepared yet")]
    NotPrepared,
}

/// Greatest common divisor of two non-negative integers.
fn gcd(mut a: i64, mut b: i64) -> i64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// Least common multiple, failing on overflow.
fn lcm(a: i64, b: i64) -> Option<i64> {
    (a / gcd(a, b)).checked_mul(b)
}

/// The engine context: topology, traffic, SHP reservation, and every derived structure.
#[derive(Debug)]
pub struct Network {
    /// Minimum time a switch needs between receiving a frame and relaying it.
    switch_min_time: i64,
    /// The SHP reservation, `None` or `period == 0` when disabled.
    shp: Option<SelfHealingProtocol>,
    /// The topology. Edges are inserted in declaration order, so each node's outgoing
    /// connections keep the order of the input document.
    topology: DiGraph<Node, Link>,
    /// Node id to graph index, filled while populating.
    node_ids: HashMap<usize, NodeIndex>,
    /// Accelerator: node id to graph index, dense, built by [`Network::prepare`].
    node_lut: Vec<Option<NodeIndex>>,
    /// Accelerator: link id to graph edge, dense, built by [`Network::prepare`].
    link_lut: Vec<Option<EdgeIndex>>,
    /// Accelerator: frame id to position in `frames`, dense, built by [`Network::prepare`].
    frame_lut: Vec<Option<usize>>,
    /// All frames of the traffic description, in input order.
    frames: Vec<Frame>,
    /// The SHP reservation expanded into a pseudo-frame, built by [`Network::prepare`].
    reservation: Option<Frame>,
    /// Least common multiple of all frame periods, 0 until prepared.
    hyperperiod: i64,
    /// Length of one time slot in nanoseconds, 0 until prepared.
    timeslot: i64,
}

impl Network {
    /// Create an empty network. The switch minimum time is given in nanoseconds.
    pub fn new(switch_min_time: i64) -> Result<Self, NetworkError> {
        if switch_min_time < 0 {
            return Err(NetworkError::NegativeSwitchTime(switch_min_time));
        }
        Ok(Self {
            switch_min_time,
            shp: None,
            topology: DiGraph::new(),
            node_ids: HashMap::new(),
            node_lut: Vec::new(),
            link_lut: Vec::new(),
            frame_lut: Vec::new(),
            frames: Vec::new(),
            reservation: None,
            hyperperiod: 0,
            timeslot: 0,
        })
    }

    /// Enable the SHP bandwidth reservation. Period and time are given in nanoseconds; a period
    /// of 0 keeps the protocol disabled.
    pub fn set_self_healing_protocol(
        &mut self,
        shp: SelfHealingProtocol,
    ) -> Result<(), NetworkError> {
        if shp.period < 0 || shp.time < 0 || (shp.period > 0 && shp.time == 0) {
            return Err(NetworkError::InvalidReservation {
                period: shp.period,
                time: shp.time,
            });
        }
        self.shp = (shp.period > 0).then_some(shp);
        Ok(())
    }

    /// Declare a node.
    pub fn add_node(&mut self, node: Node) -> Result<(), NetworkError> {
        let id = node.id();
        if self.node_ids.contains_key(&id) {
            return Err(NetworkError::DuplicateNode(id));
        }
        let index = self.topology.add_node(node);
        self.node_ids.insert(id, index);
        Ok(())
    }

    /// Declare a connection: `link` leads from node `from` to node `to`. Both nodes must have
    /// been declared before.
    pub fn add_connection(
        &mut self,
        from: usize,
        to: usize,
        link: Link,
    ) -> Result<(), NetworkError> {
        let a = *self
            .node_ids
            .get(&from)
            .ok_or(NetworkError::UnknownNode(from))?;
        let b = *self
            .node_ids
            .get(&to)
            .ok_or(NetworkError::UnknownNode(to))?;
        self.topology.add_edge(a, b, link);
        Ok(())
    }

    /// Register a frame of the traffic description.
    pub fn add_frame(&mut self, frame: Frame) {
        self.frames.push(frame);
    }

    /// Minimum time a switch needs between receiving a frame and relaying it, in the current
    /// time unit.
    pub fn switch_min_time(&self) -> i64 {
        self.switch_min_time
    }

    /// The SHP reservation, if enabled. In slot units once the network is prepared.
    pub fn self_healing_protocol(&self) -> Option<SelfHealingProtocol> {
        self.shp
    }

    /// The reservation pseudo-frame, if the protocol is enabled and the network prepared.
    pub fn reservation(&self) -> Option<&Frame> {
        self.reservation.as_ref()
    }

    /// All frames in input order.
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Mutable access to all frames.
    pub fn frames_mut(&mut self) -> &mut [Frame] {
        &mut self.frames
    }

    /// Look up a frame by its external id.
    pub fn frame(&self, id: usize) -> Option<&Frame> {
        self.frame_lut
            .get(id)
            .copied()
            .flatten()
            .map(|i| &self.frames[i])
    }

    /// Look up a link by its external id.
    pub fn link(&self, id: usize) -> Option<&Link> {
        self.link_lut
            .get(id)
            .copied()
            .flatten()
            .map(|e| &self.topology[e])
    }

    /// Look up a node by its external id.
    pub fn node(&self, id: usize) -> Option<&Node> {
        self.node_lut
            .get(id)
            .copied()
            .flatten()
            .map(|n| &self.topology[n])
    }

    /// Number of nodes in the topology.
    pub fn num_nodes(&self) -> usize {
        self.topology.node_count()
    }

    /// Number of links in the topology.
    pub fn num_links(&self) -> usize {
        self.topology.edge_count()
    }

    /// Number of frames in the traffic description.
    pub fn num_frames(&self) -> usize {
        self.frames.len()
    }

    /// The highest declared link id. Meaningful once the network is prepared.
    pub fn higher_link_id(&self) -> usize {
        self.link_lut.len().saturating_sub(1)
    }

    /// The scheduling cycle length (lcm of all periods), in the current time unit. 0 until the
    /// network is prepared.
    pub fn hyperperiod(&self) -> i64 {
        self.hyperperiod
    }

    /// Length of one time slot in nanoseconds. 0 until the network is prepared.
    pub fn timeslot(&self) -> i64 {
        self.timeslot
    }

    /// Whether [`Network::prepare`] has completed.
    pub fn is_prepared(&self) -> bool {
        self.timeslot > 0
    }

    /// Prepare the network for scheduling.
    ///
    /// 1. Compute the hyperperiod as the running lcm over all frame periods.
    /// 2. Expand the SHP reservation into a pseudo-frame with one offset per link id in
    ///    `[0, higher_link_id]`.
    /// 3. Materialize every frame's offset arena from its paths.
    /// 4. Build the dense accelerator arrays for nodes, links and frames.
    /// 5. Compute each offset's transmission duration from the frame size and the link speed.
    /// 6. Reduce the time grid: divide every time-valued field by the gcd of all transmission
    ///    durations (and the reservation length), so that all further arithmetic runs on
    ///    integer slots.
    pub fn prepare(&mut self) -> Result<(), NetworkError> {
        if self.frames.is_empty() {
            return Err(NetworkError::NoFrames);
        }

        // accelerator arrays, dense in the external ids; unused cells stay empty
        let higher_node_id = self.node_ids.keys().copied().max().unwrap_or(0);
        self.node_lut = vec![None; higher_node_id + 1];
        for (&id, &index) in self.node_ids.iter() {
            self.node_lut[id] = Some(index);
        }
        let higher_link_id = self
            .topology
            .edge_indices()
            .map(|e| self.topology[e].id())
            .max()
            .unwrap_or(0);
        self.link_lut = vec![None; higher_link_id + 1];
        for e in self.topology.edge_indices() {
            let id = self.topology[e].id();
            if self.link_lut[id].replace(e).is_some() {
                return Err(NetworkError::DuplicateLink(id));
            }
        }
        let higher_frame_id = self.frames.iter().map(Frame::id).max().unwrap_or(0);
        self.frame_lut = vec![None; higher_frame_id + 1];
        for (pos, frame) in self.frames.iter().enumerate() {
            let id = frame.id();
            if self.frame_lut[id].replace(pos).is_some() {
                return Err(NetworkError::DuplicateFrame(id));
            }
        }

        // hyperperiod as running lcm over all periods
        let mut hyperperiod = 1i64;
        for frame in self.frames.iter() {
            hyperperiod = lcm(hyperperiod, frame.period())
                .ok_or(NetworkError::HyperperiodOverflow(frame.period()))?;
        }
        self.hyperperiod = hyperperiod;
        info!("hyperperiod is {hyperperiod} ns over {} frames", self.frames.len());

        // every path hop must reference a declared link
        for frame in self.frames.iter() {
            for path in frame.paths() {
                for &link in path.links() {
                    if self.link_lut.get(link).copied().flatten().is_none() {
                        return Err(NetworkError::UnknownLink {
                            frame: frame.id(),
                            link,
                        });
                    }
                }
            }
        }

        // expand the reservation over all link ids and materialize the traffic offsets
        self.reservation = self
            .shp
            .map(|shp| Frame::reservation(shp.period, shp.time, higher_link_id));
        for frame in self.frames.iter_mut() {
            frame.init_offsets(hyperperiod);
        }

        // transmission durations from size and link speed
        for frame in self.frames.iter_mut() {
            let size = frame.size();
            for index in 0..frame.offsets().len() {
                let link_id = frame.offsets()[index].link_id();
                let edge = self.link_lut[link_id].ok_or(NetworkError::UnknownLink {
                    frame: frame.id(),
                    link: link_id,
                })?;
                let time = self.topology[edge].transmission_time(size);
                frame.offset_mut(index).set_time(time);
            }
        }

        // reduce the time grid by the gcd of all durations
        let mut slot = 0i64;
        for frame in self.frames.iter() {
            for offset in frame.offsets() {
                slot = gcd(slot, offset.time());
            }
        }
        if let Some(shp) = self.shp {
            slot = gcd(slot, shp.time);
        }
        let slot = slot.max(1);
        debug!("reducing the time grid by a slot length of {slot} ns");

        self.hyperperiod /= slot;
        self.switch_min_time /= slot;
        for frame in self.frames.iter_mut() {
            frame.scale_down(slot);
        }
        if let Some(shp) = self.shp.as_mut() {
            shp.period /= slot;
            shp.time /= slot;
        }
        if let Some(reservation) = self.reservation.as_mut() {
            reservation.scale_down(slot);
            reservation.init_reservation_instances(self.hyperperiod);
        }
        self.timeslot = slot;

        info!(
            "prepared the network: {} slots of {} ns, {} nodes, {} links, {} frames",
            self.hyperperiod,
            slot,
            self.num_nodes(),
            self.num_links(),
            self.num_frames()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Two end systems connected through a switch, one frame over both links.
    fn linear_network() -> Network {
        let mut net = Network::new(200).unwrap();
        net.add_node(Node::new(0, NodeKind::EndSystem)).unwrap();
        net.add_node(Node::new(1, NodeKind::Switch)).unwrap();
        net.add_node(Node::new(2, NodeKind::EndSystem)).unwrap();
        net.add_connection(0, 1, Link::new(0, LinkKind::Wired, 1000).unwrap())
            .unwrap();
        net.add_connection(1, 2, Link::new(1, LinkKind::Wired, 1000).unwrap())
            .unwrap();
        let mut frame = Frame::new(
            0,
            0,
            vec![2],
            FrameTiming {
                period: 2000,
                deadline: 0,
                size: 100,
                starting: 0,
                end_to_end: 0,
            },
        )
        .unwrap();
        frame.add_path(2, vec![0, 1]).unwrap();
        net.add_frame(frame);
        net
    }

    #[test]
    fn prepare_normalizes_to_slots() {
        let mut net = linear_network();
        net.prepare().unwrap();
        // 100 B over 1000 MB/s take 100 ns, so the slot length is 100 ns.
        assert_eq!(net.timeslot(), 100);
        assert_eq!(net.hyperperiod(), 20);
        assert_eq!(net.switch_min_time(), 2);
        let frame = net.frame(0).unwrap();
        assert_eq!(frame.period(), 20);
        assert_eq!(frame.deadline(), 20);
        for offset in frame.offsets() {
            assert_eq!(offset.time(), 1);
            assert_eq!(offset.num_instances(), 1);
        }
    }

    #[test]
    fn reservation_expands_over_all_links() {
        let mut net = linear_network();
        net.set_self_healing_protocol(SelfHealingProtocol {
            period: 500,
            time: 100,
        })
        .unwrap();
        net.prepare().unwrap();
        let reservation = net.reservation().unwrap();
        assert_eq!(reservation.role(), FrameRole::Reservation);
        assert_eq!(reservation.offsets().len(), 2);
        // slot length 100 ns: the reservation repeats every 5 slots for 1 slot
        for offset in reservation.offsets() {
            assert_eq!(offset.num_instances(), 4);
            assert_eq!(offset.time(), 1);
            for inst in 0..4 {
                assert_eq!(offset.transmission(inst, 0), 5 * inst as i64);
            }
        }
    }

    #[test]
    fn unknown_link_is_rejected() {
        let mut net = linear_network();
        let mut frame = Frame::new(
            1,
            0,
            vec![2],
            FrameTiming {
                period: 2000,
                deadline: 0,
                size: 100,
                starting: 0,
                end_to_end: 0,
            },
        )
        .unwrap();
        frame.add_path(2, vec![0, 7]).unwrap();
        net.add_frame(frame);
        assert!(matches!(
            net.prepare(),
            Err(NetworkError::UnknownLink { frame: 1, link: 7 })
        ));
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let mut net = linear_network();
        assert!(matches!(
            net.add_node(Node::new(1, NodeKind::Switch)),
            Err(NetworkError::DuplicateNode(1))
        ));
        let mut frame = Frame::new(
            0,
            0,
            vec![2],
            FrameTiming {
                period: 1000,
                deadline: 0,
                size: 100,
                starting: 0,
                end_to_end: 0,
            },
        )
        .unwrap();
        frame.add_path(2, vec![0]).unwrap();
        net.add_frame(frame);
        assert!(matches!(
            net.prepare(),
            Err(NetworkError::DuplicateFrame(0))
        ));
    }

    #[test]
    fn hyperperiod_overflow_is_reported() {
        let mut net = Network::new(0).unwrap();
        net.add_node(Node::new(0, NodeKind::EndSystem)).unwrap();
        net.add_node(Node::new(1, NodeKind::EndSystem)).unwrap();
        net.add_connection(0, 1, Link::new(0, LinkKind::Wired, 1000).unwrap())
            .unwrap();
        for (id, period) in [(0, i64::MAX - 1), (1, i64::MAX - 2)] {
            let mut frame = Frame::new(
                id,
                0,
                vec![1],
                FrameTiming {
                    period,
                    deadline: 0,
                    size: 100,
                    starting: 0,
                    end_to_end: 0,
                },
            )
            .unwrap();
            frame.add_path(1, vec![0]).unwrap();
            net.add_frame(frame);
        }
        assert!(matches!(
            net.prepare(),
            Err(NetworkError::HyperperiodOverflow(_))
        ));
    }
}
