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

//! The traffic primitives: a periodic multicast [`Frame`], its per-receiver [`Path`]s, and the
//! per-link [`Offset`] grids that receive the scheduled transmission times.
//!
//! A frame transmits at most once per link, even when several receivers share a hop of the
//! multicast tree. All offsets of a frame therefore live in a single arena (`Frame::offsets`, in
//! insertion order); the link-keyed lookup and every path's per-hop reference are indices into
//! that arena.

use std::collections::HashMap;

use super::NetworkError;

/// Sentinel for a transmission time that has not been assigned yet.
pub const UNSCHEDULED: i64 = -1;

/// Whether a frame carries real traffic or models the periodic SHP bandwidth reservation.
///
/// Reservation frames take part in the contention constraints like any other frame, but their
/// transmission times are pre-fixed to `instance * period` instead of being decided by the
/// solver.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum FrameRole {
    /// A real frame of the traffic description.
    Traffic,
    /// The pseudo-frame expanded from the SHP bandwidth reservation.
    Reservation,
}

/// The transmission schedule of one frame on one link.
///
/// An offset holds one start time per `(instance, replica)` cell. Instances repeat the frame
/// every period within the hyperperiod; replicas are wireless retransmission copies (always 1
/// for wired links, the dimension is reserved).
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Offset {
    /// Identifier of the link this offset transmits on.
    link_id: usize,
    /// Number of time units needed to transmit on this link. Nanoseconds until the network is
    /// normalized, time slots afterwards. [`UNSCHEDULED`] until computed.
    time: i64,
    /// Number of instances (hyperperiod / period of the owning frame).
    num_instances: usize,
    /// Number of replicas (1 unless the link is wireless).
    num_replicas: usize,
    /// Scheduled start times, `[instance][replica]`, [`UNSCHEDULED`] until solved.
    transmission: Vec<Vec<i64>>,
}

impl Offset {
    /// Create an offset with every cell unscheduled.
    fn new(link_id: usize, num_instances: usize, num_replicas: usize) -> Self {
        Self {
            link_id,
            time: UNSCHEDULED,
            num_instances,
            num_replicas,
            transmission: vec![vec![UNSCHEDULED; num_replicas]; num_instances],
        }
    }

    /// Identifier of the link this offset transmits on.
    pub fn link_id(&self) -> usize {
        self.link_id
    }

    /// Number of time units needed to transmit on this link.
    pub fn time(&self) -> i64 {
        self.time
    }

    /// Overwrite the transmission duration.
    pub(super) fn set_time(&mut self, time: i64) {
        self.time = time;
    }

    /// Number of instances of this offset.
    pub fn num_instances(&self) -> usize {
        self.num_instances
    }

    /// Number of replicas of this offset.
    pub fn num_replicas(&self) -> usize {
        self.num_replicas
    }

    /// The scheduled start of the given cell, [`UNSCHEDULED`] if not solved yet.
    pub fn transmission(&self, instance: usize, replica: usize) -> i64 {
        self.transmission[instance][replica]
    }

    /// Store the scheduled start of the given cell.
    pub fn set_transmission(&mut self, instance: usize, replica: usize, time: i64) {
        self.transmission[instance][replica] = time;
    }

    /// Divide the duration and every scheduled cell by the time-slot length.
    fn scale_down(&mut self, slot: i64) {
        if self.time != UNSCHEDULED {
            self.time /= slot;
        }
        for row in self.transmission.iter_mut() {
            for cell in row.iter_mut() {
                if *cell != UNSCHEDULED {
                    *cell /= slot;
                }
            }
        }
    }
}

/// The route from a frame's sender to one of its receivers: an ordered sequence of link ids,
/// paralleled (after offset materialization) by the indices of the corresponding offsets in the
/// owning frame's arena.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Path {
    /// The receiver this path leads to.
    receiver: usize,
    /// Ordered link ids from the sender to the receiver.
    links: Vec<usize>,
    /// For every hop, the index of its offset in `Frame::offsets`. Empty until the frame's
    /// offsets are materialized.
    offsets: Vec<usize>,
}

impl Path {
    /// The receiver this path leads to.
    pub fn receiver(&self) -> usize {
        self.receiver
    }

    /// Ordered link ids from the sender to the receiver.
    pub fn links(&self) -> &[usize] {
        &self.links
    }

    /// For every hop, the index of its offset in the owning frame's arena.
    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }
}

/// Timing and size parameters of a frame, in nanoseconds and bytes.
///
/// The fields follow the conventions of the input document: `deadline == 0` means the period,
/// `end_to_end == 0` disables the end-to-end bound.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct FrameTiming {
    /// Period of the frame, > 0.
    pub period: i64,
    /// Deadline of the frame; 0 selects the period.
    pub deadline: i64,
    /// Size of the frame in bytes, > 0.
    pub size: i64,
    /// Earliest transmission time within the period.
    pub starting: i64,
    /// Maximum delay between the first and the last hop; 0 disables the bound.
    pub end_to_end: i64,
}

/// A periodic multicast frame.
///
/// Frames are created from the traffic description, receive their offset arena in
/// [`Network::prepare`](super::Network::prepare), and their transmission times from the
/// scheduler. The SHP bandwidth reservation is represented by a frame as well (see
/// [`FrameRole`]), so the contention constraints treat both uniformly.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Frame {
    /// External identifier of the frame.
    id: usize,
    /// Whether this frame is real traffic or the SHP reservation.
    role: FrameRole,
    /// Node id of the sender.
    sender: usize,
    /// Node ids of all receivers, one per path.
    receivers: Vec<usize>,
    /// Size of the frame in bytes. For a reservation frame this carries the reservation length.
    size: i64,
    /// Period of the frame.
    period: i64,
    /// Deadline of the frame, `starting < deadline <= period`.
    deadline: i64,
    /// Earliest transmission time within the period.
    starting: i64,
    /// Maximum first-hop-to-last-hop delay, 0 if unbounded.
    end_to_end: i64,
    /// One path per receiver.
    paths: Vec<Path>,
    /// Offset arena, in insertion order of the first encounter of each link.
    offsets: Vec<Offset>,
    /// Link id to arena index.
    by_link: HashMap<usize, usize>,
}

impl Frame {
    /// Create a new traffic frame, validating all timing parameters.
    pub fn new(
        id: usize,
        sender: usize,
        receivers: Vec<usize>,
        timing: FrameTiming,
    ) -> Result<Self, NetworkError> {
        if timing.period <= 0 {
            return Err(NetworkError::NonPositivePeriod {
                frame: id,
                period: timing.period,
            });
        }
        if timing.deadline < 0 || timing.deadline > timing.period {
            return Err(NetworkError::InvalidDeadline {
                frame: id,
                deadline: timing.deadline,
            });
        }
        let deadline = if timing.deadline == 0 {
            timing.period
        } else {
            timing.deadline
        };
        if timing.size <= 0 {
            return Err(NetworkError::NonPositiveSize {
                frame: id,
                size: timing.size,
            });
        }
        if timing.starting < 0 || timing.starting >= deadline {
            return Err(NetworkError::InvalidStartingTime {
                frame: id,
                starting: timing.starting,
            });
        }
        if timing.end_to_end < 0 || timing.end_to_end >= deadline {
            return Err(NetworkError::InvalidEndToEnd {
                frame: id,
                end_to_end: timing.end_to_end,
            });
        }
        Ok(Self {
            id,
            role: FrameRole::Traffic,
            sender,
            receivers,
            size: timing.size,
            period: timing.period,
            deadline,
            starting: timing.starting,
            end_to_end: timing.end_to_end,
            paths: Vec::new(),
            offsets: Vec::new(),
            by_link: HashMap::new(),
        })
    }

    /// Create the pseudo-frame for the SHP bandwidth reservation.
    ///
    /// The reservation transmits `time` nanoseconds every `period` on *every* link id in
    /// `[0, higher_link_id]`; its starts are fixed to `instance * period` once the network is
    /// normalized.
    pub(super) fn reservation(period: i64, time: i64, higher_link_id: usize) -> Self {
        let mut frame = Self {
            id: usize::MAX,
            role: FrameRole::Reservation,
            sender: usize::MAX,
            receivers: Vec::new(),
            size: time,
            period,
            deadline: period,
            starting: 0,
            end_to_end: 0,
            paths: Vec::new(),
            offsets: Vec::new(),
            by_link: HashMap::new(),
        };
        for link_id in 0..=higher_link_id {
            let mut offset = Offset::new(link_id, 0, 1);
            offset.set_time(time);
            frame.by_link.insert(link_id, frame.offsets.len());
            frame.offsets.push(offset);
        }
        frame
    }

    /// External identifier of the frame.
    pub fn id(&self) -> usize {
        self.id
    }

    /// Whether this frame is real traffic or the SHP reservation.
    pub fn role(&self) -> FrameRole {
        self.role
    }

    /// Node id of the sender.
    pub fn sender(&self) -> usize {
        self.sender
    }

    /// Node ids of all receivers.
    pub fn receivers(&self) -> &[usize] {
        &self.receivers
    }

    /// Size of the frame in bytes.
    pub fn size(&self) -> i64 {
        self.size
    }

    /// Period of the frame.
    pub fn period(&self) -> i64 {
        self.period
    }

    /// Deadline of the frame.
    pub fn deadline(&self) -> i64 {
        self.deadline
    }

    /// Earliest transmission time within the period.
    pub fn starting(&self) -> i64 {
        self.starting
    }

    /// Maximum first-hop-to-last-hop delay, 0 if unbounded.
    pub fn end_to_end(&self) -> i64 {
        self.end_to_end
    }

    /// All paths of the frame, one per receiver.
    pub fn paths(&self) -> &[Path] {
        &self.paths
    }

    /// The offset arena in insertion order.
    pub fn offsets(&self) -> &[Offset] {
        &self.offsets
    }

    /// Mutable access to an offset by arena index.
    pub fn offset_mut(&mut self, index: usize) -> &mut Offset {
        &mut self.offsets[index]
    }

    /// Look up the offset transmitting on `link_id`, if this frame uses that link.
    pub fn offset_by_link(&self, link_id: usize) -> Option<&Offset> {
        self.by_link.get(&link_id).map(|&i| &self.offsets[i])
    }

    /// Arena index of the offset transmitting on `link_id`, if this frame uses that link.
    pub fn offset_index_by_link(&self, link_id: usize) -> Option<usize> {
        self.by_link.get(&link_id).copied()
    }

    /// Add the path towards `receiver`. The receiver must be declared on the frame and the path
    /// must contain at least one link.
    pub fn add_path(&mut self, receiver: usize, links: Vec<usize>) -> Result<(), NetworkError> {
        if links.is_empty() {
            return Err(NetworkError::EmptyPath {
                frame: self.id,
                receiver,
            });
        }
        if !self.receivers.contains(&receiver) {
            return Err(NetworkError::UnknownReceiver {
                frame: self.id,
                receiver,
            });
        }
        if self.paths.iter().any(|p| p.receiver == receiver) {
            return Err(NetworkError::DuplicatePath {
                frame: self.id,
                receiver,
            });
        }
        self.paths.push(Path {
            receiver,
            links,
            offsets: Vec::new(),
        });
        Ok(())
    }

    /// Materialize the offset arena from the paths.
    ///
    /// The first encounter of a link id creates its offset; later encounters (receivers sharing
    /// a hop of the multicast tree) reuse it, so the frame transmits only once per link. Every
    /// path's offset list ends up parallel to its link sequence.
    pub(super) fn init_offsets(&mut self, hyperperiod: i64) {
        let instances = (hyperperiod / self.period) as usize;
        for path in self.paths.iter_mut() {
            path.offsets.clear();
            for &link_id in path.links.iter() {
                let index = *self.by_link.entry(link_id).or_insert_with(|| {
                    self.offsets.push(Offset::new(link_id, instances, 1));
                    self.offsets.len() - 1
                });
                path.offsets.push(index);
            }
        }
    }

    /// Materialize the reservation grid: `hyperperiod / period` instances per link, each start
    /// fixed to `instance * period`.
    pub(super) fn init_reservation_instances(&mut self, hyperperiod: i64) {
        let instances = (hyperperiod / self.period) as usize;
        let period = self.period;
        for offset in self.offsets.iter_mut() {
            offset.num_instances = instances;
            offset.transmission = vec![vec![UNSCHEDULED; offset.num_replicas]; instances];
            for inst in 0..instances {
                offset.set_transmission(inst, 0, period * inst as i64);
            }
        }
    }

    /// Divide every time-valued field of the frame and its offsets by the time-slot length.
    pub(super) fn scale_down(&mut self, slot: i64) {
        self.period /= slot;
        self.deadline /= slot;
        self.starting /= slot;
        self.end_to_end /= slot;
        if self.role == FrameRole::Reservation {
            self.size /= slot;
        }
        for offset in self.offsets.iter_mut() {
            offset.scale_down(slot);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A frame with two receivers sharing the first hop.
    fn multicast_frame() -> Frame {
        let mut frame = Frame::new(
            0,
            0,
            vec![2, 3],
            FrameTiming {
                period: 1000,
                deadline: 0,
                size: 100,
                starting: 0,
                end_to_end: 0,
            },
        )
        .unwrap();
        frame.add_path(2, vec![0, 1]).unwrap();
        frame.add_path(3, vec![0, 2]).unwrap();
        frame
    }

    #[test]
    fn deadline_defaults_to_period() {
        let frame = multicast_frame();
        assert_eq!(frame.deadline(), 1000);
    }

    #[test]
    fn shared_hops_reuse_offsets() {
        let mut frame = multicast_frame();
        frame.init_offsets(2000);
        // Links 0, 1 and 2 yield three offsets although the paths list four hops in total.
        assert_eq!(frame.offsets().len(), 3);
        assert_eq!(frame.paths()[0].offsets()[0], frame.paths()[1].offsets()[0]);
        // Two instances within the hyperperiod of 2000.
        assert_eq!(frame.offsets()[0].num_instances(), 2);
        assert!(frame.offset_by_link(1).is_some());
        assert!(frame.offset_by_link(7).is_none());
    }

    #[test]
    fn timing_validation() {
        let receivers = vec![1];
        let base = FrameTiming {
            period: 1000,
            deadline: 0,
            size: 100,
            starting: 0,
            end_to_end: 0,
        };
        assert!(Frame::new(0, 0, receivers.clone(), FrameTiming { period: 0, ..base }).is_err());
        assert!(Frame::new(
            0,
            0,
            receivers.clone(),
            FrameTiming {
                deadline: 2000,
                ..base
            }
        )
        .is_err());
        assert!(Frame::new(0, 0, receivers.clone(), FrameTiming { size: 0, ..base }).is_err());
        assert!(Frame::new(
            0,
            0,
            receivers.clone(),
            FrameTiming {
                starting: 1000,
                ..base
            }
        )
        .is_err());
        assert!(Frame::new(
            0,
            0,
            receivers,
            FrameTiming {
                end_to_end: 1000,
                ..base
            }
        )
        .is_err());
    }

    #[test]
    fn paths_are_validated() {
        let mut frame = multicast_frame();
        assert!(frame.add_path(9, vec![0]).is_err());
        assert!(frame.add_path(2, vec![]).is_err());
        assert!(frame.add_path(2, vec![0, 1]).is_err());
    }

    #[test]
    fn reservation_grid_is_prefixed() {
        let mut frame = Frame::reservation(500, 100, 2);
        frame.init_reservation_instances(1000);
        assert_eq!(frame.offsets().len(), 3);
        for offset in frame.offsets() {
            assert_eq!(offset.num_instances(), 2);
            assert_eq!(offset.transmission(0, 0), 0);
            assert_eq!(offset.transmission(1, 0), 500);
            assert_eq!(offset.time(), 100);
        }
    }
}
