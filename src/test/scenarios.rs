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

//! Scheduling scenarios on small hand-built networks, solved through the real CBC backend and
//! checked against the invariants the schedule must satisfy.

use test_log::test;

use crate::network::{
    Frame, FrameTiming, Link, LinkKind, Network, Node, NodeKind, SelfHealingProtocol,
};
use crate::scheduler::{schedule_network, Algorithm, ScheduleParams, SchedulerError};

/// A chain of `links + 1` nodes (end system, switches, end system) with one wired link of the
/// given speed between each pair.
fn chain(links: usize, speed: i64, switch_min_time: i64) -> Network {
    let mut net = Network::new(switch_min_time).unwrap();
    net.add_node(Node::new(0, NodeKind::EndSystem)).unwrap();
    for id in 1..links {
        net.add_node(Node::new(id, NodeKind::Switch)).unwrap();
    }
    net.add_node(Node::new(links, NodeKind::EndSystem)).unwrap();
    for id in 0..links {
        net.add_connection(id, id + 1, Link::new(id, LinkKind::Wired, speed).unwrap())
            .unwrap();
    }
    net
}

/// A frame from node 0 to the last node of the chain, over all links in order.
fn chain_frame(id: usize, links: usize, timing: FrameTiming) -> Frame {
    let mut frame = Frame::new(id, 0, vec![links], timing).unwrap();
    frame.add_path(links, (0..links).collect()).unwrap();
    frame
}

/// Default parameters: one-shot, exact, ten seconds.
fn params() -> ScheduleParams {
    ScheduleParams {
        algorithm: Algorithm::OneShot,
        mip_gap: 0.0,
        time_limit: 10.0,
    }
}

#[test]
fn trivial_single_frame() {
    let mut net = chain(1, 1000, 0);
    net.add_frame(chain_frame(
        0,
        1,
        FrameTiming {
            period: 1000,
            deadline: 1000,
            size: 100,
            starting: 0,
            end_to_end: 0,
        },
    ));
    net.prepare().unwrap();

    // 100 B over 1000 MB/s take 100 ns, so everything reduces by a 100 ns slot
    assert_eq!(net.timeslot(), 100);
    assert_eq!(net.hyperperiod(), 10);
    let offset = &net.frames()[0].offsets()[0];
    assert_eq!(offset.time(), 1);
    assert_eq!(offset.num_instances(), 1);

    schedule_network(&mut net, &params()).unwrap();
    let s = net.frames()[0].offsets()[0].transmission(0, 0);
    assert!((0..=9).contains(&s), "scheduled at {s}");
}

#[test]
fn path_dependency_is_respected() {
    let mut net = chain(2, 1000, 200);
    net.add_frame(chain_frame(
        0,
        2,
        FrameTiming {
            period: 2000,
            deadline: 0,
            size: 100,
            starting: 0,
            end_to_end: 0,
        },
    ));
    net.prepare().unwrap();
    schedule_network(&mut net, &params()).unwrap();

    // slots of 100 ns: the second hop starts at least 100 + 200 ns after the first
    let frame = &net.frames()[0];
    let s0 = frame.offsets()[0].transmission(0, 0);
    let s1 = frame.offsets()[1].transmission(0, 0);
    assert!(s1 - s0 >= 3, "hops at {s0} and {s1}");
}

#[test]
fn contending_frames_are_disjoint() {
    let mut net = chain(1, 1000, 0);
    for id in 0..2 {
        net.add_frame(chain_frame(
            id,
            1,
            FrameTiming {
                period: 1000,
                deadline: 0,
                size: 100,
                starting: 0,
                end_to_end: 0,
            },
        ));
    }
    net.prepare().unwrap();
    schedule_network(&mut net, &params()).unwrap();

    let a = net.frames()[0].offsets()[0].transmission(0, 0);
    let b = net.frames()[1].offsets()[0].transmission(0, 0);
    assert!((a - b).abs() >= 1, "transmissions at {a} and {b}");
    assert!((0..10).contains(&a));
    assert!((0..10).contains(&b));
}

#[test]
fn incremental_matches_the_contention_scenario() {
    let mut net = chain(1, 1000, 0);
    for id in 0..2 {
        net.add_frame(chain_frame(
            id,
            1,
            FrameTiming {
                period: 1000,
                deadline: 0,
                size: 100,
                starting: 0,
                end_to_end: 0,
            },
        ));
    }
    net.prepare().unwrap();
    let params = ScheduleParams {
        algorithm: Algorithm::Incremental {
            frames_per_iteration: 1,
        },
        ..params()
    };
    schedule_network(&mut net, &params).unwrap();

    let a = net.frames()[0].offsets()[0].transmission(0, 0);
    let b = net.frames()[1].offsets()[0].transmission(0, 0);
    assert!((a - b).abs() >= 1, "transmissions at {a} and {b}");
}

#[test]
fn reservation_blocks_its_slots() {
    let mut net = chain(1, 1000, 0);
    net.set_self_healing_protocol(SelfHealingProtocol {
        period: 500,
        time: 100,
    })
    .unwrap();
    net.add_frame(chain_frame(
        0,
        1,
        FrameTiming {
            period: 1000,
            deadline: 0,
            size: 100,
            starting: 0,
            end_to_end: 0,
        },
    ));
    net.prepare().unwrap();
    schedule_network(&mut net, &params()).unwrap();

    // slots of 100 ns: the reservation occupies [0, 1) and [5, 6) in every 10-slot cycle
    let s = net.frames()[0].offsets()[0].transmission(0, 0);
    assert!(s != 0 && s != 5, "scheduled into the reservation at {s}");
}

#[test]
fn impossible_end_to_end_bound_is_infeasible() {
    let mut net = chain(3, 1000, 200);
    // three hops of 100 ns plus two switch delays of 200 ns need 700 ns end to end
    net.add_frame(chain_frame(
        0,
        3,
        FrameTiming {
            period: 2000,
            deadline: 0,
            size: 100,
            starting: 0,
            end_to_end: 400,
        },
    ));
    net.prepare().unwrap();
    let result = schedule_network(&mut net, &params());
    assert!(
        matches!(result, Err(SchedulerError::Infeasible { iteration: 0, .. })),
        "expected infeasibility, got {result:?}"
    );
}

#[test]
fn slot_schedule_holds_in_nanoseconds() {
    let mut net = chain(2, 1000, 200);
    for id in 0..2 {
        net.add_frame(chain_frame(
            id,
            2,
            FrameTiming {
                period: 2000,
                deadline: 0,
                size: 100,
                starting: 0,
                end_to_end: 1000,
            },
        ));
    }
    net.prepare().unwrap();
    schedule_network(&mut net, &params()).unwrap();

    // multiplying every slot value by the slot length recovers a valid nanosecond schedule
    let slot = net.timeslot();
    let smt_ns = net.switch_min_time() * slot;
    for frame in net.frames() {
        let deadline_ns = frame.deadline() * slot;
        for path in frame.paths() {
            let hops: Vec<(i64, i64)> = path
                .offsets()
                .iter()
                .map(|&i| {
                    let offset = &frame.offsets()[i];
                    (offset.transmission(0, 0) * slot, offset.time() * slot)
                })
                .collect();
            for pair in hops.windows(2) {
                assert!(pair[1].0 >= pair[0].0 + pair[0].1 + smt_ns);
            }
            let (first, last) = (hops[0], hops[hops.len() - 1]);
            assert!(last.0 - first.0 <= frame.end_to_end() * slot - first.1);
            assert!(last.0 + last.1 <= deadline_ns);
        }
    }
}

#[test]
fn scheduling_requires_a_prepared_network() {
    let mut net = chain(1, 1000, 0);
    net.add_frame(chain_frame(
        0,
        1,
        FrameTiming {
            period: 1000,
            deadline: 0,
            size: 100,
            starting: 0,
            end_to_end: 0,
        },
    ));
    // prepare() was never called
    let result = schedule_network(&mut net, &params());
    assert!(matches!(result, Err(SchedulerError::Network(_))));
}

#[test]
fn incremental_schedules_partial_batches() {
    let mut net = chain(1, 1000, 0);
    for id in 0..3 {
        net.add_frame(chain_frame(
            id,
            1,
            FrameTiming {
                period: 1000,
                deadline: 0,
                size: 100,
                starting: 0,
                end_to_end: 0,
            },
        ));
    }
    net.prepare().unwrap();
    // two iterations: frames {0, 1}, then the remaining frame 2
    let params = ScheduleParams {
        algorithm: Algorithm::Incremental {
            frames_per_iteration: 2,
        },
        ..params()
    };
    schedule_network(&mut net, &params).unwrap();
    let mut starts: Vec<i64> = net
        .frames()
        .iter()
        .map(|f| f.offsets()[0].transmission(0, 0))
        .collect();
    starts.sort_unstable();
    assert!(starts.windows(2).all(|w| w[1] - w[0] >= 1), "{starts:?}");
}

#[test]
fn multicast_shares_the_first_hop() {
    // node 0 sends to nodes 2 and 3 through switch 1
    let mut net = Network::new(0).unwrap();
    net.add_node(Node::new(0, NodeKind::EndSystem)).unwrap();
    net.add_node(Node::new(1, NodeKind::Switch)).unwrap();
    net.add_node(Node::new(2, NodeKind::EndSystem)).unwrap();
    net.add_node(Node::new(3, NodeKind::EndSystem)).unwrap();
    net.add_connection(0, 1, Link::new(0, LinkKind::Wired, 1000).unwrap())
        .unwrap();
    net.add_connection(1, 2, Link::new(1, LinkKind::Wired, 1000).unwrap())
        .unwrap();
    net.add_connection(1, 3, Link::new(2, LinkKind::Wired, 1000).unwrap())
        .unwrap();
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
    net.add_frame(frame);
    net.prepare().unwrap();
    schedule_network(&mut net, &params()).unwrap();

    // one offset per link; both second hops wait for the shared first transmission
    let frame = &net.frames()[0];
    assert_eq!(frame.offsets().len(), 3);
    let s0 = frame.offset_by_link(0).unwrap().transmission(0, 0);
    for link in [1, 2] {
        let s = frame.offset_by_link(link).unwrap().transmission(0, 0);
        assert!(s >= s0 + 1, "hop on link {link} at {s}, first hop at {s0}");
    }
}
