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

//! Link repair scenarios: the first-fit heuristic and the MILP optimizer on a single link.

use test_log::test;

use crate::network::{SelfHealingProtocol, UNSCHEDULED};
use crate::patcher::{
    FixedFrame, FixedSlot, PatchBundle, PatchError, PatchFrame, TransmissionRange,
};

/// Link 0 with a 1000-slot hyperperiod, the SHP reserving `[0, 100)` and `[500, 600)`, fixed
/// transmissions at `[200, 250)` and `[700, 750)`, and one 50-slot frame to place with ranges
/// `[0, 400]` and `[500, 900]`.
fn bundle() -> PatchBundle {
    PatchBundle {
        link_id: 0,
        protocol: SelfHealingProtocol {
            period: 500,
            time: 100,
        },
        hyperperiod: 1000,
        fixed: vec![FixedFrame {
            id: 1,
            slots: vec![
                FixedSlot {
                    start: 200,
                    end: 249,
                },
                FixedSlot {
                    start: 700,
                    end: 749,
                },
            ],
        }],
        traffic: vec![PatchFrame::new(
            7,
            50,
            vec![
                TransmissionRange { min: 0, max: 400 },
                TransmissionRange { min: 500, max: 900 },
            ],
        )],
    }
}

/// The busy windows of the bundle: SHP reservation instances and fixed transmissions,
/// half-open.
fn busy_windows(bundle: &PatchBundle) -> Vec<(i64, i64)> {
    let mut busy = vec![(0, 100), (500, 600)];
    for fixed in bundle.fixed.iter() {
        for slot in fixed.slots.iter() {
            busy.push((slot.start, slot.end + 1));
        }
    }
    busy
}

#[test]
fn heuristic_places_in_the_first_free_interval() {
    let mut bundle = bundle();
    bundle.patch().unwrap();
    let frame = &bundle.traffic[0];
    // instance 0 lands right after the reservation, instance 1 right after the second slot
    assert_eq!(frame.transmission(0), 100);
    assert_eq!(frame.transmission(1), 600);
}

#[test]
fn heuristic_fails_when_no_gap_fits() {
    let mut bundle = bundle();
    // the only gap in [0, 150] is the 50 slots before the reservation repeats; ask for more
    bundle.traffic = vec![PatchFrame::new(
        7,
        150,
        vec![TransmissionRange { min: 0, max: 50 }],
    )];
    let result = bundle.patch();
    assert!(matches!(
        result,
        Err(PatchError::Unschedulable {
            frame: 7,
            instance: 0
        })
    ));
    assert_eq!(bundle.traffic[0].transmission(0), UNSCHEDULED);
}

#[test]
fn heuristic_walks_consecutive_frames_in_order() {
    let mut bundle = bundle();
    bundle.traffic = vec![
        PatchFrame::new(7, 50, vec![TransmissionRange { min: 0, max: 400 }]),
        PatchFrame::new(8, 50, vec![TransmissionRange { min: 0, max: 400 }]),
        PatchFrame::new(9, 100, vec![TransmissionRange { min: 0, max: 400 }]),
    ];
    bundle.patch().unwrap();
    // first fit, in input order: [100, 150), [150, 200), then past the fixed [200, 250)
    assert_eq!(bundle.traffic[0].transmission(0), 100);
    assert_eq!(bundle.traffic[1].transmission(0), 150);
    assert_eq!(bundle.traffic[2].transmission(0), 250);
}

#[test]
fn optimizer_finds_a_collision_free_placement() {
    let mut bundle = bundle();
    bundle.optimize().unwrap();

    let busy = busy_windows(&bundle);
    let frame = &bundle.traffic[0];
    for inst in 0..frame.num_instances() {
        let s = frame.transmission(inst);
        let range = frame.range(inst);
        assert!(s >= range.min && s <= range.max, "instance {inst} at {s}");
        for &(b0, b1) in busy.iter() {
            assert!(
                s + frame.time_slots() <= b0 || s >= b1,
                "instance {inst} at {s} overlaps busy [{b0}, {b1})"
            );
        }
    }
}

#[test]
fn optimizer_keeps_consecutive_frames_disjoint() {
    let mut bundle = bundle();
    bundle.traffic = vec![
        PatchFrame::new(7, 50, vec![TransmissionRange { min: 0, max: 400 }]),
        PatchFrame::new(8, 50, vec![TransmissionRange { min: 0, max: 400 }]),
    ];
    bundle.optimize().unwrap();

    let busy = busy_windows(&bundle);
    let (a, b) = (&bundle.traffic[0], &bundle.traffic[1]);
    let (sa, sb) = (a.transmission(0), b.transmission(0));
    assert!(
        sa + a.time_slots() <= sb || sb + b.time_slots() <= sa,
        "placements at {sa} and {sb} overlap"
    );
    for (frame, s) in [(a, sa), (b, sb)] {
        for &(b0, b1) in busy.iter() {
            assert!(
                s + frame.time_slots() <= b0 || s >= b1,
                "placement at {s} overlaps busy [{b0}, {b1})"
            );
        }
    }
}
