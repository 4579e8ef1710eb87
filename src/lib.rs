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

//! # shp-scheduler
//!
//! Synthesis of collision-free transmission schedules for time-triggered Ethernet networks that
//! carry a periodic *Self-Healing Protocol* (SHP) bandwidth reservation.
//!
//! Given a topology (nodes, directed links, link speeds), a traffic pattern (periodic multicast
//! frames with deadlines, end-to-end bounds and per-receiver paths) and the SHP reservation, the
//! scheduler assigns an integer transmission start time to every `(frame, link, instance,
//! replica)` tuple such that multicast trees are respected with a minimum per-switch processing
//! delay, no two transmissions overlap on the same link, the reserved SHP slots stay inviolate,
//! and every frame meets its deadline and end-to-end latency bound.
//!
//! Two *patching* modes repair a single link whose schedule has become invalid after a failover: a
//! fast heuristic that places each new frame in the earliest feasible free interval, and an
//! MILP-based optimizer that maximizes the slack between adjacent transmissions.
//!
//! ## Structure
//! - The module [`network`] holds the domain model (topology, [`network::Frame`]s with their
//!   [`network::Offset`] grids, the SHP reservation modeled as a pseudo-frame) and the
//!   preparation pipeline ([`network::Network::prepare`]): hyperperiod, offset materialization,
//!   time-slot normalization, accelerator indices.
//! - The module [`scheduler`] translates the prepared network into an MILP model (solved with
//!   CBC through `good_lp`), drives the one-shot and incremental algorithms, and re-verifies
//!   every produced schedule independently of the solver ([`scheduler::validator`]).
//! - The module [`patcher`] repairs a single link: the sorted-interval heuristic
//!   ([`patcher::PatchBundle::patch`]) and the incremental MILP optimizer
//!   ([`patcher::PatchBundle::optimize`]).
//! - The module [`io`] reads and writes the XML documents consumed and produced by the three
//!   binaries `schedule`, `patch` and `optimize`.

#![deny(
    missing_docs,
    clippy::missing_docs_in_private_items,
    missing_debug_implementations,
    rust_2018_idioms
)]
#![allow(clippy::result_large_err)]

pub mod io;
pub mod network;
pub mod patcher;
pub mod scheduler;
#[cfg(test)]
mod test;

pub use network::Network;
pub use patcher::PatchBundle;
pub use scheduler::{schedule_network, Algorithm, ScheduleParams};
