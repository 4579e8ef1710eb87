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

//! The XML adapters around the engine: readers for the network description, the scheduler
//! parameters and the patch/optimize bundles, and writers for the schedule, the patched
//! schedule and the execution-time record.
//!
//! The documents are hierarchical and self-describing; see the readers and writers for the
//! exact element names. All input values carry their unit as an attribute where ambiguous
//! (`unit="ns|us|ms|s"` on times, `unit="KBs|MBs|GBs"` on speeds, `unit="Byte|KByte|MByte"` on
//! sizes); patch documents are expressed in time slots throughout and carry no units.

pub mod input;
pub mod output;

pub use input::{parse_network, read_network, read_patch, read_schedule_params, InputError};
pub use output::{
    write_execution_time, write_patched_schedule, write_schedule, OutputError,
};
