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

use std::path::PathBuf;

use clap::Parser;
use log::info;

use shp_scheduler::{io, schedule_network};

/// Synthesize the collision-free schedule of a complete network.
#[derive(Debug, Parser)]
struct Cli {
    /// The network description document (topology, traffic, SHP reservation).
    network: PathBuf,
    /// The scheduler parameter document (algorithm, MIP gap, time limit).
    params: PathBuf,
    /// Where to write the schedule document.
    output: PathBuf,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init_timed();
    let args = Cli::parse();

    let mut net = io::read_network(&args.network)?;
    net.prepare()?;
    let params = io::read_schedule_params(&args.params)?;
    schedule_network(&mut net, &params)?;
    io::write_schedule(&net, &args.output)?;

    info!("schedule written to {}", args.output.display());
    Ok(())
}
