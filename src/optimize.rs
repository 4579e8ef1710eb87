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

use std::{path::PathBuf, time::Instant};

use clap::Parser;
use log::info;

use shp_scheduler::io;

/// Re-optimize a single link with the incremental MILP.
#[derive(Debug, Parser)]
struct Cli {
    /// The optimize bundle (fixed traffic and frames to place on one link).
    input: PathBuf,
    /// Where to write the optimized schedule.
    output: PathBuf,
    /// Where to write the execution-time record.
    timing: PathBuf,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init_timed();
    let args = Cli::parse();

    let mut bundle = io::read_patch(&args.input)?;
    let start = Instant::now();
    let result = bundle.optimize();
    let elapsed = start.elapsed().as_nanos();

    // the timing record is written even when the optimization fails
    io::write_execution_time(elapsed, &args.timing)?;
    result?;
    io::write_patched_schedule(&bundle, elapsed, &args.output)?;

    info!("optimized schedule written to {}", args.output.display());
    Ok(())
}
