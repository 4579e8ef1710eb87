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

//! Writers for the three output documents: the full schedule, the patched (or optimized)
//! schedule of a single link, and the standalone execution-time record.

use std::{fs::File, path::Path as FsPath};

use thiserror::Error;
use xmltree::{Element, EmitterConfig, XMLNode};

use crate::network::{Frame, Network};
use crate::patcher::PatchBundle;

/// Error while writing an output document.
#[derive(Debug, Error)]
pub enum OutputError {
    /// The file could not be created.
    #[error("cannot create {path}: {source}")]
    Io {
        /// Path of the document.
        path: String,
        /// Underlying error.
        source: std::io::Error,
    },
    /// The XML emitter failed.
    #[error("cannot write the XML: {0}")]
    Xml(#[from] xmltree::Error),
}

/// Append a child element containing only text.
fn text_child(parent: &mut Element, name: &str, value: impl ToString) {
    let mut e = Element::new(name);
    e.children.push(XMLNode::Text(value.to_string()));
    parent.children.push(XMLNode::Element(e));
}

/// Append an (initially empty) child element and return a mutable reference to it.
fn push_child<'a>(parent: &'a mut Element, name: &str) -> &'a mut Element {
    parent.children.push(XMLNode::Element(Element::new(name)));
    match parent.children.last_mut() {
        Some(XMLNode::Element(e)) => e,
        _ => unreachable!("the element was just pushed"),
    }
}

/// Write an element tree to the given file, indented.
fn write_document(root: &Element, path: impl AsRef<FsPath>) -> Result<(), OutputError> {
    let file = File::create(&path).map_err(|source| OutputError::Io {
        path: path.as_ref().display().to_string(),
        source,
    })?;
    root.write_with_config(file, EmitterConfig::new().perform_indent(true))?;
    Ok(())
}

/// Write the full schedule of a prepared and solved network.
///
/// The document starts with a `GeneralInformation` section (time-slot size in nanoseconds,
/// hyperperiod, optional SHP reservation, element counts) followed by one `Frame` element per
/// frame, which lists every path, every hop, and every scheduled `(instance, replica)` cell
/// with its transmission and ending time (`start + time - 1`, inclusive). All times are in
/// slot units; multiplying them by `TimeslotSize` recovers nanoseconds.
pub fn write_schedule(net: &Network, path: impl AsRef<FsPath>) -> Result<(), OutputError> {
    let mut root = Element::new("Schedule");

    let general = push_child(&mut root, "GeneralInformation");
    text_child(general, "TimeslotSize", net.timeslot());
    text_child(general, "HyperPeriod", net.hyperperiod());
    if let Some(shp) = net.self_healing_protocol() {
        let shp_el = push_child(general, "SelfHealingProtocol");
        text_child(shp_el, "Period", shp.period);
        text_child(shp_el, "Time", shp.time);
    }
    text_child(general, "NumberLinks", net.num_links());
    text_child(general, "NumberNodes", net.num_nodes());
    text_child(general, "NumberFrames", net.num_frames());

    let traffic = push_child(&mut root, "TrafficInformation");
    for frame in net.frames() {
        write_frame(traffic, frame);
    }

    write_document(&root, path)
}

/// Append one frame of the schedule document.
fn write_frame(parent: &mut Element, frame: &Frame) {
    let frame_el = push_child(parent, "Frame");
    text_child(frame_el, "FrameID", frame.id());
    text_child(frame_el, "Period", frame.period());
    text_child(frame_el, "Deadline", frame.deadline());
    text_child(frame_el, "Size", frame.size());
    text_child(frame_el, "StartingTime", frame.starting());
    text_child(frame_el, "EndToEndDelay", frame.end_to_end());

    for (num, path) in frame.paths().iter().enumerate() {
        let path_el = push_child(frame_el, "Path");
        text_child(path_el, "PathNum", num);
        for &index in path.offsets() {
            let offset = &frame.offsets()[index];
            let link_el = push_child(path_el, "Link");
            text_child(link_el, "LinkID", offset.link_id());
            for inst in 0..offset.num_instances() {
                let instance_el = push_child(link_el, "Instance");
                text_child(instance_el, "NumInstance", inst);
                let start = offset.transmission(inst, 0);
                text_child(instance_el, "TransmissionTime", start);
                text_child(instance_el, "EndingTime", start + offset.time() - 1);
                for repl in 1..offset.num_replicas() {
                    let replica_el = push_child(instance_el, "Replica");
                    text_child(replica_el, "NumReplica", repl);
                    let start = offset.transmission(inst, repl);
                    text_child(replica_el, "TransmissionTime", start);
                    text_child(replica_el, "EndingTime", start + offset.time() - 1);
                }
            }
        }
    }
}

/// Write the patched (or optimized) schedule of a single link, together with the execution time
/// of the repair in nanoseconds.
pub fn write_patched_schedule(
    bundle: &PatchBundle,
    execution_ns: u128,
    path: impl AsRef<FsPath>,
) -> Result<(), OutputError> {
    let mut root = Element::new("PatchedSchedule");

    let general = push_child(&mut root, "GeneralInformation");
    text_child(general, "LinkID", bundle.link_id);

    let traffic = push_child(&mut root, "TrafficInformation");
    for frame in bundle.traffic.iter() {
        let frame_el = push_child(traffic, "Frame");
        text_child(frame_el, "FrameID", frame.id());
        for inst in 0..frame.num_instances() {
            let instance_el = push_child(frame_el, "Instance");
            text_child(instance_el, "NumInstance", inst);
            let start = frame.transmission(inst);
            text_child(instance_el, "TransmissionTime", start);
            text_child(instance_el, "EndingTime", start + frame.time_slots() - 1);
        }
    }

    let timing = push_child(&mut root, "Timing");
    text_child(timing, "ExecutionTime", execution_ns);

    write_document(&root, path)
}

/// Write the standalone execution-time record (nanoseconds). Emitted even when a patch run
/// fails, so orchestrators can observe that an attempt occurred.
pub fn write_execution_time(
    execution_ns: u128,
    path: impl AsRef<FsPath>,
) -> Result<(), OutputError> {
    let mut root = Element::new("Timing");
    text_child(&mut root, "ExecutionTime", execution_ns);
    write_document(&root, path)
}
