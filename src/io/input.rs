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

//! Readers for the three input documents: the network description, the scheduler parameters,
//! and the patch/optimize bundle.

use std::{fs, path::Path as FsPath, str::FromStr};

use thiserror::Error;
use xmltree::{Element, ParseError};

use crate::network::{
    Frame, FrameTiming, Link, LinkKind, Network, NetworkError, Node, NodeKind,
    SelfHealingProtocol,
};
use crate::patcher::{FixedFrame, FixedSlot, PatchBundle, PatchFrame, TransmissionRange};
use crate::scheduler::{Algorithm, ScheduleParams};

/// Error while reading an input document.
#[derive(Debug, Error)]
pub enum InputError {
    /// The file could not be opened or read.
    #[error("cannot read {path}: {source}")]
    Io {
        /// Path of the document.
        path: String,
        /// Underlying error.
        source: std::io::Error,
    },
    /// The document is not well-formed XML.
    #[error("cannot parse the XML: {0}")]
    Xml(#[from] ParseError),
    /// A required element is missing.
    #[error("missing element: {0}")]
    MissingElement(&'static str),
    /// A required attribute is missing.
    #[error("missing attribute {1} for element {0}")]
    MissingAttribute(&'static str, &'static str),
    /// The text of an element could not be interpreted.
    #[error("cannot parse the value {value:?} of {element}")]
    InvalidValue {
        /// Path of the offending element.
        element: &'static str,
        /// The text that failed to parse.
        value: String,
    },
    /// An unknown unit attribute was encountered.
    #[error("unknown unit {value:?} for element {element}")]
    UnknownUnit {
        /// Path of the offending element.
        element: &'static str,
        /// The unit that is not understood.
        value: String,
    },
    /// The parsed values violate the structural rules of the network.
    #[error("{0}")]
    Network(#[from] NetworkError),
}

/// Get a required child element, reporting its full path when missing.
fn child<'a>(e: &'a Element, name: &str, path: &'static str) -> Result<&'a Element, InputError> {
    e.get_child(name).ok_or(InputError::MissingElement(path))
}

/// Iterate over all child elements with the given name, in document order.
fn children<'a>(e: &'a Element, name: &'a str) -> impl Iterator<Item = &'a Element> {
    e.children
        .iter()
        .filter_map(|node| node.as_element())
        .filter(move |el| el.name == name)
}

/// The trimmed text content of an element.
fn text(e: &Element) -> String {
    e.get_text().map(|t| t.trim().to_string()).unwrap_or_default()
}

/// Parse the text content of an element.
fn value<T: FromStr>(e: &Element, path: &'static str) -> Result<T, InputError> {
    let value = text(e);
    value.parse().map_err(|_| InputError::InvalidValue {
        element: path,
        value,
    })
}

/// Parse a required numeric child element.
fn value_of<T: FromStr>(
    e: &Element,
    name: &str,
    path: &'static str,
) -> Result<T, InputError> {
    value(child(e, name, path)?, path)
}

/// Parse a time-valued element into nanoseconds, honoring its optional `unit` attribute
/// (`ns` when absent).
fn time_value(e: &Element, path: &'static str) -> Result<i64, InputError> {
    let v: i64 = value(e, path)?;
    let factor = match e.attributes.get("unit").map(String::as_str) {
        None | Some("ns") => 1,
        Some("us") => 1_000,
        Some("ms") => 1_000_000,
        Some("s") => 1_000_000_000,
        Some(other) => {
            return Err(InputError::UnknownUnit {
                element: path,
                value: other.to_string(),
            })
        }
    };
    Ok(v * factor)
}

/// Parse a required time-valued child element into nanoseconds.
fn time_of(e: &Element, name: &str, path: &'static str) -> Result<i64, InputError> {
    time_value(child(e, name, path)?, path)
}

/// Parse an optional time-valued child element, with a default in nanoseconds.
fn time_of_opt(
    e: &Element,
    name: &str,
    path: &'static str,
    default: i64,
) -> Result<i64, InputError> {
    match e.get_child(name) {
        Some(el) => time_value(el, path),
        None => Ok(default),
    }
}

/// Parse a speed element into MB/s, honoring its optional `unit` attribute (`MBs` when absent).
fn speed_value(e: &Element, path: &'static str) -> Result<i64, InputError> {
    let v: i64 = value(e, path)?;
    match e.attributes.get("unit").map(String::as_str) {
        None | Some("MBs") => Ok(v),
        Some("KBs") => Ok(v / 1000),
        Some("GBs") => Ok(v * 1000),
        Some(other) => Err(InputError::UnknownUnit {
            element: path,
            value: other.to_string(),
        }),
    }
}

/// Parse a size element into bytes, honoring its optional `unit` attribute (`Byte` when absent).
fn size_value(e: &Element, path: &'static str) -> Result<i64, InputError> {
    let v: i64 = value(e, path)?;
    match e.attributes.get("unit").map(String::as_str) {
        None | Some("Byte") => Ok(v),
        Some("KByte") => Ok(v * 1000),
        Some("MByte") => Ok(v * 1_000_000),
        Some(other) => Err(InputError::UnknownUnit {
            element: path,
            value: other.to_string(),
        }),
    }
}

/// Read the whole file into a string, wrapping I/O failures with the path.
fn read_file(path: impl AsRef<FsPath>) -> Result<String, InputError> {
    fs::read_to_string(&path).map_err(|source| InputError::Io {
        path: path.as_ref().display().to_string(),
        source,
    })
}

/// Read and parse the network description document.
pub fn read_network(path: impl AsRef<FsPath>) -> Result<Network, InputError> {
    parse_network(&read_file(path)?)
}

/// Parse the network description document.
///
/// The document is a `NetworkConfiguration` root with
/// `GeneralInformation` (switch minimum time, optional SHP reservation),
/// `TopologyInformation` (nodes with their outgoing connections and links), and
/// `TrafficDescription` (frames with their per-receiver paths).
pub fn parse_network(content: &str) -> Result<Network, InputError> {
    let root = Element::parse(content.as_bytes())?;
    if root.name != "NetworkConfiguration" {
        return Err(InputError::MissingElement("/NetworkConfiguration"));
    }

    // general information: switch minimum time and the optional SHP reservation
    let general = child(
        &root,
        "GeneralInformation",
        "/NetworkConfiguration/GeneralInformation",
    )?;
    let switch_info = child(
        general,
        "SwitchInformation",
        "/NetworkConfiguration/GeneralInformation/SwitchInformation",
    )?;
    let min_time = time_of(
        switch_info,
        "MinimumTime",
        "/NetworkConfiguration/GeneralInformation/SwitchInformation/MinimumTime",
    )?;
    let mut net = Network::new(min_time)?;
    if let Some(shp) = general.get_child("SelfHealingProtocol") {
        let period = time_of(
            shp,
            "Period",
            "/NetworkConfiguration/GeneralInformation/SelfHealingProtocol/Period",
        )?;
        let time = time_of(
            shp,
            "Time",
            "/NetworkConfiguration/GeneralInformation/SelfHealingProtocol/Time",
        )?;
        net.set_self_healing_protocol(SelfHealingProtocol { period, time })?;
    }

    // topology: declare all nodes first, then their connections
    let topology = child(
        &root,
        "TopologyInformation",
        "/NetworkConfiguration/TopologyInformation",
    )?;
    for node_el in children(topology, "Node") {
        let kind = node_kind(node_el)?;
        let id = value_of(
            node_el,
            "NodeID",
            "/NetworkConfiguration/TopologyInformation/Node/NodeID",
        )?;
        net.add_node(Node::new(id, kind))?;
    }
    for node_el in children(topology, "Node") {
        let id: usize = value_of(
            node_el,
            "NodeID",
            "/NetworkConfiguration/TopologyInformation/Node/NodeID",
        )?;
        for conn in children(node_el, "Connection") {
            let peer = value_of(
                conn,
                "NodeID",
                "/NetworkConfiguration/TopologyInformation/Node/Connection/NodeID",
            )?;
            let link_el = child(
                conn,
                "Link",
                "/NetworkConfiguration/TopologyInformation/Node/Connection/Link",
            )?;
            let link_id = value_of(
                link_el,
                "LinkID",
                "/NetworkConfiguration/TopologyInformation/Node/Connection/Link/LinkID",
            )?;
            let speed = speed_value(
                child(
                    link_el,
                    "Speed",
                    "/NetworkConfiguration/TopologyInformation/Node/Connection/Link/Speed",
                )?,
                "/NetworkConfiguration/TopologyInformation/Node/Connection/Link/Speed",
            )?;
            let kind = link_kind(link_el)?;
            net.add_connection(id, peer, Link::new(link_id, kind, speed)?)?;
        }
    }

    // traffic description
    let traffic = child(
        &root,
        "TrafficDescription",
        "/NetworkConfiguration/TrafficDescription",
    )?;
    for frame_el in children(traffic, "Frame") {
        net.add_frame(parse_frame(frame_el)?);
    }

    Ok(net)
}

/// Interpret the `category` attribute of a node element.
fn node_kind(e: &Element) -> Result<NodeKind, InputError> {
    const PATH: &str = "/NetworkConfiguration/TopologyInformation/Node";
    let category = e
        .attributes
        .get("category")
        .ok_or(InputError::MissingAttribute(PATH, "category"))?;
    match category.as_str() {
        "EndSystem" => Ok(NodeKind::EndSystem),
        "Switch" => Ok(NodeKind::Switch),
        "AccessPoint" => Ok(NodeKind::AccessPoint),
        other => Err(InputError::InvalidValue {
            element: PATH,
            value: other.to_string(),
        }),
    }
}

/// Interpret the `category` attribute of a link element.
fn link_kind(e: &Element) -> Result<LinkKind, InputError> {
    const PATH: &str = "/NetworkConfiguration/TopologyInformation/Node/Connection/Link";
    let category = e
        .attributes
        .get("category")
        .ok_or(InputError::MissingAttribute(PATH, "category"))?;
    match category.as_str() {
        "Wired" => Ok(LinkKind::Wired),
        "Wireless" => Ok(LinkKind::Wireless),
        other => Err(InputError::InvalidValue {
            element: PATH,
            value: other.to_string(),
        }),
    }
}

/// Parse one frame of the traffic description, including its per-receiver paths.
fn parse_frame(e: &Element) -> Result<Frame, InputError> {
    let id = value_of(e, "FrameID", "/NetworkConfiguration/TrafficDescription/Frame/FrameID")?;
    let sender = value_of(
        e,
        "SenderID",
        "/NetworkConfiguration/TrafficDescription/Frame/SenderID",
    )?;
    let timing = FrameTiming {
        period: time_of(
            e,
            "Period",
            "/NetworkConfiguration/TrafficDescription/Frame/Period",
        )?,
        deadline: time_of_opt(
            e,
            "Deadline",
            "/NetworkConfiguration/TrafficDescription/Frame/Deadline",
            0,
        )?,
        size: match e.get_child("Size") {
            Some(el) => size_value(el, "/NetworkConfiguration/TrafficDescription/Frame/Size")?,
            None => 1000,
        },
        starting: time_of_opt(
            e,
            "StartingTime",
            "/NetworkConfiguration/TrafficDescription/Frame/StartingTime",
            0,
        )?,
        end_to_end: time_of_opt(
            e,
            "EndToEnd",
            "/NetworkConfiguration/TrafficDescription/Frame/EndToEnd",
            0,
        )?,
    };

    let paths_el = child(e, "Paths", "/NetworkConfiguration/TrafficDescription/Frame/Paths")?;
    let mut receivers = Vec::new();
    let mut paths = Vec::new();
    for receiver_el in children(paths_el, "Receiver") {
        let receiver = value_of(
            receiver_el,
            "ReceiverID",
            "/NetworkConfiguration/TrafficDescription/Frame/Paths/Receiver/ReceiverID",
        )?;
        let path_el = child(
            receiver_el,
            "Path",
            "/NetworkConfiguration/TrafficDescription/Frame/Paths/Receiver/Path",
        )?;
        let links = parse_link_list(path_el)?;
        receivers.push(receiver);
        paths.push((receiver, links));
    }

    let mut frame = Frame::new(id, sender, receivers, timing)?;
    for (receiver, links) in paths {
        frame.add_path(receiver, links)?;
    }
    Ok(frame)
}

/// Parse a semicolon-separated list of link ids.
fn parse_link_list(e: &Element) -> Result<Vec<usize>, InputError> {
    const PATH: &str = "/NetworkConfiguration/TrafficDescription/Frame/Paths/Receiver/Path";
    let raw = text(e);
    raw.split(';')
        .filter(|part| !part.trim().is_empty())
        .map(|part| {
            part.trim().parse().map_err(|_| InputError::InvalidValue {
                element: PATH,
                value: raw.clone(),
            })
        })
        .collect()
}

/// Read and parse the scheduler parameter document.
pub fn read_schedule_params(path: impl AsRef<FsPath>) -> Result<ScheduleParams, InputError> {
    parse_schedule_params(&read_file(path)?)
}

/// Parse the scheduler parameter document: a `Schedule` root with an `Algorithm` element
/// (attribute `name`, either `OneShot` or `Incremental` with a `FramesIteration` child) plus
/// `MIPGAP` and `TimeLimit`.
pub fn parse_schedule_params(content: &str) -> Result<ScheduleParams, InputError> {
    let root = Element::parse(content.as_bytes())?;
    if root.name != "Schedule" {
        return Err(InputError::MissingElement("/Schedule"));
    }
    let algorithm_el = child(&root, "Algorithm", "/Schedule/Algorithm")?;
    let name = algorithm_el
        .attributes
        .get("name")
        .ok_or(InputError::MissingAttribute("/Schedule/Algorithm", "name"))?;
    let algorithm = match name.as_str() {
        "OneShot" => Algorithm::OneShot,
        "Incremental" => {
            let frames_per_iteration: usize = value_of(
                algorithm_el,
                "FramesIteration",
                "/Schedule/Algorithm/FramesIteration",
            )?;
            if frames_per_iteration < 1 {
                return Err(InputError::InvalidValue {
                    element: "/Schedule/Algorithm/FramesIteration",
                    value: frames_per_iteration.to_string(),
                });
            }
            Algorithm::Incremental {
                frames_per_iteration,
            }
        }
        other => {
            return Err(InputError::InvalidValue {
                element: "/Schedule/Algorithm",
                value: other.to_string(),
            })
        }
    };
    let mip_gap: f64 = value_of(&root, "MIPGAP", "/Schedule/MIPGAP")?;
    if mip_gap.is_nan() || mip_gap < 0.0 {
        return Err(InputError::InvalidValue {
            element: "/Schedule/MIPGAP",
            value: mip_gap.to_string(),
        });
    }
    let time_limit: f64 = value_of(&root, "TimeLimit", "/Schedule/TimeLimit")?;
    if time_limit.is_nan() || time_limit <= 0.0 {
        return Err(InputError::InvalidValue {
            element: "/Schedule/TimeLimit",
            value: time_limit.to_string(),
        });
    }
    Ok(ScheduleParams {
        algorithm,
        mip_gap,
        time_limit,
    })
}

/// Read and parse a patch or optimize bundle.
pub fn read_patch(path: impl AsRef<FsPath>) -> Result<PatchBundle, InputError> {
    parse_patch(&read_file(path)?)
}

/// Parse a patch or optimize bundle. Both operations consume the same document: a
/// `GeneralInformation` section with the link under repair and the protocol parameters, the
/// `FixedTraffic` that must not move, and the `Traffic` to place. All times are already in
/// time-slot units, so no unit attributes apply. The root element name is not interpreted.
pub fn parse_patch(content: &str) -> Result<PatchBundle, InputError> {
    let root = Element::parse(content.as_bytes())?;
    let general = child(&root, "GeneralInformation", "/Patch/GeneralInformation")?;
    let link_id = value_of(general, "LinkID", "/Patch/GeneralInformation/LinkID")?;
    let protocol = SelfHealingProtocol {
        period: value_of(
            general,
            "ProtocolPeriod",
            "/Patch/GeneralInformation/ProtocolPeriod",
        )?,
        time: value_of(
            general,
            "ProtocolTime",
            "/Patch/GeneralInformation/ProtocolTime",
        )?,
    };
    let hyperperiod = value_of(general, "HyperPeriod", "/Patch/GeneralInformation/HyperPeriod")?;

    let mut fixed = Vec::new();
    if let Some(fixed_el) = root.get_child("FixedTraffic") {
        for frame_el in children(fixed_el, "Frame") {
            let id = value_of(frame_el, "FrameID", "/Patch/FixedTraffic/Frame/FrameID")?;
            let offset_el = child(frame_el, "Offset", "/Patch/FixedTraffic/Frame/Offset")?;
            let mut slots = Vec::new();
            for instance_el in children(offset_el, "Instance") {
                slots.push(FixedSlot {
                    start: value_of(
                        instance_el,
                        "TransmissionTime",
                        "/Patch/FixedTraffic/Frame/Offset/Instance/TransmissionTime",
                    )?,
                    end: value_of(
                        instance_el,
                        "EndingTime",
                        "/Patch/FixedTraffic/Frame/Offset/Instance/EndingTime",
                    )?,
                });
            }
            fixed.push(FixedFrame { id, slots });
        }
    }

    let traffic_el = child(&root, "Traffic", "/Patch/Traffic")?;
    let mut traffic = Vec::new();
    for frame_el in children(traffic_el, "Frame") {
        let id = value_of(frame_el, "FrameID", "/Patch/Traffic/Frame/FrameID")?;
        let offset_el = child(frame_el, "Offset", "/Patch/Traffic/Frame/Offset")?;
        let time_slots: i64 = value_of(
            offset_el,
            "TimeSlots",
            "/Patch/Traffic/Frame/Offset/TimeSlots",
        )?;
        if time_slots <= 0 {
            return Err(InputError::InvalidValue {
                element: "/Patch/Traffic/Frame/Offset/TimeSlots",
                value: time_slots.to_string(),
            });
        }
        let mut ranges = Vec::new();
        for instance_el in children(offset_el, "Instance") {
            let range = TransmissionRange {
                min: value_of(
                    instance_el,
                    "MinTransmission",
                    "/Patch/Traffic/Frame/Offset/Instance/MinTransmission",
                )?,
                max: value_of(
                    instance_el,
                    "MaxTransmission",
                    "/Patch/Traffic/Frame/Offset/Instance/MaxTransmission",
                )?,
            };
            if range.min > range.max {
                return Err(InputError::InvalidValue {
                    element: "/Patch/Traffic/Frame/Offset/Instance/MinTransmission",
                    value: format!("{}..{}", range.min, range.max),
                });
            }
            ranges.push(range);
        }
        traffic.push(PatchFrame::new(id, time_slots, ranges));
    }

    Ok(PatchBundle {
        link_id,
        protocol,
        hyperperiod,
        fixed,
        traffic,
    })
}
