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

//! Typed record for a single device of the topology.

/// The role a device plays in the network.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum NodeKind {
    /// A node that produces or consumes traffic.
    EndSystem,
    /// A node that forwards traffic between its links.
    Switch,
    /// A wireless access point.
    AccessPoint,
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeKind::EndSystem => write!(f, "EndSystem"),
            NodeKind::Switch => write!(f, "Switch"),
            NodeKind::AccessPoint => write!(f, "AccessPoint"),
        }
    }
}

/// A single device of the topology, identified by an integer id that is unique in the network.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Node {
    /// External identifier of the node.
    id: usize,
    /// Role of the node.
    kind: NodeKind,
}

impl Node {
    /// Create a new node.
    pub fn new(id: usize, kind: NodeKind) -> Self {
        Self { id, kind }
    }

    /// External identifier of the node.
    pub fn id(&self) -> usize {
        self.id
    }

    /// Role of the node.
    pub fn kind(&self) -> NodeKind {
        self.kind
    }
}
