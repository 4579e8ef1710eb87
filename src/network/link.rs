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

//! Typed record for a single directed link of the topology.

use super::NetworkError;

/// The physical kind of a link.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum LinkKind {
    /// A cabled connection between two devices.
    Wired,
    /// A wireless connection. Transmissions on wireless links may be replicated; the replica
    /// dimension is reserved in the model but not exercised.
    Wireless,
}

impl std::fmt::Display for LinkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkKind::Wired => write!(f, "Wired"),
            LinkKind::Wireless => write!(f, "Wireless"),
        }
    }
}

/// A directed link, identified by an integer id that is unique in the network and owned by
/// exactly one emitting node.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Link {
    /// External identifier of the link.
    id: usize,
    /// Physical kind of the link.
    kind: LinkKind,
    /// Speed of the link in MB/s.
    speed: i64,
}

impl Link {
    /// Create a new link. The speed is given in MB/s and must be positive.
    pub fn new(id: usize, kind: LinkKind, speed: i64) -> Result<Self, NetworkError> {
        if speed <= 0 {
            return Err(NetworkError::NonPositiveSpeed { link: id, speed });
        }
        Ok(Self { id, kind, speed })
    }

    /// External identifier of the link.
    pub fn id(&self) -> usize {
        self.id
    }

    /// Physical kind of the link.
    pub fn kind(&self) -> LinkKind {
        self.kind
    }

    /// Speed of the link in MB/s.
    pub fn speed(&self) -> i64 {
        self.speed
    }

    /// Number of nanoseconds needed to put `size` bytes on this link, at least 1.
    pub fn transmission_time(&self, size: i64) -> i64 {
        let t = (size * 1000 + self.speed - 1) / self.speed;
        t.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transmission_time_rounds_up() {
        // 100 B over 1000 MB/s take exactly 100 ns.
        let link = Link::new(0, LinkKind::Wired, 1000).unwrap();
        assert_eq!(link.transmission_time(100), 100);
        // 100 B over 3000 MB/s take 33.3 ns, rounded up to 34.
        let link = Link::new(1, LinkKind::Wired, 3000).unwrap();
        assert_eq!(link.transmission_time(100), 34);
        // A tiny frame on a fast link still occupies one nanosecond.
        let link = Link::new(2, LinkKind::Wired, 100_000).unwrap();
        assert_eq!(link.transmission_time(1), 1);
    }

    #[test]
    fn speed_must_be_positive() {
        assert!(Link::new(0, LinkKind::Wired, 0).is_err());
        assert!(Link::new(0, LinkKind::Wireless, -5).is_err());
    }
}
