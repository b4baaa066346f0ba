//! Arena handles, plugs and wires

use std::fmt;
use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Stable index of a block within its diagram, assigned in insertion order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockId(pub usize);

/// Index of a wire within its diagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WireId(pub usize);

/// Index of a clock within its diagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClockId(pub usize);

impl BlockId {
    /// Plug for a single port of this block
    pub fn port(self, port: usize) -> Plug {
        Plug {
            block: self,
            ports: Ports::Single(port),
        }
    }

    /// Plug for a contiguous range of ports of this block
    pub fn ports(self, range: Range<usize>) -> Plug {
        Plug {
            block: self,
            ports: Ports::Slice(range),
        }
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl fmt::Display for WireId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "wire {}", self.0)
    }
}

/// Port selection of a plug
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Ports {
    Single(usize),
    Slice(Range<usize>),
}

/// Reference to a block plus a port index or a contiguous port range.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Plug {
    pub block: BlockId,
    pub ports: Ports,
}

impl Plug {
    pub fn is_slice(&self) -> bool {
        matches!(self.ports, Ports::Slice(_))
    }

    /// Number of ports referenced
    pub fn width(&self) -> usize {
        match &self.ports {
            Ports::Single(_) => 1,
            Ports::Slice(r) => r.len(),
        }
    }

    /// Ports referenced, in order
    pub fn portlist(&self) -> Vec<usize> {
        match &self.ports {
            Ports::Single(p) => vec![*p],
            Ports::Slice(r) => r.clone().collect(),
        }
    }

    /// First port referenced
    pub fn first(&self) -> usize {
        match &self.ports {
            Ports::Single(p) => *p,
            Ports::Slice(r) => r.start,
        }
    }
}

impl From<BlockId> for Plug {
    fn from(block: BlockId) -> Self {
        block.port(0)
    }
}

impl fmt::Display for Plug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.ports {
            Ports::Single(p) => write!(f, "{}[{}]", self.block, p),
            Ports::Slice(r) => write!(f, "{}[{}:{}]", self.block, r.start, r.end),
        }
    }
}

/// Resolved single-port endpoint of a wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub block: BlockId,
    pub port: usize,
}

/// Directed edge from one output port to one input port.
#[derive(Debug, Clone, PartialEq)]
pub struct Wire {
    pub id: WireId,
    pub start: Endpoint,
    pub end: Endpoint,
    pub name: Option<String>,
    /// Last value sent along this wire
    pub value: Option<Value>,
}

impl Wire {
    pub(crate) fn new(id: WireId, start: Endpoint, end: Endpoint) -> Self {
        Self {
            id,
            start,
            end,
            name: None,
            value: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plug_widths() {
        let b = BlockId(3);
        assert_eq!(Plug::from(b), b.port(0));
        assert_eq!(b.port(2).width(), 1);
        assert!(!b.port(2).is_slice());

        let s = b.ports(1..4);
        assert!(s.is_slice());
        assert_eq!(s.width(), 3);
        assert_eq!(s.portlist(), vec![1, 2, 3]);
        assert_eq!(s.first(), 1);
        assert_eq!(s.to_string(), "#3[1:4]");
    }
}
