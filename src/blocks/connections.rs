//! Subsystems and their boundary ports
//!
//! These blocks exist only before compilation: the compiler splices each
//! subsystem's contents into the parent diagram and removes all three kinds.

use crate::block::{Block, BlockClass};
use crate::block_boilerplate;
use crate::diagram::BlockDiagram;
use crate::error::BlockError;
use crate::value::Value;

fn not_flattened(kind: &str) -> BlockError {
    BlockError::Failed(format!("{kind} evaluated before the diagram was flattened"))
}

/// Entry point of a subsystem: its outputs are the subsystem's inputs
#[derive(Debug, Clone)]
pub struct InPort {
    n: usize,
}

impl InPort {
    pub fn new(n: usize) -> Self {
        Self { n }
    }
}

impl Block for InPort {
    fn type_name(&self) -> &'static str {
        "inport"
    }

    fn class(&self) -> BlockClass {
        BlockClass::InPort
    }

    fn nin(&self) -> usize {
        0
    }

    fn nout(&self) -> usize {
        self.n
    }

    fn output(&self, _t: f64, _inputs: &[Value]) -> Result<Vec<Value>, BlockError> {
        Err(not_flattened("inport"))
    }

    block_boilerplate!();
}

/// Exit point of a subsystem: its inputs are the subsystem's outputs
#[derive(Debug, Clone)]
pub struct OutPort {
    n: usize,
}

impl OutPort {
    pub fn new(n: usize) -> Self {
        Self { n }
    }
}

impl Block for OutPort {
    fn type_name(&self) -> &'static str {
        "outport"
    }

    fn class(&self) -> BlockClass {
        BlockClass::OutPort
    }

    fn nin(&self) -> usize {
        self.n
    }

    fn nout(&self) -> usize {
        0
    }

    fn output(&self, _t: f64, _inputs: &[Value]) -> Result<Vec<Value>, BlockError> {
        Err(not_flattened("outport"))
    }

    block_boilerplate!();
}

/// A nested diagram used as a block.
///
/// The diagram is copied on construction, and copied again on every clone,
/// so each instance is independent of the others.
#[derive(Debug, Clone)]
pub struct Subsystem {
    diagram: BlockDiagram,
    nin: usize,
    nout: usize,
    invalid: Option<String>,
}

impl Subsystem {
    pub fn new(diagram: &BlockDiagram) -> Self {
        let diagram = diagram.clone();
        match diagram.boundary_widths() {
            Ok((nin, nout)) => Self {
                diagram,
                nin,
                nout,
                invalid: None,
            },
            Err(reason) => Self {
                diagram,
                nin: 0,
                nout: 0,
                invalid: Some(reason),
            },
        }
    }

    pub fn diagram(&self) -> &BlockDiagram {
        &self.diagram
    }
}

impl Block for Subsystem {
    fn type_name(&self) -> &'static str {
        "subsystem"
    }

    fn class(&self) -> BlockClass {
        BlockClass::Subsystem
    }

    fn nin(&self) -> usize {
        self.nin
    }

    fn nout(&self) -> usize {
        self.nout
    }

    fn check(&self) -> Result<(), BlockError> {
        match &self.invalid {
            Some(reason) => Err(BlockError::bad_parameter("diagram", reason.clone())),
            None => Ok(()),
        }
    }

    fn output(&self, _t: f64, _inputs: &[Value]) -> Result<Vec<Value>, BlockError> {
        Err(not_flattened("subsystem"))
    }

    fn subsystem(&self) -> Option<&BlockDiagram> {
        Some(&self.diagram)
    }

    block_boilerplate!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::Gain;

    #[test]
    fn test_subsystem_widths_from_ports() {
        let mut inner = BlockDiagram::new();
        let inp = inner.add(InPort::new(1));
        let g = inner.add(Gain::new(2.0));
        let out = inner.add(OutPort::new(1));
        inner.connect(inp, g).unwrap();
        inner.connect(g, out).unwrap();

        let ss = Subsystem::new(&inner);
        assert_eq!((ss.nin(), ss.nout()), (1, 1));
        assert!(ss.check().is_ok());
        assert!(ss.subsystem().is_some());
    }

    #[test]
    fn test_subsystem_with_two_inports_is_invalid() {
        let mut inner = BlockDiagram::new();
        inner.add(InPort::new(1));
        inner.add(InPort::new(1));

        let ss = Subsystem::new(&inner);
        assert!(ss.check().is_err());
    }
}
