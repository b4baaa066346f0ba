//! Subsystem flattening
//!
//! Each subsystem node is replaced by the blocks of its nested diagram.
//! Wires through the subsystem's InPort and OutPort are rebuilt as direct
//! wires between the outer and inner blocks, so after flattening the
//! diagram contains only primitive blocks.

use std::collections::{BTreeSet, HashMap};

use tracing::debug;

use super::BlockDiagram;
use crate::block::BlockClass;
use crate::error::CompileError;
use crate::plug::{BlockId, ClockId, Endpoint, Wire, WireId};

impl BlockDiagram {
    /// Splice every subsystem, innermost first, until none remain.
    ///
    /// On error the diagram is left exactly as it was before the call.
    pub(crate) fn flatten(&mut self) -> Result<(), CompileError> {
        let Some(first) = self.next_subsystem() else {
            return Ok(());
        };
        let original = self.clone();

        let mut errors = Vec::new();
        let mut next = Some(first);
        while let Some(sid) = next {
            if let Err(err) = self.splice(sid) {
                errors.push(err);
            }
            next = self.next_subsystem();
        }
        if let Some(err) = CompileError::collect(errors) {
            *self = original;
            return Err(err);
        }
        for (i, wire) in self.wires.iter_mut().enumerate() {
            wire.id = WireId(i);
        }
        Ok(())
    }

    fn next_subsystem(&self) -> Option<BlockId> {
        self.blocks().find(|id| {
            self.node(*id)
                .is_some_and(|n| n.class() == BlockClass::Subsystem)
        })
    }

    fn splice(&mut self, sid: BlockId) -> Result<(), CompileError> {
        let Some(node) = self.nodes.get_mut(sid.0).and_then(Option::take) else {
            return Ok(());
        };
        let prefix = node.name.clone();
        let ports_error = |reason: String| CompileError::SubsystemPorts {
            subsystem: prefix.clone(),
            reason,
        };

        let (outer, others): (Vec<Wire>, Vec<Wire>) = std::mem::take(&mut self.wires)
            .into_iter()
            .partition(|w| w.start.block == sid || w.end.block == sid);
        self.wires = others;

        node.block.check().map_err(|e| ports_error(e.to_string()))?;
        let mut inner = match node.block.subsystem() {
            Some(diagram) => diagram.clone(),
            None => return Err(ports_error("block has no nested diagram".into())),
        };
        inner.flatten()?;

        // outer endpoints feeding each subsystem input, and fed by each output
        let mut feeds: Vec<Vec<Endpoint>> = vec![Vec::new(); node.block.nin()];
        let mut drains: Vec<Vec<Endpoint>> = vec![Vec::new(); node.block.nout()];
        for w in &outer {
            if w.start.block == sid && w.end.block == sid {
                return Err(ports_error(format!(
                    "output {} wired straight back to input {}",
                    w.start.port, w.end.port
                )));
            }
            if w.end.block == sid {
                if let Some(feed) = feeds.get_mut(w.end.port) {
                    feed.push(w.start);
                }
            } else if let Some(drain) = drains.get_mut(w.start.port) {
                drain.push(w.end);
            }
        }
        let mut errors = Vec::new();
        for (port, feed) in feeds.iter().enumerate() {
            if feed.len() > 1 {
                errors.push(CompileError::MultiDrivenInput {
                    block: prefix.clone(),
                    port,
                    wires: feed.len(),
                });
            }
        }

        let clock_base = self.clocks.len();
        for mut clock in std::mem::take(&mut inner.clocks) {
            clock.set_name(format!("{}/{}", prefix, clock.name()));
            self.clocks.push(clock);
        }
        self.params.extend(inner.params.iter().cloned());

        let mut remap: HashMap<BlockId, BlockId> = HashMap::new();
        let (mut inport, mut outport) = (None, None);
        for (i, slot) in std::mem::take(&mut inner.nodes).into_iter().enumerate() {
            let Some(mut n) = slot else { continue };
            match n.class() {
                BlockClass::InPort => inport = Some(BlockId(i)),
                BlockClass::OutPort => outport = Some(BlockId(i)),
                _ => {
                    n.name = format!("{}/{}", prefix, n.name);
                    n.clock = n.clock.map(|c| ClockId(c.0 + clock_base));
                    let id = BlockId(self.nodes.len());
                    self.nodes.push(Some(n));
                    remap.insert(BlockId(i), id);
                }
            }
        }

        let mut unfed = BTreeSet::new();
        for w in &inner.wires {
            let sources = if Some(w.start.block) == inport {
                match feeds.get(w.start.port) {
                    Some(feed) if !feed.is_empty() => feed.clone(),
                    _ => {
                        unfed.insert(w.start.port);
                        continue;
                    }
                }
            } else {
                match remap.get(&w.start.block) {
                    Some(block) => vec![Endpoint {
                        block: *block,
                        port: w.start.port,
                    }],
                    None => continue,
                }
            };
            let targets = if Some(w.end.block) == outport {
                drains.get(w.end.port).cloned().unwrap_or_default()
            } else {
                match remap.get(&w.end.block) {
                    Some(block) => vec![Endpoint {
                        block: *block,
                        port: w.end.port,
                    }],
                    None => continue,
                }
            };

            for start in &sources {
                for end in &targets {
                    let mut wire = Wire::new(WireId(self.wires.len()), *start, *end);
                    wire.name = w.name.as_ref().map(|n| format!("{}/{}", prefix, n));
                    self.wires.push(wire);
                }
            }
        }
        errors.extend(unfed.into_iter().map(|port| CompileError::UnconnectedInput {
            block: prefix.clone(),
            port,
        }));

        debug!(
            "flattened subsystem {} into {} blocks",
            prefix,
            remap.len()
        );
        CompileError::collect(errors).map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use crate::blocks::{Constant, Gain, InPort, Null, OutPort, Subsystem};
    use crate::diagram::BlockDiagram;
    use crate::error::CompileError;

    fn doubler() -> BlockDiagram {
        let mut inner = BlockDiagram::new();
        let inp = inner.add(InPort::new(1));
        let g = inner.add(Gain::new(2.0));
        let out = inner.add(OutPort::new(1));
        inner.connect(inp, g).unwrap();
        inner.connect(g, out).unwrap();
        inner
    }

    #[test]
    fn test_flatten_rewires_through_ports() {
        let mut bd = BlockDiagram::new();
        let c = bd.add(Constant::new(1.5));
        let ss = bd.add_named("dbl", Subsystem::new(&doubler()));
        let n = bd.add(Null::new(1));
        bd.connect(c, ss).unwrap();
        bd.connect(ss, n).unwrap();

        bd.flatten().unwrap();

        assert!(bd.node(ss).is_none());
        let g = bd.block_by_name("dbl/gain.0").unwrap();
        assert_eq!(bd.wires().len(), 2);
        assert!(bd
            .wires()
            .iter()
            .any(|w| w.start.block == c && w.end.block == g));
        assert!(bd
            .wires()
            .iter()
            .any(|w| w.start.block == g && w.end.block == n));
        // top-level ids are stable
        assert_eq!(bd.name(n), Some("null.0"));
    }

    #[test]
    fn test_nested_subsystems_get_path_names() {
        let mut middle = BlockDiagram::new();
        let inp = middle.add(InPort::new(1));
        let ss = middle.add_named("inner", Subsystem::new(&doubler()));
        let out = middle.add(OutPort::new(1));
        middle.connect(inp, ss).unwrap();
        middle.connect(ss, out).unwrap();

        let mut bd = BlockDiagram::new();
        let c = bd.add(Constant::new(1.0));
        let outer = bd.add_named("outer", Subsystem::new(&middle));
        let n = bd.add(Null::new(1));
        bd.connect(c, outer).unwrap();
        bd.connect(outer, n).unwrap();

        bd.flatten().unwrap();
        assert!(bd.block_by_name("outer/inner/gain.0").is_some());
        assert_eq!(bd.wires().len(), 2);
    }

    #[test]
    fn test_unfed_subsystem_input_is_reported() {
        let mut bd = BlockDiagram::new();
        let ss = bd.add_named("dbl", Subsystem::new(&doubler()));
        let n = bd.add(Null::new(1));
        bd.connect(ss, n).unwrap();

        let err = bd.flatten().unwrap_err();
        assert_eq!(
            err,
            CompileError::UnconnectedInput {
                block: "dbl".into(),
                port: 0
            }
        );
    }

    #[test]
    fn test_failed_flatten_leaves_diagram_intact() {
        let mut bd = BlockDiagram::new();
        let ss = bd.add_named("dbl", Subsystem::new(&doubler()));
        let n = bd.add(Null::new(1));
        bd.connect(ss, n).unwrap();

        let first = bd.flatten().unwrap_err();
        assert!(bd.node(ss).is_some());
        assert_eq!(bd.wires().len(), 1);
        assert_eq!(bd.flatten().unwrap_err(), first);

        let c = bd.add(Constant::new(1.0));
        bd.connect(c, ss).unwrap();
        bd.flatten().unwrap();
        assert!(bd.node(ss).is_none());
        assert!(bd.block_by_name("dbl/gain.0").is_some());
    }
}
