//! Block diagram: arena of blocks, wires and clocks
//!
//! Blocks are addressed by [`BlockId`], wires by [`WireId`] and clocks by
//! [`ClockId`]; nothing holds a reference to anything else. The arena keeps
//! each block's input cache and wiring so block implementations stay free of
//! graph bookkeeping.

mod compile;
mod flatten;
mod plan;
mod propagate;

use std::collections::HashMap;
use std::fmt;

use tracing::info;

use crate::block::{Block, BlockClass};
use crate::error::{BlockError, CompileError, RuntimeError};
use crate::events::Clock;
use crate::param::Param;
use crate::plug::{BlockId, ClockId, Endpoint, Plug, Wire, WireId};
use crate::registry::{BlockParams, BlockRegistry};
use crate::value::Value;

/// Arena slot of one block
#[derive(Clone)]
pub(crate) struct Node {
    pub(crate) name: String,
    pub(crate) block: Box<dyn Block>,
    pub(crate) clock: Option<ClockId>,
    pub(crate) inputs: Vec<Option<Value>>,
    pub(crate) outputs: Vec<Option<Value>>,
    /// Inputs still unknown in the current pass
    pub(crate) missing: usize,
    pub(crate) updated: bool,
    pub(crate) inports: Vec<Option<WireId>>,
    pub(crate) outports: Vec<Vec<WireId>>,
}

impl Node {
    fn new(name: String, block: Box<dyn Block>, clock: Option<ClockId>) -> Self {
        let (nin, nout) = (block.nin(), block.nout());
        Self {
            name,
            block,
            clock,
            inputs: vec![None; nin],
            outputs: vec![None; nout],
            missing: nin,
            updated: false,
            inports: vec![None; nin],
            outports: vec![Vec::new(); nout],
        }
    }

    pub(crate) fn class(&self) -> BlockClass {
        self.block.class()
    }

    /// Clear the per-pass input cache
    pub(crate) fn reset(&mut self) {
        self.inputs.iter_mut().for_each(|v| *v = None);
        self.outputs.iter_mut().for_each(|v| *v = None);
        self.missing = self.inputs.len();
        self.updated = false;
    }

    /// All inputs, if every one of them is known
    pub(crate) fn known_inputs(&self) -> Option<Vec<Value>> {
        self.inputs.iter().cloned().collect()
    }
}

/// A block diagram under construction or compiled and ready to simulate.
#[derive(Clone, Default)]
pub struct BlockDiagram {
    name: String,
    pub(crate) nodes: Vec<Option<Node>>,
    pub(crate) wires: Vec<Wire>,
    pub(crate) clocks: Vec<Clock>,
    params: Vec<Param>,
    type_counts: HashMap<&'static str, usize>,
    compiled: bool,
    /// Live blocks in arena order, fixed at compile time
    pub(crate) order: Vec<BlockId>,
    name_index: HashMap<String, BlockId>,
    nstates: usize,
    ndstates: usize,
    statenames: Vec<String>,
    pub(crate) check_finite: bool,
}

impl BlockDiagram {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn diagram_name(&self) -> &str {
        &self.name
    }

    fn default_name(&mut self, type_name: &'static str) -> String {
        let n = self.type_counts.entry(type_name).or_insert(0);
        let name = format!("{}.{}", type_name, n);
        *n += 1;
        name
    }

    fn insert(&mut self, block: Box<dyn Block>, name: Option<String>, clock: Option<ClockId>) -> BlockId {
        let name = match name {
            Some(name) => name,
            None => self.default_name(block.type_name()),
        };
        let id = BlockId(self.nodes.len());
        self.nodes.push(Some(Node::new(name, block, clock)));
        self.compiled = false;
        id
    }

    /// Add a block with an automatic `"{type}.{n}"` name
    pub fn add<B: Block + 'static>(&mut self, block: B) -> BlockId {
        self.insert(Box::new(block), None, None)
    }

    pub fn add_boxed(&mut self, block: Box<dyn Block>) -> BlockId {
        self.insert(block, None, None)
    }

    pub fn add_named<B: Block + 'static>(&mut self, name: impl Into<String>, block: B) -> BlockId {
        self.insert(Box::new(block), Some(name.into()), None)
    }

    /// Add a clocked block driven by `clock`
    pub fn add_clocked<B: Block + 'static>(&mut self, clock: ClockId, block: B) -> BlockId {
        self.insert(Box::new(block), None, Some(clock))
    }

    /// Construct a block by registered type name.
    ///
    /// Besides the block's own parameters, `"name"` overrides the automatic
    /// name and `"clock"` attaches the block to the clock with that index.
    pub fn add_from(
        &mut self,
        registry: &BlockRegistry,
        type_name: &str,
        params: &BlockParams,
    ) -> Result<BlockId, BlockError> {
        let block = registry.create(type_name, params)?;
        let name = params
            .get("name")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        let clock = match params.get("clock") {
            None => None,
            Some(v) => {
                let index = v
                    .as_u64()
                    .map(|i| i as usize)
                    .filter(|i| *i < self.clocks.len())
                    .ok_or_else(|| {
                        BlockError::bad_parameter("clock", format!("no clock with index {}", v))
                    })?;
                Some(ClockId(index))
            }
        };
        Ok(self.insert(block, name, clock))
    }

    pub fn set_name(&mut self, id: BlockId, name: impl Into<String>) {
        if let Some(node) = self.node_mut(id) {
            node.name = name.into();
            self.compiled = false;
        }
    }

    /// Create a clock with `period` seconds and phase `offset`
    pub fn clock(&mut self, period: f64, offset: f64) -> ClockId {
        let id = ClockId(self.clocks.len());
        self.clocks.push(Clock::new(format!("clock.{}", id.0), period, offset));
        self.compiled = false;
        id
    }

    /// Create a clock from a frequency in Hz
    pub fn clock_hz(&mut self, freq: f64, offset: f64) -> ClockId {
        self.clock(1.0 / freq, offset)
    }

    /// Create a tunable parameter registered with this diagram
    pub fn param(&mut self, name: impl Into<String>, value: f64) -> Param {
        let p = Param::new(name, value);
        self.params.push(p.clone());
        p
    }

    /// Tunable parameters, for tuning collaborators
    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub(crate) fn node(&self, id: BlockId) -> Option<&Node> {
        self.nodes.get(id.0).and_then(Option::as_ref)
    }

    pub(crate) fn node_mut(&mut self, id: BlockId) -> Option<&mut Node> {
        self.nodes.get_mut(id.0).and_then(Option::as_mut)
    }

    /// Name of a block, or its id when the block does not exist
    pub(crate) fn label(&self, id: BlockId) -> String {
        self.node(id)
            .map(|n| n.name.clone())
            .unwrap_or_else(|| id.to_string())
    }

    pub(crate) fn wire_label(&self, wire: &Wire) -> String {
        match &wire.name {
            Some(name) => name.clone(),
            None => format!(
                "{}[{}] -> {}[{}]",
                self.label(wire.start.block),
                wire.start.port,
                self.label(wire.end.block),
                wire.end.port
            ),
        }
    }

    fn endpoint_check(
        &self,
        id: BlockId,
        port: usize,
        output: bool,
    ) -> Result<(), CompileError> {
        let available = self
            .node(id)
            .map(|n| if output { n.block.nout() } else { n.block.nin() })
            .unwrap_or(0);
        if port >= available {
            return Err(CompileError::PortOutOfRange {
                block: self.label(id),
                port,
                available,
                direction: if output { "output" } else { "input" },
            });
        }
        Ok(())
    }

    fn add_wire(&mut self, start: Endpoint, end: Endpoint) -> Result<WireId, CompileError> {
        self.endpoint_check(start.block, start.port, true)?;
        self.endpoint_check(end.block, end.port, false)?;
        let id = WireId(self.wires.len());
        self.wires.push(Wire::new(id, start, end));
        self.compiled = false;
        Ok(id)
    }

    /// Connect an output plug to an input plug.
    ///
    /// Slice-to-slice bundles must have equal widths. A slice into a plain
    /// block plug fans into all of that block's inputs, which must match the
    /// slice width; symmetrically for a plain block into a slice.
    pub fn connect(
        &mut self,
        start: impl Into<Plug>,
        end: impl Into<Plug>,
    ) -> Result<Vec<WireId>, CompileError> {
        let (start, end) = (start.into(), end.into());

        let pairs: Vec<(usize, usize)> = match (start.is_slice(), end.is_slice()) {
            (true, true) => {
                if start.width() != end.width() {
                    return Err(self.width_mismatch(&start, &end, start.width(), end.width()));
                }
                start.portlist().into_iter().zip(end.portlist()).collect()
            }
            (true, false) => {
                let nin = self.node(end.block).map(|n| n.block.nin()).unwrap_or(0);
                if start.width() != nin {
                    return Err(self.width_mismatch(&start, &end, start.width(), nin));
                }
                start.portlist().into_iter().zip(0..nin).collect()
            }
            (false, true) => {
                let nout = self.node(start.block).map(|n| n.block.nout()).unwrap_or(0);
                if end.width() != nout {
                    return Err(self.width_mismatch(&start, &end, nout, end.width()));
                }
                (0..nout).zip(end.portlist()).collect()
            }
            (false, false) => vec![(start.first(), end.first())],
        };

        let mut ids = Vec::with_capacity(pairs.len());
        for (sp, ep) in pairs {
            ids.push(self.add_wire(
                Endpoint {
                    block: start.block,
                    port: sp,
                },
                Endpoint {
                    block: end.block,
                    port: ep,
                },
            )?);
        }
        Ok(ids)
    }

    /// Fan one output plug out to several input plugs
    pub fn connect_many<I, P>(&mut self, start: impl Into<Plug>, ends: I) -> Result<Vec<WireId>, CompileError>
    where
        I: IntoIterator<Item = P>,
        P: Into<Plug>,
    {
        let start = start.into();
        let mut ids = Vec::new();
        for end in ends {
            ids.extend(self.connect(start.clone(), end)?);
        }
        Ok(ids)
    }

    fn width_mismatch(&self, start: &Plug, end: &Plug, sw: usize, ew: usize) -> CompileError {
        CompileError::WidthMismatch {
            start: format!("{}{}", self.label(start.block), ports_suffix(start)),
            end: format!("{}{}", self.label(end.block), ports_suffix(end)),
            start_width: sw,
            end_width: ew,
        }
    }

    /// Give a wire a human-readable name used in diagnostics
    pub fn name_wire(&mut self, wire: WireId, name: impl Into<String>) {
        if let Some(w) = self.wires.get_mut(wire.0) {
            w.name = Some(name.into());
        }
    }

    pub fn is_compiled(&self) -> bool {
        self.compiled
    }

    pub fn block(&self, id: BlockId) -> Option<&dyn Block> {
        self.node(id).map(|n| n.block.as_ref())
    }

    pub fn block_mut(&mut self, id: BlockId) -> Option<&mut (dyn Block + 'static)> {
        self.node_mut(id).map(|n| n.block.as_mut())
    }

    /// Downcast a block to its concrete type
    pub fn block_as<T: 'static>(&self, id: BlockId) -> Option<&T> {
        self.block(id).and_then(|b| b.as_any().downcast_ref::<T>())
    }

    pub fn block_as_mut<T: 'static>(&mut self, id: BlockId) -> Option<&mut T> {
        self.block_mut(id)
            .and_then(|b| b.as_any_mut().downcast_mut::<T>())
    }

    pub fn name(&self, id: BlockId) -> Option<&str> {
        self.node(id).map(|n| n.name.as_str())
    }

    /// Look a block up by name. Names of flattened subsystem blocks are
    /// prefixed with the subsystem path, e.g. `"ctrl/gain.0"`.
    pub fn block_by_name(&self, name: &str) -> Option<BlockId> {
        if let Some(id) = self.name_index.get(name) {
            return Some(*id);
        }
        self.blocks().find(|id| self.name(*id) == Some(name))
    }

    /// Live block ids in arena order
    pub fn blocks(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.is_some())
            .map(|(i, _)| BlockId(i))
    }

    /// Input cache of a block from the last evaluation
    pub fn inputs(&self, id: BlockId) -> Option<&[Option<Value>]> {
        self.node(id).map(|n| n.inputs.as_slice())
    }

    pub fn input(&self, id: BlockId, port: usize) -> Option<&Value> {
        self.node(id)?.inputs.get(port)?.as_ref()
    }

    /// Outputs of a block from the last evaluation
    pub fn output(&self, id: BlockId, port: usize) -> Option<&Value> {
        self.node(id)?.outputs.get(port)?.as_ref()
    }

    pub fn wires(&self) -> &[Wire] {
        &self.wires
    }

    pub fn clocks(&self) -> &[Clock] {
        &self.clocks
    }

    pub fn clock_info(&self, id: ClockId) -> Option<&Clock> {
        self.clocks.get(id.0)
    }

    /// Clock driving a block, if any
    pub fn clock_of(&self, id: BlockId) -> Option<ClockId> {
        self.node(id).and_then(|n| n.clock)
    }

    /// Width of the global continuous state vector
    pub fn nstates(&self) -> usize {
        self.nstates
    }

    /// Total discrete state width over all clocks
    pub fn ndstates(&self) -> usize {
        self.ndstates
    }

    pub fn statenames(&self) -> &[String] {
        &self.statenames
    }

    /// Enable the non-finite check on every propagated value
    pub fn set_check_finite(&mut self, enabled: bool) {
        self.check_finite = enabled;
    }

    /// Width of the InPort and OutPort boundary of this diagram used as a
    /// subsystem
    pub fn boundary_widths(&self) -> Result<(usize, usize), String> {
        let mut widths = [(BlockClass::InPort, 0usize, 0usize), (BlockClass::OutPort, 0, 0)];
        for node in self.nodes.iter().flatten() {
            for (class, count, width) in widths.iter_mut() {
                if node.class() == *class {
                    *count += 1;
                    *width = match class {
                        BlockClass::InPort => node.block.nout(),
                        _ => node.block.nin(),
                    };
                }
            }
        }
        let [(_, nin_count, nin), (_, nout_count, nout)] = widths;
        if nin_count > 1 {
            return Err(format!("has {} inport blocks, at most one allowed", nin_count));
        }
        if nout_count > 1 {
            return Err(format!("has {} outport blocks, at most one allowed", nout_count));
        }
        Ok((nin, nout))
    }

    /// Continuous state at the start of a run
    pub fn getstate0(&self) -> Vec<f64> {
        self.transfer_blocks()
            .flat_map(|node| node.block.initial_state())
            .collect()
    }

    /// Current global continuous state
    pub fn getstate(&self) -> Vec<f64> {
        self.transfer_blocks()
            .flat_map(|node| node.block.state())
            .collect()
    }

    /// Scatter the global continuous state over the transfer blocks, in
    /// diagram order. The vector must be consumed exactly.
    pub fn setstate(&mut self, x: &[f64]) -> Result<(), RuntimeError> {
        let mut rest = x;
        for id in self.order.clone() {
            if let Some(node) = self.node_mut(id) {
                if node.class() != BlockClass::Transfer {
                    continue;
                }
                let n = node.block.nstates();
                if rest.len() < n {
                    return Err(RuntimeError::StateLength {
                        expected: self.nstates,
                        got: x.len(),
                    });
                }
                let (head, tail) = rest.split_at(n);
                node.block.set_state(head);
                rest = tail;
            }
        }
        if !rest.is_empty() {
            return Err(RuntimeError::StateLength {
                expected: self.nstates,
                got: x.len(),
            });
        }
        Ok(())
    }

    pub(crate) fn transfer_blocks(&self) -> impl Iterator<Item = &Node> + '_ {
        self.order
            .iter()
            .filter_map(|id| self.node(*id))
            .filter(|n| n.class() == BlockClass::Transfer)
    }

    /// Log the block, wire and clock tables
    pub fn report(&self) {
        info!(
            "diagram {:?}: {} blocks, {} wires, {} clocks, {} states",
            self.name,
            self.blocks().count(),
            self.wires.len(),
            self.clocks.len(),
            self.nstates
        );
        for id in self.blocks() {
            if let Some(node) = self.node(id) {
                let b = &node.block;
                info!(
                    "  {:>4} {:<24} {:<10} {:<10} nin={} nout={} nstates={} ndstates={}",
                    id.0,
                    node.name,
                    b.type_name(),
                    b.class().to_string(),
                    b.nin(),
                    b.nout(),
                    b.nstates(),
                    b.ndstates()
                );
            }
        }
        for wire in &self.wires {
            info!("  {:>4} {}", wire.id.0, self.wire_label(wire));
        }
        for clock in &self.clocks {
            let members: Vec<String> = clock.blocks().iter().map(|b| self.label(*b)).collect();
            info!(
                "  {} T={} offset={} blocks=[{}]",
                clock.name(),
                clock.period(),
                clock.offset(),
                members.join(", ")
            );
        }
    }
}

fn ports_suffix(plug: &Plug) -> String {
    match &plug.ports {
        crate::plug::Ports::Single(p) => format!("[{}]", p),
        crate::plug::Ports::Slice(r) => format!("[{}:{}]", r.start, r.end),
    }
}

impl fmt::Debug for BlockDiagram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockDiagram")
            .field("name", &self.name)
            .field("blocks", &self.blocks().count())
            .field("wires", &self.wires.len())
            .field("clocks", &self.clocks.len())
            .field("compiled", &self.compiled)
            .finish()
    }
}
