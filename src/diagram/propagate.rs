//! Signal propagation and per-run block lifecycle
//!
//! One evaluation sets the continuous state, fires every root block
//! (sources, transfer and clocked blocks) and pushes values along wires.
//! A function block fires as soon as its last input arrives; a work list
//! keeps the traversal iterative so long chains cannot exhaust the stack.

use tracing::debug;

use super::BlockDiagram;
use crate::block::BlockClass;
use crate::error::{BlockError, RuntimeError};
use crate::plug::{BlockId, ClockId, WireId};
use crate::sim::RunState;

impl BlockDiagram {
    /// Evaluate the diagram for state `x` at time `t`, returning `dx/dt`.
    ///
    /// Afterwards every block's input cache holds the values of this pass.
    pub fn evaluate(&mut self, x: &[f64], t: f64) -> Result<Vec<f64>, RuntimeError> {
        if !self.compiled {
            return Err(RuntimeError::NotCompiled);
        }
        self.evaluate_at(x, t)
    }

    pub(crate) fn evaluate_at(&mut self, x: &[f64], t: f64) -> Result<Vec<f64>, RuntimeError> {
        self.setstate(x)?;
        self.propagate(t)?;
        self.derivative(t)
    }

    /// Compute all block outputs at time `t` from the current states
    pub(crate) fn propagate(&mut self, t: f64) -> Result<(), RuntimeError> {
        for node in self.nodes.iter_mut().flatten() {
            node.reset();
        }
        for wire in self.wires.iter_mut() {
            wire.value = None;
        }

        let roots: Vec<BlockId> = self
            .order
            .iter()
            .copied()
            .filter(|id| self.node(*id).is_some_and(|n| n.class().is_root()))
            .collect();

        let mut ready = Vec::new();
        for root in roots {
            self.fire(root, t, &mut ready)?;
            while let Some(id) = ready.pop() {
                self.fire(id, t, &mut ready)?;
            }
        }

        let incomplete: Vec<String> = self
            .order
            .iter()
            .filter_map(|id| self.node(*id))
            .filter(|n| !n.inputs.is_empty() && !n.updated)
            .map(|n| n.name.clone())
            .collect();
        if !incomplete.is_empty() {
            return Err(RuntimeError::Incomplete { blocks: incomplete });
        }
        Ok(())
    }

    /// Compute one block's outputs and deliver them along its wires
    pub(crate) fn fire(&mut self, id: BlockId, t: f64, ready: &mut Vec<BlockId>) -> Result<(), RuntimeError> {
        let Some(node) = self.node(id) else {
            return Ok(());
        };
        let name = node.name.clone();
        let inputs = if node.class().is_root() {
            Vec::new()
        } else {
            node.known_inputs().unwrap_or_default()
        };
        let outputs = node
            .block
            .output(t, &inputs)
            .map_err(|source| RuntimeError::Block {
                block: name.clone(),
                t,
                source,
            })?;
        if outputs.len() != node.outports.len() {
            return Err(RuntimeError::Block {
                block: name,
                t,
                source: BlockError::Failed(format!(
                    "produced {} outputs, expected {}",
                    outputs.len(),
                    node.outports.len()
                )),
            });
        }
        let fanout: Vec<(usize, WireId)> = node
            .outports
            .iter()
            .enumerate()
            .flat_map(|(port, wires)| wires.iter().map(move |w| (port, *w)))
            .collect();

        for (port, wid) in fanout {
            let value = &outputs[port];
            if self.check_finite && !value.is_finite() {
                let wire = self
                    .wires
                    .get(wid.0)
                    .map(|w| self.wire_label(w))
                    .unwrap_or_else(|| wid.to_string());
                return Err(RuntimeError::NonFinite {
                    wire,
                    block: name,
                    port,
                    t,
                });
            }
            let Some(wire) = self.wires.get_mut(wid.0) else {
                continue;
            };
            wire.value = Some(value.clone());
            let end = wire.end;

            let Some(dest) = self.node_mut(end.block) else {
                continue;
            };
            if let Some(slot) = dest.inputs.get_mut(end.port) {
                if slot.is_none() {
                    dest.missing = dest.missing.saturating_sub(1);
                }
                *slot = Some(value.clone());
            }
            if dest.missing == 0 && !dest.updated {
                dest.updated = true;
                if dest.class().is_combinational() {
                    ready.push(end.block);
                }
            }
        }

        if let Some(node) = self.node_mut(id) {
            node.outputs = outputs.into_iter().map(Some).collect();
        }
        Ok(())
    }

    /// Concatenated derivatives of all transfer blocks, from the inputs of
    /// the last propagation
    pub(crate) fn derivative(&self, t: f64) -> Result<Vec<f64>, RuntimeError> {
        let mut dx = Vec::with_capacity(self.nstates);
        for node in self.transfer_blocks() {
            let inputs = node.known_inputs().ok_or_else(|| RuntimeError::Incomplete {
                blocks: vec![node.name.clone()],
            })?;
            let d = node
                .block
                .deriv(t, &inputs)
                .map_err(|source| RuntimeError::Block {
                    block: node.name.clone(),
                    t,
                    source,
                })?;
            if d.len() != node.block.nstates() {
                return Err(RuntimeError::Block {
                    block: node.name.clone(),
                    t,
                    source: BlockError::Failed(format!(
                        "derivative has {} elements, expected {}",
                        d.len(),
                        node.block.nstates()
                    )),
                });
            }
            dx.extend(d);
        }
        Ok(dx)
    }

    /// Step every sink once with its stabilized inputs
    pub fn step(&mut self, t: f64, run: &mut RunState) -> Result<(), RuntimeError> {
        let order = self.order.clone();
        self.step_sinks(&order, t, run)
    }

    pub(crate) fn step_sinks(
        &mut self,
        ids: &[BlockId],
        t: f64,
        run: &mut RunState,
    ) -> Result<(), RuntimeError> {
        for &id in ids {
            let Some(node) = self.node_mut(id) else {
                continue;
            };
            if node.class() != BlockClass::Sink {
                continue;
            }
            let Some(inputs) = node.known_inputs() else {
                continue;
            };
            let already = run.stop_requested();
            node.block
                .step(t, &inputs, run)
                .map_err(|source| RuntimeError::Block {
                    block: node.name.clone(),
                    t,
                    source,
                })?;
            if !already && run.stop_requested() {
                debug!("stop requested by {} at t={}", node.name, t);
                run.stopped_by.get_or_insert_with(|| node.name.clone());
            }
        }
        Ok(())
    }

    /// Put every stateful block back to its initial state
    pub(crate) fn reset_states(&mut self) {
        for node in self.nodes.iter_mut().flatten() {
            if matches!(node.class(), BlockClass::Transfer | BlockClass::Clocked) {
                let x0 = node.block.initial_state();
                node.block.set_state(&x0);
            }
        }
        for i in 0..self.clocks.len() {
            self.refresh_clock_state(ClockId(i));
        }
    }

    fn refresh_clock_state(&mut self, cid: ClockId) {
        let Some(members) = self.clocks.get(cid.0).map(|c| c.blocks.clone()) else {
            return;
        };
        let x: Vec<f64> = members
            .iter()
            .filter_map(|id| self.node(*id))
            .flat_map(|n| n.block.state())
            .collect();
        if let Some(clock) = self.clocks.get_mut(cid.0) {
            clock.x = x;
        }
    }

    /// Start all blocks and rewind states and clocks for a new run
    pub fn start(&mut self) -> Result<(), RuntimeError> {
        if !self.compiled {
            return Err(RuntimeError::NotCompiled);
        }
        for id in self.order.clone() {
            if let Some(node) = self.node_mut(id) {
                node.block.start().map_err(|source| RuntimeError::Block {
                    block: node.name.clone(),
                    t: 0.0,
                    source,
                })?;
            }
        }
        self.reset_states();
        for clock in self.clocks.iter_mut() {
            clock.start();
        }
        // latch t=0 inputs so the first clock tick never sees a previous run
        self.propagate(0.0)
    }

    /// Notify all blocks that the run is over
    pub fn done(&mut self) {
        for node in self.nodes.iter_mut().flatten() {
            node.block.done();
        }
    }

    /// Move a clock to its following tick, returning the tick time
    pub(crate) fn advance_clock(&mut self, cid: ClockId) -> Option<f64> {
        self.clocks.get_mut(cid.0).map(|c| c.advance())
    }

    /// Fire a clock tick at `t`: record the discrete state, then advance
    /// every member block from its current inputs. Members whose inputs
    /// are not known yet keep their state.
    pub(crate) fn tick_clock(&mut self, cid: ClockId, t: f64) -> Result<(), RuntimeError> {
        let Some(clock) = self.clocks.get_mut(cid.0) else {
            return Ok(());
        };
        clock.save_state(t);
        let period = clock.period();
        let members = clock.blocks.clone();

        for id in members {
            let Some(node) = self.node_mut(id) else {
                continue;
            };
            let Some(inputs) = node.known_inputs() else {
                continue;
            };
            let next = node
                .block
                .next(&inputs, period)
                .map_err(|source| RuntimeError::Block {
                    block: node.name.clone(),
                    t,
                    source,
                })?;
            if next.len() != node.block.ndstates() {
                return Err(RuntimeError::Block {
                    block: node.name.clone(),
                    t,
                    source: BlockError::Failed(format!(
                        "next state has {} elements, expected {}",
                        next.len(),
                        node.block.ndstates()
                    )),
                });
            }
            node.block.set_state(&next);
        }
        self.refresh_clock_state(cid);
        Ok(())
    }
}
