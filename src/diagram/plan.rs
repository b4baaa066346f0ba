//! Per-clock execution plans for real-time runs

use std::collections::VecDeque;

use super::BlockDiagram;
use crate::block::BlockClass;
use crate::error::RuntimeError;
use crate::plug::{BlockId, ClockId};
use crate::sim::RunState;

impl BlockDiagram {
    /// Blocks that must execute on each tick of `clock`, in firing order.
    ///
    /// Starts from the clock's own blocks and collects their dependents
    /// (forward, through function blocks) and the data dependencies of
    /// everything collected (backward, up to the nearest root blocks).
    /// Roots come first in diagram order, followed by the remaining blocks
    /// in topological order.
    pub fn clock_plan(&self, clock: ClockId) -> Vec<BlockId> {
        let Some(members) = self.clocks.get(clock.0).map(|c| c.blocks.clone()) else {
            return Vec::new();
        };
        let n = self.nodes.len();
        let mut forward = vec![false; n];
        let mut backward = vec![false; n];

        let mut stack: Vec<(BlockId, bool)> = Vec::new();
        for id in &members {
            stack.push((*id, true));
            stack.push((*id, false));
        }
        while let Some((id, ahead)) = stack.pop() {
            let Some(node) = self.node(id) else { continue };
            let own = node.clock == Some(clock);
            let class = node.class();
            if ahead {
                if std::mem::replace(&mut forward[id.0], true) {
                    continue;
                }
                if own || class.is_combinational() {
                    for wid in node.outports.iter().flatten() {
                        if let Some(w) = self.wires.get(wid.0) {
                            stack.push((w.end.block, true));
                        }
                    }
                }
                if !class.is_root() {
                    stack.push((id, false));
                }
            } else {
                if std::mem::replace(&mut backward[id.0], true) {
                    continue;
                }
                if own || !class.is_root() {
                    for wid in node.inports.iter().flatten() {
                        if let Some(w) = self.wires.get(wid.0) {
                            stack.push((w.start.block, false));
                        }
                    }
                }
            }
        }

        let selected = |id: &BlockId| forward[id.0] || backward[id.0];
        let (mut plan, rest): (Vec<BlockId>, Vec<BlockId>) = self
            .order
            .iter()
            .copied()
            .filter(selected)
            .partition(|id| self.node(*id).is_some_and(|n| n.class().is_root()));

        let in_rest = |id: BlockId| rest.contains(&id);
        let mut indegree: Vec<usize> = rest
            .iter()
            .map(|id| {
                self.node(*id).map_or(0, |node| {
                    node.inports
                        .iter()
                        .flatten()
                        .filter_map(|w| self.wires.get(w.0))
                        .filter(|w| in_rest(w.start.block))
                        .count()
                })
            })
            .collect();

        let mut ready: VecDeque<usize> = (0..rest.len()).filter(|i| indegree[*i] == 0).collect();
        while let Some(i) = ready.pop_front() {
            let id = rest[i];
            plan.push(id);
            let Some(node) = self.node(id) else { continue };
            for wid in node.outports.iter().flatten() {
                let Some(w) = self.wires.get(wid.0) else { continue };
                if let Some(j) = rest.iter().position(|r| *r == w.end.block) {
                    indegree[j] = indegree[j].saturating_sub(1);
                    if indegree[j] == 0 {
                        ready.push_back(j);
                    }
                }
            }
        }
        plan
    }

    /// Fire the blocks of a plan in order, then step its sinks.
    ///
    /// Non-root blocks start from an empty input cache. Root blocks keep
    /// their latched inputs, which clocked blocks consume on their next tick.
    pub(crate) fn run_plan(
        &mut self,
        plan: &[BlockId],
        t: f64,
        run: &mut RunState,
    ) -> Result<(), RuntimeError> {
        for id in plan {
            if let Some(node) = self.node_mut(*id) {
                if !node.class().is_root() {
                    node.reset();
                }
            }
        }
        let mut ready = Vec::new();
        for id in plan {
            if self
                .node(*id)
                .is_some_and(|n| n.class() != BlockClass::Sink)
            {
                self.fire(*id, t, &mut ready)?;
                ready.clear();
            }
        }
        self.step_sinks(plan, t, run)
    }
}
