//! Diagram compilation
//!
//! Flattens subsystems, validates blocks, clocks and wiring, detects
//! algebraic loops and lays out the global state vector. Every problem
//! found is collected and logged; compilation succeeds only when none
//! remain and a dry-run evaluation at t=0 goes through.

use std::collections::HashMap;

use tracing::{error, info, warn};

use super::BlockDiagram;
use crate::block::BlockClass;
use crate::error::{CompileError, RuntimeError};
use crate::events::commensurate;
use crate::plug::{BlockId, WireId};
use crate::utils::constants::CLOCK_RATIO_TOLERANCE;

impl BlockDiagram {
    /// Compile the diagram, ready for evaluation and simulation.
    ///
    /// Modifying the diagram afterwards clears the compiled flag.
    pub fn compile(&mut self) -> Result<(), CompileError> {
        self.compiled = false;
        info!("compiling diagram {:?}", self.name);

        if let Err(err) = self.flatten() {
            return Err(self.fail(err));
        }
        self.order = self.blocks().collect();

        let mut errors = Vec::new();
        self.check_names(&mut errors);
        self.check_blocks(&mut errors);
        self.check_clocks(&mut errors);
        self.connect_ports(&mut errors);
        if errors.is_empty() {
            self.check_loops(&mut errors);
        }
        if let Some(err) = CompileError::collect(errors) {
            return Err(self.fail(err));
        }

        self.layout_states();
        if let Err(err) = self.dry_run() {
            return Err(self.fail(CompileError::Evaluation(Box::new(err))));
        }

        self.compiled = true;
        info!(
            "compiled: {} blocks, {} wires, {} clocks, {} continuous states, {} discrete states",
            self.order.len(),
            self.wires.len(),
            self.clocks.len(),
            self.nstates,
            self.ndstates
        );
        Ok(())
    }

    fn fail(&self, err: CompileError) -> CompileError {
        for e in err.iter() {
            error!("{}", e);
        }
        err
    }

    fn check_names(&mut self, errors: &mut Vec<CompileError>) {
        self.name_index.clear();
        let mut index = HashMap::new();
        for id in &self.order {
            if let Some(node) = self.node(*id) {
                if index.insert(node.name.clone(), *id).is_some() {
                    errors.push(CompileError::DuplicateName(node.name.clone()));
                }
            }
        }
        self.name_index = index;
    }

    fn check_blocks(&self, errors: &mut Vec<CompileError>) {
        for node in self.order.iter().filter_map(|id| self.node(*id)) {
            match node.class() {
                BlockClass::InPort | BlockClass::OutPort => {
                    errors.push(CompileError::MisplacedPort {
                        block: node.name.clone(),
                        kind: node.block.type_name(),
                    });
                    continue;
                }
                BlockClass::Clocked => {
                    if node.clock.map_or(true, |c| c.0 >= self.clocks.len()) {
                        errors.push(CompileError::UnclockedBlock(node.name.clone()));
                    }
                }
                _ => {}
            }
            if let Err(source) = node.block.check() {
                errors.push(CompileError::BadParameter {
                    block: node.name.clone(),
                    source,
                });
            }
        }
    }

    fn check_clocks(&mut self, errors: &mut Vec<CompileError>) {
        for clock in &self.clocks {
            if let Err(source) = clock.check() {
                errors.push(CompileError::BadParameter {
                    block: clock.name().to_string(),
                    source,
                });
            }
        }

        let mut periods: Vec<f64> = self.clocks.iter().map(|c| c.period()).collect();
        periods.sort_by(f64::total_cmp);
        periods.dedup();
        for (i, short) in periods.iter().enumerate() {
            for long in &periods[i + 1..] {
                if !commensurate(*short, *long, CLOCK_RATIO_TOLERANCE) {
                    errors.push(CompileError::IncommensurateClocks {
                        short: *short,
                        long: *long,
                    });
                }
            }
        }

        for clock in self.clocks.iter_mut() {
            clock.blocks.clear();
        }
        for id in &self.order {
            let Some(cid) = self.node(*id).and_then(|n| n.clock) else {
                continue;
            };
            if let Some(clock) = self.clocks.get_mut(cid.0) {
                clock.blocks.push(*id);
            }
        }
    }

    /// Rebuild each block's port-to-wire tables from the wire list
    fn connect_ports(&mut self, errors: &mut Vec<CompileError>) {
        for node in self.nodes.iter_mut().flatten() {
            node.inports = vec![None; node.block.nin()];
            node.outports = vec![Vec::new(); node.block.nout()];
            node.reset();
        }

        let mut drivers: HashMap<(BlockId, usize), usize> = HashMap::new();
        for i in 0..self.wires.len() {
            let (start, end) = (self.wires[i].start, self.wires[i].end);
            let wid = WireId(i);

            let started = match self.node_mut(start.block) {
                Some(node) if start.port < node.outports.len() => {
                    node.outports[start.port].push(wid);
                    true
                }
                _ => false,
            };
            if !started {
                errors.push(self.port_error(start.block, start.port, true));
                continue;
            }
            let ended = match self.node_mut(end.block) {
                Some(node) if end.port < node.inports.len() => {
                    node.inports[end.port] = Some(wid);
                    true
                }
                _ => false,
            };
            if ended {
                *drivers.entry((end.block, end.port)).or_insert(0) += 1;
            } else {
                errors.push(self.port_error(end.block, end.port, false));
            }
        }

        let mut multi: Vec<_> = drivers.into_iter().filter(|(_, n)| *n > 1).collect();
        multi.sort();
        for ((block, port), wires) in multi {
            errors.push(CompileError::MultiDrivenInput {
                block: self.label(block),
                port,
                wires,
            });
        }

        for node in self.order.iter().filter_map(|id| self.node(*id)) {
            for (port, wire) in node.inports.iter().enumerate() {
                if wire.is_none() {
                    errors.push(CompileError::UnconnectedInput {
                        block: node.name.clone(),
                        port,
                    });
                }
            }
            for (port, wires) in node.outports.iter().enumerate() {
                if wires.is_empty() {
                    warn!("output port {}[{}] is not connected", node.name, port);
                }
            }
        }
    }

    fn port_error(&self, block: BlockId, port: usize, output: bool) -> CompileError {
        let available = self
            .node(block)
            .map(|n| if output { n.outports.len() } else { n.inports.len() })
            .unwrap_or(0);
        CompileError::PortOutOfRange {
            block: self.label(block),
            port,
            available,
            direction: if output { "output" } else { "input" },
        }
    }

    /// Find cycles made only of function blocks. Any cycle through a
    /// transfer or clocked block is broken by its state.
    fn check_loops(&self, errors: &mut Vec<CompileError>) {
        let n = self.nodes.len();
        let is_function = |i: usize| {
            self.node(BlockId(i))
                .is_some_and(|node| node.class() == BlockClass::Function)
        };
        let adjacency: Vec<Vec<usize>> = (0..n)
            .map(|i| match self.node(BlockId(i)) {
                Some(node) if is_function(i) => node
                    .outports
                    .iter()
                    .flatten()
                    .filter_map(|w| self.wires.get(w.0))
                    .map(|w| w.end.block.0)
                    .filter(|j| is_function(*j))
                    .collect(),
                _ => Vec::new(),
            })
            .collect();

        // 0 unvisited, 1 on the current path, 2 finished
        let mut color = vec![0u8; n];
        for root in (0..n).filter(|i| is_function(*i)) {
            if color[root] != 0 {
                continue;
            }
            color[root] = 1;
            let mut stack: Vec<(usize, usize)> = vec![(root, 0)];
            while let Some(&(u, next)) = stack.last() {
                let Some(&v) = adjacency[u].get(next) else {
                    color[u] = 2;
                    stack.pop();
                    continue;
                };
                if let Some(top) = stack.last_mut() {
                    top.1 += 1;
                }
                match color[v] {
                    0 => {
                        color[v] = 1;
                        stack.push((v, 0));
                    }
                    1 => {
                        if let Some(pos) = stack.iter().position(|(w, _)| *w == v) {
                            let mut cycle: Vec<String> = stack[pos..]
                                .iter()
                                .map(|(w, _)| self.label(BlockId(*w)))
                                .collect();
                            cycle.push(self.label(BlockId(v)));
                            errors.push(CompileError::AlgebraicLoop { cycle });
                        }
                    }
                    _ => {}
                }
            }
        }
    }

    fn layout_states(&mut self) {
        let mut nstates = 0;
        let mut names = Vec::new();
        for node in self.transfer_blocks() {
            let n = node.block.nstates();
            names.extend((0..n).map(|i| format!("{}x{}", node.name, i)));
            nstates += n;
        }
        self.nstates = nstates;
        self.statenames = names;

        self.ndstates = self
            .order
            .iter()
            .filter_map(|id| self.node(*id))
            .filter(|n| n.class() == BlockClass::Clocked)
            .map(|n| n.block.ndstates())
            .sum();
    }

    /// Evaluate once at t=0 from the initial state to surface shape and
    /// type errors before any run
    fn dry_run(&mut self) -> Result<(), RuntimeError> {
        self.reset_states();
        let x0 = self.getstate0();
        self.evaluate_at(&x0, 0.0).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use crate::blocks::{
        Constant, Function, Gain, InPort, Integrator, Null, Step, Sum, Zoh,
    };
    use crate::diagram::BlockDiagram;
    use crate::error::{BlockError, CompileError};
    use crate::value::Value;

    #[test]
    fn test_compile_simple_chain() {
        let mut bd = BlockDiagram::new();
        let c = bd.add(Constant::new(2.0));
        let g = bd.add(Gain::new(3.0));
        let n = bd.add(Null::new(1));
        bd.connect(c, g).unwrap();
        bd.connect(g, n).unwrap();

        bd.compile().unwrap();
        assert!(bd.is_compiled());
        assert_eq!(bd.input(n, 0).and_then(|v| v.as_f64()), Some(6.0));

        bd.add(Constant::new(1.0));
        assert!(!bd.is_compiled());
    }

    #[test]
    fn test_unconnected_input_fails() {
        let mut bd = BlockDiagram::new();
        let c = bd.add(Constant::new(1.0));
        let s = bd.add(Sum::new("++"));
        bd.connect(c, s.port(0)).unwrap();
        let n = bd.add(Null::new(1));
        bd.connect(s, n).unwrap();

        let err = bd.compile().unwrap_err();
        assert_eq!(
            err,
            CompileError::UnconnectedInput {
                block: "sum.0".into(),
                port: 1
            }
        );
        assert!(!bd.is_compiled());
    }

    #[test]
    fn test_multi_driven_and_duplicate_collected() {
        let mut bd = BlockDiagram::new();
        let a = bd.add_named("src", Constant::new(1.0));
        let b = bd.add_named("src", Constant::new(2.0));
        let n = bd.add(Null::new(1));
        bd.connect(a, n).unwrap();
        bd.connect(b, n).unwrap();

        let err = bd.compile().unwrap_err();
        let all: Vec<_> = err.iter().cloned().collect();
        assert!(all.contains(&CompileError::DuplicateName("src".into())));
        assert!(all.contains(&CompileError::MultiDrivenInput {
            block: "null.0".into(),
            port: 0,
            wires: 2
        }));
    }

    #[test]
    fn test_algebraic_loop_names_cycle() {
        let mut bd = BlockDiagram::new();
        let c = bd.add(Constant::new(1.0));
        let s = bd.add(Sum::new("+-"));
        let g = bd.add(Gain::new(0.5));
        bd.connect(c, s.port(0)).unwrap();
        bd.connect(s, g).unwrap();
        bd.connect(g, s.port(1)).unwrap();

        let err = bd.compile().unwrap_err();
        assert_eq!(
            err,
            CompileError::AlgebraicLoop {
                cycle: vec!["sum.0".into(), "gain.0".into(), "sum.0".into()]
            }
        );
    }

    #[test]
    fn test_loop_through_integrator_is_fine() {
        let mut bd = BlockDiagram::new();
        let x = bd.add(Integrator::new(1.0));
        let g = bd.add(Gain::new(-1.0));
        bd.connect(x, g).unwrap();
        bd.connect(g, x).unwrap();

        bd.compile().unwrap();
        assert_eq!(bd.nstates(), 1);
        assert_eq!(bd.statenames(), ["integrator.0x0"]);
    }

    #[test]
    fn test_clock_checks() {
        let mut bd = BlockDiagram::new();
        let step = bd.add(Step::new(0.0));
        let z = bd.add(Zoh::new(0.0));
        bd.connect(step, z).unwrap();
        let n = bd.add(Null::new(1));
        bd.connect(z, n).unwrap();
        assert!(matches!(
            bd.compile().unwrap_err(),
            CompileError::UnclockedBlock(_)
        ));

        let mut bd = BlockDiagram::new();
        bd.clock(0.2, 0.0);
        bd.clock(0.3, 0.0);
        assert!(matches!(
            bd.compile().unwrap_err(),
            CompileError::IncommensurateClocks { .. }
        ));
    }

    #[test]
    fn test_top_level_inport_rejected() {
        let mut bd = BlockDiagram::new();
        let p = bd.add(InPort::new(1));
        let n = bd.add(Null::new(1));
        bd.connect(p, n).unwrap();
        assert!(matches!(
            bd.compile().unwrap_err(),
            CompileError::MisplacedPort { kind: "inport", .. }
        ));
    }

    #[test]
    fn test_dry_run_surfaces_block_errors() {
        let mut bd = BlockDiagram::new();
        let c = bd.add(Constant::new(1.0));
        let f = bd.add(Function::new(1, 1, |_u| {
            Err(BlockError::Failed("boom".into()))
        }));
        let n = bd.add(Null::new(1));
        bd.connect(c, f).unwrap();
        bd.connect(f, n).unwrap();

        let err = bd.compile().unwrap_err();
        assert!(matches!(err, CompileError::Evaluation(_)));
        assert!(err.to_string().contains("boom"));
        assert!(bd.block(f).is_some_and(|b| b.nin() == 1));
    }

    #[test]
    fn test_inputless_function_rejected() {
        let mut bd = BlockDiagram::new();
        let f = bd.add(Function::new(0, 1, |_u| Ok(vec![Value::Scalar(1.0)])));
        let n = bd.add(Null::new(1));
        bd.connect(f, n).unwrap();

        let err = bd.compile().unwrap_err();
        assert!(err.iter().any(|e| matches!(
            e,
            CompileError::BadParameter {
                block,
                source: BlockError::BadParameter { name, .. },
            } if block == "function.0" && name == "nin"
        )));
        assert!(!bd.is_compiled());
    }
}
