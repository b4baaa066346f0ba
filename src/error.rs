//! Error types for diagram construction, compilation and simulation runs

use thiserror::Error;

use crate::sim::Trace;

/// Errors raised by block code itself.
///
/// These carry no block name; the diagram wraps them into a [`CompileError`]
/// or [`RuntimeError`] that names the offending block.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BlockError {
    #[error("invalid parameter `{name}`: {reason}")]
    BadParameter { name: String, reason: String },

    #[error("input {port} has width {got}, expected {expected}")]
    InputWidth {
        port: usize,
        expected: usize,
        got: usize,
    },

    #[error("input {port} must be {expected}")]
    InputType { port: usize, expected: &'static str },

    #[error("unknown block type `{0}`")]
    UnknownType(String),

    #[error("{0}")]
    Failed(String),
}

impl BlockError {
    pub fn bad_parameter(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::BadParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

/// Errors found while compiling a diagram. Always fatal, raised before any
/// simulation time advances.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    #[error("input port {block}[{port}] is not connected")]
    UnconnectedInput { block: String, port: usize },

    #[error("input port {block}[{port}] is driven by {wires} wires")]
    MultiDrivenInput {
        block: String,
        port: usize,
        wires: usize,
    },

    #[error("cannot connect {start} to {end}: width {start_width} != {end_width}")]
    WidthMismatch {
        start: String,
        end: String,
        start_width: usize,
        end_width: usize,
    },

    #[error("port {block}[{port}] out of range, block has {available} {direction} ports")]
    PortOutOfRange {
        block: String,
        port: usize,
        available: usize,
        direction: &'static str,
    },

    #[error("algebraic loop through {}", .cycle.join(" -> "))]
    AlgebraicLoop { cycle: Vec<String> },

    #[error("subsystem {subsystem}: {reason}")]
    SubsystemPorts { subsystem: String, reason: String },

    #[error("block {block}: {source}")]
    BadParameter {
        block: String,
        #[source]
        source: BlockError,
    },

    #[error("duplicate block name `{0}`")]
    DuplicateName(String),

    #[error("clocked block {0} is not attached to a clock")]
    UnclockedBlock(String),

    #[error("clock periods {short} and {long} are not integer multiples")]
    IncommensurateClocks { short: f64, long: f64 },

    #[error("{kind} block {block} is only valid inside a subsystem")]
    MisplacedPort { block: String, kind: &'static str },

    #[error("dry run at t=0 failed: {0}")]
    Evaluation(#[source] Box<RuntimeError>),

    #[error("{} compile errors, first: {}", .0.len(), .0.first().map(|e| e.to_string()).unwrap_or_default())]
    Multiple(Vec<CompileError>),
}

impl CompileError {
    /// Collapse a list of errors into a single error, `None` when empty.
    pub(crate) fn collect(mut errors: Vec<CompileError>) -> Option<CompileError> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(CompileError::Multiple(errors)),
        }
    }

    /// Iterate over every individual error, flattening `Multiple`.
    pub fn iter(&self) -> Box<dyn Iterator<Item = &CompileError> + '_> {
        match self {
            CompileError::Multiple(errors) => Box::new(errors.iter().flat_map(|e| e.iter())),
            other => Box::new(std::iter::once(other)),
        }
    }
}

/// Numerical integrator failures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SolverError {
    #[error("timestep {dt} smaller than minimum {dt_min}")]
    TimestepTooSmall { dt: f64, dt_min: f64 },

    #[error("step rejected {0} times in a row")]
    TooManyRejections(usize),

    #[error("history buffer is empty")]
    EmptyHistory,

    #[error("non-finite state after step of size {dt}")]
    NonFiniteStep { dt: f64 },
}

/// Errors fatal to the current run. The caller gets them back together with
/// the partial trace through [`RunFailure`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuntimeError {
    #[error("diagram is not compiled")]
    NotCompiled,

    #[error("state vector has {got} elements, diagram has {expected} states")]
    StateLength { expected: usize, got: usize },

    #[error("propagation left blocks without complete inputs: {}", .blocks.join(", "))]
    Incomplete { blocks: Vec<String> },

    #[error("non-finite value on {wire} from {block}[{port}] at t={t}")]
    NonFinite {
        wire: String,
        block: String,
        port: usize,
        t: f64,
    },

    #[error("block {block} failed at t={t}: {source}")]
    Block {
        block: String,
        t: f64,
        #[source]
        source: BlockError,
    },

    #[error("solver {solver} failed at t={t}: {source}")]
    Solver {
        solver: &'static str,
        t: f64,
        #[source]
        source: SolverError,
    },

    #[error("step size {step} fell below {min_step} at t={t}")]
    StepUnderflow { t: f64, step: f64, min_step: f64 },

    #[error("continuous block {block} cannot run in real time")]
    ContinuousInRealTime { block: String },

    #[error("blocks not reachable from any clock: {}", .blocks.join(", "))]
    Unscheduled { blocks: Vec<String> },

    #[error("unknown watched signal `{name}`")]
    UnknownSignal { name: String },

    #[error("invalid run option: {0}")]
    InvalidOption(String),
}

/// A run that ended with an error, carrying the trace up to the failure.
#[derive(Error, Debug)]
#[error("{error}")]
pub struct RunFailure {
    #[source]
    pub error: RuntimeError,
    pub partial: Box<Trace>,
}

impl RunFailure {
    pub(crate) fn new(error: RuntimeError, partial: Trace) -> Self {
        Self {
            error,
            partial: Box::new(partial),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_single_and_multiple() {
        assert!(CompileError::collect(vec![]).is_none());

        let one = CompileError::collect(vec![CompileError::DuplicateName("a".into())]);
        assert_eq!(one, Some(CompileError::DuplicateName("a".into())));

        let many = CompileError::collect(vec![
            CompileError::DuplicateName("a".into()),
            CompileError::UnconnectedInput {
                block: "b".into(),
                port: 1,
            },
        ])
        .unwrap();
        assert_eq!(many.iter().count(), 2);
        assert!(many.to_string().contains("2 compile errors"));
    }

    #[test]
    fn test_messages_name_the_block() {
        let err = RuntimeError::Block {
            block: "gain.0".into(),
            t: 1.5,
            source: BlockError::InputType {
                port: 0,
                expected: "numeric",
            },
        };
        assert!(err.to_string().contains("gain.0"));

        let err = CompileError::AlgebraicLoop {
            cycle: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "algebraic loop through a -> b -> a");
    }
}
