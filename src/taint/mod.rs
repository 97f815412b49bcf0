//! Taint analysis: configured source/sink matchers plus the worklist
//! propagation engine.
//!
//! Sources and sinks are declared statically in configuration, never
//! derived from the code under analysis. The engine seeds facts at
//! statements matching a source, propagates them through assignments,
//! string formatting, and call bindings, and reports a finding whenever
//! a fact reaches a statement matching a sink -- with the shortest
//! discovered source-to-sink path as evidence.

pub mod engine;
pub mod matchers;

pub use engine::{TaintEngine, TaintFact};
pub use matchers::{
    builtin_sanitizers, builtin_sinks, builtin_sources, Matcher, MatchStrategy, SanitizerSpec,
    SinkSpec, SourceSpec,
};
