//! tainthound - taint-flow and vulnerability-pattern analysis.
//!
//! Ingests a tree of source files (Python fully, JavaScript/TypeScript
//! at reduced fidelity) and reports injected flaws -- SQL injection,
//! command injection, SSRF, unsafe deserialization, resource leaks,
//! lock-order deadlocks, check-then-act races, missing transactions --
//! with source-to-sink provenance on every finding.
//!
//! # Architecture
//!
//! - **Model** ([`model`]): per-file normalized source model; statements
//!   carry read/write/call facts and each function owns a CFG with
//!   branch, loop, exception-handler, and return edges
//! - **Language layer** ([`lang`]): tree-sitter grammars behind the
//!   `Language` trait, plus content-shape classification for files whose
//!   extension lies about their contents
//! - **Resolution** ([`resolve`]): symbol arena, import resolution
//!   (circular imports share one definition), call graph with explicit
//!   `Dynamic` blind-spot nodes for reflective dispatch
//! - **Taint** ([`taint`]): configured source/sink matchers and the
//!   worklist propagation engine
//! - **Detectors** ([`detect`]): structural anti-pattern passes with
//!   panic isolation
//! - **Report** ([`report`]): deduplicated, severity-ranked findings
//!   with deterministic serialization
//! - **Pipeline** ([`pipeline`]): parallel build, resolution barrier,
//!   parallel detection, aggregation, cancellation
//!
//! # Quick start
//!
//! ```no_run
//! use tainthound::{AnalysisConfig, Analyzer};
//!
//! let analyzer = Analyzer::new(AnalysisConfig::default());
//! let report = analyzer.run(std::path::Path::new("./services"))?;
//! for finding in &report.findings {
//!     println!("[{}] {} {}:{}", finding.severity, finding.rule_id,
//!              finding.file, finding.line_start);
//! }
//! std::process::exit(report.exit_code(analyzer.config().fail_on));
//! # Ok::<(), tainthound::HoundError>(())
//! ```

pub mod cancel;
pub mod config;
pub mod detect;
pub mod error;
pub mod lang;
pub mod model;
pub mod pipeline;
pub mod report;
pub mod resolve;
pub mod taint;

pub use cancel::CancelToken;
pub use config::AnalysisConfig;
pub use error::{HoundError, Result};
pub use model::{ModelBuilder, SourceUnit};
pub use pipeline::Analyzer;
pub use report::{aggregate, render_text, EvidenceStep, Finding, Report, Severity};
pub use resolve::{CallGraph, Program, SymbolTable};
pub use taint::{TaintEngine, TaintFact};
