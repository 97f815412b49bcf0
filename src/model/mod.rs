//! Normalized source model.
//!
//! The model is the hand-off point between parsing and analysis: once a
//! file is lowered into a [`SourceUnit`], no later phase touches the
//! syntax tree. Statements carry name-level facts (reads, writes, call
//! sites, effect flags) and each function owns a CFG with branch, loop,
//! exception-handler, and return edges.

pub mod builder;
pub mod types;

pub use builder::{BuildOutput, ModelBuilder};
pub use types::{
    CallArg, CallSite, Cfg, CfgEdge, ClassDecl, EdgeKind, FunctionModel, ImportDecl, ImportedName,
    ModuleBinding, SourceUnit, Statement, StmtId, StmtKind, WithItem,
};
