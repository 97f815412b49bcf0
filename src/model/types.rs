//! Normalized source model types.
//!
//! One [`SourceUnit`] per analyzed file, immutable after construction.
//! Statements are the unit of analysis: each carries the name-level facts
//! (reads, writes, call sites, effect flags) the taint engine and pattern
//! detectors consume, so no downstream pass needs to touch the syntax
//! tree again.

use serde::{Deserialize, Serialize};

// =============================================================================
// Statements
// =============================================================================

/// Index of a statement within its owning function (or module body).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct StmtId(pub usize);

/// Syntactic category of a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StmtKind {
    /// Assignment (including augmented and annotated forms)
    Assign,
    /// Bare expression statement (usually a call)
    Expr,
    /// Return statement
    Return,
    /// Raise/throw statement
    Raise,
    /// Conditional header (the condition itself; branches are CFG edges)
    If,
    /// Loop header (for/while)
    Loop,
    /// Context-manager entry (`with ...`)
    With,
    /// Exception handler entry (`except ...:` / `catch (...)`)
    Handler,
    /// `global`/`nonlocal` declaration
    Global,
    /// `pass` / empty statement
    Pass,
    /// Anything else (delete, assert, import-in-function, ...)
    Other,
}

/// One argument at a call site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallArg {
    /// Raw argument text, trimmed
    pub text: String,
    /// Name and dotted-attribute atoms referenced by the argument
    pub atoms: Vec<String>,
}

/// A call expression observed inside a statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSite {
    /// Callee text as written: `open`, `cursor.execute`, `self.save`
    pub callee: String,
    /// Positional and keyword arguments in order
    pub args: Vec<CallArg>,
    /// Line of the call (1-indexed)
    pub line: usize,
}

impl CallSite {
    /// All name atoms flowing into the call, across every argument.
    pub fn arg_atoms(&self) -> impl Iterator<Item = &str> {
        self.args.iter().flat_map(|a| a.atoms.iter().map(String::as_str))
    }
}

/// A resource or lock item bound by a `with` statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithItem {
    /// The context expression text (`open(path)`, `lock_a`, `conn`)
    pub context: String,
    /// Bound name from `as`, when present
    pub as_name: Option<String>,
}

/// One statement of the normalized model; one CFG node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Statement {
    /// Index within the owning function body
    pub id: StmtId,
    /// Start line (1-indexed)
    pub line_start: usize,
    /// End line (1-indexed, inclusive)
    pub line_end: usize,
    /// Syntactic category
    pub kind: StmtKind,
    /// Names and dotted paths read by this statement
    pub reads: Vec<String>,
    /// Names written (assignment targets, loop variables, `with ... as`)
    pub writes: Vec<String>,
    /// Call sites inside the statement, in source order
    pub calls: Vec<CallSite>,
    /// Context-manager items (only for `StmtKind::With`)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub with_items: Vec<WithItem>,
    /// True when the statement builds a string from interpolation,
    /// concatenation, `%` formatting, or `.format(...)`. Taint of any
    /// operand taints the result.
    #[serde(default)]
    pub formats_string: bool,
    /// First line of source text, trimmed (for messages and evidence)
    pub text: String,
}

impl Statement {
    /// Check whether the statement reads the given name, either exactly
    /// or as the base of a dotted path (`balance` matches
    /// `balance["total"]` reads recorded as `balance`).
    #[must_use]
    pub fn reads_name(&self, name: &str) -> bool {
        self.reads
            .iter()
            .any(|r| r == name || r.starts_with(name) && r.as_bytes().get(name.len()) == Some(&b'.'))
    }

    /// Check whether the statement writes the given name.
    #[must_use]
    pub fn writes_name(&self, name: &str) -> bool {
        self.writes.iter().any(|w| w == name)
    }
}

// =============================================================================
// Control-flow graph
// =============================================================================

/// Semantic kind of a CFG edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    /// Sequential fallthrough
    Seq,
    /// True branch of a conditional
    BranchTrue,
    /// False/else branch of a conditional
    BranchFalse,
    /// Back edge to a loop header
    LoopBack,
    /// Loop exit (condition exhausted or break)
    LoopExit,
    /// Exception-handler edge (statement may raise into a handler, or
    /// propagate out of the function)
    Exception,
    /// Return to the function exit node
    Return,
}

/// A directed CFG edge between statement nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CfgEdge {
    pub from: StmtId,
    pub to: StmtId,
    pub kind: EdgeKind,
}

/// Control-flow graph over one function body.
///
/// Nodes are the statements of [`FunctionModel::statements`] plus one
/// synthetic exit node whose id is `statements.len()`. Every terminating
/// path (explicit return, fallthrough, propagating raise) has an edge to
/// the exit node, which is what path-sensitive detectors walk to.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Cfg {
    /// Entry statement, `None` for an empty body
    pub entry: Option<StmtId>,
    /// All edges
    pub edges: Vec<CfgEdge>,
    /// Synthetic exit node id (== number of statements)
    pub exit: StmtId,
}

impl Cfg {
    /// Successors of a node with the connecting edge kinds.
    pub fn successors(&self, node: StmtId) -> impl Iterator<Item = (StmtId, EdgeKind)> + '_ {
        self.edges
            .iter()
            .filter(move |e| e.from == node)
            .map(|e| (e.to, e.kind))
    }

    /// Predecessors of a node.
    pub fn predecessors(&self, node: StmtId) -> impl Iterator<Item = (StmtId, EdgeKind)> + '_ {
        self.edges
            .iter()
            .filter(move |e| e.to == node)
            .map(|e| (e.from, e.kind))
    }
}

// =============================================================================
// Declarations
// =============================================================================

/// One imported name with its optional alias.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportedName {
    pub name: String,
    pub alias: Option<String>,
}

/// An import declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportDecl {
    /// Module path as written (`os.path`, `./utils`)
    pub module: String,
    /// Alias for whole-module imports (`import numpy as np`)
    pub alias: Option<String>,
    /// Specific names for from-imports; empty for whole-module imports
    pub names: Vec<ImportedName>,
    /// Line of the import (1-indexed)
    pub line: usize,
}

/// A module-level binding (assignment at module scope).
///
/// These are the "process-wide shared binding" category: candidate shared
/// mutable state for the race detector, and lock identities for the
/// deadlock detector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleBinding {
    pub name: String,
    /// Initializer expression text (`threading.Lock()`, `{'value': 0}`)
    pub init: String,
    pub line: usize,
}

/// A function (or method) with its normalized body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionModel {
    /// Bare name
    pub name: String,
    /// Qualified name (`ClassName.method` for methods, else the bare name)
    pub qualified_name: String,
    /// Parameter names in order
    pub params: Vec<String>,
    /// Parameter default/annotation texts, index-aligned with `params`;
    /// empty string when absent. Source matchers run against these to
    /// catch parameter-binding sources (`Query(...)`, `Body(...)`).
    pub param_exprs: Vec<String>,
    /// Decorator texts
    pub decorators: Vec<String>,
    /// Declared async
    pub is_async: bool,
    /// Definition line (1-indexed)
    pub line_start: usize,
    /// Last body line (1-indexed)
    pub line_end: usize,
    /// Ordered statements; `StmtId` indexes into this
    pub statements: Vec<Statement>,
    /// Control-flow graph over `statements`
    pub cfg: Cfg,
    /// Names declared `global` anywhere in the body
    pub global_names: Vec<String>,
}

impl FunctionModel {
    /// Look up a statement by id. The synthetic exit node has no
    /// statement and returns `None`.
    #[must_use]
    pub fn statement(&self, id: StmtId) -> Option<&Statement> {
        self.statements.get(id.0)
    }
}

/// A class declaration (methods are flattened into `SourceUnit::functions`
/// under their qualified names).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassDecl {
    pub name: String,
    pub line: usize,
}

// =============================================================================
// Source unit
// =============================================================================

/// One analyzed file. Created at ingestion, immutable thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceUnit {
    /// Path relative to the scan root
    pub path: String,
    /// Language tag (`python`, `javascript`)
    pub language: String,
    /// Imports in source order
    pub imports: Vec<ImportDecl>,
    /// Module-level bindings
    pub bindings: Vec<ModuleBinding>,
    /// Classes
    pub classes: Vec<ClassDecl>,
    /// All functions including methods, in source order
    pub functions: Vec<FunctionModel>,
    /// Module-level statements outside any function, for module-scope
    /// call sites (thread spawns, registration calls)
    pub module_statements: Vec<Statement>,
}

impl SourceUnit {
    /// Module name for import resolution: the file stem (`api/utils.py`
    /// -> `utils`), with the full slash-path also registered by the
    /// resolver for package-style imports.
    #[must_use]
    pub fn module_name(&self) -> String {
        std::path::Path::new(&self.path)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&self.path)
            .to_string()
    }

    /// Find a function by bare or qualified name.
    #[must_use]
    pub fn function(&self, name: &str) -> Option<&FunctionModel> {
        self.functions
            .iter()
            .find(|f| f.qualified_name == name || f.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_name_matches_dotted_base() {
        let stmt = Statement {
            id: StmtId(0),
            line_start: 1,
            line_end: 1,
            kind: StmtKind::Assign,
            reads: vec!["balance.total".to_string(), "rate".to_string()],
            writes: vec!["out".to_string()],
            calls: vec![],
            with_items: vec![],
            formats_string: false,
            text: String::new(),
        };
        assert!(stmt.reads_name("balance"));
        assert!(stmt.reads_name("rate"));
        assert!(!stmt.reads_name("bal"));
    }

    #[test]
    fn test_cfg_successors() {
        let cfg = Cfg {
            entry: Some(StmtId(0)),
            edges: vec![
                CfgEdge { from: StmtId(0), to: StmtId(1), kind: EdgeKind::BranchTrue },
                CfgEdge { from: StmtId(0), to: StmtId(2), kind: EdgeKind::BranchFalse },
            ],
            exit: StmtId(3),
        };
        let succ: Vec<_> = cfg.successors(StmtId(0)).collect();
        assert_eq!(succ.len(), 2);
        assert!(succ.contains(&(StmtId(1), EdgeKind::BranchTrue)));
    }

    #[test]
    fn test_module_name_from_path() {
        let unit = SourceUnit {
            path: "api/utils.py".to_string(),
            language: "python".to_string(),
            imports: vec![],
            bindings: vec![],
            classes: vec![],
            functions: vec![],
            module_statements: vec![],
        };
        assert_eq!(unit.module_name(), "utils");
    }
}
