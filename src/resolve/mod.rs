//! Symbol and call graph resolution.
//!
//! Resolution runs after every source unit has been built (the pipeline
//! barrier) because imports may reference symbols in units that parse
//! later. Name lookup follows local scope -> module scope -> imported
//! modules, innermost shadowing first. Circular imports are legal: both
//! directions resolve to the same [`SymbolId`] because definition and
//! reference are separate passes over one shared arena.
//!
//! Reflective dispatch (`importlib.import_module`, `getattr(...)()`,
//! computed callees) cannot be resolved statically. Each such call site
//! becomes a [`Callee::Dynamic`] edge plus an `unresolved-dynamic-call`
//! finding, so downstream consumers treat it as an explicit blind spot
//! rather than a silently missing path.

pub mod callgraph;
pub mod symbols;

pub use callgraph::{CallEdge, CallGraph, Callee};
pub use symbols::{Symbol, SymbolId, SymbolKind, SymbolTable, UseSite};

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use crate::model::types::{CallSite, FunctionModel, SourceUnit};
use crate::report::{EvidenceStep, Finding};

/// Fully resolved program: units plus the cross-file tables.
#[derive(Debug)]
pub struct Program {
    pub units: Vec<SourceUnit>,
    pub symbols: SymbolTable,
    pub call_graph: CallGraph,
}

impl Program {
    /// Resolve all units into a program, returning resolver findings
    /// (dynamic-dispatch blind spots) alongside.
    pub fn resolve(units: Vec<SourceUnit>) -> (Self, Vec<Finding>) {
        let (symbols, call_graph, findings) = resolve(&units);
        (
            Self {
                units,
                symbols,
                call_graph,
            },
            findings,
        )
    }

    /// Function model behind a function symbol.
    #[must_use]
    pub fn function(&self, id: SymbolId) -> Option<(&SourceUnit, &FunctionModel)> {
        let symbol = self.symbols.get(id);
        if symbol.kind != SymbolKind::Function {
            return None;
        }
        let unit = self.units.get(symbol.unit)?;
        let function = unit.functions.get(symbol.decl_index?)?;
        Some((unit, function))
    }
}

/// Per-unit import environment.
#[derive(Debug, Default)]
struct ImportEnv {
    /// local alias -> module path (`import api.utils as u`)
    module_aliases: FxHashMap<String, String>,
    /// local name -> (module path, original name) (`from api import utils`)
    imported_names: FxHashMap<String, (String, String)>,
}

impl ImportEnv {
    fn from_unit(unit: &SourceUnit) -> Self {
        let mut env = Self::default();
        for import in &unit.imports {
            if import.names.is_empty() {
                let local = import.alias.clone().unwrap_or_else(|| {
                    // `import api.utils` binds the top-level package name.
                    import
                        .module
                        .split('.')
                        .next()
                        .unwrap_or(&import.module)
                        .to_string()
                });
                env.module_aliases.insert(local, import.module.clone());
            } else {
                for name in &import.names {
                    let local = name.alias.clone().unwrap_or_else(|| name.name.clone());
                    env.imported_names
                        .insert(local, (import.module.clone(), name.name.clone()));
                }
            }
        }
        env
    }
}

/// Callee texts that defeat static resolution outright.
fn is_dynamic_callee(callee: &str) -> bool {
    callee == "__import__"
        || callee == "importlib.import_module"
        || callee.ends_with(".import_module")
        || callee.starts_with("getattr(")
        || callee.starts_with("globals()")
        || callee.starts_with("locals()")
        || callee.contains("](")
        || callee.ends_with(']')
}

/// Callees that hand a function off to a concurrency primitive.
fn is_spawn_callee(callee: &str) -> bool {
    callee.ends_with("Thread")
        || callee.ends_with("Process")
        || callee.ends_with("Timer")
        || callee.ends_with(".submit")
        || callee.ends_with(".apply_async")
        || callee.ends_with("create_task")
        || callee.ends_with(".spawn")
}

/// Resolve symbols and build the call graph for a set of units.
///
/// Contract from the pipeline: all units are fully built before this
/// runs. The returned graph may contain cycles; they are preserved, not
/// broken or ordered.
pub fn resolve(units: &[SourceUnit]) -> (SymbolTable, CallGraph, Vec<Finding>) {
    let unit_modules: Vec<String> = units.iter().map(SourceUnit::module_name).collect();
    let mut symbols = SymbolTable::new(unit_modules);

    // Pass 1: define every symbol before resolving any reference, so a
    // reference in unit A to a symbol in unit B works regardless of
    // build order (and circular imports share one definition).
    let mut function_ids: Vec<Vec<SymbolId>> = Vec::with_capacity(units.len());
    let mut module_ids: Vec<SymbolId> = Vec::with_capacity(units.len());

    for (unit_idx, unit) in units.iter().enumerate() {
        let mut ids = Vec::with_capacity(unit.functions.len());
        for (fn_idx, function) in unit.functions.iter().enumerate() {
            ids.push(symbols.define(
                function.qualified_name.clone(),
                SymbolKind::Function,
                unit_idx,
                Some(fn_idx),
                function.line_start,
            ));
        }
        function_ids.push(ids);

        for (class_idx, class) in unit.classes.iter().enumerate() {
            symbols.define(
                class.name.clone(),
                SymbolKind::Class,
                unit_idx,
                Some(class_idx),
                class.line,
            );
        }
        for (binding_idx, binding) in unit.bindings.iter().enumerate() {
            symbols.define(
                binding.name.clone(),
                SymbolKind::Binding,
                unit_idx,
                Some(binding_idx),
                binding.line,
            );
        }
    }
    for (unit_idx, unit) in units.iter().enumerate() {
        module_ids.push(symbols.define(
            unit.module_name(),
            SymbolKind::Module,
            unit_idx,
            None,
            1,
        ));
    }

    // Pass 2: resolve call sites.
    let envs: Vec<ImportEnv> = units.iter().map(ImportEnv::from_unit).collect();
    let mut edges = Vec::new();
    let mut findings = Vec::new();

    for (unit_idx, unit) in units.iter().enumerate() {
        let env = &envs[unit_idx];

        for (fn_idx, function) in unit.functions.iter().enumerate() {
            let caller = function_ids[unit_idx][fn_idx];
            // Names assigned from a dynamic loader taint later calls
            // through them within the same function.
            let dynamic_vars = dynamic_loader_vars(function);
            // Compound statements span their bodies, so inner call sites
            // appear on both the wrapper and the inner node; dedup by
            // (callee, line) so call counts stay honest.
            let mut seen: FxHashSet<(&str, usize)> = FxHashSet::default();

            for statement in &function.statements {
                for call in &statement.calls {
                    if !seen.insert((call.callee.as_str(), call.line)) {
                        continue;
                    }
                    resolve_call_site(
                        caller,
                        call,
                        unit,
                        unit_idx,
                        env,
                        Some((function, &dynamic_vars)),
                        &mut symbols,
                        &mut edges,
                        &mut findings,
                    );
                }
            }
        }

        let mut seen: FxHashSet<(&str, usize)> = FxHashSet::default();
        for statement in &unit.module_statements {
            for call in &statement.calls {
                if !seen.insert((call.callee.as_str(), call.line)) {
                    continue;
                }
                resolve_call_site(
                    module_ids[unit_idx],
                    call,
                    unit,
                    unit_idx,
                    env,
                    None,
                    &mut symbols,
                    &mut edges,
                    &mut findings,
                );
            }
        }
    }

    debug!(
        symbols = symbols.len(),
        edges = edges.len(),
        blind_spots = findings.len(),
        "resolution complete"
    );

    (symbols, CallGraph::from_edges(edges), findings)
}

/// Local names assigned from `importlib.import_module` / `__import__`.
fn dynamic_loader_vars(function: &FunctionModel) -> FxHashSet<String> {
    let mut vars = FxHashSet::default();
    for statement in &function.statements {
        let from_loader = statement
            .calls
            .iter()
            .any(|c| is_dynamic_callee(&c.callee) || c.callee == "importlib.import_module");
        if from_loader {
            for write in &statement.writes {
                vars.insert(write.clone());
            }
        }
    }
    vars
}

#[allow(clippy::too_many_arguments)]
fn resolve_call_site(
    caller: SymbolId,
    call: &CallSite,
    unit: &SourceUnit,
    unit_idx: usize,
    env: &ImportEnv,
    function_ctx: Option<(&FunctionModel, &FxHashSet<String>)>,
    symbols: &mut SymbolTable,
    edges: &mut Vec<CallEdge>,
    findings: &mut Vec<Finding>,
) {
    let via_dynamic_var = function_ctx.is_some_and(|(_, dynamic_vars)| {
        call.callee
            .split('.')
            .next()
            .is_some_and(|base| dynamic_vars.contains(base))
    });

    if is_dynamic_callee(&call.callee) || via_dynamic_var {
        edges.push(CallEdge {
            caller,
            callee: Callee::Dynamic(call.callee.clone()),
            file: unit.path.clone(),
            line: call.line,
            concurrent: false,
        });
        findings.push(
            Finding::new(
                "unresolved-dynamic-call",
                unit.path.clone(),
                call.line,
                call.line,
                format!(
                    "call target `{}` is computed at runtime; static analysis cannot follow it",
                    call.callee
                ),
            )
            .with_evidence(vec![EvidenceStep::new(unit.path.clone(), call.line)]),
        );
        return;
    }

    let concurrent = is_spawn_callee(&call.callee);
    if concurrent {
        // The spawned target is in the arguments, not the callee.
        for arg in &call.args {
            for atom in &arg.atoms {
                if let Some(target) = lookup_name(atom, unit_idx, env, symbols) {
                    if symbols.get(target).kind == SymbolKind::Function {
                        symbols.record_use(target, unit.path.clone(), call.line);
                        edges.push(CallEdge {
                            caller,
                            callee: Callee::Resolved(target),
                            file: unit.path.clone(),
                            line: call.line,
                            concurrent: true,
                        });
                    }
                }
            }
        }
        edges.push(CallEdge {
            caller,
            callee: Callee::External(call.callee.clone()),
            file: unit.path.clone(),
            line: call.line,
            concurrent: false,
        });
        return;
    }

    // Local scope shadows module scope: a parameter or local binding
    // with a function's name hides that function.
    if let Some((function, _)) = function_ctx {
        let base = call.callee.split('.').next().unwrap_or(&call.callee);
        let shadowed = base != "self"
            && (function.params.iter().any(|p| p == base)
                || function.statements.iter().any(|s| s.writes_name(base)));
        if shadowed {
            edges.push(CallEdge {
                caller,
                callee: Callee::External(call.callee.clone()),
                file: unit.path.clone(),
                line: call.line,
                concurrent: false,
            });
            return;
        }
    }

    // `self.method()` resolves against the enclosing class.
    let callee_name = if let (Some((function, _)), Some(rest)) =
        (function_ctx, call.callee.strip_prefix("self."))
    {
        match function.qualified_name.split_once('.') {
            Some((class, _)) => format!("{class}.{rest}"),
            None => rest.to_string(),
        }
    } else {
        call.callee.clone()
    };

    match lookup_name(&callee_name, unit_idx, env, symbols) {
        Some(target) => {
            symbols.record_use(target, unit.path.clone(), call.line);
            edges.push(CallEdge {
                caller,
                callee: Callee::Resolved(target),
                file: unit.path.clone(),
                line: call.line,
                concurrent: false,
            });
        }
        None => edges.push(CallEdge {
            caller,
            callee: Callee::External(callee_name),
            file: unit.path.clone(),
            line: call.line,
            concurrent: false,
        }),
    }
}

/// Scope-ordered name lookup: module scope of the unit, then imported
/// names, then imported-module attribute access.
fn lookup_name(
    name: &str,
    unit_idx: usize,
    env: &ImportEnv,
    symbols: &SymbolTable,
) -> Option<SymbolId> {
    let own_module = symbols.module_of_unit(unit_idx).to_string();

    // Plain name in this module's scope.
    if let Some(id) = symbols.lookup_in_module(&own_module, name) {
        return Some(id);
    }

    // Name imported directly: `from api import fetch_user`.
    if let Some((module, original)) = env.imported_names.get(name) {
        if let Some(id) = lookup_in_module_path(symbols, module, original) {
            return Some(id);
        }
    }

    // Dotted access through an imported module: `utils.fetch_user(...)`.
    if let Some((head, rest)) = name.split_once('.') {
        if let Some(module) = env.module_aliases.get(head) {
            if let Some(id) = lookup_in_module_path(symbols, module, rest) {
                return Some(id);
            }
        }
        // `from api import utils` then `utils.fetch_user(...)`: the
        // imported name is itself a module.
        if let Some((_, original)) = env.imported_names.get(head) {
            if let Some(id) = lookup_in_module_path(symbols, original, rest) {
                return Some(id);
            }
        }
    }

    None
}

/// Look a name up in a module identified by a dotted path, trying the
/// full path first and falling back to its last segment (units register
/// under their file stem).
fn lookup_in_module_path(symbols: &SymbolTable, module: &str, name: &str) -> Option<SymbolId> {
    if let Some(id) = symbols.lookup_in_module(module, name) {
        return Some(id);
    }
    let last = module.rsplit('.').next().unwrap_or(module);
    symbols.lookup_in_module(last, name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelBuilder;

    fn build(source: &str, path: &str) -> SourceUnit {
        ModelBuilder::default().build(source, path).unwrap().unit
    }

    #[test]
    fn test_cross_file_resolution() {
        let utils = build("def fetch_user(uid):\n    return uid\n", "utils.py");
        let app = build(
            "import utils\n\ndef handler(uid):\n    return utils.fetch_user(uid)\n",
            "app.py",
        );
        let (program, findings) = Program::resolve(vec![utils, app]);
        assert!(findings.is_empty());

        let resolved = program
            .call_graph
            .edges
            .iter()
            .filter(|e| matches!(e.callee, Callee::Resolved(_)))
            .count();
        assert_eq!(resolved, 1);
    }

    #[test]
    fn test_circular_imports_share_symbols() {
        // a imports b, b imports a; both directions must resolve to the
        // same symbol objects.
        let a = build(
            "import b\n\ndef alpha():\n    return b.beta()\n",
            "a.py",
        );
        let b = build(
            "import a\n\ndef beta():\n    return a.alpha()\n",
            "b.py",
        );
        let (program, _) = Program::resolve(vec![a, b]);

        let mut resolved_targets = Vec::new();
        for edge in &program.call_graph.edges {
            if let Callee::Resolved(id) = edge.callee {
                resolved_targets.push(program.symbols.get(id).qualified_name.clone());
            }
        }
        resolved_targets.sort();
        assert_eq!(resolved_targets, vec!["a.alpha", "b.beta"]);
    }

    #[test]
    fn test_dynamic_import_is_a_blind_spot_not_a_crash() {
        let unit = build(
            "import importlib\n\ndef load(name):\n    module = importlib.import_module(name)\n    return module.run()\n",
            "loader.py",
        );
        let (program, findings) = Program::resolve(vec![unit]);

        let dynamic_count = program.call_graph.dynamic_edges().count();
        assert!(dynamic_count >= 2, "loader call and module.run() are both dynamic");
        assert!(findings.iter().all(|f| f.rule_id == "unresolved-dynamic-call"));
        assert!(!findings.is_empty());
    }

    #[test]
    fn test_thread_target_creates_concurrent_edge() {
        let unit = build(
            "import threading\n\ndef worker():\n    pass\n\ndef main():\n    t = threading.Thread(target=worker)\n    t.start()\n",
            "jobs.py",
        );
        let (program, _) = Program::resolve(vec![unit]);
        let concurrent: Vec<&CallEdge> = program
            .call_graph
            .edges
            .iter()
            .filter(|e| e.concurrent)
            .collect();
        assert_eq!(concurrent.len(), 1);
        if let Callee::Resolved(id) = concurrent[0].callee {
            assert_eq!(program.symbols.get(id).name, "worker");
        } else {
            panic!("expected resolved concurrent edge");
        }
    }

    #[test]
    fn test_self_method_resolution() {
        let unit = build(
            "class Repo:\n    def save(self, row):\n        return row\n    def update(self, row):\n        return self.save(row)\n",
            "repo.py",
        );
        let (program, _) = Program::resolve(vec![unit]);
        let resolved: Vec<String> = program
            .call_graph
            .edges
            .iter()
            .filter_map(|e| match e.callee {
                Callee::Resolved(id) => Some(program.symbols.get(id).name.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(resolved, vec!["Repo.save"]);
    }
}
