//! Lock-ordering deadlock detection.
//!
//! Builds a process-wide lock acquisition-order graph from the nested
//! acquire sequences observed across all functions: an edge A -> B means
//! some function acquires B while holding A. Opposite edges contributed
//! by different functions form a cycle -- the classic AB/BA deadlock --
//! and are flagged citing both contributing call sites.
//!
//! The graph is computed from the whole program on every unit pass;
//! findings are constructed deterministically from the cycle itself, so
//! duplicate emissions from different units collapse in the aggregator.

use rustc_hash::FxHashMap;

use crate::model::types::{SourceUnit, StmtKind};
use crate::report::{EvidenceStep, Finding};
use crate::resolve::Program;

use super::Detector;

pub struct LockOrderDetector;

/// One observed "acquired B while holding A" event.
#[derive(Debug, Clone)]
struct AcquireSite {
    file: String,
    line: usize,
    function: String,
}

impl Detector for LockOrderDetector {
    fn id(&self) -> &'static str {
        "deadlock-potential"
    }

    fn detect(&self, unit: &SourceUnit, program: &Program) -> Vec<Finding> {
        // order[(a, b)] = sites where b was acquired while a was held.
        let mut order: FxHashMap<(String, String), Vec<AcquireSite>> = FxHashMap::default();
        for scanned in &program.units {
            collect_order_edges(scanned, program, &mut order);
        }

        let mut findings = Vec::new();
        let mut keys: Vec<&(String, String)> = order.keys().collect();
        keys.sort();

        for key in keys {
            let (a, b) = key;
            // Report each unordered pair once, from its sorted side.
            if a >= b {
                continue;
            }
            let reverse = (b.clone(), a.clone());
            let Some(reverse_sites) = order.get(&reverse) else { continue };
            let forward_sites = &order[key];

            // A single function taking both orders on different paths is
            // suspicious too, but the classic deadlock needs two
            // distinct acquirers.
            let Some(fwd) = forward_sites.first() else { continue };
            let Some(rev) = reverse_sites
                .iter()
                .find(|s| s.function != fwd.function)
            else {
                continue;
            };

            let mut sites = [fwd.clone(), rev.clone()];
            sites.sort_by(|x, y| x.file.cmp(&y.file).then(x.line.cmp(&y.line)));

            findings.push(
                Finding::new(
                    "deadlock-potential",
                    sites[0].file.clone(),
                    sites[0].line,
                    sites[0].line,
                    format!(
                        "lock order inversion on `{a}`/`{b}`: `{}` acquires {a} then {b}, `{}` acquires {b} then {a}",
                        fwd.function, rev.function
                    ),
                )
                .with_evidence(vec![
                    EvidenceStep::new(sites[0].file.clone(), sites[0].line),
                    EvidenceStep::new(sites[1].file.clone(), sites[1].line),
                ]),
            );
        }

        // Per-unit contract: only report cycles this unit contributes to.
        findings.retain(|f| f.evidence.iter().any(|s| s.file == unit.path));
        findings
    }
}

/// Record order edges from every nested acquire in a unit.
fn collect_order_edges(
    unit: &SourceUnit,
    program: &Program,
    order: &mut FxHashMap<(String, String), Vec<AcquireSite>>,
) {
    for function in &unit.functions {
        // (lock name, hold span end line) for `with lock:` acquisitions,
        // plus open-ended holds from `lock.acquire()`.
        let mut holds: Vec<(String, usize, usize)> = Vec::new();

        for statement in &function.statements {
            let mut acquired_here: Vec<(String, usize, usize)> = Vec::new();

            if statement.kind == StmtKind::With {
                for item in &statement.with_items {
                    let context = item.context.trim_end_matches("()");
                    if let Some(lock) = lock_identity(context, unit, program) {
                        // The with-node spans its body, giving the hold span.
                        acquired_here.push((lock, statement.line_start, statement.line_end));
                    }
                }
            }
            for call in &statement.calls {
                if let Some(base) = call.callee.strip_suffix(".acquire") {
                    if let Some(lock) = lock_identity(base, unit, program) {
                        acquired_here.push((lock, call.line, function.line_end));
                    }
                }
                if let Some(base) = call.callee.strip_suffix(".release") {
                    if let Some(lock) = lock_identity(base, unit, program) {
                        holds.retain(|(held, _, _)| held != &lock);
                    }
                }
            }

            for (lock, line, span_end) in acquired_here {
                for (held, _, held_end) in &holds {
                    if held != &lock && line <= *held_end {
                        order.entry((held.clone(), lock.clone())).or_default().push(
                            AcquireSite {
                                file: unit.path.clone(),
                                line,
                                function: function.qualified_name.clone(),
                            },
                        );
                    }
                }
                holds.push((lock, line, span_end));
            }

            // Drop `with` holds whose span ended before this statement.
            holds.retain(|(_, _, end)| statement.line_start <= *end);
        }
    }
}

/// Resolve a lock expression to a stable identity.
///
/// Module bindings initialized from a lock constructor use their
/// qualified name so the same lock matches across files; otherwise a
/// name that looks lock-like is taken at face value.
fn lock_identity(context: &str, unit: &SourceUnit, program: &Program) -> Option<String> {
    let name = context.trim();
    if name.is_empty() || name.contains('(') {
        return None;
    }

    let base = name.split('.').next().unwrap_or(name);
    if let Some(binding) = unit.bindings.iter().find(|b| b.name == base) {
        let is_lock = ["Lock(", "RLock(", "Semaphore(", "BoundedSemaphore("]
            .iter()
            .any(|ctor| binding.init.contains(ctor));
        if is_lock {
            let module = program
                .symbols
                .lookup_in_module(&unit.module_name(), base)
                .map(|id| program.symbols.get(id).qualified_name.clone());
            return Some(module.unwrap_or_else(|| format!("{}.{base}", unit.module_name())));
        }
        return None;
    }

    // Unresolved (attribute or imported) lock-ish names.
    if base.to_lowercase().contains("lock") || name.to_lowercase().contains("lock") {
        return Some(name.to_string());
    }
    None
}
