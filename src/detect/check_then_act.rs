//! Check-then-act race detection.
//!
//! Flags a read of shared mutable state (module-level bindings,
//! `global`-declared names) in a branch condition followed by a write
//! derived from that read, with no synchronization in between -- when
//! the containing function can actually race: it is reachable from more
//! than one call site, runs in a declared concurrent context (thread
//! target, async handler), or is a registered route handler.
//!
//! Global mutable state is modeled as its own symbol category
//! ([`SymbolKind::Binding`]) precisely so this cross-function
//! reachability check does not fold into ordinary variable tracking.

use rustc_hash::FxHashSet;

use crate::model::types::{FunctionModel, SourceUnit, StmtKind};
use crate::report::{EvidenceStep, Finding};
use crate::resolve::{Program, SymbolKind};

use super::Detector;

pub struct CheckThenActDetector;

impl Detector for CheckThenActDetector {
    fn id(&self) -> &'static str {
        "race-condition"
    }

    fn detect(&self, unit: &SourceUnit, program: &Program) -> Vec<Finding> {
        let module_bindings: FxHashSet<&str> =
            unit.bindings.iter().map(|b| b.name.as_str()).collect();

        let mut findings = Vec::new();
        for function in &unit.functions {
            if !can_race(unit, function, program) {
                continue;
            }

            let mut shared: FxHashSet<&str> = module_bindings.clone();
            shared.extend(function.global_names.iter().map(String::as_str));
            // Parameters shadow module bindings.
            for param in &function.params {
                shared.remove(param.as_str());
            }

            detect_in_function(unit, function, &shared, &mut findings);
        }
        findings
    }
}

/// Whether the function can interleave with itself or another caller.
fn can_race(unit: &SourceUnit, function: &FunctionModel, program: &Program) -> bool {
    if function.is_async {
        return true;
    }
    // Route/task registrations make a handler externally reachable.
    if function.decorators.iter().any(|d| {
        d.contains(".route") || d.contains(".get") || d.contains(".post") || d.contains(".task")
    }) {
        return true;
    }

    let Some(id) = program
        .symbols
        .lookup_in_module(&unit.module_name(), &function.qualified_name)
    else {
        return false;
    };
    if program.symbols.get(id).kind != SymbolKind::Function {
        return false;
    }
    program.call_graph.is_concurrent(id) || program.call_graph.call_site_count(id) > 1
}

fn detect_in_function(
    unit: &SourceUnit,
    function: &FunctionModel,
    shared: &FxHashSet<&str>,
    findings: &mut Vec<Finding>,
) {
    for check in &function.statements {
        if check.kind != StmtKind::If {
            continue;
        }
        let checked: Vec<&str> = shared
            .iter()
            .copied()
            .filter(|name| check.reads_name(name))
            .collect();
        if checked.is_empty() {
            continue;
        }

        // The branch body spans the if-node's lines. Look for a write to
        // the checked state inside it, with no lock taken in between.
        for act in &function.statements {
            if act.id <= check.id || act.line_start > check.line_end {
                continue;
            }
            for name in &checked {
                if !act.writes_name(name) {
                    continue;
                }
                if synchronized_between(function, check.id.0, act.id.0) {
                    continue;
                }
                findings.push(
                    Finding::new(
                        "race-condition",
                        unit.path.clone(),
                        check.line_start,
                        act.line_start,
                        format!(
                            "check-then-act on shared `{name}` in `{}`: checked at line {}, written at line {} without synchronization",
                            function.qualified_name, check.line_start, act.line_start
                        ),
                    )
                    .with_evidence(vec![
                        EvidenceStep::new(unit.path.clone(), check.line_start),
                        EvidenceStep::new(unit.path.clone(), act.line_start),
                    ]),
                );
            }
        }
    }
}

/// Whether any statement between the check and the act takes a lock.
fn synchronized_between(function: &FunctionModel, check: usize, act: usize) -> bool {
    function.statements[check..=act].iter().any(|s| {
        (s.kind == StmtKind::With
            && s.with_items
                .iter()
                .any(|i| i.context.to_lowercase().contains("lock")))
            || s.calls.iter().any(|c| c.callee.ends_with(".acquire"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelBuilder;

    fn detect(source: &str) -> Vec<Finding> {
        let unit = ModelBuilder::default().build(source, "bank.py").unwrap().unit;
        let (program, _) = Program::resolve(vec![unit]);
        CheckThenActDetector.detect(&program.units[0], &program)
    }

    #[test]
    fn test_shared_balance_decrement_with_two_callers() {
        let source = "\
balance = {'amount': 100}

def withdraw(amount):
    if balance['amount'] >= amount:
        balance['amount'] = balance['amount'] - amount

def checkout(total):
    withdraw(total)

def refund_reversal(total):
    withdraw(total)
";
        let findings = detect(source);
        assert_eq!(findings.len(), 1, "findings: {findings:?}");
        assert_eq!(findings[0].rule_id, "race-condition");
        assert!(findings[0].message.contains("balance"));
        assert_eq!(findings[0].evidence.len(), 2);
    }

    #[test]
    fn test_single_caller_is_not_flagged() {
        let source = "\
balance = {'amount': 100}

def withdraw(amount):
    if balance['amount'] >= amount:
        balance['amount'] = balance['amount'] - amount

def checkout(total):
    withdraw(total)
";
        assert!(detect(source).is_empty());
    }

    #[test]
    fn test_thread_target_counts_as_concurrent() {
        let source = "\
import threading

counter = {'n': 0}

def bump():
    if counter['n'] < 100:
        counter['n'] = counter['n'] + 1

def main():
    t = threading.Thread(target=bump)
    t.start()
";
        let findings = detect(source);
        assert_eq!(findings.len(), 1, "findings: {findings:?}");
    }

    #[test]
    fn test_lock_protected_update_is_clean() {
        let source = "\
import threading

counter = {'n': 0}
lock = threading.Lock()

def bump():
    if counter['n'] < 100:
        with lock:
            counter['n'] = counter['n'] + 1

def a():
    bump()

def b():
    bump()
";
        assert!(detect(source).is_empty());
    }

    #[test]
    fn test_local_state_is_not_shared() {
        let source = "\
def pure(amount):
    balance = 100
    if balance >= amount:
        balance = balance - amount
    return balance

def a():
    pure(1)

def b():
    pure(2)
";
        assert!(detect(source).is_empty());
    }
}
