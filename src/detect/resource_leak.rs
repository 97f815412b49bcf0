//! Unreleased-resource detection.
//!
//! For every CFG node that acquires a scoped resource outside a `with`
//! block, verify that every path from the acquisition to the function
//! exit (exception edges included) passes through a matching release.
//! Each exit path missing the release is flagged separately -- one
//! finding per leaking path, not one per function.

use rustc_hash::FxHashSet;

use crate::model::types::{EdgeKind, FunctionModel, SourceUnit, Statement, StmtId, StmtKind};
use crate::report::{EvidenceStep, Finding};
use crate::resolve::Program;

use super::Detector;

pub struct ResourceLeakDetector;

/// Callees whose result is a scoped resource needing release.
fn is_acquire_callee(callee: &str) -> bool {
    callee == "open"
        || callee == "socket.socket"
        || callee.ends_with(".connect")
        || callee.ends_with(".cursor")
        || callee.ends_with(".acquire")
        || callee.starts_with("tempfile.")
}

/// Release method names matched as `<var>.<method>`.
const RELEASE_METHODS: &[&str] = &["close", "release", "disconnect", "shutdown"];

impl Detector for ResourceLeakDetector {
    fn id(&self) -> &'static str {
        "unreleased-resource"
    }

    fn detect(&self, unit: &SourceUnit, _program: &Program) -> Vec<Finding> {
        let mut findings = Vec::new();
        for function in &unit.functions {
            detect_in_function(unit, function, &mut findings);
        }
        findings
    }
}

fn detect_in_function(unit: &SourceUnit, function: &FunctionModel, findings: &mut Vec<Finding>) {
    for statement in &function.statements {
        // `with open(...) as f:` releases automatically.
        if statement.kind == StmtKind::With {
            continue;
        }
        let acquires = statement
            .calls
            .iter()
            .any(|c| is_acquire_callee(&c.callee));
        if !acquires || statement.writes.is_empty() {
            continue;
        }

        let resource = &statement.writes[0];
        for leak in leaking_exits(function, statement, resource) {
            let leak_stmt = function.statement(leak);
            let (line, text) = match leak_stmt {
                Some(s) => (s.line_start, s.text.clone()),
                None => (statement.line_start, statement.text.clone()),
            };
            findings.push(
                Finding::new(
                    "unreleased-resource",
                    unit.path.clone(),
                    line,
                    line,
                    format!(
                        "`{resource}` acquired at line {} is not released on the path exiting at `{text}`",
                        statement.line_start
                    ),
                )
                .with_evidence(vec![
                    EvidenceStep::new(unit.path.clone(), statement.line_start),
                    EvidenceStep::new(unit.path.clone(), line),
                ]),
            );
        }
    }
}

/// Terminal statements reachable from the acquisition without passing a
/// release of `resource`. Paths through a release stop expanding; a
/// terminal `return` that hands the resource out (reads it) transfers
/// ownership and is not a leak.
fn leaking_exits(function: &FunctionModel, acquire: &Statement, resource: &str) -> Vec<StmtId> {
    let exit = function.cfg.exit;
    let mut leaks = Vec::new();
    let mut visited: FxHashSet<StmtId> = FxHashSet::default();
    let mut stack = vec![acquire.id];

    while let Some(node) = stack.pop() {
        if !visited.insert(node) {
            continue;
        }
        let Some(statement) = function.statement(node) else { continue };

        // A release on this node closes the path.
        if node != acquire.id && releases(statement, resource) {
            continue;
        }

        for (succ, kind) in function.cfg.successors(node) {
            if succ == exit {
                let escapes = statement.kind == StmtKind::Return
                    && statement.reads_name(resource)
                    && kind == EdgeKind::Return;
                if !escapes && !leaks.contains(&node) {
                    leaks.push(node);
                }
            } else {
                stack.push(succ);
            }
        }
    }

    leaks.sort_unstable();
    leaks
}

/// Whether a statement releases the resource (`f.close()`, `with f:`).
fn releases(statement: &Statement, resource: &str) -> bool {
    statement.calls.iter().any(|c| {
        c.callee
            .strip_prefix(resource)
            .and_then(|rest| rest.strip_prefix('.'))
            .is_some_and(|method| RELEASE_METHODS.contains(&method))
    }) || statement
        .with_items
        .iter()
        .any(|item| item.context == resource)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelBuilder;

    fn detect(source: &str) -> Vec<Finding> {
        let unit = ModelBuilder::default().build(source, "leak.py").unwrap().unit;
        let (program, _) = Program::resolve(vec![unit]);
        ResourceLeakDetector.detect(&program.units[0], &program)
    }

    #[test]
    fn test_early_return_leak_flags_only_the_leaking_path() {
        let source = "\
def leaky(path, cond):
    f = open(path)
    if cond:
        data = f.read(100)
        return data
    data = f.read()
    f.close()
    return data
";
        let findings = detect(source);
        assert_eq!(findings.len(), 1, "findings: {findings:?}");
        // The early return at line 5 leaks; the closing branch does not.
        assert_eq!(findings[0].line_start, 5);
        assert_eq!(findings[0].evidence[0].line, 2, "evidence starts at the open");
    }

    #[test]
    fn test_with_statement_is_clean() {
        let source = "\
def fine(path):
    with open(path) as f:
        return f.read()
";
        assert!(detect(source).is_empty());
    }

    #[test]
    fn test_exception_path_leak() {
        let source = "\
def leaky(path):
    f = open(path, 'w')
    try:
        f.write('data')
        result = 10 / 0
    except ZeroDivisionError:
        return None
    f.close()
    return True
";
        let findings = detect(source);
        // The handler's early return leaks the handle.
        assert!(
            findings.iter().any(|f| f.message.contains('f')),
            "findings: {findings:?}"
        );
        assert_eq!(findings.len(), 1);
    }

    #[test]
    fn test_all_paths_closed_is_clean() {
        let source = "\
def fine(path, cond):
    f = open(path)
    if cond:
        f.close()
        return 1
    f.close()
    return 2
";
        assert!(detect(source).is_empty());
    }

    #[test]
    fn test_returning_the_handle_is_ownership_transfer() {
        let source = "\
def make_handle(path):
    f = open(path)
    return f
";
        assert!(detect(source).is_empty());
    }

    #[test]
    fn test_multiple_leaking_paths_flagged_separately() {
        let source = "\
def messy(path, a, b):
    f = open(path)
    if a:
        return 'one'
    if b:
        return 'two'
    f.close()
    return 'done'
";
        let findings = detect(source);
        assert_eq!(findings.len(), 2, "one finding per leaking exit: {findings:?}");
    }
}
