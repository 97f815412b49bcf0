//! Empty exception-handler detection.
//!
//! A handler whose body is only `pass` swallows the exception: the
//! failure is neither handled nor propagated, and every anti-pattern
//! downstream of it (silent data corruption, leaked resources) becomes
//! invisible at runtime. Detection rides on the CFG's handler nodes.

use crate::model::types::{EdgeKind, SourceUnit, StmtKind};
use crate::report::{EvidenceStep, Finding};
use crate::resolve::Program;

use super::Detector;

pub struct EmptyCatchDetector;

impl Detector for EmptyCatchDetector {
    fn id(&self) -> &'static str {
        "empty-catch"
    }

    fn detect(&self, unit: &SourceUnit, _program: &Program) -> Vec<Finding> {
        let mut findings = Vec::new();

        for function in &unit.functions {
            for statement in &function.statements {
                if statement.kind != StmtKind::Handler {
                    continue;
                }
                // Body statements hang off the handler node by Seq edges.
                let body: Vec<_> = function
                    .cfg
                    .successors(statement.id)
                    .filter(|(_, kind)| *kind == EdgeKind::Seq)
                    .filter_map(|(id, _)| function.statement(id))
                    .collect();
                let empty = !body.is_empty() && body.iter().all(|s| s.kind == StmtKind::Pass);
                if !empty {
                    continue;
                }

                findings.push(
                    Finding::new(
                        "empty-catch",
                        unit.path.clone(),
                        statement.line_start,
                        statement.line_start,
                        format!("exception handler `{}` silently swallows the error", statement.text),
                    )
                    .with_evidence(vec![EvidenceStep::new(
                        unit.path.clone(),
                        statement.line_start,
                    )]),
                );
            }
        }

        findings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelBuilder;

    fn detect(source: &str) -> Vec<Finding> {
        let unit = ModelBuilder::default().build(source, "err.py").unwrap().unit;
        let (program, _) = Program::resolve(vec![unit]);
        EmptyCatchDetector.detect(&program.units[0], &program)
    }

    #[test]
    fn test_pass_only_handler_flagged() {
        let source = "\
def swallow(path):
    try:
        data = open(path).read()
    except OSError:
        pass
    return None
";
        let findings = detect(source);
        assert_eq!(findings.len(), 1, "findings: {findings:?}");
        assert_eq!(findings[0].rule_id, "empty-catch");
    }

    #[test]
    fn test_handler_with_logging_is_clean() {
        let source = "\
def handled(path):
    try:
        data = open(path).read()
    except OSError as e:
        log.warning(e)
    return None
";
        assert!(detect(source).is_empty());
    }
}
