//! Missing-transaction detection.
//!
//! Two or more sequential mutating operations against persistent
//! storage inside one function, with no enclosing atomic/transaction
//! scope and no rollback on the exception edge, leave the store
//! half-written when the later operation fails.

use aho_corasick::AhoCorasick;
use once_cell::sync::Lazy;

use crate::model::types::{FunctionModel, SourceUnit, StmtKind};
use crate::report::{EvidenceStep, Finding};
use crate::resolve::Program;

use super::Detector;

pub struct MissingTransactionDetector;

/// Mutating SQL verbs, matched case-insensitively inside execute args.
static MUTATING_SQL: Lazy<AhoCorasick> = Lazy::new(|| {
    AhoCorasick::builder()
        .ascii_case_insensitive(true)
        .build(["insert ", "update ", "delete ", "replace "])
        .expect("valid patterns")
});

/// ORM-style mutation method suffixes.
const MUTATING_METHODS: &[&str] = &[
    ".save",
    ".delete",
    ".add",
    ".insert_one",
    ".insert_many",
    ".update_one",
    ".update_many",
];

impl Detector for MissingTransactionDetector {
    fn id(&self) -> &'static str {
        "missing-transaction"
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
    let mut mutation_sites: Vec<usize> = Vec::new();
    let mut has_transaction_scope = false;
    let mut has_rollback = false;

    for statement in &function.statements {
        if statement.kind == StmtKind::With {
            let scoped = statement.with_items.iter().any(|item| {
                item.context.contains("atomic")
                    || item.context.contains("transaction")
                    || item.context.contains("begin")
            });
            if scoped {
                has_transaction_scope = true;
            }
        }

        for call in &statement.calls {
            if call.callee.ends_with(".begin") || call.callee.ends_with(".atomic") {
                has_transaction_scope = true;
            }
            if call.callee.ends_with(".rollback") {
                has_rollback = true;
            }
            if is_mutating_call(&call.callee, call.args.first().map(|a| a.text.as_str())) {
                mutation_sites.push(call.line);
            }
        }
    }

    if mutation_sites.len() < 2 || has_transaction_scope || has_rollback {
        return;
    }

    mutation_sites.sort_unstable();
    mutation_sites.dedup();
    if mutation_sites.len() < 2 {
        return;
    }

    let first = mutation_sites[0];
    let last = *mutation_sites.last().expect("nonempty");
    findings.push(
        Finding::new(
            "missing-transaction",
            unit.path.clone(),
            first,
            last,
            format!(
                "`{}` performs {} storage mutations with no transaction scope and no rollback path",
                function.qualified_name,
                mutation_sites.len()
            ),
        )
        .with_evidence(
            mutation_sites
                .iter()
                .map(|&line| EvidenceStep::new(unit.path.clone(), line))
                .collect(),
        ),
    );
}

/// Whether a call mutates persistent storage.
fn is_mutating_call(callee: &str, first_arg: Option<&str>) -> bool {
    if callee.ends_with(".execute") || callee.ends_with(".executemany") {
        return first_arg.is_some_and(|arg| MUTATING_SQL.is_match(arg));
    }
    MUTATING_METHODS.iter().any(|m| callee.ends_with(m))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelBuilder;

    fn detect(source: &str) -> Vec<Finding> {
        let unit = ModelBuilder::default().build(source, "store.py").unwrap().unit;
        let (program, _) = Program::resolve(vec![unit]);
        MissingTransactionDetector.detect(&program.units[0], &program)
    }

    #[test]
    fn test_two_mutations_without_transaction() {
        let source = "\
def transfer(cursor, src, dst, amount):
    cursor.execute(\"UPDATE accounts SET balance = balance - ? WHERE id = ?\", (amount, src))
    cursor.execute(\"UPDATE accounts SET balance = balance + ? WHERE id = ?\", (amount, dst))
";
        let findings = detect(source);
        assert_eq!(findings.len(), 1, "findings: {findings:?}");
        assert_eq!(findings[0].rule_id, "missing-transaction");
        assert_eq!(findings[0].evidence.len(), 2);
    }

    #[test]
    fn test_transaction_scope_is_clean() {
        let source = "\
def transfer(conn, cursor, src, dst, amount):
    with conn.begin():
        cursor.execute(\"UPDATE accounts SET balance = balance - 1 WHERE id = ?\", (src,))
        cursor.execute(\"UPDATE accounts SET balance = balance + 1 WHERE id = ?\", (dst,))
";
        assert!(detect(source).is_empty());
    }

    #[test]
    fn test_rollback_path_is_clean() {
        let source = "\
def transfer(conn, cursor, src, dst):
    try:
        cursor.execute(\"UPDATE accounts SET balance = balance - 1 WHERE id = ?\", (src,))
        cursor.execute(\"UPDATE accounts SET balance = balance + 1 WHERE id = ?\", (dst,))
    except Exception:
        conn.rollback()
";
        assert!(detect(source).is_empty());
    }

    #[test]
    fn test_reads_are_not_mutations() {
        let source = "\
def report(cursor):
    cursor.execute(\"SELECT * FROM accounts\")
    cursor.execute(\"SELECT * FROM ledger\")
";
        assert!(detect(source).is_empty());
    }

    #[test]
    fn test_single_mutation_is_clean() {
        let source = "\
def bump(cursor, uid):
    cursor.execute(\"UPDATE users SET logins = logins + 1 WHERE id = ?\", (uid,))
";
        assert!(detect(source).is_empty());
    }
}
