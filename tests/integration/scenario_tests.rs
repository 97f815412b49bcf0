//! End-to-end scenarios over the fixture corpus.

use std::path::PathBuf;

use tainthound::{AnalysisConfig, Analyzer, Finding, Report, Severity};

/// Get the path to test fixtures.
fn fixtures_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
}

fn scan_fixture(name: &str) -> Report {
    let path = fixtures_path().join(name);
    let content = std::fs::read_to_string(&path).expect("fixture readable");
    Analyzer::new(AnalysisConfig::default()).analyze_sources(vec![(name.to_string(), content)])
}

fn findings_for<'r>(report: &'r Report, rule: &str) -> Vec<&'r Finding> {
    report
        .findings
        .iter()
        .filter(|f| f.rule_id == rule)
        .collect()
}

// =============================================================================
// Scenario A: f-string SQL reaching cursor.execute
// =============================================================================

#[test]
fn test_fstring_sql_injection() {
    let report = scan_fixture("sqli.py");
    let sqli = findings_for(&report, "sql-injection");
    assert_eq!(sqli.len(), 1, "exactly one sql-injection: {:?}", report.findings);

    let finding = sqli[0];
    assert_eq!(finding.severity, Severity::Critical);
    // Evidence starts at the parameter binding and ends at the execute.
    assert_eq!(finding.evidence.first().unwrap().line, 5);
    assert_eq!(finding.evidence.last().unwrap().line, 7);
    assert_eq!(finding.line_start, 7);
}

#[test]
fn test_parameterized_query_is_clean() {
    let report = scan_fixture("sqli.py");
    // The safe variant binds the tainted value as a parameter; only the
    // interpolated variant is flagged.
    let sqli = findings_for(&report, "sql-injection");
    assert!(sqli.iter().all(|f| f.line_start == 7), "findings: {sqli:?}");
}

// =============================================================================
// Scenario B: file handle leaked on the early-return path
// =============================================================================

#[test]
fn test_unreleased_resource_on_early_return() {
    let report = scan_fixture("resource_leak.py");
    let leaks = findings_for(&report, "unreleased-resource");
    assert_eq!(leaks.len(), 1, "exactly one leak: {:?}", report.findings);
    // The early return leaks; the closing branch does not.
    assert_eq!(leaks[0].line_start, 8);
    assert_eq!(leaks[0].evidence.first().unwrap().line, 5);
}

// =============================================================================
// Scenario C: AB/BA lock ordering
// =============================================================================

#[test]
fn test_deadlock_potential_cites_both_workers() {
    let report = scan_fixture("deadlock.py");
    let deadlocks = findings_for(&report, "deadlock-potential");
    assert_eq!(deadlocks.len(), 1, "findings: {:?}", report.findings);

    let finding = deadlocks[0];
    assert!(finding.message.contains("worker_one"));
    assert!(finding.message.contains("worker_two"));
    assert_eq!(finding.evidence.len(), 2);
}

// =============================================================================
// Scenario D: check-then-act on a shared balance
// =============================================================================

#[test]
fn test_race_condition_on_shared_balance() {
    let report = scan_fixture("race.py");
    let races = findings_for(&report, "race-condition");
    assert_eq!(races.len(), 1, "findings: {:?}", report.findings);
    assert!(races[0].message.contains("balance"));
}

// =============================================================================
// Scenario E: dynamic dispatch is a blind spot, not a crash
// =============================================================================

#[test]
fn test_dynamic_call_is_reported_not_fatal() {
    let report = scan_fixture("dynamic_loader.py");
    let blind_spots = findings_for(&report, "unresolved-dynamic-call");
    assert!(
        !blind_spots.is_empty(),
        "dynamic loading must surface: {:?}",
        report.findings
    );
    // The tainted plugin name stops at the boundary: no sink findings.
    assert!(findings_for(&report, "sql-injection").is_empty());
    assert!(findings_for(&report, "path-traversal").is_empty());
}

// =============================================================================
// Content/extension mismatch
// =============================================================================

#[test]
fn test_javascript_disguised_as_python() {
    let report = scan_fixture("main.js.py");
    let mismatches = findings_for(&report, "content-mismatch");
    assert_eq!(mismatches.len(), 1, "findings: {:?}", report.findings);
    assert!(mismatches[0].message.contains("javascript"));
    // And no unparseable finding: the file was analyzed under the
    // detected grammar.
    assert!(findings_for(&report, "unparseable").is_empty());
}

// =============================================================================
// Zero sources => zero taint findings
// =============================================================================

#[test]
fn test_clean_file_has_no_taint_findings() {
    let report = scan_fixture("clean.py");
    for rule in [
        "sql-injection",
        "command-injection",
        "code-injection",
        "ssrf",
        "unsafe-deserialization",
        "path-traversal",
    ] {
        assert!(
            findings_for(&report, rule).is_empty(),
            "no {rule} expected: {:?}",
            report.findings
        );
    }
}

// =============================================================================
// Severity policy and CI gating
// =============================================================================

#[test]
fn test_exit_code_gating() {
    let report = scan_fixture("sqli.py");
    assert_eq!(report.exit_code(Severity::High), 1);
    assert_eq!(report.exit_code(Severity::Critical), 1);

    let clean = scan_fixture("clean.py");
    assert_eq!(clean.exit_code(Severity::High), 0);
}

#[test]
fn test_severity_override_is_policy() {
    let path = fixtures_path().join("sqli.py");
    let content = std::fs::read_to_string(path).unwrap();

    let mut config = AnalysisConfig::default();
    config
        .severity_overrides
        .insert("sql-injection".to_string(), Severity::Low);
    let report = Analyzer::new(config).analyze_sources(vec![("sqli.py".to_string(), content)]);

    let sqli = findings_for(&report, "sql-injection");
    assert_eq!(sqli.len(), 1);
    assert_eq!(sqli[0].severity, Severity::Low);
    assert_eq!(report.exit_code(Severity::High), 0);
}

// =============================================================================
// Whole-tree scan through the filesystem walker
// =============================================================================

#[test]
fn test_scan_fixture_tree() {
    let report = Analyzer::new(AnalysisConfig::default())
        .run(&fixtures_path())
        .expect("scan succeeds");

    assert!(report.summary.files_scanned >= 8);
    // Each scenario's flagship rule appears somewhere in the tree.
    for rule in [
        "sql-injection",
        "unreleased-resource",
        "deadlock-potential",
        "race-condition",
        "unresolved-dynamic-call",
        "content-mismatch",
    ] {
        assert!(
            report.findings.iter().any(|f| f.rule_id == rule),
            "missing {rule} in tree scan"
        );
    }
}
