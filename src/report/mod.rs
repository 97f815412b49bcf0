//! Finding aggregation and report rendering.
//!
//! The aggregator deduplicates findings on (rule id, file, line, evidence
//! hash) and ranks them: severity first, then evidence-chain length
//! (shorter chains are more direct and therefore higher confidence), then
//! a stable (file, line, rule) order so repeated runs over unchanged
//! input produce byte-identical output.

pub mod types;

pub use types::{EvidenceStep, Finding, Report, ScanSummary, Severity};

use rustc_hash::FxHashSet;

/// Deduplicate, rank, and package findings into a [`Report`].
#[must_use]
pub fn aggregate(mut findings: Vec<Finding>, files_scanned: usize) -> Report {
    // Dedup on the precomputed hash; first occurrence wins.
    let mut seen: FxHashSet<u64> = FxHashSet::default();
    findings.retain(|f| seen.insert(f.dedup_hash));

    findings.sort_by(|a, b| {
        b.severity
            .cmp(&a.severity)
            .then_with(|| a.evidence.len().cmp(&b.evidence.len()))
            .then_with(|| a.file.cmp(&b.file))
            .then_with(|| a.line_start.cmp(&b.line_start))
            .then_with(|| a.rule_id.cmp(&b.rule_id))
    });

    let summary = ScanSummary::from_findings(&findings, files_scanned);
    Report {
        findings,
        summary,
        analyzer_version: env!("CARGO_PKG_VERSION").to_string(),
    }
}

/// Render a human-readable summary of the report.
///
/// Total like the JSON form: every finding appears, including internal
/// errors and analysis blind spots.
#[must_use]
pub fn render_text(report: &Report) -> String {
    let mut out = String::new();

    out.push_str(&format!(
        "{} finding(s) across {} of {} file(s)\n",
        report.summary.total_findings,
        report.summary.files_with_findings,
        report.summary.files_scanned,
    ));

    if !report.summary.by_severity.is_empty() {
        let counts: Vec<String> = report
            .summary
            .by_severity
            .iter()
            .map(|(sev, n)| format!("{sev}: {n}"))
            .collect();
        out.push_str(&format!("  {}\n", counts.join(", ")));
    }
    out.push('\n');

    for finding in &report.findings {
        out.push_str(&format!(
            "[{}] {} {}:{}\n    {}\n",
            finding.severity.to_string().to_uppercase(),
            finding.rule_id,
            finding.file,
            finding.line_start,
            finding.message,
        ));
        if finding.evidence.len() > 1 {
            let chain: Vec<String> = finding
                .evidence
                .iter()
                .map(|s| format!("{}:{}", s.file, s.line))
                .collect();
            out.push_str(&format!("    flow: {}\n", chain.join(" -> ")));
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finding(rule: &str, file: &str, line: usize, sev: Severity) -> Finding {
        Finding::new(rule, file, line, line, "msg").with_severity(sev)
    }

    #[test]
    fn test_aggregate_deduplicates() {
        let findings = vec![
            finding("sql-injection", "a.py", 10, Severity::Critical),
            finding("sql-injection", "a.py", 10, Severity::Critical),
        ];
        let report = aggregate(findings, 1);
        assert_eq!(report.findings.len(), 1);
    }

    #[test]
    fn test_aggregate_ranks_by_severity_then_chain_length() {
        let long_chain = finding("ssrf", "a.py", 5, Severity::High).with_evidence(vec![
            EvidenceStep::new("a.py", 1),
            EvidenceStep::new("a.py", 3),
            EvidenceStep::new("a.py", 5),
        ]);
        let short_chain = finding("xss", "b.py", 9, Severity::High)
            .with_evidence(vec![EvidenceStep::new("b.py", 9)]);
        let low = finding("empty-catch", "a.py", 2, Severity::Low);

        let report = aggregate(vec![low, long_chain, short_chain], 2);
        assert_eq!(report.findings[0].rule_id, "xss");
        assert_eq!(report.findings[1].rule_id, "ssrf");
        assert_eq!(report.findings[2].rule_id, "empty-catch");
    }

    #[test]
    fn test_aggregate_is_stable_across_runs() {
        let make = || {
            vec![
                finding("race-condition", "b.py", 4, Severity::Medium),
                finding("race-condition", "a.py", 4, Severity::Medium),
                finding("sql-injection", "a.py", 1, Severity::Critical),
            ]
        };
        let one = aggregate(make(), 2);
        let two = aggregate(make(), 2);
        assert_eq!(one.to_json().unwrap(), two.to_json().unwrap());
    }

    #[test]
    fn test_render_text_includes_every_finding() {
        let report = aggregate(
            vec![
                finding("internal-detector-error", "a.py", 0, Severity::Info),
                finding("sql-injection", "a.py", 3, Severity::Critical),
            ],
            1,
        );
        let text = render_text(&report);
        assert!(text.contains("internal-detector-error"));
        assert!(text.contains("sql-injection"));
    }
}
