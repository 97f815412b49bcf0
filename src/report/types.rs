//! Unified finding and report types.
//!
//! Every analysis phase funnels its results into [`Finding`], including
//! recoverable-error conditions (`unparseable`, `internal-detector-error`,
//! `unresolved-dynamic-call`). The reporter is total: it never drops a
//! finding, whatever produced it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// =============================================================================
// Severity
// =============================================================================

/// Severity level for findings.
///
/// Ordered from least to most severe so that `Ord` comparisons read
/// naturally (`severity >= Severity::High` for CI gating).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational - analysis notes, blind spots, truncation markers
    Info,
    /// Low severity - limited impact or requires specific conditions
    Low,
    /// Medium severity - potential for significant impact
    Medium,
    /// High severity - likely exploitable with serious impact
    High,
    /// Critical - easily exploitable with severe consequences
    Critical,
}

impl Default for Severity {
    fn default() -> Self {
        Self::Low
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "info" | "informational" => Ok(Self::Info),
            "low" => Ok(Self::Low),
            "medium" | "med" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" | "crit" => Ok(Self::Critical),
            _ => Err(format!("Unknown severity: {s}")),
        }
    }
}

impl Severity {
    /// Default severity for a rule id. Severity mapping is policy, not
    /// analysis: callers may override any of these through
    /// `severity_overrides` in the configuration.
    #[must_use]
    pub fn default_for_rule(rule_id: &str) -> Self {
        match rule_id {
            "sql-injection" | "command-injection" | "code-injection"
            | "unsafe-deserialization" => Self::Critical,
            "ssrf" | "path-traversal" | "xss" | "template-injection"
            | "deadlock-potential" => Self::High,
            "race-condition" | "unreleased-resource" | "missing-transaction" => Self::Medium,
            "empty-catch" | "content-mismatch" => Self::Low,
            "unparseable" | "unresolved-dynamic-call" | "truncated-analysis"
            | "internal-detector-error" => Self::Info,
            _ => Self::Medium,
        }
    }
}

// =============================================================================
// Finding
// =============================================================================

/// One step in a finding's evidence chain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EvidenceStep {
    /// File the step occurred in
    pub file: String,
    /// Line number (1-indexed)
    pub line: usize,
}

impl EvidenceStep {
    #[must_use]
    pub fn new(file: impl Into<String>, line: usize) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }
}

/// A reported issue with location and evidence.
///
/// For taint findings the evidence chain starts at the matched source and
/// ends at the sink; for pattern findings it starts at the anti-pattern
/// site.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    /// Rule identifier (e.g. "sql-injection", "unreleased-resource")
    pub rule_id: String,

    /// Severity level
    pub severity: Severity,

    /// File path (relative to the scan root)
    pub file: String,

    /// Start line (1-indexed)
    pub line_start: usize,

    /// End line (1-indexed, inclusive)
    pub line_end: usize,

    /// Human-readable description of the issue
    pub message: String,

    /// Ordered source-to-sink (or site-to-site) steps
    #[serde(default)]
    pub evidence: Vec<EvidenceStep>,

    /// Hash for deduplication (rule + location + evidence)
    #[serde(skip)]
    pub dedup_hash: u64,
}

impl Finding {
    /// Create a new finding. Severity defaults to the rule's policy
    /// mapping; use [`Finding::with_severity`] to override.
    #[must_use]
    pub fn new(
        rule_id: impl Into<String>,
        file: impl Into<String>,
        line_start: usize,
        line_end: usize,
        message: impl Into<String>,
    ) -> Self {
        let rule_id = rule_id.into();
        let severity = Severity::default_for_rule(&rule_id);
        let mut finding = Self {
            rule_id,
            severity,
            file: file.into(),
            line_start,
            line_end,
            message: message.into(),
            evidence: Vec::new(),
            dedup_hash: 0,
        };
        finding.rehash();
        finding
    }

    /// Override the severity.
    #[must_use]
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Attach an evidence chain.
    #[must_use]
    pub fn with_evidence(mut self, evidence: Vec<EvidenceStep>) -> Self {
        self.evidence = evidence;
        self.rehash();
        self
    }

    /// Recompute the deduplication hash from rule id, location, and the
    /// full evidence chain. Two findings with the same rule and location
    /// but different provenance are distinct.
    pub fn rehash(&mut self) {
        use std::hash::{Hash, Hasher};
        let mut hasher = rustc_hash::FxHasher::default();
        self.rule_id.hash(&mut hasher);
        self.file.hash(&mut hasher);
        self.line_start.hash(&mut hasher);
        for step in &self.evidence {
            step.file.hash(&mut hasher);
            step.line.hash(&mut hasher);
        }
        self.dedup_hash = hasher.finish();
    }
}

impl PartialEq for Finding {
    fn eq(&self, other: &Self) -> bool {
        self.dedup_hash == other.dedup_hash && self.rule_id == other.rule_id
    }
}

impl Eq for Finding {}

// =============================================================================
// Report
// =============================================================================

/// Summary statistics for a scan.
///
/// Uses `BTreeMap` so serialized output is deterministically ordered;
/// the idempotence contract (same input, byte-identical report) depends
/// on it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSummary {
    /// Total number of findings
    pub total_findings: usize,
    /// Number of findings by severity
    pub by_severity: BTreeMap<String, usize>,
    /// Number of findings by rule id
    pub by_rule: BTreeMap<String, usize>,
    /// Number of files scanned
    pub files_scanned: usize,
    /// Number of files with at least one finding
    pub files_with_findings: usize,
}

impl ScanSummary {
    /// Build a summary from a finding list.
    #[must_use]
    pub fn from_findings(findings: &[Finding], files_scanned: usize) -> Self {
        let mut by_severity = BTreeMap::new();
        let mut by_rule = BTreeMap::new();
        let mut files = std::collections::BTreeSet::new();

        for finding in findings {
            *by_severity.entry(finding.severity.to_string()).or_insert(0) += 1;
            *by_rule.entry(finding.rule_id.clone()).or_insert(0) += 1;
            files.insert(finding.file.as_str());
        }

        Self {
            total_findings: findings.len(),
            by_severity,
            by_rule,
            files_scanned,
            files_with_findings: files.len(),
        }
    }
}

/// Result of a full analysis run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    /// All findings after deduplication and ranking
    pub findings: Vec<Finding>,
    /// Summary statistics
    pub summary: ScanSummary,
    /// Analyzer version that produced the report
    pub analyzer_version: String,
}

impl Report {
    /// Compute the process exit code for CI gating.
    ///
    /// Returns 1 when any finding meets or exceeds `fail_on`, 0 otherwise.
    #[must_use]
    pub fn exit_code(&self, fail_on: Severity) -> i32 {
        if self.findings.iter().any(|f| f.severity >= fail_on) {
            1
        } else {
            0
        }
    }

    /// Serialize the report to pretty-printed JSON.
    pub fn to_json(&self) -> crate::error::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Deserialize a report from JSON.
    pub fn from_json(json: &str) -> crate::error::Result<Self> {
        let mut report: Report = serde_json::from_str(json)?;
        for finding in &mut report.findings {
            finding.rehash();
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
        assert!(Severity::Low > Severity::Info);
    }

    #[test]
    fn test_severity_from_str() {
        assert_eq!("critical".parse::<Severity>().unwrap(), Severity::Critical);
        assert_eq!("HIGH".parse::<Severity>().unwrap(), Severity::High);
        assert_eq!("med".parse::<Severity>().unwrap(), Severity::Medium);
        assert!("bogus".parse::<Severity>().is_err());
    }

    #[test]
    fn test_default_severity_policy() {
        assert_eq!(Severity::default_for_rule("sql-injection"), Severity::Critical);
        assert_eq!(Severity::default_for_rule("deadlock-potential"), Severity::High);
        assert_eq!(Severity::default_for_rule("unparseable"), Severity::Info);
    }

    #[test]
    fn test_dedup_hash_differs_by_evidence() {
        let a = Finding::new("sql-injection", "app.py", 10, 10, "x")
            .with_evidence(vec![EvidenceStep::new("app.py", 3)]);
        let b = Finding::new("sql-injection", "app.py", 10, 10, "x")
            .with_evidence(vec![EvidenceStep::new("app.py", 7)]);
        assert_ne!(a.dedup_hash, b.dedup_hash);
    }

    #[test]
    fn test_report_round_trip() {
        let findings = vec![Finding::new("race-condition", "bank.py", 5, 8, "check-then-act")
            .with_evidence(vec![EvidenceStep::new("bank.py", 5), EvidenceStep::new("bank.py", 8)])];
        let summary = ScanSummary::from_findings(&findings, 1);
        let report = Report {
            findings,
            summary,
            analyzer_version: "test".to_string(),
        };

        let json = report.to_json().unwrap();
        let back = Report::from_json(&json).unwrap();
        assert_eq!(back.findings.len(), 1);
        assert_eq!(back.findings[0], report.findings[0]);
        assert_eq!(back.summary, report.summary);
    }
}
