//! Analysis pipeline orchestration.
//!
//! Phases: walk -> parallel per-file model building -> barrier ->
//! cross-file resolution -> parallel detectors + taint propagation ->
//! aggregation. Building and detection are embarrassingly parallel
//! (rayon, write-once result collection); resolution requires the
//! barrier because imports may reference units that finish building
//! later. Nothing after startup aborts the run: recoverable failures
//! become findings, and cancellation returns partial results.

use std::path::Path;

use rayon::prelude::*;
use tracing::{debug, info};

use crate::cancel::CancelToken;
use crate::config::AnalysisConfig;
use crate::detect;
use crate::error::Result;
use crate::lang::LanguageRegistry;
use crate::model::{BuildOutput, ModelBuilder};
use crate::report::{aggregate, Finding, Report};
use crate::resolve::Program;
use crate::taint::TaintEngine;

/// The analyzer: configuration plus a cancellation token.
#[derive(Debug, Clone, Default)]
pub struct Analyzer {
    config: AnalysisConfig,
    cancel: CancelToken,
    no_ignore: bool,
}

impl Analyzer {
    #[must_use]
    pub fn new(config: AnalysisConfig) -> Self {
        Self {
            config,
            cancel: CancelToken::new(),
            no_ignore: false,
        }
    }

    /// Ignore `.gitignore` patterns while walking.
    #[must_use]
    pub fn with_no_ignore(mut self, no_ignore: bool) -> Self {
        self.no_ignore = no_ignore;
        self
    }

    /// Token shared with in-flight phases; cancel it from another thread
    /// to get partial findings back.
    #[must_use]
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    #[must_use]
    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Walk a filesystem tree and analyze every supported file.
    pub fn run(&self, root: &Path) -> Result<Report> {
        if !root.exists() {
            return Err(crate::error::HoundError::io_with_path(
                std::io::Error::new(std::io::ErrorKind::NotFound, "scan root does not exist"),
                root,
            ));
        }

        let mut files = Vec::new();
        let mut findings = Vec::new();
        let extensions = LanguageRegistry::global().supported_extensions();

        let mut walker = ignore::WalkBuilder::new(root);
        walker.standard_filters(!self.no_ignore);
        // Honor .gitignore in plain directory trees too, not only
        // checked-out repositories.
        walker.require_git(false);
        for entry in walker.build() {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    debug!(error = %e, "walk error, skipping entry");
                    continue;
                }
            };
            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }
            let path = entry.path();
            let supported = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|ext| format!(".{ext}"))
                .is_some_and(|ext| extensions.contains(&ext.as_str()));
            if !supported {
                continue;
            }

            let display = path
                .strip_prefix(root)
                .unwrap_or(path)
                .to_string_lossy()
                .into_owned();
            match std::fs::read_to_string(path) {
                Ok(content) => files.push((display, content)),
                Err(e) => {
                    // Unreadable counts as unparseable: recorded, skipped.
                    findings.push(Finding::new(
                        "unparseable",
                        display,
                        0,
                        0,
                        format!("file could not be read: {e}"),
                    ));
                }
            }
        }

        // Deterministic unit order regardless of walk order.
        files.sort_by(|a, b| a.0.cmp(&b.0));
        let unreadable = findings.len();
        info!(files = files.len(), unreadable, "scan started");

        let mut report = self.analyze_sources(files);
        if !findings.is_empty() {
            let attempted = report.summary.files_scanned + unreadable;
            findings.extend(report.findings);
            report = aggregate(findings, attempted);
        }
        Ok(report)
    }

    /// Analyze in-memory (path, content) pairs. The entry point tests
    /// and embedders use; `run` is a filesystem shim over it.
    #[must_use]
    pub fn analyze_sources(&self, files: Vec<(String, String)>) -> Report {
        let files_scanned = files.len();
        let builder = ModelBuilder::new(self.config.parse_timeout_ms);

        // Phase 1: parallel model building. Input order is preserved by
        // the ordered collect, keeping the pipeline deterministic.
        let built: Vec<std::result::Result<BuildOutput, Finding>> = files
            .par_iter()
            .map(|(path, content)| {
                if self.cancel.is_cancelled() {
                    return Err(Finding::new(
                        "unparseable",
                        path.clone(),
                        0,
                        0,
                        "analysis cancelled before this file was parsed",
                    ));
                }
                builder.build(content, path).map_err(|e| {
                    Finding::new("unparseable", path.clone(), 0, 0, e.to_string())
                })
            })
            .collect();

        let mut findings = Vec::new();
        let mut units = Vec::new();
        for outcome in built {
            match outcome {
                Ok(output) => {
                    findings.extend(output.findings);
                    units.push(output.unit);
                }
                Err(finding) => findings.push(finding),
            }
        }

        // Phase 2: barrier, then cross-file resolution.
        let (program, resolution_findings) = Program::resolve(units);
        findings.extend(resolution_findings);

        // Phase 3: per-unit detectors in parallel, taint across the
        // whole program.
        let detector_findings: Vec<Finding> = program
            .units
            .par_iter()
            .flat_map(|unit| detect::run_detectors(unit, &program, &self.config, &self.cancel))
            .collect();
        findings.extend(detector_findings);

        let engine = TaintEngine::new(&program, &self.config);
        let (_facts, taint_findings) = engine.propagate(&self.cancel);
        findings.extend(taint_findings);

        // Severity is policy, applied uniformly at the end so overrides
        // reach every producer (resolver blind spots included).
        for finding in &mut findings {
            finding.severity = self.config.severity_for(&finding.rule_id);
        }

        aggregate(findings, files_scanned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyzer() -> Analyzer {
        Analyzer::new(AnalysisConfig::default())
    }

    #[test]
    fn test_unparseable_file_is_a_finding_not_an_abort() {
        let report = analyzer().analyze_sources(vec![
            (
                "bad.py".to_string(),
                "def broken(:\n    ]]]]\n)))) ????".to_string(),
            ),
            (
                "good.py".to_string(),
                "def ok(request, cursor):\n    q = request.args.get('q')\n    cursor.execute(q)\n".to_string(),
            ),
        ]);
        // The good file still produced its finding.
        assert!(report.findings.iter().any(|f| f.rule_id == "sql-injection"));
        assert_eq!(report.summary.files_scanned, 2);
    }

    #[test]
    fn test_pipeline_is_idempotent() {
        let files = || {
            vec![(
                "app.py".to_string(),
                "\
import threading

lock_a = threading.Lock()
lock_b = threading.Lock()

def one(request, cursor):
    uid = request.args.get('id')
    sql = f\"SELECT * FROM users WHERE id = {uid}\"
    cursor.execute(sql)
    with lock_a:
        with lock_b:
            pass

def two():
    with lock_b:
        with lock_a:
            pass
"
                .to_string(),
            )]
        };
        let first = analyzer().analyze_sources(files());
        let second = analyzer().analyze_sources(files());
        assert_eq!(
            first.to_json().unwrap(),
            second.to_json().unwrap(),
            "unchanged input must produce a byte-identical report"
        );
    }

    #[test]
    fn test_cancelled_run_returns_partial_results() {
        let analyzer = analyzer();
        analyzer.cancel_token().cancel();
        let report = analyzer.analyze_sources(vec![(
            "app.py".to_string(),
            "def f():\n    return 1\n".to_string(),
        )]);
        // Cancelled before parse: the file is recorded, not lost.
        assert_eq!(report.summary.files_scanned, 1);
        assert!(report
            .findings
            .iter()
            .any(|f| f.rule_id == "unparseable" && f.message.contains("cancelled")));
    }
}
