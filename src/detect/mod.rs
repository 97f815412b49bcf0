//! Structural anti-pattern detectors.
//!
//! Each detector is an independent pass over a unit's CFGs, polymorphic
//! over the shared [`Detector`] contract and registered in a fixed list.
//! Detector failures are isolated: a panic inside `detect` is caught,
//! converted into an `internal-detector-error` finding naming the
//! detector, and never stops other detectors or files.

pub mod check_then_act;
pub mod empty_catch;
pub mod lock_order;
pub mod missing_transaction;
pub mod resource_leak;

use std::panic::{catch_unwind, AssertUnwindSafe};

use tracing::warn;

use crate::cancel::CancelToken;
use crate::config::AnalysisConfig;
use crate::model::types::SourceUnit;
use crate::report::Finding;
use crate::resolve::Program;

/// Contract every detector implements.
pub trait Detector: Send + Sync {
    /// Stable detector id (doubles as the emitted rule id).
    fn id(&self) -> &'static str;

    /// Run over one unit. `program` provides the symbol table and call
    /// graph for cross-function reasoning; detectors must stay
    /// deterministic so repeated runs produce identical findings.
    fn detect(&self, unit: &SourceUnit, program: &Program) -> Vec<Finding>;
}

/// Ids of every registered detector, for config validation.
pub const ALL_DETECTOR_IDS: &[&str] = &[
    "unreleased-resource",
    "deadlock-potential",
    "race-condition",
    "missing-transaction",
    "empty-catch",
];

/// The fixed detector list consulted by the pipeline.
#[must_use]
pub fn registry() -> Vec<Box<dyn Detector>> {
    vec![
        Box::new(resource_leak::ResourceLeakDetector),
        Box::new(lock_order::LockOrderDetector),
        Box::new(check_then_act::CheckThenActDetector),
        Box::new(missing_transaction::MissingTransactionDetector),
        Box::new(empty_catch::EmptyCatchDetector),
    ]
}

/// Run all enabled detectors over one unit with panic isolation.
#[must_use]
pub fn run_detectors(
    unit: &SourceUnit,
    program: &Program,
    config: &AnalysisConfig,
    cancel: &CancelToken,
) -> Vec<Finding> {
    run_detector_list(&registry(), unit, program, config, cancel)
}

/// Harness over an explicit detector list (separated for testability).
fn run_detector_list(
    detectors: &[Box<dyn Detector>],
    unit: &SourceUnit,
    program: &Program,
    config: &AnalysisConfig,
    cancel: &CancelToken,
) -> Vec<Finding> {
    let mut findings = Vec::new();

    for detector in detectors {
        if cancel.is_cancelled() {
            break;
        }
        if !config.detector_enabled(detector.id()) {
            continue;
        }

        match catch_unwind(AssertUnwindSafe(|| detector.detect(unit, program))) {
            Ok(mut detected) => {
                for finding in &mut detected {
                    finding.severity = config.severity_for(&finding.rule_id);
                }
                findings.extend(detected);
            }
            Err(payload) => {
                let detail = payload
                    .downcast_ref::<&str>()
                    .map(ToString::to_string)
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                warn!(detector = detector.id(), unit = %unit.path, %detail, "detector crashed");
                findings.push(
                    Finding::new(
                        "internal-detector-error",
                        unit.path.clone(),
                        0,
                        0,
                        format!("detector `{}` crashed: {detail}", detector.id()),
                    )
                    .with_severity(config.severity_for("internal-detector-error")),
                );
            }
        }
    }

    findings
}

#[cfg(test)]
mod tests {
    use super::*;

    struct PanickingDetector;
    impl Detector for PanickingDetector {
        fn id(&self) -> &'static str {
            "panicking"
        }
        fn detect(&self, _unit: &SourceUnit, _program: &Program) -> Vec<Finding> {
            panic!("malformed input");
        }
    }

    #[test]
    fn test_panicking_detector_becomes_a_finding() {
        let (program, _) = Program::resolve(vec![]);
        let unit = SourceUnit {
            path: "x.py".to_string(),
            language: "python".to_string(),
            imports: vec![],
            bindings: vec![],
            classes: vec![],
            functions: vec![],
            module_statements: vec![],
        };

        let detectors: Vec<Box<dyn Detector>> = vec![Box::new(PanickingDetector)];
        let config = AnalysisConfig::default();
        let findings =
            run_detector_list(&detectors, &unit, &program, &config, &CancelToken::new());

        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].rule_id, "internal-detector-error");
        assert!(findings[0].message.contains("panicking"));
        assert!(findings[0].message.contains("malformed input"));
    }

    #[test]
    fn test_registry_matches_id_list() {
        let ids: Vec<&str> = registry().iter().map(|d| d.id()).collect();
        assert_eq!(ids, ALL_DETECTOR_IDS);
    }
}
