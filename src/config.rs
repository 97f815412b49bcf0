//! Analysis configuration.
//!
//! Source/sink/sanitizer matchers, enabled detectors, severity policy,
//! and propagation bounds. Loaded from JSON; every field defaults to the
//! built-in tables so a config file only needs to name what it changes.
//! Malformed configuration is the one fatal startup error: nothing else
//! in the pipeline is allowed to abort a run.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{HoundError, Result};
use crate::report::Severity;
use crate::taint::matchers::{
    builtin_sanitizers, builtin_sinks, builtin_sources, SanitizerSpec, SinkSpec, SourceSpec,
};

/// Complete analysis configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Taint source matchers
    pub sources: Vec<SourceSpec>,
    /// Taint sink matchers with rule mappings
    pub sinks: Vec<SinkSpec>,
    /// Sanitizer matchers (stop taint propagation)
    pub sanitizers: Vec<SanitizerSpec>,
    /// Enabled detector ids; empty enables every registered detector
    pub detectors: Vec<String>,
    /// Rule id -> severity overrides (policy, not analysis)
    pub severity_overrides: BTreeMap<String, Severity>,
    /// Maximum interprocedural hop count before `truncated-analysis`
    pub max_call_depth: usize,
    /// Maximum intra-function fixed-point passes
    pub max_iterations: usize,
    /// CI gate: exit non-zero at or above this severity
    pub fail_on: Severity,
    /// Per-file parse budget in milliseconds
    pub parse_timeout_ms: u64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            sources: builtin_sources(),
            sinks: builtin_sinks(),
            sanitizers: builtin_sanitizers(),
            detectors: Vec::new(),
            severity_overrides: BTreeMap::new(),
            max_call_depth: 8,
            max_iterations: 16,
            fail_on: Severity::High,
            parse_timeout_ms: 2_000,
        }
    }
}

impl AnalysisConfig {
    /// Load configuration from a JSON file and validate it.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| HoundError::io_with_path(e, path))?;
        let mut config: Self = serde_json::from_str(&raw)
            .map_err(|e| HoundError::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration, compiling regex matchers.
    ///
    /// Fails on invalid regexes, an empty sink table, unknown detector
    /// ids, or a zero hop budget.
    pub fn validate(&mut self) -> Result<()> {
        for source in &mut self.sources {
            source.matcher.compile()?;
        }
        for sink in &mut self.sinks {
            sink.matcher.compile()?;
        }
        for sanitizer in &mut self.sanitizers {
            sanitizer.matcher.compile()?;
        }

        if self.sinks.is_empty() {
            return Err(HoundError::Config(
                "sink table is empty; taint analysis would be vacuous".to_string(),
            ));
        }
        if self.max_call_depth == 0 {
            return Err(HoundError::Config(
                "max_call_depth must be at least 1".to_string(),
            ));
        }

        for id in &self.detectors {
            if !crate::detect::ALL_DETECTOR_IDS.contains(&id.as_str()) {
                return Err(HoundError::Config(format!(
                    "unknown detector id `{id}` (known: {})",
                    crate::detect::ALL_DETECTOR_IDS.join(", ")
                )));
            }
        }

        Ok(())
    }

    /// Effective severity for a rule: override if present, else the
    /// built-in policy default.
    #[must_use]
    pub fn severity_for(&self, rule_id: &str) -> Severity {
        self.severity_overrides
            .get(rule_id)
            .copied()
            .unwrap_or_else(|| Severity::default_for_rule(rule_id))
    }

    /// Whether a detector is enabled.
    #[must_use]
    pub fn detector_enabled(&self, id: &str) -> bool {
        self.detectors.is_empty() || self.detectors.iter().any(|d| d == id)
    }
}
