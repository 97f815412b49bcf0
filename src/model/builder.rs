//! Source model construction.
//!
//! Parses one file into a [`SourceUnit`], classifying content by shape
//! rather than trusting the file extension. A `.py` file full of
//! JavaScript still gets analyzed (under the detected grammar) and gains
//! a `content-mismatch` finding instead of crashing the run.

use tracing::debug;
use tree_sitter::Tree;

use crate::error::{HoundError, Result};
use crate::lang::{Language, LanguageRegistry};
use crate::model::types::SourceUnit;
use crate::report::{Finding, Severity};

/// Result of building one file: the unit (when parseable) plus any
/// findings produced during ingestion.
#[derive(Debug)]
pub struct BuildOutput {
    pub unit: SourceUnit,
    pub findings: Vec<Finding>,
}

/// Builds normalized source models from raw file contents.
#[derive(Debug, Clone)]
pub struct ModelBuilder {
    /// Per-file parse budget in milliseconds. A hung parse becomes a
    /// `ParseError`, never a process hang.
    parse_timeout_ms: u64,
}

impl Default for ModelBuilder {
    fn default() -> Self {
        Self {
            parse_timeout_ms: 2_000,
        }
    }
}

/// Content-score advantage required before the shape classifier
/// overrides a clean parse under the nominal language.
const MISMATCH_SCORE_MARGIN: u32 = 2;

/// Minimum absolute score for a mismatch verdict, so near-empty files
/// never flip language.
const MISMATCH_SCORE_FLOOR: u32 = 8;

impl ModelBuilder {
    #[must_use]
    pub fn new(parse_timeout_ms: u64) -> Self {
        Self { parse_timeout_ms }
    }

    /// Build the source model for one file.
    ///
    /// Fails with [`HoundError::Parse`] when no registered grammar can
    /// make sense of the content; the caller records an `unparseable`
    /// finding and skips the file rather than aborting the run.
    pub fn build(&self, source: &str, path: &str) -> Result<BuildOutput> {
        let registry = LanguageRegistry::global();
        let nominal = registry
            .detect_by_path(std::path::Path::new(path))
            .ok_or_else(|| HoundError::UnsupportedLanguage(path.to_string()))?;

        let nominal_tree = self.parse_with(nominal, source, path)?;
        let nominal_errors = error_ratio(&nominal_tree);

        // Shape-based classification, independent of the extension.
        let detected = registry.classify_content(source);
        let mismatch = match detected {
            Some(lang) if lang.name() != nominal.name() => {
                let detected_score = lang.content_score(source);
                let nominal_score = nominal.content_score(source);
                detected_score >= MISMATCH_SCORE_FLOOR
                    && detected_score >= nominal_score.saturating_mul(MISMATCH_SCORE_MARGIN)
            }
            _ => false,
        };

        if mismatch || nominal_errors > 0.25 {
            // The extension lies, or its grammar cannot hold the content.
            // Try the detected language before giving up.
            if let Some(lang) = detected.filter(|l| l.name() != nominal.name()) {
                let tree = self.parse_with(lang, source, path)?;
                if error_ratio(&tree) < nominal_errors || mismatch {
                    debug!(path, nominal = nominal.name(), detected = lang.name(), "content/extension mismatch");
                    let unit = lang.lower(&tree, source.as_bytes(), path)?;
                    let finding = Finding::new(
                        "content-mismatch",
                        path,
                        1,
                        1,
                        format!(
                            "file extension says {} but content classifies as {}",
                            nominal.name(),
                            lang.name()
                        ),
                    )
                    .with_severity(Severity::Low);
                    return Ok(BuildOutput {
                        unit,
                        findings: vec![finding],
                    });
                }
            }

            if nominal_errors > 0.5 {
                return Err(HoundError::parse(
                    path,
                    format!(
                        "{}% of syntax nodes are errors under the {} grammar",
                        (nominal_errors * 100.0) as u32,
                        nominal.name()
                    ),
                ));
            }
        }

        let unit = nominal.lower(&nominal_tree, source.as_bytes(), path)?;
        Ok(BuildOutput {
            unit,
            findings: Vec::new(),
        })
    }

    fn parse_with(&self, lang: &dyn Language, source: &str, path: &str) -> Result<Tree> {
        let mut parser = lang.parser()?;
        parser.set_timeout_micros(self.parse_timeout_ms * 1_000);
        parser
            .parse(source, None)
            .ok_or_else(|| HoundError::parse(path, "parse timed out or was aborted"))
    }
}

/// Fraction of named nodes that are syntax errors.
fn error_ratio(tree: &Tree) -> f64 {
    let mut errors = 0usize;
    let mut total = 0usize;
    let mut cursor = tree.root_node().walk();

    // Depth-first traversal without recursion.
    'walk: loop {
        let node = cursor.node();
        if node.is_named() {
            total += 1;
            if node.is_error() || node.is_missing() {
                errors += 1;
            }
        }
        if cursor.goto_first_child() {
            continue;
        }
        loop {
            if cursor.goto_next_sibling() {
                continue 'walk;
            }
            if !cursor.goto_parent() {
                break 'walk;
            }
        }
    }

    if total == 0 {
        0.0
    } else {
        errors as f64 / total as f64
    }
}
