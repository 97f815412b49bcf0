//! Core Language trait definition.
//!
//! The [`Language`] trait is the abstraction point between the normalized
//! source model and the per-language tree-sitter grammars. Each language
//! provides a parser, a lowering from the syntax tree into a
//! [`SourceUnit`], and a content-shape score used to classify files whose
//! extension lies about their contents.

use tree_sitter::{Parser, Tree};

use crate::error::Result;
use crate::model::types::SourceUnit;

/// Trait for language-specific operations.
pub trait Language: Send + Sync {
    /// Language identifier (e.g. "python", "javascript").
    fn name(&self) -> &'static str;

    /// File extensions for this language (e.g. &[".py", ".pyi"]).
    fn extensions(&self) -> &[&'static str];

    /// Get a configured tree-sitter parser for this language.
    fn parser(&self) -> Result<Parser>;

    /// Lower a parsed tree into the normalized source model.
    ///
    /// `path` is recorded on the resulting unit and used in error
    /// messages; lowering itself never touches the filesystem.
    fn lower(&self, tree: &Tree, source: &[u8], path: &str) -> Result<SourceUnit>;

    /// Score how strongly the raw content looks like this language.
    ///
    /// Used for shape-based classification of mixed-content or
    /// wrong-extension files. Scores are comparable across languages;
    /// zero means "no evidence". The classifier combines this with the
    /// parse error rate, so scores only need to separate languages on
    /// obvious lexical shape (keywords, statement terminators).
    fn content_score(&self, content: &str) -> u32;
}

/// Boxed language trait object for dynamic dispatch.
pub type BoxedLanguage = Box<dyn Language>;
