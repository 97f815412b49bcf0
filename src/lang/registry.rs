//! Language registry for extension-to-language mapping and content-shape
//! classification.
//!
//! The registry is the single place that knows which languages exist.
//! Extension lookup answers "what should this file be, going by its
//! name"; [`LanguageRegistry::classify_content`] answers "what does this
//! file actually look like". The model builder compares the two to flag
//! content/extension mismatches instead of crashing on disguised files.

use std::path::Path;
use std::sync::OnceLock;

use rustc_hash::FxHashMap;

use crate::lang::traits::{BoxedLanguage, Language};
use crate::lang::{javascript, python};

static REGISTRY: OnceLock<LanguageRegistry> = OnceLock::new();

/// Registry mapping file extensions and names to language implementations.
pub struct LanguageRegistry {
    by_name: FxHashMap<&'static str, BoxedLanguage>,
    by_ext: FxHashMap<&'static str, &'static str>,
    aliases: FxHashMap<&'static str, &'static str>,
}

impl LanguageRegistry {
    /// Get the global language registry singleton.
    pub fn global() -> &'static Self {
        REGISTRY.get_or_init(Self::new)
    }

    /// Create a new registry with all supported languages.
    fn new() -> Self {
        let mut registry = Self {
            by_name: FxHashMap::default(),
            by_ext: FxHashMap::default(),
            aliases: FxHashMap::default(),
        };

        registry.register(Box::new(python::Python));
        registry.register(Box::new(javascript::JavaScript));

        // Aliases so config files and CLI flags can use familiar names.
        registry.register_alias("py", "python");
        registry.register_alias("js", "javascript");
        registry.register_alias("ts", "javascript");
        registry.register_alias("typescript", "javascript");

        registry
    }

    fn register(&mut self, lang: BoxedLanguage) {
        let name = lang.name();
        for ext in lang.extensions() {
            self.by_ext.insert(*ext, name);
        }
        self.by_name.insert(name, lang);
    }

    fn register_alias(&mut self, alias: &'static str, target: &'static str) {
        self.aliases.insert(alias, target);
    }

    /// Get a language by name, resolving aliases.
    pub fn get_by_name(&self, name: &str) -> Option<&dyn Language> {
        let canonical = self.aliases.get(name).copied().unwrap_or(name);
        self.by_name.get(canonical).map(|b| b.as_ref())
    }

    /// Get a language by file extension (e.g. ".py").
    pub fn get_by_extension(&self, ext: &str) -> Option<&dyn Language> {
        self.by_ext.get(ext).and_then(|name| self.get_by_name(name))
    }

    /// Detect the nominal language of a path from its extension.
    pub fn detect_by_path(&self, path: &Path) -> Option<&dyn Language> {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|ext| format!(".{ext}"))
            .and_then(|ext| self.get_by_extension(&ext))
    }

    /// Classify file content by shape, independent of extension.
    ///
    /// Returns the best-scoring language, or `None` when no language
    /// produces meaningful evidence. Ties go to the first registered
    /// language so classification stays deterministic.
    pub fn classify_content(&self, content: &str) -> Option<&dyn Language> {
        let mut best: Option<(&dyn Language, u32)> = None;
        for lang in self.all() {
            let score = lang.content_score(content);
            if score == 0 {
                continue;
            }
            match best {
                Some((_, top)) if top >= score => {}
                _ => best = Some((lang, score)),
            }
        }
        best.map(|(lang, _)| lang)
    }

    /// All registered languages in deterministic (name) order.
    pub fn all(&self) -> impl Iterator<Item = &dyn Language> {
        let mut names: Vec<&&'static str> = self.by_name.keys().collect();
        names.sort_unstable();
        names
            .into_iter()
            .filter_map(|n| self.by_name.get(n).map(|b| b.as_ref()))
    }

    /// All file extensions the registry can analyze.
    pub fn supported_extensions(&self) -> Vec<&'static str> {
        let mut exts: Vec<&'static str> = self.by_ext.keys().copied().collect();
        exts.sort_unstable();
        exts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_by_name_and_aliases() {
        let registry = LanguageRegistry::global();
        assert!(registry.get_by_name("python").is_some());
        assert!(registry.get_by_name("javascript").is_some());
        assert_eq!(registry.get_by_name("ts").unwrap().name(), "javascript");
        assert_eq!(registry.get_by_name("py").unwrap().name(), "python");
        assert!(registry.get_by_name("cobol").is_none());
    }

    #[test]
    fn test_detect_by_path() {
        let registry = LanguageRegistry::global();
        assert_eq!(
            registry.detect_by_path(Path::new("api/app.py")).unwrap().name(),
            "python"
        );
        assert_eq!(
            registry.detect_by_path(Path::new("web/index.js")).unwrap().name(),
            "javascript"
        );
        assert!(registry.detect_by_path(Path::new("README.md")).is_none());
    }

    #[test]
    fn test_classify_python_content() {
        let registry = LanguageRegistry::global();
        let content = "import os\n\ndef handler(request):\n    return request.args\n";
        assert_eq!(registry.classify_content(content).unwrap().name(), "python");
    }

    #[test]
    fn test_classify_javascript_content() {
        let registry = LanguageRegistry::global();
        let content = "const x = 1;\nfunction processUser(user) {\n  return user.id === 0;\n}\n";
        assert_eq!(
            registry.classify_content(content).unwrap().name(),
            "javascript"
        );
    }
}
