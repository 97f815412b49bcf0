//! Language abstraction layer.
//!
//! Provides a unified interface for multi-language analysis via the
//! [`Language`] trait. Each supported language implements the trait to
//! provide its tree-sitter parser and the lowering into the normalized
//! source model.
//!
//! # Query caching
//!
//! Tree-sitter query compilation is expensive relative to matching, and
//! queries are immutable once built, so compiled queries are cached
//! globally keyed by `(language, query kind)`.

pub mod javascript;
pub mod python;
pub mod registry;
pub mod traits;

pub use registry::LanguageRegistry;
pub use traits::{BoxedLanguage, Language};

use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tree_sitter::{Language as TSLanguage, Query};

use crate::error::{HoundError, Result};

/// Cache key for compiled tree-sitter queries.
type QueryCacheKey = (&'static str, &'static str);

/// Thread-safe cache for compiled tree-sitter queries.
static QUERY_CACHE: Lazy<RwLock<FxHashMap<QueryCacheKey, Arc<Query>>>> =
    Lazy::new(|| RwLock::new(FxHashMap::default()));

/// Get or compile a tree-sitter query, using the cache for repeated
/// lookups.
pub(crate) fn get_cached_query(
    ts_lang: &TSLanguage,
    lang_name: &'static str,
    query_kind: &'static str,
    query_str: &str,
) -> Result<Arc<Query>> {
    let key = (lang_name, query_kind);

    // Fast path: read lock only.
    {
        let cache = QUERY_CACHE.read();
        if let Some(query) = cache.get(&key) {
            return Ok(Arc::clone(query));
        }
    }

    let query = Query::new(ts_lang, query_str)
        .map_err(|e| HoundError::TreeSitter(format!("{lang_name}/{query_kind} query: {e}")))?;
    let query_arc = Arc::new(query);

    let mut cache = QUERY_CACHE.write();
    // Another thread may have compiled the same query while we held no lock.
    cache.entry(key).or_insert_with(|| Arc::clone(&query_arc));

    Ok(query_arc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_cache_returns_same_instance() {
        let lang: TSLanguage = tree_sitter_python::LANGUAGE.into();
        let a = get_cached_query(&lang, "python", "test_fn", "(function_definition) @f").unwrap();
        let b = get_cached_query(&lang, "python", "test_fn", "(function_definition) @f").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_invalid_query_is_an_error() {
        let lang: TSLanguage = tree_sitter_python::LANGUAGE.into();
        let result = get_cached_query(&lang, "python", "test_bad", "(no_such_node) @x");
        assert!(result.is_err());
    }
}
