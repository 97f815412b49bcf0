//! Symbol table: an arena of named entities indexed by [`SymbolId`].
//!
//! Symbols reference each other (and their declarations) by id, never by
//! nested ownership, so circular imports and mutually recursive call
//! graphs are representable without cycles in the object graph itself.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Arena index of a symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SymbolId(pub u32);

/// Category of a named entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    /// A function or method
    Function,
    /// A class
    Class,
    /// A module-level binding (process-wide shared state candidate)
    Binding,
    /// A module itself (caller identity for module-scope statements)
    Module,
}

/// A non-owning reference back to a place a symbol is used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UseSite {
    pub file: String,
    pub line: usize,
}

/// A named entity with its defining location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Symbol {
    pub id: SymbolId,
    /// Bare name (`fetch_user`, `Store.get` for methods)
    pub name: String,
    /// Module-qualified name (`utils.fetch_user`)
    pub qualified_name: String,
    pub kind: SymbolKind,
    /// Index of the defining unit in the program's unit list
    pub unit: usize,
    /// Index into the unit's declaration list for this kind
    /// (`functions[i]` for functions, `bindings[i]` for bindings)
    pub decl_index: Option<usize>,
    /// Definition line (1-indexed)
    pub line: usize,
    /// Use sites recorded during call-graph construction
    pub use_sites: Vec<UseSite>,
}

/// Arena of symbols plus per-module name scopes.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct SymbolTable {
    symbols: Vec<Symbol>,
    /// module name -> (name -> symbol) scope
    module_scopes: FxHashMap<String, FxHashMap<String, SymbolId>>,
    /// unit index -> module name
    unit_modules: Vec<String>,
}

impl SymbolTable {
    #[must_use]
    pub fn new(unit_modules: Vec<String>) -> Self {
        Self {
            symbols: Vec::new(),
            module_scopes: FxHashMap::default(),
            unit_modules,
        }
    }

    /// Define a symbol and register it in its module scope.
    ///
    /// Registering the same name twice keeps the first definition (the
    /// innermost-first shadowing rule resolves duplicates before lookup
    /// ever reaches module scope).
    pub fn define(
        &mut self,
        name: impl Into<String>,
        kind: SymbolKind,
        unit: usize,
        decl_index: Option<usize>,
        line: usize,
    ) -> SymbolId {
        let name = name.into();
        let module = self
            .unit_modules
            .get(unit)
            .cloned()
            .unwrap_or_default();
        let id = SymbolId(self.symbols.len() as u32);
        let qualified_name = format!("{module}.{name}");

        self.symbols.push(Symbol {
            id,
            name: name.clone(),
            qualified_name,
            kind,
            unit,
            decl_index,
            line,
            use_sites: Vec::new(),
        });

        self.module_scopes
            .entry(module)
            .or_default()
            .entry(name)
            .or_insert(id);

        id
    }

    /// Get a symbol by id.
    ///
    /// # Panics
    ///
    /// Panics if the id did not come from this table.
    #[must_use]
    pub fn get(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.0 as usize]
    }

    /// Record a use site on a symbol.
    pub fn record_use(&mut self, id: SymbolId, file: impl Into<String>, line: usize) {
        self.symbols[id.0 as usize].use_sites.push(UseSite {
            file: file.into(),
            line,
        });
    }

    /// Look up a name in a module's scope.
    #[must_use]
    pub fn lookup_in_module(&self, module: &str, name: &str) -> Option<SymbolId> {
        self.module_scopes.get(module)?.get(name).copied()
    }

    /// Module name for a unit index.
    #[must_use]
    pub fn module_of_unit(&self, unit: usize) -> &str {
        self.unit_modules.get(unit).map_or("", String::as_str)
    }

    /// All symbols in arena order.
    #[must_use]
    pub fn all(&self) -> &[Symbol] {
        &self.symbols
    }

    /// Number of symbols.
    #[must_use]
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_define_and_lookup() {
        let mut table = SymbolTable::new(vec!["utils".to_string()]);
        let id = table.define("fetch_user", SymbolKind::Function, 0, Some(0), 10);
        assert_eq!(table.lookup_in_module("utils", "fetch_user"), Some(id));
        assert_eq!(table.get(id).qualified_name, "utils.fetch_user");
        assert!(table.lookup_in_module("utils", "missing").is_none());
    }

    #[test]
    fn test_duplicate_definition_keeps_first() {
        let mut table = SymbolTable::new(vec!["m".to_string()]);
        let first = table.define("f", SymbolKind::Function, 0, Some(0), 1);
        let _second = table.define("f", SymbolKind::Function, 0, Some(1), 9);
        assert_eq!(table.lookup_in_module("m", "f"), Some(first));
    }

    #[test]
    fn test_use_sites_are_back_references() {
        let mut table = SymbolTable::new(vec!["m".to_string()]);
        let id = table.define("shared", SymbolKind::Binding, 0, Some(0), 3);
        table.record_use(id, "other.py", 14);
        assert_eq!(table.get(id).use_sites.len(), 1);
        assert_eq!(table.get(id).use_sites[0].line, 14);
    }
}
