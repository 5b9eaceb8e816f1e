//! Module-wide name table.

use std::collections::{HashMap, HashSet};

#[derive(Clone, Debug, Default)]
pub struct SymbolTable {
    used: HashSet<String>,
    next_suffix: HashMap<String, u32>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `name` as taken and returns it unchanged, even if it was
    /// already taken.
    pub fn register(&mut self, name: &str) -> String {
        self.used.insert(name.to_string());
        name.to_string()
    }

    /// Returns a name derived from `name` that no other symbol uses:
    /// `name`, then `name_1`, `name_2`, ...
    pub fn new_symbol(&mut self, name: &str) -> String {
        if self.used.insert(name.to_string()) {
            return name.to_string();
        }
        let suffix = self.next_suffix.entry(name.to_string()).or_insert(0);
        loop {
            *suffix += 1;
            let candidate = format!("{name}_{suffix}");
            if self.used.insert(candidate.clone()) {
                return candidate;
            }
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.used.contains(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_symbol_uniquifies() {
        let mut symbols = SymbolTable::new();
        assert_eq!(symbols.new_symbol("convert_S"), "convert_S");
        assert_eq!(symbols.new_symbol("convert_S"), "convert_S_1");
        assert_eq!(symbols.new_symbol("convert_S"), "convert_S_2");
    }

    #[test]
    fn new_symbol_skips_registered_suffixes() {
        let mut symbols = SymbolTable::new();
        symbols.register("a");
        symbols.register("a_1");
        assert_eq!(symbols.new_symbol("a"), "a_2");
    }

    #[test]
    fn register_does_not_rename() {
        let mut symbols = SymbolTable::new();
        assert_eq!(symbols.register("dup"), "dup");
        assert_eq!(symbols.register("dup"), "dup");
        assert!(symbols.contains("dup"));
    }
}
