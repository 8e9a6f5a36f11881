use std::sync::{Arc, RwLock};

use once_cell::sync::Lazy;

#[derive(Debug, Default)]
pub struct InterningTable {
    strings: RwLock<Vec<&'static str>>,
}

pub static INTERNING_TABLE: Lazy<Arc<InterningTable>> = Lazy::new(Default::default);

impl InterningTable {
    pub fn get(&self, index: u32) -> Option<&str> {
        let strings = self.strings.read().unwrap();

        strings.get(index as usize).copied()
    }

    pub fn insert_if_absent(&self, string: &str) -> u32 {
        if let Some(index) = self.index_of(string) {
            return index;
        }

        let mut strings = self.strings.write().unwrap();

        strings.push(Box::leak(Box::new(string.to_owned())));
        (strings.len() - 1) as _
    }

    pub fn index_of(&self, string: &str) -> Option<u32> {
        let strings = self.strings.read().unwrap();

        strings.iter().position(|s| *s == string).map(|i| i as _)
    }
}

/// An index into the string interning table. Quill variable and function
/// names are interned once and compared by index everywhere else.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InternedSymbol(u32);

impl InternedSymbol {
    pub fn new(value: &str) -> Self {
        let index = INTERNING_TABLE.insert_if_absent(value);

        Self(index)
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }

    pub fn value(&self) -> &'static str {
        INTERNING_TABLE.get(self.0).expect("Once an interned symbol is created, the string it references should never be removed from the table")
    }

    /// Compiler-generated temporaries are named `$tN` by HIR lowering and are
    /// invisible at the source level.
    pub fn is_temporary(&self) -> bool {
        self.value().starts_with('$')
    }
}

impl core::fmt::Debug for InternedSymbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("InternedSymbol")
            .field(&self.0)
            .field(&self.value())
            .finish()
    }
}

impl core::fmt::Display for InternedSymbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.value())
    }
}

#[cfg(test)]
mod tests {
    use super::InternedSymbol;

    #[test]
    fn interning_is_stable() {
        let a = InternedSymbol::new("counter");
        let b = InternedSymbol::new("counter");
        let c = InternedSymbol::new("other");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.value(), "counter");
    }

    #[test]
    fn temporaries_are_recognized() {
        assert!(InternedSymbol::new("$t4").is_temporary());
        assert!(!InternedSymbol::new("t4").is_temporary());
    }
}
