use once_cell::sync::Lazy;
use std::fmt;
use std::sync::RwLock;
use string_interner::{DefaultBackend, DefaultSymbol, StringInterner};

static INTERNER: Lazy<RwLock<StringInterner<DefaultBackend>>> =
    Lazy::new(|| RwLock::new(StringInterner::default()));

/// An identifier interned in the global interner. Scope bindings and
/// constant sets are keyed by `Symbol` so lookups hash a `usize`
/// instead of a string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Symbol(DefaultSymbol);

impl Symbol {
    pub fn new(name: &str) -> Self {
        let mut interner = INTERNER.write().unwrap();
        Symbol(interner.get_or_intern(name))
    }

    /// Resolve back to an owned string.
    pub fn resolve(&self) -> String {
        self.with_str(str::to_string)
    }

    /// Run a function over the interned slice without allocating.
    pub fn with_str<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&str) -> R,
    {
        let interner = INTERNER.read().unwrap();
        let s = interner
            .resolve(self.0)
            .expect("interned symbol should always resolve");
        f(s)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.with_str(|s| write!(f, "{s}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_name_same_symbol() {
        assert_eq!(Symbol::new("foo"), Symbol::new("foo"));
        assert_ne!(Symbol::new("foo"), Symbol::new("bar"));
    }

    #[test]
    fn resolve_round_trips() {
        let sym = Symbol::new("__dirname__");
        assert_eq!(sym.resolve(), "__dirname__");
        assert_eq!(sym.with_str(str::len), 11);
    }
}
