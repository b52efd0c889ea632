use std::fmt;
use std::sync::Arc;

use im::Vector;
use rustc_hash::FxHashMap;

use crate::eval::Interp;
use crate::interner::Symbol;
use crate::scope::ScopeId;
use crate::syntax::{normalize_number, Node};

// ============================================================================
// Literals
// ============================================================================

/// The name the undefined sentinel is known by, both as a binding and
/// as a head form.
pub const UNDEFINED: &str = "undefined";

/// A scalar runtime value. The textual "head form" (canonical number
/// text, quoted string, or the fixed undefined name) is rendered on
/// demand; it is the form used for pattern equality, map keys, and
/// dot lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Number(f64),
    Str(String),
    Undefined,
}

impl Literal {
    pub fn head_form(&self) -> String {
        match self {
            Literal::Number(n) => normalize_number(*n),
            Literal::Str(s) => format!("\"{s}\""),
            Literal::Undefined => UNDEFINED.to_string(),
        }
    }
}

// ============================================================================
// Functions
// ============================================================================

/// One (pattern, body) pair of a user-defined function.
#[derive(Debug, Clone, PartialEq)]
pub struct Clause {
    pub pattern: Vec<Node>,
    pub body: Node,
}

/// A builtin implementation hook. Builtins receive their argument
/// syntax nodes unevaluated and decide evaluation order themselves.
pub type Builtin = fn(&mut Interp, ScopeId, &[Arg]) -> Value;

/// An argument handed to a builtin: either a raw, unevaluated syntax
/// node, or a value that was already computed (a spread expression in
/// head position produces these). User code can never observe the
/// raw form.
#[derive(Debug, Clone)]
pub enum Arg<'a> {
    Raw(&'a Node),
    Val(Value),
}

/// A function value: either a set of user-defined clauses dispatched
/// by pattern, or a builtin hook. `capture` is the scope the function
/// closes over; calls bind arguments into a fresh child of it and the
/// cell itself is never mutated.
#[derive(Debug)]
pub struct FunctionCell {
    pub name: Option<Symbol>,
    pub clauses: Vec<Clause>,
    pub builtin: Option<Builtin>,
    pub capture: ScopeId,
}

// Compare by behavior, not by environment: two functions are equal
// when their names, clauses and builtin hooks agree.
impl PartialEq for FunctionCell {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.clauses == other.clauses
            && match (self.builtin, other.builtin) {
                (Some(a), Some(b)) => std::ptr::eq(a as *const (), b as *const ()),
                (None, None) => true,
                _ => false,
            }
    }
}

impl FunctionCell {
    pub fn builtin(name: &str, hook: Builtin, capture: ScopeId) -> Value {
        Value::Function(Arc::new(FunctionCell {
            name: Some(Symbol::new(name)),
            clauses: Vec::new(),
            builtin: Some(hook),
            capture,
        }))
    }
}

// ============================================================================
// Lists
// ============================================================================

/// An ordered sequence of values:
/// positional index and negative wrap-around, half-open slices, and
/// signed-step slices. Out-of-range access yields undefined, never an
/// error. Backed by a persistent vector so deep copies share
/// structure.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ListValue {
    pub elements: Vector<Value>,
}

impl ListValue {
    pub fn new() -> Self {
        ListValue::default()
    }

    pub fn from_values(values: impl IntoIterator<Item = Value>) -> Self {
        ListValue {
            elements: values.into_iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn to_vec(&self) -> Vec<Value> {
        self.elements.iter().cloned().collect()
    }

    /// Positional index; negative indices wrap from the end.
    pub fn index(&self, index: i64) -> Value {
        let len = self.len() as i64;
        let index = if index < 0 { index + len } else { index };
        if index < 0 || index >= len {
            return Value::undefined();
        }
        self.elements[index as usize].clone()
    }

    /// Half-open slice; negative endpoints wrap, the end clamps to
    /// the length, and an out-of-range begin yields undefined.
    pub fn slice(&self, begin: i64, end: i64) -> Value {
        let len = self.len() as i64;
        let begin = if begin < 0 { begin + len } else { begin };
        if begin < 0 || begin >= len {
            return Value::undefined();
        }
        let end = if end < 0 { end + len } else { end };
        if end < 0 {
            return Value::undefined();
        }
        let end = end.min(len);
        if end <= begin {
            return Value::List(ListValue::new());
        }
        Value::List(ListValue {
            elements: self.elements.clone().slice(begin as usize..end as usize),
        })
    }

    /// Signed-step slice. `open_end` marks a missing end argument,
    /// in which case the caller supplies length (positive step) or -1
    /// (negative step); iteration stops at the end or at either
    /// boundary.
    pub fn slice_step(&self, begin: i64, end: i64, step: i64, open_end: bool) -> Value {
        let len = self.len() as i64;
        let begin = if begin < 0 { begin + len } else { begin };
        if begin < 0 || begin >= len {
            return Value::undefined();
        }
        let mut end = end;
        if !open_end {
            if end < 0 {
                end += len;
            }
            if end < 0 {
                return Value::undefined();
            }
        }
        if end > len {
            end = len;
        }

        let mut out = Vector::new();
        let mut i = begin;
        while i != end && i >= 0 && i < len {
            out.push_back(self.elements[i as usize].clone());
            i += step;
        }
        Value::List(ListValue { elements: out })
    }
}

impl FromIterator<Value> for ListValue {
    fn from_iter<T: IntoIterator<Item = Value>>(iter: T) -> Self {
        ListValue::from_values(iter)
    }
}

// ============================================================================
// Maps
// ============================================================================

/// An insertion-ordered map from literal head forms to values. `keys`
/// remembers the literal key values in first-insertion order; later
/// writes to the same key overwrite the value but keep the position.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MapValue {
    pub keys: Vec<Value>,
    pub entries: FxHashMap<String, Value>,
}

impl MapValue {
    pub fn new() -> Self {
        MapValue::default()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Insert under a literal key. Non-literal keys are rejected by
    /// the callers before this point.
    pub fn insert(&mut self, key: Value, value: Value) {
        let Some(form) = key.head_form() else {
            return;
        };
        if !self.entries.contains_key(&form) {
            self.keys.push(key);
        }
        self.entries.insert(form, value);
    }

    pub fn get(&self, key_form: &str) -> Option<&Value> {
        self.entries.get(key_form)
    }

    /// Key/value pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&Value, &Value)> {
        self.keys.iter().filter_map(|k| {
            let form = k.head_form()?;
            Some((k, self.entries.get(&form)?))
        })
    }
}

// ============================================================================
// Value
// ============================================================================

/// The universal runtime value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Literal(Literal),
    Function(Arc<FunctionCell>),
    List(ListValue),
    Map(MapValue),
}

impl Value {
    pub fn undefined() -> Value {
        Value::Literal(Literal::Undefined)
    }

    pub fn number(n: f64) -> Value {
        Value::Literal(Literal::Number(n))
    }

    pub fn string(s: impl Into<String>) -> Value {
        Value::Literal(Literal::Str(s.into()))
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Literal(Literal::Undefined))
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Literal(Literal::Number(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Literal(Literal::Str(s)) => Some(s),
            _ => None,
        }
    }

    /// The textual head form, for literal values only. Composite
    /// values have no head and never act as map keys or pattern
    /// literals.
    pub fn head_form(&self) -> Option<String> {
        match self {
            Value::Literal(lit) => Some(lit.head_form()),
            _ => None,
        }
    }

    /// Truthiness: non-zero numbers, non-empty strings, non-empty
    /// lists, non-empty maps, and functions are truthy; zero, empty
    /// containers, and undefined are falsy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Literal(Literal::Number(n)) => *n != 0.0,
            Value::Literal(Literal::Str(s)) => !s.is_empty(),
            Value::Literal(Literal::Undefined) => false,
            Value::Function(_) => true,
            Value::List(l) => !l.is_empty(),
            Value::Map(m) => !m.is_empty(),
        }
    }

    /// Rewrite the capture scope of a function value; other values
    /// pass through unchanged. Used when a binding crosses a scope
    /// isolation boundary.
    pub fn reparent(&self, capture: ScopeId) -> Value {
        match self {
            Value::Function(cell) => Value::Function(Arc::new(FunctionCell {
                name: cell.name,
                clauses: cell.clauses.clone(),
                builtin: cell.builtin,
                capture,
            })),
            other => other.clone(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", crate::format::render(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbers(ns: &[f64]) -> ListValue {
        ListValue::from_values(ns.iter().map(|&n| Value::number(n)))
    }

    #[test]
    fn head_forms() {
        assert_eq!(Value::number(5.0).head_form().unwrap(), "5");
        assert_eq!(Value::string("hi").head_form().unwrap(), "\"hi\"");
        assert_eq!(Value::undefined().head_form().unwrap(), "undefined");
        assert_eq!(Value::List(ListValue::new()).head_form(), None);
    }

    #[test]
    fn index_wraps_and_bounds() {
        let l = numbers(&[1.0, 2.0, 3.0]);
        assert_eq!(l.index(0), Value::number(1.0));
        assert_eq!(l.index(-1), Value::number(3.0));
        assert!(l.index(3).is_undefined());
        assert!(l.index(-4).is_undefined());
    }

    #[test]
    fn half_open_slice() {
        let l = numbers(&[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(l.slice(1, 3), Value::List(numbers(&[2.0, 3.0])));
        assert_eq!(l.slice(0, 99), Value::List(numbers(&[1.0, 2.0, 3.0, 4.0])));
        assert_eq!(l.slice(-2, 4), Value::List(numbers(&[3.0, 4.0])));
        assert_eq!(l.slice(2, 1), Value::List(numbers(&[])));
        assert!(l.slice(4, 5).is_undefined());
    }

    #[test]
    fn signed_step_slice() {
        let l = numbers(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(
            l.slice_step(4, 0, -1, false),
            Value::List(numbers(&[5.0, 4.0, 3.0, 2.0]))
        );
        assert_eq!(
            l.slice_step(0, -1, -1, true),
            Value::List(numbers(&[1.0]))
        );
        assert_eq!(
            l.slice_step(0, 5, 2, false),
            Value::List(numbers(&[1.0, 3.0, 5.0]))
        );
    }

    #[test]
    fn map_keeps_first_insertion_order() {
        let mut m = MapValue::new();
        m.insert(Value::string("a"), Value::number(1.0));
        m.insert(Value::string("b"), Value::number(2.0));
        m.insert(Value::string("a"), Value::number(3.0));
        assert_eq!(m.len(), 2);
        assert_eq!(m.get("\"a\""), Some(&Value::number(3.0)));
        let order: Vec<String> = m.iter().map(|(k, _)| k.head_form().unwrap()).collect();
        assert_eq!(order, vec!["\"a\"", "\"b\""]);
    }

    #[test]
    fn string_and_number_keys_stay_distinct() {
        let mut m = MapValue::new();
        m.insert(Value::number(1.0), Value::string("num"));
        m.insert(Value::string("1"), Value::string("str"));
        assert_eq!(m.len(), 2);
        assert_eq!(m.get("1").and_then(|v| v.as_str()), Some("num"));
        assert_eq!(m.get("\"1\"").and_then(|v| v.as_str()), Some("str"));
    }
}
