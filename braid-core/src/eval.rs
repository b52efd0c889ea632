use im::Vector;

use crate::binder::bind_arguments;
use crate::interner::Symbol;
use crate::matcher::match_clauses;
use crate::scope::{ScopeId, Scopes};
use crate::syntax::{Node, NodeKind};
use crate::value::{Arg, ListValue, Literal, MapValue, Value};

// ============================================================================
// Interpreter
// ============================================================================

/// One evaluation context. Each concurrent task owns its own `Interp`
/// (and with it, its own scope arena); the process-wide pieces are
/// the intrinsic registry, the interner, and the task wait group.
pub struct Interp {
    pub scopes: Scopes,
}

impl Default for Interp {
    fn default() -> Self {
        Self::new()
    }
}

impl Interp {
    pub fn new() -> Interp {
        Interp {
            scopes: Scopes::new(),
        }
    }

    pub fn from_scopes(scopes: Scopes) -> Interp {
        Interp { scopes }
    }

    /// Reduce one syntax node to one value within one scope.
    pub fn eval(&mut self, scope: ScopeId, node: &Node) -> Value {
        match node.kind {
            // a scope node evaluates its children sequentially inside
            // an isolated copy of the surrounding scope, so the block
            // cannot mutate its surroundings; its value is the value
            // of the last child
            NodeKind::Scope => {
                let inner = self.scopes.isolate(scope);
                let mut result = Value::undefined();
                for child in &node.children {
                    if child.spread {
                        let spread = self.spread_node(inner, child);
                        result = spread.last().cloned().unwrap_or_else(Value::undefined);
                    } else {
                        result = self.eval(inner, child);
                    }
                }
                self.eval_dot(result, node)
            }
            NodeKind::NumberLit => {
                let n = node.head.parse::<f64>().unwrap_or(0.0);
                self.eval_dot(Value::number(n), node)
            }
            NodeKind::StringLit => {
                self.eval_dot(Value::string(node.string_content()), node)
            }
            NodeKind::Identifier => {
                let value = self.scopes.lookup(scope, Symbol::new(&node.head));
                self.eval_dot(value, node)
            }
            NodeKind::List => {
                let mut elements: Vector<Value> = Vector::new();
                for child in &node.children {
                    if child.spread {
                        elements.extend(self.spread_node(scope, child));
                    } else {
                        let child_scope = self.scopes.child(scope);
                        elements.push_back(self.eval(child_scope, child));
                    }
                }
                self.eval_dot(Value::List(ListValue { elements }), node)
            }
            NodeKind::Map => {
                let map = self.eval_map_literal(scope, node);
                self.eval_dot(Value::Map(map), node)
            }
            NodeKind::Expression => self.eval_expression(scope, node),
            NodeKind::Comment => Value::undefined(),
        }
    }

    /// Map literals zip each key child with its partner, spreading
    /// either side when flagged, up to the shorter length. Later
    /// writes to a key overwrite; the first insertion fixes the
    /// position. Children without a zip partner contribute nothing.
    fn eval_map_literal(&mut self, scope: ScopeId, node: &Node) -> MapValue {
        let mut map = MapValue::new();
        for child in &node.children {
            let Some(zip) = &child.zip else {
                continue;
            };

            let keys: Vec<Value> = if child.spread {
                self.spread_node(scope, child)
            } else {
                vec![self.eval_map_key(scope, child)]
            };
            let values: Vec<Value> = if zip.spread {
                self.spread_node(scope, zip)
            } else {
                let child_scope = self.scopes.child(scope);
                vec![self.eval(child_scope, zip)]
            };

            for (key, value) in keys.into_iter().zip(values) {
                if matches!(key, Value::Literal(_)) {
                    map.insert(key, value);
                }
            }
        }
        map
    }

    /// A bare identifier in key position denotes itself as a string
    /// key (`(a: 1)` is keyed by `"a"`); anything else evaluates
    /// normally.
    fn eval_map_key(&mut self, scope: ScopeId, node: &Node) -> Value {
        if node.kind == NodeKind::Identifier && node.head.as_ref() != crate::value::UNDEFINED {
            return Value::string(node.head.as_ref());
        }
        let child_scope = self.scopes.child(scope);
        self.eval(child_scope, node)
    }

    fn eval_expression(&mut self, scope: ScopeId, node: &Node) -> Value {
        if node.children.is_empty() {
            return self.eval_dot(Value::undefined(), node);
        }

        // the head is the function being called, the container being
        // sliced or looked into, or a literal that short-circuits; a
        // spread head also supplies pre-computed prefix arguments
        let mut pre_args: Vec<Value> = Vec::new();
        let head = if node.children[0].spread {
            let mut spread = self.spread_node(scope, &node.children[0]);
            if spread.is_empty() {
                return Value::undefined();
            }
            pre_args = spread.split_off(1);
            spread.into_iter().next().unwrap()
        } else {
            let head_scope = self.scopes.child(scope);
            self.eval(head_scope, &node.children[0])
        };

        match head {
            // number and undefined heads short-circuit to themselves
            Value::Literal(Literal::Number(_)) | Value::Literal(Literal::Undefined) => {
                self.eval_dot(head, node)
            }
            Value::Literal(Literal::Str(s)) => {
                let args = self.eval_argument_nodes(scope, pre_args, &node.children[1..]);
                self.eval_dot(eval_string_slice(&s, &args), node)
            }
            Value::List(list) => {
                let args = self.eval_argument_nodes(scope, pre_args, &node.children[1..]);
                self.eval_dot(eval_list_slice(&list, &args), node)
            }
            Value::Map(map) => {
                let args = self.eval_argument_nodes(scope, pre_args, &node.children[1..]);
                self.eval_dot(eval_map_lookup(&map, &args), node)
            }
            Value::Function(cell) => {
                if let Some(hook) = cell.builtin {
                    let args: Vec<Arg> = pre_args
                        .into_iter()
                        .map(Arg::Val)
                        .chain(node.children[1..].iter().map(Arg::Raw))
                        .collect();
                    let result = hook(self, scope, &args);
                    return self.eval_dot(result, node);
                }

                let args = self.eval_argument_nodes(scope, pre_args, &node.children[1..]);
                let (index, found) = match_clauses(&cell.clauses, &args);
                if !found {
                    return Value::undefined();
                }
                let clause = &cell.clauses[index];
                // too few arguments produce undefined, not a partial
                // application
                if args.len() < clause.pattern.len() {
                    return Value::undefined();
                }
                let call_scope = self.scopes.child(cell.capture);
                bind_arguments(&mut self.scopes, call_scope, &clause.pattern, &args);
                let result = self.eval(call_scope, &clause.body);
                self.eval_dot(result, node)
            }
        }
    }

    /// Evaluate the argument children of an expression, spreading
    /// where flagged, after any pre-computed prefix from a spread
    /// head. Arguments evaluate in their own child scope.
    fn eval_argument_nodes(
        &mut self,
        scope: ScopeId,
        pre_args: Vec<Value>,
        children: &[Node],
    ) -> Vec<Value> {
        let mut args = pre_args;
        let arg_scope = self.scopes.child(scope);
        for child in children {
            if child.spread {
                args.extend(self.spread_node(arg_scope, child));
            } else {
                args.push(self.eval(arg_scope, child));
            }
        }
        args
    }

    /// Expand a spread-flagged node: strings fan out to one-character
    /// strings, lists to their elements, maps to their keys, scalars
    /// pass through as a singleton, undefined to nothing.
    pub fn spread_node(&mut self, scope: ScopeId, node: &Node) -> Vec<Value> {
        let node_scope = self.scopes.child(scope);
        let value = self.eval(node_scope, node);
        match value {
            Value::Literal(Literal::Undefined) => Vec::new(),
            Value::Literal(Literal::Str(s)) => {
                s.chars().map(|c| Value::string(c.to_string())).collect()
            }
            Value::Literal(Literal::Number(_)) | Value::Function(_) => vec![value],
            Value::List(list) => list.to_vec(),
            Value::Map(map) => map.keys.clone(),
        }
    }

    /// Apply the node's dot chain to a result: successive
    /// identifier-keyed lookups, defined only on maps.
    fn eval_dot(&self, value: Value, node: &Node) -> Value {
        let mut value = value;
        let mut dot = &node.dot;
        while let Some(partner) = dot {
            if partner.kind != NodeKind::Identifier {
                return Value::undefined();
            }
            let Value::Map(map) = &value else {
                return Value::undefined();
            };
            let key = format!("\"{}\"", partner.head);
            value = match map.get(&key) {
                Some(found) => found.clone(),
                None => return Value::undefined(),
            };
            dot = &partner.dot;
        }
        value
    }
}

// ============================================================================
// Container operations
// ============================================================================

/// Every slice/lookup argument must be a number or undefined.
fn valid_slice_args(args: &[Value]) -> bool {
    args.iter().all(|a| {
        matches!(
            a,
            Value::Literal(Literal::Number(_)) | Value::Literal(Literal::Undefined)
        )
    })
}

/// Index or slice a list: one argument indexes, two slice half-open,
/// three slice with a signed step. A missing (undefined) end defaults
/// to the length for positive steps and one before the start for
/// negative steps; step zero is undefined.
fn eval_list_slice(list: &ListValue, args: &[Value]) -> Value {
    if args.is_empty() {
        return Value::List(list.clone());
    }
    if !valid_slice_args(args) {
        return Value::undefined();
    }
    let Some(begin) = args[0].as_number() else {
        return Value::undefined();
    };
    let begin = begin as i64;

    match args.len() {
        1 => list.index(begin),
        2 => {
            let end = match args[1].as_number() {
                Some(n) => n as i64,
                None => list.len() as i64,
            };
            list.slice(begin, end)
        }
        _ => {
            let Some(step) = args[2].as_number() else {
                return Value::undefined();
            };
            let step = step as i64;
            if step == 0 {
                return Value::undefined();
            }
            match args[1].as_number() {
                Some(end) => list.slice_step(begin, end as i64, step, false),
                None => {
                    let end = if step > 0 { list.len() as i64 } else { -1 };
                    list.slice_step(begin, end, step, true)
                }
            }
        }
    }
}

/// Index or slice a string by Unicode scalar values, with the same
/// argument scheme as lists. Slices produce new strings; a begin
/// outside `[0, length)` is undefined, an empty in-range slice is the
/// empty string.
fn eval_string_slice(s: &str, args: &[Value]) -> Value {
    if args.is_empty() {
        return Value::string(s);
    }
    if !valid_slice_args(args) {
        return Value::undefined();
    }
    let chars: Vec<char> = s.chars().collect();
    let len = chars.len() as i64;

    let Some(begin) = args[0].as_number() else {
        return Value::undefined();
    };
    let mut begin = begin as i64;
    if begin < 0 {
        begin += len;
    }
    if begin < 0 || begin >= len {
        return Value::undefined();
    }

    if args.len() == 1 {
        return Value::string(chars[begin as usize].to_string());
    }

    let mut step = 1i64;
    if args.len() > 2 {
        let Some(n) = args[2].as_number() else {
            return Value::undefined();
        };
        step = n as i64;
        if step == 0 {
            return Value::undefined();
        }
    }

    let end = match args[1].as_number() {
        Some(n) => {
            let mut end = n as i64;
            if end < 0 {
                end += len;
            }
            if end < 0 {
                return Value::undefined();
            }
            end.min(len)
        }
        None => {
            if step > 0 {
                len
            } else {
                -1
            }
        }
    };

    if step == 1 {
        if end <= begin {
            return Value::string("");
        }
        let slice: String = chars[begin as usize..end as usize].iter().collect();
        return Value::string(slice);
    }

    let mut out = String::new();
    let mut i = begin;
    while i != end && i >= 0 && i < len {
        out.push(chars[i as usize]);
        i += step;
    }
    Value::string(out)
}

/// Look keys up in a map: one argument yields the value (or
/// undefined), several yield a list of lookups in order.
fn eval_map_lookup(map: &MapValue, args: &[Value]) -> Value {
    if args.is_empty() {
        return Value::Map(map.clone());
    }

    let lookup = |arg: &Value| -> Value {
        arg.head_form()
            .and_then(|form| map.get(&form).cloned())
            .unwrap_or_else(Value::undefined)
    };

    if args.len() == 1 {
        return lookup(&args[0]);
    }
    Value::List(ListValue::from_values(args.iter().map(lookup)))
}
