use rustc_hash::FxHashSet;

use crate::interner::Symbol;
use crate::scope::{ScopeId, Scopes};
use crate::syntax::{Node, NodeKind};
use crate::value::{ListValue, Value};

// ============================================================================
// Argument binding
// ============================================================================

/// Destructure matched arguments into the call scope. Identifiers
/// bind positionally (a spread identifier binds the remaining tail as
/// a list and stops); literals consume a position without binding;
/// list and map patterns recurse. Binding never errors: when the
/// argument positions run out, the remaining identifiers are simply
/// left unbound and resolve to undefined.
pub fn bind_arguments(scopes: &mut Scopes, target: ScopeId, pattern: &[Node], args: &[Value]) {
    for (index, symbol) in pattern.iter().enumerate() {
        match symbol.kind {
            NodeKind::StringLit | NodeKind::NumberLit => {}
            NodeKind::Identifier => {
                if symbol.spread {
                    let rest: Vec<Value> = args.get(index..).unwrap_or(&[]).to_vec();
                    scopes.bind(
                        target,
                        Symbol::new(&symbol.head),
                        Value::List(ListValue::from_values(rest)),
                    );
                    break;
                }
                if let Some(arg) = args.get(index) {
                    scopes.bind(target, Symbol::new(&symbol.head), arg.clone());
                }
            }
            NodeKind::List => {
                if let Some(Value::List(list)) = args.get(index) {
                    let elements = list.to_vec();
                    bind_arguments(scopes, target, &symbol.children, &elements);
                }
            }
            NodeKind::Map => {
                if let Some(Value::Map(map)) = args.get(index) {
                    bind_map_pattern(scopes, target, symbol, map);
                }
            }
            _ => {}
        }
    }
}

/// Map-shape binding: literal-keyed children bind their zip partners
/// by lookup, then the non-literal key children (and their partners)
/// bind positionally against the remaining keys and values in
/// insertion order.
fn bind_map_pattern(
    scopes: &mut Scopes,
    target: ScopeId,
    pattern: &Node,
    map: &crate::value::MapValue,
) {
    let mut consumed: FxHashSet<String> = FxHashSet::default();

    for child in &pattern.children {
        if !child.is_literal() {
            continue;
        }
        let Some(zip) = &child.zip else {
            continue;
        };
        if let Some(value) = map.get(&child.head) {
            bind_arguments(
                scopes,
                target,
                std::slice::from_ref(zip.as_ref()),
                &[value.clone()],
            );
            consumed.insert(child.head.to_string());
        }
    }

    let mut rest_keys = Vec::new();
    let mut rest_values = Vec::new();
    for (key, value) in map.iter() {
        let form = key.head_form().unwrap_or_default();
        if !consumed.contains(&form) {
            rest_keys.push(key.clone());
            rest_values.push(value.clone());
        }
    }

    let key_pattern: Vec<Node> = pattern
        .children
        .iter()
        .filter(|c| !c.is_literal())
        .cloned()
        .collect();
    let value_pattern: Vec<Node> = key_pattern
        .iter()
        .filter_map(|c| c.zip.as_deref().cloned())
        .collect();

    bind_arguments(scopes, target, &key_pattern, &rest_keys);
    bind_arguments(scopes, target, &value_pattern, &rest_values);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_source;
    use crate::value::MapValue;

    fn pattern_of(src: &str) -> Vec<Node> {
        let root = parse_source(&format!("[f {src}]"));
        root.children[0].children[1..].to_vec()
    }

    fn bound(scopes: &Scopes, scope: ScopeId, name: &str) -> Value {
        scopes.lookup(scope, Symbol::new(name))
    }

    #[test]
    fn positional_identifiers() {
        let mut scopes = Scopes::new();
        let scope = scopes.alloc_root();
        let pattern = pattern_of("x y");
        bind_arguments(
            &mut scopes,
            scope,
            &pattern,
            &[Value::number(1.0), Value::number(2.0)],
        );
        assert_eq!(bound(&scopes, scope, "x"), Value::number(1.0));
        assert_eq!(bound(&scopes, scope, "y"), Value::number(2.0));
    }

    #[test]
    fn spread_binds_the_tail_as_a_list() {
        let mut scopes = Scopes::new();
        let scope = scopes.alloc_root();
        let pattern = pattern_of("x xs...");
        bind_arguments(
            &mut scopes,
            scope,
            &pattern,
            &[Value::number(1.0), Value::number(2.0), Value::number(3.0)],
        );
        assert_eq!(bound(&scopes, scope, "x"), Value::number(1.0));
        let xs = bound(&scopes, scope, "xs");
        assert_eq!(
            xs,
            Value::List(ListValue::from_values(vec![
                Value::number(2.0),
                Value::number(3.0)
            ]))
        );
    }

    #[test]
    fn literals_consume_a_position() {
        let mut scopes = Scopes::new();
        let scope = scopes.alloc_root();
        let pattern = pattern_of("0 y");
        bind_arguments(
            &mut scopes,
            scope,
            &pattern,
            &[Value::number(0.0), Value::number(5.0)],
        );
        assert!(bound(&scopes, scope, "0").is_undefined());
        assert_eq!(bound(&scopes, scope, "y"), Value::number(5.0));
    }

    #[test]
    fn nested_list_destructuring() {
        let mut scopes = Scopes::new();
        let scope = scopes.alloc_root();
        let pattern = pattern_of("{a {b c}}");
        let inner = Value::List(ListValue::from_values(vec![
            Value::number(2.0),
            Value::number(3.0),
        ]));
        let outer = Value::List(ListValue::from_values(vec![Value::number(1.0), inner]));
        bind_arguments(&mut scopes, scope, &pattern, &[outer]);
        assert_eq!(bound(&scopes, scope, "a"), Value::number(1.0));
        assert_eq!(bound(&scopes, scope, "b"), Value::number(2.0));
        assert_eq!(bound(&scopes, scope, "c"), Value::number(3.0));
    }

    #[test]
    fn map_pattern_binds_literal_keys_then_positions() {
        let mut scopes = Scopes::new();
        let scope = scopes.alloc_root();
        let pattern = pattern_of(r#"("name": n, k: v)"#);
        let mut m = MapValue::new();
        m.insert(Value::string("name"), Value::string("ada"));
        m.insert(Value::string("age"), Value::number(36.0));
        bind_arguments(&mut scopes, scope, &pattern, &[Value::Map(m)]);
        assert_eq!(bound(&scopes, scope, "n"), Value::string("ada"));
        assert_eq!(bound(&scopes, scope, "k"), Value::string("age"));
        assert_eq!(bound(&scopes, scope, "v"), Value::number(36.0));
    }

    #[test]
    fn exhausted_arguments_stop_binding() {
        let mut scopes = Scopes::new();
        let scope = scopes.alloc_root();
        let pattern = pattern_of("x y z");
        bind_arguments(&mut scopes, scope, &pattern, &[Value::number(1.0)]);
        assert_eq!(bound(&scopes, scope, "x"), Value::number(1.0));
        assert!(bound(&scopes, scope, "y").is_undefined());
        assert!(bound(&scopes, scope, "z").is_undefined());
    }
}
