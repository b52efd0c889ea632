use rustc_hash::{FxHashMap, FxHashSet};

use crate::interner::Symbol;
use crate::value::Value;

// ============================================================================
// Scope arena
// ============================================================================

/// A handle into a scope arena. Handles are plain indices, so parent
/// links can never dangle and orphaned (isolated) scopes simply stop
/// referring to their history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(usize);

#[derive(Debug, Default)]
struct ScopeData {
    parent: Option<ScopeId>,
    bindings: FxHashMap<Symbol, Value>,
    constants: FxHashSet<Symbol>,
}

/// All scopes of one interpreter. Each concurrent task owns its own
/// arena; nothing here is ever shared between threads.
#[derive(Debug, Default)]
pub struct Scopes {
    arena: Vec<ScopeData>,
}

impl Scopes {
    pub fn new() -> Scopes {
        Scopes::default()
    }

    fn alloc(&mut self, data: ScopeData) -> ScopeId {
        self.arena.push(data);
        ScopeId(self.arena.len() - 1)
    }

    /// A fresh parentless scope.
    pub fn alloc_root(&mut self) -> ScopeId {
        self.alloc(ScopeData::default())
    }

    /// A child scope. The constant-name set is copied down at
    /// creation so constant checks stay local.
    pub fn child(&mut self, parent: ScopeId) -> ScopeId {
        let constants = self.arena[parent.0].constants.clone();
        self.alloc(ScopeData {
            parent: Some(parent),
            bindings: FxHashMap::default(),
            constants,
        })
    }

    pub fn bind(&mut self, scope: ScopeId, name: Symbol, value: Value) {
        self.arena[scope.0].bindings.insert(name, value);
    }

    pub fn mark_constant(&mut self, scope: ScopeId, name: Symbol) {
        self.arena[scope.0].constants.insert(name);
    }

    pub fn is_constant(&self, scope: ScopeId, name: Symbol) -> bool {
        self.arena[scope.0].constants.contains(&name)
    }

    /// The binding in this exact scope, ignoring parents.
    pub fn get_local(&self, scope: ScopeId, name: Symbol) -> Option<Value> {
        self.arena[scope.0].bindings.get(&name).cloned()
    }

    /// Walk the parent chain; absent names resolve to undefined.
    pub fn lookup(&self, scope: ScopeId, name: Symbol) -> Value {
        let mut current = Some(scope);
        while let Some(id) = current {
            let data = &self.arena[id.0];
            if let Some(value) = data.bindings.get(&name) {
                return value.clone();
            }
            current = data.parent;
        }
        Value::undefined()
    }

    /// Flatten a scope chain into a fresh parentless scope: the union
    /// of the chain's bindings, root-most first so nearer bindings
    /// win, with every bound function's capture scope rewritten to
    /// the isolated root. Blocks and tasks evaluate inside isolated
    /// scopes so they cannot mutate their surroundings.
    pub fn isolate(&mut self, scope: ScopeId) -> ScopeId {
        let mut chain = Vec::new();
        let mut current = Some(scope);
        while let Some(id) = current {
            chain.push(id);
            current = self.arena[id.0].parent;
        }

        let root = self.alloc_root();
        for id in chain.into_iter().rev() {
            let bindings: Vec<(Symbol, Value)> = self.arena[id.0]
                .bindings
                .iter()
                .map(|(k, v)| (*k, v.clone()))
                .collect();
            let constants: Vec<Symbol> = self.arena[id.0].constants.iter().copied().collect();
            for (name, value) in bindings {
                let copy = value.reparent(root);
                self.arena[root.0].bindings.insert(name, copy);
            }
            self.arena[root.0].constants.extend(constants);
        }

        root
    }

    /// Copy the scope graph reachable from `scope` into another
    /// arena, returning the translated handle. Function values are
    /// rebuilt with translated capture handles; the memo map keeps
    /// the copy cycle-safe (a recursive function's capture chain
    /// contains the function itself). This is how `go` hands a task
    /// its own private world.
    pub fn copy_into(&self, scope: ScopeId, target: &mut Scopes) -> ScopeId {
        let mut copier = GraphCopier {
            source: self,
            translated: FxHashMap::default(),
        };
        copier.copy_scope(scope, target)
    }

    /// Bring a value produced in another arena into this one,
    /// translating the scope graphs its functions capture. `require`
    /// imports a module's final value through this.
    pub fn import_value(&mut self, value: &Value, source: &Scopes) -> Value {
        let mut copier = GraphCopier {
            source,
            translated: FxHashMap::default(),
        };
        copier.copy_value(value, self)
    }
}

struct GraphCopier<'a> {
    source: &'a Scopes,
    translated: FxHashMap<ScopeId, ScopeId>,
}

impl GraphCopier<'_> {
    fn copy_scope(&mut self, id: ScopeId, target: &mut Scopes) -> ScopeId {
        if let Some(&done) = self.translated.get(&id) {
            return done;
        }
        // reserve the slot first so cycles resolve to it
        let new_id = target.alloc_root();
        self.translated.insert(id, new_id);

        let parent = self.source.arena[id.0]
            .parent
            .map(|p| self.copy_scope(p, target));
        target.arena[new_id.0].parent = parent;
        target.arena[new_id.0].constants = self.source.arena[id.0].constants.clone();

        let names: Vec<Symbol> = self.source.arena[id.0].bindings.keys().copied().collect();
        for name in names {
            let value = self.source.arena[id.0].bindings[&name].clone();
            let copy = self.copy_value(&value, target);
            target.arena[new_id.0].bindings.insert(name, copy);
        }
        new_id
    }

    fn copy_value(&mut self, value: &Value, target: &mut Scopes) -> Value {
        match value {
            Value::Literal(_) => value.clone(),
            Value::List(list) => Value::List(
                list.elements
                    .iter()
                    .map(|v| self.copy_value(v, target))
                    .collect(),
            ),
            Value::Map(map) => {
                let mut copy = crate::value::MapValue::new();
                for (k, v) in map.iter() {
                    copy.insert(self.copy_value(k, target), self.copy_value(v, target));
                }
                Value::Map(copy)
            }
            Value::Function(cell) => {
                let capture = self.copy_scope(cell.capture, target);
                Value::Function(std::sync::Arc::new(crate::value::FunctionCell {
                    name: cell.name,
                    clauses: cell.clauses.clone(),
                    builtin: cell.builtin,
                    capture,
                }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sym(name: &str) -> Symbol {
        Symbol::new(name)
    }

    #[test]
    fn lookup_walks_parents() {
        let mut scopes = Scopes::new();
        let root = scopes.alloc_root();
        let child = scopes.child(root);
        scopes.bind(root, sym("x"), Value::number(1.0));
        assert_eq!(scopes.lookup(child, sym("x")), Value::number(1.0));
        assert!(scopes.lookup(child, sym("y")).is_undefined());
    }

    #[test]
    fn child_bindings_shadow() {
        let mut scopes = Scopes::new();
        let root = scopes.alloc_root();
        let child = scopes.child(root);
        scopes.bind(root, sym("x"), Value::number(1.0));
        scopes.bind(child, sym("x"), Value::number(2.0));
        assert_eq!(scopes.lookup(child, sym("x")), Value::number(2.0));
        assert_eq!(scopes.lookup(root, sym("x")), Value::number(1.0));
    }

    #[test]
    fn constants_are_inherited_at_creation() {
        let mut scopes = Scopes::new();
        let root = scopes.alloc_root();
        scopes.mark_constant(root, sym("pi"));
        let child = scopes.child(root);
        assert!(scopes.is_constant(child, sym("pi")));
        // marking after creation does not travel down
        scopes.mark_constant(root, sym("e"));
        assert!(!scopes.is_constant(child, sym("e")));
    }

    #[test]
    fn isolation_flattens_and_detaches() {
        let mut scopes = Scopes::new();
        let root = scopes.alloc_root();
        let child = scopes.child(root);
        scopes.bind(root, sym("a"), Value::number(1.0));
        scopes.bind(child, sym("a"), Value::number(2.0));
        scopes.bind(child, sym("b"), Value::number(3.0));

        let isolated = scopes.isolate(child);
        assert_eq!(scopes.lookup(isolated, sym("a")), Value::number(2.0));
        assert_eq!(scopes.lookup(isolated, sym("b")), Value::number(3.0));

        // rebinding inside the isolated scope leaves the chain alone
        scopes.bind(isolated, sym("a"), Value::number(9.0));
        assert_eq!(scopes.lookup(child, sym("a")), Value::number(2.0));
    }

    #[test]
    fn cross_arena_copy_translates_captures() {
        let mut scopes = Scopes::new();
        let root = scopes.alloc_root();
        let fun = Value::Function(std::sync::Arc::new(crate::value::FunctionCell {
            name: Some(sym("f")),
            clauses: Vec::new(),
            builtin: None,
            capture: root,
        }));
        // self-referential: the scope binds a function capturing it
        scopes.bind(root, sym("f"), fun);
        scopes.bind(root, sym("x"), Value::number(7.0));

        let mut other = Scopes::new();
        let copied = scopes.copy_into(root, &mut other);
        assert_eq!(other.lookup(copied, sym("x")), Value::number(7.0));
        match other.lookup(copied, sym("f")) {
            Value::Function(cell) => assert_eq!(cell.capture, copied),
            other => panic!("expected function, got {other:?}"),
        }
    }
}
