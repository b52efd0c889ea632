use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::{Condvar, Mutex};
use std::thread;
use std::time::Duration;

use libloading::Library;
use once_cell::sync::Lazy;
use rustc_hash::FxHashSet;

use crate::eval::Interp;
use crate::format;
use crate::interner::Symbol;
use crate::scope::{ScopeId, Scopes};
use crate::syntax::{normalize_number, Node, NodeKind};
use crate::value::{Arg, Builtin, Clause, FunctionCell, ListValue, Literal, Value, UNDEFINED};

// names of the special root bindings
pub const DIRNAME: &str = "__dirname__";
pub const FILENAME: &str = "__filename__";
pub const ARGS: &str = "__args__";

/// Environment variable naming the directory that contains the
/// standard library (`require "stdlib/…"` re-roots there).
pub const STDLIB_ENV: &str = "BRAIDPATH";

// ============================================================================
// Task tracking
// ============================================================================

/// Counts outstanding `go` tasks. The top-level entry point blocks on
/// it before returning, so a program only finishes once every task
/// has.
pub struct WaitGroup {
    count: Mutex<usize>,
    drained: Condvar,
}

impl WaitGroup {
    fn new() -> WaitGroup {
        WaitGroup {
            count: Mutex::new(0),
            drained: Condvar::new(),
        }
    }

    pub fn add(&self, n: usize) {
        *self.count.lock().unwrap() += n;
    }

    pub fn done(&self) {
        let mut count = self.count.lock().unwrap();
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.drained.notify_all();
        }
    }

    pub fn wait(&self) {
        let mut count = self.count.lock().unwrap();
        while *count > 0 {
            count = self.drained.wait(count).unwrap();
        }
    }
}

pub static TASKS: Lazy<WaitGroup> = Lazy::new(WaitGroup::new);

// native modules stay loaded for the life of the process so their
// exported values remain valid
static LIBRARIES: Lazy<Mutex<Vec<Library>>> = Lazy::new(|| Mutex::new(Vec::new()));

// ============================================================================
// Registry
// ============================================================================

static REGISTRY: &[(&str, Builtin)] = &[
    ("def", bi_def as Builtin),
    ("const", bi_const as Builtin),
    ("lambda", bi_lambda as Builtin),
    ("if", bi_if as Builtin),
    ("when", bi_when as Builtin),
    ("do", bi_do as Builtin),
    ("go", bi_go as Builtin),
    ("sleep", bi_sleep as Builtin),
    ("require", bi_require as Builtin),
    ("sprintf", bi_sprintf as Builtin),
    ("printf", bi_printf as Builtin),
    ("+", bi_add as Builtin),
    ("-", bi_sub as Builtin),
    ("*", bi_mul as Builtin),
    ("/", bi_div as Builtin),
    ("%", bi_mod as Builtin),
    ("==", bi_eq as Builtin),
    ("!=", bi_ne as Builtin),
    ("<", bi_lt as Builtin),
    (">", bi_gt as Builtin),
    ("<=", bi_le as Builtin),
    (">=", bi_ge as Builtin),
];

static RESERVED: Lazy<FxHashSet<&'static str>> = Lazy::new(|| {
    let mut names: FxHashSet<&'static str> = REGISTRY.iter().map(|(name, _)| *name).collect();
    names.extend([UNDEFINED, DIRNAME, FILENAME, ARGS]);
    names
});

/// Builtin and special names can never be rebound.
pub fn is_reserved(name: &str) -> bool {
    RESERVED.contains(name)
}

/// Populate a root scope with the special bindings and every
/// intrinsic. Runs once per program before any evaluation; the
/// registry itself is read-only.
pub fn install(interp: &mut Interp, root: ScopeId, dirname: &str, filename: &str, args: &[String]) {
    let scopes = &mut interp.scopes;
    scopes.bind(root, Symbol::new(UNDEFINED), Value::undefined());
    scopes.bind(root, Symbol::new(DIRNAME), Value::string(dirname));
    scopes.bind(root, Symbol::new(FILENAME), Value::string(filename));
    scopes.bind(
        root,
        Symbol::new(ARGS),
        Value::List(ListValue::from_values(
            args.iter().map(|a| Value::string(a.clone())),
        )),
    );
    for (name, hook) in REGISTRY {
        let function = FunctionCell::builtin(name, *hook, root);
        scopes.bind(root, Symbol::new(name), function);
    }
}

/// Evaluate builtin arguments: raw nodes evaluate (spreading where
/// flagged) in a child scope, already-computed values pass through.
pub fn eval_args(interp: &mut Interp, scope: ScopeId, args: &[Arg]) -> Vec<Value> {
    let arg_scope = interp.scopes.child(scope);
    let mut out = Vec::with_capacity(args.len());
    for arg in args {
        match arg {
            Arg::Raw(node) => {
                if node.spread {
                    out.extend(interp.spread_node(arg_scope, node));
                } else {
                    out.push(interp.eval(arg_scope, node));
                }
            }
            Arg::Val(value) => out.push(value.clone()),
        }
    }
    out
}

fn raw_nodes(args: &[Arg]) -> Option<Vec<Node>> {
    args.iter()
        .map(|a| match a {
            Arg::Raw(node) => Some((*node).clone()),
            Arg::Val(_) => None,
        })
        .collect()
}

// ============================================================================
// def / const / lambda
// ============================================================================

fn bi_def(interp: &mut Interp, scope: ScopeId, args: &[Arg]) -> Value {
    define(interp, scope, args, false)
}

fn bi_const(interp: &mut Interp, scope: ScopeId, args: &[Arg]) -> Value {
    define(interp, scope, args, true)
}

/// `def name value` binds an identifier; `def [head pat…] body`
/// extends `head` with a clause, replacing the body of a structurally
/// identical pattern list. `const` additionally marks the binding
/// constant. Rebinding a reserved name or a constant yields
/// undefined.
fn define(interp: &mut Interp, scope: ScopeId, args: &[Arg], constant: bool) -> Value {
    if args.len() < 2 {
        return Value::undefined();
    }
    let (Arg::Raw(symbol), Arg::Raw(value)) = (&args[0], &args[1]) else {
        return Value::undefined();
    };

    match symbol.kind {
        NodeKind::Identifier => {
            if is_reserved(&symbol.head) {
                return Value::undefined();
            }
            let name = Symbol::new(&symbol.head);
            if interp.scopes.is_constant(scope, name) {
                return Value::undefined();
            }
            let value_scope = interp.scopes.child(scope);
            let bound = interp.eval(value_scope, value);
            interp.scopes.bind(scope, name, bound.clone());
            if constant {
                interp.scopes.mark_constant(scope, name);
            }
            bound
        }
        NodeKind::Expression => {
            let Some(head) = symbol.children.first() else {
                return Value::undefined();
            };
            if head.kind != NodeKind::Identifier || is_reserved(&head.head) {
                return Value::undefined();
            }
            let name = Symbol::new(&head.head);
            if interp.scopes.is_constant(scope, name) {
                return Value::undefined();
            }

            let pattern = resolve_pattern(interp, scope, &symbol.children[1..]);

            let mut clauses = match interp.scopes.get_local(scope, name) {
                Some(Value::Function(cell)) if cell.builtin.is_none() => cell.clauses.clone(),
                _ => Vec::new(),
            };
            let body = (*value).clone();
            match clauses
                .iter()
                .position(|c| patterns_equal(&c.pattern, &pattern))
            {
                Some(i) => clauses[i].body = body,
                None => clauses.push(Clause { pattern, body }),
            }

            let function = Value::Function(std::sync::Arc::new(FunctionCell {
                name: Some(name),
                clauses,
                builtin: None,
                capture: scope,
            }));
            interp.scopes.bind(scope, name, function.clone());
            if constant {
                interp.scopes.mark_constant(scope, name);
            }
            function
        }
        _ => Value::undefined(),
    }
}

/// `lambda [pat…] body` produces an unnamed single-clause function.
/// The capture scope is an isolated snapshot of the bindings visible
/// at the point of definition, so rebinding those names afterwards
/// does not change what the lambda sees.
fn bi_lambda(interp: &mut Interp, scope: ScopeId, args: &[Arg]) -> Value {
    if args.len() < 2 {
        return Value::undefined();
    }
    let (Arg::Raw(params), Arg::Raw(body)) = (&args[0], &args[1]) else {
        return Value::undefined();
    };
    if params.kind != NodeKind::Expression {
        return Value::undefined();
    }

    let pattern = resolve_pattern(interp, scope, &params.children);
    let capture = interp.scopes.isolate(scope);
    Value::Function(std::sync::Arc::new(FunctionCell {
        name: None,
        clauses: vec![Clause {
            pattern,
            body: (*body).clone(),
        }],
        builtin: None,
        capture,
    }))
}

/// Expression nodes inside a pattern evaluate down to literals before
/// the pattern is stored, so `[def [f [+ 1 1]] …]` dispatches on 2.
fn resolve_pattern(interp: &mut Interp, scope: ScopeId, pattern: &[Node]) -> Vec<Node> {
    let mut resolved: Vec<Node> = pattern.to_vec();
    for node in &mut resolved {
        while node.kind == NodeKind::Expression {
            let pattern_scope = interp.scopes.child(scope);
            match interp.eval(pattern_scope, node) {
                Value::Literal(lit) => {
                    let mut replacement = literal_to_node(&lit);
                    replacement.spread = node.spread;
                    *node = replacement;
                }
                _ => break,
            }
        }
    }
    resolved
}

fn literal_to_node(lit: &Literal) -> Node {
    match lit {
        Literal::Number(n) => Node::new(normalize_number(*n), NodeKind::NumberLit),
        Literal::Str(s) => Node::new(format!("\"{s}\""), NodeKind::StringLit),
        Literal::Undefined => Node::identifier(UNDEFINED),
    }
}

/// Structural pattern-list comparison: kinds, spread flags, literal
/// heads, nested shapes and zip partners must all agree. Identifier
/// names are interchangeable.
fn patterns_equal(a: &[Node], b: &[Node]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| pattern_node_equal(x, y))
}

fn pattern_node_equal(a: &Node, b: &Node) -> bool {
    if a.kind != b.kind || a.spread != b.spread {
        return false;
    }
    if a.is_literal() && a.head != b.head {
        return false;
    }
    if matches!(a.kind, NodeKind::List | NodeKind::Map)
        && !patterns_equal(&a.children, &b.children)
    {
        return false;
    }
    match (&a.zip, &b.zip) {
        (None, None) => true,
        (Some(x), Some(y)) => pattern_node_equal(x, y),
        _ => false,
    }
}

// ============================================================================
// Control flow
// ============================================================================

/// `if cond then [else]` evaluates only the selected branch. A spread
/// condition pre-supplies the branches as values.
fn bi_if(interp: &mut Interp, scope: ScopeId, args: &[Arg]) -> Value {
    if args.is_empty() {
        return Value::undefined();
    }

    let mut arguments: Vec<Value> = Vec::new();
    match &args[0] {
        Arg::Raw(node) => {
            if node.spread {
                arguments = interp.spread_node(scope, node);
            } else {
                let cond_scope = interp.scopes.child(scope);
                arguments.push(interp.eval(cond_scope, node));
            }
        }
        Arg::Val(value) => arguments.push(value.clone()),
    }

    let truthy = arguments.first().map(Value::is_truthy).unwrap_or(false);
    if truthy {
        if arguments.len() > 1 {
            return arguments[1].clone();
        }
        if args.len() > 1 {
            return first_arg_value(interp, scope, &args[1..2]);
        }
    }
    if arguments.len() > 2 {
        return arguments[2].clone();
    }
    if args.len() > 2 {
        return first_arg_value(interp, scope, &args[2..3]);
    }
    Value::undefined()
}

fn first_arg_value(interp: &mut Interp, scope: ScopeId, args: &[Arg]) -> Value {
    eval_args(interp, scope, args)
        .into_iter()
        .next()
        .unwrap_or_else(Value::undefined)
}

/// `when (pred1: body1, pred2: body2, …)` returns the body paired
/// with the first truthy predicate; a matched predicate without a
/// body yields undefined, as does no match at all.
fn bi_when(interp: &mut Interp, scope: ScopeId, args: &[Arg]) -> Value {
    for arg in args {
        let Arg::Raw(node) = arg else { continue };
        if node.kind != NodeKind::Map {
            continue;
        }
        for child in &node.children {
            let pred_scope = interp.scopes.child(scope);
            let predicate = interp.eval(pred_scope, child);
            if predicate.is_truthy() {
                return match &child.zip {
                    Some(body) => {
                        let body_scope = interp.scopes.child(scope);
                        interp.eval(body_scope, body)
                    }
                    None => Value::undefined(),
                };
            }
        }
    }
    Value::undefined()
}

/// `do stmt…` evaluates its argument nodes as an isolated scope body.
fn bi_do(interp: &mut Interp, scope: ScopeId, args: &[Arg]) -> Value {
    let Some(nodes) = raw_nodes(args) else {
        return Value::undefined();
    };
    let body = Node::compound(NodeKind::Scope, nodes);
    interp.eval(scope, &body)
}

/// `go stmt…` evaluates an isolated scope body on its own task and
/// returns undefined immediately. The task gets a private copy of the
/// spawning scope graph, so nothing is shared.
fn bi_go(interp: &mut Interp, scope: ScopeId, args: &[Arg]) -> Value {
    let Some(nodes) = raw_nodes(args) else {
        return Value::undefined();
    };
    let body = Node::compound(NodeKind::Scope, nodes);

    let mut arena = Scopes::new();
    let root = interp.scopes.copy_into(scope, &mut arena);

    TASKS.add(1);
    let spawned = thread::Builder::new()
        .name("braid-task".to_string())
        .spawn(move || {
            let mut task = Interp::from_scopes(arena);
            task.eval(root, &body);
            TASKS.done();
        });
    if spawned.is_err() {
        TASKS.done();
    }
    Value::undefined()
}

/// `sleep ms` blocks the current task.
fn bi_sleep(interp: &mut Interp, scope: ScopeId, args: &[Arg]) -> Value {
    let arguments = eval_args(interp, scope, args);
    let Some(ms) = arguments.first().and_then(Value::as_number) else {
        return Value::undefined();
    };
    thread::sleep(Duration::from_secs_f64(ms.max(0.0) / 1000.0));
    Value::undefined()
}

// ============================================================================
// Arithmetic and comparison
// ============================================================================

#[derive(Clone, Copy)]
enum MathOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

fn math(interp: &mut Interp, scope: ScopeId, args: &[Arg], op: MathOp) -> Value {
    let arguments = eval_args(interp, scope, args);
    let mut numbers = Vec::with_capacity(arguments.len());
    for argument in &arguments {
        match argument.as_number() {
            Some(n) => numbers.push(n),
            None => return Value::undefined(),
        }
    }
    let first = numbers.first().copied();
    let rest = numbers.get(1..).unwrap_or(&[]);

    let result = match op {
        MathOp::Add => numbers.iter().sum(),
        MathOp::Sub => first.unwrap_or(0.0) - rest.iter().sum::<f64>(),
        MathOp::Mul => numbers.iter().product(),
        // division by zero is the floating-point result, not an error
        MathOp::Div => first.unwrap_or(1.0) / rest.iter().product::<f64>(),
        MathOp::Mod => {
            let numerator = first.unwrap_or(1.0) as i64;
            let denominator = rest.iter().product::<f64>() as i64;
            if denominator == 0 {
                return Value::undefined();
            }
            (numerator % denominator) as f64
        }
    };
    Value::number(result)
}

fn bi_add(i: &mut Interp, s: ScopeId, a: &[Arg]) -> Value {
    math(i, s, a, MathOp::Add)
}
fn bi_sub(i: &mut Interp, s: ScopeId, a: &[Arg]) -> Value {
    math(i, s, a, MathOp::Sub)
}
fn bi_mul(i: &mut Interp, s: ScopeId, a: &[Arg]) -> Value {
    math(i, s, a, MathOp::Mul)
}
fn bi_div(i: &mut Interp, s: ScopeId, a: &[Arg]) -> Value {
    math(i, s, a, MathOp::Div)
}
fn bi_mod(i: &mut Interp, s: ScopeId, a: &[Arg]) -> Value {
    math(i, s, a, MathOp::Mod)
}

#[derive(Clone, Copy)]
enum CmpOp {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

fn compare(interp: &mut Interp, scope: ScopeId, args: &[Arg], op: CmpOp) -> Value {
    let arguments = eval_args(interp, scope, args);
    if arguments.len() != 2 {
        return Value::undefined();
    }
    let (Value::Literal(a), Value::Literal(b)) = (&arguments[0], &arguments[1]) else {
        return Value::number(0.0);
    };

    if matches!(a, Literal::Undefined) || matches!(b, Literal::Undefined) {
        let both = matches!(a, Literal::Undefined) && matches!(b, Literal::Undefined);
        let holds = both && matches!(op, CmpOp::Eq | CmpOp::Le | CmpOp::Ge);
        return Value::number(holds as i64 as f64);
    }

    let holds = match (a, b) {
        (Literal::Number(x), Literal::Number(y)) => ordered(op, x, y),
        (Literal::Str(x), Literal::Str(y)) => ordered(op, x, y),
        _ => return Value::undefined(),
    };
    Value::number(holds as i64 as f64)
}

fn ordered<T: PartialOrd + ?Sized>(op: CmpOp, x: &T, y: &T) -> bool {
    match op {
        CmpOp::Eq => x == y,
        CmpOp::Ne => x != y,
        CmpOp::Lt => x < y,
        CmpOp::Gt => x > y,
        CmpOp::Le => x <= y,
        CmpOp::Ge => x >= y,
    }
}

fn bi_eq(i: &mut Interp, s: ScopeId, a: &[Arg]) -> Value {
    compare(i, s, a, CmpOp::Eq)
}
fn bi_ne(i: &mut Interp, s: ScopeId, a: &[Arg]) -> Value {
    compare(i, s, a, CmpOp::Ne)
}
fn bi_lt(i: &mut Interp, s: ScopeId, a: &[Arg]) -> Value {
    compare(i, s, a, CmpOp::Lt)
}
fn bi_gt(i: &mut Interp, s: ScopeId, a: &[Arg]) -> Value {
    compare(i, s, a, CmpOp::Gt)
}
fn bi_le(i: &mut Interp, s: ScopeId, a: &[Arg]) -> Value {
    compare(i, s, a, CmpOp::Le)
}
fn bi_ge(i: &mut Interp, s: ScopeId, a: &[Arg]) -> Value {
    compare(i, s, a, CmpOp::Ge)
}

// ============================================================================
// Formatting
// ============================================================================

/// `sprintf fmt arg…` formats `%v` placeholders over the arguments.
fn bi_sprintf(interp: &mut Interp, scope: ScopeId, args: &[Arg]) -> Value {
    let arguments = eval_args(interp, scope, args);
    let Some(text) = arguments.first().and_then(Value::as_str) else {
        return Value::undefined();
    };
    Value::string(format::sprintf(text, &arguments[1..]))
}

/// `printf fmt arg…` formats and writes to standard output.
fn bi_printf(interp: &mut Interp, scope: ScopeId, args: &[Arg]) -> Value {
    let result = bi_sprintf(interp, scope, args);
    if let Some(text) = result.as_str() {
        let stdout = std::io::stdout();
        let mut handle = stdout.lock();
        let _ = write!(handle, "{text}");
        let _ = handle.flush();
    }
    result
}

// ============================================================================
// Modules
// ============================================================================

/// `require path` resolves against the importing file's directory
/// (re-rooting a `stdlib/` prefix at $BRAIDPATH), loads shared
/// objects through the one-exported-value contract, and otherwise
/// runs the file as a program and yields its final value. Every
/// failure yields undefined.
fn bi_require(interp: &mut Interp, scope: ScopeId, args: &[Arg]) -> Value {
    let arguments = eval_args(interp, scope, args);
    let Some(path) = arguments.first().and_then(Value::as_str) else {
        return Value::undefined();
    };

    let dir_value = interp.scopes.lookup(scope, Symbol::new(DIRNAME));
    let base = if path.starts_with("stdlib/") {
        std::env::var(STDLIB_ENV).unwrap_or_default()
    } else {
        dir_value.as_str().unwrap_or("").to_string()
    };
    let resolved = Path::new(&base).join(path);

    if resolved.extension().and_then(|e| e.to_str()) == Some(std::env::consts::DLL_EXTENSION) {
        return load_native(&resolved);
    }

    let Ok(source) = fs::read_to_string(&resolved) else {
        return Value::undefined();
    };
    let dirname = resolved
        .parent()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default();
    let filename = resolved.to_string_lossy().into_owned();
    let (exported, module) = crate::run_module_parts(&dirname, &filename, &[], &source);
    // the exported value's closures capture scopes in the module's
    // arena; translate them into ours before the module is dropped
    interp.scopes.import_value(&exported, &module.scopes)
}

/// The native-module contract: the shared object exports
/// `braid_exports: fn() -> Value`, and that one value is what the
/// import evaluates to.
type ExportsFn = unsafe fn() -> Value;

fn load_native(path: &Path) -> Value {
    let Ok(library) = (unsafe { Library::new(path) }) else {
        return Value::undefined();
    };
    let mut libraries = LIBRARIES.lock().unwrap();
    libraries.push(library);
    let library = libraries.last().unwrap();
    let Ok(exports) = (unsafe { library.get::<ExportsFn>(b"braid_exports") }) else {
        return Value::undefined();
    };
    unsafe { exports() }
}
