//! The braid language runtime.
//!
//! Braid is a small dynamically-typed, homoiconic, expression-oriented
//! language: `[head arg…]` calls, `{…}` lists, `(k: v, …)` maps,
//! multi-pattern function dispatch, lexical closures, and lightweight
//! concurrency via `go`. This crate is the whole runtime — tokenizer,
//! parser, evaluator, and intrinsics; the CLI lives in `braid-cli`
//! and OS/stream bindings are external modules loaded by `require`.
//!
//! Evaluation is total: there are no user-visible errors, only the
//! `undefined` sentinel.

pub mod binder;
pub mod builtins;
pub mod eval;
pub mod format;
pub mod interner;
pub mod lexer;
pub mod matcher;
pub mod parser;
pub mod scope;
pub mod syntax;
pub mod value;

pub use eval::Interp;
pub use format::{render, sprintf};
pub use parser::parse_source;
pub use scope::{ScopeId, Scopes};
pub use syntax::{Node, NodeKind};
pub use value::{Arg, FunctionCell, ListValue, Literal, MapValue, Value};

/// Run a braid program to completion: parse, evaluate in a fresh root
/// scope carrying the intrinsics and the `__dirname__`/`__filename__`/
/// `__args__` bindings, then wait for every outstanding `go` task
/// before handing back the final value.
pub fn run_program(dirname: &str, filename: &str, args: &[String], source: &str) -> Value {
    let result = run_module(dirname, filename, args, source);
    builtins::TASKS.wait();
    result
}

/// Run a program without waiting on outstanding tasks. This is what
/// `require` uses for imported files: only the top-level entry point
/// blocks on the task wait group.
pub fn run_module(dirname: &str, filename: &str, args: &[String], source: &str) -> Value {
    run_module_parts(dirname, filename, args, source).0
}

/// Like `run_module`, but also hands back the interpreter, so the
/// caller can import the value into its own scope arena.
pub fn run_module_parts(
    dirname: &str,
    filename: &str,
    args: &[String],
    source: &str,
) -> (Value, Interp) {
    let mut interp = Interp::new();
    let root = interp.scopes.alloc_root();
    builtins::install(&mut interp, root, dirname, filename, args);
    let program = parser::parse_source(source);
    let result = interp.eval(root, &program);
    (result, interp)
}
