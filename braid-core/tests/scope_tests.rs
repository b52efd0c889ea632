use braid_core::{render, run_program, Value};

fn eval_program(source: &str) -> Value {
    run_program("", "test.braid", &[], source)
}

fn rendered(source: &str) -> String {
    render(&eval_program(source))
}

#[test]
fn do_blocks_are_isolated() {
    let src = "\
[def x 1]
[do [def x 2]]
x";
    assert_eq!(rendered(src), "1");
}

#[test]
fn do_returns_its_last_value() {
    assert_eq!(rendered("[do 1 2 3]"), "3");
    assert_eq!(rendered("[do]"), "<undefined>");
}

#[test]
fn do_blocks_see_the_enclosing_scope() {
    let src = "\
[def x 10]
[do [+ x 5]]";
    assert_eq!(rendered(src), "15");
}

#[test]
fn def_returns_the_bound_value() {
    assert_eq!(rendered("[def x 42]"), "42");
    assert_eq!(rendered("[sprintf \"%v\" [def [f x] x]]"), "<function:f>");
}

#[test]
fn def_rebinding_in_the_same_scope_wins() {
    let src = "[def x 1]\n[def x 2]\nx";
    assert_eq!(rendered(src), "2");
}

#[test]
fn constants_cannot_be_rebound() {
    let src = "\
[const k 5]
[def k 6]
k";
    assert_eq!(rendered(src), "5");
    // the rejected rebinding itself is undefined
    assert_eq!(rendered("[const k 5]\n[sprintf \"%v\" [def k 6]]"), "<undefined>");
    assert_eq!(rendered("[const k 5]\n[sprintf \"%v\" [const k 6]]"), "<undefined>");
}

#[test]
fn constant_flags_reach_descendant_scopes() {
    let src = "\
[const k 5]
[sprintf \"%v\" [do [def k 7]]]";
    assert_eq!(rendered(src), "<undefined>");
}

#[test]
fn builtins_cannot_be_rebound() {
    assert_eq!(rendered("[sprintf \"%v\" [def + 5]]"), "<undefined>");
    assert_eq!(rendered("[def + 5]\n[+ 1 2]"), "3");
    assert_eq!(rendered("[sprintf \"%v\" [def undefined 5]]"), "<undefined>");
}

#[test]
fn lambdas_capture_their_definition_environment() {
    let src = "\
[def y 10]
[def f [lambda [x] [+ x y]]]
[def y 20]
[f 1]";
    // rebinding y afterwards does not change what f sees
    assert_eq!(rendered(src), "11");
}

#[test]
fn closures_over_call_bindings() {
    let src = "\
[def [make-adder n] [lambda [x] [+ x n]]]
[def add2 [make-adder 2]]
[add2 3]";
    assert_eq!(rendered(src), "5");
}

#[test]
fn distinct_closures_hold_distinct_environments() {
    let src = "\
[def [make-adder n] [lambda [x] [+ x n]]]
[def add2 [make-adder 2]]
[def add7 [make-adder 7]]
{[add2 1] [add7 1]}";
    assert_eq!(rendered(src), "{3 8 }");
}

#[test]
fn recursive_definitions_see_themselves() {
    let src = "\
[def [countdown 0] {}]
[def [countdown n] {n [countdown [- n 1]]...}]
[countdown 3]";
    assert_eq!(rendered(src), "{3 2 1 }");
}

#[test]
fn call_bindings_do_not_leak_between_calls() {
    let src = "\
[def [f x] x]
[f 1]
[f 2]
x";
    assert_eq!(rendered(src), "<undefined>");
}

#[test]
fn shadowing_in_call_scope_leaves_outer_binding() {
    let src = "\
[def x 1]
[def [f x] [+ x 100]]
[f 5]
x";
    assert_eq!(rendered(src), "1");
}
