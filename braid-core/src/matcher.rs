use crate::syntax::{Node, NodeKind};
use crate::value::{Clause, Value};

// ============================================================================
// Pattern matching
// ============================================================================

/// Check one pattern node against one argument.
pub fn compare_pattern_node(pattern: &Node, arg: &Value) -> bool {
    // identifiers are wildcards
    if pattern.kind == NodeKind::Identifier {
        return true;
    }

    // literal patterns match arguments with the same head form
    if pattern.is_literal() {
        return match arg.head_form() {
            Some(form) => form == *pattern.head,
            None => false,
        };
    }

    // map patterns: every literal key must be present (and its zip
    // partner, when given, must match the bound value); non-literal
    // keys match by position; sizes must agree unless a spread
    // absorbs the rest
    if pattern.kind == NodeKind::Map {
        let Value::Map(map) = arg else {
            return false;
        };
        for (i, child) in pattern.children.iter().enumerate() {
            if child.spread && child.kind == NodeKind::Identifier {
                return map.len() >= i;
            }
            if map.len() <= i {
                return false;
            }
            if child.is_literal() {
                let Some(value) = map.get(&child.head) else {
                    return false;
                };
                if let Some(zip) = &child.zip {
                    if !compare_pattern_node(zip, value) {
                        return false;
                    }
                }
            }
        }
        if map.len() > pattern.children.len() {
            return false;
        }
    }

    // list patterns: positional recursive match, exact length unless
    // a spread tail absorbs the remainder
    if pattern.kind == NodeKind::List {
        let Value::List(list) = arg else {
            return false;
        };
        for (i, child) in pattern.children.iter().enumerate() {
            if child.spread && child.kind == NodeKind::Identifier {
                return list.len() >= i;
            }
            if list.len() <= i {
                return false;
            }
            if !compare_pattern_node(child, &list.elements[i]) {
                return false;
            }
        }
        if list.len() > pattern.children.len() {
            return false;
        }
    }

    true
}

/// Score every clause against the argument tuple and pick the best
/// one: highest score wins, ties break toward the smaller arity
/// difference, then toward the earlier clause. The flag is false when
/// no clause matched any prefix at all.
pub fn match_clauses(clauses: &[Clause], args: &[Value]) -> (usize, bool) {
    let mut best_score = 0usize;
    let mut best_diff: Option<usize> = None;
    let mut match_index = 0usize;
    let mut found = false;

    for (i, clause) in clauses.iter().enumerate() {
        let pattern = &clause.pattern;
        let mut score = 0usize;
        let diff = pattern.len().saturating_sub(args.len());
        let min_len = pattern.len().min(args.len());

        if pattern.is_empty() {
            found = true;
        }

        for j in 0..min_len {
            if compare_pattern_node(&pattern[j], &args[j]) {
                found = true;
                score += 1;
            }
            if pattern[j].spread {
                score += args.len() - 1 - j;
                break;
            }
        }

        let prev_diff = *best_diff.get_or_insert(diff);
        if score > best_score || (score == best_score && diff < prev_diff) {
            match_index = i;
        }
        if diff < prev_diff {
            best_diff = Some(diff);
        }
        if score > best_score {
            best_score = score;
        }
    }

    (match_index, found)
}
