use crate::syntax::normalize_number;
use crate::value::{Literal, Value};

// ============================================================================
// %v formatting
// ============================================================================

/// Render a value the way `%v` prints it: numbers and strings unwrap
/// to their underlying form, lists render as `{e1 e2 … }`, maps as
/// `map(k1: v1, k2: v2)`, functions as `<function:name>` (or
/// `<function>` for unnamed lambdas), undefined as `<undefined>`.
pub fn render(value: &Value) -> String {
    match value {
        Value::Literal(Literal::Number(n)) => normalize_number(*n),
        Value::Literal(Literal::Str(s)) => s.clone(),
        Value::Literal(Literal::Undefined) => "<undefined>".to_string(),
        Value::Function(cell) => match cell.name {
            Some(name) => format!("<function:{name}>"),
            None => "<function>".to_string(),
        },
        Value::List(list) => {
            let mut out = String::from("{");
            for element in &list.elements {
                out.push_str(&render(element));
                out.push(' ');
            }
            out.push('}');
            out
        }
        Value::Map(map) => {
            let pairs: Vec<String> = map
                .iter()
                .map(|(k, v)| {
                    let key = k.head_form().unwrap_or_default();
                    format!("{key}: {}", render(v))
                })
                .collect();
            format!("map({})", pairs.join(", "))
        }
    }
}

/// Translate the literal escape sequences `\n` and `\"` in a format
/// string.
fn translate_escapes(text: &str) -> String {
    text.replace("\\n", "\n").replace("\\\"", "\"")
}

/// Format a string with `%v` placeholders over the arguments.
/// `%%` produces a literal percent; a placeholder with no argument
/// left renders as `%!v(MISSING)`.
pub fn sprintf(text: &str, args: &[Value]) -> String {
    let text = translate_escapes(text);
    let mut out = String::with_capacity(text.len());
    let mut next = 0usize;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some('v') => {
                chars.next();
                match args.get(next) {
                    Some(arg) => out.push_str(&render(arg)),
                    None => out.push_str("%!v(MISSING)"),
                }
                next += 1;
            }
            Some('%') => {
                chars.next();
                out.push('%');
            }
            _ => out.push('%'),
        }
    }

    out
}
