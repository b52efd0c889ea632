use crate::lexer::{tokenize, Token};
use crate::syntax::{normalize_number, parse_number, Node, NodeKind};

// ============================================================================
// Parser
// ============================================================================

/// Fold a token stream into a scope-kind root node. The parser is
/// permissive: it never fails, and produces whatever tree it can.
pub fn parse(tokens: Vec<Token>) -> Node {
    let mut parser = Parser { tokens, position: 0 };
    let children = parser.parse_body(NodeKind::Scope);
    Node::compound(NodeKind::Scope, children)
}

/// Tokenize and parse in one step.
pub fn parse_source(source: &str) -> Node {
    parse(tokenize(source))
}

struct Parser {
    tokens: Vec<Token>,
    position: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).cloned();
        if token.is_some() {
            self.position += 1;
        }
        token
    }

    /// Parse the children of one body of the given kind, consuming
    /// the closing delimiter. In scope and expression bodies, a
    /// newline that follows more than one child accumulated since the
    /// previous newline wraps those children into one implicit
    /// expression; list and map bodies keep their children flat.
    fn parse_body(&mut self, kind: NodeKind) -> Vec<Node> {
        let mut children: Vec<Node> = Vec::new();
        let mut seen_newline = false;
        let mut prev_len = 0;
        let rewrap = !matches!(kind, NodeKind::List | NodeKind::Map);

        while let Some(token) = self.peek() {
            match token {
                Token::Newline => {
                    self.advance();
                    if seen_newline && rewrap && children.len() - prev_len > 1 {
                        let line: Vec<Node> = children.drain(prev_len..).collect();
                        children.push(Node::compound(NodeKind::Expression, line));
                    }
                    seen_newline = true;
                    prev_len = children.len();
                }
                Token::Close(_) => {
                    // any closer ends the body; at the top level the
                    // stray token is simply dropped
                    self.advance();
                    if kind != NodeKind::Scope {
                        break;
                    }
                }
                Token::Comment(_) => {
                    self.advance();
                }
                // an operator with no preceding sibling is ignored
                Token::Spread | Token::Zip | Token::Dot => {
                    self.advance();
                }
                _ => {
                    if let Some(node) = self.parse_element() {
                        children.push(node);
                    }
                }
            }
        }

        children
    }

    /// Parse one element plus its trailing operators. A zip or dot
    /// operator attaches the next element as the partner, and the
    /// partner becomes the attachment point for what follows, so
    /// `a.b.c` and `k: v...` chain naturally.
    fn parse_element(&mut self) -> Option<Node> {
        let mut node = self.parse_primary()?;

        while let Some(token) = self.peek() {
            match token {
                Token::Spread => {
                    self.advance();
                    node.spread = true;
                }
                Token::Zip => {
                    self.advance();
                    if let Some(partner) = self.parse_element() {
                        node.zip = Some(Box::new(partner));
                    }
                }
                Token::Dot => {
                    self.advance();
                    if let Some(partner) = self.parse_element() {
                        node.dot = Some(Box::new(partner));
                    }
                }
                _ => break,
            }
        }

        Some(node)
    }

    /// Parse a single primary element: a bracketed body, a string, a
    /// number, or an identifier. Returns None when the next token
    /// cannot begin an element (the caller ignores the operator in
    /// that case, per the no-right-hand-sibling rule).
    fn parse_primary(&mut self) -> Option<Node> {
        loop {
            match self.peek()? {
                Token::Comment(_) => {
                    self.advance();
                }
                Token::Newline | Token::Close(_) | Token::Spread | Token::Zip | Token::Dot => {
                    return None;
                }
                _ => break,
            }
        }

        match self.advance()? {
            Token::Open(kind) => {
                let children = self.parse_body(kind);
                Some(Node::compound(kind, children))
            }
            Token::Str(text) => Some(Node::new(text, NodeKind::StringLit)),
            Token::Word(text) => Some(match parse_number(&text) {
                Some(n) => Node::new(normalize_number(n), NodeKind::NumberLit),
                None => Node::identifier(text),
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_str(source: &str) -> Node {
        parse_source(source)
    }

    #[test]
    fn empty_input_is_an_empty_scope() {
        let root = parse_str("");
        assert_eq!(root.kind, NodeKind::Scope);
        assert!(root.children.is_empty());
    }

    #[test]
    fn expression_with_children() {
        let root = parse_str("[+ 1 2]");
        assert_eq!(root.children.len(), 1);
        let expr = &root.children[0];
        assert_eq!(expr.kind, NodeKind::Expression);
        let heads: Vec<&str> = expr.children.iter().map(|c| &*c.head).collect();
        assert_eq!(heads, vec!["+", "1", "2"]);
        assert_eq!(expr.children[1].kind, NodeKind::NumberLit);
    }

    #[test]
    fn number_heads_are_normalized() {
        let root = parse_str("5.0 0.50");
        // two children on one line wrap into an implicit expression
        let expr = &root.children[0];
        assert_eq!(&*expr.children[0].head, "5");
        assert_eq!(&*expr.children[1].head, "0.5");
    }

    #[test]
    fn newlines_imply_expressions() {
        let root = parse_str("printf \"%v\" 1\nprintf \"%v\" 2\n");
        assert_eq!(root.children.len(), 2);
        assert_eq!(root.children[0].kind, NodeKind::Expression);
        assert_eq!(root.children[0].children.len(), 3);
        assert_eq!(root.children[1].kind, NodeKind::Expression);
    }

    #[test]
    fn single_token_lines_stay_bare() {
        let root = parse_str("x\ny\n");
        assert_eq!(root.children.len(), 2);
        assert_eq!(root.children[0].kind, NodeKind::Identifier);
        assert_eq!(root.children[1].kind, NodeKind::Identifier);
    }

    #[test]
    fn lists_do_not_rewrap_on_newlines() {
        let root = parse_str("{1 2\n3 4}");
        let list = &root.children[0];
        assert_eq!(list.kind, NodeKind::List);
        assert_eq!(list.children.len(), 4);
    }

    #[test]
    fn spread_marks_the_preceding_sibling() {
        let root = parse_str("{xs... 1}");
        let list = &root.children[0];
        assert!(list.children[0].spread);
        assert_eq!(&*list.children[0].head, "xs");
        assert!(!list.children[1].spread);
    }

    #[test]
    fn zip_attaches_the_next_sibling() {
        let root = parse_str("(a: 1, b: 2)");
        let map = &root.children[0];
        assert_eq!(map.kind, NodeKind::Map);
        assert_eq!(map.children.len(), 2);
        let a = &map.children[0];
        assert_eq!(&*a.head, "a");
        assert_eq!(&*a.zip.as_ref().unwrap().head, "1");
        let b = &map.children[1];
        assert_eq!(&*b.zip.as_ref().unwrap().head, "2");
    }

    #[test]
    fn dot_chains_through_partners() {
        let root = parse_str("m.a.b");
        let m = &root.children[0];
        assert_eq!(m.kind, NodeKind::Identifier);
        let a = m.dot.as_ref().unwrap();
        assert_eq!(&*a.head, "a");
        let b = a.dot.as_ref().unwrap();
        assert_eq!(&*b.head, "b");
    }

    #[test]
    fn zip_without_right_hand_sibling_is_ignored() {
        let root = parse_str("(a:)");
        let map = &root.children[0];
        assert_eq!(map.children.len(), 1);
        assert!(map.children[0].zip.is_none());
    }

    #[test]
    fn comments_never_reach_the_tree() {
        let with = parse_str("[+ 1 2] # adds\n[- 3 4]");
        let without = parse_str("[+ 1 2]\n[- 3 4]");
        assert_eq!(with, without);
    }

    #[test]
    fn spread_after_zip_partner_lands_on_the_partner() {
        let root = parse_str("(k: vs...)");
        let map = &root.children[0];
        let k = &map.children[0];
        assert!(!k.spread);
        assert!(k.zip.as_ref().unwrap().spread);
    }

    #[test]
    fn nested_structures() {
        let root = parse_str("[def [sum {x xs...}] [+ x [sum xs]]]");
        let def = &root.children[0];
        assert_eq!(def.kind, NodeKind::Expression);
        let pattern = &def.children[1];
        assert_eq!(pattern.kind, NodeKind::Expression);
        let list_pat = &pattern.children[1];
        assert_eq!(list_pat.kind, NodeKind::List);
        assert!(list_pat.children[1].spread);
    }
}
