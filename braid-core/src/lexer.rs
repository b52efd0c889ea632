use crate::syntax::{parse_number, NodeKind};

// ============================================================================
// Tokens
// ============================================================================

/// A single token. Newline markers are explicit because the parser
/// uses them to infer implicit expressions; the stream is bracketed
/// by a leading and trailing `Newline` so the top level folds exactly
/// like a bracketed body.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Newline,
    /// `[`, `{` or `(`, tagged with the node kind it opens.
    Open(NodeKind),
    /// `]`, `}` or `)`.
    Close(NodeKind),
    /// String literal, surrounding quotes included.
    Str(String),
    /// Comment text, leading `#` included. Dropped by the parser.
    Comment(String),
    /// Anything else: an identifier or a number, decided by the parser.
    Word(String),
    Spread,
    Zip,
    Dot,
}

// ============================================================================
// Lexer
// ============================================================================

pub struct Lexer {
    input: Vec<char>,
    position: usize,
    word: String,
    tokens: Vec<Token>,
}

/// Tokenize source text. Never fails: unknown characters simply
/// accumulate into words.
pub fn tokenize(input: &str) -> Vec<Token> {
    Lexer::new(input).run()
}

impl Lexer {
    fn new(input: &str) -> Self {
        Lexer {
            input: input.trim().chars().collect(),
            position: 0,
            word: String::new(),
            tokens: vec![Token::Newline],
        }
    }

    fn current(&self) -> char {
        self.input[self.position]
    }

    fn is_eof(&self) -> bool {
        self.position >= self.input.len()
    }

    fn peek_is(&self, offset: usize, expected: char) -> bool {
        self.input
            .get(self.position + offset)
            .is_some_and(|&c| c == expected)
    }

    /// Finish the word in progress, if any.
    fn flush_word(&mut self) {
        if !self.word.is_empty() {
            let word = std::mem::take(&mut self.word);
            self.tokens.push(Token::Word(word));
        }
    }

    fn run(mut self) -> Vec<Token> {
        while !self.is_eof() {
            let c = self.current();
            match c {
                '\n' => {
                    self.flush_word();
                    self.tokens.push(Token::Newline);
                    self.position += 1;
                }
                '"' => {
                    self.flush_word();
                    let literal = self.read_string();
                    self.tokens.push(Token::Str(literal));
                }
                '#' => {
                    self.flush_word();
                    let comment = self.read_comment();
                    self.tokens.push(Token::Comment(comment));
                    self.tokens.push(Token::Newline);
                }
                '[' | '{' | '(' | ']' | '}' | ')' => {
                    self.flush_word();
                    self.tokens.push(delimiter_token(c));
                    self.position += 1;
                }
                '.' if self.peek_is(1, '.') && self.peek_is(2, '.') => {
                    self.flush_word();
                    self.tokens.push(Token::Spread);
                    self.position += 3;
                }
                ':' => {
                    self.flush_word();
                    self.tokens.push(Token::Zip);
                    self.position += 1;
                }
                '.' => {
                    // a dot directly after a number literal is a decimal
                    // point, not the dot operator
                    if parse_number(&self.word).is_some() {
                        self.word.push('.');
                    } else {
                        self.flush_word();
                        self.tokens.push(Token::Dot);
                    }
                    self.position += 1;
                }
                c if c.is_whitespace() || c == ',' => {
                    self.flush_word();
                    self.position += 1;
                }
                c => {
                    self.word.push(c);
                    self.position += 1;
                }
            }
        }

        self.flush_word();
        self.tokens.push(Token::Newline);
        self.tokens
    }

    /// Read a string literal starting at the opening quote. The
    /// delimiters stay in the token and `\` preserves the character
    /// after it. An unterminated string runs to end of input.
    fn read_string(&mut self) -> String {
        let mut literal = String::from('"');
        self.position += 1;
        while !self.is_eof() {
            let c = self.current();
            self.position += 1;
            literal.push(c);
            match c {
                '\\' => {
                    if !self.is_eof() {
                        literal.push(self.current());
                        self.position += 1;
                    }
                }
                '"' => break,
                _ => {}
            }
        }
        literal
    }

    /// Read a comment from `#` up to (not including) the newline.
    fn read_comment(&mut self) -> String {
        let mut comment = String::new();
        while !self.is_eof() && self.current() != '\n' {
            comment.push(self.current());
            self.position += 1;
        }
        if !self.is_eof() {
            self.position += 1; // consume the newline
        }
        comment
    }
}

fn delimiter_token(c: char) -> Token {
    match c {
        '[' => Token::Open(NodeKind::Expression),
        '{' => Token::Open(NodeKind::List),
        '(' => Token::Open(NodeKind::Map),
        ']' => Token::Close(NodeKind::Expression),
        '}' => Token::Close(NodeKind::List),
        _ => Token::Close(NodeKind::Map),
    }
}
