//! Lossless tokenizer shared by the macro preprocessor and the parser.
//!
//! Whitespace, newlines and comments are kept as trivia tokens so that the
//! preprocessor can reproduce the input text exactly apart from the spans it
//! rewrites. The parser simply skips trivia.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Ident,
    Int,
    Float,
    Punct,
    Str,
    Whitespace,
    Newline,
    Comment,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub line: usize,
    pub column: usize,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
            line: 0,
            column: 0,
        }
    }

    pub fn is_trivia(&self) -> bool {
        matches!(
            self.kind,
            TokenKind::Whitespace | TokenKind::Newline | TokenKind::Comment
        )
    }

    pub fn is_punct(&self, text: &str) -> bool {
        self.kind == TokenKind::Punct && self.text == text
    }

    pub fn is_ident(&self, text: &str) -> bool {
        self.kind == TokenKind::Ident && self.text == text
    }
}

const PUNCTUATORS: &[&str] = &[
    "<<=", ">>=", "++", "--", "<<", ">>", "<=", ">=", "==", "!=", "&&", "||", "^^", "+=", "-=",
    "*=", "/=", "%=", "&=", "|=", "^=", "##", "+", "-", "*", "/", "%", "<", ">", "=", "!", "&",
    "|", "^", "~", "?", ":", ";", ",", ".", "(", ")", "{", "}", "[", "]", "#",
];

pub fn tokenize(source: &str) -> Vec<Token> {
    Lexer::new(source).run()
}

/// Concatenates token texts back into source text.
pub fn render(tokens: &[Token]) -> String {
    tokens.iter().map(|token| token.text.as_str()).collect()
}

struct Lexer<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    line: usize,
    column: usize,
    out: Vec<Token>,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            bytes: src.as_bytes(),
            pos: 0,
            line: 1,
            column: 1,
            out: Vec::new(),
        }
    }

    fn run(mut self) -> Vec<Token> {
        while self.pos < self.bytes.len() {
            let start = self.pos;
            let b = self.bytes[start];
            let kind = if b == b'\n' {
                self.pos += 1;
                TokenKind::Newline
            } else if b.is_ascii_whitespace() {
                while self.pos < self.bytes.len()
                    && self.bytes[self.pos] != b'\n'
                    && self.bytes[self.pos].is_ascii_whitespace()
                {
                    self.pos += 1;
                }
                TokenKind::Whitespace
            } else if self.starts_with("//") {
                while self.pos < self.bytes.len() && self.bytes[self.pos] != b'\n' {
                    self.pos += 1;
                }
                TokenKind::Comment
            } else if self.starts_with("/*") {
                self.pos = match self.src[start + 2..].find("*/") {
                    Some(rel) => start + 2 + rel + 2,
                    None => self.bytes.len(),
                };
                TokenKind::Comment
            } else if b.is_ascii_alphabetic() || b == b'_' {
                while self.pos < self.bytes.len()
                    && (self.bytes[self.pos].is_ascii_alphanumeric() || self.bytes[self.pos] == b'_')
                {
                    self.pos += 1;
                }
                TokenKind::Ident
            } else if b.is_ascii_digit()
                || (b == b'.' && self.peek(1).is_some_and(|c| c.is_ascii_digit()))
            {
                self.number()
            } else if b == b'"' {
                self.pos += 1;
                while self.pos < self.bytes.len() && !matches!(self.bytes[self.pos], b'"' | b'\n') {
                    if self.bytes[self.pos] == b'\\' {
                        self.pos += 1;
                    }
                    self.pos += 1;
                }
                self.pos = (self.pos + 1).min(self.bytes.len());
                TokenKind::Str
            } else if let Some(punct) = PUNCTUATORS.iter().find(|p| self.starts_with(p)) {
                self.pos += punct.len();
                TokenKind::Punct
            } else {
                let width = self.src[start..].chars().next().map_or(1, char::len_utf8);
                self.pos += width;
                TokenKind::Other
            };
            self.push(kind, start);
        }
        self.out
    }

    fn number(&mut self) -> TokenKind {
        let bytes = self.bytes;
        if self.starts_with("0x") || self.starts_with("0X") {
            self.pos += 2;
            while self.pos < bytes.len() && bytes[self.pos].is_ascii_hexdigit() {
                self.pos += 1;
            }
            if self.pos < bytes.len() && matches!(bytes[self.pos], b'u' | b'U') {
                self.pos += 1;
            }
            return TokenKind::Int;
        }

        let mut is_float = false;
        while self.pos < bytes.len() && bytes[self.pos].is_ascii_digit() {
            self.pos += 1;
        }
        if self.pos < bytes.len() && bytes[self.pos] == b'.' {
            is_float = true;
            self.pos += 1;
            while self.pos < bytes.len() && bytes[self.pos].is_ascii_digit() {
                self.pos += 1;
            }
        }
        if self.pos < bytes.len() && matches!(bytes[self.pos], b'e' | b'E') {
            let mut look = self.pos + 1;
            if look < bytes.len() && matches!(bytes[look], b'+' | b'-') {
                look += 1;
            }
            if look < bytes.len() && bytes[look].is_ascii_digit() {
                is_float = true;
                self.pos = look;
                while self.pos < bytes.len() && bytes[self.pos].is_ascii_digit() {
                    self.pos += 1;
                }
            }
        }
        if self.starts_with("lf") || self.starts_with("LF") {
            self.pos += 2;
            is_float = true;
        } else if self.pos < bytes.len() && matches!(bytes[self.pos], b'f' | b'F') {
            self.pos += 1;
            is_float = true;
        } else if !is_float && self.pos < bytes.len() && matches!(bytes[self.pos], b'u' | b'U') {
            self.pos += 1;
        }
        if is_float {
            TokenKind::Float
        } else {
            TokenKind::Int
        }
    }

    fn starts_with(&self, prefix: &str) -> bool {
        self.src[self.pos..].starts_with(prefix)
    }

    fn peek(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn push(&mut self, kind: TokenKind, start: usize) {
        let text = &self.src[start..self.pos];
        self.out.push(Token {
            kind,
            text: text.to_string(),
            line: self.line,
            column: self.column,
        });
        for ch in text.chars() {
            if ch == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn significant(source: &str) -> Vec<(TokenKind, String)> {
        tokenize(source)
            .into_iter()
            .filter(|t| !t.is_trivia())
            .map(|t| (t.kind, t.text))
            .collect()
    }

    #[test]
    fn round_trips_source_text() {
        let source = "vec4 c = vec4(1.0, .5, 2e-3, 0x1F); // tail\n/* block\n */ x <<= 2u;";
        assert_eq!(render(&tokenize(source)), source);
    }

    #[test]
    fn classifies_numbers() {
        let tokens = significant("1 1.0 .5 1e3 1.5f 3u 0xFF 2.");
        let kinds: Vec<_> = tokens.iter().map(|(k, _)| *k).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Int,
                TokenKind::Float,
                TokenKind::Float,
                TokenKind::Float,
                TokenKind::Float,
                TokenKind::Int,
                TokenKind::Int,
                TokenKind::Float,
            ]
        );
    }

    #[test]
    fn prefers_longest_punctuator() {
        let tokens = significant("a<<=b&&c##d");
        let texts: Vec<_> = tokens.iter().map(|(_, t)| t.as_str()).collect();
        assert_eq!(texts, vec!["a", "<<=", "b", "&&", "c", "##", "d"]);
    }

    #[test]
    fn tracks_lines_across_block_comments() {
        let tokens = tokenize("/* a\nb */\nfoo");
        let foo = tokens.iter().find(|t| t.is_ident("foo")).unwrap();
        assert_eq!(foo.line, 3);
        assert_eq!(foo.column, 1);
    }
}
