//! Lexer for Quasicode
//!
//! Converts source code into a stream of tokens. Quasicode is line based,
//! so newlines are significant and come out as `Eol` tokens; a `\` at the
//! end of a line joins it with the next one.

use crate::frontend::token::{Token, TokenKind};
use crate::utils::{Error, Span};

/// The lexer state
pub struct Lexer {
    /// Source code as characters
    source: Vec<char>,
    /// Current position in source
    pos: usize,
    /// Start position of current token
    start: usize,
    /// File ID for span tracking
    file_id: usize,
    errors: Vec<Error>,
}

impl Lexer {
    /// Create a new lexer for the given source code
    pub fn new(source: &str, file_id: usize) -> Self {
        Self {
            source: source.chars().collect(),
            pos: 0,
            start: 0,
            file_id,
            errors: Vec::new(),
        }
    }

    /// Get the current character without advancing
    fn peek(&self) -> Option<char> {
        self.source.get(self.pos).copied()
    }

    /// Get the next character without advancing
    fn peek_next(&self) -> Option<char> {
        self.source.get(self.pos + 1).copied()
    }

    /// Advance to the next character
    fn advance(&mut self) -> Option<char> {
        let c = self.peek();
        self.pos += 1;
        c
    }

    fn matches(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Check if we've reached the end of input
    fn is_at_end(&self) -> bool {
        self.pos >= self.source.len()
    }

    /// Create a span from start to current position
    fn make_span(&self) -> Span {
        Span::new(self.start, self.pos, self.file_id)
    }

    fn span_at(&self, start: usize, end: usize) -> Span {
        Span::new(start, end, self.file_id)
    }

    /// Create a token with the current span
    fn make_token(&self, kind: TokenKind) -> Token {
        let lexeme: String = self.source[self.start..self.pos].iter().collect();
        Token::new(kind, lexeme, self.make_span())
    }

    fn is_blank(c: char) -> bool {
        matches!(c, ' ' | '\t' | '\r')
    }

    /// Skip blanks, comments and line continuations. Newlines are tokens.
    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            match c {
                ' ' | '\t' | '\r' => {
                    self.advance();
                }
                // Line comment; a trailing `\` carries it onto the next line
                '/' if self.peek_next() == Some('/') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.advance();
                        if c == '\\' && self.peek() == Some('\n') {
                            self.advance();
                        }
                    }
                }
                '/' if self.peek_next() == Some('*') => self.skip_block_comment(),
                '\\' => self.line_continuation(),
                _ => break,
            }
        }
    }

    /// Nestable `/* */` comment
    fn skip_block_comment(&mut self) {
        let open = self.pos;
        self.advance(); // skip /
        self.advance(); // skip *
        let mut depth = 1;
        while depth > 0 && !self.is_at_end() {
            match (self.peek(), self.peek_next()) {
                (Some('*'), Some('/')) => {
                    self.pos += 2;
                    depth -= 1;
                }
                (Some('/'), Some('*')) => {
                    self.pos += 2;
                    depth += 1;
                }
                _ => {
                    self.advance();
                }
            }
        }
        if depth > 0 {
            self.errors.push(Error::UnterminatedComment { span: self.span_at(open, open + 2) });
        }
    }

    fn line_continuation(&mut self) {
        self.advance(); // skip \
        while self.peek().map_or(false, Self::is_blank) {
            self.advance();
        }
        match self.peek() {
            None => {}
            Some('\n') => {
                self.advance();
            }
            Some(_) => {
                self.errors.push(Error::BadLineContinuation { span: self.span_at(self.pos, self.pos + 1) });
            }
        }
    }

    /// Read an identifier or keyword
    fn read_identifier(&mut self) -> Token {
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                self.advance();
            } else {
                break;
            }
        }

        let text: String = self.source[self.start..self.pos].iter().collect();

        // Check if it's a keyword
        let kind = TokenKind::keyword_from_str(&text).unwrap_or(TokenKind::Ident(text));

        self.make_token(kind)
    }

    /// Read a number literal. A trailing `f` forces a double, `l` an int.
    fn read_number(&mut self) -> Token {
        let mut is_float = false;

        while self.peek().map_or(false, |c| c.is_ascii_digit()) {
            self.advance();
        }

        // Check for decimal point
        if self.peek() == Some('.') && self.peek_next().map_or(false, |c| c.is_ascii_digit()) {
            is_float = true;
            self.advance(); // consume '.'
            while self.peek().map_or(false, |c| c.is_ascii_digit()) {
                self.advance();
            }
        }

        let digits_end = self.pos;
        if self.matches('f') {
            is_float = true;
        } else if self.matches('l') {
            is_float = false;
        }

        let text: String = self.source[self.start..digits_end].iter().collect();

        if is_float {
            match text.parse::<f64>() {
                Ok(value) => self.make_token(TokenKind::FloatLit(value)),
                Err(_) => self.number_error(text, TokenKind::FloatLit(0.0)),
            }
        } else {
            // `1.5l` truncates like a cast
            let parsed = if text.contains('.') {
                text.parse::<f64>().ok().map(|v| v as i64)
            } else {
                text.parse::<i64>().ok()
            };
            match parsed {
                Some(value) => self.make_token(TokenKind::IntLit(value)),
                None => self.number_error(text, TokenKind::IntLit(0)),
            }
        }
    }

    fn number_error(&mut self, text: String, placeholder: TokenKind) -> Token {
        self.errors.push(Error::NumberOutOfRange { text, span: self.make_span() });
        self.make_token(placeholder)
    }

    /// Read a string literal. Returns `None` when it is unterminated.
    fn read_string(&mut self) -> Option<Token> {
        self.advance(); // consume opening quote

        let mut value = String::new();

        loop {
            let Some(c) = self.advance() else {
                self.errors.push(Error::UnterminatedString { span: self.span_at(self.start, self.start + 1) });
                return None;
            };
            match c {
                '"' => break,
                '\\' => self.read_escape(&mut value),
                c => value.push(c),
            }
        }

        Some(self.make_token(TokenKind::StringLit(value)))
    }

    fn read_escape(&mut self, value: &mut String) {
        let escape_start = self.pos - 1;
        let Some(next) = self.peek() else {
            self.errors.push(Error::EmptyEscape { span: self.span_at(escape_start, self.pos) });
            return;
        };
        match next {
            '\\' => value.push('\\'),
            't' => value.push('\t'),
            'r' => value.push('\r'),
            'n' => value.push('\n'),
            '"' => value.push('"'),
            '\n' => {}
            c if Self::is_blank(c) => {
                // `\` followed by trailing blanks continues the string on the next line
                let saved = self.pos;
                while self.peek().map_or(false, Self::is_blank) {
                    self.advance();
                }
                if self.peek() != Some('\n') {
                    self.pos = saved;
                    self.errors.push(Error::InvalidEscape { ch: c, span: self.span_at(escape_start, saved + 1) });
                }
            }
            c => {
                self.errors.push(Error::InvalidEscape { ch: c, span: self.span_at(escape_start, self.pos + 1) });
            }
        }
        self.advance();
    }

    /// Get the next token, or `None` when the character was rejected
    fn next_token(&mut self) -> Option<Token> {
        self.skip_whitespace();
        self.start = self.pos;

        let Some(c) = self.advance() else {
            return Some(Token::eof(self.make_span()));
        };

        // Identifiers and keywords
        if c.is_ascii_alphabetic() {
            self.pos -= 1; // back up
            return Some(self.read_identifier());
        }

        // Numbers
        if c.is_ascii_digit() {
            self.pos -= 1; // back up
            return Some(self.read_number());
        }

        // String literals
        if c == '"' {
            self.pos -= 1; // back up
            return self.read_string();
        }

        // Operators and punctuation
        let kind = match c {
            '\n' => TokenKind::Eol,
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '=' => {
                if self.matches('=') {
                    TokenKind::EqEq
                } else {
                    TokenKind::Eq
                }
            }
            '!' if self.matches('=') => TokenKind::Ne,
            '<' => {
                if self.matches('=') {
                    TokenKind::Le
                } else {
                    TokenKind::Lt
                }
            }
            '>' => {
                if self.matches('=') {
                    TokenKind::Ge
                } else {
                    TokenKind::Gt
                }
            }
            '.' => TokenKind::Dot,
            ':' => TokenKind::Colon,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            ',' => TokenKind::Comma,
            _ => {
                self.errors.push(Error::UnexpectedChar { ch: c, span: self.make_span() });
                return None;
            }
        };

        Some(self.make_token(kind))
    }

    /// Tokenize the entire source. The stream always ends with `Eol` `Eof`.
    pub fn tokenize(mut self) -> (Vec<Token>, Vec<Error>) {
        let mut tokens: Vec<Token> = Vec::new();
        loop {
            let Some(token) = self.next_token() else {
                continue;
            };
            if token.kind == TokenKind::Eof {
                if tokens.last().map_or(true, |t| t.kind != TokenKind::Eol) {
                    tokens.push(Token::new(TokenKind::Eol, "", token.span));
                }
                tokens.push(token);
                break;
            }
            tokens.push(token);
        }
        log::debug!("scanned {} tokens, {} errors", tokens.len(), self.errors.len());
        (tokens, self.errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn kinds(source: &str) -> Vec<TokenKind> {
        let (tokens, errors) = Lexer::new(source, 0).tokenize();
        assert!(errors.is_empty(), "unexpected errors: {:?}", errors);
        tokens.into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_simple_tokens() {
        assert_eq!(
            kinds("function main()\nend function"),
            vec![
                TokenKind::Function,
                TokenKind::Ident("main".into()),
                TokenKind::LParen,
                TokenKind::RParen,
                TokenKind::Eol,
                TokenKind::End,
                TokenKind::Function,
                TokenKind::Eol,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            kinds("42 3.14 2f 7l"),
            vec![
                TokenKind::IntLit(42),
                TokenKind::FloatLit(3.14),
                TokenKind::FloatLit(2.0),
                TokenKind::IntLit(7),
                TokenKind::Eol,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_strings() {
        assert_eq!(
            kinds(r#""hello\nworld\t\"q\"""#)[0],
            TokenKind::StringLit("hello\nworld\t\"q\"".into())
        );
    }

    #[test]
    fn test_operators_and_aliases() {
        assert_eq!(
            kinds("a != b MOD c <= d"),
            vec![
                TokenKind::Ident("a".into()),
                TokenKind::Ne,
                TokenKind::Ident("b".into()),
                TokenKind::Mod,
                TokenKind::Ident("c".into()),
                TokenKind::Le,
                TokenKind::Ident("d".into()),
                TokenKind::Eol,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_comments_and_continuation() {
        assert_eq!(
            kinds("x = 1 + \\  \n 2 // trailing\n/* a /* nested */ b */y"),
            vec![
                TokenKind::Ident("x".into()),
                TokenKind::Eq,
                TokenKind::IntLit(1),
                TokenKind::Plus,
                TokenKind::IntLit(2),
                TokenKind::Eol,
                TokenKind::Ident("y".into()),
                TokenKind::Eol,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_errors() {
        let (_, errors) = Lexer::new("x = \"abc", 0).tokenize();
        assert_eq!(errors, vec![Error::UnterminatedString { span: Span::new(4, 5, 0) }]);

        let (tokens, errors) = Lexer::new("a ! b", 0).tokenize();
        assert_eq!(errors, vec![Error::UnexpectedChar { ch: '!', span: Span::new(2, 3, 0) }]);
        assert_eq!(tokens.len(), 4);

        let (_, errors) = Lexer::new("a \\ b", 0).tokenize();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].to_string(), "Expected end-of-line after line continuation");

        let (_, errors) = Lexer::new("\"\\q\"", 0).tokenize();
        assert_eq!(errors[0].to_string(), "Invalid escape sequence \"\\q\"");

        let (_, errors) = Lexer::new("/* open", 0).tokenize();
        assert_eq!(errors[0].to_string(), "Unterminated '/*' comment");
    }
}
