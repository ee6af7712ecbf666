//! Token definitions for Quasicode

use crate::utils::Span;
use serde::Serialize;
use std::fmt;

/// A token produced by the lexer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Token {
    pub kind: TokenKind,
    /// Source text of the token
    pub lexeme: String,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, lexeme: impl Into<String>, span: Span) -> Self {
        Self { kind, lexeme: lexeme.into(), span }
    }

    pub fn eof(span: Span) -> Self {
        Self { kind: TokenKind::Eof, lexeme: String::new(), span }
    }
}

/// Token kinds
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum TokenKind {
    // ============ Keywords: types ============
    Int,
    Double,
    Boolean,
    Any,
    New,

    // ============ Keywords: literals ============
    True,
    False,

    // ============ Keywords: control flow ============
    Loop,
    From,
    To,
    While,
    Until,
    If,
    Then,
    Else,
    Break,
    Continue,
    Exit,

    // ============ Keywords: operators ============
    /// mod / MOD
    Mod,
    /// div / DIV
    Div,
    /// and / AND
    And,
    /// or / OR
    Or,
    /// not / NOT
    Not,
    /// is / IS
    Is,

    // ============ Keywords: statements ============
    Output,
    Input,
    Function,
    Return,

    // ============ Keywords: classes ============
    Class,
    Extends,
    Private,
    Public,
    Static,
    This,
    Super,
    End,

    // ============ Identifiers and Literals ============
    Ident(String),
    IntLit(i64),
    FloatLit(f64),
    StringLit(String),

    // ============ Operators ============
    /// +
    Plus,
    /// -
    Minus,
    /// *
    Star,
    /// /
    Slash,
    /// =
    Eq,
    /// ==
    EqEq,
    /// !=
    Ne,
    /// <
    Lt,
    /// <=
    Le,
    /// >
    Gt,
    /// >=
    Ge,
    /// .
    Dot,

    // ============ Delimiters ============
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Colon,

    // ============ Special ============
    /// End of a logical line
    Eol,
    /// End of file
    Eof,
}

impl TokenKind {
    /// Check if this token is a keyword
    pub fn is_keyword(&self) -> bool {
        !matches!(
            self,
            TokenKind::Ident(_)
                | TokenKind::IntLit(_)
                | TokenKind::FloatLit(_)
                | TokenKind::StringLit(_)
                | TokenKind::Plus
                | TokenKind::Minus
                | TokenKind::Star
                | TokenKind::Slash
                | TokenKind::Eq
                | TokenKind::EqEq
                | TokenKind::Ne
                | TokenKind::Lt
                | TokenKind::Le
                | TokenKind::Gt
                | TokenKind::Ge
                | TokenKind::Dot
                | TokenKind::LParen
                | TokenKind::RParen
                | TokenKind::LBrace
                | TokenKind::RBrace
                | TokenKind::LBracket
                | TokenKind::RBracket
                | TokenKind::Comma
                | TokenKind::Colon
                | TokenKind::Eol
                | TokenKind::Eof
        )
    }

    /// Try to convert an identifier to a keyword
    pub fn keyword_from_str(s: &str) -> Option<TokenKind> {
        match s {
            "int" => Some(TokenKind::Int),
            "double" => Some(TokenKind::Double),
            "boolean" => Some(TokenKind::Boolean),
            "any" => Some(TokenKind::Any),
            "new" => Some(TokenKind::New),
            "true" => Some(TokenKind::True),
            "false" => Some(TokenKind::False),
            "loop" => Some(TokenKind::Loop),
            "from" => Some(TokenKind::From),
            "to" => Some(TokenKind::To),
            "while" => Some(TokenKind::While),
            "until" => Some(TokenKind::Until),
            "if" => Some(TokenKind::If),
            "then" => Some(TokenKind::Then),
            "else" => Some(TokenKind::Else),
            "break" => Some(TokenKind::Break),
            "continue" => Some(TokenKind::Continue),
            "exit" => Some(TokenKind::Exit),
            "mod" | "MOD" => Some(TokenKind::Mod),
            "div" | "DIV" => Some(TokenKind::Div),
            "and" | "AND" => Some(TokenKind::And),
            "or" | "OR" => Some(TokenKind::Or),
            "not" | "NOT" => Some(TokenKind::Not),
            "is" | "IS" => Some(TokenKind::Is),
            "output" | "OUTPUT" => Some(TokenKind::Output),
            "input" | "INPUT" => Some(TokenKind::Input),
            "function" => Some(TokenKind::Function),
            "return" => Some(TokenKind::Return),
            "class" => Some(TokenKind::Class),
            "extends" => Some(TokenKind::Extends),
            "private" => Some(TokenKind::Private),
            "public" => Some(TokenKind::Public),
            "static" => Some(TokenKind::Static),
            "this" => Some(TokenKind::This),
            "super" => Some(TokenKind::Super),
            "end" => Some(TokenKind::End),
            _ => None,
        }
    }

    /// Get the precedence of a binary operator (for precedence climbing)
    /// Returns None if not a binary operator. `is` is handled by the parser
    /// because its right side is a type.
    pub fn binary_precedence(&self) -> Option<u8> {
        match self {
            TokenKind::Or => Some(1),
            TokenKind::And => Some(2),
            TokenKind::EqEq | TokenKind::Ne => Some(3),
            TokenKind::Lt | TokenKind::Le | TokenKind::Gt | TokenKind::Ge => Some(4),
            TokenKind::Plus | TokenKind::Minus => Some(6),
            TokenKind::Star | TokenKind::Slash | TokenKind::Div | TokenKind::Mod => Some(7),
            _ => None,
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Ident(name) => write!(f, "identifier '{}'", name),
            TokenKind::IntLit(v) => write!(f, "integer {}", v),
            TokenKind::FloatLit(v) => write!(f, "float {}", v),
            TokenKind::StringLit(s) => write!(f, "string {:?}", s),
            TokenKind::Eol => write!(f, "end-of-line"),
            TokenKind::Eof => write!(f, "end-of-file"),
            other => write!(f, "{:?}", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_aliases() {
        assert_eq!(TokenKind::keyword_from_str("MOD"), Some(TokenKind::Mod));
        assert_eq!(TokenKind::keyword_from_str("output"), Some(TokenKind::Output));
        assert_eq!(TokenKind::keyword_from_str("Output"), None);
        assert!(TokenKind::End.is_keyword());
        assert!(!TokenKind::Ident("x".into()).is_keyword());
    }

    #[test]
    fn test_precedence_order() {
        let or = TokenKind::Or.binary_precedence().unwrap();
        let and = TokenKind::And.binary_precedence().unwrap();
        let eq = TokenKind::EqEq.binary_precedence().unwrap();
        let plus = TokenKind::Plus.binary_precedence().unwrap();
        let star = TokenKind::Mod.binary_precedence().unwrap();
        assert!(or < and && and < eq && eq < plus && plus < star);
    }
}
