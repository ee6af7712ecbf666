//! Diagnostics for the Quasicode front end
//!
//! Every user-facing problem is one variant of [`Error`]. Phases collect
//! them into a `Vec<Error>` and keep going; nothing here aborts a pass.

use crate::utils::Span;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Front end diagnostic
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    // ==================== Scanner Errors ====================

    #[error("Unexpected character {ch}")]
    UnexpectedChar { ch: char, span: Span },

    #[error("Unterminated string literal")]
    UnterminatedString { span: Span },

    #[error("Unterminated '/*' comment")]
    UnterminatedComment { span: Span },

    #[error("Invalid escape sequence \"\\{ch}\"")]
    InvalidEscape { ch: char, span: Span },

    #[error("Empty escape sequence")]
    EmptyEscape { span: Span },

    #[error("Expected end-of-line after line continuation")]
    BadLineContinuation { span: Span },

    #[error("Number literal '{text}' is out of range")]
    NumberOutOfRange { text: String, span: Span },

    // ==================== Parser Errors ====================

    #[error("{message}")]
    Syntax { message: String, span: Span },

    #[error("Expect expression")]
    ExpectedExpr { span: Span },

    #[error("Expect type")]
    ExpectedType { span: Span },

    // ==================== Resolver Errors ====================

    #[error("Use of unknown identifier {name}")]
    UnknownIdentifier { name: String, span: Span },

    #[error("Invalid redeclaration of '{name}'")]
    Redeclaration { name: String, span: Span },

    #[error("Use of variable within its own declaration")]
    UseInOwnDeclaration { span: Span },

    #[error("Use of variable within class before class is available")]
    UseBeforeClassReady { span: Span },

    #[error("Call to method '{name}' before class is available")]
    MethodBeforeClassReady { name: String, span: Span },

    #[error("Circular reference")]
    CircularReference { span: Span },

    #[error("Use of instance variable from a static method")]
    InstanceVariableFromStatic { span: Span },

    #[error("Instance member '{name}' cannot be used in a static context")]
    InstanceMemberInStaticContext { name: String, span: Span },

    #[error("Cannot use 'this' outside of a method")]
    ThisOutsideMethod { span: Span },

    #[error("'super' cannot be referenced outside of a class")]
    SuperOutsideClass { span: Span },

    #[error("'super' cannot be referenced in a root class")]
    SuperInRootClass { span: Span },

    #[error("'super' cannot be referenced outside of a method")]
    SuperOutsideMethod { span: Span },

    #[error("'super' cannot be called outside of a constructor")]
    SuperCallOutsideConstructor { span: Span },

    #[error("Call to 'super' must be first statement in constructor")]
    SuperCallNotFirst { span: Span },

    #[error("Superclass '{class}' has no member '{member}'")]
    NoSuperMember { class: String, member: String, span: Span },

    #[error("'{name}' inherits from itself")]
    InheritsFromItself { name: String, span: Span },

    #[error("Static does not match for overriding method")]
    OverrideStaticMismatch { span: Span },

    #[error("Return type does not match for overriding method")]
    OverrideReturnMismatch { span: Span },

    #[error("Cannot assign to value: '{name}' is a function")]
    AssignToFunction { name: String, span: Span },

    #[error("Cannot assign to value: '{name}' is a class")]
    AssignToClass { name: String, span: Span },

    #[error("Cannot retype variable after first assignment")]
    RetypeVariable { span: Span },

    #[error("Can't use 'break' outside of loop")]
    BreakOutsideLoop { span: Span },

    #[error("Can't use 'continue' outside of loop")]
    ContinueOutsideLoop { span: Span },

    #[error("Cannot return from top-level code")]
    ReturnAtTopLevel { span: Span },

    #[error("Cannot return a value from a constructor")]
    ReturnValueFromConstructor { span: Span },

    #[error("Constructor declaration cannot be marked 'static'")]
    StaticConstructor { span: Span },

    #[error("Template classes are not supported: '{name}'")]
    TemplateNotSupported { name: String, span: Span },

    #[error("Cannot find type '{name}' in scope")]
    UnknownType { name: String, span: Span },

    #[error("Missing return in function expected to return '{ty}'")]
    MissingReturn { ty: String, span: Span },

    #[error("'this' is unavailable until all stored properties are initialized")]
    ThisBeforeInit { span: Span },

    #[error("Variable 'this.{name}' used before being initialized")]
    FieldBeforeInit { name: String, span: Span },

    #[error("Instance methods cannot be called before all stored properties are initialized")]
    InstanceMethodBeforeInit { span: Span },

    #[error("Return from initializer without initializing all stored properties")]
    ReturnBeforeInit { span: Span },

    #[error("Implicit return from initializer without initializing all stored properties")]
    ImplicitReturnBeforeInit { span: Span },

    // ==================== Type Errors ====================

    #[error("No matching function to call")]
    NoMatchingFunction { span: Span },

    #[error("Function call is ambiguous")]
    AmbiguousCall { span: Span },

    #[error("Type '{from}' cannot be cast to '{to}'")]
    CannotCast { from: String, to: String, span: Span },

    #[error("Cannot assign to immutable value")]
    ImmutableAssign { span: Span },

    #[error("Type '{ty}' cannot be used as a boolean")]
    NotBoolean { ty: String, span: Span },

    #[error("Type '{ty}' cannot be used as an int")]
    NotInt { ty: String, span: Span },

    #[error("Array subscript is not an integer")]
    SubscriptNotInt { span: Span },

    #[error("Subscripted expression is not an array")]
    NotAnArray { span: Span },

    #[error("Expect type 'int' for array capacity")]
    CapacityNotInt { span: Span },

    #[error("Binary operator '{op}' cannot be applied to operands of type '{left}' and '{right}'")]
    BinaryOperands { op: String, left: String, right: String, span: Span },

    #[error("Binary operator '{op}' can only be applied to operands of type 'boolean' and 'boolean'")]
    LogicalOperands { op: String, span: Span },

    #[error("Unary operator '{op}' can only be applied to an operand of type 'boolean'")]
    UnaryNotOperand { op: String, span: Span },

    #[error("Unary operator '{op}' can only be applied to an operand of type 'int' or 'double'")]
    UnaryNegOperand { op: String, span: Span },

    #[error("Cannot input to type '{ty}'")]
    CannotInput { ty: String, span: Span },

    #[error("Variable cannot be initialized with a value of type '<Void>'")]
    VoidInitializer { span: Span },

    #[error("Non-void function should return a value")]
    MissingReturnValue { span: Span },

    #[error("Unexpected non-void return value in void function")]
    UnexpectedReturnValue { span: Span },

    #[error("Value of type '{ty}' has no member '{member}'")]
    NoMember { ty: String, member: String, span: Span },

    #[error("'{name}' is inaccessible due to 'private' protection level")]
    PrivateMember { name: String, span: Span },

    #[error("Static member '{name}' cannot be used on instance of type '{ty}'")]
    StaticMemberOnInstance { name: String, ty: String, span: Span },

    #[error("Instance member '{name}' cannot be used on type '{ty}'")]
    InstanceMemberOnType { name: String, ty: String, span: Span },

    // ==================== Driver Errors ====================

    #[error("IO error: {0}")]
    Io(String),
}

impl Error {
    /// Shorthand for parser diagnostics
    pub fn syntax(message: impl Into<String>, span: Span) -> Self {
        Self::Syntax { message: message.into(), span }
    }

    /// Get the span associated with this error
    pub fn span(&self) -> Option<Span> {
        match self {
            Self::UnexpectedChar { span, .. }
            | Self::UnterminatedString { span }
            | Self::UnterminatedComment { span }
            | Self::InvalidEscape { span, .. }
            | Self::EmptyEscape { span }
            | Self::BadLineContinuation { span }
            | Self::NumberOutOfRange { span, .. }
            | Self::Syntax { span, .. }
            | Self::ExpectedExpr { span }
            | Self::ExpectedType { span }
            | Self::UnknownIdentifier { span, .. }
            | Self::Redeclaration { span, .. }
            | Self::UseInOwnDeclaration { span }
            | Self::UseBeforeClassReady { span }
            | Self::MethodBeforeClassReady { span, .. }
            | Self::CircularReference { span }
            | Self::InstanceVariableFromStatic { span }
            | Self::InstanceMemberInStaticContext { span, .. }
            | Self::ThisOutsideMethod { span }
            | Self::SuperOutsideClass { span }
            | Self::SuperInRootClass { span }
            | Self::SuperOutsideMethod { span }
            | Self::SuperCallOutsideConstructor { span }
            | Self::SuperCallNotFirst { span }
            | Self::NoSuperMember { span, .. }
            | Self::InheritsFromItself { span, .. }
            | Self::OverrideStaticMismatch { span }
            | Self::OverrideReturnMismatch { span }
            | Self::AssignToFunction { span, .. }
            | Self::AssignToClass { span, .. }
            | Self::RetypeVariable { span }
            | Self::BreakOutsideLoop { span }
            | Self::ContinueOutsideLoop { span }
            | Self::ReturnAtTopLevel { span }
            | Self::ReturnValueFromConstructor { span }
            | Self::StaticConstructor { span }
            | Self::TemplateNotSupported { span, .. }
            | Self::UnknownType { span, .. }
            | Self::MissingReturn { span, .. }
            | Self::ThisBeforeInit { span }
            | Self::FieldBeforeInit { span, .. }
            | Self::InstanceMethodBeforeInit { span }
            | Self::ReturnBeforeInit { span }
            | Self::ImplicitReturnBeforeInit { span }
            | Self::NoMatchingFunction { span }
            | Self::AmbiguousCall { span }
            | Self::CannotCast { span, .. }
            | Self::ImmutableAssign { span }
            | Self::NotBoolean { span, .. }
            | Self::NotInt { span, .. }
            | Self::SubscriptNotInt { span }
            | Self::NotAnArray { span }
            | Self::CapacityNotInt { span }
            | Self::BinaryOperands { span, .. }
            | Self::LogicalOperands { span, .. }
            | Self::UnaryNotOperand { span, .. }
            | Self::UnaryNegOperand { span, .. }
            | Self::CannotInput { span, .. }
            | Self::VoidInitializer { span }
            | Self::MissingReturnValue { span }
            | Self::UnexpectedReturnValue { span }
            | Self::NoMember { span, .. }
            | Self::PrivateMember { span, .. }
            | Self::StaticMemberOnInstance { span, .. }
            | Self::InstanceMemberOnType { span, .. } => Some(*span),
            Self::Io(_) => None,
        }
    }

    /// Which phase produced this diagnostic
    pub fn phase(&self) -> Phase {
        match self {
            Self::UnexpectedChar { .. }
            | Self::UnterminatedString { .. }
            | Self::UnterminatedComment { .. }
            | Self::InvalidEscape { .. }
            | Self::EmptyEscape { .. }
            | Self::BadLineContinuation { .. }
            | Self::NumberOutOfRange { .. } => Phase::Scan,
            Self::Syntax { .. }
            | Self::ExpectedExpr { .. }
            | Self::ExpectedType { .. } => Phase::Parse,
            Self::NoMatchingFunction { .. }
            | Self::AmbiguousCall { .. }
            | Self::CannotCast { .. }
            | Self::ImmutableAssign { .. }
            | Self::NotBoolean { .. }
            | Self::NotInt { .. }
            | Self::SubscriptNotInt { .. }
            | Self::NotAnArray { .. }
            | Self::CapacityNotInt { .. }
            | Self::BinaryOperands { .. }
            | Self::LogicalOperands { .. }
            | Self::UnaryNotOperand { .. }
            | Self::UnaryNegOperand { .. }
            | Self::CannotInput { .. }
            | Self::VoidInitializer { .. }
            | Self::MissingReturnValue { .. }
            | Self::UnexpectedReturnValue { .. }
            | Self::NoMember { .. }
            | Self::PrivateMember { .. }
            | Self::StaticMemberOnInstance { .. }
            | Self::InstanceMemberOnType { .. } => Phase::Type,
            Self::Io(_) => Phase::Driver,
            _ => Phase::Resolve,
        }
    }
}

/// Pipeline phase a diagnostic belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Scan,
    Parse,
    Resolve,
    Type,
    Driver,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let span = Span::new(3, 5, 0);
        let err = Error::UnknownIdentifier { name: "foo".to_string(), span };
        assert_eq!(err.to_string(), "Use of unknown identifier foo");
        assert_eq!(err.span(), Some(span));
        assert_eq!(err.phase(), Phase::Resolve);

        let err = Error::BinaryOperands {
            op: "mod".to_string(),
            left: "double".to_string(),
            right: "int".to_string(),
            span,
        };
        assert_eq!(
            err.to_string(),
            "Binary operator 'mod' cannot be applied to operands of type 'double' and 'int'"
        );
        assert_eq!(err.phase(), Phase::Type);
    }

    #[test]
    fn test_escape_message() {
        let err = Error::InvalidEscape { ch: 'q', span: Span::dummy() };
        assert_eq!(err.to_string(), "Invalid escape sequence \"\\q\"");
        assert_eq!(Error::Io("gone".into()).span(), None);
    }
}
