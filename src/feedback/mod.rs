//! Structured Feedback Module
//!
//! Machine-readable output for `qsc check --json`:
//! - JSON error reports with stable codes
//! - Compilation statistics

use crate::frontend::ast::Program;
use crate::semantic::{SymbolId, SymbolTable};
use crate::utils::{Error, LineIndex};
use serde::{Deserialize, Serialize};

// ==================== Structured Error Report ====================

/// A structured error report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorReport {
    /// Error code (e.g., "E0301")
    pub code: String,

    pub severity: Severity,

    /// Human-readable message
    pub message: String,

    /// `None` for errors not tied to the source, such as I/O failures
    pub location: Option<Location>,

    /// Suggested fixes, most likely first
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub suggestions: Vec<Suggestion>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Error,
    Warning,
}

/// 1-based source range
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub file: String,
    pub line: u32,
    pub column: u32,
    pub end_line: u32,
    pub end_column: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Suggestion {
    pub message: String,
    /// Confidence in this suggestion (0.0 - 1.0)
    pub confidence: f64,
}

// ==================== Compilation Feedback ====================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompilationFeedback {
    pub success: bool,
    pub source_file: String,
    pub diagnostics: Vec<ErrorReport>,
    pub stats: CompilationStats,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilationStats {
    pub token_count: usize,
    pub statement_count: usize,
    /// Every symbol in the table, builtins included
    pub symbol_count: usize,
    /// User-declared classes
    pub class_count: usize,
    /// User-declared functions and methods
    pub function_count: usize,
    /// Lines of code
    pub loc: usize,
}

impl CompilationStats {
    pub fn collect(source: &str, token_count: usize, program: &Program, table: &SymbolTable) -> Self {
        let symbols = table.symbols();
        Self {
            token_count,
            statement_count: program.stmts.len(),
            symbol_count: symbols.len(),
            class_count: symbols.iter().filter(|s| s.as_class().is_some_and(|class| !class.builtin)).count(),
            function_count: symbols
                .iter()
                .filter(|s| s.as_function().is_some())
                .filter(|s| s.as_method().map_or(true, |method| !is_builtin_class(table, method.within_class)))
                .count(),
            loc: source.lines().filter(|line| !line.trim().is_empty()).count(),
        }
    }
}

fn is_builtin_class(table: &SymbolTable, class: SymbolId) -> bool {
    table.get(class).as_class().is_some_and(|class| class.builtin)
}

// ==================== Error Conversion ====================

impl ErrorReport {
    pub fn from_error(error: &Error, file_name: &str, lines: &LineIndex) -> Self {
        let location = error.span().map(|span| {
            let start = lines.line_col(span.start);
            let end = lines.line_col(span.end);
            Location {
                file: file_name.to_string(),
                line: start.line,
                column: start.column,
                end_line: end.line,
                end_column: end.column,
            }
        });

        let mut report = Self {
            code: error_code(error).to_string(),
            severity: Severity::Error,
            message: error.to_string(),
            location,
            suggestions: suggestions_for(error),
        };
        report.sort_suggestions();
        report
    }

    /// Sort suggestions by confidence (highest first)
    pub fn sort_suggestions(&mut self) {
        self.suggestions.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap_or(std::cmp::Ordering::Equal));
    }
}

fn suggestion(message: impl Into<String>, confidence: f64) -> Suggestion {
    Suggestion { message: message.into(), confidence }
}

fn suggestions_for(error: &Error) -> Vec<Suggestion> {
    match error {
        Error::UnknownIdentifier { name, .. } => vec![
            suggestion(format!("Assign a value to '{}' before using it", name), 0.6),
            suggestion("Check the spelling against names declared in an enclosing scope", 0.4),
        ],
        Error::CircularReference { .. } => {
            vec![suggestion("Break the cycle by giving one of the variables a constant initial value", 0.7)]
        }
        Error::CannotCast { from, to, .. } => {
            vec![suggestion(format!("Convert explicitly with '({}) value' if '{}' can be cast", to, from), 0.5)]
        }
        Error::MissingReturn { ty, .. } => {
            vec![suggestion(format!("Add a 'return' of type '{}' at the end of the function", ty), 0.8)]
        }
        Error::ImplicitReturnBeforeInit { .. } | Error::ReturnBeforeInit { .. } => {
            vec![suggestion("Give every field a value on each path, or declare it with an initial value", 0.7)]
        }
        Error::NoMatchingFunction { .. } => {
            vec![suggestion("Check the number and types of the arguments against the declared parameters", 0.6)]
        }
        Error::AmbiguousCall { .. } => vec![suggestion("Cast an argument so exactly one overload fits best", 0.7)],
        _ => Vec::new(),
    }
}

/// Stable identifier of an error variant. The hundreds digit is the phase:
/// 1 scanner, 2 parser, 3 resolver, 4 flow checks, 5 type checker, 9 driver.
pub fn error_code(error: &Error) -> &'static str {
    match error {
        // ========== Scanner ==========
        Error::UnexpectedChar { .. } => "E0101",
        Error::UnterminatedString { .. } => "E0102",
        Error::UnterminatedComment { .. } => "E0103",
        Error::InvalidEscape { .. } => "E0104",
        Error::EmptyEscape { .. } => "E0105",
        Error::BadLineContinuation { .. } => "E0106",
        Error::NumberOutOfRange { .. } => "E0107",

        // ========== Parser ==========
        Error::Syntax { .. } => "E0201",
        Error::ExpectedExpr { .. } => "E0202",
        Error::ExpectedType { .. } => "E0203",

        // ========== Resolver ==========
        Error::UnknownIdentifier { .. } => "E0301",
        Error::Redeclaration { .. } => "E0302",
        Error::UseInOwnDeclaration { .. } => "E0303",
        Error::UseBeforeClassReady { .. } => "E0304",
        Error::CircularReference { .. } => "E0305",
        Error::InstanceVariableFromStatic { .. } => "E0306",
        Error::InstanceMemberInStaticContext { .. } => "E0307",
        Error::ThisOutsideMethod { .. } => "E0308",
        Error::SuperOutsideClass { .. } => "E0309",
        Error::SuperInRootClass { .. } => "E0310",
        Error::SuperOutsideMethod { .. } => "E0311",
        Error::SuperCallOutsideConstructor { .. } => "E0312",
        Error::SuperCallNotFirst { .. } => "E0313",
        Error::NoSuperMember { .. } => "E0314",
        Error::InheritsFromItself { .. } => "E0315",
        Error::OverrideStaticMismatch { .. } => "E0316",
        Error::OverrideReturnMismatch { .. } => "E0317",
        Error::AssignToFunction { .. } => "E0318",
        Error::AssignToClass { .. } => "E0319",
        Error::RetypeVariable { .. } => "E0320",
        Error::BreakOutsideLoop { .. } => "E0321",
        Error::ContinueOutsideLoop { .. } => "E0322",
        Error::ReturnAtTopLevel { .. } => "E0323",
        Error::ReturnValueFromConstructor { .. } => "E0324",
        Error::StaticConstructor { .. } => "E0325",
        Error::TemplateNotSupported { .. } => "E0326",
        Error::UnknownType { .. } => "E0327",
        Error::MethodBeforeClassReady { .. } => "E0328",

        // ========== Flow ==========
        Error::MissingReturn { .. } => "E0401",
        Error::ThisBeforeInit { .. } => "E0402",
        Error::FieldBeforeInit { .. } => "E0403",
        Error::InstanceMethodBeforeInit { .. } => "E0404",
        Error::ReturnBeforeInit { .. } => "E0405",
        Error::ImplicitReturnBeforeInit { .. } => "E0406",

        // ========== Type Checker ==========
        Error::NoMatchingFunction { .. } => "E0501",
        Error::AmbiguousCall { .. } => "E0502",
        Error::CannotCast { .. } => "E0503",
        Error::ImmutableAssign { .. } => "E0504",
        Error::NotBoolean { .. } => "E0505",
        Error::NotInt { .. } => "E0506",
        Error::SubscriptNotInt { .. } => "E0507",
        Error::NotAnArray { .. } => "E0508",
        Error::CapacityNotInt { .. } => "E0509",
        Error::BinaryOperands { .. } => "E0510",
        Error::LogicalOperands { .. } => "E0511",
        Error::UnaryNotOperand { .. } => "E0512",
        Error::UnaryNegOperand { .. } => "E0513",
        Error::CannotInput { .. } => "E0514",
        Error::VoidInitializer { .. } => "E0515",
        Error::MissingReturnValue { .. } => "E0516",
        Error::UnexpectedReturnValue { .. } => "E0517",
        Error::NoMember { .. } => "E0518",
        Error::PrivateMember { .. } => "E0519",
        Error::StaticMemberOnInstance { .. } => "E0520",
        Error::InstanceMemberOnType { .. } => "E0521",

        Error::Io(_) => "E0901",
    }
}

impl CompilationFeedback {
    pub fn new(source_file: impl Into<String>, source: &str, errors: &[Error], stats: CompilationStats) -> Self {
        let source_file = source_file.into();
        let lines = LineIndex::new(source);
        let diagnostics: Vec<ErrorReport> =
            errors.iter().map(|error| ErrorReport::from_error(error, &source_file, &lines)).collect();
        Self { success: diagnostics.is_empty(), source_file, diagnostics, stats }
    }

    /// Output as JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::Span;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_report_location_and_code() {
        let source = "x = 1\noutput y\n";
        let error = Error::UnknownIdentifier { name: "y".to_string(), span: Span::new(13, 14, 0) };
        let report = ErrorReport::from_error(&error, "main.qc", &LineIndex::new(source));

        assert_eq!(report.code, "E0301");
        assert_eq!(report.message, "Use of unknown identifier y");
        assert_eq!(
            report.location,
            Some(Location { file: "main.qc".to_string(), line: 2, column: 8, end_line: 2, end_column: 9 })
        );
        assert!(report.suggestions[0].confidence >= report.suggestions[1].confidence);
    }

    #[test]
    fn test_feedback_json() {
        let errors = vec![Error::Io("missing.qc: not found".to_string())];
        let feedback = CompilationFeedback::new("missing.qc", "", &errors, CompilationStats::default());
        assert!(!feedback.success);

        let json: serde_json::Value = serde_json::from_str(&feedback.to_json().unwrap()).unwrap();
        assert_eq!(json["diagnostics"][0]["code"], "E0901");
        assert_eq!(json["diagnostics"][0]["location"], serde_json::Value::Null);
        assert_eq!(json["stats"]["token_count"], 0);
    }

    #[test]
    fn test_stats_skip_builtins() {
        let source = "class A\n  function f()\n  end function\nend class\n\nfunction g()\nend function\n";
        let analysis = crate::semantic::tests::analyze_program(source);
        let stats = CompilationStats::collect(source, 17, &analysis.program, &analysis.table);
        assert_eq!(stats.class_count, 1);
        assert_eq!(stats.function_count, 2);
        assert_eq!(stats.statement_count, 2);
        assert_eq!(stats.token_count, 17);
        assert_eq!(stats.loc, 6);
    }
}
