//! Abstract Syntax Tree definitions for Quasicode
//!
//! The parser produces the tree with every semantic field in the
//! [`Slot::Unresolved`] state. The resolver fills in symbol and scope ids,
//! and the type checker fills in types, call targets and implicit casts.

use crate::semantic::{ScopeId, SymbolId};
use crate::types::Type;
use crate::utils::Span;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

// ==================== Slots ====================

/// A field that a later phase fills in
#[derive(Debug, Clone, PartialEq)]
pub enum Slot<T> {
    Unresolved,
    Resolved(T),
}

impl<T> Slot<T> {
    pub fn get(&self) -> Option<&T> {
        match self {
            Slot::Unresolved => None,
            Slot::Resolved(value) => Some(value),
        }
    }

    pub fn set(&mut self, value: T) {
        *self = Slot::Resolved(value);
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Slot::Resolved(_))
    }
}

impl<T: Copy> Slot<T> {
    pub fn id(&self) -> Option<T> {
        self.get().copied()
    }
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Slot::Unresolved
    }
}

// ==================== Program ====================

/// A complete program (compilation unit)
#[derive(Debug, Clone, Default)]
pub struct Program {
    pub stmts: Vec<Stmt>,
}

/// Identifier with its location
#[derive(Debug, Clone, PartialEq)]
pub struct Ident {
    pub name: String,
    pub span: Span,
}

impl Ident {
    pub fn new(name: impl Into<String>, span: Span) -> Self {
        Self { name: name.into(), span }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub enum Visibility {
    Public,
    Private,
}

// ==================== Statements ====================

/// Statement
#[derive(Debug, Clone)]
pub enum Stmt {
    Class(ClassStmt),
    Function(FunctionStmt),
    Expression(Expr),
    If(IfStmt),
    /// output e, ...
    Output { exprs: Vec<Expr>, span: Span },
    /// input t, ...
    Input { exprs: Vec<Expr>, span: Span },
    /// return [e]
    Return { value: Option<Expr>, span: Span },
    /// loop i from a to b
    LoopFrom {
        variable: LoopVariable,
        from: Expr,
        to: Expr,
        body: Block,
        span: Span,
    },
    /// loop while c / loop until c
    While { condition: Expr, body: Block, span: Span },
    Break { span: Span },
    Continue { span: Span },
    Exit { span: Span },
    /// a = 1, b = 2
    MultiSet { sets: Vec<SetStmt>, span: Span },
    Set(SetStmt),
}

/// Code block with its own scope
#[derive(Debug, Clone)]
pub struct Block {
    pub stmts: Vec<Stmt>,
    pub scope: Slot<ScopeId>,
    pub span: Span,
}

impl Block {
    pub fn new(stmts: Vec<Stmt>, span: Span) -> Self {
        Self { stmts, scope: Slot::Unresolved, span }
    }
}

#[derive(Debug, Clone)]
pub struct ElseIf {
    pub condition: Expr,
    pub block: Block,
}

#[derive(Debug, Clone)]
pub struct IfStmt {
    pub condition: Expr,
    pub then_branch: Block,
    pub else_ifs: Vec<ElseIf>,
    pub else_branch: Option<Block>,
    pub span: Span,
}

/// Loop counter of `loop i from a to b`
#[derive(Debug, Clone)]
pub struct LoopVariable {
    pub name: Ident,
    pub symbol: Slot<SymbolId>,
}

/// `left [= chained]* = value`
#[derive(Debug, Clone)]
pub struct SetStmt {
    pub left: Expr,
    pub chained: Vec<Expr>,
    pub value: Expr,
    pub span: Span,
}

/// Function definition (also the body of a method)
#[derive(Debug, Clone)]
pub struct FunctionStmt {
    pub name: Ident,
    pub params: Vec<FunctionParam>,
    /// Declared return type; `None` means void
    pub annotation: Option<AstType>,
    pub body: Vec<Stmt>,
    /// Span of `end function`, used for implicit returns
    pub end_span: Span,
    pub symbol: Slot<SymbolId>,
    /// The `#FuncName#` overload set this function belongs to
    pub name_symbol: Slot<SymbolId>,
    pub scope: Slot<ScopeId>,
    /// Span of the signature line
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct FunctionParam {
    pub name: Ident,
    /// `None` means any
    pub annotation: Option<AstType>,
    pub initializer: Option<Expr>,
    pub symbol: Slot<SymbolId>,
}

#[derive(Debug, Clone)]
pub struct MethodStmt {
    pub is_static: bool,
    pub static_span: Option<Span>,
    pub visibility: Visibility,
    pub function: FunctionStmt,
}

#[derive(Debug, Clone)]
pub struct ClassField {
    pub name: Ident,
    pub is_static: bool,
    pub visibility: Visibility,
    pub annotation: AstType,
    pub initializer: Option<Expr>,
    pub symbol: Slot<SymbolId>,
}

#[derive(Debug, Clone)]
pub struct ClassStmt {
    pub name: Ident,
    pub template_params: Vec<Ident>,
    pub superclass: Option<AstType>,
    pub methods: Vec<MethodStmt>,
    pub fields: Vec<ClassField>,
    pub symbol: Slot<SymbolId>,
    pub instance_this: Slot<SymbolId>,
    pub static_this: Slot<SymbolId>,
    pub scope: Slot<ScopeId>,
    pub span: Span,
}

// ==================== Expressions ====================

/// Expression node. `ty` is filled by the type checker.
#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    pub ty: Slot<Type>,
    pub span: Span,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self { kind, ty: Slot::Unresolved, span }
    }

    /// The checked type, `Error` if the node was never typed
    pub fn ty(&self) -> Type {
        self.ty.get().cloned().unwrap_or_else(Type::error)
    }
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    Grouping(Box<Expr>),
    Literal(LiteralValue),
    ArrayLiteral(Vec<Expr>),
    /// `Name` in `Name.member`
    StaticClassRef { class: AstType, class_id: Slot<SymbolId> },
    This { symbol: Slot<SymbolId> },
    /// `super.property`
    Super {
        property: Ident,
        super_class: Slot<SymbolId>,
        property_id: Slot<SymbolId>,
    },
    Variable { name: Ident, symbol: Slot<SymbolId> },
    Subscript { expr: Box<Expr>, index: Box<Expr> },
    Call(CallExpr),
    Get {
        object: Box<Expr>,
        property: Ident,
        property_id: Slot<SymbolId>,
    },
    Unary { op: UnaryOp, operand: Box<Expr> },
    /// `(type) value`
    Cast { target: AstType, value: Box<Expr> },
    /// `new T[n][m]`; `array_type` is the resulting `[[T]]`
    ArrayAllocation { array_type: AstType, capacities: Vec<Expr> },
    /// `new C(args)`
    ClassAllocation {
        class: AstType,
        args: Vec<Expr>,
        target: Slot<SymbolId>,
    },
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
    Logical {
        left: Box<Expr>,
        op: LogicalOp,
        right: Box<Expr>,
    },
    /// Left side of a set statement naming a plain variable
    VariableToSet {
        name: Ident,
        annotation: Option<AstType>,
        symbol: Slot<SymbolId>,
        /// Whether this assignment declares the variable
        first: Slot<bool>,
    },
    IsType {
        left: Box<Expr>,
        right: AstType,
        right_type: Slot<Type>,
    },
    /// Inserted by the type checker around converted values
    ImplicitCast(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum LiteralValue {
    Int(i64),
    Double(f64),
    Bool(bool),
    String(String),
}

/// Receiver shape of a call
#[derive(Debug, Clone)]
pub enum Callee {
    /// `f(args)`
    Free,
    /// `object.f(args)` or `Class.f(args)`
    Object(Box<Expr>),
    /// `super.f(args)`
    Super,
    /// `super(args)`
    SuperConstructor,
}

#[derive(Debug, Clone)]
pub struct CallExpr {
    pub callee: Callee,
    pub name: Ident,
    pub args: Vec<Expr>,
    pub target: Slot<CallTarget>,
}

/// Resolved target of a call
#[derive(Debug, Clone, PartialEq)]
pub enum CallTarget {
    Unique(SymbolId),
    /// Class symbol id of the receiver's dynamic class to the method that runs
    Polymorphic(BTreeMap<SymbolId, SymbolId>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    /// `/`
    Div,
    /// `div`
    IntDiv,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinaryOp {
    pub fn is_comparison(self) -> bool {
        matches!(self, BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge)
    }

    pub fn is_equality(self) -> bool {
        matches!(self, BinaryOp::Eq | BinaryOp::Ne)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            UnaryOp::Neg => "-",
            UnaryOp::Not => "not",
        })
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::IntDiv => "div",
            BinaryOp::Mod => "mod",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
        })
    }
}

impl fmt::Display for LogicalOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogicalOp::And => "and",
            LogicalOp::Or => "or",
        })
    }
}

// ==================== Type annotations ====================

/// Type annotation as written in source
#[derive(Debug, Clone)]
pub enum AstType {
    Int(Span),
    Double(Span),
    Boolean(Span),
    Any(Span),
    Array { elem: Box<AstType>, span: Span },
    Class { name: String, args: Vec<AstType>, span: Span },
    /// Template parameter `T` of the class `class`
    TemplateParam { name: String, class: String, span: Span },
}

impl AstType {
    pub fn span(&self) -> Span {
        match self {
            AstType::Int(span)
            | AstType::Double(span)
            | AstType::Boolean(span)
            | AstType::Any(span)
            | AstType::Array { span, .. }
            | AstType::Class { span, .. }
            | AstType::TemplateParam { span, .. } => *span,
        }
    }

    /// Root-scope name of a class type, e.g. `Box<int>` or `String<>`
    pub fn class_signature(name: &str, args: &[AstType]) -> String {
        let args: Vec<String> = args.iter().map(|arg| arg.to_string()).collect();
        format!("{}<{}>", name, args.join(", "))
    }
}

impl PartialEq for AstType {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (AstType::Int(_), AstType::Int(_))
            | (AstType::Double(_), AstType::Double(_))
            | (AstType::Boolean(_), AstType::Boolean(_))
            | (AstType::Any(_), AstType::Any(_)) => true,
            (AstType::Array { elem: a, .. }, AstType::Array { elem: b, .. }) => a == b,
            (
                AstType::Class { name: a, args: a_args, .. },
                AstType::Class { name: b, args: b_args, .. },
            ) => a == b && a_args == b_args,
            (
                AstType::TemplateParam { name: a, class: a_class, .. },
                AstType::TemplateParam { name: b, class: b_class, .. },
            ) => a == b && a_class == b_class,
            _ => false,
        }
    }
}

impl Eq for AstType {}

impl Hash for AstType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            AstType::Array { elem, .. } => elem.hash(state),
            AstType::Class { name, args, .. } => {
                name.hash(state);
                args.hash(state);
            }
            AstType::TemplateParam { name, class, .. } => {
                name.hash(state);
                class.hash(state);
            }
            _ => {}
        }
    }
}

impl fmt::Display for AstType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AstType::Int(_) => write!(f, "int"),
            AstType::Double(_) => write!(f, "double"),
            AstType::Boolean(_) => write!(f, "boolean"),
            AstType::Any(_) => write!(f, "any"),
            AstType::Array { elem, .. } => write!(f, "[{}]", elem),
            AstType::Class { name, args, .. } if args.is_empty() => write!(f, "{}", name),
            AstType::Class { name, args, .. } => write!(f, "{}", AstType::class_signature(name, args)),
            AstType::TemplateParam { name, .. } => write!(f, "{}", name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;

    fn hash_of(ty: &AstType) -> u64 {
        let mut hasher = DefaultHasher::new();
        ty.hash(&mut hasher);
        hasher.finish()
    }

    fn class(name: &str, args: Vec<AstType>, at: usize) -> AstType {
        AstType::Class { name: name.to_string(), args, span: Span::new(at, at + 1, 0) }
    }

    #[test]
    fn test_ast_type_equality_ignores_spans() {
        let a = AstType::Array {
            elem: Box::new(class("Box", vec![AstType::Int(Span::new(1, 2, 0))], 0)),
            span: Span::new(0, 9, 0),
        };
        let b = AstType::Array {
            elem: Box::new(class("Box", vec![AstType::Int(Span::new(7, 8, 0))], 5)),
            span: Span::new(5, 15, 0),
        };
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));

        let c = class("Box", vec![AstType::Double(Span::dummy())], 0);
        assert_ne!(class("Box", vec![AstType::Int(Span::dummy())], 0), c);
    }

    #[test]
    fn test_class_signature() {
        assert_eq!(AstType::class_signature("String", &[]), "String<>");
        let args = [AstType::Int(Span::dummy()), class("String", vec![], 0)];
        assert_eq!(AstType::class_signature("Pair", &args), "Pair<int, String>");
    }

    #[test]
    fn test_slot() {
        let mut slot: Slot<u32> = Slot::default();
        assert!(!slot.is_resolved());
        slot.set(4);
        assert_eq!(slot.id(), Some(4));
    }
}
