//! Symbols stored in the [`SymbolTable`](super::SymbolTable)

use super::{ScopeId, SymbolId};
use crate::frontend::ast::Visibility;
use crate::types::Type;
use crate::utils::Span;
use serde::Serialize;

/// Prefix of the overload-set symbol for a function name
pub const FUNC_NAME_PREFIX: &str = "#FuncName#";
pub const INSTANCE_THIS: &str = "$Instance$this";
pub const STATIC_THIS: &str = "$Static$this";

pub fn func_name_key(name: &str) -> String {
    format!("{}{}", FUNC_NAME_PREFIX, name)
}

/// Symbol information
#[derive(Debug, Clone, Serialize)]
pub struct Symbol {
    pub id: SymbolId,
    /// Lookup key; signatures for functions and classes
    pub name: String,
    #[serde(skip)]
    pub span: Span,
    pub belongs_to: ScopeId,
    pub kind: SymbolKind,
}

impl Symbol {
    /// A symbol not yet placed in a table
    pub fn new(name: impl Into<String>, span: Span, kind: SymbolKind) -> Self {
        Self { id: SymbolId(0), name: name.into(), span, belongs_to: ScopeId(0), kind }
    }

    pub fn as_variable(&self) -> Option<&VariableInfo> {
        match &self.kind {
            SymbolKind::Variable(var) | SymbolKind::GlobalVariable { variable: var, .. } => Some(var),
            _ => None,
        }
    }

    pub fn as_variable_mut(&mut self) -> Option<&mut VariableInfo> {
        match &mut self.kind {
            SymbolKind::Variable(var) | SymbolKind::GlobalVariable { variable: var, .. } => Some(var),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&FunctionInfo> {
        match &self.kind {
            SymbolKind::Function(function) => Some(function),
            SymbolKind::Method(method) => Some(&method.function),
            _ => None,
        }
    }

    pub fn as_method(&self) -> Option<&MethodInfo> {
        match &self.kind {
            SymbolKind::Method(method) => Some(method),
            _ => None,
        }
    }

    pub fn as_method_mut(&mut self) -> Option<&mut MethodInfo> {
        match &mut self.kind {
            SymbolKind::Method(method) => Some(method),
            _ => None,
        }
    }

    pub fn as_class(&self) -> Option<&ClassInfo> {
        match &self.kind {
            SymbolKind::Class(class) => Some(class),
            _ => None,
        }
    }

    pub fn as_class_mut(&mut self) -> Option<&mut ClassInfo> {
        match &mut self.kind {
            SymbolKind::Class(class) => Some(class),
            _ => None,
        }
    }

    pub fn is_global(&self) -> bool {
        matches!(self.kind, SymbolKind::GlobalVariable { .. })
    }
}

/// Kind of symbol
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind")]
pub enum SymbolKind {
    Variable(VariableInfo),
    /// A top-level variable with the statement that defines it
    GlobalVariable { variable: VariableInfo, site: GlobalSite },
    Function(FunctionInfo),
    Method(MethodInfo),
    /// All functions sharing one name in one scope
    FunctionName(FunctionNameInfo),
    Class(ClassInfo),
    /// One per unmangled class name
    ClassName { builtin: bool },
}

// ==================== Variables ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum VariableStatus {
    Uninit,
    Initing,
    /// Being initialized by the global dependency walk
    GlobalIniting,
    /// Field whose class is still being set up
    FieldIniting,
    FinishedInit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum VariableKind {
    Global,
    Local,
    Instance,
    StaticVar,
}

#[derive(Debug, Clone, Serialize)]
pub struct VariableInfo {
    /// Filled by the type checker unless declared with a type
    pub ty: Option<Type>,
    pub status: VariableStatus,
    pub kind: VariableKind,
    pub visibility: Visibility,
}

impl VariableInfo {
    pub fn new(kind: VariableKind, status: VariableStatus) -> Self {
        Self { ty: None, status, kind, visibility: Visibility::Public }
    }

    pub fn typed(mut self, ty: Type) -> Self {
        self.ty = Some(ty);
        self
    }
}

/// Location of a global's defining set statement: `program.stmts[stmt]`,
/// and the index within a multi-set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct GlobalSite {
    pub stmt: usize,
    pub part: usize,
}

// ==================== Functions ====================

#[derive(Debug, Clone, Serialize)]
pub struct FunctionInfo {
    pub return_type: Type,
    pub param_types: Vec<Type>,
    /// Accepted argument counts; the lower bound is the first defaulted parameter
    pub min_args: usize,
    pub max_args: usize,
}

impl FunctionInfo {
    pub fn accepts(&self, count: usize) -> bool {
        (self.min_args..=self.max_args).contains(&count)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MethodSpans {
    pub name: Span,
    pub static_keyword: Option<Span>,
    pub annotation: Option<Span>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MethodInfo {
    pub function: FunctionInfo,
    pub within_class: SymbolId,
    pub is_static: bool,
    pub visibility: Visibility,
    pub is_constructor: bool,
    /// Every method in a subclass that overrides this one, at any depth
    pub overrided_by: Vec<SymbolId>,
    /// False while the owning class declares its fields; calls from field
    /// initializers are rejected until then
    pub finished_init: bool,
    #[serde(skip)]
    pub spans: MethodSpans,
}

#[derive(Debug, Clone, Serialize)]
pub struct FunctionNameInfo {
    pub is_for_methods: bool,
    pub belonging_functions: Vec<SymbolId>,
}

// ==================== Classes ====================

#[derive(Debug, Clone, Serialize)]
pub struct ClassInfo {
    pub display_name: String,
    pub non_signature_name: String,
    pub builtin: bool,
    pub class_scope: ScopeId,
    pub upper_class: Option<SymbolId>,
    /// Immediate subclasses
    pub parent_of: Vec<SymbolId>,
    /// Root classes have depth 1; `None` until the hierarchy is built
    pub depth: Option<usize>,
    /// Dense class-only index starting at 1
    pub runtime_id: usize,
    /// Methods in declaration order
    pub methods: Vec<SymbolId>,
    /// Fields in declaration order
    pub fields: Vec<SymbolId>,
}

impl ClassInfo {
    pub fn new(name: &str, builtin: bool, class_scope: ScopeId) -> Self {
        Self {
            display_name: name.to_string(),
            non_signature_name: name.to_string(),
            builtin,
            class_scope,
            upper_class: None,
            parent_of: Vec::new(),
            depth: None,
            runtime_id: 0,
            methods: Vec::new(),
            fields: Vec::new(),
        }
    }
}
