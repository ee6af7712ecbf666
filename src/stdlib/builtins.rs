//! Built-in classes
//!
//! Defines the classes every Quasicode program can use without declaring
//! them. They are registered into the root scope before name resolution.

use crate::semantic::symbol::{
    func_name_key, ClassInfo, FunctionInfo, FunctionNameInfo, MethodInfo, MethodSpans, Symbol, SymbolKind,
};
use crate::semantic::{ScopeId, SymbolId, SymbolTable};
use crate::frontend::ast::Visibility;
use crate::types::Type;
use crate::utils::Span;

pub const STRING_CLASS: &str = "String";

/// Class names the parser must know before user classes are scanned
pub const BUILTIN_CLASS_NAMES: &[&str] = &[STRING_CLASS];

/// Parameter and return types a builtin method can use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BuiltinType {
    Int,
    Double,
    Boolean,
    IntArray,
    String,
}

impl BuiltinType {
    fn to_type(self, string: &Type) -> Type {
        match self {
            BuiltinType::Int => Type::int(),
            BuiltinType::Double => Type::double(),
            BuiltinType::Boolean => Type::boolean(),
            BuiltinType::IntArray => Type::array(Type::int()),
            BuiltinType::String => string.clone(),
        }
    }
}

/// Built-in method signature
#[derive(Debug, Clone, Copy)]
struct BuiltinMethod {
    name: &'static str,
    params: &'static [BuiltinType],
    /// Arguments before the first optional one
    required: usize,
    ret: BuiltinType,
    is_static: bool,
}

impl BuiltinMethod {
    const fn instance(name: &'static str, params: &'static [BuiltinType], ret: BuiltinType) -> Self {
        Self { name, params, required: params.len(), ret, is_static: false }
    }

    const fn class(name: &'static str, params: &'static [BuiltinType], ret: BuiltinType) -> Self {
        Self { name, params, required: params.len(), ret, is_static: true }
    }
}

use BuiltinType::{Boolean, Double, Int, IntArray, String as Str};

const STRING_METHODS: &[BuiltinMethod] = &[
    BuiltinMethod::instance("charAt", &[Int], Str),
    BuiltinMethod::instance("codePointAt", &[Int], Int),
    BuiltinMethod::instance("length", &[], Int),
    BuiltinMethod::instance("contains", &[Str], Boolean),
    BuiltinMethod::instance("indexOf", &[Str], Int),
    // substring(begin[, end])
    BuiltinMethod { name: "substring", params: &[Int, Int], required: 1, ret: Str, is_static: false },
    BuiltinMethod::instance("toLowerCase", &[], Str),
    BuiltinMethod::instance("toUpperCase", &[], Str),
    BuiltinMethod::instance("replace", &[Str, Str], Str),
    BuiltinMethod::class("fromCharCode", &[Int], Str),
    BuiltinMethod::class("fromCharCodes", &[IntArray], Str),
    BuiltinMethod::class("valueOf", &[Int], Str),
    BuiltinMethod::class("valueOf", &[Double], Str),
];

/// Declare every builtin class into the root scope of `table`.
/// Returns the id of the `String` class.
pub fn register_builtins(table: &mut SymbolTable) -> SymbolId {
    let span = Span::dummy();
    table.declare(ScopeId::ROOT, Symbol::new(STRING_CLASS, span, SymbolKind::ClassName { builtin: true }));
    let scope = table.create_scope(ScopeId::ROOT);
    let signature = format!("{}<>", STRING_CLASS);
    let class = table.declare(
        ScopeId::ROOT,
        Symbol::new(signature, span, SymbolKind::Class(ClassInfo::new(STRING_CLASS, true, scope))),
    );
    let string = Type::class(STRING_CLASS, class);

    for method in STRING_METHODS {
        register_method(table, class, scope, &string, method);
    }
    log::debug!("registered builtin class '{}' with {} methods", STRING_CLASS, STRING_METHODS.len());
    class
}

fn register_method(table: &mut SymbolTable, class: SymbolId, scope: ScopeId, string: &Type, method: &BuiltinMethod) {
    let param_types: Vec<Type> = method.params.iter().map(|param| param.to_type(string)).collect();
    let params: Vec<String> = param_types.iter().map(|ty| ty.to_string()).collect();
    let signature = format!("{}({})", method.name, params.join(", "));

    let info = MethodInfo {
        function: FunctionInfo {
            return_type: method.ret.to_type(string),
            min_args: method.required,
            max_args: param_types.len(),
            param_types,
        },
        within_class: class,
        is_static: method.is_static,
        visibility: Visibility::Public,
        is_constructor: false,
        overrided_by: Vec::new(),
        finished_init: true,
        spans: MethodSpans::default(),
    };
    let id = table.declare(scope, Symbol::new(signature, Span::dummy(), SymbolKind::Method(info)));

    let key = func_name_key(method.name);
    let set = match table.lookup_local(scope, &key) {
        Some(set) => set,
        None => {
            let info = FunctionNameInfo { is_for_methods: true, belonging_functions: Vec::new() };
            table.declare(scope, Symbol::new(key, Span::dummy(), SymbolKind::FunctionName(info)))
        }
    };
    if let SymbolKind::FunctionName(info) = &mut table.get_mut(set).kind {
        info.belonging_functions.push(id);
    }
    if let Some(info) = table.get_mut(class).as_class_mut() {
        info.methods.push(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ClassRegistry;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_string_is_registered() {
        let mut table = SymbolTable::new();
        let class = register_builtins(&mut table);
        assert_eq!(table.class_by_signature("String<>"), Some(class));

        let name = table.lookup_root(STRING_CLASS).unwrap();
        assert!(matches!(table.get(name).kind, SymbolKind::ClassName { builtin: true }));

        let info = table.get(class).as_class().unwrap();
        assert!(info.builtin);
        assert_eq!(info.methods.len(), STRING_METHODS.len());
    }

    #[test]
    fn test_overloads_and_optional_arguments() {
        let mut table = SymbolTable::new();
        let class = register_builtins(&mut table);
        let scope = table.get(class).as_class().unwrap().class_scope;

        let value_of = table.collect_overload_set(scope, "valueOf");
        assert_eq!(value_of.len(), 2);
        assert!(value_of.iter().all(|id| table.get(*id).as_method().unwrap().is_static));

        let substring = table.lookup_local(scope, "substring(int, int)").unwrap();
        let info = table.get(substring).as_function().unwrap();
        assert!(info.accepts(1));
        assert!(info.accepts(2));
        assert!(!info.accepts(0));
        assert!(!info.accepts(3));
        assert_eq!(info.return_type.to_string(), "String");
    }
}
