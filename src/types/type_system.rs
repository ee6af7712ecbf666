//! Type System for Quasicode
//!
//! [`Type`] is the checked type of an expression or symbol. Equality and
//! hashing are structural and ignore the per-occurrence `assignable` flag.

use crate::frontend::ast::AstType;
use crate::semantic::SymbolId;
use crate::utils::{Error, Result};
use serde::{Serialize, Serializer};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Resolved type (after type checking)
#[derive(Debug, Clone)]
pub struct Type {
    pub kind: TypeKind,
    /// Whether the expression denotes a storage location
    pub assignable: bool,
}

#[derive(Debug, Clone)]
pub enum TypeKind {
    Int,
    Double,
    Boolean,
    Any,
    Void,
    /// Already reported; silences further diagnostics
    Error,
    Array(Box<Type>),
    Class { name: String, id: SymbolId },
}

impl Type {
    pub fn new(kind: TypeKind) -> Self {
        Self { kind, assignable: false }
    }

    pub fn int() -> Self {
        Self::new(TypeKind::Int)
    }

    pub fn double() -> Self {
        Self::new(TypeKind::Double)
    }

    pub fn boolean() -> Self {
        Self::new(TypeKind::Boolean)
    }

    pub fn any() -> Self {
        Self::new(TypeKind::Any)
    }

    pub fn void() -> Self {
        Self::new(TypeKind::Void)
    }

    pub fn error() -> Self {
        Self::new(TypeKind::Error)
    }

    pub fn array(elem: Type) -> Self {
        Self::new(TypeKind::Array(Box::new(elem.with_assignable(false))))
    }

    pub fn class(name: impl Into<String>, id: SymbolId) -> Self {
        Self::new(TypeKind::Class { name: name.into(), id })
    }

    /// Same shape with a different `assignable` flag
    pub fn with_assignable(mut self, assignable: bool) -> Self {
        self.assignable = assignable;
        self
    }

    pub fn is_error(&self) -> bool {
        matches!(self.kind, TypeKind::Error)
    }

    pub fn is_void(&self) -> bool {
        matches!(self.kind, TypeKind::Void)
    }

    pub fn is_any(&self) -> bool {
        matches!(self.kind, TypeKind::Any)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self.kind, TypeKind::Int | TypeKind::Double)
    }

    /// int, double or boolean
    pub fn is_native(&self) -> bool {
        matches!(self.kind, TypeKind::Int | TypeKind::Double | TypeKind::Boolean)
    }

    pub fn class_id(&self) -> Option<SymbolId> {
        match &self.kind {
            TypeKind::Class { id, .. } => Some(*id),
            _ => None,
        }
    }

    pub fn element(&self) -> Option<&Type> {
        match &self.kind {
            TypeKind::Array(elem) => Some(elem),
            _ => None,
        }
    }

    /// Equality for checks: an `Error` never matches anything
    pub fn matches(&self, other: &Type) -> bool {
        !self.is_error() && !other.is_error() && self == other
    }
}

impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
    }
}

impl Eq for Type {}

impl Hash for Type {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind.hash(state);
    }
}

impl PartialEq for TypeKind {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (TypeKind::Array(a), TypeKind::Array(b)) => a == b,
            (TypeKind::Class { id: a, .. }, TypeKind::Class { id: b, .. }) => a == b,
            (a, b) => std::mem::discriminant(a) == std::mem::discriminant(b),
        }
    }
}

impl Eq for TypeKind {}

impl Hash for TypeKind {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            TypeKind::Array(elem) => elem.hash(state),
            TypeKind::Class { id, .. } => id.hash(state),
            _ => {}
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            TypeKind::Int => write!(f, "int"),
            TypeKind::Double => write!(f, "double"),
            TypeKind::Boolean => write!(f, "boolean"),
            TypeKind::Any => write!(f, "any"),
            TypeKind::Void => write!(f, "<Void>"),
            TypeKind::Error => write!(f, "<Error>"),
            TypeKind::Array(elem) => write!(f, "[{}]", elem),
            TypeKind::Class { name, .. } => write!(f, "{}", name),
        }
    }
}

impl Serialize for Type {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

// ==================== Class Chains ====================

/// Inheritance facts about one class
#[derive(Debug, Clone)]
pub struct ClassChain {
    pub name: String,
    pub depth: usize,
    pub upper_class: Option<SymbolId>,
}

/// Class information the type algorithms need from the symbol table
pub trait ClassRegistry {
    /// Root-scope class symbol for a signature such as `String<>`
    fn class_by_signature(&self, signature: &str) -> Option<SymbolId>;

    /// `None` if `id` is not a class
    fn class_chain(&self, id: SymbolId) -> Option<ClassChain>;
}

/// Least upper bound of two types. Total and commutative.
pub fn common_type(a: &Type, b: &Type, classes: &impl ClassRegistry) -> Type {
    if a.is_error() || b.is_error() {
        return Type::error();
    }
    if a.is_void() || b.is_void() {
        return Type::void();
    }
    if a == b {
        return a.clone().with_assignable(false);
    }
    if a.is_any() || b.is_any() {
        return Type::any();
    }

    match (&a.kind, &b.kind) {
        (_, _) if a.is_native() || b.is_native() => {
            if !(a.is_native() && b.is_native()) {
                return Type::any();
            }
            // Two different natives: only int and double meet below any
            if matches!(a.kind, TypeKind::Boolean) || matches!(b.kind, TypeKind::Boolean) {
                Type::any()
            } else {
                Type::double()
            }
        }
        (TypeKind::Array(x), TypeKind::Array(y)) => Type::array(common_type(x, y, classes)),
        (TypeKind::Class { id: x, .. }, TypeKind::Class { id: y, .. }) => {
            common_ancestor(*x, *y, classes).unwrap_or_else(Type::any)
        }
        _ => Type::any(),
    }
}

fn common_ancestor(a: SymbolId, b: SymbolId, classes: &impl ClassRegistry) -> Option<Type> {
    let (mut a_id, mut a_chain) = (a, classes.class_chain(a)?);
    let (mut b_id, mut b_chain) = (b, classes.class_chain(b)?);
    if a_chain.depth < b_chain.depth {
        std::mem::swap(&mut a_id, &mut b_id);
        std::mem::swap(&mut a_chain, &mut b_chain);
    }

    while a_chain.depth > b_chain.depth {
        a_id = a_chain.upper_class?;
        a_chain = classes.class_chain(a_id)?;
    }
    debug_assert_eq!(a_chain.depth, b_chain.depth);

    while a_id != b_id {
        a_id = a_chain.upper_class?;
        b_id = b_chain.upper_class?;
        a_chain = classes.class_chain(a_id)?;
        b_chain = classes.class_chain(b_id)?;
    }
    Some(Type::class(a_chain.name, a_id))
}

/// Resolve a written annotation. Unknown classes are an error; the caller
/// reports it and continues with [`Type::error`].
pub fn resolve_ast_type(ty: &AstType, classes: &impl ClassRegistry) -> Result<Type> {
    match ty {
        AstType::Int(_) => Ok(Type::int()),
        AstType::Double(_) => Ok(Type::double()),
        AstType::Boolean(_) => Ok(Type::boolean()),
        AstType::Any(_) => Ok(Type::any()),
        AstType::Array { elem, .. } => Ok(Type::array(resolve_ast_type(elem, classes)?)),
        AstType::Class { name, args, span } => {
            let signature = AstType::class_signature(name, args);
            match classes.class_by_signature(&signature) {
                Some(id) => Ok(Type::class(ty.to_string(), id)),
                None => Err(Error::UnknownType { name: ty.to_string(), span: *span }),
            }
        }
        AstType::TemplateParam { name, span, .. } => {
            // Bodies of template classes are never resolved
            debug_assert!(false, "template parameter '{}' outside an instantiation", name);
            Err(Error::UnknownType { name: name.clone(), span: *span })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::Span;
    use pretty_assertions::assert_eq;
    use std::collections::hash_map::DefaultHasher;
    use std::collections::HashMap;

    /// Animal(1) <- Dog(2), Animal(1) <- Cat(3), Puppy(4) extends Dog, Rock(5)
    struct Zoo(HashMap<SymbolId, ClassChain>);

    impl Zoo {
        fn new() -> Self {
            let mut map = HashMap::new();
            let mut add = |id: usize, name: &str, depth: usize, upper: Option<usize>| {
                map.insert(
                    SymbolId(id),
                    ClassChain { name: name.to_string(), depth, upper_class: upper.map(SymbolId) },
                );
            };
            add(1, "Animal", 1, None);
            add(2, "Dog", 2, Some(1));
            add(3, "Cat", 2, Some(1));
            add(4, "Puppy", 3, Some(2));
            add(5, "Rock", 1, None);
            Self(map)
        }

        fn ty(&self, id: usize) -> Type {
            Type::class(self.0[&SymbolId(id)].name.clone(), SymbolId(id))
        }
    }

    impl ClassRegistry for Zoo {
        fn class_by_signature(&self, signature: &str) -> Option<SymbolId> {
            self.0
                .iter()
                .find(|(_, chain)| format!("{}<>", chain.name) == signature)
                .map(|(id, _)| *id)
        }

        fn class_chain(&self, id: SymbolId) -> Option<ClassChain> {
            self.0.get(&id).cloned()
        }
    }

    fn hash_of(ty: &Type) -> u64 {
        let mut hasher = DefaultHasher::new();
        ty.hash(&mut hasher);
        hasher.finish()
    }

    fn samples(zoo: &Zoo) -> Vec<Type> {
        vec![
            Type::int(),
            Type::double(),
            Type::boolean(),
            Type::any(),
            Type::void(),
            Type::array(Type::int()),
            Type::array(Type::double()),
            Type::array(Type::array(zoo.ty(2))),
            zoo.ty(1),
            zoo.ty(2),
            zoo.ty(3),
            zoo.ty(4),
            zoo.ty(5),
        ]
    }

    #[test]
    fn test_common_type_is_commutative_and_idempotent() {
        let zoo = Zoo::new();
        let types = samples(&zoo);
        for a in &types {
            assert_eq!(&common_type(a, a, &zoo), a);
            for b in &types {
                assert_eq!(common_type(a, b, &zoo), common_type(b, a, &zoo), "{} vs {}", a, b);
            }
        }
    }

    #[test]
    fn test_common_type_rules() {
        let zoo = Zoo::new();
        let ct = |a: &Type, b: &Type| common_type(a, b, &zoo);

        assert_eq!(ct(&Type::int(), &Type::double()), Type::double());
        assert_eq!(ct(&Type::int(), &Type::boolean()), Type::any());
        assert_eq!(ct(&Type::int(), &zoo.ty(1)), Type::any());
        assert_eq!(ct(&Type::array(Type::int()), &Type::array(Type::double())), Type::array(Type::double()));
        assert_eq!(ct(&Type::array(Type::int()), &Type::int()), Type::any());
        assert_eq!(ct(&zoo.ty(4), &zoo.ty(3)), zoo.ty(1));
        assert_eq!(ct(&zoo.ty(4), &zoo.ty(2)), zoo.ty(2));
        assert_eq!(ct(&zoo.ty(2), &zoo.ty(5)), Type::any());
        assert!(ct(&Type::error(), &Type::void()).is_error());
        assert!(ct(&Type::void(), &Type::any()).is_void());
    }

    #[test]
    fn test_equality_and_hash_agree() {
        let zoo = Zoo::new();
        let types = samples(&zoo);
        for a in &types {
            let flipped = a.clone().with_assignable(!a.assignable);
            assert_eq!(a, &flipped);
            assert_eq!(hash_of(a), hash_of(&flipped));
            for b in &types {
                if a == b {
                    assert_eq!(hash_of(a), hash_of(b));
                }
            }
        }
        assert!(!Type::error().matches(&Type::error()));
        assert_eq!(Type::error(), Type::error());
    }

    #[test]
    fn test_resolve_ast_type() {
        let zoo = Zoo::new();
        let span = Span::new(0, 3, 0);
        let dog = AstType::Class { name: "Dog".into(), args: vec![], span };
        let arr = AstType::Array { elem: Box::new(dog), span };
        assert_eq!(resolve_ast_type(&arr, &zoo), Ok(Type::array(zoo.ty(2))));

        let missing = AstType::Class { name: "Box".into(), args: vec![AstType::Int(span)], span };
        let err = resolve_ast_type(&missing, &zoo).unwrap_err();
        assert_eq!(err.to_string(), "Cannot find type 'Box<int>' in scope");
    }

    #[test]
    fn test_display() {
        let zoo = Zoo::new();
        assert_eq!(Type::array(Type::array(zoo.ty(2))).to_string(), "[[Dog]]");
        assert_eq!(Type::void().to_string(), "<Void>");
    }
}
