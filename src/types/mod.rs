//! Type System module

pub mod type_system;

pub use type_system::{common_type, resolve_ast_type, ClassChain, ClassRegistry, Type, TypeKind};
