//! Standard library for Quasicode

pub mod builtins;

pub use builtins::{register_builtins, BUILTIN_CLASS_NAMES};
