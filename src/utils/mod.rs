//! Utility module

mod span;
mod error;

pub use span::{LineIndex, Span};
pub use error::{Error, Phase, Result};
