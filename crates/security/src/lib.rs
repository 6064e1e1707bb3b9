//! Security module for devloop: keeping tool side effects inside the
//! active project root.
//!
//! Provides:
//! - **Path validation**: resolve model-supplied relative paths and reject
//!   absolute paths, `..` escapes and symlink escapes

pub mod path;

pub use path::{PathValidationError, resolve_within};
