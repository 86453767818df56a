//! Name resolution: scopes, aliases, CTE visibility and script declarations.
//!
//! The resolver owns no AST. The analyzer drives it block by block, binding
//! sources into a frame before resolving the block's column references.

mod catalog;
mod scope;

pub use catalog::{CoupledSource, DeclaredTable, Declarations};
pub use scope::{
    ColumnBinding, ColumnLookupError, CteLookup, CteShape, DuplicateAlias, FrameId, ScopeArena,
    SourceBinding, SourceKind,
};
