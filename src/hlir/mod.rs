//! High-Level IR (HLIR)
//!
//! A typed, tree-shaped IR that keeps source structure. Front ends build it
//! through the [`HlirArena`] construction API, register names through the
//! scope [`SymbolTable`], and hand completed modules to the SSA builder.
//!
//! - `ir` — node definitions
//! - `build` — constructors and the forward/build declaration protocol
//! - `query` — information queries and structural type equality
//! - `scope` — tag-keyed symbol tables and scope chains
//! - `validate` — pre-lowering contract checks

mod build;
mod ir;
mod query;
mod scope;
mod validate;

pub use build::HlirArena;
pub use ir::{Attributes, Decl, Hlir, HlirId, HlirKind, HlirTag, Partial, Signature};
pub use scope::{close_function, SymbolTable, Tag};
pub use validate::validate_module;
