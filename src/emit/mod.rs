//! Code emission
//!
//! - `io` — the filesystem seam and its in-memory/on-disk backings
//! - `types` — C89 type rendering
//! - `c89` — the three-pass C89 emitter

mod c89;
mod io;
mod types;

pub use c89::{emit_c89, EmitOptions, EmitResult, PathLayout};
pub use io::{DiskFs, FileHandle, Filesystem, MemoryFs};
pub use types::{format_params, format_type};
