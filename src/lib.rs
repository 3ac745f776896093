//! Cthulhu compiler core
//!
//! The middle of a multi-front-end compiler: front ends hand the core a set
//! of typed HLIR modules, and the core lowers them through SSA to C89
//! source text.
//!
//! # Architecture
//!
//! ```text
//! HLIR module set → ssa::build → SSA + dep map → ssa::opt → emit::c89 → filesystem
//! ```
//!
//! # Example
//!
//! ```
//! use cthulhu::common::Node;
//! use cthulhu::diagnostics::Reporter;
//! use cthulhu::emit::MemoryFs;
//! use cthulhu::hlir::{Attributes, HlirArena};
//! use cthulhu::ops::{Digit, Linkage, Sign, Visibility};
//! use cthulhu::ssa::ModuleSet;
//!
//! let mut hlir = HlirArena::new();
//! let node = Node::builtin();
//! let int = hlir.type_digit(node, "int", Digit::Int, Sign::Signed);
//! let five = hlir.int_literal(node, int, 5);
//! let answer = hlir.global(node, "answer", int, Some(five));
//! hlir.set_attributes(answer, Attributes::new(Linkage::Export, Visibility::Public));
//! let module = hlir.module(node, "demo", vec![], vec![answer], vec![]);
//!
//! let mut modules = ModuleSet::new();
//! modules.insert("demo".into(), module);
//!
//! let mut reports = Reporter::new();
//! let mut fs = MemoryFs::new();
//! let result = cthulhu::compile(
//!     &hlir,
//!     &modules,
//!     &mut reports,
//!     &mut fs,
//!     &cthulhu::CompileOptions::default(),
//! )
//! .unwrap();
//! assert_eq!(result.sources, vec!["src/demo.c".to_string()]);
//! ```

pub mod common;
pub mod diagnostics;
pub mod emit;
pub mod hlir;
pub mod mangle;
pub mod ops;
pub mod ssa;

// Re-exports for convenience
pub use diagnostics::{CompileError, Reporter, Severity};
pub use emit::{EmitOptions, EmitResult};
pub use hlir::HlirArena;
pub use ssa::{OptOptions, SsaProgram};

/// Compiler version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Everything the pipeline driver can be told
#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    pub opt: OptOptions,
    pub emit: EmitOptions,
}

fn pass_boundary(reports: &Reporter, pass: &str) -> miette::Result<()> {
    tracing::info!(
        pass,
        fatal = reports.fatal_count(),
        warnings = reports.warning_count(),
        "pass finished"
    );
    if reports.has_fatal() {
        return Err(miette::miette!(
            "{} fatal diagnostics after {pass}",
            reports.fatal_count()
        ));
    }
    Ok(())
}

/// Validate, lower, optimise and emit a completed HLIR module set.
///
/// Each pass runs to completion; the driver checks the report sink at every
/// pass boundary and stops before the next pass once anything fatal has
/// been pushed.
pub fn compile(
    hlir: &HlirArena,
    modules: &ssa::ModuleSet,
    reports: &mut Reporter,
    fs: &mut dyn emit::Filesystem,
    options: &CompileOptions,
) -> miette::Result<EmitResult> {
    for &module in modules.values() {
        hlir::validate_module(hlir, module, reports);
    }
    pass_boundary(reports, "validate")?;

    let mut program = ssa::lower_modules(hlir, modules, reports);
    pass_boundary(reports, "lower")?;

    ssa::optimize(&mut program, reports, &options.opt);
    pass_boundary(reports, "optimize")?;

    let result = emit::emit_c89(&program, fs, reports, &options.emit);
    let result = match result {
        Ok(result) => result,
        Err(error) => {
            reports.error(error.clone());
            return Err(miette::Report::new(error));
        }
    };
    pass_boundary(reports, "emit")?;

    Ok(result)
}

/// Lower and optimise without emitting; useful for inspecting the SSA
pub fn lower(
    hlir: &HlirArena,
    modules: &ssa::ModuleSet,
    reports: &mut Reporter,
    options: &CompileOptions,
) -> miette::Result<SsaProgram> {
    for &module in modules.values() {
        hlir::validate_module(hlir, module, reports);
    }
    pass_boundary(reports, "validate")?;

    let mut program = ssa::lower_modules(hlir, modules, reports);
    pass_boundary(reports, "lower")?;

    ssa::optimize(&mut program, reports, &options.opt);
    pass_boundary(reports, "optimize")?;

    Ok(program)
}
