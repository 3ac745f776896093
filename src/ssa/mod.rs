//! Static single assignment IR
//!
//! - `ir` — the data model: programs, modules, symbols, blocks, steps,
//!   operands and typed values
//! - `build` — lowering from completed HLIR modules
//! - `opt` — fixed-point constant folding and dead-code removal

mod build;
mod ir;
mod opt;

pub use build::{lower_modules, ModuleSet};
pub use ir::{
    BlockId, DepMap, Operand, SsaBlock, SsaLocal, SsaModule, SsaOp, SsaParam, SsaProgram,
    SsaStep, SsaSymbol, SsaType, SsaValue, SymbolId, ValuePayload,
};
pub use opt::{optimize, OptOptions};
