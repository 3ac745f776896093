//! SSA optimisation
//!
//! Two passes run under a fixed-point driver: constant folding, which
//! evaluates steps whose operands are known and promotes fully-computed
//! global initialisers into symbol values, and optional dead-code removal.
//! A pass reports dirty when it changed the program; the driver re-runs
//! until nothing moves. Promotion is the only fold-side dirt, so the driver
//! converges in at most one iteration per symbol.

use super::ir::*;
use crate::diagnostics::{CompileError, Reporter};
use crate::ops::{BinaryOp, CompareOp, UnaryOp};
use num_bigint::BigInt;
use num_traits::{Signed, ToPrimitive, Zero};
use rustc_hash::{FxHashMap, FxHashSet};

#[derive(Debug, Clone)]
pub struct OptOptions {
    pub enable_dce: bool,
}

impl Default for OptOptions {
    fn default() -> Self {
        Self { enable_dce: true }
    }
}

/// Run folding (and optionally DCE) to a fixed point
pub fn optimize(program: &mut SsaProgram, reports: &mut Reporter, options: &OptOptions) {
    let mut run = 0usize;
    loop {
        let mut dirty = fold_pass(program, reports);
        if reports.has_fatal() {
            break;
        }
        if options.enable_dce {
            dirty |= dce_pass(program);
        }
        if !dirty {
            break;
        }
        run += 1;
        tracing::info!(run, "running full optimisation pass");
    }
}

//
// constant folding
//

fn fold_pass(program: &mut SsaProgram, reports: &mut Reporter) -> bool {
    let mut dirty = false;

    let modules: Vec<(Vec<SymbolId>, Vec<SymbolId>)> = program
        .modules
        .iter()
        .map(|module| (module.globals.clone(), module.functions.clone()))
        .collect();

    for (globals, functions) in modules {
        for id in globals {
            dirty |= fold_global(program, reports, id);
            if reports.has_fatal() {
                return dirty;
            }
        }
        for id in functions {
            fold_function(program, reports, id);
            if reports.has_fatal() {
                return dirty;
            }
        }
    }

    dirty
}

/// Per-pass map of step position to its known value
type ValueMap = FxHashMap<(usize, usize), SsaValue>;

enum Fold {
    Value(SsaValue),
    Unknown,
    Fatal,
}

fn fold_global(program: &mut SsaProgram, reports: &mut Reporter, id: SymbolId) -> bool {
    if program.symbols[id].value.is_some() {
        return false;
    }

    let mut values = ValueMap::default();
    let mut result = None;

    {
        let symbol = &program.symbols[id];
        'blocks: for (b, block) in symbol.blocks.iter().enumerate() {
            for (i, step) in block.steps.iter().enumerate() {
                if let SsaOp::Return { value } = &step.op {
                    result = operand_value(program, &values, value);
                    continue;
                }
                match fold_step(program, &values, step, reports) {
                    Fold::Value(value) => {
                        values.insert((b, i), value);
                    }
                    // an unfoldable step means the initialiser is not a
                    // constant yet; try again next pass
                    Fold::Unknown => {
                        result = None;
                        break 'blocks;
                    }
                    Fold::Fatal => return false,
                }
            }
        }
    }

    match result {
        Some(value) => {
            let symbol = &mut program.symbols[id];
            tracing::debug!(global = %symbol.name, "folded global");
            symbol.value = Some(value);
            symbol.blocks.clear();
            true
        }
        None => false,
    }
}

fn fold_function(program: &mut SsaProgram, reports: &mut Reporter, id: SymbolId) {
    let mut values = ValueMap::default();

    let symbol = &program.symbols[id];
    for (b, block) in symbol.blocks.iter().enumerate() {
        for (i, step) in block.steps.iter().enumerate() {
            match fold_step(program, &values, step, reports) {
                Fold::Value(value) => {
                    values.insert((b, i), value);
                }
                Fold::Unknown => {}
                Fold::Fatal => return,
            }
        }
    }
}

fn operand_value(program: &SsaProgram, values: &ValueMap, operand: &Operand) -> Option<SsaValue> {
    match operand {
        Operand::Imm(value) => Some(value.clone()),
        Operand::Reg { block, index } => values.get(&(block.0, *index)).cloned(),
        _ => None,
    }
}

fn fold_step(
    program: &SsaProgram,
    values: &ValueMap,
    step: &SsaStep,
    reports: &mut Reporter,
) -> Fold {
    match &step.op {
        SsaOp::Load { src: Operand::Global(global) } => {
            let symbol = program.symbol(*global);
            // only a never-written global may substitute its value
            match (&symbol.value, symbol.ty.is_const()) {
                (Some(value), true) => Fold::Value(value.clone()),
                _ => Fold::Unknown,
            }
        }

        SsaOp::Unary { op, operand } => match operand_value(program, values, operand) {
            Some(value) => fold_unary(*op, &value),
            None => Fold::Unknown,
        },

        SsaOp::Binary { op, lhs, rhs } => {
            let (Some(lhs), Some(rhs)) = (
                operand_value(program, values, lhs),
                operand_value(program, values, rhs),
            ) else {
                return Fold::Unknown;
            };
            fold_binary(*op, &lhs, &rhs, reports)
        }

        SsaOp::Compare { op, lhs, rhs } => {
            let (Some(lhs), Some(rhs)) = (
                operand_value(program, values, lhs),
                operand_value(program, values, rhs),
            ) else {
                return Fold::Unknown;
            };
            fold_compare(*op, &lhs, &rhs)
        }

        _ => Fold::Unknown,
    }
}

fn fold_unary(op: UnaryOp, value: &SsaValue) -> Fold {
    match value.ty.unqualified() {
        SsaType::Bool => {
            assert!(op == UnaryOp::Not, "only `not` is legal on bool");
            match value.as_bool() {
                Some(flag) => Fold::Value(SsaValue::bool_value(!flag)),
                None => Fold::Unknown,
            }
        }
        SsaType::Digit { .. } => {
            let Some(digit) = value.as_digit() else {
                return Fold::Unknown;
            };
            let folded = match op {
                UnaryOp::Abs => digit.abs(),
                UnaryOp::Neg => -digit,
                // two's complement: ~x == -(x + 1)
                UnaryOp::Flip => -(digit + BigInt::from(1)),
                UnaryOp::Not => panic!("`not` is not legal on digits"),
            };
            Fold::Value(SsaValue::digit(value.ty.clone(), folded))
        }
        other => panic!("cannot fold unary {} on {:?}", op.name(), other),
    }
}

fn fold_binary(op: BinaryOp, lhs: &SsaValue, rhs: &SsaValue, reports: &mut Reporter) -> Fold {
    let (Some(left), Some(right)) = (lhs.as_digit(), rhs.as_digit()) else {
        return Fold::Unknown;
    };

    let folded = match op {
        BinaryOp::Add => left + right,
        BinaryOp::Sub => left - right,
        BinaryOp::Mul => left * right,
        BinaryOp::Div | BinaryOp::Rem => {
            if right.is_zero() {
                reports.error(CompileError::DivideByZero {
                    node: crate::common::Node::builtin(),
                });
                return Fold::Fatal;
            }
            // BigInt division truncates toward zero, matching the digit rules
            if op == BinaryOp::Div { left / right } else { left % right }
        }
        BinaryOp::BitAnd => left & right,
        BinaryOp::BitOr => left | right,
        BinaryOp::Xor => left ^ right,
        BinaryOp::Shl | BinaryOp::Shr => {
            // the shift amount reads as unsigned
            let Some(shift) = right.magnitude().to_usize().filter(|&s| s <= 1 << 16) else {
                return Fold::Unknown;
            };
            if op == BinaryOp::Shl {
                left << shift
            } else {
                left >> shift
            }
        }
    };

    Fold::Value(SsaValue::digit(lhs.ty.clone(), folded))
}

fn fold_compare(op: CompareOp, lhs: &SsaValue, rhs: &SsaValue) -> Fold {
    if let (Some(left), Some(right)) = (lhs.as_digit(), rhs.as_digit()) {
        let flag = match op {
            CompareOp::Eq => left == right,
            CompareOp::Neq => left != right,
            CompareOp::Lt => left < right,
            CompareOp::Lte => left <= right,
            CompareOp::Gt => left > right,
            CompareOp::Gte => left >= right,
        };
        return Fold::Value(SsaValue::bool_value(flag));
    }

    if let (Some(left), Some(right)) = (lhs.as_bool(), rhs.as_bool()) {
        let flag = match op {
            CompareOp::Eq => left == right,
            CompareOp::Neq => left != right,
            _ => panic!("ordering compare on bool"),
        };
        return Fold::Value(SsaValue::bool_value(flag));
    }

    // strings fold only when both sides are the identical literal
    if let (ValuePayload::String(left), ValuePayload::String(right)) = (&lhs.payload, &rhs.payload)
        && left == right
    {
        let flag = match op {
            CompareOp::Eq => true,
            CompareOp::Neq => false,
            _ => return Fold::Unknown,
        };
        return Fold::Value(SsaValue::bool_value(flag));
    }

    Fold::Unknown
}

//
// dead-code removal
//

fn dce_pass(program: &mut SsaProgram) -> bool {
    let mut dirty = false;
    let ids: Vec<SymbolId> = program.all_symbols().collect();
    for id in ids {
        dirty |= dce_symbol(&mut program.symbols[id]);
    }
    dirty
}

fn dce_symbol(symbol: &mut SsaSymbol) -> bool {
    let mut removed_any = false;

    loop {
        let dead_stores = dead_stores(symbol);

        // mark
        let mut used: Vec<Vec<bool>> = symbol
            .blocks
            .iter()
            .map(|block| vec![false; block.steps.len()])
            .collect();
        let mut worklist = Vec::new();

        for (b, block) in symbol.blocks.iter().enumerate() {
            for (i, step) in block.steps.iter().enumerate() {
                let is_root = step.preserve
                    || step.op.is_terminator()
                    || matches!(step.op, SsaOp::Call { .. })
                    || (matches!(step.op, SsaOp::Store { .. }) && !dead_stores.contains(&(b, i)));
                if is_root {
                    used[b][i] = true;
                    worklist.push((b, i));
                }
            }
        }

        while let Some((b, i)) = worklist.pop() {
            for operand in symbol.blocks[b].steps[i].op.operands() {
                if let Operand::Reg { block, index } = operand
                    && !used[block.0][*index]
                {
                    used[block.0][*index] = true;
                    worklist.push((block.0, *index));
                }
            }
        }

        if used.iter().flatten().all(|&flag| flag) {
            break;
        }

        // sweep, remembering the renumbering
        let mut remap: Vec<Vec<Option<usize>>> = Vec::with_capacity(symbol.blocks.len());
        for (b, block) in symbol.blocks.iter_mut().enumerate() {
            let mut map = vec![None; block.steps.len()];
            let mut next = 0usize;
            for (i, slot) in map.iter_mut().enumerate() {
                if used[b][i] {
                    *slot = Some(next);
                    next += 1;
                }
            }
            let mut keep = used[b].iter();
            block.steps.retain(|_| *keep.next().expect("mark covers every step"));
            remap.push(map);
        }

        for block in &mut symbol.blocks {
            for step in &mut block.steps {
                step.for_each_operand_mut(|operand| {
                    if let Operand::Reg { block, index } = operand {
                        *index = remap[block.0][*index]
                            .expect("live step references a removed step");
                    }
                });
            }
        }

        removed_any = true;
    }

    removed_any
}

/// Stores into a local that are overwritten later in the same block with no
/// intervening read, call, or escape of that local
fn dead_stores(symbol: &SsaSymbol) -> FxHashSet<(usize, usize)> {
    let mut escaped: FxHashSet<usize> = FxHashSet::default();
    for block in &symbol.blocks {
        for step in &block.steps {
            match &step.op {
                SsaOp::Addr { place: Operand::Local(local) }
                | SsaOp::Offset { array: Operand::Local(local), .. }
                | SsaOp::Member { object: Operand::Local(local), .. } => {
                    escaped.insert(*local);
                }
                _ => {}
            }
        }
    }

    let mut dead = FxHashSet::default();
    for (b, block) in symbol.blocks.iter().enumerate() {
        let mut last_store: FxHashMap<usize, usize> = FxHashMap::default();
        for (i, step) in block.steps.iter().enumerate() {
            match &step.op {
                SsaOp::Store { dst: Operand::Local(local), .. } => {
                    if escaped.contains(local) {
                        continue;
                    }
                    if let Some(previous) = last_store.insert(*local, i) {
                        dead.insert((b, previous));
                    }
                }
                SsaOp::Load { src: Operand::Local(local) } => {
                    last_store.remove(local);
                }
                SsaOp::Call { .. } => last_store.clear(),
                _ => {}
            }
        }
    }

    dead
}
