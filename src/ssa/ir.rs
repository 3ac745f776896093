//! SSA IR definitions
//!
//! The SSA form is an explicit CFG: symbols own ordered blocks, blocks own
//! steps, steps reference earlier results through [`Operand::Reg`]. Every
//! vreg is assigned exactly once. Inter-symbol references ([`Operand::Global`]
//! and [`Operand::Function`]) are non-owning ids into the program's symbol
//! arena; the dependency map lives beside the module list.

use crate::ops::{BinaryOp, CastOp, CompareOp, Digit, Linkage, Quals, Sign, UnaryOp, Visibility};
use id_arena::Arena;
use indexmap::{IndexMap, IndexSet};
use num_bigint::BigInt;

/// Handle to a symbol in an [`SsaProgram`]
pub type SymbolId = id_arena::Id<SsaSymbol>;

/// Index of a block within its owning symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub usize);

/// SSA type, owned and structurally nested
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SsaType {
    /// The type of unreachable values; cannot be emitted
    Empty,
    Unit,
    Bool,
    String,
    Digit { width: Digit, sign: Sign },
    Pointer(Box<SsaType>),
    Array { element: Box<SsaType>, length: usize },
    Closure {
        params: Vec<SsaParam>,
        result: Box<SsaType>,
        variadic: bool,
    },
    Struct { name: String, fields: Vec<SsaParam> },
    Union { name: String, fields: Vec<SsaParam> },
    Qualify { inner: Box<SsaType>, quals: Quals },
    Opaque { name: String },
}

impl SsaType {
    pub fn digit(width: Digit, sign: Sign) -> Self {
        SsaType::Digit { width, sign }
    }

    /// Strip qualifiers
    pub fn unqualified(&self) -> &SsaType {
        match self {
            SsaType::Qualify { inner, .. } => inner.unqualified(),
            other => other,
        }
    }

    pub fn is_unit_or_empty(&self) -> bool {
        matches!(self.unqualified(), SsaType::Unit | SsaType::Empty)
    }

    pub fn is_bool(&self) -> bool {
        matches!(self.unqualified(), SsaType::Bool)
    }

    /// Qualifier flags reachable on this type
    pub fn quals(&self) -> Quals {
        match self {
            SsaType::Qualify { inner, quals } => quals.union(inner.quals()),
            _ => Quals::DEFAULT,
        }
    }

    /// May a store target of this type never be written twice? True for
    /// anything not explicitly mutable.
    pub fn is_const(&self) -> bool {
        match self {
            SsaType::Qualify { inner, quals } => !quals.contains(Quals::MUTABLE) && inner.is_const(),
            _ => true,
        }
    }

    pub fn as_closure(&self) -> Option<(&[SsaParam], &SsaType, bool)> {
        match self.unqualified() {
            SsaType::Closure { params, result, variadic } => Some((params, result, *variadic)),
            _ => None,
        }
    }
}

/// A named, typed slot: closure parameter or record field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SsaParam {
    pub name: String,
    pub ty: SsaType,
}

impl SsaParam {
    pub fn new(name: impl Into<String>, ty: SsaType) -> Self {
        Self { name: name.into(), ty }
    }
}

/// Compile-time value payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValuePayload {
    Unit,
    Bool(bool),
    Digit(BigInt),
    String(String),
    Array(Vec<SsaValue>),
}

/// A typed compile-time value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SsaValue {
    pub ty: SsaType,
    pub init: bool,
    pub payload: ValuePayload,
}

impl SsaValue {
    pub fn unit(ty: SsaType) -> Self {
        Self { ty, init: true, payload: ValuePayload::Unit }
    }

    pub fn bool_value(value: bool) -> Self {
        Self { ty: SsaType::Bool, init: true, payload: ValuePayload::Bool(value) }
    }

    pub fn digit(ty: SsaType, value: BigInt) -> Self {
        Self { ty, init: true, payload: ValuePayload::Digit(value) }
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self {
            ty: SsaType::String,
            init: true,
            payload: ValuePayload::String(value.into()),
        }
    }

    pub fn noinit(ty: SsaType) -> Self {
        Self { ty, init: false, payload: ValuePayload::Unit }
    }

    pub fn as_digit(&self) -> Option<&BigInt> {
        match &self.payload {
            ValuePayload::Digit(value) if self.init => Some(value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match &self.payload {
            ValuePayload::Bool(value) if self.init => Some(*value),
            _ => None,
        }
    }
}

/// A tagged value reference
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Empty,
    /// An immediate value
    Imm(SsaValue),
    /// The result of an earlier step in some block of the current symbol
    Reg { block: BlockId, index: usize },
    /// A branch target
    Block(BlockId),
    /// Index into the current function's locals
    Local(usize),
    /// Index into the current function's params
    Param(usize),
    Global(SymbolId),
    Function(SymbolId),
}

impl Operand {
    pub fn is_empty(&self) -> bool {
        matches!(self, Operand::Empty)
    }

    /// The symbol this operand references, if any
    pub fn symbol(&self) -> Option<SymbolId> {
        match self {
            Operand::Global(id) | Operand::Function(id) => Some(*id),
            _ => None,
        }
    }
}

/// One SSA instruction
#[derive(Debug, Clone, PartialEq)]
pub enum SsaOp {
    Load { src: Operand },
    Store { dst: Operand, src: Operand },
    Unary { op: UnaryOp, operand: Operand },
    Binary { op: BinaryOp, lhs: Operand, rhs: Operand },
    Compare { op: CompareOp, lhs: Operand, rhs: Operand },
    Cast { op: CastOp, operand: Operand },
    Call { function: Operand, args: Vec<Operand> },
    /// Address of a place
    Addr { place: Operand },
    /// Element of an indexable place
    Offset { array: Operand, offset: Operand },
    /// Field of a record place
    Member { object: Operand, index: usize },
    Jump { target: Operand },
    Branch { cond: Operand, then: Operand, other: Operand },
    Return { value: Operand },
}

impl SsaOp {
    pub fn is_terminator(&self) -> bool {
        matches!(self, SsaOp::Jump { .. } | SsaOp::Branch { .. } | SsaOp::Return { .. })
    }

    /// Does this step do something observable besides producing a vreg?
    pub fn has_side_effects(&self) -> bool {
        matches!(self, SsaOp::Call { .. } | SsaOp::Store { .. })
    }

    /// Every operand of this step, in order
    pub fn operands(&self) -> Vec<&Operand> {
        match self {
            SsaOp::Load { src } => vec![src],
            SsaOp::Store { dst, src } => vec![dst, src],
            SsaOp::Unary { operand, .. } | SsaOp::Cast { operand, .. } => vec![operand],
            SsaOp::Binary { lhs, rhs, .. } | SsaOp::Compare { lhs, rhs, .. } => vec![lhs, rhs],
            SsaOp::Call { function, args } => {
                let mut all = vec![function];
                all.extend(args.iter());
                all
            }
            SsaOp::Addr { place } => vec![place],
            SsaOp::Offset { array, offset } => vec![array, offset],
            SsaOp::Member { object, .. } => vec![object],
            SsaOp::Jump { target } => vec![target],
            SsaOp::Branch { cond, then, other } => vec![cond, then, other],
            SsaOp::Return { value } => vec![value],
        }
    }

    fn operands_mut(&mut self) -> Vec<&mut Operand> {
        match self {
            SsaOp::Load { src } => vec![src],
            SsaOp::Store { dst, src } => vec![dst, src],
            SsaOp::Unary { operand, .. } | SsaOp::Cast { operand, .. } => vec![operand],
            SsaOp::Binary { lhs, rhs, .. } | SsaOp::Compare { lhs, rhs, .. } => vec![lhs, rhs],
            SsaOp::Call { function, args } => {
                let mut all = vec![function];
                all.extend(args.iter_mut());
                all
            }
            SsaOp::Addr { place } => vec![place],
            SsaOp::Offset { array, offset } => vec![array, offset],
            SsaOp::Member { object, .. } => vec![object],
            SsaOp::Jump { target } => vec![target],
            SsaOp::Branch { cond, then, other } => vec![cond, then, other],
            SsaOp::Return { value } => vec![value],
        }
    }
}

/// A step plus the type its vreg carries
#[derive(Debug, Clone, PartialEq)]
pub struct SsaStep {
    pub op: SsaOp,
    pub ty: SsaType,
    /// Keep through dead-code removal even when unreferenced
    pub preserve: bool,
}

impl SsaStep {
    pub fn new(op: SsaOp, ty: SsaType) -> Self {
        Self { op, ty, preserve: false }
    }

    pub fn for_each_operand_mut(&mut self, mut f: impl FnMut(&mut Operand)) {
        for operand in self.op.operands_mut() {
            f(operand);
        }
    }
}

/// A straight-line run of steps ending in one terminator
#[derive(Debug, Clone, Default)]
pub struct SsaBlock {
    pub name: String,
    pub steps: Vec<SsaStep>,
}

impl SsaBlock {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), steps: Vec::new() }
    }

    pub fn is_terminated(&self) -> bool {
        self.steps.last().is_some_and(|step| step.op.is_terminator())
    }
}

/// A local or parameter slot of a function
#[derive(Debug, Clone)]
pub struct SsaLocal {
    pub name: String,
    pub ty: SsaType,
}

impl SsaLocal {
    pub fn new(name: impl Into<String>, ty: SsaType) -> Self {
        Self { name: name.into(), ty }
    }
}

/// A lowered global or function
#[derive(Debug, Clone)]
pub struct SsaSymbol {
    /// Mangled (or externally specified) name
    pub name: String,
    pub linkage: Linkage,
    pub visibility: Visibility,
    pub link_name: Option<String>,
    pub ty: SsaType,
    /// Known value, for globals whose initialiser has been folded
    pub value: Option<SsaValue>,
    pub params: Vec<SsaLocal>,
    pub locals: Vec<SsaLocal>,
    /// Empty for imported symbols; blocks[0] is the entry otherwise
    pub blocks: Vec<SsaBlock>,
}

impl SsaSymbol {
    pub fn entry(&self) -> Option<&SsaBlock> {
        self.blocks.first()
    }

    pub fn block(&self, id: BlockId) -> &SsaBlock {
        &self.blocks[id.0]
    }
}

/// One translation unit of SSA output
#[derive(Debug, Clone)]
pub struct SsaModule {
    pub name: String,
    /// Original dotted path, split
    pub path: Vec<String>,
    pub globals: Vec<SymbolId>,
    pub functions: Vec<SymbolId>,
}

/// Symbol-keyed dependency sets, insertion-ordered for deterministic output
pub type DepMap = IndexMap<SymbolId, IndexSet<SymbolId>>;

/// The whole lowered program: module list plus symbol arena plus dep map
#[derive(Debug, Default)]
pub struct SsaProgram {
    pub symbols: Arena<SsaSymbol>,
    pub modules: Vec<SsaModule>,
    pub deps: DepMap,
}

impl SsaProgram {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn symbol(&self, id: SymbolId) -> &SsaSymbol {
        &self.symbols[id]
    }

    pub fn symbol_mut(&mut self, id: SymbolId) -> &mut SsaSymbol {
        &mut self.symbols[id]
    }

    /// Symbols of every module, globals before functions, in module order
    pub fn all_symbols(&self) -> impl Iterator<Item = SymbolId> + '_ {
        self.modules
            .iter()
            .flat_map(|module| module.globals.iter().chain(&module.functions).copied())
    }

    pub fn deps_of(&self, id: SymbolId) -> impl Iterator<Item = SymbolId> + '_ {
        self.deps.get(&id).into_iter().flatten().copied()
    }
}
