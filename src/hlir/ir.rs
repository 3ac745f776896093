//! HLIR node definitions
//!
//! HLIR is a typed, tree-shaped IR that keeps source structure: branches,
//! loops and calls survive as nodes. Every node lives in the arena of the
//! module set that produced it and is addressed by [`HlirId`]; all
//! cross-references (types, parents, bodies) are non-owning ids.

use crate::common::Node;
use crate::ops::{BinaryOp, CastOp, CompareOp, Digit, Linkage, Quals, Sign, UnaryOp, Visibility};
use num_bigint::BigInt;

/// Handle to a node in an [`crate::hlir::HlirArena`]
pub type HlirId = id_arena::Id<Hlir>;

/// A single HLIR node
#[derive(Debug, Clone)]
pub struct Hlir {
    pub kind: HlirKind,
    /// Source location that produced this node
    pub node: Node,
    /// The type this node evaluates to, when it carries a value
    pub of: Option<HlirId>,
}

/// Attributes a declaration carries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attributes {
    pub linkage: Linkage,
    pub visibility: Visibility,
    /// External link name, used verbatim instead of the mangled name
    pub link_name: Option<String>,
}

impl Attributes {
    pub fn new(linkage: Linkage, visibility: Visibility) -> Self {
        Self {
            linkage,
            visibility,
            link_name: None,
        }
    }

    pub fn with_link_name(linkage: Linkage, visibility: Visibility, name: impl Into<String>) -> Self {
        Self {
            linkage,
            visibility,
            link_name: Some(name.into()),
        }
    }
}

impl Default for Attributes {
    fn default() -> Self {
        Self::new(Linkage::Module, Visibility::Private)
    }
}

/// Fields common to every declaration
#[derive(Debug, Clone)]
pub struct Decl {
    pub name: String,
    pub attribs: Attributes,
    /// The module (or aggregate) that contains this declaration
    pub parent: Option<HlirId>,
}

impl Decl {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attribs: Attributes::default(),
            parent: None,
        }
    }
}

/// Function signature shared by closures and function declarations
#[derive(Debug, Clone)]
pub struct Signature {
    /// Param declarations, in order
    pub params: Vec<HlirId>,
    pub result: HlirId,
    pub variadic: bool,
}

/// Payload of a forward declaration, holding whatever partial state the
/// finished declaration will need
#[derive(Debug, Clone)]
pub enum Partial {
    Aggregate { fields: Vec<HlirId> },
    Alias,
    Global,
    Function { signature: Signature, locals: Vec<HlirId> },
    Module,
}

/// Discriminant of [`HlirKind`], used for queries and forward contracts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HlirTag {
    Error,
    DigitLiteral,
    BoolLiteral,
    StringLiteral,
    UnitLiteral,
    EmptyLiteral,
    Load,
    Unary,
    Binary,
    Compare,
    Cast,
    Call,
    Member,
    Index,
    Addr,
    Stmts,
    Return,
    Assign,
    Branch,
    Loop,
    TypeEmpty,
    TypeUnit,
    TypeBool,
    TypeDigit,
    TypeString,
    TypePointer,
    TypeArray,
    TypeClosure,
    TypeQualify,
    TypeOpaque,
    Global,
    Local,
    Param,
    Function,
    Struct,
    Union,
    Alias,
    Field,
    Module,
    Forward,
}

impl HlirTag {
    pub fn name(self) -> &'static str {
        match self {
            HlirTag::Error => "error",
            HlirTag::DigitLiteral => "digit-literal",
            HlirTag::BoolLiteral => "bool-literal",
            HlirTag::StringLiteral => "string-literal",
            HlirTag::UnitLiteral => "unit-literal",
            HlirTag::EmptyLiteral => "empty-literal",
            HlirTag::Load => "load",
            HlirTag::Unary => "unary",
            HlirTag::Binary => "binary",
            HlirTag::Compare => "compare",
            HlirTag::Cast => "cast",
            HlirTag::Call => "call",
            HlirTag::Member => "member",
            HlirTag::Index => "index",
            HlirTag::Addr => "addr",
            HlirTag::Stmts => "stmts",
            HlirTag::Return => "return",
            HlirTag::Assign => "assign",
            HlirTag::Branch => "branch",
            HlirTag::Loop => "loop",
            HlirTag::TypeEmpty => "type-empty",
            HlirTag::TypeUnit => "type-unit",
            HlirTag::TypeBool => "type-bool",
            HlirTag::TypeDigit => "type-digit",
            HlirTag::TypeString => "type-string",
            HlirTag::TypePointer => "type-pointer",
            HlirTag::TypeArray => "type-array",
            HlirTag::TypeClosure => "type-closure",
            HlirTag::TypeQualify => "type-qualify",
            HlirTag::TypeOpaque => "type-opaque",
            HlirTag::Global => "global",
            HlirTag::Local => "local",
            HlirTag::Param => "param",
            HlirTag::Function => "function",
            HlirTag::Struct => "struct",
            HlirTag::Union => "union",
            HlirTag::Alias => "alias",
            HlirTag::Field => "field",
            HlirTag::Module => "module",
            HlirTag::Forward => "forward",
        }
    }
}

/// The tagged payload of an HLIR node
#[derive(Debug, Clone)]
pub enum HlirKind {
    /// A compilation error standing in where a node was expected; poisons
    /// further checks instead of aborting them
    Error { message: String },

    //
    // literal expressions
    //
    DigitLiteral { value: BigInt },
    BoolLiteral { value: bool },
    StringLiteral { value: String },
    UnitLiteral,
    EmptyLiteral,

    //
    // computed expressions
    //
    /// Read the current value out of a declaration
    Load { read: HlirId },
    Unary { op: UnaryOp, operand: HlirId },
    Binary { op: BinaryOp, lhs: HlirId, rhs: HlirId },
    Compare { op: CompareOp, lhs: HlirId, rhs: HlirId },
    Cast { op: CastOp, expr: HlirId },
    Call { callee: HlirId, args: Vec<HlirId> },
    /// Access a field of a record
    Member { object: HlirId, field: HlirId },
    Index { array: HlirId, index: HlirId },
    /// Take the address of a place
    Addr { expr: HlirId },

    //
    // statements
    //
    Stmts { stmts: Vec<HlirId> },
    Return { value: Option<HlirId> },
    Assign { dst: HlirId, src: HlirId },
    Branch { cond: HlirId, then: HlirId, other: Option<HlirId> },
    Loop { cond: HlirId, body: HlirId, other: Option<HlirId> },

    //
    // types
    //
    TypeEmpty { name: String },
    TypeUnit { name: String },
    TypeBool { name: String },
    TypeDigit { name: String, width: Digit, sign: Sign },
    TypeString { name: String },
    TypePointer { pointee: HlirId, indexable: bool },
    TypeArray { element: HlirId, length: usize },
    TypeClosure { signature: Signature },
    TypeQualify { inner: HlirId, quals: Quals },
    TypeOpaque { name: String },

    //
    // declarations
    //
    Global { decl: Decl, value: Option<HlirId> },
    Local { decl: Decl },
    Param { decl: Decl },
    Function {
        decl: Decl,
        signature: Signature,
        locals: Vec<HlirId>,
        body: Option<HlirId>,
    },
    Struct { decl: Decl, fields: Vec<HlirId> },
    Union { decl: Decl, fields: Vec<HlirId> },
    Alias { decl: Decl, alias: HlirId, newtype: bool },
    Field { decl: Decl },
    Module {
        decl: Decl,
        types: Vec<HlirId>,
        globals: Vec<HlirId>,
        functions: Vec<HlirId>,
    },

    /// Named but not yet built; completed declarations never revert
    Forward {
        decl: Decl,
        expected: HlirTag,
        partial: Partial,
    },
}

impl Hlir {
    pub fn tag(&self) -> HlirTag {
        match &self.kind {
            HlirKind::Error { .. } => HlirTag::Error,
            HlirKind::DigitLiteral { .. } => HlirTag::DigitLiteral,
            HlirKind::BoolLiteral { .. } => HlirTag::BoolLiteral,
            HlirKind::StringLiteral { .. } => HlirTag::StringLiteral,
            HlirKind::UnitLiteral => HlirTag::UnitLiteral,
            HlirKind::EmptyLiteral => HlirTag::EmptyLiteral,
            HlirKind::Load { .. } => HlirTag::Load,
            HlirKind::Unary { .. } => HlirTag::Unary,
            HlirKind::Binary { .. } => HlirTag::Binary,
            HlirKind::Compare { .. } => HlirTag::Compare,
            HlirKind::Cast { .. } => HlirTag::Cast,
            HlirKind::Call { .. } => HlirTag::Call,
            HlirKind::Member { .. } => HlirTag::Member,
            HlirKind::Index { .. } => HlirTag::Index,
            HlirKind::Addr { .. } => HlirTag::Addr,
            HlirKind::Stmts { .. } => HlirTag::Stmts,
            HlirKind::Return { .. } => HlirTag::Return,
            HlirKind::Assign { .. } => HlirTag::Assign,
            HlirKind::Branch { .. } => HlirTag::Branch,
            HlirKind::Loop { .. } => HlirTag::Loop,
            HlirKind::TypeEmpty { .. } => HlirTag::TypeEmpty,
            HlirKind::TypeUnit { .. } => HlirTag::TypeUnit,
            HlirKind::TypeBool { .. } => HlirTag::TypeBool,
            HlirKind::TypeDigit { .. } => HlirTag::TypeDigit,
            HlirKind::TypeString { .. } => HlirTag::TypeString,
            HlirKind::TypePointer { .. } => HlirTag::TypePointer,
            HlirKind::TypeArray { .. } => HlirTag::TypeArray,
            HlirKind::TypeClosure { .. } => HlirTag::TypeClosure,
            HlirKind::TypeQualify { .. } => HlirTag::TypeQualify,
            HlirKind::TypeOpaque { .. } => HlirTag::TypeOpaque,
            HlirKind::Global { .. } => HlirTag::Global,
            HlirKind::Local { .. } => HlirTag::Local,
            HlirKind::Param { .. } => HlirTag::Param,
            HlirKind::Function { .. } => HlirTag::Function,
            HlirKind::Struct { .. } => HlirTag::Struct,
            HlirKind::Union { .. } => HlirTag::Union,
            HlirKind::Alias { .. } => HlirTag::Alias,
            HlirKind::Field { .. } => HlirTag::Field,
            HlirKind::Module { .. } => HlirTag::Module,
            HlirKind::Forward { .. } => HlirTag::Forward,
        }
    }

    pub fn is(&self, tag: HlirTag) -> bool {
        self.tag() == tag
    }

    /// The declaration record, when this node is a declaration or forward
    pub fn decl(&self) -> Option<&Decl> {
        match &self.kind {
            HlirKind::Global { decl, .. }
            | HlirKind::Local { decl }
            | HlirKind::Param { decl }
            | HlirKind::Function { decl, .. }
            | HlirKind::Struct { decl, .. }
            | HlirKind::Union { decl, .. }
            | HlirKind::Alias { decl, .. }
            | HlirKind::Field { decl }
            | HlirKind::Module { decl, .. }
            | HlirKind::Forward { decl, .. } => Some(decl),
            _ => None,
        }
    }

    pub fn decl_mut(&mut self) -> Option<&mut Decl> {
        match &mut self.kind {
            HlirKind::Global { decl, .. }
            | HlirKind::Local { decl }
            | HlirKind::Param { decl }
            | HlirKind::Function { decl, .. }
            | HlirKind::Struct { decl, .. }
            | HlirKind::Union { decl, .. }
            | HlirKind::Alias { decl, .. }
            | HlirKind::Field { decl }
            | HlirKind::Module { decl, .. }
            | HlirKind::Forward { decl, .. } => Some(decl),
            _ => None,
        }
    }

    /// Is this a type node? Named records and aliases count: a struct
    /// declaration is the type it declares.
    pub fn is_type(&self) -> bool {
        matches!(
            self.kind,
            HlirKind::TypeEmpty { .. }
                | HlirKind::TypeUnit { .. }
                | HlirKind::TypeBool { .. }
                | HlirKind::TypeDigit { .. }
                | HlirKind::TypeString { .. }
                | HlirKind::TypePointer { .. }
                | HlirKind::TypeArray { .. }
                | HlirKind::TypeClosure { .. }
                | HlirKind::TypeQualify { .. }
                | HlirKind::TypeOpaque { .. }
                | HlirKind::Struct { .. }
                | HlirKind::Union { .. }
                | HlirKind::Alias { .. }
        )
    }
}
