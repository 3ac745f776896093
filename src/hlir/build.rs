//! HLIR construction
//!
//! All nodes are created through [`HlirArena`]. Declarations come in two
//! forms: an *open* form (`begin_*`) that forward-declares and returns a
//! mutable handle, and a *build* form (`build_*`) that attaches the body and
//! finalises. Finalising a forward with the wrong expected kind is a
//! contract violation and panics.

use super::ir::*;
use crate::common::Node;
use crate::ops::{BinaryOp, CastOp, CompareOp, Digit, Quals, Sign, UnaryOp};
use id_arena::Arena;
use num_bigint::BigInt;

/// Owns every HLIR node of one compilation; dropped in one step
#[derive(Debug, Default)]
pub struct HlirArena {
    nodes: Arena<Hlir>,
}

impl HlirArena {
    pub fn new() -> Self {
        Self::default()
    }

    fn alloc(&mut self, node: Node, of: Option<HlirId>, kind: HlirKind) -> HlirId {
        self.nodes.alloc(Hlir { kind, node, of })
    }

    pub fn get(&self, id: HlirId) -> &Hlir {
        &self.nodes[id]
    }

    pub fn get_mut(&mut self, id: HlirId) -> &mut Hlir {
        &mut self.nodes[id]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 0
    }

    //
    // errors
    //

    pub fn error(&mut self, node: Node, message: impl Into<String>) -> HlirId {
        self.alloc(node, None, HlirKind::Error { message: message.into() })
    }

    //
    // type constructors
    //

    pub fn type_empty(&mut self, node: Node, name: impl Into<String>) -> HlirId {
        self.alloc(node, None, HlirKind::TypeEmpty { name: name.into() })
    }

    pub fn type_unit(&mut self, node: Node, name: impl Into<String>) -> HlirId {
        self.alloc(node, None, HlirKind::TypeUnit { name: name.into() })
    }

    pub fn type_bool(&mut self, node: Node, name: impl Into<String>) -> HlirId {
        self.alloc(node, None, HlirKind::TypeBool { name: name.into() })
    }

    pub fn type_digit(&mut self, node: Node, name: impl Into<String>, width: Digit, sign: Sign) -> HlirId {
        self.alloc(
            node,
            None,
            HlirKind::TypeDigit { name: name.into(), width, sign },
        )
    }

    pub fn type_string(&mut self, node: Node, name: impl Into<String>) -> HlirId {
        self.alloc(node, None, HlirKind::TypeString { name: name.into() })
    }

    pub fn type_pointer(&mut self, node: Node, pointee: HlirId, indexable: bool) -> HlirId {
        self.alloc(node, None, HlirKind::TypePointer { pointee, indexable })
    }

    pub fn type_array(&mut self, node: Node, element: HlirId, length: usize) -> HlirId {
        self.alloc(node, None, HlirKind::TypeArray { element, length })
    }

    pub fn type_closure(&mut self, node: Node, params: Vec<HlirId>, result: HlirId, variadic: bool) -> HlirId {
        self.alloc(
            node,
            None,
            HlirKind::TypeClosure {
                signature: Signature { params, result, variadic },
            },
        )
    }

    pub fn type_qualify(&mut self, node: Node, inner: HlirId, quals: Quals) -> HlirId {
        self.alloc(node, None, HlirKind::TypeQualify { inner, quals })
    }

    pub fn type_opaque(&mut self, node: Node, name: impl Into<String>) -> HlirId {
        self.alloc(node, None, HlirKind::TypeOpaque { name: name.into() })
    }

    //
    // literal expressions
    //

    pub fn digit_literal(&mut self, node: Node, of: HlirId, value: BigInt) -> HlirId {
        self.alloc(node, Some(of), HlirKind::DigitLiteral { value })
    }

    pub fn int_literal(&mut self, node: Node, of: HlirId, value: i64) -> HlirId {
        self.digit_literal(node, of, BigInt::from(value))
    }

    pub fn bool_literal(&mut self, node: Node, of: HlirId, value: bool) -> HlirId {
        self.alloc(node, Some(of), HlirKind::BoolLiteral { value })
    }

    pub fn string_literal(&mut self, node: Node, of: HlirId, value: impl Into<String>) -> HlirId {
        self.alloc(node, Some(of), HlirKind::StringLiteral { value: value.into() })
    }

    pub fn unit_literal(&mut self, node: Node, of: HlirId) -> HlirId {
        self.alloc(node, Some(of), HlirKind::UnitLiteral)
    }

    pub fn empty_literal(&mut self, node: Node, of: HlirId) -> HlirId {
        self.alloc(node, Some(of), HlirKind::EmptyLiteral)
    }

    //
    // computed expressions
    //

    /// Read the value of a declaration; the result type is the declaration's
    pub fn load(&mut self, node: Node, read: HlirId) -> HlirId {
        let of = self.get(read).of;
        self.alloc(node, of, HlirKind::Load { read })
    }

    /// Unary inherits its operand's type
    pub fn unary(&mut self, node: Node, op: UnaryOp, operand: HlirId) -> HlirId {
        let of = self.get(operand).of;
        self.alloc(node, of, HlirKind::Unary { op, operand })
    }

    pub fn binary(&mut self, node: Node, of: HlirId, op: BinaryOp, lhs: HlirId, rhs: HlirId) -> HlirId {
        self.alloc(node, Some(of), HlirKind::Binary { op, lhs, rhs })
    }

    pub fn compare(&mut self, node: Node, of: HlirId, op: CompareOp, lhs: HlirId, rhs: HlirId) -> HlirId {
        self.alloc(node, Some(of), HlirKind::Compare { op, lhs, rhs })
    }

    pub fn cast(&mut self, node: Node, of: HlirId, op: CastOp, expr: HlirId) -> HlirId {
        self.alloc(node, Some(of), HlirKind::Cast { op, expr })
    }

    /// Call inherits the closure's result type
    pub fn call(&mut self, node: Node, callee: HlirId, args: Vec<HlirId>) -> HlirId {
        let of = self
            .closure_of(callee)
            .map(|signature| signature.result);
        self.alloc(node, of, HlirKind::Call { callee, args })
    }

    pub fn member(&mut self, node: Node, of: HlirId, object: HlirId, field: HlirId) -> HlirId {
        self.alloc(node, Some(of), HlirKind::Member { object, field })
    }

    pub fn index(&mut self, node: Node, of: HlirId, array: HlirId, index: HlirId) -> HlirId {
        self.alloc(node, Some(of), HlirKind::Index { array, index })
    }

    pub fn addr(&mut self, node: Node, of: HlirId, expr: HlirId) -> HlirId {
        self.alloc(node, Some(of), HlirKind::Addr { expr })
    }

    //
    // statements
    //

    pub fn stmts(&mut self, node: Node, stmts: Vec<HlirId>) -> HlirId {
        self.alloc(node, None, HlirKind::Stmts { stmts })
    }

    pub fn ret(&mut self, node: Node, value: Option<HlirId>) -> HlirId {
        self.alloc(node, None, HlirKind::Return { value })
    }

    pub fn assign(&mut self, node: Node, dst: HlirId, src: HlirId) -> HlirId {
        self.alloc(node, None, HlirKind::Assign { dst, src })
    }

    pub fn branch(&mut self, node: Node, cond: HlirId, then: HlirId, other: Option<HlirId>) -> HlirId {
        self.alloc(node, None, HlirKind::Branch { cond, then, other })
    }

    pub fn loop_(&mut self, node: Node, cond: HlirId, body: HlirId, other: Option<HlirId>) -> HlirId {
        self.alloc(node, None, HlirKind::Loop { cond, body, other })
    }

    //
    // leaf declarations
    //

    pub fn local(&mut self, node: Node, name: impl Into<String>, of: HlirId) -> HlirId {
        self.alloc(node, Some(of), HlirKind::Local { decl: Decl::new(name) })
    }

    pub fn param(&mut self, node: Node, name: impl Into<String>, of: HlirId) -> HlirId {
        self.alloc(node, Some(of), HlirKind::Param { decl: Decl::new(name) })
    }

    pub fn field(&mut self, node: Node, name: impl Into<String>, of: HlirId) -> HlirId {
        self.alloc(node, Some(of), HlirKind::Field { decl: Decl::new(name) })
    }

    //
    // forward declarations
    //

    fn begin(&mut self, node: Node, name: impl Into<String>, expected: HlirTag, partial: Partial) -> HlirId {
        self.alloc(
            node,
            None,
            HlirKind::Forward {
                decl: Decl::new(name),
                expected,
                partial,
            },
        )
    }

    /// Swap a forward out for its finished kind; panics on a contract
    /// violation (not forward, or wrong expected kind)
    fn finish(&mut self, id: HlirId, tag: HlirTag) -> (Decl, Partial) {
        let found = self.get(id).tag();
        assert!(
            found == HlirTag::Forward,
            "finishing non-forward {} node as {}",
            found.name(),
            tag.name()
        );

        let hlir = self.get_mut(id);
        match std::mem::replace(&mut hlir.kind, HlirKind::Error { message: String::new() }) {
            HlirKind::Forward { decl, expected, partial } => {
                assert!(
                    expected == tag,
                    "finishing forward `{}` as {} but it expects {}",
                    decl.name,
                    tag.name(),
                    expected.name()
                );
                (decl, partial)
            }
            _ => unreachable!("forward tag checked above"),
        }
    }

    pub fn begin_struct(&mut self, node: Node, name: impl Into<String>) -> HlirId {
        self.begin(node, name, HlirTag::Struct, Partial::Aggregate { fields: Vec::new() })
    }

    pub fn build_struct(&mut self, id: HlirId) {
        let (decl, partial) = self.finish(id, HlirTag::Struct);
        let Partial::Aggregate { fields } = partial else {
            panic!("struct forward `{}` holds non-aggregate state", decl.name);
        };
        self.get_mut(id).kind = HlirKind::Struct { decl, fields };
    }

    pub fn structure(&mut self, node: Node, name: impl Into<String>, fields: Vec<HlirId>) -> HlirId {
        let id = self.begin(node, name, HlirTag::Struct, Partial::Aggregate { fields });
        self.build_struct(id);
        id
    }

    pub fn begin_union(&mut self, node: Node, name: impl Into<String>) -> HlirId {
        self.begin(node, name, HlirTag::Union, Partial::Aggregate { fields: Vec::new() })
    }

    pub fn build_union(&mut self, id: HlirId) {
        let (decl, partial) = self.finish(id, HlirTag::Union);
        let Partial::Aggregate { fields } = partial else {
            panic!("union forward `{}` holds non-aggregate state", decl.name);
        };
        self.get_mut(id).kind = HlirKind::Union { decl, fields };
    }

    pub fn union_type(&mut self, node: Node, name: impl Into<String>, fields: Vec<HlirId>) -> HlirId {
        let id = self.begin(node, name, HlirTag::Union, Partial::Aggregate { fields });
        self.build_union(id);
        id
    }

    pub fn add_field(&mut self, aggregate: HlirId, field: HlirId) {
        assert!(
            self.get(field).is(HlirTag::Field),
            "add_field called with a non-field node"
        );
        if let Some(decl) = self.get_mut(field).decl_mut() {
            decl.parent = Some(aggregate);
        }
        match &mut self.get_mut(aggregate).kind {
            HlirKind::Struct { fields, .. } | HlirKind::Union { fields, .. } => fields.push(field),
            HlirKind::Forward { partial: Partial::Aggregate { fields }, .. } => fields.push(field),
            _ => panic!("add_field called on a non-aggregate node"),
        }
    }

    pub fn begin_alias(&mut self, node: Node, name: impl Into<String>) -> HlirId {
        self.begin(node, name, HlirTag::Alias, Partial::Alias)
    }

    pub fn build_alias(&mut self, id: HlirId, alias: HlirId, newtype: bool) {
        let (decl, _) = self.finish(id, HlirTag::Alias);
        self.get_mut(id).kind = HlirKind::Alias { decl, alias, newtype };
    }

    pub fn alias(&mut self, node: Node, name: impl Into<String>, target: HlirId, newtype: bool) -> HlirId {
        let id = self.begin_alias(node, name);
        self.build_alias(id, target, newtype);
        id
    }

    pub fn begin_global(&mut self, node: Node, name: impl Into<String>, of: HlirId) -> HlirId {
        let id = self.begin(node, name, HlirTag::Global, Partial::Global);
        self.get_mut(id).of = Some(of);
        id
    }

    pub fn build_global(&mut self, id: HlirId, value: Option<HlirId>) {
        let (decl, _) = self.finish(id, HlirTag::Global);
        self.get_mut(id).kind = HlirKind::Global { decl, value };
    }

    pub fn global(&mut self, node: Node, name: impl Into<String>, of: HlirId, value: Option<HlirId>) -> HlirId {
        let id = self.begin_global(node, name, of);
        self.build_global(id, value);
        id
    }

    pub fn begin_function(&mut self, node: Node, name: impl Into<String>, signature: Signature) -> HlirId {
        // the function doubles as its own closure type
        let closure = self.type_closure(
            node,
            signature.params.clone(),
            signature.result,
            signature.variadic,
        );
        let id = self.begin(
            node,
            name,
            HlirTag::Function,
            Partial::Function { signature, locals: Vec::new() },
        );
        self.get_mut(id).of = Some(closure);
        id
    }

    pub fn build_function(&mut self, id: HlirId, body: Option<HlirId>) {
        let (decl, partial) = self.finish(id, HlirTag::Function);
        let Partial::Function { signature, locals } = partial else {
            panic!("function forward `{}` holds non-function state", decl.name);
        };
        self.get_mut(id).kind = HlirKind::Function { decl, signature, locals, body };
    }

    pub fn function(
        &mut self,
        node: Node,
        name: impl Into<String>,
        signature: Signature,
        body: Option<HlirId>,
    ) -> HlirId {
        let id = self.begin_function(node, name, signature);
        self.build_function(id, body);
        id
    }

    /// Append a local to an open or finished function
    pub fn add_local(&mut self, function: HlirId, local: HlirId) {
        assert!(
            self.get(local).is(HlirTag::Local),
            "add_local called with a non-local node"
        );
        if let Some(decl) = self.get_mut(local).decl_mut() {
            decl.parent = Some(function);
        }
        match &mut self.get_mut(function).kind {
            HlirKind::Function { locals, .. } => locals.push(local),
            HlirKind::Forward { partial: Partial::Function { locals, .. }, expected, .. } => {
                assert!(*expected == HlirTag::Function, "add_local on a non-function forward");
                locals.push(local);
            }
            _ => panic!("add_local called on a non-function node"),
        }
    }

    pub fn begin_module(&mut self, node: Node, name: impl Into<String>) -> HlirId {
        self.begin(node, name, HlirTag::Module, Partial::Module)
    }

    pub fn build_module(
        &mut self,
        id: HlirId,
        types: Vec<HlirId>,
        globals: Vec<HlirId>,
        functions: Vec<HlirId>,
    ) {
        let (decl, _) = self.finish(id, HlirTag::Module);
        for child in types.iter().chain(&globals).chain(&functions) {
            if let Some(decl) = self.get_mut(*child).decl_mut() {
                decl.parent = Some(id);
            }
        }
        self.get_mut(id).kind = HlirKind::Module { decl, types, globals, functions };
    }

    /// Re-point a finished module's declaration vectors
    pub fn update_module(
        &mut self,
        id: HlirId,
        types: Vec<HlirId>,
        globals: Vec<HlirId>,
        functions: Vec<HlirId>,
    ) {
        match &mut self.get_mut(id).kind {
            HlirKind::Module {
                types: old_types,
                globals: old_globals,
                functions: old_functions,
                ..
            } => {
                *old_types = types;
                *old_globals = globals;
                *old_functions = functions;
            }
            _ => panic!("update_module called on a non-module node"),
        }
    }

    pub fn module(
        &mut self,
        node: Node,
        name: impl Into<String>,
        types: Vec<HlirId>,
        globals: Vec<HlirId>,
        functions: Vec<HlirId>,
    ) -> HlirId {
        let id = self.begin_module(node, name);
        self.build_module(id, types, globals, functions);
        id
    }

    //
    // attribute mutation
    //

    pub fn set_attributes(&mut self, id: HlirId, attribs: Attributes) {
        match self.get_mut(id).decl_mut() {
            Some(decl) => decl.attribs = attribs,
            None => panic!("set_attributes called on a non-declaration node"),
        }
    }

    pub fn set_parent(&mut self, id: HlirId, parent: HlirId) {
        match self.get_mut(id).decl_mut() {
            Some(decl) => decl.parent = Some(parent),
            None => panic!("set_parent called on a non-declaration node"),
        }
    }
}
