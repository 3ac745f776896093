//! HLIR to SSA lowering
//!
//! Runs two passes over the completed module set. The forward pass creates
//! one SSA symbol per top-level global and function, with resolved types and
//! mangled names, so bodies can reference symbols in any module. The body
//! pass lowers initialisers and function bodies into blocks of steps and
//! records a dependency edge for every symbol an operand touches.

use super::ir::*;
use crate::diagnostics::{CompileError, Reporter, Severity};
use crate::hlir::{HlirArena, HlirId, HlirKind, HlirTag};
use crate::mangle;
use crate::ops::Quals;
use indexmap::IndexMap;
use rustc_hash::FxHashMap;

/// Ordered map from dotted module path to completed HLIR module
pub type ModuleSet = IndexMap<String, HlirId>;

/// Lower every module in the set; the result carries the dependency map
/// beside the module list
pub fn lower_modules(hlir: &HlirArena, modules: &ModuleSet, reports: &mut Reporter) -> SsaProgram {
    let mut builder = SsaBuilder {
        hlir,
        reports,
        program: SsaProgram::new(),
        symbol_map: FxHashMap::default(),
        type_stack: Vec::new(),
        current: None,
        blocks: Vec::new(),
        current_block: BlockId(0),
        block_counter: 0,
        locals: FxHashMap::default(),
        params: FxHashMap::default(),
    };

    for (path, &module) in modules {
        builder.forward_module(path, module);
    }

    for (index, &module) in modules.values().enumerate() {
        builder.lower_module(index, module);
    }

    builder.program
}

struct SsaBuilder<'a> {
    hlir: &'a HlirArena,
    reports: &'a mut Reporter,
    program: SsaProgram,
    /// HLIR declaration to the symbol the forward pass made for it
    symbol_map: FxHashMap<HlirId, SymbolId>,
    /// Guard against self-referential record types
    type_stack: Vec<HlirId>,

    // per-symbol lowering state
    current: Option<SymbolId>,
    blocks: Vec<SsaBlock>,
    current_block: BlockId,
    block_counter: usize,
    locals: FxHashMap<HlirId, usize>,
    params: FxHashMap<HlirId, usize>,
}

impl<'a> SsaBuilder<'a> {
    //
    // forward pass
    //

    fn forward_module(&mut self, dotted: &str, module: HlirId) {
        let HlirKind::Module { decl, globals, functions, .. } = &self.hlir.get(module).kind else {
            self.reports.report(
                Severity::Internal,
                self.hlir.node_of(module),
                format!("expected a module, found {}", self.hlir.kind_of(module).name()),
            );
            return;
        };

        let path: Vec<String> = dotted.split('.').map(str::to_owned).collect();
        tracing::debug!(module = %dotted, "forwarding module");

        let mut ssa_module = SsaModule {
            name: decl.name.clone(),
            path: path.clone(),
            globals: Vec::new(),
            functions: Vec::new(),
        };

        for &global in globals {
            let id = self.forward_global(&path, global);
            ssa_module.globals.push(id);
            self.symbol_map.insert(global, id);
        }

        for &function in functions {
            let id = self.forward_function(&path, function);
            ssa_module.functions.push(id);
            self.symbol_map.insert(function, id);
        }

        // symbol names stay unique across a module's globals and functions
        let mut seen: FxHashMap<String, HlirId> = FxHashMap::default();
        let decls = globals.iter().chain(functions).copied();
        let symbols = ssa_module.globals.iter().chain(&ssa_module.functions).copied();
        for (decl, symbol) in decls.zip(symbols) {
            let name = self.program.symbols[symbol].name.clone();
            if let Some(previous) = seen.insert(name.clone(), decl) {
                self.reports.error(CompileError::Shadow {
                    name,
                    node: self.hlir.node_of(decl),
                    previous: self.hlir.node_of(previous),
                });
            }
        }

        self.program.modules.push(ssa_module);
    }

    fn forward_global(&mut self, path: &[String], global: HlirId) -> SymbolId {
        let attribs = self
            .hlir
            .attribs_of(global)
            .cloned()
            .unwrap_or_default();
        let name = self
            .hlir
            .name_of(global)
            .unwrap_or("<anonymous>")
            .to_string();

        let raw = self.lower_type(self.hlir.type_of(global));
        // globals are storage; unqualified types default to const storage
        let ty = match raw {
            qualified @ SsaType::Qualify { .. } => qualified,
            inner => SsaType::Qualify { inner: Box::new(inner), quals: Quals::DEFAULT },
        };

        let mangled = match &attribs.link_name {
            Some(link) => link.clone(),
            None => mangle::mangle_name(path, &name, None),
        };

        self.program.symbols.alloc(SsaSymbol {
            name: mangled,
            linkage: attribs.linkage,
            visibility: attribs.visibility,
            link_name: attribs.link_name,
            ty,
            value: None,
            params: Vec::new(),
            locals: Vec::new(),
            blocks: Vec::new(),
        })
    }

    fn forward_function(&mut self, path: &[String], function: HlirId) -> SymbolId {
        let attribs = self
            .hlir
            .attribs_of(function)
            .cloned()
            .unwrap_or_default();
        let name = self
            .hlir
            .name_of(function)
            .unwrap_or("<anonymous>")
            .to_string();

        let ty = self.lower_type(self.hlir.type_of(function));

        let params: Vec<SsaLocal> = match ty.as_closure() {
            Some((params, _, _)) => params
                .iter()
                .map(|param| SsaLocal::new(param.name.clone(), param.ty.clone()))
                .collect(),
            None => {
                self.reports.report(
                    Severity::Internal,
                    self.hlir.node_of(function),
                    format!("function `{name}` does not have closure type"),
                );
                Vec::new()
            }
        };

        let mangled = match &attribs.link_name {
            Some(link) => link.clone(),
            None => {
                let param_types: Vec<SsaType> =
                    params.iter().map(|param| param.ty.clone()).collect();
                for (param, ty) in params.iter().zip(&param_types) {
                    if mangle::mangle_type(ty).is_none() {
                        self.reports.error(CompileError::UnknownMangle {
                            name: param.name.clone(),
                            node: self.hlir.node_of(function),
                        });
                    }
                }
                mangle::mangle_name(path, &name, Some(&param_types))
            }
        };

        self.program.symbols.alloc(SsaSymbol {
            name: mangled,
            linkage: attribs.linkage,
            visibility: attribs.visibility,
            link_name: attribs.link_name,
            ty,
            value: None,
            params,
            locals: Vec::new(),
            blocks: Vec::new(),
        })
    }

    //
    // body pass
    //

    fn lower_module(&mut self, index: usize, module: HlirId) {
        let HlirKind::Module { globals, functions, .. } = &self.hlir.get(module).kind else {
            return;
        };
        tracing::debug!(module = %self.program.modules[index].name, "lowering module");

        for &global in globals {
            self.lower_global(global);
        }

        for &function in functions {
            self.lower_function(function);
        }
    }

    fn begin_symbol(&mut self, id: SymbolId) {
        self.current = Some(id);
        self.blocks = vec![SsaBlock::new("entry")];
        self.current_block = BlockId(0);
        self.block_counter = 0;
        self.locals.clear();
        self.params.clear();
    }

    fn finish_symbol(&mut self) {
        let id = self.current.take().expect("finish_symbol without begin_symbol");
        self.program.symbols[id].blocks = std::mem::take(&mut self.blocks);
    }

    fn lower_global(&mut self, global: HlirId) {
        if self.hlir.is_imported(global) {
            return;
        }
        let symbol = self.symbol_map[&global];
        self.begin_symbol(symbol);

        let value = match &self.hlir.get(global).kind {
            HlirKind::Global { value, .. } => *value,
            _ => None,
        };
        let result = match value {
            Some(value) => self.lower_expr(value),
            None => Operand::Empty,
        };
        let ty = self.program.symbols[symbol].ty.clone();
        self.add_step(SsaStep::new(SsaOp::Return { value: result }, ty));

        self.finish_symbol();
    }

    fn lower_function(&mut self, function: HlirId) {
        if self.hlir.is_imported(function) {
            return;
        }
        let symbol = self.symbol_map[&function];

        let (signature, locals, body) = match &self.hlir.get(function).kind {
            HlirKind::Function { signature, locals, body, .. } => (signature, locals, *body),
            _ => {
                self.reports.report(
                    Severity::Internal,
                    self.hlir.node_of(function),
                    "body pass reached a non-function symbol",
                );
                return;
            }
        };

        self.begin_symbol(symbol);

        for (index, &param) in signature.params.iter().enumerate() {
            self.params.insert(param, index);
        }

        let mut slots = Vec::with_capacity(locals.len());
        for (index, &local) in locals.iter().enumerate() {
            self.locals.insert(local, index);
            let name = self.hlir.name_of(local).unwrap_or("local").to_string();
            let ty = self.lower_type(self.hlir.type_of(local));
            slots.push(SsaLocal::new(name, ty));
        }
        self.program.symbols[symbol].locals = slots;

        if let Some(body) = body {
            self.lower_stmt(body);
        }

        if !self.terminated() {
            let ty = SsaType::Unit;
            self.add_step(SsaStep::new(SsaOp::Return { value: Operand::Empty }, ty));
        }

        self.finish_symbol();
    }

    //
    // block plumbing
    //

    fn new_block(&mut self, prefix: &str) -> BlockId {
        let id = BlockId(self.blocks.len());
        self.blocks
            .push(SsaBlock::new(format!("{}{}", prefix, self.block_counter)));
        self.block_counter += 1;
        id
    }

    fn set_current(&mut self, block: BlockId) {
        self.current_block = block;
    }

    fn terminated(&self) -> bool {
        self.blocks[self.current_block.0].is_terminated()
    }

    fn add_step(&mut self, step: SsaStep) -> Operand {
        let block = &mut self.blocks[self.current_block.0];
        debug_assert!(
            !block.is_terminated(),
            "adding a step after the terminator of block `{}`",
            block.name
        );
        let index = block.steps.len();
        block.steps.push(step);
        Operand::Reg { block: self.current_block, index }
    }

    fn record_dep(&mut self, dep: SymbolId) {
        let current = self.current.expect("dependency recorded outside a symbol");
        self.program.deps.entry(current).or_default().insert(dep);
    }

    //
    // operands
    //

    fn resolve_decl(&mut self, decl: HlirId) -> Operand {
        match self.hlir.kind_of(decl) {
            HlirTag::Local => match self.locals.get(&decl) {
                Some(&index) => Operand::Local(index),
                None => {
                    self.reports.report(
                        Severity::Internal,
                        self.hlir.node_of(decl),
                        "local is not registered with the current function",
                    );
                    Operand::Empty
                }
            },
            HlirTag::Param => match self.params.get(&decl) {
                Some(&index) => Operand::Param(index),
                None => {
                    self.reports.report(
                        Severity::Internal,
                        self.hlir.node_of(decl),
                        "param is not registered with the current function",
                    );
                    Operand::Empty
                }
            },
            HlirTag::Global => match self.symbol_map.get(&decl) {
                Some(&symbol) => {
                    self.record_dep(symbol);
                    Operand::Global(symbol)
                }
                None => self.unresolved(decl),
            },
            HlirTag::Function | HlirTag::Forward => match self.symbol_map.get(&decl) {
                Some(&symbol) => {
                    self.record_dep(symbol);
                    Operand::Function(symbol)
                }
                None => self.unresolved(decl),
            },
            HlirTag::Error => Operand::Empty,
            other => {
                self.reports.report(
                    Severity::Internal,
                    self.hlir.node_of(decl),
                    format!("cannot resolve {} to an operand", other.name()),
                );
                Operand::Empty
            }
        }
    }

    fn unresolved(&mut self, decl: HlirId) -> Operand {
        let name = self.hlir.name_of(decl).unwrap_or("<anonymous>").to_string();
        self.reports.error(CompileError::Unresolved {
            name,
            node: self.hlir.node_of(decl),
        });
        Operand::Empty
    }

    //
    // rvalues
    //

    fn lower_expr(&mut self, expr: HlirId) -> Operand {
        let found = self.hlir.get(expr);
        match &found.kind {
            HlirKind::Error { .. } => Operand::Empty,

            HlirKind::DigitLiteral { value } => {
                let ty = self.expr_type(expr);
                Operand::Imm(SsaValue::digit(ty, value.clone()))
            }
            HlirKind::BoolLiteral { value } => Operand::Imm(SsaValue::bool_value(*value)),
            HlirKind::StringLiteral { value } => Operand::Imm(SsaValue::string(value.clone())),
            HlirKind::UnitLiteral => Operand::Imm(SsaValue::unit(SsaType::Unit)),
            HlirKind::EmptyLiteral => Operand::Imm(SsaValue::unit(SsaType::Empty)),

            HlirKind::Load { read } => {
                let src = self.lower_place(*read);
                let ty = self.expr_type(expr);
                self.add_step(SsaStep::new(SsaOp::Load { src }, ty))
            }

            // a declaration in expression position is its place
            HlirKind::Global { .. }
            | HlirKind::Local { .. }
            | HlirKind::Param { .. }
            | HlirKind::Function { .. }
            | HlirKind::Forward { .. } => self.resolve_decl(expr),

            HlirKind::Unary { op, operand } => {
                let operand = self.lower_expr(*operand);
                let ty = self.expr_type(expr);
                self.add_step(SsaStep::new(SsaOp::Unary { op: *op, operand }, ty))
            }

            HlirKind::Binary { op, lhs, rhs } => {
                let lhs = self.lower_expr(*lhs);
                let rhs = self.lower_expr(*rhs);
                let ty = self.expr_type(expr);
                self.add_step(SsaStep::new(SsaOp::Binary { op: *op, lhs, rhs }, ty))
            }

            HlirKind::Compare { op, lhs, rhs } => {
                let lhs = self.lower_expr(*lhs);
                let rhs = self.lower_expr(*rhs);
                self.add_step(SsaStep::new(
                    SsaOp::Compare { op: *op, lhs, rhs },
                    SsaType::Bool,
                ))
            }

            HlirKind::Cast { op, expr: inner } => {
                let operand = self.lower_expr(*inner);
                let ty = self.expr_type(expr);
                self.add_step(SsaStep::new(SsaOp::Cast { op: *op, operand }, ty))
            }

            HlirKind::Call { callee, args } => {
                let function = self.lower_expr(*callee);
                let lowered: Vec<Operand> =
                    args.iter().map(|&arg| self.lower_expr(arg)).collect();
                let ty = self.expr_type(expr);
                self.add_step(SsaStep::new(
                    SsaOp::Call { function, args: lowered },
                    ty,
                ))
            }

            HlirKind::Member { object, field } => {
                let place = self.lower_member(expr, *object, *field);
                let ty = self.expr_type(expr);
                self.add_step(SsaStep::new(SsaOp::Load { src: place }, ty))
            }

            HlirKind::Index { array, index } => {
                let place = self.lower_offset(*array, *index, expr);
                let ty = self.expr_type(expr);
                self.add_step(SsaStep::new(SsaOp::Load { src: place }, ty))
            }

            HlirKind::Addr { expr: inner } => {
                let place = self.lower_place(*inner);
                let ty = self.expr_type(expr);
                self.add_step(SsaStep::new(SsaOp::Addr { place }, ty))
            }

            _ => {
                self.reports.report(
                    Severity::Internal,
                    found.node,
                    format!("cannot lower {} as an rvalue", found.tag().name()),
                );
                Operand::Empty
            }
        }
    }

    //
    // lvalues
    //

    fn lower_place(&mut self, expr: HlirId) -> Operand {
        let found = self.hlir.get(expr);
        match &found.kind {
            HlirKind::Error { .. } => Operand::Empty,

            HlirKind::Global { .. }
            | HlirKind::Local { .. }
            | HlirKind::Param { .. }
            | HlirKind::Function { .. }
            | HlirKind::Forward { .. } => self.resolve_decl(expr),

            HlirKind::Member { object, field } => self.lower_member(expr, *object, *field),

            HlirKind::Index { array, index } => self.lower_offset(*array, *index, expr),

            _ => {
                self.reports.report(
                    Severity::Internal,
                    found.node,
                    format!("cannot lower {} as a place", found.tag().name()),
                );
                Operand::Empty
            }
        }
    }

    fn lower_member(&mut self, expr: HlirId, object: HlirId, field: HlirId) -> Operand {
        let place = self.lower_place(object);
        let index = match self.field_index(object, field) {
            Some(index) => index,
            None => {
                self.reports.report(
                    Severity::Internal,
                    self.hlir.node_of(expr),
                    "member access on a non-record object",
                );
                return Operand::Empty;
            }
        };
        let ty = self.expr_type(expr);
        self.add_step(SsaStep::new(SsaOp::Member { object: place, index }, ty))
    }

    fn lower_offset(&mut self, array: HlirId, index: HlirId, expr: HlirId) -> Operand {
        let place = self.lower_place(array);
        let offset = self.lower_expr(index);
        let ty = self.expr_type(expr);
        self.add_step(SsaStep::new(SsaOp::Offset { array: place, offset }, ty))
    }

    fn field_index(&self, object: HlirId, field: HlirId) -> Option<usize> {
        let mut ty = self.hlir.unqualified_type(self.hlir.follow_type(self.hlir.get(object).of?));
        if let HlirKind::TypePointer { pointee, .. } = &self.hlir.get(ty).kind {
            ty = self.hlir.unqualified_type(self.hlir.follow_type(*pointee));
        }
        match &self.hlir.get(ty).kind {
            HlirKind::Struct { fields, .. } | HlirKind::Union { fields, .. } => {
                fields.iter().position(|&candidate| candidate == field)
            }
            _ => None,
        }
    }

    //
    // statements
    //

    fn lower_stmt(&mut self, stmt: HlirId) {
        let found = self.hlir.get(stmt);
        match &found.kind {
            HlirKind::Error { .. } => {}

            HlirKind::Stmts { stmts } => {
                for &inner in stmts {
                    if self.terminated() {
                        break;
                    }
                    self.lower_stmt(inner);
                }
            }

            HlirKind::Assign { dst, src } => {
                let dst = self.lower_place(*dst);
                let src = self.lower_expr(*src);
                self.add_step(SsaStep::new(SsaOp::Store { dst, src }, SsaType::Unit));
            }

            HlirKind::Branch { cond, then, other } => {
                let cond = self.lower_expr(*cond);

                let then_bb = self.new_block("then");
                let other_bb = other.map(|_| self.new_block("other"));
                let tail = self.new_block("tail");

                self.add_step(SsaStep::new(
                    SsaOp::Branch {
                        cond,
                        then: Operand::Block(then_bb),
                        other: Operand::Block(other_bb.unwrap_or(tail)),
                    },
                    SsaType::Unit,
                ));

                self.set_current(then_bb);
                self.lower_stmt(*then);
                if !self.terminated() {
                    self.add_step(SsaStep::new(
                        SsaOp::Jump { target: Operand::Block(tail) },
                        SsaType::Unit,
                    ));
                }

                if let (Some(other_bb), Some(other)) = (other_bb, other) {
                    self.set_current(other_bb);
                    self.lower_stmt(*other);
                    if !self.terminated() {
                        self.add_step(SsaStep::new(
                            SsaOp::Jump { target: Operand::Block(tail) },
                            SsaType::Unit,
                        ));
                    }
                }

                self.set_current(tail);
            }

            HlirKind::Loop { cond, body, .. } => {
                let head = self.new_block("loop");
                let body_bb = self.new_block("body");
                let tail = self.new_block("tail");

                self.add_step(SsaStep::new(
                    SsaOp::Jump { target: Operand::Block(head) },
                    SsaType::Unit,
                ));

                self.set_current(head);
                let cond = self.lower_expr(*cond);
                self.add_step(SsaStep::new(
                    SsaOp::Branch {
                        cond,
                        then: Operand::Block(body_bb),
                        other: Operand::Block(tail),
                    },
                    SsaType::Unit,
                ));

                self.set_current(body_bb);
                self.lower_stmt(*body);
                if !self.terminated() {
                    self.add_step(SsaStep::new(
                        SsaOp::Jump { target: Operand::Block(head) },
                        SsaType::Unit,
                    ));
                }

                self.set_current(tail);
            }

            HlirKind::Return { value } => {
                let (value, ty) = match value {
                    Some(value) => {
                        let ty = self.expr_type(*value);
                        (self.lower_expr(*value), ty)
                    }
                    None => (Operand::Empty, SsaType::Unit),
                };
                self.add_step(SsaStep::new(SsaOp::Return { value }, ty));
            }

            // expression in statement position
            _ => {
                self.lower_expr(stmt);
            }
        }
    }

    //
    // types
    //

    fn expr_type(&mut self, expr: HlirId) -> SsaType {
        match self.hlir.get(expr).of {
            Some(ty) => self.lower_type(ty),
            None => SsaType::Unit,
        }
    }

    fn lower_type(&mut self, ty: HlirId) -> SsaType {
        let followed = self.hlir.follow_type(ty);

        if self.type_stack.contains(&followed) {
            // break recursive records with a named stub; it still mangles
            // and renders by name
            let name = self.hlir.name_of(followed).unwrap_or("<recursive>").to_string();
            return match &self.hlir.get(followed).kind {
                HlirKind::Union { .. } => SsaType::Union { name, fields: Vec::new() },
                _ => SsaType::Struct { name, fields: Vec::new() },
            };
        }

        let found = self.hlir.get(followed);
        match &found.kind {
            HlirKind::TypeEmpty { .. } => SsaType::Empty,
            HlirKind::TypeUnit { .. } => SsaType::Unit,
            HlirKind::TypeBool { .. } => SsaType::Bool,
            HlirKind::TypeString { .. } => SsaType::String,
            HlirKind::TypeDigit { width, sign, .. } => SsaType::digit(*width, *sign),
            HlirKind::TypePointer { pointee, .. } => {
                SsaType::Pointer(Box::new(self.lower_type(*pointee)))
            }
            HlirKind::TypeArray { element, length } => SsaType::Array {
                element: Box::new(self.lower_type(*element)),
                length: *length,
            },
            HlirKind::TypeClosure { signature } => {
                let params = signature
                    .params
                    .iter()
                    .map(|&param| {
                        let name = self.hlir.name_of(param).unwrap_or("arg").to_string();
                        let ty = self.lower_type(self.hlir.type_of(param));
                        SsaParam::new(name, ty)
                    })
                    .collect();
                SsaType::Closure {
                    params,
                    result: Box::new(self.lower_type(signature.result)),
                    variadic: signature.variadic,
                }
            }
            HlirKind::TypeQualify { inner, quals } => SsaType::Qualify {
                inner: Box::new(self.lower_type(*inner)),
                quals: *quals,
            },
            HlirKind::TypeOpaque { name } => SsaType::Opaque { name: name.clone() },
            HlirKind::Struct { decl, fields } => {
                self.type_stack.push(followed);
                let lowered = self.lower_fields(fields);
                self.type_stack.pop();
                SsaType::Struct { name: decl.name.clone(), fields: lowered }
            }
            HlirKind::Union { decl, fields } => {
                self.type_stack.push(followed);
                let lowered = self.lower_fields(fields);
                self.type_stack.pop();
                SsaType::Union { name: decl.name.clone(), fields: lowered }
            }
            // a newtype alias is transparent once lowering begins
            HlirKind::Alias { alias, .. } => self.lower_type(*alias),
            // a function used as a type means its closure
            HlirKind::Function { .. } | HlirKind::Forward { .. } => {
                let closure = self.hlir.get(followed).of;
                match closure {
                    Some(closure) if closure != followed => self.lower_type(closure),
                    _ => SsaType::Empty,
                }
            }
            HlirKind::Error { message } => {
                self.reports.report(
                    Severity::Internal,
                    found.node,
                    format!("error node used as a type: {message}"),
                );
                SsaType::Empty
            }
            _ => {
                self.reports.report(
                    Severity::Internal,
                    found.node,
                    format!("no SSA type for {}", found.tag().name()),
                );
                SsaType::Empty
            }
        }
    }

    fn lower_fields(&mut self, fields: &[HlirId]) -> Vec<SsaParam> {
        fields
            .iter()
            .map(|&field| {
                let name = self.hlir.name_of(field).unwrap_or("field").to_string();
                let ty = self.lower_type(self.hlir.type_of(field));
                SsaParam::new(name, ty)
            })
            .collect()
    }

}
