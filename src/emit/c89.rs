//! C89 emitter
//!
//! Renders the SSA module list into one `.c` and one `.h` per module under
//! `src/` and `include/`, mirroring the module path. Three passes: begin
//! (create files, write preludes), prototype (include graph plus forward
//! declarations), define (globals, then functions block by block). The
//! single-element-array trick expresses storage uniformly: every global and
//! local declares as `T name[1]` and every access goes through `[0]`.

use super::io::Filesystem;
use super::types::{format_params, format_type};
use crate::diagnostics::{CompileError, Reporter, Severity};
use crate::ops::{Linkage, Visibility};
use crate::ssa::{
    Operand, SsaOp, SsaProgram, SsaSymbol, SsaType, SsaValue, SymbolId, ValuePayload,
};
use indexmap::IndexSet;
use rustc_hash::FxHashMap;
use std::fmt::Write as _;
use std::io::Write as _;

/// How module paths map onto the output tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PathLayout {
    /// One directory per path segment
    #[default]
    Nested,
    /// Dots in file names instead of directories
    Flat,
}

#[derive(Debug, Clone, Default)]
pub struct EmitOptions {
    pub layout: PathLayout,
}

#[derive(Debug, Clone)]
pub struct EmitResult {
    /// Emitted `.c` files, in module order
    pub sources: Vec<String>,
}

/// Render the whole program through `fs`
pub fn emit_c89(
    program: &SsaProgram,
    fs: &mut dyn Filesystem,
    reports: &mut Reporter,
    options: &EmitOptions,
) -> Result<EmitResult, CompileError> {
    let mut emit = C89Emit {
        program,
        reports,
        options,
        roots: Vec::new(),
        hdrs: Vec::new(),
        srcs: Vec::new(),
        sources: Vec::new(),
        module_of: FxHashMap::default(),
        current: None,
        block_names: FxHashMap::default(),
        vreg_names: FxHashMap::default(),
        block_counter: 0,
        vreg_counter: 0,
    };

    for index in 0..program.modules.len() {
        emit.begin_module(index, fs)?;
    }

    for index in 0..program.modules.len() {
        emit.proto_module(index);
    }

    for index in 0..program.modules.len() {
        emit.define_module(index);
    }

    emit.flush(fs)
}

struct CFile {
    path: String,
    text: String,
}

struct C89Emit<'a> {
    program: &'a SsaProgram,
    reports: &'a mut Reporter,
    options: &'a EmitOptions,

    /// Include-root-relative stem per module, e.g. `pl0/lang`
    roots: Vec<String>,
    hdrs: Vec<CFile>,
    srcs: Vec<CFile>,
    sources: Vec<String>,
    module_of: FxHashMap<SymbolId, usize>,

    // per-function state
    current: Option<SymbolId>,
    block_names: FxHashMap<usize, usize>,
    vreg_names: FxHashMap<(usize, usize), usize>,
    block_counter: usize,
    vreg_counter: usize,
}

fn link_keyword(linkage: Linkage) -> &'static str {
    match linkage {
        Linkage::Import => "extern ",
        Linkage::Module => "static ",
        Linkage::Export | Linkage::EntryCli | Linkage::EntryGui => "",
    }
}

impl<'a> C89Emit<'a> {
    //
    // begin pass
    //

    fn begin_module(&mut self, index: usize, fs: &mut dyn Filesystem) -> Result<(), CompileError> {
        let module = &self.program.modules[index];

        // drop a trailing path component equal to the module name; the
        // output reads better and stays unambiguous
        let mut path = module.path.clone();
        if path.last() == Some(&module.name) {
            path.pop();
        }

        let sep = match self.options.layout {
            PathLayout::Nested => "/",
            PathLayout::Flat => ".",
        };
        let root = if path.is_empty() {
            module.name.clone()
        } else {
            format!("{}{}{}", path.join(sep), sep, module.name)
        };

        if self.options.layout == PathLayout::Nested && !path.is_empty() {
            let dir = path.join("/");
            io_check(&dir, fs.dir_create(&format!("include/{dir}")))?;
            io_check(&dir, fs.dir_create(&format!("src/{dir}")))?;
        }

        let hdr_path = format!("include/{root}.h");
        let src_path = format!("src/{root}.c");
        io_check(&hdr_path, fs.file_create(&hdr_path))?;
        io_check(&src_path, fs.file_create(&src_path))?;

        let dotted = if module.path.is_empty() {
            module.name.clone()
        } else {
            module.path.join(".")
        };

        let mut hdr = String::new();
        hdr.push_str("#pragma once\n");
        hdr.push_str("#include <stdbool.h>\n");
        hdr.push_str("#include <stdint.h>\n");
        let _ = write!(hdr, "\n/**\n * module {dotted}\n */\n");

        let src = format!("#include \"{root}.h\"\n");

        for &symbol in module.globals.iter().chain(&module.functions) {
            self.module_of.insert(symbol, index);
        }

        self.sources.push(src_path.clone());
        self.roots.push(root);
        self.hdrs.push(CFile { path: hdr_path, text: hdr });
        self.srcs.push(CFile { path: src_path, text: src });

        Ok(())
    }

    //
    // prototype pass
    //

    fn proto_module(&mut self, index: usize) {
        self.emit_required_headers(index);

        let module = &self.program.modules[index];
        for &global in &module.globals {
            self.proto_global(index, global);
        }
        for &function in &module.functions {
            self.proto_function(index, function);
        }
    }

    fn emit_required_headers(&mut self, index: usize) {
        let module = &self.program.modules[index];

        let mut required: IndexSet<usize> = IndexSet::new();
        for &symbol in module.globals.iter().chain(&module.functions) {
            for dep in self.program.deps_of(symbol) {
                let Some(&dep_module) = self.module_of.get(&dep) else {
                    continue;
                };
                if dep_module != index {
                    required.insert(dep_module);
                }
            }
        }

        for dep_module in required {
            let line = format!("#include \"{}.h\"\n", self.roots[dep_module]);
            self.hdrs[index].text.push_str(&line);
        }
    }

    fn proto_global(&mut self, index: usize, id: SymbolId) {
        let symbol = self.program.symbol(id);
        let it = format_type(&symbol.ty, Some(self.c_name(id)));

        if symbol.visibility == Visibility::Public {
            // a header declaration must never tentatively define
            let _ = writeln!(self.hdrs[index].text, "extern {it}[1];");
        } else {
            let link = link_keyword(symbol.linkage);
            let _ = writeln!(self.srcs[index].text, "{link}{it}[1];");
        }
    }

    fn proto_function(&mut self, index: usize, id: SymbolId) {
        let symbol = self.program.symbol(id);
        // entry points use the platform name and need no prototype
        if symbol.linkage.is_entry_point() {
            return;
        }

        let Some((params, result, variadic)) = symbol.ty.as_closure() else {
            self.reports.report(
                Severity::Internal,
                crate::common::Node::builtin(),
                format!("function `{}` does not have closure type", symbol.name),
            );
            return;
        };

        let params = format_params(params, variadic);
        let result = format_type(result, Some(self.c_name(id)));
        let link = link_keyword(symbol.linkage);

        let line = format!("{link}{result}({params});\n");
        if symbol.visibility == Visibility::Public {
            self.hdrs[index].text.push_str(&line);
        } else {
            self.srcs[index].text.push_str(&line);
        }
    }

    //
    // definition pass
    //

    fn define_module(&mut self, index: usize) {
        let module = &self.program.modules[index];
        for &global in &module.globals {
            self.define_global(index, global);
        }
        for &function in &module.functions {
            self.define_function(index, function);
        }
    }

    fn define_global(&mut self, index: usize, id: SymbolId) {
        let symbol = self.program.symbol(id);
        if symbol.linkage.is_imported() {
            return;
        }

        let it = format_type(&symbol.ty, Some(self.c_name(id)));
        let link = link_keyword(symbol.linkage);

        match &symbol.value {
            Some(value) if value.init => {
                let value = self.format_value(value);
                let _ = writeln!(self.srcs[index].text, "{link}{it}[1] = {{ {value} }};");
            }
            _ => {
                let _ = writeln!(self.srcs[index].text, "{link}{it}[1];");
            }
        }
    }

    fn define_function(&mut self, index: usize, id: SymbolId) {
        let symbol = self.program.symbol(id);
        if symbol.linkage.is_imported() {
            return;
        }

        let Some((params, result, variadic)) = symbol.ty.as_closure() else {
            return;
        };

        self.current = Some(id);
        self.block_names.clear();
        self.vreg_names.clear();
        self.block_counter = 0;
        self.vreg_counter = 0;

        let params = format_params(params, variadic);
        let result = format_type(result, Some(self.c_name(id)));
        let link = link_keyword(symbol.linkage);

        let mut out = String::new();
        let _ = writeln!(out, "{link}{result}({params}) {{");
        for local in &symbol.locals {
            let _ = writeln!(out, "\t{}[1];", format_type(&local.ty, Some(&local.name)));
        }
        let _ = writeln!(out, "\tgoto bb{};", self.block_name(0));

        for block in 0..symbol.blocks.len() {
            out.push_str(&self.write_block(block));
        }
        out.push_str("}\n");

        self.srcs[index].text.push_str(&out);
        self.current = None;
    }

    //
    // block emission
    //

    fn write_block(&mut self, b: usize) -> String {
        let symbol = self.current_symbol();
        let block = &symbol.blocks[b];

        let mut out = String::new();
        let _ = writeln!(out, "bb{}: /* len = {} */", self.block_name(b), block.steps.len());

        for (i, step) in block.steps.iter().enumerate() {
            match &step.op {
                SsaOp::Store { dst, src } => {
                    let dst = self.format_operand(dst);
                    let src = self.format_operand(src);
                    let _ = writeln!(out, "\t{dst}[0] = {src};");
                }
                SsaOp::Load { src } => {
                    let vreg = self.name_vreg(b, i, &step.ty);
                    let src = self.format_operand(src);
                    let _ = writeln!(out, "\t{vreg} = {src}[0];");
                }
                SsaOp::Unary { op, operand } => {
                    let vreg = self.name_vreg(b, i, &step.ty);
                    let operand = self.format_operand(operand);
                    let _ = writeln!(out, "\t{vreg} = ({} {operand});", op.symbol());
                }
                SsaOp::Binary { op, lhs, rhs } => {
                    let vreg = self.name_vreg(b, i, &step.ty);
                    let lhs = self.format_operand(lhs);
                    let rhs = self.format_operand(rhs);
                    let _ = writeln!(out, "\t{vreg} = ({lhs} {} {rhs});", op.symbol());
                }
                SsaOp::Compare { op, lhs, rhs } => {
                    let vreg = self.name_vreg(b, i, &SsaType::Bool);
                    let lhs = self.format_operand(lhs);
                    let rhs = self.format_operand(rhs);
                    let _ = writeln!(out, "\t{vreg} = ({lhs} {} {rhs});", op.symbol());
                }
                SsaOp::Cast { operand, .. } => {
                    let vreg = self.name_vreg(b, i, &step.ty);
                    let cast = format_type(&step.ty, None);
                    let operand = self.format_operand(operand);
                    let _ = writeln!(out, "\t{vreg} = ({cast}) {operand};");
                }
                SsaOp::Call { function, args } => {
                    let rendered: Vec<String> =
                        args.iter().map(|arg| self.format_operand(arg)).collect();
                    let function = self.format_operand(function);
                    if step.ty.is_unit_or_empty() {
                        let _ = writeln!(out, "\t{function}({});", rendered.join(", "));
                    } else {
                        let vreg = self.name_vreg(b, i, &step.ty);
                        let _ = writeln!(out, "\t{vreg} = {function}({});", rendered.join(", "));
                    }
                }
                SsaOp::Addr { place } => {
                    let vreg = self.name_vreg(b, i, &step.ty);
                    let place = self.format_operand(place);
                    let _ = writeln!(out, "\t{vreg} = {place};");
                }
                SsaOp::Offset { array, offset } => {
                    let vreg = self.name_vreg(b, i, &step.ty);
                    let array = self.format_operand(array);
                    let offset = self.format_operand(offset);
                    let _ = writeln!(out, "\t{vreg} = ({array}[0] + {offset});");
                }
                SsaOp::Member { object, index } => {
                    let vreg = self.name_vreg(b, i, &step.ty);
                    let field = self.field_name(object, *index);
                    let object = self.format_operand(object);
                    let _ = writeln!(out, "\t{vreg} = &({object}[0].{field});");
                }
                SsaOp::Jump { target } => {
                    let target = self.format_operand(target);
                    let _ = writeln!(out, "\tgoto {target};");
                }
                SsaOp::Branch { cond, then, other } => {
                    let cond = self.format_operand(cond);
                    let then = self.format_operand(then);
                    let _ = write!(out, "\tif ({cond}) {{ goto {then}; }}");
                    if !other.is_empty() {
                        let other = self.format_operand(other);
                        let _ = write!(out, " else {{ goto {other}; }}");
                    }
                    out.push('\n');
                }
                SsaOp::Return { value } => {
                    if operand_cant_return(value) {
                        out.push_str("\treturn;\n");
                    } else {
                        let value = self.format_operand(value);
                        let _ = writeln!(out, "\treturn {value};");
                    }
                }
            }
        }

        out
    }

    //
    // operand rendering
    //

    fn format_operand(&mut self, operand: &Operand) -> String {
        match operand {
            Operand::Empty => "/* empty */".to_string(),
            Operand::Imm(value) => self.format_value(value),
            Operand::Block(block) => format!("bb{}", self.block_name(block.0)),
            Operand::Reg { block, index } => format!("vreg{}", self.vreg_name(block.0, *index)),
            Operand::Global(id) | Operand::Function(id) => self.c_name(*id).to_string(),
            Operand::Local(index) => {
                let symbol = self.current_symbol();
                match symbol.locals.get(*index) {
                    Some(local) => local.name.clone(),
                    None => {
                        self.report_bad_slot("local", *index, symbol.locals.len());
                        format!("local{index}")
                    }
                }
            }
            Operand::Param(index) => {
                let symbol = self.current_symbol();
                match symbol.params.get(*index) {
                    Some(param) => format!("(&{})", param.name),
                    None => {
                        self.report_bad_slot("param", *index, symbol.params.len());
                        format!("param{index}")
                    }
                }
            }
        }
    }

    fn report_bad_slot(&mut self, what: &str, index: usize, len: usize) {
        self.reports.report(
            Severity::Fatal,
            crate::common::Node::builtin(),
            format!("{what}({index}) is out of range ({len} declared)"),
        );
    }

    fn format_value(&self, value: &SsaValue) -> String {
        match &value.payload {
            ValuePayload::Bool(flag) => if *flag { "true" } else { "false" }.to_string(),
            ValuePayload::Digit(digit) => digit.to_string(),
            ValuePayload::String(text) => format!("\"{}\"", escape_string(text)),
            ValuePayload::Array(values) => values
                .iter()
                .map(|value| self.format_value(value))
                .collect::<Vec<_>>()
                .join(", "),
            ValuePayload::Unit => panic!("cannot render a unit value"),
        }
    }

    //
    // names
    //

    fn current_symbol(&self) -> &'a SsaSymbol {
        self.program
            .symbol(self.current.expect("operand rendered outside a function"))
    }

    fn c_name(&self, id: SymbolId) -> &'a str {
        let symbol = self.program.symbol(id);
        match symbol.linkage {
            Linkage::EntryCli => "main",
            Linkage::EntryGui => "WinMain",
            _ => &symbol.name,
        }
    }

    fn block_name(&mut self, block: usize) -> usize {
        if let Some(&name) = self.block_names.get(&block) {
            return name;
        }
        let name = self.block_counter;
        self.block_counter += 1;
        self.block_names.insert(block, name);
        name
    }

    fn vreg_name(&mut self, block: usize, index: usize) -> usize {
        if let Some(&name) = self.vreg_names.get(&(block, index)) {
            return name;
        }
        let name = self.vreg_counter;
        self.vreg_counter += 1;
        self.vreg_names.insert((block, index), name);
        name
    }

    fn name_vreg(&mut self, block: usize, index: usize, ty: &SsaType) -> String {
        let name = format!("vreg{}", self.vreg_name(block, index));
        format_type(ty, Some(&name))
    }

    fn field_name(&mut self, object: &Operand, index: usize) -> String {
        let fields = match self.operand_type(object).map(SsaType::unqualified) {
            Some(SsaType::Struct { fields, .. }) | Some(SsaType::Union { fields, .. }) => fields,
            _ => {
                self.reports.report(
                    Severity::Fatal,
                    crate::common::Node::builtin(),
                    "member access on a non-record operand",
                );
                return format!("field{index}");
            }
        };
        match fields.get(index) {
            Some(field) => field.name.clone(),
            None => {
                self.report_bad_slot("field", index, fields.len());
                format!("field{index}")
            }
        }
    }

    fn operand_type(&self, operand: &Operand) -> Option<&'a SsaType> {
        let symbol = self.current_symbol();
        match operand {
            Operand::Local(index) => symbol.locals.get(*index).map(|local| &local.ty),
            Operand::Param(index) => symbol.params.get(*index).map(|param| &param.ty),
            Operand::Global(id) | Operand::Function(id) => Some(&self.program.symbol(*id).ty),
            Operand::Reg { block, index } => symbol
                .blocks
                .get(block.0)
                .and_then(|block| block.steps.get(*index))
                .map(|step| &step.ty),
            _ => None,
        }
    }

    //
    // flush
    //

    fn flush(self, fs: &mut dyn Filesystem) -> Result<EmitResult, CompileError> {
        for file in self.hdrs.iter().chain(&self.srcs) {
            let mut handle = io_check(&file.path, fs.open(&file.path))?;
            io_check(&file.path, handle.write_all(file.text.as_bytes()))?;
        }
        Ok(EmitResult { sources: self.sources })
    }
}

fn io_check<T>(path: &str, result: std::io::Result<T>) -> Result<T, CompileError> {
    result.map_err(|error| CompileError::EmitIo {
        path: path.to_string(),
        message: error.to_string(),
    })
}

fn operand_cant_return(operand: &Operand) -> bool {
    match operand {
        Operand::Empty => true,
        Operand::Imm(value) => value.ty.is_unit_or_empty(),
        _ => false,
    }
}

fn escape_string(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => {
                let _ = write!(out, "\\{:03o}", c as u32);
            }
            c => out.push(c),
        }
    }
    out
}
