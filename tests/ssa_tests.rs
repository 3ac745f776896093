//! SSA lowering tests

use cthulhu::common::Node;
use cthulhu::diagnostics::Reporter;
use cthulhu::hlir::{close_function, Attributes, HlirArena, HlirId, Signature};
use cthulhu::ops::{CompareOp, Digit, Linkage, Sign, Visibility};
use cthulhu::ssa::{
    lower_modules, BlockId, ModuleSet, Operand, SsaOp, SsaProgram, SsaSymbol,
};

fn node() -> Node {
    Node::builtin()
}

/// Every block ends in exactly one terminator and every vreg reference
/// points strictly earlier in its block
fn assert_invariants(program: &SsaProgram) {
    for id in program.all_symbols() {
        let symbol = program.symbol(id);
        for (b, block) in symbol.blocks.iter().enumerate() {
            assert!(
                block.is_terminated(),
                "block `{}` of `{}` has no terminator",
                block.name,
                symbol.name
            );
            for (i, step) in block.steps.iter().enumerate() {
                if i + 1 < block.steps.len() {
                    assert!(
                        !step.op.is_terminator(),
                        "block `{}` of `{}` has a terminator mid-block",
                        block.name,
                        symbol.name
                    );
                }
                for operand in step.op.operands() {
                    if let Operand::Reg { block: rb, index } = operand {
                        if rb.0 == b {
                            assert!(
                                *index < i,
                                "step {i} of `{}` references a later vreg",
                                symbol.name
                            );
                        }
                    }
                }
            }
        }
    }
}

fn count_ops(symbol: &SsaSymbol, pred: impl Fn(&SsaOp) -> bool) -> usize {
    symbol
        .blocks
        .iter()
        .flat_map(|block| &block.steps)
        .filter(|step| pred(&step.op))
        .count()
}

/// The PL/0 shape: an imported variadic `printf` and a CLI entry that
/// prints a digit
fn print_fixture(hlir: &mut HlirArena) -> (ModuleSet, HlirId) {
    let int = hlir.type_digit(node(), "integer", Digit::Int, Sign::Signed);
    let unit = hlir.type_unit(node(), "void");
    let string = hlir.type_string(node(), "string");

    let fmt = hlir.param(node(), "fmt", string);
    let print = hlir.function(
        node(),
        "print",
        Signature { params: vec![fmt], result: unit, variadic: true },
        None,
    );
    hlir.set_attributes(
        print,
        Attributes::with_link_name(Linkage::Import, Visibility::Public, "printf"),
    );

    let main = hlir.begin_function(
        node(),
        "main",
        Signature { params: vec![], result: int, variadic: false },
    );
    hlir.set_attributes(main, Attributes::new(Linkage::EntryCli, Visibility::Public));

    let fmt_arg = hlir.string_literal(node(), string, "%d\n");
    let digit_arg = hlir.int_literal(node(), int, 42);
    let call = hlir.call(node(), print, vec![fmt_arg, digit_arg]);
    let body = hlir.stmts(node(), vec![call]);
    close_function(hlir, main, body);

    let module = hlir.module(node(), "lang", vec![], vec![], vec![print, main]);
    let mut modules = ModuleSet::new();
    modules.insert("pl0.lang".into(), module);
    (modules, module)
}

#[test]
fn test_entry_function_lowering() {
    let mut hlir = HlirArena::new();
    let (modules, _) = print_fixture(&mut hlir);

    let mut reports = Reporter::new();
    let program = lower_modules(&hlir, &modules, &mut reports);
    assert!(!reports.has_fatal());
    assert_invariants(&program);

    assert_eq!(program.modules.len(), 1);
    let module = &program.modules[0];
    assert_eq!(module.name, "lang");
    assert_eq!(module.path, vec!["pl0".to_string(), "lang".to_string()]);
    assert_eq!(module.functions.len(), 2);

    // the imported symbol keeps its external name and has no blocks
    let print = program.symbol(module.functions[0]);
    assert_eq!(print.name, "printf");
    assert!(print.blocks.is_empty());

    // the entry block is one call followed by a bare return
    let main = program.symbol(module.functions[1]);
    assert_eq!(main.blocks.len(), 1);
    let entry = main.entry().unwrap();
    assert_eq!(entry.steps.len(), 2);

    let SsaOp::Call { function, args } = &entry.steps[0].op else {
        panic!("first step is not a call");
    };
    assert!(matches!(function, Operand::Function(_)));
    assert_eq!(args.len(), 2);
    assert!(matches!(args[0], Operand::Imm(_)));
    assert!(matches!(args[1], Operand::Imm(_)));

    assert!(matches!(
        entry.steps[1].op,
        SsaOp::Return { value: Operand::Empty }
    ));
}

#[test]
fn test_mutual_recursion_deps() {
    let mut hlir = HlirArena::new();
    let unit = hlir.type_unit(node(), "unit");

    let f = hlir.begin_function(
        node(),
        "f",
        Signature { params: vec![], result: unit, variadic: false },
    );
    let g = hlir.begin_function(
        node(),
        "g",
        Signature { params: vec![], result: unit, variadic: false },
    );

    let call_g = hlir.call(node(), g, vec![]);
    let f_body = hlir.stmts(node(), vec![call_g]);
    close_function(&mut hlir, f, f_body);

    let call_f = hlir.call(node(), f, vec![]);
    let g_body = hlir.stmts(node(), vec![call_f]);
    close_function(&mut hlir, g, g_body);

    let module = hlir.module(node(), "m", vec![], vec![], vec![f, g]);
    let mut modules = ModuleSet::new();
    modules.insert("m".into(), module);

    let mut reports = Reporter::new();
    let program = lower_modules(&hlir, &modules, &mut reports);
    assert!(!reports.has_fatal());
    assert_invariants(&program);

    let module = &program.modules[0];
    let (f_id, g_id) = (module.functions[0], module.functions[1]);

    // both symbols exist after the forward pass, one call step each
    assert_eq!(count_ops(program.symbol(f_id), |op| matches!(op, SsaOp::Call { .. })), 1);
    assert_eq!(count_ops(program.symbol(g_id), |op| matches!(op, SsaOp::Call { .. })), 1);

    let f_deps: Vec<_> = program.deps_of(f_id).collect();
    let g_deps: Vec<_> = program.deps_of(g_id).collect();
    assert_eq!(f_deps, vec![g_id]);
    assert_eq!(g_deps, vec![f_id]);
}

#[test]
fn test_branch_with_else_shape() {
    let mut hlir = HlirArena::new();
    let int = hlir.type_digit(node(), "int", Digit::Int, Sign::Signed);
    let unit = hlir.type_unit(node(), "unit");
    let boolean = hlir.type_bool(node(), "bool");

    let x = hlir.param(node(), "x", int);
    let func = hlir.begin_function(
        node(),
        "pick",
        Signature { params: vec![x], result: unit, variadic: false },
    );
    let y = hlir.local(node(), "y", int);
    hlir.add_local(func, y);

    let read_x = hlir.load(node(), x);
    let ten = hlir.int_literal(node(), int, 10);
    let cond = hlir.compare(node(), boolean, CompareOp::Lt, read_x, ten);

    let one = hlir.int_literal(node(), int, 1);
    let two = hlir.int_literal(node(), int, 2);
    let set_one = hlir.assign(node(), y, one);
    let set_two = hlir.assign(node(), y, two);

    let branch = hlir.branch(node(), cond, set_one, Some(set_two));
    let body = hlir.stmts(node(), vec![branch]);
    close_function(&mut hlir, func, body);

    let module = hlir.module(node(), "m", vec![], vec![], vec![func]);
    let mut modules = ModuleSet::new();
    modules.insert("m".into(), module);

    let mut reports = Reporter::new();
    let program = lower_modules(&hlir, &modules, &mut reports);
    assert!(!reports.has_fatal());
    assert_invariants(&program);

    let symbol = program.symbol(program.modules[0].functions[0]);

    // entry plus then/other/tail
    assert_eq!(symbol.blocks.len(), 4);
    assert_eq!(count_ops(symbol, |op| matches!(op, SsaOp::Branch { .. })), 1);
    assert_eq!(count_ops(symbol, |op| matches!(op, SsaOp::Store { .. })), 2);
    assert_eq!(count_ops(symbol, |op| matches!(op, SsaOp::Jump { .. })), 2);

    // both arms converge on the tail block
    let tail = BlockId(3);
    for block in &symbol.blocks[1..3] {
        let SsaOp::Jump { target } = &block.steps.last().unwrap().op else {
            panic!("arm does not end in a jump");
        };
        assert_eq!(*target, Operand::Block(tail));
    }

    // the branch condition resolves to bool
    let SsaOp::Branch { cond, .. } = &symbol.blocks[0].steps.last().unwrap().op else {
        panic!("entry does not end in a branch");
    };
    let Operand::Reg { block, index } = cond else {
        panic!("condition is not a vreg");
    };
    assert!(symbol.blocks[block.0].steps[*index].ty.is_bool());
}

#[test]
fn test_loop_shape() {
    let mut hlir = HlirArena::new();
    let int = hlir.type_digit(node(), "int", Digit::Int, Sign::Signed);
    let unit = hlir.type_unit(node(), "unit");
    let boolean = hlir.type_bool(node(), "bool");

    let func = hlir.begin_function(
        node(),
        "spin",
        Signature { params: vec![], result: unit, variadic: false },
    );
    let x = hlir.local(node(), "x", int);
    hlir.add_local(func, x);

    let read_x = hlir.load(node(), x);
    let ten = hlir.int_literal(node(), int, 10);
    let cond = hlir.compare(node(), boolean, CompareOp::Lt, read_x, ten);
    let one = hlir.int_literal(node(), int, 1);
    let step = hlir.assign(node(), x, one);
    let looped = hlir.loop_(node(), cond, step, None);
    let body = hlir.stmts(node(), vec![looped]);
    close_function(&mut hlir, func, body);

    let module = hlir.module(node(), "m", vec![], vec![], vec![func]);
    let mut modules = ModuleSet::new();
    modules.insert("m".into(), module);

    let mut reports = Reporter::new();
    let program = lower_modules(&hlir, &modules, &mut reports);
    assert!(!reports.has_fatal());
    assert_invariants(&program);

    let symbol = program.symbol(program.modules[0].functions[0]);
    // entry, head, body, tail
    assert_eq!(symbol.blocks.len(), 4);

    // the entry jumps into the head, the head branches, the body jumps back
    assert!(matches!(
        symbol.blocks[0].steps.last().unwrap().op,
        SsaOp::Jump { target: Operand::Block(BlockId(1)) }
    ));
    assert!(matches!(
        symbol.blocks[1].steps.last().unwrap().op,
        SsaOp::Branch { .. }
    ));
    assert!(matches!(
        symbol.blocks[2].steps.last().unwrap().op,
        SsaOp::Jump { target: Operand::Block(BlockId(1)) }
    ));
}

#[test]
fn test_global_initialiser_lowering() {
    let mut hlir = HlirArena::new();
    let int = hlir.type_digit(node(), "int", Digit::Int, Sign::Signed);

    let two = hlir.int_literal(node(), int, 2);
    let three = hlir.int_literal(node(), int, 3);
    let sum = hlir.binary(node(), int, cthulhu::ops::BinaryOp::Add, two, three);
    let x = hlir.global(node(), "x", int, Some(sum));
    hlir.set_attributes(x, Attributes::new(Linkage::Export, Visibility::Public));

    let module = hlir.module(node(), "m", vec![], vec![x], vec![]);
    let mut modules = ModuleSet::new();
    modules.insert("m".into(), module);

    let mut reports = Reporter::new();
    let program = lower_modules(&hlir, &modules, &mut reports);
    assert!(!reports.has_fatal());
    assert_invariants(&program);

    let symbol = program.symbol(program.modules[0].globals[0]);
    // one binary step and a return of its vreg
    let entry = symbol.entry().unwrap();
    assert_eq!(entry.steps.len(), 2);
    assert!(matches!(entry.steps[0].op, SsaOp::Binary { .. }));
    assert!(matches!(
        entry.steps[1].op,
        SsaOp::Return { value: Operand::Reg { .. } }
    ));
}

#[test]
fn test_imported_global_has_no_body() {
    let mut hlir = HlirArena::new();
    let int = hlir.type_digit(node(), "int", Digit::Int, Sign::Signed);
    let errno = hlir.global(node(), "errno", int, None);
    hlir.set_attributes(
        errno,
        Attributes::with_link_name(Linkage::Import, Visibility::Public, "errno"),
    );

    let module = hlir.module(node(), "m", vec![], vec![errno], vec![]);
    let mut modules = ModuleSet::new();
    modules.insert("m".into(), module);

    let mut reports = Reporter::new();
    let program = lower_modules(&hlir, &modules, &mut reports);

    let symbol = program.symbol(program.modules[0].globals[0]);
    assert!(symbol.blocks.is_empty());
    assert!(symbol.value.is_none());
    assert_eq!(symbol.name, "errno");
}

#[test]
fn test_mangled_names() {
    let mut hlir = HlirArena::new();
    let int = hlir.type_digit(node(), "int", Digit::Int, Sign::Signed);
    let unit = hlir.type_unit(node(), "unit");

    let n = hlir.param(node(), "n", int);
    let func = hlir.function(
        node(),
        "bump",
        Signature { params: vec![n], result: unit, variadic: false },
        None,
    );
    hlir.set_attributes(func, Attributes::new(Linkage::Import, Visibility::Public));
    let counter = hlir.global(node(), "counter", int, None);
    hlir.set_attributes(counter, Attributes::new(Linkage::Import, Visibility::Public));

    let module = hlir.module(node(), "lang", vec![], vec![counter], vec![func]);
    let mut modules = ModuleSet::new();
    modules.insert("pl0.lang".into(), module);

    let mut reports = Reporter::new();
    let program = lower_modules(&hlir, &modules, &mut reports);

    let module = &program.modules[0];
    assert_eq!(program.symbol(module.globals[0]).name, "_ZN3pl04lang7counterE");
    assert_eq!(program.symbol(module.functions[0]).name, "_ZN3pl04lang4bumpEi");

    // mangles with no override and no params match _Z(N<seg>+E|<seg>)
    for id in program.all_symbols() {
        let name = &program.symbol(id).name;
        assert!(name.starts_with("_Z"), "`{name}` is not a mangled name");
        let rest = &name[2..];
        assert!(
            rest.starts_with('N') || rest.starts_with(|c: char| c.is_ascii_digit()),
            "`{name}` has a malformed nested-name-specifier"
        );
    }
}

#[test]
fn test_self_reference_is_recorded() {
    let mut hlir = HlirArena::new();
    let unit = hlir.type_unit(node(), "unit");
    let f = hlir.begin_function(
        node(),
        "again",
        Signature { params: vec![], result: unit, variadic: false },
    );
    let call = hlir.call(node(), f, vec![]);
    let body = hlir.stmts(node(), vec![call]);
    close_function(&mut hlir, f, body);

    let module = hlir.module(node(), "m", vec![], vec![], vec![f]);
    let mut modules = ModuleSet::new();
    modules.insert("m".into(), module);

    let mut reports = Reporter::new();
    let program = lower_modules(&hlir, &modules, &mut reports);

    let f_id = program.modules[0].functions[0];
    let deps: Vec<_> = program.deps_of(f_id).collect();
    assert_eq!(deps, vec![f_id]);
}
