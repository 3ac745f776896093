//! C89 emission tests

use cthulhu::common::Node;
use cthulhu::diagnostics::Reporter;
use cthulhu::emit::{emit_c89, EmitOptions, MemoryFs, PathLayout};
use cthulhu::hlir::{close_function, Attributes, HlirArena, Signature};
use cthulhu::ops::{BinaryOp, Digit, Linkage, Sign, Visibility};
use cthulhu::ssa::ModuleSet;
use cthulhu::{compile, CompileOptions};
use pretty_assertions::assert_eq;

fn node() -> Node {
    Node::builtin()
}

/// `let x: int = 2 + 3;` exported from module `demo`
fn constant_global_fixture(hlir: &mut HlirArena) -> ModuleSet {
    let int = hlir.type_digit(node(), "int", Digit::Int, Sign::Signed);
    let two = hlir.int_literal(node(), int, 2);
    let three = hlir.int_literal(node(), int, 3);
    let sum = hlir.binary(node(), int, BinaryOp::Add, two, three);
    let x = hlir.global(node(), "x", int, Some(sum));
    hlir.set_attributes(x, Attributes::with_link_name(Linkage::Export, Visibility::Public, "x"));
    let module = hlir.module(node(), "demo", vec![], vec![x], vec![]);

    let mut modules = ModuleSet::new();
    modules.insert("demo".into(), module);
    modules
}

#[test]
fn test_constant_init_global_emission() {
    let mut hlir = HlirArena::new();
    let modules = constant_global_fixture(&mut hlir);

    let mut reports = Reporter::new();
    let mut fs = MemoryFs::new();
    let result = compile(&hlir, &modules, &mut reports, &mut fs, &CompileOptions::default())
        .expect("compilation failed");

    assert_eq!(result.sources, vec!["src/demo.c".to_string()]);

    let header = fs.contents("include/demo.h").unwrap();
    assert!(header.starts_with("#pragma once\n#include <stdbool.h>\n#include <stdint.h>\n"));
    assert!(header.contains("extern const int x[1];\n"), "header:\n{header}");

    let source = fs.contents("src/demo.c").unwrap();
    assert!(source.starts_with("#include \"demo.h\"\n"));
    assert!(source.contains("const int x[1] = { 5 };\n"), "source:\n{source}");
}

/// A PL/0 program whose root block calls `Print(42)`
fn print_fixture(hlir: &mut HlirArena) -> ModuleSet {
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
    modules
}

#[test]
fn test_entry_function_emission() {
    let mut hlir = HlirArena::new();
    let modules = print_fixture(&mut hlir);

    let mut reports = Reporter::new();
    let mut fs = MemoryFs::new();
    compile(&hlir, &modules, &mut reports, &mut fs, &CompileOptions::default())
        .expect("compilation failed");

    // the module path nests and drops nothing (lang != pl0)
    let source = fs.contents("src/pl0/lang.c").unwrap();
    let header = fs.contents("include/pl0/lang.h").unwrap();

    // the import keeps its platform name in the prototype
    assert!(
        header.contains("extern void printf(const char *fmt, ...);\n"),
        "header:\n{header}"
    );

    let expected = "int main(void) {\n\
                    \tgoto bb0;\n\
                    bb0: /* len = 2 */\n\
                    \tprintf(\"%d\\n\", 42);\n\
                    \treturn;\n\
                    }\n";
    assert!(source.contains(expected), "source:\n{source}");
}

/// Two private functions calling each other
fn mutual_recursion_fixture(hlir: &mut HlirArena) -> ModuleSet {
    let unit = hlir.type_unit(node(), "unit");

    let f = hlir.begin_function(
        node(),
        "f",
        Signature { params: vec![], result: unit, variadic: false },
    );
    hlir.set_attributes(f, Attributes::new(Linkage::Module, Visibility::Private));
    let g = hlir.begin_function(
        node(),
        "g",
        Signature { params: vec![], result: unit, variadic: false },
    );
    hlir.set_attributes(g, Attributes::new(Linkage::Module, Visibility::Private));

    let call_g = hlir.call(node(), g, vec![]);
    let f_body = hlir.stmts(node(), vec![call_g]);
    close_function(hlir, f, f_body);

    let call_f = hlir.call(node(), f, vec![]);
    let g_body = hlir.stmts(node(), vec![call_f]);
    close_function(hlir, g, g_body);

    let module = hlir.module(node(), "m", vec![], vec![], vec![f, g]);
    let mut modules = ModuleSet::new();
    modules.insert("m".into(), module);
    modules
}

#[test]
fn test_mutual_recursion_prototypes_precede_definitions() {
    let mut hlir = HlirArena::new();
    let modules = mutual_recursion_fixture(&mut hlir);

    let mut reports = Reporter::new();
    let mut fs = MemoryFs::new();
    compile(&hlir, &modules, &mut reports, &mut fs, &CompileOptions::default())
        .expect("compilation failed");

    let source = fs.contents("src/m.c").unwrap();

    let f_proto = source.find("static void _ZN1m1fE(void);").expect("missing f prototype");
    let g_proto = source.find("static void _ZN1m1gE(void);").expect("missing g prototype");
    let f_def = source.find("static void _ZN1m1fE(void) {").expect("missing f definition");
    let g_def = source.find("static void _ZN1m1gE(void) {").expect("missing g definition");

    assert!(f_proto < f_def && f_proto < g_def);
    assert!(g_proto < f_def && g_proto < g_def);

    // each body calls the other by mangled name
    assert!(source.contains("\t_ZN1m1gE();\n"));
    assert!(source.contains("\t_ZN1m1fE();\n"));
}

/// Module `a.a` exports `foo`; module `b.b` calls it
fn cross_module_fixture(hlir: &mut HlirArena) -> ModuleSet {
    let unit = hlir.type_unit(node(), "unit");

    let foo = hlir.begin_function(
        node(),
        "foo",
        Signature { params: vec![], result: unit, variadic: false },
    );
    hlir.set_attributes(foo, Attributes::new(Linkage::Export, Visibility::Public));
    let foo_body = hlir.stmts(node(), vec![]);
    close_function(hlir, foo, foo_body);
    let module_a = hlir.module(node(), "a", vec![], vec![], vec![foo]);

    let bar = hlir.begin_function(
        node(),
        "bar",
        Signature { params: vec![], result: unit, variadic: false },
    );
    hlir.set_attributes(bar, Attributes::new(Linkage::Module, Visibility::Private));
    let call_foo = hlir.call(node(), foo, vec![]);
    let bar_body = hlir.stmts(node(), vec![call_foo]);
    close_function(hlir, bar, bar_body);
    let module_b = hlir.module(node(), "b", vec![], vec![], vec![bar]);

    let mut modules = ModuleSet::new();
    modules.insert("a.a".into(), module_a);
    modules.insert("b.b".into(), module_b);
    modules
}

#[test]
fn test_cross_module_dependency() {
    let mut hlir = HlirArena::new();
    let modules = cross_module_fixture(&mut hlir);

    let mut reports = Reporter::new();
    let mut fs = MemoryFs::new();
    compile(&hlir, &modules, &mut reports, &mut fs, &CompileOptions::default())
        .expect("compilation failed");

    // the trailing path component equal to the module name is dropped
    assert_eq!(
        fs.paths(),
        vec![
            "include/a/a.h".to_string(),
            "include/b/b.h".to_string(),
            "src/a/a.c".to_string(),
            "src/b/b.c".to_string(),
        ]
    );

    let b_header = fs.contents("include/b/b.h").unwrap();
    assert!(b_header.contains("#include \"a/a.h\"\n"), "header:\n{b_header}");

    // foo's mangled name appears at both the declaration and the call site
    let a_header = fs.contents("include/a/a.h").unwrap();
    let b_source = fs.contents("src/b/b.c").unwrap();
    assert!(a_header.contains("void _ZN1a1a3fooE(void);\n"));
    assert!(b_source.contains("\t_ZN1a1a3fooE();\n"));
}

#[test]
fn test_emission_is_deterministic() {
    let mut hlir = HlirArena::new();
    let modules = cross_module_fixture(&mut hlir);

    let mut reports = Reporter::new();
    let program = cthulhu::lower(&hlir, &modules, &mut reports, &CompileOptions::default())
        .expect("lowering failed");

    let mut first = MemoryFs::new();
    let mut second = MemoryFs::new();
    emit_c89(&program, &mut first, &mut reports, &EmitOptions::default()).unwrap();
    emit_c89(&program, &mut second, &mut reports, &EmitOptions::default()).unwrap();

    assert_eq!(first.paths(), second.paths());
    for path in first.paths() {
        assert_eq!(first.contents(&path), second.contents(&path), "file {path} differs");
    }
}

#[test]
fn test_flat_layout() {
    let mut hlir = HlirArena::new();
    let modules = cross_module_fixture(&mut hlir);

    let mut reports = Reporter::new();
    let program = cthulhu::lower(&hlir, &modules, &mut reports, &CompileOptions::default())
        .expect("lowering failed");

    let mut fs = MemoryFs::new();
    let options = EmitOptions { layout: PathLayout::Flat };
    emit_c89(&program, &mut fs, &mut reports, &options).unwrap();

    assert_eq!(
        fs.paths(),
        vec![
            "include/a.a.h".to_string(),
            "include/b.b.h".to_string(),
            "src/a.a.c".to_string(),
            "src/b.b.c".to_string(),
        ]
    );
    let b_header = fs.contents("include/b.b.h").unwrap();
    assert!(b_header.contains("#include \"a.a.h\"\n"));
}

#[test]
fn test_locals_and_branches_render() {
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
    hlir.set_attributes(func, Attributes::new(Linkage::Export, Visibility::Public));
    let y = hlir.local(node(), "y", int);
    hlir.add_local(func, y);

    let read_x = hlir.load(node(), x);
    let ten = hlir.int_literal(node(), int, 10);
    let cond = hlir.compare(node(), boolean, cthulhu::ops::CompareOp::Lt, read_x, ten);
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
    let mut fs = MemoryFs::new();
    compile(&hlir, &modules, &mut reports, &mut fs, &CompileOptions::default())
        .expect("compilation failed");

    let source = fs.contents("src/m.c").unwrap();

    // the local declares as a one-element array and stores go through [0]
    assert!(source.contains("\tint y[1];\n"), "source:\n{source}");
    assert!(source.contains("\ty[0] = 1;\n"));
    assert!(source.contains("\ty[0] = 2;\n"));
    // the param reads through its address, the condition through a vreg
    assert!(source.contains("\tint vreg0 = (&x)[0];\n"));
    assert!(source.contains("\tbool vreg1 = (vreg0 < 10);\n"));
    assert!(source.contains("\tif (vreg1) { goto bb1; } else { goto bb2; }\n"));
    assert!(source.contains("\tgoto bb3;\n"));
}

#[test]
fn test_leftover_forward_fails_compilation() {
    let mut hlir = HlirArena::new();
    let int = hlir.type_digit(node(), "int", Digit::Int, Sign::Signed);
    let pending = hlir.begin_global(node(), "pending", int);
    let module = hlir.module(node(), "m", vec![], vec![pending], vec![]);

    let mut modules = ModuleSet::new();
    modules.insert("m".into(), module);

    let mut reports = Reporter::new();
    let mut fs = MemoryFs::new();
    let result = compile(&hlir, &modules, &mut reports, &mut fs, &CompileOptions::default());
    assert!(result.is_err());
    assert!(reports.has_fatal());
}
