//! Pre-lowering validation
//!
//! The SSA builder assumes completed, well-typed input. This pass walks a
//! module and reports the contract breaches a front end is most likely to
//! hand us: leftover forwards, stores into const storage, non-bool branch
//! conditions, and call arity mismatches. Error nodes poison checks; they
//! are skipped rather than re-reported.

use super::build::HlirArena;
use super::ir::{HlirId, HlirKind, HlirTag};
use crate::diagnostics::{CompileError, Reporter, Severity};

pub fn validate_module(hlir: &HlirArena, module: HlirId, reports: &mut Reporter) {
    let HlirKind::Module { globals, functions, .. } = &hlir.get(module).kind else {
        reports.report(
            Severity::Internal,
            hlir.node_of(module),
            format!("expected a module, found {}", hlir.kind_of(module).name()),
        );
        return;
    };

    for &global in globals {
        validate_decl(hlir, global, reports);
        if let HlirKind::Global { value: Some(value), .. } = &hlir.get(global).kind {
            validate_expr(hlir, *value, reports);
        }
    }

    for &function in functions {
        validate_decl(hlir, function, reports);
        if let HlirKind::Function { body: Some(body), .. } = &hlir.get(function).kind {
            validate_stmt(hlir, *body, reports);
        }
    }
}

fn validate_decl(hlir: &HlirArena, decl: HlirId, reports: &mut Reporter) {
    let found = hlir.get(decl);
    match &found.kind {
        HlirKind::Forward { decl, expected, .. } => {
            reports.report(
                Severity::Internal,
                found.node,
                format!(
                    "`{}` is still forward-declared (expected {})",
                    decl.name,
                    expected.name()
                ),
            );
        }
        HlirKind::Function { decl, body, .. } => {
            if body.is_none() && !decl.attribs.linkage.is_imported() {
                reports.report(
                    Severity::Fatal,
                    found.node,
                    format!("function `{}` has no body and is not imported", decl.name),
                );
            }
        }
        _ => {}
    }
}

fn validate_stmt(hlir: &HlirArena, stmt: HlirId, reports: &mut Reporter) {
    match &hlir.get(stmt).kind {
        HlirKind::Error { .. } => {}
        HlirKind::Stmts { stmts } => {
            for &inner in stmts {
                validate_stmt(hlir, inner, reports);
            }
        }
        HlirKind::Return { value } => {
            if let Some(value) = value {
                validate_expr(hlir, *value, reports);
            }
        }
        HlirKind::Assign { dst, src } => {
            validate_assign(hlir, stmt, *dst, *src, reports);
        }
        HlirKind::Branch { cond, then, other } | HlirKind::Loop { cond, body: then, other } => {
            validate_cond(hlir, *cond, reports);
            validate_stmt(hlir, *then, reports);
            if let Some(other) = other {
                validate_stmt(hlir, *other, reports);
            }
        }
        // expression in statement position
        _ => validate_expr(hlir, stmt, reports),
    }
}

fn validate_assign(hlir: &HlirArena, stmt: HlirId, dst: HlirId, src: HlirId, reports: &mut Reporter) {
    if hlir.get(dst).is(HlirTag::Error) || hlir.get(src).is(HlirTag::Error) {
        return;
    }

    let Some(dst_type) = hlir.get(dst).of else {
        reports.report(
            Severity::Internal,
            hlir.node_of(stmt),
            "assignment destination has no type",
        );
        return;
    };

    // only explicitly mutable storage may be stored to
    if hlir.quals_of(dst_type).is_const()
        && matches!(hlir.get(hlir.follow_type(dst_type)).kind, HlirKind::TypeQualify { .. })
    {
        let name = hlir.name_of(dst).unwrap_or("<expr>").to_string();
        reports.error(CompileError::TypeMismatch {
            message: format!("cannot assign to const `{name}`"),
            node: hlir.node_of(stmt),
        });
    }

    if let Some(src_type) = hlir.get(src).of
        && !hlir.type_eq(dst_type, src_type)
    {
        reports.error(CompileError::TypeMismatch {
            message: "assignment source and destination types differ".into(),
            node: hlir.node_of(stmt),
        });
    }

    validate_expr(hlir, src, reports);
}

fn validate_cond(hlir: &HlirArena, cond: HlirId, reports: &mut Reporter) {
    if hlir.get(cond).is(HlirTag::Error) {
        return;
    }
    let Some(ty) = hlir.get(cond).of else {
        reports.report(Severity::Internal, hlir.node_of(cond), "condition has no type");
        return;
    };
    let followed = hlir.unqualified_type(hlir.follow_type(ty));
    if !hlir.get(followed).is(HlirTag::TypeBool) {
        reports.error(CompileError::TypeMismatch {
            message: "branch condition is not a bool".into(),
            node: hlir.node_of(cond),
        });
    }
    validate_expr(hlir, cond, reports);
}

fn validate_expr(hlir: &HlirArena, expr: HlirId, reports: &mut Reporter) {
    match &hlir.get(expr).kind {
        HlirKind::Error { .. } => {}
        HlirKind::Unary { operand, .. } => validate_expr(hlir, *operand, reports),
        HlirKind::Binary { lhs, rhs, .. } | HlirKind::Compare { lhs, rhs, .. } => {
            validate_expr(hlir, *lhs, reports);
            validate_expr(hlir, *rhs, reports);
        }
        HlirKind::Cast { expr: inner, .. } | HlirKind::Addr { expr: inner } => {
            validate_expr(hlir, *inner, reports);
        }
        HlirKind::Load { read } => validate_expr(hlir, *read, reports),
        HlirKind::Member { object, .. } => validate_expr(hlir, *object, reports),
        HlirKind::Index { array, index } => {
            validate_expr(hlir, *array, reports);
            validate_expr(hlir, *index, reports);
        }
        HlirKind::Call { callee, args } => validate_call(hlir, expr, *callee, args, reports),
        _ => {}
    }
}

fn validate_call(
    hlir: &HlirArena,
    expr: HlirId,
    callee: HlirId,
    args: &[HlirId],
    reports: &mut Reporter,
) {
    if hlir.get(callee).is(HlirTag::Error) {
        return;
    }

    let Some(signature) = hlir.closure_of(callee) else {
        reports.error(CompileError::TypeMismatch {
            message: "call target is not a function".into(),
            node: hlir.node_of(expr),
        });
        return;
    };

    let arity = signature.params.len();
    let variadic = signature.variadic;
    let ok = if variadic {
        args.len() >= arity
    } else {
        args.len() == arity
    };
    if !ok {
        reports.error(CompileError::TypeMismatch {
            message: format!(
                "call passes {} arguments but the function takes {}{}",
                args.len(),
                arity,
                if variadic { " or more" } else { "" }
            ),
            node: hlir.node_of(expr),
        });
    }

    for &arg in args {
        validate_expr(hlir, arg, reports);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Node;
    use crate::hlir::Signature;
    use crate::ops::{Digit, Quals, Sign};

    fn node() -> Node {
        Node::builtin()
    }

    #[test]
    fn test_leftover_forward_is_internal() {
        let mut hlir = HlirArena::new();
        let int = hlir.type_digit(node(), "int", Digit::Int, Sign::Signed);
        let forward = hlir.begin_global(node(), "pending", int);
        let module = hlir.module(node(), "m", vec![], vec![forward], vec![]);

        let mut reports = Reporter::new();
        validate_module(&hlir, module, &mut reports);
        assert!(reports.has_fatal());
    }

    #[test]
    fn test_assign_to_const_is_rejected() {
        let mut hlir = HlirArena::new();
        let int = hlir.type_digit(node(), "int", Digit::Int, Sign::Signed);
        let unit = hlir.type_unit(node(), "unit");
        let konst = hlir.type_qualify(node(), int, Quals::DEFAULT);
        let global = hlir.global(node(), "k", konst, None);

        let value = hlir.int_literal(node(), int, 1);
        let assign = hlir.assign(node(), global, value);
        let body = hlir.stmts(node(), vec![assign]);
        let func = hlir.function(
            node(),
            "poke",
            Signature { params: vec![], result: unit, variadic: false },
            Some(body),
        );
        let module = hlir.module(node(), "m", vec![], vec![global], vec![func]);

        let mut reports = Reporter::new();
        validate_module(&hlir, module, &mut reports);
        assert!(reports.has_fatal());
        assert!(matches!(
            reports.errors()[0],
            CompileError::TypeMismatch { .. }
        ));
    }

    #[test]
    fn test_call_arity_checked() {
        let mut hlir = HlirArena::new();
        let int = hlir.type_digit(node(), "int", Digit::Int, Sign::Signed);
        let unit = hlir.type_unit(node(), "unit");
        let param = hlir.param(node(), "n", int);
        let callee = hlir.function(
            node(),
            "take",
            Signature { params: vec![param], result: unit, variadic: false },
            None,
        );
        hlir.set_attributes(
            callee,
            crate::hlir::Attributes::new(crate::ops::Linkage::Import, crate::ops::Visibility::Public),
        );
        let call = hlir.call(node(), callee, vec![]);
        let body = hlir.stmts(node(), vec![call]);
        let func = hlir.function(
            node(),
            "caller",
            Signature { params: vec![], result: unit, variadic: false },
            Some(body),
        );
        let module = hlir.module(node(), "m", vec![], vec![], vec![func]);

        let mut reports = Reporter::new();
        validate_module(&hlir, module, &mut reports);
        assert!(reports.has_fatal());
    }
}
