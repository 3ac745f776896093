//! Module and scope management
//!
//! Each scope keeps three independent name maps, one per [`Tag`]. Lookups
//! walk outward through the enclosing scope chain; definitions land in the
//! innermost scope and report a shadow when a *different* declaration
//! already holds the name there. Re-registering the same declaration is
//! idempotent.

use super::build::HlirArena;
use super::ir::{HlirId, HlirKind, HlirTag};
use crate::diagnostics::CompileError;
use indexmap::IndexMap;

/// Which of a module's symbol tables a name lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    Values,
    Procs,
    Types,
}

pub const TAG_COUNT: usize = 3;

impl Tag {
    fn index(self) -> usize {
        match self {
            Tag::Values => 0,
            Tag::Procs => 1,
            Tag::Types => 2,
        }
    }
}

/// One scope level
#[derive(Debug, Default)]
struct Scope {
    maps: [IndexMap<String, HlirId>; TAG_COUNT],
}

/// Scope chain for one module
#[derive(Debug)]
pub struct SymbolTable {
    scopes: Vec<Scope>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope::default()],
        }
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(Scope::default());
    }

    pub fn pop_scope(&mut self) {
        assert!(self.scopes.len() > 1, "popping the module scope");
        self.scopes.pop();
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// Bind `name` to `decl` in the innermost scope
    pub fn set(
        &mut self,
        hlir: &HlirArena,
        tag: Tag,
        name: impl Into<String>,
        decl: HlirId,
    ) -> Result<(), CompileError> {
        let name = name.into();
        let scope = self.scopes.last_mut().expect("scope stack is never empty");
        match scope.maps[tag.index()].get(&name) {
            Some(&previous) if previous == decl => Ok(()),
            Some(&previous) => Err(CompileError::Shadow {
                name,
                node: hlir.node_of(decl),
                previous: hlir.node_of(previous),
            }),
            None => {
                scope.maps[tag.index()].insert(name, decl);
                Ok(())
            }
        }
    }

    /// Look a name up, walking outward through enclosing scopes
    pub fn get(&self, tag: Tag, name: &str) -> Option<HlirId> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.maps[tag.index()].get(name).copied())
    }

    /// Look a name up in the innermost scope only
    pub fn get_local(&self, tag: Tag, name: &str) -> Option<HlirId> {
        self.scopes
            .last()
            .and_then(|scope| scope.maps[tag.index()].get(name).copied())
    }

    /// All bindings of one tag in the module (outermost) scope, in
    /// definition order
    pub fn module_tag(&self, tag: Tag) -> impl Iterator<Item = (&str, HlirId)> {
        self.scopes[0].maps[tag.index()]
            .iter()
            .map(|(name, id)| (name.as_str(), *id))
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Does this statement end control flow within its block?
fn is_terminator(hlir: &HlirArena, stmt: HlirId) -> bool {
    matches!(hlir.get(stmt).kind, HlirKind::Return { .. })
}

/// Finalise a forward function: append a unit return when the body does not
/// already end in a terminator, then attach it.
pub fn close_function(hlir: &mut HlirArena, func: HlirId, body: HlirId) {
    assert!(
        hlir.get(func).is(HlirTag::Forward),
        "close_function called on an already-built function"
    );

    let needs_return = match &hlir.get(body).kind {
        HlirKind::Stmts { stmts } => stmts
            .last()
            .is_none_or(|last| !is_terminator(hlir, *last)),
        _ => !is_terminator(hlir, body),
    };

    let closed = if needs_return {
        let node = hlir.node_of(body);
        let ret = hlir.ret(node, None);
        match &mut hlir.get_mut(body).kind {
            HlirKind::Stmts { stmts } => {
                stmts.push(ret);
                body
            }
            _ => hlir.stmts(node, vec![body, ret]),
        }
    } else {
        body
    };

    hlir.build_function(func, Some(closed));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Node;
    use crate::hlir::Signature;
    use crate::ops::{Digit, Sign};

    fn node() -> Node {
        Node::builtin()
    }

    #[test]
    fn test_shadow_is_reported() {
        let mut hlir = HlirArena::new();
        let int = hlir.type_digit(node(), "int", Digit::Int, Sign::Signed);
        let a = hlir.global(node(), "x", int, None);
        let b = hlir.global(node(), "x", int, None);

        let mut table = SymbolTable::new();
        table.set(&hlir, Tag::Values, "x", a).unwrap();
        // same decl again is fine
        table.set(&hlir, Tag::Values, "x", a).unwrap();
        // a different decl under the same name is a shadow
        assert!(matches!(
            table.set(&hlir, Tag::Values, "x", b),
            Err(CompileError::Shadow { .. })
        ));
    }

    #[test]
    fn test_tags_are_independent() {
        let mut hlir = HlirArena::new();
        let int = hlir.type_digit(node(), "int", Digit::Int, Sign::Signed);
        let value = hlir.global(node(), "thing", int, None);

        let mut table = SymbolTable::new();
        table.set(&hlir, Tag::Values, "thing", value).unwrap();
        table.set(&hlir, Tag::Types, "thing", int).unwrap();

        assert_eq!(table.get(Tag::Values, "thing"), Some(value));
        assert_eq!(table.get(Tag::Types, "thing"), Some(int));
        assert_eq!(table.get(Tag::Procs, "thing"), None);
    }

    #[test]
    fn test_lookup_walks_scope_chain() {
        let mut hlir = HlirArena::new();
        let int = hlir.type_digit(node(), "int", Digit::Int, Sign::Signed);
        let outer = hlir.global(node(), "x", int, None);
        let inner = hlir.local(node(), "x", int);

        let mut table = SymbolTable::new();
        table.set(&hlir, Tag::Values, "x", outer).unwrap();

        table.push_scope();
        assert_eq!(table.get(Tag::Values, "x"), Some(outer));

        table.set(&hlir, Tag::Values, "x", inner).unwrap();
        assert_eq!(table.get(Tag::Values, "x"), Some(inner));

        table.pop_scope();
        assert_eq!(table.get(Tag::Values, "x"), Some(outer));
    }

    #[test]
    fn test_close_function_appends_unit_return() {
        let mut hlir = HlirArena::new();
        let unit = hlir.type_unit(node(), "unit");
        let func = hlir.begin_function(
            node(),
            "noop",
            Signature { params: vec![], result: unit, variadic: false },
        );
        let body = hlir.stmts(node(), vec![]);
        close_function(&mut hlir, func, body);

        let HlirKind::Function { body: Some(body), .. } = &hlir.get(func).kind else {
            panic!("function did not close");
        };
        let HlirKind::Stmts { stmts } = &hlir.get(*body).kind else {
            panic!("body is not a block");
        };
        assert_eq!(stmts.len(), 1);
        assert!(matches!(
            hlir.get(stmts[0]).kind,
            HlirKind::Return { value: None }
        ));
    }

    #[test]
    fn test_close_function_keeps_existing_return() {
        let mut hlir = HlirArena::new();
        let int = hlir.type_digit(node(), "int", Digit::Int, Sign::Signed);
        let func = hlir.begin_function(
            node(),
            "answer",
            Signature { params: vec![], result: int, variadic: false },
        );
        let value = hlir.int_literal(node(), int, 42);
        let ret = hlir.ret(node(), Some(value));
        let body = hlir.stmts(node(), vec![ret]);
        close_function(&mut hlir, func, body);

        let HlirKind::Function { body: Some(body), .. } = &hlir.get(func).kind else {
            panic!("function did not close");
        };
        let HlirKind::Stmts { stmts } = &hlir.get(*body).kind else {
            panic!("body is not a block");
        };
        assert_eq!(stmts.len(), 1);
    }
}
