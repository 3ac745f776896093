//! HLIR information queries
//!
//! Read-only views over arena nodes: kinds, types, names, attributes,
//! alias stripping, closure shapes, and structural type equality.

use super::build::HlirArena;
use super::ir::*;
use crate::common::Node;
use crate::ops::Quals;

impl HlirArena {
    pub fn kind_of(&self, id: HlirId) -> HlirTag {
        self.get(id).tag()
    }

    pub fn node_of(&self, id: HlirId) -> Node {
        self.get(id).node
    }

    /// The type a node evaluates to; panics when queried on a node that
    /// cannot carry one
    pub fn type_of(&self, id: HlirId) -> HlirId {
        self.get(id)
            .of
            .unwrap_or_else(|| panic!("node {} has no type", self.kind_of(id).name()))
    }

    pub fn name_of(&self, id: HlirId) -> Option<&str> {
        let hlir = self.get(id);
        if let Some(decl) = hlir.decl() {
            return Some(&decl.name);
        }
        match &hlir.kind {
            HlirKind::TypeEmpty { name }
            | HlirKind::TypeUnit { name }
            | HlirKind::TypeBool { name }
            | HlirKind::TypeDigit { name, .. }
            | HlirKind::TypeString { name }
            | HlirKind::TypeOpaque { name } => Some(name),
            _ => None,
        }
    }

    pub fn attribs_of(&self, id: HlirId) -> Option<&Attributes> {
        self.get(id).decl().map(|decl| &decl.attribs)
    }

    pub fn is_imported(&self, id: HlirId) -> bool {
        self.attribs_of(id)
            .is_some_and(|attribs| attribs.linkage.is_imported())
    }

    /// Strip aliases until a concrete type is reached
    pub fn follow_type(&self, id: HlirId) -> HlirId {
        match &self.get(id).kind {
            HlirKind::Alias { alias, newtype: false, .. } => self.follow_type(*alias),
            _ => id,
        }
    }

    /// Strip aliases, newtypes included
    pub fn real_type(&self, id: HlirId) -> HlirId {
        match &self.get(id).kind {
            HlirKind::Alias { alias, .. } => self.real_type(*alias),
            _ => id,
        }
    }

    /// Strip qualifiers off a type
    pub fn unqualified_type(&self, id: HlirId) -> HlirId {
        match &self.get(id).kind {
            HlirKind::TypeQualify { inner, .. } => self.unqualified_type(*inner),
            _ => id,
        }
    }

    /// Strip aliases and qualifiers until neither applies
    fn strip_type(&self, id: HlirId) -> HlirId {
        let stripped = self.unqualified_type(self.follow_type(id));
        if stripped == id {
            id
        } else {
            self.strip_type(stripped)
        }
    }

    /// The qualifier flags reachable on a type, if any
    pub fn quals_of(&self, id: HlirId) -> Quals {
        match &self.get(id).kind {
            HlirKind::TypeQualify { inner, quals } => quals.union(self.quals_of(*inner)),
            _ => Quals::DEFAULT,
        }
    }

    /// Closure shape of a function declaration, closure type, forward
    /// function, or any expression whose type is a closure; `None` for
    /// anything else
    pub fn closure_of(&self, id: HlirId) -> Option<&Signature> {
        let followed = self.follow_type(id);
        match &self.get(followed).kind {
            HlirKind::TypeClosure { signature } => Some(signature),
            HlirKind::Function { signature, .. } => Some(signature),
            HlirKind::Forward {
                partial: Partial::Function { signature, .. },
                ..
            } => Some(signature),
            _ => self.get(followed).of.and_then(|ty| self.closure_of(ty)),
        }
    }

    pub fn closure_params(&self, id: HlirId) -> &[HlirId] {
        &self
            .closure_of(id)
            .unwrap_or_else(|| panic!("closure_params on non-closure {}", self.kind_of(id).name()))
            .params
    }

    pub fn closure_result(&self, id: HlirId) -> HlirId {
        self.closure_of(id)
            .unwrap_or_else(|| panic!("closure_result on non-closure {}", self.kind_of(id).name()))
            .result
    }

    pub fn closure_variadic(&self, id: HlirId) -> bool {
        self.closure_of(id)
            .unwrap_or_else(|| panic!("closure_variadic on non-closure {}", self.kind_of(id).name()))
            .variadic
    }

    /// Structural type equality. Kinds must match; digits compare width and
    /// sign, pointers their targets and indexability, arrays element and
    /// length, closures params pairwise plus result and variadic flag.
    /// Records compare as the same named declaration. Qualifiers and
    /// (non-newtype) aliases do not participate.
    pub fn type_eq(&self, lhs: HlirId, rhs: HlirId) -> bool {
        let lhs = self.strip_type(lhs);
        let rhs = self.strip_type(rhs);
        if lhs == rhs {
            return true;
        }

        match (&self.get(lhs).kind, &self.get(rhs).kind) {
            (HlirKind::TypeEmpty { .. }, HlirKind::TypeEmpty { .. }) => true,
            (HlirKind::TypeUnit { .. }, HlirKind::TypeUnit { .. }) => true,
            (HlirKind::TypeBool { .. }, HlirKind::TypeBool { .. }) => true,
            (HlirKind::TypeString { .. }, HlirKind::TypeString { .. }) => true,
            (
                HlirKind::TypeDigit { width: lw, sign: ls, .. },
                HlirKind::TypeDigit { width: rw, sign: rs, .. },
            ) => lw == rw && ls == rs,
            (
                HlirKind::TypePointer { pointee: lp, indexable: li },
                HlirKind::TypePointer { pointee: rp, indexable: ri },
            ) => li == ri && self.type_eq(*lp, *rp),
            (
                HlirKind::TypeArray { element: le, length: ll },
                HlirKind::TypeArray { element: re, length: rl },
            ) => ll == rl && self.type_eq(*le, *re),
            (
                HlirKind::TypeClosure { signature: ls },
                HlirKind::TypeClosure { signature: rs },
            ) => {
                ls.variadic == rs.variadic
                    && ls.params.len() == rs.params.len()
                    && self.type_eq(ls.result, rs.result)
                    && ls
                        .params
                        .iter()
                        .zip(&rs.params)
                        .all(|(l, r)| self.type_eq(self.type_of(*l), self.type_of(*r)))
            }
            // records compare by declaration identity, handled by the id
            // comparison above
            _ => false,
        }
    }
}
