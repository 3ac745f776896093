//! C89 type rendering
//!
//! Types render with an optional trailing declarator name so one function
//! serves declarations, prototypes and casts. Qualifier keywords come ahead
//! of the inner rendering; a qualified type without the mutable flag is
//! const.

use crate::ops::{Digit, Quals, Sign};
use crate::ssa::{SsaParam, SsaType};

fn digit_name(width: Digit, sign: Sign) -> &'static str {
    match width {
        Digit::Char => match sign {
            Sign::Signed => "char",
            Sign::Unsigned => "unsigned char",
        },
        Digit::Short => match sign {
            Sign::Signed => "short",
            Sign::Unsigned => "unsigned short",
        },
        Digit::Int => match sign {
            Sign::Signed => "int",
            Sign::Unsigned => "unsigned int",
        },
        Digit::Long => match sign {
            Sign::Signed => "long",
            Sign::Unsigned => "unsigned long",
        },
        Digit::Size => match sign {
            Sign::Signed => "ptrdiff_t",
            Sign::Unsigned => "size_t",
        },
        Digit::Ptr => match sign {
            Sign::Signed => "intptr_t",
            Sign::Unsigned => "uintptr_t",
        },
        Digit::Max => match sign {
            Sign::Signed => "intmax_t",
            Sign::Unsigned => "uintmax_t",
        },
    }
}

fn qual_keywords(quals: Quals) -> Vec<&'static str> {
    let mut parts = Vec::new();
    if !quals.contains(Quals::MUTABLE) {
        parts.push("const");
    }
    if quals.contains(Quals::VOLATILE) {
        parts.push("volatile");
    }
    if quals.contains(Quals::ATOMIC) {
        parts.push("_Atomic");
    }
    parts
}

fn with_name(base: &str, name: Option<&str>) -> String {
    match name {
        Some(name) => format!("{base} {name}"),
        None => base.to_string(),
    }
}

/// Render a type, optionally naming the declarator
pub fn format_type(ty: &SsaType, name: Option<&str>) -> String {
    match ty {
        SsaType::Empty => panic!("the empty type indicates unreachable code and cannot be emitted"),
        SsaType::Unit => with_name("void", name),
        SsaType::Bool => with_name("bool", name),
        SsaType::String => match name {
            Some(name) => format!("const char *{name}"),
            None => "const char *".to_string(),
        },
        SsaType::Digit { width, sign } => with_name(digit_name(*width, *sign), name),
        SsaType::Pointer(inner) => {
            let inner = format_type(inner, None);
            match name {
                Some(name) => format!("{inner} *{name}"),
                None => format!("{inner} *"),
            }
        }
        SsaType::Array { element, length } => {
            let element = format_type(element, None);
            match name {
                Some(name) => format!("{element} {name}[{length}]"),
                None => format!("{element}[{length}]"),
            }
        }
        SsaType::Closure { params, result, variadic } => {
            let result = format_type(result, None);
            let params = format_params(params, *variadic);
            format!("{result} (*{})({params})", name.unwrap_or(""))
        }
        SsaType::Struct { name: tag, .. } => with_name(&format!("struct {tag}"), name),
        SsaType::Union { name: tag, .. } => with_name(&format!("union {tag}"), name),
        SsaType::Qualify { inner, quals } => {
            let keywords = qual_keywords(*quals);
            let inner = format_type(inner, name);
            if keywords.is_empty() {
                inner
            } else {
                format!("{} {inner}", keywords.join(" "))
            }
        }
        SsaType::Opaque { .. } => match name {
            Some(name) => format!("void *{name}"),
            None => "void *".to_string(),
        },
    }
}

/// Render a parameter list; empty lists spell `void` unless variadic
pub fn format_params(params: &[SsaParam], variadic: bool) -> String {
    if params.is_empty() {
        return if variadic { "...".to_string() } else { "void".to_string() };
    }

    let all: Vec<String> = params
        .iter()
        .map(|param| format_type(&param.ty, Some(&param.name)))
        .collect();
    let joined = all.join(", ");
    if variadic {
        format!("{joined}, ...")
    } else {
        joined
    }
}
