//! Itanium-style name mangling
//!
//! A symbol mangles as `_Z` plus a nested-name-specifier built from its
//! module path and name, plus (for functions) an argument-type string.
//! Path segments containing `-`, `.` or `/` split into further
//! `<len><name>` runs without nested `N…E` groups.

use crate::ops::{Digit, Sign};
use crate::ssa::SsaType;

/// Itanium code for a built-in digit type
pub fn mangle_digit(width: Digit, sign: Sign) -> &'static str {
    match width {
        Digit::Char => match sign {
            Sign::Signed => "c",
            Sign::Unsigned => "h",
        },
        Digit::Short => match sign {
            Sign::Signed => "s",
            Sign::Unsigned => "t",
        },
        Digit::Int => match sign {
            Sign::Signed => "i",
            Sign::Unsigned => "j",
        },
        Digit::Long | Digit::Ptr | Digit::Max => match sign {
            Sign::Signed => "x",
            Sign::Unsigned => "y",
        },
        Digit::Size => "m",
    }
}

/// Mangle one argument type. `None` means the type has no known mangled
/// form and the caller should warn. Mangling an unresolved type is an
/// invariant violation.
pub fn mangle_type(ty: &SsaType) -> Option<String> {
    match ty {
        SsaType::Digit { width, sign } => Some(mangle_digit(*width, *sign).to_string()),
        SsaType::Bool => Some("b".to_string()),
        SsaType::String => Some("PKc".to_string()),
        SsaType::Unit => Some("v".to_string()),
        SsaType::Pointer(inner) => mangle_type(inner).map(|inner| format!("P{inner}")),
        SsaType::Struct { name, .. } | SsaType::Union { name, .. } => {
            Some(format!("{}{}", name.len(), name))
        }
        SsaType::Qualify { inner, .. } => mangle_type(inner),
        SsaType::Opaque { name } => {
            panic!("mangling unresolved type `{name}`; parameter types must be fully known")
        }
        _ => None,
    }
}

/// Split a path segment on the separators front ends are known to smuggle in
fn split_section(section: &str) -> Vec<&str> {
    section.split(['-', '.', '/']).collect()
}

// only the first segment of a namespace starts with `N`
fn mangle_prefix(index: usize) -> &'static str {
    if index == 0 { "N" } else { "" }
}

fn mangle_section(index: usize, out: &mut String, part: &str) {
    let sections = split_section(part);
    out.push_str(mangle_prefix(index));
    for section in sections {
        out.push_str(&format!("{}{}", section.len(), section));
    }
}

/// Mangle a symbol name. `params` carries the function's parameter types;
/// pass `None` for globals. Argument types with no known mangled form
/// contribute nothing; probe them with [`mangle_type`] first to warn.
pub fn mangle_name(path: &[String], name: &str, params: Option<&[SsaType]>) -> String {
    let mut result = String::from("_Z");

    if path.is_empty() {
        result.push_str(&format!("{}{}", name.len(), name));
    } else {
        for (index, segment) in path.iter().enumerate() {
            mangle_section(index, &mut result, segment);
        }
        result.push_str(&format!("{}{}E", name.len(), name));
    }

    if let Some(params) = params {
        for param in params {
            if let Some(mangled) = mangle_type(param) {
                result.push_str(&mangled);
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn path(segments: &[&str]) -> Vec<String> {
        segments.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_plain_symbol() {
        assert_eq!(mangle_name(&[], "entry", None), "_Z5entry");
    }

    #[test]
    fn test_nested_symbol() {
        assert_eq!(
            mangle_name(&path(&["pl0", "lang"]), "start", None),
            "_ZN3pl04lang5startE"
        );
    }

    #[test]
    fn test_separators_split_into_runs() {
        // embedded separators become extra runs without nested N…E groups
        assert_eq!(
            mangle_name(&path(&["my-lib.core"]), "go", None),
            "_ZN2my3lib4core2goE"
        );
    }

    #[test]
    fn test_function_arguments() {
        let params = [
            SsaType::digit(Digit::Int, Sign::Signed),
            SsaType::Bool,
            SsaType::String,
        ];
        assert_eq!(
            mangle_name(&path(&["m"]), "f", Some(&params)),
            "_ZN1m1fEibPKc"
        );
    }

    #[test]
    fn test_pointer_argument() {
        let params = [SsaType::Pointer(Box::new(SsaType::digit(
            Digit::Char,
            Sign::Unsigned,
        )))];
        assert_eq!(mangle_name(&[], "poke", Some(&params)), "_Z4pokePh");
    }

    #[test]
    fn test_record_argument() {
        let params = [SsaType::Struct { name: "point".into(), fields: vec![] }];
        assert_eq!(mangle_name(&path(&["geo"]), "norm", Some(&params)), "_ZN3geo4normE5point");
    }

    #[test]
    #[should_panic(expected = "unresolved type")]
    fn test_opaque_argument_panics() {
        let params = [SsaType::Opaque { name: "mystery".into() }];
        mangle_name(&[], "bad", Some(&params));
    }

    #[test]
    fn test_digit_codes() {
        assert_eq!(mangle_digit(Digit::Char, Sign::Signed), "c");
        assert_eq!(mangle_digit(Digit::Char, Sign::Unsigned), "h");
        assert_eq!(mangle_digit(Digit::Short, Sign::Signed), "s");
        assert_eq!(mangle_digit(Digit::Short, Sign::Unsigned), "t");
        assert_eq!(mangle_digit(Digit::Int, Sign::Signed), "i");
        assert_eq!(mangle_digit(Digit::Int, Sign::Unsigned), "j");
        assert_eq!(mangle_digit(Digit::Long, Sign::Signed), "x");
        assert_eq!(mangle_digit(Digit::Long, Sign::Unsigned), "y");
        assert_eq!(mangle_digit(Digit::Size, Sign::Unsigned), "m");
    }
}
