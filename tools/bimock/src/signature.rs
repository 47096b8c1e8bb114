//! Structural method identity used to key recorded invocations.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Declaring type, method name and ordered parameter type names.
///
/// Two signatures are equal when all three parts match, so the value survives
/// across process runs of the same code and can be used directly as a map key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MethodSignature {
    pub declaring_type: String,
    pub name: String,
    #[serde(default)]
    pub parameter_types: Vec<String>,
}

impl MethodSignature {
    pub fn new(declaring_type: &str, name: &str, parameter_types: &[&str]) -> Self {
        Self {
            declaring_type: normalize(declaring_type),
            name: name.to_string(),
            parameter_types: parameter_types.iter().map(|t| normalize(t)).collect(),
        }
    }
}

impl fmt::Display for MethodSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}::{}({})",
            self.declaring_type,
            self.name,
            self.parameter_types.join(", ")
        )
    }
}

// `stringify!` may render `& str` or `Vec < u8 >` depending on the token stream.
fn normalize(type_name: &str) -> String {
    let mut out = String::with_capacity(type_name.len());
    for ch in type_name.chars() {
        if ch.is_whitespace() {
            continue;
        }
        if ch == ',' {
            out.push_str(", ");
            continue;
        }
        out.push(ch);
    }
    out
}

/// Builds a [`MethodSignature`] from source tokens:
/// `signature!(Calculator::add(i32, i32))`.
///
/// Generic or path-qualified owners go in angle brackets, as in a qualified
/// path expression: `signature!(<Store<K>>::get(K))` or
/// `signature!(<ledger::Book>::post(u64))`. The owner is recorded exactly as
/// written. Anything else can be built with [`MethodSignature::new`].
#[macro_export]
macro_rules! signature {
    ($owner:ident :: $method:ident ( $($param:ty),* $(,)? )) => {
        $crate::signature::MethodSignature::new(
            stringify!($owner),
            stringify!($method),
            &[$(stringify!($param)),*],
        )
    };
    (< $owner:ty > :: $method:ident ( $($param:ty),* $(,)? )) => {
        $crate::signature::MethodSignature::new(
            stringify!($owner),
            stringify!($method),
            &[$(stringify!($param)),*],
        )
    };
}
