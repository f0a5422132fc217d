use std::fmt;

use strum::EnumString;

/// Type-identity token for a runtime value.
///
/// One token per primitive kind plus one per composite variant. Every
/// dynamic-dispatch decision in the value model compares these tokens;
/// two values with different tokens are never equal.
///
/// Parsed from Python type names via strum (e.g., "int", "list"); displayed
/// with the same names for error messages.
#[derive(Debug, Clone, Copy, EnumString, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[strum(serialize_all = "lowercase")]
pub enum Type {
    #[strum(serialize = "NoneType")]
    NoneType,
    Bool,
    Int,
    Float,
    Complex,
    Str,
    List,
}

impl Type {
    /// Returns true for the six primitive (by-value) kinds.
    #[must_use]
    pub fn is_primitive(self) -> bool {
        !self.is_composite()
    }

    /// Returns true for kinds represented as heap-allocated objects.
    #[must_use]
    pub fn is_composite(self) -> bool {
        matches!(self, Self::List)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoneType => f.write_str("NoneType"),
            Self::Bool => f.write_str("bool"),
            Self::Int => f.write_str("int"),
            Self::Float => f.write_str("float"),
            Self::Complex => f.write_str("complex"),
            Self::Str => f.write_str("str"),
            Self::List => f.write_str("list"),
        }
    }
}
