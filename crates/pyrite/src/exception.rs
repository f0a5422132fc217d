use std::{borrow::Cow, fmt};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

use crate::types::Type;

/// Result type alias for operations that can produce a runtime error.
pub type RunResult<T> = Result<T, RunError>;

/// Exception types raised by the value model.
///
/// Uses strum derives for automatic `Display`, `FromStr`, and `Into<&'static str>`
/// implementations. The string representation matches the variant name exactly
/// (e.g., `ValueError` -> "ValueError").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr, Serialize, Deserialize)]
pub enum ExcType {
    /// Index out of the valid range after normalization.
    IndexError,
    /// Operation invoked on a value whose active variant does not support it,
    /// or an operand-type mismatch.
    TypeError,
    /// Value not found, e.g. `remove`/`index` on an absent element.
    ValueError,
}

impl ExcType {
    /// Creates a TypeError with the given message.
    pub(crate) fn type_error(msg: impl fmt::Display) -> RunError {
        SimpleException::new_msg(Self::TypeError, msg).into()
    }

    /// Creates a ValueError with the given message.
    pub(crate) fn value_error(msg: impl fmt::Display) -> RunError {
        SimpleException::new_msg(Self::ValueError, msg).into()
    }

    /// Creates an IndexError with the given message.
    pub(crate) fn index_error(msg: impl fmt::Display) -> RunError {
        SimpleException::new_msg(Self::IndexError, msg).into()
    }

    /// `TypeError: 'float' object is not iterable`
    pub(crate) fn type_error_not_iterable(value_type: Type) -> RunError {
        Self::type_error(format!("'{value_type}' object is not iterable"))
    }

    /// `TypeError: 'float' object is not subscriptable`
    pub(crate) fn type_error_not_subscriptable(value_type: Type) -> RunError {
        Self::type_error(format!("'{value_type}' object is not subscriptable"))
    }

    /// `TypeError: 'int' object has no attribute 'append'`
    pub(crate) fn type_error_no_attribute(value_type: Type, attr: &str) -> RunError {
        Self::type_error(format!("'{value_type}' object has no attribute '{attr}'"))
    }

    /// `TypeError: 'str' object does not support item assignment`
    pub(crate) fn type_error_no_item_assignment(value_type: Type) -> RunError {
        Self::type_error(format!("'{value_type}' object does not support item assignment"))
    }

    /// `TypeError: '<' not supported between instances of 'str' and 'int'`
    pub(crate) fn type_error_not_comparable(left: Type, right: Type) -> RunError {
        Self::type_error(format!(
            "'<' not supported between instances of '{left}' and '{right}'"
        ))
    }

    /// `IndexError: list index out of range`
    pub(crate) fn index_error_list_out_of_range() -> RunError {
        Self::index_error("list index out of range")
    }

    /// `IndexError: pop from empty list`
    pub(crate) fn index_error_pop_empty_list() -> RunError {
        Self::index_error("pop from empty list")
    }

    /// `IndexError: pop index out of range`
    pub(crate) fn index_error_pop_out_of_range() -> RunError {
        Self::index_error("pop index out of range")
    }
}

/// Simple lightweight representation of an exception.
///
/// Carries the exception type and an optional free-text diagnostic message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SimpleException {
    exc_type: ExcType,
    msg: Option<String>,
}

impl SimpleException {
    /// Creates a new exception with the given type and optional message.
    #[must_use]
    pub fn new(exc_type: ExcType, msg: Option<String>) -> Self {
        Self { exc_type, msg }
    }

    /// Creates a new exception with the given type and message.
    #[must_use]
    pub fn new_msg(exc_type: ExcType, msg: impl fmt::Display) -> Self {
        Self {
            exc_type,
            msg: Some(msg.to_string()),
        }
    }

    /// Returns the exception type.
    #[must_use]
    pub fn exc_type(&self) -> ExcType {
        self.exc_type
    }

    /// Returns the diagnostic message, if any.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.msg.as_deref()
    }
}

impl fmt::Display for SimpleException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.msg {
            Some(msg) => write!(f, "{}: {msg}", self.exc_type),
            None => write!(f, "{}", self.exc_type),
        }
    }
}

/// Runtime error types that can occur during value operations.
///
/// Two variants:
/// - `Exc`: a typed exception from the taxonomy (IndexError, TypeError, ValueError)
/// - `Internal`: invariant violation in the runtime itself, not caused by the caller
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunError {
    /// Typed exception raised by a value operation.
    Exc(SimpleException),
    /// Internal runtime error - indicates a bug in pyrite, not in the embedder.
    Internal(Cow<'static, str>),
}

impl From<SimpleException> for RunError {
    fn from(exc: SimpleException) -> Self {
        Self::Exc(exc)
    }
}

impl RunError {
    /// Creates an internal error from a static or owned message.
    pub fn internal(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns the exception type, or `None` for internal errors.
    #[must_use]
    pub fn exc_type(&self) -> Option<ExcType> {
        match self {
            Self::Exc(exc) => Some(exc.exc_type()),
            Self::Internal(_) => None,
        }
    }

    /// Returns true if this error is a catchable exception of `exc_type`.
    #[must_use]
    pub fn is_exception_type(&self, exc_type: ExcType) -> bool {
        self.exc_type() == Some(exc_type)
    }
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exc(exc) => write!(f, "{exc}"),
            Self::Internal(msg) => write!(f, "internal error in pyrite: {msg}"),
        }
    }
}

impl std::error::Error for RunError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exc_type_display_matches_python_names() {
        assert_eq!(ExcType::IndexError.to_string(), "IndexError");
        assert_eq!(ExcType::TypeError.to_string(), "TypeError");
        assert_eq!(ExcType::ValueError.to_string(), "ValueError");
    }

    #[test]
    fn simple_exception_display() {
        let exc = SimpleException::new_msg(ExcType::ValueError, "x not in list");
        assert_eq!(exc.to_string(), "ValueError: x not in list");
        let bare = SimpleException::new(ExcType::IndexError, None);
        assert_eq!(bare.to_string(), "IndexError");
    }

    #[test]
    fn run_error_kind_predicates() {
        let err = ExcType::index_error_pop_empty_list();
        assert!(err.is_exception_type(ExcType::IndexError));
        assert!(!err.is_exception_type(ExcType::TypeError));
        assert_eq!(RunError::internal("corrupted slot").exc_type(), None);
    }
}
