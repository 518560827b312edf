use thiserror::Error;

/// Errors raised when reading typed slices out of a [`ComposedState`](crate::ComposedState).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    /// No slice is registered under this key.
    #[error("Unknown slice: {0}")]
    UnknownSlice(String),

    /// A slice exists under this key but holds a different state type.
    ///
    /// This happens when two `SliceKey`s share a name but disagree on types.
    #[error("Slice {0} does not hold the requested state type")]
    SliceTypeMismatch(String),

    /// Slice state does not serialize to a JSON object, so it cannot be merged field by field.
    #[error("Slice {0} does not serialize to a record")]
    NotARecord(String),

    /// Slice state could not be converted to or from JSON.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StateError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}
