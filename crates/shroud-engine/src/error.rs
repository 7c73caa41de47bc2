//! Error types for the proxy engine

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Engine error types
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    /// Context argument is not a source, nor a proxy of one
    #[error("Context object must be a Source instance (not \"{type_name}\")")]
    InvalidContext {
        /// Type of the rejected context
        type_name: String,
    },

    /// Notification requested for a name outside the legal attribute set
    #[error("Invalid attribute: {name:?} is not a recognized attribute")]
    InvalidAttribute {
        /// Rejected attribute name
        name: String,
    },

    /// Callback is not callable
    #[error("Callback must be callable, not {type_name}")]
    NotCallable {
        /// Type of the rejected callback
        type_name: String,
    },

    /// Argument has the wrong type
    #[error("Type mismatch: expected {expected}, got {got}")]
    WrongType {
        /// Expected type name
        expected: String,
        /// Actual type name
        got: String,
    },

    /// Write attempted through a shadowless view
    #[error("Source shadowless view is read only")]
    ImmutableContext,

    /// A callback was found for an observer that should already have been pruned
    #[error("Callback for attribute {attr:?} points to a dead observer")]
    DeadObserverInvariantViolation {
        /// Attribute whose callback set was being fired
        attr: String,
    },

    /// Attribute lookup failed
    #[error("'{type_name}' object has no attribute '{name}'")]
    NoSuchAttribute {
        /// Type of the receiver
        type_name: String,
        /// Missing attribute
        name: String,
    },

    /// Attribute cannot be assigned or deleted
    #[error("Attribute '{name}' is read only")]
    ReadOnlyAttribute {
        /// Attribute name
        name: String,
    },

    /// Receiver does not support the operation
    #[error("'{type_name}' object does not support {operation}")]
    Unsupported {
        /// Type of the receiver
        type_name: String,
        /// Operation name
        operation: &'static str,
    },

    /// Value cannot be hashed
    #[error("Unhashable type: '{type_name}'")]
    Unhashable {
        /// Type of the value
        type_name: String,
    },

    /// Values cannot be ordered against each other
    #[error("Cannot order '{left}' against '{right}'")]
    Unorderable {
        /// Left operand type
        left: String,
        /// Right operand type
        right: String,
    },

    /// Mapping lookup failed
    #[error("Key not found: {key}")]
    KeyNotFound {
        /// Rendered key
        key: String,
    },

    /// Sequence index out of range
    #[error("Index {index} out of range (length: {len})")]
    IndexOutOfRange {
        /// Requested index
        index: i64,
        /// Sequence length
        len: usize,
    },

    /// Transformation nested deeper than the configured bound
    #[error("Maximum context recursion depth ({limit}) exceeded")]
    RecursionLimit {
        /// Configured depth bound
        limit: usize,
    },

    /// Failure raised by host object code
    #[error("{0}")]
    Host(String),
}

impl EngineError {
    /// Shorthand for [`EngineError::Unsupported`]
    pub fn unsupported(type_name: impl Into<String>, operation: &'static str) -> Self {
        EngineError::Unsupported {
            type_name: type_name.into(),
            operation,
        }
    }

    /// Shorthand for [`EngineError::WrongType`]
    pub fn wrong_type(expected: impl Into<String>, got: impl Into<String>) -> Self {
        EngineError::WrongType {
            expected: expected.into(),
            got: got.into(),
        }
    }
}

impl From<String> for EngineError {
    fn from(s: String) -> Self {
        EngineError::Host(s)
    }
}

impl From<&str> for EngineError {
    fn from(s: &str) -> Self {
        EngineError::Host(s.to_string())
    }
}
