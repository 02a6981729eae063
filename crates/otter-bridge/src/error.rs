//! Error types for otter-bridge

use thiserror::Error;

/// Bridge error type
///
/// Messages are kept as owned strings so a single failure can be cloned out
/// to every caller waiting on the same module load.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BridgeError {
    /// Native value has no script mapping (e.g. a channel)
    #[error("type {0} is not a supported script type")]
    Unsupported(String),

    /// Value does not fit the requested type
    #[error("{0}")]
    Conversion(String),

    /// Mutation attempted on a frozen view
    #[error("cannot {verb} frozen {container}")]
    Frozen {
        /// Operation, phrased as in "cannot <verb> frozen map"
        verb: &'static str,
        /// `map` or `slice`
        container: &'static str,
    },

    /// Structural mutation attempted while an iterator is live
    #[error("cannot {verb} {container} during iteration")]
    Iterating {
        /// Operation, phrased as in "cannot <verb> map during iteration"
        verb: &'static str,
        /// `map` or `slice`
        container: &'static str,
    },

    /// Index outside `[0:len)`
    #[error("index out of range: {index} not in [0:{len})")]
    IndexOutOfRange {
        /// Requested index, before normalization
        index: i64,
        /// Container length at the time of the access
        len: usize,
    },

    /// `pop` on a missing key without a default
    #[error("pop: missing key")]
    MissingKey,

    /// `popitem` on an empty map
    #[error("popitem: empty dict")]
    EmptyDict,

    /// Lookup by value failed (`index`, `remove`)
    #[error("{0}")]
    NotFound(String),

    /// Wrong number of positional arguments
    #[error("{func}: {message}")]
    Arity {
        /// Name of the callable
        func: String,
        /// Human readable count mismatch
        message: String,
    },

    /// A positional argument could not be converted
    #[error("{func}: arg {index}: {message}")]
    Argument {
        /// Name of the callable
        func: String,
        /// Zero-based argument position
        index: usize,
        /// Conversion failure
        message: String,
    },

    /// A native callable returned an error
    #[error("{0}")]
    Call(String),

    /// A native callable panicked
    #[error("panic in func {func}: {message}")]
    Panic {
        /// Name of the callable
        func: String,
        /// Panic payload, when it was a string
        message: String,
    },

    /// Attribute or method does not exist
    #[error("{type_name} has no attribute {name:?}")]
    NoAttribute {
        /// Script type name of the receiver
        type_name: String,
        /// Requested attribute
        name: String,
    },

    /// Field assignment to a missing, hidden or unexported field
    #[error("{0} is not a settable field")]
    NotSettable(String),

    /// Operation not supported by this value
    #[error("{type_name} does not support {op}")]
    NotSupported {
        /// Script type name of the receiver
        type_name: String,
        /// Unsupported operation
        op: &'static str,
    },

    /// Value cannot be hashed
    #[error("{0} is not hashable")]
    Unhashable(String),

    /// Module load graph contains a cycle
    #[error("cycle in load graph")]
    LoadCycle,

    /// No search directory contains the file
    #[error("cannot find file {file:?} in any of the configured directories {dirs:?}")]
    ModuleNotFound {
        /// Requested file name
        file: String,
        /// Directories searched, in order
        dirs: Vec<String>,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(String),

    /// Failure reported by the embedded engine
    #[error("{0}")]
    Engine(String),

    /// Invalid configuration
    #[error("Config error: {0}")]
    Config(String),
}

impl BridgeError {
    /// Create a conversion error
    pub fn conversion(msg: impl Into<String>) -> Self {
        Self::Conversion(msg.into())
    }

    /// Create an engine error
    pub fn engine(msg: impl Into<String>) -> Self {
        Self::Engine(msg.into())
    }

    /// Create a call error from a native callable's error value
    pub fn call(msg: impl std::fmt::Display) -> Self {
        Self::Call(msg.to_string())
    }

    /// Create a type-mismatch conversion error
    pub fn mismatch(expected: impl std::fmt::Display, got: impl std::fmt::Display) -> Self {
        Self::Conversion(format!("expected type {expected} got {got}"))
    }

    /// Create an unsupported-operation error
    pub fn not_supported(type_name: impl Into<String>, op: &'static str) -> Self {
        Self::NotSupported {
            type_name: type_name.into(),
            op,
        }
    }

    /// True for the frozen and iteration guard errors.
    ///
    /// These are the only failures a well-behaved script may want to handle
    /// by retrying without the mutation.
    pub fn is_guard(&self) -> bool {
        matches!(self, Self::Frozen { .. } | Self::Iterating { .. })
    }
}

impl From<std::io::Error> for BridgeError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

/// Result type using BridgeError
pub type BridgeResult<T> = Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_messages() {
        let frozen = BridgeError::Frozen {
            verb: "insert into",
            container: "map",
        };
        assert_eq!(frozen.to_string(), "cannot insert into frozen map");

        let iterating = BridgeError::Iterating {
            verb: "append to",
            container: "slice",
        };
        assert_eq!(
            iterating.to_string(),
            "cannot append to slice during iteration"
        );
        assert!(frozen.is_guard());
        assert!(iterating.is_guard());
        assert!(!BridgeError::MissingKey.is_guard());
    }

    #[test]
    fn test_bounds_messages() {
        assert_eq!(BridgeError::EmptyDict.to_string(), "popitem: empty dict");
        assert_eq!(BridgeError::MissingKey.to_string(), "pop: missing key");
        let err = BridgeError::IndexOutOfRange { index: 5, len: 3 };
        assert!(err.to_string().starts_with("index out of range"));
        assert!(err.to_string().contains("[0:3)"));
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: BridgeError = io.into();
        assert_eq!(err, BridgeError::Io("gone".to_string()));
    }
}
