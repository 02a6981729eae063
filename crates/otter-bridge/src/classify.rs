//! Shape classification of host values

use crate::native::NativeValue;

/// How a host value crosses into a script
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeKind {
    /// Absent value, becomes `None`
    Nil,
    /// Number, bool or string, copied
    Scalar,
    /// Owned list, tuple or dict, copied element by element
    Snapshot,
    /// Record, wrapped in a struct view
    Aggregate,
    /// Shared map, wrapped in a map view
    Associative,
    /// Shared sequence, wrapped in a slice view
    Sequential,
    /// Host callable, adapted to the script calling convention
    Callable,
    /// Anything else with methods, wrapped in an opaque view
    Opaque,
    /// Already a script value
    Script,
    /// Cannot cross the bridge
    Unsupported,
}

impl NativeKind {
    /// Lowercase name, for logs
    pub fn name(self) -> &'static str {
        match self {
            NativeKind::Nil => "nil",
            NativeKind::Scalar => "scalar",
            NativeKind::Snapshot => "snapshot",
            NativeKind::Aggregate => "aggregate",
            NativeKind::Associative => "associative",
            NativeKind::Sequential => "sequential",
            NativeKind::Callable => "callable",
            NativeKind::Opaque => "opaque",
            NativeKind::Script => "script",
            NativeKind::Unsupported => "unsupported",
        }
    }

    /// Whether the script sees the host's data rather than a copy
    pub fn aliases(self) -> bool {
        matches!(
            self,
            NativeKind::Aggregate | NativeKind::Associative | NativeKind::Sequential | NativeKind::Opaque
        )
    }
}

/// Classify a host value
pub fn classify(value: &NativeValue) -> NativeKind {
    match value {
        NativeValue::Nil => NativeKind::Nil,
        NativeValue::Bool(_)
        | NativeValue::Int(_)
        | NativeValue::Uint(_)
        | NativeValue::Float(_)
        | NativeValue::BigInt(_)
        | NativeValue::Str(_) => NativeKind::Scalar,
        NativeValue::List(_) | NativeValue::Tuple(_) | NativeValue::Dict(_) => NativeKind::Snapshot,
        NativeValue::Struct(_) => NativeKind::Aggregate,
        NativeValue::Map(_) => NativeKind::Associative,
        NativeValue::Slice(_) => NativeKind::Sequential,
        NativeValue::Func(_) => NativeKind::Callable,
        NativeValue::Opaque(_) => NativeKind::Opaque,
        NativeValue::Script(_) => NativeKind::Script,
        NativeValue::Unsupported(_) => NativeKind::Unsupported,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::{IntoNative, NativeMap, NativeSlice};

    #[test]
    fn test_classify() {
        assert_eq!(classify(&3u16.into_native()), NativeKind::Scalar);
        assert_eq!(classify(&vec![1i64].into_native()), NativeKind::Sequential);
        assert_eq!(
            classify(&NativeMap::<String, bool>::new(Default::default()).into_native()),
            NativeKind::Associative
        );
        assert_eq!(classify(&NativeValue::List(vec![])), NativeKind::Snapshot);
        let (tx, _rx) = std::sync::mpsc::channel::<()>();
        assert_eq!(classify(&tx.into_native()), NativeKind::Unsupported);
    }

    #[test]
    fn test_aliasing_kinds() {
        assert!(classify(&NativeSlice::new(vec![true]).into_native()).aliases());
        assert!(!NativeKind::Snapshot.aliases());
        assert!(!NativeKind::Scalar.aliases());
    }
}
