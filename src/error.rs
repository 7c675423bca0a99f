use thiserror::Error;

/// Error type for gas mix construction and designation parsing.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MixError {
    #[error("invalid gas mix: o2={o2}, he={he}")]
    Invalid { o2: f64, he: f64 },

    #[error("cannot parse gas designation '{input}': {message}")]
    Parse { input: String, message: String },
}

/// Error type for static configuration.
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("invalid settings JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{field} out of range: {value} (expected {min}..={max})")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("no tanks configured")]
    NoTanks,

    #[error("tank {index}: {message}")]
    Tank { index: usize, message: String },
}

/// Error type for the persistent key-value store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store lock poisoned")]
    Poisoned,
}

/// Error type for restoring physiological snapshots.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("snapshot holds {found} state but {expected} was expected")]
    WrongEffect {
        expected: &'static str,
        found: &'static str,
    },

    #[error("expected {expected} compartments, found {found}")]
    Compartments { expected: usize, found: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MixError::Invalid { o2: 0.0, he: 0.2 };
        assert_eq!(err.to_string(), "invalid gas mix: o2=0, he=0.2");

        let err = MixError::Parse {
            input: "EANxx".to_string(),
            message: "expected percentage".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "cannot parse gas designation 'EANxx': expected percentage"
        );

        let err = SettingsError::OutOfRange {
            field: "gf_low",
            value: 0.95,
            min: 0.0,
            max: 0.9,
        };
        assert_eq!(
            err.to_string(),
            "gf_low out of range: 0.95 (expected 0..=0.9)"
        );

        let err = StateError::Compartments {
            expected: 16,
            found: 3,
        };
        assert_eq!(err.to_string(), "expected 16 compartments, found 3");

        let err = StateError::WrongEffect {
            expected: "CNS",
            found: "OTU",
        };
        assert_eq!(
            err.to_string(),
            "snapshot holds OTU state but CNS was expected"
        );
        assert_eq!(err.clone(), err);

        assert_eq!(StoreError::Poisoned.to_string(), "store lock poisoned");
    }
}
