//! SQLSTATE class tables and error state classification.
//!
//! SQLSTATE values are five characters; the first two form the class.
//! The executor only cares about four coarse outcomes, captured by
//! [`ErrorState`]:
//!
//! - `Success`: class `00`, not actually an error.
//! - `Reconnect`: the session is gone or unusable (class `08` and any
//!   class this table does not recognise). The statement is retried on a
//!   fresh connection, up to the retry cap.
//! - `Interrupt`: the server refused or aborted the work (resource
//!   exhaustion, admin cancellation, crash recovery). Never retried.
//! - `Error`: an ordinary statement failure (constraint violation,
//!   syntax error). Never retried.

/// Coarse classification of a backend failure, derived from SQLSTATE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorState {
    /// Class `00`: completed successfully.
    Success,
    /// Ordinary statement failure; surfaced to the caller as-is.
    Error,
    /// Lost or unusable session; worth retrying on a new connection.
    Reconnect,
    /// Server side interruption or refusal; not retryable.
    Interrupt,
}

/// SQLSTATE classes reported when the server interrupted or refused work.
const INTERRUPT_CLASSES: &[&str] = &["0L", "0Z", "3B", "53", "57", "58", "F0", "P0", "XX"];

/// SQLSTATE classes that indicate ordinary, non-retryable statement errors.
const ERROR_CLASSES: &[&str] = &[
    "01", "02", "07", "0A", "21", "22", "23", "24", "25", "26", "28", "2B", "2D", "2F", "34", "38",
    "39", "3D", "3F", "40", "42", "44", "HZ",
];

impl ErrorState {
    /// Classify a five character SQLSTATE by its two character class.
    ///
    /// States shorter than two characters, and classes not present in any
    /// table, are treated as lost-connection conditions. Backends that
    /// fail to report a usable SQLSTATE are most often mid-disconnect, so
    /// the reconnect path is the one that can still make progress.
    pub fn classify(sqlstate: &str) -> Self {
        let class = match sqlstate.get(..2) {
            Some(class) => class,
            None => return Self::Reconnect,
        };
        if class == "00" {
            Self::Success
        } else if class == "08" {
            Self::Reconnect
        } else if INTERRUPT_CLASSES.contains(&class) {
            Self::Interrupt
        } else if ERROR_CLASSES.contains(&class) {
            Self::Error
        } else {
            Self::Reconnect
        }
    }

    /// Whether a statement that failed with this state should be retried.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Reconnect)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_class() {
        assert_eq!(ErrorState::classify("00000"), ErrorState::Success);
    }

    #[test]
    fn connection_classes_reconnect() {
        for state in ["08000", "08003", "08006", "08S01"] {
            assert_eq!(ErrorState::classify(state), ErrorState::Reconnect, "{state}");
        }
    }

    #[test]
    fn interrupt_classes() {
        for state in ["57014", "53100", "XX001", "P0001", "F0000"] {
            assert_eq!(ErrorState::classify(state), ErrorState::Interrupt, "{state}");
        }
    }

    #[test]
    fn plain_error_classes() {
        for state in ["23000", "42000", "22001", "40001", "HZ010"] {
            assert_eq!(ErrorState::classify(state), ErrorState::Error, "{state}");
        }
    }

    #[test]
    fn unknown_class_falls_back_to_reconnect() {
        assert_eq!(ErrorState::classify("ZZ999"), ErrorState::Reconnect);
        assert_eq!(ErrorState::classify(""), ErrorState::Reconnect);
        assert_eq!(ErrorState::classify("9"), ErrorState::Reconnect);
    }

    #[test]
    fn retryability() {
        assert!(ErrorState::Reconnect.is_retryable());
        assert!(!ErrorState::Interrupt.is_retryable());
        assert!(!ErrorState::Error.is_retryable());
        assert!(!ErrorState::Success.is_retryable());
    }
}
