//! Notification severity, ordered fatal..verbose as in spec §6's wire table.

use serde::{Deserialize, Serialize};

/// Severity of a `Notification` message sent back to the controller.
///
/// Ordering matters: variants are declared fatal-first so that
/// `Severity::Fatal < Severity::Verbose` holds under the derived `Ord`,
/// matching how the original emits `LOG_LEVEL_*` constants in increasing
/// verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Severity {
    Fatal = 0,
    Error = 1,
    Warning = 2,
    Info = 3,
    Debug = 4,
    Verbose = 5,
}

impl Severity {
    /// Parses the single-letter log-level flag accepted by `--log-level`.
    pub fn from_flag(flag: &str) -> Option<Self> {
        match flag {
            "F" => Some(Severity::Fatal),
            "E" => Some(Severity::Error),
            "W" => Some(Severity::Warning),
            "I" => Some(Severity::Info),
            "D" => Some(Severity::Debug),
            "V" => Some(Severity::Verbose),
            _ => None,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Severity::Fatal => "FATAL",
            Severity::Error => "ERROR",
            Severity::Warning => "WARNING",
            Severity::Info => "INFO",
            Severity::Debug => "DEBUG",
            Severity::Verbose => "VERBOSE",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_is_fatal_first() {
        assert!(Severity::Fatal < Severity::Error);
        assert!(Severity::Error < Severity::Verbose);
    }

    #[test]
    fn parses_all_flags() {
        for (flag, expect) in [
            ("F", Severity::Fatal),
            ("E", Severity::Error),
            ("W", Severity::Warning),
            ("I", Severity::Info),
            ("D", Severity::Debug),
            ("V", Severity::Verbose),
        ] {
            assert_eq!(Severity::from_flag(flag), Some(expect));
        }
        assert_eq!(Severity::from_flag("X"), None);
    }
}
