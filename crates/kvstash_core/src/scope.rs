//! Storage scopes.

use crate::error::CoreError;
use std::fmt;
use std::str::FromStr;

/// One of the three storage domains.
///
/// The scope selects the backend, whether data persists, and the default
/// write path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Scope {
    /// In-process map; lost when the process exits.
    Ephemeral,
    /// Persistent key-value store.
    Persistent,
    /// Encrypted key-value store.
    Encrypted,
}

impl Scope {
    /// All scopes, in wire order.
    pub const ALL: [Scope; 3] = [Scope::Ephemeral, Scope::Persistent, Scope::Encrypted];

    /// Returns the stable wire value of the scope.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::Ephemeral => 0,
            Self::Persistent => 1,
            Self::Encrypted => 2,
        }
    }

    /// Returns the stable lowercase name used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ephemeral => "ephemeral",
            Self::Persistent => "persistent",
            Self::Encrypted => "encrypted",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<u8> for Scope {
    type Error = CoreError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Ephemeral),
            1 => Ok(Self::Persistent),
            2 => Ok(Self::Encrypted),
            other => Err(CoreError::unknown_scope(other)),
        }
    }
}

impl FromStr for Scope {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ephemeral" | "memory" => Ok(Self::Ephemeral),
            "persistent" | "disk" => Ok(Self::Persistent),
            "encrypted" | "secure" => Ok(Self::Encrypted),
            _ => Err(CoreError::unknown_scope(s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_values_roundtrip() {
        for scope in Scope::ALL {
            assert_eq!(Scope::try_from(scope.as_u8()).unwrap(), scope);
        }
    }

    #[test]
    fn unknown_wire_value_rejected() {
        let err = Scope::try_from(3).unwrap_err();
        assert!(matches!(err, CoreError::UnknownScope { ref value } if value == "3"));
    }

    #[test]
    fn parse_names_and_aliases() {
        assert_eq!("Persistent".parse::<Scope>().unwrap(), Scope::Persistent);
        assert_eq!("secure".parse::<Scope>().unwrap(), Scope::Encrypted);
        assert_eq!("memory".parse::<Scope>().unwrap(), Scope::Ephemeral);
        assert!("cloud".parse::<Scope>().is_err());
    }

    #[test]
    fn display_matches_name() {
        assert_eq!(Scope::Encrypted.to_string(), "encrypted");
    }
}
