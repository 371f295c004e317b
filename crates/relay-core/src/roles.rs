//! Participant roles used as signaling addresses.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::errors::RoleError;

/// A named participant class. Signals are addressed to a role, never to a
/// specific connection.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub enum Role {
    /// The remote contributor publishing camera and microphone.
    Guest,
    /// The production side receiving the guest's media.
    Studio,
    /// Any other room key. Only admitted under [`RolePolicy::Open`].
    Custom(String),
}

/// Which role strings the relay admits at registration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RolePolicy {
    /// Only `guest` and `studio`.
    #[default]
    Closed,
    /// Any non-empty string is a valid room key.
    Open,
}

impl Role {
    /// Parse a wire role under the given policy.
    pub fn parse(raw: &str, policy: RolePolicy) -> Result<Self, RoleError> {
        if raw.trim().is_empty() {
            return Err(RoleError::Empty);
        }
        match raw {
            "guest" => Ok(Self::Guest),
            "studio" => Ok(Self::Studio),
            other => match policy {
                RolePolicy::Open => Ok(Self::Custom(other.to_owned())),
                RolePolicy::Closed => Err(RoleError::Unknown(other.to_owned())),
            },
        }
    }

    /// Wire representation.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Guest => "guest",
            Self::Studio => "studio",
            Self::Custom(key) => key,
        }
    }

    /// The built-in peer of this role, if there is one.
    pub fn counterpart(&self) -> Option<Self> {
        match self {
            Self::Guest => Some(Self::Studio),
            Self::Studio => Some(Self::Guest),
            Self::Custom(_) => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Strict parse: only the built-in roles.
impl FromStr for Role {
    type Err = RoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s, RolePolicy::Closed)
    }
}

impl FromStr for RolePolicy {
    type Err = RoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "closed" => Ok(Self::Closed),
            "open" => Ok(Self::Open),
            other => Err(RoleError::Unknown(other.to_owned())),
        }
    }
}

impl Serialize for Role {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Role {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw, RolePolicy::Open).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parses_builtin_roles() {
        assert_eq!(Role::parse("guest", RolePolicy::Closed).unwrap(), Role::Guest);
        assert_eq!(Role::parse("studio", RolePolicy::Closed).unwrap(), Role::Studio);
        assert_eq!(Role::parse("studio", RolePolicy::Open).unwrap(), Role::Studio);
    }

    #[test]
    fn closed_policy_rejects_unknown() {
        let err = Role::parse("director", RolePolicy::Closed).unwrap_err();
        assert!(matches!(err, RoleError::Unknown(ref r) if r == "director"));
    }

    #[test]
    fn open_policy_admits_room_keys() {
        let role = Role::parse("room-42", RolePolicy::Open).unwrap();
        assert_eq!(role, Role::Custom("room-42".into()));
        assert_eq!(role.as_str(), "room-42");
        assert_eq!(role.counterpart(), None);
    }

    #[test]
    fn empty_role_always_rejected() {
        assert!(matches!(Role::parse("", RolePolicy::Open), Err(RoleError::Empty)));
        assert!(matches!(Role::parse("   ", RolePolicy::Open), Err(RoleError::Empty)));
    }

    #[test]
    fn matching_is_case_sensitive() {
        assert!(Role::parse("Studio", RolePolicy::Closed).is_err());
        assert_eq!(
            Role::parse("Studio", RolePolicy::Open).unwrap(),
            Role::Custom("Studio".into())
        );
    }

    #[test]
    fn counterpart_pairs_builtins() {
        assert_eq!(Role::Guest.counterpart(), Some(Role::Studio));
        assert_eq!(Role::Studio.counterpart(), Some(Role::Guest));
        assert_eq!(Role::Custom("x".into()).counterpart(), None);
    }

    #[test]
    fn serializes_as_wire_string() {
        assert_eq!(serde_json::to_string(&Role::Guest).unwrap(), "\"guest\"");
        assert_eq!(
            serde_json::to_string(&Role::Custom("booth".into())).unwrap(),
            "\"booth\""
        );
        let back: Role = serde_json::from_str("\"studio\"").unwrap();
        assert_eq!(back, Role::Studio);
    }

    #[test]
    fn policy_from_str() {
        assert_eq!("open".parse::<RolePolicy>().unwrap(), RolePolicy::Open);
        assert_eq!("CLOSED".parse::<RolePolicy>().unwrap(), RolePolicy::Closed);
        assert!("sometimes".parse::<RolePolicy>().is_err());
    }

    proptest! {
        #[test]
        fn open_parse_roundtrips_display(raw in "[a-z0-9_-]{1,24}") {
            let role = Role::parse(&raw, RolePolicy::Open).unwrap();
            prop_assert_eq!(role.to_string(), raw);
        }
    }
}
