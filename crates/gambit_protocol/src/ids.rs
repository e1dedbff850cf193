//! Server-issued identifiers.
//!
//! The client never invents an identifier; every id here originates from a
//! server response or push.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! server_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            /// Returns the raw numeric id.
            pub fn get(self) -> i64 {
                self.0
            }
        }

        impl From<i64> for $name {
            fn from(raw: i64) -> Self {
                Self(raw)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.parse().map(Self)
            }
        }
    };
}

server_id!(
    /// Identifier of a registered participant (a user account).
    ParticipantId
);

server_id!(
    /// Identifier of a game session.
    SessionId
);

server_id!(
    /// Identifier of a challenge invitation.
    ChallengeId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_serialize_as_bare_numbers() {
        let json = serde_json::to_string(&SessionId(42)).unwrap();
        assert_eq!(json, "42");

        let id: ParticipantId = serde_json::from_str("7").unwrap();
        assert_eq!(id, ParticipantId(7));
    }

    #[test]
    fn ids_parse_from_path_segments() {
        let id: ChallengeId = "19".parse().unwrap();
        assert_eq!(id.get(), 19);
        assert!("x19".parse::<ChallengeId>().is_err());
        assert_eq!(SessionId(3).to_string(), "3");
    }
}
