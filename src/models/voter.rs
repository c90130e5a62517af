//! Voter identity
//!
//! One vote or rating row exists per (target, voter identity). The identity
//! is a tagged variant rather than two ad-hoc nullable columns: a row stores
//! either a user id or an IP address, never both, and lookups match only the
//! identity the caller presents.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity under which a view, vote or rating is recorded.
///
/// The authenticated user id takes precedence over the request IP when both
/// are available. A voter who rated anonymously and later authenticates is
/// *not* recognized as the same voter; that asymmetry is intentional and
/// preserved from the original behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoterIdentity {
    /// Authenticated user
    User(i64),
    /// Anonymous request, identified by source IP
    Ip(String),
}

impl VoterIdentity {
    /// Resolve an identity from request context. User id wins when present;
    /// returns `None` when neither identity is available.
    pub fn resolve(user_id: Option<i64>, ip: Option<&str>) -> Option<Self> {
        match (user_id, ip) {
            (Some(id), _) => Some(Self::User(id)),
            (None, Some(ip)) if !ip.is_empty() => Some(Self::Ip(ip.to_string())),
            _ => None,
        }
    }

    /// The user id column value for this identity
    pub fn user_id(&self) -> Option<i64> {
        match self {
            Self::User(id) => Some(*id),
            Self::Ip(_) => None,
        }
    }

    /// The ip_address column value for this identity
    pub fn ip_address(&self) -> Option<&str> {
        match self {
            Self::User(_) => None,
            Self::Ip(ip) => Some(ip.as_str()),
        }
    }
}

impl fmt::Display for VoterIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User(id) => write!(f, "user:{}", id),
            Self::Ip(ip) => write!(f, "ip:{}", ip),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_prefers_user_id() {
        let identity = VoterIdentity::resolve(Some(7), Some("10.0.0.1"));
        assert_eq!(identity, Some(VoterIdentity::User(7)));
    }

    #[test]
    fn test_resolve_falls_back_to_ip() {
        let identity = VoterIdentity::resolve(None, Some("10.0.0.1"));
        assert_eq!(identity, Some(VoterIdentity::Ip("10.0.0.1".to_string())));
    }

    #[test]
    fn test_resolve_none_when_unidentifiable() {
        assert_eq!(VoterIdentity::resolve(None, None), None);
        assert_eq!(VoterIdentity::resolve(None, Some("")), None);
    }

    #[test]
    fn test_column_values_are_exclusive() {
        let user = VoterIdentity::User(3);
        assert_eq!(user.user_id(), Some(3));
        assert_eq!(user.ip_address(), None);

        let ip = VoterIdentity::Ip("192.168.1.2".to_string());
        assert_eq!(ip.user_id(), None);
        assert_eq!(ip.ip_address(), Some("192.168.1.2"));
    }
}
