//! Session bundle issued by the identity provider.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::UserId;

/// The authenticated identity carried inside a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
}

/// Opaque token bundle plus its expiry.
///
/// Sessions are replaced wholesale on every update; nothing mutates one in
/// place once it has been handed to the session state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    pub user: User,
}

impl Session {
    pub fn user_id(&self) -> UserId {
        self.user.id
    }

    /// Whether the access token is past its expiry at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Whether the access token expires within `window` of `now`.
    pub fn expires_within(&self, now: DateTime<Utc>, window: Duration) -> bool {
        self.expires_at - now <= window
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_expiring_at(expires_at: DateTime<Utc>) -> Session {
        Session {
            access_token: "access".to_string(),
            refresh_token: "refresh".to_string(),
            expires_at,
            user: User {
                id: UserId::new(),
                email: "learner@example.com".to_string(),
            },
        }
    }

    #[test]
    fn expiry_is_inclusive() {
        let now = Utc::now();
        assert!(session_expiring_at(now).is_expired(now));
        assert!(!session_expiring_at(now + Duration::seconds(1)).is_expired(now));
    }

    #[test]
    fn expires_within_window() {
        let now = Utc::now();
        let session = session_expiring_at(now + Duration::minutes(4));
        assert!(session.expires_within(now, Duration::minutes(5)));
        assert!(!session.expires_within(now, Duration::minutes(3)));
    }

    #[test]
    fn serializes_expiry_as_rfc3339() {
        let session = session_expiring_at(Utc::now());
        let json = serde_json::to_value(&session).unwrap();
        assert!(json["expires_at"].is_string());
        let back: Session = serde_json::from_value(json).unwrap();
        assert_eq!(back, session);
    }
}
