//! Application-level user record.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::UserId;

/// Portal role attached to a profile (e.g. `student`, `instructor`, `admin`).
///
/// Roles are opaque strings at this layer; evaluating what a role may do is
/// left to the screens that consume the profile.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(Cow<'static, str>);

impl Role {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Profile row keyed by session identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: UserId,
    pub full_name: String,
    pub role: Role,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optional_contact_fields_default_to_none() {
        let id = UserId::new();
        let json = serde_json::json!({
            "id": id,
            "full_name": "Ada Lovelace",
            "role": "instructor",
            "email": "ada@example.com",
        });

        let profile: Profile = serde_json::from_value(json).unwrap();
        assert_eq!(profile.id, id);
        assert_eq!(profile.role.as_str(), "instructor");
        assert_eq!(profile.phone, None);
        assert_eq!(profile.avatar_url, None);
    }
}
