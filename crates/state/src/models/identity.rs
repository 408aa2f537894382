//! Identity domain types.

use serde::{Deserialize, Serialize};

use cropcart_core::{Email, Role, UserId};

/// An authenticated user profile (a `users` collection document).
///
/// Created once at registration; the record itself is never destroyed,
/// sign-out only clears the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// Unique user ID (also the auth subject).
    pub id: UserId,
    /// Display name.
    pub name: String,
    /// Immutable after creation: profile edits never change the role.
    pub role: Role,
    /// Avatar image URL, if one was uploaded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    /// Phone contact.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact: Option<String>,
    /// Account email.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<Email>,
}

/// A partial profile edit.
///
/// Only the fields present are merged; `role` is deliberately absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfilePatch {
    pub name: Option<String>,
    pub avatar_url: Option<String>,
    pub contact: Option<String>,
    pub email: Option<Email>,
}

impl ProfilePatch {
    /// Whether the patch changes nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.avatar_url.is_none()
            && self.contact.is_none()
            && self.email.is_none()
    }

    /// Merge this patch into an identity, producing the updated profile.
    #[must_use]
    pub fn apply_to(&self, identity: &Identity) -> Identity {
        let mut updated = identity.clone();
        if let Some(name) = &self.name {
            updated.name = name.clone();
        }
        if let Some(avatar_url) = &self.avatar_url {
            updated.avatar_url = Some(avatar_url.clone());
        }
        if let Some(contact) = &self.contact {
            updated.contact = Some(contact.clone());
        }
        if let Some(email) = &self.email {
            updated.email = Some(email.clone());
        }
        updated
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn farmer() -> Identity {
        Identity {
            id: UserId::new("farmer-1"),
            name: "John Doe".to_string(),
            role: Role::Farmer,
            avatar_url: None,
            contact: Some("0241234567".to_string()),
            email: None,
        }
    }

    #[test]
    fn test_patch_merges_only_present_fields() {
        let patch = ProfilePatch {
            name: Some("John K. Doe".to_string()),
            ..ProfilePatch::default()
        };
        let updated = patch.apply_to(&farmer());
        assert_eq!(updated.name, "John K. Doe");
        assert_eq!(updated.contact.as_deref(), Some("0241234567"));
        assert_eq!(updated.role, Role::Farmer);
    }

    #[test]
    fn test_empty_patch_is_identity() {
        let patch = ProfilePatch::default();
        assert!(patch.is_empty());
        assert_eq!(patch.apply_to(&farmer()), farmer());
    }

    #[test]
    fn test_wire_field_names_are_camel_case() {
        let json = serde_json::to_value(farmer()).unwrap();
        assert_eq!(json["role"], "farmer");
        assert!(json.get("avatarUrl").is_none()); // absent options are omitted
        let with_avatar = Identity {
            avatar_url: Some("https://img.example/a.png".to_string()),
            ..farmer()
        };
        let json = serde_json::to_value(with_avatar).unwrap();
        assert_eq!(json["avatarUrl"], "https://img.example/a.png");
    }
}
