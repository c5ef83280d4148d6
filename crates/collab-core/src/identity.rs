//! Authenticated user identity as seen by the collaboration core.
use serde::{Deserialize, Serialize};

/// A user connected to a session.
///
/// Equality and hashing are defined on `(provider, provider_id)` only.
/// `email` and `display_name` are display metadata: they travel with
/// the struct but must never be used to decide whether two `User`s are
/// the same connected participant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub provider: String,
    pub provider_id: String,
    pub email: String,
    pub display_name: String,
}

impl User {
    pub fn new(
        provider: impl Into<String>,
        provider_id: impl Into<String>,
        email: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            provider_id: provider_id.into(),
            email: email.into(),
            display_name: display_name.into(),
        }
    }

    /// The equality key used everywhere the core compares identities.
    pub fn key(&self) -> (&str, &str) {
        (&self.provider, &self.provider_id)
    }

    pub fn same_identity(&self, other: &User) -> bool {
        self.key() == other.key()
    }

    /// Full-field match used for host-authoritative spoof checks: provider,
    /// provider_id, email, and display_name must all agree with a live
    /// client, not just the equality key.
    pub fn matches_exactly(&self, other: &User) -> bool {
        self.provider == other.provider
            && self.provider_id == other.provider_id
            && self.email == other.email
            && self.display_name == other.display_name
    }
}

impl PartialEq for User {
    fn eq(&self, other: &Self) -> bool {
        self.same_identity(other)
    }
}
impl Eq for User {}

impl std::hash::Hash for User {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.provider.hash(state);
        self.provider_id.hash(state);
    }
}

/// Diagram permission as reported by the external permission collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagramPermission {
    Reader,
    Writer,
    Owner,
}

/// Session-scoped permission, derived once at join time and frozen for
/// the lifetime of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPermission {
    Reader,
    Writer,
}

impl From<DiagramPermission> for SessionPermission {
    fn from(p: DiagramPermission) -> Self {
        match p {
            DiagramPermission::Owner | DiagramPermission::Writer => SessionPermission::Writer,
            DiagramPermission::Reader => SessionPermission::Reader,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_ignores_display_fields() {
        let a = User::new("google", "123", "a@example.com", "Alice");
        let b = User::new("google", "123", "different@example.com", "Not Alice");
        assert!(a.same_identity(&b));
        assert!(!a.matches_exactly(&b));
    }

    #[test]
    fn permission_mapping() {
        assert_eq!(
            SessionPermission::from(DiagramPermission::Owner),
            SessionPermission::Writer
        );
        assert_eq!(
            SessionPermission::from(DiagramPermission::Reader),
            SessionPermission::Reader
        );
    }
}
