//! Reference `AuthProvider`: trusts a `provider:provider_id:email:name`
//! bearer token verbatim. Verifying real OAuth tokens is out of scope
//! for this core — production deployments swap this out for a
//! real identity-provider client behind the same trait.
use async_trait::async_trait;
use collab_core::{AuthProvider, PortError, User};

pub struct HeaderAuthProvider;

#[async_trait]
impl AuthProvider for HeaderAuthProvider {
    async fn authenticate(&self, bearer_token: Option<&str>) -> Result<User, PortError> {
        let token = bearer_token.ok_or(PortError::AuthenticationFailed)?;
        let mut parts = token.splitn(4, ':');
        let (provider, provider_id, email, display_name) = (
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
        );
        match (provider, provider_id, email, display_name) {
            (Some(provider), Some(provider_id), Some(email), Some(display_name))
                if !provider.is_empty() && !provider_id.is_empty() =>
            {
                Ok(User::new(provider, provider_id, email, display_name))
            }
            _ => Err(PortError::AuthenticationFailed),
        }
    }
}
