use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use thiserror::Error;

use crate::config::AuthConfig;
use crate::lifecycle::authorization::Caller;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum IdentityError {
    #[error("authorization header is missing or not a bearer token")]
    MissingToken,
    #[error("bearer token is invalid or expired")]
    UnknownToken,
}

/// Maps a bearer token to the caller it was issued to. Implementations fail closed:
/// any token they cannot vouch for is an error, never an anonymous caller.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve(&self, bearer_token: &str) -> Result<Caller, IdentityError>;
}

/// Extracts the token from an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header: Option<&str>) -> Result<&str, IdentityError> {
    let header = header.ok_or(IdentityError::MissingToken)?.trim();
    let (scheme, token) = header.split_once(' ').ok_or(IdentityError::MissingToken)?;
    let token = token.trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return Err(IdentityError::MissingToken);
    }
    Ok(token)
}

/// Resolver backed by the token grants in configuration.
pub struct StaticTokenResolver {
    grants: HashMap<String, Caller>,
}

impl StaticTokenResolver {
    pub fn new(grants: impl IntoIterator<Item = (String, Caller)>) -> Self {
        Self { grants: grants.into_iter().collect() }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(config.tokens.iter().map(|grant| {
            (
                grant.token.expose_secret().to_string(),
                Caller::new(grant.idir.clone(), grant.roles.iter().cloned()),
            )
        }))
    }

    pub fn len(&self) -> usize {
        self.grants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }
}

impl fmt::Debug for StaticTokenResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticTokenResolver").field("grants", &self.grants.len()).finish()
    }
}

#[async_trait]
impl IdentityResolver for StaticTokenResolver {
    async fn resolve(&self, bearer_token: &str) -> Result<Caller, IdentityError> {
        self.grants.get(bearer_token).cloned().ok_or(IdentityError::UnknownToken)
    }
}

#[cfg(test)]
mod tests {
    use super::{bearer_token, IdentityError, IdentityResolver, StaticTokenResolver};
    use crate::config::{AuthConfig, TokenGrant};

    fn resolver() -> StaticTokenResolver {
        StaticTokenResolver::from_config(&AuthConfig {
            tokens: vec![
                TokenGrant {
                    token: "user-token".to_string().into(),
                    idir: "AAAA0001".to_string(),
                    roles: Vec::new(),
                },
                TokenGrant {
                    token: "admin-token".to_string().into(),
                    idir: "ADMIN001".to_string(),
                    roles: vec!["admin".to_string()],
                },
            ],
        })
    }

    #[test]
    fn bearer_header_parsing() {
        assert_eq!(bearer_token(Some("Bearer abc")), Ok("abc"));
        assert_eq!(bearer_token(Some("bearer   abc ")), Ok("abc"));
        assert_eq!(bearer_token(Some("Basic abc")), Err(IdentityError::MissingToken));
        assert_eq!(bearer_token(Some("Bearer")), Err(IdentityError::MissingToken));
        assert_eq!(bearer_token(None), Err(IdentityError::MissingToken));
    }

    #[tokio::test]
    async fn known_tokens_resolve_with_roles() {
        let resolver = resolver();

        let user = resolver.resolve("user-token").await.expect("user resolves");
        assert_eq!(user.idir, "AAAA0001");
        assert!(!user.is_admin());

        let admin = resolver.resolve("admin-token").await.expect("admin resolves");
        assert!(admin.is_admin());
    }

    #[tokio::test]
    async fn unknown_tokens_fail_closed() {
        let resolver = resolver();
        assert_eq!(resolver.resolve("forged").await, Err(IdentityError::UnknownToken));
        assert!(!format!("{resolver:?}").contains("admin-token"));
    }
}
