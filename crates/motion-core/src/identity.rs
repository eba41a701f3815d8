//! Identity boundary: bearer credential in, owner id out

use crate::error::AuthError;
use async_trait::async_trait;
use motion_ledger::OwnerId;
use std::collections::HashMap;

/// Resolves credentials to owners
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Verify `token` and return its stable owner id
    async fn authenticate(&self, token: &str) -> Result<OwnerId, AuthError>;
}

/// Extract the token from an `Authorization: Bearer <token>` header value
///
/// # Errors
/// - `MissingCredential` for an absent or blank header
/// - `MalformedHeader` for any other scheme or an empty token
pub fn bearer_token(header: Option<&str>) -> Result<&str, AuthError> {
    let header = header.map(str::trim).filter(|h| !h.is_empty()).ok_or(AuthError::MissingCredential)?;
    let (scheme, token) = header.split_once(' ').ok_or(AuthError::MalformedHeader)?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthError::MalformedHeader);
    }
    let token = token.trim();
    if token.is_empty() {
        return Err(AuthError::MalformedHeader);
    }
    Ok(token)
}

/// Fixed token table, for development and tests
#[derive(Debug, Clone, Default)]
pub struct StaticTokenIdentity {
    tokens: HashMap<String, OwnerId>,
}

impl StaticTokenIdentity {
    /// Build from a token -> owner table
    ///
    /// # Errors
    /// Returns `InvalidOwner` if any owner id is malformed
    pub fn new(tokens: &HashMap<String, String>) -> Result<Self, AuthError> {
        let tokens = tokens
            .iter()
            .map(|(token, owner)| -> Result<_, AuthError> { Ok((token.clone(), OwnerId::parse(owner)?)) })
            .collect::<Result<HashMap<_, _>, _>>()?;
        Ok(Self { tokens })
    }

    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>, owner_id: OwnerId) -> Self {
        self.tokens.insert(token.into(), owner_id);
        self
    }
}

#[async_trait]
impl IdentityProvider for StaticTokenIdentity {
    async fn authenticate(&self, token: &str) -> Result<OwnerId, AuthError> {
        self.tokens.get(token).cloned().ok_or(AuthError::InvalidCredential)
    }
}
