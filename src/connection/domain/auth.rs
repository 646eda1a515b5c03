//! Credential request and verified auth context value objects.

use super::ConnectionDomainError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Header carrying the bearer token issued by the credential verifier.
pub const AUTHORIZATION_HEADER: &str = "Authorization";

/// Header carrying the verified wallet address.
pub const WALLET_HEADER: &str = "X-Wallet-Address";

/// Caller-supplied proof of token ownership for an auth-gated service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthRequest {
    wallet_address: String,
    contract_address: String,
    token_id: String,
    signature: Option<String>,
}

impl AuthRequest {
    /// Creates an auth request.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionDomainError::EmptyAuthField`] naming the first
    /// blank field.
    pub fn new(
        wallet_address: impl Into<String>,
        contract_address: impl Into<String>,
        token_id: impl Into<String>,
    ) -> Result<Self, ConnectionDomainError> {
        Ok(Self {
            wallet_address: non_empty("wallet_address", wallet_address.into())?,
            contract_address: non_empty("contract_address", contract_address.into())?,
            token_id: non_empty("token_id", token_id.into())?,
            signature: None,
        })
    }

    /// Attaches a wallet signature.
    #[must_use]
    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        let normalized = signature.into().trim().to_owned();
        self.signature = (!normalized.is_empty()).then_some(normalized);
        self
    }

    /// Returns the wallet address.
    #[must_use]
    pub fn wallet_address(&self) -> &str {
        &self.wallet_address
    }

    /// Returns the token contract address.
    #[must_use]
    pub fn contract_address(&self) -> &str {
        &self.contract_address
    }

    /// Returns the token identifier.
    #[must_use]
    pub fn token_id(&self) -> &str {
        &self.token_id
    }

    /// Returns the optional signature.
    #[must_use]
    pub fn signature(&self) -> Option<&str> {
        self.signature.as_deref()
    }
}

fn non_empty(field: &'static str, value: String) -> Result<String, ConnectionDomainError> {
    let normalized = value.trim().to_owned();
    if normalized.is_empty() {
        return Err(ConnectionDomainError::EmptyAuthField(field));
    }
    Ok(normalized)
}

/// Verified credential bundle owned by a single connection.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthContext {
    wallet_address: String,
    contract_address: String,
    token_id: String,
    access_token: String,
    verified_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
}

impl AuthContext {
    /// Creates a verified auth context for the given request.
    #[must_use]
    pub fn new(
        request: &AuthRequest,
        access_token: impl Into<String>,
        verified_at: DateTime<Utc>,
    ) -> Self {
        Self {
            wallet_address: request.wallet_address.clone(),
            contract_address: request.contract_address.clone(),
            token_id: request.token_id.clone(),
            access_token: access_token.into(),
            verified_at,
            expires_at: None,
        }
    }

    /// Sets the expiry reported by the verifier.
    #[must_use]
    pub const fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Returns the verified wallet address.
    #[must_use]
    pub fn wallet_address(&self) -> &str {
        &self.wallet_address
    }

    /// Returns the token contract address.
    #[must_use]
    pub fn contract_address(&self) -> &str {
        &self.contract_address
    }

    /// Returns the token identifier.
    #[must_use]
    pub fn token_id(&self) -> &str {
        &self.token_id
    }

    /// Returns the verification timestamp.
    #[must_use]
    pub const fn verified_at(&self) -> DateTime<Utc> {
        self.verified_at
    }

    /// Returns the optional expiry.
    #[must_use]
    pub const fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// Returns whether the context has expired at `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expiry| expiry <= now)
    }

    /// Returns the credential headers attached to outbound traffic.
    #[must_use]
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        vec![
            (AUTHORIZATION_HEADER, format!("Bearer {}", self.access_token)),
            (WALLET_HEADER, self.wallet_address.clone()),
        ]
    }
}

impl fmt::Debug for AuthContext {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("AuthContext")
            .field("wallet_address", &self.wallet_address)
            .field("contract_address", &self.contract_address)
            .field("token_id", &self.token_id)
            .field("access_token", &"<redacted>")
            .field("verified_at", &self.verified_at)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
