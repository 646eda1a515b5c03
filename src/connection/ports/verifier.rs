//! Credential verification port for auth-gated services.

use crate::connection::domain::{AuthContext, AuthRequest};
use async_trait::async_trait;
use thiserror::Error;

/// Result type for credential verification.
pub type CredentialVerifierResult<T> = Result<T, CredentialVerifierError>;

/// Verifies token ownership and issues an auth context.
///
/// The gateway treats verification as opaque; it applies its own deadline
/// around each call.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    /// Verifies `request` and returns the resulting auth context.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialVerifierError::Rejected`] when ownership cannot be
    /// proven, or [`CredentialVerifierError::Unavailable`] when the verifier
    /// could not be reached.
    async fn verify(&self, request: &AuthRequest) -> CredentialVerifierResult<AuthContext>;
}

/// Errors returned by credential verifiers.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CredentialVerifierError {
    /// Verification completed and rejected the credentials.
    #[error("credential rejected ({code}): {message}")]
    Rejected {
        /// Verifier failure code.
        code: String,
        /// Human-readable reason.
        message: String,
    },

    /// The verifier could not complete the check.
    #[error("credential verifier unavailable: {0}")]
    Unavailable(String),
}

impl CredentialVerifierError {
    /// Returns the stable failure code.
    #[must_use]
    pub fn code(&self) -> &str {
        match self {
            Self::Rejected { code, .. } => code,
            Self::Unavailable(_) => "VERIFIER_UNAVAILABLE",
        }
    }
}
