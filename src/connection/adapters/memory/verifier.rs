//! Static credential verifier backed by an ownership table.

use crate::connection::{
    domain::{AuthContext, AuthRequest},
    ports::{CredentialVerifier, CredentialVerifierError, CredentialVerifierResult},
};
use async_trait::async_trait;
use mockable::Clock;
use std::collections::HashSet;
use std::sync::{Arc, RwLock};

type Ownership = (String, String, String);

/// Verifier that accepts only recorded `(wallet, contract, token)` triples.
///
/// Wallet addresses compare case-insensitively. Issued tokens are
/// deterministic so tests can assert on injected headers.
#[derive(Clone)]
pub struct StaticCredentialVerifier<C: Clock + Send + Sync> {
    owners: Arc<RwLock<HashSet<Ownership>>>,
    clock: Arc<C>,
}

impl<C: Clock + Send + Sync> StaticCredentialVerifier<C> {
    /// Creates a verifier with no recorded owners.
    #[must_use]
    pub fn new(clock: Arc<C>) -> Self {
        Self {
            owners: Arc::new(RwLock::new(HashSet::new())),
            clock,
        }
    }

    /// Records that `wallet` owns `token_id` of `contract`.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialVerifierError::Unavailable`] when the lock is
    /// poisoned.
    pub fn grant(
        &self,
        wallet: &str,
        contract: &str,
        token_id: &str,
    ) -> CredentialVerifierResult<()> {
        let mut owners = self
            .owners
            .write()
            .map_err(|err| CredentialVerifierError::Unavailable(err.to_string()))?;
        owners.insert(ownership(wallet, contract, token_id));
        Ok(())
    }

    /// Returns the access token issued for `request`.
    #[must_use]
    pub fn token_for(request: &AuthRequest) -> String {
        format!(
            "static-{}-{}",
            request.wallet_address().to_ascii_lowercase(),
            request.token_id()
        )
    }
}

fn ownership(wallet: &str, contract: &str, token_id: &str) -> Ownership {
    (
        wallet.to_ascii_lowercase(),
        contract.to_ascii_lowercase(),
        token_id.to_owned(),
    )
}

#[async_trait]
impl<C: Clock + Send + Sync> CredentialVerifier for StaticCredentialVerifier<C> {
    async fn verify(&self, request: &AuthRequest) -> CredentialVerifierResult<AuthContext> {
        let owns = self
            .owners
            .read()
            .map_err(|err| CredentialVerifierError::Unavailable(err.to_string()))?
            .contains(&ownership(
                request.wallet_address(),
                request.contract_address(),
                request.token_id(),
            ));
        if !owns {
            return Err(CredentialVerifierError::Rejected {
                code: "NOT_TOKEN_OWNER".to_owned(),
                message: format!(
                    "wallet {} does not own token {}",
                    request.wallet_address(),
                    request.token_id()
                ),
            });
        }
        Ok(AuthContext::new(
            request,
            Self::token_for(request),
            self.clock.utc(),
        ))
    }
}
