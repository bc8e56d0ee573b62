use std::sync::Arc;

use axum::extract::FromRef;

use super::config::IssuerSettings;
use crate::grant::GrantCipher;
use crate::token::AccessTokenSigner;

/// Shared state for issuer route handlers.
pub(super) struct AuthState<V, S> {
    pub(super) verifier: Arc<V>,
    pub(super) store: Arc<S>,
    pub(super) signer: Arc<AccessTokenSigner>,
    pub(super) cipher: GrantCipher,
    pub(super) settings: IssuerSettings,
}

// Manual Clone: avoid derive adding `V: Clone, S: Clone` bounds.
impl<V, S> Clone for AuthState<V, S> {
    fn clone(&self) -> Self {
        Self {
            verifier: self.verifier.clone(),
            store: self.store.clone(),
            signer: self.signer.clone(),
            cipher: self.cipher.clone(),
            settings: self.settings.clone(),
        }
    }
}

// AuthUser requires the signer to be extractable from state
impl<V, S> FromRef<AuthState<V, S>> for Arc<AccessTokenSigner> {
    fn from_ref(state: &AuthState<V, S>) -> Self {
        state.signer.clone()
    }
}
