use crate::domain_model::{CredentialBundle, ValidationOutcome};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReconcileError {
    /// The identity provider could not be reached, so nothing can be said
    /// about the credentials.
    #[error("identity provider unavailable: {0}")]
    Unavailable(String),
}

#[async_trait::async_trait]
pub trait TokenReconciler: Send + Sync {
    /// Decides what a request's credentials are worth, refreshing the pair
    /// when the access token no longer works.
    async fn validate(
        &self,
        credentials: CredentialBundle,
    ) -> Result<ValidationOutcome, ReconcileError>;
}
