//! Interfaces to the parts of the client that live outside the identity
//! core: the alert surface, the auth provider and the message transport.

use async_trait::async_trait;
use shared::Result;

/// Surfaces a human-readable outcome to the user. Fire-and-forget.
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str, is_success: bool);
}

/// Re-checks the signed-in user's password with the auth provider.
#[async_trait]
pub trait PasswordVerifier: Send + Sync {
    async fn verify(&self, candidate_password: &str) -> bool;
}

/// Delivers an already-sanitized chat message.
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send(&self, sanitized_text: &str) -> Result<()>;
}
