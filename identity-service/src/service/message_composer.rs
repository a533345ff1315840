use std::sync::Arc;

use shared::{now_millis, sanitize_message, MessagingConfig, Result};

use crate::collaborators::{MessageSender, Notifier};
use crate::domain::{Admission, RateLimiter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Sent,
    /// No chatroom selected, or only the placeholder default is showing.
    NoChatRoom,
    Throttled { retry_after_ms: i64 },
}

/// Outbound message gate for one sending session.
///
/// Two separate gates run before anything is sent: the chatroom check,
/// then the per-sender rate limiter. The limiter is never consulted for a
/// message that fails the chatroom check.
pub struct MessageComposer {
    limiter: RateLimiter,
    sender: Arc<dyn MessageSender>,
    notifier: Arc<dyn Notifier>,
    placeholder_chatroom: String,
    max_message_length: usize,
}

impl MessageComposer {
    pub fn new(
        config: &MessagingConfig,
        sender: Arc<dyn MessageSender>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            limiter: RateLimiter::new(config.cooldown_ms),
            sender,
            notifier,
            placeholder_chatroom: config.placeholder_chatroom.clone(),
            max_message_length: config.max_message_length,
        }
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn is_chat_room_selected(&self, current_chat_room: Option<&str>) -> bool {
        matches!(current_chat_room, Some(room) if !room.is_empty() && room != self.placeholder_chatroom)
    }

    /// [`submit`](Self::submit) stamped with the wall clock.
    pub async fn submit_now(
        &self,
        sender_key: &str,
        current_chat_room: Option<&str>,
        raw_text: &str,
    ) -> Result<SubmitOutcome> {
        self.submit(sender_key, current_chat_room, raw_text, now_millis())
            .await
    }

    #[tracing::instrument(skip(self, current_chat_room, raw_text))]
    pub async fn submit(
        &self,
        sender_key: &str,
        current_chat_room: Option<&str>,
        raw_text: &str,
        now_millis: i64,
    ) -> Result<SubmitOutcome> {
        if !self.is_chat_room_selected(current_chat_room) {
            self.notifier
                .notify("Please select a chatroom before sending a message!", false);
            return Ok(SubmitOutcome::NoChatRoom);
        }

        if let Admission::Throttled { retry_after_ms } = self.limiter.try_admit(sender_key, now_millis)? {
            shared::record_counter("identity.message.throttled", 1);
            tracing::debug!(retry_after_ms = retry_after_ms, "Message throttled");
            self.notifier
                .notify("Please wait two seconds before sending another message!", false);
            return Ok(SubmitOutcome::Throttled { retry_after_ms });
        }

        let text = sanitize_message(raw_text, self.max_message_length);

        if let Err(e) = self.sender.send(&text).await {
            tracing::error!(error = %e, "Message delivery failed");
            self.notifier
                .notify(&format!("Failed to send message: {}", e), false);
            return Err(e);
        }

        shared::record_counter("identity.message.sent", 1);

        Ok(SubmitOutcome::Sent)
    }
}
