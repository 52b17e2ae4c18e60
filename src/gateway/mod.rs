//! Messaging gateways — outbound delivery to the user's platform.

pub mod telegram;

pub use telegram::TelegramGateway;

use async_trait::async_trait;

use crate::error::GatewayError;
use crate::model::Platform;

/// A reply to deliver: text, optionally accompanied by feedback audio.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub text: String,
    pub audio_url: Option<String>,
}

impl OutboundMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            audio_url: None,
        }
    }

    pub fn with_audio(mut self, url: impl Into<String>) -> Self {
        self.audio_url = Some(url.into());
        self
    }
}

/// Platform-agnostic outbound seam. The dispatcher and pipeline talk to
/// this trait; platform specifics stay in the implementations.
#[async_trait]
pub trait MessagingGateway: Send + Sync {
    fn name(&self) -> &str;

    async fn send(
        &self,
        platform: Platform,
        chat_id: &str,
        message: OutboundMessage,
    ) -> Result<(), GatewayError>;
}
