use async_trait::async_trait;

/// A message received from a channel
#[derive(Debug, Clone)]
pub struct ChannelMessage {
    pub id: String,
    /// Platform user id of the author; gates and keys history
    pub sender: String,
    /// Where replies go (the chat the message arrived in)
    pub reply_target: String,
    pub content: String,
    pub channel: String,
    pub timestamp: u64,
}

/// Formatting hint for outbound text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParseMode {
    /// Sent verbatim; nothing is interpreted as markup.
    #[default]
    Plain,
    /// Telegram-flavoured HTML (`<a>`, `<b>`, `<i>`, `<code>`).
    Html,
}

/// A message to send through a channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendMessage {
    pub content: String,
    pub recipient: String,
    pub parse_mode: ParseMode,
}

impl SendMessage {
    pub fn new(content: impl Into<String>, recipient: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            recipient: recipient.into(),
            parse_mode: ParseMode::Plain,
        }
    }

    #[must_use]
    pub fn with_parse_mode(mut self, parse_mode: ParseMode) -> Self {
        self.parse_mode = parse_mode;
        self
    }
}

/// Core channel trait — implement for any messaging platform
#[async_trait]
pub trait Channel: Send + Sync {
    /// Human-readable channel name
    fn name(&self) -> &str;

    /// Send a message through this channel
    async fn send(&self, message: &SendMessage) -> anyhow::Result<()>;

    /// Start listening for incoming messages (long-running)
    async fn listen(&self, tx: tokio::sync::mpsc::Sender<ChannelMessage>) -> anyhow::Result<()>;

    /// Signal that the bot is processing a response (e.g. "typing" indicator).
    async fn start_typing(&self, _recipient: &str) -> anyhow::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct DummyChannel;

    #[async_trait]
    impl Channel for DummyChannel {
        fn name(&self) -> &str {
            "dummy"
        }

        async fn send(&self, _message: &SendMessage) -> anyhow::Result<()> {
            Ok(())
        }

        async fn listen(
            &self,
            tx: tokio::sync::mpsc::Sender<ChannelMessage>,
        ) -> anyhow::Result<()> {
            tx.send(ChannelMessage {
                id: "1".into(),
                sender: "tester".into(),
                reply_target: "chat-1".into(),
                content: "hello".into(),
                channel: "dummy".into(),
                timestamp: 123,
            })
            .await
            .map_err(|e| anyhow::anyhow!(e.to_string()))
        }
    }

    #[test]
    fn send_message_defaults_to_plain() {
        let msg = SendMessage::new("Hello", "recipient_123");
        assert_eq!(msg.content, "Hello");
        assert_eq!(msg.recipient, "recipient_123");
        assert_eq!(msg.parse_mode, ParseMode::Plain);
        assert_eq!(msg.with_parse_mode(ParseMode::Html).parse_mode, ParseMode::Html);
    }

    #[tokio::test]
    async fn default_trait_methods_return_success() {
        let channel = DummyChannel;

        assert!(channel.start_typing("bob").await.is_ok());
        assert!(channel.send(&SendMessage::new("hello", "bob")).await.is_ok());
    }

    #[tokio::test]
    async fn listen_sends_message_to_channel() {
        let channel = DummyChannel;
        let (tx, mut rx) = tokio::sync::mpsc::channel(1);

        channel.listen(tx).await.unwrap();

        let received = rx.recv().await.expect("message should be sent");
        assert_eq!(received.sender, "tester");
        assert_eq!(received.reply_target, "chat-1");
        assert_eq!(received.content, "hello");
    }
}
