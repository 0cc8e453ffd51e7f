// src/dispatch/transport.rs
use anyhow::Result;

use crate::item::NewsItem;
use crate::logging::anon_id;

/// Delivery channel for one recipient's digest. A successful return means
/// the whole digest went out.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, recipient: &str, items: &[NewsItem]) -> Result<()>;
    fn name(&self) -> &'static str;
}

/// Writes the digest to the log instead of a chat channel. Used by the
/// runner until a real channel is wired in.
#[derive(Debug, Clone)]
pub struct LogTransport {
    greeting: String,
}

impl Default for LogTransport {
    fn default() -> Self {
        Self {
            greeting: "早安！以下是今天的重點新聞：".to_string(),
        }
    }
}

impl LogTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_greeting(mut self, greeting: impl Into<String>) -> Self {
        self.greeting = greeting.into();
        self
    }
}

#[async_trait::async_trait]
impl Transport for LogTransport {
    async fn send(&self, recipient: &str, items: &[NewsItem]) -> Result<()> {
        let to = anon_id(recipient);
        tracing::info!(target: "push", %to, count = items.len(), "{}", self.greeting);
        for (i, it) in items.iter().enumerate() {
            tracing::info!(
                target: "push",
                %to,
                n = i + 1,
                category = %it.category,
                link = %it.link,
                "{}",
                it.title
            );
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}
