//! 📦 A sink that never forgets. Great for assertions, great for trust issues.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::common::RoutedRecord;
use crate::sinks::BrokerSink;

/// 🔒 Clone it before handing it to the publisher and peek inside afterwards.
/// Every clone shares the same `Vec`.
#[derive(Debug, Default, Clone)]
pub struct InMemorySink {
    received: Arc<Mutex<Vec<RoutedRecord>>>,
    closed: Arc<Mutex<bool>>,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn received(&self) -> Vec<RoutedRecord> {
        self.received.lock().await.clone()
    }

    pub async fn is_closed(&self) -> bool {
        *self.closed.lock().await
    }
}

#[async_trait]
impl BrokerSink for InMemorySink {
    async fn send(&mut self, record: RoutedRecord) -> Result<()> {
        self.received.lock().await.push(record);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        // 🗑️ nothing to flush. we live in RAM.
        *self.closed.lock().await = true;
        Ok(())
    }
}
