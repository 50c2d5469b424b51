use std::sync::Arc;

use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::client::{BackendClient, TestMeta};
use crate::error::Result;

/// Observable "list of tests".
///
/// Views that show tests subscribe here and are told whenever the list is
/// refreshed, e.g. after a run finishes.
#[derive(Clone)]
pub struct TestCatalog {
    client: BackendClient,
    tx: Arc<watch::Sender<Arc<Vec<TestMeta>>>>,
}

impl TestCatalog {
    pub fn new(client: BackendClient) -> Self {
        let (tx, _rx) = watch::channel(Arc::new(Vec::new()));
        Self { client, tx: Arc::new(tx) }
    }

    pub fn current(&self) -> Arc<Vec<TestMeta>> {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<Vec<TestMeta>>> {
        self.tx.subscribe()
    }

    /// Stream of list snapshots, starting with the current one.
    pub fn changes(&self) -> WatchStream<Arc<Vec<TestMeta>>> {
        WatchStream::new(self.subscribe())
    }

    /// Refetches the list and publishes it to every subscriber.
    pub async fn refresh(&self) -> Result<Arc<Vec<TestMeta>>> {
        let tests = Arc::new(self.client.list_tests().await?);
        self.tx.send_replace(tests.clone());
        tracing::debug!(count = tests.len(), "test catalog refreshed");
        Ok(tests)
    }
}
