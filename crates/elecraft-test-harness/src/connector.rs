//! Mock [`Connector`] handing out pre-built transports.
//!
//! Each `open()` takes the next prepared outcome in order: a
//! [`MockTransport`], an error, or a transport that never finishes opening.
//! With nothing prepared, `open()` fails with a transport error.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use elecraft_core::error::{Error, Result};
use elecraft_core::transport::{Connector, Transport, TransportConfig};

use crate::mock_serial::{MockHandle, MockTransport};

enum Outcome {
    Transport(MockTransport),
    Fail(Error),
    Hang,
}

#[derive(Default)]
struct Inner {
    outcomes: VecDeque<Outcome>,
    opened: Vec<TransportConfig>,
}

/// A [`Connector`] for tests. Cloning shares the same queue.
#[derive(Clone, Default)]
pub struct MockConnector {
    inner: Arc<Mutex<Inner>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Prepare a transport for the next `open()` and return its handle.
    pub fn push_transport(&self) -> MockHandle {
        let (transport, handle) = MockTransport::new();
        self.lock().outcomes.push_back(Outcome::Transport(transport));
        handle
    }

    /// Make the next `open()` fail with `error`.
    pub fn push_failure(&self, error: Error) {
        self.lock().outcomes.push_back(Outcome::Fail(error));
    }

    /// Make the next `open()` never complete.
    pub fn push_hang(&self) {
        self.lock().outcomes.push_back(Outcome::Hang);
    }

    /// Configurations passed to `open()` so far, in call order.
    pub fn opened(&self) -> Vec<TransportConfig> {
        self.lock().opened.clone()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn open(&self, config: &TransportConfig) -> Result<Box<dyn Transport>> {
        let outcome = {
            let mut inner = self.lock();
            inner.opened.push(config.clone());
            inner.outcomes.pop_front()
        };
        match outcome {
            Some(Outcome::Transport(transport)) => Ok(Box::new(transport)),
            Some(Outcome::Fail(e)) => Err(e),
            Some(Outcome::Hang) => std::future::pending().await,
            None => Err(Error::Transport(format!(
                "no mock transport prepared for {}",
                config.port
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn outcomes_are_consumed_in_order() {
        let connector = MockConnector::new();
        connector.push_failure(Error::Transport("busy".into()));
        let handle = connector.push_transport();

        let config = TransportConfig::new("mock0");
        assert!(matches!(
            connector.open(&config).await,
            Err(Error::Transport(_))
        ));

        let mut transport = connector.open(&config).await.unwrap();
        transport.send(b"FA;").await.unwrap();
        assert_eq!(handle.sent_data(), vec![b"FA;".to_vec()]);
        assert_eq!(connector.opened().len(), 2);
    }

    #[tokio::test]
    async fn empty_queue_fails() {
        let connector = MockConnector::new();
        let result = connector.open(&TransportConfig::new("mock0")).await;
        match result {
            Err(Error::Transport(msg)) => assert!(msg.contains("mock0")),
            _ => panic!("expected transport error"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn hang_never_completes() {
        let connector = MockConnector::new();
        connector.push_hang();
        let config = TransportConfig::new("mock0");
        let result =
            tokio::time::timeout(Duration::from_secs(5), connector.open(&config)).await;
        assert!(result.is_err());
    }
}
