//! Mock transports shared by unit tests

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::transport::{Frame, Transport, TransportError};

/// Shared view of what a mock transport saw
#[derive(Clone, Default)]
pub struct TransportProbe {
    sent: Arc<Mutex<Vec<Value>>>,
    closes: Arc<AtomicUsize>,
    dropped: Arc<AtomicBool>,
}

impl TransportProbe {
    pub fn sent(&self) -> Vec<Value> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn is_dropped(&self) -> bool {
        self.dropped.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Copy)]
pub enum Behavior {
    Record,
    Fail,
    Hang,
    /// Sends succeed but close never completes
    StuckClose,
}

pub struct MockTransport {
    probe: TransportProbe,
    behavior: Behavior,
}

impl MockTransport {
    pub fn recording() -> (Box<dyn Transport>, TransportProbe) {
        Self::with_behavior(Behavior::Record)
    }

    pub fn failing() -> (Box<dyn Transport>, TransportProbe) {
        Self::with_behavior(Behavior::Fail)
    }

    pub fn hanging() -> (Box<dyn Transport>, TransportProbe) {
        Self::with_behavior(Behavior::Hang)
    }

    pub fn stuck_on_close() -> (Box<dyn Transport>, TransportProbe) {
        Self::with_behavior(Behavior::StuckClose)
    }

    fn with_behavior(behavior: Behavior) -> (Box<dyn Transport>, TransportProbe) {
        let probe = TransportProbe::default();
        let transport = MockTransport {
            probe: probe.clone(),
            behavior,
        };
        (Box::new(transport), probe)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send_json(&self, frame: Frame) -> Result<(), TransportError> {
        match self.behavior {
            Behavior::Record | Behavior::StuckClose => {
                self.probe.sent.lock().unwrap().push(frame.as_ref().clone());
                Ok(())
            }
            Behavior::Fail => Err(TransportError::Send("connection reset".to_string())),
            Behavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            }
        }
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.probe.closes.fetch_add(1, Ordering::SeqCst);
        match self.behavior {
            Behavior::Fail => Err(TransportError::Closed),
            Behavior::StuckClose => std::future::pending().await,
            _ => Ok(()),
        }
    }
}

impl Drop for MockTransport {
    fn drop(&mut self) {
        self.probe.dropped.store(true, Ordering::SeqCst);
    }
}
