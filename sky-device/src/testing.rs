//! In-memory device client for tests.
//!
//! Records every call with the (possibly paused) tokio clock, and can be
//! scripted to fail discovery, key presses or channel changes a set number of
//! times.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::channel::mpsc;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::client::{DeviceClient, DeviceHandle, DeviceIdentity, StateSnapshot, StateStream};
use crate::error::ClientError;
use crate::keys::names;

/// A call made against the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    Discover(String),
    PressKey(String),
    SetChannel(String),
    CheckPower,
}

#[derive(Debug, Default)]
struct CallLog {
    calls: Mutex<Vec<(Instant, MockCall)>>,
}

impl CallLog {
    fn record(&self, call: MockCall) {
        self.calls.lock().push((Instant::now(), call));
    }
}

fn take_failure(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

/// Mock [`DeviceClient`] handing out a single shared [`MockDeviceHandle`]
pub struct MockDeviceClient {
    handle: Arc<MockDeviceHandle>,
    log: Arc<CallLog>,
    discover_failures: AtomicU32,
    key_failures: AtomicU32,
}

impl MockDeviceClient {
    pub fn new() -> Arc<Self> {
        Self::with_identity(DeviceIdentity {
            model: "ES240".to_string(),
            serial: "0629123456".to_string(),
            software: "Q222.000.21.00-AS".to_string(),
        })
    }

    pub fn with_identity(identity: DeviceIdentity) -> Arc<Self> {
        let log = Arc::new(CallLog::default());
        Arc::new(Self {
            handle: Arc::new(MockDeviceHandle {
                identity,
                log: Arc::clone(&log),
                power: AtomicBool::new(false),
                channel_failures: AtomicU32::new(0),
                broken_streams: AtomicBool::new(false),
                state_tx: Mutex::new(None),
            }),
            log,
            discover_failures: AtomicU32::new(0),
            key_failures: AtomicU32::new(0),
        })
    }

    pub fn handle(&self) -> Arc<MockDeviceHandle> {
        Arc::clone(&self.handle)
    }

    /// Make the next `n` discoveries fail
    pub fn fail_next_discoveries(&self, n: u32) {
        self.discover_failures.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` key presses fail
    pub fn fail_next_key_presses(&self, n: u32) {
        self.key_failures.store(n, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.log.calls.lock().iter().map(|(_, call)| call.clone()).collect()
    }

    pub fn timed_calls(&self) -> Vec<(Instant, MockCall)> {
        self.log.calls.lock().clone()
    }

    /// Key presses and channel changes only, in order
    pub fn commands(&self) -> Vec<MockCall> {
        self.calls()
            .into_iter()
            .filter(|call| matches!(call, MockCall::PressKey(_) | MockCall::SetChannel(_)))
            .collect()
    }

    pub fn key_presses(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                MockCall::PressKey(key) => Some(key),
                _ => None,
            })
            .collect()
    }

    pub fn discover_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, MockCall::Discover(_)))
            .count()
    }

    pub fn clear_calls(&self) {
        self.log.calls.lock().clear();
    }
}

#[async_trait]
impl DeviceClient for MockDeviceClient {
    async fn discover(&self, address: &str) -> Result<Arc<dyn DeviceHandle>, ClientError> {
        self.log.record(MockCall::Discover(address.to_string()));
        if take_failure(&self.discover_failures) {
            return Err(ClientError::Unreachable(format!("no answer from {address}")));
        }
        Ok(Arc::clone(&self.handle) as Arc<dyn DeviceHandle>)
    }

    async fn press_key(&self, _address: &str, key: &str) -> Result<(), ClientError> {
        self.log.record(MockCall::PressKey(key.to_string()));
        if take_failure(&self.key_failures) {
            return Err(ClientError::Transport(format!("{key} not acknowledged")));
        }
        if key == names::POWER {
            self.handle.power.fetch_xor(true, Ordering::SeqCst);
        }
        Ok(())
    }
}

/// Mock [`DeviceHandle`]
pub struct MockDeviceHandle {
    identity: DeviceIdentity,
    log: Arc<CallLog>,
    power: AtomicBool,
    channel_failures: AtomicU32,
    broken_streams: AtomicBool,
    state_tx: Mutex<Option<mpsc::UnboundedSender<Result<StateSnapshot, ClientError>>>>,
}

impl MockDeviceHandle {
    pub fn set_power(&self, on: bool) {
        self.power.store(on, Ordering::SeqCst);
    }

    pub fn power(&self) -> bool {
        self.power.load(Ordering::SeqCst)
    }

    /// Make the next `n` channel changes fail
    pub fn fail_next_channel_changes(&self, n: u32) {
        self.channel_failures.store(n, Ordering::SeqCst);
    }

    /// While set, every new state subscription fails as soon as it is polled
    pub fn break_state_streams(&self, broken: bool) {
        self.broken_streams.store(broken, Ordering::SeqCst);
    }

    /// Deliver a state snapshot to the current subscriber.
    ///
    /// Returns `false` if nobody is subscribed.
    pub fn push_state(&self, state: StateSnapshot) -> bool {
        self.state_tx
            .lock()
            .as_ref()
            .map(|tx| tx.unbounded_send(Ok(state)).is_ok())
            .unwrap_or(false)
    }

    /// Report a transport failure on the state stream and close it
    pub fn drop_connection(&self) {
        if let Some(tx) = self.state_tx.lock().take() {
            let _ = tx.unbounded_send(Err(ClientError::Transport("connection reset".to_string())));
        }
    }

    pub fn is_subscribed(&self) -> bool {
        self.state_tx.lock().is_some()
    }
}

#[async_trait]
impl DeviceHandle for MockDeviceHandle {
    fn identity(&self) -> DeviceIdentity {
        self.identity.clone()
    }

    async fn check_power(&self) -> Result<bool, ClientError> {
        self.log.record(MockCall::CheckPower);
        Ok(self.power())
    }

    async fn set_channel(&self, uri: &str) -> Result<(), ClientError> {
        self.log.record(MockCall::SetChannel(uri.to_string()));
        if take_failure(&self.channel_failures) {
            return Err(ClientError::Rejected(format!("cannot tune {uri}")));
        }
        Ok(())
    }

    fn state_changes(&self) -> StateStream {
        if self.broken_streams.load(Ordering::SeqCst) {
            let failure = ClientError::Transport("subscription refused".to_string());
            return futures::stream::once(async move { Err(failure) }).boxed();
        }
        let (tx, rx) = mpsc::unbounded();
        *self.state_tx.lock() = Some(tx);
        rx.boxed()
    }
}
