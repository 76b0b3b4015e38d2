//! Connection session for one set-top box.
//!
//! ```text
//! Disconnected ──start()──▶ Connecting ──discover ok──▶ Connected
//!                             ▲    │                        │
//!                             │    └─ fail: wait, retry ─┐  │ stream error / end
//!                             └──────────────────────────┴──┘
//! ```
//!
//! At most one device handle is live at a time; the retry loop is the only
//! thing that replaces it.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::StreamExt;
use parking_lot::{Mutex, RwLock};
use persist_store::DeviceStore;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::client::{DeviceClient, DeviceHandle, StateSnapshot, StateStream};
use crate::config::SessionConfig;
use crate::error::{ClientError, Result, SessionError};
use crate::identity::CachedDeviceInfo;
use crate::keys::names;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
        }
    }
}

/// Notifications for the accessory that owns the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A connection was established and the box identity recorded
    Connected(CachedDeviceInfo),
    /// The box reported a new state snapshot
    StateChanged(StateSnapshot),
    /// The connection was lost; the session is reconnecting
    Disconnected,
}

/// Format a channel number the way the box expects it in a channel change
///
/// ```
/// assert_eq!(sky_device::channel_uri(101), "xsi://65");
/// ```
pub fn channel_uri(channel_number: u32) -> String {
    format!("xsi://{channel_number:X}")
}

pub struct DeviceSession {
    name: String,
    address: String,
    client: Arc<dyn DeviceClient>,
    store: DeviceStore,
    config: SessionConfig,

    state: watch::Sender<ConnectionState>,
    handle: RwLock<Option<Arc<dyn DeviceHandle>>>,
    channel_id: Mutex<Option<u32>>,
    events: broadcast::Sender<SessionEvent>,

    /// Background connection loop, present once started
    task: Mutex<Option<JoinHandle<()>>>,
    shut_down: AtomicBool,
}

impl DeviceSession {
    /// Create a session. Nothing happens on the network until [`start`](Self::start).
    pub fn new(
        name: impl Into<String>,
        address: impl Into<String>,
        client: Arc<dyn DeviceClient>,
        store: DeviceStore,
        config: SessionConfig,
    ) -> Arc<Self> {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (events, _) = broadcast::channel(config.event_buffer_size.max(1));

        Arc::new(Self {
            name: name.into(),
            address: address.into(),
            client,
            store,
            config,
            state,
            handle: RwLock::new(None),
            channel_id: Mutex::new(None),
            events,
            task: Mutex::new(None),
            shut_down: AtomicBool::new(false),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Last channel reported by the box
    pub fn current_channel(&self) -> Option<u32> {
        *self.channel_id.lock()
    }

    /// Spawn the connection loop in the background. Must be called from
    /// within a Tokio runtime. Calling it again is a no-op.
    pub fn start(self: &Arc<Self>) {
        if self.is_shut_down() {
            return;
        }
        let mut task = self.task.lock();
        if task.is_some() {
            return;
        }
        let session = Arc::clone(self);
        *task = Some(tokio::spawn(async move { session.run().await }));
    }

    /// Start the connection loop if needed and wait until a connection is up.
    ///
    /// Retries indefinitely; only resolves early if the session is shut down.
    pub async fn connect(self: &Arc<Self>) -> Result<()> {
        self.start();
        let mut state = self.state.subscribe();
        loop {
            if self.is_shut_down() {
                return Err(SessionError::ShutDown {
                    device: self.name.clone(),
                });
            }
            if *state.borrow_and_update() == ConnectionState::Connected {
                return Ok(());
            }
            if state.changed().await.is_err() {
                return Err(SessionError::ShutDown {
                    device: self.name.clone(),
                });
            }
        }
    }

    /// Stop the connection loop. In-flight retries are abandoned.
    pub fn shutdown(&self) {
        self.shut_down.store(true, Ordering::SeqCst);
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
        // An aborted task can still be between awaits on another thread;
        // `try_connect` checks the flag before publishing anything
        self.handle.write().take();
        self.state.send_replace(ConnectionState::Disconnected);
        tracing::debug!(device = %self.name, "Session stopped");
    }

    async fn run(self: Arc<Self>) {
        loop {
            self.state.send_replace(ConnectionState::Connecting);

            match self.try_connect().await {
                Ok(Some(changes)) => {
                    let connected_at = Instant::now();
                    self.listen(changes).await;
                    self.handle.write().take();
                    let _ = self.events.send(SessionEvent::Disconnected);

                    // A connection that dropped straight away waits out the
                    // rest of the retry interval before rediscovering
                    let wait = self.config.retry_interval.saturating_sub(connected_at.elapsed());
                    tracing::warn!(
                        device = %self.name,
                        address = %self.address,
                        "Lost connection to Sky box, reconnecting in {}s",
                        wait.as_secs()
                    );
                    tokio::time::sleep(wait).await;
                }
                Ok(None) => return,
                Err(e) => {
                    tracing::error!(
                        device = %self.name,
                        address = %self.address,
                        error = %e,
                        "Failed to connect to Sky box, will retry in {}s",
                        self.config.retry_interval.as_secs()
                    );
                    tokio::time::sleep(self.config.retry_interval).await;
                }
            }
        }
    }

    /// Discover the box and publish the handle.
    ///
    /// `Ok(None)` means the session was shut down while discovering.
    async fn try_connect(&self) -> std::result::Result<Option<StateStream>, ClientError> {
        let handle = self.client.discover(&self.address).await?;
        let identity = handle.identity();
        // Subscribe before publishing the handle so no snapshot is missed
        let changes = handle.state_changes();
        {
            let mut current = self.handle.write();
            if self.is_shut_down() {
                return Ok(None);
            }
            *current = Some(handle);
        }

        tracing::info!(
            device = %self.name,
            "Connected to Sky box {} at {}",
            identity.serial,
            self.address
        );

        let info = CachedDeviceInfo::from_identity(&identity);
        if let Err(e) = self.store.set(CachedDeviceInfo::STORE_KEY, &info).await {
            tracing::warn!(device = %self.name, error = %e, "Failed to cache device information");
        }

        let published = self.state.send_if_modified(|state| {
            if self.is_shut_down() {
                return false;
            }
            *state = ConnectionState::Connected;
            true
        });
        if !published {
            self.handle.write().take();
            return Ok(None);
        }
        let _ = self.events.send(SessionEvent::Connected(info));
        Ok(Some(changes))
    }

    fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    async fn listen(&self, mut changes: StateStream) {
        while let Some(item) = changes.next().await {
            match item {
                Ok(state) => self.on_state_change(state),
                Err(e) => {
                    tracing::warn!(device = %self.name, error = %e, "State stream failed");
                    return;
                }
            }
        }
        tracing::debug!(device = %self.name, "State stream ended");
    }

    /// Record a state snapshot from the box and notify subscribers
    pub fn on_state_change(&self, state: StateSnapshot) {
        let previous = std::mem::replace(&mut *self.channel_id.lock(), state.channel_id);

        if previous != state.channel_id {
            match (state.channel_id, previous) {
                (Some(current), Some(previous)) => {
                    tracing::info!(device = %self.name, "Channel ID {} (was {})", current, previous)
                }
                (Some(current), None) => tracing::info!(device = %self.name, "Channel ID {}", current),
                (None, Some(previous)) => {
                    tracing::info!(device = %self.name, "No channel (was {})", previous)
                }
                (None, None) => {}
            }
        }

        let _ = self.events.send(SessionEvent::StateChanged(state));
    }

    fn connected_handle(&self) -> Result<Arc<dyn DeviceHandle>> {
        self.handle
            .read()
            .clone()
            .ok_or_else(|| SessionError::ServiceUnavailable {
                device: self.name.clone(),
            })
    }

    /// Whether the box is out of standby
    pub async fn power_state(&self) -> Result<bool> {
        let handle = self.connected_handle()?;
        tracing::debug!(device = %self.name, "Getting power state");
        handle
            .check_power()
            .await
            .map_err(|source| SessionError::command(&self.name, "check power", source))
    }

    /// Send a vendor key name to the box. Not retried.
    pub async fn press_key(&self, key: &str) -> Result<()> {
        tracing::debug!(device = %self.name, key, "Pressing key");
        self.client
            .press_key(&self.address, key)
            .await
            .map_err(|source| SessionError::command(&self.name, format!("press {key}"), source))
    }

    /// Tune to `channel_number`.
    ///
    /// If the box refuses (usually because the guide or a menu is open), opens
    /// the guide, backs out, waits and tries exactly once more.
    pub async fn set_channel(&self, channel_number: u32) -> Result<()> {
        let handle = self.connected_handle()?;
        let uri = channel_uri(channel_number);
        tracing::info!(device = %self.name, uri = %uri, "Setting channel {}", channel_number);

        if let Err(e) = handle.set_channel(&uri).await {
            tracing::info!(
                device = %self.name,
                error = %e,
                "Channel change failed, trying to close the TV guide"
            );

            self.press_key(names::TV_GUIDE).await?;
            for _ in 0..self.config.recovery_back_presses {
                self.press_key(names::BACK).await?;
            }
            tokio::time::sleep(self.config.recovery_pause).await;

            handle
                .set_channel(&uri)
                .await
                .map_err(|source| SessionError::command(&self.name, format!("set channel {uri}"), source))?;
        }

        Ok(())
    }
}

impl fmt::Debug for DeviceSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceSession")
            .field("name", &self.name)
            .field("address", &self.address)
            .field("state", &self.state())
            .field("channel_id", &self.current_channel())
            .finish()
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.abort();
        }
    }
}
