//! Television accessory: the face of one set-top box towards the host.
//!
//! Composes a [`DeviceSession`], an [`InputSourceRegistry`] and the device's
//! persisted state, and answers the host's capability reads and writes.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use persist_store::{DeviceStore, KeyValueStore};
use sky_device::{
    names, CachedDeviceInfo, DeviceClient, DeviceSession, RemoteButton, RemoteKeyMap,
    SessionConfig, SessionEvent,
};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::DeviceConfig;
use crate::error::{Result, TvError};
use crate::hap::{
    AccessoryInformation, Active, Binding, Capability, Characteristic, CharacteristicUpdate,
    CharacteristicValue, IsConfigured, ServiceDescriptor, ServiceKind, SleepDiscoveryMode,
    VisibilityState,
};
use crate::input::{InputKind, InputSourceRegistry};

const TELEVISION_NAME_FIELD: &str = "ConfiguredName";

/// Shared collaborators every accessory is built from
#[derive(Clone)]
pub struct AccessoryContext {
    pub store: KeyValueStore,
    pub client: Arc<dyn DeviceClient>,
    pub session: SessionConfig,
}

impl AccessoryContext {
    pub fn new(store: KeyValueStore, client: Arc<dyn DeviceClient>) -> Self {
        Self {
            store,
            client,
            session: SessionConfig::default(),
        }
    }
}

/// Counts television accessories published on one bridge.
///
/// A HAP server only supports one Television service for the iOS remote, so
/// registering a second one logs a warning.
#[derive(Debug, Clone, Default)]
pub struct BridgeTelevisions {
    count: Arc<AtomicUsize>,
}

impl BridgeTelevisions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a television on the bridge; returns how many there are now
    pub fn register(&self, name: &str) -> usize {
        let count = self.count.fetch_add(1, Ordering::SeqCst) + 1;
        if count > 1 {
            tracing::warn!(
                device = %name,
                count,
                "You have multiple TV accessories published on the same bridge. The iOS TV Remote only \
                 allows one Television service per HAP server. Set the external flag on all but one of them."
            );
        }
        count
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    pub fn has_multiple(&self) -> bool {
        self.count() > 1
    }
}

struct Inner {
    name: String,
    config: DeviceConfig,
    session: Arc<DeviceSession>,
    inputs: Arc<InputSourceRegistry>,
    store: DeviceStore,
    key_map: RemoteKeyMap,
    information: Arc<RwLock<AccessoryInformation>>,
    updates: broadcast::Sender<CharacteristicUpdate>,
    forwarder: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(task) = self.forwarder.get_mut().take() {
            task.abort();
        }
        self.session.shutdown();
    }
}

/// One Sky box exposed as a HomeKit television.
///
/// Cheap to clone; clones share the same session and state.
///
/// # Example
///
/// ```rust,ignore
/// let tv = TelevisionAccessory::new(config, &context, Some(&bridge))?;
/// tv.set_power(true).await?;
/// tv.set_active_identifier(1).await?;   // first configured channel
/// tv.send_remote_key(RemoteButton::Select.code()).await?;
/// ```
#[derive(Clone)]
pub struct TelevisionAccessory {
    inner: Arc<Inner>,
}

impl TelevisionAccessory {
    /// Build the accessory and start connecting in the background.
    ///
    /// `bridge` is the counter for the bridge the accessory is published on,
    /// or `None` when it gets its own HAP server.
    pub fn new(
        config: DeviceConfig,
        context: &AccessoryContext,
        bridge: Option<&BridgeTelevisions>,
    ) -> Result<Self> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| TvError::NoRuntime)?;

        if let Some(bridge) = bridge {
            bridge.register(&config.name);
        }

        let store = context.store.device(config.storage_key());

        let mut information = AccessoryInformation::from_config(&config);
        match store.get_cached::<CachedDeviceInfo>(CachedDeviceInfo::STORE_KEY) {
            Ok(Some(cached)) => information.apply(&cached),
            Ok(None) => {}
            Err(e) => tracing::warn!(
                device = %config.name,
                error = %e,
                "Ignoring unreadable cached accessory information"
            ),
        }
        let information = Arc::new(RwLock::new(information));

        let inputs = Arc::new(InputSourceRegistry::new(
            config.name.clone(),
            &config.tv_channels,
            store.clone(),
        ));

        let session = DeviceSession::new(
            config.name.clone(),
            config.ip_address.clone(),
            Arc::clone(&context.client),
            store.clone(),
            context.session.clone(),
        );

        let (updates, _) = broadcast::channel(context.session.event_buffer_size.max(1));

        // Subscribe before the session starts so the first events are not lost
        let forwarder = runtime.spawn(forward_session_events(
            config.name.clone(),
            session.subscribe(),
            Arc::clone(&inputs),
            Arc::clone(&information),
            updates.clone(),
        ));
        session.start();

        tracing::debug!(device = %config.name, inputs = inputs.len(), "Created television accessory");

        Ok(Self {
            inner: Arc::new(Inner {
                name: config.name.clone(),
                config,
                session,
                inputs,
                store,
                key_map: RemoteKeyMap::new(),
                information,
                updates,
                forwarder: Mutex::new(Some(forwarder)),
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.inner.config
    }

    pub fn session(&self) -> &Arc<DeviceSession> {
        &self.inner.session
    }

    pub fn inputs(&self) -> &InputSourceRegistry {
        &self.inner.inputs
    }

    pub fn information(&self) -> AccessoryInformation {
        self.inner.information.read().clone()
    }

    /// Characteristic changes not triggered by a host write
    pub fn subscribe(&self) -> broadcast::Receiver<CharacteristicUpdate> {
        self.inner.updates.subscribe()
    }

    /// Stop the connection loop and event forwarding
    pub fn shutdown(&self) {
        if let Some(task) = self.inner.forwarder.lock().take() {
            task.abort();
        }
        self.inner.session.shutdown();
    }

    fn logged<T>(&self, operation: &str, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            tracing::error!(device = %self.inner.name, operation, error = %e, "Request failed");
        }
        result
    }

    // ------------------------------------------------------------------
    // Power
    // ------------------------------------------------------------------

    pub async fn power_state(&self) -> Result<bool> {
        let result = self.inner.session.power_state().await.map_err(TvError::from);
        self.logged("get power", result)
    }

    pub async fn active(&self) -> Result<Active> {
        self.power_state().await.map(Active::from_power)
    }

    /// Press power only if the box is not already in the requested state
    pub async fn set_power(&self, on: bool) -> Result<()> {
        let result = self.toggle_power(on).await;
        self.logged("set power", result)
    }

    async fn toggle_power(&self, on: bool) -> Result<()> {
        if self.inner.session.power_state().await? == on {
            return Ok(());
        }
        if on {
            tracing::info!(device = %self.inner.name, "Turning {} on", self.inner.name);
        } else {
            tracing::info!(device = %self.inner.name, "Turning {} off", self.inner.name);
        }
        self.inner.session.press_key(names::POWER).await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Active input
    // ------------------------------------------------------------------

    /// Identifier of the input matching the tuned channel, or Home
    pub async fn active_identifier(&self) -> Result<u32> {
        let channel = self.inner.session.current_channel();
        Ok(self.inner.inputs.active_identifier(channel))
    }

    pub async fn set_active_identifier(&self, identifier: u32) -> Result<()> {
        let result = self.switch_input(identifier).await;
        self.logged("set active input", result)
    }

    async fn switch_input(&self, identifier: u32) -> Result<()> {
        let source = self.inner.inputs.resolve(identifier)?;
        let display_name = self.inner.inputs.configured_name(identifier).await?;
        tracing::info!(
            device = %self.inner.name,
            "Setting input identifier for {} to {} ({})",
            self.inner.name,
            identifier,
            display_name
        );

        match source.kind {
            InputKind::Channel(channel) => self.inner.session.set_channel(channel).await?,
            InputKind::HomeScreen { key } => self.inner.session.press_key(key).await?,
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Names and visibility
    // ------------------------------------------------------------------

    /// Television name override, falling back to the configured name
    pub async fn configured_name(&self) -> Result<String> {
        let stored: Option<String> = self.inner.store.get(TELEVISION_NAME_FIELD).await?;
        Ok(stored.unwrap_or_else(|| self.inner.name.clone()))
    }

    pub fn configured_name_cached(&self) -> Result<String> {
        let stored: Option<String> = self.inner.store.get_cached(TELEVISION_NAME_FIELD)?;
        Ok(stored.unwrap_or_else(|| self.inner.name.clone()))
    }

    pub async fn set_configured_name(&self, name: &str) -> Result<()> {
        tracing::info!(
            device = %self.inner.name,
            "Setting configured name for Television service for {}: {}",
            self.inner.name,
            name
        );
        let result = self
            .inner
            .store
            .set(TELEVISION_NAME_FIELD, name)
            .await
            .map_err(TvError::from);
        self.logged("set configured name", result)
    }

    pub async fn input_name(&self, identifier: u32) -> Result<String> {
        let result = self.inner.inputs.configured_name(identifier).await;
        self.logged("get input name", result)
    }

    pub async fn set_input_name(&self, identifier: u32, name: &str) -> Result<()> {
        let result = self.inner.inputs.set_configured_name(identifier, name).await;
        self.logged("set input name", result)
    }

    pub async fn input_visibility(&self, identifier: u32) -> Result<VisibilityState> {
        let result = self.inner.inputs.visibility(identifier).await;
        self.logged("get input visibility", result)
    }

    /// Persist the visibility choice, then report it as the current visibility
    pub async fn set_input_visibility(&self, identifier: u32, state: VisibilityState) -> Result<()> {
        let result = self
            .inner
            .inputs
            .set_enabled(identifier, state == VisibilityState::Shown)
            .await;
        self.logged("set input visibility", result)?;

        let subtype = self.inner.inputs.resolve(identifier)?.subtype.clone();
        let _ = self.inner.updates.send(CharacteristicUpdate {
            service: ServiceKind::InputSource,
            subtype: Some(subtype),
            characteristic: Characteristic::CurrentVisibilityState,
            value: state.into(),
        });
        Ok(())
    }

    // ------------------------------------------------------------------
    // Remote
    // ------------------------------------------------------------------

    /// Translate a `RemoteKey` code and send it to the box
    pub async fn send_remote_key(&self, code: u8) -> Result<()> {
        let result = self.press_remote_key(code).await;
        self.logged("send remote key", result)
    }

    async fn press_remote_key(&self, code: u8) -> Result<()> {
        let key = self
            .inner
            .key_map
            .translate_code(code)
            .map_err(|e| TvError::UnsupportedKey {
                device: self.inner.name.clone(),
                code: e.0,
            })?;
        tracing::info!(
            device = %self.inner.name,
            "Sending key {} ({:?}: {}) to {}",
            key,
            RemoteButton::from_code(code),
            code,
            self.inner.name
        );
        self.inner.session.press_key(key).await?;
        Ok(())
    }

    /// Flash the info banner on screen
    pub async fn identify(&self) -> Result<()> {
        tracing::info!(device = %self.inner.name, "Identify called");
        let result = self
            .inner
            .session
            .press_key(names::INFO)
            .await
            .map_err(TvError::from);
        self.logged("identify", result)
    }

    // ------------------------------------------------------------------
    // Capability table
    // ------------------------------------------------------------------

    /// Services in publish order: information, television, then one per input
    pub fn services(&self) -> Vec<ServiceDescriptor> {
        let mut services = vec![self.inner.information.read().service()];

        let mut television = ServiceDescriptor::new(ServiceKind::Television, &self.inner.name);
        television.linked = self
            .inner
            .inputs
            .sources()
            .iter()
            .map(|source| source.subtype.clone())
            .collect();
        television.capabilities = vec![
            Capability::new(Characteristic::Active, Binding::Power),
            Capability::new(Characteristic::ActiveIdentifier, Binding::ActiveInput),
            Capability::new(Characteristic::ConfiguredName, Binding::TelevisionName),
            Capability::fixed(
                Characteristic::SleepDiscoveryMode,
                SleepDiscoveryMode::AlwaysDiscoverable,
            ),
            Capability::new(Characteristic::RemoteKey, Binding::RemoteKey),
        ];
        services.push(television);

        for source in self.inner.inputs.sources() {
            let id = source.identifier;
            let mut service = ServiceDescriptor::new(ServiceKind::InputSource, &source.default_name);
            service.subtype = Some(source.subtype.clone());
            service.capabilities = vec![
                Capability::fixed(Characteristic::Name, source.default_name.as_str()),
                Capability::new(Characteristic::ConfiguredName, Binding::InputName(id)),
                Capability::fixed(Characteristic::InputSourceType, source.source_type),
            ];
            if let Some(device_type) = source.device_type {
                service
                    .capabilities
                    .push(Capability::fixed(Characteristic::InputDeviceType, device_type));
            }
            service.capabilities.extend([
                Capability::fixed(Characteristic::IsConfigured, IsConfigured::Configured),
                Capability::new(
                    Characteristic::CurrentVisibilityState,
                    Binding::InputCurrentVisibility(id),
                ),
            ]);
            if !source.always_enabled {
                service.capabilities.push(Capability::new(
                    Characteristic::TargetVisibilityState,
                    Binding::InputTargetVisibility(id),
                ));
            }
            service
                .capabilities
                .push(Capability::fixed(Characteristic::Identifier, id));
            services.push(service);
        }

        services
    }

    /// Initial values for every readable capability, from cached state only.
    ///
    /// Capabilities that need the box (power) are left out.
    pub fn initial_values(&self) -> Result<Vec<(Binding, CharacteristicValue)>> {
        let mut values = vec![(
            Binding::TelevisionName,
            CharacteristicValue::Text(self.configured_name_cached()?),
        )];
        for source in self.inner.inputs.sources() {
            let id = source.identifier;
            let visibility = VisibilityState::from_enabled(self.inner.inputs.is_enabled_cached(id)?);
            values.push((
                Binding::InputName(id),
                CharacteristicValue::Text(self.inner.inputs.configured_name_cached(id)?),
            ));
            values.push((Binding::InputCurrentVisibility(id), visibility.into()));
            if !source.always_enabled {
                values.push((Binding::InputTargetVisibility(id), visibility.into()));
            }
        }
        Ok(values)
    }

    /// Answer a host read
    pub async fn read(
        &self,
        characteristic: Characteristic,
        binding: &Binding,
    ) -> Result<CharacteristicValue> {
        match binding {
            Binding::Static(value) => Ok(value.clone()),
            Binding::Power => self.active().await.map(Into::into),
            Binding::ActiveInput => self.active_identifier().await.map(Into::into),
            Binding::TelevisionName => self.configured_name().await.map(Into::into),
            Binding::RemoteKey => Err(TvError::WriteOnly(characteristic)),
            Binding::InputName(id) => self.input_name(*id).await.map(Into::into),
            Binding::InputCurrentVisibility(id) | Binding::InputTargetVisibility(id) => {
                self.input_visibility(*id).await.map(Into::into)
            }
        }
    }

    /// Apply a host write
    pub async fn write(
        &self,
        characteristic: Characteristic,
        binding: &Binding,
        value: CharacteristicValue,
    ) -> Result<()> {
        let invalid = |value: &CharacteristicValue| TvError::InvalidValue {
            characteristic,
            value: value.clone(),
        };

        match binding {
            Binding::Static(_) | Binding::InputCurrentVisibility(_) => {
                Err(TvError::ReadOnly(characteristic))
            }
            Binding::Power => {
                let active = value
                    .as_u32()
                    .and_then(Active::from_u32)
                    .ok_or_else(|| invalid(&value))?;
                self.set_power(active == Active::Active).await
            }
            Binding::ActiveInput => {
                let identifier = value.as_u32().ok_or_else(|| invalid(&value))?;
                self.set_active_identifier(identifier).await
            }
            Binding::TelevisionName => {
                let name = value.as_text().ok_or_else(|| invalid(&value))?;
                self.set_configured_name(name).await
            }
            Binding::RemoteKey => {
                let code = value
                    .as_u32()
                    .and_then(|code| u8::try_from(code).ok())
                    .ok_or_else(|| invalid(&value))?;
                self.send_remote_key(code).await
            }
            Binding::InputName(id) => {
                let name = value.as_text().ok_or_else(|| invalid(&value))?;
                self.set_input_name(*id, name).await
            }
            Binding::InputTargetVisibility(id) => {
                let state = value
                    .as_u32()
                    .and_then(VisibilityState::from_u32)
                    .ok_or_else(|| invalid(&value))?;
                self.set_input_visibility(*id, state).await
            }
        }
    }
}

impl std::fmt::Debug for TelevisionAccessory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelevisionAccessory")
            .field("name", &self.inner.name)
            .field("session", &self.inner.session)
            .field("inputs", &self.inner.inputs.len())
            .finish()
    }
}

/// Turn session events into characteristic updates for the host
async fn forward_session_events(
    device: String,
    mut events: broadcast::Receiver<SessionEvent>,
    inputs: Arc<InputSourceRegistry>,
    information: Arc<RwLock<AccessoryInformation>>,
    updates: broadcast::Sender<CharacteristicUpdate>,
) {
    let push = |service: ServiceKind, characteristic: Characteristic, value: CharacteristicValue| {
        let _ = updates.send(CharacteristicUpdate {
            service,
            subtype: None,
            characteristic,
            value,
        });
    };

    loop {
        match events.recv().await {
            Ok(SessionEvent::StateChanged(state)) => {
                push(
                    ServiceKind::Television,
                    Characteristic::Active,
                    Active::from_power(!state.standby).into(),
                );
                push(
                    ServiceKind::Television,
                    Characteristic::ActiveIdentifier,
                    inputs.active_identifier(state.channel_id).into(),
                );
            }
            Ok(SessionEvent::Connected(info)) => {
                let fields = {
                    let mut information = information.write();
                    information.apply(&info);
                    information.fields()
                };
                for (characteristic, value) in fields {
                    push(ServiceKind::AccessoryInformation, characteristic, value.into());
                }
            }
            Ok(SessionEvent::Disconnected) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(device = %device, skipped, "Dropped session events");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HapStatus;
    use sky_device::testing::{MockCall, MockDeviceClient};
    use sky_device::StateSnapshot;
    use std::time::Duration;

    fn context(client: &Arc<MockDeviceClient>, store: &KeyValueStore) -> AccessoryContext {
        AccessoryContext::new(store.clone(), Arc::clone(client) as Arc<dyn DeviceClient>)
    }

    fn lounge() -> DeviceConfig {
        DeviceConfig::new("Lounge", "192.168.1.50")
            .with_channel(101, "BBC One")
            .with_channel(102, "BBC Two")
    }

    async fn connected(client: &Arc<MockDeviceClient>, store: &KeyValueStore) -> TelevisionAccessory {
        let tv = TelevisionAccessory::new(lounge(), &context(client, store), None).unwrap();
        tv.session().connect().await.unwrap();
        client.clear_calls();
        tv
    }

    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn capture_logs(f: impl FnOnce()) -> String {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let writer = Arc::clone(&buffer);
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_max_level(tracing::Level::WARN)
            .with_writer(move || LogBuffer(Arc::clone(&writer)))
            .finish();
        tracing::subscriber::with_default(subscriber, f);
        let bytes = buffer.lock().clone();
        String::from_utf8(bytes).unwrap()
    }

    async fn next_update(
        updates: &mut broadcast::Receiver<CharacteristicUpdate>,
        characteristic: Characteristic,
    ) -> CharacteristicUpdate {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let update = updates.recv().await.unwrap();
                if update.characteristic == characteristic {
                    return update;
                }
            }
        })
        .await
        .unwrap()
    }

    #[test]
    fn test_second_bridge_television_warns() {
        let bridge = BridgeTelevisions::new();

        let first = capture_logs(|| assert_eq!(bridge.register("Lounge"), 1));
        assert!(first.is_empty(), "{first}");
        assert!(!bridge.has_multiple());

        let second = capture_logs(|| assert_eq!(bridge.register("Bedroom"), 2));
        assert!(second.contains("multiple TV accessories"), "{second}");
        assert!(second.contains("Bedroom"));
        assert!(bridge.has_multiple());
    }

    #[test]
    fn test_requires_runtime() {
        let client = MockDeviceClient::new();
        let store = KeyValueStore::in_memory();
        let result = TelevisionAccessory::new(lounge(), &context(&client, &store), None);
        assert!(matches!(result, Err(TvError::NoRuntime)));
    }

    #[tokio::test]
    async fn test_bridge_counts_televisions() {
        let client = MockDeviceClient::new();
        let store = KeyValueStore::in_memory();
        let bridge = BridgeTelevisions::new();

        let first = TelevisionAccessory::new(lounge(), &context(&client, &store), Some(&bridge)).unwrap();
        assert!(!bridge.has_multiple());
        let second = TelevisionAccessory::new(
            DeviceConfig::new("Bedroom", "192.168.1.51"),
            &context(&client, &store),
            Some(&bridge),
        )
        .unwrap();
        assert_eq!(bridge.count(), 2);
        assert!(bridge.has_multiple());

        first.shutdown();
        second.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_power_skips_matching_state() {
        let client = MockDeviceClient::new();
        let store = KeyValueStore::in_memory();
        let tv = connected(&client, &store).await;

        client.handle().set_power(true);
        tv.set_power(true).await.unwrap();
        assert!(client.key_presses().is_empty());

        tv.set_power(false).await.unwrap();
        assert_eq!(client.key_presses(), vec!["power"]);
        assert!(!client.handle().power());
        tv.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_power_unavailable_before_connect() {
        let client = MockDeviceClient::new();
        client.fail_next_discoveries(u32::MAX);
        let store = KeyValueStore::in_memory();
        let tv = TelevisionAccessory::new(lounge(), &context(&client, &store), None).unwrap();

        let err = tv.read(Characteristic::Active, &Binding::Power).await.unwrap_err();
        assert_eq!(err.hap_status(), HapStatus::ServiceCommunicationFailure);
        assert_eq!(tv.active_identifier().await.unwrap(), 0);
        tv.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_identify_presses_info() {
        let client = MockDeviceClient::new();
        let store = KeyValueStore::in_memory();
        let tv = connected(&client, &store).await;

        tv.identify().await.unwrap();
        assert_eq!(client.key_presses(), vec!["i"]);
        tv.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_remote_keys() {
        let client = MockDeviceClient::new();
        let store = KeyValueStore::in_memory();
        let tv = connected(&client, &store).await;

        tv.send_remote_key(RemoteButton::Select.code()).await.unwrap();
        tv.send_remote_key(RemoteButton::Back.code()).await.unwrap();
        assert_eq!(client.key_presses(), vec!["select", "backup"]);

        let err = tv.send_remote_key(RemoteButton::Exit.code()).await.unwrap_err();
        assert!(matches!(err, TvError::UnsupportedKey { code: 10, .. }));
        assert_eq!(client.key_presses().len(), 2);
        tv.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_active_input_switches_channel() {
        let client = MockDeviceClient::new();
        let store = KeyValueStore::in_memory();
        let tv = connected(&client, &store).await;

        tv.set_active_identifier(2).await.unwrap();
        tv.set_active_identifier(0).await.unwrap();
        assert_eq!(
            client.commands(),
            vec![
                MockCall::SetChannel("xsi://66".to_string()),
                MockCall::PressKey("home".to_string()),
            ]
        );

        let err = tv.set_active_identifier(7).await.unwrap_err();
        assert_eq!(err.hap_status(), HapStatus::ResourceDoesNotExist);
        tv.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_state_changes_become_updates() {
        let client = MockDeviceClient::new();
        let store = KeyValueStore::in_memory();
        let tv = connected(&client, &store).await;
        let mut updates = tv.subscribe();

        assert!(client.handle().push_state(StateSnapshot {
            channel_id: Some(102),
            standby: false,
        }));

        let active = next_update(&mut updates, Characteristic::Active).await;
        assert_eq!(active.value, CharacteristicValue::UInt(1));
        let input = next_update(&mut updates, Characteristic::ActiveIdentifier).await;
        assert_eq!(input.value, CharacteristicValue::UInt(2));
        assert_eq!(tv.active_identifier().await.unwrap(), 2);
        tv.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_refreshes_information() {
        let client = MockDeviceClient::new();
        let store = KeyValueStore::in_memory();
        let tv = TelevisionAccessory::new(lounge(), &context(&client, &store), None).unwrap();
        let mut updates = tv.subscribe();

        tv.session().connect().await.unwrap();
        let model = next_update(&mut updates, Characteristic::Model).await;
        assert_eq!(model.value, CharacteristicValue::Text("ES240".to_string()));
        assert_eq!(tv.information().serial_number, "0629123456");
        tv.shutdown();

        // A later start uses the cached identity straight away
        let restarted = TelevisionAccessory::new(lounge(), &context(&client, &store), None).unwrap();
        assert_eq!(restarted.information().model, "ES240");
        restarted.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_visibility_write_reports_current_state() {
        let client = MockDeviceClient::new();
        let store = KeyValueStore::in_memory();
        let tv = connected(&client, &store).await;
        let mut updates = tv.subscribe();

        tv.write(
            Characteristic::TargetVisibilityState,
            &Binding::InputTargetVisibility(1),
            VisibilityState::Hidden.into(),
        )
        .await
        .unwrap();

        let update = next_update(&mut updates, Characteristic::CurrentVisibilityState).await;
        assert_eq!(update.subtype.as_deref(), Some("Channel.101"));
        assert_eq!(update.value, CharacteristicValue::UInt(1));
        assert_eq!(tv.input_visibility(1).await.unwrap(), VisibilityState::Hidden);

        let err = tv.set_input_visibility(0, VisibilityState::Hidden).await.unwrap_err();
        assert!(matches!(err, TvError::NotTogglable { .. }));
        tv.shutdown();
    }

    #[tokio::test]
    async fn test_names_persist() {
        let client = MockDeviceClient::new();
        client.fail_next_discoveries(u32::MAX);
        let store = KeyValueStore::in_memory();
        let tv = TelevisionAccessory::new(lounge(), &context(&client, &store), None).unwrap();

        assert_eq!(tv.configured_name().await.unwrap(), "Lounge");
        tv.set_configured_name("Living Room").await.unwrap();
        tv.set_input_name(1, "BBC 1").await.unwrap();
        tv.shutdown();

        let restarted = TelevisionAccessory::new(lounge(), &context(&client, &store), None).unwrap();
        assert_eq!(restarted.configured_name_cached().unwrap(), "Living Room");
        assert_eq!(restarted.input_name(1).await.unwrap(), "BBC 1");
        assert_eq!(restarted.input_name(2).await.unwrap(), "BBC Two");
        restarted.shutdown();
    }

    #[tokio::test]
    async fn test_services_layout() {
        let client = MockDeviceClient::new();
        client.fail_next_discoveries(u32::MAX);
        let store = KeyValueStore::in_memory();
        let tv = TelevisionAccessory::new(lounge(), &context(&client, &store), None).unwrap();
        let services = tv.services();

        assert_eq!(services.len(), 5);
        assert_eq!(services[0].kind, ServiceKind::AccessoryInformation);
        assert_eq!(
            services[1].capability(Characteristic::Manufacturer),
            None,
            "information lives on its own service"
        );
        assert_eq!(services[1].linked, vec!["HDMI.OTHER.Home", "Channel.101", "Channel.102"]);
        assert_eq!(
            services[1].capability(Characteristic::SleepDiscoveryMode).unwrap().binding,
            Binding::Static(CharacteristicValue::UInt(1))
        );

        let home = &services[2];
        assert_eq!(home.subtype.as_deref(), Some("HDMI.OTHER.Home"));
        assert!(home.capability(Characteristic::TargetVisibilityState).is_none());
        let channel = &services[3];
        assert_eq!(
            channel.capability(Characteristic::Identifier).unwrap().binding,
            Binding::Static(CharacteristicValue::UInt(1))
        );
        assert_eq!(
            channel.capability(Characteristic::TargetVisibilityState).unwrap().binding,
            Binding::InputTargetVisibility(1)
        );

        let values = tv.initial_values().unwrap();
        assert!(values.contains(&(Binding::TelevisionName, CharacteristicValue::Text("Lounge".to_string()))));
        tv.shutdown();
    }

    #[tokio::test]
    async fn test_write_rejects_bad_values() {
        let client = MockDeviceClient::new();
        client.fail_next_discoveries(u32::MAX);
        let store = KeyValueStore::in_memory();
        let tv = TelevisionAccessory::new(lounge(), &context(&client, &store), None).unwrap();

        let err = tv
            .write(Characteristic::Active, &Binding::Power, CharacteristicValue::UInt(7))
            .await
            .unwrap_err();
        assert_eq!(err.hap_status(), HapStatus::InvalidValueInRequest);

        let err = tv
            .write(
                Characteristic::Name,
                &Binding::Static(CharacteristicValue::Text("x".to_string())),
                CharacteristicValue::Text("y".to_string()),
            )
            .await
            .unwrap_err();
        assert_eq!(err.hap_status(), HapStatus::ReadOnlyCharacteristic);

        let err = tv.read(Characteristic::RemoteKey, &Binding::RemoteKey).await.unwrap_err();
        assert_eq!(err.hap_status(), HapStatus::WriteOnlyCharacteristic);
        tv.shutdown();
    }
}
