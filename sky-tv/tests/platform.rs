//! Platform loading from a host-provided configuration block.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use sky_device::testing::MockDeviceClient;
use sky_tv::{DeviceClient, Host, KeyValueStore, PlatformAccessory, PlatformConfig, SkyTvPlugin};

#[derive(Default)]
struct Bridge {
    external: Mutex<Vec<PlatformAccessory>>,
}

#[async_trait]
impl Host for Bridge {
    async fn publish_external_accessories(
        &self,
        accessories: Vec<PlatformAccessory>,
    ) -> Result<(), String> {
        self.external.lock().extend(accessories);
        Ok(())
    }
}

#[derive(Clone, Default)]
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

impl LogBuffer {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

fn plugin() -> SkyTvPlugin {
    let client = MockDeviceClient::new();
    client.fail_next_discoveries(u32::MAX);
    SkyTvPlugin::with_store(KeyValueStore::in_memory(), client as Arc<dyn DeviceClient>)
}

const CONFIG: &str = r#"{
    "platform": "TVs",
    "tvs": [
        {
            "name": "Lounge",
            "ip_address": "192.168.1.50",
            "tv_channels": { "106": "Sky Sports", "101": "BBC One" }
        },
        {
            "name": "Bedroom",
            "ip_address": "192.168.1.51",
            "manufacturer": "Sky UK",
            "external": true
        }
    ]
}"#;

#[tokio::test]
async fn test_platform_from_config() {
    let config = PlatformConfig::from_json_str(CONFIG).unwrap();
    let host = Arc::new(Bridge::default());
    let plugin = plugin();
    let platform = plugin.platform(config, Arc::clone(&host) as Arc<dyn Host>);

    let bridge = platform.accessories().await;
    assert_eq!(bridge.len(), 1);
    assert_eq!(bridge[0].display_name, "Lounge");

    // Channels keep configuration order
    let lounge = &bridge[0].accessory;
    let channels: Vec<_> = lounge
        .inputs()
        .sources()
        .iter()
        .filter_map(|source| source.channel_number())
        .collect();
    assert_eq!(channels, vec![106, 101]);
    assert_eq!(lounge.inputs().find_by_channel(101).unwrap().identifier, 2);

    let external = host.external.lock();
    assert_eq!(external.len(), 1);
    assert_eq!(external[0].display_name, "Bedroom");
    assert_eq!(external[0].accessory.information().manufacturer, "Sky UK");
    assert_eq!(platform.bridge_television_count(), 1);
}

#[tokio::test]
async fn test_two_local_televisions() {
    let config = PlatformConfig::from_json_str(
        r#"{ "tvs": [
            { "name": "Lounge", "ip_address": "192.168.1.50" },
            { "name": "Bedroom", "ip_address": "192.168.1.51" }
        ] }"#,
    )
    .unwrap();
    let host = Arc::new(Bridge::default());
    let plugin = plugin();
    let platform = plugin.platform(config, Arc::clone(&host) as Arc<dyn Host>);

    let logs = LogBuffer::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_ansi(false)
        .with_max_level(tracing::Level::WARN)
        .with_writer(move || writer.clone())
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    assert_eq!(platform.accessories().await.len(), 2);
    assert_eq!(platform.bridge_television_count(), 2);
    assert!(host.external.lock().is_empty());
    assert_eq!(logs.contents().matches("multiple TV accessories").count(), 1);
}

#[tokio::test]
async fn test_missing_address_publishes_nothing() {
    let config = PlatformConfig::from_json_str(
        r#"{ "tvs": [
            { "name": "Lounge", "ip_address": "192.168.1.50" },
            { "name": "Bedroom", "ip_address": "" }
        ] }"#,
    )
    .unwrap();
    let host = Arc::new(Bridge::default());
    let plugin = plugin();
    let platform = plugin.platform(config, Arc::clone(&host) as Arc<dyn Host>);

    assert!(platform.accessories().await.is_empty());
    assert!(platform.loaded_accessories().is_empty());
}
