//! Session behaviour against a scripted client and an on-disk store.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use persist_store::KeyValueStore;
use sky_device::{
    ClientError, ConnectionState, DeviceClient, DeviceHandle, DeviceIdentity, DeviceSession,
    SessionConfig, SessionError, StateStream,
};

const KEY: &str = "sky-tv.TV.Kitchen.json";

/// Client whose box answers after a number of refused discoveries
#[derive(Default)]
struct ScriptedClient {
    refusals: AtomicU32,
    presses: Mutex<Vec<(String, String)>>,
}

struct ScriptedBox {
    on: AtomicBool,
}

#[async_trait]
impl DeviceClient for ScriptedClient {
    async fn discover(&self, address: &str) -> Result<Arc<dyn DeviceHandle>, ClientError> {
        let remaining = self.refusals.load(Ordering::SeqCst);
        if remaining > 0 {
            self.refusals.store(remaining - 1, Ordering::SeqCst);
            return Err(ClientError::Unreachable(address.to_string()));
        }
        Ok(Arc::new(ScriptedBox {
            on: AtomicBool::new(true),
        }))
    }

    async fn press_key(&self, address: &str, key: &str) -> Result<(), ClientError> {
        self.presses
            .lock()
            .push((address.to_string(), key.to_string()));
        Ok(())
    }
}

#[async_trait]
impl DeviceHandle for ScriptedBox {
    fn identity(&self) -> DeviceIdentity {
        DeviceIdentity {
            model: "ES140".to_string(),
            serial: "0630000001".to_string(),
            software: "R010.070.20.00P".to_string(),
        }
    }

    async fn check_power(&self) -> Result<bool, ClientError> {
        Ok(self.on.load(Ordering::SeqCst))
    }

    async fn set_channel(&self, _uri: &str) -> Result<(), ClientError> {
        Ok(())
    }

    fn state_changes(&self) -> StateStream {
        futures::stream::pending().boxed()
    }
}

fn fast_retry() -> SessionConfig {
    SessionConfig {
        retry_interval: Duration::from_millis(20),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_identity_written_to_disk_after_retry() {
    let dir = tempfile::tempdir().unwrap();
    let store = KeyValueStore::json_files(dir.path());
    let client = Arc::new(ScriptedClient {
        refusals: AtomicU32::new(2),
        ..Default::default()
    });
    let session = DeviceSession::new("Kitchen", "10.0.0.7", client, store.device(KEY), fast_retry());

    session.connect().await.unwrap();
    assert_eq!(session.state(), ConnectionState::Connected);
    assert!(session.power_state().await.unwrap());

    let contents = std::fs::read_to_string(dir.path().join(KEY)).unwrap();
    let document: serde_json::Value = serde_json::from_str(&contents).unwrap();
    let info = &document["CachedAccessoryInformation"];
    assert_eq!(info["manufacturer"], "Sky");
    assert_eq!(info["model"], "ES140");
    assert_eq!(info["firmware_revision"], "R010.070.20.00P");
    session.shutdown();
}

#[tokio::test]
async fn test_keys_go_by_address_without_connection() {
    let store = KeyValueStore::in_memory();
    let client = Arc::new(ScriptedClient {
        refusals: AtomicU32::new(u32::MAX),
        ..Default::default()
    });
    let session = DeviceSession::new(
        "Kitchen",
        "10.0.0.7",
        Arc::clone(&client) as Arc<dyn DeviceClient>,
        store.device(KEY),
        fast_retry(),
    );

    session.press_key("select").await.unwrap();
    assert_eq!(
        *client.presses.lock(),
        vec![("10.0.0.7".to_string(), "select".to_string())]
    );
    assert!(matches!(
        session.power_state().await,
        Err(SessionError::ServiceUnavailable { .. })
    ));
    assert!(matches!(
        session.set_channel(101).await,
        Err(SessionError::ServiceUnavailable { .. })
    ));
}
