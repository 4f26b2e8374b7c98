use hive_hub::{HiveHub, HubConfig, NewMessage, NewNotification, Principal};
use hive_memory_store::{InMemoryMessageStore, StaticAccessControl};
use std::sync::Arc;

const ACCESS_CONFIG: &str = "../utils/hive-memory-store/static-configs/testdata.json";

#[allow(dead_code)]
pub(crate) fn init_logging() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

pub(crate) fn make_hub() -> HiveHub {
    let access =
        StaticAccessControl::from_file(ACCESS_CONFIG).expect("access config should load");
    HiveHub::new(
        Arc::new(InMemoryMessageStore::new()),
        Arc::new(access),
        HubConfig::default(),
    )
    .expect("hub creation should succeed")
}

#[allow(dead_code)]
pub(crate) fn principal(name: &str) -> Principal {
    Principal::new(name)
}

#[allow(dead_code)]
pub(crate) fn notification(device_id: &str, name: &str) -> NewMessage {
    NewMessage::Notification(NewNotification {
        device_id: device_id.to_string(),
        notification: name.to_string(),
        parameters: None,
    })
}
