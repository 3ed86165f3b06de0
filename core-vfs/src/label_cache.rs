//! # Volume Label Cache
//!
//! Display names for volumes and drives ("Backup (NAS)", "USB Stick") can be
//! slow to compute because they may require probing the device. This cache
//! remembers them per locator. It is owned by whoever shows the labels and is
//! cleared whenever the host publishes a configuration change, since labels
//! depend on user preferences.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use core_runtime::events::{CoreEvent, EventBus, RecvError};

use crate::locator::ResourceLocator;

#[derive(Debug, Default)]
pub struct VolumeLabelCache {
    labels: RwLock<HashMap<ResourceLocator, String>>,
}

impl VolumeLabelCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, locator: &ResourceLocator) -> Option<String> {
        self.labels.read().get(locator).cloned()
    }

    pub fn insert(&self, locator: ResourceLocator, label: impl Into<String>) {
        self.labels.write().insert(locator, label.into());
    }

    /// Returns the cached label or computes, stores and returns it.
    pub fn get_or_insert_with<F>(&self, locator: &ResourceLocator, compute: F) -> String
    where
        F: FnOnce() -> String,
    {
        if let Some(label) = self.get(locator) {
            return label;
        }
        let label = compute();
        self.labels
            .write()
            .entry(locator.clone())
            .or_insert(label)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.labels.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.read().is_empty()
    }

    pub fn invalidate_all(&self) {
        self.labels.write().clear();
    }

    /// Clears the cache on every `CoreEvent::Config` published on `bus`.
    ///
    /// The task ends when the bus is dropped.
    pub fn listen_for_config_changes(self: &Arc<Self>, bus: &EventBus) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        let mut receiver = bus.subscribe();

        tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(CoreEvent::Config(change)) => {
                        debug!(?change, "Configuration changed, clearing volume labels");
                        cache.invalidate_all();
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(missed)) => {
                        // A config event may be among the missed ones.
                        warn!(missed, "Volume label listener lagged");
                        cache.invalidate_all();
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_runtime::events::ConfigEvent;
    use std::time::Duration;

    fn drive() -> ResourceLocator {
        ResourceLocator::parse("/media/usb").unwrap()
    }

    #[test]
    fn test_get_or_insert_with_computes_once() {
        let cache = VolumeLabelCache::new();
        let mut calls = 0;
        let first = cache.get_or_insert_with(&drive(), || {
            calls += 1;
            "USB Stick".to_string()
        });
        let second = cache.get_or_insert_with(&drive(), || {
            calls += 1;
            "Other".to_string()
        });

        assert_eq!(first, "USB Stick");
        assert_eq!(second, "USB Stick");
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_config_change_clears_cache() {
        let bus = EventBus::new(16);
        let cache = Arc::new(VolumeLabelCache::new());
        let listener = cache.listen_for_config_changes(&bus);

        cache.insert(drive(), "USB Stick");
        assert_eq!(cache.len(), 1);

        bus.emit(CoreEvent::Config(ConfigEvent::Changed {
            key: "volume_labels".to_string(),
        }))
        .unwrap();

        tokio::time::timeout(Duration::from_secs(1), async {
            while !cache.is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("cache cleared");

        drop(bus);
        listener.await.unwrap();
    }
}
