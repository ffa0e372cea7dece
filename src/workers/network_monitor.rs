use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::constants::{CELLULAR_ESTIMATED_SPEED_BPS, WIFI_ESTIMATED_SPEED_BPS};
use crate::models::NetworkCondition;

/// Interface carrying the current network path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterfaceKind {
    Wifi,
    Cellular,
    Other,
    /// No usable path
    Offline,
}

/// Raw observation from the OS path observer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathUpdate {
    pub satisfied: bool,
    pub interface: InterfaceKind,
}

impl PathUpdate {
    pub fn from_interface(interface: InterfaceKind) -> Self {
        Self {
            satisfied: interface != InterfaceKind::Offline,
            interface,
        }
    }

    pub fn classify(&self) -> NetworkCondition {
        if !self.satisfied {
            return NetworkCondition::None;
        }
        match self.interface {
            InterfaceKind::Wifi => NetworkCondition::Wifi {
                speed_bps: WIFI_ESTIMATED_SPEED_BPS,
            },
            InterfaceKind::Cellular => NetworkCondition::Cellular {
                speed_bps: CELLULAR_ESTIMATED_SPEED_BPS,
            },
            InterfaceKind::Other => NetworkCondition::Poor,
            InterfaceKind::Offline => NetworkCondition::None,
        }
    }
}

type ConditionHandler = Arc<dyn Fn(NetworkCondition) + Send + Sync>;

/// Tracks the classified network condition and notifies subscribers when it
/// changes value.
pub struct NetworkMonitor {
    condition: RwLock<NetworkCondition>,
    subscribers: Mutex<Vec<ConditionHandler>>,
}

impl Default for NetworkMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkMonitor {
    pub fn new() -> Self {
        Self::with_condition(NetworkCondition::None)
    }

    pub fn with_condition(condition: NetworkCondition) -> Self {
        Self {
            condition: RwLock::new(condition),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub fn current_condition(&self) -> NetworkCondition {
        *self
            .condition
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn subscribe<F>(&self, handler: F)
    where
        F: Fn(NetworkCondition) + Send + Sync + 'static,
    {
        self.lock_subscribers().push(Arc::new(handler));
    }

    pub fn clear_subscribers(&self) {
        self.lock_subscribers().clear();
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock_subscribers().len()
    }

    /// Classify a raw path update. Returns `true` and notifies subscribers
    /// only if the condition changed.
    pub fn handle_path_update(&self, update: PathUpdate) -> bool {
        self.set_condition(update.classify())
    }

    pub fn set_condition(&self, condition: NetworkCondition) -> bool {
        {
            let mut current = self
                .condition
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if *current == condition {
                debug!("Network path update without condition change ({})", condition);
                return false;
            }
            info!("Network condition changed: {} -> {}", *current, condition);
            *current = condition;
        }

        // Handlers run outside both locks so they may call back into the monitor
        let handlers: Vec<ConditionHandler> = self.lock_subscribers().clone();
        for handler in handlers {
            handler(condition);
        }
        true
    }

    /// Consume path updates until the sender side is dropped
    pub async fn run(self: Arc<Self>, mut updates: mpsc::UnboundedReceiver<PathUpdate>) {
        info!("Network monitor started");
        while let Some(update) = updates.recv().await {
            self.handle_path_update(update);
        }
        info!("Network monitor stopped");
    }

    fn lock_subscribers(&self) -> std::sync::MutexGuard<'_, Vec<ConditionHandler>> {
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
