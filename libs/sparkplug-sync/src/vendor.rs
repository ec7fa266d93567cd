//! External (vendor) applications and the devices they announce
//!
//! A vendor app references its devices; the devices themselves live in the
//! engine registry. Lock order: the list lock is released before any app
//! lock is taken, and no app lock is held while a device lock is taken.

use crate::device::Device;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug)]
pub struct VendorApp {
    name: String,
    is_dead: AtomicBool,
    devices: Mutex<BTreeMap<String, Arc<Device>>>,
}

impl VendorApp {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_dead: AtomicBool::new(false),
            devices: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add a device keyed by telemetry name; returns false if already present
    pub fn add_device(&self, device: Arc<Device>) -> bool {
        let mut devices = self.devices.lock();
        if devices.contains_key(device.telemetry_name()) {
            return false;
        }
        devices.insert(device.telemetry_name().to_string(), device);
        true
    }

    /// Snapshot of the app's devices
    pub fn devices(&self) -> Vec<Arc<Device>> {
        self.devices.lock().values().cloned().collect()
    }

    pub fn device_count(&self) -> usize {
        self.devices.lock().len()
    }

    pub fn mark_dead(&self) {
        if !self.is_dead.swap(true, Ordering::AcqRel) {
            info!("Vendor app {} is dead", self.name);
        }
    }

    pub fn mark_alive(&self) {
        if self.is_dead.swap(false, Ordering::AcqRel) {
            info!("Vendor app {} is alive again", self.name);
        }
    }

    pub fn is_dead(&self) -> bool {
        self.is_dead.load(Ordering::Acquire)
    }
}

#[derive(Debug, Default)]
pub struct VendorAppList {
    apps: RwLock<BTreeMap<String, Arc<VendorApp>>>,
}

impl VendorAppList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, app_name: &str) -> Option<Arc<VendorApp>> {
        self.apps.read().get(app_name).cloned()
    }

    fn get_or_create(&self, app_name: &str) -> Arc<VendorApp> {
        if let Some(app) = self.get(app_name) {
            return app;
        }
        let mut apps = self.apps.write();
        apps.entry(app_name.to_string())
            .or_insert_with(|| {
                debug!("New vendor app {}", app_name);
                Arc::new(VendorApp::new(app_name))
            })
            .clone()
    }

    /// Idempotent by `(app, telemetry name)`; creates the app on first sight
    pub fn register_device(&self, app_name: &str, device: Arc<Device>) -> bool {
        let app = self.get_or_create(app_name);
        app.add_device(device)
    }

    pub fn apps(&self) -> Vec<Arc<VendorApp>> {
        self.apps.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.apps.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.apps.read().is_empty()
    }
}
