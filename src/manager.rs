//! High-level synchronization of cloud devices.
//! Keeps an in-memory registry of every device's status and capability
//! schema, refreshes it through [`ApiClient`], and dispatches commands.

use crate::client::ApiClient;
use crate::device::{DeviceRecord, Specification, parse_status_list};
use crate::error::{Result, TuyaError};
use crate::protocol::{Command, StreamType};
use futures_util::stream::{self, Stream, StreamExt};
use log::{debug, error, info, warn};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

/// Receives registry changes. Invoked synchronously after each merge.
pub trait DeviceListener: Send + Sync {
    /// Called after a successful status merge for a device.
    fn update_device(&self, device: &DeviceRecord);

    /// Called once for every device first seen by a cache rebuild.
    fn add_device(&self, _device: &DeviceRecord) {}

    /// Called when a device is removed from the registry.
    fn remove_device(&self, _device_id: &str) {}
}

/// Manages the devices of one user.
///
/// Status is only ever changed by list/poll responses; commands never
/// mutate it locally.
#[derive(Clone)]
pub struct Manager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    api: ApiClient,
    uid: String,
    devices: RwLock<HashMap<String, DeviceRecord>>,
    listeners: RwLock<Vec<Arc<dyn DeviceListener>>>,
    concurrency: usize,
}

impl Manager {
    /// Create a manager that polls devices one at a time.
    pub fn new<U: Into<String>>(api: ApiClient, uid: U) -> Self {
        Self::with_concurrency(api, uid, 1)
    }

    /// Create a manager that polls up to `concurrency` devices at once.
    pub fn with_concurrency<U: Into<String>>(api: ApiClient, uid: U, concurrency: usize) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                api,
                uid: uid.into(),
                devices: RwLock::new(HashMap::new()),
                listeners: RwLock::new(Vec::new()),
                concurrency: concurrency.max(1),
            }),
        }
    }

    pub fn api(&self) -> &ApiClient {
        &self.inner.api
    }

    pub fn uid(&self) -> &str {
        &self.inner.uid
    }

    pub fn add_device_listener(&self, listener: Arc<dyn DeviceListener>) {
        self.inner.listeners.write().push(listener);
    }

    /// Get a snapshot of a device by ID.
    pub fn get(&self, id: &str) -> Option<DeviceRecord> {
        self.inner.devices.read().get(id).cloned()
    }

    pub fn devices(&self) -> Vec<DeviceRecord> {
        self.inner.devices.read().values().cloned().collect()
    }

    pub fn device_ids(&self) -> Vec<String> {
        self.inner.devices.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.devices.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.devices.read().is_empty()
    }

    /// Remove a device from the registry.
    ///
    /// Devices missing from a later device list are not pruned; this is the
    /// only way a record goes away.
    pub fn remove_device(&self, id: &str) -> Option<DeviceRecord> {
        let removed = self.inner.devices.write().remove(id);
        match removed {
            Some(record) => {
                info!("Device {} removed from manager", id);
                for listener in self.listeners() {
                    listener.remove_device(id);
                }
                Some(record)
            }
            None => {
                warn!("Attempted to remove non-existent device {}", id);
                None
            }
        }
    }

    fn listeners(&self) -> Vec<Arc<dyn DeviceListener>> {
        self.inner.listeners.read().clone()
    }
}

// -------------------------------------------------------------------------
// Synchronization
// -------------------------------------------------------------------------
impl Manager {
    /// Fetches the device list, (re)builds every record and merges each
    /// device's capability specification.
    ///
    /// Only a failure to obtain the device list is returned; specification
    /// failures are logged per device and never fail the rebuild.
    pub async fn rebuild_cache(&self) -> Result<()> {
        let response = self.inner.api.get_user_devices(&self.inner.uid).await?;
        let entries = response
            .result
            .as_array()
            .ok_or_else(|| TuyaError::InvalidPayload("device list result is not a list".into()))?;
        debug!("Found {} devices for user {}", entries.len(), self.inner.uid);

        let mut added = Vec::new();
        {
            let mut devices = self.inner.devices.write();
            for entry in entries {
                let mut record = match DeviceRecord::from_api_response(entry) {
                    Ok(record) => record,
                    Err(e) => {
                        warn!("Skipping malformed device entry: {}", e);
                        continue;
                    }
                };
                if record.id.is_empty() {
                    continue;
                }
                match devices.get(&record.id) {
                    Some(previous) => record.inherit_capabilities(previous),
                    None => added.push(record.id.clone()),
                }
                devices.insert(record.id.clone(), record);
            }
        }

        let api = self.inner.api.clone();
        let mut results = std::pin::pin!(fan_out(
            self.device_ids(),
            self.inner.concurrency,
            move |id| {
                let api = api.clone();
                async move { fetch_specification(&api, &id).await }
            }
        ));

        while let Some((id, result)) = results.next().await {
            match result {
                Ok(Some(spec)) => self.apply_specification(&id, spec),
                Ok(None) => {}
                Err(e) => warn!("Error fetching specifications for {}: {}", id, e),
            }
        }

        for id in added {
            if let Some(record) = self.get(&id) {
                info!("Device {} ({}) added to manager", id, record.name);
                for listener in self.listeners() {
                    listener.add_device(&record);
                }
            }
        }

        Ok(())
    }

    /// Fetches and merges the capability specification of one device.
    ///
    /// A server-reported failure means "no specification" and leaves the
    /// existing schema untouched.
    pub async fn merge_specification(&self, device_id: &str) -> Result<()> {
        if self.get(device_id).is_none() {
            return Err(TuyaError::DeviceNotFound(device_id.to_string()));
        }
        if let Some(spec) = fetch_specification(&self.inner.api, device_id).await? {
            self.apply_specification(device_id, spec);
        }
        Ok(())
    }

    fn apply_specification(&self, device_id: &str, spec: Specification) {
        let mut devices = self.inner.devices.write();
        if let Some(record) = devices.get_mut(device_id) {
            debug!(
                "Specification for {}: {} functions, {} status ranges",
                device_id,
                spec.functions.len(),
                spec.status_range.len()
            );
            record.apply_specification(spec);
        }
    }

    /// Polls status for every known device and merges it in place.
    ///
    /// A failing device is logged and skipped, whatever the cause; a lost
    /// session shows up through [`ApiClient::is_closed`] or the next direct
    /// call.
    pub async fn refresh_status(&self) -> Result<()> {
        let api = self.inner.api.clone();
        let mut results = std::pin::pin!(fan_out(
            self.device_ids(),
            self.inner.concurrency,
            move |id| {
                let api = api.clone();
                async move { api.get_device_status(&id).await }
            }
        ));

        while let Some((id, result)) = results.next().await {
            match result {
                Ok(response) => {
                    let items = parse_status_list(&response.result);
                    let updated = {
                        let mut devices = self.inner.devices.write();
                        devices.get_mut(&id).map(|record| {
                            record.merge_status(items);
                            record.clone()
                        })
                    };
                    if let Some(record) = updated {
                        for listener in self.listeners() {
                            listener.update_device(&record);
                        }
                    }
                }
                Err(e) => warn!("Error updating status for {}: {}", id, e),
            }
        }

        Ok(())
    }
}

// -------------------------------------------------------------------------
// Device Control API
// -------------------------------------------------------------------------
impl Manager {
    /// Sends commands to a device and reports whether the server accepted
    /// them. Local status is left as is until the next refresh.
    pub async fn dispatch_commands(&self, device_id: &str, commands: &[Command]) -> Result<bool> {
        match self
            .inner
            .api
            .send_device_commands(device_id, commands)
            .await
        {
            Ok(_) => {
                debug!("Commands sent to {}: {:?}", device_id, commands);
                Ok(true)
            }
            Err(e @ TuyaError::Api { .. }) => {
                error!("Failed to send commands to {}: {}", device_id, e);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Allocates a time-limited live stream URL. Not cached here; callers
    /// keep their own TTL.
    pub async fn allocate_stream_url(
        &self,
        device_id: &str,
        stream_type: StreamType,
    ) -> Result<Option<String>> {
        match self
            .inner
            .api
            .allocate_stream(&self.inner.uid, device_id, stream_type)
            .await
        {
            Ok(response) => Ok(response
                .result
                .get("url")
                .and_then(Value::as_str)
                .map(str::to_string)),
            Err(e @ TuyaError::Api { .. }) => {
                error!("Failed to allocate stream for {}: {}", device_id, e);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

async fn fetch_specification(api: &ApiClient, device_id: &str) -> Result<Option<Specification>> {
    match api.get_device_specifications(device_id).await {
        Ok(response) => Specification::from_result(&response.result).map(Some),
        Err(e @ TuyaError::Api { .. }) => {
            debug!("No specifications for device {}: {}", device_id, e);
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Runs `f` for every id with at most `concurrency` calls in flight.
/// With a limit of 1 the ids are processed in order.
fn fan_out<F, Fut, T>(ids: Vec<String>, concurrency: usize, f: F) -> impl Stream<Item = (String, T)>
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = T>,
{
    stream::iter(ids)
        .map(move |id| {
            let fut = f(id.clone());
            async move { (id, fut.await) }
        })
        .buffer_unordered(concurrency.max(1))
}
