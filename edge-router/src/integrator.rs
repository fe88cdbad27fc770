use std::{collections::BTreeMap, sync::Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use common::error::AppError;

/// Smart-home integrator capability contract.
///
/// `get_devices` returns normalized `{id, name, actions: ["on", "off"]}`
/// items; `control_device` returns `{ok: true, device}` on success and a
/// structured `{ok: false, error}` object instead of raising, which keeps
/// tool handling and model reasoning simple.
#[async_trait]
pub trait Integrator: Send + Sync {
    async fn get_devices(&self, token: &str, location_id: &str) -> Result<Vec<Value>, AppError>;
    async fn control_device(
        &self,
        token: &str,
        device_id: &str,
        action: &str,
    ) -> Result<Value, AppError>;
}

/// Deterministic in-memory integrator for local runs, demos, and tests.
pub struct MockIntegratorClient {
    devices: Mutex<BTreeMap<String, Value>>,
}

impl Default for MockIntegratorClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockIntegratorClient {
    pub fn new() -> Self {
        let mut devices = BTreeMap::new();
        devices.insert(
            "dev-1".to_string(),
            json!({ "id": "dev-1", "name": "Living Room Light", "category": "LIGHT", "state": "off" }),
        );
        devices.insert(
            "dev-2".to_string(),
            json!({ "id": "dev-2", "name": "Heat Pump", "category": "HVAC", "state": "on" }),
        );
        Self {
            devices: Mutex::new(devices),
        }
    }
}

#[async_trait]
impl Integrator for MockIntegratorClient {
    async fn get_devices(&self, _token: &str, _location_id: &str) -> Result<Vec<Value>, AppError> {
        let devices = self
            .devices
            .lock()
            .map_err(|_| AppError::InternalError("integrator state poisoned".into()))?;
        Ok(devices
            .values()
            .map(|device| {
                json!({
                    "id": device["id"],
                    "name": device["name"],
                    "actions": ["on", "off"],
                })
            })
            .collect())
    }

    async fn control_device(
        &self,
        _token: &str,
        device_id: &str,
        action: &str,
    ) -> Result<Value, AppError> {
        let mut devices = self
            .devices
            .lock()
            .map_err(|_| AppError::InternalError("integrator state poisoned".into()))?;

        let Some(device) = devices.get_mut(device_id) else {
            return Ok(json!({ "ok": false, "error": "device_not_found", "device_id": device_id }));
        };

        let normalized = action.trim().to_lowercase();
        if normalized == "on" || normalized == "off" {
            device["state"] = json!(normalized);
            return Ok(json!({ "ok": true, "device": device.clone() }));
        }

        Ok(json!({ "ok": false, "error": "unsupported_action", "action": action }))
    }
}
