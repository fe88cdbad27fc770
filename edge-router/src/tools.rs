use std::sync::Arc;

use chrono::Local;
use serde_json::{json, Value};
use tracing::{info, warn};

use common::llm::ToolSpec;

use crate::integrator::Integrator;

/// Device toolbox exposed to the model during device-control turns.
///
/// Every handler returns a string for the follow-up tool message; failures
/// (unknown tool, malformed arguments, integrator errors) become standardized
/// error strings the model can react to, never panics or propagated errors.
pub struct ToolRegistry {
    integrator: Arc<dyn Integrator>,
}

impl ToolRegistry {
    pub fn new(integrator: Arc<dyn Integrator>) -> Self {
        Self { integrator }
    }

    pub fn tool_specs(&self) -> Vec<ToolSpec> {
        vec![
            ToolSpec {
                name: "control_device".to_string(),
                description: "Turn a smart device on or off immediately. Use this for direct, \
                              real-time control when the user asks to perform an action now."
                    .to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "device_id": {
                            "type": "string",
                            "description": "The unique identifier (ID) of the device to control. If the user provides a name (e.g., 'living room light'), use the 'get_devices' tool first to find the specific ID for that named device."
                        },
                        "action": {
                            "type": "string",
                            "description": "The action to perform on the device. Must be either 'on' or 'off'."
                        }
                    },
                    "required": ["device_id", "action"]
                }),
            },
            ToolSpec {
                name: "get_devices".to_string(),
                description: "Retrieve a list of all available smart devices at the user's \
                              location. Use this when the user asks to see their devices or wants \
                              to know what devices are available."
                    .to_string(),
                parameters: json!({ "type": "object", "properties": {} }),
            },
            ToolSpec {
                name: "get_current_server_time".to_string(),
                description: "Retrieves the current date and time from the server. Use this tool \
                              when a user's scheduling request involves relative time expressions \
                              (e.g., 'tomorrow', 'in 2 hours', 'next Monday') to get an accurate \
                              anchor point for calculating the target schedule."
                    .to_string(),
                parameters: json!({ "type": "object", "properties": {} }),
            },
            ToolSpec {
                name: "get_car_current_charge".to_string(),
                description: "Return the current battery charge for the electric car.".to_string(),
                parameters: json!({ "type": "object", "properties": {} }),
            },
            ToolSpec {
                name: "get_current_schedules".to_string(),
                description: "Return upcoming charging schedules for the car.".to_string(),
                parameters: json!({ "type": "object", "properties": {} }),
            },
            ToolSpec {
                name: "get_weather_forecast".to_string(),
                description: "Return a 24-hour weather forecast (stub).".to_string(),
                parameters: json!({ "type": "object", "properties": {} }),
            },
        ]
    }

    /// Executes one tool call by name with raw JSON arguments.
    pub async fn execute(
        &self,
        name: &str,
        raw_args: &str,
        token: &str,
        location_id: &str,
    ) -> String {
        let args: Value = if raw_args.trim().is_empty() {
            json!({})
        } else {
            match serde_json::from_str(raw_args) {
                Ok(value) => value,
                Err(err) => {
                    warn!(tool = name, error = %err, "Malformed tool arguments");
                    return format!("Error: invalid JSON arguments for tool '{name}': {err}");
                }
            }
        };

        match name {
            "control_device" => self.control_device(&args, token, location_id).await,
            "get_devices" => self.get_devices(token, location_id).await,
            "get_current_server_time" => {
                Local::now().format("%Y-%m-%dT%H:%M:%S").to_string()
            }
            "get_car_current_charge" => "12 Kilowatt hours".to_string(),
            "get_current_schedules" => {
                "Your car is scheduled to charge tomorrow from 6 AM to 12 AM".to_string()
            }
            "get_weather_forecast" => {
                "Weather forecast for next 24 h: sunny with a chance of rain (stub value)."
                    .to_string()
            }
            other => {
                warn!(tool = other, "Unknown tool requested");
                format!("Error: unknown tool '{other}'")
            }
        }
    }

    async fn control_device(&self, args: &Value, token: &str, location_id: &str) -> String {
        let device_id = args.get("device_id").and_then(Value::as_str).unwrap_or_default();
        let action = args.get("action").and_then(Value::as_str).unwrap_or_default();
        if device_id.is_empty() || action.is_empty() {
            return "Error: control_device requires 'device_id' and 'action' arguments".to_string();
        }

        info!(device_id, action, location_id, "Executing control_device");
        match self.integrator.control_device(token, device_id, action).await {
            Ok(result) if result.get("ok").and_then(Value::as_bool) == Some(true) => {
                json!({ "status": "success", "device": result.get("device") }).to_string()
            }
            Ok(result) => json!({ "status": "error", "detail": result }).to_string(),
            Err(err) => format!("Error: {err}"),
        }
    }

    async fn get_devices(&self, token: &str, location_id: &str) -> String {
        info!(location_id, "Executing get_devices");
        match self.integrator.get_devices(token, location_id).await {
            Ok(devices) => Value::Array(devices).to_string(),
            Err(err) => format!("Error: {err}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrator::MockIntegratorClient;

    fn registry() -> ToolRegistry {
        ToolRegistry::new(Arc::new(MockIntegratorClient::new()))
    }

    #[test]
    fn advertises_full_toolbox() {
        let specs = registry().tool_specs();
        let names: Vec<&str> = specs.iter().map(|spec| spec.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "control_device",
                "get_devices",
                "get_current_server_time",
                "get_car_current_charge",
                "get_current_schedules",
                "get_weather_forecast"
            ]
        );
    }

    #[tokio::test]
    async fn executes_device_control() {
        let result = registry()
            .execute(
                "control_device",
                r#"{"device_id": "dev-1", "action": "on"}"#,
                "token",
                "loc-1",
            )
            .await;
        let value: Value = serde_json::from_str(&result).expect("json result");
        assert_eq!(value["status"], "success");
        assert_eq!(value["device"]["state"], "on");
    }

    #[tokio::test]
    async fn device_errors_become_tool_messages() {
        let result = registry()
            .execute(
                "control_device",
                r#"{"device_id": "dev-9", "action": "on"}"#,
                "token",
                "loc-1",
            )
            .await;
        let value: Value = serde_json::from_str(&result).expect("json result");
        assert_eq!(value["status"], "error");
    }

    #[tokio::test]
    async fn malformed_arguments_are_reported() {
        let result = registry()
            .execute("control_device", "{not json", "token", "loc-1")
            .await;
        assert!(result.starts_with("Error: invalid JSON arguments"));
    }

    #[tokio::test]
    async fn unknown_tool_is_reported() {
        let result = registry().execute("warp_drive", "{}", "token", "loc-1").await;
        assert_eq!(result, "Error: unknown tool 'warp_drive'");
    }

    #[tokio::test]
    async fn stub_tools_answer() {
        let registry = registry();
        assert_eq!(
            registry.execute("get_car_current_charge", "{}", "t", "l").await,
            "12 Kilowatt hours"
        );
        let devices = registry.execute("get_devices", "{}", "t", "l").await;
        let value: Value = serde_json::from_str(&devices).expect("device list");
        assert_eq!(value.as_array().expect("list").len(), 2);
    }
}
