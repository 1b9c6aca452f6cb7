//! Device management API wrappers
//!
//! One method per endpoint of the device firmware. Each one only supplies a
//! path, a verb and a body; session handling lives in [`Gateway`].

use serde_json::{Value, json};

use crate::error::GatewayError;
use crate::gateway::{ApiRequest, Gateway};

type ApiResult = Result<Value, GatewayError>;

const BYTES_PER_GB: f64 = 1_073_741_824.0;

/// Typed front for the device's `/api/*` endpoints
#[derive(Debug, Clone)]
pub struct DeviceApi {
    gateway: Gateway,
}

impl DeviceApi {
    pub fn new(gateway: Gateway) -> Self {
        Self { gateway }
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    /// Generic GET
    pub async fn get(&self, path: &str) -> ApiResult {
        self.gateway.request(ApiRequest::get(path)).await
    }

    /// Generic POST with a JSON body
    pub async fn post(&self, path: &str, data: &Value) -> ApiResult {
        self.gateway.request(ApiRequest::post(path).json(data)).await
    }

    async fn post_empty(&self, path: &str) -> ApiResult {
        self.gateway.request(ApiRequest::post(path)).await
    }

    async fn delete(&self, path: &str) -> ApiResult {
        self.gateway.request(ApiRequest::delete(path)).await
    }

    // --- System ---

    pub async fn system_info(&self) -> ApiResult {
        self.get("/api/info").await
    }

    pub async fn clear_cache(&self) -> ApiResult {
        self.post_empty("/api/clear_cache").await
    }

    /// `action` is `reboot` or `poweroff`
    pub async fn device_control(&self, action: &str) -> ApiResult {
        self.post("/api/device_control", &json!({ "action": action })).await
    }

    pub async fn serial(&self) -> ApiResult {
        self.get("/api/serial").await
    }

    pub async fn submit_activation_key(&self, key: &str) -> ApiResult {
        self.post("/api/key", &json!({ "key": key })).await
    }

    // --- Network ---

    pub async fn set_airplane_mode(&self, enabled: bool) -> ApiResult {
        self.post("/api/airplane_mode", &json!({ "enabled": enabled })).await
    }

    pub async fn set_network_mode(&self, mode: &str) -> ApiResult {
        self.post("/api/set_network", &json!({ "mode": mode })).await
    }

    pub async fn switch_slot(&self, slot: &str) -> ApiResult {
        self.post("/api/switch", &json!({ "slot": slot })).await
    }

    pub async fn data_status(&self) -> ApiResult {
        self.get("/api/data").await
    }

    pub async fn set_data_status(&self, active: bool) -> ApiResult {
        self.post("/api/data", &json!({ "active": active })).await
    }

    pub async fn roaming_status(&self) -> ApiResult {
        self.get("/api/roaming").await
    }

    pub async fn set_roaming_allowed(&self, allowed: bool) -> ApiResult {
        self.post("/api/roaming", &json!({ "allowed": allowed })).await
    }

    pub async fn bands(&self) -> ApiResult {
        self.get("/api/bands").await
    }

    pub async fn current_band(&self) -> ApiResult {
        self.get("/api/current_band").await
    }

    pub async fn lock_bands(&self, bands: &[String]) -> ApiResult {
        self.post("/api/lock_bands", &json!({ "bands": bands })).await
    }

    pub async fn unlock_bands(&self) -> ApiResult {
        self.post_empty("/api/unlock_bands").await
    }

    pub async fn cells(&self) -> ApiResult {
        self.get("/api/cells").await
    }

    pub async fn lock_cell(&self, technology: &str, arfcn: u32, pci: u32) -> ApiResult {
        self.post(
            "/api/lock_cell",
            &json!({
                "technology": technology,
                "arfcn": arfcn.to_string(),
                "pci": pci.to_string(),
            }),
        )
        .await
    }

    pub async fn unlock_cell(&self) -> ApiResult {
        self.post_empty("/api/unlock_cell").await
    }

    pub async fn apn_list(&self) -> ApiResult {
        self.get("/api/apn").await
    }

    pub async fn set_apn_config(&self, config: &Value) -> ApiResult {
        self.post("/api/apn", config).await
    }

    // --- Traffic ---

    pub async fn traffic_total(&self) -> ApiResult {
        self.get("/api/get/Total").await
    }

    pub async fn traffic_config(&self) -> ApiResult {
        self.get("/api/get/set").await
    }

    pub async fn set_traffic_limit(&self, enabled: bool, limit_gb: f64) -> ApiResult {
        self.get(&traffic_limit_path(enabled, limit_gb)).await
    }

    pub async fn clear_traffic_stats(&self) -> ApiResult {
        self.get("/api/set/total").await
    }

    // --- Schedule & time ---

    pub async fn reboot_config(&self) -> ApiResult {
        self.get("/api/get/first-reboot").await
    }

    pub async fn set_reboot(&self, days: &[u8], hour: u8, minute: u8) -> ApiResult {
        self.get(&reboot_path(days, hour, minute)).await
    }

    pub async fn clear_reboot(&self) -> ApiResult {
        // Path spelling matches the firmware
        self.get("/api/claen/cron").await
    }

    pub async fn system_time(&self) -> ApiResult {
        self.get("/api/get/time").await
    }

    pub async fn sync_system_time(&self) -> ApiResult {
        self.post_empty("/api/set/time").await
    }

    // --- Charging ---

    pub async fn charge_config(&self) -> ApiResult {
        self.get("/api/charge/config").await
    }

    pub async fn set_charge_config(&self, enabled: bool, start: u8, stop: u8) -> ApiResult {
        self.post(
            "/api/charge/config",
            &json!({ "enabled": enabled, "startThreshold": start, "stopThreshold": stop }),
        )
        .await
    }

    pub async fn charge_on(&self) -> ApiResult {
        self.post_empty("/api/charge/on").await
    }

    pub async fn charge_off(&self) -> ApiResult {
        self.post_empty("/api/charge/off").await
    }

    // --- Debug ---

    pub async fn execute_at(&self, command: &str) -> ApiResult {
        self.post("/api/at", &json!({ "command": command })).await
    }

    pub async fn execute_shell(&self, command: &str) -> ApiResult {
        self.post("/api/shell", &json!({ "command": command })).await
    }

    pub async fn usb_mode(&self) -> ApiResult {
        self.get("/api/usb/mode").await
    }

    pub async fn set_usb_mode(&self, mode: &str, permanent: bool) -> ApiResult {
        self.post("/api/usb/mode", &json!({ "mode": mode, "permanent": permanent }))
            .await
    }

    pub async fn usb_advance_switch(&self, mode: &str) -> ApiResult {
        self.post("/api/usb-advance", &json!({ "mode": mode })).await
    }

    // --- Plugins ---

    pub async fn plugins(&self) -> ApiResult {
        self.get("/api/plugins").await
    }

    pub async fn upload_plugin(&self, name: &str, content: &str) -> ApiResult {
        self.post("/api/plugins", &json!({ "name": name, "content": content }))
            .await
    }

    pub async fn delete_plugin(&self, name: &str) -> ApiResult {
        self.delete(&format!("/api/plugins/{}", urlencoding::encode(name)))
            .await
    }

    pub async fn delete_all_plugins(&self) -> ApiResult {
        self.delete("/api/plugins/all").await
    }

    pub async fn plugin_storage(&self, plugin: &str) -> ApiResult {
        self.get(&plugin_storage_path(plugin)).await
    }

    pub async fn set_plugin_storage(&self, plugin: &str, data: &Value) -> ApiResult {
        self.post(&plugin_storage_path(plugin), data).await
    }

    pub async fn delete_plugin_storage(&self, plugin: &str) -> ApiResult {
        self.delete(&plugin_storage_path(plugin)).await
    }

    // --- Scripts ---

    pub async fn scripts(&self) -> ApiResult {
        self.get("/api/scripts").await
    }

    pub async fn upload_script(&self, name: &str, content: &str) -> ApiResult {
        self.post("/api/scripts", &json!({ "name": name, "content": content }))
            .await
    }

    pub async fn update_script(&self, name: &str, content: &str) -> ApiResult {
        let path = format!("/api/scripts/{}", urlencoding::encode(name));
        self.gateway
            .request(ApiRequest::put(path).json(&json!({ "content": content })))
            .await
    }

    pub async fn delete_script(&self, name: &str) -> ApiResult {
        self.delete(&format!("/api/scripts/{}", urlencoding::encode(name)))
            .await
    }
}

fn traffic_limit_path(enabled: bool, limit_gb: f64) -> String {
    let bytes = (limit_gb * BYTES_PER_GB).round() as u64;
    format!("/api/set/total?switch={}&much={}", u8::from(enabled), bytes)
}

fn reboot_path(days: &[u8], hour: u8, minute: u8) -> String {
    let days = days
        .iter()
        .map(u8::to_string)
        .collect::<Vec<_>>()
        .join(",");
    format!(
        "/api/set/reboot?day={}&hour={}&minute={}",
        urlencoding::encode(&days),
        hour,
        minute
    )
}

fn plugin_storage_path(plugin: &str) -> String {
    format!("/api/plugins/storage/{}", urlencoding::encode(plugin))
}
