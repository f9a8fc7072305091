use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Service categories offered by the booking form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceType {
    Repair,
    Diagnostic,
    Software,
    Network,
}

/// Partial booking record exchanged with the booking-form collaborator.
///
/// The remote agent fills this in incrementally over several tool calls;
/// each call carries only the fields it has learned so far and is
/// merge-applied onto the best-known record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_type: Option<ServiceType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue: Option<String>,
}

impl BookingData {
    /// Merge-apply a partial update. Fields present in `patch` replace the
    /// current value; absent fields are kept.
    pub fn merge(&mut self, patch: BookingData) {
        if patch.name.is_some() {
            self.name = patch.name;
        }
        if patch.phone.is_some() {
            self.phone = patch.phone;
        }
        if patch.email.is_some() {
            self.email = patch.email;
        }
        if patch.address.is_some() {
            self.address = patch.address;
        }
        if patch.device_type.is_some() {
            self.device_type = patch.device_type;
        }
        if patch.service_type.is_some() {
            self.service_type = patch.service_type;
        }
        if patch.issue.is_some() {
            self.issue = patch.issue;
        }
    }
}

/// Result record produced by the visual scanner collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResult {
    /// Identity of this scan; a re-render of the same record keeps its id.
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub device_type: String,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
    pub condition: String,
    pub description: String,
}

impl ScanResult {
    /// One-line summary injected into the live conversation as context.
    pub fn summary(&self) -> String {
        let serial = self.serial_number.as_deref().unwrap_or("unknown");
        format!(
            "Visual scan result: {} {} (serial {}), condition: {}. {}",
            self.device_type, self.model, serial, self.condition, self.description
        )
    }
}
