use crate::domain::value_objects::{AttachmentId, EntityId, OperationType, PhotoPhase};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field name to new value. Always non-empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldPatch(Map<String, Value>);

impl FieldPatch {
    pub fn new(fields: Map<String, Value>) -> Result<Self, String> {
        if fields.is_empty() {
            return Err("Field patch cannot be empty".to_string());
        }
        Ok(Self(fields))
    }

    pub fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::Object(map) => Self::new(map),
            _ => Err("Field patch must be a JSON object".to_string()),
        }
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatusChange {
    pub status: String,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub changed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentLocation {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub accuracy_m: Option<f64>,
    pub recorded_at: DateTime<Utc>,
}

/// Points at an attachment record; the encoded bytes stay in the local store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhotoReference {
    pub attachment_id: AttachmentId,
    pub owner_id: EntityId,
    pub phase: PhotoPhase,
}

/// Operation-specific data, keyed by operation type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operation_type", content = "data", rename_all = "snake_case")]
pub enum OperationPayload {
    UpdateLead(FieldPatch),
    UpdateJobStatus(JobStatusChange),
    CreateInvoice(FieldPatch),
    UpdateInvoice(FieldPatch),
    UpdateEquipment(FieldPatch),
    UpdateAgentLocation(AgentLocation),
    UploadPhoto(PhotoReference),
    DeletePhoto(PhotoReference),
    UpdateTimerLog(FieldPatch),
}

impl OperationPayload {
    pub fn operation_type(&self) -> OperationType {
        match self {
            OperationPayload::UpdateLead(_) => OperationType::UpdateLead,
            OperationPayload::UpdateJobStatus(_) => OperationType::UpdateJobStatus,
            OperationPayload::CreateInvoice(_) => OperationType::CreateInvoice,
            OperationPayload::UpdateInvoice(_) => OperationType::UpdateInvoice,
            OperationPayload::UpdateEquipment(_) => OperationType::UpdateEquipment,
            OperationPayload::UpdateAgentLocation(_) => OperationType::UpdateAgentLocation,
            OperationPayload::UploadPhoto(_) => OperationType::UploadPhoto,
            OperationPayload::DeletePhoto(_) => OperationType::DeletePhoto,
            OperationPayload::UpdateTimerLog(_) => OperationType::UpdateTimerLog,
        }
    }

    pub fn attachment_id(&self) -> Option<&AttachmentId> {
        match self {
            OperationPayload::UploadPhoto(reference) | OperationPayload::DeletePhoto(reference) => {
                Some(&reference.attachment_id)
            }
            _ => None,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        match self {
            OperationPayload::UpdateJobStatus(change) => {
                if change.status.trim().is_empty() {
                    return Err("Job status cannot be empty".to_string());
                }
                Ok(())
            }
            OperationPayload::UpdateAgentLocation(location) => {
                if !location.latitude.is_finite() || !(-90.0..=90.0).contains(&location.latitude)
                {
                    return Err(format!("Latitude out of range: {}", location.latitude));
                }
                if !location.longitude.is_finite()
                    || !(-180.0..=180.0).contains(&location.longitude)
                {
                    return Err(format!("Longitude out of range: {}", location.longitude));
                }
                if let Some(accuracy) = location.accuracy_m {
                    if !accuracy.is_finite() || accuracy < 0.0 {
                        return Err(format!("Location accuracy must be non-negative: {accuracy}"));
                    }
                }
                Ok(())
            }
            OperationPayload::UpdateLead(patch)
            | OperationPayload::CreateInvoice(patch)
            | OperationPayload::UpdateInvoice(patch)
            | OperationPayload::UpdateEquipment(patch)
            | OperationPayload::UpdateTimerLog(patch) => {
                if patch.fields().is_empty() {
                    return Err("Field patch cannot be empty".to_string());
                }
                Ok(())
            }
            OperationPayload::UploadPhoto(_) | OperationPayload::DeletePhoto(_) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serializes_as_tagged_union() {
        let payload = OperationPayload::UpdateLead(
            FieldPatch::from_value(json!({"status": "accepted"})).unwrap(),
        );
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["operation_type"], "update_lead");
        assert_eq!(value["data"]["status"], "accepted");
    }

    #[test]
    fn field_patch_rejects_non_objects() {
        assert!(FieldPatch::from_value(json!(["status"])).is_err());
        assert!(FieldPatch::from_value(json!({})).is_err());
    }

    #[test]
    fn location_out_of_range_is_invalid() {
        let payload = OperationPayload::UpdateAgentLocation(AgentLocation {
            latitude: 91.0,
            longitude: 10.0,
            accuracy_m: None,
            recorded_at: Utc::now(),
        });
        assert!(payload.validate().is_err());
    }
}
