use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    UpdateLead,
    UpdateJobStatus,
    CreateInvoice,
    UpdateInvoice,
    UpdateEquipment,
    UpdateAgentLocation,
    UploadPhoto,
    DeletePhoto,
    UpdateTimerLog,
}

impl OperationType {
    pub const ALL: [OperationType; 9] = [
        OperationType::UpdateLead,
        OperationType::UpdateJobStatus,
        OperationType::CreateInvoice,
        OperationType::UpdateInvoice,
        OperationType::UpdateEquipment,
        OperationType::UpdateAgentLocation,
        OperationType::UploadPhoto,
        OperationType::DeletePhoto,
        OperationType::UpdateTimerLog,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::UpdateLead => "update_lead",
            OperationType::UpdateJobStatus => "update_job_status",
            OperationType::CreateInvoice => "create_invoice",
            OperationType::UpdateInvoice => "update_invoice",
            OperationType::UpdateEquipment => "update_equipment",
            OperationType::UpdateAgentLocation => "update_agent_location",
            OperationType::UploadPhoto => "upload_photo",
            OperationType::DeletePhoto => "delete_photo",
            OperationType::UpdateTimerLog => "update_timer_log",
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        OperationType::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == value)
            .ok_or_else(|| format!("Unknown operation type: {value}"))
    }
}
