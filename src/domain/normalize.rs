//! Maps legacy and alias status values onto the canonical set the remote
//! accepts. Everything here is pure: same input, same output, no I/O.

use super::entities::{FieldPatch, JobStatusChange, OperationPayload};
use serde_json::Value;

pub const LEAD_STATUSES: [&str; 7] = [
    "new",
    "assigned",
    "accepted",
    "in_progress",
    "completed",
    "cancelled",
    "rejected",
];

pub const JOB_STATUSES: [&str; 6] = [
    "scheduled",
    "en_route",
    "on_site",
    "paused",
    "completed",
    "cancelled",
];

/// Canonical lead status for `raw`; unknown values pass through trimmed.
pub fn canonical_lead_status(raw: &str) -> String {
    let key = fold(raw);
    let canonical = match key.as_str() {
        "pending" | "open" | "unassigned" => "new",
        "dispatched" => "assigned",
        "accept" | "acknowledged" | "confirmed" => "accepted",
        "inprogress" | "started" | "working" | "active" => "in_progress",
        "done" | "complete" | "finished" | "closed" => "completed",
        "canceled" | "cancel" => "cancelled",
        "declined" | "decline" | "refused" => "rejected",
        other => return canonical_or_raw(other, &LEAD_STATUSES, raw),
    };
    canonical.to_string()
}

/// Canonical job status for `raw`; unknown values pass through trimmed.
pub fn canonical_job_status(raw: &str) -> String {
    let key = fold(raw);
    let canonical = match key.as_str() {
        "pending" | "booked" | "new" => "scheduled",
        "enroute" | "on_the_way" | "onway" | "traveling" | "travelling" | "driving" => "en_route",
        "onsite" | "arrived" | "in_progress" | "inprogress" | "working" | "started" => "on_site",
        "hold" | "on_hold" | "onhold" | "suspended" => "paused",
        "done" | "complete" | "finished" => "completed",
        "canceled" | "cancel" => "cancelled",
        other => return canonical_or_raw(other, &JOB_STATUSES, raw),
    };
    canonical.to_string()
}

/// Returns a copy of `payload` with status aliases rewritten.
pub fn normalize_payload(payload: &OperationPayload) -> OperationPayload {
    match payload {
        OperationPayload::UpdateLead(patch) => {
            OperationPayload::UpdateLead(rewrite_status(patch, canonical_lead_status))
        }
        OperationPayload::UpdateJobStatus(change) => {
            OperationPayload::UpdateJobStatus(JobStatusChange {
                status: canonical_job_status(&change.status),
                note: change.note.clone(),
                changed_at: change.changed_at,
            })
        }
        other => other.clone(),
    }
}

fn rewrite_status(patch: &FieldPatch, canonical: fn(&str) -> String) -> FieldPatch {
    let mut patch = patch.clone();
    let rewritten = match patch.get("status") {
        Some(Value::String(status)) => Some(canonical(status)),
        _ => None,
    };
    if let Some(status) = rewritten {
        patch.insert("status", Value::String(status));
    }
    patch
}

fn fold(raw: &str) -> String {
    raw.trim()
        .to_ascii_lowercase()
        .replace(['-', ' '], "_")
}

fn canonical_or_raw(key: &str, canonical_set: &[&str], raw: &str) -> String {
    if canonical_set.contains(&key) {
        key.to_string()
    } else {
        raw.trim().to_string()
    }
}
