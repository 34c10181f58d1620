use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Every field a contact card can yield.
///
/// Declaration order is the stable column order used by result sinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    FullName,
    PersonalEmail,
    WorkPhone,
    SipAddress,
    PostalAddress,
    Department,
    Company,
    OfficeLocation,
}

impl FieldKind {
    pub const ALL: [FieldKind; 8] = [
        FieldKind::FullName,
        FieldKind::PersonalEmail,
        FieldKind::WorkPhone,
        FieldKind::SipAddress,
        FieldKind::PostalAddress,
        FieldKind::Department,
        FieldKind::Company,
        FieldKind::OfficeLocation,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FieldKind::FullName => "full_name",
            FieldKind::PersonalEmail => "personal_email",
            FieldKind::WorkPhone => "work_phone",
            FieldKind::SipAddress => "sip_address",
            FieldKind::PostalAddress => "postal_address",
            FieldKind::Department => "department",
            FieldKind::Company => "company",
            FieldKind::OfficeLocation => "office_location",
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which extraction strategy supplied a field's final value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Structured,
    Pattern,
    Absent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactStatus {
    Success,
    NotFound,
    Error,
}

impl ContactStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ContactStatus::Success => "success",
            ContactStatus::NotFound => "not_found",
            ContactStatus::Error => "error",
        }
    }
}

impl fmt::Display for ContactStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ephemeral capture of one open contact card.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawPopupCapture {
    pub full_text: String,
    pub structured_values: BTreeMap<FieldKind, String>,
}

impl RawPopupCapture {
    pub fn from_text(full_text: impl Into<String>) -> Self {
        Self {
            full_text: full_text.into(),
            structured_values: BTreeMap::new(),
        }
    }

    pub fn with_structured(mut self, kind: FieldKind, value: impl Into<String>) -> Self {
        self.structured_values.insert(kind, value.into());
        self
    }
}

/// Consolidated field values plus the provenance of each one.
///
/// `provenance` always holds an entry for every [`FieldKind`]; `values` only
/// holds the kinds that resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedFields {
    pub values: BTreeMap<FieldKind, String>,
    pub provenance: BTreeMap<FieldKind, Provenance>,
}

impl Default for ExtractedFields {
    fn default() -> Self {
        Self {
            values: BTreeMap::new(),
            provenance: FieldKind::ALL
                .iter()
                .map(|k| (*k, Provenance::Absent))
                .collect(),
        }
    }
}

impl ExtractedFields {
    pub fn get(&self, kind: FieldKind) -> Option<&str> {
        self.values.get(&kind).map(String::as_str)
    }

    pub fn provenance_of(&self, kind: FieldKind) -> Provenance {
        self.provenance
            .get(&kind)
            .copied()
            .unwrap_or(Provenance::Absent)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub(crate) fn set(&mut self, kind: FieldKind, value: String, provenance: Provenance) {
        self.values.insert(kind, value);
        self.provenance.insert(kind, provenance);
    }
}

/// One terminal record per processed address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactRecord {
    identifier: String,
    pub status: ContactStatus,
    pub fields: ExtractedFields,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
    pub extracted_at: DateTime<Utc>,
}

impl ContactRecord {
    pub fn success(identifier: impl Into<String>, fields: ExtractedFields) -> Self {
        Self {
            identifier: identifier.into(),
            status: ContactStatus::Success,
            fields,
            error_detail: None,
            extracted_at: Utc::now(),
        }
    }

    pub fn not_found(identifier: impl Into<String>, fields: ExtractedFields) -> Self {
        Self {
            identifier: identifier.into(),
            status: ContactStatus::NotFound,
            fields,
            error_detail: None,
            extracted_at: Utc::now(),
        }
    }

    /// `partial` keeps whatever was captured before the failure.
    pub fn error(
        identifier: impl Into<String>,
        detail: impl Into<String>,
        partial: ExtractedFields,
    ) -> Self {
        let detail = detail.into();
        Self {
            identifier: identifier.into(),
            status: ContactStatus::Error,
            fields: partial,
            error_detail: Some(if detail.trim().is_empty() {
                "unknown interaction fault".to_string()
            } else {
                detail
            }),
            extracted_at: Utc::now(),
        }
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn field(&self, kind: FieldKind) -> Option<&str> {
        self.fields.get(kind)
    }
}

/// Per-status tallies. Only ever incremented during a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchCounts {
    pub success: usize,
    pub not_found: usize,
    pub error: usize,
}

impl BatchCounts {
    pub fn record(&mut self, status: ContactStatus) {
        match status {
            ContactStatus::Success => self.success += 1,
            ContactStatus::NotFound => self.not_found += 1,
            ContactStatus::Error => self.error += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.success + self.not_found + self.error
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlState {
    Running,
    Paused,
    Stopping,
    Stopped,
}

/// Read-only view of a running batch, published to observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSnapshot {
    pub processed: usize,
    pub total: usize,
    pub counts: BatchCounts,
    pub control_state: ControlState,
}

/// Final report of a run.
///
/// `processed + not_started == total` always holds; `not_started` is non-zero
/// only when the run was stopped before reaching the end of its queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub run_id: uuid::Uuid,
    pub total: usize,
    pub processed: usize,
    pub not_started: usize,
    pub counts: BatchCounts,
    pub stopped_early: bool,
    pub duration_ms: u64,
}

/// Outbound events for an external observer (CLI, UI).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BatchEvent {
    ItemCompleted {
        record: ContactRecord,
    },
    Progress {
        processed: usize,
        total: usize,
        counts: BatchCounts,
    },
    StateChanged {
        state: ControlState,
    },
    Finished {
        summary: BatchSummary,
    },
}
