use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// Lifecycle label as reported by the fleet manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VMStatus {
    Creating,
    Propagating,
    Running,
    Paused,
    Stopped,
    Deleting,
    Failed,
}

impl VMStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VMStatus::Creating => "creating",
            VMStatus::Propagating => "propagating",
            VMStatus::Running => "running",
            VMStatus::Paused => "paused",
            VMStatus::Stopped => "stopped",
            VMStatus::Deleting => "deleting",
            VMStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for VMStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStatus(pub String);

impl fmt::Display for UnknownStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown VM state: {}", self.0)
    }
}

impl std::error::Error for UnknownStatus {}

impl FromStr for VMStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "creating" => Ok(VMStatus::Creating),
            "propagating" => Ok(VMStatus::Propagating),
            "running" => Ok(VMStatus::Running),
            "paused" => Ok(VMStatus::Paused),
            "stopped" => Ok(VMStatus::Stopped),
            "deleting" => Ok(VMStatus::Deleting),
            "failed" => Ok(VMStatus::Failed),
            _ => Err(UnknownStatus(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VMResources {
    pub memory_mb: u64,
    pub cpu_count: u32,
}

/// Typed instance record as read from the fleet manager's instance store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceRecord {
    pub id: String,
    pub node: String,
    #[serde(default)]
    pub group_id: Option<String>,
    pub caller_identity: String,
    pub state: VMStatus,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    pub resources: VMResources,
}

/// Flat administrative view of one VM, every field already rendered as text
/// for reporting tools. Field order is part of the contract.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VMSnapshot {
    id: String,
    node: String,
    group_id: Option<String>,
    caller_identity: String,
    state: String,
    start_time: String,
    end_time: Option<String>,
    memory: String,
    cpu_count: String,
}

impl VMSnapshot {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: String,
        node: String,
        group_id: Option<String>,
        caller_identity: String,
        state: String,
        start_time: String,
        end_time: Option<String>,
        memory: String,
        cpu_count: String,
    ) -> Self {
        Self {
            id,
            node,
            group_id,
            caller_identity,
            state,
            start_time,
            end_time,
            memory,
            cpu_count,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }
    pub fn node(&self) -> &str {
        &self.node
    }
    pub fn group_id(&self) -> Option<&str> {
        self.group_id.as_deref()
    }
    pub fn caller_identity(&self) -> &str {
        &self.caller_identity
    }
    pub fn state(&self) -> &str {
        &self.state
    }
    pub fn start_time(&self) -> &str {
        &self.start_time
    }
    pub fn end_time(&self) -> Option<&str> {
        self.end_time.as_deref()
    }
    pub fn memory(&self) -> &str {
        &self.memory
    }
    pub fn cpu_count(&self) -> &str {
        &self.cpu_count
    }
}

fn format_timestamp(instant: &DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Secs, true)
}

impl From<&InstanceRecord> for VMSnapshot {
    fn from(record: &InstanceRecord) -> Self {
        VMSnapshot::new(
            record.id.clone(),
            record.node.clone(),
            record.group_id.clone(),
            record.caller_identity.clone(),
            record.state.to_string(),
            format_timestamp(&record.start_time),
            record.end_time.as_ref().map(format_timestamp),
            record.resources.memory_mb.to_string(),
            record.resources.cpu_count.to_string(),
        )
    }
}
