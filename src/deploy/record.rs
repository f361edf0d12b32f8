// ABOUTME: Deployment record data model: target, log entries, and build summary.
// ABOUTME: Serialized with serde; timestamps are chrono instants in UTC.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::types::{DeploymentId, LogEntryId, ProjectId};

use super::status::DeploymentStatus;

/// Kind of infrastructure a target deploys to. Providers are registered per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetType {
    Local,
    Docker,
    Cloud,
    Ssh,
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TargetType::Local => "local",
            TargetType::Docker => "docker",
            TargetType::Cloud => "cloud",
            TargetType::Ssh => "ssh",
        };
        f.write_str(name)
    }
}

/// Where a deployment goes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentTarget {
    pub name: String,
    #[serde(rename = "type")]
    pub target_type: TargetType,
    /// Provider-specific settings, passed through untouched.
    #[serde(default)]
    pub config: BTreeMap<String, serde_json::Value>,
}

impl DeploymentTarget {
    pub fn new(name: impl Into<String>, target_type: TargetType) -> Self {
        Self {
            name: name.into(),
            target_type,
            config: BTreeMap::new(),
        }
    }
}

/// A project that can be built and deployed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    pub path: PathBuf,
    /// Version stamped onto new deployment records.
    pub version: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        };
        f.write_str(name)
    }
}

/// One line of a deployment's log. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: LogEntryId,
    pub level: LogLevel,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl LogEntry {
    pub fn new(level: LogLevel, message: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: LogEntryId::generate(),
            level,
            message: message.into(),
            timestamp,
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// Summary of the build phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildResult {
    pub success: bool,
    #[serde(default)]
    pub artifacts: Vec<String>,
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BuildResult {
    pub fn succeeded(artifacts: Vec<String>, duration: Duration) -> Self {
        Self {
            success: true,
            artifacts,
            duration,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>, duration: Duration) -> Self {
        Self {
            success: false,
            artifacts: Vec::new(),
            duration,
            error: Some(error.into()),
        }
    }
}

/// One deployment attempt and everything known about it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRecord {
    pub id: DeploymentId,
    pub project_id: ProjectId,
    pub target: DeploymentTarget,
    pub version: String,
    pub status: DeploymentStatus,
    #[serde(default)]
    pub logs: Vec<LogEntry>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback_from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_result: Option<BuildResult>,
}

impl DeploymentRecord {
    /// Create a fresh `pending` record for a project and target.
    pub fn new(project: &Project, target: DeploymentTarget) -> Self {
        Self {
            id: DeploymentId::generate(),
            project_id: project.id.clone(),
            target,
            version: project.version.clone(),
            status: DeploymentStatus::Pending,
            logs: Vec::new(),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            rollback_from: None,
            build_result: None,
        }
    }

    /// Timestamp for the next log entry, never earlier than the last one.
    pub fn next_log_timestamp(&self) -> DateTime<Utc> {
        let now = Utc::now();
        match self.logs.last() {
            Some(last) if last.timestamp > now => last.timestamp,
            _ => now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
