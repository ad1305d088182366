//! # Orchestration
//!
//! The persistent, mutable definition a job is started from: task list,
//! notification recipients and schedule.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

use super::job::JobId;
use super::task::OrchestrationTask;

pub type OrchestrationId = Uuid;

/// Which job outcomes a recipient wants to hear about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationChannel {
    Error,
    Warning,
    Processing,
}

impl fmt::Display for NotificationChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Processing => write!(f, "processing"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub email: String,
    pub channel: NotificationChannel,
    #[serde(default = "empty_parameters")]
    pub parameters: Value,
}

fn empty_parameters() -> Value {
    Value::Object(Map::new())
}

impl Notification {
    pub fn new(email: impl Into<String>, channel: NotificationChannel) -> Self {
        Self {
            email: email.into(),
            channel,
            parameters: empty_parameters(),
        }
    }
}

/// Orchestration resource as exposed to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Orchestration {
    pub id: OrchestrationId,
    pub name: String,
    pub active: bool,
    pub crontab_record: Option<String>,
    pub next_scheduled_time: Option<DateTime<Utc>>,
    pub tasks: Vec<OrchestrationTask>,
    pub notifications: Vec<Notification>,
    pub token_id: Option<String>,
    /// Most recently created job; a read-only pointer, not ownership
    pub last_executed_job: Option<JobId>,
    pub created_at: DateTime<Utc>,
    /// Bumped on every mutation of the definition
    pub version: u64,
}

/// Options accepted when creating an orchestration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrchestrationOptions {
    #[serde(default)]
    pub active: Option<bool>,
    #[serde(default)]
    pub crontab_record: Option<String>,
    #[serde(default)]
    pub tasks: Vec<OrchestrationTask>,
    #[serde(default)]
    pub notifications: Vec<Notification>,
    #[serde(default)]
    pub token_id: Option<String>,
}

/// Partial update; `None` leaves a field unchanged
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOrchestrationOptions {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub active: Option<bool>,
    #[serde(default)]
    pub crontab_record: Option<String>,
    #[serde(default)]
    pub tasks: Option<Vec<OrchestrationTask>>,
    #[serde(default)]
    pub notifications: Option<Vec<Notification>>,
}

impl UpdateOrchestrationOptions {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.active.is_none()
            && self.crontab_record.is_none()
            && self.tasks.is_none()
            && self.notifications.is_none()
    }
}
