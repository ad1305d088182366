//! # Orchestration Task
//!
//! One configured unit of work: which external action to invoke, with which
//! parameters, under which failure policy and in which phase.
//!
//! The wire representation keeps the remote API's shape (`component`/`action`
//! or `componentUrl`, `phase` as int, string or null). Internally the two
//! addressing modes are an [`ActionRef`] and the phase is an optional
//! [`PhaseKey`], so the mutual-exclusion and "no phase" rules are enforced once
//! at construction time.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

pub type TaskId = Uuid;

/// How a task addresses the external action it runs
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ActionRef {
    /// Symbolic component id plus the action to run on it
    Named {
        component: String,
        action: Option<String>,
    },
    /// Direct endpoint override
    Direct { url: String },
}

impl ActionRef {
    pub fn named(component: impl Into<String>, action: impl Into<String>) -> Self {
        Self::Named {
            component: component.into(),
            action: Some(action.into()),
        }
    }

    pub fn direct(url: impl Into<String>) -> Self {
        Self::Direct { url: url.into() }
    }

    pub fn component(&self) -> Option<&str> {
        match self {
            Self::Named { component, .. } => Some(component),
            Self::Direct { .. } => None,
        }
    }

    pub fn action(&self) -> Option<&str> {
        match self {
            Self::Named { action, .. } => action.as_deref(),
            Self::Direct { .. } => None,
        }
    }

    pub fn url(&self) -> Option<&str> {
        match self {
            Self::Named { .. } => None,
            Self::Direct { url } => Some(url),
        }
    }
}

impl fmt::Display for ActionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named {
                component,
                action: Some(action),
            } => write!(f, "{component}:{action}"),
            Self::Named {
                component,
                action: None,
            } => write!(f, "{component}"),
            Self::Direct { url } => write!(f, "{url}"),
        }
    }
}

/// Explicit phase key. Absence of a phase is `None` at the use site, never a
/// sentinel value of this type.
///
/// `"0"` and `0` are real keys. Only `null` and the empty string mean "no
/// phase".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PhaseKey {
    Number(i64),
    Name(String),
}

impl PhaseKey {
    /// Normalise a raw key; the empty string collapses to "no phase"
    pub fn normalize(raw: Option<PhaseKey>) -> Option<PhaseKey> {
        match raw {
            Some(PhaseKey::Name(name)) if name.is_empty() => None,
            other => other,
        }
    }

    /// Canonical text used for grouping: `10` and `"10"` name the same phase
    pub fn canonical(&self) -> String {
        match self {
            Self::Number(n) => n.to_string(),
            Self::Name(name) => name.clone(),
        }
    }
}

impl fmt::Display for PhaseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

impl From<i64> for PhaseKey {
    fn from(value: i64) -> Self {
        Self::Number(value)
    }
}

impl From<i32> for PhaseKey {
    fn from(value: i32) -> Self {
        Self::Number(i64::from(value))
    }
}

impl From<&str> for PhaseKey {
    fn from(value: &str) -> Self {
        Self::Name(value.to_string())
    }
}

impl From<String> for PhaseKey {
    fn from(value: String) -> Self {
        Self::Name(value)
    }
}

/// A configured task. Immutable once it is part of a job snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TaskDocument", into = "TaskDocument")]
pub struct OrchestrationTask {
    pub id: Option<TaskId>,
    pub action: ActionRef,
    pub action_parameters: Value,
    pub continue_on_failure: bool,
    pub active: bool,
    pub timeout_minutes: Option<u32>,
    pub phase: Option<PhaseKey>,
}

impl OrchestrationTask {
    pub fn new(action: ActionRef) -> Self {
        Self {
            id: None,
            action,
            action_parameters: Value::Object(Map::new()),
            continue_on_failure: false,
            active: true,
            timeout_minutes: None,
            phase: None,
        }
    }

    pub fn component(component: impl Into<String>, action: impl Into<String>) -> Self {
        Self::new(ActionRef::named(component, action))
    }

    pub fn component_url(url: impl Into<String>) -> Self {
        Self::new(ActionRef::direct(url))
    }

    pub fn with_id(mut self, id: TaskId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_action_parameters(mut self, parameters: Value) -> Self {
        self.action_parameters = match parameters {
            Value::Null => Value::Object(Map::new()),
            other => other,
        };
        self
    }

    pub fn with_continue_on_failure(mut self, value: bool) -> Self {
        self.continue_on_failure = value;
        self
    }

    pub fn with_active(mut self, value: bool) -> Self {
        self.active = value;
        self
    }

    /// Zero means "no timeout"
    pub fn with_timeout_minutes(mut self, minutes: u32) -> Self {
        self.timeout_minutes = (minutes > 0).then_some(minutes);
        self
    }

    pub fn with_phase(mut self, phase: impl Into<PhaseKey>) -> Self {
        self.phase = PhaseKey::normalize(Some(phase.into()));
        self
    }

    pub fn without_phase(mut self) -> Self {
        self.phase = None;
        self
    }

    /// Two tasks address the same external action
    pub fn same_action(&self, other: &OrchestrationTask) -> bool {
        self.action == other.action
    }
}

/// Wire shape of a task, as accepted from and returned to API clients
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<TaskId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    component: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    component_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    action: Option<String>,
    #[serde(
        default = "empty_parameters",
        deserialize_with = "deserialize_action_parameters"
    )]
    action_parameters: Value,
    #[serde(default)]
    continue_on_failure: bool,
    #[serde(default = "default_active")]
    active: bool,
    #[serde(default)]
    timeout_minutes: Option<u32>,
    #[serde(default)]
    phase: Option<PhaseKey>,
}

fn default_active() -> bool {
    true
}

fn empty_parameters() -> Value {
    Value::Object(Map::new())
}

/// Accepts an object, `null` or an empty list (how loosely-typed clients send an
/// empty parameter set) and always yields an object.
fn deserialize_action_parameters<'de, D>(deserializer: D) -> Result<Value, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Value = Deserialize::deserialize(deserializer)?;

    match value {
        Value::Object(_) => Ok(value),
        Value::Null => Ok(Value::Object(Map::new())),
        Value::Array(items) if items.is_empty() => Ok(Value::Object(Map::new())),
        _ => Err(D::Error::custom(
            "actionParameters must be an object of key/value pairs",
        )),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

impl TryFrom<TaskDocument> for OrchestrationTask {
    type Error = String;

    fn try_from(doc: TaskDocument) -> Result<Self, Self::Error> {
        let action = match (non_empty(doc.component), non_empty(doc.component_url)) {
            (Some(component), None) => ActionRef::Named {
                component,
                action: non_empty(doc.action),
            },
            (None, Some(url)) => ActionRef::Direct { url },
            (Some(_), Some(_)) => {
                return Err("task must set either component or componentUrl, not both".to_string())
            }
            (None, None) => return Err("task must set component or componentUrl".to_string()),
        };

        let action_parameters = match doc.action_parameters {
            Value::Null => empty_parameters(),
            other => other,
        };

        Ok(Self {
            id: doc.id,
            action,
            action_parameters,
            continue_on_failure: doc.continue_on_failure,
            active: doc.active,
            timeout_minutes: doc.timeout_minutes.filter(|m| *m > 0),
            phase: PhaseKey::normalize(doc.phase),
        })
    }
}

impl From<OrchestrationTask> for TaskDocument {
    fn from(task: OrchestrationTask) -> Self {
        let (component, action, component_url) = match task.action {
            ActionRef::Named { component, action } => (Some(component), action, None),
            ActionRef::Direct { url } => (None, None, Some(url)),
        };

        Self {
            id: task.id,
            component,
            component_url,
            action,
            action_parameters: task.action_parameters,
            continue_on_failure: task.continue_on_failure,
            active: task.active,
            timeout_minutes: task.timeout_minutes,
            phase: task.phase,
        }
    }
}
