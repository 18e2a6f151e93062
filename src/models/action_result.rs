//! Uniform outcome returned by every event handler.

use serde::{Serialize, Serializer};
use serde_json::Value;

/// Wire status of an [`ActionResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ActionStatus {
    Ok,
    Ignore,
    Error,
}

/// Outcome of a handler.
///
/// Handlers never surface raw errors to their caller; everything ends up as one of
/// these three variants and is marshaled as `{status, note?, value?}`.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionResult {
    /// The action was performed. Carries an optional auxiliary value.
    Ok(Option<Value>),
    /// Expected no-op, with an optional human-readable note.
    Ignore(Option<String>),
    /// Unexpected failure, with the captured description.
    Error(String),
}

impl ActionResult {
    pub fn ok() -> Self {
        Self::Ok(None)
    }

    pub fn ok_with(value: impl Into<Value>) -> Self {
        Self::Ok(Some(value.into()))
    }

    pub fn ignore_because(note: impl Into<String>) -> Self {
        Self::Ignore(Some(note.into()))
    }

    pub fn error(description: impl Into<String>) -> Self {
        Self::Error(description.into())
    }

    pub fn status(&self) -> ActionStatus {
        match self {
            Self::Ok(_) => ActionStatus::Ok,
            Self::Ignore(_) => ActionStatus::Ignore,
            Self::Error(_) => ActionStatus::Error,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok(_))
    }

    pub fn is_ignore(&self) -> bool {
        matches!(self, Self::Ignore(_))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// Note or error description, if any.
    pub fn note(&self) -> Option<&str> {
        match self {
            Self::Ok(_) => None,
            Self::Ignore(note) => note.as_deref(),
            Self::Error(description) => Some(description),
        }
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Ok(value) => value.as_ref(),
            _ => None,
        }
    }
}

#[derive(Serialize)]
struct ActionResponse<'a> {
    status: ActionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    note: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<&'a Value>,
}

impl Serialize for ActionResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        ActionResponse {
            status: self.status(),
            note: self.note(),
            value: self.value(),
        }
        .serialize(serializer)
    }
}
