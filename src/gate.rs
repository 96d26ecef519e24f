use core::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::GateError;
use crate::target::Identity;

/// The closed set of gate kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateKind {
    Boolean,
    Actor,
    Group,
}

impl fmt::Display for GateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GateKind::Boolean => write!(f, "boolean"),
            GateKind::Actor => write!(f, "actor"),
            GateKind::Group => write!(f, "group"),
        }
    }
}

impl FromStr for GateKind {
    type Err = GateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "boolean" => Ok(GateKind::Boolean),
            "actor" => Ok(GateKind::Actor),
            "group" => Ok(GateKind::Group),
            other => Err(GateError::UnknownKind(other.to_string())),
        }
    }
}

/// Identity of a gate inside a flag: `(kind, subject)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GateKey {
    pub kind: GateKind,
    pub subject: Option<String>,
}

impl GateKey {
    pub fn boolean() -> Self {
        Self {
            kind: GateKind::Boolean,
            subject: None,
        }
    }

    pub fn actor(actor_id: impl Into<String>) -> Self {
        Self {
            kind: GateKind::Actor,
            subject: Some(actor_id.into()),
        }
    }

    pub fn group(group: impl Into<String>) -> Self {
        Self {
            kind: GateKind::Group,
            subject: Some(group.into()),
        }
    }
}

/// A single rule contributing to a flag's value.
///
/// Gates can only be built through [`Gate::new`] and its shorthands, so a
/// boolean gate never carries a subject and actor/group gates always do.
/// Deserialization goes through the same checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawGate")]
pub struct Gate {
    kind: GateKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    subject: Option<String>,
    enabled: bool,
}

#[derive(Deserialize)]
struct RawGate {
    kind: String,
    #[serde(default)]
    subject: Option<String>,
    enabled: bool,
}

impl TryFrom<RawGate> for Gate {
    type Error = GateError;

    fn try_from(raw: RawGate) -> Result<Self, Self::Error> {
        let kind = raw.kind.parse::<GateKind>()?;
        Gate::new(kind, raw.subject, raw.enabled)
    }
}

impl Gate {
    pub fn new(
        kind: GateKind,
        subject: Option<String>,
        enabled: bool,
    ) -> Result<Self, GateError> {
        match (kind, subject) {
            (GateKind::Boolean, None) => Ok(Self {
                kind,
                subject: None,
                enabled,
            }),
            (GateKind::Boolean, Some(s)) => Err(GateError::UnexpectedSubject(s)),
            (_, Some(s)) if !s.is_empty() => Ok(Self {
                kind,
                subject: Some(s),
                enabled,
            }),
            (_, _) => Err(GateError::MissingSubject(kind)),
        }
    }

    pub fn boolean(enabled: bool) -> Self {
        Self {
            kind: GateKind::Boolean,
            subject: None,
            enabled,
        }
    }

    pub fn actor(actor: &dyn Identity, enabled: bool) -> Result<Self, GateError> {
        Self::new(GateKind::Actor, Some(actor.actor_id()), enabled)
    }

    pub fn group(group: &str, enabled: bool) -> Result<Self, GateError> {
        Self::new(GateKind::Group, Some(group.to_string()), enabled)
    }

    pub fn kind(&self) -> GateKind {
        self.kind
    }

    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn key(&self) -> GateKey {
        GateKey {
            kind: self.kind,
            subject: self.subject.clone(),
        }
    }

    pub(crate) fn has_key(&self, key: &GateKey) -> bool {
        self.kind == key.kind && self.subject == key.subject
    }

    pub(crate) fn is_for_actor(&self, actor_id: &str) -> bool {
        self.kind == GateKind::Actor && self.subject.as_deref() == Some(actor_id)
    }
}
