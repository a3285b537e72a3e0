//! Audit trail data types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SubsecRound, Utc};
use keel_core::{EntryId, EventQuery, EventRow};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::errors::AuditError;

/// Event type recorded when the caller gives none.
pub const UNSPECIFIED_EVENT_TYPE: &str = "unspecified";

/// Outcome recorded when the caller gives none.
pub const DEFAULT_OUTCOME: &str = "recorded";

/// Kind of orchestration decision.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionType {
    /// A request was routed to a pipeline or stage.
    RoutingDecision,
    /// A handler was picked for a request.
    HandlerSelection,
    /// An entity moved between stages.
    StageTransition,
    /// A gate was evaluated.
    GateEvaluation,
    /// Work was escalated.
    Escalation,
    /// A failure was recovered from.
    ErrorRecovery,
    /// A service lifecycle event.
    LifecycleEvent,
    /// The caller did not classify the decision.
    #[default]
    Unknown,
}

impl DecisionType {
    /// Every decision type, in declaration order.
    pub const ALL: [Self; 8] = [
        Self::RoutingDecision,
        Self::HandlerSelection,
        Self::StageTransition,
        Self::GateEvaluation,
        Self::Escalation,
        Self::ErrorRecovery,
        Self::LifecycleEvent,
        Self::Unknown,
    ];

    /// The stored string form.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RoutingDecision => "routing_decision",
            Self::HandlerSelection => "handler_selection",
            Self::StageTransition => "stage_transition",
            Self::GateEvaluation => "gate_evaluation",
            Self::Escalation => "escalation",
            Self::ErrorRecovery => "error_recovery",
            Self::LifecycleEvent => "lifecycle_event",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for DecisionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DecisionType {
    type Err = AuditError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| AuditError::Decode(format!("unknown decision type: {s}")))
    }
}

/// Caller-side description of a decision, normalized by
/// [`AuditTrail::log_decision`](crate::AuditTrail::log_decision).
#[derive(Clone, Debug, Default)]
pub struct DecisionInput {
    decision_type: DecisionType,
    event_type: String,
    entity_id: Option<String>,
    route: Option<String>,
    handler: Option<String>,
    context: Map<String, Value>,
    correlation_id: Option<String>,
    outcome: Option<String>,
}

impl DecisionInput {
    /// Start describing a decision.
    pub fn new(decision_type: DecisionType, event_type: impl Into<String>) -> Self {
        Self {
            decision_type,
            event_type: event_type.into(),
            ..Self::default()
        }
    }

    /// Entity the decision concerns.
    #[must_use]
    pub fn entity(mut self, entity_id: impl Into<String>) -> Self {
        self.entity_id = Some(entity_id.into());
        self
    }

    /// Route that was chosen.
    #[must_use]
    pub fn route(mut self, route: impl Into<String>) -> Self {
        self.route = Some(route.into());
        self
    }

    /// Handler that was chosen.
    #[must_use]
    pub fn handler(mut self, handler: impl Into<String>) -> Self {
        self.handler = Some(handler.into());
        self
    }

    /// Replace the free-form context.
    #[must_use]
    pub fn context(mut self, context: Map<String, Value>) -> Self {
        self.context = context;
        self
    }

    /// Add one context field.
    #[must_use]
    pub fn context_field(mut self, key: impl Into<String>, value: Value) -> Self {
        let _ = self.context.insert(key.into(), value);
        self
    }

    /// Correlation id linking related decisions.
    #[must_use]
    pub fn correlation(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Outcome of the decision.
    #[must_use]
    pub fn outcome(mut self, outcome: impl Into<String>) -> Self {
        self.outcome = Some(outcome.into());
        self
    }
}

/// An immutable, recorded decision.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    /// Unique id (UUID v7).
    pub entry_id: EntryId,
    /// Decision kind.
    pub decision_type: DecisionType,
    /// Caller-defined event name.
    pub event_type: String,
    /// Entity the decision concerns.
    pub entity_id: Option<String>,
    /// Chosen route.
    pub route: Option<String>,
    /// Chosen handler.
    pub handler: Option<String>,
    /// Free-form context.
    pub context: Map<String, Value>,
    /// Correlation id.
    pub correlation_id: Option<String>,
    /// Outcome.
    pub outcome: String,
    /// When the entry was created, at microsecond precision so it survives
    /// the event log unchanged.
    pub timestamp: DateTime<Utc>,
}

impl AuditEntry {
    /// Normalize `input` into a new entry stamped now.
    pub fn from_input(input: DecisionInput) -> Self {
        let event_type = if input.event_type.trim().is_empty() {
            UNSPECIFIED_EVENT_TYPE.to_string()
        } else {
            input.event_type
        };
        Self {
            entry_id: EntryId::new(),
            decision_type: input.decision_type,
            event_type,
            entity_id: input.entity_id.filter(|id| !id.is_empty()),
            route: input.route,
            handler: input.handler,
            context: input.context,
            correlation_id: input.correlation_id,
            outcome: input
                .outcome
                .filter(|o| !o.is_empty())
                .unwrap_or_else(|| DEFAULT_OUTCOME.to_string()),
            timestamp: Utc::now().trunc_subsecs(6),
        }
    }

    /// Event log row for this entry.
    ///
    /// Type, event type, entity and time are columns; the rest travels in the
    /// JSON payload.
    pub fn to_row(&self) -> EventRow {
        EventRow {
            id: self.entry_id.to_string(),
            decision_type: self.decision_type.to_string(),
            event_type: self.event_type.clone(),
            entity_id: self.entity_id.clone(),
            payload: json!({
                "route": self.route,
                "handler": self.handler,
                "context": self.context,
                "correlationId": self.correlation_id,
                "outcome": self.outcome,
            }),
            created_at: self.timestamp,
        }
    }
}

impl TryFrom<EventRow> for AuditEntry {
    type Error = AuditError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        let decision_type = row.decision_type.parse()?;
        let Value::Object(mut payload) = row.payload else {
            return Err(AuditError::Decode(format!(
                "payload of {} is not an object",
                row.id
            )));
        };

        let mut take_string = |key: &str| match payload.remove(key) {
            Some(Value::String(s)) => Some(s),
            _ => None,
        };
        let route = take_string("route");
        let handler = take_string("handler");
        let correlation_id = take_string("correlationId");
        let outcome = take_string("outcome").unwrap_or_else(|| DEFAULT_OUTCOME.to_string());
        let context = match payload.remove("context") {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        };

        Ok(Self {
            entry_id: EntryId::from(row.id),
            decision_type,
            event_type: row.event_type,
            entity_id: row.entity_id,
            route,
            handler,
            context,
            correlation_id,
            outcome,
            timestamp: row.created_at,
        })
    }
}

/// Filters for [`AuditTrail::query_audit_trail`](crate::AuditTrail::query_audit_trail).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AuditQuery {
    /// Equality filter on decision type.
    pub decision_type: Option<DecisionType>,
    /// Equality filter on event type.
    pub event_type: Option<String>,
    /// Equality filter on entity id.
    pub entity_id: Option<String>,
    /// Inclusive lower time bound.
    pub since: Option<DateTime<Utc>>,
    /// Inclusive upper time bound.
    pub until: Option<DateTime<Utc>>,
    /// Row cap; the trail's default applies when unset.
    pub limit: Option<usize>,
    /// Applied to the fetched page after the store query.
    pub correlation_id: Option<String>,
}

impl AuditQuery {
    /// An unfiltered query.
    pub fn new() -> Self {
        Self::default()
    }

    /// Only this decision type.
    #[must_use]
    pub fn decision_type(mut self, decision_type: DecisionType) -> Self {
        self.decision_type = Some(decision_type);
        self
    }

    /// Only this event type.
    #[must_use]
    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    /// Only this entity.
    #[must_use]
    pub fn entity(mut self, entity_id: impl Into<String>) -> Self {
        self.entity_id = Some(entity_id.into());
        self
    }

    /// Entries at or after `since`.
    #[must_use]
    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    /// Entries at or before `until`.
    #[must_use]
    pub fn until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    /// At most `limit` entries.
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Only entries with this correlation id.
    #[must_use]
    pub fn correlation(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// The store-side part of this query.
    pub(crate) fn to_event_query(&self, default_limit: usize) -> EventQuery {
        EventQuery {
            decision_type: self.decision_type.map(|t| t.to_string()),
            event_type: self.event_type.clone(),
            entity_id: self.entity_id.clone(),
            since: self.since,
            until: self.until,
            limit: self.limit.unwrap_or(default_limit),
        }
    }

    pub(crate) fn matches_correlation(&self, entry: &AuditEntry) -> bool {
        self.correlation_id
            .as_ref()
            .is_none_or(|id| entry.correlation_id.as_ref() == Some(id))
    }
}

/// Options for [`AuditTrail::log_decision`](crate::AuditTrail::log_decision).
#[derive(Clone, Debug, Default)]
pub struct LogOptions {
    /// Do not drain the buffer before writing this entry.
    pub skip_flush: bool,
}

/// What happened to a logged entry.
#[derive(Debug)]
pub enum Disposition {
    /// Written to the event log.
    Persisted,
    /// Held in the buffer, with the reason.
    Buffered(AuditError),
}

/// Result of [`AuditTrail::log_decision`](crate::AuditTrail::log_decision).
#[derive(Debug)]
pub struct LogReceipt {
    /// Id of the new entry, whether or not it was persisted.
    pub entry_id: EntryId,
    /// Where the entry ended up.
    pub disposition: Disposition,
}

impl LogReceipt {
    /// Whether the entry reached the event log.
    pub fn logged(&self) -> bool {
        matches!(self.disposition, Disposition::Persisted)
    }

    /// Why the entry was buffered, if it was.
    pub fn error(&self) -> Option<&AuditError> {
        match &self.disposition {
            Disposition::Persisted => None,
            Disposition::Buffered(e) => Some(e),
        }
    }
}
