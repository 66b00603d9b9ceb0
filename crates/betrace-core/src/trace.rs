//! The immutable span/trace data carriers shared by every component.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{attribute::AttributeValue, error::CoreError, tenant::TenantId};

/// The reserved attribute name that resolves to a span's operation name.
pub const RESERVED_OPERATION_NAME: &str = "operationName";
/// The reserved attribute name that resolves to a span's duration in
/// milliseconds.
pub const RESERVED_DURATION_MS: &str = "duration_ms";

/// One operation record in a trace.
///
/// `spec.md` §3: immutable; identifiers (trace id, span id, optional parent
/// span id); naming (dotted operation name, service name); temporal (start
/// ≤ end, both monotonic instants); payload (attribute map); tenant id.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Span {
    /// The id of the trace this span belongs to. Never empty.
    pub trace_id: String,
    /// This span's own id.
    pub span_id: String,
    /// The id of this span's parent, if any.
    pub parent_span_id: Option<String>,
    /// Dotted operation name, e.g. `payment.charge_card`.
    pub operation: String,
    /// The service that emitted this span.
    pub service: String,
    /// Monotonic start instant.
    pub start: DateTime<Utc>,
    /// Monotonic end instant. Always `>= start`.
    pub end: DateTime<Utc>,
    /// Scalar attribute payload.
    pub attributes: BTreeMap<String, AttributeValue>,
    /// The tenant that owns this span.
    pub tenant_id: TenantId,
}

impl Span {
    /// Builds a span, checking the invariants from `spec.md` §3: start <=
    /// end, and a non-empty trace id.
    pub fn new(
        trace_id: impl Into<String>,
        span_id: impl Into<String>,
        operation: impl Into<String>,
        service: impl Into<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        tenant_id: TenantId,
    ) -> Result<Self, CoreError> {
        let trace_id = trace_id.into();
        if trace_id.is_empty() {
            return Err(CoreError::Invalid("trace id must not be empty".into()));
        }
        if start > end {
            return Err(CoreError::Invalid("span start must not be after end".into()));
        }
        Ok(Self {
            trace_id,
            span_id: span_id.into(),
            parent_span_id: None,
            operation: operation.into(),
            service: service.into(),
            start,
            end,
            attributes: BTreeMap::new(),
            tenant_id,
        })
    }

    /// Attaches a parent span id, builder-style.
    #[must_use]
    pub fn with_parent(mut self, parent_span_id: impl Into<String>) -> Self {
        self.parent_span_id = Some(parent_span_id.into());
        self
    }

    /// Attaches an attribute, builder-style.
    #[must_use]
    pub fn with_attribute(
        mut self,
        name: impl Into<String>,
        value: impl Into<AttributeValue>,
    ) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// This span's duration in milliseconds, the value behind the reserved
    /// `duration_ms` attribute name.
    #[must_use]
    pub fn duration_ms(&self) -> i64 {
        (self.end - self.start).num_milliseconds()
    }

    /// Looks up an attribute by name, resolving the two reserved
    /// pseudo-names (`operationName`, `duration_ms`) along the way.
    ///
    /// `spec.md` §4.3: missing attribute is not an error, it's absence.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<AttributeValue> {
        match name {
            RESERVED_OPERATION_NAME => Some(AttributeValue::String(self.operation.clone())),
            RESERVED_DURATION_MS => Some(AttributeValue::Int(self.duration_ms())),
            _ => self.attributes.get(name).cloned(),
        }
    }
}

/// A finite, ordered sequence of spans sharing a trace id.
///
/// `spec.md` §3: order is by start time, ties broken by span id; the core
/// never mutates a trace.
#[derive(Clone, Debug, PartialEq)]
pub struct Trace {
    trace_id: String,
    spans: Vec<Span>,
}

impl Trace {
    /// Builds a trace from an unordered set of spans sharing a trace id,
    /// sorting them per the ordering invariant.
    ///
    /// # Errors
    /// Returns [`CoreError::Invalid`] if the spans don't all share a trace
    /// id, or if the set is empty.
    pub fn new(mut spans: Vec<Span>) -> Result<Self, CoreError> {
        let Some(first) = spans.first() else {
            return Err(CoreError::Invalid("a trace must have at least one span".into()));
        };
        let trace_id = first.trace_id.clone();
        if spans.iter().any(|s| s.trace_id != trace_id) {
            return Err(CoreError::Invalid(
                "all spans in a trace must share the same trace id".into(),
            ));
        }
        spans.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.span_id.cmp(&b.span_id)));
        Ok(Self { trace_id, spans })
    }

    /// This trace's id.
    #[must_use]
    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    /// The ordered span list.
    #[must_use]
    pub fn spans(&self) -> &[Span] {
        &self.spans
    }

    /// Produces a defensive copy of this trace, used at the Evaluator's
    /// trust boundary before handing spans to the interpreter (`spec.md`
    /// §5, TOCTOU safety: "the Evaluator copies its span input before
    /// handing it to the Interpreter").
    #[must_use]
    pub fn snapshot(&self) -> Vec<Span> {
        self.spans.clone()
    }
}
