//! Structured record of every rewrite the pipeline performs.
//!
//! Passes log human-oriented progress through `tracing`; in addition every
//! transformation is appended to the context's [`EventLog`] so drivers and
//! tests can inspect exactly what happened to a unit without parsing logs.
//!
//! # Architecture
//!
//! - [`Event`] - a single recorded event
//! - [`EventLog`] - append-only collection with query and summary helpers
//! - [`EventBuilder`] - fluent API returned by [`EventLog::record`]
//!
//! The log is backed by `boxcar::Vec`, so events can be appended through a
//! shared reference from several rayon workers compiling different units.
//!
//! # Example
//!
//! ```rust
//! use mirflow::compiler::{EventKind, EventLog};
//!
//! let log = EventLog::new();
//! log.record(EventKind::PhiRemoved)
//!     .unit("f")
//!     .message("v3 is redundant, replaced by v1");
//! log.info("pipeline started");
//!
//! assert_eq!(log.count_kind(EventKind::PhiRemoved), 1);
//! assert_eq!(log.summary(), "1 phi removed");
//! ```

use std::{collections::HashMap, fmt};

use crate::mir::{BlockId, ValueId};

/// Categories of events that can be logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A critical edge was split by a synthetic block.
    EdgeSplit,
    /// A redundant or unobservable phi was discarded.
    PhiRemoved,
    /// A phi received its final type.
    PhiSpecialized,
    /// A conversion (box, unbox or numeric) was inserted.
    ConversionInserted,
    /// A bounds check was folded into a dominating one.
    BoundsCheckEliminated,
    /// A type guard was proven by a dominating branch.
    TypeGuardEliminated,
    /// A dead instruction was discarded.
    InstructionRemoved,
    /// A dead instruction was kept for bailout reconstruction only.
    MarkedRecoverable,
    /// A dead value was removed from a snapshot.
    SnapshotOperandPruned,
    /// An operation was specialized to float32.
    Float32Specialized,

    /// Informational message.
    Info,
    /// Warning (something unexpected but recoverable).
    Warning,
}

impl EventKind {
    /// Returns a human-readable description of this event kind.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::EdgeSplit => "edge split",
            Self::PhiRemoved => "phi removed",
            Self::PhiSpecialized => "phi specialized",
            Self::ConversionInserted => "conversion inserted",
            Self::BoundsCheckEliminated => "bounds check eliminated",
            Self::TypeGuardEliminated => "type guard eliminated",
            Self::InstructionRemoved => "instruction removed",
            Self::MarkedRecoverable => "marked recoverable",
            Self::SnapshotOperandPruned => "snapshot operand pruned",
            Self::Float32Specialized => "float32 specialized",
            Self::Info => "info",
            Self::Warning => "warning",
        }
    }

    /// Returns true if this event represents a graph transformation.
    #[must_use]
    pub fn is_transformation(&self) -> bool {
        !self.is_diagnostic()
    }

    /// Returns true if this is a diagnostic event (info/warning).
    #[must_use]
    pub fn is_diagnostic(&self) -> bool {
        matches!(self, Self::Info | Self::Warning)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// A single logged event.
#[derive(Debug, Clone)]
pub struct Event {
    /// The type of event.
    pub kind: EventKind,
    /// The compilation unit the event belongs to.
    pub unit: Option<String>,
    /// The block concerned, if any.
    pub block: Option<BlockId>,
    /// The definition concerned, if any.
    pub value: Option<ValueId>,
    /// Human-readable description.
    pub message: String,
    /// Associated pass name (if from a pass).
    pub pass: Option<String>,
}

impl Event {
    fn new(kind: EventKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            unit: None,
            block: None,
            value: None,
            message: message.into(),
            pass: None,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.kind)?;
        if let Some(unit) = &self.unit {
            write!(f, " {unit}")?;
        }
        write!(f, " {}", self.message)
    }
}

/// Builder for creating events with a fluent API.
///
/// Created by [`EventLog::record`]. The event is added to the log when the
/// builder is dropped.
pub struct EventBuilder<'a> {
    log: &'a EventLog,
    kind: EventKind,
    unit: Option<String>,
    block: Option<BlockId>,
    value: Option<ValueId>,
    message: Option<String>,
    pass: Option<String>,
}

impl<'a> EventBuilder<'a> {
    fn new(log: &'a EventLog, kind: EventKind) -> Self {
        Self {
            log,
            kind,
            unit: None,
            block: None,
            value: None,
            message: None,
            pass: None,
        }
    }

    /// Sets the compilation unit.
    #[must_use]
    pub fn unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    /// Sets the block concerned.
    #[must_use]
    pub fn block(mut self, block: BlockId) -> Self {
        self.block = Some(block);
        self
    }

    /// Sets the definition concerned.
    #[must_use]
    pub fn value(mut self, value: ValueId) -> Self {
        self.value = Some(value);
        self
    }

    /// Sets a custom message describing the event.
    #[must_use]
    pub fn message(mut self, msg: impl Into<String>) -> Self {
        self.message = Some(msg.into());
        self
    }

    /// Associates this event with a specific pass.
    #[must_use]
    pub fn pass(mut self, pass_name: impl Into<String>) -> Self {
        self.pass = Some(pass_name.into());
        self
    }
}

impl Drop for EventBuilder<'_> {
    fn drop(&mut self) {
        let message = self
            .message
            .take()
            .unwrap_or_else(|| self.kind.description().to_string());

        self.log.events.push(Event {
            kind: self.kind,
            unit: self.unit.take(),
            block: self.block.take(),
            value: self.value.take(),
            message,
            pass: self.pass.take(),
        });
    }
}

/// Collection of events from one or more pipeline runs.
///
/// This type is thread-safe: events can be appended concurrently from
/// multiple threads using shared references (`&self`).
#[derive(Debug)]
pub struct EventLog {
    events: boxcar::Vec<Event>,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for EventLog {
    fn clone(&self) -> Self {
        let log = Self::new();
        for (_, event) in &self.events {
            log.events.push(event.clone());
        }
        log
    }
}

impl EventLog {
    /// Creates an empty event log.
    #[must_use]
    pub fn new() -> Self {
        Self {
            events: boxcar::Vec::new(),
        }
    }

    /// Returns true if no events have been logged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.count() == 0
    }

    /// Returns the total number of events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.count()
    }

    /// Starts building a new event of the given kind.
    ///
    /// The event is added when the builder is dropped.
    pub fn record(&self, kind: EventKind) -> EventBuilder<'_> {
        EventBuilder::new(self, kind)
    }

    /// Records an informational message.
    pub fn info(&self, message: impl Into<String>) {
        self.events.push(Event::new(EventKind::Info, message));
    }

    /// Records a warning message.
    pub fn warn(&self, message: impl Into<String>) {
        self.events.push(Event::new(EventKind::Warning, message));
    }

    /// Returns true if any event of the given kind exists.
    #[must_use]
    pub fn has(&self, kind: EventKind) -> bool {
        self.events.iter().any(|(_, e)| e.kind == kind)
    }

    /// Counts events of the given kind.
    #[must_use]
    pub fn count_kind(&self, kind: EventKind) -> usize {
        self.events.iter().filter(|(_, e)| e.kind == kind).count()
    }

    /// Returns an iterator over all events.
    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter().map(|(_, e)| e)
    }

    /// Returns an iterator over events of a specific kind.
    pub fn filter_kind(&self, kind: EventKind) -> impl Iterator<Item = &Event> + '_ {
        self.iter().filter(move |e| e.kind == kind)
    }

    /// Returns an iterator over events of one compilation unit.
    pub fn filter_unit<'a>(&'a self, unit: &'a str) -> impl Iterator<Item = &'a Event> + 'a {
        self.iter().filter(move |e| e.unit.as_deref() == Some(unit))
    }

    /// Returns the number of transformation events.
    #[must_use]
    pub fn transformation_count(&self) -> usize {
        self.iter().filter(|e| e.kind.is_transformation()).count()
    }

    /// Counts events grouped by kind.
    #[must_use]
    pub fn count_by_kind(&self) -> HashMap<EventKind, usize> {
        let mut counts = HashMap::new();
        for event in self.iter() {
            *counts.entry(event.kind).or_insert(0) += 1;
        }
        counts
    }

    /// Generates a human-readable summary of the transformations.
    #[must_use]
    pub fn summary(&self) -> String {
        if self.is_empty() {
            return "no events".to_string();
        }

        let mut parts: Vec<String> = self
            .count_by_kind()
            .iter()
            .filter(|(k, _)| k.is_transformation())
            .map(|(kind, count)| format!("{} {}", count, kind.description()))
            .collect();

        if parts.is_empty() {
            return format!("{} events", self.len());
        }

        parts.sort();
        parts.join(", ")
    }
}

impl<'a> IntoIterator for &'a EventLog {
    type Item = &'a Event;
    type IntoIter = Box<dyn Iterator<Item = &'a Event> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}
