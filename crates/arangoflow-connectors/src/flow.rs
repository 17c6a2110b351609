//! The flow-unit boundary to the data-flow host.
//!
//! A [`FlowUnit`] is the atomic piece of data the host moves between pipeline
//! stages: opaque byte content plus a string-keyed attribute map. The core
//! never inspects more than that. Units are obtained from and disposed of
//! through a [`FlowSession`]; every unit an invocation touches ends up
//! transferred to exactly one [`Outcome`], removed, or rolled back to the
//! host for redelivery, never more than one of these.
//!
//! [`MemorySession`] is the in-process session used by tests and examples.

use std::collections::{HashMap, VecDeque};

use bytes::Bytes;

/// String-keyed flow unit attributes.
pub type AttributeMap = HashMap<String, String>;

/// The named outcomes a flow unit can be transferred to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// New data produced by the invocation.
    Success,
    /// The triggering input, routed here on error.
    Failure,
    /// The triggering input, routed here on success.
    Original,
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Failure => write!(f, "failure"),
            Self::Original => write!(f, "original"),
        }
    }
}

/// An opaque unit of data and attributes moved by the host.
#[derive(Debug, Clone)]
pub struct FlowUnit {
    id: u64,
    attributes: AttributeMap,
    content: Bytes,
}

impl FlowUnit {
    /// Creates a flow unit. Only sessions normally construct these.
    #[must_use]
    pub fn new(id: u64, attributes: AttributeMap, content: Bytes) -> Self {
        Self {
            id,
            attributes,
            content,
        }
    }

    /// Host-assigned identifier.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The attribute map.
    #[must_use]
    pub fn attributes(&self) -> &AttributeMap {
        &self.attributes
    }

    /// A single attribute value.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// The byte content.
    #[must_use]
    pub fn content(&self) -> &Bytes {
        &self.content
    }

    /// Replaces the byte content.
    pub fn set_content(&mut self, content: Bytes) {
        self.content = content;
    }
}

/// The host session an invocation works within.
///
/// The session owns flow-unit lifecycle: handing out the triggering unit,
/// creating children, and recording each unit's final disposition. `rollback`
/// returns a unit to the host queue for redelivery without routing it to any
/// outcome (used by the keep-partial failure policy and by invocation-level
/// failures whose retry policy belongs to the host).
pub trait FlowSession: Send {
    /// Takes the next queued flow unit, if any.
    fn get(&mut self) -> Option<FlowUnit>;

    /// Creates a new flow unit, inheriting the parent's attributes when a
    /// parent is given.
    fn create(&mut self, parent: Option<&FlowUnit>) -> FlowUnit;

    /// Transfers a unit to a named outcome. Final.
    fn transfer(&mut self, unit: FlowUnit, outcome: Outcome);

    /// Removes a unit without routing it anywhere. Final.
    fn remove(&mut self, unit: FlowUnit);

    /// Returns a unit to the host queue for redelivery.
    fn rollback(&mut self, unit: FlowUnit);
}

/// In-memory [`FlowSession`] for tests and examples.
///
/// Records every disposition so assertions can check exactly where each unit
/// went.
#[derive(Debug, Default)]
pub struct MemorySession {
    queue: VecDeque<FlowUnit>,
    next_id: u64,
    transferred: Vec<(FlowUnit, Outcome)>,
    removed: Vec<FlowUnit>,
    rolled_back: Vec<FlowUnit>,
}

impl MemorySession {
    /// Creates an empty session.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues an input flow unit and returns its id.
    pub fn enqueue(&mut self, attributes: AttributeMap, content: impl Into<Bytes>) -> u64 {
        let id = self.allocate_id();
        self.queue
            .push_back(FlowUnit::new(id, attributes, content.into()));
        id
    }

    /// Units transferred to the given outcome, in transfer order.
    #[must_use]
    pub fn transferred_to(&self, outcome: Outcome) -> Vec<&FlowUnit> {
        self.transferred
            .iter()
            .filter(|(_, o)| *o == outcome)
            .map(|(unit, _)| unit)
            .collect()
    }

    /// Units removed without routing.
    #[must_use]
    pub fn removed(&self) -> &[FlowUnit] {
        &self.removed
    }

    /// Units rolled back for redelivery.
    #[must_use]
    pub fn rolled_back(&self) -> &[FlowUnit] {
        &self.rolled_back
    }

    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

impl FlowSession for MemorySession {
    fn get(&mut self) -> Option<FlowUnit> {
        self.queue.pop_front()
    }

    fn create(&mut self, parent: Option<&FlowUnit>) -> FlowUnit {
        let id = self.allocate_id();
        let attributes = parent.map(|p| p.attributes.clone()).unwrap_or_default();
        FlowUnit::new(id, attributes, Bytes::new())
    }

    fn transfer(&mut self, unit: FlowUnit, outcome: Outcome) {
        self.transferred.push((unit, outcome));
    }

    fn remove(&mut self, unit: FlowUnit) {
        self.removed.push(unit);
    }

    fn rollback(&mut self, unit: FlowUnit) {
        self.rolled_back.push(unit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_display() {
        assert_eq!(Outcome::Success.to_string(), "success");
        assert_eq!(Outcome::Failure.to_string(), "failure");
        assert_eq!(Outcome::Original.to_string(), "original");
    }

    #[test]
    fn test_enqueue_and_get() {
        let mut session = MemorySession::new();
        let mut attributes = AttributeMap::new();
        attributes.insert("collection".into(), "users".into());
        session.enqueue(attributes, "payload");

        let unit = session.get().unwrap();
        assert_eq!(unit.attribute("collection"), Some("users"));
        assert_eq!(unit.content().as_ref(), b"payload");
        assert!(session.get().is_none());
    }

    #[test]
    fn test_create_inherits_parent_attributes() {
        let mut session = MemorySession::new();
        let mut attributes = AttributeMap::new();
        attributes.insert("k".into(), "v".into());
        session.enqueue(attributes, "");
        let parent = session.get().unwrap();

        let child = session.create(Some(&parent));
        assert_eq!(child.attribute("k"), Some("v"));
        assert_ne!(child.id(), parent.id());

        let orphan = session.create(None);
        assert!(orphan.attributes().is_empty());
    }

    #[test]
    fn test_dispositions_are_recorded() {
        let mut session = MemorySession::new();
        let a = session.create(None);
        let b = session.create(None);
        let c = session.create(None);

        session.transfer(a, Outcome::Success);
        session.remove(b);
        session.rollback(c);

        assert_eq!(session.transferred_to(Outcome::Success).len(), 1);
        assert_eq!(session.transferred_to(Outcome::Failure).len(), 0);
        assert_eq!(session.removed().len(), 1);
        assert_eq!(session.rolled_back().len(), 1);
    }
}
