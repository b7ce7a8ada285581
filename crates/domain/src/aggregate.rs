//! Core aggregate and domain event traits.

use serde::{Serialize, de::DeserializeOwned};
use store::Version;

/// Trait for domain events.
///
/// Domain events represent facts that have happened in the domain.
/// They are immutable and should be named in past tense.
pub trait DomainEvent: Serialize + DeserializeOwned + Send + Sync + Clone {
    /// Returns the event type name.
    fn event_type(&self) -> &'static str;
}

/// Trait for aggregates persisted as versioned documents.
///
/// The aggregate root ensures consistency of changes made within it; the
/// repository writes the whole aggregate in one atomic document update.
pub trait Aggregate: Serialize + DeserializeOwned + Send + Sync {
    /// Returns the aggregate type name, used in errors and logs.
    fn aggregate_type() -> &'static str;

    /// Returns the document collection the aggregate lives in.
    fn collection() -> &'static str;

    /// Returns the document id of this aggregate.
    fn key(&self) -> String;

    /// Returns the owning user, if the aggregate has one.
    fn owner(&self) -> Option<String> {
        None
    }

    /// Returns the version the aggregate was loaded at.
    ///
    /// Version 0 means the aggregate has never been saved.
    fn version(&self) -> Version;

    /// Sets the aggregate version.
    ///
    /// Called by the repository after loading and saving.
    fn set_version(&mut self, version: Version);
}

/// Aggregates whose commands produce events instead of mutating directly.
///
/// Commands validate against current state and return events; `apply` then
/// folds them into the state.
pub trait EventSourced: Aggregate {
    /// The type of events this aggregate produces and consumes.
    type Event: DomainEvent;

    /// The type of errors its commands can produce.
    type Error: std::error::Error + Send + Sync;

    /// Applies an event to the aggregate, updating its state.
    ///
    /// This method must be pure and deterministic:
    /// - Given the same state and event, it must always produce the same new state
    /// - It must not have side effects
    /// - It must not fail (events represent facts that have happened)
    fn apply(&mut self, event: Self::Event);

    /// Applies multiple events in sequence.
    fn apply_events(&mut self, events: impl IntoIterator<Item = Self::Event>) {
        for event in events {
            self.apply(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    enum TestEvent {
        Renamed { name: String },
        Incremented,
    }

    impl DomainEvent for TestEvent {
        fn event_type(&self) -> &'static str {
            match self {
                TestEvent::Renamed { .. } => "TestRenamed",
                TestEvent::Incremented => "TestIncremented",
            }
        }
    }

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct Counter {
        name: String,
        count: u32,
        version: Version,
    }

    #[derive(Debug, thiserror::Error)]
    #[error("test error")]
    struct TestError;

    impl Aggregate for Counter {
        fn aggregate_type() -> &'static str {
            "Counter"
        }

        fn collection() -> &'static str {
            "counters"
        }

        fn key(&self) -> String {
            self.name.clone()
        }

        fn version(&self) -> Version {
            self.version
        }

        fn set_version(&mut self, version: Version) {
            self.version = version;
        }
    }

    impl EventSourced for Counter {
        type Event = TestEvent;
        type Error = TestError;

        fn apply(&mut self, event: Self::Event) {
            match event {
                TestEvent::Renamed { name } => self.name = name,
                TestEvent::Incremented => self.count += 1,
            }
        }
    }

    #[test]
    fn test_apply_events_in_order() {
        let mut counter = Counter::default();
        counter.apply_events(vec![
            TestEvent::Renamed {
                name: "pills".to_string(),
            },
            TestEvent::Incremented,
            TestEvent::Incremented,
        ]);

        assert_eq!(counter.key(), "pills");
        assert_eq!(counter.count, 2);
        assert!(counter.owner().is_none());
    }

    #[test]
    fn test_domain_event_type() {
        assert_eq!(TestEvent::Incremented.event_type(), "TestIncremented");
    }
}
