//! Core aggregate and domain event traits.

use common::AggregateId;
use serde::{Serialize, de::DeserializeOwned};
use write_store::Version;

use crate::error::BusinessRuleViolation;

/// Trait for domain events.
///
/// Domain events represent facts that have happened in the domain.
/// They are immutable and named in past tense.
pub trait DomainEvent: Serialize + DeserializeOwned + Send + Sync + Clone {
    /// Returns the event type name.
    ///
    /// Used as the envelope's `type` and for subscription filtering.
    fn event_type(&self) -> &'static str;
}

/// Trait for aggregates: a consistency boundary that validates commands and
/// turns them into events.
///
/// The write repository stores the aggregate state itself, so loading is a
/// single read followed by [`Aggregate::set_version`]. Changing the state goes
/// through [`Aggregate::process`], which never mutates `self`.
pub trait Aggregate:
    Default + Clone + Serialize + DeserializeOwned + Send + Sync + Sized + 'static
{
    /// Commands this aggregate accepts.
    type Command: Send + Sync;

    /// Events this aggregate produces and consumes.
    type Event: DomainEvent;

    /// Rejections raised by `decide` and `check_invariants`.
    type Error: std::error::Error + Into<BusinessRuleViolation> + Send + Sync + 'static;

    /// Returns the aggregate type name, e.g. `"Project"`.
    fn aggregate_type() -> &'static str;

    /// Returns the aggregate's identifier, `None` before creation.
    fn id(&self) -> Option<AggregateId>;

    /// Returns the current version.
    ///
    /// A new aggregate is at version 0; every committed event adds one.
    fn version(&self) -> Version;

    /// Sets the aggregate version. Called after loading.
    fn set_version(&mut self, version: Version);

    /// Validates a command against the current state and returns the events
    /// it produces. Must not mutate anything.
    fn decide(
        &self,
        aggregate_id: AggregateId,
        command: &Self::Command,
    ) -> Result<Vec<Self::Event>, Self::Error>;

    /// Applies an event to the state.
    ///
    /// Pure and deterministic. Events are facts, so this never fails.
    fn apply(&mut self, event: Self::Event);

    /// Checks the aggregate's invariants on a candidate state.
    fn check_invariants(&self) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Decides, applies and checks invariants on a copy of the state.
    ///
    /// On success returns the new state together with the versioned events.
    /// On failure `self` is unchanged and no events exist.
    fn process(
        &self,
        aggregate_id: AggregateId,
        command: &Self::Command,
    ) -> Result<Processed<Self>, Self::Error> {
        let events = self.decide(aggregate_id, command)?;

        let previous_version = self.version();
        let mut state = self.clone();
        let mut version = previous_version;
        let mut versioned = Vec::with_capacity(events.len());

        for event in events {
            version = version.next();
            state.apply(event.clone());
            versioned.push(VersionedEvent { version, event });
        }
        state.set_version(version);
        state.check_invariants()?;

        Ok(Processed {
            state,
            events: versioned,
            previous_version,
        })
    }
}

/// An event together with the aggregate version it produces.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionedEvent<E> {
    pub version: Version,
    pub event: E,
}

/// Result of [`Aggregate::process`].
#[derive(Debug, Clone)]
pub struct Processed<A: Aggregate> {
    /// The candidate state after all events.
    pub state: A,

    /// Events in order, numbered from `previous_version + 1`.
    pub events: Vec<VersionedEvent<A::Event>>,

    /// Version the command was decided against.
    pub previous_version: Version,
}

impl<A: Aggregate> Processed<A> {
    pub fn new_version(&self) -> Version {
        self.state.version()
    }

    /// True when the command was accepted but changed nothing.
    pub fn is_noop(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    enum CounterEvent {
        Opened { id: AggregateId },
        Added { amount: u32 },
    }

    impl DomainEvent for CounterEvent {
        fn event_type(&self) -> &'static str {
            match self {
                CounterEvent::Opened { .. } => "Opened",
                CounterEvent::Added { .. } => "Added",
            }
        }
    }

    enum CounterCommand {
        Open,
        Add(u32),
        AddTwice(u32),
    }

    #[derive(Debug, Default, Clone, Serialize, Deserialize)]
    struct Counter {
        id: Option<AggregateId>,
        total: u32,
        version: Version,
    }

    #[derive(Debug, thiserror::Error)]
    enum CounterError {
        #[error("not open")]
        NotOpen,
        #[error("limit exceeded")]
        Limit,
    }

    impl From<CounterError> for BusinessRuleViolation {
        fn from(err: CounterError) -> Self {
            BusinessRuleViolation {
                rule: "Counter",
                message: err.to_string(),
            }
        }
    }

    impl Aggregate for Counter {
        type Command = CounterCommand;
        type Event = CounterEvent;
        type Error = CounterError;

        fn aggregate_type() -> &'static str {
            "Counter"
        }

        fn id(&self) -> Option<AggregateId> {
            self.id
        }

        fn version(&self) -> Version {
            self.version
        }

        fn set_version(&mut self, version: Version) {
            self.version = version;
        }

        fn decide(
            &self,
            aggregate_id: AggregateId,
            command: &CounterCommand,
        ) -> Result<Vec<CounterEvent>, CounterError> {
            match command {
                CounterCommand::Open => Ok(vec![CounterEvent::Opened { id: aggregate_id }]),
                _ if self.id.is_none() => Err(CounterError::NotOpen),
                CounterCommand::Add(amount) => Ok(vec![CounterEvent::Added { amount: *amount }]),
                CounterCommand::AddTwice(amount) => Ok(vec![
                    CounterEvent::Added { amount: *amount },
                    CounterEvent::Added { amount: *amount },
                ]),
            }
        }

        fn apply(&mut self, event: CounterEvent) {
            match event {
                CounterEvent::Opened { id } => self.id = Some(id),
                CounterEvent::Added { amount } => self.total += amount,
            }
        }

        fn check_invariants(&self) -> Result<(), CounterError> {
            if self.total > 10 {
                return Err(CounterError::Limit);
            }
            Ok(())
        }
    }

    #[test]
    fn process_numbers_events_from_current_version() {
        let id = AggregateId::new();
        let opened = Counter::default().process(id, &CounterCommand::Open).unwrap();
        assert_eq!(opened.new_version(), Version::new(1));

        let processed = opened.state.process(id, &CounterCommand::AddTwice(2)).unwrap();
        let versions: Vec<u64> = processed.events.iter().map(|e| e.version.as_u64()).collect();
        assert_eq!(versions, vec![2, 3]);
        assert_eq!(processed.previous_version, Version::new(1));
        assert_eq!(processed.state.total, 4);
    }

    #[test]
    fn rejected_command_leaves_state_untouched() {
        let id = AggregateId::new();
        let counter = Counter::default();
        let result = counter.process(id, &CounterCommand::Add(1));
        assert!(matches!(result, Err(CounterError::NotOpen)));
        assert!(counter.id.is_none());
        assert_eq!(counter.version, Version::initial());
    }

    #[test]
    fn invariant_violation_discards_candidate_state() {
        let id = AggregateId::new();
        let opened = Counter::default()
            .process(id, &CounterCommand::Open)
            .unwrap()
            .state;

        let result = opened.process(id, &CounterCommand::AddTwice(6));
        assert!(matches!(result, Err(CounterError::Limit)));
        assert_eq!(opened.total, 0);
        assert_eq!(opened.version, Version::new(1));
    }

    #[test]
    fn domain_event_type() {
        assert_eq!(CounterEvent::Added { amount: 1 }.event_type(), "Added");
    }
}
