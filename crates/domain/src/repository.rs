//! Loading, saving and command execution for aggregates.

use std::marker::PhantomData;

use store::{Document, DocumentQuery, DocumentStore, PutOptions, Version};

use crate::aggregate::{Aggregate, DomainEvent, EventSourced};
use crate::error::DomainError;

/// Result of command execution.
#[derive(Debug)]
pub struct CommandResult<A: EventSourced> {
    /// The aggregate after applying the new events.
    pub aggregate: A,

    /// The events that were generated and persisted.
    pub events: Vec<A::Event>,

    /// The new version of the aggregate after the command.
    pub new_version: Version,
}

/// Repository for one aggregate type.
///
/// Each save writes the entire aggregate as one document guarded by the
/// version it was loaded at, so a concurrent writer gets a conflict instead
/// of silently overwriting.
pub struct Repository<S, A>
where
    S: DocumentStore,
    A: Aggregate,
{
    store: S,
    _phantom: PhantomData<A>,
}

impl<S, A> Repository<S, A>
where
    S: DocumentStore,
    A: Aggregate,
{
    /// Creates a new repository over the given store.
    pub fn new(store: S) -> Self {
        Self {
            store,
            _phantom: PhantomData,
        }
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Loads an aggregate, returning None if it doesn't exist.
    pub async fn load(&self, id: &str) -> Result<Option<A>, DomainError> {
        match self.store.get(A::collection(), id).await? {
            Some(document) => {
                let mut aggregate: A = document.decode()?;
                aggregate.set_version(document.version);
                Ok(Some(aggregate))
            }
            None => Ok(None),
        }
    }

    /// Loads an aggregate, failing with `NotFound` if it doesn't exist.
    pub async fn load_existing(&self, id: &str) -> Result<A, DomainError> {
        self.load(id)
            .await?
            .ok_or_else(|| DomainError::NotFound {
                aggregate_type: A::aggregate_type(),
                id: id.to_string(),
            })
    }

    /// Loads every aggregate owned by `owner`, newest first.
    pub async fn load_owned_by(
        &self,
        owner: &str,
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> Result<Vec<A>, DomainError> {
        let query = DocumentQuery {
            collection: A::collection().to_string(),
            owner: Some(owner.to_string()),
            limit,
            offset,
        };

        self.store
            .query(query)
            .await?
            .into_iter()
            .map(|document| {
                let mut aggregate: A = document.decode()?;
                aggregate.set_version(document.version);
                Ok(aggregate)
            })
            .collect()
    }

    /// Saves an aggregate, checking it was not modified since it was loaded.
    pub async fn save(&self, aggregate: &mut A) -> Result<Version, DomainError> {
        let current_version = aggregate.version();

        let mut document = Document::new(A::collection(), aggregate.key(), &*aggregate)?;
        if let Some(owner) = aggregate.owner() {
            document = document.owned_by(owner);
        }

        let options = if current_version == Version::initial() {
            PutOptions::expect_new()
        } else {
            PutOptions::expect_version(current_version)
        };

        let new_version = self.store.put(document, options).await?;
        aggregate.set_version(new_version);

        Ok(new_version)
    }
}

impl<S, A> Repository<S, A>
where
    S: DocumentStore,
    A: EventSourced,
{
    /// Executes a command and persists the resulting state.
    ///
    /// The command function receives the current aggregate state and returns
    /// either a list of events to apply, or an error. Commands that produce
    /// no events leave the stored document untouched.
    pub async fn execute<F>(&self, id: &str, command_fn: F) -> Result<CommandResult<A>, DomainError>
    where
        F: FnOnce(&A) -> Result<Vec<A::Event>, A::Error>,
        DomainError: From<A::Error>,
    {
        let mut aggregate = self.load_existing(id).await?;
        let current_version = aggregate.version();

        let events = command_fn(&aggregate)?;

        if events.is_empty() {
            return Ok(CommandResult {
                aggregate,
                events: vec![],
                new_version: current_version,
            });
        }

        aggregate.apply_events(events.iter().cloned());
        let new_version = self.save(&mut aggregate).await?;

        tracing::debug!(
            aggregate_type = A::aggregate_type(),
            id,
            version = %new_version,
            events = ?events.iter().map(DomainEvent::event_type).collect::<Vec<_>>(),
            "Events applied"
        );

        Ok(CommandResult {
            aggregate,
            events,
            new_version,
        })
    }
}
