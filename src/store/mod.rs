//! Persistent storage for the election model.
//!
//! Everything above this module talks to a [`Store`]; the in-memory and
//! MongoDB backends both provide the guarantees the ballot model relies on:
//! at most one ballot per (voter, election), and a ballot insert that either
//! fully succeeds together with its counter increments or leaves no trace.

use std::ops::Deref;
use std::sync::Arc;

use mongodb::error::Error as DbError;
use rocket::{
    request::{self, FromRequest, Request},
    State,
};
use thiserror::Error;

use crate::model::{
    audit::AuditEntry,
    ballot::Ballot,
    candidate::Candidate,
    common::{CandidateId, ElectionId, IdKind, UserId},
    election::{Election, ElectionStatus},
    tally::CandidateTotal,
    user::User,
};

mod memory;
pub mod mongo;

pub use self::memory::MemoryStore;
pub use self::mongo::MongoStore;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Store-layer failures.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The unique (voter, election) constraint rejected a ballot.
    #[error("Voter {voter} already has a ballot in election {election}")]
    DuplicateBallot { voter: UserId, election: ElectionId },
    /// The election was not accepting ballots at the moment the ballot was
    /// stored, e.g. because it was closed after the ballot was validated.
    /// A missing election counts as closed.
    #[error("Election {election} is {status}, not active")]
    ElectionNotActive {
        election: ElectionId,
        status: ElectionStatus,
    },
    /// The unique matric number constraint rejected a user.
    #[error("Matric number '{0}' is already registered")]
    DuplicateMatric(String),
    /// A write lost a race with a concurrent write; retrying may succeed.
    #[error("Transient write conflict: {0}")]
    Transient(String),
    #[error(transparent)]
    Db(#[from] DbError),
}

/// The abstract backing store.
#[rocket::async_trait]
pub trait Store: Send + Sync {
    /// Atomically allocate the next ID of the given kind.
    async fn next_id(&self, kind: IdKind) -> StoreResult<u32>;

    /// Get an election by ID.
    async fn election(&self, id: ElectionId) -> StoreResult<Option<Election>>;
    /// All elections, by ascending ID.
    async fn elections(&self) -> StoreResult<Vec<Election>>;
    /// Insert or replace an election.
    async fn put_election(&self, election: &Election) -> StoreResult<()>;
    /// Delete an election and its candidates. Returns false if it did not exist.
    async fn delete_election(&self, id: ElectionId) -> StoreResult<bool>;

    /// Get a candidate by ID.
    async fn candidate(&self, id: CandidateId) -> StoreResult<Option<Candidate>>;
    /// Candidates of an election, optionally only those standing for one
    /// position, by ascending ID.
    async fn candidates(
        &self,
        election: ElectionId,
        position: Option<&str>,
    ) -> StoreResult<Vec<Candidate>>;
    /// Every candidate in every election, by ascending ID.
    async fn all_candidates(&self) -> StoreResult<Vec<Candidate>>;
    /// Insert or replace a candidate.
    async fn put_candidate(&self, candidate: &Candidate) -> StoreResult<()>;
    /// Delete a candidate. Returns false if it did not exist.
    async fn delete_candidate(&self, id: CandidateId) -> StoreResult<bool>;

    /// The ballot cast by this voter in this election, if any.
    async fn ballot(&self, voter: UserId, election: ElectionId) -> StoreResult<Option<Ballot>>;
    /// Every ballot cast in an election.
    async fn ballots(&self, election: ElectionId) -> StoreResult<Vec<Ballot>>;
    /// Number of ballots cast, in one election or in all of them.
    async fn count_ballots(&self, election: Option<ElectionId>) -> StoreResult<u64>;
    /// Store a ballot and increment the counter of every chosen candidate, as
    /// one atomic unit.
    ///
    /// Fails with [`StoreError::DuplicateBallot`] if the voter already has a
    /// ballot in this election, or with [`StoreError::ElectionNotActive`] if
    /// the election is not active at the ballot's `cast_at`. In both cases
    /// nothing is written.
    async fn insert_ballot(&self, ballot: &Ballot) -> StoreResult<()>;
    /// The incremental vote counters of an election.
    async fn candidate_totals(&self, election: ElectionId) -> StoreResult<Vec<CandidateTotal>>;

    /// Get a user by ID.
    async fn user(&self, id: UserId) -> StoreResult<Option<User>>;
    /// Get a user by matric number.
    async fn user_by_matric(&self, matric_number: &str) -> StoreResult<Option<User>>;
    /// All users, by ascending ID.
    async fn users(&self) -> StoreResult<Vec<User>>;
    /// Insert a new user, enforcing matric number uniqueness.
    async fn insert_user(&self, user: &User) -> StoreResult<()>;
    /// Replace an existing user.
    async fn put_user(&self, user: &User) -> StoreResult<()>;

    /// Append an entry to the administrator activity log.
    async fn insert_audit_entry(&self, entry: &AuditEntry) -> StoreResult<()>;
    /// The whole activity log, by ascending ID.
    async fn audit_entries(&self) -> StoreResult<Vec<AuditEntry>>;
}

/// A shareable handle on the configured store, kept in managed state.
#[derive(Clone)]
pub struct Storage(Arc<dyn Store>);

impl Storage {
    pub fn new(store: impl Store + 'static) -> Self {
        Self(Arc::new(store))
    }
}

impl Deref for Storage {
    type Target = dyn Store;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Storage {
    type Error = ();

    /// Get the store handle from managed state.
    ///
    /// Panics iff the [`Storage`] is not managed by [`rocket::Rocket`].
    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let storage = req.guard::<&State<Storage>>().await.unwrap();
        request::Outcome::Success(storage.inner().clone())
    }
}
