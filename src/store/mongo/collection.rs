use std::ops::Deref;

use log::debug;
use mongodb::{
    bson::{doc, Document},
    error::Error as DbError,
    options::IndexOptions,
    Collection, Database, IndexModel,
};

use crate::model::{
    audit::AuditEntry, ballot::Ballot, candidate::Candidate, election::Election,
    tally::CandidateTotal, user::User,
};

use super::counter::Counter;

/// A type that can be directly inserted/read to/from the database.
pub trait MongoCollection {
    /// The name of the collection.
    const NAME: &'static str;
}

/// A database collection of the given type.
pub struct Coll<T>(Collection<T>);

impl<T> Coll<T>
where
    T: MongoCollection,
{
    /// Get a handle on this collection in the given database.
    pub fn from_db(db: &Database) -> Self {
        Self(db.collection(T::NAME))
    }
}

// `Derive(Clone)` would only derive if `T: Clone`, but we don't need that bound.
impl<T> Clone for Coll<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> Deref for Coll<T> {
    type Target = Collection<T>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl MongoCollection for Election {
    const NAME: &'static str = "elections";
}

impl MongoCollection for Candidate {
    const NAME: &'static str = "candidates";
}

impl MongoCollection for User {
    const NAME: &'static str = "users";
}

impl MongoCollection for Ballot {
    const NAME: &'static str = "ballots";
}

impl MongoCollection for CandidateTotal {
    const NAME: &'static str = "candidate_totals";
}

impl MongoCollection for AuditEntry {
    const NAME: &'static str = "audit_log";
}

impl MongoCollection for Counter {
    const NAME: &'static str = "counters";
}

/// Ensure that all the required indexes exist on the given database.
///
/// This operation is idempotent.
pub async fn ensure_indexes_exist(db: &Database) -> Result<(), DbError> {
    debug!("Ensuring collection indexes exist");

    let unique = IndexOptions::builder().unique(true).build();
    let unique_index = |keys: Document| {
        IndexModel::builder()
            .keys(keys)
            .options(unique.clone())
            .build()
    };

    Coll::<Election>::from_db(db)
        .create_index(unique_index(doc! {"id": 1}), None)
        .await?;

    let candidates = Coll::<Candidate>::from_db(db);
    candidates
        .create_index(unique_index(doc! {"id": 1}), None)
        .await?;
    candidates
        .create_index(
            IndexModel::builder()
                .keys(doc! {"election_id": 1, "position": 1})
                .build(),
            None,
        )
        .await?;

    let users = Coll::<User>::from_db(db);
    users
        .create_index(unique_index(doc! {"id": 1}), None)
        .await?;
    users
        .create_index(unique_index(doc! {"matric_number": 1}), None)
        .await?;

    // At most one ballot per voter per election.
    Coll::<Ballot>::from_db(db)
        .create_index(unique_index(doc! {"voter_id": 1, "election_id": 1}), None)
        .await?;

    Coll::<CandidateTotal>::from_db(db)
        .create_index(
            unique_index(doc! {"election_id": 1, "position": 1, "candidate_id": 1}),
            None,
        )
        .await?;

    Coll::<AuditEntry>::from_db(db)
        .create_index(unique_index(doc! {"id": 1}), None)
        .await?;

    Ok(())
}
