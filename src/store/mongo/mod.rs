//! MongoDB-backed [`Store`].
//!
//! Domain records are stored as-is with their integer `id` field under a
//! unique index; MongoDB's own `_id` is left for the server to generate.
//! Ballot insertion runs in a multi-document transaction, so this backend
//! needs a replica set.

use log::{debug, warn};
use mongodb::{
    bson::{doc, Document},
    error::Error as DbError,
    options::{FindOptions, ReplaceOptions, UpdateOptions},
    Client, ClientSession, Database,
};
use rocket::futures::TryStreamExt;

use crate::model::{
    audit::AuditEntry,
    ballot::Ballot,
    candidate::Candidate,
    common::{CandidateId, ElectionId, IdKind, UserId},
    election::{Election, ElectionStatus},
    tally::CandidateTotal,
    user::User,
};

use super::{Store, StoreError, StoreResult};

mod collection;
mod counter;
mod errors;

pub use collection::{ensure_indexes_exist, Coll, MongoCollection};
pub use counter::Counter;
pub use errors::{is_duplicate_key_error, is_transient_error};

/// A store backed by a MongoDB database.
#[derive(Clone)]
pub struct MongoStore {
    client: Client,
    db: Database,
}

impl MongoStore {
    /// Connect to the server at `uri` and use the named database.
    pub async fn connect(uri: &str, db_name: &str) -> Result<Self, DbError> {
        let client = Client::with_uri_str(uri).await?;
        Self::new(client, db_name).await
    }

    /// Use the named database through an existing client, creating any
    /// missing indexes.
    pub async fn new(client: Client, db_name: &str) -> Result<Self, DbError> {
        let db = client.database(db_name);
        ensure_indexes_exist(&db).await?;
        Ok(Self { client, db })
    }

    /// The underlying database.
    pub fn database(&self) -> &Database {
        &self.db
    }

    fn coll<T: MongoCollection>(&self) -> Coll<T> {
        Coll::from_db(&self.db)
    }

    async fn find_all<T>(&self, filter: impl Into<Option<Document>> + Send) -> StoreResult<Vec<T>>
    where
        T: MongoCollection + serde::de::DeserializeOwned + Unpin + Send + Sync,
    {
        let options = FindOptions::builder().sort(doc! {"id": 1}).build();
        let found = self
            .coll::<T>()
            .find(filter, options)
            .await?
            .try_collect()
            .await?;
        Ok(found)
    }

    async fn replace<T>(&self, id: u32, item: &T) -> StoreResult<()>
    where
        T: MongoCollection + serde::Serialize + Send + Sync,
    {
        let options = ReplaceOptions::builder().upsert(true).build();
        self.coll::<T>()
            .replace_one(doc! {"id": id}, item, options)
            .await?;
        Ok(())
    }

    /// The body of the ballot transaction: check the election is still
    /// active, then write the ballot itself and one counter increment per
    /// selection.
    async fn write_ballot(&self, ballot: &Ballot, session: &mut ClientSession) -> StoreResult<()> {
        let status = self
            .coll::<Election>()
            .find_one_with_session(doc! {"id": ballot.election_id}, None, session)
            .await
            .map_err(|err| Self::ballot_error(ballot, err))?
            .map_or(ElectionStatus::Closed, |e| e.status_at(ballot.cast_at));
        if status != ElectionStatus::Active {
            return Err(StoreError::ElectionNotActive {
                election: ballot.election_id,
                status,
            });
        }

        self.coll::<Ballot>()
            .insert_one_with_session(ballot, None, session)
            .await
            .map_err(|err| Self::ballot_error(ballot, err))?;

        let totals = self.coll::<CandidateTotal>();
        let upsert = UpdateOptions::builder().upsert(true).build();
        for (position, candidate_id) in &ballot.selections {
            let filter = doc! {
                "election_id": ballot.election_id,
                "position": position.as_str(),
                "candidate_id": *candidate_id,
            };
            let update = doc! { "$inc": { "votes": 1 } };
            totals
                .update_one_with_session(filter, update, upsert.clone(), session)
                .await
                .map_err(|err| Self::ballot_error(ballot, err))?;
        }
        Ok(())
    }

    /// Map a failed ballot transaction to the store-level error.
    fn ballot_error(ballot: &Ballot, err: DbError) -> StoreError {
        if is_duplicate_key_error(&err) {
            StoreError::DuplicateBallot {
                voter: ballot.voter_id,
                election: ballot.election_id,
            }
        } else if is_transient_error(&err) {
            StoreError::Transient(err.to_string())
        } else {
            StoreError::Db(err)
        }
    }
}

#[rocket::async_trait]
impl Store for MongoStore {
    async fn next_id(&self, kind: IdKind) -> StoreResult<u32> {
        Ok(Counter::next(&self.coll(), kind).await?)
    }

    async fn election(&self, id: ElectionId) -> StoreResult<Option<Election>> {
        Ok(self.coll::<Election>().find_one(doc! {"id": id}, None).await?)
    }

    async fn elections(&self) -> StoreResult<Vec<Election>> {
        self.find_all(None).await
    }

    async fn put_election(&self, election: &Election) -> StoreResult<()> {
        self.replace(election.id, election).await
    }

    async fn delete_election(&self, id: ElectionId) -> StoreResult<bool> {
        let mut session = self.client.start_session(None).await?;
        session.start_transaction(None).await?;

        let deleted = self
            .coll::<Election>()
            .delete_one_with_session(doc! {"id": id}, None, &mut session)
            .await?
            .deleted_count;
        self.coll::<Candidate>()
            .delete_many_with_session(doc! {"election_id": id}, None, &mut session)
            .await?;

        session.commit_transaction().await?;
        Ok(deleted > 0)
    }

    async fn candidate(&self, id: CandidateId) -> StoreResult<Option<Candidate>> {
        Ok(self.coll::<Candidate>().find_one(doc! {"id": id}, None).await?)
    }

    async fn candidates(
        &self,
        election: ElectionId,
        position: Option<&str>,
    ) -> StoreResult<Vec<Candidate>> {
        let mut filter = doc! {"election_id": election};
        if let Some(position) = position {
            filter.insert("position", position);
        }
        self.find_all(filter).await
    }

    async fn all_candidates(&self) -> StoreResult<Vec<Candidate>> {
        self.find_all(None).await
    }

    async fn put_candidate(&self, candidate: &Candidate) -> StoreResult<()> {
        self.replace(candidate.id, candidate).await
    }

    async fn delete_candidate(&self, id: CandidateId) -> StoreResult<bool> {
        let result = self
            .coll::<Candidate>()
            .delete_one(doc! {"id": id}, None)
            .await?;
        Ok(result.deleted_count > 0)
    }

    async fn ballot(&self, voter: UserId, election: ElectionId) -> StoreResult<Option<Ballot>> {
        let filter = doc! {"voter_id": voter, "election_id": election};
        Ok(self.coll::<Ballot>().find_one(filter, None).await?)
    }

    async fn ballots(&self, election: ElectionId) -> StoreResult<Vec<Ballot>> {
        let options = FindOptions::builder().sort(doc! {"voter_id": 1}).build();
        let ballots = self
            .coll::<Ballot>()
            .find(doc! {"election_id": election}, options)
            .await?
            .try_collect()
            .await?;
        Ok(ballots)
    }

    async fn count_ballots(&self, election: Option<ElectionId>) -> StoreResult<u64> {
        let filter = election.map(|id| doc! {"election_id": id});
        Ok(self.coll::<Ballot>().count_documents(filter, None).await?)
    }

    async fn insert_ballot(&self, ballot: &Ballot) -> StoreResult<()> {
        let mut session = self.client.start_session(None).await?;
        session.start_transaction(None).await?;

        if let Err(err) = self.write_ballot(ballot, &mut session).await {
            // The server may already have aborted the transaction.
            if let Err(abort) = session.abort_transaction().await {
                debug!("Abort after failed ballot write: {abort}");
            }
            return Err(err);
        }

        session.commit_transaction().await.map_err(|err| {
            warn!(
                "Commit failed for voter {} in election {}: {err}",
                ballot.voter_id, ballot.election_id
            );
            Self::ballot_error(ballot, err)
        })
    }

    async fn candidate_totals(&self, election: ElectionId) -> StoreResult<Vec<CandidateTotal>> {
        let totals = self
            .coll::<CandidateTotal>()
            .find(doc! {"election_id": election}, None)
            .await?
            .try_collect()
            .await?;
        Ok(totals)
    }

    async fn user(&self, id: UserId) -> StoreResult<Option<User>> {
        Ok(self.coll::<User>().find_one(doc! {"id": id}, None).await?)
    }

    async fn user_by_matric(&self, matric_number: &str) -> StoreResult<Option<User>> {
        let filter = doc! {"matric_number": matric_number};
        Ok(self.coll::<User>().find_one(filter, None).await?)
    }

    async fn users(&self) -> StoreResult<Vec<User>> {
        self.find_all(None).await
    }

    async fn insert_user(&self, user: &User) -> StoreResult<()> {
        match self.coll::<User>().insert_one(user, None).await {
            Ok(_) => Ok(()),
            Err(err) if is_duplicate_key_error(&err) => {
                Err(StoreError::DuplicateMatric(user.matric_number.clone()))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn put_user(&self, user: &User) -> StoreResult<()> {
        self.replace(user.id, user).await
    }

    async fn insert_audit_entry(&self, entry: &AuditEntry) -> StoreResult<()> {
        self.coll::<AuditEntry>().insert_one(entry, None).await?;
        Ok(())
    }

    async fn audit_entries(&self) -> StoreResult<Vec<AuditEntry>> {
        self.find_all(None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::Utc;

    use crate::model::election::ElectionSpec;

    fn ballot(voter_id: UserId, candidate: CandidateId) -> Ballot {
        Ballot {
            voter_id,
            election_id: 1,
            selections: [("President".to_string(), candidate)].into_iter().collect(),
            cast_at: Utc::now(),
        }
    }

    #[backend_test(mongodb)]
    #[ignore = "needs a MongoDB replica set"]
    async fn ballot_and_counters_commit_together(store: MongoStore) {
        store
            .put_election(&ElectionSpec::current_example().into_election(1))
            .await
            .unwrap();
        let mut closed = ElectionSpec::current_example().into_election(2);
        closed.close(Utc::now()).unwrap();
        store.put_election(&closed).await.unwrap();

        let mut late = ballot(1, 10);
        late.election_id = 2;
        assert!(matches!(
            store.insert_ballot(&late).await,
            Err(StoreError::ElectionNotActive { election: 2, .. })
        ));

        store.insert_ballot(&ballot(1, 10)).await.unwrap();
        store.insert_ballot(&ballot(2, 10)).await.unwrap();

        let err = store.insert_ballot(&ballot(1, 11)).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateBallot { voter: 1, .. }));

        assert_eq!(store.count_ballots(Some(1)).await.unwrap(), 2);
        let totals = store.candidate_totals(1).await.unwrap();
        assert_eq!(totals.len(), 1);
        assert_eq!(totals[0].candidate_id, 10);
        assert_eq!(totals[0].votes, 2);
    }

    #[backend_test(mongodb)]
    #[ignore = "needs a MongoDB replica set"]
    async fn users_round_trip(store: MongoStore) {
        let user = User::student_example(7);
        store.insert_user(&user).await.unwrap();
        assert_eq!(store.user(7).await.unwrap(), Some(user.clone()));
        assert_eq!(
            store.user_by_matric(&user.matric_number).await.unwrap(),
            Some(user.clone())
        );

        let mut clash = user.clone();
        clash.id = 8;
        assert!(matches!(
            store.insert_user(&clash).await,
            Err(StoreError::DuplicateMatric(_))
        ));

        let mut updated = user;
        updated.is_verified = false;
        store.put_user(&updated).await.unwrap();
        // The administrator account is created when the rocket ignites.
        let users = store.users().await.unwrap();
        assert_eq!(users.len(), 2);
        assert_eq!(users.last(), Some(&updated));
    }
}
