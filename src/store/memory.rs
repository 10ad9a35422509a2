use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

#[cfg(test)]
use std::sync::atomic::{AtomicU32, Ordering};

use rocket::tokio::sync::Mutex;

use crate::model::{
    audit::AuditEntry,
    ballot::Ballot,
    candidate::Candidate,
    common::{AuditId, CandidateId, ElectionId, IdKind, PositionName, UserId},
    election::{Election, ElectionStatus},
    tally::CandidateTotal,
    user::User,
};

use super::{Store, StoreError, StoreResult};

/// Everything the in-memory store holds, guarded by a single lock.
#[derive(Default)]
struct Tables {
    counters: HashMap<IdKind, u32>,
    elections: BTreeMap<ElectionId, Election>,
    candidates: BTreeMap<CandidateId, Candidate>,
    ballots: HashMap<(UserId, ElectionId), Ballot>,
    totals: BTreeMap<(ElectionId, PositionName, CandidateId), u64>,
    users: BTreeMap<UserId, User>,
    audit_log: BTreeMap<AuditId, AuditEntry>,
}

/// A store living entirely in process memory.
///
/// Cloning gives another handle on the same data. Every operation holds the
/// one lock for its whole duration, so a ballot insert and its counter
/// increments are trivially atomic.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
    #[cfg(test)]
    transient_failures: Arc<AtomicU32>,
    #[cfg(test)]
    lost_acknowledgements: Arc<AtomicU32>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` ballot inserts fail with a transient conflict.
    #[cfg(test)]
    pub(crate) fn fail_next_inserts(&self, n: u32) {
        self.transient_failures.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` ballot inserts succeed but report a transient
    /// conflict, as when a commit acknowledgement is lost.
    #[cfg(test)]
    pub(crate) fn lose_next_acknowledgements(&self, n: u32) {
        self.lost_acknowledgements.store(n, Ordering::SeqCst);
    }

    #[cfg(test)]
    fn take_transient_failure(&self) -> bool {
        take_one(&self.transient_failures)
    }

    #[cfg(test)]
    fn take_lost_acknowledgement(&self) -> bool {
        take_one(&self.lost_acknowledgements)
    }

    #[cfg(not(test))]
    fn take_transient_failure(&self) -> bool {
        false
    }

    #[cfg(not(test))]
    fn take_lost_acknowledgement(&self) -> bool {
        false
    }
}

#[cfg(test)]
fn take_one(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[rocket::async_trait]
impl Store for MemoryStore {
    async fn next_id(&self, kind: IdKind) -> StoreResult<u32> {
        let mut tables = self.tables.lock().await;
        let counter = tables.counters.entry(kind).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }

    async fn election(&self, id: ElectionId) -> StoreResult<Option<Election>> {
        Ok(self.tables.lock().await.elections.get(&id).cloned())
    }

    async fn elections(&self) -> StoreResult<Vec<Election>> {
        Ok(self.tables.lock().await.elections.values().cloned().collect())
    }

    async fn put_election(&self, election: &Election) -> StoreResult<()> {
        self.tables
            .lock()
            .await
            .elections
            .insert(election.id, election.clone());
        Ok(())
    }

    async fn delete_election(&self, id: ElectionId) -> StoreResult<bool> {
        let mut tables = self.tables.lock().await;
        let existed = tables.elections.remove(&id).is_some();
        tables.candidates.retain(|_, c| c.election_id != id);
        Ok(existed)
    }

    async fn candidate(&self, id: CandidateId) -> StoreResult<Option<Candidate>> {
        Ok(self.tables.lock().await.candidates.get(&id).cloned())
    }

    async fn candidates(
        &self,
        election: ElectionId,
        position: Option<&str>,
    ) -> StoreResult<Vec<Candidate>> {
        Ok(self
            .tables
            .lock()
            .await
            .candidates
            .values()
            .filter(|c| c.election_id == election)
            .filter(|c| position.map_or(true, |p| c.position == p))
            .cloned()
            .collect())
    }

    async fn all_candidates(&self) -> StoreResult<Vec<Candidate>> {
        Ok(self.tables.lock().await.candidates.values().cloned().collect())
    }

    async fn put_candidate(&self, candidate: &Candidate) -> StoreResult<()> {
        self.tables
            .lock()
            .await
            .candidates
            .insert(candidate.id, candidate.clone());
        Ok(())
    }

    async fn delete_candidate(&self, id: CandidateId) -> StoreResult<bool> {
        Ok(self.tables.lock().await.candidates.remove(&id).is_some())
    }

    async fn ballot(&self, voter: UserId, election: ElectionId) -> StoreResult<Option<Ballot>> {
        Ok(self
            .tables
            .lock()
            .await
            .ballots
            .get(&(voter, election))
            .cloned())
    }

    async fn ballots(&self, election: ElectionId) -> StoreResult<Vec<Ballot>> {
        let tables = self.tables.lock().await;
        let mut ballots: Vec<Ballot> = tables
            .ballots
            .values()
            .filter(|b| b.election_id == election)
            .cloned()
            .collect();
        ballots.sort_by_key(|b| b.voter_id);
        Ok(ballots)
    }

    async fn count_ballots(&self, election: Option<ElectionId>) -> StoreResult<u64> {
        let tables = self.tables.lock().await;
        let count = match election {
            Some(id) => tables.ballots.keys().filter(|(_, e)| *e == id).count(),
            None => tables.ballots.len(),
        };
        Ok(count as u64)
    }

    async fn insert_ballot(&self, ballot: &Ballot) -> StoreResult<()> {
        let mut tables = self.tables.lock().await;
        if self.take_transient_failure() {
            return Err(StoreError::Transient(format!(
                "simulated conflict for voter {} in election {}",
                ballot.voter_id, ballot.election_id
            )));
        }
        let key = (ballot.voter_id, ballot.election_id);
        if tables.ballots.contains_key(&key) {
            return Err(StoreError::DuplicateBallot {
                voter: ballot.voter_id,
                election: ballot.election_id,
            });
        }
        let status = tables
            .elections
            .get(&ballot.election_id)
            .map_or(ElectionStatus::Closed, |e| e.status_at(ballot.cast_at));
        if status != ElectionStatus::Active {
            return Err(StoreError::ElectionNotActive {
                election: ballot.election_id,
                status,
            });
        }
        for (position, &candidate_id) in &ballot.selections {
            *tables
                .totals
                .entry((ballot.election_id, position.clone(), candidate_id))
                .or_insert(0) += 1;
        }
        tables.ballots.insert(key, ballot.clone());
        if self.take_lost_acknowledgement() {
            return Err(StoreError::Transient(format!(
                "simulated lost acknowledgement for voter {} in election {}",
                ballot.voter_id, ballot.election_id
            )));
        }
        Ok(())
    }

    async fn candidate_totals(&self, election: ElectionId) -> StoreResult<Vec<CandidateTotal>> {
        Ok(self
            .tables
            .lock()
            .await
            .totals
            .iter()
            .filter(|((election_id, _, _), _)| *election_id == election)
            .map(|((election_id, position, candidate_id), votes)| CandidateTotal {
                election_id: *election_id,
                position: position.clone(),
                candidate_id: *candidate_id,
                votes: *votes,
            })
            .collect())
    }

    async fn user(&self, id: UserId) -> StoreResult<Option<User>> {
        Ok(self.tables.lock().await.users.get(&id).cloned())
    }

    async fn user_by_matric(&self, matric_number: &str) -> StoreResult<Option<User>> {
        Ok(self
            .tables
            .lock()
            .await
            .users
            .values()
            .find(|u| u.matric_number == matric_number)
            .cloned())
    }

    async fn users(&self) -> StoreResult<Vec<User>> {
        Ok(self.tables.lock().await.users.values().cloned().collect())
    }

    async fn insert_user(&self, user: &User) -> StoreResult<()> {
        let mut tables = self.tables.lock().await;
        if tables
            .users
            .values()
            .any(|u| u.matric_number == user.matric_number)
        {
            return Err(StoreError::DuplicateMatric(user.matric_number.clone()));
        }
        tables.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn put_user(&self, user: &User) -> StoreResult<()> {
        self.tables.lock().await.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn insert_audit_entry(&self, entry: &AuditEntry) -> StoreResult<()> {
        self.tables
            .lock()
            .await
            .audit_log
            .insert(entry.id, entry.clone());
        Ok(())
    }

    async fn audit_entries(&self) -> StoreResult<Vec<AuditEntry>> {
        Ok(self.tables.lock().await.audit_log.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::Utc;
    use rocket::tokio;

    use crate::model::{audit::AuditNote, election::ElectionSpec};

    /// A store holding active elections with IDs `1..=n`.
    async fn with_active_elections(n: ElectionId) -> MemoryStore {
        let store = MemoryStore::new();
        for id in 1..=n {
            store
                .put_election(&ElectionSpec::current_example().into_election(id))
                .await
                .unwrap();
        }
        store
    }

    fn ballot(voter_id: UserId, election_id: ElectionId, candidate: CandidateId) -> Ballot {
        Ballot {
            voter_id,
            election_id,
            selections: [("President".to_string(), candidate)].into_iter().collect(),
            cast_at: Utc::now(),
        }
    }

    #[rocket::async_test]
    async fn ids_are_allocated_per_kind() {
        let store = MemoryStore::new();
        assert_eq!(store.next_id(IdKind::Election).await.unwrap(), 1);
        assert_eq!(store.next_id(IdKind::Election).await.unwrap(), 2);
        assert_eq!(store.next_id(IdKind::Candidate).await.unwrap(), 1);
    }

    #[rocket::async_test]
    async fn duplicate_ballot_leaves_counters_alone() {
        let store = with_active_elections(2).await;
        store.insert_ballot(&ballot(1, 1, 10)).await.unwrap();
        let err = store.insert_ballot(&ballot(1, 1, 11)).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::DuplicateBallot {
                voter: 1,
                election: 1
            }
        ));

        let totals = store.candidate_totals(1).await.unwrap();
        assert_eq!(totals.len(), 1);
        assert_eq!(totals[0].candidate_id, 10);
        assert_eq!(totals[0].votes, 1);
        // The same voter may still vote in another election.
        store.insert_ballot(&ballot(1, 2, 11)).await.unwrap();
        assert_eq!(store.count_ballots(None).await.unwrap(), 2);
        assert_eq!(store.count_ballots(Some(1)).await.unwrap(), 1);
    }

    #[rocket::async_test]
    async fn transient_failure_writes_nothing() {
        let store = with_active_elections(1).await;
        store.fail_next_inserts(1);
        assert!(matches!(
            store.insert_ballot(&ballot(1, 1, 10)).await,
            Err(StoreError::Transient(_))
        ));
        assert!(store.ballot(1, 1).await.unwrap().is_none());
        assert!(store.candidate_totals(1).await.unwrap().is_empty());
        store.insert_ballot(&ballot(1, 1, 10)).await.unwrap();
    }

    #[rocket::async_test]
    async fn concurrent_inserts_lose_no_increments() {
        let store = with_active_elections(1).await;
        let handles: Vec<_> = (1..=50)
            .map(|voter| {
                let store = store.clone();
                tokio::spawn(async move { store.insert_ballot(&ballot(voter, 1, 10)).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        let totals = store.candidate_totals(1).await.unwrap();
        assert_eq!(totals[0].votes, 50);
    }

    #[rocket::async_test]
    async fn matric_numbers_are_unique() {
        let store = MemoryStore::new();
        store.insert_user(&User::student_example(1)).await.unwrap();
        let mut clash = User::student_example(1);
        clash.id = 2;
        assert!(matches!(
            store.insert_user(&clash).await,
            Err(StoreError::DuplicateMatric(_))
        ));
        assert_eq!(store.users().await.unwrap().len(), 1);
    }

    #[rocket::async_test]
    async fn deleting_an_election_removes_its_candidates() {
        use crate::model::{candidate::CandidateSpec, election::ElectionSpec};

        let store = MemoryStore::new();
        store
            .put_election(&ElectionSpec::future_example().into_election(1))
            .await
            .unwrap();
        store
            .put_candidate(&CandidateSpec::example(1, "A", "President").into_candidate(1))
            .await
            .unwrap();
        store
            .put_candidate(&CandidateSpec::example(2, "B", "President").into_candidate(2))
            .await
            .unwrap();

        assert!(store.delete_election(1).await.unwrap());
        assert!(!store.delete_election(1).await.unwrap());
        let remaining = store.all_candidates().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].election_id, 2);
    }

    #[rocket::async_test]
    async fn ballots_for_inactive_elections_are_refused() {
        let store = with_active_elections(1).await;
        let mut closed = ElectionSpec::current_example().into_election(2);
        closed.close(Utc::now()).unwrap();
        store.put_election(&closed).await.unwrap();

        assert!(matches!(
            store.insert_ballot(&ballot(1, 2, 10)).await,
            Err(StoreError::ElectionNotActive {
                election: 2,
                status: ElectionStatus::Closed
            })
        ));
        assert!(matches!(
            store.insert_ballot(&ballot(1, 3, 10)).await,
            Err(StoreError::ElectionNotActive { election: 3, .. })
        ));
        assert_eq!(store.count_ballots(None).await.unwrap(), 0);
        assert!(store.candidate_totals(2).await.unwrap().is_empty());
    }

    #[rocket::async_test]
    async fn audit_log_is_kept_in_order() {
        let store = MemoryStore::new();
        for (id, action) in [(2, "second"), (1, "first")] {
            let entry = AuditNote::new(action, "").into_entry(id, 1, Utc::now());
            store.insert_audit_entry(&entry).await.unwrap();
        }
        let actions: Vec<_> = store
            .audit_entries()
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.action)
            .collect();
        assert_eq!(actions, vec!["first", "second"]);
    }
}
