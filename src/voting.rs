//! Ballot submission and result computation on top of a [`Store`].

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::model::{
    api::{ElectionResults, ElectionView, SystemStats},
    ballot::{self, Ballot, BallotError, Selections},
    common::{ElectionId, UserId},
    election::{Election, ElectionStatus},
    tally::{percentage, tally, tally_from_totals},
    user::{Role, User},
};
use crate::store::{Store, StoreError};

/// Get an election or fail with [`Error::NotFound`].
pub async fn find_election(store: &dyn Store, id: ElectionId) -> Result<Election> {
    store
        .election(id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Election {id}")))
}

/// Cast `voter`'s ballot in an election.
///
/// The ballot is validated against the election's current state, then stored
/// together with its counter increments as one atomic unit. If the store
/// reports a transient conflict the whole operation, validation included, is
/// retried up to `retry_limit` more times before giving up with
/// [`Error::Conflict`]. A conflicted write that turns out to have been stored
/// after all counts as accepted.
pub async fn submit_ballot(
    store: &dyn Store,
    retry_limit: u32,
    election_id: ElectionId,
    voter: &User,
    selections: Selections,
    now: DateTime<Utc>,
) -> Result<Ballot> {
    if !voter.can_vote() {
        return Err(Error::Forbidden(format!(
            "User {} is not an active, verified student",
            voter.id
        )));
    }

    let mut attempt = 0;
    // The last ballot the store reported as conflicted. Its write may still
    // have landed if only the acknowledgement was lost.
    let mut unacknowledged: Option<Ballot> = None;
    loop {
        let election = find_election(store, election_id).await?;
        let candidates = store.candidates(election_id, None).await?;
        let existing = store.ballot(voter.id, election_id).await?;
        if let Some(ballot) = landed(existing.as_ref(), unacknowledged.as_ref()) {
            return Ok(ballot);
        }

        let ballot = ballot::validate(
            &election,
            &candidates,
            existing.is_some(),
            voter.id,
            selections.clone(),
            now,
        )
        .map_err(|err| {
            info!(
                "Rejected ballot from voter {} in election {election_id}: {}",
                voter.id,
                err.kind()
            );
            err
        })?;

        match store.insert_ballot(&ballot).await {
            Ok(()) => {
                info!(
                    "Accepted ballot from voter {} in election {election_id} ({} selections)",
                    voter.id,
                    ballot.selections.len()
                );
                return Ok(ballot);
            }
            Err(StoreError::DuplicateBallot { .. }) => {
                info!(
                    "Rejected concurrent duplicate ballot from voter {} in election {election_id}",
                    voter.id
                );
                return Err(BallotError::AlreadyVoted.into());
            }
            Err(StoreError::ElectionNotActive { status, .. }) => {
                info!(
                    "Rejected ballot from voter {} in election {election_id}: became {status}",
                    voter.id
                );
                return Err(BallotError::ElectionNotActive(status).into());
            }
            Err(StoreError::Transient(reason)) if attempt < retry_limit => {
                attempt += 1;
                warn!("Retrying ballot for voter {} ({attempt}/{retry_limit}): {reason}", voter.id);
                unacknowledged = Some(ballot);
            }
            Err(StoreError::Transient(reason)) => {
                let existing = store.ballot(voter.id, election_id).await?;
                if let Some(ballot) = landed(existing.as_ref(), Some(&ballot)) {
                    return Ok(ballot);
                }
                error!(
                    "Giving up on ballot for voter {} after {attempt} retries: {reason}",
                    voter.id
                );
                return Err(Error::Conflict(format!(
                    "Ballot could not be recorded after {} attempts, please try again",
                    attempt + 1
                )));
            }
            Err(err) => return Err(err.into()),
        }
    }
}

/// The stored ballot, if it is exactly the one an earlier unacknowledged
/// attempt tried to write.
fn landed(stored: Option<&Ballot>, attempted: Option<&Ballot>) -> Option<Ballot> {
    match (stored, attempted) {
        (Some(stored), Some(attempted)) if stored == attempted => {
            info!(
                "Ballot from voter {} in election {} was recorded by an earlier attempt",
                stored.voter_id, stored.election_id
            );
            Some(stored.clone())
        }
        _ => None,
    }
}

/// Compute the full results of an election.
///
/// The tally is recomputed from the stored ballots. The incremental counters
/// are compared against it and any disagreement is logged.
pub async fn election_results(
    store: &dyn Store,
    election_id: ElectionId,
    now: DateTime<Utc>,
) -> Result<ElectionResults> {
    let election = find_election(store, election_id).await?;
    let candidates = store.candidates(election_id, None).await?;
    let ballots = store.ballots(election_id).await?;

    let positions = tally(&election, &candidates, &ballots);
    let totals = store.candidate_totals(election_id).await?;
    if tally_from_totals(&election, &candidates, &totals) != positions {
        error!("Vote counters for election {election_id} disagree with its ballots");
    } else {
        debug!("Vote counters for election {election_id} agree with its ballots");
    }

    let eligible: HashSet<UserId> = store
        .users()
        .await?
        .into_iter()
        .filter(User::can_vote)
        .map(|u| u.id)
        .collect();
    let eligible_ballots = ballots
        .iter()
        .filter(|b| eligible.contains(&b.voter_id))
        .count() as u64;
    let eligible_voters = eligible.len() as u64;
    Ok(ElectionResults {
        election: ElectionView::at(election, now),
        ballots_cast: ballots.len() as u64,
        eligible_voters,
        turnout: percentage(eligible_ballots, eligible_voters),
        positions,
    })
}

/// Compute the system-wide statistics.
pub async fn system_stats(store: &dyn Store, now: DateTime<Utc>) -> Result<SystemStats> {
    let elections = store.elections().await?;
    let active_elections = elections
        .iter()
        .filter(|e| e.status_at(now) == ElectionStatus::Active)
        .count();
    let total_voters = store
        .users()
        .await?
        .iter()
        .filter(|u| u.role == Role::Student)
        .count();
    Ok(SystemStats {
        total_elections: elections.len() as u64,
        active_elections: active_elections as u64,
        total_voters: total_voters as u64,
        total_votes: store.count_ballots(None).await?,
    })
}
