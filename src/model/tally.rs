use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::model::{
    ballot::Ballot,
    candidate::Candidate,
    common::{CandidateId, ElectionId, PositionName},
    election::Election,
};

/// Incrementally maintained vote counter for one candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateTotal {
    pub election_id: ElectionId,
    pub position: PositionName,
    pub candidate_id: CandidateId,
    pub votes: u64,
}

/// One candidate's result within a position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateTally {
    pub candidate_id: CandidateId,
    pub name: String,
    pub party: String,
    pub votes: u64,
    /// Share of the votes cast for this position, 0 to 100.
    pub percentage: f64,
}

/// Results for one position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionTally {
    pub position: PositionName,
    /// Votes cast for this position; abstentions are not counted.
    pub total_votes: u64,
    /// Sorted by votes descending, then candidate ID ascending.
    pub candidates: Vec<CandidateTally>,
}

/// Tally an election from its full ballot set.
///
/// This is a pure function of its inputs; recomputing it always gives the
/// same result. Positions follow the election's ballot order and every
/// candidate on the slate is listed, with zero votes if nobody chose them.
pub fn tally(election: &Election, candidates: &[Candidate], ballots: &[Ballot]) -> Vec<PositionTally> {
    let mut counts: HashMap<(PositionName, CandidateId), u64> = HashMap::new();
    for ballot in ballots.iter().filter(|b| b.election_id == election.id) {
        for (position, &candidate_id) in &ballot.selections {
            *counts.entry((position.clone(), candidate_id)).or_insert(0) += 1;
        }
    }
    build(election, candidates, &counts)
}

/// Tally an election from its incremental counters.
///
/// Produces the same result as [`tally`] whenever the counters are in step
/// with the stored ballots.
pub fn tally_from_totals(
    election: &Election,
    candidates: &[Candidate],
    totals: &[CandidateTotal],
) -> Vec<PositionTally> {
    let mut counts: HashMap<(PositionName, CandidateId), u64> = HashMap::new();
    for total in totals.iter().filter(|t| t.election_id == election.id) {
        *counts
            .entry((total.position.clone(), total.candidate_id))
            .or_insert(0) += total.votes;
    }
    build(election, candidates, &counts)
}

fn build(
    election: &Election,
    candidates: &[Candidate],
    counts: &HashMap<(PositionName, CandidateId), u64>,
) -> Vec<PositionTally> {
    election
        .positions
        .iter()
        .map(|position| {
            let mut standing: Vec<CandidateTally> = candidates
                .iter()
                .filter(|c| c.election_id == election.id && &c.position == position)
                .map(|c| CandidateTally {
                    candidate_id: c.id,
                    name: c.name.clone(),
                    party: c.party.clone(),
                    votes: counts.get(&(position.clone(), c.id)).copied().unwrap_or(0),
                    percentage: 0.0,
                })
                .collect();
            let total_votes: u64 = standing.iter().map(|c| c.votes).sum();
            for candidate in &mut standing {
                candidate.percentage = percentage(candidate.votes, total_votes);
            }
            standing.sort_by(|a, b| {
                b.votes
                    .cmp(&a.votes)
                    .then_with(|| a.candidate_id.cmp(&b.candidate_id))
            });
            PositionTally {
                position: position.clone(),
                total_votes,
                candidates: standing,
            }
        })
        .collect()
}

/// `part / whole * 100`, defining 0/0 as 0.
pub fn percentage(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 * 100.0 / whole as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::Utc;

    use crate::model::{ballot::Selections, candidate::CandidateSpec, election::ElectionSpec};

    fn setup() -> (Election, Vec<Candidate>) {
        let election = ElectionSpec::current_example().into_election(1);
        let candidates = vec![
            CandidateSpec::example(1, "B", "President").into_candidate(2),
            CandidateSpec::example(1, "A", "President").into_candidate(1),
            CandidateSpec::example(1, "C", "President").into_candidate(3),
            CandidateSpec::example(1, "D", "Vice President").into_candidate(4),
        ];
        (election, candidates)
    }

    fn ballot(voter_id: u32, pairs: &[(&str, CandidateId)]) -> Ballot {
        Ballot {
            voter_id,
            election_id: 1,
            selections: pairs
                .iter()
                .map(|(p, c)| (p.to_string(), *c))
                .collect::<Selections>(),
            cast_at: Utc::now(),
        }
    }

    fn position<'a>(results: &'a [PositionTally], name: &str) -> &'a PositionTally {
        results.iter().find(|p| p.position == name).unwrap()
    }

    #[test]
    fn empty_election_has_zero_percentages() {
        let (election, candidates) = setup();
        let results = tally(&election, &candidates, &[]);

        assert_eq!(results.len(), 3);
        for position in &results {
            assert_eq!(position.total_votes, 0);
            assert!(position.candidates.iter().all(|c| c.percentage == 0.0));
        }
        // No votes anywhere: ties are broken by candidate ID.
        let ids: Vec<_> = position(&results, "President")
            .candidates
            .iter()
            .map(|c| c.candidate_id)
            .collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert!(position(&results, "General Secretary").candidates.is_empty());
    }

    #[test]
    fn counts_sort_and_percentages() {
        let (election, candidates) = setup();
        let ballots = vec![
            ballot(1, &[("President", 3), ("Vice President", 4)]),
            ballot(2, &[("President", 3)]),
            ballot(3, &[("President", 2)]),
            ballot(4, &[("Vice President", 4)]),
        ];
        let results = tally(&election, &candidates, &ballots);

        let president = position(&results, "President");
        assert_eq!(president.total_votes, 3);
        let summary: Vec<_> = president
            .candidates
            .iter()
            .map(|c| (c.candidate_id, c.votes))
            .collect();
        assert_eq!(summary, vec![(3, 2), (2, 1), (1, 0)]);
        let sum: f64 = president.candidates.iter().map(|c| c.percentage).sum();
        assert!((sum - 100.0).abs() < 1e-9);
        assert!((president.candidates[0].percentage - 200.0 / 3.0).abs() < 1e-9);

        let vice = position(&results, "Vice President");
        assert_eq!(vice.total_votes, 2);
        assert_eq!(vice.candidates[0].percentage, 100.0);
    }

    #[test]
    fn ties_broken_by_candidate_id() {
        let (election, candidates) = setup();
        let ballots = vec![ballot(1, &[("President", 2)]), ballot(2, &[("President", 1)])];
        let results = tally(&election, &candidates, &ballots);
        let president = position(&results, "President");
        let summary: Vec<_> = president
            .candidates
            .iter()
            .map(|c| (c.candidate_id, c.votes, c.percentage))
            .collect();
        assert_eq!(summary, vec![(1, 1, 50.0), (2, 1, 50.0), (3, 0, 0.0)]);
    }

    #[test]
    fn recompute_is_idempotent() {
        let (election, candidates) = setup();
        let ballots: Vec<_> = (0..25)
            .map(|voter| ballot(voter, &[("President", 1 + voter % 3)]))
            .collect();
        let first = tally(&election, &candidates, &ballots);
        let second = tally(&election, &candidates, &ballots);
        assert_eq!(first, second);

        // Ballot order does not matter either.
        let mut reversed = ballots.clone();
        reversed.reverse();
        assert_eq!(first, tally(&election, &candidates, &reversed));
    }

    #[test]
    fn counters_agree_with_recompute() {
        let (election, candidates) = setup();
        let ballots = vec![
            ballot(1, &[("President", 1), ("Vice President", 4)]),
            ballot(2, &[("President", 3)]),
        ];
        let totals = vec![
            CandidateTotal {
                election_id: 1,
                position: "President".to_string(),
                candidate_id: 1,
                votes: 1,
            },
            CandidateTotal {
                election_id: 1,
                position: "President".to_string(),
                candidate_id: 3,
                votes: 1,
            },
            CandidateTotal {
                election_id: 1,
                position: "Vice President".to_string(),
                candidate_id: 4,
                votes: 1,
            },
        ];
        assert_eq!(
            tally(&election, &candidates, &ballots),
            tally_from_totals(&election, &candidates, &totals)
        );
    }

    #[test]
    fn percentage_of_nothing_is_zero() {
        assert_eq!(percentage(0, 0), 0.0);
        assert_eq!(percentage(1, 4), 25.0);
    }
}
