use chrono::Utc;
use rocket::{serde::json::Json, Route, State};

use crate::{
    config::Config,
    error::Result,
    model::{
        api::{VotePayload, VotedStatus},
        auth::{AuthToken, Student},
        ballot::Ballot,
        common::ElectionId,
        user::User,
    },
    store::Storage,
    voting,
};

use super::load_user;

pub fn routes() -> Vec<Route> {
    routes![vote, voted, current_student]
}

#[post("/elections/<election_id>/vote", data = "<payload>", format = "json")]
async fn vote(
    token: AuthToken<Student>,
    election_id: ElectionId,
    payload: Json<VotePayload>,
    store: Storage,
    config: &State<Config>,
) -> Result<Json<Ballot>> {
    let voter = load_user(&*store, token.id()).await?;
    let ballot = voting::submit_ballot(
        &*store,
        config.ballot_retry_limit(),
        election_id,
        &voter,
        payload.0.votes,
        Utc::now(),
    )
    .await?;
    Ok(Json(ballot))
}

#[get("/elections/<election_id>/voted")]
async fn voted(
    token: AuthToken<Student>,
    election_id: ElectionId,
    store: Storage,
) -> Result<Json<VotedStatus>> {
    voting::find_election(&*store, election_id).await?;
    let ballot = store.ballot(token.id(), election_id).await?;
    Ok(Json(VotedStatus {
        election_id,
        has_voted: ballot.is_some(),
        cast_at: ballot.map(|b| b.cast_at),
    }))
}

#[get("/user", rank = 2)]
async fn current_student(token: AuthToken<Student>, store: Storage) -> Result<Json<User>> {
    Ok(Json(load_user(&*store, token.id()).await?))
}
