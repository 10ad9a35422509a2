use chrono::Utc;
use log::info;
use rocket::{serde::json::Json, Route};

use crate::{
    error::{Error, Result},
    model::{
        api::{ElectionResults, ElectionView, PositionSlate},
        common::{ElectionId, IdKind},
        election::ElectionStatus,
        user::{Registration, User},
    },
    store::Storage,
    voting,
};

pub fn routes() -> Vec<Route> {
    routes![elections, election, candidates, results_non_admin, register]
}

#[get("/elections")]
async fn elections(store: Storage) -> Result<Json<Vec<ElectionView>>> {
    let now = Utc::now();
    let views = store
        .elections()
        .await?
        .into_iter()
        .map(|election| ElectionView::at(election, now))
        .collect();
    Ok(Json(views))
}

#[get("/elections/<election_id>")]
async fn election(election_id: ElectionId, store: Storage) -> Result<Json<ElectionView>> {
    let election = voting::find_election(&*store, election_id).await?;
    Ok(Json(ElectionView::at(election, Utc::now())))
}

#[get("/elections/<election_id>/candidates")]
async fn candidates(election_id: ElectionId, store: Storage) -> Result<Json<Vec<PositionSlate>>> {
    let election = voting::find_election(&*store, election_id).await?;
    let candidates = store.candidates(election_id, None).await?;
    Ok(Json(PositionSlate::group(&election, &candidates)))
}

/// Results are public once an election has closed.
#[get("/elections/<election_id>/results", rank = 2)]
async fn results_non_admin(election_id: ElectionId, store: Storage) -> Result<Json<ElectionResults>> {
    let now = Utc::now();
    let election = voting::find_election(&*store, election_id).await?;
    match election.status_at(now) {
        ElectionStatus::Closed => Ok(Json(
            voting::election_results(&*store, election_id, now).await?,
        )),
        status => Err(Error::Forbidden(format!(
            "Results of election {election_id} are not available while it is {status}"
        ))),
    }
}

#[post("/register", data = "<registration>", format = "json")]
async fn register(registration: Json<Registration>, store: Storage) -> Result<Json<User>> {
    registration.validate()?;
    let id = store.next_id(IdKind::User).await?;
    let user = registration.0.into_student(id);
    store.insert_user(&user).await?;
    info!("Registered student {} as user {id}", user.matric_number);
    Ok(Json(user))
}
