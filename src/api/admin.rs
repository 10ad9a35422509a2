use chrono::Utc;
use log::{info, warn};
use rocket::{serde::json::Json, Route};

use crate::{
    error::{Error, Result},
    model::{
        api::{ElectionResults, ElectionView, SystemStats},
        audit::{actions, AuditEntry, AuditNote},
        auth::{Admin, AuthToken},
        candidate::{Candidate, CandidateSpec},
        common::{CandidateId, ElectionId, IdKind, UserId},
        election::ElectionSpec,
        user::{Role, User},
    },
    store::{Storage, Store},
    voting,
};

use super::load_user;

pub fn routes() -> Vec<Route> {
    routes![
        current_admin,
        create_election,
        modify_election,
        close_election,
        delete_election,
        results_admin,
        get_candidates,
        create_candidate,
        get_candidate,
        modify_candidate,
        delete_candidate,
        get_users,
        get_user,
        verify_user,
        deactivate_user,
        stats,
        get_logs,
        create_log,
    ]
}

/// Append an entry to the activity log on behalf of `token`'s admin.
async fn record(store: &dyn Store, token: &AuthToken<Admin>, note: AuditNote) -> Result<AuditEntry> {
    let id = store.next_id(IdKind::AuditEntry).await?;
    let entry = note.into_entry(id, token.id(), Utc::now());
    store.insert_audit_entry(&entry).await?;
    Ok(entry)
}

#[get("/user", rank = 1)]
async fn current_admin(token: AuthToken<Admin>, store: Storage) -> Result<Json<User>> {
    Ok(Json(load_user(&*store, token.id()).await?))
}

#[post("/elections", data = "<spec>", format = "json")]
async fn create_election(
    token: AuthToken<Admin>,
    spec: Json<ElectionSpec>,
    store: Storage,
) -> Result<Json<ElectionView>> {
    let now = Utc::now();
    spec.validate()?;
    spec.ensure_starts_after(now)?;
    let election = spec.0.into_election(store.next_id(IdKind::Election).await?);
    store.put_election(&election).await?;
    info!("Created election {} '{}'", election.id, election.name);
    let details = format!("Election {} '{}'", election.id, election.name);
    record(&*store, &token, AuditNote::new(actions::CREATE_ELECTION, details)).await?;
    Ok(Json(ElectionView::at(election, now)))
}

#[put("/elections/<election_id>", data = "<spec>", format = "json")]
async fn modify_election(
    token: AuthToken<Admin>,
    election_id: ElectionId,
    spec: Json<ElectionSpec>,
    store: Storage,
) -> Result<Json<ElectionView>> {
    let now = Utc::now();
    let mut election = voting::find_election(&*store, election_id).await?;
    election.ensure_editable(now)?;
    spec.validate()?;
    spec.ensure_starts_after(now)?;

    // Positions may only be dropped once nobody is standing for them.
    let candidates = store.candidates(election_id, None).await?;
    if let Some(orphan) = candidates
        .iter()
        .find(|c| !spec.positions.contains(&c.position))
    {
        return Err(Error::BadRequest(format!(
            "Position '{}' still has candidates",
            orphan.position
        )));
    }

    spec.0.apply_to(&mut election);
    store.put_election(&election).await?;
    let details = format!("Election {election_id} '{}'", election.name);
    record(&*store, &token, AuditNote::new(actions::UPDATE_ELECTION, details)).await?;
    Ok(Json(ElectionView::at(election, now)))
}

#[post("/elections/<election_id>/close")]
async fn close_election(
    token: AuthToken<Admin>,
    election_id: ElectionId,
    store: Storage,
) -> Result<Json<ElectionView>> {
    let now = Utc::now();
    let mut election = voting::find_election(&*store, election_id).await?;
    election.close(now)?;
    store.put_election(&election).await?;
    warn!("Election {election_id} closed early by an administrator");
    let details = format!("Election {election_id}");
    record(&*store, &token, AuditNote::new(actions::CLOSE_ELECTION, details)).await?;
    Ok(Json(ElectionView::at(election, now)))
}

#[delete("/elections/<election_id>")]
async fn delete_election(
    token: AuthToken<Admin>,
    election_id: ElectionId,
    store: Storage,
) -> Result<()> {
    let election = voting::find_election(&*store, election_id).await?;
    election.ensure_editable(Utc::now())?;
    if !store.delete_election(election_id).await? {
        return Err(Error::NotFound(format!("Election {election_id}")));
    }
    info!("Deleted election {election_id}");
    let details = format!("Election {election_id} '{}'", election.name);
    record(&*store, &token, AuditNote::new(actions::DELETE_ELECTION, details)).await?;
    Ok(())
}

#[get("/elections/<election_id>/results", rank = 1)]
async fn results_admin(
    _token: AuthToken<Admin>,
    election_id: ElectionId,
    store: Storage,
) -> Result<Json<ElectionResults>> {
    Ok(Json(
        voting::election_results(&*store, election_id, Utc::now()).await?,
    ))
}

#[get("/candidates")]
async fn get_candidates(_token: AuthToken<Admin>, store: Storage) -> Result<Json<Vec<Candidate>>> {
    Ok(Json(store.all_candidates().await?))
}

async fn find_candidate(store: &dyn Store, candidate_id: CandidateId) -> Result<Candidate> {
    store
        .candidate(candidate_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Candidate {candidate_id}")))
}

#[post("/candidates", data = "<spec>", format = "json")]
async fn create_candidate(
    token: AuthToken<Admin>,
    spec: Json<CandidateSpec>,
    store: Storage,
) -> Result<Json<Candidate>> {
    let election = voting::find_election(&*store, spec.election_id).await?;
    election.ensure_editable(Utc::now())?;
    spec.validate(&election)?;

    let candidate = spec.0.into_candidate(store.next_id(IdKind::Candidate).await?);
    store.put_candidate(&candidate).await?;
    info!(
        "Added candidate {} for '{}' in election {}",
        candidate.id, candidate.position, candidate.election_id
    );
    let details = format!(
        "Candidate {} '{}' for '{}' in election {}",
        candidate.id, candidate.name, candidate.position, candidate.election_id
    );
    record(&*store, &token, AuditNote::new(actions::CREATE_CANDIDATE, details)).await?;
    Ok(Json(candidate))
}

#[get("/candidates/<candidate_id>")]
async fn get_candidate(
    _token: AuthToken<Admin>,
    candidate_id: CandidateId,
    store: Storage,
) -> Result<Json<Candidate>> {
    Ok(Json(find_candidate(&*store, candidate_id).await?))
}

#[put("/candidates/<candidate_id>", data = "<spec>", format = "json")]
async fn modify_candidate(
    token: AuthToken<Admin>,
    candidate_id: CandidateId,
    spec: Json<CandidateSpec>,
    store: Storage,
) -> Result<Json<Candidate>> {
    let existing = find_candidate(&*store, candidate_id).await?;
    let election = voting::find_election(&*store, existing.election_id).await?;
    election.ensure_editable(Utc::now())?;
    spec.validate(&election)?;

    let candidate = spec.0.into_candidate(candidate_id);
    store.put_candidate(&candidate).await?;
    let details = format!("Candidate {candidate_id} '{}'", candidate.name);
    record(&*store, &token, AuditNote::new(actions::UPDATE_CANDIDATE, details)).await?;
    Ok(Json(candidate))
}

#[delete("/candidates/<candidate_id>")]
async fn delete_candidate(
    token: AuthToken<Admin>,
    candidate_id: CandidateId,
    store: Storage,
) -> Result<()> {
    let candidate = find_candidate(&*store, candidate_id).await?;
    let election = voting::find_election(&*store, candidate.election_id).await?;
    election.ensure_editable(Utc::now())?;
    store.delete_candidate(candidate_id).await?;
    info!("Removed candidate {candidate_id} from election {}", election.id);
    let details = format!("Candidate {candidate_id} '{}'", candidate.name);
    record(&*store, &token, AuditNote::new(actions::DELETE_CANDIDATE, details)).await?;
    Ok(())
}

#[get("/users")]
async fn get_users(_token: AuthToken<Admin>, store: Storage) -> Result<Json<Vec<User>>> {
    Ok(Json(store.users().await?))
}

#[get("/users/<user_id>")]
async fn get_user(_token: AuthToken<Admin>, user_id: UserId, store: Storage) -> Result<Json<User>> {
    Ok(Json(load_user(&*store, user_id).await?))
}

#[post("/users/<user_id>/verify")]
async fn verify_user(
    token: AuthToken<Admin>,
    user_id: UserId,
    store: Storage,
) -> Result<Json<User>> {
    let mut user = load_user(&*store, user_id).await?;
    user.is_verified = true;
    store.put_user(&user).await?;
    info!("Verified user {user_id}");
    let details = format!("User {user_id} ({})", user.matric_number);
    record(&*store, &token, AuditNote::new(actions::VERIFY_USER, details)).await?;
    Ok(Json(user))
}

#[post("/users/<user_id>/deactivate")]
async fn deactivate_user(
    token: AuthToken<Admin>,
    user_id: UserId,
    store: Storage,
) -> Result<Json<User>> {
    let mut user = load_user(&*store, user_id).await?;
    if user.role == Role::Admin {
        return Err(Error::BadRequest(
            "The administrator account cannot be deactivated".to_string(),
        ));
    }
    user.is_active = false;
    store.put_user(&user).await?;
    warn!("Deactivated user {user_id}");
    let details = format!("User {user_id} ({})", user.matric_number);
    record(&*store, &token, AuditNote::new(actions::DEACTIVATE_USER, details)).await?;
    Ok(Json(user))
}

#[get("/stats")]
async fn stats(_token: AuthToken<Admin>, store: Storage) -> Result<Json<SystemStats>> {
    Ok(Json(voting::system_stats(&*store, Utc::now()).await?))
}

/// The activity log, newest first.
#[get("/logs")]
async fn get_logs(_token: AuthToken<Admin>, store: Storage) -> Result<Json<Vec<AuditEntry>>> {
    let mut entries = store.audit_entries().await?;
    entries.reverse();
    Ok(Json(entries))
}

#[post("/logs", data = "<note>", format = "json")]
async fn create_log(
    token: AuthToken<Admin>,
    note: Json<AuditNote>,
    store: Storage,
) -> Result<Json<AuditEntry>> {
    note.validate()?;
    Ok(Json(record(&*store, &token, note.0).await?))
}
