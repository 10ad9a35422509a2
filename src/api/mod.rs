use rocket::{
    http::Status,
    response::status,
    serde::json::Json,
    Catcher, Request, Route,
};

use crate::error::{Error, ErrorBody, Result};
use crate::model::{common::UserId, user::User};
use crate::store::Store;

mod admin;
mod public;
mod voter;

pub fn routes() -> Vec<Route> {
    let mut routes = Vec::new();
    routes.extend(admin::routes());
    routes.extend(public::routes());
    routes.extend(voter::routes());
    routes
}

pub fn catchers() -> Vec<Catcher> {
    catchers![default_catcher]
}

/// Give responses that never reached a handler, such as unmatched routes or
/// malformed JSON bodies, the same shape as handler errors.
#[catch(default)]
fn default_catcher(status: Status, _req: &Request) -> status::Custom<Json<ErrorBody>> {
    let kind = match status.code {
        400 | 422 => "BadRequest",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "NotFound",
        409 => "Conflict",
        _ => "Internal",
    };
    let message = status.reason().unwrap_or("Unknown error").to_string();
    status::Custom(status, Json(ErrorBody { kind, message }))
}

/// Load the record of an authenticated caller.
async fn load_user(store: &dyn Store, id: UserId) -> Result<User> {
    store
        .user(id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("User {id}")))
}
