use jsonwebtoken::errors::Error as JwtError;
use log::error;
use rocket::{
    http::Status,
    response::{status, Responder},
    serde::json::Json,
    Request,
};
use serde::Serialize;
use thiserror::Error;

use crate::model::ballot::BallotError;
use crate::store::StoreError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Ballot(#[from] BallotError),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Jwt(#[from] JwtError),
}

impl Error {
    /// HTTP status and stable machine-readable kind of this error.
    pub fn status_and_kind(&self) -> (Status, &'static str) {
        match self {
            Self::Ballot(err) => {
                let status = match err {
                    BallotError::AlreadyVoted => Status::Conflict,
                    BallotError::ElectionNotActive(_) => Status::Forbidden,
                    BallotError::NoSelections
                    | BallotError::UnknownPosition(_)
                    | BallotError::InvalidCandidate { .. } => Status::UnprocessableEntity,
                };
                (status, err.kind())
            }
            Self::NotFound(_) => (Status::NotFound, "NotFound"),
            Self::Conflict(_) => (Status::Conflict, "Conflict"),
            Self::BadRequest(_) => (Status::BadRequest, "BadRequest"),
            Self::Unauthorized(_) | Self::Jwt(_) => (Status::Unauthorized, "Unauthorized"),
            Self::Forbidden(_) => (Status::Forbidden, "Forbidden"),
            Self::Store(StoreError::DuplicateBallot { .. }) => (Status::Conflict, "AlreadyVoted"),
            Self::Store(StoreError::ElectionNotActive { .. }) => {
                (Status::Forbidden, "ElectionNotActive")
            }
            Self::Store(StoreError::DuplicateMatric(_) | StoreError::Transient(_)) => {
                (Status::Conflict, "Conflict")
            }
            Self::Store(StoreError::Db(_)) => (Status::InternalServerError, "Internal"),
        }
    }
}

/// The JSON body of every error response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub kind: &'static str,
    pub message: String,
}

impl<'r, 'o: 'r> Responder<'r, 'o> for Error {
    fn respond_to(self, req: &'r Request<'_>) -> rocket::response::Result<'o> {
        let (status, kind) = self.status_and_kind();
        let message = if status == Status::InternalServerError {
            error!("{self}");
            "Internal server error".to_string()
        } else {
            self.to_string()
        };
        status::Custom(status, Json(ErrorBody { kind, message })).respond_to(req)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::model::election::ElectionStatus;

    #[test]
    fn ballot_rejections_keep_their_kind() {
        let cases = [
            (BallotError::AlreadyVoted, Status::Conflict),
            (
                BallotError::ElectionNotActive(ElectionStatus::Closed),
                Status::Forbidden,
            ),
            (BallotError::NoSelections, Status::UnprocessableEntity),
            (
                BallotError::UnknownPosition("Treasurer".to_string()),
                Status::UnprocessableEntity,
            ),
            (
                BallotError::InvalidCandidate {
                    position: "President".to_string(),
                    candidate: 9,
                },
                Status::UnprocessableEntity,
            ),
        ];
        for (err, expected) in cases {
            let kind = err.kind();
            assert_eq!(Error::from(err).status_and_kind(), (expected, kind));
        }
    }

    #[test]
    fn duplicate_ballot_is_already_voted() {
        let err: Error = StoreError::DuplicateBallot {
            voter: 1,
            election: 2,
        }
        .into();
        assert_eq!(err.status_and_kind(), (Status::Conflict, "AlreadyVoted"));
    }
}
