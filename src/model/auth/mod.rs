mod principal;
mod token;

pub use principal::{Admin, Principal, Student};
pub use token::{AuthToken, AUTH_TOKEN_COOKIE};
