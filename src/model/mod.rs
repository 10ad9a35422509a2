pub mod api;
pub mod audit;
pub mod auth;
pub mod ballot;
pub mod candidate;
pub mod common;
pub mod election;
pub mod tally;
pub mod user;
