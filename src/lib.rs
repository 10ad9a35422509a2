#[macro_use]
extern crate rocket;

#[cfg(test)]
#[macro_use]
extern crate backend_test;

use rocket::{Build, Rocket};

pub mod api;
pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod store;
pub mod voting;

use config::{ConfigFairing, StoreFairing};
use logging::LoggerFairing;

/// Assemble the server from `Rocket.toml` and `ROCKET_*` environment
/// variables. The store is chosen and connected when the rocket ignites.
pub fn build() -> Rocket<Build> {
    mount(rocket::build())
}

fn mount(rocket: Rocket<Build>) -> Rocket<Build> {
    rocket
        .attach(LoggerFairing)
        .attach(ConfigFairing)
        .attach(StoreFairing)
        .mount("/", api::routes())
        .register("/", api::catchers())
}

/// A rocket running on the given store, with a fixed JWT secret.
#[cfg(test)]
pub(crate) fn rocket_for_store(store: impl store::Store + 'static) -> Rocket<Build> {
    let figment = rocket::Config::figment().merge(("jwt_secret", "campus-vote test secret"));
    mount(rocket::custom(figment)).manage(store::Storage::new(store))
}
