use log::{error, info};
use rocket::{
    fairing::{Fairing, Info, Kind},
    Build, Rocket,
};
use serde::Deserialize;

use crate::model::user::ensure_admin_exists;
use crate::store::{MemoryStore, MongoStore, Storage};

/// Application configuration, derived from `Rocket.toml` and `ROCKET_*`
/// environment variables. This struct becomes managed state and can be
/// inspected by any endpoint.
#[derive(Deserialize)]
pub struct Config {
    // non-secrets
    #[serde(default = "default_ballot_retry_limit")]
    ballot_retry_limit: u32,
    // secrets
    jwt_secret: String,
}

fn default_ballot_retry_limit() -> u32 {
    3
}

impl Config {
    /// Secret key shared with the identity provider, used to verify JWTs.
    pub fn jwt_secret(&self) -> &[u8] {
        self.jwt_secret.as_bytes()
    }

    /// How many times a ballot insert is retried after a transient conflict.
    pub fn ballot_retry_limit(&self) -> u32 {
        self.ballot_retry_limit
    }
}

/// A fairing that loads the application config and puts it in managed state.
/// This could easily be achieved using `AdHoc::config`, but is written out
/// explicitly for symmetry with [`StoreFairing`] and control over error
/// messages.
pub struct ConfigFairing;

#[rocket::async_trait]
impl Fairing for ConfigFairing {
    fn info(&self) -> Info {
        Info {
            name: "Config",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        let config = match rocket.figment().extract::<Config>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load application config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };

        rocket = rocket.manage(config);
        Ok(rocket)
    }
}

/// Which [`crate::store::Store`] backend to run on.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    #[default]
    Memory,
    Mongodb,
}

/// Configuration for the backing store.
#[derive(Deserialize)]
struct StoreConfig {
    // non-secrets
    #[serde(default)]
    store: StoreKind,
    #[serde(default = "default_db_name")]
    db_name: String,
    // secrets
    db_uri: Option<String>,
}

fn default_db_name() -> String {
    "campus_vote".to_string()
}

/// A fairing that loads the store config, connects to the configured
/// backend, ensures the administrator account exists, and places a
/// [`Storage`] handle into managed state.
///
/// If a [`Storage`] is already managed, it is used as-is.
pub struct StoreFairing;

#[rocket::async_trait]
impl Fairing for StoreFairing {
    fn info(&self) -> Info {
        Info {
            name: "Store",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        let managed = rocket.state::<Storage>().cloned();
        let storage = match managed {
            Some(storage) => storage,
            None => {
                let config = match rocket.figment().extract::<StoreConfig>() {
                    Ok(config) => config,
                    Err(e) => {
                        error!("Failed to load store config");
                        rocket::config::pretty_print_error(e);
                        return Err(rocket);
                    }
                };
                let storage = match connect(&config).await {
                    Some(storage) => storage,
                    None => return Err(rocket),
                };
                rocket = rocket.manage(storage.clone());
                storage
            }
        };

        if let Err(e) = ensure_admin_exists(&*storage).await {
            error!("Failed to prepare store: {e}");
            return Err(rocket);
        }
        info!("...store online!");

        Ok(rocket)
    }
}

async fn connect(config: &StoreConfig) -> Option<Storage> {
    match config.store {
        StoreKind::Memory => {
            info!("Using in-memory store");
            Some(Storage::new(MemoryStore::new()))
        }
        StoreKind::Mongodb => {
            let Some(db_uri) = config.db_uri.as_deref() else {
                error!("`db_uri` must be set to use the mongodb store");
                return None;
            };
            info!("Loaded database config, connecting...");
            match MongoStore::connect(db_uri, &config.db_name).await {
                Ok(store) => Some(Storage::new(store)),
                Err(e) => {
                    error!("Failed to connect to database: {e}");
                    None
                }
            }
        }
    }
}
