use mongodb::{
    bson::doc,
    error::Error as DbError,
    options::{FindOneAndUpdateOptions, ReturnDocument},
};
use serde::{Deserialize, Serialize};

use crate::model::common::IdKind;

use super::collection::Coll;

/// A counter object used to implement auto-increment fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Counter {
    #[serde(rename = "_id")]
    pub name: String,
    /// The last value handed out.
    pub current: u32,
}

impl Counter {
    /// Atomically allocate the next value of the sequence for `kind`.
    ///
    /// Sequences start at 1 and the counter document is created on first use.
    pub async fn next(counters: &Coll<Counter>, kind: IdKind) -> Result<u32, DbError> {
        let update = doc! {
            "$inc": { "current": 1 }
        };
        let options = FindOneAndUpdateOptions::builder()
            .upsert(true)
            .return_document(ReturnDocument::After)
            .build();
        let counter = counters
            .find_one_and_update(doc! {"_id": kind.as_str()}, update, options)
            .await?;
        // With upsert and ReturnDocument::After a document is always returned.
        Ok(counter.map_or(1, |c| c.current))
    }
}
