//! Job metadata: the record of truth for every queued job
//!
//! Bucket and ready-queue entries only carry job ids; whether an id still
//! means anything is always decided by looking the job up here.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{DelayQueueError, StoreError, StoreResult};
use crate::store::Store;

/// Prefix of the per-job metadata hash key
pub const JOB_KEY_PREFIX: &str = "job:";

const FIELD_TOPIC: &str = "topic";
const FIELD_DELAY: &str = "delay";
const FIELD_TTR: &str = "ttr";
const FIELD_BODY: &str = "body";

/// A queued job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    /// Caller-assigned id, unique within the service
    pub id: String,
    /// Consumer channel selector
    pub topic: String,
    /// Absolute unix-second timestamp at which the job becomes deliverable
    pub delay: i64,
    /// Seconds the consumer has to acknowledge before redelivery
    pub ttr: i64,
    /// Opaque payload, carried through unchanged
    pub body: String,
}

impl Job {
    /// Create a new job
    pub fn new(
        id: impl Into<String>,
        topic: impl Into<String>,
        delay: i64,
        ttr: i64,
        body: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            topic: topic.into(),
            delay,
            ttr,
            body: body.into(),
        }
    }

    /// Check the push invariants
    pub fn validate(&self) -> Result<(), DelayQueueError> {
        if self.id.is_empty() {
            return Err(DelayQueueError::InvalidJob("id must not be empty".into()));
        }
        if self.topic.is_empty() {
            return Err(DelayQueueError::InvalidJob("topic must not be empty".into()));
        }
        if self.delay < 0 {
            return Err(DelayQueueError::InvalidJob(format!(
                "delay {} must not be negative",
                self.delay
            )));
        }
        if self.ttr <= 0 {
            return Err(DelayQueueError::InvalidJob(format!(
                "ttr {} must be positive",
                self.ttr
            )));
        }
        Ok(())
    }
}

/// Metadata hash key for a job id
pub fn job_key(id: &str) -> String {
    format!("{JOB_KEY_PREFIX}{id}")
}

/// Current wall-clock time as unix seconds
pub fn unix_now() -> i64 {
    Utc::now().timestamp()
}

/// CRUD over job metadata hashes
pub struct JobStore {
    store: Arc<dyn Store>,
}

impl JobStore {
    /// Create a job store over the given backing store
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Write a job's metadata, silently overwriting any previous version
    pub async fn put(&self, job: &Job) -> StoreResult<()> {
        let fields = [
            (FIELD_TOPIC, job.topic.clone()),
            (FIELD_DELAY, job.delay.to_string()),
            (FIELD_TTR, job.ttr.to_string()),
            (FIELD_BODY, job.body.clone()),
        ];
        self.store.hset(&job_key(&job.id), &fields).await
    }

    /// Read a job's metadata; absent metadata is `None`, undecodable
    /// metadata is a protocol error
    pub async fn get(&self, id: &str) -> StoreResult<Option<Job>> {
        let fields = self.store.hget_all(&job_key(id)).await?;
        if fields.is_empty() {
            return Ok(None);
        }
        decode(id, &fields).map(Some)
    }

    /// Delete a job's metadata; removing a missing id succeeds
    pub async fn remove(&self, id: &str) -> StoreResult<()> {
        self.store
            .hdel(&job_key(id), &[FIELD_TOPIC, FIELD_DELAY, FIELD_TTR, FIELD_BODY])
            .await
    }
}

fn decode(id: &str, fields: &HashMap<String, String>) -> StoreResult<Job> {
    let topic = field(id, fields, FIELD_TOPIC)?.to_string();
    let delay = int_field(id, fields, FIELD_DELAY)?;
    let ttr = int_field(id, fields, FIELD_TTR)?;
    // The body may legitimately be empty; an absent field reads the same.
    let body = fields.get(FIELD_BODY).cloned().unwrap_or_default();
    Ok(Job {
        id: id.to_string(),
        topic,
        delay,
        ttr,
        body,
    })
}

fn field<'a>(
    id: &str,
    fields: &'a HashMap<String, String>,
    name: &str,
) -> StoreResult<&'a String> {
    fields.get(name).ok_or_else(|| {
        StoreError::Protocol(format!("job {id} metadata is missing the '{name}' field"))
    })
}

fn int_field(id: &str, fields: &HashMap<String, String>, name: &str) -> StoreResult<i64> {
    let raw = field(id, fields, name)?;
    raw.parse().map_err(|_| {
        StoreError::Protocol(format!(
            "job {id} metadata field '{name}' is not an integer: '{raw}'"
        ))
    })
}
