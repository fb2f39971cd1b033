//! Fan-out of the per-session upstream calls into one partially-populated record.
//!
//! Every call is issued concurrently and settles independently: one failure never
//! prevents the others from completing or from being reported. Per-attempt media is
//! a second wave ([`fetch_attempt_media`]) because attempt ids are only known once
//! the attempt list has resolved.

use futures::future::join_all;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, instrument};

use crate::upstream::{Attempt, AttemptList, Decision, MediaList, PersonInfo, Registry, UpstreamError, VerificationApi};

/// Settled result of one independent upstream call.
#[derive(Debug)]
pub enum Outcome<T> {
    Fulfilled(T),
    Failed(UpstreamError),
}

impl<T> Outcome<T> {
    pub fn is_fulfilled(&self) -> bool {
        matches!(self, Outcome::Fulfilled(_))
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Outcome::Fulfilled(value) => Some(value),
            Outcome::Failed(_) => None,
        }
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            Outcome::Fulfilled(value) => Some(value),
            Outcome::Failed(_) => None,
        }
    }

    pub fn reason(&self) -> Option<&UpstreamError> {
        match self {
            Outcome::Fulfilled(_) => None,
            Outcome::Failed(reason) => Some(reason),
        }
    }
}

impl<T: Serialize> Outcome<T> {
    /// The value as a JSON document, or `null` if the call failed.
    pub fn document(&self) -> Value {
        self.value()
            .and_then(|value| serde_json::to_value(value).ok())
            .unwrap_or(Value::Null)
    }
}

impl<T> From<Result<T, UpstreamError>> for Outcome<T> {
    fn from(result: Result<T, UpstreamError>) -> Self {
        match result {
            Ok(value) => Outcome::Fulfilled(value),
            Err(reason) => Outcome::Failed(reason),
        }
    }
}

/// Everything known about one session after the first wave of calls.
#[derive(Debug)]
pub struct SessionRecord {
    pub decision: Outcome<Decision>,
    pub person: Outcome<PersonInfo>,
    pub media_list: Outcome<MediaList>,
    pub watchlist: Outcome<Value>,
    pub ine_registry: Outcome<Value>,
    pub curp_registry: Outcome<Value>,
    pub attempts: Outcome<AttemptList>,
}

impl SessionRecord {
    pub const FIELDS: [&'static str; 7] = [
        "decision",
        "person",
        "mediaList",
        "watchlist",
        "ineRegistry",
        "curpRegistry",
        "attempts",
    ];

    /// Field name and JSON document for every field, failed ones as `null`.
    pub fn documents(&self) -> [(&'static str, Value); 7] {
        [
            (Self::FIELDS[0], self.decision.document()),
            (Self::FIELDS[1], self.person.document()),
            (Self::FIELDS[2], self.media_list.document()),
            (Self::FIELDS[3], self.watchlist.document()),
            (Self::FIELDS[4], self.ine_registry.document()),
            (Self::FIELDS[5], self.curp_registry.document()),
            (Self::FIELDS[6], self.attempts.document()),
        ]
    }

    fn fulfilled(&self) -> [bool; 7] {
        [
            self.decision.is_fulfilled(),
            self.person.is_fulfilled(),
            self.media_list.is_fulfilled(),
            self.watchlist.is_fulfilled(),
            self.ine_registry.is_fulfilled(),
            self.curp_registry.is_fulfilled(),
            self.attempts.is_fulfilled(),
        ]
    }

    /// Names of the fields whose call failed.
    pub fn failed_fields(&self) -> Vec<&'static str> {
        Self::FIELDS
            .into_iter()
            .zip(self.fulfilled())
            .filter_map(|(name, fulfilled)| (!fulfilled).then_some(name))
            .collect()
    }

    /// True when no call produced data; callers usually read this as "nothing found".
    pub fn all_failed(&self) -> bool {
        self.fulfilled().iter().all(|fulfilled| !fulfilled)
    }

    /// Attempts listed for the session, empty if the attempt call failed.
    pub fn attempt_list(&self) -> &[Attempt] {
        self.attempts
            .value()
            .map(|list| list.verifications.as_slice())
            .unwrap_or_default()
    }
}

/// Issue the first wave of calls for a session and wait for all of them to settle.
///
/// Dispatch order is fixed (decision, person, media, watchlist, registry checks,
/// attempts); completion order is not. Never fails: every call's failure is captured
/// in its own field.
#[instrument(skip(api))]
pub async fn aggregate_session(api: &dyn VerificationApi, session_id: &str, version: &str) -> SessionRecord {
    let (decision, person, media_list, watchlist, ine_registry, curp_registry, attempts) = tokio::join!(
        api.session_decision(session_id),
        api.session_person(session_id),
        api.session_media(session_id),
        api.session_watchlist(session_id),
        api.registry_check(Registry::Ine, session_id, version),
        api.registry_check(Registry::Curp, session_id, version),
        api.session_attempts(session_id),
    );

    let record = SessionRecord {
        decision: decision.into(),
        person: person.into(),
        media_list: media_list.into(),
        watchlist: watchlist.into(),
        ine_registry: ine_registry.into(),
        curp_registry: curp_registry.into(),
        attempts: attempts.into(),
    };

    let failed = record.failed_fields();
    if failed.is_empty() {
        debug!("All session calls fulfilled");
    } else {
        info!(failed = ?failed, "Session aggregated with failed fields");
    }
    record
}

/// Media listing for one attempt.
#[derive(Debug)]
pub struct AttemptMedia {
    pub attempt: Attempt,
    pub media: Outcome<MediaList>,
}

/// Second wave: list the media of every attempt concurrently.
#[instrument(skip(api, attempts), fields(attempts = attempts.len()))]
pub async fn fetch_attempt_media(api: &dyn VerificationApi, attempts: &[Attempt]) -> Vec<AttemptMedia> {
    let listings = join_all(attempts.iter().map(|attempt| api.attempt_media(&attempt.id))).await;

    attempts
        .iter()
        .cloned()
        .zip(listings)
        .map(|(attempt, media)| AttemptMedia {
            attempt,
            media: media.into(),
        })
        .collect()
}
