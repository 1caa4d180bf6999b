use crate::proto::Name;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, SystemTime};
use tracing::warn;

/// The (client, server, authenticator timestamp) tuple that identifies a
/// single use of an authenticator. Timestamps here carry the microsecond
/// part - two honest requests in the same second still differ.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ReplayKey {
    client: String,
    server: String,
    client_time: SystemTime,
}

#[derive(Debug, PartialEq, Eq)]
pub enum ReplayResult {
    Fresh,
    Replay,
}

/// Remembers recently seen authenticators so a second presentation of the
/// same one is rejected. Shared by every in-flight request; the check and
/// the insert happen under one lock so two racing copies of the same
/// authenticator can never both pass.
///
/// The clock skew tolerance is fixed at construction. It is never
/// mutated per request, so concurrent requests cannot observe each
/// other's configuration.
#[derive(Debug)]
pub struct ReplayCache {
    maximum_clock_skew: Duration,
    seen: Mutex<HashMap<ReplayKey, SystemTime>>,
}

impl ReplayCache {
    pub fn new(maximum_clock_skew: Duration) -> Self {
        ReplayCache {
            maximum_clock_skew,
            seen: Mutex::new(HashMap::new()),
        }
    }

    /// Record the authenticator if it has not been seen before. An entry
    /// lives for twice the clock skew - beyond that window the timestamp
    /// check already rejects the authenticator, so the record is moot.
    pub fn check_and_insert(
        &self,
        client: &Name,
        server: &Name,
        client_time: SystemTime,
        now: SystemTime,
    ) -> ReplayResult {
        let key = ReplayKey {
            client: String::from(client),
            server: String::from(server),
            client_time,
        };

        let expiry = now + self.maximum_clock_skew * 2;

        let mut seen = match self.seen.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        seen.retain(|_, entry_expiry| *entry_expiry > now);

        if seen.contains_key(&key) {
            warn!(client = %key.client, "replayed authenticator");
            return ReplayResult::Replay;
        }

        seen.insert(key, expiry);
        ReplayResult::Fresh
    }
}
