//! Inbound-event admission and deduplication
//!
//! Sits between the raw connection event stream and the response pipeline.
//! For each inbound event it decides whether the event is new, a tolerated
//! redelivery, or a duplicate that has exhausted its processing attempts,
//! and it bounds its own memory with a stale sweep plus an oldest-first
//! eviction cap.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::event::InboundEvent;

/// Broadcast / status channel JID that must never be answered
pub const BROADCAST_ID: &str = "status@broadcast";

/// Outcome of evaluating an inbound event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Forward the event to the response pipeline
    Admit,
    /// Drop the event, no reply is sent
    Reject(RejectReason),
}

impl Decision {
    pub fn is_admit(&self) -> bool {
        matches!(self, Decision::Admit)
    }
}

/// Why an event was not admitted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Same id sighted again inside the debounce window. Reserved in the
    /// taxonomy: below-ceiling redeliveries are admitted, so within-window
    /// rejects currently surface as [`RejectReason::AttemptsExceeded`].
    DuplicateDebounced,
    /// Id exhausted its processing attempts inside the window
    AttemptsExceeded,
    /// Textual payload empty after trimming
    EmptyPayload,
    /// Sent by the bot itself or addressed to the broadcast channel
    SelfOrBroadcast,
}

/// Admission filter settings
#[derive(Clone, Debug)]
pub struct AdmissionConfig {
    /// Debounce window: re-sightings of an id inside this interval are
    /// redeliveries, not new events
    pub window: Duration,
    /// How many times a still-fresh id may be processed
    pub max_attempts: u32,
    /// Hard cap on tracked ids; oldest entries are evicted beyond this
    pub max_records: usize,
    /// The bot's own JID, if known. Events from this sender are rejected.
    pub self_id: Option<String>,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_millis(5000),
            max_attempts: 2,
            max_records: 1000,
            self_id: None,
        }
    }
}

/// Bookkeeping for one distinct event id
#[derive(Debug, Clone)]
struct AdmissionRecord {
    first_seen_at: Instant,
    attempts: u32,
}

/// Decides, per inbound event, whether it is eligible for processing.
///
/// Owns the record map exclusively. The map is behind a mutex so the filter
/// can be shared across tasks; `evaluate` and the eviction sweep run under
/// the same lock.
pub struct AdmissionFilter {
    config: AdmissionConfig,
    records: Mutex<HashMap<String, AdmissionRecord>>,
}

impl AdmissionFilter {
    pub fn new(config: AdmissionConfig) -> Self {
        Self {
            config,
            records: Mutex::new(HashMap::new()),
        }
    }

    /// Evaluate an inbound event against the dedup state
    pub fn evaluate(&self, event: &InboundEvent) -> Decision {
        self.evaluate_at(event, Instant::now())
    }

    /// Evaluate with an explicit clock reading. `evaluate` delegates here;
    /// tests drive the window arithmetic deterministically through this.
    pub fn evaluate_at(&self, event: &InboundEvent, now: Instant) -> Decision {
        // Stateless rejections first: nothing below may mutate the map.
        if event.from_me
            || event.sender_id == BROADCAST_ID
            || self
                .config
                .self_id
                .as_deref()
                .is_some_and(|own| own == event.sender_id)
        {
            debug!(id = %event.id, sender = %event.sender_id, "rejected: self or broadcast");
            return Decision::Reject(RejectReason::SelfOrBroadcast);
        }

        let trimmed = event.text_content().unwrap_or_default().trim();
        if trimmed.is_empty() {
            debug!(id = %event.id, "rejected: empty payload");
            return Decision::Reject(RejectReason::EmptyPayload);
        }

        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());

        // A record past the window is expired: treat the id as unseen.
        let fresh = records
            .get(&event.id)
            .filter(|record| now.duration_since(record.first_seen_at) <= self.config.window)
            .cloned();

        let decision = match fresh {
            Some(record) if record.attempts >= self.config.max_attempts => {
                warn!(id = %event.id, attempts = record.attempts, "rejected: attempts exceeded");
                Decision::Reject(RejectReason::AttemptsExceeded)
            }
            Some(record) => {
                let attempts = record.attempts + 1;
                debug!(id = %event.id, attempts, "redelivery admitted");
                records.insert(
                    event.id.clone(),
                    AdmissionRecord {
                        first_seen_at: record.first_seen_at,
                        attempts,
                    },
                );
                Decision::Admit
            }
            // Unknown id, or a record that aged past the window: fresh start.
            None => {
                records.insert(
                    event.id.clone(),
                    AdmissionRecord {
                        first_seen_at: now,
                        attempts: 1,
                    },
                );
                Decision::Admit
            }
        };

        if decision.is_admit() {
            Self::evict(&mut records, &self.config, now);
        }

        decision
    }

    /// Number of tracked event ids
    pub fn record_count(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// Attempts recorded for an id, if tracked
    pub fn attempts(&self, id: &str) -> Option<u32> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .map(|r| r.attempts)
    }

    /// Drop every record older than the window, then enforce the hard cap
    /// oldest-first.
    fn evict(records: &mut HashMap<String, AdmissionRecord>, config: &AdmissionConfig, now: Instant) {
        records.retain(|_, record| now.duration_since(record.first_seen_at) <= config.window);

        if records.len() > config.max_records {
            let mut by_age: Vec<(String, Instant)> = records
                .iter()
                .map(|(id, record)| (id.clone(), record.first_seen_at))
                .collect();
            by_age.sort_by_key(|(_, first_seen_at)| *first_seen_at);

            let excess = records.len() - config.max_records;
            for (id, _) in by_age.into_iter().take(excess) {
                records.remove(&id);
            }
            debug!(evicted = excess, "record cap enforced");
        }
    }
}
