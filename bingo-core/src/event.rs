use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::PlayerId;

/// Window used by feeds that show only fresh activity.
pub const DEFAULT_RECENT_SECS: u64 = 60;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameEvent {
    pub seq: u64,
    pub player_id: PlayerId,
    pub player_name: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RecentEvent {
    #[serde(flatten)]
    pub event: GameEvent,
    /// Seconds until the event ages out of the recent window.
    pub remove_in: f64,
}

/// Append-only activity log for one game, read newest-first.
///
/// With `retain` off nothing is stored, but [`EventLog::record`] still hands
/// back the event so it can be broadcast live.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventLog {
    retain: bool,
    next_seq: u64,
    events: Vec<GameEvent>,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new(true)
    }
}

impl EventLog {
    pub fn new(retain: bool) -> Self {
        Self {
            retain,
            next_seq: 0,
            events: Vec::new(),
        }
    }

    pub fn is_retaining(&self) -> bool {
        self.retain
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Stamps a new event and appends it.
    pub fn record(
        &mut self,
        player_id: impl Into<PlayerId>,
        player_name: impl Into<String>,
        message: impl Into<String>,
    ) -> GameEvent {
        let mut created_at = Utc::now();
        // keep timestamps monotonic even if the wall clock steps back
        if let Some(last) = self.events.last() {
            created_at = created_at.max(last.created_at);
        }
        let event = GameEvent {
            seq: self.next_seq,
            player_id: player_id.into(),
            player_name: player_name.into(),
            message: message.into(),
            created_at,
        };
        self.append(event.clone());
        event
    }

    pub fn append(&mut self, event: GameEvent) {
        self.next_seq = self.next_seq.max(event.seq + 1);
        if self.retain {
            self.events.push(event);
            // out-of-order appends are rare; restore (created_at, seq) order
            let n = self.events.len();
            if n > 1 && order_key(&self.events[n - 2]) > order_key(&self.events[n - 1]) {
                self.events.sort_by_key(order_key);
            }
        }
    }

    pub fn all(&self) -> Vec<GameEvent> {
        self.events.iter().rev().cloned().collect()
    }

    pub fn recent(&self, max_age_secs: u64, now: DateTime<Utc>) -> Vec<RecentEvent> {
        // windows past chrono's range saturate instead of panicking
        let max_age = i64::try_from(max_age_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .unwrap_or(Duration::MAX);
        self.events
            .iter()
            .rev()
            .filter(|e| now - e.created_at < max_age)
            .map(|e| {
                let left = max_age
                    .checked_sub(&(now - e.created_at))
                    .unwrap_or(max_age)
                    .min(max_age);
                RecentEvent {
                    event: e.clone(),
                    remove_in: left.num_milliseconds() as f64 / 1000.0,
                }
            })
            .collect()
    }
}

fn order_key(event: &GameEvent) -> (DateTime<Utc>, u64) {
    (event.created_at, event.seq)
}
