use crate::participant::Participant;
use std::collections::BTreeMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

pub type ParticipantId = String;
pub type RoomId = String;

/// Everyone known in a room, keyed by participant id. This is the exact
/// shape persisted under the room key.
pub type Roster = BTreeMap<ParticipantId, Participant>;

/// Health of the last exchange with the shared store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncStatus {
    #[default]
    Synced,
    Syncing,
    Error,
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SyncStatus::Synced => "synced",
            SyncStatus::Syncing => "syncing",
            SyncStatus::Error => "sync error",
        };
        f.write_str(s)
    }
}

/// Point-in-time view of a room as last read from (or written to) the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoomSnapshot {
    pub room: RoomId,
    pub players: Roster,
}

impl RoomSnapshot {
    pub fn new(room: RoomId, players: Roster) -> Self {
        Self { room, players }
    }

    pub fn get(&self, id: &str) -> Option<&Participant> {
        self.players.get(id)
    }

    /// Sum of everything committed to the table across all participants.
    pub fn table_pot(&self) -> i64 {
        self.players.values().map(Participant::committed).fold(0, i64::saturating_add)
    }

    pub fn lobby(&self) -> Vec<&Participant> {
        let mut players: Vec<&Participant> = self.players.values().collect();
        players.sort_by(|a, b| b.last_update.cmp(&a.last_update));
        players
    }
}

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
