//! Session state store: reads, merges and writes the room roster for the
//! local participant and keeps the last snapshot in memory.

use crate::models::{now_millis, ParticipantId, RoomId, RoomSnapshot, Roster, SyncStatus};
use crate::participant::{ActionError, Participant, ParticipantPatch};
use crate::room;
use crate::store::{KeyValueStore, StoreError, Version};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Attempts at a read-merge-write before giving up on a contended key.
pub const CAS_ATTEMPTS: u32 = 3;

/// Starting bank of a participant seen in a room for the first time.
pub const INITIAL_BANK: i64 = 1000;

/// Identity of the local participant, passed to every state change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    pub participant_id: ParticipantId,
    pub default_name: String,
    pub initial_bank: i64,
}

impl SessionContext {
    pub fn new(participant_id: ParticipantId, initial_bank: i64) -> Self {
        let default_name = room::default_display_name(&participant_id);
        Self { participant_id, default_name, initial_bank }
    }

    pub fn generate(initial_bank: i64) -> Self {
        Self::new(room::generate_participant_id(), initial_bank)
    }

    fn fresh_record(&self, now: u64) -> Participant {
        Participant::new(self.participant_id.clone(), self.default_name.clone(), self.initial_bank, now)
    }
}

pub fn room_key(room: &str) -> String {
    format!("room_{room}")
}

struct Loaded {
    /// `None` when the stored contents are unknown or not a roster at all.
    /// Nothing is written back then.
    version: Option<Version>,
    roster: Roster,
    /// Records that failed to decode; written back untouched.
    undecoded: Map<String, Value>,
    healthy: bool,
}

/// Splits a stored room into the records that decode and the ones that
/// don't. `None` if the value is not a JSON object.
fn decode_roster(key: &str, value: &str) -> Option<(Roster, Map<String, Value>)> {
    let records = match serde_json::from_str::<Map<String, Value>>(value) {
        Ok(records) => records,
        Err(e) => {
            log::warn!("malformed data under {key}, leaving it alone: {e}");
            return None;
        }
    };
    let mut roster = Roster::new();
    let mut undecoded = Map::new();
    for (id, record) in records {
        match serde_json::from_value::<Participant>(record.clone()) {
            Ok(participant) => {
                roster.insert(id, participant);
            }
            Err(e) => {
                log::warn!("skipping malformed record {id} under {key}: {e}");
                undecoded.insert(id, record);
            }
        }
    }
    Some((roster, undecoded))
}

fn encode_roster(roster: &Roster, undecoded: &Map<String, Value>) -> serde_json::Result<String> {
    let mut records = undecoded.clone();
    for (id, participant) in roster {
        records.insert(id.clone(), serde_json::to_value(participant)?);
    }
    serde_json::to_string(&records)
}

pub struct SessionStore {
    store: Arc<dyn KeyValueStore>,
    ctx: SessionContext,
    snapshot: RoomSnapshot,
    status: SyncStatus,
}

impl SessionStore {
    pub fn new(store: Arc<dyn KeyValueStore>, ctx: SessionContext) -> Self {
        Self {
            store,
            ctx,
            snapshot: RoomSnapshot::default(),
            status: SyncStatus::Synced,
        }
    }

    pub fn context(&self) -> &SessionContext {
        &self.ctx
    }

    pub fn participant_id(&self) -> &str {
        &self.ctx.participant_id
    }

    pub fn snapshot(&self) -> &RoomSnapshot {
        &self.snapshot
    }

    pub fn status(&self) -> SyncStatus {
        self.status
    }

    /// The local participant as last seen. Before the first refresh this is
    /// a placeholder with an empty bank.
    pub fn me(&self) -> Participant {
        self.snapshot
            .get(&self.ctx.participant_id)
            .cloned()
            .unwrap_or_else(|| Participant::new(self.ctx.participant_id.clone(), "LOADING...".to_string(), 0, 0))
    }

    /// Re-reads the room, adding the local participant if it is missing.
    pub fn refresh(&mut self, room: &RoomId) -> RoomSnapshot {
        self.status = SyncStatus::Syncing;
        let key = room_key(room);
        let id = self.ctx.participant_id.clone();
        let (roster, healthy) = self.read_modify_write(&key, |roster| {
            if roster.contains_key(&id) {
                return false;
            }
            log::info!("joining {room} as {id}");
            roster.insert(id.clone(), self.ctx.fresh_record(now_millis()));
            true
        });
        self.finish(room, roster, healthy)
    }

    /// Merges `patch` into the local participant's record against a fresh
    /// read of the room and writes it back.
    pub fn apply_local_update(&mut self, room: &RoomId, patch: ParticipantPatch) -> RoomSnapshot {
        self.status = SyncStatus::Syncing;
        let key = room_key(room);
        let now = now_millis();
        let (roster, healthy) = self.read_modify_write(&key, |roster| {
            let me = roster
                .entry(self.ctx.participant_id.clone())
                .or_insert_with(|| self.ctx.fresh_record(now));
            me.merge(patch.clone(), now);
            true
        });
        self.finish(room, roster, healthy)
    }

    /// Runs a participant action against the current snapshot and applies
    /// the result. Refused actions change nothing.
    pub fn perform<F>(&mut self, room: &RoomId, action: F) -> Result<RoomSnapshot, ActionError>
    where
        F: FnOnce(&Participant) -> Result<ParticipantPatch, ActionError>,
    {
        let patch = action(&self.me())?;
        Ok(self.apply_local_update(room, patch))
    }

    fn finish(&mut self, room: &RoomId, roster: Roster, healthy: bool) -> RoomSnapshot {
        self.status = if healthy { SyncStatus::Synced } else { SyncStatus::Error };
        self.snapshot = RoomSnapshot::new(room.clone(), roster);
        self.snapshot.clone()
    }

    fn load(&self, key: &str) -> Loaded {
        let entry = match self.store.get(key) {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                return Loaded { version: Some(0), roster: Roster::new(), undecoded: Map::new(), healthy: true };
            }
            Err(e) => {
                log::warn!("reading {key}: {e}");
                // Carry on from what we last saw of this room.
                let roster = if room_key(&self.snapshot.room) == key {
                    self.snapshot.players.clone()
                } else {
                    Roster::new()
                };
                return Loaded { version: None, roster, undecoded: Map::new(), healthy: false };
            }
        };
        match decode_roster(key, &entry.value) {
            Some((roster, undecoded)) => {
                let healthy = undecoded.is_empty();
                Loaded { version: Some(entry.version), roster, undecoded, healthy }
            }
            None => Loaded { version: None, roster: Roster::new(), undecoded: Map::new(), healthy: false },
        }
    }

    /// Read, let `modify` change the roster, write back with compare-and-swap.
    /// `modify` returns false when nothing needs writing. Returns the roster
    /// to show and whether the exchange with the store went cleanly.
    fn read_modify_write<F>(&self, key: &str, mut modify: F) -> (Roster, bool)
    where
        F: FnMut(&mut Roster) -> bool,
    {
        let mut last = Roster::new();
        for attempt in 1..=CAS_ATTEMPTS {
            let loaded = self.load(key);
            let mut roster = loaded.roster;
            if !modify(&mut roster) {
                return (roster, loaded.healthy);
            }
            let Some(version) = loaded.version else {
                // Unknown contents; keep the change local rather than overwrite.
                return (roster, false);
            };
            let value = match encode_roster(&roster, &loaded.undecoded) {
                Ok(value) => value,
                Err(e) => {
                    log::warn!("encoding {key}: {e}");
                    return (roster, false);
                }
            };
            match self.store.compare_and_swap(key, version, &value) {
                Ok(written) => {
                    log::debug!("wrote {key} at version {written}");
                    return (roster, loaded.healthy);
                }
                Err(StoreError::Conflict { expected, found, .. }) => {
                    log::debug!("{key} moved from {expected} to {found}, retry {attempt}");
                    last = roster;
                }
                Err(e) => {
                    log::warn!("writing {key}: {e}");
                    return (roster, false);
                }
            }
        }
        log::warn!("giving up on {key} after {CAS_ATTEMPTS} conflicting writes");
        (last, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chips::{Denomination, TableChips};
    use crate::participant::Outcome;
    use crate::store::{Entry, MemoryStore};
    use std::io;
    use std::sync::atomic::{AtomicU32, Ordering};

    const ROOM: &str = "ABC123";

    fn session(store: &Arc<MemoryStore>, id: &str) -> SessionStore {
        SessionStore::new(store.clone(), SessionContext::new(id.to_string(), INITIAL_BANK))
    }

    fn stored(store: &MemoryStore) -> Entry {
        store.get(&room_key(ROOM)).unwrap().expect("room entry")
    }

    fn stored_roster(store: &MemoryStore) -> Roster {
        serde_json::from_str(&stored(store).value).unwrap()
    }

    #[test]
    fn refresh_of_absent_room_seeds_and_persists_local_record() {
        let store = Arc::new(MemoryStore::new());
        let mut s = session(&store, "user_aaaaa");
        let snap = s.refresh(&ROOM.to_string());

        let me = snap.get("user_aaaaa").expect("local record");
        assert_eq!(me.bank, INITIAL_BANK);
        assert_eq!(me.name, "PRO_AAA");
        assert!(me.table.is_empty());
        assert_eq!(s.status(), SyncStatus::Synced);
        assert_eq!(stored_roster(&store), snap.players);
    }

    #[test]
    fn refresh_does_not_write_when_already_present() {
        let store = Arc::new(MemoryStore::new());
        let mut s = session(&store, "user_aaaaa");
        s.refresh(&ROOM.to_string());
        let version = stored(&store).version;
        s.refresh(&ROOM.to_string());
        assert_eq!(stored(&store).version, version);
    }

    #[test]
    fn refresh_picks_up_other_participants() {
        let store = Arc::new(MemoryStore::new());
        let mut alice = session(&store, "user_alice");
        let mut bob = session(&store, "user_bob01");
        alice.refresh(&ROOM.to_string());
        bob.refresh(&ROOM.to_string());
        bob.perform(&ROOM.to_string(), |p| p.add_chip(Denomination::Hundred)).unwrap();

        let snap = alice.refresh(&ROOM.to_string());
        assert_eq!(snap.players.len(), 2);
        assert_eq!(snap.table_pot(), 100);
    }

    #[test]
    fn malformed_data_is_treated_as_empty_and_left_alone() {
        let store = Arc::new(MemoryStore::new());
        store.put(&room_key(ROOM), "not json");
        let mut s = session(&store, "user_aaaaa");
        let snap = s.refresh(&ROOM.to_string());

        assert_eq!(snap.players.len(), 1);
        assert!(snap.get("user_aaaaa").is_some());
        assert_eq!(s.status(), SyncStatus::Error);

        let snap = s.apply_local_update(&ROOM.to_string(), ParticipantPatch::bank(500));
        assert_eq!(snap.get("user_aaaaa").map(|p| p.bank), Some(500));
        assert_eq!(s.status(), SyncStatus::Error);
        assert_eq!(stored(&store), Entry { version: 1, value: "not json".into() });
    }

    #[test]
    fn one_bad_record_does_not_wipe_the_others() {
        let store = Arc::new(MemoryStore::new());
        let room = r#"{
            "user_bob01": {"uid": "user_bob01", "name": "BOB", "bank": 700},
            "user_carl1": {"uid": "user_carl1", "name": "CARL", "table": null}
        }"#;
        store.put(&room_key(ROOM), room);
        let mut s = session(&store, "user_aaaaa");
        let snap = s.refresh(&ROOM.to_string());

        assert_eq!(s.status(), SyncStatus::Error);
        assert_eq!(snap.get("user_bob01").map(|p| p.bank), Some(700));
        assert!(snap.get("user_carl1").is_none());

        let written: Map<String, Value> = serde_json::from_str(&stored(&store).value).unwrap();
        assert_eq!(written.len(), 3);
        assert_eq!(written["user_carl1"]["table"], Value::Null);
        assert_eq!(written["user_bob01"]["bank"], 700);
    }

    #[test]
    fn local_update_replaces_own_malformed_record() {
        let store = Arc::new(MemoryStore::new());
        let room = r#"{
            "user_aaaaa": {"uid": "user_aaaaa", "bank": "lots"},
            "user_bob01": {"uid": "user_bob01", "name": "BOB", "bank": 700}
        }"#;
        store.put(&room_key(ROOM), room);
        let mut s = session(&store, "user_aaaaa");

        let snap = s.apply_local_update(&ROOM.to_string(), ParticipantPatch::bank(1234));
        assert_eq!(snap.get("user_aaaaa").map(|p| p.bank), Some(1234));
        assert_eq!(s.status(), SyncStatus::Error);

        let roster = stored_roster(&store);
        assert_eq!(roster["user_aaaaa"].bank, 1234);
        assert_eq!(roster["user_bob01"].bank, 700);

        s.refresh(&ROOM.to_string());
        assert_eq!(s.status(), SyncStatus::Synced);
    }

    #[test]
    fn oversized_stacks_from_other_clients_are_clamped() {
        let store = Arc::new(MemoryStore::new());
        store.put(&room_key(ROOM), r#"{"user_other": {"table": {"1": 4294967295, "01": 1}}}"#);
        let mut s = session(&store, "user_aaaaa");
        let snap = s.refresh(&ROOM.to_string());

        let other = snap.get("user_other").expect("other record");
        assert_eq!(other.table.count(Denomination::One), u32::MAX);
        assert_eq!(snap.table_pot(), i64::from(u32::MAX));
        assert_eq!(s.status(), SyncStatus::Synced);
    }

    #[test]
    fn local_update_keeps_foreign_writes_since_last_refresh() {
        let store = Arc::new(MemoryStore::new());
        let mut alice = session(&store, "user_alice");
        let mut bob = session(&store, "user_bob01");
        alice.refresh(&ROOM.to_string());
        // bob joins after alice's last refresh
        bob.refresh(&ROOM.to_string());

        let snap = alice.apply_local_update(&ROOM.to_string(), ParticipantPatch::bank(1234));
        assert_eq!(snap.players.len(), 2);
        assert_eq!(stored_roster(&store)["user_bob01"].bank, INITIAL_BANK);
        assert_eq!(stored_roster(&store)["user_alice"].bank, 1234);
    }

    #[test]
    fn local_update_is_visible_immediately_and_stamped() {
        let store = Arc::new(MemoryStore::new());
        let mut s = session(&store, "user_aaaaa");
        s.refresh(&ROOM.to_string());
        let before = s.me().last_update;

        let mut table = TableChips::new();
        table.add(Denomination::TwentyFive, 2);
        s.apply_local_update(&ROOM.to_string(), ParticipantPatch::table(table));
        assert_eq!(s.me().committed(), 50);
        assert_eq!(s.me().bank, INITIAL_BANK);
        assert!(s.me().last_update >= before);
    }

    #[test]
    fn perform_rejects_without_writing() {
        let store = Arc::new(MemoryStore::new());
        let mut s = session(&store, "user_aaaaa");
        s.refresh(&ROOM.to_string());
        let version = stored(&store).version;

        let res = s.perform(&ROOM.to_string(), |p| p.settle(Outcome::Win));
        assert_eq!(res, Err(ActionError::NothingToSettle));
        assert_eq!(stored(&store).version, version);
    }

    #[test]
    fn me_is_placeholder_before_refresh() {
        let store = Arc::new(MemoryStore::new());
        let s = session(&store, "user_aaaaa");
        assert_eq!(s.me().name, "LOADING...");
        assert_eq!(s.me().bank, 0);
    }

    /// Lets a foreign writer slip in before each of the first `races` writes.
    struct RacingStore {
        inner: MemoryStore,
        races: AtomicU32,
    }

    impl KeyValueStore for RacingStore {
        fn get(&self, key: &str) -> Result<Option<Entry>, StoreError> {
            self.inner.get(key)
        }

        fn compare_and_swap(&self, key: &str, expected: Version, value: &str) -> Result<Version, StoreError> {
            if self.races.load(Ordering::SeqCst) > 0 {
                self.races.fetch_sub(1, Ordering::SeqCst);
                let foreign = r#"{"user_other":{"uid":"user_other","name":"OTHER","bank":77}}"#;
                self.inner.put(key, foreign);
            }
            self.inner.compare_and_swap(key, expected, value)
        }
    }

    #[test]
    fn conflicting_write_is_retried_from_fresh_read() {
        let store = Arc::new(RacingStore { inner: MemoryStore::new(), races: AtomicU32::new(1) });
        let mut s = SessionStore::new(store.clone(), SessionContext::new("user_aaaaa".into(), INITIAL_BANK));
        let snap = s.refresh(&ROOM.to_string());

        assert_eq!(s.status(), SyncStatus::Synced);
        assert_eq!(snap.players.len(), 2);
        assert_eq!(snap.get("user_other").map(|p| p.bank), Some(77));
    }

    #[test]
    fn persistent_contention_gives_up_with_error_status() {
        let store = Arc::new(RacingStore { inner: MemoryStore::new(), races: AtomicU32::new(CAS_ATTEMPTS) });
        let mut s = SessionStore::new(store, SessionContext::new("user_aaaaa".into(), INITIAL_BANK));
        let snap = s.refresh(&ROOM.to_string());
        assert_eq!(s.status(), SyncStatus::Error);
        assert!(snap.get("user_aaaaa").is_some());
    }

    struct BrokenStore;

    impl KeyValueStore for BrokenStore {
        fn get(&self, _key: &str) -> Result<Option<Entry>, StoreError> {
            Err(io::Error::other("disk on fire").into())
        }

        fn compare_and_swap(&self, _key: &str, _expected: Version, _value: &str) -> Result<Version, StoreError> {
            Err(io::Error::other("disk on fire").into())
        }
    }

    #[test]
    fn unreadable_store_fails_open() {
        let mut s = SessionStore::new(Arc::new(BrokenStore), SessionContext::new("user_aaaaa".into(), INITIAL_BANK));
        let snap = s.refresh(&ROOM.to_string());
        assert_eq!(s.status(), SyncStatus::Error);
        assert_eq!(snap.players.len(), 1);

        s.perform(&ROOM.to_string(), |p| p.add_chip(Denomination::Five)).unwrap();
        let snap = s.apply_local_update(&ROOM.to_string(), ParticipantPatch::name("LOCAL"));
        let me = snap.get("user_aaaaa").expect("local record");
        assert_eq!(me.name, "LOCAL");
        assert_eq!(me.committed(), 5);
    }
}
