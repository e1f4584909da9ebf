use crate::chips::Denomination;
use crate::clipboard;
use crate::models::RoomId;
use crate::participant::{ActionError, Outcome, Participant, ParticipantPatch};
use crate::render;
use crate::sync::{with_session, SharedSession};
use tokio::sync::mpsc::UnboundedSender;

/// Quick top-up amounts offered on the bank screen.
pub const DEPOSIT_AMOUNTS: [i64; 3] = [100, 500, 1000];

/// Runs `action` for the local participant and shows the table afterwards.
/// Refused actions are only logged; the user sees no change.
async fn act<F>(session: &SharedSession, room: &RoomId, tx: &UnboundedSender<String>, what: &str, action: F)
where
    F: FnOnce(&Participant) -> Result<ParticipantPatch, ActionError> + Send + 'static,
{
    let room = room.clone();
    let result = with_session(session, move |s| s.perform(&room, action).map(|snapshot| (s.me(), snapshot))).await;
    match result {
        Some(Ok((me, snapshot))) => {
            let _ = tx.send(render::table_view(&me, &snapshot));
        }
        Some(Err(e)) => log::debug!("{what} refused: {e}"),
        None => {}
    }
}

pub fn handle_table(session: &SharedSession, tx: &UnboundedSender<String>) {
    let (me, snapshot) = {
        let session = session.lock();
        (session.me(), session.snapshot().clone())
    };
    let _ = tx.send(render::table_view(&me, &snapshot));
}

pub fn handle_bank(session: &SharedSession, tx: &UnboundedSender<String>) {
    let me = session.lock().me();
    let _ = tx.send(render::bank_view(&me));
}

pub fn handle_lobby(session: &SharedSession, tx: &UnboundedSender<String>) {
    let view = {
        let session = session.lock();
        render::lobby_view(session.snapshot(), session.participant_id())
    };
    let _ = tx.send(view);
}

pub fn handle_status(session: &SharedSession, room: &RoomId, tx: &UnboundedSender<String>) {
    let status = session.lock().status();
    let _ = tx.send(render::room_header(room, status));
}

pub async fn handle_bet(session: &SharedSession, room: &RoomId, arg: Option<&str>, tx: &UnboundedSender<String>) {
    let denom = arg
        .and_then(|a| a.parse::<i64>().ok())
        .and_then(Denomination::from_value);
    match denom {
        Some(denom) => act(session, room, tx, "bet", move |me| me.add_chip(denom)).await,
        None => {
            let _ = tx.send("Usage: BET <1|5|25|100|500|1000>\n".to_string());
        }
    }
}

pub async fn handle_all_in(session: &SharedSession, room: &RoomId, tx: &UnboundedSender<String>) {
    act(session, room, tx, "all-in", Participant::all_in).await;
}

/// WIN/LOSE: settles our own chips against the bank.
pub async fn handle_settle(session: &SharedSession, room: &RoomId, outcome: Outcome, tx: &UnboundedSender<String>) {
    act(session, room, tx, "settle", move |me| me.settle(outcome)).await;
}

pub async fn handle_set_bank(session: &SharedSession, room: &RoomId, arg: Option<&str>, tx: &UnboundedSender<String>) {
    match arg.and_then(|a| a.parse::<i64>().ok()) {
        Some(amount) => act(session, room, tx, "bank edit", move |me| me.set_bank(amount)).await,
        None => {
            let _ = tx.send("Usage: SETBANK <amount>\n".to_string());
        }
    }
}

pub async fn handle_deposit(session: &SharedSession, room: &RoomId, arg: Option<&str>, tx: &UnboundedSender<String>) {
    match arg.and_then(|a| a.parse::<i64>().ok()) {
        Some(amount) if DEPOSIT_AMOUNTS.contains(&amount) => {
            act(session, room, tx, "deposit", move |me| me.deposit(amount)).await;
        }
        _ => {
            let _ = tx.send("Usage: DEPOSIT <100|500|1000>\n".to_string());
        }
    }
}

pub async fn handle_name(session: &SharedSession, room: &RoomId, name: &str, tx: &UnboundedSender<String>) {
    if name.trim().is_empty() {
        let _ = tx.send("Usage: NAME <name>\n".to_string());
        return;
    }
    let (room, name) = (room.clone(), name.to_string());
    let renamed = with_session(session, move |s| {
        let patch = s.me().rename(&name);
        s.apply_local_update(&room, patch);
        s.me()
    })
    .await;
    if let Some(me) = renamed {
        let _ = tx.send(format!("You are now {}\n", me.name));
    }
}

pub async fn handle_clear(session: &SharedSession, room: &RoomId, tx: &UnboundedSender<String>) {
    act(session, room, tx, "clear", |me| Ok(me.clear_table())).await;
}

pub fn handle_copy(room: &RoomId, tx: &UnboundedSender<String>) {
    let _ = tx.send(clipboard::osc52(room));
    let _ = tx.send(format!("Room code {room} copied\n"));
}
