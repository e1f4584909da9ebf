use crate::commands::*;
use crate::models::{RoomId, RoomSnapshot, SyncStatus};
use crate::participant::Outcome;
use crate::render;
use crate::room;
use crate::sync::{self, SharedSession, SyncHandle};
use std::future::pending;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::watch;
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
pub struct ConsoleOptions {
    pub poll_interval: Duration,
    /// Room to enter right away instead of showing the menu.
    pub initial_room: Option<RoomId>,
    /// Name to take on every room entry.
    pub name: Option<String>,
}

impl Default for ConsoleOptions {
    fn default() -> Self {
        Self { poll_interval: sync::DEFAULT_POLL_INTERVAL, initial_room: None, name: None }
    }
}

struct ActiveRoom {
    room: RoomId,
    sync: SyncHandle,
    updates: watch::Receiver<RoomSnapshot>,
    seen: RoomSnapshot,
}

enum Event {
    Line(Option<String>),
    Update(RoomSnapshot),
}

pub fn spawn_writer<W>(writer: W) -> (UnboundedSender<String>, JoinHandle<()>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, mut rx): (UnboundedSender<String>, UnboundedReceiver<String>) = unbounded_channel();
    let task = tokio::spawn(async move {
        let mut writer = writer;
        while let Some(msg) = rx.recv().await {
            if writer.write_all(msg.as_bytes()).await.is_err() {
                break;
            }
            let _ = writer.flush().await;
        }
    });
    (tx, task)
}

/// Reads commands line by line until QUIT or end of input.
pub async fn run<R>(
    reader: R,
    session: SharedSession,
    options: ConsoleOptions,
    tx: UnboundedSender<String>,
) -> io::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut active: Option<ActiveRoom> = None;

    let (id, name) = {
        let session = session.lock();
        (session.participant_id().to_string(), session.context().default_name.clone())
    };
    let _ = tx.send(format!("Welcome to the chip tracker! You are {name} ({id})\n"));

    match options.initial_room.as_deref().map(room::parse_room_code) {
        Some(Ok(code)) => active = Some(enter_room(&session, code, &options, &tx).await),
        Some(Err(e)) => {
            let _ = tx.send(format!("{e}\n"));
            let _ = tx.send(render::MENU_HELP.to_string());
        }
        None => {
            let _ = tx.send(render::MENU_HELP.to_string());
        }
    }

    loop {
        let event = tokio::select! {
            line = lines.next_line() => Event::Line(line?),
            snapshot = next_update(&mut active) => Event::Update(snapshot),
        };

        let line = match event {
            Event::Update(snapshot) => {
                if let Some(a) = active.as_mut() {
                    if others_changed(&a.seen, &snapshot, &id) {
                        let _ = tx.send(render::pot_update(&snapshot));
                    }
                    a.seen = snapshot;
                }
                continue;
            }
            Event::Line(None) => break,
            Event::Line(Some(line)) => line,
        };

        let mut parts = line.split_whitespace();
        let Some(cmd) = parts.next().map(str::to_uppercase) else {
            continue;
        };
        let arg = parts.next();

        if active.is_none() {
            match cmd.as_str() {
                "SOLO" => active = Some(enter_room(&session, room::solo_room_code(), &options, &tx).await),
                "CREATE" => active = Some(enter_room(&session, room::create_room_code(), &options, &tx).await),
                "JOIN" => match room::parse_room_code(arg.unwrap_or_default()) {
                    Ok(code) => active = Some(enter_room(&session, code, &options, &tx).await),
                    Err(e) => {
                        let _ = tx.send(format!("{e}\n"));
                    }
                },
                "HELP" => {
                    let _ = tx.send(render::MENU_HELP.to_string());
                }
                "QUIT" | "EXIT" => {
                    let _ = tx.send("Bye!\n".to_string());
                    break;
                }
                other => {
                    let _ = tx.send(format!("Unknown command: {other}\n"));
                }
            }
            continue;
        }

        let Some(room) = active.as_ref().map(|a| a.room.clone()) else {
            continue;
        };
        match cmd.as_str() {
            "TABLE" => handle_table(&session, &tx),
            "BANK" => handle_bank(&session, &tx),
            "LOBBY" => handle_lobby(&session, &tx),
            "STATUS" => handle_status(&session, &room, &tx),
            "BET" => handle_bet(&session, &room, arg, &tx).await,
            "ALLIN" | "ALL-IN" => handle_all_in(&session, &room, &tx).await,
            "WIN" => handle_settle(&session, &room, Outcome::Win, &tx).await,
            "LOSE" => handle_settle(&session, &room, Outcome::Lose, &tx).await,
            "SETBANK" => handle_set_bank(&session, &room, arg, &tx).await,
            "DEPOSIT" => handle_deposit(&session, &room, arg, &tx).await,
            "NAME" => {
                let rest = line.trim().split_once(char::is_whitespace).map_or("", |(_, rest)| rest.trim());
                handle_name(&session, &room, rest, &tx).await;
            }
            "CLEAR" => handle_clear(&session, &room, &tx).await,
            "COPY" => handle_copy(&room, &tx),
            "HELP" => {
                let _ = tx.send(render::ROOM_HELP.to_string());
            }
            "LEAVE" => {
                if let Some(a) = active.take() {
                    leave_room(a).await;
                }
                let _ = tx.send(render::MENU_HELP.to_string());
            }
            "QUIT" | "EXIT" => {
                let _ = tx.send("Bye!\n".to_string());
                break;
            }
            "SOLO" | "CREATE" | "JOIN" => {
                let _ = tx.send("Leave the room first\n".to_string());
            }
            other => {
                let _ = tx.send(format!("Unknown command: {other}\n"));
            }
        }
    }

    if let Some(a) = active.take() {
        leave_room(a).await;
    }
    Ok(())
}

async fn enter_room(
    session: &SharedSession,
    code: RoomId,
    options: &ConsoleOptions,
    tx: &UnboundedSender<String>,
) -> ActiveRoom {
    let (room, name) = (code.clone(), options.name.clone());
    let entered = sync::with_session(session, move |s| {
        s.refresh(&room);
        if let Some(name) = &name {
            let patch = s.me().rename(name);
            s.apply_local_update(&room, patch);
        }
        (s.status(), s.me(), s.snapshot().clone())
    })
    .await;
    let (status, me, snapshot) = match entered {
        Some(entered) => entered,
        None => {
            let s = session.lock();
            (SyncStatus::Error, s.me(), s.snapshot().clone())
        }
    };
    log::info!("entered room {code}");
    let _ = tx.send(render::room_header(&code, status));
    let _ = tx.send(render::table_view(&me, &snapshot));
    let _ = tx.send(render::ROOM_HELP.to_string());

    let sync = sync::start(session.clone(), code.clone(), options.poll_interval);
    let updates = sync.updates();
    ActiveRoom { room: code, sync, updates, seen: snapshot }
}

async fn leave_room(active: ActiveRoom) {
    log::info!("leaving room {}", active.room);
    active.sync.stop().await;
}

/// Resolves with the next polled snapshot, or never when no room is open.
async fn next_update(active: &mut Option<ActiveRoom>) -> RoomSnapshot {
    match active {
        Some(a) => {
            if a.updates.changed().await.is_err() {
                pending::<()>().await;
            }
            a.updates.borrow_and_update().clone()
        }
        None => pending().await,
    }
}

/// True when someone other than `me` appeared or changed their record.
fn others_changed(before: &RoomSnapshot, after: &RoomSnapshot, me: &str) -> bool {
    let others = |s: &RoomSnapshot| {
        s.players
            .iter()
            .filter(|(id, _)| id.as_str() != me)
            .map(|(id, p)| (id.clone(), p.clone()))
            .collect::<Vec<_>>()
    };
    others(before) != others(after)
}
