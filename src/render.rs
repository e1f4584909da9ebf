use crate::chips::Denomination;
use crate::models::{RoomSnapshot, SyncStatus};
use crate::participant::Participant;

pub const MENU_HELP: &str =
    "Commands: SOLO, CREATE, JOIN <code>, HELP, QUIT\n";

pub const ROOM_HELP: &str = "Commands: TABLE, BANK, LOBBY, BET <1|5|25|100|500|1000>, ALLIN, WIN, LOSE, \
SETBANK <amount>, DEPOSIT <100|500|1000>, NAME <name>, CLEAR, COPY, STATUS, LEAVE, QUIT\n";

/// Formats an amount with thousands separators: `12345` -> `$12,345`.
pub fn money(amount: i64) -> String {
    let digits = amount.unsigned_abs().to_string();
    let mut grouped = String::new();
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    let sign = if amount < 0 { "-" } else { "" };
    format!("{sign}${grouped}")
}

pub fn room_header(room: &str, status: SyncStatus) -> String {
    format!("Room {room} [{status}]\n")
}

/// Our chips on the table, the pot, and what we can still bet.
pub fn table_view(me: &Participant, snapshot: &RoomSnapshot) -> String {
    let mut out = String::new();
    let stacks = me.table.stacks();
    if stacks.is_empty() {
        out.push_str("Your chips: (none)\n");
    } else {
        let chips: Vec<String> = stacks
            .iter()
            .map(|(denom, count)| format!("{}x{}", denom.label(), count))
            .collect();
        out.push_str(&format!("Your chips: {}\n", chips.join(" ")));
    }
    out.push_str(&format!("Table pot: {}\n", money(snapshot.table_pot())));
    out.push_str(&format!(
        "Available: {} | In play: {}\n",
        money(me.available()),
        money(me.committed())
    ));
    let playable: Vec<String> = Denomination::LARGEST_FIRST
        .iter()
        .rev()
        .filter(|d| d.value() <= me.available())
        .map(|d| d.label())
        .collect();
    if playable.is_empty() {
        out.push_str("No chips affordable\n");
    } else {
        out.push_str(&format!("You can bet: {}\n", playable.join(", ")));
    }
    out
}

pub fn bank_view(me: &Participant) -> String {
    format!(
        "{} | Bank: {} | Committed: {} | Available: {}\n",
        me.name,
        money(me.bank),
        money(me.committed()),
        money(me.available())
    )
}

pub fn lobby_view(snapshot: &RoomSnapshot, my_id: &str) -> String {
    let mut out = format!("Players at {}:\n", snapshot.room);
    for p in snapshot.lobby() {
        let marker = if p.uid == my_id { "*" } else { " " };
        out.push_str(&format!(
            "{marker} {:<16} table {:>10}   bank {:>10}\n",
            p.name,
            money(p.committed()),
            money(p.bank)
        ));
    }
    out
}

/// One-line notice printed when another participant changes something.
pub fn pot_update(snapshot: &RoomSnapshot) -> String {
    format!(
        "[{}] {} players, pot {}\n",
        snapshot.room,
        snapshot.players.len(),
        money(snapshot.table_pot())
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Roster;

    #[test]
    fn money_formatting() {
        assert_eq!(money(0), "$0");
        assert_eq!(money(999), "$999");
        assert_eq!(money(1_000), "$1,000");
        assert_eq!(money(1_234_567), "$1,234,567");
        assert_eq!(money(-50), "-$50");
    }

    #[test]
    fn table_view_lists_stacks_and_affordable_chips() {
        let mut me = Participant::new("user_a".into(), "ACE".into(), 130, 0);
        me.table.add(Denomination::Hundred, 1);
        let mut players = Roster::new();
        players.insert(me.uid.clone(), me.clone());
        let snapshot = RoomSnapshot::new("R1".into(), players);

        let view = table_view(&me, &snapshot);
        assert!(view.contains("Your chips: 100x1"));
        assert!(view.contains("Table pot: $100"));
        assert!(view.contains("Available: $30 | In play: $100"));
        assert!(view.contains("You can bet: 1, 5, 25\n"));
    }

    #[test]
    fn lobby_marks_local_player() {
        let mut players = Roster::new();
        players.insert("a".into(), Participant::new("a".into(), "ALPHA".into(), 10, 2));
        players.insert("b".into(), Participant::new("b".into(), "BRAVO".into(), 20, 1));
        let snapshot = RoomSnapshot::new("R1".into(), players);
        let view = lobby_view(&snapshot, "b");
        let lines: Vec<&str> = view.lines().collect();
        assert!(lines[1].starts_with("  ALPHA"));
        assert!(lines[2].starts_with("* BRAVO"));
    }
}
