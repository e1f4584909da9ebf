use crate::chips::{Denomination, TableChips};
use crate::models::ParticipantId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One participant's record as stored under the room key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Participant {
    pub uid: ParticipantId,
    pub name: String,
    pub bank: i64,
    pub table: TableChips,
    /// Milliseconds since the Unix epoch of the last change.
    #[serde(rename = "lastUpdate")]
    pub last_update: u64,
}

/// Partial record merged into the local participant by
/// `SessionStore::apply_local_update`. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParticipantPatch {
    pub name: Option<String>,
    pub bank: Option<i64>,
    pub table: Option<TableChips>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Win,
    Lose,
}

/// Reasons a participant action is refused. Refusals leave the record
/// untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ActionError {
    #[error("insufficient funds: {available} available, {needed} needed")]
    InsufficientFunds { available: i64, needed: i64 },
    #[error("bank {proposed} is below the {committed} committed to the table")]
    BelowCommitted { proposed: i64, committed: i64 },
    #[error("bank cannot be negative")]
    NegativeBank,
    #[error("nothing on the table to settle")]
    NothingToSettle,
    #[error("nothing available to go all-in with")]
    NothingAvailable,
    #[error("deposit amount must be positive")]
    InvalidDeposit,
    #[error("unknown chip denomination {0}")]
    UnknownDenomination(i64),
    #[error("bank would leave the range 0..={}", MAX_BANK)]
    BankOutOfRange,
    #[error("stack of {0:?} chips is full")]
    StackFull(Denomination),
}

/// Largest bank a participant can set or deposit up to. Keeps every
/// all-in breakdown within the per-stack chip count.
pub const MAX_BANK: i64 = 1_000_000_000_000;

impl ParticipantPatch {
    pub fn name(name: impl Into<String>) -> Self {
        Self { name: Some(name.into()), ..Self::default() }
    }

    pub fn bank(bank: i64) -> Self {
        Self { bank: Some(bank), ..Self::default() }
    }

    pub fn table(table: TableChips) -> Self {
        Self { table: Some(table), ..Self::default() }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.bank.is_none() && self.table.is_none()
    }
}

impl Participant {
    /// Fresh record for a participant seen in a room for the first time.
    pub fn new(uid: ParticipantId, name: String, bank: i64, now: u64) -> Self {
        Self {
            uid,
            name,
            bank,
            table: TableChips::new(),
            last_update: now,
        }
    }

    pub fn committed(&self) -> i64 {
        self.table.total()
    }

    /// Bank not yet placed on the table.
    pub fn available(&self) -> i64 {
        self.bank.saturating_sub(self.committed())
    }

    /// Shallow merge: each field present in the patch replaces ours.
    pub fn merge(&mut self, patch: ParticipantPatch, now: u64) {
        if let Some(name) = patch.name {
            self.name = name;
        }
        if let Some(bank) = patch.bank {
            self.bank = bank;
        }
        if let Some(table) = patch.table {
            self.table = table;
        }
        self.last_update = now;
    }

    pub fn add_chip(&self, denom: Denomination) -> Result<ParticipantPatch, ActionError> {
        let available = self.available();
        if available < denom.value() {
            return Err(ActionError::InsufficientFunds { available, needed: denom.value() });
        }
        let mut table = self.table.clone();
        if table.add(denom, 1) == 0 {
            return Err(ActionError::StackFull(denom));
        }
        Ok(ParticipantPatch::table(table))
    }

    /// Converts everything available into chips, largest denomination first.
    pub fn all_in(&self) -> Result<ParticipantPatch, ActionError> {
        let mut remaining = self.available();
        if remaining <= 0 {
            return Err(ActionError::NothingAvailable);
        }
        let mut table = self.table.clone();
        for denom in Denomination::LARGEST_FIRST {
            let count = u32::try_from(remaining / denom.value()).unwrap_or(u32::MAX);
            // A full stack spills what it cannot take to the next denomination.
            let added = table.add(denom, count);
            remaining -= i64::from(added) * denom.value();
        }
        Ok(ParticipantPatch::table(table))
    }

    /// Credits (win) or debits (lose) our own committed chips and clears
    /// the table. The shared pot is not redistributed.
    pub fn settle(&self, outcome: Outcome) -> Result<ParticipantPatch, ActionError> {
        let committed = self.committed();
        if committed <= 0 {
            return Err(ActionError::NothingToSettle);
        }
        let bank = match outcome {
            Outcome::Win => self.bank.checked_add(committed),
            Outcome::Lose => self.bank.checked_sub(committed),
        }
        .ok_or(ActionError::BankOutOfRange)?;
        Ok(ParticipantPatch {
            bank: Some(bank),
            table: Some(TableChips::new()),
            ..ParticipantPatch::default()
        })
    }

    /// Manual bank edit. Never below what is on the table, never negative.
    pub fn set_bank(&self, proposed: i64) -> Result<ParticipantPatch, ActionError> {
        let committed = self.committed();
        if proposed < committed {
            return Err(ActionError::BelowCommitted { proposed, committed });
        }
        if proposed < 0 {
            return Err(ActionError::NegativeBank);
        }
        if proposed > MAX_BANK {
            return Err(ActionError::BankOutOfRange);
        }
        Ok(ParticipantPatch::bank(proposed))
    }

    pub fn deposit(&self, amount: i64) -> Result<ParticipantPatch, ActionError> {
        if amount <= 0 {
            return Err(ActionError::InvalidDeposit);
        }
        match self.bank.checked_add(amount) {
            Some(bank) if bank <= MAX_BANK => Ok(ParticipantPatch::bank(bank)),
            _ => Err(ActionError::BankOutOfRange),
        }
    }

    pub fn clear_table(&self) -> ParticipantPatch {
        ParticipantPatch::table(TableChips::new())
    }

    pub fn rename(&self, name: &str) -> ParticipantPatch {
        ParticipantPatch::name(name.trim().to_uppercase())
    }
}
