use serde::de::Deserializer;
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Denomination {
    One = 1,
    Five = 5,
    TwentyFive = 25,
    Hundred = 100,
    FiveHundred = 500,
    Thousand = 1000,
}

impl Denomination {
    /// All denominations, largest first. `all_in` breaks the available bank
    /// down in this order.
    pub const LARGEST_FIRST: [Denomination; 6] = [
        Denomination::Thousand,
        Denomination::FiveHundred,
        Denomination::Hundred,
        Denomination::TwentyFive,
        Denomination::Five,
        Denomination::One,
    ];

    pub const SMALLEST: Denomination = Denomination::One;

    pub fn value(self) -> i64 {
        self as i64
    }

    pub fn from_value(value: i64) -> Option<Self> {
        Self::LARGEST_FIRST.into_iter().find(|d| d.value() == value)
    }

    /// Short label used on chips: 1000 shows as `1K`.
    pub fn label(self) -> String {
        if self.value() >= 1000 {
            format!("{}K", self.value() / 1000)
        } else {
            self.value().to_string()
        }
    }
}

/// Chip counts per denomination placed on the table by one participant.
///
/// Serialized as a JSON object keyed by the denomination value
/// (`{"1": 0, "5": 2, ...}`), always with all six denominations present.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableChips {
    counts: BTreeMap<Denomination, u32>,
}

impl TableChips {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, denom: Denomination) -> u32 {
        self.counts.get(&denom).copied().unwrap_or(0)
    }

    /// Adds up to `count` chips, saturating at `u32::MAX` per stack.
    /// Returns how many were actually added.
    pub fn add(&mut self, denom: Denomination, count: u32) -> u32 {
        if count == 0 {
            return 0;
        }
        let stack = self.counts.entry(denom).or_insert(0);
        let before = *stack;
        *stack = before.saturating_add(count);
        *stack - before
    }

    pub fn total(&self) -> i64 {
        self.counts
            .iter()
            .map(|(denom, count)| denom.value() * i64::from(*count))
            .fold(0, i64::saturating_add)
    }

    pub fn is_empty(&self) -> bool {
        self.counts.values().all(|c| *c == 0)
    }

    /// Non-zero stacks, largest denomination first.
    pub fn stacks(&self) -> Vec<(Denomination, u32)> {
        Denomination::LARGEST_FIRST
            .into_iter()
            .map(|d| (d, self.count(d)))
            .filter(|(_, c)| *c > 0)
            .collect()
    }
}

impl Serialize for TableChips {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(Denomination::LARGEST_FIRST.len()))?;
        for denom in Denomination::LARGEST_FIRST.iter().rev() {
            map.serialize_entry(&denom.value().to_string(), &self.count(*denom))?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for TableChips {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = BTreeMap::<String, u32>::deserialize(deserializer)?;
        let mut chips = TableChips::new();
        for (key, count) in raw {
            // Unknown denominations written by other clients are dropped;
            // keys naming the same denomination ("1", "01") add up.
            match key.parse::<i64>().ok().and_then(Denomination::from_value) {
                Some(denom) => {
                    chips.add(denom, count);
                }
                None => log::debug!("ignoring unknown denomination {key:?}"),
            }
        }
        Ok(chips)
    }
}
