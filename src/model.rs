use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Problem name to its candidate solutions, in insertion order.
pub type Decisions = BTreeMap<String, Vec<Solution>>;

/// One candidate answer to a problem.
///
/// The serialized field names (`solutions`, `ranking`, `mood`, `history`) are
/// the on-disk layout shared with older versions of the program. Decoding is
/// lenient about the loosely typed values those versions wrote; encoding is
/// always canonical.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Solution {
    #[serde(rename = "solutions")]
    text: String,
    #[serde(
        default,
        serialize_with = "serialize_ranking",
        deserialize_with = "deserialize_ranking"
    )]
    ranking: Option<u32>,
    #[serde(rename = "mood", default, deserialize_with = "deserialize_moods")]
    moods: Vec<String>,
    #[serde(default, deserialize_with = "deserialize_history")]
    history: u32,
}

impl Solution {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ranking: None,
            moods: Vec::new(),
            history: 0,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Positive rank, lower is better. `None` means unranked.
    pub fn ranking(&self) -> Option<u32> {
        self.ranking
    }

    pub fn moods(&self) -> &[String] {
        &self.moods
    }

    pub fn history(&self) -> u32 {
        self.history
    }

    /// Case-insensitive mood membership.
    pub fn has_mood(&self, mood: &str) -> bool {
        let wanted = mood.trim().to_lowercase();
        self.moods.iter().any(|tag| *tag == wanted)
    }

    pub(crate) fn set_ranking(&mut self, ranking: Option<u32>) {
        self.ranking = ranking.filter(|rank| *rank > 0);
    }

    pub(crate) fn set_moods<I, T>(&mut self, moods: I)
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        self.moods = normalize_moods(moods);
    }

    pub(crate) fn record_acceptance(&mut self) {
        self.history = self.history.saturating_add(1);
    }

    #[cfg(test)]
    pub(crate) fn with_ranking(mut self, ranking: u32) -> Self {
        self.set_ranking(Some(ranking));
        self
    }

    #[cfg(test)]
    pub(crate) fn with_moods(mut self, moods: &[&str]) -> Self {
        self.set_moods(moods);
        self
    }

    #[cfg(test)]
    pub(crate) fn with_history(mut self, history: u32) -> Self {
        self.history = history;
        self
    }
}

/// Parses a user-supplied rank. Anything other than a positive integer
/// (blank, text, zero, negative) means unranked.
pub fn normalize_ranking(raw: &str) -> Option<u32> {
    raw.trim()
        .parse::<i64>()
        .ok()
        .filter(|rank| *rank > 0)
        .and_then(|rank| u32::try_from(rank).ok())
}

/// Trims and lowercases mood tags, dropping blanks and repeats while keeping
/// first-seen order.
pub fn normalize_moods<I, T>(moods: I) -> Vec<String>
where
    I: IntoIterator<Item = T>,
    T: AsRef<str>,
{
    let mut out: Vec<String> = Vec::new();
    for mood in moods {
        let tag = mood.as_ref().trim().to_lowercase();
        if !tag.is_empty() && !out.contains(&tag) {
            out.push(tag);
        }
    }
    out
}

/// Splits a comma-separated mood list as typed into an edit field.
pub fn split_moods(raw: &str) -> Vec<String> {
    normalize_moods(raw.split(','))
}

fn serialize_ranking<S>(ranking: &Option<u32>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    // Older readers compare the field numerically, so unranked is written as 0.
    serializer.serialize_u32(ranking.unwrap_or(0))
}

fn deserialize_ranking<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Number(number) => number
            .as_i64()
            .filter(|rank| *rank > 0)
            .and_then(|rank| u32::try_from(rank).ok()),
        Value::String(text) => normalize_ranking(&text),
        _ => None,
    })
}

fn deserialize_moods<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Array(items) => {
            normalize_moods(items.iter().filter_map(|item| item.as_str()))
        }
        Value::String(text) => split_moods(&text),
        _ => Vec::new(),
    })
}

fn deserialize_history<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let count = match value {
        Value::Number(number) => number.as_u64(),
        Value::String(text) => text.trim().parse::<u64>().ok(),
        _ => None,
    };
    Ok(count
        .map(|count| u32::try_from(count).unwrap_or(u32::MAX))
        .unwrap_or(0))
}
