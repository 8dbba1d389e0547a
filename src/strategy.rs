use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::DecisionError;

/// Preference strategies without their arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Random,
    Ranking,
    Mood,
    MostChosen,
    LeastChosen,
    Trendy,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 6] = [
        StrategyKind::Random,
        StrategyKind::Ranking,
        StrategyKind::Mood,
        StrategyKind::MostChosen,
        StrategyKind::LeastChosen,
        StrategyKind::Trendy,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            StrategyKind::Random => "default (random)",
            StrategyKind::Ranking => "ranking",
            StrategyKind::Mood => "mood",
            StrategyKind::MostChosen => "most chosen",
            StrategyKind::LeastChosen => "least chosen",
            StrategyKind::Trendy => "trendy",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown strategy {0:?}; try random, ranking, mood, most chosen, least chosen or trendy")]
pub struct ParseStrategyError(String);

impl FromStr for StrategyKind {
    type Err = ParseStrategyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace(['-', '_'], " ");
        let kind = match normalized.as_str() {
            "random" | "rand" | "r" | "default" | "default (random)" => StrategyKind::Random,
            "ranking" | "rank" | "num" | "number" | "n" | "#" => StrategyKind::Ranking,
            "mood" | "scene" | "scenario" | "context" | "circumstance" | "circum" | "s" => {
                StrategyKind::Mood
            }
            "most chosen" | "most" | "history" | "previous" | "popular" => {
                StrategyKind::MostChosen
            }
            "least chosen" | "least" => StrategyKind::LeastChosen,
            "trendy" | "trend" => StrategyKind::Trendy,
            _ => return Err(ParseStrategyError(s.to_string())),
        };
        Ok(kind)
    }
}

/// A strategy together with its argument.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Strategy {
    #[default]
    Random,
    Ranking,
    /// Lowercased, trimmed mood tag.
    Mood(String),
    MostChosen,
    LeastChosen,
    Trendy,
}

impl Strategy {
    /// Builds a mood strategy; the tag is case-folded and must not be blank.
    pub fn mood(tag: &str) -> Result<Self, DecisionError> {
        let tag = tag.trim().to_lowercase();
        if tag.is_empty() {
            return Err(DecisionError::Validation(
                "mood must not be empty".to_string(),
            ));
        }
        Ok(Strategy::Mood(tag))
    }

    /// Combines a parsed kind with the mood argument the shell collected.
    pub fn from_kind(kind: StrategyKind, mood: Option<&str>) -> Result<Self, DecisionError> {
        Ok(match kind {
            StrategyKind::Random => Strategy::Random,
            StrategyKind::Ranking => Strategy::Ranking,
            StrategyKind::Mood => Strategy::mood(mood.unwrap_or_default())?,
            StrategyKind::MostChosen => Strategy::MostChosen,
            StrategyKind::LeastChosen => Strategy::LeastChosen,
            StrategyKind::Trendy => Strategy::Trendy,
        })
    }

    pub fn kind(&self) -> StrategyKind {
        match self {
            Strategy::Random => StrategyKind::Random,
            Strategy::Ranking => StrategyKind::Ranking,
            Strategy::Mood(_) => StrategyKind::Mood,
            Strategy::MostChosen => StrategyKind::MostChosen,
            Strategy::LeastChosen => StrategyKind::LeastChosen,
            Strategy::Trendy => StrategyKind::Trendy,
        }
    }
}

/// Markdown shown by the shells' help screens.
pub const GUIDE: &str = "\
# How it works

- **Default (Random)**: picks any solution at random.
- **Ranking**: picks from the solutions with the lowest rank number (1 is best).
- **Mood**: suggests a solution tagged with the mood you enter.
- **Most Chosen**: picks from the solutions accepted most often.
- **Least Chosen**: picks from the solutions accepted least often, including never.
- **Trendy**: picks the solution accepted most often in your last 5 decisions.
- **Avoid Repeats**: skips solutions you rejected this session until every option has been rejected.
";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_labels_and_aliases() {
        for kind in StrategyKind::ALL {
            assert_eq!(kind.label().parse::<StrategyKind>().unwrap(), kind);
        }
        assert_eq!("NUM".parse::<StrategyKind>().unwrap(), StrategyKind::Ranking);
        assert_eq!("circum".parse::<StrategyKind>().unwrap(), StrategyKind::Mood);
        assert_eq!(
            "most-chosen".parse::<StrategyKind>().unwrap(),
            StrategyKind::MostChosen
        );
        assert_eq!(
            "least_chosen".parse::<StrategyKind>().unwrap(),
            StrategyKind::LeastChosen
        );
        assert_eq!(" Trendy ".parse::<StrategyKind>().unwrap(), StrategyKind::Trendy);
        assert!("coin flip".parse::<StrategyKind>().is_err());
    }

    #[test]
    fn mood_strategy_needs_a_tag() {
        assert_eq!(
            Strategy::from_kind(StrategyKind::Mood, Some(" Happy ")).unwrap(),
            Strategy::Mood("happy".to_string())
        );
        assert!(Strategy::from_kind(StrategyKind::Mood, None).is_err());
        assert!(Strategy::mood("   ").is_err());
        assert_eq!(
            Strategy::from_kind(StrategyKind::Trendy, Some("ignored")).unwrap(),
            Strategy::Trendy
        );
    }
}
