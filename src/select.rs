//! Preference-driven choice over the eligible solutions of one problem.
//!
//! Every strategy either produces a pick, declines (and the caller falls back
//! to a uniform random pick), or, for moods only, reports that nothing matched.

use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::model::Solution;
use crate::strategy::{Strategy, StrategyKind};

pub const RANDOM_REASON: &str = "Chosen at random.";
pub const TRENDY_REASON: &str = "Chosen for being trendy recently.";

/// Recoverable conditions met while selecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Notice {
    /// Every solution had been rejected, so the rejections were cleared.
    RepeatsReset,
    /// Ranking was requested but nothing is ranked; chose at random.
    NoRankedSolutions,
}

impl Notice {
    pub fn message(&self) -> &'static str {
        match self {
            Notice::RepeatsReset => {
                "All options have been rejected. Resetting the avoid-repeats list."
            }
            Notice::NoRankedSolutions => "No solutions have been ranked yet; choosing at random.",
        }
    }
}

#[derive(Debug)]
pub(crate) struct Pick<'a> {
    pub solution: &'a Solution,
    pub reason: String,
    pub decided_by: StrategyKind,
}

#[derive(Debug)]
pub(crate) enum Choice<'a> {
    Picked(Pick<'a>),
    NoMoodMatch,
}

/// `eligible` must not be empty.
pub(crate) fn choose<'a, 'r, R, I>(
    eligible: &[&'a Solution],
    strategy: &Strategy,
    recent: I,
    notices: &mut Vec<Notice>,
    rng: &mut R,
) -> Choice<'a>
where
    R: Rng + ?Sized,
    I: IntoIterator<Item = &'r str>,
{
    let preferred = match strategy {
        Strategy::Random => None,
        Strategy::Ranking => {
            let pick = by_ranking(eligible, rng);
            if pick.is_none() {
                notices.push(Notice::NoRankedSolutions);
            }
            pick
        }
        Strategy::Mood(tag) => match by_mood(eligible, tag, rng) {
            Some(pick) => Some(pick),
            None => return Choice::NoMoodMatch,
        },
        Strategy::MostChosen => most_chosen(eligible, rng),
        Strategy::LeastChosen => least_chosen(eligible, rng),
        Strategy::Trendy => trendy(eligible, recent),
    };
    match preferred.or_else(|| at_random(eligible, rng)) {
        Some(pick) => Choice::Picked(pick),
        // Only reachable with an empty slice.
        None => Choice::NoMoodMatch,
    }
}

fn at_random<'a, R: Rng + ?Sized>(eligible: &[&'a Solution], rng: &mut R) -> Option<Pick<'a>> {
    eligible.choose(rng).copied().map(|solution| Pick {
        solution,
        reason: RANDOM_REASON.to_string(),
        decided_by: StrategyKind::Random,
    })
}

fn by_ranking<'a, R: Rng + ?Sized>(eligible: &[&'a Solution], rng: &mut R) -> Option<Pick<'a>> {
    let best = eligible.iter().filter_map(|s| s.ranking()).min()?;
    let tied: Vec<&'a Solution> = eligible
        .iter()
        .copied()
        .filter(|s| s.ranking() == Some(best))
        .collect();
    tied.choose(rng).copied().map(|solution| Pick {
        solution,
        reason: format!("Chosen for its top rank of {best}."),
        decided_by: StrategyKind::Ranking,
    })
}

fn by_mood<'a, R: Rng + ?Sized>(
    eligible: &[&'a Solution],
    tag: &str,
    rng: &mut R,
) -> Option<Pick<'a>> {
    let wanted = tag.trim().to_lowercase();
    let matches: Vec<&'a Solution> = eligible
        .iter()
        .copied()
        .filter(|s| s.has_mood(&wanted))
        .collect();
    matches.choose(rng).copied().map(|solution| Pick {
        solution,
        reason: format!("Chosen for matching the mood '{wanted}'."),
        decided_by: StrategyKind::Mood,
    })
}

fn most_chosen<'a, R: Rng + ?Sized>(eligible: &[&'a Solution], rng: &mut R) -> Option<Pick<'a>> {
    let top = eligible
        .iter()
        .map(|s| s.history())
        .filter(|count| *count > 0)
        .max()?;
    let tied: Vec<&'a Solution> = eligible
        .iter()
        .copied()
        .filter(|s| s.history() == top)
        .collect();
    tied.choose(rng).copied().map(|solution| Pick {
        solution,
        reason: format!("Chosen for being the most popular ({top} times)."),
        decided_by: StrategyKind::MostChosen,
    })
}

fn least_chosen<'a, R: Rng + ?Sized>(
    eligible: &[&'a Solution],
    rng: &mut R,
) -> Option<Pick<'a>> {
    let bottom = eligible.iter().map(|s| s.history()).min()?;
    let tied: Vec<&'a Solution> = eligible
        .iter()
        .copied()
        .filter(|s| s.history() == bottom)
        .collect();
    tied.choose(rng).copied().map(|solution| Pick {
        solution,
        reason: format!("Chosen for being picked least often ({bottom} times)."),
        decided_by: StrategyKind::LeastChosen,
    })
}

fn trendy<'a, 'r, I>(eligible: &[&'a Solution], recent: I) -> Option<Pick<'a>>
where
    I: IntoIterator<Item = &'r str>,
{
    let favourite = most_frequent(recent)?;
    eligible
        .iter()
        .copied()
        .find(|s| s.text() == favourite)
        .map(|solution| Pick {
            solution,
            reason: TRENDY_REASON.to_string(),
            decided_by: StrategyKind::Trendy,
        })
}

/// Most frequent entry; ties go to the entry seen first.
pub(crate) fn most_frequent<'r, I>(window: I) -> Option<&'r str>
where
    I: IntoIterator<Item = &'r str>,
{
    let mut counts: Vec<(&'r str, usize)> = Vec::new();
    for text in window {
        match counts.iter_mut().find(|(seen, _)| *seen == text) {
            Some((_, count)) => *count += 1,
            None => counts.push((text, 1)),
        }
    }
    let mut best: Option<(&'r str, usize)> = None;
    for (text, count) in counts {
        if best.is_none_or(|(_, top)| count > top) {
            best = Some((text, count));
        }
    }
    best.map(|(text, _)| text)
}
