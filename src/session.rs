use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// How many accepted decisions the trendy strategy looks back over.
pub const RECENT_WINDOW: usize = 5;

/// Identifies the one outstanding suggestion. Feedback must present it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ticket(u64);

impl Ticket {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for Ticket {
    fn from(value: u64) -> Self {
        Ticket(value)
    }
}

impl FromStr for Ticket {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().trim_start_matches('#').parse().map(Ticket)
    }
}

impl fmt::Display for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Pending {
    pub ticket: Ticket,
    pub problem: String,
    pub solution: String,
    pub avoid_repeats: bool,
}

/// Per-run state that is never persisted.
#[derive(Debug, Default)]
pub struct Session {
    rejected: HashMap<String, HashSet<String>>,
    recent: VecDeque<String>,
    pending: Option<Pending>,
    last_ticket: u64,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rejected(&self, problem: &str) -> Option<&HashSet<String>> {
        self.rejected.get(problem)
    }

    /// Accepted solution texts, oldest first, at most [`RECENT_WINDOW`].
    pub fn recent(&self) -> impl Iterator<Item = &str> {
        self.recent.iter().map(String::as_str)
    }

    pub fn pending_ticket(&self) -> Option<Ticket> {
        self.pending.as_ref().map(|pending| pending.ticket)
    }

    pub(crate) fn reset_rejections(&mut self, problem: &str) {
        self.rejected.remove(problem);
    }

    pub(crate) fn record_rejection(&mut self, problem: &str, solution: &str) {
        self.rejected
            .entry(problem.to_string())
            .or_default()
            .insert(solution.to_string());
    }

    pub(crate) fn record_acceptance(&mut self, solution: &str) {
        self.recent.push_back(solution.to_string());
        while self.recent.len() > RECENT_WINDOW {
            self.recent.pop_front();
        }
    }

    /// Replaces any outstanding suggestion with a new one.
    pub(crate) fn issue(&mut self, problem: &str, solution: &str, avoid_repeats: bool) -> Ticket {
        self.last_ticket = self.last_ticket.saturating_add(1);
        let ticket = Ticket(self.last_ticket);
        self.pending = Some(Pending {
            ticket,
            problem: problem.to_string(),
            solution: solution.to_string(),
            avoid_repeats,
        });
        ticket
    }

    pub(crate) fn clear_pending(&mut self) {
        self.pending = None;
    }

    /// Hands out the pending suggestion only when `ticket` matches it.
    pub(crate) fn redeem(&mut self, ticket: Ticket) -> Option<Pending> {
        if self
            .pending
            .as_ref()
            .is_some_and(|pending| pending.ticket == ticket)
        {
            self.pending.take()
        } else {
            None
        }
    }

    pub(crate) fn forget_problem(&mut self, problem: &str) {
        self.rejected.remove(problem);
        if self
            .pending
            .as_ref()
            .is_some_and(|pending| pending.problem == problem)
        {
            self.pending = None;
        }
    }

    pub(crate) fn forget_solution(&mut self, problem: &str, solution: &str) {
        if let Some(rejected) = self.rejected.get_mut(problem) {
            rejected.remove(solution);
        }
        if self
            .pending
            .as_ref()
            .is_some_and(|pending| pending.problem == problem && pending.solution == solution)
        {
            self.pending = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recent_window_keeps_last_five() {
        let mut session = Session::new();
        for text in ["a", "b", "c", "d", "e", "f", "g"] {
            session.record_acceptance(text);
        }
        assert_eq!(session.recent().collect::<Vec<_>>(), ["c", "d", "e", "f", "g"]);
    }

    #[test]
    fn only_the_latest_ticket_redeems_once() {
        let mut session = Session::new();
        let first = session.issue("lunch", "pizza", false);
        let second = session.issue("lunch", "soup", true);
        assert_ne!(first, second);
        assert!(session.redeem(first).is_none());
        assert_eq!(session.pending_ticket(), Some(second));

        let pending = session.redeem(second).unwrap();
        assert_eq!(pending.solution, "soup");
        assert!(pending.avoid_repeats);
        assert!(session.redeem(second).is_none());
    }

    #[test]
    fn forgetting_a_problem_drops_its_state() {
        let mut session = Session::new();
        session.record_rejection("lunch", "pizza");
        session.issue("lunch", "soup", true);
        session.forget_problem("lunch");
        assert!(session.rejected("lunch").is_none());
        assert!(session.pending_ticket().is_none());
    }

    #[test]
    fn ticket_round_trips_through_text() {
        let ticket: Ticket = "#12".parse().unwrap();
        assert_eq!(ticket, Ticket::from(12));
        assert_eq!(ticket.to_string(), "#12");
        assert!("twelve".parse::<Ticket>().is_err());
    }
}
