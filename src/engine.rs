use rand::SeedableRng;
use rand::rngs::SmallRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::DecisionError;
use crate::model::{Decisions, Solution, normalize_moods, normalize_ranking};
use crate::select::{self, Choice, Notice};
use crate::session::{Session, Ticket};
use crate::stats::ProblemStats;
use crate::store::{LoadStatus, Loaded, Store};
use crate::strategy::{Strategy, StrategyKind};

/// What to select with.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectRequest {
    pub strategy: Strategy,
    /// Skip solutions rejected earlier in this session.
    pub avoid_repeats: bool,
}

impl SelectRequest {
    pub fn new(strategy: Strategy) -> Self {
        Self {
            strategy,
            avoid_repeats: false,
        }
    }

    pub fn avoid_repeats(mut self, avoid: bool) -> Self {
        self.avoid_repeats = avoid;
        self
    }
}

/// A proposed solution awaiting accept or reject.
///
/// `problem` and `solution` together identify the record in the engine;
/// [`Engine::resolve`] returns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    pub ticket: Ticket,
    pub problem: String,
    pub solution: String,
    pub reason: String,
    pub requested: StrategyKind,
    pub decided_by: StrategyKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notices: Vec<Notice>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SelectOutcome {
    Suggested(Suggestion),
    /// Nothing carries the mood; ask for another one.
    NoMoodMatch {
        mood: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        notices: Vec<Notice>,
    },
}

/// Field edits for [`Engine::update_solution`]. `None` leaves a field as is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolutionUpdate {
    /// Raw rank text; anything but a positive integer clears the rank.
    #[serde(default)]
    pub ranking: Option<String>,
    #[serde(default)]
    pub moods: Option<Vec<String>>,
}

impl SolutionUpdate {
    fn apply_to(&self, solution: &mut Solution) {
        if let Some(raw) = &self.ranking {
            solution.set_ranking(normalize_ranking(raw));
        }
        if let Some(moods) = &self.moods {
            solution.set_moods(normalize_moods(moods));
        }
    }
}

/// Owns the decisions, the store they persist to, and the session.
pub struct Engine<S: Store> {
    store: S,
    decisions: Decisions,
    session: Session,
    rng: SmallRng,
    load_status: LoadStatus,
}

impl<S: Store> Engine<S> {
    /// Loads from `store`. A corrupt or unreadable store starts empty; check
    /// [`Engine::load_status`] to tell the user.
    pub fn open(store: S) -> Self {
        Self::with_rng(store, SmallRng::from_entropy())
    }

    /// Like [`Engine::open`] with reproducible selections.
    pub fn with_seed(store: S, seed: u64) -> Self {
        Self::with_rng(store, SmallRng::seed_from_u64(seed))
    }

    fn with_rng(store: S, rng: SmallRng) -> Self {
        let Loaded { decisions, status } = store.load();
        match &status {
            LoadStatus::Corrupt(reason) | LoadStatus::Unreadable(reason) => {
                warn!(%reason, "ignoring saved decisions");
            }
            _ => debug!(problems = decisions.len(), status = ?status, "decisions loaded"),
        }
        Self {
            store,
            decisions,
            session: Session::new(),
            rng,
            load_status: status,
        }
    }

    pub fn load_status(&self) -> &LoadStatus {
        &self.load_status
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn decisions(&self) -> &Decisions {
        &self.decisions
    }

    pub fn problems(&self) -> impl Iterator<Item = &str> {
        self.decisions.keys().map(String::as_str)
    }

    /// Names are matched after trimming, the same way they were stored.
    pub fn solutions(&self, problem: &str) -> Result<&[Solution], DecisionError> {
        let problem = problem.trim();
        self.decisions
            .get(problem)
            .map(Vec::as_slice)
            .ok_or_else(|| DecisionError::problem_not_found(problem))
    }

    pub fn solution(&self, problem: &str, text: &str) -> Result<&Solution, DecisionError> {
        let (problem, text) = (problem.trim(), text.trim());
        self.solutions(problem)?
            .iter()
            .find(|s| s.text() == text)
            .ok_or_else(|| DecisionError::solution_not_found(problem, text))
    }

    pub fn add_problem(&mut self, name: &str) -> Result<(), DecisionError> {
        let name = require_text(name, "problem name")?;
        if self.decisions.contains_key(name) {
            return Err(DecisionError::DuplicateProblem {
                problem: name.to_string(),
            });
        }
        self.decisions.insert(name.to_string(), Vec::new());
        debug!(problem = name, "problem added");
        self.persist()
    }

    /// Irreversible: callers confirm with the user first.
    pub fn delete_problem(&mut self, name: &str) -> Result<(), DecisionError> {
        let name = name.trim();
        if self.decisions.remove(name).is_none() {
            return Err(DecisionError::problem_not_found(name));
        }
        self.session.forget_problem(name);
        debug!(problem = name, "problem deleted");
        self.persist()
    }

    pub fn add_solution(&mut self, problem: &str, text: &str) -> Result<(), DecisionError> {
        self.add_solution_with(problem, text, SolutionUpdate::default())?;
        Ok(())
    }

    /// Adds a solution with its rank and moods already set, in one save.
    pub fn add_solution_with(
        &mut self,
        problem: &str,
        text: &str,
        fields: SolutionUpdate,
    ) -> Result<&Solution, DecisionError> {
        let problem = problem.trim();
        let solutions = self
            .decisions
            .get_mut(problem)
            .ok_or_else(|| DecisionError::problem_not_found(problem))?;
        let text = require_text(text, "solution")?;
        if solutions.iter().any(|s| s.text() == text) {
            return Err(DecisionError::DuplicateSolution {
                problem: problem.to_string(),
                solution: text.to_string(),
            });
        }
        let mut solution = Solution::new(text);
        fields.apply_to(&mut solution);
        solutions.push(solution);
        debug!(problem, solution = text, "solution added");
        self.persist()?;
        self.solution(problem, text)
    }

    pub fn delete_solution(&mut self, problem: &str, text: &str) -> Result<(), DecisionError> {
        let (problem, text) = (problem.trim(), text.trim());
        let solutions = self
            .decisions
            .get_mut(problem)
            .ok_or_else(|| DecisionError::problem_not_found(problem))?;
        let position = solutions
            .iter()
            .position(|s| s.text() == text)
            .ok_or_else(|| DecisionError::solution_not_found(problem, text))?;
        solutions.remove(position);
        self.session.forget_solution(problem, text);
        debug!(problem, solution = text, "solution deleted");
        self.persist()
    }

    pub fn update_solution(
        &mut self,
        problem: &str,
        text: &str,
        update: SolutionUpdate,
    ) -> Result<&Solution, DecisionError> {
        let (problem, text) = (problem.trim(), text.trim());
        let solution = self
            .decisions
            .get_mut(problem)
            .ok_or_else(|| DecisionError::problem_not_found(problem))?
            .iter_mut()
            .find(|s| s.text() == text)
            .ok_or_else(|| DecisionError::solution_not_found(problem, text))?;
        update.apply_to(solution);
        debug!(problem, solution = text, "solution updated");
        self.persist()?;
        self.solution(problem, text)
    }

    /// Proposes one solution. Only session state changes: the rejection list
    /// may be reset and the new suggestion becomes the pending one.
    pub fn select(
        &mut self,
        problem: &str,
        request: &SelectRequest,
    ) -> Result<SelectOutcome, DecisionError> {
        let problem = problem.trim();
        let solutions = self
            .decisions
            .get(problem)
            .ok_or_else(|| DecisionError::problem_not_found(problem))?;
        if solutions.is_empty() {
            return Err(DecisionError::EmptySet {
                problem: problem.to_string(),
            });
        }

        let mut notices = Vec::new();
        let mut eligible: Vec<&Solution> = solutions.iter().collect();
        if request.avoid_repeats {
            if let Some(rejected) = self.session.rejected(problem) {
                eligible.retain(|s| !rejected.contains(s.text()));
            }
            if eligible.is_empty() {
                self.session.reset_rejections(problem);
                notices.push(Notice::RepeatsReset);
                eligible = solutions.iter().collect();
            }
        }

        let choice = select::choose(
            &eligible,
            &request.strategy,
            self.session.recent(),
            &mut notices,
            &mut self.rng,
        );
        let pick = match choice {
            Choice::Picked(pick) => pick,
            Choice::NoMoodMatch => {
                self.session.clear_pending();
                let mood = match &request.strategy {
                    Strategy::Mood(tag) => tag.clone(),
                    _ => String::new(),
                };
                debug!(problem, %mood, "no solution matches mood");
                return Ok(SelectOutcome::NoMoodMatch { mood, notices });
            }
        };

        let text = pick.solution.text().to_string();
        let ticket = self
            .session
            .issue(problem, &text, request.avoid_repeats);
        debug!(problem, solution = %text, %ticket, decided_by = %pick.decided_by, "suggested");
        Ok(SelectOutcome::Suggested(Suggestion {
            ticket,
            problem: problem.to_string(),
            solution: text,
            reason: pick.reason,
            requested: request.strategy.kind(),
            decided_by: pick.decided_by,
            notices,
        }))
    }

    /// The live record a suggestion points at, if it still exists.
    pub fn resolve(&self, suggestion: &Suggestion) -> Option<&Solution> {
        self.solution(&suggestion.problem, &suggestion.solution).ok()
    }

    /// Records that the pending suggestion was taken.
    pub fn accept(&mut self, ticket: Ticket) -> Result<&Solution, DecisionError> {
        let pending = self
            .session
            .redeem(ticket)
            .ok_or(DecisionError::StaleSuggestion { ticket })?;
        let solution = self
            .decisions
            .get_mut(&pending.problem)
            .and_then(|solutions| solutions.iter_mut().find(|s| s.text() == pending.solution))
            .ok_or_else(|| DecisionError::solution_not_found(&pending.problem, &pending.solution))?;
        solution.record_acceptance();
        self.session.record_acceptance(&pending.solution);
        debug!(problem = %pending.problem, solution = %pending.solution, %ticket, "accepted");
        self.persist()?;
        self.solution(&pending.problem, &pending.solution)
    }

    /// Records that the pending suggestion was turned down. With
    /// avoid-repeats on, it is skipped by later selections this session.
    pub fn reject(&mut self, ticket: Ticket) -> Result<(), DecisionError> {
        let pending = self
            .session
            .redeem(ticket)
            .ok_or(DecisionError::StaleSuggestion { ticket })?;
        if pending.avoid_repeats {
            self.session
                .record_rejection(&pending.problem, &pending.solution);
        }
        debug!(problem = %pending.problem, solution = %pending.solution, %ticket, "rejected");
        Ok(())
    }

    pub fn stats(&self, problem: &str) -> Result<ProblemStats, DecisionError> {
        let solutions = self.solutions(problem)?;
        Ok(ProblemStats::compute(problem.trim(), solutions))
    }

    fn persist(&self) -> Result<(), DecisionError> {
        self.store.save(&self.decisions).map_err(|err| {
            warn!(error = %err, "failed to save decisions");
            DecisionError::from(err)
        })
    }
}

fn require_text<'a>(value: &'a str, what: &str) -> Result<&'a str, DecisionError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DecisionError::Validation(format!("{what} must not be empty")));
    }
    Ok(trimmed)
}
