use serde::{Deserialize, Serialize};

use crate::model::Solution;

/// Solutions sharing the same acceptance count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    pub solutions: Vec<String>,
    pub times: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProblemStats {
    pub problem: String,
    pub solution_count: usize,
    /// `None` until something has been accepted.
    pub most_chosen: Option<Tally>,
    /// Never-chosen solutions win here; `None` only for an empty problem.
    pub least_chosen: Option<Tally>,
}

impl ProblemStats {
    pub fn compute(problem: &str, solutions: &[Solution]) -> Self {
        let most_chosen = solutions
            .iter()
            .map(Solution::history)
            .filter(|count| *count > 0)
            .max()
            .map(|top| tally(solutions, top));
        let least_chosen = solutions
            .iter()
            .map(Solution::history)
            .min()
            .map(|bottom| tally(solutions, bottom));
        Self {
            problem: problem.to_string(),
            solution_count: solutions.len(),
            most_chosen,
            least_chosen,
        }
    }
}

fn tally(solutions: &[Solution], times: u32) -> Tally {
    Tally {
        solutions: solutions
            .iter()
            .filter(|s| s.history() == times)
            .map(|s| s.text().to_string())
            .collect(),
        times,
    }
}
