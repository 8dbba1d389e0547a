//! Record recurring problems and their candidate solutions, then let a
//! preference strategy pick one and learn from what gets accepted.
//!
//! ```no_run
//! use decision_fox::{Engine, JsonFileStore, SelectOutcome, SelectRequest, Strategy};
//!
//! let mut engine = Engine::open(JsonFileStore::new("decisions.json"));
//! engine.add_problem("lunch")?;
//! engine.add_solution("lunch", "pizza")?;
//! if let SelectOutcome::Suggested(suggestion) =
//!     engine.select("lunch", &SelectRequest::new(Strategy::Random))?
//! {
//!     println!("{}: {}", suggestion.solution, suggestion.reason);
//!     engine.accept(suggestion.ticket)?;
//! }
//! # Ok::<(), decision_fox::DecisionError>(())
//! ```

mod engine;
mod error;
mod model;
mod select;
mod session;
mod stats;
mod store;
mod strategy;

#[cfg(feature = "web")]
pub mod web;

pub use engine::{Engine, SelectOutcome, SelectRequest, SolutionUpdate, Suggestion};
pub use error::{DecisionError, ErrorKind, StoreError};
pub use model::{Decisions, Solution, normalize_moods, normalize_ranking, split_moods};
pub use select::Notice;
pub use session::{RECENT_WINDOW, Session, Ticket};
pub use stats::{ProblemStats, Tally};
pub use store::{
    DEFAULT_STORE_FILE, JsonFileStore, LoadStatus, Loaded, MemoryStore, Store, decode_document,
    encode_document,
};
pub use strategy::{GUIDE, ParseStrategyError, Strategy, StrategyKind};
