use std::error::Error;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use atty::Stream;
use clap::{Parser, Subcommand, ValueEnum};
use decision_fox::{
    DEFAULT_STORE_FILE, Engine, ErrorKind, GUIDE, JsonFileStore, Notice, ProblemStats,
    SelectOutcome, SelectRequest, Solution, SolutionUpdate, Store, Strategy, StrategyKind,
    Suggestion, Tally, split_moods,
};
use serde_json::json;
use termimad::{FmtText, MadSkin, terminal_size};

type Result<T> = std::result::Result<T, Box<dyn Error>>;

#[derive(Parser, Debug)]
#[command(
    name = "decision-fox",
    about = "Keep track of recurring decisions and let a strategy pick for you",
    version
)]
pub struct Cli {
    /// Emit JSON instead of human-readable tables.
    #[arg(long, global = true)]
    json: bool,

    /// Decisions file to read and write.
    #[arg(
        long,
        global = true,
        env = "DECISION_FOX_STORE",
        default_value = DEFAULT_STORE_FILE
    )]
    store: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Manage problems.
    #[command(subcommand)]
    Problem(ProblemCommand),
    /// Manage the solutions of a problem.
    #[command(subcommand)]
    Solution(SolutionCommand),
    /// Suggest a solution and record whether it was taken.
    Choose {
        problem: String,
        /// Strategy: random, ranking, mood, most-chosen, least-chosen or trendy.
        #[arg(long, default_value = "random")]
        by: StrategyKind,
        /// Mood tag for the mood strategy.
        #[arg(long)]
        mood: Option<String>,
        /// Skip solutions rejected earlier in this run.
        #[arg(long)]
        avoid_repeats: bool,
        /// Answer the suggestion without prompting.
        #[arg(long, value_enum)]
        answer: Option<Answer>,
    },
    /// Show how often solutions were chosen.
    Stats { problem: String },
    /// Explain the strategies.
    Guide,
    /// Serve the JSON API over HTTP.
    #[cfg(feature = "web")]
    Serve {
        /// Address to bind.
        #[arg(long, default_value = "127.0.0.1:8080")]
        addr: std::net::SocketAddr,
    },
}

#[derive(Subcommand, Debug)]
enum ProblemCommand {
    /// Register a new problem.
    Add { name: String },
    /// Delete a problem and all of its solutions.
    Delete {
        name: String,
        /// Do not ask for confirmation.
        #[arg(long)]
        yes: bool,
    },
    /// List problems.
    List,
}

#[derive(Subcommand, Debug)]
enum SolutionCommand {
    /// Add a solution to a problem.
    Add {
        problem: String,
        text: String,
        /// Rank, 1 is best. Anything but a positive number leaves it unranked.
        #[arg(long)]
        rank: Option<String>,
        /// Comma-separated mood tags.
        #[arg(long)]
        moods: Option<String>,
    },
    /// Remove a solution.
    Delete { problem: String, text: String },
    /// Change a solution's rank or moods.
    Edit {
        problem: String,
        text: String,
        #[arg(long)]
        rank: Option<String>,
        /// Comma-separated mood tags; an empty value clears them.
        #[arg(long)]
        moods: Option<String>,
    },
    /// List the solutions of a problem.
    List { problem: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Answer {
    Accept,
    Reject,
    Skip,
}

impl Answer {
    fn as_str(self) -> &'static str {
        match self {
            Answer::Accept => "accept",
            Answer::Reject => "reject",
            Answer::Skip => "skip",
        }
    }
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let as_json = cli.json;
    match cli.command {
        Command::Problem(command) => handle_problem(&mut open_engine(cli.store), command, as_json),
        Command::Solution(command) => {
            handle_solution(&mut open_engine(cli.store), command, as_json)
        }
        Command::Choose {
            problem,
            by,
            mood,
            avoid_repeats,
            answer,
        } => {
            let mut engine = open_engine(cli.store);
            let strategy = resolve_strategy(by, mood)?;
            let request = SelectRequest::new(strategy).avoid_repeats(avoid_repeats);
            match answer {
                None if !as_json && stdin_is_tty() => choose_interactive(
                    &mut engine,
                    &problem,
                    request,
                    &mut io::stdin().lock(),
                    &mut io::stdout(),
                ),
                answer => choose_once(
                    &mut engine,
                    &problem,
                    &request,
                    answer.unwrap_or(Answer::Skip),
                    as_json,
                ),
            }
        }
        Command::Stats { problem } => handle_stats(&open_engine(cli.store), &problem, as_json),
        Command::Guide => handle_guide(as_json),
        #[cfg(feature = "web")]
        Command::Serve { addr } => handle_serve(addr, cli.store),
    }
}

fn open_engine(path: PathBuf) -> Engine<JsonFileStore> {
    let engine = Engine::open(JsonFileStore::new(path));
    if let Some(warning) = engine.load_status().warning() {
        eprintln!("warning: {warning}");
    }
    engine
}

fn handle_problem(
    engine: &mut Engine<JsonFileStore>,
    command: ProblemCommand,
    as_json: bool,
) -> Result<()> {
    match command {
        ProblemCommand::Add { name } => {
            engine.add_problem(&name)?;
            let name = name.trim();
            if as_json {
                print_json(&json!({ "added": name }))?;
            } else {
                println!("Added problem \"{name}\".");
            }
        }
        ProblemCommand::Delete { name, yes } => {
            if !yes && !confirm_delete(&name)? {
                println!("Kept problem \"{name}\".");
                return Ok(());
            }
            engine.delete_problem(&name)?;
            if as_json {
                print_json(&json!({ "deleted": name }))?;
            } else {
                println!("Deleted problem \"{name}\".");
            }
        }
        ProblemCommand::List => {
            let rows: Vec<(&str, usize)> = engine
                .decisions()
                .iter()
                .map(|(name, solutions)| (name.as_str(), solutions.len()))
                .collect();
            if as_json {
                let payload: Vec<_> = rows
                    .iter()
                    .map(|(name, count)| json!({ "problem": name, "solutions": count }))
                    .collect();
                print_json(&payload)?;
            } else {
                print_problem_table(&rows);
            }
        }
    }
    Ok(())
}

fn confirm_delete(name: &str) -> Result<bool> {
    if !stdin_is_tty() {
        return Err(format!("refusing to delete problem {name:?} without --yes").into());
    }
    let reply = prompt(
        &mut io::stdin().lock(),
        &mut io::stdout(),
        &format!("Delete problem \"{name}\" and all its solutions? [y/N] "),
    )?;
    Ok(reply.is_some_and(|reply| matches!(reply.to_lowercase().as_str(), "y" | "yes")))
}

fn handle_solution(
    engine: &mut Engine<JsonFileStore>,
    command: SolutionCommand,
    as_json: bool,
) -> Result<()> {
    match command {
        SolutionCommand::Add {
            problem,
            text,
            rank,
            moods,
        } => {
            let fields = SolutionUpdate {
                ranking: rank,
                moods: moods.as_deref().map(split_moods),
            };
            let solution = engine.add_solution_with(&problem, &text, fields)?;
            if as_json {
                print_json(&json!({ "problem": problem, "added": solution }))?;
            } else {
                println!("Added \"{}\" to \"{problem}\".", solution.text());
            }
        }
        SolutionCommand::Delete { problem, text } => {
            engine.delete_solution(&problem, &text)?;
            if as_json {
                print_json(&json!({ "problem": problem, "deleted": text }))?;
            } else {
                println!("Removed \"{text}\" from \"{problem}\".");
            }
        }
        SolutionCommand::Edit {
            problem,
            text,
            rank,
            moods,
        } => {
            if rank.is_none() && moods.is_none() {
                return Err("nothing to change; pass --rank and/or --moods".into());
            }
            let update = SolutionUpdate {
                ranking: rank,
                moods: moods.as_deref().map(split_moods),
            };
            let solution = engine.update_solution(&problem, &text, update)?;
            if as_json {
                print_json(&json!({ "problem": problem, "updated": solution }))?;
            } else {
                print_solution_table(&problem, std::slice::from_ref(solution));
            }
        }
        SolutionCommand::List { problem } => {
            let solutions = engine.solutions(&problem)?;
            if as_json {
                print_json(&json!({ "problem": problem, "solutions": solutions }))?;
            } else {
                print_solution_table(&problem, solutions);
            }
        }
    }
    Ok(())
}

fn resolve_strategy(kind: StrategyKind, mood: Option<String>) -> Result<Strategy> {
    if kind == StrategyKind::Mood && mood.is_none() && stdin_is_tty() {
        let tag = prompt(
            &mut io::stdin().lock(),
            &mut io::stdout(),
            "Enter your current mood: ",
        )?;
        return Ok(Strategy::mood(&tag.unwrap_or_default())?);
    }
    Ok(Strategy::from_kind(kind, mood.as_deref())?)
}

fn choose_once(
    engine: &mut Engine<JsonFileStore>,
    problem: &str,
    request: &SelectRequest,
    answer: Answer,
    as_json: bool,
) -> Result<()> {
    let outcome = engine.select(problem, request)?;
    let history = match (&outcome, answer) {
        (SelectOutcome::Suggested(suggestion), Answer::Accept) => {
            Some(engine.accept(suggestion.ticket)?.history())
        }
        (SelectOutcome::Suggested(suggestion), Answer::Reject) => {
            engine.reject(suggestion.ticket)?;
            None
        }
        _ => None,
    };

    if as_json {
        return print_json(&json!({
            "suggestion": outcome,
            "answer": answer.as_str(),
            "history": history,
        }));
    }
    let mut out = io::stdout();
    match &outcome {
        SelectOutcome::Suggested(suggestion) => {
            write_suggestion(&mut out, suggestion)?;
            if let Some(times) = history {
                writeln!(out, "Accepted; chosen {times} time(s) so far.")?;
            } else if answer == Answer::Reject {
                writeln!(out, "Rejected.")?;
            }
        }
        SelectOutcome::NoMoodMatch { mood, notices } => {
            write_notices(&mut out, notices)?;
            writeln!(out, "No solutions match the mood '{mood}'. Try a different mood.")?;
        }
    }
    Ok(())
}

/// Keeps suggesting until the user quits. One engine serves every decision,
/// so rejections and the recent-acceptance window carry over between them.
fn choose_interactive<S, R, W>(
    engine: &mut Engine<S>,
    problem: &str,
    mut request: SelectRequest,
    input: &mut R,
    out: &mut W,
) -> Result<()>
where
    S: Store,
    R: BufRead,
    W: Write,
{
    let mut problem = problem.trim().to_string();
    loop {
        let suggestion = match engine.select(&problem, &request) {
            Ok(SelectOutcome::Suggested(suggestion)) => suggestion,
            Ok(SelectOutcome::NoMoodMatch { mood, notices }) => {
                write_notices(out, &notices)?;
                writeln!(out, "No solutions match the mood '{mood}'.")?;
                match prompt(input, out, "Try another mood (blank to stop): ")? {
                    Some(tag) if !tag.is_empty() => {
                        request.strategy = Strategy::mood(&tag)?;
                        continue;
                    }
                    _ => return Ok(()),
                }
            }
            Err(err) if err.kind() != ErrorKind::Io => {
                writeln!(out, "{err}")?;
                match next_problem(input, out, &problem)? {
                    Some(next) => {
                        problem = next;
                        continue;
                    }
                    None => return Ok(()),
                }
            }
            Err(err) => return Err(err.into()),
        };

        write_suggestion(out, &suggestion)?;
        let reply = prompt(input, out, "[a]ccept, [r]eject or [q]uit? ")?.unwrap_or_default();
        match reply.to_lowercase().chars().next() {
            Some('a') => {
                let solution = engine.accept(suggestion.ticket)?;
                writeln!(
                    out,
                    "Enjoy \"{}\"; chosen {} time(s) so far.",
                    solution.text(),
                    solution.history()
                )?;
                match next_problem(input, out, &problem)? {
                    Some(next) => problem = next,
                    None => return Ok(()),
                }
            }
            Some('r') => {
                engine.reject(suggestion.ticket)?;
                writeln!(out, "Rejected. Here's another idea.")?;
            }
            _ => return Ok(()),
        }
    }
}

/// Asks what to decide next; blank repeats `current`, `q` or end of input stops.
fn next_problem<R: BufRead, W: Write>(
    input: &mut R,
    out: &mut W,
    current: &str,
) -> Result<Option<String>> {
    let question = format!("Next decision (blank for \"{current}\", q to quit): ");
    Ok(match prompt(input, out, &question)? {
        None => None,
        Some(reply) if matches!(reply.to_lowercase().as_str(), "q" | "quit" | "exit") => None,
        Some(reply) if reply.is_empty() => Some(current.to_string()),
        Some(reply) => Some(reply),
    })
}

fn handle_stats(engine: &Engine<JsonFileStore>, problem: &str, as_json: bool) -> Result<()> {
    let stats = engine.stats(problem)?;
    if as_json {
        return print_json(&stats);
    }
    print_stats(&stats);
    Ok(())
}

fn handle_guide(as_json: bool) -> Result<()> {
    if as_json {
        let strategies: Vec<_> = StrategyKind::ALL
            .iter()
            .map(|kind| json!({ "strategy": kind, "label": kind.label() }))
            .collect();
        return print_json(&json!({ "guide": GUIDE, "strategies": strategies }));
    }
    render_markdown(GUIDE);
    Ok(())
}

#[cfg(feature = "web")]
fn handle_serve(addr: std::net::SocketAddr, store: PathBuf) -> Result<()> {
    use decision_fox::web::{WebConfig, serve};

    let config = WebConfig {
        addr,
        store_path: store,
    };
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(serve(config))?;
    Ok(())
}

fn print_json<T: serde::Serialize + ?Sized>(payload: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(payload)?);
    Ok(())
}

fn write_notices<W: Write>(out: &mut W, notices: &[Notice]) -> io::Result<()> {
    for notice in notices {
        writeln!(out, "note: {}", notice.message())?;
    }
    Ok(())
}

fn write_suggestion<W: Write>(out: &mut W, suggestion: &Suggestion) -> io::Result<()> {
    write_notices(out, &suggestion.notices)?;
    writeln!(out, "Suggestion: {}", suggestion.solution)?;
    writeln!(out, "{}", suggestion.reason)
}

fn print_problem_table(rows: &[(&str, usize)]) {
    if rows.is_empty() {
        println!("No problems yet. Add one with `decision-fox problem add <name>`.");
        return;
    }
    let width = rows
        .iter()
        .map(|(name, _)| name.chars().count())
        .max()
        .unwrap_or(7)
        .max("PROBLEM".len());
    println!("{:<width$}  {}", "PROBLEM", "SOLUTIONS", width = width);
    println!("{:-<width$}  {}", "", "---------", width = width);
    for (name, count) in rows {
        println!("{:<width$}  {}", name, count, width = width);
    }
}

fn print_solution_table(problem: &str, solutions: &[Solution]) {
    if solutions.is_empty() {
        println!("\"{problem}\" has no solutions yet.");
        return;
    }
    let width = solutions
        .iter()
        .map(|s| s.text().chars().count())
        .max()
        .unwrap_or(8)
        .max("SOLUTION".len());
    println!("Solutions for \"{problem}\":");
    println!(
        "{:<width$}  {:<4}  {:<7}  {}",
        "SOLUTION",
        "RANK",
        "HISTORY",
        "MOODS",
        width = width
    );
    println!(
        "{:-<width$}  {:-<4}  {:-<7}  {}",
        "",
        "",
        "",
        "-----",
        width = width
    );
    for solution in solutions {
        let rank = solution
            .ranking()
            .map(|rank| rank.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<width$}  {:<4}  {:<7}  {}",
            solution.text(),
            rank,
            solution.history(),
            solution.moods().join(", "),
            width = width
        );
    }
}

fn print_stats(stats: &ProblemStats) {
    println!(
        "Statistics for \"{}\" ({} solutions):",
        stats.problem, stats.solution_count
    );
    match &stats.most_chosen {
        Some(tally) => println!("  Most chosen:  {}", format_tally(tally)),
        None => println!("  Most chosen:  nothing accepted yet"),
    }
    match &stats.least_chosen {
        Some(tally) => println!("  Least chosen: {}", format_tally(tally)),
        None => println!("  Least chosen: no solutions"),
    }
}

fn format_tally(tally: &Tally) -> String {
    format!("{} ({} times)", tally.solutions.join(", "), tally.times)
}

/// `None` once the input is exhausted.
fn prompt<R: BufRead, W: Write>(
    input: &mut R,
    out: &mut W,
    question: &str,
) -> Result<Option<String>> {
    write!(out, "{question}")?;
    out.flush()?;
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

fn stdin_is_tty() -> bool {
    atty::is(Stream::Stdin)
}

fn stdout_is_tty() -> bool {
    atty::is(Stream::Stdout)
}

fn markdown_width() -> usize {
    let (width, _) = terminal_size();
    width.max(60) as usize
}

fn render_markdown(body: &str) {
    let trimmed = body.trim();
    if stdout_is_tty() {
        let skin = MadSkin::default();
        let formatted = FmtText::from(&skin, trimmed, Some(markdown_width()));
        println!("{formatted}");
    } else {
        println!("{trimmed}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use decision_fox::MemoryStore;
    use std::collections::HashSet;
    use std::io::Cursor;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_choose_with_alias_strategy() {
        let cli = Cli::try_parse_from([
            "decision-fox",
            "--store",
            "lunch.json",
            "choose",
            "lunch",
            "--by",
            "most-chosen",
            "--avoid-repeats",
            "--answer",
            "accept",
        ])
        .unwrap();
        assert_eq!(cli.store, PathBuf::from("lunch.json"));
        match cli.command {
            Command::Choose {
                problem,
                by,
                avoid_repeats,
                answer,
                ..
            } => {
                assert_eq!(problem, "lunch");
                assert_eq!(by, StrategyKind::MostChosen);
                assert!(avoid_repeats);
                assert_eq!(answer, Some(Answer::Accept));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_strategy() {
        let err = Cli::try_parse_from(["decision-fox", "choose", "lunch", "--by", "coin"]);
        assert!(err.is_err());
    }

    fn lunch_engine() -> Engine<MemoryStore> {
        let mut engine = Engine::with_seed(MemoryStore::new(), 5);
        engine.add_problem("lunch").unwrap();
        for text in ["pizza", "salad", "soup"] {
            engine.add_solution("lunch", text).unwrap();
        }
        engine
    }

    fn drive(engine: &mut Engine<MemoryStore>, request: SelectRequest, script: &str) -> String {
        let mut input = Cursor::new(script.as_bytes().to_vec());
        let mut out = Vec::new();
        choose_interactive(engine, "lunch", request, &mut input, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn interactive_session_carries_trends_between_decisions() {
        let mut engine = lunch_engine();
        let transcript = drive(
            &mut engine,
            SelectRequest::new(Strategy::Trendy),
            "a\n\na\nq\n",
        );
        assert_eq!(transcript.matches("Enjoy").count(), 2);
        assert!(transcript.contains("Chosen at random."));
        assert!(transcript.contains("Chosen for being trendy recently."));

        let recent: Vec<&str> = engine.session().recent().collect();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0], recent[1]);
        let total: u32 = engine
            .solutions("lunch")
            .unwrap()
            .iter()
            .map(Solution::history)
            .sum();
        assert_eq!(total, 2);
    }

    #[test]
    fn interactive_rejections_are_skipped_until_reset() {
        let mut engine = lunch_engine();
        let request = SelectRequest::new(Strategy::Random).avoid_repeats(true);
        let transcript = drive(&mut engine, request, "r\nr\nr\nq\n");
        let suggested: Vec<&str> = transcript
            .lines()
            .filter_map(|line| line.strip_prefix("Suggestion: "))
            .collect();
        assert_eq!(suggested.len(), 4);
        let first_three: HashSet<&str> = suggested[..3].iter().copied().collect();
        assert_eq!(first_three.len(), 3);
        assert!(transcript.contains(Notice::RepeatsReset.message()));
        assert!(engine.solutions("lunch").unwrap().iter().all(|s| s.history() == 0));
    }

    #[test]
    fn interactive_session_can_switch_problems() {
        let mut engine = lunch_engine();
        engine.add_problem("dinner").unwrap();
        engine.add_solution("dinner", "tacos").unwrap();
        let transcript = drive(
            &mut engine,
            SelectRequest::default(),
            "a\nbrunch\ndinner\na\n",
        );
        assert!(transcript.contains("problem \"brunch\" does not exist"));
        assert!(transcript.contains("Suggestion: tacos"));
        assert_eq!(engine.solution("dinner", "tacos").unwrap().history(), 1);
    }

    #[test]
    fn prompt_reports_end_of_input() {
        let mut input = Cursor::new(Vec::new());
        let mut out = Vec::new();
        assert_eq!(prompt(&mut input, &mut out, "mood? ").unwrap(), None);
        assert_eq!(out, b"mood? ");
    }

    #[test]
    fn tally_reads_naturally() {
        let tally = Tally {
            solutions: vec!["pizza".into(), "soup".into()],
            times: 3,
        };
        assert_eq!(format_tally(&tally), "pizza, soup (3 times)");
    }
}
