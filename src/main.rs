use clap::Parser;
use letterwise::{
    analysis::LocalAnalyzer,
    config::{ConfigStore, FileConfigStore},
    error::SessionError,
    export::export_csv,
    gateway::{Collaborators, SessionIdentity},
    policy::NoSleep,
    results::summary,
    runtime::{dispatch, is_finished, Dispatched, FixedTicker, Runner, StdinEventSource},
    session::{AbortOutcome, AssessmentSession, NextStep, Progress},
    store::SqliteStore,
    words::{LocalWordSupplier, WordList},
};
use std::{error::Error, path::PathBuf, time::Duration};
use tracing::info;
use tracing_subscriber::prelude::*;

const TICK_RATE_MS: u64 = 100;

/// two-phase adaptive spelling assessment
#[derive(Parser, Debug, Clone)]
#[clap(
    version,
    about,
    long_about = "A two-phase spelling assessment: a broad first round, an analysis of which letters get confused, then a round of words aimed at those letters. Type each word and press enter; :quit ends early, :retry retries a failed save."
)]
pub struct Cli {
    /// name of the person being assessed
    #[clap(short = 'u', long)]
    user: String,

    /// therapist code the session is filed under
    #[clap(short = 't', long)]
    therapist: String,

    /// session id (default: generated from the current time)
    #[clap(long)]
    session_id: Option<String>,

    /// number of words in each phase (overrides the config file)
    #[clap(short = 'w', long)]
    words_per_phase: Option<usize>,

    /// skip the feedback and analysis pauses
    #[clap(long)]
    no_delay: bool,

    /// session database path
    #[clap(long)]
    db: Option<PathBuf>,

    /// config file path
    #[clap(long)]
    config: Option<PathBuf>,

    /// write the finished session to this CSV file
    #[clap(long)]
    export: Option<PathBuf>,

    /// seed for word selection, for reproducible sessions
    #[clap(long)]
    seed: Option<u64>,

    /// verbose logging to stderr
    #[clap(long)]
    debug: bool,
}

fn init_logging(debug: bool) {
    let default_directive = if debug { "letterwise=debug,warn" } else { "warn" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_logging(cli.debug);

    let config_store = match &cli.config {
        Some(path) => FileConfigStore::with_path(path),
        None => FileConfigStore::new(),
    };
    let mut config = config_store.load();
    if let Some(words) = cli.words_per_phase {
        config.words_per_phase = words.max(1);
    }
    if cli.no_delay {
        config.feedback_delay_ms = 0;
        config.thinking_delay_ms = 0;
    }

    let list = WordList::load(&config.word_list)?;
    let supplier = match cli.seed {
        Some(seed) => LocalWordSupplier::with_seed(list, seed),
        None => LocalWordSupplier::new(list),
    }
    .with_batch_size(config.words_per_phase);
    let store = match &cli.db {
        Some(path) => SqliteStore::open(path)?,
        None => SqliteStore::open_default()?,
    };

    let session_id = cli
        .session_id
        .clone()
        .unwrap_or_else(|| chrono::Local::now().format("%Y%m%d-%H%M%S").to_string());
    let identity = SessionIdentity::new(session_id, &cli.user, &cli.therapist);
    info!("config loaded from {}", config_store.path().display());

    let mut session = AssessmentSession::new(
        identity,
        config,
        Collaborators::new(supplier, LocalAnalyzer, store),
    );
    if cli.no_delay {
        session = session.with_sleeper(NoSleep);
    }

    println!(
        "Hi {}! Type each word you see and press enter ({} words per round).",
        cli.user,
        session.config().words_per_phase
    );
    session.start()?;
    show_word(&mut session);

    let runner = Runner::new(
        StdinEventSource::new(),
        FixedTicker::new(Duration::from_millis(TICK_RATE_MS)),
    );
    while !is_finished(&session) {
        match dispatch(&mut session, runner.step()) {
            Dispatched::Scored(feedback) => {
                println!("{}", feedback.message);
                if feedback.next == NextStep::Analyze {
                    println!("Looking at which letters were tricky...");
                }
                match session.advance() {
                    Ok(Progress::WordReady) => show_word(&mut session),
                    Ok(Progress::EnteredTargeted) => {
                        show_diagnosis(&session);
                        show_word(&mut session);
                    }
                    Ok(Progress::Completed(_)) => {}
                    Err(err) => show_error(&err),
                }
            }
            Dispatched::Saved(_) | Dispatched::Ignored => {}
            Dispatched::Aborted(outcome) => match outcome {
                AbortOutcome::Saved(ack) => println!(
                    "Session ended early; {} attempts saved.",
                    ack.attempts_saved
                ),
                AbortOutcome::SaveFailed(err) => {
                    println!("Session ended early; saving failed: {err}")
                }
                AbortOutcome::AlreadyRequested | AbortOutcome::AlreadyFinished => {}
            },
            Dispatched::Failed(err) => show_error(&err),
        }
    }

    if let Some(ack) = session.save_ack() {
        println!(
            "Session {} saved ({} attempts).",
            ack.session_id, ack.attempts_saved
        );
    }
    if let Some(attempts) = session.aborted_attempts() {
        let totals = summary(attempts);
        println!("Correct before stopping: {}/{}", totals.correct, totals.total);
    }
    if let Some(merged) = session.merged_results() {
        let totals = summary(merged);
        println!(
            "Correct: {}/{} ({}%), letters off: {}",
            totals.correct,
            totals.total,
            totals.percent_correct(),
            totals.total_mistakes
        );
        if let Some(mean) = totals.mean_time_ms {
            println!("Average time per word: {:.1}s", mean / 1000.0);
        }
        if let (Some(path), Some(phase1)) = (&cli.export, session.phase1_attempts()) {
            let rows = export_csv(
                path,
                session.identity(),
                phase1,
                session.attempts_this_phase(),
            )?;
            println!("Exported {rows} attempts to {}", path.display());
        }
    }

    Ok(())
}

fn show_word(session: &mut AssessmentSession) {
    let Some(word) = session.current_word() else {
        return;
    };
    println!(
        "[{} {}/{}] {}",
        session.phase(),
        session.attempts_this_phase().len() + 1,
        session.config().words_per_phase,
        word.text
    );
    session.mark_displayed();
}

fn show_diagnosis(session: &AssessmentSession) {
    let Some(diagnosis) = session.diagnosis() else {
        return;
    };
    println!("First round done.");
    if !diagnosis.problematic_letters.is_empty() {
        let letters: Vec<&str> = diagnosis
            .problematic_letters
            .iter()
            .map(String::as_str)
            .collect();
        println!("Letters to practise: {}", letters.join(", "));
    }
    for rec in &diagnosis.recommendations {
        println!("  - {rec}");
    }
}

fn show_error(err: &SessionError) {
    match err {
        SessionError::Persistence(_) => {
            println!("{err}. Type :retry to try again or :quit to leave.")
        }
        SessionError::Analysis(_) | SessionError::TargetedBatch(_) => {
            println!("{err}. Type :quit to save the first round and leave.")
        }
        _ => println!("{err}"),
    }
}
