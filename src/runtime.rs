use std::io::{BufRead, BufReader};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::Duration;

use crate::error::SessionError;
use crate::gateway::SaveAck;
use crate::session::{AbortOutcome, AssessmentSession, Feedback, SessionStatus};
use tracing::debug;

pub const QUIT_COMMAND: &str = ":quit";
pub const RETRY_COMMAND: &str = ":retry";

/// Unified event type consumed by the session runner
#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    /// `elapsed_ms: None` times the attempt from when the word was shown
    Submit {
        input: String,
        elapsed_ms: Option<i64>,
    },
    RetrySave,
    Abort,
    Tick,
}

impl SessionEvent {
    /// Map one line typed at the terminal to an event
    pub fn from_line(line: &str) -> Self {
        match line.trim() {
            QUIT_COMMAND => SessionEvent::Abort,
            RETRY_COMMAND => SessionEvent::RetrySave,
            _ => SessionEvent::Submit {
                input: line.trim_end_matches(['\r', '\n']).to_string(),
                elapsed_ms: None,
            },
        }
    }
}

/// Source of UI events. Events are queued until the runner takes them, so a
/// submission made while a transition is running waits for it to finish.
pub trait SessionEventSource: Send + 'static {
    /// Block for up to `timeout` waiting for an event.
    fn recv_timeout(&self, timeout: Duration) -> Result<SessionEvent, RecvTimeoutError>;
}

/// Reads lines from stdin on a background thread. End of input becomes an abort.
pub struct StdinEventSource {
    rx: Receiver<SessionEvent>,
}

impl StdinEventSource {
    pub fn new() -> Self {
        Self::from_reader(BufReader::new(std::io::stdin()))
    }

    pub fn from_reader<R: BufRead + Send + 'static>(reader: R) -> Self {
        let (tx, rx) = mpsc::channel();

        std::thread::spawn(move || {
            for line in reader.lines() {
                let Ok(line) = line else { break };
                if tx.send(SessionEvent::from_line(&line)).is_err() {
                    return;
                }
            }
            let _ = tx.send(SessionEvent::Abort);
        });

        Self { rx }
    }
}

impl Default for StdinEventSource {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionEventSource for StdinEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<SessionEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// Event source fed by a channel, for tests and embedding
pub struct ChannelEventSource {
    rx: Receiver<SessionEvent>,
}

impl ChannelEventSource {
    pub fn new(rx: Receiver<SessionEvent>) -> Self {
        Self { rx }
    }
}

impl SessionEventSource for ChannelEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<SessionEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// Configurable ticker interface
pub trait Ticker: Send + Sync + 'static {
    fn interval(&self) -> Duration;
}

/// Fixed interval ticker
#[derive(Clone, Copy, Debug)]
pub struct FixedTicker {
    interval: Duration,
}

impl FixedTicker {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl Ticker for FixedTicker {
    fn interval(&self) -> Duration {
        self.interval
    }
}

/// Runner that advances the session one event/tick at a time
pub struct Runner<E: SessionEventSource, T: Ticker> {
    event_source: E,
    ticker: T,
}

impl<E: SessionEventSource, T: Ticker> Runner<E, T> {
    pub fn new(event_source: E, ticker: T) -> Self {
        Self {
            event_source,
            ticker,
        }
    }

    /// Blocks up to tick interval and returns the next event, or Tick on timeout
    pub fn step(&self) -> SessionEvent {
        match self.event_source.recv_timeout(self.ticker.interval()) {
            Ok(ev) => ev,
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                SessionEvent::Tick
            }
        }
    }
}

/// Result of handling one event
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatched {
    Scored(Feedback),
    Saved(SaveAck),
    Aborted(AbortOutcome),
    Failed(SessionError),
    Ignored,
}

/// Apply one event to the session. Events that make no sense in the current
/// state are ignored rather than interleaved with a transition.
/// After `Scored` the caller shows the feedback, then calls `advance`.
pub fn dispatch(session: &mut AssessmentSession, event: SessionEvent) -> Dispatched {
    match (event, session.status()) {
        (SessionEvent::Tick, _) => Dispatched::Ignored,
        (SessionEvent::Abort, _) => Dispatched::Aborted(session.abort()),
        (SessionEvent::Submit { input, elapsed_ms }, SessionStatus::AwaitingInput) => {
            let result = match elapsed_ms {
                Some(ms) => session.submit(&input, ms),
                None => session.submit_timed(&input),
            };
            match result {
                Ok(feedback) => Dispatched::Scored(feedback),
                Err(err) => Dispatched::Failed(err),
            }
        }
        (SessionEvent::RetrySave, SessionStatus::Finishing) => match session.retry_save() {
            Ok(ack) => Dispatched::Saved(ack),
            Err(err) => Dispatched::Failed(err),
        },
        (event, status) => {
            debug!("ignoring {event:?} while {status}");
            Dispatched::Ignored
        }
    }
}

/// Whether the runner loop can stop
pub fn is_finished(session: &AssessmentSession) -> bool {
    matches!(
        session.status(),
        SessionStatus::Completed | SessionStatus::Aborted
    )
}
