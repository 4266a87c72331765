use crate::gateway::{Phase, SessionIdentity};
use crate::scoring::Attempt;
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("failed to write export: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode export: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Serialize)]
struct Row<'a> {
    session_id: &'a str,
    username: &'a str,
    phase: Phase,
    seq: usize,
    word: &'a str,
    input: &'a str,
    correct: bool,
    mistake_count: u32,
    time_spent_ms: u64,
}

/// Write both phases as one CSV table, phase 1 rows first
pub fn write_csv<W: Write>(
    writer: W,
    identity: &SessionIdentity,
    phase1: &[Attempt],
    phase2: &[Attempt],
) -> Result<usize, ExportError> {
    let mut out = csv::Writer::from_writer(writer);
    let tagged = phase1
        .iter()
        .map(|a| (Phase::Initial, a))
        .chain(phase2.iter().map(|a| (Phase::Targeted, a)));

    let mut rows = 0;
    for (seq, (phase, attempt)) in tagged.enumerate() {
        out.serialize(Row {
            session_id: &identity.session_id,
            username: &identity.username,
            phase,
            seq,
            word: &attempt.word,
            input: &attempt.input,
            correct: attempt.correct,
            mistake_count: attempt.mistake_count,
            time_spent_ms: attempt.time_spent_ms,
        })?;
        rows += 1;
    }
    out.flush()?;
    Ok(rows)
}

pub fn export_csv<P: AsRef<Path>>(
    path: P,
    identity: &SessionIdentity,
    phase1: &[Attempt],
    phase2: &[Attempt],
) -> Result<usize, ExportError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let rows = write_csv(File::create(path)?, identity, phase1, phase2)?;
    info!("exported {rows} attempts to {}", path.display());
    Ok(rows)
}
