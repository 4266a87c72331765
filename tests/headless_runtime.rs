mod common;

use common::*;
use letterwise::runtime::{
    dispatch, is_finished, ChannelEventSource, Dispatched, FixedTicker, Runner, SessionEvent,
};
use letterwise::session::{AbortOutcome, Progress, SessionStatus};
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

fn submit(input: &str) -> SessionEvent {
    SessionEvent::Submit {
        input: input.to_string(),
        elapsed_ms: Some(800),
    }
}

// Drives a whole session through the runner without a terminal
#[test]
fn queued_events_drive_session_to_completion() {
    let calls: Shared = Arc::new(Mutex::new(Calls::default()));
    let mut session = happy_session(&calls);
    session.start().unwrap();

    let (tx, rx) = mpsc::channel();
    let runner = Runner::new(
        ChannelEventSource::new(rx),
        FixedTicker::new(Duration::from_millis(5)),
    );
    for input in ["cat", "dog", "son", "tree", "book", "bun", "cup", "mud", "nut", "rug"] {
        tx.send(submit(input)).unwrap();
    }
    // arrives after completion and must not trigger a second save
    tx.send(SessionEvent::Abort).unwrap();

    let mut scored = 0;
    for _ in 0..200u32 {
        if is_finished(&session) {
            break;
        }
        if let Dispatched::Scored(_) = dispatch(&mut session, runner.step()) {
            scored += 1;
            session.advance().unwrap();
        }
    }

    assert_eq!(scored, 10);
    assert_eq!(session.status(), SessionStatus::Completed);
    assert_eq!(
        dispatch(&mut session, runner.step()),
        Dispatched::Aborted(AbortOutcome::AlreadyFinished)
    );
    assert_eq!(calls.lock().unwrap().saves.len(), 1);
    assert_eq!(session.merged_results().unwrap()[0].time_spent_ms, 800);
}

#[test]
fn out_of_place_events_are_ignored() {
    let calls: Shared = Arc::new(Mutex::new(Calls::default()));
    let mut session = happy_session(&calls);

    // no word on screen yet
    assert_eq!(dispatch(&mut session, submit("cat")), Dispatched::Ignored);
    session.start().unwrap();
    assert_eq!(
        dispatch(&mut session, SessionEvent::RetrySave),
        Dispatched::Ignored
    );
    assert_eq!(dispatch(&mut session, SessionEvent::Tick), Dispatched::Ignored);
    assert!(session.attempts_this_phase().is_empty());

    // a second answer before the session has moved on
    assert!(matches!(
        dispatch(&mut session, submit("cat")),
        Dispatched::Scored(_)
    ));
    assert_eq!(dispatch(&mut session, submit("dog")), Dispatched::Ignored);
    assert_eq!(session.attempts_this_phase().len(), 1);
}

#[test]
fn retry_event_recovers_failed_save() {
    let calls: Shared = Arc::new(Mutex::new(Calls::default()));
    let mut session = build(
        MockWords::new(&calls, &PHASE1_WORDS).with_batch(&TARGETED_WORDS),
        MockAnalysis::new(&calls),
        MockStore::failing_first(&calls, 3),
    );
    session.start().unwrap();
    for input in ["cat", "dog", "sun", "tree", "book", "bun", "cup", "mud", "nut"] {
        assert!(matches!(
            dispatch(&mut session, submit(input)),
            Dispatched::Scored(_)
        ));
        session.advance().unwrap();
    }

    assert!(matches!(
        dispatch(&mut session, submit("rug")),
        Dispatched::Scored(_)
    ));
    assert!(matches!(session.advance(), Err(ref err) if err.is_retryable()));
    assert_eq!(session.status(), SessionStatus::Finishing);

    assert!(matches!(
        dispatch(&mut session, SessionEvent::RetrySave),
        Dispatched::Saved(ref ack) if ack.attempts_saved == 10
    ));
    assert!(is_finished(&session));
}

#[test]
fn abort_event_mid_session_saves_partial_results() {
    let calls: Shared = Arc::new(Mutex::new(Calls::default()));
    let mut session = happy_session(&calls);
    session.start().unwrap();

    dispatch(&mut session, submit("cat"));
    assert_eq!(session.advance().unwrap(), Progress::WordReady);
    dispatch(&mut session, submit("dgo"));
    let first = dispatch(&mut session, SessionEvent::Abort);
    let second = dispatch(&mut session, SessionEvent::Abort);

    assert!(matches!(first, Dispatched::Aborted(AbortOutcome::Saved(_))));
    assert_eq!(second, Dispatched::Aborted(AbortOutcome::AlreadyRequested));
    assert_eq!(calls.lock().unwrap().save_calls, 1);
    assert_eq!(calls.lock().unwrap().saves[0].attempts.len(), 2);
}
