//! Speech session tests
//!
//! Drives the controller and the full application state against the
//! in-memory engine with explicit timestamps

use readaloud::engine::memory::EngineCall;
use readaloud::engine::{EngineEvent, ErrorCode, MemoryEngine, RawVoice, UtteranceId};
use readaloud::session::progress::ESTIMATE_CEILING;
use readaloud::session::{Controller, SessionEvent, SessionOutcome, SessionState, Statistics};
use readaloud::state::{Config, Settings, State};
use readaloud::voice::Voice;
use readaloud::ReadAloudError;
use std::time::{Duration, Instant};

fn raw_voices() -> Vec<RawVoice> {
    vec![RawVoice::new("Alex", "en-US"), RawVoice::new("Daniel", "en-GB")]
}

fn controller_setup() -> (Controller, MemoryEngine, Vec<Voice>) {
    let raw = raw_voices();
    let voices = Voice::from_snapshot(&raw);
    (
        Controller::new(5000, Duration::from_millis(100)),
        MemoryEngine::new(raw),
        voices,
    )
}

fn state_with(engine: MemoryEngine) -> State<MemoryEngine> {
    State::with_engine(Config::in_memory(), engine, Instant::now())
}

#[test]
fn test_empty_text_never_reaches_engine() {
    let mut state = state_with(MemoryEngine::new(raw_voices()));
    state.engine_mut().clear_calls();

    for text in ["", "   ", "\n\t "] {
        assert!(matches!(
            state.speak(text, Instant::now()),
            Err(ReadAloudError::NoText)
        ));
    }
    assert!(state.engine().calls().is_empty());
    assert_eq!(state.state(), SessionState::Idle);
}

#[test]
fn test_new_speech_cancels_previous() {
    let (mut controller, mut engine, voices) = controller_setup();
    let now = Instant::now();
    let settings = Settings::default();

    let first = controller
        .speak(&mut engine, "first", None, &voices, &settings, now)
        .unwrap();
    let second = controller
        .speak(&mut engine, "second", None, &voices, &settings, now)
        .unwrap();

    assert_eq!(
        engine.calls(),
        &[
            EngineCall::Submit(first),
            EngineCall::Cancel,
            EngineCall::Submit(second)
        ]
    );
    assert_eq!(controller.outcome(first), Some(&SessionOutcome::Cancelled));
    assert!(controller
        .drain_events()
        .contains(&SessionEvent::Cancelled(first)));
    assert_eq!(controller.session().unwrap().id, second);
}

#[test]
fn test_stop_is_idempotent() {
    let (mut controller, mut engine, voices) = controller_setup();
    let now = Instant::now();
    let id = controller
        .speak(&mut engine, "hello", None, &voices, &Settings::default(), now)
        .unwrap();

    controller.stop(&mut engine, now);
    controller.stop(&mut engine, now);

    assert_eq!(controller.state(), SessionState::Idle);
    assert_eq!(controller.outcome(id), Some(&SessionOutcome::Cancelled));
    let cancelled = controller
        .drain_events()
        .into_iter()
        .filter(|e| matches!(e, SessionEvent::Cancelled(_)))
        .count();
    assert_eq!(cancelled, 1);
}

#[test]
fn test_stop_before_start_is_quiet() {
    let mut state = state_with(MemoryEngine::new(raw_voices()));
    let now = Instant::now();
    let id = state.speak("Hello", now).unwrap();
    state.stop(now);

    // The engine reports the interruption after the fact
    let mut events = Vec::new();
    for step in 0..5 {
        events.extend(state.pump(now + Duration::from_millis(10 * step)));
    }

    assert_eq!(state.state(), SessionState::Idle);
    assert!(!events
        .iter()
        .any(|e| matches!(e, SessionEvent::Failed { .. })));
    assert_eq!(state.statistics(), Statistics::default());
    assert_eq!(
        state.controller().outcome(id),
        Some(&SessionOutcome::Cancelled)
    );
}

#[test]
fn test_started_counted_once() {
    let (mut controller, mut engine, voices) = controller_setup();
    let now = Instant::now();
    let id = controller
        .speak(&mut engine, "hello world", None, &voices, &Settings::default(), now)
        .unwrap();
    assert_eq!(controller.statistics(), Statistics::default());

    controller.handle_event(EngineEvent::Started(id), now);
    controller.handle_event(EngineEvent::Started(id), now);
    assert_eq!(
        controller.statistics(),
        Statistics {
            utterances: 1,
            characters: 11
        }
    );
}

#[test]
fn test_progress_lifecycle() {
    let (mut controller, mut engine, voices) = controller_setup();
    let t0 = Instant::now();
    let at = |ms: u64| t0 + Duration::from_millis(ms);

    // 27 characters: about 2.7 seconds at normal rate
    let id = controller
        .speak(
            &mut engine,
            "Hello world, this is a test",
            None,
            &voices,
            &Settings::default(),
            t0,
        )
        .unwrap();
    assert_eq!(controller.progress(at(500)), 0.0);

    controller.handle_event(EngineEvent::Started(id), at(0));
    let early = controller.progress(at(500));
    let later = controller.progress(at(1000));
    assert!(early > 0.0);
    assert!(later > early);

    controller.pause(&mut engine, at(1000)).unwrap();
    assert_eq!(controller.state(), SessionState::Paused);
    assert_eq!(controller.progress(at(5000)), later);

    controller.resume(&mut engine, at(5000)).unwrap();
    assert!(controller.progress(at(5500)) > later);

    // Never reports completion on its own
    assert_eq!(controller.progress(at(60_000)), ESTIMATE_CEILING);

    controller.drain_events();
    controller.handle_event(EngineEvent::Ended(id), at(60_000));
    let events = controller.drain_events();
    assert!(events.contains(&SessionEvent::Progress { id, percent: 100.0 }));
    assert!(events.contains(&SessionEvent::Finished(id)));
    assert_eq!(controller.outcome(id), Some(&SessionOutcome::Completed));

    // Next session starts from zero
    let next = controller
        .speak(&mut engine, "again", None, &voices, &Settings::default(), at(61_000))
        .unwrap();
    controller.handle_event(EngineEvent::Started(next), at(61_000));
    assert_eq!(controller.progress(at(61_000)), 0.0);
}

#[test]
fn test_progress_ticks_while_speaking() {
    let (mut controller, mut engine, voices) = controller_setup();
    let t0 = Instant::now();
    let id = controller
        .speak(&mut engine, "tick tock", None, &voices, &Settings::default(), t0)
        .unwrap();
    assert_eq!(controller.next_deadline(), None);

    controller.handle_event(EngineEvent::Started(id), t0);
    let due = controller.next_deadline().unwrap();
    assert_eq!(due, t0 + Duration::from_millis(100));

    controller.drain_events();
    controller.tick(due);
    let events = controller.drain_events();
    assert!(matches!(events.as_slice(), [SessionEvent::Progress { .. }]));

    controller.pause(&mut engine, due).unwrap();
    assert_eq!(controller.next_deadline(), None);
}

#[test]
fn test_stale_events_ignored() {
    let (mut controller, mut engine, voices) = controller_setup();
    let now = Instant::now();
    let first = controller
        .speak(&mut engine, "first", None, &voices, &Settings::default(), now)
        .unwrap();
    let second = controller
        .speak(&mut engine, "second", None, &voices, &Settings::default(), now)
        .unwrap();
    controller.drain_events();

    controller.handle_event(EngineEvent::Ended(first), now);
    controller.handle_event(
        EngineEvent::Error {
            id: UtteranceId(99),
            code: ErrorCode::Network,
        },
        now,
    );
    assert_eq!(controller.state(), SessionState::Speaking);
    assert_eq!(controller.session().unwrap().id, second);
    assert!(controller.drain_events().is_empty());
}

#[test]
fn test_full_session_with_highlighting() {
    let mut state = state_with(MemoryEngine::new(raw_voices()).auto_play(true));
    let id = state.speak("hello there world", Instant::now()).unwrap();

    let mut events = Vec::new();
    let outcome = state
        .wait(id, Duration::from_secs(5), |e| events.push(e.clone()))
        .unwrap();
    assert_eq!(outcome, SessionOutcome::Completed);

    let words: Vec<(usize, usize)> = events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::Word {
                index, char_index, ..
            } => Some((*index, *char_index)),
            _ => None,
        })
        .collect();
    assert_eq!(words, vec![(0, 0), (1, 6), (2, 12)]);
    assert!(events.contains(&SessionEvent::Started(id)));
    assert!(events.contains(&SessionEvent::Finished(id)));
    assert_eq!(
        state.statistics(),
        Statistics {
            utterances: 1,
            characters: 17
        }
    );
    assert_eq!(state.engine().submitted()[0].voice.as_ref().unwrap().name, "Alex");
}

#[test]
fn test_engine_failure_is_reported() {
    let mut state = state_with(MemoryEngine::new(raw_voices()));
    let id = state.speak("hello", Instant::now()).unwrap();
    state.engine_mut().emit(EngineEvent::Error {
        id,
        code: ErrorCode::SynthesisFailed,
    });

    let err = state
        .wait(id, Duration::from_secs(5), |_| {})
        .unwrap_err();
    assert!(err.is_user_facing());
    assert!(matches!(
        err,
        ReadAloudError::Session(ErrorCode::SynthesisFailed)
    ));
    assert_eq!(state.state(), SessionState::Idle);
}

#[test]
fn test_interruption_is_not_an_error() {
    let mut state = state_with(MemoryEngine::new(raw_voices()));
    let id = state.speak("hello", Instant::now()).unwrap();
    state.engine_mut().emit(EngineEvent::Error {
        id,
        code: ErrorCode::Interrupted,
    });

    let outcome = state.wait(id, Duration::from_secs(5), |_| {}).unwrap();
    assert_eq!(outcome, SessionOutcome::Cancelled);
}

#[test]
fn test_vanished_voice_replaced() {
    let mut state = state_with(MemoryEngine::new(raw_voices()));
    state.select_voice("Daniel").unwrap();

    state
        .engine_mut()
        .announce_voices(vec![RawVoice::new("Alex", "en-US")]);
    state.speak("hello", Instant::now()).unwrap();

    let submitted = &state.engine().submitted()[0];
    assert_eq!(submitted.voice.as_ref().unwrap().name, "Alex");
}

#[test]
fn test_pause_unsupported() {
    let mut state = state_with(MemoryEngine::new(raw_voices()).without_pause());
    let now = Instant::now();
    state.speak("hello", now).unwrap();

    assert!(matches!(
        state.toggle_pause(now),
        Err(ReadAloudError::Unsupported(_))
    ));
    assert_eq!(state.state(), SessionState::Speaking);
}

#[test]
fn test_text_limit_from_config() {
    let mut config = Config::in_memory();
    config.set("speech", "max_chars", "10");
    let mut state = State::with_engine(config, MemoryEngine::new(raw_voices()), Instant::now());

    state.engine_mut().clear_calls();

    assert!(matches!(
        state.speak("this is far too long", Instant::now()),
        Err(ReadAloudError::TextTooLong { len: 20, max: 10 })
    ));
    // Rejected text never reaches the engine, not even for a voice refresh
    assert!(state.engine().calls().is_empty());

    assert!(state.speak("short", Instant::now()).is_ok());
}

#[test]
fn test_selected_voice_outside_target_language() {
    let mut state = state_with(MemoryEngine::new(MemoryEngine::sample_voices()));
    assert_eq!(state.settings().language, "en-US");

    state.select_voice("Hortense").unwrap();
    state.speak("Bonjour", Instant::now()).unwrap();

    let submitted = &state.engine().submitted()[0];
    let voice = submitted.voice.as_ref().unwrap();
    assert_eq!(voice.name, "Microsoft Hortense");
    assert_eq!(voice.lang, "fr-FR");
}
