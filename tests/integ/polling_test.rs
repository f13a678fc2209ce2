use std::sync::Arc;
use std::time::Duration;

use crate::{question_json, settle, test_identity, test_session};
use quiz_night::config::{ExpiryPolicy, PollConfig};
use quiz_night::error::{ChoiceError, PollError};
use quiz_night::model::types::AnswerIndex;
use quiz_night::polling::{InputState, PollPhase, PollingController};
use quiz_night::scheduler::Scheduler;
use quiz_night::session::{
    CookieStore, FileCookieStore, LAST_ANSWERED_KEY, MemoryCookieStore, Session,
};
use quiz_night::testing::{PollReply, ScriptedApi};
use reqwest::StatusCode;
use serde_json::json;
use tokio::time::sleep;

fn controller(api: &Arc<ScriptedApi>, session: Arc<Session>, config: PollConfig) -> PollingController {
    PollingController::new(session, api.clone(), Scheduler::current(), config).unwrap()
}

fn index(i: usize) -> AnswerIndex {
    AnswerIndex::new(i).unwrap()
}

fn shown_number(controller: &PollingController) -> Option<u32> {
    controller
        .view()
        .shown()
        .map(|shown| shown.question.question_number)
}

#[tokio::test(start_paused = true)]
async fn new_question_is_shown_with_a_full_countdown() {
    let api = Arc::new(ScriptedApi::new());
    api.set_current(Some(question_json(1)));
    let (_store, session) = test_session(None);
    let mut controller = controller(&api, session, PollConfig::default());

    controller.start();
    settle().await;

    let view = controller.view();
    let shown = view.shown().expect("question 1 should be shown");
    assert_eq!(shown.question.question_number, 1);
    assert_eq!(shown.question.answers[0], "Q1 first");
    assert_eq!(shown.input, InputState::Open);
    assert_eq!(shown.countdown.remaining(), Duration::from_secs(20));
    assert_eq!(view.error, None);
}

#[tokio::test(start_paused = true)]
async fn polls_immediately_then_every_interval() {
    let api = Arc::new(ScriptedApi::new());
    let (_store, session) = test_session(None);
    let mut controller = controller(&api, session, PollConfig::default());

    controller.start();
    settle().await;
    assert_eq!(api.count_calls("GET /question"), 1, "First poll is immediate");

    sleep(Duration::from_millis(4500)).await;
    settle().await;
    assert_eq!(api.count_calls("GET /question"), 3);
}

#[tokio::test(start_paused = true)]
async fn same_question_is_not_restarted_while_shown() {
    let api = Arc::new(ScriptedApi::new());
    api.set_current(Some(question_json(1)));
    let (_store, session) = test_session(None);
    let mut controller = controller(&api, session, PollConfig::default());

    controller.start();
    settle().await;
    let deadline = controller.view().shown().unwrap().countdown.deadline;

    sleep(Duration::from_secs(7)).await;
    settle().await;

    assert!(api.count_calls("GET /question") >= 4);
    let view = controller.view();
    let shown = view.shown().expect("question 1 should still be shown");
    assert_eq!(shown.countdown.deadline, deadline, "Countdown must not restart");
}

#[tokio::test(start_paused = true)]
async fn answered_questions_never_come_back() {
    let api = Arc::new(ScriptedApi::new());
    api.set_current(Some(question_json(3)));
    let (_store, session) = test_session(Some(3));
    let mut controller = controller(&api, session, PollConfig::default());

    controller.start();
    settle().await;
    assert_eq!(controller.view().phase, PollPhase::Idle);
    assert_eq!(controller.view().last_answered, 3);

    api.set_current(Some(question_json(2)));
    sleep(Duration::from_secs(2)).await;
    settle().await;
    assert_eq!(controller.view().phase, PollPhase::Idle, "Older questions stay hidden");

    api.set_current(Some(question_json(4)));
    sleep(Duration::from_secs(2)).await;
    settle().await;
    assert_eq!(shown_number(&controller), Some(4));
}

#[tokio::test(start_paused = true)]
async fn choosing_raises_progress_before_submitting() {
    let api = Arc::new(ScriptedApi::new());
    api.set_current(Some(question_json(3)));
    let (store, session) = test_session(Some(2));
    let mut controller = controller(&api, session.clone(), PollConfig::default());
    controller.start();
    settle().await;

    let submit = controller.choose(index(1)).unwrap();

    // Nothing has been sent yet, but the marker is already stored.
    assert!(api.submissions().is_empty());
    assert_eq!(session.last_answered(), 3);
    assert_eq!(store.get(LAST_ANSWERED_KEY).as_deref(), Some("3"));
    assert_eq!(controller.view().phase, PollPhase::Idle);

    submit.await.unwrap();
    let submissions = api.submissions();
    assert_eq!(submissions.len(), 1);
    assert_eq!(submissions[0].question_number, 3);
    assert_eq!(submissions[0].answer_index, 2, "Index is sent 1-based");
    assert_eq!(submissions[0].answer_text, "Q3 second");
    assert_eq!(submissions[0].member, "Zuza");

    sleep(Duration::from_secs(6)).await;
    settle().await;
    assert_eq!(controller.view().phase, PollPhase::Idle, "Answered question stays hidden");
    assert_eq!(api.count_calls("POST /answer"), 1);
}

#[tokio::test(start_paused = true)]
async fn late_poll_for_answered_question_is_ignored() {
    let api = Arc::new(ScriptedApi::new());
    api.queue_poll(PollReply::question(question_json(5)));
    api.queue_poll(PollReply::question(question_json(5)).after(Duration::from_secs(3)));
    let (_store, session) = test_session(None);
    let mut controller = controller(&api, session, PollConfig::default());
    controller.start();
    settle().await;
    assert_eq!(shown_number(&controller), Some(5));

    // The second poll is now in flight.
    sleep(Duration::from_millis(2500)).await;
    controller.choose(index(0)).unwrap();

    sleep(Duration::from_secs(3)).await;
    settle().await;
    assert_eq!(controller.view().phase, PollPhase::Idle);
    assert_eq!(controller.view().last_answered, 5);
}

#[tokio::test(start_paused = true)]
async fn expired_question_is_held_until_replaced() {
    let api = Arc::new(ScriptedApi::new());
    api.set_current(Some(question_json(1)));
    let (_store, session) = test_session(None);
    let mut controller = controller(&api, session.clone(), PollConfig::default());
    controller.start();
    settle().await;

    sleep(Duration::from_secs(21)).await;
    settle().await;
    let view = controller.view();
    let shown = view.shown().expect("expired question stays visible");
    assert_eq!(shown.input, InputState::Expired);
    assert_eq!(controller.choose(index(0)).unwrap_err(), ChoiceError::Expired);
    assert_eq!(session.last_answered(), 0, "Holding does not touch progress");

    api.set_current(Some(question_json(2)));
    sleep(Duration::from_secs(2)).await;
    settle().await;
    let view = controller.view();
    let shown = view.shown().expect("question 2 should replace it");
    assert_eq!(shown.question.question_number, 2);
    assert_eq!(shown.input, InputState::Open);
}

#[tokio::test(start_paused = true)]
async fn forfeit_policy_clears_and_counts_expired_question() {
    let api = Arc::new(ScriptedApi::new());
    api.set_current(Some(question_json(1)));
    let (_store, session) = test_session(None);
    let config = PollConfig {
        expiry: ExpiryPolicy::Forfeit {
            after: Duration::from_secs(5),
        },
        ..PollConfig::default()
    };
    let mut controller = controller(&api, session.clone(), config);
    controller.start();
    settle().await;

    sleep(Duration::from_secs(21)).await;
    settle().await;
    assert_eq!(controller.view().shown().unwrap().input, InputState::Expired);

    sleep(Duration::from_secs(5)).await;
    settle().await;
    assert_eq!(controller.view().phase, PollPhase::Idle);
    assert_eq!(session.last_answered(), 1);
    assert!(api.submissions().is_empty(), "Forfeit sends nothing");
}

#[tokio::test(start_paused = true)]
async fn newer_question_replaces_countdown() {
    let api = Arc::new(ScriptedApi::new());
    api.set_current(Some(question_json(1)));
    let (_store, session) = test_session(None);
    let mut controller = controller(&api, session, PollConfig::default());
    controller.start();
    settle().await;

    api.set_current(Some(question_json(2)));
    sleep(Duration::from_millis(2500)).await;
    settle().await;
    assert_eq!(shown_number(&controller), Some(2));

    // Question 1's countdown would have run out by now.
    sleep(Duration::from_secs(19)).await;
    settle().await;
    assert_eq!(controller.view().shown().unwrap().input, InputState::Open);

    sleep(Duration::from_secs(2)).await;
    settle().await;
    assert_eq!(controller.view().shown().unwrap().input, InputState::Expired);
}

#[tokio::test(start_paused = true)]
async fn unnumbered_question_is_ignored() {
    let api = Arc::new(ScriptedApi::new());
    api.set_current(Some(json!({
        "question": "Mystery?",
        "question_number": "abc",
        "answers": ["A", "B", "C", "D"],
    })));
    let (_store, session) = test_session(None);
    let mut controller = controller(&api, session, PollConfig::default());
    controller.start();
    settle().await;

    let view = controller.view();
    assert_eq!(view.phase, PollPhase::Idle);
    assert_eq!(view.error, None);
}

#[tokio::test(start_paused = true)]
async fn poll_failure_is_shown_until_next_success() {
    let api = Arc::new(ScriptedApi::new());
    api.queue_poll(PollReply::failure(StatusCode::SERVICE_UNAVAILABLE));
    let (_store, session) = test_session(None);
    let mut controller = controller(&api, session, PollConfig::default());
    controller.start();
    settle().await;

    let error = controller.view().error.expect("failure should be surfaced");
    assert!(error.contains("503"), "got {error}");

    sleep(Duration::from_secs(2)).await;
    settle().await;
    assert_eq!(controller.view().error, None, "409 counts as a successful poll");
}

#[tokio::test(start_paused = true)]
async fn nothing_new_leaves_shown_question_alone() {
    let api = Arc::new(ScriptedApi::new());
    api.set_current(Some(question_json(1)));
    let (_store, session) = test_session(None);
    let mut controller = controller(&api, session, PollConfig::default());
    controller.start();
    settle().await;

    api.set_current(None);
    sleep(Duration::from_secs(5)).await;
    settle().await;
    let view = controller.view();
    let shown = view.shown().expect("question 1 should stay");
    assert_eq!(shown.question.question_number, 1);
    assert_eq!(shown.input, InputState::Open);
}

#[tokio::test(start_paused = true)]
async fn failed_submit_is_reported_but_progress_kept() {
    let api = Arc::new(ScriptedApi::new());
    api.set_current(Some(question_json(1)));
    api.fail_submits(Some(StatusCode::INTERNAL_SERVER_ERROR));
    let (_store, session) = test_session(None);
    let mut controller = controller(&api, session.clone(), PollConfig::default());
    controller.start();
    settle().await;

    controller.choose(index(0)).unwrap().await.unwrap();

    let view = controller.view();
    let error = view.error.expect("submit failure should be surfaced");
    assert!(error.starts_with("Answer submit failed"), "got {error}");
    assert_eq!(view.phase, PollPhase::Idle);
    assert_eq!(session.last_answered(), 1);
}

#[tokio::test(start_paused = true)]
async fn choice_needs_an_open_real_answer() {
    let api = Arc::new(ScriptedApi::new());
    let (_store, session) = test_session(None);
    let mut controller = controller(&api, session, PollConfig::default());
    assert_eq!(controller.choose(index(0)).unwrap_err(), ChoiceError::NothingShown);

    api.set_current(Some(json!({
        "question": "Yes or no?",
        "question_number": 1,
        "answers": ["Yes", "No"],
    })));
    controller.start();
    settle().await;

    assert_eq!(
        controller.choose(index(2)).unwrap_err(),
        ChoiceError::EmptySlot(index(2))
    );
    assert_eq!(shown_number(&controller), Some(1));
    controller.choose(index(1)).unwrap().await.unwrap();
    assert_eq!(api.submissions()[0].answer_text, "No");
    assert_eq!(
        controller.choose(index(1)).unwrap_err(),
        ChoiceError::NothingShown,
        "A second pick for the same question is refused"
    );
}

#[tokio::test(start_paused = true)]
async fn stop_halts_polling() {
    let api = Arc::new(ScriptedApi::new());
    let (_store, session) = test_session(None);
    let mut controller = controller(&api, session, PollConfig::default());
    controller.start();
    settle().await;
    assert!(controller.is_running());

    controller.stop();
    let polls = api.count_calls("GET /question");
    sleep(Duration::from_secs(10)).await;
    settle().await;
    assert!(!controller.is_running());
    assert_eq!(api.count_calls("GET /question"), polls);
}

#[tokio::test(start_paused = true)]
async fn polling_needs_a_stored_identity() {
    let api: Arc<ScriptedApi> = Arc::new(ScriptedApi::new());
    let session = Arc::new(Session::load(Arc::new(MemoryCookieStore::new())));
    let result = PollingController::new(session, api, Scheduler::current(), PollConfig::default());
    assert!(matches!(result, Err(PollError::NoIdentity)));
}

#[tokio::test(start_paused = true)]
async fn pick_is_refused_when_progress_cannot_be_stored() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileCookieStore::open(dir.path().join("session.json")).unwrap());
    Session::save_identity(store.as_ref(), &test_identity()).unwrap();
    let session = Arc::new(Session::load(store));

    let api = Arc::new(ScriptedApi::new());
    api.set_current(Some(question_json(5)));
    let mut controller = controller(&api, session.clone(), PollConfig::default());
    controller.start();
    settle().await;

    std::fs::remove_dir_all(dir.path()).unwrap();

    let err = controller.choose(index(0)).unwrap_err();
    assert!(matches!(err, ChoiceError::ProgressNotSaved(_)), "got {err:?}");
    assert_eq!(session.last_answered(), 0, "Marker stays where the disk has it");
    assert_eq!(shown_number(&controller), Some(5), "Question stays open");
    let error = controller.view().error.expect("store failure should be surfaced");
    assert!(error.starts_with("Could not store progress"), "got {error}");

    settle().await;
    assert!(api.submissions().is_empty(), "Nothing is sent without stored progress");
}
