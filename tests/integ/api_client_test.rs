use std::sync::Arc;
use std::time::Duration;

use crate::{TEST_API_KEY, TestServer, question_json, test_identity, test_pairs, test_session};
use quiz_night::api::{HttpApi, TriviaApi};
use quiz_night::config::PollConfig;
use quiz_night::error::ApiError;
use quiz_night::model::request::{AnswerSubmission, RevealKind};
use quiz_night::model::types::AnswerIndex;
use quiz_night::normalize::normalize_question;
use quiz_night::polling::PollingController;
use quiz_night::scheduler::Scheduler;
use reqwest::StatusCode;
use serde_json::json;

fn client_for(server: &TestServer) -> HttpApi {
    HttpApi::new(&server.base_url(), Duration::from_secs(2)).unwrap()
}

#[tokio::test]
async fn current_question_sends_identity_and_no_store() {
    let server = TestServer::start().await;
    server.state().current_question = Some(question_json(4));
    let api = client_for(&server);

    let raw = api
        .fetch_current_question(&test_identity())
        .await
        .unwrap()
        .expect("a question should be returned");
    assert_eq!(normalize_question(&raw).question_number, 4);

    let state = server.state();
    let query = &state.question_queries[0];
    assert_eq!(query.get("member").map(String::as_str), Some("Zuza"));
    assert_eq!(query.get("team").map(String::as_str), Some("Red"));
    assert_eq!(query.get("teammate").map(String::as_str), Some("Natalia"));
    assert_eq!(state.cache_headers[0], "no-store", "Polls must bypass caches");
}

#[tokio::test]
async fn conflict_means_nothing_new() {
    let server = TestServer::start().await;
    let api = client_for(&server);

    let result = api.fetch_current_question(&test_identity()).await.unwrap();
    assert!(result.is_none(), "409 should read as no new question");
}

#[tokio::test]
async fn server_error_carries_status_and_body() {
    let server = TestServer::start().await;
    server.state().question_status = Some(StatusCode::INTERNAL_SERVER_ERROR);
    let api = client_for(&server);

    let err = api
        .fetch_current_question(&test_identity())
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
    let message = err.to_string();
    assert!(message.contains("GET /question"), "got {message}");
    assert!(message.contains("question service unavailable"), "got {message}");
}

#[tokio::test]
async fn unparseable_body_is_malformed() {
    let server = TestServer::start().await;
    server.state().question_body_override = Some("<html>oops</html>".to_string());
    let api = client_for(&server);

    let err = api
        .fetch_current_question(&test_identity())
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::MalformedBody { .. }), "got {err:?}");
}

#[tokio::test]
async fn unreachable_server_is_a_transport_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    let api = HttpApi::new(&format!("http://127.0.0.1:{port}"), Duration::from_secs(2)).unwrap();

    let err = api
        .fetch_current_question(&test_identity())
        .await
        .unwrap_err();
    assert!(err.is_transport(), "got {err:?}");
    assert_eq!(err.status(), None);
}

#[tokio::test]
async fn submit_posts_one_based_index_and_text() {
    let server = TestServer::start().await;
    let api = client_for(&server);
    let question = normalize_question(&question_json(2));
    let submission =
        AnswerSubmission::new(&test_identity(), &question, AnswerIndex::new(2).unwrap());

    api.submit_answer(&submission).await.unwrap();

    let state = server.state();
    assert_eq!(
        state.submissions,
        vec![json!({
            "member": "Zuza",
            "team": "Red",
            "teammate": "Natalia",
            "question_number": 2,
            "answer_index": 3,
            "answer_text": "Q2 third",
        })]
    );
}

#[tokio::test]
async fn rejected_submit_is_an_error() {
    let server = TestServer::start().await;
    server.state().submit_status = Some(StatusCode::BAD_REQUEST);
    let api = client_for(&server);
    let question = normalize_question(&question_json(1));
    let submission =
        AnswerSubmission::new(&test_identity(), &question, AnswerIndex::new(0).unwrap());

    let err = api.submit_answer(&submission).await.unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::BAD_REQUEST));
}

#[tokio::test]
async fn reveal_requests_carry_kind_pair_and_number() {
    let server = TestServer::start().await;
    server.state().reveals.insert(
        ("USER_ANSWER".to_string(), "Zuza".to_string(), 3),
        json!({ "answer_index": 1 }),
    );
    let api = client_for(&server);
    let pairs = test_pairs();
    let pair = &pairs[0];

    let raw = api
        .fetch_reveal(RevealKind::UserAnswer, pair, 3)
        .await
        .unwrap();
    assert_eq!(raw, json!({ "answer_index": 1 }));

    let missing = api
        .fetch_reveal(RevealKind::CorrectAnswer, pair, 3)
        .await
        .unwrap_err();
    assert_eq!(missing.status(), Some(StatusCode::NOT_FOUND));

    let state = server.state();
    let query = &state.reveal_queries[0];
    assert_eq!(query.get("type").map(String::as_str), Some("USER_ANSWER"));
    assert_eq!(query.get("teammate").map(String::as_str), Some("Natalia"));
    assert_eq!(query.get("question_number").map(String::as_str), Some("3"));
}

#[tokio::test]
async fn redeeming_a_code_maps_assigned_to_team() {
    let server = TestServer::start().await;
    server
        .state()
        .codes
        .insert("K7Q2".to_string(), test_identity());
    let api = client_for(&server);

    let identity = api.redeem_code("K7Q2").await.unwrap();
    assert_eq!(identity, test_identity());

    let err = api.redeem_code("NOPE").await.unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));
}

#[tokio::test]
async fn drawing_assigns_the_next_unassigned_member() {
    let server = TestServer::start().await;
    server.state().unassigned = vec!["Ola".to_string()];
    let api = client_for(&server);

    let member = api.fetch_unassigned_member().await.unwrap();
    assert_eq!(member.as_deref(), Some("Ola"));
    let team = api.assign_member("Ola").await.unwrap();
    assert_eq!(team.as_deref(), Some("Blue"));

    assert_eq!(server.state().assigned, vec!["Ola".to_string()]);
    assert_eq!(api.fetch_unassigned_member().await.unwrap(), None);
}

#[tokio::test]
async fn teams_need_the_api_key() {
    let server = TestServer::start().await;
    server.state().teams = vec![json!({ "team_name": "Red", "players": ["Zuza", "Natalia"] })];

    let anonymous = client_for(&server);
    let err = anonymous.fetch_teams().await.unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::UNAUTHORIZED));

    let keyed = client_for(&server).with_api_key(Some(TEST_API_KEY.to_string()));
    let teams = keyed.fetch_teams().await.unwrap();
    assert_eq!(teams.len(), 1);
    assert_eq!(teams[0].team_name, "Red");
    assert_eq!(teams[0].players, vec!["Zuza", "Natalia"]);
}

#[tokio::test]
async fn polling_shows_the_served_question_end_to_end() {
    let server = TestServer::start().await;
    server.state().current_question = Some(question_json(1));
    let (_store, session) = test_session(None);
    let config = PollConfig {
        interval: Duration::from_millis(50),
        ..PollConfig::default()
    };
    let mut controller =
        PollingController::new(session, Arc::new(client_for(&server)), Scheduler::current(), config)
            .unwrap();
    let mut views = controller.subscribe();
    controller.start();

    let shown = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            views.changed().await.unwrap();
            if let Some(shown) = views.borrow_and_update().shown() {
                return shown.question.clone();
            }
        }
    })
    .await
    .expect("question should show up within two seconds");
    assert_eq!(shown.question_number, 1);
    assert_eq!(shown.answers[3], "Q1 fourth");

    controller.stop();
}
