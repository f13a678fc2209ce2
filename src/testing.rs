//! In-memory stand-in for the quiz service, for driving the controllers under a paused clock.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::api::TriviaApi;
use crate::error::ApiError;
use crate::model::request::{AnswerSubmission, RevealKind};
use crate::model::response::TeamEntry;
use crate::model::types::{Identity, Pair};

/// One scripted reply to `GET /question`.
#[derive(Debug, Clone)]
pub struct PollReply {
    pub delay: Duration,
    pub result: Result<Option<Value>, StatusCode>,
}

impl PollReply {
    pub fn question(raw: Value) -> Self {
        Self {
            delay: Duration::ZERO,
            result: Ok(Some(raw)),
        }
    }

    pub fn nothing_new() -> Self {
        Self {
            delay: Duration::ZERO,
            result: Ok(None),
        }
    }

    pub fn failure(status: StatusCode) -> Self {
        Self {
            delay: Duration::ZERO,
            result: Err(status),
        }
    }

    /// Hold the reply back for `delay` of tokio time.
    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[derive(Default)]
struct Script {
    queued_polls: VecDeque<PollReply>,
    current: Option<Value>,
    reveals: HashMap<(&'static str, String, u32), Result<Value, StatusCode>>,
    submit_failure: Option<StatusCode>,
    submissions: Vec<AnswerSubmission>,
    identity: Option<Identity>,
    unassigned: VecDeque<String>,
    teams: Vec<TeamEntry>,
    calls: Vec<String>,
}

/// Queued polls are answered first; once they run out every poll gets the current question,
/// or a 409 when none is set. Reveal payloads are keyed by kind, member and question number and
/// answer 404 when missing.
#[derive(Default)]
pub struct ScriptedApi {
    script: Mutex<Script>,
}

fn http_error(endpoint: &str, status: StatusCode) -> ApiError {
    ApiError::Http {
        endpoint: endpoint.to_string(),
        status,
        body: format!("scripted {}", status.as_u16()),
    }
}

impl ScriptedApi {
    pub fn new() -> Self {
        Self::default()
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn queue_poll(&self, reply: PollReply) {
        self.script().queued_polls.push_back(reply);
    }

    pub fn set_current(&self, raw: Option<Value>) {
        self.script().current = raw;
    }

    pub fn set_reveal(&self, kind: RevealKind, member: &str, question_number: u32, raw: Value) {
        self.script()
            .reveals
            .insert((kind.as_str(), member.to_string(), question_number), Ok(raw));
    }

    pub fn fail_reveal(
        &self,
        kind: RevealKind,
        member: &str,
        question_number: u32,
        status: StatusCode,
    ) {
        self.script()
            .reveals
            .insert((kind.as_str(), member.to_string(), question_number), Err(status));
    }

    pub fn fail_submits(&self, status: Option<StatusCode>) {
        self.script().submit_failure = status;
    }

    pub fn set_identity(&self, identity: Identity) {
        self.script().identity = Some(identity);
    }

    pub fn push_unassigned(&self, member: &str) {
        self.script().unassigned.push_back(member.to_string());
    }

    pub fn set_teams(&self, teams: Vec<TeamEntry>) {
        self.script().teams = teams;
    }

    pub fn submissions(&self) -> Vec<AnswerSubmission> {
        self.script().submissions.clone()
    }

    /// Every call made so far, e.g. `GET /question` or `GET /answer USER_ANSWER Zuza 3`.
    pub fn calls(&self) -> Vec<String> {
        self.script().calls.clone()
    }

    pub fn count_calls(&self, prefix: &str) -> usize {
        self.script()
            .calls
            .iter()
            .filter(|call| call.starts_with(prefix))
            .count()
    }
}

#[async_trait]
impl TriviaApi for ScriptedApi {
    async fn fetch_reveal(
        &self,
        kind: RevealKind,
        pair: &Pair,
        question_number: u32,
    ) -> Result<Value, ApiError> {
        let endpoint = format!("GET /answer {}", kind.as_str());
        let mut script = self.script();
        script.calls.push(format!("{endpoint} {} {question_number}", pair.member));
        match script
            .reveals
            .get(&(kind.as_str(), pair.member.clone(), question_number))
        {
            Some(Ok(raw)) => Ok(raw.clone()),
            Some(Err(status)) => Err(http_error(&endpoint, *status)),
            None => Err(http_error(&endpoint, StatusCode::NOT_FOUND)),
        }
    }

    async fn fetch_current_question(&self, _identity: &Identity) -> Result<Option<Value>, ApiError> {
        let reply = {
            let mut script = self.script();
            script.calls.push("GET /question".to_string());
            script
                .queued_polls
                .pop_front()
                .unwrap_or_else(|| PollReply {
                    delay: Duration::ZERO,
                    result: Ok(script.current.clone()),
                })
        };
        if !reply.delay.is_zero() {
            tokio::time::sleep(reply.delay).await;
        }
        reply
            .result
            .map_err(|status| http_error("GET /question", status))
    }

    async fn submit_answer(&self, submission: &AnswerSubmission) -> Result<(), ApiError> {
        let mut script = self.script();
        script.calls.push("POST /answer".to_string());
        script.submissions.push(submission.clone());
        match script.submit_failure {
            Some(status) => Err(http_error("POST /answer", status)),
            None => Ok(()),
        }
    }

    async fn redeem_code(&self, _code: &str) -> Result<Identity, ApiError> {
        let mut script = self.script();
        script.calls.push("POST /code".to_string());
        script
            .identity
            .clone()
            .ok_or_else(|| http_error("POST /code", StatusCode::NOT_FOUND))
    }

    async fn fetch_unassigned_member(&self) -> Result<Option<String>, ApiError> {
        let mut script = self.script();
        script.calls.push("GET /unassigned-member".to_string());
        Ok(script.unassigned.front().cloned())
    }

    async fn assign_member(&self, member: &str) -> Result<Option<String>, ApiError> {
        let mut script = self.script();
        script.calls.push(format!("POST /assign {member}"));
        script.unassigned.retain(|m| m != member);
        Ok(Some("Scripted".to_string()))
    }

    async fn fetch_teams(&self) -> Result<Vec<TeamEntry>, ApiError> {
        let mut script = self.script();
        script.calls.push("GET /teams".to_string());
        Ok(script.teams.clone())
    }
}
