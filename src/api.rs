use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use url::Url;

use crate::error::{ApiError, body_snippet};
use crate::model::request::{AnswerSubmission, AssignRequest, CodeRequest, RevealKind};
use crate::model::response::{
    AssignmentResponse, CodeRedemption, TeamBoard, TeamEntry, UnassignedMemberResponse,
};
use crate::model::types::{Identity, Pair};

/// The remote quiz service, one method per endpoint. No retries happen behind these calls.
#[async_trait]
pub trait TriviaApi: Send + Sync {
    /// `GET /answer`: the question, the player's pick, or the correct answer, depending on `kind`.
    async fn fetch_reveal(
        &self,
        kind: RevealKind,
        pair: &Pair,
        question_number: u32,
    ) -> Result<Value, ApiError>;

    /// `GET /question`: `Ok(None)` when the server says there is nothing new (409).
    async fn fetch_current_question(&self, identity: &Identity) -> Result<Option<Value>, ApiError>;

    /// `POST /answer`. The response body is ignored.
    async fn submit_answer(&self, submission: &AnswerSubmission) -> Result<(), ApiError>;

    /// `POST /code`: swap an access code for an identity. A rejected code is an `Http` error.
    async fn redeem_code(&self, code: &str) -> Result<Identity, ApiError>;

    /// `GET /unassigned-member`: the next roster entry without a team, if any.
    async fn fetch_unassigned_member(&self) -> Result<Option<String>, ApiError>;

    /// `POST /assign`: put a member on a team, returning the team name when the server gives one.
    async fn assign_member(&self, member: &str) -> Result<Option<String>, ApiError>;

    /// `GET /teams`, authorised with the API key.
    async fn fetch_teams(&self) -> Result<Vec<TeamEntry>, ApiError>;
}

pub struct HttpApi {
    client: reqwest::Client,
    base: Url,
    api_key: Option<String>,
}

impl HttpApi {
    pub fn new(base: &str, timeout: Duration) -> Result<Self, ApiError> {
        // Without the trailing slash `join` would replace the last path segment.
        let base = if base.ends_with('/') {
            Url::parse(base)?
        } else {
            Url::parse(&format!("{base}/"))?
        };
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ApiError::ClientSetup)?;
        Ok(Self {
            client,
            base,
            api_key: None,
        })
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    fn url(&self, path: &str, query: &[(&str, &str)]) -> Result<Url, ApiError> {
        let mut url = self.base.join(path)?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    async fn send(&self, endpoint: &str, request: RequestBuilder) -> Result<Response, ApiError> {
        debug!("Sending {endpoint}");
        request
            .header(reqwest::header::CACHE_CONTROL, "no-store")
            .send()
            .await
            .map_err(|source| {
                warn!("{endpoint} did not complete: {source}");
                ApiError::Transport {
                    endpoint: endpoint.to_string(),
                    source,
                }
            })
    }

    /// Turn a non-2xx response into an `Http` error carrying a body snippet.
    async fn check_status(endpoint: &str, response: Response) -> Result<Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        warn!("{endpoint} failed with {status}");
        Err(ApiError::Http {
            endpoint: endpoint.to_string(),
            status,
            body: body_snippet(&body),
        })
    }

    async fn read_json<T: DeserializeOwned>(
        endpoint: &str,
        response: Response,
    ) -> Result<T, ApiError> {
        let response = Self::check_status(endpoint, response).await?;
        let text = response
            .text()
            .await
            .map_err(|source| ApiError::Transport {
                endpoint: endpoint.to_string(),
                source,
            })?;
        serde_json::from_str(&text).map_err(|source| ApiError::MalformedBody {
            endpoint: endpoint.to_string(),
            source,
        })
    }
}

#[async_trait]
impl TriviaApi for HttpApi {
    async fn fetch_reveal(
        &self,
        kind: RevealKind,
        pair: &Pair,
        question_number: u32,
    ) -> Result<Value, ApiError> {
        let endpoint = format!("GET /answer {}", kind.as_str());
        let number = question_number.to_string();
        let url = self.url(
            "answer",
            &[
                ("type", kind.as_str()),
                ("member", pair.member.as_str()),
                ("teammate", pair.teammate.as_str()),
                ("question_number", number.as_str()),
            ],
        )?;
        let response = self.send(&endpoint, self.client.get(url)).await?;
        Self::read_json(&endpoint, response).await
    }

    async fn fetch_current_question(&self, identity: &Identity) -> Result<Option<Value>, ApiError> {
        let endpoint = "GET /question";
        let url = self.url(
            "question",
            &[
                ("member", identity.member.as_str()),
                ("team", identity.team.as_str()),
                ("teammate", identity.teammate.as_str()),
            ],
        )?;
        let response = self.send(endpoint, self.client.get(url)).await?;
        debug!("{endpoint} answered {}", response.status());
        if response.status() == StatusCode::CONFLICT {
            return Ok(None);
        }
        Self::read_json(endpoint, response).await.map(Some)
    }

    async fn submit_answer(&self, submission: &AnswerSubmission) -> Result<(), ApiError> {
        let endpoint = "POST /answer";
        let url = self.url("answer", &[])?;
        let response = self
            .send(endpoint, self.client.post(url).json(submission))
            .await?;
        let response = Self::check_status(endpoint, response).await?;
        info!(
            "Answer {} for question {} accepted ({})",
            submission.answer_index,
            submission.question_number,
            response.status()
        );
        Ok(())
    }

    async fn redeem_code(&self, code: &str) -> Result<Identity, ApiError> {
        let endpoint = "POST /code";
        let url = self.url("code", &[])?;
        let response = self
            .send(endpoint, self.client.post(url).json(&CodeRequest { code }))
            .await?;
        let redemption: CodeRedemption = Self::read_json(endpoint, response).await?;
        Ok(Identity {
            member: redemption.data.member,
            team: redemption.data.assigned,
            teammate: redemption.data.teammate,
        })
    }

    async fn fetch_unassigned_member(&self) -> Result<Option<String>, ApiError> {
        let endpoint = "GET /unassigned-member";
        let url = self.url("unassigned-member", &[])?;
        let response = self.send(endpoint, self.client.get(url)).await?;
        let body: UnassignedMemberResponse = Self::read_json(endpoint, response).await?;
        Ok(body
            .unassigned_member
            .and_then(|entry| entry.member)
            .filter(|member| !member.is_empty()))
    }

    async fn assign_member(&self, member: &str) -> Result<Option<String>, ApiError> {
        let endpoint = "POST /assign";
        let url = self.url("assign", &[])?;
        let response = self
            .send(endpoint, self.client.post(url).json(&AssignRequest { member }))
            .await?;
        let body: AssignmentResponse = Self::read_json(endpoint, response).await?;
        Ok(body.team.filter(|team| !team.is_empty()))
    }

    async fn fetch_teams(&self) -> Result<Vec<TeamEntry>, ApiError> {
        let endpoint = "GET /teams";
        let url = self.url("teams", &[])?;
        let mut request = self.client.get(url);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = self.send(endpoint, request).await?;
        let board: TeamBoard = Self::read_json(endpoint, response).await?;
        Ok(board.teams)
    }
}
