use serde::Serialize;

use crate::model::types::{AnswerIndex, Identity, NormalizedQuestion};

/// Which payload shape `GET /answer` should return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RevealKind {
    QuestionOnly,
    UserAnswer,
    CorrectAnswer,
}

impl RevealKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RevealKind::QuestionOnly => "QUESTION_ONLY",
            RevealKind::UserAnswer => "USER_ANSWER",
            RevealKind::CorrectAnswer => "CORRECT_ANSWER",
        }
    }
}

/// Body of `POST /answer`. The server counts answers from 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnswerSubmission {
    pub member: String,
    pub team: String,
    pub teammate: String,
    pub question_number: u32,
    pub answer_index: u8,
    pub answer_text: String,
}

impl AnswerSubmission {
    pub fn new(identity: &Identity, question: &NormalizedQuestion, choice: AnswerIndex) -> Self {
        Self {
            member: identity.member.clone(),
            team: identity.team.clone(),
            teammate: identity.teammate.clone(),
            question_number: question.question_number,
            answer_index: choice.one_based(),
            answer_text: question.answer(choice).to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CodeRequest<'a> {
    pub code: &'a str,
}

#[derive(Debug, Serialize)]
pub struct AssignRequest<'a> {
    pub member: &'a str,
}
