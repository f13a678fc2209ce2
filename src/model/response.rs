use serde::Deserialize;
use serde::de::IgnoredAny;
use serde_json::Value;

// === Typed responses ===
// Endpoints outside the quiz loop answer with one fixed shape each.

#[derive(Debug, Deserialize)]
pub struct CodeRedemption {
    pub data: RedeemedIdentity,
}

#[derive(Debug, Deserialize)]
pub struct RedeemedIdentity {
    pub member: String,
    pub teammate: String,
    /// The team name; the server calls it `assigned`.
    pub assigned: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct UnassignedMemberResponse {
    #[serde(default)]
    pub unassigned_member: Option<UnassignedMember>,
}

#[derive(Debug, Deserialize)]
pub struct UnassignedMember {
    #[serde(default)]
    pub member: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AssignmentResponse {
    #[serde(default)]
    pub team: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TeamBoard {
    #[serde(default)]
    pub teams: Vec<TeamEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TeamEntry {
    pub team_name: String,
    #[serde(default)]
    pub players: Vec<String>,
}

// === Loose payloads ===
// The quiz endpoints have shipped several field layouts for the same message. Each enum lists
// the layouts in the order they are trusted: serde tries untagged variants top to bottom, so
// index fields win over free text, and free text wins over the coded `answerN` form. The final
// catch-all variant means decoding itself never fails.

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum QuestionPayload {
    Listed {
        #[serde(default)]
        question: Value,
        #[serde(default)]
        question_number: Value,
        answers: Vec<Value>,
    },
    Discrete {
        #[serde(default)]
        question: Value,
        #[serde(default)]
        question_number: Value,
        answer1: Value,
        #[serde(default)]
        answer2: Value,
        #[serde(default)]
        answer3: Value,
        #[serde(default)]
        answer4: Value,
    },
    Bare {
        #[serde(default)]
        question: Value,
        #[serde(default)]
        question_number: Value,
    },
    Unrecognized(IgnoredAny),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum UserAnswerPayload {
    AnswerIndex { answer_index: Value },
    UserAnswerIndex { user_answer_index: Value },
    SelectedIndex { selected_index: Value },
    AnswerText { answer_text: String },
    UserAnswer { user_answer: String },
    Unrecognized(IgnoredAny),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum CorrectAnswerPayload {
    AnswerIndex { answer_index: Value },
    CorrectAnswerIndex { correct_answer_index: Value },
    AnswerText { answer_text: String },
    CorrectAnswer { correct_answer: String },
    Unrecognized(IgnoredAny),
}
