use serde::{Deserialize, Serialize};
use std::fmt;

/// Shown in place of an answer slot the server left empty.
pub const PLACEHOLDER_ANSWER: &str = "—";

// === Identity ===
// Handed out once by the access-code exchange and never edited afterwards.

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub member: String,
    pub team: String,
    pub teammate: String,
}

// === Pair ===
// A roster entry for the replay flow: who answered, and who the questions were about.

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pair {
    pub member: String,
    pub teammate: String,
}

// === Answer Index ===

/// Zero-based position of one of the four answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct AnswerIndex(u8);

impl AnswerIndex {
    pub const ALL: [AnswerIndex; 4] = [AnswerIndex(0), AnswerIndex(1), AnswerIndex(2), AnswerIndex(3)];

    pub fn new(index: usize) -> Option<Self> {
        (index < 4).then_some(Self(index as u8))
    }

    /// Parse the 1-based number a player types or the server expects on submit.
    pub fn from_one_based(number: usize) -> Option<Self> {
        number.checked_sub(1).and_then(Self::new)
    }

    pub fn get(self) -> usize {
        self.0 as usize
    }

    pub fn one_based(self) -> u8 {
        self.0 + 1
    }
}

impl TryFrom<u8> for AnswerIndex {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value as usize).ok_or_else(|| format!("answer index {value} out of range 0..=3"))
    }
}

impl From<AnswerIndex> for u8 {
    fn from(index: AnswerIndex) -> Self {
        index.0
    }
}

impl fmt::Display for AnswerIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.one_based())
    }
}

// === Question ===

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedQuestion {
    /// 0 means the server sent something we could not read as a number.
    pub question_number: u32,
    pub text: String,
    pub answers: [String; 4],
}

impl NormalizedQuestion {
    pub fn answer(&self, index: AnswerIndex) -> &str {
        &self.answers[index.get()]
    }

    /// True when the slot only holds the padding placeholder.
    pub fn is_placeholder(&self, index: AnswerIndex) -> bool {
        self.answer(index) == PLACEHOLDER_ANSWER
    }

    pub fn has_valid_number(&self) -> bool {
        self.question_number > 0
    }
}

// === Reveal Stage ===

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RevealStage {
    Question,
    UserAnswer,
    CorrectAnswer,
}

impl RevealStage {
    pub fn previous(self) -> Option<Self> {
        match self {
            RevealStage::Question => None,
            RevealStage::UserAnswer => Some(RevealStage::Question),
            RevealStage::CorrectAnswer => Some(RevealStage::UserAnswer),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            RevealStage::Question => "Question",
            RevealStage::UserAnswer => "Player's answer",
            RevealStage::CorrectAnswer => "Correct answer",
        }
    }
}
