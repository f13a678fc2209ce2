//! Operator-driven replay: for each pair and question, show the question, then what the player
//! picked, then the right answer.

use log::{debug, info, warn};
use std::sync::Arc;

use crate::api::TriviaApi;
use crate::config::Roster;
use crate::error::{ConfigError, RevealError};
use crate::model::request::RevealKind;
use crate::model::types::{AnswerIndex, NormalizedQuestion, Pair, RevealStage};
use crate::normalize::{normalize_question, resolve_correct_answer, resolve_user_answer};

/// Which pair and question the replay is on. Question numbers start at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RevealPosition {
    pub pair_index: usize,
    pub question_number: u32,
}

impl RevealPosition {
    pub const FIRST: RevealPosition = RevealPosition {
        pair_index: 0,
        question_number: 1,
    };

    /// The next question, moving on to the next pair after the last question and back to the
    /// very first question after the last pair.
    pub fn next(self, pair_count: usize, questions_per_pair: u32) -> Self {
        if self.question_number < questions_per_pair {
            RevealPosition {
                question_number: self.question_number + 1,
                ..self
            }
        } else if self.pair_index + 1 < pair_count {
            RevealPosition {
                pair_index: self.pair_index + 1,
                question_number: 1,
            }
        } else {
            RevealPosition::FIRST
        }
    }

    pub fn is_last(self, pair_count: usize, questions_per_pair: u32) -> bool {
        self.pair_index + 1 >= pair_count && self.question_number >= questions_per_pair
    }
}

/// How one answer row should be highlighted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerMark {
    Neutral,
    /// The player's pick, shown while the right answer is still hidden.
    UserPick,
    Correct,
    /// The player's pick, once it is known to be wrong.
    WrongPick,
}

pub struct RevealController {
    api: Arc<dyn TriviaApi>,
    roster: Roster,
    questions_per_pair: u32,
    position: RevealPosition,
    stage: RevealStage,
    question: Option<NormalizedQuestion>,
    user_pick: Option<AnswerIndex>,
    correct_pick: Option<AnswerIndex>,
    error: Option<String>,
}

impl RevealController {
    /// Nothing is fetched until [`RevealController::start`].
    pub fn new(
        api: Arc<dyn TriviaApi>,
        roster: Roster,
        questions_per_pair: u32,
    ) -> Result<Self, ConfigError> {
        if questions_per_pair == 0 {
            return Err(ConfigError::NoQuestions);
        }
        Ok(Self {
            api,
            roster,
            questions_per_pair,
            position: RevealPosition::FIRST,
            stage: RevealStage::Question,
            question: None,
            user_pick: None,
            correct_pick: None,
            error: None,
        })
    }

    pub async fn start(&mut self) {
        self.enter(RevealPosition::FIRST).await;
    }

    /// Load the current position again, e.g. after a failed fetch.
    pub async fn retry(&mut self) {
        self.enter(self.position).await;
    }

    pub async fn jump_to(
        &mut self,
        pair_index: usize,
        question_number: u32,
    ) -> Result<(), RevealError> {
        if pair_index >= self.roster.len()
            || question_number == 0
            || question_number > self.questions_per_pair
        {
            return Err(RevealError::OutOfRange {
                pair: pair_index + 1,
                question: question_number,
            });
        }
        self.enter(RevealPosition {
            pair_index,
            question_number,
        })
        .await;
        Ok(())
    }

    /// Move one step forward, fetching whatever the next stage needs.
    ///
    /// Does nothing while no question is loaded. If the fetch fails the stage stays put and the
    /// error is kept for display.
    pub async fn advance(&mut self) {
        let Some(question) = &self.question else {
            debug!("Nothing loaded, ignoring advance");
            return;
        };
        let answers = question.answers.clone();

        match self.stage {
            RevealStage::Question => {
                if let Some(raw) = self.fetch(RevealKind::UserAnswer).await {
                    self.user_pick = resolve_user_answer(&raw, &answers);
                    if self.user_pick.is_none() {
                        warn!("Could not tell which answer the player picked from {raw}");
                    }
                    self.stage = RevealStage::UserAnswer;
                }
            }
            RevealStage::UserAnswer => {
                if let Some(raw) = self.fetch(RevealKind::CorrectAnswer).await {
                    self.correct_pick = resolve_correct_answer(&raw, &answers);
                    if self.correct_pick.is_none() {
                        warn!("Could not tell which answer is correct from {raw}");
                    }
                    self.stage = RevealStage::CorrectAnswer;
                }
            }
            RevealStage::CorrectAnswer => {
                let next = self
                    .position
                    .next(self.roster.len(), self.questions_per_pair);
                if next == RevealPosition::FIRST {
                    info!("Finished every pair, starting over");
                }
                self.enter(next).await;
            }
        }
    }

    /// Step back one stage without touching the network. Already fetched picks are kept.
    pub fn retreat(&mut self) {
        if let Some(previous) = self.stage.previous() {
            self.stage = previous;
        }
    }

    async fn enter(&mut self, position: RevealPosition) {
        self.position = position;
        self.stage = RevealStage::Question;
        self.user_pick = None;
        self.correct_pick = None;
        self.error = None;

        self.question = self
            .fetch(RevealKind::QuestionOnly)
            .await
            .map(|raw| normalize_question(&raw));
        if let Some(question) = &self.question {
            if question.question_number != position.question_number {
                debug!(
                    "Server numbered question {} as {}",
                    position.question_number, question.question_number
                );
            }
        }
    }

    /// Fetch a payload for the current position, keeping the error message on failure.
    async fn fetch(&mut self, kind: RevealKind) -> Option<serde_json::Value> {
        let Some(pair) = self.roster.get(self.position.pair_index).cloned() else {
            self.error = Some(format!("No pair at position {}", self.position.pair_index + 1));
            return None;
        };
        info!(
            "Fetching {} for {} / {} question {}",
            kind.as_str(),
            pair.member,
            pair.teammate,
            self.position.question_number
        );
        match self
            .api
            .fetch_reveal(kind, &pair, self.position.question_number)
            .await
        {
            Ok(raw) => {
                self.error = None;
                Some(raw)
            }
            Err(e) => {
                warn!("Reveal fetch failed: {e}");
                self.error = Some(e.to_string());
                None
            }
        }
    }

    pub fn stage(&self) -> RevealStage {
        self.stage
    }

    pub fn position(&self) -> RevealPosition {
        self.position
    }

    pub fn pair(&self) -> Option<&Pair> {
        self.roster.get(self.position.pair_index)
    }

    pub fn question(&self) -> Option<&NormalizedQuestion> {
        self.question.as_ref()
    }

    pub fn user_pick(&self) -> Option<AnswerIndex> {
        self.user_pick
    }

    pub fn correct_pick(&self) -> Option<AnswerIndex> {
        self.correct_pick
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn marks(&self) -> [AnswerMark; 4] {
        AnswerIndex::ALL.map(|index| {
            let is_user = self.user_pick == Some(index);
            match self.stage {
                RevealStage::Question => AnswerMark::Neutral,
                RevealStage::UserAnswer if is_user => AnswerMark::UserPick,
                RevealStage::UserAnswer => AnswerMark::Neutral,
                RevealStage::CorrectAnswer => match self.correct_pick {
                    Some(correct) if correct == index => AnswerMark::Correct,
                    Some(_) if is_user => AnswerMark::WrongPick,
                    _ => AnswerMark::Neutral,
                },
            }
        })
    }

    /// Header text such as `Question 2 / 6`.
    pub fn progress_label(&self) -> String {
        format!(
            "Question {} / {}",
            self.position.question_number, self.questions_per_pair
        )
    }

    /// Header text such as `Pair 1 / 4`.
    pub fn pair_label(&self) -> String {
        format!("Pair {} / {}", self.position.pair_index + 1, self.roster.len())
    }

    pub fn advance_label(&self) -> &'static str {
        match self.stage {
            RevealStage::Question | RevealStage::UserAnswer => "Reveal",
            RevealStage::CorrectAnswer
                if self
                    .position
                    .is_last(self.roster.len(), self.questions_per_pair) =>
            {
                "Start over"
            }
            RevealStage::CorrectAnswer => "Next question",
        }
    }
}
