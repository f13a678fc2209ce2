//! Turns whatever the quiz API sent into the fixed shapes the controllers work with.
//!
//! Nothing in here fails. A field we cannot make sense of becomes `None` (for answer indices),
//! `0` (for question numbers), or the placeholder answer, and the view decides how to show that.

use serde::Deserialize;
use serde::de::IgnoredAny;
use serde_json::Value;

use crate::model::response::{CorrectAnswerPayload, QuestionPayload, UserAnswerPayload};
use crate::model::types::{AnswerIndex, NormalizedQuestion, PLACEHOLDER_ANSWER};

pub fn normalize_question(raw: &Value) -> NormalizedQuestion {
    let payload = QuestionPayload::deserialize(raw).unwrap_or(QuestionPayload::Bare {
        question: Value::Null,
        question_number: Value::Null,
    });

    let (question, question_number, answers) = match payload {
        QuestionPayload::Listed {
            question,
            question_number,
            answers,
        } => (question, question_number, answers),
        QuestionPayload::Discrete {
            question,
            question_number,
            answer1,
            answer2,
            answer3,
            answer4,
        } => (
            question,
            question_number,
            vec![answer1, answer2, answer3, answer4],
        ),
        QuestionPayload::Bare {
            question,
            question_number,
        } => (question, question_number, Vec::new()),
        QuestionPayload::Unrecognized(_) => (Value::Null, Value::Null, Vec::new()),
    };

    let mut kept = answers.iter().filter_map(answer_text).take(4);
    let answers = std::array::from_fn(|_| {
        kept.next().unwrap_or_else(|| PLACEHOLDER_ANSWER.to_string())
    });

    NormalizedQuestion {
        question_number: coerce_question_number(&question_number),
        text: answer_text(&question).unwrap_or_default(),
        answers,
    }
}

/// Accepts both numbering conventions: 0..=3 is taken as-is, 4 is read as 1-based.
///
/// 1..=3 are ambiguous between the two conventions and are read as 0-based.
pub fn normalize_index(value: i64) -> Option<AnswerIndex> {
    match value {
        0..=3 => AnswerIndex::new(value as usize),
        1..=4 => AnswerIndex::new(value as usize - 1),
        _ => None,
    }
}

/// Like [`normalize_index`], for a raw JSON value that may be a number or a numeric string.
pub fn normalize_index_value(value: &Value) -> Option<AnswerIndex> {
    coerce_integer(value).and_then(normalize_index)
}

/// Resolve free text to a position: exact answer text first, then the coded `answerN` form.
pub fn normalize_answer_choice(text: &str, known_answers: &[String; 4]) -> Option<AnswerIndex> {
    if let Some(position) = known_answers.iter().position(|answer| answer == text) {
        return AnswerIndex::new(position);
    }
    let digit = text.strip_prefix("answer")?;
    if digit.len() != 1 {
        return None;
    }
    digit
        .parse::<usize>()
        .ok()
        .and_then(AnswerIndex::from_one_based)
}

/// What the player picked, read from a `USER_ANSWER` payload.
pub fn resolve_user_answer(raw: &Value, known_answers: &[String; 4]) -> Option<AnswerIndex> {
    let payload =
        UserAnswerPayload::deserialize(raw).unwrap_or(UserAnswerPayload::Unrecognized(IgnoredAny));
    match payload {
        UserAnswerPayload::AnswerIndex { answer_index: v }
        | UserAnswerPayload::UserAnswerIndex { user_answer_index: v }
        | UserAnswerPayload::SelectedIndex { selected_index: v } => normalize_index_value(&v),
        UserAnswerPayload::AnswerText { answer_text: text }
        | UserAnswerPayload::UserAnswer { user_answer: text } => {
            normalize_answer_choice(&text, known_answers)
        }
        UserAnswerPayload::Unrecognized(_) => None,
    }
}

/// The right answer, read from a `CORRECT_ANSWER` payload.
pub fn resolve_correct_answer(raw: &Value, known_answers: &[String; 4]) -> Option<AnswerIndex> {
    let payload =
        CorrectAnswerPayload::deserialize(raw).unwrap_or(CorrectAnswerPayload::Unrecognized(IgnoredAny));
    match payload {
        CorrectAnswerPayload::AnswerIndex { answer_index: v }
        | CorrectAnswerPayload::CorrectAnswerIndex {
            correct_answer_index: v,
        } => normalize_index_value(&v),
        CorrectAnswerPayload::AnswerText { answer_text: text }
        | CorrectAnswerPayload::CorrectAnswer { correct_answer: text } => {
            normalize_answer_choice(&text, known_answers)
        }
        CorrectAnswerPayload::Unrecognized(_) => None,
    }
}

fn coerce_question_number(value: &Value) -> u32 {
    coerce_integer(value)
        .and_then(|n| u32::try_from(n).ok())
        .unwrap_or(0)
}

fn coerce_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                .map(|f| f as i64)
        }),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>().ok().or_else(|| {
                s.parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                    .map(|f| f as i64)
            })
        }
        _ => None,
    }
}

/// Empty strings, zero, null and booleans count as "no answer here".
fn answer_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) if n.as_f64() != Some(0.0) => Some(n.to_string()),
        _ => None,
    }
}
