//! Player-side loop: poll for the current question, show it with a countdown, submit the pick.

use log::{debug, error, info, warn};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::api::TriviaApi;
use crate::config::{ExpiryPolicy, PollConfig};
use crate::countdown::Countdown;
use crate::error::{ApiError, ChoiceError, PollError};
use crate::model::request::AnswerSubmission;
use crate::model::types::{AnswerIndex, Identity, NormalizedQuestion};
use crate::normalize::normalize_question;
use crate::scheduler::{Scheduler, TimerHandle};
use crate::session::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputState {
    Open,
    /// The countdown ran out; the question stays visible but takes no answer.
    Expired,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShownQuestion {
    pub question: NormalizedQuestion,
    pub countdown: Countdown,
    pub input: InputState,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollPhase {
    /// Waiting for the host to start a question we have not answered.
    Idle,
    Showing(ShownQuestion),
}

/// Snapshot of what the player should see, published after every change.
#[derive(Debug, Clone, PartialEq)]
pub struct PollView {
    pub phase: PollPhase,
    pub last_answered: u32,
    pub error: Option<String>,
}

impl PollView {
    pub fn shown(&self) -> Option<&ShownQuestion> {
        match &self.phase {
            PollPhase::Showing(shown) => Some(shown),
            PollPhase::Idle => None,
        }
    }
}

struct PollState {
    phase: PollPhase,
    last_displayed: u32,
    error: Option<String>,
    countdown_timer: Option<TimerHandle>,
    forfeit_timer: Option<TimerHandle>,
}

struct Shared {
    session: Arc<Session>,
    api: Arc<dyn TriviaApi>,
    identity: Identity,
    config: PollConfig,
    scheduler: Scheduler,
    state: Mutex<PollState>,
    view_tx: watch::Sender<PollView>,
}

fn lock(state: &Mutex<PollState>) -> MutexGuard<'_, PollState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct PollingController {
    shared: Arc<Shared>,
    poll_timer: Option<TimerHandle>,
}

impl PollingController {
    pub fn new(
        session: Arc<Session>,
        api: Arc<dyn TriviaApi>,
        scheduler: Scheduler,
        config: PollConfig,
    ) -> Result<Self, PollError> {
        let identity = session.identity().cloned().ok_or(PollError::NoIdentity)?;
        let (view_tx, _) = watch::channel(PollView {
            phase: PollPhase::Idle,
            last_answered: session.last_answered(),
            error: None,
        });
        let shared = Arc::new(Shared {
            session,
            api,
            identity,
            config,
            scheduler,
            state: Mutex::new(PollState {
                phase: PollPhase::Idle,
                last_displayed: 0,
                error: None,
                countdown_timer: None,
                forfeit_timer: None,
            }),
            view_tx,
        });
        Ok(Self {
            shared,
            poll_timer: None,
        })
    }

    /// Begin polling: once right away, then every configured interval.
    pub fn start(&mut self) {
        if self.poll_timer.is_some() {
            return;
        }
        info!(
            "Polling for {} every {:?}",
            self.shared.identity.member, self.shared.config.interval
        );
        let weak = Arc::downgrade(&self.shared);
        self.poll_timer = Some(
            self.shared
                .scheduler
                .repeating(self.shared.config.interval, move || {
                    let weak = weak.clone();
                    async move {
                        if let Some(shared) = weak.upgrade() {
                            shared.poll_once().await;
                        }
                    }
                }),
        );
    }

    /// Stop polling and every running countdown. Submits already sent are left to finish.
    pub fn stop(&mut self) {
        if let Some(timer) = self.poll_timer.take() {
            timer.cancel();
            info!("Stopped polling");
        }
        let mut state = lock(&self.shared.state);
        state.countdown_timer = None;
        state.forfeit_timer = None;
    }

    pub fn is_running(&self) -> bool {
        self.poll_timer.is_some()
    }

    /// Poll once outside the regular schedule.
    pub async fn tick(&self) {
        Arc::clone(&self.shared).poll_once().await;
    }

    /// Pick an answer for the shown question.
    ///
    /// The progress marker is raised and the question cleared before the submit goes out. If the
    /// marker cannot be stored nothing is sent. The returned handle finishes when the submit does;
    /// a failed submit only shows up as the view error.
    pub fn choose(&self, index: AnswerIndex) -> Result<JoinHandle<()>, ChoiceError> {
        let shared = &self.shared;
        let submission = {
            let mut state = lock(&shared.state);
            let PollPhase::Showing(shown) = &state.phase else {
                return Err(ChoiceError::NothingShown);
            };
            if shown.input == InputState::Expired || shown.countdown.is_expired() {
                return Err(ChoiceError::Expired);
            }
            if shown.question.is_placeholder(index) {
                return Err(ChoiceError::EmptySlot(index));
            }
            let submission = AnswerSubmission::new(&shared.identity, &shown.question, index);
            let question_number = shown.question.question_number;
            info!("Picked answer {index} for question {question_number}");

            // The question stays open so the player can pick again once the disk recovers.
            if let Err(e) = shared.session.raise_last_answered(question_number) {
                error!("Not submitting question {question_number}, progress not stored: {e}");
                state.error = Some(format!("Could not store progress: {e}"));
                shared.publish(&state);
                return Err(ChoiceError::ProgressNotSaved(e.to_string()));
            }
            state.phase = PollPhase::Idle;
            state.countdown_timer = None;
            state.forfeit_timer = None;
            shared.publish(&state);
            submission
        };

        let api = shared.api.clone();
        let weak = Arc::downgrade(shared);
        Ok(shared.scheduler.spawn(async move {
            match api.submit_answer(&submission).await {
                Ok(()) => debug!("Submitted answer for question {}", submission.question_number),
                Err(e) => {
                    error!("Answer submit failed: {e}");
                    if let Some(shared) = weak.upgrade() {
                        let mut state = lock(&shared.state);
                        state.error = Some(format!("Answer submit failed: {e}"));
                        shared.publish(&state);
                    }
                }
            }
        }))
    }

    pub fn view(&self) -> PollView {
        self.shared.view_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PollView> {
        self.shared.view_tx.subscribe()
    }

    pub fn identity(&self) -> &Identity {
        &self.shared.identity
    }
}

impl Drop for PollingController {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Shared {
    async fn poll_once(self: Arc<Self>) {
        let result = self.api.fetch_current_question(&self.identity).await;
        self.apply_poll(result);
    }

    fn apply_poll(self: &Arc<Self>, result: Result<Option<serde_json::Value>, ApiError>) {
        let mut state = lock(&self.state);
        match result {
            Err(e) => {
                warn!("Polling failed: {e}");
                state.error = Some(e.to_string());
            }
            Ok(None) => {
                state.error = None;
            }
            Ok(Some(raw)) => {
                state.error = None;
                let question = normalize_question(&raw);
                let question_number = question.question_number;
                // Read at apply time; a pick may have raised it while this poll was in flight.
                let last_answered = self.session.last_answered();
                if !question.has_valid_number() {
                    warn!("Ignoring question without a usable number: {raw}");
                } else if question_number <= last_answered {
                    debug!("Question {question_number} already answered (last {last_answered})");
                } else if question_number == state.last_displayed {
                    debug!("Question {question_number} already shown");
                } else {
                    self.show(&mut state, question);
                }
            }
        }
        self.publish(&state);
    }

    fn show(self: &Arc<Self>, state: &mut PollState, question: NormalizedQuestion) {
        let question_number = question.question_number;
        info!("Showing question {question_number}: {}", question.text);
        let countdown = Countdown::start(question_number, self.config.countdown);

        state.last_displayed = question_number;
        state.forfeit_timer = None;
        let weak = Arc::downgrade(self);
        state.countdown_timer = Some(self.scheduler.once(self.config.countdown, async move {
            if let Some(shared) = weak.upgrade() {
                shared.on_countdown_expired(question_number);
            }
        }));
        state.phase = PollPhase::Showing(ShownQuestion {
            question,
            countdown,
            input: InputState::Open,
        });
    }

    fn on_countdown_expired(self: &Arc<Self>, question_number: u32) {
        let mut state = lock(&self.state);
        let expired = match &mut state.phase {
            PollPhase::Showing(shown)
                if shown.question.question_number == question_number
                    && shown.input == InputState::Open =>
            {
                shown.input = InputState::Expired;
                true
            }
            _ => false,
        };
        if !expired {
            return;
        }
        info!("Time is up for question {question_number}");

        if let ExpiryPolicy::Forfeit { after } = self.config.expiry {
            let weak: Weak<Shared> = Arc::downgrade(self);
            state.forfeit_timer = Some(self.scheduler.once(after, async move {
                if let Some(shared) = weak.upgrade() {
                    shared.on_forfeit(question_number);
                }
            }));
        }
        self.publish(&state);
    }

    fn on_forfeit(&self, question_number: u32) {
        let mut state = lock(&self.state);
        match &state.phase {
            PollPhase::Showing(shown)
                if shown.question.question_number == question_number
                    && shown.input == InputState::Expired => {}
            _ => return,
        }
        info!("Forfeiting question {question_number}");
        match self.session.raise_last_answered(question_number) {
            Ok(_) => state.phase = PollPhase::Idle,
            Err(e) => {
                error!("Keeping question {question_number}, progress not stored: {e}");
                state.error = Some(format!("Could not store progress: {e}"));
            }
        }
        self.publish(&state);
    }

    fn publish(&self, state: &PollState) {
        self.view_tx.send_replace(PollView {
            phase: state.phase.clone(),
            last_answered: self.session.last_answered(),
            error: state.error.clone(),
        });
    }
}
