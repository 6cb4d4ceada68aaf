use crate::game::Question;

pub const STARTING_HEALTH: u32 = 100;
pub const WRONG_ANSWER_DAMAGE: u32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Phase {
    NotStarted,
    Loading,
    AwaitingAnswer,
    ShowingFeedback,
    GameOver,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Feedback {
    None,
    Correct,
    Incorrect,
}

/// One run of the trivia quiz.
///
/// The session is a plain state machine: the caller performs the actual
/// question fetch and feeds the result back through
/// [`QuizSession::install_question`] with the epoch minted by
/// [`QuizSession::begin`] or [`QuizSession::advance`]. A response that
/// arrives after the session moved on carries a stale epoch and is
/// discarded instead of applied.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct QuizSession {
    question: Option<Question>,
    selected: Option<String>,
    feedback: Feedback,
    score: u32,
    health: u32,
    phase: Phase,
    epoch: u64,
}

impl QuizSession {
    pub fn new() -> Self {
        Self {
            question: None,
            selected: None,
            feedback: Feedback::None,
            score: 0,
            health: STARTING_HEALTH,
            phase: Phase::NotStarted,
            epoch: 0,
        }
    }

    /// Starts a fresh run and returns the epoch the caller must pass
    /// back once the first question arrives. The caller is responsible
    /// for only starting a session with a non-empty player name.
    pub fn begin(&mut self) -> u64 {
        self.question = None;
        self.selected = None;
        self.feedback = Feedback::None;
        self.score = 0;
        self.health = STARTING_HEALTH;
        self.phase = Phase::Loading;
        self.epoch += 1;
        self.epoch
    }

    /// Hands a fetched question to the session. Returns false when the
    /// question was discarded: either the session is not loading, or
    /// `epoch` is stale because the session was reset or advanced while
    /// the fetch was in flight.
    pub fn install_question(&mut self, epoch: u64, question: Question) -> bool {
        if self.phase != Phase::Loading || epoch != self.epoch {
            log::debug!(
                "discarding question for epoch {} (current {}, phase {:?})",
                epoch,
                self.epoch,
                self.phase
            );
            return false;
        }
        self.question = Some(question);
        self.selected = None;
        self.feedback = Feedback::None;
        self.phase = Phase::AwaitingAnswer;
        true
    }

    /// Scores the selected option. Outside `AwaitingAnswer` this is a
    /// no-op returning None, which also makes a re-entrant second call
    /// harmless: the first call already moved the phase on.
    pub fn submit_answer(&mut self, option: &str) -> Option<Feedback> {
        if self.phase != Phase::AwaitingAnswer {
            log::debug!("submit_answer ignored in phase {:?}", self.phase);
            return None;
        }
        let question = self.question.as_ref()?;

        self.selected = Some(option.to_string());
        if option == question.answer() {
            self.score += 1;
            self.feedback = Feedback::Correct;
        } else {
            self.health = self.health.saturating_sub(WRONG_ANSWER_DAMAGE);
            self.feedback = Feedback::Incorrect;
        }
        self.phase = if self.health == 0 {
            Phase::GameOver
        } else {
            Phase::ShowingFeedback
        };
        Some(self.feedback)
    }

    /// Moves on to the next question. Only valid while showing
    /// feedback; in particular a finished run never requests another
    /// question. Returns the epoch for the next fetch.
    pub fn advance(&mut self) -> Option<u64> {
        if self.phase != Phase::ShowingFeedback {
            log::debug!("advance ignored in phase {:?}", self.phase);
            return None;
        }
        self.phase = Phase::Loading;
        self.epoch += 1;
        Some(self.epoch)
    }

    /// Back to `NotStarted`, keeping the epoch monotonic so a fetch
    /// still in flight for the old run can never land in the new one.
    pub fn reset(&mut self) {
        let epoch = self.epoch + 1;
        *self = Self::new();
        self.epoch = epoch;
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn score(&self) -> u32 {
        self.score
    }

    pub fn health(&self) -> u32 {
        self.health
    }

    pub fn feedback(&self) -> Feedback {
        self.feedback
    }

    pub fn question(&self) -> Option<&Question> {
        self.question.as_ref()
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn is_game_over(&self) -> bool {
        self.phase == Phase::GameOver
    }
}

impl Default for QuizSession {
    fn default() -> Self {
        Self::new()
    }
}
