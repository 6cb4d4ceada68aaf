pub mod leaderboard;
pub mod memory;
pub mod provider;
pub mod quiz;

/// One multiple-choice trivia question, validated at construction.
///
/// The provider's payload is only turned into a `Question` through
/// [`Question::new`], so anything the engine hands to the presentation
/// layer is guaranteed answerable: four distinct options, with the
/// correct answer among them.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Question {
    text: String,
    options: Vec<String>,
    answer: String,
    tip: Option<String>,
    explanation: Option<String>,
    image_url: Option<String>,
}

pub const OPTIONS_PER_QUESTION: usize = 4;

impl Question {
    pub fn new(
        text: String,
        options: Vec<String>,
        answer: String,
        tip: Option<String>,
        explanation: Option<String>,
        image_url: Option<String>,
    ) -> Result<Self, MalformedQuestion> {
        if text.trim().is_empty() {
            return Err(MalformedQuestion::EmptyText);
        }
        if options.len() != OPTIONS_PER_QUESTION {
            return Err(MalformedQuestion::WrongOptionCount(options.len()));
        }
        for (i, option) in options.iter().enumerate() {
            if option.trim().is_empty() {
                return Err(MalformedQuestion::EmptyOption);
            }
            if options[..i].contains(option) {
                return Err(MalformedQuestion::DuplicateOption(option.clone()));
            }
        }
        if !options.contains(&answer) {
            return Err(MalformedQuestion::AnswerNotInOptions(answer));
        }

        Ok(Self {
            text,
            options,
            answer,
            tip,
            explanation,
            image_url,
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn options(&self) -> &[String] {
        &self.options
    }

    pub fn answer(&self) -> &str {
        &self.answer
    }

    pub fn tip(&self) -> Option<&str> {
        self.tip.as_deref()
    }

    pub fn explanation(&self) -> Option<&str> {
        self.explanation.as_deref()
    }

    pub fn image_url(&self) -> Option<&str> {
        self.image_url.as_deref()
    }
}

/// A provider payload that parsed as JSON but cannot be played.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MalformedQuestion {
    #[error("question text is empty")]
    EmptyText,
    #[error("expected {OPTIONS_PER_QUESTION} options, got {0}")]
    WrongOptionCount(usize),
    #[error("an option is empty")]
    EmptyOption,
    #[error("duplicate option {0:?}")]
    DuplicateOption(String),
    #[error("answer {0:?} is not among the options")]
    AnswerNotInOptions(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Network trouble or an unparseable reply; the caller may retry.
    #[error("question service unavailable: {0}")]
    Unavailable(String),
    /// Structurally invalid question; also retried, never displayed.
    #[error("malformed question from provider: {0}")]
    Malformed(#[from] MalformedQuestion),
}

impl From<chatgpt::err::Error> for ProviderError {
    fn from(err: chatgpt::err::Error) -> Self {
        ProviderError::Unavailable(err.to_string())
    }
}

/// The leaderboard write did not durably complete. The in-memory
/// leaderboard still reflects the update for the rest of the process.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("leaderboard write failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("leaderboard encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> Vec<String> {
        vec![
            "A) Le tri".to_string(),
            "B) Le compost".to_string(),
            "C) Le plastique".to_string(),
            "D) Le vélo".to_string(),
        ]
    }

    #[test]
    fn accepts_a_well_formed_question() {
        let q = Question::new(
            "Que faut-il faire de ses déchets ?".to_string(),
            options(),
            "A) Le tri".to_string(),
            Some("Trier aide au recyclage".to_string()),
            None,
            None,
        )
        .unwrap();
        assert_eq!(q.answer(), "A) Le tri");
        assert_eq!(q.options().len(), 4);
    }

    #[test]
    fn rejects_answer_missing_from_options() {
        let err = Question::new(
            "Question ?".to_string(),
            options(),
            "E) Autre chose".to_string(),
            None,
            None,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, MalformedQuestion::AnswerNotInOptions(_)));
    }

    #[test]
    fn rejects_wrong_option_count() {
        let mut three = options();
        three.pop();
        let err = Question::new(
            "Question ?".to_string(),
            three,
            "A) Le tri".to_string(),
            None,
            None,
            None,
        )
        .unwrap_err();
        assert_eq!(err, MalformedQuestion::WrongOptionCount(3));
    }

    #[test]
    fn rejects_duplicate_options() {
        let mut dup = options();
        dup[3] = dup[0].clone();
        let err = Question::new(
            "Question ?".to_string(),
            dup,
            "A) Le tri".to_string(),
            None,
            None,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, MalformedQuestion::DuplicateOption(_)));
    }

    #[test]
    fn rejects_empty_text() {
        let err = Question::new(
            "   ".to_string(),
            options(),
            "A) Le tri".to_string(),
            None,
            None,
            None,
        )
        .unwrap_err();
        assert_eq!(err, MalformedQuestion::EmptyText);
    }
}
