use chatgpt::client::ChatGPT;
use chatgpt::types::CompletionResponse;

use crate::game::{ProviderError, Question};

/// One JSON object per question, four lettered options, answer among
/// them.
const QUESTION_PROMPT: &str = "Génère une question à choix multiple en français sur l'écologie, \
avec une bonne réponse et trois mauvaises. Chaque choix doit forcément commencer par une lettre. \
Ajoute aussi une explication claire et courte de la bonne réponse et un petit conseil écolo. \
Réponds uniquement avec un objet JSON de cette forme :\n\
{\n  \"question\": \"\",\n  \"options\": [\"\", \"\", \"\", \"\"],\n  \"answer\": \"\",\n  \"imagePrompt\": \"\",\n  \"tip\": \"\",\n  \"explanation\": \"\"\n}";

const DEFAULT_TIP: &str = "Protéger la planète commence par des petits gestes !";

pub struct EcoQuestionProvider {
    chat_gpt: ChatGPT,
}

impl EcoQuestionProvider {
    pub fn new(chat_gpt: ChatGPT) -> Self {
        Self { chat_gpt }
    }

    /// Fetches one validated trivia question. Network failures and
    /// unusable payloads both come back as errors the caller retries;
    /// an invalid question is never surfaced to the player.
    pub async fn fetch_question(&self) -> Result<Question, ProviderError> {
        log::debug!("requesting a quiz question");
        let response: CompletionResponse = self.chat_gpt.send_message(QUESTION_PROMPT).await?;
        let content = response.message().clone().content;
        parse_question(&content)
    }
}

/// Raw provider payload, before validation.
#[derive(serde::Deserialize)]
struct RawQuestion {
    question: String,
    options: Vec<String>,
    answer: String,
    #[serde(rename = "imagePrompt", default)]
    image_prompt: Option<String>,
    #[serde(default)]
    tip: Option<String>,
    #[serde(default)]
    explanation: Option<String>,
}

fn parse_question(reply: &str) -> Result<Question, ProviderError> {
    let json = extract_json(reply)
        .ok_or_else(|| ProviderError::Unavailable("reply contains no JSON object".to_string()))?;
    let raw: RawQuestion = serde_json::from_str(json)
        .map_err(|err| ProviderError::Unavailable(format!("unparseable reply: {err}")))?;

    let image_url = Some(image_url_for(
        raw.image_prompt.as_deref().unwrap_or("nature"),
    ));
    let tip = raw
        .tip
        .filter(|tip| !tip.trim().is_empty())
        .or_else(|| Some(DEFAULT_TIP.to_string()));
    let explanation = raw.explanation.filter(|text| !text.trim().is_empty());

    let question = Question::new(raw.question, raw.options, raw.answer, tip, explanation, image_url)?;
    Ok(question)
}

/// Chat models like to wrap their JSON in prose or code fences; keep
/// everything between the outermost braces.
fn extract_json(reply: &str) -> Option<&str> {
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    (start < end).then(|| &reply[start..=end])
}

fn image_url_for(prompt: &str) -> String {
    let topic = prompt.trim();
    let topic = if topic.is_empty() { "nature" } else { topic };
    format!(
        "https://source.unsplash.com/600x400/?{}",
        topic.replace(' ', "%20")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::MalformedQuestion;

    const VALID_PAYLOAD: &str = r#"{
        "question": "Quel est le principal gaz à effet de serre émis par l'homme ?",
        "options": ["A) Le CO2", "B) L'oxygène", "C) L'azote", "D) L'hélium"],
        "answer": "A) Le CO2",
        "imagePrompt": "usine fumée",
        "tip": "Privilégie le vélo pour les trajets courts.",
        "explanation": "Le dioxyde de carbone domine les émissions humaines."
    }"#;

    #[test]
    fn parses_a_valid_payload() {
        let question = parse_question(VALID_PAYLOAD).unwrap();
        assert_eq!(question.answer(), "A) Le CO2");
        assert_eq!(question.options().len(), 4);
        assert_eq!(
            question.image_url(),
            Some("https://source.unsplash.com/600x400/?usine%20fumée")
        );
        assert!(question.explanation().unwrap().starts_with("Le dioxyde"));
    }

    #[test]
    fn parses_a_fenced_payload() {
        let fenced = format!("Voici la question :\n```json\n{VALID_PAYLOAD}\n```\nBonne chance !");
        let question = parse_question(&fenced).unwrap();
        assert_eq!(question.answer(), "A) Le CO2");
    }

    #[test]
    fn missing_answer_field_is_a_provider_failure() {
        let payload = r#"{
            "question": "Question ?",
            "options": ["A", "B", "C", "D"]
        }"#;
        let err = parse_question(payload).unwrap_err();
        assert!(matches!(err, ProviderError::Unavailable(_)));
    }

    #[test]
    fn answer_outside_options_is_malformed() {
        let payload = r#"{
            "question": "Question ?",
            "options": ["A", "B", "C", "D"],
            "answer": "E"
        }"#;
        let err = parse_question(payload).unwrap_err();
        assert!(matches!(
            err,
            ProviderError::Malformed(MalformedQuestion::AnswerNotInOptions(_))
        ));
    }

    #[test]
    fn non_json_reply_is_a_provider_failure() {
        let err = parse_question("Désolé, je ne peux pas répondre.").unwrap_err();
        assert!(matches!(err, ProviderError::Unavailable(_)));
    }

    #[test]
    fn missing_tip_falls_back_to_the_default() {
        let payload = r#"{
            "question": "Question ?",
            "options": ["A", "B", "C", "D"],
            "answer": "B"
        }"#;
        let question = parse_question(payload).unwrap();
        assert_eq!(question.tip(), Some(DEFAULT_TIP));
        assert_eq!(
            question.image_url(),
            Some("https://source.unsplash.com/600x400/?nature")
        );
    }
}
