mod game;

use std::sync::Arc;
use std::time::Duration;

use chatgpt::{client::ChatGPT, config::ChatGPTEngine};
use dotenv::dotenv;
use game::leaderboard::{Entry, JsonFileStore, Leaderboard};
use game::memory::{ClearToken, MemoryPuzzle, Reveal, CARD_SYMBOLS};
use game::provider::EcoQuestionProvider;
use game::quiz::{Feedback, Phase, QuizSession};
use game::Question;
use teloxide::{
    dispatching::dialogue::InMemStorage,
    prelude::*,
    types::{KeyboardButton, KeyboardMarkup},
};
use tokio::sync::Mutex;

type GameDialogue = Dialogue<State, InMemStorage<State>>;
type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;
type SharedLeaderboard = Arc<Mutex<Leaderboard<JsonFileStore>>>;

#[derive(Clone, Default)]
pub enum State {
    #[default]
    Start,
    ReceivePseudo,
    ReceiveGameChoice {
        pseudo: String,
    },
    QuizGame {
        pseudo: String,
        session: QuizSession,
    },
    MemoryGame {
        pseudo: String,
        puzzle: MemoryPuzzle,
    },
}

/// How long a resolved pair stays visible before being hidden again.
const REVEAL_DELAY: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() {
    dotenv().expect("Failed to load .env file");
    let api_key = std::env::var("CHATGPT_API_KEY").expect("CHATGPT_API_KEY is not set");

    pretty_env_logger::init();
    log::info!("Starting EcoGames bot...");

    let bot = Bot::from_env();

    let gpt = {
        let mut gpt = ChatGPT::new(api_key).expect("Unable to connect with ChatGPT");

        gpt.config.engine = ChatGPTEngine::Gpt35Turbo;
        gpt.config.timeout = Duration::from_secs(15);

        gpt
    };
    let provider = Arc::new(EcoQuestionProvider::new(gpt));

    let leaderboard_path =
        std::env::var("LEADERBOARD_PATH").unwrap_or_else(|_| "leaderboard.json".to_string());
    log::info!("Loading the leaderboard from {leaderboard_path}");
    let leaderboard: SharedLeaderboard = Arc::new(Mutex::new(Leaderboard::load(
        JsonFileStore::new(leaderboard_path),
    )));

    let leaderboard_for_pseudo = leaderboard.clone();
    let leaderboard_for_choice = leaderboard.clone();
    let provider_for_choice = provider.clone();

    Dispatcher::builder(
        bot,
        Update::filter_message()
            .enter_dialogue::<Message, InMemStorage<State>, State>()
            .branch(dptree::case![State::Start].endpoint(start))
            .branch(dptree::case![State::ReceivePseudo].endpoint(
                move |bot: Bot, dialogue: GameDialogue, msg: Message| {
                    receive_pseudo(leaderboard_for_pseudo.clone(), bot, dialogue, msg)
                },
            ))
            .branch(dptree::case![State::ReceiveGameChoice { pseudo }].endpoint(
                move |bot: Bot, dialogue: GameDialogue, pseudo: String, msg: Message| {
                    receive_game_choice(
                        provider_for_choice.clone(),
                        leaderboard_for_choice.clone(),
                        bot,
                        dialogue,
                        pseudo,
                        msg,
                    )
                },
            ))
            .branch(dptree::case![State::QuizGame { pseudo, session }].endpoint(
                move |bot: Bot,
                      dialogue: GameDialogue,
                      (pseudo, session): (String, QuizSession),
                      msg: Message| {
                    quiz_game(
                        provider.clone(),
                        leaderboard.clone(),
                        bot,
                        dialogue,
                        (pseudo, session),
                        msg,
                    )
                },
            ))
            .branch(dptree::case![State::MemoryGame { pseudo, puzzle }].endpoint(memory_game)),
    )
    .dependencies(dptree::deps![InMemStorage::<State>::new()])
    .enable_ctrlc_handler()
    .build()
    .dispatch()
    .await;
}

const GREETING_TEXT: &str = "Salut ! Je suis EcoGames 🌍 Teste tes connaissances et ta mémoire pour sauver la planète ! Quel est ton pseudo ?";
async fn start(bot: Bot, dialogue: GameDialogue, msg: Message) -> HandlerResult {
    bot.send_message(msg.chat.id, GREETING_TEXT).await?;

    dialogue.update(State::ReceivePseudo).await?;
    Ok(())
}

async fn receive_pseudo(
    leaderboard: SharedLeaderboard,
    bot: Bot,
    dialogue: GameDialogue,
    msg: Message,
) -> HandlerResult {
    // A non-empty pseudo is required before any game can start.
    let pseudo = match msg.text().map(str::trim) {
        Some(pseudo) if !pseudo.is_empty() => pseudo.to_string(),
        _ => {
            bot.send_message(msg.chat.id, "Il faut un pseudo pour jouer ! Entre ton pseudo :")
                .await?;
            return Ok(());
        }
    };

    bot.send_message(msg.chat.id, format!("Enchanté, {pseudo} !"))
        .await?;

    let board_text = {
        let board = leaderboard.lock().await;
        leaderboard_text(board.entries())
    };
    bot.send_message(msg.chat.id, format!("{board_text}\n\nQue veux-tu faire ?"))
        .reply_markup(menu_keyboard())
        .await?;

    dialogue.update(State::ReceiveGameChoice { pseudo }).await?;
    Ok(())
}

const QUIZ_GAME: &str = "🌿 Quiz écolo";
const MEMORY_GAME: &str = "🧠 Memory";
async fn receive_game_choice(
    provider: Arc<EcoQuestionProvider>,
    leaderboard: SharedLeaderboard,
    bot: Bot,
    dialogue: GameDialogue,
    pseudo: String,
    msg: Message,
) -> HandlerResult {
    match msg.text() {
        Some(QUIZ_GAME) => {
            let mut session = QuizSession::new();
            let epoch = session.begin();
            bot.send_message(msg.chat.id, "🌿 C'est parti ! Je prépare la première question…")
                .await?;
            deliver_question(&provider, &bot, msg.chat.id, &mut session, epoch).await?;
            dialogue.update(State::QuizGame { pseudo, session }).await?;
        }
        Some(MEMORY_GAME) => {
            let puzzle = MemoryPuzzle::new(&CARD_SYMBOLS);
            let (view, keyboard) = memory_view(&puzzle);
            bot.send_message(msg.chat.id, format!("Retrouve les paires !\n\n{view}"))
                .reply_markup(keyboard)
                .await?;
            dialogue.update(State::MemoryGame { pseudo, puzzle }).await?;
        }
        _ => {
            let board_text = {
                let board = leaderboard.lock().await;
                leaderboard_text(board.entries())
            };
            bot.send_message(msg.chat.id, format!("{board_text}\n\nChoisis un des deux jeux !"))
                .reply_markup(menu_keyboard())
                .await?;
        }
    }
    Ok(())
}

const NEXT_QUESTION: &str = "Question suivante";
const RETRY_FETCH: &str = "Réessayer";
async fn quiz_game(
    provider: Arc<EcoQuestionProvider>,
    leaderboard: SharedLeaderboard,
    bot: Bot,
    dialogue: GameDialogue,
    (pseudo, mut session): (String, QuizSession),
    msg: Message,
) -> HandlerResult {
    match session.phase() {
        Phase::Loading => {
            // The previous fetch failed; any tap retries with the same epoch.
            let epoch = session.epoch();
            deliver_question(&provider, &bot, msg.chat.id, &mut session, epoch).await?;
        }
        Phase::AwaitingAnswer => {
            let selected = msg.text().unwrap_or_default();
            let is_option = session
                .question()
                .map(|question| question.options().iter().any(|option| option == selected))
                .unwrap_or(false);
            if !is_option {
                bot.send_message(msg.chat.id, "Réponds avec un des boutons !")
                    .await?;
                dialogue.update(State::QuizGame { pseudo, session }).await?;
                return Ok(());
            }

            let question = session.question().cloned();
            if session.submit_answer(selected).is_none() {
                // Raced by a duplicate tap; nothing changed.
                dialogue.update(State::QuizGame { pseudo, session }).await?;
                return Ok(());
            }
            let reply = feedback_text(&session, question.as_ref());

            if session.is_game_over() {
                bot.send_message(msg.chat.id, reply).await?;
                bot.send_message(
                    msg.chat.id,
                    format!(
                        "💔 La planète n'a plus de santé... Vous avez perdu !\nScore final : {} pts",
                        session.score()
                    ),
                )
                .await?;

                // Holding the lock across record + read also keeps two
                // finished sessions from racing on the same file.
                let board_text = {
                    let mut board = leaderboard.lock().await;
                    let saved = board.record_score(&pseudo, session.score());
                    let mut text = leaderboard_text(board.entries());
                    if let Err(err) = saved {
                        log::warn!("leaderboard not persisted: {err}");
                        text.push_str("\n⚠️ Le score n'a pas pu être sauvegardé durablement.");
                    }
                    text
                };
                bot.send_message(msg.chat.id, format!("{board_text}\n\nQue veux-tu faire ?"))
                    .reply_markup(menu_keyboard())
                    .await?;

                session.reset();
                dialogue.update(State::ReceiveGameChoice { pseudo }).await?;
                return Ok(());
            }

            bot.send_message(msg.chat.id, format!("{reply}\n\n{}", health_line(&session)))
                .reply_markup(KeyboardMarkup::new(vec![vec![KeyboardButton::new(
                    NEXT_QUESTION,
                )]]))
                .await?;
        }
        Phase::ShowingFeedback => {
            if msg.text() == Some(NEXT_QUESTION) {
                if let Some(epoch) = session.advance() {
                    deliver_question(&provider, &bot, msg.chat.id, &mut session, epoch).await?;
                }
            } else {
                bot.send_message(msg.chat.id, "Appuie sur « Question suivante » pour continuer")
                    .reply_markup(KeyboardMarkup::new(vec![vec![KeyboardButton::new(
                        NEXT_QUESTION,
                    )]]))
                    .await?;
            }
        }
        Phase::NotStarted | Phase::GameOver => {
            log::debug!(
                "quiz dialogue reached phase {:?}, back to the menu",
                session.phase()
            );
            bot.send_message(msg.chat.id, "Que veux-tu faire ?")
                .reply_markup(menu_keyboard())
                .await?;
            dialogue.update(State::ReceiveGameChoice { pseudo }).await?;
            return Ok(());
        }
    }

    dialogue.update(State::QuizGame { pseudo, session }).await?;
    Ok(())
}

const BACK_TO_MENU: &str = "Retour";
async fn memory_game(
    bot: Bot,
    dialogue: GameDialogue,
    (pseudo, mut puzzle): (String, MemoryPuzzle),
    msg: Message,
) -> HandlerResult {
    let chat_id = msg.chat.id;
    let text = msg.text().unwrap_or_default();

    if text == BACK_TO_MENU {
        bot.send_message(chat_id, "Que veux-tu faire ?")
            .reply_markup(menu_keyboard())
            .await?;
        dialogue.update(State::ReceiveGameChoice { pseudo }).await?;
        return Ok(());
    }

    let index = match text.parse::<usize>() {
        Ok(number) if number >= 1 => number - 1,
        _ => {
            bot.send_message(chat_id, "Choisis une carte avec les boutons !")
                .await?;
            return Ok(());
        }
    };

    let mut pending_clear = None;
    match puzzle.reveal(index) {
        Reveal::Ignored => {
            // Matched card, card already up, or a pair still on display.
            let (view, keyboard) = memory_view(&puzzle);
            bot.send_message(chat_id, view).reply_markup(keyboard).await?;
        }
        Reveal::First => {
            let (view, keyboard) = memory_view(&puzzle);
            bot.send_message(chat_id, view).reply_markup(keyboard).await?;
        }
        Reveal::Pair { matched, clear } => {
            let headline = if matched {
                match puzzle.last_fact() {
                    Some(fact) => format!("✨ Une paire ! 🌱 {fact}"),
                    None => "✨ Une paire !".to_string(),
                }
            } else {
                "❌ Ce n'est pas une paire...".to_string()
            };
            let (view, keyboard) = memory_view(&puzzle);
            bot.send_message(chat_id, format!("{headline}\n\n{view}"))
                .reply_markup(keyboard)
                .await?;

            if puzzle.is_solved() {
                bot.send_message(
                    chat_id,
                    format!(
                        "🎉 Bravo {pseudo}, toutes les paires sont trouvées !\n\nQue veux-tu faire ?"
                    ),
                )
                .reply_markup(menu_keyboard())
                .await?;
                dialogue.update(State::ReceiveGameChoice { pseudo }).await?;
                return Ok(());
            }
            pending_clear = Some(clear);
        }
    }

    dialogue
        .update(State::MemoryGame { pseudo, puzzle })
        .await?;

    // Scheduled after the state is stored so the timer sees the pair it
    // is supposed to hide. A stale token (new game, newer pair) makes
    // the timer a no-op.
    if let Some(token) = pending_clear {
        let bot = bot.clone();
        let dialogue = dialogue.clone();
        tokio::spawn(async move {
            tokio::time::sleep(REVEAL_DELAY).await;
            let state = match dialogue.get().await {
                Ok(Some(state)) => state,
                _ => return,
            };
            let Some((pseudo, puzzle)) = apply_reveal_clear(state, token) else {
                return;
            };
            // Stored before the network send: a handler running during
            // that await (a "Retour", a new game) must keep the last
            // word on the dialogue slot.
            let stored = State::MemoryGame {
                pseudo,
                puzzle: puzzle.clone(),
            };
            if let Err(err) = dialogue.update(stored).await {
                log::warn!("failed to store the cleared memory state: {err}");
                return;
            }
            let (view, keyboard) = memory_view(&puzzle);
            if let Err(err) = bot.send_message(chat_id, view).reply_markup(keyboard).await {
                log::warn!("failed to refresh the memory grid: {err}");
            }
        });
    }
    Ok(())
}

/// Applies a scheduled pair-hide to the dialogue state it was minted
/// for. None when the player already left the memory game or the token
/// belongs to an older pair or puzzle.
fn apply_reveal_clear(state: State, token: ClearToken) -> Option<(String, MemoryPuzzle)> {
    match state {
        State::MemoryGame { pseudo, mut puzzle } => puzzle
            .clear_revealed(token)
            .then_some((pseudo, puzzle)),
        _ => None,
    }
}

/// Fetches a question for `epoch` and shows it. On failure the session
/// stays in Loading and the player gets a retry button.
async fn deliver_question(
    provider: &EcoQuestionProvider,
    bot: &Bot,
    chat_id: ChatId,
    session: &mut QuizSession,
    epoch: u64,
) -> HandlerResult {
    match provider.fetch_question().await {
        Ok(question) => {
            if session.install_question(epoch, question) {
                if let Some(question) = session.question() {
                    bot.send_message(chat_id, question_view(session, question))
                        .reply_markup(options_keyboard(question))
                        .await?;
                }
            }
        }
        Err(err) => {
            log::warn!("question fetch failed: {err}");
            bot.send_message(chat_id, "La question n'a pas pu être chargée 😢")
                .reply_markup(KeyboardMarkup::new(vec![vec![KeyboardButton::new(
                    RETRY_FETCH,
                )]]))
                .await?;
        }
    }
    Ok(())
}

fn feedback_text(session: &QuizSession, question: Option<&Question>) -> String {
    match session.feedback() {
        Feedback::Correct => {
            let mut reply = "✅ Correct !".to_string();
            if let Some(explanation) = question.and_then(Question::explanation) {
                reply.push_str(&format!("\n{explanation}"));
            }
            reply
        }
        Feedback::Incorrect => {
            let mut reply = "❌ Oups !".to_string();
            if let Some(selected) = session.selected() {
                reply.push_str(&format!("\nTa réponse : {selected}"));
            }
            if let Some(question) = question {
                reply.push_str(&format!("\nLa bonne réponse était : {}", question.answer()));
                if let Some(tip) = question.tip() {
                    reply.push_str(&format!("\n💡 {tip}"));
                }
            }
            reply
        }
        Feedback::None => String::new(),
    }
}

fn question_view(session: &QuizSession, question: &Question) -> String {
    format!("{}\n\n{}", health_line(session), question.text())
}

fn health_line(session: &QuizSession) -> String {
    let hearts = (1..=5u32)
        .map(|slot| if session.health() >= slot * 20 { "💚" } else { "🖤" })
        .collect::<Vec<_>>()
        .join(" ");
    format!("🌿 Santé Planète : {hearts}\nScore : {} pts", session.score())
}

fn options_keyboard(question: &Question) -> KeyboardMarkup {
    let buttons = question
        .options()
        .iter()
        .map(|option| KeyboardButton::new(option.clone()))
        .collect::<Vec<_>>();
    // Two rows of two answers.
    let rows = buttons
        .chunks(2)
        .map(|chunk| chunk.to_vec())
        .collect::<Vec<_>>();
    KeyboardMarkup::new(rows)
}

fn menu_keyboard() -> KeyboardMarkup {
    KeyboardMarkup::new(vec![vec![
        KeyboardButton::new(QUIZ_GAME),
        KeyboardButton::new(MEMORY_GAME),
    ]])
}

fn memory_view(puzzle: &MemoryPuzzle) -> (String, KeyboardMarkup) {
    let mut view = "🌍 EcoMemory".to_string();
    for (i, card) in puzzle.deck().iter().enumerate() {
        if i % 4 == 0 {
            view.push('\n');
        }
        if card.matched || puzzle.is_revealed(i) {
            view.push_str(&card.symbol);
        } else {
            view.push('❓');
        }
        view.push_str("  ");
    }

    let mut rows: Vec<Vec<KeyboardButton>> = Vec::new();
    let mut row = Vec::new();
    for position in 1..=puzzle.deck().len() {
        row.push(KeyboardButton::new(position.to_string()));
        if row.len() == 4 {
            rows.push(std::mem::take(&mut row));
        }
    }
    if !row.is_empty() {
        rows.push(row);
    }
    rows.push(vec![KeyboardButton::new(BACK_TO_MENU)]);

    (view, KeyboardMarkup::new(rows))
}

fn leaderboard_text(entries: &[Entry]) -> String {
    if entries.is_empty() {
        return "🏆 Classement\n\nAucun score pour l'instant.".to_string();
    }
    let mut text = "🏆 Classement".to_string();
    for (rank, entry) in entries.iter().enumerate() {
        text.push_str(&format!("\n{}. {} : {} pts", rank + 1, entry.pseudo, entry.score));
    }
    text
}
