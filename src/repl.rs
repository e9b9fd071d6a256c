use crate::cli::ChatArgs;
use crate::models::chat::{ Message, Role };
use crate::session::backend::HttpChatBackend;
use crate::session::store::{ ConversationStore, JsonFileStore, MemoryStore };
use crate::session::{ ChatSession, SessionConfig, Status, CLEAR_PROMPT };
use chrono::{ Local, TimeZone };
use log::{ info, warn };
use std::error::Error;
use std::sync::Arc;
use tokio::io::{ AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin };
use tokio::task::JoinHandle;

const ASSISTANT_NAME: &str = "AskGio";

enum Line {
    Quit,
    Clear,
    Chat(String),
}

fn parse_line(line: &str) -> Line {
    match line.trim() {
        "/quit" | "/exit" => Line::Quit,
        "/clear" => Line::Clear,
        _ => Line::Chat(line.to_string()),
    }
}

fn is_confirmation(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

fn format_message(message: &Message) -> String {
    let time = Local.timestamp_millis_opt(message.timestamp)
        .single()
        .map(|t| t.format("%H:%M").to_string())
        .unwrap_or_default();
    let who = match message.role {
        Role::User => "You",
        Role::Assistant => ASSISTANT_NAME,
    };
    format!("[{}] {}: {}", time, who, message.content)
}

async fn prompt(lines: &mut Lines<BufReader<Stdin>>, text: &str) -> std::io::Result<Option<String>> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(text.as_bytes()).await?;
    stdout.flush().await?;
    lines.next_line().await
}

pub async fn run(args: ChatArgs) -> Result<(), Box<dyn Error + Send + Sync>> {
    let backend = Arc::new(HttpChatBackend::new(&args.server_url));
    let store: Arc<dyn ConversationStore> = if args.no_persist {
        info!("Conversation persistence disabled");
        Arc::new(MemoryStore::new())
    } else {
        let store = match &args.storage_dir {
            Some(dir) => JsonFileStore::new(dir),
            None => JsonFileStore::in_default_location(),
        };
        info!("Conversation stored at {}", store.path().display());
        Arc::new(store)
    };
    info!("Chatting with {}", backend.url());

    let mut session = ChatSession::open(backend, store, SessionConfig::from_args(&args)).await;
    for message in session.messages() {
        println!("{}", format_message(message));
    }

    let mut status = session.subscribe();
    let indicator = tokio::spawn(async move {
        while status.changed().await.is_ok() {
            if *status.borrow_and_update() == Status::Typing {
                eprintln!("{} is typing...", ASSISTANT_NAME);
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = prompt(&mut lines, "> ").await? {
        match parse_line(&line) {
            Line::Quit => {
                break;
            }
            Line::Clear => {
                let answer = prompt(&mut lines, &format!("{} [y/N] ", CLEAR_PROMPT)).await?;
                let confirmed = answer.as_deref().map(is_confirmation).unwrap_or(false);
                if session.clear(|| confirmed).await {
                    for message in session.messages() {
                        println!("{}", format_message(message));
                    }
                }
            }
            Line::Chat(text) => {
                session.set_input(text);
                if let Some(reply) = session.submit_input().await {
                    println!("{}", format_message(reply));
                }
            }
        }
    }

    drop(session);
    finish_indicator(indicator).await;
    Ok(())
}

async fn finish_indicator(indicator: JoinHandle<()>) {
    if let Err(e) = indicator.await {
        warn!("Typing indicator task failed: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_are_recognised() {
        assert!(matches!(parse_line(" /quit "), Line::Quit));
        assert!(matches!(parse_line("/exit"), Line::Quit));
        assert!(matches!(parse_line("/clear"), Line::Clear));
        assert!(matches!(parse_line("hello /clear"), Line::Chat(ref s) if s == "hello /clear"));
    }

    #[test]
    fn only_yes_confirms() {
        assert!(is_confirmation("y"));
        assert!(is_confirmation(" YES\n"));
        assert!(!is_confirmation(""));
        assert!(!is_confirmation("no"));
        assert!(!is_confirmation("sure"));
    }

    #[test]
    fn messages_show_author_and_content() {
        let line = format_message(&Message::user("hello"));
        assert!(line.ends_with("You: hello"));
        let line = format_message(&Message::assistant("Hi!"));
        assert!(line.ends_with("AskGio: Hi!"));
    }

    #[tokio::test]
    async fn failed_indicator_task_does_not_abort_shutdown() {
        let indicator = tokio::spawn(async {
            panic!("indicator blew up");
        });
        finish_indicator(indicator).await;
    }
}
