//! Command-line entry point: argument parsing and the interactive loop.

use std::error::Error;
use std::io::Write as _;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use crate::commands::{help_text, parse_input, InputAction};
use crate::core::chat_stream::{SparkBackend, StreamObserver};
use crate::core::config::SparkConfig;
use crate::core::session::ChatSession;
use crate::mcp::client::StdioToolClient;

#[derive(Parser)]
#[command(name = "sparkmd")]
#[command(about = "Chat with a Spark model that can manage your markdown documents")]
#[command(
    long_about = "Sparkmd streams chat completions from a Spark endpoint and \
lets the model operate on your markdown documents through a tool provider \
spoken to over MCP stdio.\n\n\
Environment Variables:\n\
  SPARK_APP_ID      Spark application id (required)\n\
  SPARK_API_KEY     Spark API key (required)\n\
  SPARK_API_SECRET  Spark API secret (required)\n\
  SPARK_CHAT_URL    Endpoint URL (default: wss://spark-api.xf-yun.com/v4.0/chat)\n\
  SPARK_DOMAIN      Model domain (default: 4.0Ultra)\n\n\
Commands at the prompt:\n\
  history           show the conversation so far\n\
  clear             empty the conversation history\n\
  tools             show what the document provider offers\n\
  quit              exit"
)]
pub struct Args {
    /// Command used to launch the markdown tool provider
    #[arg(value_name = "SERVER_COMMAND")]
    pub server_command: Option<String>,

    /// Extra argument passed to the tool provider (repeatable)
    #[arg(long = "server-arg", value_name = "ARG")]
    pub server_args: Vec<String>,
}

/// The provider launch command is mandatory; the process exits with code 1
/// when it is missing.
fn required_server_command(args: &Args) -> Result<&str, Box<dyn Error>> {
    args.server_command
        .as_deref()
        .ok_or_else(|| "a command to launch the markdown tool provider is required".into())
}

/// Short identifier shown in the banner so log lines from concurrent
/// sessions can be told apart.
fn session_token() -> String {
    let millis = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or_default();
    format!("{millis:x}")
}

/// Prints fragments as they stream in, keeping the terminal current.
struct TerminalObserver;

impl StreamObserver for TerminalObserver {
    fn on_partial_text(&mut self, fragment: &str) {
        print!("{fragment}");
        let _ = std::io::stdout().flush();
    }
}

pub async fn run(args: Args) -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let server_command = required_server_command(&args)?;
    let config = SparkConfig::from_env()?;
    let backend = SparkBackend::new(config);

    let provider = StdioToolClient::connect(server_command, &args.server_args).await?;
    let session = ChatSession::new(Box::new(backend), provider.clone());
    let inventory = session.connect().await?;

    println!(
        "Session {} connected to the markdown provider: {}",
        session_token(),
        inventory.summary()
    );
    println!("{}", help_text());

    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();
    let mut observer = TerminalObserver;

    loop {
        print!("\nYou: ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };

        match parse_input(&line) {
            InputAction::Empty => {}
            InputAction::Help => println!("{}", help_text()),
            InputAction::Quit => break,
            InputAction::History => {
                let history = session.history().await;
                if history.is_empty() {
                    println!("(no history yet)");
                }
                for (index, entry) in history.iter().enumerate() {
                    println!("{}. {}: {}", index + 1, entry.role.as_str(), entry.content);
                }
            }
            InputAction::Clear => {
                session.clear_history().await;
                println!("History cleared.");
            }
            InputAction::Tools => match session.inventory().await {
                Some(inventory) => println!("{}", inventory.summary()),
                None => println!("Not connected."),
            },
            InputAction::Chat(text) => {
                print!("Assistant: ");
                std::io::stdout().flush()?;
                match session.process_turn(&text, &mut observer).await {
                    Ok(_) => println!(),
                    Err(err) => {
                        println!();
                        eprintln!("Turn failed: {err}");
                    }
                }
            }
        }
    }

    provider.shutdown().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_command_is_the_positional_argument() {
        let args =
            Args::try_parse_from(["sparkmd", "./provider.sh", "--server-arg", "docs"]).unwrap();
        assert_eq!(args.server_command.as_deref(), Some("./provider.sh"));
        assert_eq!(args.server_args, vec!["docs".to_string()]);
        assert_eq!(required_server_command(&args).unwrap(), "./provider.sh");
    }

    #[test]
    fn missing_server_command_is_an_error() {
        let args = Args::try_parse_from(["sparkmd"]).unwrap();
        assert!(args.server_command.is_none());
        let err = required_server_command(&args).unwrap_err();
        assert!(err.to_string().contains("required"));
    }
}
