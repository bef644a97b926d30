//! Keyword commands recognized at the prompt.
//!
//! Anything that is not a bare keyword is treated as a chat turn, so the
//! matching is case-insensitive but exact: "clear the table" goes to the
//! model, "clear" does not.

/// What one line of input asks the loop to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputAction {
    /// Print transcript entries.
    History,
    /// Empty the transcript.
    Clear,
    /// Show the provider's capability summary.
    Tools,
    /// Print the command reference.
    Help,
    /// Leave the loop.
    Quit,
    /// Send the line to the model as a turn.
    Chat(String),
    /// Blank line, nothing to do.
    Empty,
}

pub fn parse_input(line: &str) -> InputAction {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return InputAction::Empty;
    }
    match trimmed.to_lowercase().as_str() {
        "history" => InputAction::History,
        "clear" => InputAction::Clear,
        "tools" => InputAction::Tools,
        "help" => InputAction::Help,
        "quit" | "exit" => InputAction::Quit,
        _ => InputAction::Chat(trimmed.to_string()),
    }
}

pub fn help_text() -> &'static str {
    "Commands:\n  history  show the conversation so far\n  clear    empty the conversation history\n  tools    show what the document provider offers\n  help     show this reference\n  quit     exit"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_are_case_insensitive() {
        assert_eq!(parse_input("QUIT"), InputAction::Quit);
        assert_eq!(parse_input("  History "), InputAction::History);
        assert_eq!(parse_input("clear"), InputAction::Clear);
    }

    #[test]
    fn sentences_are_chat_turns() {
        assert_eq!(
            parse_input("clear the table"),
            InputAction::Chat("clear the table".to_string())
        );
        assert_eq!(
            parse_input("please quit smoking"),
            InputAction::Chat("please quit smoking".to_string())
        );
    }

    #[test]
    fn blank_lines_are_skipped() {
        assert_eq!(parse_input("   "), InputAction::Empty);
        assert_eq!(parse_input(""), InputAction::Empty);
    }
}
