use anyhow::Result;
use parley::conversation::Reply;

pub mod cliclack;

pub trait Prompt {
    fn get_input(&mut self) -> Result<Input>;
    fn show_busy(&mut self);
    fn hide_busy(&self);
    fn render(&mut self, reply: &Reply);
    fn render_error(&mut self, message: &str);
    fn close(&self);
}

pub struct Input {
    pub input_type: InputType,
    pub content: Option<String>,
}

pub enum InputType {
    AskAgain, // Ask the user for input again. Control flow command.
    Message,  // User sent a query
    Exit,     // User wants to end the session
}

/// Classify one raw line of input. The literal `quit` (case-insensitive,
/// surrounding whitespace trimmed) ends the session; blank lines re-prompt.
pub fn classify(raw: &str) -> Input {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        Input {
            input_type: InputType::AskAgain,
            content: None,
        }
    } else if trimmed.eq_ignore_ascii_case("quit") {
        Input {
            input_type: InputType::Exit,
            content: None,
        }
    } else {
        Input {
            input_type: InputType::Message,
            content: Some(trimmed.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quit_is_case_and_whitespace_insensitive() {
        assert!(matches!(classify("quit").input_type, InputType::Exit));
        assert!(matches!(classify("  QUIT  ").input_type, InputType::Exit));
        assert!(matches!(classify("Quit").input_type, InputType::Exit));
    }

    #[test]
    fn test_blank_input_reprompts() {
        assert!(matches!(classify("").input_type, InputType::AskAgain));
        assert!(matches!(classify("   ").input_type, InputType::AskAgain));
    }

    #[test]
    fn test_anything_else_is_a_query() {
        let input = classify("  what is my cpu load? ");
        assert!(matches!(input.input_type, InputType::Message));
        assert_eq!(input.content.as_deref(), Some("what is my cpu load?"));

        // Only the exact word quits
        assert!(matches!(classify("quit smoking").input_type, InputType::Message));
    }
}
