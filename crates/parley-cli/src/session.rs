use anyhow::Result;
use parley::conversation::Conversation;

use crate::prompt::{InputType, Prompt};

/// One interactive session: reads queries, drives the conversation loop,
/// renders replies.
///
/// The exit command only takes effect between turns; once a query is
/// dispatched the in-flight turn always runs to completion (success or
/// failure) before the next prompt is shown. Every escaping failure becomes a
/// visible single-line message and the session keeps prompting.
pub struct Session {
    conversation: Conversation,
    prompt: Box<dyn Prompt>,
}

impl Session {
    pub fn new(conversation: Conversation, prompt: Box<dyn Prompt>) -> Self {
        Session {
            conversation,
            prompt,
        }
    }

    pub async fn start(&mut self) -> Result<()> {
        loop {
            let input = match self.prompt.get_input() {
                Ok(input) => input,
                Err(err) => {
                    self.prompt.render_error(&err.to_string());
                    continue;
                }
            };

            match input.input_type {
                InputType::Exit => break,
                InputType::AskAgain => continue,
                InputType::Message => {
                    let Some(content) = input.content else {
                        continue;
                    };

                    self.prompt.show_busy();
                    let outcome = self.conversation.send(content).await;
                    self.prompt.hide_busy();

                    match outcome {
                        Ok(reply) => self.prompt.render(&reply),
                        Err(err) => self.prompt.render_error(&err.to_string()),
                    }
                }
            }
        }

        self.prompt.close();
        Ok(())
    }
}
