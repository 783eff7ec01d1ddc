use anyhow::Result;
use bat::WrappingMode;
use cliclack::{input, spinner};
use parley::conversation::{Reply, ToolExchange};

use super::{classify, Input, Prompt};

const THEME: &str = "zenburn";

pub struct CliclackPrompt {
    spinner: cliclack::ProgressBar,
}

impl CliclackPrompt {
    pub fn new() -> Self {
        CliclackPrompt { spinner: spinner() }
    }
}

impl Default for CliclackPrompt {
    fn default() -> Self {
        Self::new()
    }
}

fn print_tool_exchange(exchange: &ToolExchange) {
    let arguments =
        serde_json::to_string_pretty(&exchange.request.arguments).unwrap_or_default();
    bat::PrettyPrinter::new()
        .input(
            bat::Input::from_bytes(arguments.as_bytes())
                .name(format!("Tool Request: {}", exchange.request.name)),
        )
        .theme(THEME)
        .language("JSON")
        .grid(true)
        .header(true)
        .wrapping_mode(WrappingMode::Character)
        .print()
        .unwrap();

    let output = exchange.result.as_model_text();
    let language = if output.trim_start().starts_with('{') {
        "JSON"
    } else {
        "Markdown"
    };
    let header = if exchange.result.is_success() {
        "Tool Result:"
    } else {
        "Tool Error:"
    };
    bat::PrettyPrinter::new()
        .input(bat::Input::from_bytes(output.as_bytes()).name(header))
        .theme(THEME)
        .language(language)
        .grid(true)
        .header(true)
        .wrapping_mode(WrappingMode::Character)
        .print()
        .unwrap();
}

fn print_markdown(content: &str) {
    bat::PrettyPrinter::new()
        .input_from_bytes(content.as_bytes())
        .theme(THEME)
        .language("Markdown")
        .wrapping_mode(WrappingMode::Character)
        .print()
        .unwrap();
    println!();
}

impl Prompt for CliclackPrompt {
    fn get_input(&mut self) -> Result<Input> {
        let raw: String = input("Query:")
            .placeholder("Ask something, or \"quit\" to exit")
            .required(false)
            .interact()?;
        Ok(classify(&raw))
    }

    fn show_busy(&mut self) {
        self.spinner = spinner();
        self.spinner.start("Awaiting reply...");
    }

    fn hide_busy(&self) {
        self.spinner.stop("");
    }

    fn render(&mut self, reply: &Reply) {
        for exchange in &reply.activity {
            print_tool_exchange(exchange);
        }
        print_markdown(&reply.answer);
    }

    fn render_error(&mut self, message: &str) {
        println!("Error: {message}");
    }

    fn close(&self) {
        let _ = cliclack::outro("The session has ended");
    }
}
