//! Line-oriented terminal collaborator.
//!
//! Reads answers from stdin one line at a time. `:q` or end of input cancels
//! the session at any prompt; an empty line acknowledges a navigation step.
//! Sensitive values are read with echo off when stdin is a terminal.

use std::io::{IsTerminal, Write};

use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use hacksmith_engine::{AiRequest, ChoiceRequest, ConfirmationRequest, NavigationRequest, Reply, StepIo, TextRequest};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::Mutex;

const ABORT_COMMAND: &str = ":q";

pub struct TerminalIo {
    lines: Mutex<Lines<BufReader<Stdin>>>,
    assume_yes: bool,
}

impl TerminalIo {
    /// `assume_yes` skips the plaintext-credentials confirmation.
    pub fn new(assume_yes: bool) -> Self {
        Self {
            lines: Mutex::new(BufReader::new(tokio::io::stdin()).lines()),
            assume_yes,
        }
    }

    /// Next line, or `None` on `:q` or end of input.
    async fn read_answer(&self, prompt: &str) -> Result<Option<String>> {
        print!("{prompt}");
        std::io::stdout().flush().context("failed to flush stdout")?;
        let line = self.lines.lock().await.next_line().await.context("failed to read stdin")?;
        Ok(line.filter(|line| line.trim() != ABORT_COMMAND))
    }

    /// Like [`TerminalIo::read_answer`], without echoing the typed characters.
    async fn read_hidden_answer(&self, prompt: &str) -> Result<Option<String>> {
        if !std::io::stdin().is_terminal() {
            return self.read_answer(prompt).await;
        }
        print!("{prompt}");
        std::io::stdout().flush().context("failed to flush stdout")?;
        // Hold the reader so no buffered line read interleaves with raw input.
        let _lines = self.lines.lock().await;
        let answer = tokio::task::spawn_blocking(read_hidden)
            .await
            .context("hidden input task failed")??;
        Ok(answer.filter(|answer| answer.trim() != ABORT_COMMAND))
    }
}

/// Reads one line in raw mode. Esc or Ctrl-C cancels.
fn read_hidden() -> Result<Option<String>> {
    enable_raw_mode().context("failed to enable raw mode")?;
    let answer = collect_hidden_keys();
    let restored = disable_raw_mode().context("failed to restore the terminal");
    println!();
    let answer = answer?;
    restored?;
    Ok(answer)
}

fn collect_hidden_keys() -> Result<Option<String>> {
    let mut value = String::new();
    loop {
        let Event::Key(key) = event::read().context("failed to read key")? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }
        match key.code {
            KeyCode::Enter => return Ok(Some(value)),
            KeyCode::Esc => return Ok(None),
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => return Ok(None),
            KeyCode::Backspace => {
                value.pop();
            }
            KeyCode::Char(ch) => value.push(ch),
            _ => {}
        }
    }
}

fn heading(title: &str) {
    println!();
    println!("== {title} ==");
}

#[async_trait::async_trait]
impl StepIo for TerminalIo {
    async fn acquire_text(&self, request: &TextRequest) -> Result<Reply<String>> {
        if request.attempt == 1 {
            heading(&request.title);
        }
        if let Some(description) = &request.description {
            println!("{description}");
        }
        if let Some(hint) = &request.hint {
            println!("! {hint}");
        }
        let answer = if request.sensitive {
            self.read_hidden_answer(&format!("{} (sensitive, hidden)> ", request.variable)).await?
        } else {
            self.read_answer(&format!("{}> ", request.variable)).await?
        };
        Ok(match answer {
            Some(answer) => Reply::Answer(answer),
            None => Reply::Abort,
        })
    }

    async fn present_choice(&self, request: &ChoiceRequest) -> Result<Reply<String>> {
        if request.attempt == 1 {
            heading(&request.title);
            for (index, option) in request.options.iter().enumerate() {
                println!("  {}. {option}", index + 1);
            }
        }
        if let Some(hint) = &request.hint {
            println!("! {hint}");
        }
        let Some(answer) = self.read_answer(&format!("{}> ", request.variable)).await? else {
            return Ok(Reply::Abort);
        };
        // Accept the option number as a shortcut.
        let selection = answer
            .trim()
            .parse::<usize>()
            .ok()
            .and_then(|number| number.checked_sub(1))
            .and_then(|index| request.options.get(index).cloned())
            .unwrap_or(answer);
        Ok(Reply::Answer(selection))
    }

    async fn acknowledge_navigation(&self, request: &NavigationRequest) -> Result<Reply<()>> {
        heading(&request.title);
        println!("Open: {}", request.url);
        for instruction in &request.instructions {
            println!("  - {instruction}");
        }
        Ok(match self.read_answer("Press Enter when done (:q to quit) ").await? {
            Some(_) => Reply::Answer(()),
            None => Reply::Abort,
        })
    }

    async fn generate_ai_response(&self, request: &AiRequest) -> Result<Reply<String>> {
        let model = request.model.as_deref().unwrap_or("an assistant");
        Ok(Reply::Answer(format!(
            "No AI backend is configured. The integration prompt for {model} is saved to the contextifact artifact; \
             paste it into your assistant of choice."
        )))
    }

    async fn show_info(&self, title: &str, markdown: &str) -> Result<()> {
        heading(title);
        println!("{}", markdown.trim());
        Ok(())
    }

    async fn show_commands(&self, title: &str, commands: &[String]) -> Result<()> {
        heading(title);
        for command in commands {
            println!("  $ {command}");
        }
        Ok(())
    }

    async fn show_advice(&self, title: &str, advice: &str) -> Result<()> {
        heading(title);
        println!("{}", advice.trim());
        Ok(())
    }

    async fn confirm_sensitive_write(&self, request: &ConfirmationRequest) -> Result<Reply<bool>> {
        if self.assume_yes {
            return Ok(Reply::Answer(true));
        }
        heading("Sensitive values");
        println!(
            "{} credential(s) for {} will be written unencrypted to {}",
            request.variables.len(),
            request.provider,
            request.path.display()
        );
        Ok(match self.read_answer("Write them? [y/N] (:q to quit) ").await? {
            Some(answer) => Reply::Answer(is_yes(&answer)),
            None => Reply::Abort,
        })
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
