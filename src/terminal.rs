//! Terminal input and output.
//!
//! [`ReedlineSource`] reads lines interactively, [`PlainInput`] reads them from any buffered reader
//! (piped stdin, tests). [`TerminalPresenter`] renders session events as a plain transcript:
//!
//! ```text
//! You: Hello
//! GPT: Hi there
//! Goodbye!
//! ```

use std::{
    borrow::Cow,
    io::{self, BufRead, Write},
};

use crossterm::style::{Color, Stylize};
use reedline::{
    EditCommand, Emacs, KeyCode, KeyModifiers, Prompt, PromptEditMode, PromptHistorySearch,
    PromptHistorySearchStatus, Reedline, ReedlineEvent, Signal, ValidationResult, Validator,
    default_emacs_keybindings,
};

use crate::{
    conversation::{Conversation, Role},
    session::{Input, LineSource, Presenter, SessionEvent},
};

/// Interactive line editor input.
pub struct ReedlineSource {
    editor: Reedline,
}

impl ReedlineSource {
    pub fn new() -> Self {
        Self {
            editor: create_editor(),
        }
    }
}

impl Default for ReedlineSource {
    fn default() -> Self {
        Self::new()
    }
}

/// Creates a new configured [`Reedline`] instance.
fn create_editor() -> Reedline {
    let mut keybindings = default_emacs_keybindings();

    keybindings.add_binding(KeyModifiers::NONE, KeyCode::Enter, ReedlineEvent::Enter);

    // Alt+Enter inserts a newline instead of sending.
    keybindings.add_binding(
        KeyModifiers::ALT,
        KeyCode::Enter,
        ReedlineEvent::Edit(vec![EditCommand::InsertNewline]),
    );

    let edit_mode = Box::new(Emacs::new(keybindings));

    Reedline::create()
        .with_edit_mode(edit_mode)
        .with_validator(Box::new(MessageValidator))
}

/// Accepts every line, unbalanced quotes and brackets included.
struct MessageValidator;

impl Validator for MessageValidator {
    fn validate(&self, _line: &str) -> ValidationResult {
        ValidationResult::Complete
    }
}

/// Prompts with the same `You: ` label the transcript uses, the turn count on the right.
struct ChatPrompt {
    turns: usize,
}

impl Prompt for ChatPrompt {
    fn render_prompt_left(&self) -> Cow<'_, str> {
        Cow::Borrowed("You: ")
    }

    fn render_prompt_right(&self) -> Cow<'_, str> {
        Cow::Owned(format!("[{}]", self.turns))
    }

    fn render_prompt_indicator(&self, _prompt_mode: PromptEditMode) -> Cow<'_, str> {
        Cow::Borrowed("")
    }

    fn render_prompt_multiline_indicator(&self) -> Cow<'_, str> {
        Cow::Borrowed(".... ")
    }

    fn render_prompt_history_search_indicator(
        &self,
        history_search: PromptHistorySearch,
    ) -> Cow<'_, str> {
        let prefix = match history_search.status {
            PromptHistorySearchStatus::Passing => "",
            PromptHistorySearchStatus::Failing => "failing ",
        };
        Cow::Owned(format!("({prefix}reverse-search: {}) ", history_search.term))
    }
}

impl LineSource for ReedlineSource {
    fn read_line(&mut self, conversation: &Conversation) -> Input {
        let prompt = ChatPrompt {
            turns: conversation.len(),
        };

        match self.editor.read_line(&prompt) {
            Ok(Signal::Success(buffer)) => Input::Line(buffer),
            Ok(Signal::CtrlC) => Input::Interrupted,
            Ok(Signal::CtrlD) => Input::Eof,
            Err(err) => {
                tracing::error!(%err, "failed to read from terminal");
                Input::Eof
            }
        }
    }
}

/// Line input from a buffered reader.
#[derive(Debug)]
pub struct PlainInput<R> {
    reader: R,
}

impl<R: BufRead> PlainInput<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }
}

impl<R: BufRead> LineSource for PlainInput<R> {
    fn read_line(&mut self, _conversation: &Conversation) -> Input {
        let mut line = String::new();
        match self.reader.read_line(&mut line) {
            Ok(0) => Input::Eof,
            Ok(_) => Input::Line(line),
            Err(err) => {
                tracing::error!(%err, "failed to read input");
                Input::Eof
            }
        }
    }
}

/// Writes session events to a terminal or any other writer.
#[derive(Debug)]
pub struct TerminalPresenter<W> {
    out: W,
    /// Whether to style labels with ANSI colors.
    color: bool,
    /// Whether to print user lines. A line editor already shows them.
    echo_user: bool,
}

impl<W: Write> TerminalPresenter<W> {
    /// Creates an uncolored presenter that echoes user input.
    pub fn new(out: W) -> Self {
        Self {
            out,
            color: false,
            echo_user: true,
        }
    }

    pub fn color(mut self, color: bool) -> Self {
        self.color = color;
        self
    }

    pub fn echo_user(mut self, echo_user: bool) -> Self {
        self.echo_user = echo_user;
        self
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn label(&self, text: &str, color: Color) -> String {
        if self.color {
            text.with(color).bold().to_string()
        } else {
            text.to_owned()
        }
    }

    fn role_label(&self, role: Role) -> String {
        match role {
            Role::System => self.label("System: ", Color::Magenta),
            Role::User => self.label("You: ", Color::Cyan),
            Role::Assistant => self.label("GPT: ", Color::Green),
        }
    }

    fn render(&mut self, event: SessionEvent<'_>) -> io::Result<()> {
        match event {
            SessionEvent::Started { model, streaming } => {
                let mode = if streaming { ", streaming" } else { "" };
                writeln!(
                    self.out,
                    "Start chatting with {model}{mode} (type 'exit' or 'quit' to stop):"
                )?;
            }
            SessionEvent::Replayed(turn) => {
                let label = self.role_label(turn.role());
                writeln!(self.out, "{label}{}", turn.content())?;
            }
            SessionEvent::UserTurn(text) => {
                if self.echo_user {
                    let label = self.role_label(Role::User);
                    writeln!(self.out, "{label}{text}")?;
                }
            }
            SessionEvent::AssistantStarted => {
                let label = self.role_label(Role::Assistant);
                write!(self.out, "{label}")?;
            }
            SessionEvent::Fragment(fragment) => write!(self.out, "{fragment}")?,
            SessionEvent::AssistantFinished => writeln!(self.out)?,
            SessionEvent::Warning(message) => {
                let label = self.label("Warning: ", Color::Yellow);
                writeln!(self.out, "{label}{message}")?;
            }
            SessionEvent::RoundFailed(err) => {
                let label = self.label("Error: ", Color::Red);
                writeln!(self.out, "{label}{err}")?;
            }
            SessionEvent::Saved(path) => {
                writeln!(self.out, "Conversation saved to {}", path.display())?;
            }
            SessionEvent::Goodbye => writeln!(self.out, "Goodbye!")?,
        }

        self.out.flush()
    }
}

impl<W: Write> Presenter for TerminalPresenter<W> {
    fn present(&mut self, event: SessionEvent<'_>) {
        if let Err(err) = self.render(event) {
            tracing::warn!(%err, "failed to write to terminal");
        }
    }
}
