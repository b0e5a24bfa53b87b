//! The interactive chat loop.
//!
//! A [`Session`] reads lines from a [`LineSource`], sends each one as a new user turn through a
//! [`Driver`] and reports everything that happens as [`SessionEvent`]s to a [`Presenter`]. It
//! owns no state besides the conversation and its [`SessionConfig`].
//!
//! ## Termination
//!
//! Typing `exit` or `quit` (in any case), an interrupt, or the end of input all end the session,
//! in streaming and non-streaming mode alike. Every way out, including a panic inside a round,
//! passes through the same shutdown path, which saves the conversation if an output file is
//! configured. The one exception is an input file that exists but could not be loaded: when it is
//! also the output file, it is left alone until a round has been committed.
//!
//! ## Failed rounds
//!
//! A round only changes the conversation once there is a reply to commit:
//!
//! * a reply commits the user turn and the assistant turn,
//! * a stream that breaks after delivering text commits the partial text as the assistant turn
//!   and emits a [`SessionEvent::Warning`],
//! * any other failure emits [`SessionEvent::RoundFailed`] and leaves the conversation as it was,
//! * an interrupt while waiting for the reply abandons the round and ends the session.
//!
//! [`SessionEvent::AssistantStarted`] is only emitted once reply text arrives, so a failed round
//! reports just the error.

use std::{
    future::Future,
    ops::ControlFlow,
    panic::AssertUnwindSafe,
    path::{Path, PathBuf},
};

use futures::{FutureExt, future::LocalBoxFuture};

use crate::{
    Error,
    completion::{Completion, Driver},
    conversation::{Conversation, Turn},
};

/// Settings fixed for the lifetime of a session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    /// Model identifier sent with every request.
    pub model: String,
    /// File to load the conversation from at startup.
    pub input: Option<PathBuf>,
    /// File to save the conversation to at shutdown. May equal `input`.
    pub output: Option<PathBuf>,
    /// Whether replies are streamed.
    pub streaming: bool,
    /// Whether to also save after every completed round.
    pub autosave: bool,
}

impl SessionConfig {
    /// A non-persisted, non-streaming session.
    pub fn new<S: Into<String>>(model: S) -> Self {
        Self {
            model: model.into(),
            input: None,
            output: None,
            streaming: false,
            autosave: false,
        }
    }
}

/// The result of asking for a line of input.
#[derive(Debug, PartialEq, Eq)]
pub enum Input {
    Line(String),
    Interrupted,
    Eof,
}

/// Where user input comes from.
pub trait LineSource {
    /// Blocks until the user has entered a line or gave up.
    fn read_line(&mut self, conversation: &Conversation) -> Input;
}

/// Something that happened during a session.
#[derive(Debug)]
pub enum SessionEvent<'a> {
    Started { model: &'a str, streaming: bool },
    /// A turn loaded from file, shown again at startup.
    Replayed(&'a Turn),
    UserTurn(&'a str),
    /// Reply text is about to follow.
    AssistantStarted,
    /// Reply text, a non-streamed reply arrives as a single fragment.
    Fragment(&'a str),
    AssistantFinished,
    Warning(&'a str),
    RoundFailed(&'a Error),
    Saved(&'a Path),
    Goodbye,
}

/// Renders session events.
pub trait Presenter {
    fn present(&mut self, event: SessionEvent<'_>);
}

/// Why a session ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Termination {
    /// The user typed `exit` or `quit`.
    Exit,
    Interrupted,
    EndOfInput,
}

/// The final state of a finished session.
#[derive(Debug)]
pub struct Outcome {
    pub conversation: Conversation,
    pub termination: Termination,
}

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Send(String),
    Exit,
    Skip,
}

fn parse_command(line: &str) -> Command {
    let line = line.trim();
    if line.is_empty() {
        Command::Skip
    } else if line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit") {
        Command::Exit
    } else {
        Command::Send(line.to_owned())
    }
}

/// Builds the future that aborts a pending request when it resolves.
type Interrupt = Box<dyn Fn() -> LocalBoxFuture<'static, ()>>;

/// An interactive chat session.
pub struct Session<C, L, P> {
    driver: Driver<C>,
    config: SessionConfig,
    input: L,
    presenter: P,
    interrupt: Interrupt,
}

impl<C, L, P> Session<C, L, P>
where
    C: Completion,
    L: LineSource,
    P: Presenter,
{
    /// Creates a session that aborts pending requests on Ctrl-C.
    pub fn new(capability: C, config: SessionConfig, input: L, presenter: P) -> Self {
        Self {
            driver: Driver::new(capability, config.model.clone()),
            config,
            input,
            presenter,
            interrupt: Box::new(|| ctrl_c().boxed_local()),
        }
    }

    /// Replaces the Ctrl-C listener that aborts a pending request.
    pub fn with_interrupt<F, Fut>(mut self, interrupt: F) -> Self
    where
        F: Fn() -> Fut + 'static,
        Fut: Future<Output = ()> + 'static,
    {
        self.interrupt = Box::new(move || interrupt().boxed_local());
        self
    }

    pub fn driver(&self) -> &Driver<C> {
        &self.driver
    }

    pub fn into_presenter(self) -> P {
        self.presenter
    }

    /// Runs the session until the user leaves, then saves if configured.
    pub async fn run(&mut self) -> Outcome {
        self.presenter.present(SessionEvent::Started {
            model: &self.config.model,
            streaming: self.config.streaming,
        });

        let (mut conversation, input_damaged) = self.hydrate();
        tracing::info!(
            model = %self.config.model,
            streaming = self.config.streaming,
            turns = conversation.len(),
            "session started"
        );
        for turn in &conversation {
            self.presenter.present(SessionEvent::Replayed(turn));
        }

        let result = AssertUnwindSafe(self.converse(&mut conversation))
            .catch_unwind()
            .await;

        match result {
            Ok(termination) => {
                tracing::info!(?termination, turns = conversation.len(), "session ended");
                self.presenter.present(SessionEvent::Goodbye);
                self.flush(&conversation, input_damaged);
                Outcome {
                    conversation,
                    termination,
                }
            }
            Err(panic) => {
                tracing::error!("session aborted by a panic");
                self.flush(&conversation, input_damaged);
                std::panic::resume_unwind(panic)
            }
        }
    }

    /// Loads the input file, if any.
    ///
    /// A missing file starts an empty conversation quietly. A file that exists but cannot be
    /// loaded also starts one, with a warning, and the returned flag is set.
    fn hydrate(&mut self) -> (Conversation, bool) {
        let Some(path) = &self.config.input else {
            return (Conversation::new(), false);
        };

        match Conversation::read(path) {
            Ok(conversation) => (conversation, false),
            Err(err) if err.is_not_found() => {
                tracing::info!(path = %path.display(), "no conversation file yet");
                (Conversation::new(), false)
            }
            Err(err) => {
                tracing::warn!("{err}, starting with an empty conversation");
                let message = format!("{err}, starting with an empty conversation");
                self.presenter.present(SessionEvent::Warning(&message));
                (Conversation::new(), true)
            }
        }
    }

    async fn converse(&mut self, conversation: &mut Conversation) -> Termination {
        loop {
            let line = match self.input.read_line(conversation) {
                Input::Line(line) => line,
                Input::Interrupted => return Termination::Interrupted,
                Input::Eof => return Termination::EndOfInput,
            };

            match parse_command(&line) {
                Command::Skip => {}
                Command::Exit => return Termination::Exit,
                Command::Send(text) => {
                    if let ControlFlow::Break(termination) = self.round(conversation, text).await {
                        return termination;
                    }
                }
            }
        }
    }

    async fn round(
        &mut self,
        conversation: &mut Conversation,
        text: String,
    ) -> ControlFlow<Termination> {
        self.presenter.present(SessionEvent::UserTurn(&text));
        let pending = conversation.with_user(text);

        let mut replying = false;
        let result = {
            let request = request_reply(
                &self.driver,
                &pending,
                &mut self.presenter,
                &mut replying,
                self.config.streaming,
            );
            let interrupt = (self.interrupt)();
            tokio::select! {
                // A reply that is already complete wins over a simultaneous interrupt.
                biased;
                result = request => Some(result),
                () = interrupt => None,
            }
        };
        if replying {
            self.presenter.present(SessionEvent::AssistantFinished);
        }

        match result {
            None => {
                tracing::warn!("interrupted while waiting for a reply");
                return ControlFlow::Break(Termination::Interrupted);
            }
            Some(Ok(reply)) => {
                if !replying {
                    self.presenter.present(SessionEvent::AssistantStarted);
                    self.presenter.present(SessionEvent::AssistantFinished);
                }
                self.commit(conversation, pending, reply);
            }
            Some(Err(Error::StreamInterrupted { partial, source })) if !partial.is_empty() => {
                tracing::warn!(error = %source, chars = partial.len(), "reply stream broke off");
                let message = format!("reply was cut short ({source}), keeping the partial text");
                self.presenter.present(SessionEvent::Warning(&message));
                self.commit(conversation, pending, partial);
            }
            Some(Err(err)) => {
                tracing::error!(error = %err, "completion request failed");
                self.presenter.present(SessionEvent::RoundFailed(&err));
            }
        }

        ControlFlow::Continue(())
    }

    fn commit(&mut self, conversation: &mut Conversation, pending: Conversation, reply: String) {
        *conversation = pending;
        conversation.push_assistant(reply);

        if self.config.autosave {
            if let Some(path) = &self.config.output {
                conversation.save(path);
            }
        }
    }

    /// Saves to the output file. An input file that failed to load is not overwritten unless a
    /// round was committed since.
    fn flush(&mut self, conversation: &Conversation, input_damaged: bool) {
        let Some(path) = &self.config.output else {
            return;
        };

        if input_damaged && conversation.is_empty() && self.config.input.as_ref() == Some(path) {
            tracing::warn!(path = %path.display(), "leaving unloadable conversation file untouched");
            let message = format!("{} could not be loaded and was left untouched", path.display());
            self.presenter.present(SessionEvent::Warning(&message));
            return;
        }

        if conversation.save(path) {
            self.presenter.present(SessionEvent::Saved(path));
        }
    }
}

/// Requests a reply, presenting it as it arrives.
///
/// The assistant label is only shown once there is text, `replying` records whether it was.
async fn request_reply<C: Completion, P: Presenter>(
    driver: &Driver<C>,
    conversation: &Conversation,
    presenter: &mut P,
    replying: &mut bool,
    streaming: bool,
) -> Result<String, Error> {
    let mut show = |fragment: &str| {
        if !*replying {
            *replying = true;
            presenter.present(SessionEvent::AssistantStarted);
        }
        presenter.present(SessionEvent::Fragment(fragment));
    };

    if streaming {
        driver.complete_streaming(conversation, show).await
    } else {
        let reply = driver.complete_sync(conversation).await?;
        show(&reply);
        Ok(reply)
    }
}

/// Resolves on Ctrl-C, never if interrupts cannot be observed.
async fn ctrl_c() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::debug!(%err, "cannot listen for interrupts");
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, collections::VecDeque, io::Cursor, path::PathBuf};

    use futures::{FutureExt, StreamExt, stream};

    use super::{
        Command, Input, LineSource, Session, SessionConfig, Termination, parse_command,
    };
    use crate::{
        Error,
        completion::{
            Completion, FragmentStream,
            fakes::{Reply, ScriptedCompletion, fragments},
        },
        conversation::{Conversation, Turn},
        terminal::{PlainInput, TerminalPresenter},
    };

    type TestSession<C> = Session<C, PlainInput<Cursor<String>>, TerminalPresenter<Vec<u8>>>;

    fn session<C: Completion>(capability: C, config: SessionConfig, input: &str) -> TestSession<C> {
        Session::new(
            capability,
            config,
            PlainInput::new(Cursor::new(input.to_owned())),
            TerminalPresenter::new(Vec::new()),
        )
    }

    /// The transcript without the banner line.
    fn transcript<C: Completion>(session: TestSession<C>) -> Vec<String> {
        let raw = String::from_utf8(session.into_presenter().into_inner()).unwrap();
        raw.lines().skip(1).map(str::to_owned).collect()
    }

    /// Plays back fixed inputs, then reports end of input.
    struct ScriptedInput(VecDeque<Input>);

    impl LineSource for ScriptedInput {
        fn read_line(&mut self, _conversation: &Conversation) -> Input {
            self.0.pop_front().unwrap_or(Input::Eof)
        }
    }

    fn saved_turns(path: &std::path::Path) -> Vec<Turn> {
        Conversation::read(path).unwrap().iter().cloned().collect()
    }

    #[test]
    fn test_parse_command() {
        assert_eq!(parse_command("exit\n"), Command::Exit);
        assert_eq!(parse_command("  QUIT "), Command::Exit);
        assert_eq!(parse_command("Exit"), Command::Exit);
        assert_eq!(parse_command("   \n"), Command::Skip);
        assert_eq!(parse_command(" Hello\n"), Command::Send("Hello".to_owned()));
        assert_eq!(parse_command("exit now"), Command::Send("exit now".to_owned()));
    }

    #[tokio::test]
    async fn test_fresh_session_transcript() {
        let capability = ScriptedCompletion::new(vec![Reply::Text("Hi there".into())]);
        let mut session = session(capability, SessionConfig::new("gpt-4o-mini"), "Hello\nexit\n");

        let outcome = session.run().await;

        assert_eq!(outcome.termination, Termination::Exit);
        assert_eq!(
            outcome.conversation.iter().cloned().collect::<Vec<_>>(),
            vec![Turn::user("Hello"), Turn::assistant("Hi there")]
        );
        assert_eq!(session.driver().capability().requests()[0].1, "gpt-4o-mini");
        assert_eq!(transcript(session), ["You: Hello", "GPT: Hi there", "Goodbye!"]);
    }

    #[tokio::test]
    async fn test_in_place_update() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("convo.json");
        std::fs::write(
            &path,
            r#"[{"role":"user","content":"What is Rust?"},{"role":"assistant","content":"A language."}]"#,
        )
        .unwrap();

        let config = SessionConfig {
            input: Some(path.clone()),
            output: Some(path.clone()),
            ..SessionConfig::new("m")
        };
        let capability = ScriptedCompletion::new(vec![Reply::Text("Yes.".into())]);
        let mut session = session(capability, config, "Is it fast?\n");

        let outcome = session.run().await;

        assert_eq!(outcome.termination, Termination::EndOfInput);
        let requests = session.driver().capability().requests();
        assert_eq!(requests[0].0.len(), 3);

        let saved = Conversation::read(&path).unwrap();
        assert_eq!(
            saved.iter().cloned().collect::<Vec<_>>(),
            vec![
                Turn::user("What is Rust?"),
                Turn::assistant("A language."),
                Turn::user("Is it fast?"),
                Turn::assistant("Yes."),
            ]
        );
        assert_eq!(
            transcript(session),
            [
                "You: What is Rust?".to_owned(),
                "GPT: A language.".to_owned(),
                "You: Is it fast?".to_owned(),
                "GPT: Yes.".to_owned(),
                "Goodbye!".to_owned(),
                format!("Conversation saved to {}", path.display()),
            ]
        );
    }

    #[tokio::test]
    async fn test_interrupted_stream_keeps_partial_reply() {
        let broken = Reply::Fragments(vec![
            Ok(Some("Par".into())),
            Ok(Some("tial".into())),
            Err(Error::Stream("connection reset".into())),
        ]);
        let capability = ScriptedCompletion::new(vec![broken, fragments(&["Still ", "here"])]);
        let config = SessionConfig {
            streaming: true,
            ..SessionConfig::new("m")
        };
        let mut session = session(capability, config, "first\nsecond\n");

        let outcome = session.run().await;

        assert_eq!(
            outcome.conversation.iter().cloned().collect::<Vec<_>>(),
            vec![
                Turn::user("first"),
                Turn::assistant("Partial"),
                Turn::user("second"),
                Turn::assistant("Still here"),
            ]
        );

        let lines = transcript(session);
        assert_eq!(lines[0], "You: first");
        assert_eq!(lines[1], "GPT: Partial");
        assert!(lines[2].starts_with("Warning: "));
        assert!(lines[2].contains("connection reset"));
        assert_eq!(&lines[3..], ["You: second", "GPT: Still here", "Goodbye!"]);
    }

    #[tokio::test]
    async fn test_failed_round_leaves_conversation_unchanged() {
        let capability = ScriptedCompletion::new(vec![
            Reply::Fail(Error::Status {
                status: 500,
                body: "boom".into(),
            }),
            Reply::Text("ok".into()),
        ]);
        let mut session = session(capability, SessionConfig::new("m"), "one\ntwo\nquit\n");

        let outcome = session.run().await;

        assert_eq!(outcome.termination, Termination::Exit);
        assert_eq!(
            outcome.conversation.iter().cloned().collect::<Vec<_>>(),
            vec![Turn::user("two"), Turn::assistant("ok")]
        );
        assert_eq!(session.driver().capability().requests()[1].0.len(), 1);

        assert_eq!(
            transcript(session),
            [
                "You: one",
                "Error: HTTP 500: boom",
                "You: two",
                "GPT: ok",
                "Goodbye!"
            ]
        );
    }

    #[tokio::test]
    async fn test_stream_failure_without_text_is_a_failed_round() {
        let capability = ScriptedCompletion::new(vec![Reply::Fragments(vec![
            Ok(None),
            Err(Error::StreamEnded),
        ])]);
        let config = SessionConfig {
            streaming: true,
            ..SessionConfig::new("m")
        };
        let mut session = session(capability, config, "hello\n");

        let outcome = session.run().await;

        assert!(outcome.conversation.is_empty());
        let lines = transcript(session);
        assert_eq!(lines[0], "You: hello");
        assert!(lines[1].starts_with("Error: Response stream interrupted"));
        assert_eq!(lines[2], "Goodbye!");
    }

    #[tokio::test]
    async fn test_blank_lines_are_ignored() {
        let capability = ScriptedCompletion::new(vec![Reply::Text("pong".into())]);
        let mut session = session(capability, SessionConfig::new("m"), "\n   \nping\n\nQUIT\n");

        let outcome = session.run().await;

        assert_eq!(outcome.termination, Termination::Exit);
        assert_eq!(outcome.conversation.len(), 2);
        assert_eq!(session.driver().capability().requests().len(), 1);
    }

    #[tokio::test]
    async fn test_replays_loaded_turns_including_system() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("convo.json");
        std::fs::write(
            &path,
            r#"[{"role":"system","content":"Be brief."},{"role":"user","content":"Hi"},{"role":"assistant","content":"Hello"}]"#,
        )
        .unwrap();

        let config = SessionConfig {
            input: Some(path),
            ..SessionConfig::new("m")
        };
        let mut session = session(ScriptedCompletion::new(vec![]), config, "");

        let outcome = session.run().await;

        assert_eq!(outcome.termination, Termination::EndOfInput);
        assert_eq!(outcome.conversation.len(), 3);
        assert_eq!(
            transcript(session),
            ["System: Be brief.", "You: Hi", "GPT: Hello", "Goodbye!"]
        );
    }

    #[tokio::test]
    async fn test_unreadable_input_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let config = SessionConfig {
            input: Some(dir.path().join("missing.json")),
            ..SessionConfig::new("m")
        };
        let mut session = session(ScriptedCompletion::new(vec![]), config, "exit\n");

        let outcome = session.run().await;

        assert!(outcome.conversation.is_empty());
        assert_eq!(transcript(session), ["Goodbye!"]);
    }

    #[tokio::test]
    async fn test_flushes_even_when_a_round_panics() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        let config = SessionConfig {
            output: Some(path.clone()),
            ..SessionConfig::new("m")
        };
        // The second line finds no scripted reply, which panics inside the round.
        let capability = ScriptedCompletion::new(vec![Reply::Text("first reply".into())]);
        let mut session = session(capability, config, "a\nb\n");

        let result = std::panic::AssertUnwindSafe(session.run())
            .catch_unwind()
            .await;

        assert!(result.is_err());
        let saved = Conversation::read(&path).unwrap();
        assert_eq!(
            saved.iter().cloned().collect::<Vec<_>>(),
            vec![Turn::user("a"), Turn::assistant("first reply")]
        );
    }

    /// Replies "ok" and records how many turns the output file held at each request.
    struct FileProbe {
        path: PathBuf,
        seen: RefCell<Vec<usize>>,
    }

    impl Completion for FileProbe {
        async fn complete(&self, _conversation: &Conversation, _model: &str) -> Result<String, Error> {
            let turns = Conversation::read(&self.path).map_or(0, |c| c.len());
            self.seen.borrow_mut().push(turns);
            Ok("ok".to_owned())
        }

        fn stream(&self, _conversation: &Conversation, _model: &str) -> FragmentStream {
            stream::empty().boxed()
        }
    }

    async fn file_sizes_seen(autosave: bool) -> Vec<usize> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        let probe = FileProbe {
            path: path.clone(),
            seen: RefCell::new(Vec::new()),
        };
        let config = SessionConfig {
            output: Some(path),
            autosave,
            ..SessionConfig::new("m")
        };
        let mut session = session(probe, config, "a\nb\nc\n");

        session.run().await;

        session.driver().capability().seen.borrow().clone()
    }

    #[tokio::test]
    async fn test_autosave_writes_after_every_round() {
        assert_eq!(file_sizes_seen(true).await, [0, 2, 4]);
        assert_eq!(file_sizes_seen(false).await, [0, 0, 0]);
    }

    #[tokio::test]
    async fn test_interrupt_at_prompt_ends_session_and_saves() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        let config = SessionConfig {
            output: Some(path.clone()),
            ..SessionConfig::new("m")
        };
        let input = ScriptedInput(VecDeque::from([
            Input::Line("a".to_owned()),
            Input::Interrupted,
            Input::Line("never sent".to_owned()),
        ]));
        let mut session = Session::new(
            ScriptedCompletion::new(vec![Reply::Text("b".into())]),
            config,
            input,
            TerminalPresenter::new(Vec::new()),
        );

        let outcome = session.run().await;

        assert_eq!(outcome.termination, Termination::Interrupted);
        assert_eq!(session.driver().capability().requests().len(), 1);
        assert_eq!(saved_turns(&path), [Turn::user("a"), Turn::assistant("b")]);
    }

    #[tokio::test]
    async fn test_interrupt_during_request_discards_round_and_saves() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        let config = SessionConfig {
            output: Some(path.clone()),
            streaming: true,
            ..SessionConfig::new("m")
        };
        let capability = ScriptedCompletion::new(vec![
            Reply::Text("first".into()),
            Reply::Stall(vec![Ok(Some("Par".into()))]),
        ]);
        // Fires whenever a request is still pending.
        let mut session = session(capability, config, "a\nb\nc\n").with_interrupt(|| async {});

        let outcome = session.run().await;

        assert_eq!(outcome.termination, Termination::Interrupted);
        let kept = [Turn::user("a"), Turn::assistant("first")];
        assert_eq!(outcome.conversation.iter().cloned().collect::<Vec<_>>(), kept);
        assert_eq!(saved_turns(&path), kept);
        assert_eq!(session.driver().capability().requests().len(), 2);

        assert_eq!(
            transcript(session),
            [
                "You: a".to_owned(),
                "GPT: first".to_owned(),
                "You: b".to_owned(),
                "GPT: Par".to_owned(),
                "Goodbye!".to_owned(),
                format!("Conversation saved to {}", path.display()),
            ]
        );
    }

    #[tokio::test]
    async fn test_interrupt_before_any_text_prints_no_reply_label() {
        let capability = ScriptedCompletion::new(vec![Reply::Stall(vec![])]);
        let mut session =
            session(capability, SessionConfig::new("m"), "a\n").with_interrupt(|| async {});

        let outcome = session.run().await;

        assert_eq!(outcome.termination, Termination::Interrupted);
        assert!(outcome.conversation.is_empty());
        assert_eq!(transcript(session), ["You: a", "Goodbye!"]);
    }

    #[tokio::test]
    async fn test_unloadable_io_file_is_left_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("convo.json");
        std::fs::write(&path, "{ not a conversation").unwrap();

        let config = SessionConfig {
            input: Some(path.clone()),
            output: Some(path.clone()),
            ..SessionConfig::new("m")
        };
        let mut session = session(ScriptedCompletion::new(vec![]), config, "exit\n");

        let outcome = session.run().await;

        assert!(outcome.conversation.is_empty());
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "{ not a conversation"
        );

        let lines = transcript(session);
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("Warning: Invalid conversation JSON in"));
        assert_eq!(lines[1], "Goodbye!");
        assert!(lines[2].starts_with("Warning: "));
        assert!(lines[2].ends_with("could not be loaded and was left untouched"));
    }

    #[tokio::test]
    async fn test_unloadable_io_file_is_replaced_after_a_round() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("convo.json");
        std::fs::write(&path, "{ not a conversation").unwrap();

        let config = SessionConfig {
            input: Some(path.clone()),
            output: Some(path.clone()),
            ..SessionConfig::new("m")
        };
        let capability = ScriptedCompletion::new(vec![Reply::Text("hello".into())]);
        let mut session = session(capability, config, "hi\n");

        session.run().await;

        assert_eq!(saved_turns(&path), [Turn::user("hi"), Turn::assistant("hello")]);
    }
}
