use std::{
    io::{self, IsTerminal},
    process::ExitCode,
};

use clap::Parser;
use parley::{
    client::ReqwestCompletion,
    config::{Args, Settings},
    session::Session,
    terminal::{PlainInput, ReedlineSource, TerminalPresenter},
};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    init_tracing();

    let settings = match Settings::from_args(Args::parse()) {
        Ok(settings) => settings,
        Err(err) => {
            tracing::error!("{err}");
            return ExitCode::FAILURE;
        }
    };

    let capability = ReqwestCompletion::new(settings.api);

    // A line editor already echoes what the user typed, piped input does not.
    let interactive = io::stdin().is_terminal();
    let presenter = TerminalPresenter::new(io::stdout())
        .color(io::stdout().is_terminal())
        .echo_user(!interactive);

    let outcome = if interactive {
        let mut session = Session::new(
            capability,
            settings.session,
            ReedlineSource::new(),
            presenter,
        );
        session.run().await
    } else {
        let input = PlainInput::new(io::stdin().lock());
        let mut session = Session::new(capability, settings.session, input, presenter);
        session.run().await
    };

    tracing::debug!(
        termination = ?outcome.termination,
        turns = outcome.conversation.len(),
        "exiting"
    );
    ExitCode::SUCCESS
}

/// Logs to stderr, filtered by `RUST_LOG` (warnings and errors by default).
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(io::stderr);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}
