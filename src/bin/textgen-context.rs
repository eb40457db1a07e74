//! Answers a question using the local `docs/` directory as context.

use std::io;
use std::process::ExitCode;
use textgen::error::exit_status;
use textgen::logging::init_logging;
use textgen::script::{exchange, load_engine, DOCS_QUESTION};
use textgen::storage::documents::{context_prompt, load_documents};
use textgen::storage::settings::{load_settings, AppSettings};
use textgen::AppError;

/// Documents are sent in a single prompt, so the window has to be larger
const MIN_CONTEXT_SIZE: u32 = 16384;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    init_logging();

    let mut settings = load_settings();
    settings.context_size = settings.context_size.max(MIN_CONTEXT_SIZE);
    settings.validate();

    exit_status(run(&settings).await)
}

async fn run(settings: &AppSettings) -> Result<(), AppError> {
    let content = load_documents(&settings.docs_directory)?;
    let prompt = context_prompt(&content, DOCS_QUESTION);

    let engine = load_engine(settings)?;
    let mut session =
        engine.create_session(settings.generation_params(), &settings.system_prompt)?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    exchange(&mut session, &mut out, DOCS_QUESTION, &prompt).await?;
    Ok(())
}
