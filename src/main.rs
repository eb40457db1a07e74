use std::io;
use std::process::ExitCode;
use textgen::error::exit_status;
use textgen::logging::init_logging;
use textgen::script::{load_engine, run_script};
use textgen::storage::settings::{load_settings, AppSettings};
use textgen::AppError;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    init_logging();

    let settings = load_settings();
    exit_status(run(&settings).await)
}

async fn run(settings: &AppSettings) -> Result<(), AppError> {
    let engine = load_engine(settings)?;
    let mut session =
        engine.create_session(settings.generation_params(), &settings.system_prompt)?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    run_script(&mut session, &mut out).await?;
    Ok(())
}
