//! The prompt script
//!
//! Bootstraps a session from settings and runs the fixed exchanges against any
//! [`PromptSession`], writing `User:`/`AI:` lines to the given output.

use crate::error::AppError;
use crate::inference::{LlamaEngine, PromptSession};
use crate::storage::settings::AppSettings;
use std::io::Write;

/// Translation request, sent first
pub const TRANSLATION_PROMPT: &str =
    "translate to ru: Hey, buddy! What's up! Did you received my last message?";

/// JSON-filling request, sent second. The reply is printed as is, never parsed.
pub const JSON_FILL_PROMPT: &str = r#"About ships and vessels. I have json with keys in english and empty values. Fill empty values with translated to ru. Return result as json: { "Select request type*": "", "I want to buy": "", "I want to sell": "", "I have an open cargo": "", "I have an open ship": "", "Select ship type*": "", "Anchor Handling Tug Supply (AHTS)": "", "Fast Supply Vessel (FSV)": "", "Survey": "", "Work boats": "", "Tuna Longliners": "", "Beam Trawler": "", "Newbuild Vessels": "", "Title*": "", "Free-form message": "", "Type": "", "Capesize": "", "sea": "", "sea-river": "", "Hull": "", "DWT": "", "GRT": "", "NRT": "", "LOA": "", "LBP": "", "Depth": "", "Ice class": "", "Crane cap.": "", "Crane rev.": "", "Passengers": "", "Decks": "", "Teu": "", "Cars": "", "Main Engine": "", "Type of fuel": "", "DD last": "", "DD next": "", "SS last": "", "SS next": "", "Asphalt carrier": "", "Attach a file": "", "August": "", "Australasia": "", "Auxiliary engine": "", "Average reefer": "", "Baltiyskiy": "", "Barge": "", "Beam": "", "Black Sea": "", "box shaped": "", "Build year": "", "Built in": "", "built year": "", "Bulk carrier": "", "Bunkering vessel": "", "Cable layer": "", "Capacity": "", "Car float": ""}"#;

/// Question asked by `textgen-context` against the local documents
pub const DOCS_QUESTION: &str = "how to create asset?";

/// The prompts of the main script, in call order
pub const SCRIPT_PROMPTS: [&str; 2] = [TRANSLATION_PROMPT, JSON_FILL_PROMPT];

/// One prompt and the reply it got
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    pub prompt: String,
    pub reply: String,
}

/// Initialize the backend and load the configured model.
///
/// Nothing is written to stdout here, so a failed load leaves the output empty.
pub fn load_engine(settings: &AppSettings) -> Result<LlamaEngine, AppError> {
    let mut engine = LlamaEngine::new();
    engine.init()?;
    engine.load_model(&settings.model_path(), settings.gpu_layers)?;
    Ok(engine)
}

/// Print `User: <shown>`, send `sent`, print `AI: <reply>`
pub async fn exchange<S, W>(
    session: &mut S,
    out: &mut W,
    shown: &str,
    sent: &str,
) -> Result<Exchange, AppError>
where
    S: PromptSession + ?Sized,
    W: Write,
{
    writeln!(out, "User: {shown}")?;
    out.flush()?;

    let reply = session.prompt(sent).await?;
    writeln!(out, "AI: {reply}")?;
    out.flush()?;

    Ok(Exchange {
        prompt: sent.to_string(),
        reply,
    })
}

/// Run both script prompts in order on one session
pub async fn run_script<S, W>(session: &mut S, out: &mut W) -> Result<Vec<Exchange>, AppError>
where
    S: PromptSession + ?Sized,
    W: Write,
{
    let mut exchanges = Vec::with_capacity(SCRIPT_PROMPTS.len());
    for prompt in SCRIPT_PROMPTS {
        exchanges.push(exchange(session, out, prompt, prompt).await?);
    }
    Ok(exchanges)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::EngineError;
    use async_trait::async_trait;

    struct FailingSession {
        calls: usize,
    }

    #[async_trait(?Send)]
    impl PromptSession for FailingSession {
        async fn prompt(&mut self, _text: &str) -> Result<String, EngineError> {
            self.calls += 1;
            Err(EngineError::ContextOverflow {
                needed: 5000,
                available: 4096,
            })
        }
    }

    #[test]
    fn test_json_prompt_embeds_template() {
        assert!(JSON_FILL_PROMPT.starts_with("About ships and vessels."));
        assert!(JSON_FILL_PROMPT.contains(r#"{ "Select request type*": "","#));
        assert!(JSON_FILL_PROMPT.ends_with(r#""Car float": ""}"#));
        assert_eq!(JSON_FILL_PROMPT.matches(r#": """#).count(), 58);
    }

    #[tokio::test]
    async fn test_failure_stops_the_script() {
        let mut session = FailingSession { calls: 0 };
        let mut out = Vec::new();

        let result = run_script(&mut session, &mut out).await;

        assert!(matches!(
            result,
            Err(AppError::Engine(EngineError::ContextOverflow { .. }))
        ));
        assert_eq!(session.calls, 1);
        assert_eq!(
            String::from_utf8(out).unwrap(),
            format!("User: {TRANSLATION_PROMPT}\n")
        );
    }

    #[test]
    fn test_load_engine_missing_model() {
        let dir = tempfile::tempdir().unwrap();
        let settings = AppSettings {
            models_directory: dir.path().join("models"),
            ..AppSettings::default()
        };

        match load_engine(&settings) {
            Err(AppError::Engine(EngineError::ModelNotFound(p))) => {
                assert_eq!(p, settings.model_path())
            }
            Err(e) => panic!("expected ModelNotFound, got {e}"),
            Ok(_) => panic!("expected ModelNotFound, model loaded"),
        }
    }
}
