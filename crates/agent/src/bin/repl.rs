//! Interactive console for the dialogue engine
//!
//! Reads one utterance per line from stdin and prints the engine's reply.
//! `/reset` starts over, `/slots` shows what has been collected.

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};

use advisor_agent::{DialogueAction, DialogueEngineBuilder};
use advisor_config::{init_tracing, load_settings, Settings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Priority: env vars > config/{env}.yaml > config/default.yaml > defaults
    let env = std::env::var("ADVISOR_ENV").ok();
    let settings = match load_settings(env.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            // Tracing is not initialised yet
            eprintln!("Warning: failed to load settings: {}. Using defaults.", e);
            Settings::default()
        },
    };
    init_tracing(&settings.logging);

    let engine = DialogueEngineBuilder::from_settings(&settings)
        .and_then(|builder| builder.build())
        .context("failed to start dialogue engine")?;

    let session_id = uuid::Uuid::new_v4().to_string();
    tracing::info!(session_id = %session_id, "Console session started");

    let first = engine.next_action(&session_id).await?;
    println!("{}", first.response());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match line.trim() {
            "/quit" => break,
            "/reset" => {
                engine.reset_session(&session_id).await?;
                println!("{}", engine.next_action(&session_id).await?.response());
            },
            "/slots" => {
                let slots = engine
                    .session(&session_id)
                    .await?
                    .map(|state| state.slot_map())
                    .unwrap_or_default();
                println!("{}", serde_json::to_string_pretty(&slots)?);
            },
            text => {
                let outcome = engine.process_turn(&session_id, text).await?;
                println!("{}", outcome.response);
                if let DialogueAction::Search { request, .. } = &outcome.action {
                    println!("{}", serde_json::to_string_pretty(request)?);
                }
            },
        }
    }
    Ok(())
}
