//! Default tracing subscriber for hosts embedding the advisor

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use crate::settings::LoggingSettings;

/// Install a global subscriber; `RUST_LOG` wins over the configured level
///
/// Returns `false` if a subscriber was already installed.
pub fn init_tracing(logging: &LoggingSettings) -> bool {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = &logging.level;
        format!(
            "advisor_agent={level},advisor_text_processing={level},advisor_config={level}"
        )
        .into()
    });

    let subscriber = tracing_subscriber::registry().with(env_filter);
    let fmt_layer = if logging.json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };
    subscriber.with(fmt_layer).try_init().is_ok()
}
