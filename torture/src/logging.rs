use std::io::{self, IsTerminal as _};

use tracing::level_filters::LevelFilter;
use tracing_subscriber::{fmt, EnvFilter};

/// The environment variable holding the `EnvFilter` directives, e.g. `debug` or
/// `flag_torture=trace,concurrent_flag=trace`.
const ENV_NAME: &str = "FLAG_TORTURE_LOG";

fn istty() -> bool {
    io::stdout().is_terminal() && io::stderr().is_terminal()
}

/// Builds the filter from [`ENV_NAME`], falling back to `info` when it is unset.
///
/// Invalid directives are reported and ignored rather than aborting the run.
fn env_filter() -> EnvFilter {
    let builder = EnvFilter::builder().with_default_directive(LevelFilter::INFO.into());
    match std::env::var(ENV_NAME) {
        Ok(directives) => builder.parse(&directives).unwrap_or_else(|err| {
            eprintln!("ignoring invalid {}={:?}: {}", ENV_NAME, directives, err);
            EnvFilter::default().add_directive(LevelFilter::INFO.into())
        }),
        Err(std::env::VarError::NotPresent) => {
            EnvFilter::default().add_directive(LevelFilter::INFO.into())
        }
        Err(std::env::VarError::NotUnicode(_)) => {
            panic!("Environment variable {} is not unicode", ENV_NAME);
        }
    }
}

pub fn init() {
    let format = fmt::format()
        .with_level(true)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(true)
        .compact()
        .with_timer(fmt::time::SystemTime::default());
    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(env_filter())
        .with_writer(io::stdout)
        .with_ansi(istty())
        .event_format(format)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set torture subscriber");
}
