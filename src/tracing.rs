use tracing::Level;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Installs a `fmt` subscriber for hosts that have none.
///
/// Filters come from `RUST_LOG`; otherwise this crate logs at `WARN`.
pub fn try_init_tracing_subscriber() -> Result<(), Box<dyn std::error::Error>> {
    try_init_tracing_subscriber_with_level(Level::WARN)
}

/// Like [`try_init_tracing_subscriber`], with `level` for this crate when
/// `RUST_LOG` is unset.
pub fn try_init_tracing_subscriber_with_level(
    level: Level,
) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = std::env::var(EnvFilter::DEFAULT_ENV)
        .map(EnvFilter::new)
        .unwrap_or_else(|_| EnvFilter::new(default_directive(level)));
    tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(env_filter)
        .with_thread_ids(true)
        .with_thread_names(true)
        .finish()
        .try_init()?;
    Ok(())
}

fn default_directive(level: Level) -> String {
    format!("{}={}", env!("CARGO_CRATE_NAME"), level)
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn default_filter_targets_this_crate() {
        assert_eq!(default_directive(Level::DEBUG), "caliper=DEBUG");
    }

    #[test]
    fn second_init_fails() {
        let _ = try_init_tracing_subscriber_with_level(Level::DEBUG);
        assert!(try_init_tracing_subscriber().is_err());
    }
}
