//! Tracing subscriber setup for binaries and integration tests.

const DEFAULT_FILTER: &str = "error,cinder_gfx=info,cinder_flamechart=info";

/// Installs a global fmt subscriber.
///
/// The filter comes from `RUST_LOG` when it parses, otherwise
/// `error,cinder_gfx=info,cinder_flamechart=info`. Calling this more than
/// once is harmless; only the first subscriber is kept.
pub fn init_tracing() {
    let filter = match tracing_subscriber::EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => match tracing_subscriber::EnvFilter::try_new(DEFAULT_FILTER) {
            Ok(filter) => filter,
            Err(_) => tracing_subscriber::EnvFilter::new("error"),
        },
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(tracing_subscriber::fmt::format::FmtSpan::CLOSE)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_parses() {
        assert!(tracing_subscriber::EnvFilter::try_new(DEFAULT_FILTER).is_ok());
    }

    #[test]
    fn init_is_idempotent() {
        init_tracing();
        init_tracing();
        tracing::info!("still alive");
    }
}
