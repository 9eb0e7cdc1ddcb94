use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Installs the structured-logging subscriber.
///
/// `RUST_LOG` wins when set; otherwise logs from this crate at `default_level`.
/// Returns `false` if a global subscriber was already installed (e.g. by the
/// pipeline embedding the resolver), which is not an error.
pub fn init_tracing(default_level: &str) -> bool {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}={}",
                env!("CARGO_PKG_NAME").replace('-', "_"),
                default_level
            ))
        }))
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_harmless() {
        init_tracing("debug");
        assert!(!init_tracing("debug"));
    }
}
