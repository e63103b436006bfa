use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Install the global tracing subscriber, writing compact lines to stderr.
///
/// `RUST_LOG` decides the level when set; otherwise only warnings are shown,
/// or everything down to `debug` with `verbose`.
///
/// # Errors
///
/// Returns an error if `RUST_LOG` cannot be parsed or a subscriber is
/// already installed.
pub fn init(verbose: bool) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .compact();

    let fallback = if verbose { "debug" } else { "warn" };
    let filter_layer = EnvFilter::try_from_default_env().or_else(|_| return EnvFilter::try_new(fallback))?;

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .try_init()?;

    return Ok(());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_fails_instead_of_panicking() {
        // One subscriber per process; whichever test gets here first wins.
        let first = init(false);
        let second = init(true);
        assert!(first.is_err() || second.is_err());
        tracing::debug!("logging initialized");
    }
}
