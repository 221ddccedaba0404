//! Log output for the `kiln` binary.
//!
//! Logs go to stderr so command output on stdout stays machine-readable.
//! `RUST_LOG` overrides the level chosen from `-q` / `-v`.

use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::GlobalArgs;

/// Level implied by the global flags. `--quiet` wins over `--verbose`.
pub fn level_for(global: &GlobalArgs) -> Level {
    if global.quiet {
        Level::ERROR
    } else if global.verbose {
        Level::DEBUG
    } else {
        Level::WARN
    }
}

fn build_env_filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = level.as_str().to_lowercase();
        EnvFilter::new(format!(
            "warn,kiln_cli={level},kiln_config={level},kiln_isg={level}"
        ))
    })
}

/// Installs the global subscriber.
pub fn init(global: &GlobalArgs) {
    let result = tracing_subscriber::registry()
        .with(build_env_filter(level_for(global)))
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .without_time(),
        )
        .try_init();
    if let Err(e) = result {
        eprintln!("warning: could not initialise logging: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn global(quiet: bool, verbose: bool) -> GlobalArgs {
        GlobalArgs {
            quiet,
            verbose,
            config: None,
        }
    }

    #[test]
    fn default_level_is_warn() {
        assert_eq!(level_for(&global(false, false)), Level::WARN);
    }

    #[test]
    fn verbose_is_debug() {
        assert_eq!(level_for(&global(false, true)), Level::DEBUG);
    }

    #[test]
    fn quiet_wins() {
        assert_eq!(level_for(&global(true, true)), Level::ERROR);
    }
}
