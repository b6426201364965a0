use clap::ValueEnum;
use tracing_subscriber::EnvFilter;

/// Overrides `--log-level` with a full filter directive when set.
pub const LOG_ENV: &str = "TOPICMUX_LOG";

/// Targets whose verbosity follows `--log-level`; everything else stays at warn.
const TOPICMUX_TARGETS: &[&str] = &[
    "topicmux",
    "topicmux_conn",
    "topicmux_frame",
    "topicmux_transport",
];

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Filter directive for `level`: topicmux crates at `level`, dependencies at warn.
pub fn default_directive(level: LogLevel) -> String {
    let mut directive = String::from("warn");
    for target in TOPICMUX_TARGETS {
        directive.push(',');
        directive.push_str(target);
        directive.push('=');
        directive.push_str(level.as_str());
    }
    directive
}

fn build_filter(level: LogLevel) -> EnvFilter {
    match std::env::var(LOG_ENV) {
        Ok(spec) if !spec.trim().is_empty() => match EnvFilter::try_new(&spec) {
            Ok(filter) => filter,
            Err(err) => {
                eprintln!("ignoring invalid {LOG_ENV}={spec:?}: {err}");
                EnvFilter::new(default_directive(level))
            }
        },
        _ => EnvFilter::new(default_directive(level)),
    }
}

/// Install the stderr subscriber. Stdout is reserved for message output.
pub fn init_logging(format: LogFormat, level: LogLevel) {
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(build_filter(level))
        .with_ansi(false)
        .with_target(false);

    match format {
        LogFormat::Text => {
            let _ = builder.try_init();
        }
        LogFormat::Json => {
            let _ = builder.json().try_init();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directive_scopes_level_to_topicmux_crates() {
        assert_eq!(
            default_directive(LogLevel::Debug),
            "warn,topicmux=debug,topicmux_conn=debug,topicmux_frame=debug,topicmux_transport=debug"
        );
    }

    #[test]
    fn every_level_builds_a_valid_filter() {
        for level in [
            LogLevel::Error,
            LogLevel::Warn,
            LogLevel::Info,
            LogLevel::Debug,
            LogLevel::Trace,
        ] {
            assert!(EnvFilter::try_new(default_directive(level)).is_ok());
        }
    }
}
