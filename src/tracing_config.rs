//! Tracing configuration for the command-line frontend
//!
//! The library only emits `log` records and `tracing` spans; installing a
//! subscriber is left to applications. This module is that setup for the
//! `photo-editor` binary.

#[cfg(feature = "cli")]
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Environment variable that overrides the verbosity-derived filter
pub const LOG_FILTER_ENV: &str = "RUST_LOG";

/// How `photo-editor` renders its log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TracingFormat {
    /// Colored single-line records on stderr, used by the binary
    Console,
    /// Compact console output without ANSI colors, for CI logs
    Compact,
    /// One JSON object per record, with the session span attached
    #[cfg(feature = "tracing-json")]
    Json,
}

/// Subscriber settings assembled from `-v` flags and `RUST_LOG`
#[derive(Debug)]
pub struct TracingConfig {
    /// Number of `-v` flags given
    pub verbosity: u8,
    pub format: TracingFormat,
    /// Explicit filter directive; wins over `verbosity`
    pub env_filter: Option<String>,
    /// Identifier logged once so records from one run can be grouped
    pub session_id: Option<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            verbosity: 0,
            format: TracingFormat::Console,
            env_filter: None,
            session_id: None,
        }
    }
}

impl TracingConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Count of `-v` flags
    #[must_use]
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: TracingFormat) -> Self {
        self.format = format;
        self
    }

    /// Filter directive such as `photo_editor=debug,reqwest=warn`
    #[must_use]
    pub fn with_env_filter<S: Into<String>>(mut self, filter: S) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    /// Pick up `RUST_LOG` when it is set and non-empty
    #[must_use]
    pub fn with_env_override(self) -> Self {
        match std::env::var(LOG_FILTER_ENV) {
            Ok(filter) if !filter.trim().is_empty() => self.with_env_filter(filter),
            _ => self,
        }
    }

    #[must_use]
    pub fn with_session_id<S: Into<String>>(mut self, session_id: S) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Filter used when no directive was supplied
    #[must_use]
    pub fn verbosity_to_filter(&self) -> &'static str {
        match self.verbosity {
            0 => "info",  // Default: stage progress and results
            1 => "debug", // -v: delegate choices, artifact paths, timings
            _ => "trace", // -vv and up
        }
    }

    /// Install the global subscriber for the binary
    ///
    /// Stage progress from the pipeline arrives as `log` records and is
    /// bridged into the same output.
    ///
    /// # Errors
    /// - Invalid filter directive
    /// - A global subscriber is already installed
    #[cfg(feature = "cli")]
    pub fn init(self) -> anyhow::Result<()> {
        use tracing_subscriber::fmt;

        let filter = if let Some(env_filter) = &self.env_filter {
            EnvFilter::try_new(env_filter)?
        } else {
            EnvFilter::try_new(self.verbosity_to_filter())?
        };

        let registry = Registry::default().with(filter);

        match self.format {
            TracingFormat::Console => {
                let fmt_layer = fmt::layer()
                    .with_ansi(true)
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_thread_names(false)
                    .with_file(false)
                    .with_line_number(false)
                    .with_level(true)
                    .compact();

                registry.with(fmt_layer).try_init()?;
            },

            TracingFormat::Compact => {
                let fmt_layer = fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_thread_names(false)
                    .with_file(false)
                    .with_line_number(false)
                    .compact();

                registry.with(fmt_layer).try_init()?;
            },

            #[cfg(feature = "tracing-json")]
            TracingFormat::Json => {
                let fmt_layer = fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true);

                registry.with(fmt_layer).try_init()?;
            },
        }

        if let Some(session_id) = &self.session_id {
            tracing::debug!(session_id = %session_id, "Photo editor session started");
        }

        Ok(())
    }
}
