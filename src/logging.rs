//! Logger configuration for the CLI: a compact terminal layer plus an
//! hourly-rolling file layer under `<home>/logs/`. The `LLM_BUNDLER_DEBUG`
//! and `LLM_BUNDLER_QUIET` environment toggles move the level without
//! touching flags, and are mirrored into launched server processes.

use colorful::Colorful;
use indenter::indented;
use std::fmt::Write;
use tracing_subscriber::layer::SubscriberExt;

use crate::{
    config::env::{check_bool_env, DEBUG_ENV_VAR, QUIET_ENV_VAR},
    error::LlmBundlerResult,
    fs::BundlerHome,
};

pub fn debug_mode() -> bool {
    check_bool_env(DEBUG_ENV_VAR, false)
}

pub fn quiet_mode() -> bool {
    check_bool_env(QUIET_ENV_VAR, false)
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: tracing::Level,
    pub logging_enabled: bool,
    pub logger_name: String,
    pub _tracing_guard: Option<std::sync::Arc<tracing::subscriber::DefaultGuard>>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        let level = if debug_mode() {
            tracing::Level::DEBUG
        } else if quiet_mode() {
            tracing::Level::ERROR
        } else {
            tracing::Level::INFO
        };
        Self {
            level,
            logging_enabled: true,
            logger_name: "llm_bundler".to_string(),
            _tracing_guard: None,
        }
    }
}

impl LoggingConfig {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn load_logger(&mut self, home: &BundlerHome) -> LlmBundlerResult<()> {
        self._tracing_guard = if self.logging_enabled {
            Some(std::sync::Arc::new(self.create_logger(home)?))
        } else {
            None
        };

        if self.logging_enabled && !quiet_mode() {
            println!(
                "{}",
                format!("Starting {} Logger", self.logger_name)
                    .color(colorful::RGB::new(0, 139, 248))
                    .bold()
            );
        }

        Ok(())
    }

    fn create_logger(
        &mut self,
        home: &BundlerHome,
    ) -> LlmBundlerResult<tracing::subscriber::DefaultGuard> {
        let log_dir = home.logs_dir()?;

        let file_appender = tracing_appender::rolling::RollingFileAppender::builder()
            .rotation(tracing_appender::rolling::Rotation::HOURLY)
            .max_log_files(6)
            .filename_prefix(&self.logger_name)
            .filename_suffix("log")
            .build(&*log_dir)
            .map_err(|e| crate::error::LlmBundlerError::InvalidConfig {
                field: "log file appender",
                reason: e.to_string(),
            })?;

        let filter = tracing_subscriber::EnvFilter::builder()
            .with_default_directive(self.level.into())
            .parse_lossy("");

        let file_layer = tracing_subscriber::fmt::layer()
            .pretty()
            .with_ansi(false)
            .with_writer(file_appender);

        let terminal_layer = tracing_subscriber::fmt::layer()
            .compact()
            .with_ansi(false)
            .with_writer(std::io::stderr);

        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .with(terminal_layer);

        Ok(tracing::subscriber::set_default(subscriber))
    }
}

pub fn i_nlns(
    f: &mut std::fmt::Formatter<'_>,
    args: &[std::fmt::Arguments<'_>],
) -> std::fmt::Result {
    for arg in args {
        writeln!(indented(f), "{}", arg)?;
    }
    Ok(())
}
