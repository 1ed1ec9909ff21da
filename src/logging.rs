use crate::utils::truncate_str;
use crate::EmbedResult;
use std::fmt::Display;
use std::path::PathBuf;
use tracing::{debug, error, info};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    fmt as subscriber_fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
};

#[derive(Debug)]
pub struct LogConfig {
    pub log_dir: PathBuf,
    pub log_level: String,
    pub console_output: bool,
    pub file_output: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_dir: "logs".into(),
            log_level: "info".into(),
            console_output: true,
            file_output: true,
        }
    }
}

/// Log a compact card for an extracted embed.
pub fn log_embed_card(embed: &EmbedResult, url: &str) {
    const CONTENT_WIDTH: usize = 72;

    let line = "═".repeat(CONTENT_WIDTH);

    info!(
        "\n╔{}╗\n\
         URL: {}\n\
         Kind: {} ({})\n\
         Title: {}\n\
         Author: {}\n\
         Thumb: {}\n\
         ╚{}╝",
        line,
        truncate_str(url, CONTENT_WIDTH),
        embed.kind,
        embed.platform.as_deref().unwrap_or("-"),
        truncate_str(embed.title.as_deref().unwrap_or("N/A"), CONTENT_WIDTH),
        truncate_str(embed.author_name.as_deref().unwrap_or("N/A"), CONTENT_WIDTH),
        truncate_str(embed.thumbnail_url.as_deref().unwrap_or("N/A"), CONTENT_WIDTH),
        line,
    );
}

pub fn log_error_card<E: Display + std::error::Error>(url: &str, err: &E) {
    const CONTENT_WIDTH: usize = 62;

    let line = "═".repeat(CONTENT_WIDTH);

    let mut details = err.to_string();
    if let Some(source) = err.source() {
        details = format!("{details} (caused by: {source})");
    }

    error!(
        "\n╔{}╗\n\
         URL: {}\n\
         Error: {}\n\
         ╚{}╝",
        line,
        truncate_str(url, CONTENT_WIDTH),
        truncate_str(&details, CONTENT_WIDTH),
        line,
    );
}

/// Install the global subscriber: console layer and/or a daily rolling
/// file under `log_dir`, filtered by `RUST_LOG` when set.
pub fn setup_logging(config: LogConfig) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let mut layers = Vec::new();

    if config.console_output {
        let console_layer = subscriber_fmt::layer()
            .with_target(true)
            .with_line_number(true)
            .with_file(true)
            .pretty();
        layers.push(console_layer.boxed());
    }

    if config.file_output {
        std::fs::create_dir_all(&config.log_dir).expect("failed to create log directory");

        let file_appender =
            RollingFileAppender::new(Rotation::DAILY, &config.log_dir, "url-embed.log");

        let file_layer = subscriber_fmt::layer()
            .with_ansi(false)
            .with_target(true)
            .with_line_number(true)
            .with_file(true)
            .with_writer(file_appender);

        layers.push(file_layer.boxed());
    }

    tracing_subscriber::registry()
        .with(env_filter)
        .with(layers)
        .try_init()
        .expect("failed to set global default subscriber");

    debug!("logging initialized: {:?}", config);
}
