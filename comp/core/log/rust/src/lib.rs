// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2025-present Datadog, Inc.

//! Minimal `log` backend producing agent-style log lines:
//!
//! ```text
//! 2025-06-01 12:00:00 UTC | CONFIG-DISCOVERY | INFO | (src/finder.rs:42 in dd_config_discovery::finder) | message
//! ```
//!
//! Everything goes to stderr so that binaries can keep stdout for their
//! actual output.

use std::io::{self, Write};
use std::sync::Mutex;

use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError};
use time::OffsetDateTime;
use time::macros::format_description;

const DEFAULT_COMPONENT: &str = "CONFIG-DISCOVERY";

pub struct Logger {
    level: LevelFilter,
    component: String,
    sink: Mutex<Box<dyn Write + Send>>,
}

impl Logger {
    pub fn new(level: LevelFilter) -> Self {
        Self::with_writer(level, Box::new(io::stderr()))
    }

    /// Creates a logger writing to an arbitrary sink. Mostly useful in tests.
    pub fn with_writer(level: LevelFilter, sink: Box<dyn Write + Send>) -> Self {
        Self {
            level,
            component: DEFAULT_COMPONENT.to_string(),
            sink: Mutex::new(sink),
        }
    }

    pub fn component(mut self, component: impl Into<String>) -> Self {
        self.component = component.into().to_uppercase();
        self
    }

    pub fn init(self) -> Result<(), SetLoggerError> {
        log::set_max_level(self.level);
        log::set_boxed_logger(Box::new(self))
    }
}

impl Log for Logger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let line = format_record(record, &self.component, OffsetDateTime::now_utc());
        // A poisoned lock only means another thread panicked mid-write; keep logging.
        let mut sink = match self.sink.lock() {
            Ok(sink) => sink,
            Err(poisoned) => poisoned.into_inner(),
        };
        let _ = writeln!(sink, "{line}");
    }

    fn flush(&self) {
        if let Ok(mut sink) = self.sink.lock() {
            let _ = sink.flush();
        }
    }
}

fn format_record(record: &Record<'_>, component: &str, now: OffsetDateTime) -> String {
    let timestamp = now
        .format(format_description!(
            "[year]-[month]-[day] [hour]:[minute]:[second]"
        ))
        .unwrap_or_default();

    let location = match (record.file(), record.line()) {
        (Some(file), Some(line)) => format!("{file}:{line}"),
        (Some(file), None) => file.to_string(),
        _ => "unknown".to_string(),
    };

    format!(
        "{timestamp} UTC | {component} | {level} | ({location} in {module}) | {args}",
        level = record.level(),
        module = record.module_path().unwrap_or("unknown"),
        args = record.args(),
    )
}

/// Installs the global logger at the given level.
pub fn init_with_level(level: Level) -> Result<(), SetLoggerError> {
    Logger::new(level.to_level_filter()).init()
}

/// Parses agent-style level names (`trace`, `debug`, `info`, `warn`,
/// `warning`, `error`, `critical`, `off`), case-insensitively.
pub fn parse_level(value: &str) -> Option<LevelFilter> {
    match value.trim().to_lowercase().as_str() {
        "trace" => Some(LevelFilter::Trace),
        "debug" => Some(LevelFilter::Debug),
        "info" => Some(LevelFilter::Info),
        "warn" | "warning" => Some(LevelFilter::Warn),
        "error" | "critical" => Some(LevelFilter::Error),
        "off" => Some(LevelFilter::Off),
        _ => None,
    }
}
