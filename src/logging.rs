//! Logging backend setup.
//!
//! tessera only emits `tracing` events; it never needs a subscriber to work.
//! Binaries that want the default behaviour (JSON lines, level from
//! `RUST_LOG`) call [`init`] once at startup.
//!
//! Records go to every entry of [`LoggingConfig::outputs`]: `"stderr"`,
//! `"stdout"`, or a file path opened for appending. An empty list means
//! stderr.

use std::fs::OpenOptions;
use std::io;
use std::sync::Mutex;

use serde::Deserialize;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};

use crate::error::Error;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Lowers the default level from `info` to `debug`.
    pub debug: bool,
    /// JSON lines when `true`, human-readable text otherwise.
    pub json: bool,
    pub outputs: Vec<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { debug: false, json: true, outputs: vec!["stderr".to_owned()] }
    }
}

impl LoggingConfig {
    fn default_directive(&self) -> &'static str {
        if self.debug { "debug" } else { "info" }
    }

    /// One writer fanning out to every configured output.
    pub fn writer(&self) -> Result<BoxMakeWriter, Error> {
        let mut writer: Option<BoxMakeWriter> = None;
        for output in &self.outputs {
            let next = open(output)?;
            writer = Some(match writer {
                Some(all) => BoxMakeWriter::new(all.and(next)),
                None => next,
            });
        }
        Ok(writer.unwrap_or_else(|| BoxMakeWriter::new(io::stderr)))
    }
}

fn open(output: &str) -> Result<BoxMakeWriter, Error> {
    match output {
        "stderr" => Ok(BoxMakeWriter::new(io::stderr)),
        "stdout" => Ok(BoxMakeWriter::new(io::stdout)),
        path => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| Error::Logging(format!("{path}: {e}")))?;
            Ok(BoxMakeWriter::new(Mutex::new(file)))
        }
    }
}

/// Installs the global subscriber. `RUST_LOG`, when set, wins over `debug`.
///
/// Fails with [`Error::Logging`] when an output cannot be opened or when
/// called twice.
pub fn init(config: &LoggingConfig) -> Result<(), Error> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.default_directive()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(config.writer()?);

    let result = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    result.map_err(|e| Error::Logging(e.to_string()))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn defaults_to_json_at_info_on_stderr() {
        let cfg = LoggingConfig::default();
        assert!(cfg.json);
        assert_eq!(cfg.outputs, ["stderr"]);
        assert_eq!(cfg.default_directive(), "info");
        assert_eq!(LoggingConfig { debug: true, ..cfg }.default_directive(), "debug");
    }

    #[test]
    fn records_reach_every_file_output() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first.log");
        let second = dir.path().join("second.log");
        let cfg = LoggingConfig {
            outputs: vec![
                first.display().to_string(),
                "stderr".to_owned(),
                second.display().to_string(),
            ],
            ..LoggingConfig::default()
        };

        let subscriber = tracing_subscriber::fmt().json().with_writer(cfg.writer().unwrap()).finish();
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(source = "rest", "written twice");
        });

        for path in [first, second] {
            let line = fs::read_to_string(&path).unwrap();
            let record: serde_json::Value = serde_json::from_str(line.trim()).unwrap();
            assert_eq!(record["fields"]["message"], "written twice");
            assert_eq!(record["fields"]["source"], "rest");
        }
    }

    #[test]
    fn empty_outputs_fall_back_to_stderr() {
        let cfg = LoggingConfig { outputs: Vec::new(), ..LoggingConfig::default() };
        assert!(cfg.writer().is_ok());
    }

    #[test]
    fn unopenable_output_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = LoggingConfig {
            outputs: vec![dir.path().join("missing/dir/api.log").display().to_string()],
            ..LoggingConfig::default()
        };
        assert!(matches!(cfg.writer(), Err(Error::Logging(_))));
        assert!(matches!(init(&cfg), Err(Error::Logging(_))));
    }

    #[test]
    fn second_init_fails_instead_of_panicking() {
        let cfg = LoggingConfig::default();
        let _ = init(&cfg);
        assert!(matches!(init(&cfg), Err(Error::Logging(_))));
    }
}
