// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Process wide logger for the `log` macros used by this crate.
//!
//! Nothing is printed until `syslog::init()` or `syslog::init_with()` is called and returns `Ok`.
//! Only the first call installs a logger; later calls return the outcome of the first one.
//!
//! # Examples
//!
//! ```
//! use shm_region::syslog;
//! use shm_region::warn;
//!
//! if let Err(e) = syslog::init() {
//!     println!("failed to initialize syslog: {}", e);
//!     return;
//! }
//! warn!("this is your {} warning", "final");
//! ```

use std::io;
use std::io::Write;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Once;

use remain::sorted;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error as ThisError;

/// Errors returned by `syslog::init()`.
#[sorted]
#[derive(ThisError, Debug)]
pub enum Error {
    /// Initialization has previously failed and can not be retried.
    #[error("initialization previously failed and cannot be retried")]
    Poisoned,
    /// Another logger was installed before ours.
    #[error("failed to install logger: {0}")]
    SetLogger(log::SetLoggerError),
}

/// Logger settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    /// `env_logger` filter directives, e.g. `"info"` or `"warn,shm_region=debug"`.
    pub filter: String,
    /// Echo log lines to stderr. When false, lines are formatted and discarded.
    pub stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            filter: "info".to_owned(),
            stderr: true,
        }
    }
}

macro_rules! CHRONO_TIMESTAMP_FIXED_FMT {
    () => {
        "%F %T%.9f"
    };
}

fn write_record(buf: &mut dyn Write, timestamp: &str, record: &log::Record) -> io::Result<()> {
    match (record.file(), record.line()) {
        (Some(file_name), Some(line)) => write!(
            buf,
            "[{}:{}:{}:{}] ",
            timestamp,
            record.level(),
            file_name,
            line
        )?,
        _ => write!(buf, "[{}:{}] ", timestamp, record.level())?,
    }
    writeln!(buf, "{}", record.args())
}

fn build_logger(cfg: &LogConfig, is_test: bool) -> env_logger::Logger {
    let mut builder = env_logger::Builder::new();
    builder.parse_filters(&cfg.filter);
    builder.format(|buf, record| {
        let now = chrono::Local::now()
            .format(CHRONO_TIMESTAMP_FIXED_FMT!())
            .to_string();
        write_record(buf, &now, record)
    });
    if cfg.stderr {
        builder.target(env_logger::Target::Stderr);
    } else {
        builder.target(env_logger::Target::Pipe(Box::new(io::sink())));
    }
    builder.is_test(is_test);
    builder.build()
}

static INIT: Once = Once::new();
static INITIALIZED: AtomicBool = AtomicBool::new(false);

fn install(cfg: &LogConfig, is_test: bool) -> Result<(), Error> {
    let mut err = None;
    INIT.call_once(|| {
        let logger = build_logger(cfg, is_test);
        let max_level = logger.filter();
        match log::set_boxed_logger(Box::new(logger)) {
            Ok(()) => {
                log::set_max_level(max_level);
                INITIALIZED.store(true, Ordering::SeqCst);
            }
            Err(e) => err = Some(e),
        }
    });
    if let Some(e) = err {
        return Err(Error::SetLogger(e));
    }
    if INITIALIZED.load(Ordering::SeqCst) {
        Ok(())
    } else {
        Err(Error::Poisoned)
    }
}

/// Installs the logger with `LogConfig::default()`.
pub fn init() -> Result<(), Error> {
    init_with(&LogConfig::default())
}

/// Installs the logger with `cfg`.
pub fn init_with(cfg: &LogConfig) -> Result<(), Error> {
    install(cfg, false)
}

/// Installs a logger that writes everything through the test harness's output capture.
pub fn test_only_ensure_inited() -> Result<(), Error> {
    install(
        &LogConfig {
            filter: "trace".to_owned(),
            stderr: true,
        },
        true,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_with_location() {
        let mut buf = Vec::new();
        write_record(
            &mut buf,
            "2024-01-02 03:04:05.000000006",
            &log::Record::builder()
                .args(format_args!("mapped {} bytes", 4096))
                .level(log::Level::Warn)
                .file(Some("src/region.rs"))
                .line(Some(42))
                .build(),
        )
        .unwrap();
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "[2024-01-02 03:04:05.000000006:WARN:src/region.rs:42] mapped 4096 bytes\n"
        );
    }

    #[test]
    fn record_without_location() {
        let mut buf = Vec::new();
        write_record(
            &mut buf,
            "now",
            &log::Record::builder()
                .args(format_args!("hello"))
                .level(log::Level::Error)
                .build(),
        )
        .unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "[now:ERROR] hello\n");
    }

    #[test]
    fn config_defaults_fill_missing_fields() {
        let cfg: LogConfig = serde_json::from_str(r#"{"filter":"debug"}"#).unwrap();
        assert_eq!(
            cfg,
            LogConfig {
                filter: "debug".to_owned(),
                stderr: true,
            }
        );
        serde_json::from_str::<LogConfig>(r#"{"level":"debug"}"#).unwrap_err();
    }

    #[test]
    fn repeated_init_is_ok() {
        test_only_ensure_inited().unwrap();
        test_only_ensure_inited().unwrap();
        init().unwrap();
        log::debug!("logger installed");
    }
}
