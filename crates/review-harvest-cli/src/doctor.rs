//! Environment readiness check.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::browser::{find_chromium, CHROMIUM_PATH_ENV};
use crate::config::HarvestConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    Ok,
    /// Not blocking, but worth knowing.
    Warn,
    Fail,
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "[OK]"),
            Self::Warn => write!(f, "[??]"),
            Self::Fail => write!(f, "[!!]"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Check {
    pub status: CheckStatus,
    pub message: String,
}

impl Check {
    fn new(status: CheckStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

/// Run every check against the effective config.
pub fn checks(config: &HarvestConfig, config_file: &Path) -> Vec<Check> {
    vec![
        chromium_check(find_chromium()),
        config_file_check(config_file),
        output_dir_check(&config.base_dir),
    ]
}

fn chromium_check(path: Option<PathBuf>) -> Check {
    match path {
        Some(path) => Check::new(
            CheckStatus::Ok,
            format!("Chromium found: {}", path.display()),
        ),
        None => Check::new(
            CheckStatus::Fail,
            format!("Chromium NOT found. Install Chrome or set {CHROMIUM_PATH_ENV}."),
        ),
    }
}

fn config_file_check(file: &Path) -> Check {
    if file.is_file() {
        Check::new(
            CheckStatus::Ok,
            format!("Config file: {}", file.display()),
        )
    } else {
        Check::new(
            CheckStatus::Warn,
            format!("No config file at {}, using defaults", file.display()),
        )
    }
}

/// The base directory must exist and be a directory, or be creatable.
fn output_dir_check(base_dir: &Path) -> Check {
    if base_dir.is_dir() {
        let readonly = std::fs::metadata(base_dir)
            .map(|m| m.permissions().readonly())
            .unwrap_or(false);
        if readonly {
            return Check::new(
                CheckStatus::Fail,
                format!("Output directory is read-only: {}", base_dir.display()),
            );
        }
        return Check::new(
            CheckStatus::Ok,
            format!("Output directory: {}", base_dir.display()),
        );
    }
    if base_dir.exists() {
        return Check::new(
            CheckStatus::Fail,
            format!("Output path is not a directory: {}", base_dir.display()),
        );
    }
    Check::new(
        CheckStatus::Ok,
        format!("Output directory will be created: {}", base_dir.display()),
    )
}

/// Ready unless some check failed outright.
pub fn is_ready(checks: &[Check]) -> bool {
    checks.iter().all(|c| c.status != CheckStatus::Fail)
}

/// Print the report. Returns readiness.
pub fn run(config: &HarvestConfig, config_file: &Path) -> bool {
    println!("review-harvest doctor");
    println!("=====================");
    println!();
    println!("OS:   {}", std::env::consts::OS);
    println!("Arch: {}", std::env::consts::ARCH);
    println!();

    let checks = checks(config, config_file);
    for check in &checks {
        println!("{} {}", check.status, check.message);
    }

    println!();
    let ready = is_ready(&checks);
    if ready {
        println!("Status: READY");
    } else {
        println!("Status: NOT READY");
    }
    ready
}
