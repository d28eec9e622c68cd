//! Browser discovery and the Chromium render surface.

pub mod chromium;

use std::path::PathBuf;

pub use chromium::{ChromiumSurface, LaunchOptions, PageInfo};

/// Environment variable naming an explicit Chromium binary.
pub const CHROMIUM_PATH_ENV: &str = "REVIEW_HARVEST_CHROMIUM_PATH";

/// Executable names looked up on `PATH`, in order.
const PATH_CANDIDATES: [&str; 4] = [
    "google-chrome",
    "google-chrome-stable",
    "chromium",
    "chromium-browser",
];

const MACOS_CHROME: &str = "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome";

/// Find the Chromium binary path.
pub fn find_chromium() -> Option<PathBuf> {
    locate_chromium(std::env::var_os(CHROMIUM_PATH_ENV).map(PathBuf::from), |name| {
        which::which(name).ok()
    })
}

/// Explicit override, then `PATH`, then the standard macOS install.
fn locate_chromium<F>(explicit: Option<PathBuf>, on_path: F) -> Option<PathBuf>
where
    F: Fn(&str) -> Option<PathBuf>,
{
    if let Some(path) = explicit.filter(|p| p.exists()) {
        return Some(path);
    }

    if let Some(path) = PATH_CANDIDATES.iter().find_map(|name| on_path(name)) {
        return Some(path);
    }

    if cfg!(target_os = "macos") {
        let common = PathBuf::from(MACOS_CHROME);
        if common.exists() {
            return Some(common);
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_override_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let fake = dir.path().join("chrome");
        std::fs::write(&fake, b"#!/bin/sh\n").unwrap();

        std::env::set_var(CHROMIUM_PATH_ENV, &fake);
        assert_eq!(find_chromium(), Some(fake.clone()));

        std::env::set_var(CHROMIUM_PATH_ENV, dir.path().join("missing"));
        assert_ne!(find_chromium(), Some(dir.path().join("missing")));
        std::env::remove_var(CHROMIUM_PATH_ENV);
    }

    #[test]
    fn test_path_lookup_order() {
        let found = locate_chromium(None, |name| {
            (name == "chromium" || name == "chromium-browser")
                .then(|| PathBuf::from(format!("/usr/bin/{name}")))
        });
        assert_eq!(found, Some(PathBuf::from("/usr/bin/chromium")));
    }

    #[test]
    fn test_missing_override_falls_through_to_path() {
        let dir = tempfile::tempdir().unwrap();
        let found = locate_chromium(Some(dir.path().join("nope")), |name| {
            (name == "google-chrome").then(|| PathBuf::from("/opt/google/chrome"))
        });
        assert_eq!(found, Some(PathBuf::from("/opt/google/chrome")));
    }

    #[cfg(not(target_os = "macos"))]
    #[test]
    fn test_nothing_found() {
        assert_eq!(locate_chromium(None, |_| None), None);
    }
}
