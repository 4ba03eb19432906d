// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Platform-aware data directory resolution.

use std::path::{Path, PathBuf};

/// Application data directory. Not created here; nothing is written to it
/// unless the operator puts a config file there.
pub fn data_dir() -> PathBuf {
    base_dir().join("labelwerk")
}

fn base_dir() -> PathBuf {
    base_dir_from(
        std::env::var_os("XDG_DATA_HOME").as_deref().map(Path::new),
        std::env::var_os("HOME").as_deref().map(Path::new),
        std::env::var_os("APPDATA").as_deref().map(Path::new),
    )
}

/// XDG data dir, then `~/.local/share`, then `%APPDATA%`, then the system
/// temp dir.
fn base_dir_from(xdg: Option<&Path>, home: Option<&Path>, appdata: Option<&Path>) -> PathBuf {
    if let Some(xdg) = xdg.filter(|p| !p.as_os_str().is_empty()) {
        return xdg.to_path_buf();
    }
    if let Some(home) = home.filter(|p| !p.as_os_str().is_empty()) {
        return home.join(".local").join("share");
    }
    if let Some(appdata) = appdata.filter(|p| !p.as_os_str().is_empty()) {
        return appdata.to_path_buf();
    }
    std::env::temp_dir()
}
