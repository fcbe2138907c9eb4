//! Application directory paths.
//!
//! Uses the [`dirs`] crate for platform-appropriate resolution.
//!
//! | Purpose | macOS | Linux |
//! |---------|-------|-------|
//! | Data | `~/Library/Application Support/nudge/` | `~/.local/share/nudge/` |
//! | Config | `~/Library/Application Support/nudge/` | `~/.config/nudge/` |
//!
//! Overrides: `NUDGE_DATA_DIR` for [`data_dir`], `NUDGE_CONFIG_DIR` for
//! [`config_dir`].

use std::path::PathBuf;

/// Application data root: the prompt event log lives here.
#[must_use]
pub fn data_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("NUDGE_DATA_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::data_dir()
        .map(|d| d.join("nudge"))
        .unwrap_or_else(|| PathBuf::from("/tmp/nudge-data"))
}

/// Application config directory.
#[must_use]
pub fn config_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("NUDGE_CONFIG_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::config_dir()
        .map(|d| d.join("nudge"))
        .unwrap_or_else(|| PathBuf::from("/tmp/nudge-config"))
}

/// Prompting config file: `config_dir()/config.toml`.
#[must_use]
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}

/// Prompt response event log: `data_dir()/prompt_events.json`.
#[must_use]
pub fn prompt_events_file() -> PathBuf {
    data_dir().join("prompt_events.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_file_ends_with_config_toml() {
        let path = config_file();
        assert!(path.ends_with("config.toml"));
        assert!(path.starts_with(config_dir()));
    }

    #[test]
    fn prompt_events_file_is_under_data_dir() {
        let path = prompt_events_file();
        assert!(path.ends_with("prompt_events.json"));
        assert!(path.starts_with(data_dir()));
    }

    #[test]
    fn dirs_are_nonempty() {
        assert!(!data_dir().as_os_str().is_empty());
        assert!(!config_dir().as_os_str().is_empty());
    }
}
