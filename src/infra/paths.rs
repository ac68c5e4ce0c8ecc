// src/infra/paths.rs — Config path resolution
//
// LAYOUT_COPILOT_HOME overrides everything. When unset, config lives in
// ~/.layout-copilot/.

use std::path::PathBuf;

/// Returns the LAYOUT_COPILOT_HOME override, if set.
fn copilot_home() -> Option<PathBuf> {
    std::env::var_os("LAYOUT_COPILOT_HOME").map(PathBuf::from)
}

/// Configuration directory: $LAYOUT_COPILOT_HOME/ or ~/.layout-copilot/
pub fn config_dir() -> PathBuf {
    if let Some(home) = copilot_home() {
        return home;
    }
    match directories::BaseDirs::new() {
        Some(base) => base.home_dir().join(".layout-copilot"),
        // No resolvable home (e.g. stripped container user): fall back to cwd
        None => PathBuf::from(".layout-copilot"),
    }
}

/// Config file path
pub fn config_file_path() -> PathBuf {
    config_dir().join("config.toml")
}

/// Default prompt override directory
pub fn prompts_dir() -> PathBuf {
    config_dir().join("prompts")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_file_is_under_config_dir() {
        let file = config_file_path();
        assert!(file.starts_with(config_dir()));
        assert_eq!(file.file_name().and_then(|f| f.to_str()), Some("config.toml"));
    }

    #[test]
    fn test_prompts_dir_name() {
        assert!(prompts_dir().ends_with("prompts"));
    }
}
