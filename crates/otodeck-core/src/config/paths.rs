//! Standard locations of the mixer config file

use std::path::PathBuf;

/// File name of the mixer config inside the app's config directory
pub const CONFIG_FILE_NAME: &str = "mixer.yaml";

/// `<config dir>/otodeck/mixer.yaml`, or `./mixer.yaml` when the platform
/// has no config directory
pub fn default_config_path() -> PathBuf {
    match dirs::config_dir() {
        Some(dir) => dir.join("otodeck").join(CONFIG_FILE_NAME),
        None => PathBuf::from(CONFIG_FILE_NAME),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_path_ends_with_file_name() {
        assert!(default_config_path().ends_with(CONFIG_FILE_NAME));
    }
}
