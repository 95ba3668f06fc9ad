//! Default configuration values

/// Default configuration file name (TOML)
pub const DEFAULT_CONFIG_TOML: &str = "gantry.toml";

/// Default configuration file name (YAML)
pub const DEFAULT_CONFIG_YAML: &str = "gantry.yaml";

/// Keychain auto-lock window, one hour
pub const DEFAULT_KEYCHAIN_TIMEOUT_SECS: u32 = 3600;

/// GitHub REST API
pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// GitHub release asset upload host
pub const DEFAULT_UPLOADS_URL: &str = "https://uploads.github.com";

/// Get list of config file names to search for
pub fn config_file_names() -> Vec<&'static str> {
    vec![
        DEFAULT_CONFIG_TOML,
        DEFAULT_CONFIG_YAML,
        ".gantry.toml",
        ".gantry.yaml",
    ]
}
