use std::path::PathBuf;
use std::sync::OnceLock;

/// XDG-compliant location of vocalcoach's configuration.
///
///   Linux:  $XDG_CONFIG_HOME/vocalcoach  (~/.config/vocalcoach)
///   macOS:  ~/Library/Application Support/vocalcoach
///
/// The `dirs` crate handles platform detection; the resolved base path is
/// cached so the lookup only happens once.
static CONFIG_DIR: OnceLock<PathBuf> = OnceLock::new();

/// Root config directory.
pub fn config_dir() -> &'static PathBuf {
    CONFIG_DIR.get_or_init(|| {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("vocalcoach")
    })
}

/// Config file path: <config_dir>/config.toml
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}
