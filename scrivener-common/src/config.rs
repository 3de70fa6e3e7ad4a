//! Configuration loading and root folder resolution

use crate::{Error, Result};
use std::path::{Path, PathBuf};

/// Root folder resolution priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. TOML config file
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_root_folder(cli_arg: Option<&str>, env_var_name: &str) -> Result<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Ok(PathBuf::from(path));
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.is_empty() {
            return Ok(PathBuf::from(path));
        }
    }

    // Priority 3: TOML config file
    if let Ok(config_path) = find_config_file() {
        if let Ok(toml_content) = std::fs::read_to_string(&config_path) {
            if let Ok(config) = toml::from_str::<toml::Value>(&toml_content) {
                if let Some(root_folder) = config.get("root_folder").and_then(|v| v.as_str()) {
                    return Ok(PathBuf::from(root_folder));
                }
            }
        }
    }

    // Priority 4: OS-dependent compiled default
    Ok(default_root_folder())
}

/// Get default configuration file path for the platform
fn find_config_file() -> Result<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("scrivener").join("config.toml"));

    if let Some(path) = user_config {
        if path.exists() {
            return Ok(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/scrivener/config.toml");
        if system_config.exists() {
            return Ok(system_config);
        }
    }

    Err(Error::Config("No config file found".to_string()))
}

/// Get OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("scrivener"))
        .unwrap_or_else(|| PathBuf::from("./scrivener_data"))
}

/// Database file path inside the root folder
pub fn database_path(root_folder: &Path) -> PathBuf {
    root_folder.join("scrivener.db")
}

/// Uploads (audio blob) directory inside the root folder
pub fn uploads_dir(root_folder: &Path) -> PathBuf {
    root_folder.join("uploads")
}

/// Create the root folder and uploads directory if missing
pub fn ensure_directories(root_folder: &Path) -> Result<()> {
    std::fs::create_dir_all(root_folder)?;
    std::fs::create_dir_all(uploads_dir(root_folder))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_arg_takes_priority() {
        let resolved = resolve_root_folder(Some("/tmp/explicit"), "SCRIVENER_TEST_UNSET_VAR")
            .expect("resolution failed");
        assert_eq!(resolved, PathBuf::from("/tmp/explicit"));
    }

    #[test]
    fn test_env_var_used_when_no_cli_arg() {
        std::env::set_var("SCRIVENER_TEST_ROOT_A", "/tmp/from-env");
        let resolved =
            resolve_root_folder(None, "SCRIVENER_TEST_ROOT_A").expect("resolution failed");
        assert_eq!(resolved, PathBuf::from("/tmp/from-env"));
        std::env::remove_var("SCRIVENER_TEST_ROOT_A");
    }

    #[test]
    fn test_derived_paths() {
        let root = PathBuf::from("/data/scrivener");
        assert_eq!(database_path(&root), PathBuf::from("/data/scrivener/scrivener.db"));
        assert_eq!(uploads_dir(&root), PathBuf::from("/data/scrivener/uploads"));
    }

    #[test]
    fn test_ensure_directories_creates_uploads() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let root = tmp.path().join("root");
        ensure_directories(&root).expect("ensure failed");
        assert!(uploads_dir(&root).is_dir());
    }
}
