pub mod path;
pub mod repository;
pub mod rules;
pub mod settings;

pub use path::Paths;
pub use repository::{AppRule, CategoryRule, RuleRepository, ScheduleWindows};
pub use rules::{AppRuleConfig, CategoryConfig, RulesDocument};
pub use settings::{Features, Settings, Thresholds};

use crate::core::error::SchedError;
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;
use tracing::{info, warn};

static PROFILE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.-]{0,63}$").expect("profile name pattern")
});

pub(crate) fn validate_profile(name: &str) -> Result<(), String> {
    if PROFILE_NAME.is_match(name) {
        Ok(())
    } else {
        Err(format!("invalid profile name {:?}", name))
    }
}

pub(crate) fn read_document(path: &Path) -> Result<String, SchedError> {
    match std::fs::read_to_string(path) {
        Ok(s) => Ok(s),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(SchedError::ConfigMissing(path.to_path_buf()))
        }
        Err(e) => Err(SchedError::io(format!("Failed to read {}", path.display()), e)),
    }
}

/// Writes through a temporary sibling and renames it into place.
pub(crate) fn write_atomic(path: &Path, body: &str) -> Result<(), SchedError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| SchedError::io(format!("Failed to create {}", parent.display()), e))?;
    }
    let mut temp_name = path.file_name().unwrap_or_default().to_os_string();
    temp_name.push(".tmp");
    let temp_path = path.with_file_name(temp_name);

    std::fs::write(&temp_path, body)
        .map_err(|e| SchedError::io("Failed to write temporary file", e))?;
    std::fs::rename(&temp_path, path)
        .map_err(|e| SchedError::io("Failed to rename to final file", e))
}

fn load_or_init<T>(
    path: &Path,
    template: &str,
    load: impl Fn(&Path) -> Result<T, SchedError>,
) -> Result<T, SchedError> {
    match load(path) {
        Err(SchedError::ConfigMissing(missing)) => {
            warn!(target: "hwsched::config", "{} not found, writing defaults", missing.display());
            write_atomic(&missing, template)?;
            load(missing.as_path())
        }
        other => other,
    }
}

pub fn load_or_init_settings(path: &Path) -> Result<Settings, SchedError> {
    load_or_init(path, settings::DEFAULT_SETTINGS_TOML, |p| Settings::load(p))
}

pub fn load_or_init_rules(path: &Path) -> Result<RulesDocument, SchedError> {
    load_or_init(path, rules::DEFAULT_RULES_TOML, |p| RulesDocument::load(p))
}

/// Loads both documents, generating defaults for absent ones.
pub fn load_all(paths: &Paths) -> Result<RuleRepository, SchedError> {
    let settings = load_or_init_settings(&paths.settings_path())?;
    let rules_path = paths.rules_path();
    let rules = load_or_init_rules(&rules_path)?;
    let repo = RuleRepository::new(settings, rules, &rules_path)?;
    info!(
        target: "hwsched::config",
        "Loaded {} app rules, {} categories from {}",
        repo.apps().count(),
        repo.categories().count(),
        paths.config_dir.display()
    );
    Ok(repo)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_names() {
        assert!(validate_profile("power-save").is_ok());
        assert!(validate_profile("gaming_2").is_ok());
        assert!(validate_profile("").is_err());
        assert!(validate_profile("-x").is_err());
        assert!(validate_profile("two words").is_err());
        assert!(validate_profile("a;rm -rf").is_err());
    }

    #[test]
    fn test_load_all_generates_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::new(dir.path().join("config"), dir.path().join("state"));

        let repo = load_all(&paths).unwrap();
        assert!(paths.settings_path().exists());
        assert!(paths.rules_path().exists());
        assert_eq!(repo.settings(), &Settings::default());
        assert!(repo.lookup_app("steam").is_some());

        // Second load reads the generated files back unchanged.
        let again = load_all(&paths).unwrap();
        assert_eq!(again.settings(), repo.settings());
        assert_eq!(again.apps().count(), repo.apps().count());
    }

    #[test]
    fn test_load_all_rejects_malformed_rules() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::new(dir.path().join("config"), dir.path().join("state"));
        write_atomic(&paths.rules_path(), "[applications.steam\n").unwrap();

        let err = load_all(&paths).unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(err, SchedError::ConfigInvalid { .. }));
    }

    #[test]
    fn test_write_atomic_leaves_no_temp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("doc.toml");
        write_atomic(&path, "a = 1\n").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "a = 1\n");
        assert!(!dir.path().join("nested").join("doc.toml.tmp").exists());
    }
}
