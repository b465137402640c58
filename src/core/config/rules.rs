use crate::common::PROFILE_BALANCED;
use crate::core::config::read_document;
use crate::core::error::SchedError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Written on first run when `rules.toml` is absent.
pub const DEFAULT_RULES_TOML: &str = r#"# hwsched application rules
#
# [applications.<process name>]
#   profile  - profile to apply while the process runs (optional when the
#              category below defines a default_profile)
#   priority - higher wins when several matched applications disagree;
#              equal priorities go to the alphabetically first process name
#   category - optional grouping, see [categories]
#
# [categories.<name>]
#   default_profile - profile for member applications without their own
#                     (defaults to "balanced")
#
# Process names are case-sensitive executable basenames as listed by
# `hwsched test`.

[applications.steam]
profile = "gaming"
priority = 100
category = "gaming"

[applications.lutris]
priority = 95
category = "gaming"

[applications.heroic]
priority = 95
category = "gaming"

[applications.blender]
profile = "productivity"
priority = 80
category = "creative"

[applications.obs]
priority = 75
category = "creative"

[applications.code]
priority = 70
category = "development"

[applications.firefox]
profile = "balanced"
priority = 60
category = "browsing"

[applications.mpv]
priority = 50
category = "media"

[categories.gaming]
default_profile = "gaming"

[categories.creative]
default_profile = "productivity"

[categories.development]
default_profile = "productivity"

[categories.browsing]
default_profile = "balanced"

[categories.media]
default_profile = "balanced"
"#;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RulesDocument {
    pub applications: BTreeMap<String, AppRuleConfig>,
    pub categories: BTreeMap<String, CategoryConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct AppRuleConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
    pub priority: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl Default for AppRuleConfig {
    fn default() -> Self {
        Self {
            profile: None,
            priority: 50,
            category: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct CategoryConfig {
    pub default_profile: String,
}

impl Default for CategoryConfig {
    fn default() -> Self {
        Self {
            default_profile: PROFILE_BALANCED.to_string(),
        }
    }
}

impl RulesDocument {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, SchedError> {
        let path = path.as_ref();
        let content = read_document(path)?;
        toml::from_str(&content).map_err(|e| SchedError::invalid(path, e.to_string()))
    }
}
