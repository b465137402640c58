use crate::core::clock::ScheduleWindow;
use crate::core::config::rules::RulesDocument;
use crate::core::config::settings::{Features, Settings, Thresholds};
use crate::core::config::validate_profile;
use crate::core::error::SchedError;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppRule {
    pub process_name: String,
    pub priority: i32,
    pub profile: String,
    pub category: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryRule {
    pub category: String,
    pub default_profile: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleWindows {
    pub sleep: ScheduleWindow,
    pub work: ScheduleWindow,
}

/// Immutable view over the loaded settings and rule tables.
#[derive(Debug, Clone)]
pub struct RuleRepository {
    settings: Settings,
    windows: ScheduleWindows,
    apps: BTreeMap<String, AppRule>,
    categories: BTreeMap<String, CategoryRule>,
}

impl RuleRepository {
    /// Resolves app profiles against their categories. `rules_path` only
    /// labels errors.
    pub fn new(
        settings: Settings,
        rules: RulesDocument,
        rules_path: &Path,
    ) -> Result<Self, SchedError> {
        let mut categories = BTreeMap::new();
        for (name, cfg) in rules.categories {
            validate_profile(&cfg.default_profile)
                .map_err(|reason| SchedError::invalid(rules_path, format!("category {name}: {reason}")))?;
            categories.insert(
                name.clone(),
                CategoryRule {
                    category: name,
                    default_profile: cfg.default_profile,
                },
            );
        }

        let mut apps = BTreeMap::new();
        for (name, cfg) in rules.applications {
            if name.trim().is_empty() {
                return Err(SchedError::invalid(rules_path, "empty application name"));
            }
            let from_category = cfg
                .category
                .as_ref()
                .and_then(|c| categories.get(c))
                .map(|c: &CategoryRule| c.default_profile.clone());
            let profile = cfg.profile.clone().or(from_category).ok_or_else(|| {
                SchedError::invalid(
                    rules_path,
                    format!("application {name} has no profile and no category default"),
                )
            })?;
            validate_profile(&profile)
                .map_err(|reason| SchedError::invalid(rules_path, format!("application {name}: {reason}")))?;
            if let Some(cat) = &cfg.category
                && !categories.contains_key(cat)
            {
                tracing::debug!(target: "hwsched::config", "Application {} uses undeclared category {}", name, cat);
            }
            apps.insert(
                name.clone(),
                AppRule {
                    process_name: name,
                    priority: cfg.priority,
                    profile,
                    category: cfg.category,
                },
            );
        }

        let windows = ScheduleWindows {
            sleep: settings.schedule.sleep_window(),
            work: settings.schedule.work_window(),
        };

        Ok(Self {
            settings,
            windows,
            apps,
            categories,
        })
    }

    pub fn lookup_app(&self, name: &str) -> Option<&AppRule> {
        self.apps.get(name)
    }

    pub fn require_app(&self, name: &str) -> Result<&AppRule, SchedError> {
        self.lookup_app(name)
            .ok_or_else(|| SchedError::RuleNotFound(name.to_string()))
    }

    pub fn lookup_category(&self, name: &str) -> Option<&CategoryRule> {
        self.categories.get(name)
    }

    pub fn thresholds(&self) -> Thresholds {
        self.settings.thresholds
    }

    pub fn features(&self) -> Features {
        self.settings.features
    }

    pub fn schedule_windows(&self) -> &ScheduleWindows {
        &self.windows
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn apps(&self) -> impl Iterator<Item = &AppRule> {
        self.apps.values()
    }

    pub fn categories(&self) -> impl Iterator<Item = &CategoryRule> {
        self.categories.values()
    }

    /// Rules of the running apps, best candidate first.
    pub fn matched_rules<'a>(&'a self, running: &BTreeSet<String>) -> Vec<&'a AppRule> {
        let mut matched: Vec<&AppRule> = running
            .iter()
            .filter_map(|name| self.lookup_app(name))
            .collect();
        matched.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| a.process_name.cmp(&b.process_name))
        });
        matched
    }
}
