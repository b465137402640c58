pub const APP_NAME: &str = "hwsched";

pub const SETTINGS_FILE: &str = "settings.toml";
pub const RULES_FILE: &str = "rules.toml";
pub const PID_FILE: &str = "hwsched.pid";
pub const LOG_FILE: &str = "hwsched.log";
pub const STATE_FILE: &str = "state.toml";
pub const PROFILE_MARKER_FILE: &str = "current_profile";

pub const CONFIG_DIR_ENV: &str = "HWSCHED_CONFIG_DIR";
pub const STATE_DIR_ENV: &str = "HWSCHED_STATE_DIR";

pub const PROFILE_BATTERY_EXTREME: &str = "battery-extreme";
pub const PROFILE_POWER_SAVE: &str = "power-save";
pub const PROFILE_BALANCED: &str = "balanced";
