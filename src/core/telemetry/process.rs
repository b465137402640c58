use std::collections::BTreeSet;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessEntry {
    pub name: String,
    pub exe: Option<PathBuf>,
    pub kernel_thread: bool,
}

const DELETED_SUFFIX: &str = " (deleted)";

/// Executable basename used as the rule key, or `None` for kernel threads
/// and nameless entries.
pub fn normalize(entry: &ProcessEntry) -> Option<String> {
    let name = entry.name.trim();
    if entry.kernel_thread || (name.starts_with('[') && name.ends_with(']')) {
        return None;
    }

    let base = entry
        .exe
        .as_deref()
        .and_then(|p| p.file_name())
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| name.rsplit('/').next().unwrap_or(name).to_string());

    let base = base.strip_suffix(DELETED_SUFFIX).unwrap_or(&base).trim();
    (!base.is_empty()).then(|| base.to_string())
}

pub fn normalize_all(entries: &[ProcessEntry]) -> BTreeSet<String> {
    entries.iter().filter_map(normalize).collect()
}
