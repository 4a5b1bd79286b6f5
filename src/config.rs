use std::path::PathBuf;

pub const ENV_LOG: &str = "GRADEBOOKD_LOG";
pub const ENV_LOG_JSON: &str = "GRADEBOOKD_LOG_JSON";
pub const ENV_WORKSPACE: &str = "GRADEBOOKD_WORKSPACE";

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// `EnvFilter` directive, e.g. `info` or `gradebookd=debug`.
    pub log_level: String,
    pub log_json: bool,
    /// Workspace opened at startup, before any `workspace.select`.
    pub workspace: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_json: false,
            workspace: None,
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let log_level = lookup(ENV_LOG)
            .or_else(|| lookup("RUST_LOG"))
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or(defaults.log_level);
        let log_json = lookup(ENV_LOG_JSON)
            .map(|v| parse_flag(&v))
            .unwrap_or(defaults.log_json);
        let workspace = lookup(ENV_WORKSPACE)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);
        Self {
            log_level,
            log_json,
            workspace,
        }
    }
}

fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_env_is_empty() {
        assert_eq!(Settings::from_lookup(|_| None), Settings::default());
    }

    #[test]
    fn own_log_var_wins_over_rust_log() {
        let s = Settings::from_lookup(lookup_from(&[
            (ENV_LOG, "debug"),
            ("RUST_LOG", "warn"),
            (ENV_LOG_JSON, "TRUE"),
            (ENV_WORKSPACE, "/tmp/school"),
        ]));
        assert_eq!(s.log_level, "debug");
        assert!(s.log_json);
        assert_eq!(s.workspace, Some(PathBuf::from("/tmp/school")));
    }

    #[test]
    fn blank_workspace_is_ignored() {
        let s = Settings::from_lookup(lookup_from(&[(ENV_WORKSPACE, "  "), ("RUST_LOG", "warn")]));
        assert_eq!(s.workspace, None);
        assert_eq!(s.log_level, "warn");
    }
}
