//! Layered TOML configuration: a per-user file under the home directory and
//! a per-project file under `.crewboard/`, with project values winning.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalConfig {
    #[serde(default)]
    pub user: UserConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub theme: ThemeConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserConfig {
    #[serde(default)]
    pub github_username: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default)]
    pub default: String,
    #[serde(default)]
    pub preferred: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThemeConfig {
    #[serde(default = "default_border")]
    pub border: String,
    #[serde(default = "default_text")]
    pub text: String,
    #[serde(default = "default_accent")]
    pub accent: String,
}

fn default_border() -> String {
    "#4a9a8a".to_string()
}

fn default_text() -> String {
    "#d4d4d4".to_string()
}

fn default_accent() -> String {
    "#e6b450".to_string()
}

impl Default for ThemeConfig {
    fn default() -> Self {
        Self {
            border: default_border(),
            text: default_text(),
            accent: default_accent(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub project: ProjectInfo,
    #[serde(default)]
    pub agent: AgentConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectInfo {
    #[serde(default)]
    pub name: String,
}

/// Project-over-global merge, resolved once at startup.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub username: String,
    pub default_runner: String,
    pub theme: ThemeConfig,
    pub project_name: String,
}

pub fn global_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".crewboard").join("config.toml"))
}

pub fn project_config_path() -> PathBuf {
    PathBuf::from(".crewboard").join("config.toml")
}

pub fn load() -> Config {
    let global = global_config_path()
        .and_then(|path| load_toml::<GlobalConfig>(&path))
        .unwrap_or_default();
    let project = load_toml::<ProjectConfig>(&project_config_path()).unwrap_or_default();
    merge(global, project)
}

fn merge(global: GlobalConfig, project: ProjectConfig) -> Config {
    let default_runner = first_non_empty(&[
        &project.agent.preferred,
        &project.agent.default,
        &global.agent.preferred,
        &global.agent.default,
    ])
    .unwrap_or("claude")
    .to_string();

    let username = if global.user.github_username.is_empty() {
        std::env::var("USER").unwrap_or_default()
    } else {
        global.user.github_username
    };

    Config {
        username,
        default_runner,
        theme: global.theme,
        project_name: project.project.name,
    }
}

fn first_non_empty<'a>(candidates: &[&'a String]) -> Option<&'a str> {
    candidates
        .iter()
        .map(|s| s.as_str())
        .find(|s| !s.is_empty())
}

fn load_toml<T: for<'de> Deserialize<'de>>(path: &Path) -> Option<T> {
    let data = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&data) {
        Ok(parsed) => Some(parsed),
        Err(err) => {
            eprintln!("warning: ignoring malformed config {}: {err}", path.display());
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_runner_overrides_global() {
        let global = GlobalConfig {
            agent: AgentConfig {
                default: "cursor".to_string(),
                preferred: String::new(),
            },
            ..Default::default()
        };
        let project = ProjectConfig {
            agent: AgentConfig {
                default: String::new(),
                preferred: "claude".to_string(),
            },
            ..Default::default()
        };
        assert_eq!(merge(global, project).default_runner, "claude");
    }

    #[test]
    fn runner_falls_back_to_claude() {
        let merged = merge(GlobalConfig::default(), ProjectConfig::default());
        assert_eq!(merged.default_runner, "claude");
    }

    #[test]
    fn configured_username_wins_over_env() {
        let global = GlobalConfig {
            user: UserConfig {
                github_username: "mira".to_string(),
            },
            ..Default::default()
        };
        assert_eq!(merge(global, ProjectConfig::default()).username, "mira");
    }

    #[test]
    fn theme_defaults_fill_missing_fields() {
        let parsed: GlobalConfig = toml::from_str("[theme]\nborder = \"#123456\"\n").unwrap();
        assert_eq!(parsed.theme.border, "#123456");
        assert_eq!(parsed.theme.text, "#d4d4d4");
    }
}
