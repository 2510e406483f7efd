use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const CONFIG_FILE_NAME: &str = ".timesheet.json";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ThemePreference {
    #[default]
    Terminal,
    Light,
    Dark,
}

impl ThemePreference {
    pub fn next(self) -> Self {
        match self {
            ThemePreference::Terminal => ThemePreference::Light,
            ThemePreference::Light => ThemePreference::Dark,
            ThemePreference::Dark => ThemePreference::Terminal,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ThemePreference::Terminal => "terminal",
            ThemePreference::Light => "light",
            ThemePreference::Dark => "dark",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<ThemePreference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog_file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_employee: Option<String>,
}

fn config_path() -> Option<PathBuf> {
    let mut path = dirs::home_dir()?;
    path.push(CONFIG_FILE_NAME);
    Some(path)
}

pub fn read_config() -> Option<Config> {
    read_config_from(&config_path()?)
}

pub fn write_config(config: &Config) -> Result<(), io::Error> {
    let path = config_path()
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "Home directory not found"))?;
    write_config_to(&path, config)
}

/// Missing or unreadable config reads as `None`; callers fall back to defaults.
pub fn read_config_from(path: &Path) -> Option<Config> {
    let contents = fs::read_to_string(path).ok()?;
    serde_json::from_str(&contents).ok()
}

pub fn write_config_to(path: &Path, config: &Config) -> Result<(), io::Error> {
    let json = serde_json::to_string_pretty(config)
        .map_err(|err| io::Error::new(io::ErrorKind::Other, err.to_string()))?;
    fs::write(path, json)
}

pub fn write_theme(theme: ThemePreference) -> Result<(), io::Error> {
    let mut config = read_config().unwrap_or_default();
    config.theme = Some(theme);
    write_config(&config)
}

pub fn write_last_employee(employee: &str) -> Result<(), io::Error> {
    let mut config = read_config().unwrap_or_default();
    config.last_employee = Some(employee.to_string());
    write_config(&config)
}
