// Import necessary libraries and modules for file I/O and serialization.
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::category::{CategoryPreferences, DEV_ACCOUNT};
use crate::retry::{DEFAULT_MAX_ATTEMPTS, RetryPolicy};

pub const SETTINGS_PATH: &str = "./data/settings.json";

// Environment variables that override the file settings.
pub const AGENT_PROGRAM_ENV: &str = "BET_AGENT_PROGRAM";
pub const AGENT_DIR_ENV: &str = "BET_AGENT_DIR";
pub const USER_ID_ENV: &str = "BET_USER_ID";

// External agent binary invoked by the command backend.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct AgentCommand {
    pub program: String,
    pub args: Vec<String>,      // Arguments placed before the prompt.
    pub working_dir: Option<PathBuf>,
}

impl Default for AgentCommand {
    fn default() -> Self {
        AgentCommand {
            program: "adk".to_string(),
            args: vec!["run".to_string(), ".".to_string(), "--prompt".to_string()],
            working_dir: None,
        }
    }
}

// Define a structure to hold application settings with serialization and deserialization capabilities.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub app_name: String,
    pub user_id: String,         // Address the session is created for.
    pub max_attempts: u32,       // Generation attempts per proposal.
    pub attempt_timeout_secs: u64,
    pub backoff_base_ms: u64,
    pub backoff_cap_ms: u64,
    pub agent: AgentCommand,
    pub categories: CategoryPreferences,
    pub debug_mode: bool,        // Flag to enable or disable debug logging.
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            app_name: "Make Bet".to_string(),
            user_id: DEV_ACCOUNT.to_string(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            attempt_timeout_secs: 60,
            backoff_base_ms: 500,
            backoff_cap_ms: 8_000,
            agent: AgentCommand::default(),
            categories: CategoryPreferences::default(),
            debug_mode: false,
        }
    }
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    // Load settings from the default file path.
    pub fn load() -> io::Result<Self> {
        Self::load_settings_from_file(SETTINGS_PATH)
    }

    // Save current settings to the default file path.
    pub fn save(&self) -> io::Result<()> {
        self.save_to_file(SETTINGS_PATH)
    }

    pub fn load_settings_from_file(path: impl AsRef<Path>) -> io::Result<Self> {
        let data = fs::read_to_string(path)?;
        let settings = serde_json::from_str(&data)?;
        Ok(settings)
    }

    // Missing file means defaults; any other failure is reported.
    pub fn load_or_default(path: impl AsRef<Path>) -> io::Result<Self> {
        match Self::load_settings_from_file(path) {
            Ok(settings) => Ok(settings),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e),
        }
    }

    pub fn save_to_file(&self, path: impl AsRef<Path>) -> io::Result<()> {
        let path = path.as_ref();
        let data = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?; // Create the directory if it doesn't exist.
        }
        let mut file = fs::File::create(path)?;
        file.write_all(data.as_bytes())?;
        Ok(())
    }

    pub fn apply_env_overrides(self) -> Self {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    // Applies overrides from any key lookup; empty values are ignored.
    pub fn apply_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        if let Some(program) = lookup(AGENT_PROGRAM_ENV) {
            self.agent.program = program;
        }
        if let Some(dir) = lookup(AGENT_DIR_ENV) {
            self.agent.working_dir = Some(PathBuf::from(dir));
        }
        if let Some(user_id) = lookup(USER_ID_ENV) {
            self.user_id = user_id;
        }
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            attempt_timeout: Duration::from_secs(self.attempt_timeout_secs),
            backoff_base: Duration::from_millis(self.backoff_base_ms),
            backoff_cap: Duration::from_millis(self.backoff_cap_ms),
        }
    }
}
