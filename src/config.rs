//! Configuration file support for guisplit
//!
//! This module provides support for loading configuration from `.guisplit.toml` files,
//! allowing users to store project-specific analysis settings.
//!
//! # Example Configuration
//!
//! ```toml
//! [analysis]
//! max_solutions = 64
//! refactor = true
//! as_lambda = true
//!
//! [toolkit]
//! widget_prefixes = ["javax.swing.J", "com.acme.ui."]
//!
//! [[toolkit.listeners]]
//! name = "com.acme.ui.ClickListener"
//! event_type = "com.acme.ui.ClickEvent"
//! methods = ["clicked"]
//!
//! [output]
//! directory = "split"
//! print = false
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::conditions::DEFAULT_MAX_SOLUTIONS;
use crate::toolkit::{
    default_action_command_methods, default_listener_packages, default_widget_classes,
    default_widget_prefixes,
};

/// Name of the configuration file looked up from the working directory.
pub const CONFIG_FILE_NAME: &str = ".guisplit.toml";

/// Main configuration structure loaded from `.guisplit.toml`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Config {
    /// Analysis and refactoring settings
    pub analysis: AnalysisConfig,

    /// Widget and listener knowledge
    pub toolkit: ToolkitConfig,

    /// Output settings
    pub output: OutputConfig,
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the `.guisplit.toml` file
    ///
    /// # Returns
    ///
    /// A `Config` instance loaded from the file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref()).with_context(|| {
            format!(
                "Failed to read configuration file {}",
                path.as_ref().display()
            )
        })?;
        let config: Config =
            toml::from_str(&contents).context("Failed to parse TOML configuration")?;
        Ok(config)
    }

    /// Try to load configuration from the current directory or its parents
    ///
    /// # Returns
    ///
    /// A `Config` instance if found, otherwise returns the default configuration
    pub fn load_from_current_dir() -> Self {
        Self::find_and_load(".").unwrap_or_default()
    }

    /// Find and load configuration file starting from a given directory
    ///
    /// Walks up the directory tree until a `.guisplit.toml` is found or the
    /// root is reached. An unreadable file counts as not found.
    pub fn find_and_load<P: AsRef<Path>>(start_dir: P) -> Option<Self> {
        let mut current_dir = start_dir.as_ref().to_path_buf();

        loop {
            let config_path = current_dir.join(CONFIG_FILE_NAME);
            if config_path.exists() {
                return match Self::from_file(&config_path) {
                    Ok(config) => Some(config),
                    Err(err) => {
                        tracing::warn!("ignoring {}: {:#}", config_path.display(), err);
                        None
                    }
                };
            }

            if !current_dir.pop() {
                break;
            }
        }

        None
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_string =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;
        fs::write(path.as_ref(), toml_string).context("Failed to write configuration file")?;
        Ok(())
    }

    /// Merge command-line arguments with configuration file settings
    ///
    /// Command-line arguments take precedence over configuration file settings.
    pub fn merge_with_args(
        &mut self,
        refactor: Option<bool>,
        as_lambda: Option<bool>,
        output: Option<PathBuf>,
        print: Option<bool>,
    ) {
        if let Some(refactor) = refactor {
            self.analysis.refactor = refactor;
        }
        if let Some(as_lambda) = as_lambda {
            self.analysis.as_lambda = as_lambda;
        }
        if let Some(output) = output {
            self.output.directory = Some(output);
        }
        if let Some(print) = print {
            self.output.print = print;
        }
    }
}

/// Analysis settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Cap on the alternative assignments of one guard before it is kept as
    /// a single atom
    pub max_solutions: usize,

    /// Whether to inline local helper methods called by commands
    pub inline_local_dispatch: bool,

    /// Whether to split listeners after attribution
    pub refactor: bool,

    /// Build closures rather than anonymous classes when splitting
    pub as_lambda: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            max_solutions: DEFAULT_MAX_SOLUTIONS,
            inline_local_dispatch: true,
            refactor: false,
            as_lambda: false,
        }
    }
}

/// Extra listener interface declared in the configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenerSpec {
    /// Qualified interface name
    pub name: String,

    /// Event type received by every callback
    pub event_type: String,

    /// Callback names
    pub methods: Vec<String>,
}

/// Widget and listener tables
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolkitConfig {
    /// Qualified names of widget classes that do not match a prefix
    pub widget_classes: Vec<String>,

    /// Qualified-name prefixes of widget classes (`javax.swing.J`)
    pub widget_prefixes: Vec<String>,

    /// Packages whose `*Listener` interfaces are listeners
    pub listener_packages: Vec<String>,

    /// Methods setting the command name of a widget
    pub action_command_methods: Vec<String>,

    /// Listener interfaces added to (or replacing entries of) the built-in table
    pub listeners: Vec<ListenerSpec>,
}

impl Default for ToolkitConfig {
    fn default() -> Self {
        Self {
            widget_classes: default_widget_classes(),
            widget_prefixes: default_widget_prefixes(),
            listener_packages: default_listener_packages(),
            action_command_methods: default_action_command_methods(),
            listeners: Vec::new(),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory receiving refactored models; models are rewritten in place
    /// when unset
    pub directory: Option<PathBuf>,

    /// Print refactored classes to stdout
    pub print: bool,

    /// Print the attribution report as JSON instead of text
    pub json: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.analysis.max_solutions, DEFAULT_MAX_SOLUTIONS);
        assert!(!config.analysis.refactor);
        assert!(!config.analysis.as_lambda);
        assert!(config
            .toolkit
            .action_command_methods
            .contains(&"setActionCommand".to_string()));
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_string = toml::to_string(&config).unwrap();
        assert!(toml_string.contains("max_solutions"));
        assert!(toml_string.contains("widget_prefixes"));
    }

    #[test]
    fn test_config_deserialization() {
        let toml_str = r#"
            [analysis]
            max_solutions = 8
            refactor = true
            as_lambda = false

            [toolkit]
            widget_prefixes = ["com.acme.ui."]

            [[toolkit.listeners]]
            name = "com.acme.ui.ClickListener"
            event_type = "com.acme.ui.ClickEvent"
            methods = ["clicked"]

            [output]
            print = true
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.analysis.max_solutions, 8);
        assert!(config.analysis.refactor);
        assert!(!config.analysis.as_lambda);
        assert!(config.analysis.inline_local_dispatch);
        assert_eq!(config.toolkit.widget_prefixes, vec!["com.acme.ui.".to_string()]);
        // Sections left out keep their defaults.
        assert_eq!(config.toolkit.listener_packages, default_listener_packages());
        assert_eq!(config.toolkit.listeners[0].methods, vec!["clicked".to_string()]);
        assert!(config.output.print);
        assert_eq!(config.output.directory, None);
    }

    #[test]
    fn test_config_merge_with_args() {
        let mut config = Config::default();
        config.merge_with_args(Some(true), Some(true), Some(PathBuf::from("out")), None);

        assert!(config.analysis.refactor);
        assert!(config.analysis.as_lambda);
        assert_eq!(config.output.directory, Some(PathBuf::from("out")));
        assert!(!config.output.print);
    }

    #[test]
    fn test_config_save_and_load() {
        let temp_dir = env::temp_dir();
        let config_path = temp_dir.join("test_guisplit.toml");

        let mut config = Config::default();
        config.analysis.max_solutions = 12;
        config.save_to_file(&config_path).unwrap();

        let loaded_config = Config::from_file(&config_path).unwrap();
        assert_eq!(loaded_config.analysis.max_solutions, 12);

        let _ = fs::remove_file(config_path);
    }

    #[test]
    fn test_find_and_load_walks_up() {
        let root = env::temp_dir().join("guisplit_find_and_load");
        let nested = root.join("a").join("b");
        fs::create_dir_all(&nested).unwrap();
        fs::write(root.join(CONFIG_FILE_NAME), "[analysis]\nrefactor = true\n").unwrap();

        let config = Config::find_and_load(&nested).unwrap();
        assert!(config.analysis.refactor);

        let _ = fs::remove_dir_all(root);
    }
}
