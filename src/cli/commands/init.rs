//! Implementation of the `cadence init` command.

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use tokio::fs;

use crate::adapters::sqlite::initialize_database;
use crate::cli::output::{output, CommandOutput, OutputFormat};
use crate::domain::models::{CadenceConfig, StorageSettings};

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Force reinitialization even if already initialized
    #[arg(long, short)]
    pub force: bool,

    /// Target directory (defaults to current directory)
    #[arg(default_value = ".")]
    pub path: PathBuf,
}

#[derive(Debug, serde::Serialize)]
pub struct InitOutput {
    pub success: bool,
    pub message: String,
    pub initialized_path: PathBuf,
    pub directories_created: Vec<String>,
    pub config_written: bool,
    pub database_initialized: bool,
}

impl CommandOutput for InitOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![self.message.clone()];
        if !self.directories_created.is_empty() {
            lines.push("\nCreated directories:".to_string());
            for dir in &self.directories_created {
                lines.push(format!("  - {dir}"));
            }
        }
        if self.config_written {
            lines.push("\nDefault configuration written to .cadence/config.yaml".to_string());
        }
        if self.database_initialized {
            lines.push("Database initialized at .cadence/cadence.db".to_string());
        }
        lines.join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub async fn execute(args: InitArgs, format: OutputFormat) -> Result<()> {
    let target_path = if args.path.is_absolute() {
        args.path.clone()
    } else {
        std::env::current_dir()
            .context("Failed to get current directory")?
            .join(&args.path)
    };

    let cadence_dir = target_path.join(".cadence");

    // Check if already initialized
    if cadence_dir.exists() && !args.force {
        let output_data = InitOutput {
            success: false,
            message: "Project already initialized. Use --force to reinitialize.".to_string(),
            initialized_path: target_path,
            directories_created: vec![],
            config_written: false,
            database_initialized: false,
        };
        output(&output_data, format);
        return Ok(());
    }

    // If forcing, remove existing state including the database
    if args.force && cadence_dir.exists() {
        fs::remove_dir_all(&cadence_dir)
            .await
            .context("Failed to remove existing .cadence directory")?;
    }

    let mut directories_created = vec![];
    for dir in [cadence_dir.clone(), cadence_dir.join("logs")] {
        if !dir.exists() {
            fs::create_dir_all(&dir)
                .await
                .with_context(|| format!("Failed to create {}", dir.display()))?;
            let relative = dir
                .strip_prefix(&target_path)
                .unwrap_or(&dir)
                .to_string_lossy()
                .to_string();
            directories_created.push(relative);
        }
    }

    // Write the default configuration so there is a file to edit
    let config_yaml = serde_yaml::to_string(&CadenceConfig::default())
        .context("Failed to serialize default configuration")?;
    fs::write(cadence_dir.join("config.yaml"), config_yaml)
        .await
        .context("Failed to write .cadence/config.yaml")?;

    // Initialize the database with the embedded migrations
    let storage = StorageSettings {
        database_url: format!("sqlite://{}", cadence_dir.join("cadence.db").display()),
        ..StorageSettings::default()
    };
    initialize_database(&storage)
        .await
        .context("Failed to initialize database")?;

    let output_data = InitOutput {
        success: true,
        message: if args.force {
            "Project reinitialized successfully.".to_string()
        } else {
            "Project initialized successfully.".to_string()
        },
        initialized_path: target_path,
        directories_created,
        config_written: true,
        database_initialized: true,
    };
    output(&output_data, format);

    Ok(())
}
