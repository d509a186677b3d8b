// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::{Path, PathBuf};

use fsx_csi_core::domain::node_config::{DriverConfig, ProviderConfig, CONFIG_PATH_ENV};

use crate::daemon::ServeOverrides;

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show effective configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate sample configuration
    Generate {
        /// Output path (default: ./fsx-csi.yaml)
        #[arg(short, long, default_value = "./fsx-csi.yaml")]
        output: PathBuf,

        /// Include examples and comments
        #[arg(long)]
        examples: bool,
    },
}

pub async fn handle_command(
    command: &ConfigCommand,
    config_override: Option<PathBuf>,
    overrides: &ServeOverrides,
) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, overrides, *paths),
        ConfigCommand::Validate { file } => {
            validate(file.clone().or(config_override), overrides)
        }
        ConfigCommand::Generate { output, examples } => generate(output, *examples),
    }
}

fn show(config_override: Option<PathBuf>, overrides: &ServeOverrides, show_paths: bool) -> Result<()> {
    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        match &config_override {
            Some(path) => println!("  1. --config flag: {}", path.display()),
            None => println!("  1. --config flag: {}", "(not set)".dimmed()),
        }
        println!(
            "  2. {}: {}",
            CONFIG_PATH_ENV,
            std::env::var(CONFIG_PATH_ENV)
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./fsx-csi.yaml");
        println!("  4. /etc/fsx-csi/config.yaml");
        println!();
    }

    let mut config = DriverConfig::load_or_default(config_override)
        .context("Failed to load configuration")?;
    overrides.apply(&mut config);
    let spec = &config.spec;

    println!("{}", "Effective configuration:".bold());
    println!();

    println!("{}", "Endpoint:".bold());
    println!("  Address: {}", spec.endpoint);
    println!("  Mode: {:?}", spec.mode);
    println!("  Key policy: {:?}", spec.key_policy);
    println!();

    println!("{}", "Node:".bold());
    println!(
        "  ID: {}",
        spec.node.id.as_deref().unwrap_or("(instance metadata)")
    );
    if let Some(region) = &spec.node.region {
        println!("  Region: {}", region);
    }
    if let Some(zone) = &spec.node.zone {
        println!("  Zone: {}", zone);
    }
    println!();

    println!("{}", "Provider:".bold());
    match &spec.provider {
        ProviderConfig::Memory => println!("  Type: memory"),
        ProviderConfig::Local { base_path } => {
            println!("  Type: local");
            println!("  Base path: {}", base_path.display());
        }
    }
    println!();

    println!("{}", "Mount:".bold());
    println!("  Filesystem type: {}", spec.mount.fs_type);
    if !spec.mount.default_options.is_empty() {
        println!("  Default options: {}", spec.mount.default_options.join(","));
    }
    println!();

    Ok(())
}

fn validate(config_path: Option<PathBuf>, overrides: &ServeOverrides) -> Result<()> {
    println!("Validating configuration...");

    crate::daemon::server::load_config(config_path, overrides)?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

fn generate(output: &Path, with_examples: bool) -> Result<()> {
    let sample = sample_config(with_examples);

    std::fs::write(output, sample)
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}

fn sample_config(with_examples: bool) -> &'static str {
    if with_examples {
        include_str!("../../templates/config-with-examples.yaml")
    } else {
        include_str!("../../templates/config-minimal.yaml")
    }
}
