//! Configuration view and validation commands - `quill config`.

use anyhow::Result;
use std::path::Path;

use super::super::{Cli, ConfigCommands};

pub fn cmd_config(cli: &Cli, project_dir: &Path, command: Option<ConfigCommands>) -> Result<()> {
    use quill::config::Config;
    use quill::pipeline::PromptTemplates;
    use quill::quill_config::{CONFIG_FILE_NAME, QuillToml};

    let config_path = project_dir.join(CONFIG_FILE_NAME);

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Quill Configuration");
            println!("===================");
            println!();

            if config_path.exists() {
                println!("Config file: {}", config_path.display());
            } else {
                println!("No quill.toml found at {}", config_path.display());
                println!("Using defaults. Run 'quill config init' to create one.");
            }
            println!();

            let config = Config::new(
                project_dir.to_path_buf(),
                cli.output_dir.clone(),
                cli.verbose,
                cli.yes,
            )?;
            println!("Effective values (with env/CLI overrides):");
            println!();
            print!("{}", toml::to_string_pretty(&config.toml)?);
            println!();
            println!("Output directory: {}", config.output_base.display());
            println!("Credentials: {:?}", config.secrets);
            println!();
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            let config = Config::new(
                project_dir.to_path_buf(),
                cli.output_dir.clone(),
                cli.verbose,
                cli.yes,
            )?;
            let warnings = config.validate();

            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("quill.toml already exists at {}", config_path.display());
                println!("Delete it first if you want to recreate it.");
            } else {
                std::fs::create_dir_all(project_dir)?;
                QuillToml::default().save(&config_path)?;
                println!("Created quill.toml at {}", config_path.display());
            }

            for path in PromptTemplates::default().export(project_dir)? {
                println!("Created {}", path.display());
            }
            println!();
            println!("You can now customize:");
            println!("  - [pipeline] critique passes, rejection limit, acts, chapter length");
            println!("  - [generation] and [writer] for the two model backends");
            println!("  - prompts/*.md for genre rules, style guide and critique");
            println!();
        }
    }

    Ok(())
}
