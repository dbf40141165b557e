//! `prjindex config` command - Configuration management
//!
//! Shows the merged configuration and edits the global config file.

use clap::Subcommand;
use console::style;
use miette::Result;
use std::path::{Path, PathBuf};

use crate::cli::helpers::print_json;
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::catalog::ResourceKind;
use crate::core::config::ConfigFile;
use crate::core::Config;

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show the effective configuration and where it came from
    Show,

    /// Set the default library root
    SetLibrary(SetLibraryArgs),

    /// Add a scan root for a resource family
    AddRoot(RootArgs),

    /// Remove a scan root from a resource family
    RemoveRoot(RootArgs),
}

#[derive(clap::Args, Debug)]
pub struct SetLibraryArgs {
    pub path: PathBuf,
}

#[derive(clap::Args, Debug)]
pub struct RootArgs {
    /// Resource family (inspection, shared-folder)
    pub kind: ResourceKind,

    pub path: PathBuf,
}

/// Run a config subcommand
pub fn run(cmd: ConfigCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        ConfigCommands::Show => run_show(global),
        ConfigCommands::SetLibrary(args) => run_set_library(args),
        ConfigCommands::AddRoot(args) => run_edit_root(args, true),
        ConfigCommands::RemoveRoot(args) => run_edit_root(args, false),
    }
}

fn global_config_path() -> Result<PathBuf> {
    Config::global_config_path()
        .ok_or_else(|| miette::miette!("Could not determine the global config directory"))
}

fn run_show(global: &GlobalOpts) -> Result<()> {
    let config = Config::load(global.library.as_deref());

    if global.format == OutputFormat::Json {
        return print_json(&serde_json::json!({
            "library_root": config.library_root,
            "inspection_roots": config.inspection_roots,
            "shared_drive_roots": config.shared_drive_roots,
            "preset_tags": config.preset_tags,
            "search_limit": config.search_limit,
            "rebuild_batch_size": config.rebuild_batch_size,
        }));
    }

    println!("{}", style("Effective Configuration").bold().underlined());
    println!();
    print_value(
        "library_root",
        config.library_root.as_deref().map(Path::display).map(|d| d.to_string()),
    );
    print_list("inspection_roots", &config.inspection_roots);
    print_list("shared_drive_roots", &config.shared_drive_roots);
    if !config.preset_tags.is_empty() {
        print_value("preset_tags", Some(config.preset_tags.join(", ")));
    }
    print_value("search_limit", Some(config.search_limit.to_string()));
    print_value("rebuild_batch_size", Some(config.rebuild_batch_size.to_string()));

    println!();
    println!("{}", style("Config Sources (in priority order):").dim());
    println!("  1. --library flag");
    println!("  2. Environment variable (PRJINDEX_LIBRARY)");
    println!("  3. Library config (<library>/.pm_system/config.yaml)");
    match Config::global_config_path() {
        Some(path) => println!("  4. Global config ({})", path.display()),
        None => println!("  4. Global config (unavailable)"),
    }
    Ok(())
}

fn print_value(key: &str, value: Option<String>) {
    match value {
        Some(v) => println!("  {} = {}", style(key).cyan(), v),
        None => println!("  {} = {}", style(key).cyan(), style("(not set)").dim()),
    }
}

fn print_list(key: &str, values: &[PathBuf]) {
    if values.is_empty() {
        print_value(key, None);
        return;
    }
    println!("  {}:", style(key).cyan());
    for value in values {
        println!("    - {}", value.display());
    }
}

fn run_set_library(args: SetLibraryArgs) -> Result<()> {
    let root = std::fs::canonicalize(&args.path).unwrap_or_else(|_| args.path.clone());
    if !root.is_dir() {
        return Err(miette::miette!("{} is not a directory", root.display()));
    }
    let path = global_config_path()?;
    let mut file = ConfigFile::read(&path)?;
    file.library_root = Some(root.clone());
    file.write(&path)?;
    println!(
        "{} Set {} {} {}",
        style("✓").green(),
        style("library_root").cyan(),
        style("→").dim(),
        style(root.display()).yellow()
    );
    Ok(())
}

fn run_edit_root(args: RootArgs, add: bool) -> Result<()> {
    let path = global_config_path()?;
    let mut file = ConfigFile::read(&path)?;
    let roots = match args.kind {
        ResourceKind::Inspection => file.inspection_roots.get_or_insert_with(Vec::new),
        ResourceKind::SharedFolder => file.shared_drive_roots.get_or_insert_with(Vec::new),
    };

    let changed = if add {
        if roots.contains(&args.path) {
            false
        } else {
            roots.push(args.path.clone());
            true
        }
    } else {
        let before = roots.len();
        roots.retain(|r| r != &args.path);
        roots.len() != before
    };

    if !changed {
        let state = if add { "already" } else { "not" };
        println!(
            "{} {} is {} a {} root",
            style("!").yellow(),
            args.path.display(),
            state,
            args.kind
        );
        return Ok(());
    }

    file.write(&path)?;
    let verb = if add { "Added" } else { "Removed" };
    println!(
        "{} {} {} root {}",
        style("✓").green(),
        verb,
        args.kind,
        style(args.path.display()).yellow()
    );
    Ok(())
}
