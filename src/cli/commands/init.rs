//! `prjindex init` command - Initialize a library and its catalog

use console::style;
use miette::{IntoDiagnostic, Result};
use std::path::PathBuf;

use crate::core::catalog::CatalogStore;
use crate::core::config::ConfigFile;
use crate::core::layout::Library;
use crate::core::Config;

#[derive(clap::Args, Debug)]
pub struct InitArgs {
    /// Library root to initialize (default: current directory)
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Record this library as the default in the global config
    #[arg(long)]
    pub set_default: bool,
}

pub fn run(args: InitArgs) -> Result<()> {
    let path = if args.path.as_os_str() == "." {
        std::env::current_dir().into_diagnostic()?
    } else {
        args.path.clone()
    };

    let library = Library::init(&path)?;
    let store = CatalogStore::open(&library)?;
    let count = store.count()?;

    println!(
        "{} Initialized library at {}",
        style("✓").green(),
        style(library.root().display()).cyan()
    );
    println!("  catalog: {}", style(store.path().display()).dim());
    if !store.full_text() {
        println!(
            "  {} full-text search unavailable, using substring search",
            style("!").yellow()
        );
    }
    if count > 0 {
        println!("  {} project(s) already catalogued", style(count).cyan());
    }

    if args.set_default {
        let config_path = Config::global_config_path()
            .ok_or_else(|| miette::miette!("Could not determine the global config directory"))?;
        let mut file = ConfigFile::read(&config_path)?;
        file.library_root = Some(library.root().to_path_buf());
        file.write(&config_path)?;
        println!(
            "{} Set {} {} {}",
            style("✓").green(),
            style("library_root").cyan(),
            style("→").dim(),
            style(library.root().display()).yellow()
        );
    }

    println!();
    println!("Next steps:");
    println!("  {} Create your first project", style("prjindex new").yellow());
    println!(
        "  {} Index existing project folders",
        style("prjindex rebuild").yellow()
    );
    Ok(())
}
