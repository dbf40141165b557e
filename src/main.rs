use clap::Parser;
use miette::Result;
use prjindex::cli::{Cli, Commands, GlobalOpts};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // Reset SIGPIPE to default behavior (terminate silently) for proper Unix piping.
    // Without this, piping to `head`, `grep -q`, etc. causes a panic on broken pipe.
    #[cfg(unix)]
    {
        unsafe {
            libc::signal(libc::SIGPIPE, libc::SIG_DFL);
        }
    }
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(2)
                .tab_width(4)
                .build(),
        )
    }))?;

    let cli = Cli::parse();
    let global = cli.global;
    init_logging(&global);

    use prjindex::cli::commands::*;
    match cli.command {
        Commands::Init(args) => init::run(args),
        Commands::New(args) => new::run(args, &global),
        Commands::Edit(args) => edit::run(args, &global),
        Commands::Archive(args) => archive::run_archive(args, &global),
        Commands::Unarchive(args) => archive::run_unarchive(args, &global),
        Commands::Delete(args) => archive::run_delete(args, &global),
        Commands::Search(args) => search::run(args, &global),
        Commands::Show(args) => show::run(args, &global),
        Commands::Rebuild(args) => rebuild::run(args, &global),
        Commands::Sync(args) => rebuild::run_sync(args, &global),
        Commands::Pin(args) => pin::run_pin(args, &global, true),
        Commands::Unpin(args) => pin::run_pin(args, &global, false),
        Commands::Open(args) => pin::run_open(args, &global),
        Commands::Stats => stats::run(&global),
        Commands::Recent(args) => stats::run_recent(args, &global),
        Commands::Link(cmd) => link::run(cmd, &global),
        Commands::Config(cmd) => config::run(cmd, &global),
        Commands::Completions(args) => completions::run(args),
    }
}

/// Log to stderr so stdout stays pipeable. `PRJINDEX_LOG` takes an
/// `EnvFilter` directive; `-v` and `-q` override it.
fn init_logging(global: &GlobalOpts) {
    let filter = if global.verbose {
        EnvFilter::new("prjindex=debug")
    } else if global.quiet {
        EnvFilter::new("error")
    } else {
        EnvFilter::try_from_env("PRJINDEX_LOG").unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
