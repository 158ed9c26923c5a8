use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

/// packer-proxy-init - Install Packer plugins through mirrors and artifact proxies
#[derive(Parser)]
#[command(name = "packer-proxy-init")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Install the plugins required by the templates under PATH
    Install {
        /// Template file or directory of *.pkr.hcl files
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Reinstall plugins that are already installed
        #[arg(long)]
        force: bool,

        /// Base URL of the GitHub artifact proxy [env: PKR_INIT_GITHUB_SOURCE]
        #[arg(long)]
        github_source: Option<String>,

        /// Base URL of the releases mirror [env: PKR_INIT_RELEASES_SOURCE]
        #[arg(long)]
        releases_source: Option<String>,

        /// Plugin installation directory [env: PACKER_PLUGIN_PATH]
        #[arg(long)]
        plugin_dir: Option<PathBuf>,

        /// Config file (default: ~/.config/packer-proxy-init/config.toml)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Show installed plugins matching the templates under PATH
    List {
        /// Template file or directory of *.pkr.hcl files
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Plugin installation directory [env: PACKER_PLUGIN_PATH]
        #[arg(long)]
        plugin_dir: Option<PathBuf>,

        /// Config file (default: ~/.config/packer-proxy-init/config.toml)
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Install {
            path,
            force,
            github_source,
            releases_source,
            plugin_dir,
            config,
        } => commands::install::run(commands::install::InstallArgs {
            path,
            force,
            github_source,
            releases_source,
            plugin_dir,
            config,
        }),
        Commands::List {
            path,
            plugin_dir,
            config,
        } => commands::list::run(path, plugin_dir, config),
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

/// Log to stderr; RUST_LOG wins, otherwise DEBUG or -v raise the level
fn init_tracing(verbose: u8) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let debug_env = std::env::var("DEBUG").is_ok_and(|v| !v.is_empty());
    let level = match verbose {
        0 if debug_env => "debug",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(verbose >= 2),
        )
        .init();
}
