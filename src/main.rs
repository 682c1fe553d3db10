//! # Kobo Highlights CLI (`kh`)
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `kh ls [--all]` | List new (or all) highlights on the ereader |
//! | `kh import [SELECTION]` | Import highlights into the Markdown documents |
//! | `kh config show` | Print the current configuration |
//! | `kh config new` | Write a new configuration file |
//! | `kh completions <shell>` | Print shell completions |

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;

use kobo_highlights::config::{self, Config};
use kobo_highlights::importer::{self, Selector};
use kobo_highlights::lister;
use kobo_highlights::progress::ProgressMode;

/// Kobo Highlights: manage the highlights of your Kobo ereader and import
/// them into a human-friendly Markdown library.
#[derive(Parser)]
#[command(name = "kh", version, about)]
struct Cli {
    /// Path to the configuration file (TOML).
    ///
    /// Defaults to `kobo_highlights/config.toml` inside the platform
    /// configuration directory.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the highlights stored in the ereader.
    ///
    /// By default only highlights that have not been imported yet are shown.
    #[command(alias = "list")]
    Ls {
        /// Show every highlight, imported or not.
        #[arg(long)]
        all: bool,

        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Import highlights into the Markdown documents.
    ///
    /// Highlights that were already imported are always skipped.
    Import {
        /// `new` (default), `all`, a highlight id, a comma separated list of
        /// ids, a book title, or a book author.
        #[arg(conflicts_with_all = ["title", "author"])]
        selection: Option<String>,

        /// Import the highlights of the book with this exact title.
        #[arg(long, conflicts_with = "author")]
        title: Option<String>,

        /// Import the highlights of books by this author.
        #[arg(long)]
        author: Option<String>,

        /// Progress output on stderr. Defaults to `human` when stderr is a
        /// terminal, `off` otherwise.
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },

    /// Manage the program configuration.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Print shell completions.
    Completions {
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show the current configuration.
    Show,
    /// Create a new configuration and save it.
    New {
        /// Absolute path where the ereader is mounted.
        #[arg(long)]
        ereader_dir: PathBuf,
        /// Absolute path of the directory receiving the Markdown files.
        #[arg(long)]
        target_dir: PathBuf,
    },
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(config::default_config_path);

    // Commands that don't require config
    match &cli.command {
        Commands::Completions { shell } => {
            clap_complete::generate(*shell, &mut Cli::command(), "kh", &mut std::io::stdout());
            return Ok(());
        }
        Commands::Config {
            action: ConfigAction::New { ereader_dir, target_dir },
        } => {
            let cfg = Config::new(ereader_dir, target_dir);
            config::save_config(&cfg, &config_path)?;
            println!("Configuration saved to {}", config_path.display());
            return Ok(());
        }
        _ => {}
    }

    let cfg = config::load_config(&config_path)?;

    match cli.command {
        Commands::Ls { all, json } => {
            lister::run_list(&cfg, all, json).await?;
        }
        Commands::Import {
            selection,
            title,
            author,
            progress,
        } => {
            let selector = match (title, author) {
                (Some(title), _) => Selector::Title(title),
                (_, Some(author)) => Selector::Author(author),
                _ => Selector::parse(selection.as_deref().unwrap_or("new")),
            };
            let progress = progress.unwrap_or_else(ProgressMode::detect);
            importer::run_import(&cfg, &selector, progress)
                .await
                .with_context(|| format!("import {} failed", selector))?;
        }
        Commands::Config {
            action: ConfigAction::Show,
        } => {
            println!("{:<12} {}", "ereader_dir:", cfg.source_dir.display());
            println!("{:<12} {}", "target_dir:", cfg.target_dir.display());
            println!();
            println!("Configuration file: {}", config_path.display());
        }
        Commands::Config {
            action: ConfigAction::New { .. },
        }
        | Commands::Completions { .. } => {
            // Handled above (before config loading)
            unreachable!()
        }
    }

    Ok(())
}
