//! Point d'entrée CLI pour dl-package

use anyhow::Result;
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::{fmt, EnvFilter};

// Charger .env au démarrage
fn load_env() {
    // Chercher .env dans le répertoire courant ou parent
    if dotenvy::dotenv().is_err() {
        // Essayer depuis le répertoire du binaire
        if let Ok(exe) = std::env::current_exe() {
            if let Some(dir) = exe.parent() {
                let _ = dotenvy::from_path(dir.join(".env"));
            }
        }
    }
}

mod cli;

use cli::{Commands, PackageArgs};

/// Packager les sorties designated lands en Shapefiles zippés
#[derive(Parser)]
#[command(name = "dl-package")]
#[command(author, version)]
#[command(about = "Packager le GeoPackage designated lands en Shapefiles zippés (défaut) ou vérifier la source")]
#[command(long_about = "Exporte les tables designated lands d'un GeoPackage en Shapefile avec colonnes renommées et index spatiaux .qix, puis produit un dossier daté contenant uniquement l'archive Shapefile et le GeoPackage zippé.\n\nUtilisez 'check' pour vérifier la source sans rien écrire.")]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    /// Augmenter la verbosité (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Mode silencieux
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Sous-commande (défaut: packaging)
    #[command(subcommand)]
    command: Option<Commands>,

    /// Arguments du packaging (commande par défaut)
    #[command(flatten)]
    package: PackageArgs,
}

fn main() -> Result<()> {
    // Charger .env avant tout
    load_env();

    let cli = Cli::parse();

    // Configurer le logging
    init_logging(cli.verbose, cli.quiet);

    match cli.command {
        Some(Commands::Check { source }) => {
            info!(config = %source.config, "Checking source");
            cli::cmd_check(&source)?;
        }
        None => {
            info!(config = %cli.package.source.config, "Packaging outputs");
            cli::cmd_package(&cli.package)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => Level::WARN,
        (_, 0) => Level::INFO,
        (_, 1) => Level::DEBUG,
        (_, _) => Level::TRACE,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .init();
}
