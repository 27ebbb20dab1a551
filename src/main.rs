use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};

use sightloc_lib::settings::ServiceSettings;

#[derive(Parser, Debug)]
#[command(name = "sightloc", version, about = "GPS-guided camera pose service")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct ConfigArg {
    /// JSON settings file; defaults apply when it does not exist
    #[arg(long, default_value = "sightloc.json")]
    config: PathBuf,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build the model of a sight from datasets/<sight>/images and register it
    CreateModel {
        #[arg(long)]
        sight: String,
        #[command(flatten)]
        config: ConfigArg,
    },
    /// Serve localization requests until Ctrl-C
    Serve {
        /// Answer every request against this sight instead of choosing by GPS
        #[arg(long)]
        sight: Option<String>,
        #[command(flatten)]
        config: ConfigArg,
    },
    /// List registered sights
    Sights {
        /// Print the sights and their reference images as JSON
        #[arg(long)]
        json: bool,
        #[command(flatten)]
        config: ConfigArg,
    },
    /// Write the effective settings (defaults plus overrides) to the config file
    InitConfig {
        #[command(flatten)]
        config: ConfigArg,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    sightloc_lib::init_logging();
    let cli = Cli::parse();

    match cli.command {
        Command::CreateModel { sight, config } => {
            let settings = ServiceSettings::load(&config.config)?;
            let created = sightloc_lib::create_model(settings, &sight).await?;
            println!(
                "{}: {} reference image(s), mean GPS ({:.6}, {:.6})",
                created.id,
                created.references.len(),
                created.gps.latitude,
                created.gps.longitude
            );
        }
        Command::Serve { sight, config } => {
            let settings = ServiceSettings::load(&config.config)?;
            sightloc_lib::run_server(settings, sight).await?;
        }
        Command::Sights { json, config } => {
            let settings = ServiceSettings::load(&config.config)?;
            let sights = sightloc_lib::list_sights(settings).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&sights)?);
                return Ok(());
            }
            for sight in sights {
                println!(
                    "{}\t({:.6}, {:.6})\t{} reference image(s)\tregistered {}",
                    sight.id,
                    sight.gps.latitude,
                    sight.gps.longitude,
                    sight.references.len(),
                    sight.registered_at.to_rfc3339()
                );
            }
        }
        Command::InitConfig { config } => {
            let settings = ServiceSettings::load(&config.config)?;
            settings.persist(&config.config)?;
            println!("wrote {}", config.config.display());
        }
    }

    Ok(())
}
