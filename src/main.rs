use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use log::info;

use cellmapper_lib::{utils::logging::init_logging, SamplingSettings, SettingsStore, TimeSeriesStore};

const DB_FILE_NAME: &str = "CellMapper.sqlite3";
const SETTINGS_FILE_NAME: &str = "settings.json";

#[derive(Parser, Debug)]
#[command(name = "cellmapper")]
#[command(about = "Inspect and export the cellmapper sample store", long_about = None)]
struct Args {
    /// Directory holding the sample database and settings
    #[arg(long, default_value = "cellmapper_data")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Newest entry, row count and the newest row
    Status,
    /// Dump every row as `;`-delimited text
    Export {
        /// Directory the export name is resolved against
        #[arg(long, default_value = ".")]
        root: PathBuf,

        /// Overrides the configured export name
        #[arg(long)]
        name: Option<String>,
    },
    /// Print sampling settings, applying any given overrides first
    Settings {
        #[arg(long)]
        sleep_secs: Option<u64>,

        #[arg(long)]
        active_secs: Option<u64>,

        #[arg(long)]
        interval_secs: Option<u64>,

        #[arg(long)]
        distance_m: Option<u64>,

        #[arg(long)]
        export_name: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let args = Args::parse();

    let settings = SettingsStore::new(args.data_dir.join(SETTINGS_FILE_NAME))?;
    let store = TimeSeriesStore::new(args.data_dir.join(DB_FILE_NAME));

    let result = run(args.command, &store, &settings).await;
    store.close();
    result
}

async fn run(command: Command, store: &TimeSeriesStore, settings: &SettingsStore) -> Result<()> {
    match command {
        Command::Status => {
            println!("{}", store.status_report().await?);
        }
        Command::Export { root, name } => {
            let name = name.unwrap_or_else(|| settings.sampling().export_name);
            let destination = root.join(name);
            let total = store.row_count().await?;

            info!("exporting {total} rows to {}", destination.display());
            let outcome = store
                .dump_all(destination.clone(), move |written| {
                    println!("{written}/{total} rows written");
                })
                .await;

            if outcome.complete {
                println!("Exported {} rows to {}", outcome.rows_written, destination.display());
            } else {
                anyhow::bail!(
                    "export to {} stopped after {} rows",
                    destination.display(),
                    outcome.rows_written
                );
            }
        }
        Command::Settings {
            sleep_secs,
            active_secs,
            interval_secs,
            distance_m,
            export_name,
        } => {
            let current = settings.sampling();
            let updated = SamplingSettings {
                sleep_between_measures_secs: sleep_secs
                    .unwrap_or(current.sleep_between_measures_secs),
                update_duration_secs: active_secs.unwrap_or(current.update_duration_secs),
                min_location_time_secs: interval_secs.unwrap_or(current.min_location_time_secs),
                min_location_distance_m: distance_m.unwrap_or(current.min_location_distance_m),
                export_name: export_name.unwrap_or_else(|| current.export_name.clone()),
            };

            if updated != current {
                settings.update_sampling(updated.clone())?;
            }
            println!("{}", serde_json::to_string_pretty(&updated)?);
        }
    }

    Ok(())
}
