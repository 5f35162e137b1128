use clap::{Parser, Subcommand};

use attsync::storage::repository;
use attsync::sync::{entities, watermark};
use attsync::{AttSync, Config, SyncStatus};

#[derive(Parser)]
#[command(name = "attsync", about = "Attendance data synchronizer CLI")]
struct Cli {
    /// Configuration file path
    #[arg(long, default_value = "attsync.json")]
    config: String,

    /// Database path (overrides the configuration file)
    #[arg(long)]
    db: Option<String>,

    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one inbound sync pass and exit
    Sync {
        /// Output the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run continuously: periodic sync plus the audit poll
    Run,
    /// Drain the outbound attendance audit queue
    Audit {
        /// Keep polling instead of draining once
        #[arg(long)]
        watch: bool,
    },
    /// Show local row counts and the pending audit backlog
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let mut config = Config::from_file(&cli.config)?;
    if let Some(db) = &cli.db {
        config.database.path = Some(db.into());
    }
    let app = AttSync::connect(config).await?;

    match cli.command {
        Commands::Sync { json } => {
            let report = app.sync_once().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_sync_report(&report);
            }
            if report.status == SyncStatus::Failed {
                std::process::exit(1);
            }
        }
        Commands::Run => {
            eprintln!("attsync running; Ctrl-C to stop");
            app.run().await;
        }
        Commands::Audit { watch } => {
            if watch {
                eprintln!("polling audit queue; Ctrl-C to stop");
                app.run_audit_loop().await;
            } else {
                let report = app.drain_audit().await?;
                println!(
                    "audit drain: {} sent, {} skipped, {} failed",
                    report.sent, report.skipped, report.failed
                );
            }
        }
        Commands::Status => {
            print_status(&app).await?;
        }
    }

    Ok(())
}

fn print_sync_report(report: &attsync::SyncReport) {
    println!("status: {:?}", report.status);
    for entity in &report.entities {
        println!(
            "  {:<28} created {:>4} ({} skipped, {} errors)  updated {:>4} ({} skipped, {} errors)",
            entity.entity,
            entity.created.success,
            entity.created.skipped,
            entity.created.errors,
            entity.updated.success,
            entity.updated.skipped,
            entity.updated.errors,
        );
    }
    if report.watermark_advanced {
        println!("watermark advanced");
    }
}

async fn print_status(app: &AttSync) -> anyhow::Result<()> {
    let (counts, pending) = app
        .db()
        .reader()
        .call(|conn| {
            let mut counts = Vec::new();
            for mapping in entities::DISPATCH_ORDER {
                counts.push((mapping.table, repository::table_count(conn, mapping.table)?));
            }
            counts.push((
                entities::ROOM.table,
                repository::table_count(conn, entities::ROOM.table)?,
            ));
            let pending = repository::unsynced_audit_count(conn)?;
            Ok::<_, rusqlite::Error>((counts, pending))
        })
        .await?;

    println!("Local tables:");
    for (table, count) in counts {
        println!("  {table:<36} {count:>8}");
    }
    println!("Pending audit entries: {pending}");
    match watermark::load_last_sync(&app.config().server.status_file) {
        Some(wm) => println!("Last sync: {wm}"),
        None => println!("Last sync: never"),
    }
    Ok(())
}
