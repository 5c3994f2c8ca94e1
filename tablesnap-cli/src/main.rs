/*!
tablesnap CLI - back up, restore and compare DynamoDB tables.

Backups are written as JSON arrays into a local directory. With `--report`,
each backup is compared against the previous snapshot of the same base name
and the changed records are written to `reports/`.
*/

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::Value;
use tablesnap_core::config::DEFAULT_ORDERING_FIELD;
use tablesnap_core::metadata::parse_snapshot_file_name;
use tablesnap_core::observability::{gather_metrics, init_observability};
use tablesnap_core::{
    diff_snapshot_files, BackupEngine, BackupRequest, ChangeReport, DiffConfig,
    DynamoDbRecordStore, FieldComparisonPolicy, MatchMode, ReportFormat, ReportOutcome,
    ReportWriter, SnapshotSelector, StoreConfig,
};
use tabled::{Table, Tabled};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "tablesnap")]
#[command(about = "Backups, restores and change reports for DynamoDB tables")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value = "text")]
    log_format: LogFormat,

    /// Print Prometheus metrics to stderr when the command finishes
    #[arg(long, global = true)]
    print_metrics: bool,

    /// Alternative DynamoDB endpoint, e.g. http://localhost:8000
    #[arg(long, global = true)]
    endpoint_url: Option<String>,

    /// AWS region
    #[arg(long, global = true, env = "REGION", default_value = tablesnap_core::config::DEFAULT_REGION)]
    region: String,

    /// Access key id (paired with --secret-access-key)
    #[arg(long, global = true, env = "ACCESS_KEY", hide_env_values = true)]
    access_key_id: Option<String>,

    /// Secret access key (paired with --access-key-id)
    #[arg(long, global = true, env = "SECRET_KEY", hide_env_values = true)]
    secret_access_key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum LogFormat {
    Text,
    Json,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum ReportArg {
    Json,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum MatchArg {
    Prefix,
    Substring,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum CompareArg {
    NewFields,
    Symmetric,
}

/// Options shared by every command that compares snapshots
#[derive(clap::Args, Debug, Clone)]
struct DiffArgs {
    /// Field identifying a record; defaults to the table's partition key, then `id`
    #[arg(long)]
    identity_key: Option<String>,

    /// Numeric field the report is sorted by
    #[arg(long, default_value = DEFAULT_ORDERING_FIELD)]
    order_by: String,

    /// How previous snapshot files are matched to the base name
    #[arg(long, value_enum, default_value = "prefix")]
    match_mode: MatchArg,

    /// Which fields take part in the comparison
    #[arg(long, value_enum, default_value = "new-fields")]
    compare: CompareArg,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan a table into a snapshot file
    Backup {
        /// Table to back up
        table: String,
        /// Directory snapshots are written to
        output_dir: PathBuf,
        /// File base name (defaults to the table name)
        #[arg(long)]
        base_file_name: Option<String>,
        /// Write `{base}.json` instead of a timestamped file
        #[arg(long)]
        no_timestamp: bool,
        /// Write a change report against the previous snapshot
        #[arg(long, value_enum)]
        report: Option<ReportArg>,
        #[command(flatten)]
        diff: DiffArgs,
    },
    /// Write every record of a snapshot file into a table
    Restore {
        /// Target table
        table: String,
        /// Snapshot file to replay
        backup_file: PathBuf,
    },
    /// Compare two snapshot files without touching the store
    Diff {
        old_file: PathBuf,
        new_file: PathBuf,
        /// Write the report as JSON instead of printing a table
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[command(flatten)]
        diff: DiffArgs,
    },
    /// Print the snapshot a report would be compared against
    Latest {
        directory: PathBuf,
        base_file_name: String,
        #[arg(long, value_enum, default_value = "prefix")]
        match_mode: MatchArg,
    },
    /// List the snapshots of a base name
    List {
        directory: PathBuf,
        base_file_name: String,
        #[arg(long, value_enum, default_value = "prefix")]
        match_mode: MatchArg,
    },
}

#[derive(Tabled)]
struct ChangeRow {
    #[tabled(rename = "Change")]
    change: &'static str,
    #[tabled(rename = "Identity")]
    identity: String,
    #[tabled(rename = "Order")]
    order: String,
    #[tabled(rename = "Fields")]
    fields: String,
}

#[derive(Tabled)]
struct SnapshotRow {
    #[tabled(rename = "File")]
    file: String,
    #[tabled(rename = "Captured")]
    captured: String,
    #[tabled(rename = "Size")]
    size: String,
}

fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.log_format)?;

    let result = run(&cli);

    if cli.print_metrics {
        match gather_metrics() {
            Ok(text) => eprintln!("{text}"),
            Err(e) => error!("Failed to gather metrics: {}", e),
        }
    }

    result
}

fn run(cli: &Cli) -> Result<(), anyhow::Error> {
    match &cli.command {
        Commands::Backup {
            table,
            output_dir,
            base_file_name,
            no_timestamp,
            report,
            diff,
        } => {
            let mut request = BackupRequest::new(table.as_str(), output_dir.as_path())
                .with_timestamp(!no_timestamp);
            if let Some(base) = base_file_name {
                request = request.with_base_file_name(base.as_str());
            }
            if let Some(ReportArg::Json) = report {
                request = request.with_report(ReportFormat::Json);
            }
            backup(cli, &request, diff_config(diff))
        }
        Commands::Restore { table, backup_file } => restore(cli, table, backup_file),
        Commands::Diff {
            old_file,
            new_file,
            output,
            diff,
        } => diff_files(old_file, new_file, output.as_deref(), &diff_config(diff)),
        Commands::Latest {
            directory,
            base_file_name,
            match_mode,
        } => latest(directory, base_file_name, *match_mode),
        Commands::List {
            directory,
            base_file_name,
            match_mode,
        } => list(directory, base_file_name, *match_mode),
    }
}

fn init_logging(verbose: bool, format: LogFormat) -> Result<(), anyhow::Error> {
    let level = if verbose { "debug" } else { "info" };

    match format {
        LogFormat::Json => {
            init_observability(&format!("tablesnap={level}"))?;
        }
        LogFormat::Text => {
            let filter = tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}

fn store_config(cli: &Cli) -> StoreConfig {
    StoreConfig {
        endpoint_url: cli.endpoint_url.clone(),
        region: cli.region.clone(),
        access_key_id: cli.access_key_id.clone(),
        secret_access_key: cli.secret_access_key.clone(),
    }
}

fn diff_config(args: &DiffArgs) -> DiffConfig {
    DiffConfig {
        identity_key: args.identity_key.clone(),
        ordering_field: args.order_by.clone(),
        field_policy: match args.compare {
            CompareArg::NewFields => FieldComparisonPolicy::NewFieldsOnly,
            CompareArg::Symmetric => FieldComparisonPolicy::Symmetric,
        },
        match_mode: match_mode(args.match_mode),
    }
}

fn match_mode(arg: MatchArg) -> MatchMode {
    match arg {
        MatchArg::Prefix => MatchMode::Prefix,
        MatchArg::Substring => MatchMode::Substring,
    }
}

fn backup(cli: &Cli, request: &BackupRequest, config: DiffConfig) -> Result<(), anyhow::Error> {
    config.validate()?;
    let store = DynamoDbRecordStore::new(&store_config(cli))?;
    let engine = BackupEngine::new(store, config);

    let outcome = engine
        .backup(request)
        .with_context(|| format!("backup of table '{}' failed", request.table_name))?;

    println!(
        "✓ Backed up {} records to {}",
        outcome.record_count,
        outcome.snapshot_path.display()
    );

    match outcome.report {
        ReportOutcome::NotRequested => {}
        ReportOutcome::NoPreviousSnapshot => {
            println!("  No previous snapshot of '{}'; no report written", request.base_name());
        }
        ReportOutcome::NoChanges { previous } => {
            println!("  No changes since {}", previous.display());
        }
        ReportOutcome::Written {
            previous,
            path,
            changes,
        } => {
            println!(
                "  {changes} changes since {}, report written to {}",
                previous.display(),
                path.display()
            );
        }
        ReportOutcome::Failed(e) => {
            error!("✗ Change report failed: {}", e);
            bail!("backup written but change report failed: {e}");
        }
    }

    Ok(())
}

fn restore(cli: &Cli, table: &str, backup_file: &Path) -> Result<(), anyhow::Error> {
    info!("Restoring {} into {}", backup_file.display(), table);

    let store = DynamoDbRecordStore::new(&store_config(cli))?;
    let engine = BackupEngine::new(store, DiffConfig::default());
    let summary = engine
        .restore_file(table, backup_file)
        .with_context(|| format!("restore into table '{table}' failed"))?;

    println!(
        "✓ Restored {} records into {}",
        summary.records_written, summary.table_name
    );
    Ok(())
}

fn diff_files(
    old_file: &Path,
    new_file: &Path,
    output: Option<&Path>,
    config: &DiffConfig,
) -> Result<(), anyhow::Error> {
    config.validate()?;
    let report = diff_snapshot_files(old_file, new_file, config)?;

    match output {
        Some(path) => {
            let dir = path.parent().unwrap_or(Path::new("."));
            ReportWriter::new(dir)
                .write_to(&report, path)
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("✓ {} changes written to {}", report.len(), path.display());
        }
        None if report.is_empty() => println!("No changes"),
        None => {
            let identity_key = config.identity_key.as_deref().unwrap_or("id");
            let rows = change_rows(&report, identity_key, &config.ordering_field);
            println!("{}", Table::new(rows));
        }
    }
    Ok(())
}

fn change_rows(report: &ChangeReport, identity_key: &str, ordering_field: &str) -> Vec<ChangeRow> {
    report
        .iter()
        .map(|change| {
            let new = change.new_record();
            let field_or_dash = |key: &str| new.get(key).map_or("-".to_string(), Value::to_string);
            ChangeRow {
                change: if change.is_added() { "added" } else { "modified" },
                identity: field_or_dash(identity_key),
                order: field_or_dash(ordering_field),
                fields: change.changed_fields().join(", "),
            }
        })
        .collect()
}

fn latest(directory: &Path, base_file_name: &str, mode: MatchArg) -> Result<(), anyhow::Error> {
    match SnapshotSelector::from_mode(match_mode(mode)).find_previous(directory, base_file_name)? {
        Some(path) => println!("{}", path.display()),
        None => println!("No snapshot of '{base_file_name}' in {}", directory.display()),
    }
    Ok(())
}

fn list(directory: &Path, base_file_name: &str, mode: MatchArg) -> Result<(), anyhow::Error> {
    let paths = SnapshotSelector::from_mode(match_mode(mode)).list_matching(directory, base_file_name)?;
    if paths.is_empty() {
        println!("No snapshots of '{base_file_name}' in {}", directory.display());
        return Ok(());
    }

    let rows: Vec<SnapshotRow> = paths
        .iter()
        .map(|path| {
            let file = path
                .file_name()
                .unwrap_or_default()
                .to_string_lossy()
                .to_string();
            let captured = parse_snapshot_file_name(&file)
                .and_then(|(_, at)| at)
                .map_or("-".to_string(), |at| at.format("%Y-%m-%d %H:%M UTC").to_string());
            let size = match std::fs::metadata(path) {
                Ok(meta) => format_size(meta.len()),
                Err(_) => "Unknown".to_string(),
            };
            SnapshotRow {
                file,
                captured,
                size,
            }
        })
        .collect();

    println!("{}", Table::new(rows));
    Ok(())
}

fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}
