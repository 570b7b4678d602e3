use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use shared_utils::env::{get_env_var, parse_env_var};
use xref_sync::{
    catalog::sync::{SyncOptions, sync_catalog},
    config::{EndpointCfg, LoaderConfig, MAX_BATCH_SIZE, MIN_BATCH_SIZE, load_config_path},
    db::{connection::connect_sqlite, migrate::run_all},
    identifier::IdentifierScheme,
    loader::{LoadOptions, load_associations},
    resolver::{CrossReferenceResolver, MappingRecord, Outcome},
    source::{
        CsvAssociationSource, CsvOptions, DumpColumns, RawAssociation, SourceError,
        SqlDumpSource, read_entity_csv_path, read_mapping_csv_path,
    },
    store::{SqliteStore, TargetStore},
};

#[derive(Parser)]
#[command(version, about = "Cross-reference reconciliation and association loader")]
struct Cli {
    /// Database URL; defaults to $DATABASE_URL.
    #[arg(long, global = true)]
    database: Option<String>,
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Apply pending migrations.
    Migrate,
    /// Reference catalog maintenance.
    Catalog(CatalogCmd),
    /// Load associations from a CSV/TSV file or a SQL dump.
    Load(LoadArgs),
    /// Resolve one identifier and explain the outcome.
    Resolve(ResolveArgs),
}

#[derive(Args)]
struct CatalogCmd {
    #[command(subcommand)]
    sub: CatalogSub,
}

#[derive(Subcommand)]
enum CatalogSub {
    /// Upsert entities and mappings from CSV files.
    Sync {
        #[arg(long, value_name = "FILE")]
        entities: PathBuf,
        #[arg(long, value_name = "FILE")]
        mappings: PathBuf,
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        prune: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Csv,
    Tsv,
    SqlDump,
}

#[derive(Args)]
struct LoadArgs {
    #[arg(long, value_name = "FILE")]
    config: PathBuf,
    #[arg(long, value_name = "FILE")]
    input: PathBuf,
    #[arg(long, value_enum, default_value = "csv")]
    format: Format,
    /// Table to read from a SQL dump.
    #[arg(long)]
    table: Option<String>,
    /// SQL dump column holding the left identifier.
    #[arg(long, default_value = "left_id")]
    left_column: String,
    /// SQL dump column holding the right identifier.
    #[arg(long, default_value = "right_id")]
    right_column: String,
    /// SQL dump column holding the evidence code.
    #[arg(long)]
    evidence_column: Option<String>,
    /// SQL dump column holding the frequency.
    #[arg(long)]
    frequency_column: Option<String>,
    /// Column order of the dumped table, for dumps without column lists or DDL.
    #[arg(long, value_delimiter = ',')]
    table_columns: Option<Vec<String>>,
    /// Mapping CSV; defaults to the `xref_mapping` table.
    #[arg(long, value_name = "FILE")]
    mappings: Option<PathBuf>,
    #[arg(long)]
    dry_run: bool,
    /// Print the report as JSON.
    #[arg(long)]
    json: bool,
    /// Stop after this many committed batches.
    #[arg(long)]
    max_batches: Option<u64>,
    /// Fail when a smaller share of rows resolves (0.0 to 1.0).
    #[arg(long)]
    min_resolution_rate: Option<f64>,
}

#[derive(Clone, Copy, ValueEnum)]
enum Side {
    Left,
    Right,
}

#[derive(Args)]
struct ResolveArgs {
    #[arg(long, value_name = "FILE")]
    config: PathBuf,
    #[arg(long, value_enum)]
    side: Side,
    /// Mapping CSV; defaults to the `xref_mapping` table.
    #[arg(long, value_name = "FILE")]
    mappings: Option<PathBuf>,
    id: String,
}

type Rows = Box<dyn Iterator<Item = Result<RawAssociation, SourceError>>>;

fn database_url(flag: Option<String>) -> Result<String> {
    match flag {
        Some(url) => Ok(url),
        None => Ok(get_env_var("DATABASE_URL")?),
    }
}

fn loader_config(path: &Path) -> Result<LoaderConfig> {
    let mut cfg = load_config_path(path)?;
    if let Some(n) = parse_env_var::<usize>("XREF_BATCH_SIZE")? {
        if !(MIN_BATCH_SIZE..=MAX_BATCH_SIZE).contains(&n) {
            bail!("XREF_BATCH_SIZE must be within {MIN_BATCH_SIZE}..={MAX_BATCH_SIZE}, got {n}");
        }
        cfg.batch_size = n;
    }
    Ok(cfg)
}

fn mapping_records(store: &mut SqliteStore, file: Option<&Path>) -> Result<Vec<MappingRecord>> {
    match file {
        Some(path) => read_mapping_csv_path(path, CsvOptions::csv())
            .with_context(|| format!("reading mappings from {}", path.display())),
        None => Ok(store.mapping_records()?),
    }
}

fn dump_columns(args: &LoadArgs) -> DumpColumns {
    DumpColumns {
        evidence: args.evidence_column.clone(),
        frequency: args.frequency_column.clone(),
        table_columns: args.table_columns.clone(),
        ..DumpColumns::new(&args.left_column, &args.right_column)
    }
}

fn open_rows(args: &LoadArgs) -> Result<Rows> {
    let rows: Rows = match args.format {
        Format::Csv => Box::new(CsvAssociationSource::from_path(&args.input, CsvOptions::csv())?),
        Format::Tsv => Box::new(CsvAssociationSource::from_path(&args.input, CsvOptions::tsv())?),
        Format::SqlDump => {
            let Some(table) = args.table.as_deref() else {
                bail!("--table is required with --format sql-dump");
            };
            Box::new(SqlDumpSource::from_path(&args.input, table, &dump_columns(args))?)
        }
    };
    Ok(rows)
}

fn run_load(db_url: &str, args: LoadArgs) -> Result<()> {
    let cfg = loader_config(&args.config)?;
    let mut store = SqliteStore::open(db_url, cfg.commit_timeout_ms)?;
    let mappings = mapping_records(&mut store, args.mappings.as_deref())?;
    let rows = open_rows(&args)
        .with_context(|| format!("opening {}", args.input.display()))?;

    let options = LoadOptions {
        max_batches: args.max_batches,
        ..LoadOptions::from_config(&cfg).dry_run(args.dry_run)
    };
    let report = match load_associations(&mut store, &cfg, mappings, rows, options, None) {
        Ok(report) => report,
        Err(e) => {
            if let Some(partial) = e.partial_report() {
                eprintln!("{partial}");
            }
            return Err(e.into());
        }
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{report}");
    }
    if let Some(min) = args.min_resolution_rate {
        let rate = report.resolution_rate();
        if rate < min {
            bail!("resolution rate {rate:.3} is below the required {min:.3}");
        }
    }
    Ok(())
}

fn run_resolve(db_url: &str, args: ResolveArgs) -> Result<()> {
    let cfg = loader_config(&args.config)?;
    let endpoint: &EndpointCfg = match args.side {
        Side::Left => &cfg.left,
        Side::Right => &cfg.right,
    };
    let mut store = SqliteStore::open(db_url, cfg.commit_timeout_ms)?;
    let mappings = mapping_records(&mut store, args.mappings.as_deref())?;
    let known = store.entity_codes(&endpoint.kind)?;
    let resolver = CrossReferenceResolver::build(
        IdentifierScheme::from_endpoint(endpoint)?,
        mappings,
        known,
        cfg.mapping.accepted_relations.as_deref(),
    )?;

    let res = resolver.resolve_str(&args.id);
    println!("input      {:?}", res.identifier.original);
    println!("namespace  {}", res.identifier.namespace);
    println!("code       {}", res.identifier.code);
    match &res.outcome {
        Outcome::Resolved { code, provenance } => {
            println!("resolved   {}:{code} ({provenance})", endpoint.kind);
        }
        Outcome::Unresolved(reason) => println!("unresolved {reason}"),
    }
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let db_url = database_url(cli.database)?;

    match cli.cmd {
        Cmd::Migrate => {
            run_all(&db_url)?;
            info!("migrations applied");
        }
        Cmd::Catalog(CatalogCmd {
            sub:
                CatalogSub::Sync {
                    entities,
                    mappings,
                    dry_run,
                    prune,
                },
        }) => {
            let entities = read_entity_csv_path(&entities, CsvOptions::csv())
                .with_context(|| format!("reading entities from {}", entities.display()))?;
            let mappings = read_mapping_csv_path(&mappings, CsvOptions::csv())
                .with_context(|| format!("reading mappings from {}", mappings.display()))?;

            let mut conn = connect_sqlite(&db_url)?;
            let opt = SyncOptions { dry_run, prune };
            let diff = sync_catalog(&mut conn, entities, mappings, opt)?;
            println!("{diff}");
        }
        Cmd::Load(args) => run_load(&db_url, args)?,
        Cmd::Resolve(args) => run_resolve(&db_url, args)?,
    }

    Ok(())
}
