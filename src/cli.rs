use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::collect::CollectOptions;
use crate::filter::Filters;
use crate::integrate::IntegrateOptions;
use crate::schema::EntityKind;

#[derive(Parser, Debug)]
#[command(name = "catalog-ingest")]
#[command(version, about = "Collect game catalog data and integrate it into SQLite")]
pub struct Cli {
    /// Directory holding formatters.json and sources/
    #[arg(long, global = true, env = "CATALOG_INGEST_CONFIG_DIR", default_value = "config")]
    pub config_dir: PathBuf,

    /// SQLite database path
    #[arg(long, global = true, env = "CATALOG_INGEST_DB", default_value = "catalog.db")]
    pub db: PathBuf,

    /// Custom response cache directory
    #[arg(long, global = true)]
    pub cache_dir: Option<PathBuf>,

    /// Seconds a cached response stays valid; 0 always refetches
    #[arg(long, global = true, env = "CATALOG_INGEST_CACHE_TTL", default_value_t = 3600)]
    pub cache_ttl: u64,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Collect, convert and integrate records into the database
    Sync {
        /// Source name (file under sources/ without .json)
        source: String,

        #[arg(value_parser = parse_entity)]
        entity: EntityKind,

        /// Integrate only this upstream id
        #[arg(long, conflicts_with = "filter")]
        id: Option<i64>,

        #[command(flatten)]
        collect: CollectArgs,

        #[command(flatten)]
        integrate: IntegrateArgs,
    },

    /// Collect records and print them without touching the database
    Collect {
        source: String,

        #[arg(value_parser = parse_entity)]
        entity: EntityKind,

        #[command(flatten)]
        collect: CollectArgs,
    },

    /// Fetch one record by upstream id and print it with its conversion
    Show {
        source: String,

        #[arg(value_parser = parse_entity)]
        entity: EntityKind,

        id: i64,

        /// Bypass the response cache
        #[arg(long)]
        no_cache: bool,
    },

    /// Evaluate and check formulas
    #[command(subcommand)]
    Formula(FormulaCommand),

    /// List the entity kinds a source can collect
    ListEntities { source: String },

    /// Delete every cached response
    ClearCache,
}

#[derive(Subcommand, Debug)]
pub enum FormulaCommand {
    /// Evaluate a formula or formula table
    Eval {
        formula: String,

        /// Variable value, e.g. --var level=20
        #[arg(long = "var", value_parser = parse_var)]
        vars: Vec<(String, f64)>,
    },

    /// Print every problem found in a formula
    Validate { formula: String },

    /// Evaluate over an integer range of one variable (at most 10000 steps)
    Range {
        formula: String,
        variable: String,
        min: i64,
        max: i64,

        #[arg(long = "var", value_parser = parse_var)]
        vars: Vec<(String, f64)>,
    },
}

#[derive(Args, Debug, Clone, Default)]
pub struct CollectArgs {
    /// Filter, e.g. --filter raceId=3 --filter ids=1,2,3
    #[arg(long, value_parser = parse_key_val)]
    pub filter: Vec<(String, String)>,

    /// Most records to return
    #[arg(long)]
    pub limit: Option<usize>,

    /// Upstream offset to start from
    #[arg(long, default_value_t = 0)]
    pub skip: usize,

    #[arg(long)]
    pub page_size: Option<usize>,

    #[arg(long)]
    pub max_pages: Option<usize>,

    #[arg(long)]
    pub max_items: Option<usize>,

    /// Bypass cached responses (they are still refreshed)
    #[arg(long)]
    pub no_cache: bool,
}

impl CollectArgs {
    pub fn filters(&self) -> Filters {
        Filters::from_pairs(self.filter.iter().map(|(k, v)| (k.as_str(), v.as_str())))
    }

    pub fn options(&self) -> CollectOptions {
        CollectOptions {
            limit: self.limit,
            start_skip: self.skip,
            page_size: self.page_size,
            max_pages: self.max_pages,
            max_items: self.max_items,
            skip_cache: self.no_cache,
        }
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct IntegrateArgs {
    /// Report what would be written without writing
    #[arg(long)]
    pub dry_run: bool,

    /// Update records that already exist
    #[arg(long)]
    pub force_update: bool,

    /// Skip records whose required references do not resolve
    #[arg(long)]
    pub ignore_unvalidated: bool,

    /// Fields never overwritten on update (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub exclude: Vec<String>,
}

impl IntegrateArgs {
    pub fn options(&self) -> IntegrateOptions {
        IntegrateOptions {
            dry_run: self.dry_run,
            force_update: self.force_update,
            ignore_unvalidated: self.ignore_unvalidated,
            exclude_from_update: self.exclude.iter().cloned().collect(),
        }
    }
}

fn parse_entity(s: &str) -> Result<EntityKind, String> {
    s.parse()
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", s))?;
    Ok((key.trim().to_string(), value.to_string()))
}

fn parse_var(s: &str) -> Result<(String, f64), String> {
    let (name, value) = parse_key_val(s)?;
    let value = value
        .trim()
        .parse::<f64>()
        .map_err(|_| format!("'{}' is not a number", value))?;
    Ok((name, value))
}

impl Cli {
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
