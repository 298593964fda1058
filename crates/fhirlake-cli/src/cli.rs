use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use fhirlake_core::FhirVersion;
use fhirlake_sink::DEFAULT_ROW_GROUP_BYTES;

#[derive(Parser)]
#[command(name = "fhirlake")]
#[command(about = "FHIRLake — extract FHIR resources into a Parquet warehouse")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
#[allow(clippy::large_enum_variant)]
pub enum Commands {
    /// Extract resources from a FHIR server into a Parquet warehouse
    Batch(BatchArgs),
    /// Merge two warehouse snapshots with last-write-wins deduplication
    Merge(MergeArgs),
}

#[derive(Clone, Copy, ValueEnum, Default)]
pub enum FhirVersionArg {
    #[default]
    R4,
    Dstu3,
}

impl From<FhirVersionArg> for FhirVersion {
    fn from(arg: FhirVersionArg) -> Self {
        match arg {
            FhirVersionArg::R4 => FhirVersion::R4,
            FhirVersionArg::Dstu3 => FhirVersion::Dstu3,
        }
    }
}

#[derive(clap::Args)]
pub struct BatchArgs {
    /// Source FHIR server base URL
    #[arg(long, env = "FHIRLAKE_SOURCE_URL")]
    pub source_url: String,

    /// Source server username (HTTP Basic)
    #[arg(long, env = "FHIRLAKE_SOURCE_USER")]
    pub source_user: Option<String>,

    /// Source server password (HTTP Basic)
    #[arg(long, env = "FHIRLAKE_SOURCE_PASSWORD")]
    pub source_password: Option<String>,

    /// Source server bearer token (wins over basic auth)
    #[arg(long, env = "FHIRLAKE_SOURCE_TOKEN")]
    pub source_token: Option<String>,

    /// Mirror FHIR server base URL; every fetched resource is PUT there too
    #[arg(long)]
    pub sink_fhir_url: Option<String>,

    /// Mirror server username
    #[arg(long)]
    pub sink_user: Option<String>,

    /// Mirror server password
    #[arg(long)]
    pub sink_password: Option<String>,

    /// Warehouse output root
    #[arg(long)]
    pub output: PathBuf,

    /// Resource types to extract
    #[arg(long, value_delimiter = ',', default_value = "Patient,Encounter,Observation")]
    pub resources: Vec<String>,

    /// Search page size; also the ID-range width in db mode
    #[arg(long, default_value_t = 100)]
    pub batch_size: u32,

    /// Ids per `_id=a,b,c` fetch in db mode
    #[arg(long, default_value_t = 100)]
    pub fetch_size: usize,

    /// Parallel fetch workers (and the HTTP connection-pool ceiling)
    #[arg(long, default_value_t = 8)]
    pub worker_count: usize,

    /// Plan id batches from the backing database instead of the search API
    #[arg(long)]
    pub db_mode: bool,

    /// Backing database URL (db mode)
    #[arg(long, env = "FHIRLAKE_DB_URL")]
    pub db_url: Option<String>,

    /// Backing database user (db mode)
    #[arg(long)]
    pub db_user: Option<String>,

    /// Backing database password (db mode)
    #[arg(long, env = "FHIRLAKE_DB_PASSWORD")]
    pub db_password: Option<String>,

    /// JSON mapping from source tables to resource types (db mode)
    #[arg(long)]
    pub table_fhir_map: Option<PathBuf>,

    /// FHIR version of the source server
    #[arg(long, value_enum, default_value = "r4")]
    pub fhir_version: FhirVersionArg,

    /// Directory of StructureDefinition JSON files for typed columns
    #[arg(long)]
    pub structure_definitions: Option<PathBuf>,

    /// Complex-type expansion bound for derived schemas
    #[arg(long, default_value_t = 1)]
    pub recursive_depth: u32,

    /// Part-file/row-group byte budget
    #[arg(long, default_value_t = DEFAULT_ROW_GROUP_BYTES)]
    pub row_group_size: usize,

    /// Attempts per request against a flaky source (including the first)
    #[arg(long, default_value_t = 4)]
    pub max_retries: u32,
}

#[derive(clap::Args)]
pub struct MergeArgs {
    /// First warehouse snapshot
    #[arg(long)]
    pub dwh1: PathBuf,

    /// Second warehouse snapshot; wins ties on lastUpdated
    #[arg(long)]
    pub dwh2: PathBuf,

    /// Merged warehouse output root
    #[arg(long)]
    pub output: PathBuf,

    /// Row-group byte budget for merged part files
    #[arg(long, default_value_t = DEFAULT_ROW_GROUP_BYTES)]
    pub row_group_size: usize,

    /// Part files each merged table is split across
    #[arg(long, default_value_t = 1)]
    pub num_shards: usize,

    /// Also merge materialized view tables
    #[arg(long)]
    pub merge_views: bool,

    /// Directory of ViewDefinition JSON documents (required with --merge-views)
    #[arg(long)]
    pub view_definitions: Option<PathBuf>,
}
