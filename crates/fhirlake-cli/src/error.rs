use fhirlake_db::DbError;
use fhirlake_etl::PipelineError;

/// Exit code for bad flags, unreadable mappings/profiles, and other
/// operator mistakes.
pub const EXIT_CONFIG: i32 = 1;
/// Exit code for runtime failures (source, sink, merge).
pub const EXIT_RUNTIME: i32 = 2;

/// Top-level command error carrying its exit code.
#[derive(Debug)]
pub enum CliError {
    Config(anyhow::Error),
    Runtime(anyhow::Error),
}

impl CliError {
    pub fn config(error: impl Into<anyhow::Error>) -> Self {
        Self::Config(error.into())
    }

    pub fn runtime(error: impl Into<anyhow::Error>) -> Self {
        Self::Runtime(error.into())
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => EXIT_CONFIG,
            Self::Runtime(_) => EXIT_RUNTIME,
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::Config(e) | Self::Runtime(e) => format!("{e:#}"),
        }
    }
}

/// Pipeline failures caused by operator configuration get exit code 1;
/// everything else is a runtime failure.
pub fn from_pipeline(error: PipelineError) -> CliError {
    match &error {
        PipelineError::Db(
            DbError::UnmappedResource(_) | DbError::MappingLoad { .. } | DbError::InvalidTableName(_),
        ) => CliError::config(error),
        _ => CliError::runtime(error),
    }
}
