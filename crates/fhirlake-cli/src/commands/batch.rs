use std::sync::Arc;

use anyhow::anyhow;

use fhirlake_client::{AuthHeader, MirrorClient, RetryPolicy, SourceClient};
use fhirlake_db::{DbConfig, IdRangePartitioner, TableFhirMap, create_pool};
use fhirlake_etl::{FetchTask, Pipeline, PipelineConfig, RunSummary};
use fhirlake_schema::SchemaRegistry;
use fhirlake_sink::{ParquetSink, SinkConfig};

use crate::cli::BatchArgs;
use crate::error::{CliError, from_pipeline};

pub async fn run(args: BatchArgs) -> Result<(), CliError> {
    let registry = Arc::new(
        SchemaRegistry::new(
            args.fhir_version.into(),
            args.structure_definitions.as_deref(),
            args.recursive_depth,
        )
        .map_err(CliError::config)?,
    );

    let retry = RetryPolicy {
        max_attempts: args.max_retries.max(1),
        ..RetryPolicy::default()
    };
    let source_auth = AuthHeader::from_credentials(
        args.source_user.clone(),
        args.source_password.clone(),
        args.source_token.clone(),
    );
    let client = Arc::new(
        SourceClient::new(&args.source_url, source_auth, retry, args.worker_count)
            .map_err(CliError::runtime)?,
    );

    let mirror = match &args.sink_fhir_url {
        Some(url) => {
            let auth = AuthHeader::from_credentials(
                args.sink_user.clone(),
                args.sink_password.clone(),
                None,
            );
            Some(Arc::new(
                MirrorClient::new(url, auth, args.worker_count).map_err(CliError::runtime)?,
            ))
        }
        None => None,
    };

    let sink = Arc::new(ParquetSink::new(
        registry,
        SinkConfig::new(&args.output).with_row_group_bytes(args.row_group_size),
    ));

    let pipeline = Pipeline::new(
        client,
        mirror,
        sink,
        PipelineConfig::new(args.resources.clone(), args.batch_size, args.worker_count),
    );

    let summary = if args.db_mode {
        let tasks = plan_from_database(&args).await?;
        pipeline.run_tasks(tasks).await.map_err(from_pipeline)?
    } else {
        pipeline.run_search().await.map_err(from_pipeline)?
    };

    report(&summary);
    Ok(())
}

async fn plan_from_database(args: &BatchArgs) -> Result<Vec<FetchTask>, CliError> {
    let db_url = args
        .db_url
        .clone()
        .ok_or_else(|| CliError::config(anyhow!("--db-url is required with --db-mode")))?;
    let map_path = args
        .table_fhir_map
        .clone()
        .ok_or_else(|| CliError::config(anyhow!("--table-fhir-map is required with --db-mode")))?;

    let mapping = TableFhirMap::load(&map_path).map_err(CliError::config)?;
    let db_config = DbConfig::new(db_url)
        .with_credentials(args.db_user.clone(), args.db_password.clone())
        .with_pool_size(args.worker_count.max(1) as u32);
    let pool = create_pool(&db_config).await.map_err(CliError::runtime)?;

    let partitioner = IdRangePartitioner::new(
        pool,
        mapping,
        i64::from(args.batch_size.max(1)),
        args.fetch_size.max(1),
    );
    let batches = partitioner
        .plan(&args.resources)
        .await
        .map_err(|e| from_pipeline(e.into()))?;
    Ok(batches.into_iter().map(FetchTask::Ids).collect())
}

fn report(summary: &RunSummary) {
    eprintln!("Extraction summary:");
    eprintln!("{summary}");
}
