use anyhow::anyhow;

use fhirlake_merge::{MergeConfig, MergeError, Merger};

use crate::cli::MergeArgs;
use crate::error::CliError;

pub async fn run(args: MergeArgs) -> Result<(), CliError> {
    let view_definitions_dir = if args.merge_views {
        Some(args.view_definitions.clone().ok_or_else(|| {
            CliError::config(anyhow!("--view-definitions is required with --merge-views"))
        })?)
    } else {
        None
    };

    let config = MergeConfig {
        dwh1: args.dwh1,
        dwh2: args.dwh2,
        output: args.output,
        row_group_bytes: args.row_group_size,
        num_shards: args.num_shards.max(1),
        view_definitions_dir,
    };

    // The merge is CPU- and file-bound; keep it off the async runtime.
    let report = tokio::task::spawn_blocking(move || Merger::new(config).run())
        .await
        .map_err(|e| CliError::runtime(anyhow!("merge task panicked: {e}")))?
        .map_err(classify)?;

    eprintln!("Merge summary:");
    eprintln!("{report}");
    Ok(())
}

fn classify(error: MergeError) -> CliError {
    match &error {
        MergeError::Schema(_) => CliError::config(error),
        _ => CliError::runtime(error),
    }
}
