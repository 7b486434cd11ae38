mod args;
mod validators;

use anyhow::Result;
use args::Args;
use overture_tiles::{
    logging::{init_logging, LogFormat},
    Config, DuckDb, Pipeline, PipelineError, SystemRunner,
};
use tracing::{error, info};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(LogFormat::from_env())?;

    let dry_run = args.dry_run;
    let config = Config::try_from(args)?;
    let pipeline = Pipeline::new(config, DuckDb, SystemRunner);

    if dry_run {
        for plan in pipeline.plan()? {
            info!(
                layer = %plan.layer,
                sql = %plan.sql,
                command = %plan.command,
                "would run"
            );
        }

        return Ok(());
    }

    if let Err(PipelineError { stage, source }) = pipeline.run().await {
        error!(
            stage = %stage,
            error = %format!("{:#}", anyhow::Error::new(source)),
            "pipeline failed"
        );
        std::process::exit(1);
    }

    Ok(())
}
