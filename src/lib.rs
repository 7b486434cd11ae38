//! Build PMTiles archives from Overture Maps data.
//!
//! For every layer a SQL template is rendered and run against an in-memory
//! DuckDB, which writes `<layer>.geojson`. tippecanoe is then downloaded,
//! built from source and run once per layer to produce `<layer>.pmtiles`.
//! Intermediate files and the tippecanoe sources are removed afterwards.
//!
//! # Usage
//!
//! The binary reads `sql/<layer>.sql` for every layer given on the command
//! line. The Overture release defaults to [`DEFAULT_RELEASE`] and can be
//! overridden with the `OVERTURE_RELEASE` environment variable or
//! `--release`.
//!
//! # CLI Example
//!
//! ```bash
//! OVERTURE_RELEASE=2025-11-19.0 overture-tiles --sql-dir sql roads water
//! ```
//!
//! # Library Example
//! ```no_run
//! use overture_tiles::{Config, DuckDb, Pipeline, SystemRunner};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let config = Config::new(overture_tiles::release_from_env(None), vec!["roads".into()]);
//!
//! let outputs = Pipeline::new(config, DuckDb, SystemRunner)
//!     .run()
//!     .await
//!     .expect("failed building tiles");
//! println!("wrote {:?}", outputs);
//! # }
//! ```

mod archive;
mod config;
mod download;
mod error;
pub mod logging;
mod pipeline;
mod query;
mod scratch;
mod tippecanoe;

pub use archive::{unzip, Unzipped};
pub use config::{
    release_from_env, resolve_release, Config, ToolSource, DEFAULT_RELEASE,
    DEFAULT_TIPPECANOE_URL, RELEASE_ENV,
};
pub use download::{client, download};
pub use error::{Error, PipelineError, Result, Stage};
pub use pipeline::{LayerPlan, Pipeline};
pub use query::{run_query, DuckDb, QueryEngine, SqlTemplate, FILE_NAME_TOKEN, RELEASE_TOKEN};
pub use scratch::ScratchPath;
pub use tippecanoe::{
    build_from_source, make_command, CommandRunner, SystemRunner, TileBuild, ToolCommand, Zoom,
    ZoomRange, MAX_ZOOM,
};
