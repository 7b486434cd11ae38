use std::path::PathBuf;
use tracing::info;

use crate::archive::{unzip, Unzipped};
use crate::config::{Config, ToolSource};
use crate::download::{client, download};
use crate::error::{Error, PipelineError, Result, Stage, StageExt};
use crate::query::{run_query, QueryEngine, SqlTemplate};
use crate::scratch::ScratchPath;
use crate::tippecanoe::{build_from_source, CommandRunner, TileBuild, ToolCommand};

const TOOL_ARCHIVE: &str = "tippecanoe.zip";
const TOOL_BINARY: &str = "tippecanoe";
const UNBUILT_SOURCE_DIR: &str = "<tippecanoe source dir>";

/// What a run would do for one layer.
#[derive(Clone, Debug, PartialEq)]
pub struct LayerPlan {
    pub layer: String,
    pub sql: String,
    pub command: ToolCommand,
}

/// Query → acquire tippecanoe → build tiles, stopping at the first error.
pub struct Pipeline<E, R> {
    config: Config,
    engine: E,
    runner: R,
}

impl<E: QueryEngine, R: CommandRunner> Pipeline<E, R> {
    pub fn new(config: Config, engine: E, runner: R) -> Self {
        Self {
            config,
            engine,
            runner,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Runs every stage and returns the PMTiles files written, in layer order.
    pub async fn run(&self) -> std::result::Result<Vec<PathBuf>, PipelineError> {
        let cfg = &self.config;
        info!(release = %cfg.release, layers = ?cfg.layers, "starting");

        let mut queried = Vec::with_capacity(cfg.layers.len());
        for layer in &cfg.layers {
            let geojson = cfg.geojson_path(layer);
            let guard = (!cfg.keep_intermediate).then(|| ScratchPath::new(&geojson));

            run_query(&self.engine, &cfg.sql_path(layer), &cfg.release, &geojson)
                .stage(Stage::Query)?;

            queried.push((layer, geojson, guard));
        }

        let (binary, _tool_dir) = self.acquire_tool().await.stage(Stage::AcquireTool)?;

        let mut outputs = Vec::with_capacity(queried.len());
        for (layer, geojson, _guard) in queried {
            let output = cfg.pmtiles_path(layer);
            info!(layer = %layer, "building pmtiles");

            self.runner
                .run(&self.tile_build(layer, geojson).command(&binary))
                .stage(Stage::BuildTiles)?;

            info!(layer = %layer, path = %output.display(), "pmtiles built");
            outputs.push(output);
        }

        info!(outputs = ?outputs, "completed");
        Ok(outputs)
    }

    /// Renders each layer's query and tippecanoe invocation without running anything.
    ///
    /// When tippecanoe is built from source its location is only known once
    /// the archive is unpacked, so the command names it
    /// `<work_dir>/<tippecanoe source dir>/tippecanoe`.
    pub fn plan(&self) -> Result<Vec<LayerPlan>> {
        let cfg = &self.config;
        let binary = match &cfg.tool {
            ToolSource::Existing(path) => path.clone(),
            ToolSource::Build { .. } => cfg.work_dir.join(UNBUILT_SOURCE_DIR).join(TOOL_BINARY),
        };

        cfg.layers
            .iter()
            .map(|layer| {
                let geojson = cfg.geojson_path(layer);
                let sql = SqlTemplate::load(&cfg.sql_path(layer))?
                    .render_layer(&cfg.release, &geojson.to_string_lossy());

                Ok(LayerPlan {
                    layer: layer.clone(),
                    sql,
                    command: self.tile_build(layer, geojson).command(&binary),
                })
            })
            .collect()
    }

    fn tile_build(&self, layer: &str, input: PathBuf) -> TileBuild {
        TileBuild::new(layer, input, self.config.pmtiles_path(layer))
            .zoom(self.config.zoom)
            .coalesce(self.config.coalesce)
            .hilbert(self.config.hilbert)
    }

    /// Returns the tippecanoe binary and, when it was built here, a guard
    /// over the extracted sources.
    async fn acquire_tool(&self) -> Result<(PathBuf, Option<Unzipped>)> {
        let url = match &self.config.tool {
            ToolSource::Existing(path) => {
                info!(binary = %path.display(), "using installed tippecanoe");
                return Ok((path.clone(), None));
            }
            ToolSource::Build { url } => url,
        };

        let work_dir = &self.config.work_dir;
        let archive = work_dir.join(TOOL_ARCHIVE);
        let sources = {
            let _archive = ScratchPath::new(&archive);
            download(&client(self.config.timeout)?, url, &archive).await?;
            unzip(&archive, work_dir)?
        };

        let source_dir = sources
            .top_level()
            .ok_or_else(|| Error::MissingToolDirectory {
                archive: archive.clone(),
            })?
            .to_path_buf();

        let binary = build_from_source(&self.runner, &source_dir)?;
        Ok((binary, Some(sources)))
    }
}
