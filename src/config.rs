use std::{env, fmt::Debug, path::PathBuf, time::Duration};

use crate::tippecanoe::Zoom;

/// The Overture release queried when nothing else is configured.
pub const DEFAULT_RELEASE: &str = "2025-11-19.0";

/// Environment variable overriding [`DEFAULT_RELEASE`].
pub const RELEASE_ENV: &str = "OVERTURE_RELEASE";

/// Source archive of the tippecanoe fork that writes PMTiles directly.
pub const DEFAULT_TIPPECANOE_URL: &str =
    "https://github.com/felt/tippecanoe/archive/refs/heads/main.zip";

/// Where the tile-building binary comes from.
#[derive(Clone, Debug, PartialEq)]
pub enum ToolSource {
    /// Download a zipped source tree and build it with `make`.
    Build { url: String },

    /// Use an already installed binary.
    Existing(PathBuf),
}

impl Default for ToolSource {
    fn default() -> Self {
        ToolSource::Build {
            url: DEFAULT_TIPPECANOE_URL.to_owned(),
        }
    }
}

/// Pipeline configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    /// The Overture release substituted for `{{RELEASE}}`.
    pub release: String,

    /// Layers to produce, each backed by `<sql_dir>/<layer>.sql`.
    pub layers: Vec<String>,

    /// Folder holding the SQL templates.
    pub sql_dir: PathBuf,

    /// Folder receiving intermediate and output files.
    pub work_dir: PathBuf,

    pub tool: ToolSource,

    pub zoom: Zoom,

    /// Pass `--coalesce` to tippecanoe.
    pub coalesce: bool,

    /// Pass `--hilbert` to tippecanoe.
    pub hilbert: bool,

    /// Whether to keep `<layer>.geojson` once its tiles are built.
    pub keep_intermediate: bool,

    /// Timeout for the tool download.
    ///
    /// Pass the zero duration to disable the timeout.
    pub timeout: Duration,
}

impl Config {
    /// A configuration with defaults for everything but the layers.
    pub fn new(release: impl Into<String>, layers: Vec<String>) -> Self {
        Self {
            release: release.into(),
            layers,
            sql_dir: PathBuf::from("sql"),
            work_dir: PathBuf::from("."),
            tool: ToolSource::default(),
            zoom: Zoom::Guess,
            coalesce: false,
            hilbert: false,
            keep_intermediate: false,
            timeout: Duration::from_secs(0),
        }
    }

    pub fn sql_path(&self, layer: &str) -> PathBuf {
        self.sql_dir.join(format!("{}.sql", layer))
    }

    pub fn geojson_path(&self, layer: &str) -> PathBuf {
        self.work_dir.join(format!("{}.geojson", layer))
    }

    pub fn pmtiles_path(&self, layer: &str) -> PathBuf {
        self.work_dir.join(format!("{}.pmtiles", layer))
    }
}

/// Picks the release from an explicit value, then the environment value,
/// then [`DEFAULT_RELEASE`]. Empty strings count as unset.
pub fn resolve_release(explicit: Option<String>, from_env: Option<String>) -> String {
    explicit
        .into_iter()
        .chain(from_env)
        .find(|r| !r.is_empty())
        .unwrap_or_else(|| DEFAULT_RELEASE.to_owned())
}

/// [`resolve_release`] reading [`RELEASE_ENV`] from the process environment.
pub fn release_from_env(explicit: Option<String>) -> String {
    resolve_release(explicit, env::var(RELEASE_ENV).ok())
}
