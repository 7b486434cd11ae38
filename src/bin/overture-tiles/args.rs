use clap::{command, Arg, ArgAction, ArgMatches};
use std::{path::PathBuf, time::Duration};

use crate::validators::*;
use overture_tiles::{release_from_env, Config, ToolSource, Zoom, DEFAULT_TIPPECANOE_URL};

const LAYERS_ARG: &str = "layers";
const RELEASE_ARG: &str = "release";
const SQL_DIR_ARG: &str = "sql_dir";
const WORK_DIR_ARG: &str = "work_dir";
const TIPPECANOE_URL_ARG: &str = "tippecanoe_url";
const TIPPECANOE_ARG: &str = "tippecanoe";
const MIN_ZOOM_ARG: &str = "min_zoom";
const MAX_ZOOM_ARG: &str = "max_zoom";
const COALESCE_ARG: &str = "coalesce";
const HILBERT_ARG: &str = "hilbert";
const KEEP_INTERMEDIATE_ARG: &str = "keep_intermediate";
const TIMEOUT_ARG: &str = "timeout";
const DRY_RUN_ARG: &str = "dry_run";

#[derive(Debug, PartialEq)]
pub struct Args {
    pub release: Option<String>,
    pub layers: Vec<String>,
    pub sql_dir: PathBuf,
    pub work_dir: PathBuf,
    pub tippecanoe_url: String,
    pub tippecanoe: Option<PathBuf>,
    pub min_zoom: Option<u8>,
    pub max_zoom: Option<u8>,
    pub coalesce: bool,
    pub hilbert: bool,
    pub keep_intermediate: bool,
    pub timeout: Duration,
    pub dry_run: bool,
}

impl TryFrom<Args> for Config {
    type Error = overture_tiles::Error;

    fn try_from(args: Args) -> Result<Self, Self::Error> {
        let zoom = match (args.min_zoom, args.max_zoom) {
            (Some(min), Some(max)) => Zoom::range(min, max)?,
            _ => Zoom::Guess,
        };

        let tool = match args.tippecanoe {
            Some(path) => ToolSource::Existing(path),
            None => ToolSource::Build {
                url: args.tippecanoe_url,
            },
        };

        Ok(Self {
            release: release_from_env(args.release),
            layers: args.layers,
            sql_dir: args.sql_dir,
            work_dir: args.work_dir,
            tool,
            zoom,
            coalesce: args.coalesce,
            hilbert: args.hilbert,
            keep_intermediate: args.keep_intermediate,
            timeout: args.timeout,
        })
    }
}

impl Args {
    pub fn parse() -> Self {
        Self::from_matches(&cli().get_matches())
    }

    fn from_matches(matches: &ArgMatches) -> Self {
        Self {
            release: matches.get_one::<String>(RELEASE_ARG).cloned(),
            layers: matches
                .get_many::<String>(LAYERS_ARG)
                .map(|layers| layers.cloned().collect())
                .unwrap_or_default(),
            sql_dir: path_arg(matches, SQL_DIR_ARG),
            work_dir: path_arg(matches, WORK_DIR_ARG),
            tippecanoe_url: matches
                .get_one::<String>(TIPPECANOE_URL_ARG)
                .cloned()
                .unwrap_or_else(|| DEFAULT_TIPPECANOE_URL.to_owned()),
            tippecanoe: matches.get_one::<String>(TIPPECANOE_ARG).map(PathBuf::from),
            min_zoom: matches.get_one::<u8>(MIN_ZOOM_ARG).copied(),
            max_zoom: matches.get_one::<u8>(MAX_ZOOM_ARG).copied(),
            coalesce: matches.get_flag(COALESCE_ARG),
            hilbert: matches.get_flag(HILBERT_ARG),
            keep_intermediate: matches.get_flag(KEEP_INTERMEDIATE_ARG),
            timeout: Duration::from_secs(
                matches.get_one::<u64>(TIMEOUT_ARG).copied().unwrap_or(0),
            ),
            dry_run: matches.get_flag(DRY_RUN_ARG),
        }
    }
}

fn path_arg(matches: &ArgMatches, id: &str) -> PathBuf {
    matches
        .get_one::<String>(id)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

fn cli() -> clap::Command {
    command!()
        .arg(
            Arg::new(LAYERS_ARG)
                .help("The layers to build. Each needs a `<sql-dir>/<layer>.sql` template.")
                .value_name("LAYER")
                .value_parser(is_layer_name)
                .num_args(1..)
                .required(true),
        )
        .arg(
            Arg::new(RELEASE_ARG)
                .help("The Overture release to query. Defaults to $OVERTURE_RELEASE, then a built-in release.")
                .short('r')
                .long("release"),
        )
        .arg(
            Arg::new(SQL_DIR_ARG)
                .help("The folder containing the SQL templates. `{{RELEASE}}` and `{{FILE_NAME}}` are substituted before running them.")
                .default_value("sql")
                .long("sql-dir"),
        )
        .arg(
            Arg::new(WORK_DIR_ARG)
                .help("The folder to write GeoJSON, tippecanoe sources and PMTiles to.")
                .default_value(".")
                .short('w')
                .long("work-dir"),
        )
        .arg(
            Arg::new(TIPPECANOE_URL_ARG)
                .help("Zipped tippecanoe source tree to download and build.")
                .default_value(DEFAULT_TIPPECANOE_URL)
                .long("tippecanoe-url"),
        )
        .arg(
            Arg::new(TIPPECANOE_ARG)
                .help("Use an installed tippecanoe binary instead of building one.")
                .conflicts_with(TIPPECANOE_URL_ARG)
                .long("tippecanoe"),
        )
        .arg(
            Arg::new(MIN_ZOOM_ARG)
                .help("The minimum zoom level to build")
                .value_parser(is_zoom)
                .requires(MAX_ZOOM_ARG)
                .long("min-zoom"),
        )
        .arg(
            Arg::new(MAX_ZOOM_ARG)
                .help("The maximum zoom level to build. Without a range tippecanoe guesses one (-zg).")
                .value_parser(is_zoom)
                .requires(MIN_ZOOM_ARG)
                .long("max-zoom"),
        )
        .arg(
            Arg::new(COALESCE_ARG)
                .help("Coalesce consecutive features with the same attributes")
                .action(ArgAction::SetTrue)
                .long("coalesce"),
        )
        .arg(
            Arg::new(HILBERT_ARG)
                .help("Order features along a Hilbert curve")
                .action(ArgAction::SetTrue)
                .long("hilbert"),
        )
        .arg(
            Arg::new(KEEP_INTERMEDIATE_ARG)
                .help("Keep the GeoJSON files after building tiles")
                .action(ArgAction::SetTrue)
                .long("keep-intermediate"),
        )
        .arg(
            Arg::new(TIMEOUT_ARG)
                .help("The timeout (in seconds) for downloading tippecanoe. Pass 0 for no timeout.")
                .value_parser(is_seconds)
                .default_value("0")
                .short('t')
                .long("timeout"),
        )
        .arg(
            Arg::new(DRY_RUN_ARG)
                .help("Don't run anything, just print the queries and tippecanoe commands.")
                .action(ArgAction::SetTrue)
                .long("dry-run"),
        )
}
