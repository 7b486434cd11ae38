use std::{
    ffi::{OsStr, OsString},
    fmt,
    path::{Path, PathBuf},
    process::Command,
};
use tracing::{debug, info};

use crate::error::{tail, Error, Result};

/// Deepest zoom level tippecanoe is asked to build.
pub const MAX_ZOOM: u8 = 24;

/// How much subprocess output is kept in an error.
const OUTPUT_TAIL: usize = 4096;

/// Zoom levels to generate.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Zoom {
    /// Let tippecanoe pick a maximum zoom from the data density (`-zg`).
    #[default]
    Guess,

    /// An explicit range (`-Z<min> -z<max>`), built with [`Zoom::range`].
    Range(ZoomRange),
}

/// A zoom range with `min <= max <= MAX_ZOOM`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ZoomRange {
    min: u8,
    max: u8,
}

impl ZoomRange {
    pub fn min(&self) -> u8 {
        self.min
    }

    pub fn max(&self) -> u8 {
        self.max
    }
}

impl Zoom {
    pub fn range(min: u8, max: u8) -> Result<Self> {
        if min > max || max > MAX_ZOOM {
            return Err(Error::InvalidZoom { min, max });
        }
        Ok(Zoom::Range(ZoomRange { min, max }))
    }
}

/// A program invocation with a fixed argument vector.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ToolCommand {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub current_dir: Option<PathBuf>,
}

impl ToolCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_owned());
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    pub fn program_name(&self) -> String {
        self.program.display().to_string()
    }
}

impl fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

/// Runs [`ToolCommand`]s to completion.
pub trait CommandRunner {
    /// Runs `cmd`, returning its combined stdout and stderr. A spawn failure
    /// or non-zero exit is an error.
    fn run(&self, cmd: &ToolCommand) -> Result<String>;
}

/// Runs commands as child processes of this one.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, cmd: &ToolCommand) -> Result<String> {
        info!(command = %cmd, dir = ?cmd.current_dir, "running command");

        let mut command = Command::new(&cmd.program);
        command.args(&cmd.args);
        if let Some(dir) = &cmd.current_dir {
            command.current_dir(dir);
        }

        let output = command.output().map_err(|source| Error::Spawn {
            program: cmd.program_name(),
            source,
        })?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        if !output.status.success() {
            return Err(Error::CommandFailed {
                program: cmd.program_name(),
                status: output.status,
                output: tail(&combined, OUTPUT_TAIL).to_owned(),
            });
        }

        debug!(command = %cmd, output = %combined, "command finished");
        Ok(combined)
    }
}

/// A single tippecanoe run turning one GeoJSON file into a PMTiles archive.
#[derive(Clone, Debug, PartialEq)]
pub struct TileBuild {
    pub output: PathBuf,
    pub layer: String,
    pub zoom: Zoom,
    pub coalesce: bool,
    pub hilbert: bool,
    pub input: PathBuf,
}

impl TileBuild {
    pub fn new(layer: impl Into<String>, input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            output: output.into(),
            layer: layer.into(),
            zoom: Zoom::Guess,
            coalesce: false,
            hilbert: false,
            input: input.into(),
        }
    }

    pub fn zoom(mut self, zoom: Zoom) -> Self {
        self.zoom = zoom;
        self
    }

    pub fn coalesce(mut self, yes: bool) -> Self {
        self.coalesce = yes;
        self
    }

    pub fn hilbert(mut self, yes: bool) -> Self {
        self.hilbert = yes;
        self
    }

    /// The argument vector, always in the order
    /// `-f -o <output> -l <layer> <zoom> [--coalesce] [--hilbert] <input>`.
    pub fn args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "-f".into(),
            "-o".into(),
            self.output.clone().into_os_string(),
            "-l".into(),
            self.layer.clone().into(),
        ];

        match self.zoom {
            Zoom::Guess => args.push("-zg".into()),
            Zoom::Range(range) => {
                args.push(format!("-Z{}", range.min()).into());
                args.push(format!("-z{}", range.max()).into());
            }
        }
        if self.coalesce {
            args.push("--coalesce".into());
        }
        if self.hilbert {
            args.push("--hilbert".into());
        }

        args.push(self.input.clone().into_os_string());
        args
    }

    pub fn command(&self, binary: &Path) -> ToolCommand {
        self.args()
            .into_iter()
            .fold(ToolCommand::new(binary), ToolCommand::arg)
    }
}

/// The build invocation for an unpacked tippecanoe source tree.
pub fn make_command(source_dir: &Path) -> ToolCommand {
    ToolCommand::new("make").arg("-j").current_dir(source_dir)
}

/// Builds tippecanoe in `source_dir` and returns the path of the binary.
pub fn build_from_source<R: CommandRunner + ?Sized>(runner: &R, source_dir: &Path) -> Result<PathBuf> {
    info!(dir = %source_dir.display(), "building tippecanoe");
    runner.run(&make_command(source_dir))?;

    let binary = source_dir.join("tippecanoe");
    info!(binary = %binary.display(), "tippecanoe built");
    Ok(binary)
}
