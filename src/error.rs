use std::{fmt, io, path::PathBuf, process::ExitStatus};

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong while producing tiles.
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed building the HTTP client")]
    Client {
        #[source]
        source: reqwest::Error,
    },

    #[error("failed downloading {url}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("received status {status} downloading {url}")]
    HttpStatus {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("failed extracting archive {}", path.display())]
    Extract {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("archive entry `{entry}` escapes the destination directory")]
    PathTraversal { entry: String },

    #[error("archive {} has no top-level directory", archive.display())]
    MissingToolDirectory { archive: PathBuf },

    #[error("query failed")]
    Query {
        #[source]
        source: duckdb::Error,
    },

    #[error("failed to spawn `{program}`")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("`{program}` exited with {status}: {output}")]
    CommandFailed {
        program: String,
        status: ExitStatus,
        output: String,
    },

    #[error("invalid zoom range {min}..={max}")]
    InvalidZoom { min: u8, max: u8 },

    #[error("I/O error on {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> Self {
        let path = path.into();
        move |source| Error::Io { path, source }
    }
}

/// The pipeline stages, in the order they run.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Stage {
    Query,
    AcquireTool,
    BuildTiles,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Query => "query",
            Stage::AcquireTool => "acquire-tool",
            Stage::BuildTiles => "build-tiles",
        })
    }
}

/// An [`Error`] tagged with the stage that produced it.
#[derive(Debug, Error)]
#[error("{stage} stage failed")]
pub struct PipelineError {
    pub stage: Stage,
    #[source]
    pub source: Error,
}

pub(crate) trait StageExt<T> {
    fn stage(self, stage: Stage) -> std::result::Result<T, PipelineError>;
}

impl<T> StageExt<T> for Result<T> {
    fn stage(self, stage: Stage) -> std::result::Result<T, PipelineError> {
        self.map_err(|source| PipelineError { stage, source })
    }
}

/// Keeps at most the last `limit` bytes of subprocess output, on a char boundary.
pub(crate) fn tail(output: &str, limit: usize) -> &str {
    if output.len() <= limit {
        return output;
    }

    let mut start = output.len() - limit;
    while !output.is_char_boundary(start) {
        start += 1;
    }
    &output[start..]
}
