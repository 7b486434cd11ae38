use maplit::hashmap;
use std::{collections::HashMap, fs, path::Path};
use tracing::info;

use crate::error::{Error, Result};

/// Placeholder replaced by the Overture release.
pub const RELEASE_TOKEN: &str = "RELEASE";

/// Placeholder replaced by the output file name.
pub const FILE_NAME_TOKEN: &str = "FILE_NAME";

/// A SQL file containing `{{NAME}}` placeholders.
#[derive(Clone, Debug, PartialEq)]
pub struct SqlTemplate {
    text: String,
}

impl SqlTemplate {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn load(path: &Path) -> Result<Self> {
        fs::read_to_string(path)
            .map(Self::new)
            .map_err(Error::io(path))
    }

    /// Replaces every `{{key}}` with its value.
    ///
    /// Substitution is literal: values are neither quoted nor escaped, and
    /// unknown placeholders are left as they are.
    pub fn render(&self, vars: &HashMap<&str, &str>) -> String {
        vars.iter().fold(self.text.clone(), |sql, (key, value)| {
            sql.replace(&format!("{{{{{}}}}}", key), value)
        })
    }

    /// Renders the template for one layer of one release.
    pub fn render_layer(&self, release: &str, file_name: &str) -> String {
        self.render(&hashmap! {
            RELEASE_TOKEN => release,
            FILE_NAME_TOKEN => file_name,
        })
    }
}

/// Something that can execute a rendered query.
pub trait QueryEngine {
    fn execute(&self, sql: &str) -> Result<()>;
}

/// In-memory DuckDB, opened fresh for every query.
#[derive(Clone, Copy, Debug, Default)]
pub struct DuckDb;

impl QueryEngine for DuckDb {
    fn execute(&self, sql: &str) -> Result<()> {
        let conn = duckdb::Connection::open_in_memory().map_err(|source| Error::Query { source })?;
        conn.execute_batch(sql)
            .map_err(|source| Error::Query { source })
    }
}

/// Loads `template_path`, fills in the release and `output`'s file name and
/// runs it. The query itself is expected to `COPY` its result to `output`.
pub fn run_query<E: QueryEngine + ?Sized>(
    engine: &E,
    template_path: &Path,
    release: &str,
    output: &Path,
) -> Result<()> {
    info!(path = %template_path.display(), "loading sql query");
    let template = SqlTemplate::load(template_path)?;
    let sql = template.render_layer(release, &output.to_string_lossy());

    info!(release, "running query");
    engine.execute(&sql)?;

    info!(path = %output.display(), "query output saved");
    Ok(())
}
