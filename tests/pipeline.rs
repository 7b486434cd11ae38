use std::{
    cell::RefCell,
    fs,
    io::Write,
    path::{Path, PathBuf},
    rc::Rc,
};

use overture_tiles::{
    CommandRunner, Config, Error, Pipeline, QueryEngine, Result, Stage, ToolCommand, ToolSource,
};

#[derive(Debug, PartialEq)]
enum Call {
    Query(String),
    Run(ToolCommand),
}

type Log = Rc<RefCell<Vec<Call>>>;

/// Records the SQL and writes a stand-in GeoJSON file where the query would.
struct FakeEngine {
    log: Log,
    output: PathBuf,
}

impl QueryEngine for FakeEngine {
    fn execute(&self, sql: &str) -> Result<()> {
        self.log.borrow_mut().push(Call::Query(sql.to_owned()));
        fs::write(&self.output, r#"{"type":"FeatureCollection","features":[]}"#).unwrap();
        Ok(())
    }
}

/// Records commands. `make` succeeds silently, tippecanoe writes its `-o` file.
struct FakeRunner {
    log: Log,
    fail_with: Option<i32>,
}

impl CommandRunner for FakeRunner {
    fn run(&self, cmd: &ToolCommand) -> Result<String> {
        self.log.borrow_mut().push(Call::Run(cmd.clone()));

        if let Some(code) = self.fail_with {
            return Err(failed(&cmd.program_name(), code));
        }

        if let Some(pos) = cmd.args.iter().position(|a| a == "-o") {
            fs::write(&cmd.args[pos + 1], b"PMTiles").unwrap();
        }
        Ok(String::new())
    }
}

#[cfg(unix)]
fn failed(program: &str, code: i32) -> Error {
    use std::os::unix::process::ExitStatusExt;

    Error::CommandFailed {
        program: program.to_owned(),
        status: std::process::ExitStatus::from_raw(code << 8),
        output: "tippecanoe: out of memory".to_owned(),
    }
}

#[cfg(not(unix))]
fn failed(program: &str, _code: i32) -> Error {
    Error::Spawn {
        program: program.to_owned(),
        source: std::io::Error::new(std::io::ErrorKind::Other, "failed"),
    }
}

const TEMPLATE: &str = "INSTALL spatial; LOAD spatial;\n\
    COPY (SELECT * FROM read_parquet('s3://overturemaps-us-west-2/release/{{RELEASE}}/theme=transportation/type=segment/*'))\n\
    TO '{{FILE_NAME}}' WITH (FORMAT GDAL, DRIVER 'GeoJSON');";

fn setup(dir: &Path) -> Config {
    let sql_dir = dir.join("sql");
    fs::create_dir(&sql_dir).unwrap();
    fs::write(sql_dir.join("roads.sql"), TEMPLATE).unwrap();

    let mut config = Config::new("2025-11-19.0", vec!["roads".to_owned()]);
    config.sql_dir = sql_dir;
    config.work_dir = dir.to_path_buf();
    config.tool = ToolSource::Existing(PathBuf::from("/opt/bin/tippecanoe"));
    config
}

#[tokio::test]
async fn queries_then_builds_with_fixed_flags() {
    let dir = tempfile::tempdir().unwrap();
    let config = setup(dir.path());
    let geojson = config.geojson_path("roads");
    let pmtiles = config.pmtiles_path("roads");

    let log = Log::default();
    let engine = FakeEngine {
        log: log.clone(),
        output: geojson.clone(),
    };
    let runner = FakeRunner {
        log: log.clone(),
        fail_with: None,
    };

    let outputs = Pipeline::new(config, engine, runner).run().await.unwrap();

    let expected_sql = TEMPLATE
        .replace("{{RELEASE}}", "2025-11-19.0")
        .replace("{{FILE_NAME}}", &geojson.to_string_lossy());
    let expected_cmd = ToolCommand::new("/opt/bin/tippecanoe")
        .arg("-f")
        .arg("-o")
        .arg(&pmtiles)
        .arg("-l")
        .arg("roads")
        .arg("-zg")
        .arg(&geojson);

    assert_eq!(
        *log.borrow(),
        vec![Call::Query(expected_sql), Call::Run(expected_cmd)]
    );
    assert_eq!(outputs, vec![pmtiles.clone()]);
    assert!(pmtiles.is_file());
    assert!(!geojson.exists(), "intermediate GeoJSON should be removed");
}

#[tokio::test]
async fn keeps_intermediate_when_asked() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = setup(dir.path());
    config.keep_intermediate = true;
    let geojson = config.geojson_path("roads");

    let log = Log::default();
    let engine = FakeEngine {
        log: log.clone(),
        output: geojson.clone(),
    };
    let runner = FakeRunner {
        log,
        fail_with: None,
    };

    Pipeline::new(config, engine, runner).run().await.unwrap();

    assert!(geojson.is_file());
}

#[tokio::test]
async fn build_failure_is_reported_and_cleans_up() {
    let dir = tempfile::tempdir().unwrap();
    let config = setup(dir.path());
    let geojson = config.geojson_path("roads");
    let pmtiles = config.pmtiles_path("roads");

    let log = Log::default();
    let engine = FakeEngine {
        log: log.clone(),
        output: geojson.clone(),
    };
    let runner = FakeRunner {
        log: log.clone(),
        fail_with: Some(2),
    };

    let err = Pipeline::new(config, engine, runner).run().await.unwrap_err();

    assert_eq!(err.stage, Stage::BuildTiles);
    assert_eq!(err.to_string(), "build-tiles stage failed");
    assert_eq!(log.borrow().len(), 2);
    assert!(!geojson.exists());
    assert!(!pmtiles.exists());
}

/// Serves `body` as a single HTTP response on a local port.
fn serve_once(body: Vec<u8>) -> String {
    use std::{io::Read, net::TcpListener, thread};

    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    thread::spawn(move || {
        let (mut socket, _) = listener.accept().unwrap();
        let mut buf = [0u8; 1024];
        let _ = socket.read(&mut buf);
        write!(
            socket,
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        )
        .unwrap();
        socket.write_all(&body).unwrap();
    });

    format!("http://{}/main.zip", addr)
}

fn source_zip() -> Vec<u8> {
    let mut zip = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default();
    zip.add_directory("tippecanoe-main/", options).unwrap();
    zip.start_file("tippecanoe-main/Makefile", options).unwrap();
    zip.write_all(b"all:\n\ttouch tippecanoe\n").unwrap();
    zip.finish().unwrap().into_inner()
}

#[tokio::test]
async fn downloads_and_builds_tool_from_source() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = setup(dir.path());
    config.tool = ToolSource::Build {
        url: serve_once(source_zip()),
    };
    let geojson = config.geojson_path("roads");
    let source_dir = dir.path().join("tippecanoe-main");

    let log = Log::default();
    let engine = FakeEngine {
        log: log.clone(),
        output: geojson.clone(),
    };
    let runner = FakeRunner {
        log: log.clone(),
        fail_with: None,
    };

    Pipeline::new(config, engine, runner).run().await.unwrap();

    let log = log.borrow();
    assert_eq!(log.len(), 3);
    assert!(matches!(log[0], Call::Query(_)));
    match (&log[1], &log[2]) {
        (Call::Run(make), Call::Run(build)) => {
            assert_eq!(make.program, PathBuf::from("make"));
            assert_eq!(make.current_dir.as_deref(), Some(source_dir.as_path()));
            assert_eq!(build.program, source_dir.join("tippecanoe"));
        }
        other => panic!("unexpected calls {:?}", other),
    }

    assert!(!dir.path().join("tippecanoe.zip").exists());
    assert!(!source_dir.exists(), "tool sources should be removed");
}

fn zip_of(dirs: &[&str], files: &[(&str, &str)]) -> Vec<u8> {
    let mut zip = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default();
    for dir in dirs {
        zip.add_directory(*dir, options).unwrap();
    }
    for (name, contents) in files {
        zip.start_file(*name, options).unwrap();
        zip.write_all(contents.as_bytes()).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

/// Runs the roads pipeline building tippecanoe from `archive`.
async fn run_building_from(
    dir: &Path,
    archive: Vec<u8>,
) -> std::result::Result<Vec<PathBuf>, overture_tiles::PipelineError> {
    let mut config = setup(dir);
    config.tool = ToolSource::Build {
        url: serve_once(archive),
    };

    let log = Log::default();
    let engine = FakeEngine {
        log: log.clone(),
        output: config.geojson_path("roads"),
    };
    let runner = FakeRunner {
        log,
        fail_with: None,
    };

    Pipeline::new(config, engine, runner).run().await
}

#[tokio::test]
async fn archive_without_directory_entry_is_cleaned_up() {
    let dir = tempfile::tempdir().unwrap();
    let archive = zip_of(&[], &[("tippecanoe-main/Makefile", "all:\n")]);

    let err = run_building_from(dir.path(), archive).await.unwrap_err();

    assert_eq!(err.stage, Stage::AcquireTool);
    assert!(matches!(err.source, Error::MissingToolDirectory { .. }));
    assert!(!dir.path().join("tippecanoe-main").exists());
    assert!(!dir.path().join("tippecanoe.zip").exists());
    assert!(!dir.path().join("roads.geojson").exists());
}

#[tokio::test]
async fn failed_extraction_is_cleaned_up() {
    let dir = tempfile::tempdir().unwrap();
    // `tippecanoe-main/src` is a file, so the entry below it cannot be written.
    let archive = zip_of(
        &["tippecanoe-main/"],
        &[
            ("tippecanoe-main/Makefile", "all:\n"),
            ("tippecanoe-main/src", "oops"),
            ("tippecanoe-main/src/main.cpp", "int main() {}\n"),
        ],
    );

    let err = run_building_from(dir.path(), archive).await.unwrap_err();

    assert_eq!(err.stage, Stage::AcquireTool);
    assert!(matches!(err.source, Error::Io { .. }));
    assert!(!dir.path().join("tippecanoe-main").exists());
}

#[tokio::test]
async fn existing_source_directory_is_not_removed() {
    let dir = tempfile::tempdir().unwrap();
    let checkout = dir.path().join("tippecanoe-main");
    fs::create_dir(&checkout).unwrap();
    fs::write(checkout.join("NOTES"), "local changes").unwrap();

    run_building_from(dir.path(), source_zip()).await.unwrap();

    assert_eq!(
        fs::read_to_string(checkout.join("NOTES")).unwrap(),
        "local changes"
    );
}

#[tokio::test]
async fn keeps_intermediate_when_a_later_layer_fails() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = setup(dir.path());
    config.layers.push("water".to_owned());
    config.keep_intermediate = true;
    let geojson = config.geojson_path("roads");

    let log = Log::default();
    let engine = FakeEngine {
        log: log.clone(),
        output: geojson.clone(),
    };
    let runner = FakeRunner {
        log,
        fail_with: None,
    };

    let err = Pipeline::new(config, engine, runner).run().await.unwrap_err();

    assert_eq!(err.stage, Stage::Query);
    assert!(geojson.is_file());
}
