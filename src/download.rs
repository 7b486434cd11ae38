use clap::crate_version;
use futures::prelude::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::{path::Path, time::Duration};
use tokio::{fs, io::AsyncWriteExt};
use tracing::{debug, info};

use crate::error::{Error, Result};

const ZERO_DURATION: Duration = Duration::from_secs(0);

/// Builds the HTTP client used for downloads.
pub fn client(timeout: Duration) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .user_agent(format!("overture-tiles_rs_{}", crate_version!()));
    if timeout > ZERO_DURATION {
        builder = builder.timeout(timeout);
    }

    build_client(builder)
}

fn build_client(builder: reqwest::ClientBuilder) -> Result<reqwest::Client> {
    builder.build().map_err(|source| Error::Client { source })
}

/// Streams the body of `url` into `dest`, returning the number of bytes written.
///
/// The destination is only created once the server answered with a success
/// status. If the transfer fails midway the partial file is removed.
pub async fn download(client: &reqwest::Client, url: &str, dest: &Path) -> Result<u64> {
    let download_err = |source| Error::Download {
        url: url.to_owned(),
        source,
    };

    info!(url, path = %dest.display(), "downloading");

    let response = client.get(url).send().await.map_err(download_err)?;
    let status = response.status();
    if !status.is_success() {
        return Err(Error::HttpStatus {
            url: url.to_owned(),
            status,
        });
    }

    let pb = progress_bar(response.content_length());
    let mut body = Box::pin(response.bytes_stream());

    let copied = async {
        let mut file = fs::File::create(dest).await.map_err(Error::io(dest))?;
        let mut written = 0u64;

        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(download_err)?;
            file.write_all(&chunk).await.map_err(Error::io(dest))?;
            written += chunk.len() as u64;
            pb.inc(chunk.len() as u64);
        }

        file.flush().await.map_err(Error::io(dest))?;
        Ok::<_, Error>(written)
    }
    .await;

    pb.finish_and_clear();

    match copied {
        Ok(written) => {
            info!(
                url,
                size = %pretty_bytes::converter::convert(written as f64),
                "download complete"
            );
            Ok(written)
        }
        Err(e) => {
            if let Err(rm) = fs::remove_file(dest).await {
                debug!(path = %dest.display(), error = %rm, "could not remove partial download");
            }
            Err(e)
        }
    }
}

fn progress_bar(len: Option<u64>) -> ProgressBar {
    let len = match len {
        Some(len) if !crate::logging::LogFormat::from_env().is_json() => len,
        _ => return ProgressBar::hidden(),
    };

    let pb = ProgressBar::new(len);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("[{elapsed_precise}] {bar:60.cyan/blue} {bytes:>9}/{total_bytes:9} ETA: {eta}")
    {
        pb.set_style(style.progress_chars("##-"));
    }
    pb
}
