use std::{
    collections::BTreeSet,
    fs::{self, File},
    io,
    path::{Component, Path, PathBuf},
};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::scratch::ScratchPath;

/// What [`unzip`] put on disk.
///
/// Dropping it removes every top-level file and directory the extraction
/// created. Paths that already existed in the destination are left alone.
#[derive(Debug)]
pub struct Unzipped {
    top_level: Option<PathBuf>,
    created: Vec<ScratchPath>,
}

impl Unzipped {
    /// The first top-level directory entry encountered, joined onto the
    /// destination. For source archives downloaded from GitHub this is the
    /// project root.
    pub fn top_level(&self) -> Option<&Path> {
        self.top_level.as_deref()
    }

    /// Leaves the extracted files on disk and returns the top-level directory.
    pub fn keep(self) -> Option<PathBuf> {
        for guard in self.created {
            guard.keep();
        }
        self.top_level
    }
}

/// Extracts the zip archive at `archive_path` into `destination`.
///
/// Every entry name is checked before anything is written: an entry that
/// would resolve outside `destination` (`../`, absolute paths) aborts the
/// extraction with [`Error::PathTraversal`] and leaves the file system
/// untouched. Intermediate directories are created as needed and unix
/// permissions stored in the archive are restored. If writing fails midway,
/// whatever was extracted so far is removed again.
pub fn unzip(archive_path: &Path, destination: &Path) -> Result<Unzipped> {
    let extract_err = |source| Error::Extract {
        path: archive_path.to_path_buf(),
        source,
    };

    let file = File::open(archive_path).map_err(Error::io(archive_path))?;
    let mut archive = zip::ZipArchive::new(file).map_err(extract_err)?;

    let mut targets = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let entry = archive.by_index_raw(i).map_err(extract_err)?;
        targets.push(resolve_entry(entry.name())?);
    }

    let mut roots = BTreeSet::new();
    for relative in &targets {
        if let Some(Component::Normal(root)) = relative.components().next() {
            roots.insert(destination.join(root));
        }
    }

    let mut unzipped = Unzipped {
        top_level: None,
        created: roots
            .into_iter()
            .filter(|root| !root.exists())
            .map(ScratchPath::new)
            .collect(),
    };

    for (i, relative) in targets.iter().enumerate() {
        let mut entry = archive.by_index(i).map_err(extract_err)?;
        let target = destination.join(relative);

        if entry.is_dir() {
            if unzipped.top_level.is_none() && relative.components().count() == 1 {
                unzipped.top_level = Some(target.clone());
            }
            fs::create_dir_all(&target).map_err(Error::io(&target))?;
            continue;
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(Error::io(parent))?;
        }

        let mut out = File::create(&target).map_err(Error::io(&target))?;
        io::copy(&mut entry, &mut out).map_err(Error::io(&target))?;
        debug!(path = %target.display(), "unzipped file");

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;

            fs::set_permissions(&target, fs::Permissions::from_mode(mode & 0o777))
                .map_err(Error::io(&target))?;
        }
    }

    info!(
        archive = %archive_path.display(),
        entries = targets.len(),
        directory = ?unzipped.top_level,
        "unzipped"
    );

    Ok(unzipped)
}

/// Resolves an entry name to a path relative to the destination, rejecting
/// names that climb out of it or resolve to the destination itself.
fn resolve_entry(name: &str) -> Result<PathBuf> {
    let traversal = || Error::PathTraversal {
        entry: name.to_owned(),
    };

    let mut relative = PathBuf::new();
    for component in Path::new(name).components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if !relative.pop() {
                    return Err(traversal());
                }
            }
            Component::RootDir | Component::Prefix(_) => return Err(traversal()),
        }
    }

    if relative.as_os_str().is_empty() {
        return Err(traversal());
    }

    Ok(relative)
}
