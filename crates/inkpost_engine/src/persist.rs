use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use inkpost_logging::ink_debug;
use thiserror::Error;

const STAGING_PREFIX: &str = ".inkpost-";

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("{0} exists but is not a directory")]
    NotADirectory(PathBuf),
    #[error("cannot create {path}: {source}")]
    CreateDir { path: PathBuf, source: io::Error },
    #[error("cannot write {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
}

/// Creates `dir` (and parents) unless it is already a directory.
pub fn ensure_output_dir(dir: &Path) -> Result<(), PersistError> {
    match fs::metadata(dir) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(PersistError::NotADirectory(dir.to_path_buf())),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            fs::create_dir_all(dir).map_err(|source| PersistError::CreateDir {
                path: dir.to_path_buf(),
                source,
            })
        }
        Err(source) => Err(PersistError::CreateDir {
            path: dir.to_path_buf(),
            source,
        }),
    }
}

/// Replaces files in one directory by staging a sibling and renaming it over
/// the target; an interrupted write leaves the previous version intact.
#[derive(Debug, Clone)]
pub struct AtomicFileWriter {
    dir: PathBuf,
}

impl AtomicFileWriter {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn write(
        &self,
        filename: &str,
        content: impl AsRef<[u8]>,
    ) -> Result<PathBuf, PersistError> {
        ensure_output_dir(&self.dir)?;
        let target = self.dir.join(filename);
        let failed = |source: io::Error| PersistError::Write {
            path: target.clone(),
            source,
        };

        let mut staged = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempfile_in(&self.dir)
            .map_err(failed)?;
        staged.write_all(content.as_ref()).map_err(failed)?;
        staged.as_file().sync_all().map_err(failed)?;
        staged
            .persist(&target)
            .map_err(|err| failed(err.error))?;

        ink_debug!("Wrote {}", target.display());
        Ok(target)
    }
}
