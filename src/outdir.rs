//! Output directory confinement.
//!
//! Names come straight out of an untrusted archive, so every directory or
//! file is resolved against the (canonical) output root first and refused
//! unless it lands strictly below it.

use std::fs;
use std::path::{Component, Path, PathBuf};

use error::ArchiveError;

#[derive(Debug, Clone)]
pub struct OutputRoot {
    root: PathBuf,
}

impl OutputRoot {
    /// Opens an existing directory as an output root.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ArchiveError> {
        Ok(OutputRoot {
            root: fs::canonicalize(path)?,
        })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Joins `segments` onto the root and resolves the result. Segments are
    /// joined like path components, so an absolute segment replaces
    /// everything before it and `..` climbs.
    pub fn resolve<I, S>(&self, segments: I) -> Result<PathBuf, ArchiveError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<Path>,
    {
        let mut joined = self.root.clone();
        for segment in segments {
            joined.push(segment);
        }
        let lexical = normalize(&joined);

        // The parent may already exist and contain links; resolve it for real.
        let dest = match (lexical.parent(), lexical.file_name()) {
            (Some(parent), Some(name)) => match fs::canonicalize(parent) {
                Ok(parent) => parent.join(name),
                Err(_) => lexical.clone(),
            },
            _ => lexical.clone(),
        };

        if dest == self.root || !dest.starts_with(&self.root) {
            return Err(ArchiveError::PathEscape {
                target: dest.display().to_string(),
                root: self.root.display().to_string(),
            });
        }
        Ok(dest)
    }

    pub fn create_dir<I, S>(&self, segments: I) -> Result<PathBuf, ArchiveError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<Path>,
    {
        let dest = self.resolve(segments)?;
        fs::create_dir(&dest)?;
        Ok(dest)
    }

    pub fn create_file<I, S>(&self, segments: I) -> Result<fs::File, ArchiveError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<Path>,
    {
        let dest = self.resolve(segments)?;
        Ok(fs::File::create(&dest)?)
    }
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
