use std::path::{Component, Path, PathBuf};

use crate::error::{Error, Result};

/// Result of sanitizing an archive entry path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SanitizedPath {
    /// Entry name as stored in the archive.
    pub original: String,
    /// Path relative to the destination, after stripping.
    pub relative: PathBuf,
    /// Absolute target inside the destination.
    pub resolved: PathBuf,
}

/// Resolve an archive entry name beneath `base`.
///
/// Both `/` and `\` separate components. Absolute names, drive prefixes and
/// any `..` that climbs above the archive root are rejected with
/// [`Error::PathTraversal`]; `..` inside the tree is resolved.
pub fn sanitize_path(entry_name: &str, base: &Path, strip: usize) -> Result<SanitizedPath> {
    let traversal = |resolved: PathBuf| Error::PathTraversal {
        entry: entry_name.to_string(),
        resolved,
    };

    let unified = entry_name.replace('\\', "/");
    let normalized = normalize(Path::new(&unified)).map_err(|p| traversal(base.join(p)))?;
    let relative = strip_components(entry_name, normalized, strip)?;
    let resolved = base.join(&relative);

    if !resolved.starts_with(base) {
        return Err(traversal(resolved));
    }

    Ok(SanitizedPath {
        original: entry_name.to_string(),
        relative,
        resolved,
    })
}

/// Collapse `.` and `..` without touching the filesystem. On escape, returns
/// the offending path as far as it was read.
fn normalize(path: &Path) -> std::result::Result<Vec<PathBuf>, PathBuf> {
    let mut parts: Vec<PathBuf> = Vec::new();

    for component in path.components() {
        match component {
            Component::Normal(part) => parts.push(PathBuf::from(part)),
            Component::CurDir => {}
            Component::ParentDir => {
                if parts.pop().is_none() {
                    return Err(PathBuf::from(".."));
                }
            }
            Component::RootDir | Component::Prefix(_) => return Err(path.to_path_buf()),
        }
    }

    Ok(parts)
}

fn strip_components(original: &str, parts: Vec<PathBuf>, count: usize) -> Result<PathBuf> {
    if parts.len() <= count {
        return Err(Error::NoComponentsRemaining {
            original: original.to_string(),
            count,
        });
    }
    Ok(parts.into_iter().skip(count).collect())
}
