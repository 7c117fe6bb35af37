use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use inkpost_core::{AssetTransitionError, LocalAsset};
use inkpost_logging::{ink_debug, ink_warn};

use crate::filename::smart_image_name;

pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp", "webp", "svg", "tiff"];

const MAX_SEARCH_DEPTH: usize = 6;

pub fn is_image_path(link: &str) -> bool {
    Path::new(link)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}

pub fn mime_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "tiff" => "image/tiff",
        _ => "application/octet-stream",
    }
}

/// Local images registered while rendering the current document.
///
/// Written by the image extension, advanced in place by the upload loop and
/// read by the URL rewrite step.
#[derive(Debug, Default)]
pub struct AssetRegistry {
    assets: Mutex<Vec<LocalAsset>>,
}

impl AssetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an asset unless one with the same path exists; returns the
    /// placeholder URL the HTML should use either way.
    pub fn register(&self, path: PathBuf, reference: &str) -> String {
        let mut assets = self.assets.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = assets.iter().find(|asset| asset.path == path) {
            return existing.res_url.clone();
        }
        let res_url = placeholder_url(&path);
        assets.push(LocalAsset::new(path, res_url.clone(), reference));
        res_url
    }

    pub fn snapshot(&self) -> Vec<LocalAsset> {
        self.assets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.assets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.assets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Applies `change` to the asset at `path`.
    pub fn update<F>(&self, path: &Path, change: F) -> Result<(), AssetTransitionError>
    where
        F: FnOnce(&mut LocalAsset) -> Result<(), AssetTransitionError>,
    {
        let mut assets = self.assets.lock().unwrap_or_else(PoisonError::into_inner);
        match assets.iter_mut().find(|asset| asset.path == path) {
            Some(asset) => change(asset),
            None => Ok(()),
        }
    }

    /// Swaps every placeholder `src` for the uploaded URL.
    pub fn rewrite_sources(&self, html: &str) -> String {
        let assets = self.assets.lock().unwrap_or_else(PoisonError::into_inner);
        let mut output = html.to_string();
        for asset in assets.iter() {
            if let Some(remote) = asset.remote_url() {
                output = output.replace(
                    &format!("src=\"{}\"", asset.res_url),
                    &format!("src=\"{remote}\""),
                );
            }
        }
        output
    }
}

fn placeholder_url(path: &Path) -> String {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };
    url::Url::from_file_path(&absolute)
        .map(|url| url.to_string())
        .unwrap_or_else(|_| absolute.to_string_lossy().into_owned())
}

/// Maps a link as written in a note to a file on disk.
pub trait PathResolver: Send + Sync {
    fn resolve(&self, link: &str, base_dir: &Path) -> Option<PathBuf>;
}

/// Resolves links relative to the note, then the vault root, then by bare
/// file name anywhere under the vault root.
#[derive(Debug, Clone, Default)]
pub struct VaultResolver {
    root: Option<PathBuf>,
}

impl VaultResolver {
    pub fn new(root: Option<PathBuf>) -> Self {
        Self { root }
    }
}

impl PathResolver for VaultResolver {
    fn resolve(&self, link: &str, base_dir: &Path) -> Option<PathBuf> {
        let link = link.replace("%20", " ");
        let relative = Path::new(&link);
        if relative.is_absolute() && relative.is_file() {
            return Some(relative.to_path_buf());
        }
        let candidate = base_dir.join(relative);
        if candidate.is_file() {
            return Some(candidate);
        }
        let root = self.root.as_deref()?;
        let candidate = root.join(relative);
        if candidate.is_file() {
            return Some(candidate);
        }
        let name = relative.file_name()?;
        search_by_name(root, name, 0)
    }
}

fn search_by_name(dir: &Path, name: &std::ffi::OsStr, depth: usize) -> Option<PathBuf> {
    if depth > MAX_SEARCH_DEPTH {
        return None;
    }
    let entries = fs::read_dir(dir).ok()?;
    let mut subdirs = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            let hidden = path
                .file_name()
                .map(|n| n.to_string_lossy().starts_with('.'))
                .unwrap_or(false);
            if !hidden {
                subdirs.push(path);
            }
        } else if path.file_name() == Some(name) {
            return Some(path);
        }
    }
    subdirs.sort();
    subdirs
        .iter()
        .find_map(|sub| search_by_name(sub, name, depth + 1))
}

/// Reads asset bytes.
#[async_trait::async_trait]
pub trait AssetReader: Send + Sync {
    async fn read(&self, path: &Path) -> std::io::Result<Vec<u8>>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FsAssetReader;

#[async_trait::async_trait]
impl AssetReader for FsAssetReader {
    async fn read(&self, path: &Path) -> std::io::Result<Vec<u8>> {
        tokio::fs::read(path).await
    }
}

/// An asset ready to hand to the upload call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingUpload {
    pub path: PathBuf,
    pub filename: String,
    pub base64: String,
}

/// A pending asset whose bytes could not be read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnreadableAsset {
    pub path: PathBuf,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetScan {
    pub uploads: Vec<PendingUpload>,
    pub unreadable: Vec<UnreadableAsset>,
}

/// Collects every pending asset with its bytes encoded and an upload name
/// derived from the document title and the section the image sits in.
/// Reads only; registry state is left for the upload loop to advance.
pub async fn scan_pending(
    registry: &AssetRegistry,
    reader: &dyn AssetReader,
    title: &str,
    markdown: &str,
) -> AssetScan {
    let pending: Vec<LocalAsset> = registry
        .snapshot()
        .into_iter()
        .filter(LocalAsset::is_pending)
        .collect();

    let mut scan = AssetScan::default();
    for (index, asset) in pending.iter().enumerate() {
        let bytes = match reader.read(&asset.path).await {
            Ok(bytes) => bytes,
            Err(err) => {
                ink_warn!("Cannot read asset {:?}: {}", asset.path, err);
                scan.unreadable.push(UnreadableAsset {
                    path: asset.path.clone(),
                    message: err.to_string(),
                });
                continue;
            }
        };
        let original = asset
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| asset.reference.clone());
        let section = find_image_section(markdown, &asset.reference);
        let filename = smart_image_name(title, &section, index, &original);
        ink_debug!("Asset {:?} -> {} ({} bytes)", asset.path, filename, bytes.len());
        scan.uploads.push(PendingUpload {
            path: asset.path.clone(),
            filename,
            base64: STANDARD.encode(&bytes),
        });
    }
    scan
}

/// Nearest `## ` heading above the line that references `reference`,
/// else the nearest `# ` heading, else an empty string.
pub fn find_image_section(markdown: &str, reference: &str) -> String {
    let lines: Vec<&str> = markdown.lines().collect();
    let file_name = reference.rsplit('/').next().unwrap_or(reference);
    let stem = file_name
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .unwrap_or(file_name);

    let Some(line_index) = lines.iter().position(|line| {
        (!file_name.is_empty() && line.contains(file_name))
            || (!reference.is_empty() && line.contains(reference))
            || (line.contains("![[") && !stem.is_empty() && line.contains(stem))
    }) else {
        return String::new();
    };

    let preceding = &lines[..=line_index];
    let heading = |prefix: &str| {
        preceding.iter().rev().find_map(|line| {
            line.trim()
                .strip_prefix(prefix)
                .map(|title| title.trim().to_string())
        })
    };
    heading("## ").or_else(|| heading("# ")).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn section_prefers_level_two_then_level_one() {
        let md = "# Title\n\nintro ![a](a.png)\n\n## Setup\n\n![b](img/b.png)\n\n### Deep\n![[c.png]]";
        assert_eq!(find_image_section(md, "a.png"), "Title");
        assert_eq!(find_image_section(md, "img/b.png"), "Setup");
        assert_eq!(find_image_section(md, "c.png"), "Setup");
        assert_eq!(find_image_section(md, "missing.png"), "");
    }

    #[test]
    fn registry_keeps_first_registration() {
        let registry = AssetRegistry::new();
        let first = registry.register(PathBuf::from("/notes/a.png"), "a.png");
        let second = registry.register(PathBuf::from("/notes/a.png"), "./a.png");

        assert_eq!(first, second);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.snapshot()[0].reference, "a.png");
    }

    #[test]
    fn image_extension_check_is_case_insensitive() {
        assert!(is_image_path("photos/Cat.PNG"));
        assert!(!is_image_path("notes/readme.md"));
        assert_eq!(mime_for(Path::new("a.JPG")), "image/jpeg");
    }
}
