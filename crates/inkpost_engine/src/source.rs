use std::path::{Path, PathBuf};

use chardetng::EncodingDetector;
use encoding_rs::{Encoding, UTF_8};
use inkpost_logging::ink_debug;

use crate::frontmatter::{split_front_matter, ArticleMeta};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedSource {
    pub text: String,
    pub encoding_label: String,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("failed to decode bytes with {encoding}: {message}")]
    DecodeFailure { encoding: String, message: String },
    #[error("failed to read {path:?}: {message}")]
    Read { path: PathBuf, message: String },
}

/// Decode raw note bytes into UTF-8 using: BOM -> strict UTF-8 -> chardetng fallback.
pub fn decode_source(bytes: &[u8]) -> Result<DecodedSource, DecodeError> {
    // 1) BOM aware decode using encoding_rs helper
    if let Some((encoding, _)) = Encoding::for_bom(bytes) {
        return decode_with(bytes, encoding);
    }

    // 2) Most notes are plain UTF-8
    if std::str::from_utf8(bytes).is_ok() {
        return decode_with(bytes, UTF_8);
    }

    // 3) chardetng detection for legacy encodings (GBK, Shift_JIS, ...)
    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    let enc = detector.guess(None, true);
    decode_with(bytes, enc)
}

fn decode_with(bytes: &[u8], enc: &'static Encoding) -> Result<DecodedSource, DecodeError> {
    let (text, _, had_errors) = enc.decode(bytes);
    if had_errors {
        return Err(DecodeError::DecodeFailure {
            encoding: enc.name().to_string(),
            message: "decoding error".into(),
        });
    }
    Ok(DecodedSource {
        text: text.into_owned(),
        encoding_label: enc.name().to_string(),
    })
}

/// A markdown note split into front matter and body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    /// File the note came from, if any.
    pub path: Option<PathBuf>,
    pub meta: ArticleMeta,
    pub body: String,
    /// Front matter title, else the file basename, else "untitled".
    pub title: String,
}

impl SourceDocument {
    pub fn from_text(text: &str, path: Option<&Path>) -> Self {
        let (meta, body) = split_front_matter(text);
        let basename = path
            .and_then(|p| p.file_stem())
            .map(|stem| stem.to_string_lossy().into_owned());
        let title = meta
            .title
            .clone()
            .filter(|t| !t.trim().is_empty())
            .or(basename)
            .unwrap_or_else(|| "untitled".to_string());
        Self {
            path: path.map(Path::to_path_buf),
            meta,
            body: body.to_string(),
            title,
        }
    }

    pub async fn load(path: &Path) -> Result<Self, DecodeError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|err| DecodeError::Read {
                path: path.to_path_buf(),
                message: err.to_string(),
            })?;
        let decoded = decode_source(&bytes)?;
        ink_debug!(
            "Loaded {:?} ({} bytes, {})",
            path,
            bytes.len(),
            decoded.encoding_label
        );
        Ok(Self::from_text(&decoded.text, Some(path)))
    }

    /// Directory relative links are resolved against.
    pub fn base_dir(&self) -> PathBuf {
        self.path
            .as_deref()
            .and_then(Path::parent)
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }
}
