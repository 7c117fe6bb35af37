//! Inkpost engine: rendering, backend calls and publish orchestration.
mod accounts;
mod api;
mod article;
mod assets;
mod batch;
mod cache;
mod clipboard;
mod engine;
mod export;
mod filename;
mod frontmatter;
mod guard;
mod persist;
mod publish;
pub mod render;
mod source;
mod types;

pub use accounts::AccountBook;
pub use api::{
    AccessToken, ApiError, ApiSettings, DraftArticle, DraftContent, DraftItem, DraftList,
    DraftResult, MaterialItem, MaterialList, MediaResult, MediaUpload, NewsItem,
    ReqwestApiClient, StorageClass, UnconfiguredApi, WechatApi,
};
pub use article::{embed_images, fallback_media_url, finalize_content, plain_text};
pub use assets::{
    find_image_section, is_image_path, scan_pending, AssetReader, AssetRegistry, AssetScan,
    FsAssetReader, PathResolver, PendingUpload, UnreadableAsset, VaultResolver,
};
pub use batch::{batch_publish, list_markdown_files, BatchJob, CancellationSignal};
pub use cache::{CacheStats, CardStore, ExpressionCache};
pub use clipboard::{
    AlwaysFocused, ClipboardChain, ClipboardContent, ClipboardError, ClipboardTarget,
    CommandClipboard, CopyCommand, FocusHost, NativeClipboard,
};
pub use engine::{Engine, EngineParts, EngineSettings};
pub use export::export_html;
pub use filename::{clean_file_name, export_filename, smart_image_name};
pub use frontmatter::{split_front_matter, ArticleMeta};
pub use guard::{BackendGuard, Clock, SystemClock};
pub use persist::{ensure_output_dir, AtomicFileWriter, PersistError};
pub use publish::{
    DraftOutcome, PublishError, PublishFailure, PublishRequest, PublishSettings, Publisher,
    UploadTally,
};
pub use render::{Pipeline, RenderOptions, RenderServices, RenderedArticle};
pub use source::{decode_source, DecodeError, DecodedSource, SourceDocument};
pub use types::{Account, NullSink, Preservation, ProgressSink, PublishEvent};
