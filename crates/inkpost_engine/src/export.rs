use std::path::{Path, PathBuf};

use inkpost_logging::ink_info;

use crate::article::{embed_images, finalize_content};
use crate::assets::AssetReader;
use crate::filename::export_filename;
use crate::persist::{ensure_output_dir, AtomicFileWriter, PersistError};
use crate::render::{escape_html, RenderServices, RenderedArticle};

/// Writes the article as a self-contained HTML page into `out_dir`.
pub async fn export_html(
    article: &RenderedArticle,
    services: &RenderServices,
    reader: &dyn AssetReader,
    out_dir: &Path,
) -> Result<PathBuf, PersistError> {
    ensure_output_dir(out_dir)?;
    let content = finalize_content(&article.html, &services.assets, &services.cards);
    let content = embed_images(&content, &services.assets, reader).await;
    let page = format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{}</title>\n</head>\n<body>\n{content}\n</body>\n</html>\n",
        escape_html(&article.title)
    );

    let source = article
        .path
        .as_deref()
        .map(|path| path.display().to_string())
        .unwrap_or_else(|| article.title.clone());
    let filename = export_filename(&article.title, &source);
    let written = AtomicFileWriter::new(out_dir.to_path_buf()).write(&filename, &page)?;
    ink_info!("Exported {:?} to {}", article.title, written.display());
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::{FsAssetReader, VaultResolver};
    use crate::render::{DiagramQueue, Pipeline, RenderOptions};
    use crate::source::SourceDocument;
    use std::sync::Arc;

    #[tokio::test]
    async fn exported_page_embeds_local_images() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("dot.png"), [0x89, b'P', b'N', b'G']).unwrap();
        let note = dir.path().join("Trip.md");
        std::fs::write(&note, "# Trip\n\n![[dot.png]]\n").unwrap();

        let services = RenderServices::new(
            Arc::new(DiagramQueue::new()),
            Arc::new(VaultResolver::new(Some(dir.path().to_path_buf()))),
        );
        let pipeline = Pipeline::new(services.clone(), RenderOptions::default());
        let doc = SourceDocument::load(&note).await.unwrap();
        let article = pipeline.render(&doc).await;

        let out = dir.path().join("out");
        let written = export_html(&article, &services, &FsAssetReader, &out)
            .await
            .unwrap();
        let name = written.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("Trip--"), "{name}");
        assert!(name.ends_with(".html"));

        let page = std::fs::read_to_string(&written).unwrap();
        assert!(page.contains("src=\"data:image/png;base64,iVBORw==\""), "{page}");
        assert!(page.contains("<title>Trip</title>"));
    }
}
