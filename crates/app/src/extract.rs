use anyhow::{bail, Context};
use lopdf::Document;
use pdf_tutor_core::PageText;
use std::path::Path;

pub trait PdfExtractor {
    fn extract_pages(&self, path: &Path) -> anyhow::Result<Vec<PageText>>;
}

#[derive(Default)]
pub struct LopdfExtractor;

impl PdfExtractor for LopdfExtractor {
    fn extract_pages(&self, path: &Path) -> anyhow::Result<Vec<PageText>> {
        let document = Document::load(path)
            .with_context(|| format!("unable to parse pdf {}", path.display()))?;

        let mut pages = Vec::new();
        for (page_no, _page_id) in document.get_pages() {
            let text = document
                .extract_text(&[page_no])
                .with_context(|| format!("unable to read page {page_no} of {}", path.display()))?;

            if !text.trim().is_empty() {
                pages.push(PageText::new(page_no, text));
            }
        }

        if pages.is_empty() {
            bail!("pdf had no readable page text: {}", path.display());
        }

        Ok(pages)
    }
}

pub fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}
