//! Page access: the read-only view of a parsed document.
//!
//! [`PageSource`] is everything the pipeline needs from a PDF library: page
//! count, per-page text with text-block geometry, embedded image and vector
//! drawing presence, and rasterisation. The pdfium-backed implementation
//! lives in [`crate::pipeline::render`]; [`StaticSource`] serves
//! pre-extracted layouts.
//!
//! A source is shared by every batch task behind an `Arc`, and each task
//! reads a disjoint page range, so implementations only need `&self`.

use crate::error::PageError;
use image::{DynamicImage, Rgba, RgbaImage};

/// Axis-aligned rectangle in page units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockRect {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl BlockRect {
    pub fn new(left: f64, top: f64, right: f64, bottom: f64) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Area; orientation-independent.
    pub fn area(&self) -> f64 {
        (self.right - self.left).abs() * (self.bottom - self.top).abs()
    }

    /// Same rectangle with `left <= right` and `top <= bottom`.
    fn normalized(&self) -> Self {
        Self::new(
            self.left.min(self.right),
            self.top.min(self.bottom),
            self.left.max(self.right),
            self.top.max(self.bottom),
        )
    }

    fn height(&self) -> f64 {
        self.bottom - self.top
    }

    fn union(&self, other: &Self) -> Self {
        Self::new(
            self.left.min(other.left),
            self.top.min(other.top),
            self.right.max(other.right),
            self.bottom.max(other.bottom),
        )
    }

    /// Close enough to be part of one block: within half a line height of
    /// each other on both axes. Both rectangles must be normalised.
    fn joins(&self, other: &Self) -> bool {
        let tolerance = 0.5 * self.height().min(other.height());
        self.left <= other.right + tolerance
            && other.left <= self.right + tolerance
            && self.top <= other.bottom + tolerance
            && other.top <= self.bottom + tolerance
    }
}

/// Group glyph-tight text-object bounds into paragraph-like blocks.
///
/// pdfium reports one rectangle per text object (often a word or a run),
/// which hugs the glyphs and leaves out word and line spacing. Rectangles
/// that touch or sit within half a line height of each other are unioned
/// until no further merge is possible, so a paragraph becomes one block
/// and overlapping objects are not counted twice. Separate columns stay
/// separate. Result is sorted top-to-bottom, then left-to-right, in
/// normalised form.
pub fn merge_text_blocks(rects: &[BlockRect]) -> Vec<BlockRect> {
    let mut blocks: Vec<BlockRect> = rects
        .iter()
        .map(BlockRect::normalized)
        .filter(|r| [r.left, r.top, r.right, r.bottom].iter().all(|v| v.is_finite()))
        .collect();

    let mut merged = true;
    while merged {
        merged = false;
        let mut i = 0;
        while i < blocks.len() {
            let mut j = i + 1;
            while j < blocks.len() {
                if blocks[i].joins(&blocks[j]) {
                    let other = blocks.swap_remove(j);
                    blocks[i] = blocks[i].union(&other);
                    merged = true;
                    j = i + 1;
                } else {
                    j += 1;
                }
            }
            i += 1;
        }
    }

    blocks.sort_by(|a, b| a.top.total_cmp(&b.top).then(a.left.total_cmp(&b.left)));
    blocks
}

/// Content snapshot of one page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageLayout {
    /// 0-based page index.
    pub index: usize,
    pub width: f64,
    pub height: f64,
    /// Extracted plain text.
    pub text: String,
    /// Bounding boxes of text blocks (see [`merge_text_blocks`]).
    pub text_blocks: Vec<BlockRect>,
    /// Embedded raster images.
    pub image_count: usize,
    /// Whether the page carries vector drawings.
    pub has_drawings: bool,
}

impl PageLayout {
    /// 1-based page number.
    pub fn page_number(&self) -> usize {
        self.index + 1
    }
}

/// Read-only access to a parsed document's pages.
///
/// `layout` must be cheap and non-blocking; `rasterize` may block and is
/// always called from `spawn_blocking`.
pub trait PageSource: Send + Sync {
    /// Number of pages.
    fn page_count(&self) -> usize;

    /// Text and geometry of the page at `index` (0-based).
    fn layout(&self, index: usize) -> Result<PageLayout, PageError>;

    /// Render the page at `index` (0-based) to an image.
    fn rasterize(&self, index: usize) -> Result<DynamicImage, PageError>;
}

/// Trimmed text of every page joined by single spaces.
pub fn document_text(source: &dyn PageSource) -> String {
    let mut text = String::new();
    for index in 0..source.page_count() {
        if let Ok(layout) = source.layout(index) {
            let page = layout.text.trim();
            if !page.is_empty() {
                if !text.is_empty() {
                    text.push(' ');
                }
                text.push_str(page);
            }
        }
    }
    text
}

/// A [`PageSource`] over layouts that were extracted elsewhere.
///
/// Rasterising renders a blank page-sized canvas.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    pages: Vec<PageLayout>,
}

impl StaticSource {
    /// Build from layouts; page indices are reassigned in order.
    pub fn new(layouts: Vec<PageLayout>) -> Self {
        let pages = layouts
            .into_iter()
            .enumerate()
            .map(|(index, mut layout)| {
                layout.index = index;
                layout
            })
            .collect();
        Self { pages }
    }
}

impl PageSource for StaticSource {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn layout(&self, index: usize) -> Result<PageLayout, PageError> {
        self.pages
            .get(index)
            .cloned()
            .ok_or_else(|| PageError::ExtractionFailed {
                page: index + 1,
                detail: format!("page index {index} out of range ({} pages)", self.pages.len()),
            })
    }

    fn rasterize(&self, index: usize) -> Result<DynamicImage, PageError> {
        let page = self.pages.get(index).ok_or_else(|| PageError::RenderFailed {
            page: index + 1,
            detail: format!("page index {index} out of range"),
        })?;
        let w = page.width.round().clamp(1.0, 4096.0) as u32;
        let h = page.height.round().clamp(1.0, 4096.0) as u32;
        Ok(DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            w,
            h,
            Rgba([255, 255, 255, 255]),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(text: &str) -> PageLayout {
        PageLayout {
            width: 100.0,
            height: 200.0,
            text: text.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn rect_area_ignores_orientation() {
        assert_eq!(BlockRect::new(10.0, 10.0, 20.0, 30.0).area(), 200.0);
        assert_eq!(BlockRect::new(20.0, 30.0, 10.0, 10.0).area(), 200.0);
    }

    #[test]
    fn words_and_lines_merge_into_one_block() {
        let rects = [
            BlockRect::new(0.0, 0.0, 40.0, 10.0),
            BlockRect::new(43.0, 0.0, 80.0, 10.0),
            BlockRect::new(0.0, 13.0, 70.0, 23.0),
            BlockRect::new(150.0, 0.0, 200.0, 10.0),
        ];
        assert_eq!(
            merge_text_blocks(&rects),
            vec![
                BlockRect::new(0.0, 0.0, 80.0, 23.0),
                BlockRect::new(150.0, 0.0, 200.0, 10.0),
            ]
        );
    }

    #[test]
    fn overlapping_objects_are_not_counted_twice() {
        let blocks = merge_text_blocks(&[
            BlockRect::new(0.0, 0.0, 10.0, 10.0),
            BlockRect::new(5.0, 0.0, 15.0, 10.0),
        ]);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].area(), 150.0);
    }

    #[test]
    fn merge_normalises_pdf_orientation() {
        // PDF space: y grows upwards, so top > bottom.
        let blocks = merge_text_blocks(&[
            BlockRect::new(0.0, 100.0, 50.0, 90.0),
            BlockRect::new(0.0, 87.0, 50.0, 77.0),
        ]);
        assert_eq!(blocks, vec![BlockRect::new(0.0, 77.0, 50.0, 100.0)]);
        assert!(merge_text_blocks(&[]).is_empty());
    }

    #[test]
    fn static_source_reindexes_pages() {
        let source = StaticSource::new(vec![layout("a"), layout("b")]);
        assert_eq!(source.page_count(), 2);
        let second = source.layout(1).unwrap();
        assert_eq!(second.index, 1);
        assert_eq!(second.page_number(), 2);
        assert!(matches!(
            source.layout(2),
            Err(PageError::ExtractionFailed { page: 3, .. })
        ));
    }

    #[test]
    fn blank_raster_matches_page_size() {
        let source = StaticSource::new(vec![layout("a")]);
        let img = source.rasterize(0).unwrap();
        assert_eq!((img.width(), img.height()), (100, 200));
    }

    #[test]
    fn document_text_skips_empty_pages() {
        let source = StaticSource::new(vec![layout("  one "), layout(""), layout("two")]);
        assert_eq!(document_text(&source), "one two");
    }
}
