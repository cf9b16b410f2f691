//! Page classification: text-dominant vs image/graphic-dominant.
//!
//! A page is only a candidate for the vision model if it carries at least
//! one embedded image or vector drawing. A candidate is image-dominant when
//! it has no text at all, or when its text blocks cover less than
//! `threshold` of the page area:
//!
//! ```text
//! coverage = Σ area(text block) / (page width × page height)
//! ```
//!
//! Pure function of the layout; no I/O, so it is safe to call from any
//! batch task.

use crate::pipeline::source::PageLayout;

/// Outcome of [`classify`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    /// True if the page should be rasterised and explained.
    pub image_dominant: bool,
    /// Text-block coverage ratio in `[0, ∞)`; overlapping blocks may push
    /// it above 1.
    pub text_coverage: f64,
}

/// Fraction of the page area covered by text blocks; 0 for a zero-area page.
pub fn text_coverage(layout: &PageLayout) -> f64 {
    let page_area = layout.width.abs() * layout.height.abs();
    if page_area <= 0.0 || !page_area.is_finite() {
        return 0.0;
    }
    let text_area: f64 = layout.text_blocks.iter().map(|b| b.area()).sum();
    text_area / page_area
}

/// Classify a page against the coverage `threshold`.
pub fn classify(layout: &PageLayout, threshold: f64) -> Classification {
    let text_coverage = text_coverage(layout);
    let has_visuals = layout.image_count > 0 || layout.has_drawings;
    let image_dominant =
        has_visuals && (layout.text.trim().is_empty() || text_coverage < threshold);
    Classification {
        image_dominant,
        text_coverage,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::source::BlockRect;

    /// 100×100 page with one text block covering `coverage` of it.
    fn page(coverage: f64, text: &str, images: usize, drawings: bool) -> PageLayout {
        let side = (coverage * 10_000.0).sqrt();
        PageLayout {
            width: 100.0,
            height: 100.0,
            text: text.to_string(),
            text_blocks: vec![BlockRect::new(0.0, 0.0, side, side)],
            image_count: images,
            has_drawings: drawings,
            ..Default::default()
        }
    }

    #[test]
    fn sparse_text_with_image_is_image_dominant() {
        let c = classify(&page(0.05, "caption", 1, false), 0.4);
        assert!(c.image_dominant);
        assert!((c.text_coverage - 0.05).abs() < 1e-9);
    }

    #[test]
    fn dense_text_with_image_is_text_dominant() {
        assert!(!classify(&page(0.8, "lots of text", 1, false), 0.4).image_dominant);
    }

    #[test]
    fn drawings_alone_make_a_candidate() {
        assert!(classify(&page(0.1, "axis labels", 0, true), 0.4).image_dominant);
    }

    #[test]
    fn no_visuals_is_always_text_dominant() {
        assert!(!classify(&page(0.0, "", 0, false), 0.4).image_dominant);
        assert!(!classify(&page(0.01, "tiny footnote", 0, false), 0.4).image_dominant);
    }

    #[test]
    fn textless_candidate_is_image_dominant_regardless_of_coverage() {
        let c = classify(&page(0.9, "   ", 2, false), 0.4);
        assert!(c.image_dominant);
    }

    #[test]
    fn zero_area_page_has_zero_coverage() {
        let layout = PageLayout {
            width: 0.0,
            height: 0.0,
            text: "x".into(),
            text_blocks: vec![BlockRect::new(0.0, 0.0, 5.0, 5.0)],
            image_count: 1,
            ..Default::default()
        };
        let c = classify(&layout, 0.4);
        assert_eq!(c.text_coverage, 0.0);
        assert!(c.image_dominant);
    }

    #[test]
    fn threshold_is_exclusive() {
        let layout = page(0.25, "text", 1, false);
        assert!(!classify(&layout, 0.25).image_dominant);
        assert!(classify(&layout, 0.26).image_dominant);
    }
}
