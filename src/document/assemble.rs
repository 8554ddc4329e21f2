//! Join per-page results into the document-level result.

use super::{DocumentResult, ExtractionMethod, PageResult};

const PAGE_SEPARATOR: &str = "\n\n";

/// Assemble page results, already ordered by index, into one document.
///
/// Blank pages are dropped. Input order is kept as given.
pub fn assemble(pages: &[PageResult]) -> DocumentResult {
    let full_text = pages
        .iter()
        .map(|p| p.text.as_str())
        .filter(|t| !t.trim().is_empty())
        .collect::<Vec<_>>()
        .join(PAGE_SEPARATOR);

    if full_text.trim().is_empty() {
        return DocumentResult::empty();
    }

    let method = if pages.iter().any(|p| p.used_recognition) {
        ExtractionMethod::HybridRecognition
    } else {
        ExtractionMethod::EmbeddedOnly
    };

    DocumentResult { full_text, method }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_pages_is_empty() {
        assert_eq!(assemble(&[]), DocumentResult::empty());
    }

    #[test]
    fn test_blank_pages_are_dropped() {
        let pages = vec![
            PageResult::new(0, "first", false),
            PageResult::new(1, "   \n", false),
            PageResult::new(2, "", false),
            PageResult::new(3, "last", false),
        ];
        let result = assemble(&pages);
        assert_eq!(result.full_text, "first\n\nlast");
        assert_eq!(result.method, ExtractionMethod::EmbeddedOnly);
    }

    #[test]
    fn test_recognition_marks_hybrid() {
        let pages = vec![
            PageResult::new(0, "typed", false),
            PageResult::new(1, "scanned", true),
        ];
        assert_eq!(assemble(&pages).method, ExtractionMethod::HybridRecognition);
    }

    #[test]
    fn test_whitespace_only_is_empty_even_with_recognition() {
        let pages = vec![PageResult::new(0, "  \t ", true)];
        assert_eq!(assemble(&pages), DocumentResult::empty());
    }

    #[test]
    fn test_recognition_on_blank_page_still_counts() {
        // The page that went through recognition found nothing, but the
        // document as a whole was produced by the hybrid path.
        let pages = vec![
            PageResult::new(0, "typed", false),
            PageResult::new(1, "", true),
        ];
        let result = assemble(&pages);
        assert_eq!(result.full_text, "typed");
        assert_eq!(result.method, ExtractionMethod::HybridRecognition);
    }

    #[test]
    fn test_order_is_preserved() {
        let pages = vec![
            PageResult::new(0, "A", true),
            PageResult::new(1, "B", true),
            PageResult::new(2, "C", true),
        ];
        assert_eq!(assemble(&pages).full_text, "A\n\nB\n\nC");
    }
}
