//! Repair pass for assembled markup.
//!
//! Spans that overlap without proper containment assemble into mis-nested
//! tags. Re-parsing through a tolerant HTML parser and serializing the tree
//! back out yields properly nested markup; the fragment parser's artificial
//! wrapper elements are stripped from the result.

use scraper::Html;

/// Re-parses and re-serializes `html`, fixing residual mis-nesting.
///
/// Returns None when the repaired result is unusable (non-empty input
/// collapsing to nothing); the caller falls back to escaped plain text.
pub(crate) fn repair(html: &str) -> Option<String> {
    let fragment = Html::parse_fragment(html);
    let repaired = fragment.root_element().inner_html();
    let repaired = strip_wrappers(&repaired);
    if repaired.is_empty() && !html.trim().is_empty() {
        return None;
    }
    Some(repaired.to_string())
}

/// Strips `<html>`/`<body>` wrappers a fragment parser may leave around the
/// content.
fn strip_wrappers(html: &str) -> &str {
    let mut out = html;
    for (open, close) in [("<html>", "</html>"), ("<body>", "</body>")] {
        if let Some(inner) = out
            .strip_prefix(open)
            .and_then(|rest| rest.strip_suffix(close))
        {
            out = inner;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_well_formed_markup_is_unchanged() {
        assert_eq!(
            repair("<b>bold <i>text</i></b>").as_deref(),
            Some("<b>bold <i>text</i></b>")
        );
    }

    #[test]
    fn test_misnested_tags_are_rebalanced() {
        let repaired = repair("<b>bold <i>text</b></i>").unwrap();
        assert_eq!(
            repaired.matches("<i>").count(),
            repaired.matches("</i>").count()
        );
        assert_eq!(
            repaired.matches("<b>").count(),
            repaired.matches("</b>").count()
        );
        assert!(repaired.contains("bold"));
        assert!(repaired.contains("text"));
    }

    #[test]
    fn test_escaped_entities_survive_round_trip() {
        assert_eq!(repair("&lt;script&gt;").as_deref(), Some("&lt;script&gt;"));
    }

    #[test]
    fn test_unclosed_tag_is_closed() {
        let repaired = repair("<b>dangling").unwrap();
        assert_eq!(repaired, "<b>dangling</b>");
    }

    #[test]
    fn test_empty_input_is_fine() {
        assert_eq!(repair("").as_deref(), Some(""));
    }
}
