//! Text helpers for the normalizer: markup stripping and date parsing.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use scraper::{ElementRef, Html, Node};

const BLOCK_ELEMENTS: &[&str] = &[
    "p", "div", "br", "li", "ul", "ol", "h1", "h2", "h3", "h4", "h5", "h6", "blockquote", "pre",
    "tr", "table", "section", "article", "hr",
];

const SKIPPED_ELEMENTS: &[&str] = &["script", "style", "head"];

/// Strips markup to plain text.
///
/// Block elements end a line; whitespace inside a line collapses to a
/// single space; entities are decoded by the parser.
pub fn html_to_text(html: &str) -> String {
    if html.trim().is_empty() {
        return String::new();
    }
    let fragment = Html::parse_fragment(html);
    let mut collector = LineCollector::default();
    collector.walk(fragment.root_element());
    collector.finish()
}

#[derive(Default)]
struct LineCollector {
    lines: Vec<String>,
    current: String,
}

impl LineCollector {
    fn walk(&mut self, element: ElementRef<'_>) {
        for child in element.children() {
            match child.value() {
                Node::Text(text) => {
                    self.current.push_str(text);
                    self.current.push(' ');
                }
                Node::Element(_) => {
                    let Some(child_element) = ElementRef::wrap(child) else {
                        continue;
                    };
                    let name = child_element.value().name();
                    if SKIPPED_ELEMENTS.contains(&name) {
                        continue;
                    }
                    let block = BLOCK_ELEMENTS.contains(&name);
                    if block {
                        self.flush();
                    }
                    self.walk(child_element);
                    if block {
                        self.flush();
                    }
                }
                _ => {}
            }
        }
    }

    fn flush(&mut self) {
        let line = self.current.split_whitespace().collect::<Vec<_>>().join(" ");
        if !line.is_empty() {
            self.lines.push(line);
        }
        self.current.clear();
    }

    fn finish(mut self) -> String {
        self.flush();
        self.lines.join("\n")
    }
}

/// Calendar date of a timestamp, taken in UTC when an offset is present.
///
/// Accepts RFC 3339, naive `YYYY-MM-DDTHH:MM:SS` / `YYYY-MM-DD HH:MM:SS`
/// and bare `YYYY-MM-DD`. Anything else yields `None`.
pub fn parse_calendar_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc).date_naive());
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.date());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn paragraphs_become_lines() {
        let html = "<p>Great   guitar,\n plays well.</p><p>Ships in a <b>hard</b> case.</p>";
        assert_eq!(html_to_text(html), "Great guitar, plays well.\nShips in a hard case.");
    }

    #[test]
    fn breaks_and_lists_split_lines() {
        let html = "Specs:<br>Maple neck<ul><li>22 frets</li><li>HSS</li></ul>";
        assert_eq!(html_to_text(html), "Specs:\nMaple neck\n22 frets\nHSS");
    }

    #[test]
    fn entities_decode_and_scripts_drop() {
        let html = "<div>Fender &amp; Godin&nbsp;deal</div><script>alert(1)</script>";
        assert_eq!(html_to_text(html), "Fender & Godin deal");
    }

    #[test]
    fn blank_input_is_empty() {
        assert_eq!(html_to_text("   "), "");
    }

    #[rstest]
    #[case("2024-03-01T23:30:00-05:00", Some((2024, 3, 2)))]
    #[case("2024-03-01T10:00:00Z", Some((2024, 3, 1)))]
    #[case("2024-03-01 00:00:00", Some((2024, 3, 1)))]
    #[case("2024-03-01", Some((2024, 3, 1)))]
    #[case("March 1st", None)]
    #[case("", None)]
    fn dates_are_taken_in_utc(#[case] raw: &str, #[case] expected: Option<(i32, u32, u32)>) {
        let expected = expected.and_then(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d));
        assert_eq!(parse_calendar_date(raw), expected);
    }
}
