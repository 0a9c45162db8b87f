//! Rule-based cleanup of raw extracted page text.
//!
//! Every rule either removes characters or rewrites them in place, so the
//! output is never longer than the input. [`TextNormalizer::normalize`]
//! repeats the rule pass until it reaches a fixed point, which makes the
//! whole operation idempotent.

use crate::error::IngestError;
use regex::{Captures, Regex};

const MAX_PASSES: usize = 8;
const MAX_TITLE_CHARS: usize = 100;

/// Mis-decoded UTF-8 sequences (read as Windows-1252) and their repairs.
/// Longer sequences come first so that `â€` alone is only a last resort.
const ENCODING_FIXES: [(&str, &str); 12] = [
    ("â€™", "'"),
    ("â€˜", "'"),
    ("â€œ", "\""),
    ("â€\u{9d}", "\""),
    ("â€”", "--"),
    ("â€“", "-"),
    ("â€¢", "•"),
    ("â„¢", "™"),
    ("Â°", "°"),
    ("Â®", "®"),
    ("Â©", "©"),
    ("â€", "\""),
];

pub struct TextNormalizer {
    page_number_line: Regex,
    separator_line: Regex,
    broken_word: Regex,
    paragraph_break: Regex,
    whitespace_run: Regex,
    double_quotes: Regex,
    single_quotes: Regex,
    dot_run: Regex,
    dash_run: Regex,
    section_header: Regex,
    section_keyword: Regex,
    temperature: Regex,
    degree_spacing: Regex,
    inches: Regex,
    feet: Regex,
    pounds: Regex,
}

impl TextNormalizer {
    pub fn new() -> Result<Self, IngestError> {
        Ok(Self {
            page_number_line: Regex::new(r"(?i)^\s*(?:page\s*\d+(?:\s*(?:of|/)\s*\d+)?|\d+)\s*$")?,
            separator_line: Regex::new(r"^\s*[-=_]{3,}\s*$")?,
            broken_word: Regex::new(r"(\p{L})-\s+(\p{Ll})")?,
            paragraph_break: Regex::new(r"\n\s*\n")?,
            whitespace_run: Regex::new(r"\s+")?,
            double_quotes: Regex::new(r"[“”„«»]")?,
            single_quotes: Regex::new(r"[‘’‚]")?,
            dot_run: Regex::new(r"\.{4,}")?,
            dash_run: Regex::new(r"-{3,}")?,
            section_header: Regex::new(
                r"(?im)^(troubleshooting|maintenance|safety|warranty|installation|specifications)\b",
            )?,
            section_keyword: Regex::new(
                r"(?im)^(troubleshooting|problem|issue|error|maintenance|cleaning|service|safety|warning|caution|warranty|guarantee|installation|setup|specifications|features)",
            )?,
            temperature: Regex::new(
                r"(?i)\b(\d+)[ \t]*degrees?[ \t]*([fc])(?:ahrenheit|elsius)?\b",
            )?,
            degree_spacing: Regex::new(r"(?i)\b(\d+)[ \t]*°[ \t]*([fc])\b")?,
            inches: Regex::new(r"(?i)\b(\d+)[ \t]*(?:inches|inch)\b")?,
            feet: Regex::new(r"(?i)\b(\d+)[ \t]*(?:feet|foot)\b")?,
            pounds: Regex::new(r"(?i)\b(\d+)[ \t]*(?:pounds|pound)\b")?,
        })
    }

    pub fn normalize(&self, text: &str) -> String {
        let mut current = self.normalize_once(text);
        for _ in 1..MAX_PASSES {
            let next = self.normalize_once(&current);
            if next == current {
                break;
            }
            current = next;
        }
        current
    }

    pub fn normalize_optional(&self, text: Option<&str>) -> String {
        text.map(|value| self.normalize(value)).unwrap_or_default()
    }

    fn normalize_once(&self, text: &str) -> String {
        let stripped = self.strip_artifact_lines(text);
        let rejoined = self.broken_word.replace_all(&stripped, "${1}${2}");
        let reflowed = self.reflow(&rejoined);
        let repaired = self.repair_encoding(&reflowed);
        let titled = self
            .section_header
            .replace_all(&repaired, |caps: &Captures| title_case(&caps[1]));
        self.standardize_units(&titled)
    }

    fn strip_artifact_lines(&self, text: &str) -> String {
        text.replace("\r\n", "\n")
            .replace('\r', "\n")
            .split('\n')
            .filter(|line| {
                !self.page_number_line.is_match(line) && !self.separator_line.is_match(line)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Single newlines become spaces; blank-line paragraph breaks survive as `\n\n`.
    fn reflow(&self, text: &str) -> String {
        self.paragraph_break
            .split(text)
            .map(|paragraph| {
                self.whitespace_run
                    .replace_all(paragraph.trim(), " ")
                    .into_owned()
            })
            .filter(|paragraph| !paragraph.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    fn repair_encoding(&self, text: &str) -> String {
        let mut repaired = text.to_string();
        for (broken, fixed) in ENCODING_FIXES {
            if repaired.contains(broken) {
                repaired = repaired.replace(broken, fixed);
            }
        }

        let repaired = self.double_quotes.replace_all(&repaired, "\"");
        let repaired = self.single_quotes.replace_all(&repaired, "'");
        let repaired = self.dot_run.replace_all(&repaired, "...");
        self.dash_run.replace_all(&repaired, "--").into_owned()
    }

    fn standardize_units(&self, text: &str) -> String {
        let text = self.temperature.replace_all(text, |caps: &Captures| {
            format!("{}°{}", &caps[1], caps[2].to_uppercase())
        });
        let text = self.degree_spacing.replace_all(&text, |caps: &Captures| {
            format!("{}°{}", &caps[1], caps[2].to_uppercase())
        });
        let text = self.inches.replace_all(&text, "${1} in");
        let text = self.feet.replace_all(&text, "${1} ft");
        self.pounds.replace_all(&text, "${1} lbs").into_owned()
    }

    /// Picks a short heading for a chunk.
    ///
    /// A short, capitalised first line wins. Otherwise the first line that
    /// opens with a section keyword is used, and failing that the first ten
    /// words cut at the first sentence terminator.
    pub fn extract_section_title(&self, text: &str) -> String {
        let first_line = text.lines().next().unwrap_or_default().trim();
        let words = first_line.split_whitespace().collect::<Vec<_>>();
        let looks_like_title = !words.is_empty()
            && first_line.chars().count() < MAX_TITLE_CHARS
            && words.len() <= 8
            && words
                .iter()
                .any(|word| word.chars().next().is_some_and(char::is_uppercase));
        if looks_like_title {
            return first_line.to_string();
        }

        if let Some(found) = self.section_keyword.find(text) {
            let line_start = text[..found.start()].rfind('\n').map_or(0, |index| index + 1);
            let line_end = text[found.end()..]
                .find('\n')
                .map_or(text.len(), |index| found.end() + index);
            return truncate_title(text[line_start..line_end].trim());
        }

        let title = text.split_whitespace().take(10).collect::<Vec<_>>().join(" ");
        let title = match title.find(|c: char| matches!(c, '.' | '!' | '?')) {
            Some(index) => title[..=index].to_string(),
            None => title,
        };
        truncate_title(&title)
    }
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

fn truncate_title(title: &str) -> String {
    if title.chars().count() <= MAX_TITLE_CHARS {
        title.to_string()
    } else {
        title.chars().take(MAX_TITLE_CHARS - 3).collect::<String>() + "..."
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalizer() -> TextNormalizer {
        TextNormalizer::new().expect("normalizer patterns compile")
    }

    #[test]
    fn empty_and_missing_input_normalize_to_empty() {
        let normalizer = normalizer();
        assert_eq!(normalizer.normalize(""), "");
        assert_eq!(normalizer.normalize("   \n\n  "), "");
        assert_eq!(normalizer.normalize_optional(None), "");
    }

    #[test]
    fn whitespace_and_line_breaks_are_normalized() {
        let normalizer = normalizer();
        assert_eq!(
            normalizer.normalize("This  has   multiple    spaces"),
            "This has multiple spaces"
        );
        assert_eq!(normalizer.normalize("Line one\nLine two"), "Line one Line two");
        assert_eq!(
            normalizer.normalize("Paragraph one\n\n\n  \nParagraph two"),
            "Paragraph one\n\nParagraph two"
        );
        assert_eq!(normalizer.normalize("Text\t\twith\t\ttabs"), "Text with tabs");
    }

    #[test]
    fn page_numbers_and_separators_are_stripped() {
        let normalizer = normalizer();
        let raw = "Check the hose\n12\nPage 4\n-----\n=====\nbefore each cycle";
        assert_eq!(normalizer.normalize(raw), "Check the hose before each cycle");
    }

    #[test]
    fn hyphen_broken_words_are_rejoined() {
        let normalizer = normalizer();
        let result = normalizer.normalize("This is a bro- ken word and a dis-\nconnected hose");
        assert_eq!(result, "This is a broken word and a disconnected hose");
    }

    #[test]
    fn encoding_artifacts_are_repaired() {
        let normalizer = normalizer();
        assert!(normalizer.normalize("Itâ€™s working").contains("It's working"));
        assert!(normalizer.normalize("â€œQuotedâ€\u{9d} text").contains("\"Quoted\" text"));
        assert!(normalizer.normalize("Temperature: 100Â°F").contains("100°F"));
        assert!(normalizer.normalize("Brandâ„¢ name").contains("Brand™ name"));
        assert!(normalizer.normalize("wait.......").ends_with("wait..."));
    }

    #[test]
    fn section_headers_are_title_cased() {
        let normalizer = normalizer();
        let result = normalizer.normalize("TROUBLESHOOTING\n\nsafety first, check the hose");
        assert_eq!(result, "Troubleshooting\n\nSafety first, check the hose");
    }

    #[test]
    fn units_and_temperatures_are_standardized() {
        let normalizer = normalizer();
        assert!(normalizer.normalize("Temperature 75 degrees f").contains("75°F"));
        assert!(normalizer
            .normalize("Hot water 40 degrees celsius")
            .contains("40°C"));
        assert!(normalizer.normalize("Set it to 120 ° f").contains("120°F"));
        assert!(normalizer.normalize("24 inches tall").contains("24 in tall"));
        assert!(normalizer.normalize("5 feet wide").contains("5 ft wide"));
        assert!(normalizer.normalize("10 pounds load").contains("10 lbs load"));
    }

    #[test]
    fn normalization_is_idempotent_and_never_grows() {
        let normalizer = normalizer();
        let samples = [
            "x- y- z- word",
            "Page 1\nTROUBLESHOOTING guide\n\n\nâ€œDrainâ€\u{9d} the  tub at 40 degrees c.\n---",
            "Safety\nwarning: unplug the unit.......\n\n\t maintenance every 6 feet",
            "1\n2\n3",
            "plain text without anything to fix",
            "Installation\r\nsteps\r\n\r\nSPECIFICATIONS: 240 pound capacity, 27inch wide",
        ];

        for sample in samples {
            let once = normalizer.normalize(sample);
            let twice = normalizer.normalize(&once);
            assert_eq!(once, twice, "not idempotent for {sample:?}");
            assert!(once.chars().count() <= sample.chars().count());
        }
    }

    #[test]
    fn section_title_prefers_short_first_line() {
        let normalizer = normalizer();
        let title = normalizer
            .extract_section_title("Troubleshooting Guide\nThis section covers common problems");
        assert_eq!(title, "Troubleshooting Guide");
    }

    #[test]
    fn section_title_falls_back_to_keyword_line() {
        let normalizer = normalizer();
        let text = "some intro text that is not a heading at all really\nMaintenance schedule\nDetails";
        assert_eq!(normalizer.extract_section_title(text), "Maintenance schedule");
    }

    #[test]
    fn section_title_falls_back_to_first_sentence() {
        let normalizer = normalizer();
        let text = "this is regular content. it has no special section indicators at all";
        assert_eq!(normalizer.extract_section_title(text), "this is regular content.");
        assert_eq!(normalizer.extract_section_title(""), "");
    }
}
