//! Prompt construction and tolerant parsing of oracle output.
//!
//! The oracle is asked for a flat JSON array but is not bound to return
//! only that: responses come wrapped in code fences, prefixed with prose or
//! followed by notes. Everything defensive about reading them lives here.

use chrono::NaiveDate;
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

use crate::adapters::ChannelMessage;
use crate::domain::IncidentCandidate;

const MONTH_NAMES: [&str; 12] = [
    "January", "February", "March", "April", "May", "June", "July", "August", "September",
    "October", "November", "December",
];

/// Device categories the oracle should report
pub const IN_SCOPE_DEVICES: &[&str] = &[
    "e-bike",
    "e-scooter",
    "electric vehicle",
    "mobile phone",
    "power bank",
    "laptop",
    "UPS / home battery",
    "other lithium battery",
];

/// Events the oracle must leave out
pub const EXCLUDED_TOPICS: &[&str] = &[
    "ordinary traffic accidents without a fire",
    "theft of e-bikes or batteries",
    "legislation, regulation or enforcement news",
];

const OUTPUT_SHAPE: &str = r#"[
  {
    "incident_date": "YYYY-MM-DD",
    "city": "city name in Hebrew",
    "district": "north|haifa|center|tel_aviv|jerusalem|south|judea_samaria|other",
    "device_type": "e-bike|e-scooter|electric vehicle|mobile phone|power bank|laptop|ups|other",
    "severity": "minor|moderate|severe|critical",
    "injuries": 0,
    "fatalities": 0,
    "property_damage": true,
    "description": "one-sentence summary",
    "source_name": "outlet name",
    "source_url": "article URL if known"
  }
]"#;

/// Result of reading one oracle response
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionOutcome {
    /// A JSON array with at least one entry
    Parsed {
        /// Entries that passed validation
        candidates: Vec<IncidentCandidate>,
        /// Entries in the array, valid or not
        examined: usize,
    },

    /// Blank response or an empty array
    Empty,

    /// No array found, invalid JSON, or JSON that isn't an array
    Malformed(String),
}

impl ExtractionOutcome {
    /// Clean, locate and parse the array in `response`
    pub fn parse(response: &str) -> Self {
        let cleaned = strip_code_fences(response);
        if cleaned.trim().is_empty() {
            return Self::Empty;
        }

        let Some(array_text) = find_json_array(&cleaned) else {
            return Self::Malformed("no JSON array in response".to_string());
        };

        let value: Value = match serde_json::from_str(array_text) {
            Ok(v) => v,
            Err(e) => return Self::Malformed(format!("invalid JSON array: {}", e)),
        };

        let Value::Array(entries) = value else {
            return Self::Malformed("response JSON is not an array".to_string());
        };

        if entries.is_empty() {
            return Self::Empty;
        }

        let candidates = entries
            .iter()
            .filter_map(IncidentCandidate::from_value)
            .collect();

        Self::Parsed {
            candidates,
            examined: entries.len(),
        }
    }
}

fn fence_regex() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| Regex::new(r"```[A-Za-z0-9_-]*").expect("fence regex is valid"))
}

/// Remove Markdown code-fence markers, keeping their contents
pub fn strip_code_fences(text: &str) -> String {
    fence_regex().replace_all(text, "").into_owned()
}

/// Locate the first top-level `[...]` span.
///
/// Brackets inside JSON strings are ignored. If the first array never
/// closes, the span up to the last `]` is returned so the JSON parser can
/// report what is wrong with it.
pub fn find_json_array(text: &str) -> Option<&str> {
    let start = text.find('[')?;

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '[' => depth += 1,
            ']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }

    let end = text.rfind(']')?;
    (end > start).then(|| &text[start..=end])
}

/// Human-readable period, e.g. "January–June 2024"
fn describe_months(year: i32, first: u32, last: u32) -> String {
    let name = |m: u32| MONTH_NAMES[(m.clamp(1, 12) - 1) as usize];
    if first == last {
        format!("{} {}", name(first), year)
    } else {
        format!("{}–{} {}", name(first), name(last), year)
    }
}

fn common_instructions(out: &mut String) {
    out.push_str("Report only fires, explosions or smoke events caused by lithium batteries in these device categories:\n");
    for device in IN_SCOPE_DEVICES {
        out.push_str("- ");
        out.push_str(device);
        out.push('\n');
    }
    out.push_str("\nDo NOT include:\n");
    for topic in EXCLUDED_TOPICS {
        out.push_str("- ");
        out.push_str(topic);
        out.push('\n');
    }
    out.push_str(
        "\nList each real incident once, even if several outlets reported it. \
         Use the date the fire happened, not the publication date, when known.\n\
         Return ONLY a flat JSON array with this shape and no other text:\n",
    );
    out.push_str(OUTPUT_SHAPE);
    out.push_str("\nIf there are no incidents, return [].\n");
}

/// Prompt for an archive scan over months `first..=last` of `year`
pub fn archive_prompt(year: i32, first: u32, last: u32) -> String {
    let mut out = format!(
        "You are a research assistant compiling a record of lithium-battery fires in Israel.\n\
         Search Israeli news sources (ynet, Walla, Maariv, Haaretz, Israel Hayom, Kan, \
         Fire and Rescue Israel announcements) for incidents during {}.\n\n",
        describe_months(year, first, last)
    );
    common_instructions(&mut out);
    out
}

/// Prompt for the periodic scan over `[from, to]`
pub fn recent_prompt(from: NaiveDate, to: NaiveDate) -> String {
    let mut out = format!(
        "You are a research assistant tracking lithium-battery fires in Israel.\n\
         Search Israeli news sources and Fire and Rescue Israel announcements for incidents \
         that happened between {} and {} inclusive.\n\n",
        from.format("%Y-%m-%d"),
        to.format("%Y-%m-%d")
    );
    common_instructions(&mut out);
    out
}

/// Prompt asking the oracle to read channel messages
pub fn messages_prompt(channel: &str, messages: &[ChannelMessage]) -> String {
    let mut out = format!(
        "Below are messages from the public Telegram channel \"{}\". \
         Extract every lithium-battery fire incident in Israel they describe.\n\n",
        channel
    );
    common_instructions(&mut out);
    out.push_str("\nMessages:\n");
    for (i, message) in messages.iter().enumerate() {
        out.push_str(&format!("\n--- message {} ", i + 1));
        if let Some(ref date) = message.date {
            out.push_str(&format!("(posted {}) ", date));
        }
        if let Some(ref url) = message.url {
            out.push_str(&format!("[{}] ", url));
        }
        out.push_str("---\n");
        out.push_str(&message.text);
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARRAY: &str = r#"[{"incident_date":"2024-06-10","city":"חיפה","device_type":"e-bike"},
        {"incident_date":"2024-06-11","city":"אשדוד","device_type":"scooter","injuries":1}]"#;

    fn candidates(outcome: &ExtractionOutcome) -> &[IncidentCandidate] {
        match outcome {
            ExtractionOutcome::Parsed { candidates, .. } => candidates,
            other => panic!("expected Parsed, got {:?}", other),
        }
    }

    #[test]
    fn test_fenced_and_unfenced_parse_identically() {
        let fenced = format!("```json\n{}\n```", ARRAY);
        let bare = ExtractionOutcome::parse(ARRAY);
        let wrapped = ExtractionOutcome::parse(&fenced);

        assert_eq!(bare, wrapped);
        assert_eq!(candidates(&bare).len(), 2);
    }

    #[test]
    fn test_prose_around_array() {
        let response = format!(
            "Here are the incidents I found [verified]:\n{}\nNote: dates are approximate.",
            ARRAY
        );
        // "[verified]" is the first bracketed span and isn't JSON
        assert!(matches!(
            ExtractionOutcome::parse(&response),
            ExtractionOutcome::Malformed(_)
        ));

        let response = format!("Here are the incidents:\n{}\nSee sources [1].", ARRAY);
        assert_eq!(candidates(&ExtractionOutcome::parse(&response)).len(), 2);
    }

    #[test]
    fn test_brackets_inside_strings() {
        let response = r#"[{"incident_date":"2024-01-02","city":"Lod","device_type":"e-bike","description":"fire ] in [ garage"}]"#;
        let outcome = ExtractionOutcome::parse(response);
        assert_eq!(candidates(&outcome)[0].description.as_deref(), Some("fire ] in [ garage"));
    }

    #[test]
    fn test_no_array_is_malformed() {
        let outcome = ExtractionOutcome::parse("I could not find any incidents for that period.");
        assert_eq!(
            outcome,
            ExtractionOutcome::Malformed("no JSON array in response".to_string())
        );
    }

    #[test]
    fn test_invalid_json_is_malformed() {
        let outcome = ExtractionOutcome::parse("[{\"city\": \"Haifa\",]");
        assert!(matches!(outcome, ExtractionOutcome::Malformed(_)));
    }

    #[test]
    fn test_empty_responses() {
        assert_eq!(ExtractionOutcome::parse(""), ExtractionOutcome::Empty);
        assert_eq!(ExtractionOutcome::parse("```json\n[]\n```"), ExtractionOutcome::Empty);
    }

    #[test]
    fn test_invalid_entries_are_counted_not_kept() {
        let response = r#"[
            {"incident_date":"2024-06-10","city":"Haifa","device_type":"e-bike"},
            {"city":"Haifa","device_type":"e-bike"},
            "garbage"
        ]"#;
        match ExtractionOutcome::parse(response) {
            ExtractionOutcome::Parsed { candidates, examined } => {
                assert_eq!(examined, 3);
                assert_eq!(candidates.len(), 1);
            }
            other => panic!("expected Parsed, got {:?}", other),
        }
    }

    #[test]
    fn test_find_json_array_unbalanced_falls_back() {
        assert_eq!(find_json_array("x [1, [2] y ]"), Some("[1, [2] y ]"));
        assert_eq!(find_json_array("[[1] and more"), Some("[[1]"));
        assert_eq!(find_json_array("no brackets"), None);
    }

    #[test]
    fn test_archive_prompt_mentions_period_and_exclusions() {
        let prompt = archive_prompt(2024, 1, 6);
        assert!(prompt.contains("January–June 2024"));
        assert!(prompt.contains("e-bike"));
        assert!(prompt.contains("theft"));
        assert!(prompt.contains("incident_date"));

        assert!(archive_prompt(2023, 3, 3).contains("March 2023"));
    }

    #[test]
    fn test_messages_prompt_lists_messages() {
        let messages = vec![ChannelMessage {
            text: "שריפה בבניין בעקבות סוללת אופניים".to_string(),
            date: Some("2024-06-10T10:00:00+00:00".to_string()),
            url: Some("https://t.me/fire/12".to_string()),
        }];
        let prompt = messages_prompt("fire", &messages);
        assert!(prompt.contains("--- message 1 (posted 2024-06-10T10:00:00+00:00) [https://t.me/fire/12] ---"));
        assert!(prompt.contains("סוללת אופניים"));
    }
}
