//! Line-oriented "simple" chapter format understood by mkvpropedit:
//!
//! ```text
//! CHAPTER01=00:00:00.000
//! CHAPTER01NAME=Intro
//! ```
//!
//! The format carries only start times and names. UIDs are reassigned by the
//! tool and end times are implied by the next chapter.

use crate::{Chapter, ChapterCoreError, ChapterTime, Result};
use std::collections::BTreeMap;

/// Encode chapters, numbering them from `CHAPTER01` in sequence order.
/// Line breaks inside titles are flattened to spaces.
pub fn encode(chapters: &[Chapter]) -> String {
    let mut out = String::new();
    for (i, chapter) in chapters.iter().enumerate() {
        let number = i + 1;
        let title: String = chapter
            .title()
            .chars()
            .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
            .collect();
        out.push_str(&format!("CHAPTER{:02}={}\n", number, chapter.start_time()));
        out.push_str(&format!("CHAPTER{:02}NAME={}\n", number, title));
    }
    out
}

/// Decode a simple chapter file. The chapter number becomes the uid.
pub fn decode(text: &str) -> Result<Vec<Chapter>> {
    let mut entries: BTreeMap<u32, (Option<ChapterTime>, Option<String>)> = BTreeMap::new();

    for (line_no, raw) in text.lines().enumerate() {
        let line = raw.trim_start_matches('\u{feff}');
        if line.trim().is_empty() {
            continue;
        }

        let malformed = || ChapterCoreError::SimpleFormat(format!("line {}: malformed chapter entry {:?}", line_no + 1, raw));
        let (key, value) = line.split_once('=').ok_or_else(malformed)?;
        let rest = key.trim().strip_prefix("CHAPTER").ok_or_else(malformed)?;

        let (digits, is_name) = match rest.strip_suffix("NAME") {
            Some(digits) => (digits, true),
            None => (rest, false),
        };
        let number: u32 = digits.parse().map_err(|_| malformed())?;

        let entry = entries.entry(number).or_default();
        if is_name {
            entry.1 = Some(value.to_string());
        } else {
            entry.0 = Some(ChapterTime::parse(value)?);
        }
    }

    entries
        .into_iter()
        .enumerate()
        .map(|(index, (number, (start, name)))| {
            let start = start.ok_or(ChapterCoreError::MissingElement { index, element: "CHAPTERxx" })?;
            Ok(Chapter::new(number.to_string(), start, None, name.unwrap_or_default()))
        })
        .collect()
}
