//! Markdown-to-sections splitting.
//!
//! A document is cut into ordered sections on heading boundaries: a heading
//! line opens a new section and stays part of it, everything up to the next
//! heading belongs to it, and text before the first heading forms a leading
//! section of its own. Heading markers inside fenced code blocks do not
//! split.

use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One contiguous span of document content, in document order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Section {
    pub content: String,
}

pub struct Sectioner {
    heading: Regex,
    fence: Regex,
}

impl Default for Sectioner {
    fn default() -> Self {
        Self::new()
    }
}

impl Sectioner {
    pub fn new() -> Self {
        Self {
            heading: Regex::new(r"^#{1,6}\s").expect("heading pattern"),
            fence: Regex::new(r"^(```|~~~)").expect("fence pattern"),
        }
    }

    pub fn split(&self, text: &str) -> Vec<Section> {
        let mut sections: Vec<Section> = Vec::new();
        let mut current = String::new();
        let mut in_fence = false;

        for line in text.lines() {
            if self.fence.is_match(line) {
                in_fence = !in_fence;
            } else if !in_fence && self.heading.is_match(line) {
                push_section(&mut sections, &current);
                current.clear();
            }
            current.push_str(line);
            current.push('\n');
        }
        push_section(&mut sections, &current);

        sections
    }
}

fn push_section(sections: &mut Vec<Section>, content: &str) {
    let trimmed = content.trim();
    if !trimmed.is_empty() {
        sections.push(Section {
            content: trimmed.to_string(),
        });
    }
}

/// Split `text` with the default sectioner.
pub fn to_sections(text: &str) -> Vec<Section> {
    Sectioner::new().split(text)
}
