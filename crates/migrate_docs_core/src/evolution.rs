//! Removal of content that only describes how a pre-release version evolves:
//! `:::planned` admonitions, "Evolution Timeline" sections, "Next Update"
//! badges and previous/next version navigation lines.
//!
//! Lines inside fenced code blocks are never treated as markers.

use std::sync::LazyLock;

use regex::Regex;

static MARKDOWN_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"!?\[([^\]]*)\]\([^)]*\)").expect("markdown link pattern is valid")
});

const TIMELINE_TITLE: &str = "evolution timeline";
const NEXT_UPDATE_MARKERS: &[&str] = &[
    "next update",
    "next_update",
    "next%20update",
    "next--update",
    "next-update",
];
const NAVIGATION_LABELS: &[&str] = &["previous version", "next version"];
const NAVIGATION_SEPARATORS: &[char] = &[
    '|', '·', '•', '-', '\u{2013}', '\u{2014}', '←', '→', '<', '>', '*', '_',
];

pub fn strip_evolution_markers(body: &str) -> String {
    let lines: Vec<&str> = body.split_inclusive('\n').collect();
    let mut out: Vec<&str> = Vec::with_capacity(lines.len());
    let mut fence = FenceState::default();
    let mut swallow_blank = false;
    let mut index = 0;

    while index < lines.len() {
        let line = lines[index];

        if !fence.is_open() {
            let removed_until = planned_block_end(&lines, index)
                .or_else(|| timeline_section_end(&lines, index))
                .or_else(|| {
                    (is_next_update_badge(line) || is_navigation_line(line)).then_some(index + 1)
                });
            if let Some(end) = removed_until {
                index = end;
                swallow_blank = true;
                continue;
            }
        }

        if swallow_blank && is_blank(line) && out.last().is_none_or(|last| is_blank(last)) {
            index += 1;
            continue;
        }
        swallow_blank = false;
        fence.observe(line);
        out.push(line);
        index += 1;
    }

    out.concat()
}

/// `:::planned` block starting at `start` whose body announces a future version.
/// Returns the index just past its closing `:::`.
fn planned_block_end(lines: &[&str], start: usize) -> Option<usize> {
    let opener = lines[start].trim();
    let is_planned = opener
        .strip_prefix(":::planned")
        .is_some_and(|rest| rest.is_empty() || rest.starts_with([' ', '\t', '{', '[']));
    if !is_planned {
        return None;
    }
    let mut depth = 1usize;
    let mut fence = FenceState::default();
    for (offset, line) in lines[start + 1..].iter().enumerate() {
        fence.observe(line);
        if fence.is_open() {
            continue;
        }
        let trimmed = line.trim();
        if trimmed == ":::" {
            depth -= 1;
            if depth == 0 {
                let end = start + 1 + offset;
                let announces_version = lines[start + 1..end]
                    .iter()
                    .any(|line| mentions_coming_version(line));
                return announces_version.then_some(end + 1);
            }
        } else if trimmed.starts_with(":::") {
            depth += 1;
        }
    }
    None
}

fn mentions_coming_version(line: &str) -> bool {
    let marker = "Coming in v";
    let mut rest = line;
    while let Some(position) = rest.find(marker) {
        let after = &rest[position + marker.len()..];
        if after.starts_with(|ch: char| ch.is_ascii_digit()) {
            return true;
        }
        rest = after;
    }
    false
}

/// Heading titled "Evolution Timeline": the section runs to the next heading of the
/// same or a higher level, and so includes its Mermaid diagram.
fn timeline_section_end(lines: &[&str], start: usize) -> Option<usize> {
    let (level, title) = heading(lines[start])?;
    if !title.eq_ignore_ascii_case(TIMELINE_TITLE) {
        return None;
    }
    let mut fence = FenceState::default();
    for (offset, line) in lines[start + 1..].iter().enumerate() {
        if !fence.is_open()
            && let Some((next_level, _)) = heading(line)
            && next_level <= level
        {
            return Some(start + 1 + offset);
        }
        fence.observe(line);
    }
    Some(lines.len())
}

fn heading(line: &str) -> Option<(usize, &str)> {
    let trimmed = line.trim_end();
    let level = trimmed.chars().take_while(|ch| *ch == '#').count();
    if level == 0 || level > 6 {
        return None;
    }
    let rest = &trimmed[level..];
    if !rest.is_empty() && !rest.starts_with([' ', '\t']) {
        return None;
    }
    Some((level, rest.trim().trim_end_matches('#').trim()))
}

fn is_next_update_badge(line: &str) -> bool {
    let lowered = line.to_ascii_lowercase();
    lowered.contains("![")
        && NEXT_UPDATE_MARKERS
            .iter()
            .any(|marker| lowered.contains(marker))
}

/// A line made only of links to other versions, separators and list markers.
fn is_navigation_line(line: &str) -> bool {
    let trimmed = line.trim();
    let item = trimmed
        .strip_prefix("- ")
        .or_else(|| trimmed.strip_prefix("* "))
        .or_else(|| trimmed.strip_prefix("+ "))
        .unwrap_or(trimmed);

    let mut links = 0usize;
    for captures in MARKDOWN_LINK.captures_iter(item) {
        let text = captures
            .get(1)
            .map(|label| label.as_str().to_ascii_lowercase())
            .unwrap_or_default();
        if !NAVIGATION_LABELS.iter().any(|label| text.contains(label)) {
            return false;
        }
        links += 1;
    }
    if links == 0 {
        return false;
    }

    MARKDOWN_LINK
        .replace_all(item, "")
        .chars()
        .all(|ch| ch.is_whitespace() || NAVIGATION_SEPARATORS.contains(&ch))
}

fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}

#[derive(Debug, Default)]
struct FenceState {
    open: Option<(char, usize)>,
}

impl FenceState {
    fn is_open(&self) -> bool {
        self.open.is_some()
    }

    fn observe(&mut self, line: &str) {
        let trimmed = line.trim_start();
        let Some(marker) = trimmed.chars().next().filter(|ch| *ch == '`' || *ch == '~') else {
            return;
        };
        let run = trimmed.chars().take_while(|ch| *ch == marker).count();
        if run < 3 {
            return;
        }
        match self.open {
            None => self.open = Some((marker, run)),
            Some((open_marker, open_run)) => {
                if open_marker == marker && run >= open_run && trimmed[run..].trim().is_empty() {
                    self.open = None;
                }
            }
        }
    }
}
