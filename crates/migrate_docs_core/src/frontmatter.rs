//! Line-preserving model of a leading YAML frontmatter block.
//!
//! Only the keys the migration understands are ever edited. Every other line,
//! including comments, blank lines and unknown keys, is kept byte for byte so a
//! re-rendered block differs from the original only where an edit happened.

/// One top-level key and all of its lines (the key line plus continuation lines).
/// Lines before the first key carry `key: None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub key: Option<String>,
    pub lines: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frontmatter {
    open: String,
    entries: Vec<Entry>,
    close: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Document<'a> {
    /// No frontmatter block; the whole content is body.
    Plain(&'a str),
    /// Opening delimiter without a closing one; the whole content is body.
    Malformed(&'a str),
    Parsed {
        frontmatter: Frontmatter,
        body: &'a str,
    },
}

impl<'a> Document<'a> {
    pub fn parse(content: &'a str) -> Self {
        let mut lines = content.split_inclusive('\n');
        let Some(first) = lines.next() else {
            return Self::Plain(content);
        };
        if first.trim_end_matches(['\r', '\n']).trim_start_matches('\u{feff}') != "---" {
            return Self::Plain(content);
        }

        let mut offset = first.len();
        let mut raw_lines = Vec::new();
        for line in lines {
            offset += line.len();
            let bare = line.trim_end_matches(['\r', '\n']).trim_end();
            if bare == "---" || bare == "..." {
                return Self::Parsed {
                    frontmatter: Frontmatter {
                        open: first.to_string(),
                        entries: group_entries(raw_lines),
                        close: line.to_string(),
                    },
                    body: &content[offset..],
                };
            }
            raw_lines.push(line.to_string());
        }
        Self::Malformed(content)
    }

    pub fn body(&self) -> &'a str {
        match self {
            Self::Plain(body) | Self::Malformed(body) => body,
            Self::Parsed { body, .. } => body,
        }
    }
}

impl Frontmatter {
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn entry_mut(&mut self, key: &str) -> Option<&mut Entry> {
        self.entries
            .iter_mut()
            .find(|entry| entry.key.as_deref() == Some(key))
    }

    /// Drop a key together with its continuation lines. Returns whether it existed.
    pub fn remove(&mut self, key: &str) -> bool {
        let before = self.entries.len();
        self.entries
            .retain(|entry| entry.key.as_deref() != Some(key));
        self.entries.len() != before
    }

    /// The YAML between the delimiters.
    pub fn yaml(&self) -> String {
        self.entries
            .iter()
            .flat_map(|entry| entry.lines.iter())
            .map(String::as_str)
            .collect()
    }

    pub fn render(&self) -> String {
        let mut out = String::with_capacity(self.open.len() + self.close.len() + 64);
        out.push_str(&self.open);
        out.push_str(&self.yaml());
        out.push_str(&self.close);
        out
    }

    pub fn render_with_body(&self, body: &str) -> String {
        let mut out = self.render();
        out.push_str(body);
        out
    }
}

fn group_entries(lines: Vec<String>) -> Vec<Entry> {
    let mut entries: Vec<Entry> = Vec::new();
    for line in lines {
        match top_level_key(&line) {
            Some(key) => entries.push(Entry {
                key: Some(key.to_string()),
                lines: vec![line],
            }),
            None => match entries.last_mut() {
                Some(entry) => entry.lines.push(line),
                None => entries.push(Entry {
                    key: None,
                    lines: vec![line],
                }),
            },
        }
    }
    entries
}

/// `key` for a line shaped like `key: value` or `key:` starting at column 0.
pub fn top_level_key(line: &str) -> Option<&str> {
    let first = line.chars().next()?;
    if !(first.is_ascii_alphanumeric() || first == '_') {
        return None;
    }
    let colon = line.find(':')?;
    let key = &line[..colon];
    if !key
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-' | '.'))
    {
        return None;
    }
    let after = &line[colon + 1..];
    if after.is_empty() || after.starts_with([' ', '\t', '\r', '\n']) {
        Some(key)
    } else {
        None
    }
}

/// Split a `key: value  # comment` line into (`key: `, value token, rest).
/// The token keeps any surrounding quotes.
pub fn split_scalar_line(line: &str) -> Option<(&str, &str, &str)> {
    let colon = line.find(':')?;
    let after = &line[colon + 1..];
    let leading = after.len() - after.trim_start_matches([' ', '\t']).len();
    let value_start = colon + 1 + leading;
    let value = &line[value_start..];
    let value_len = scalar_token_len(value);
    if value_len == 0 {
        return None;
    }
    Some((
        &line[..value_start],
        &value[..value_len],
        &value[value_len..],
    ))
}

fn scalar_token_len(value: &str) -> usize {
    let bytes = value.as_bytes();
    match bytes.first() {
        Some(quote @ (b'"' | b'\'')) => match value[1..].find(*quote as char) {
            Some(end) => end + 2,
            None => 0,
        },
        Some(_) => {
            let end = value
                .find(" #")
                .or_else(|| value.find(['\r', '\n']))
                .unwrap_or(value.len());
            value[..end].trim_end().len()
        }
        None => 0,
    }
}

/// Strip one level of matching quotes.
pub fn unquote(token: &str) -> (&str, &str) {
    for quote in ["\"", "'"] {
        if token.len() >= 2
            && let Some(inner) = token
                .strip_prefix(quote)
                .and_then(|rest| rest.strip_suffix(quote))
        {
            return (inner, quote);
        }
    }
    (token, "")
}

#[cfg(test)]
mod tests {
    use super::{Document, split_scalar_line, top_level_key, unquote};

    #[test]
    fn parses_frontmatter_and_keeps_body_offset() {
        let content = "---\ntitle: Dispatcher\nversion: 0.1.0\n---\n# Heading\n";
        let Document::Parsed { frontmatter, body } = Document::parse(content) else {
            panic!("expected frontmatter");
        };
        assert_eq!(body, "# Heading\n");
        assert_eq!(frontmatter.entries().len(), 2);
        assert_eq!(frontmatter.render_with_body(body), content);
    }

    #[test]
    fn continuation_lines_stay_with_their_key() {
        let content = "---\n# leading comment\ntags:\n  - core\n  - v0.1.0\nevolves-to: v0.2.0/x.md\n---\n";
        let Document::Parsed { mut frontmatter, .. } = Document::parse(content) else {
            panic!("expected frontmatter");
        };
        let keys: Vec<Option<&str>> = frontmatter
            .entries()
            .iter()
            .map(|entry| entry.key.as_deref())
            .collect();
        assert_eq!(keys, vec![None, Some("tags"), Some("evolves-to")]);
        assert_eq!(frontmatter.entries()[1].lines.len(), 3);

        assert!(frontmatter.remove("tags"));
        assert!(!frontmatter.remove("tags"));
        assert_eq!(
            frontmatter.render(),
            "---\n# leading comment\nevolves-to: v0.2.0/x.md\n---\n"
        );
    }

    #[test]
    fn unterminated_block_is_malformed() {
        let content = "---\ntitle: Draft\n\nNo closing delimiter.\n";
        assert_eq!(Document::parse(content), Document::Malformed(content));
        assert_eq!(Document::parse(content).body(), content);
    }

    #[test]
    fn content_without_leading_delimiter_is_plain() {
        let content = "# Title\n---\nversion: 0.1.0\n---\n";
        assert_eq!(Document::parse(content), Document::Plain(content));
        assert_eq!(Document::parse(""), Document::Plain(""));
    }

    #[test]
    fn crlf_delimiters_are_recognized() {
        let content = "---\r\nversion: 0.1.0\r\n---\r\nbody\r\n";
        let Document::Parsed { frontmatter, body } = Document::parse(content) else {
            panic!("expected frontmatter");
        };
        assert_eq!(body, "body\r\n");
        assert_eq!(frontmatter.render_with_body(body), content);
    }

    #[test]
    fn key_detection_ignores_nested_and_list_lines() {
        assert_eq!(top_level_key("version: 1\n"), Some("version"));
        assert_eq!(top_level_key("evolves-to:\n"), Some("evolves-to"));
        assert_eq!(top_level_key("  nested: 1\n"), None);
        assert_eq!(top_level_key("- item\n"), None);
        assert_eq!(top_level_key("url: http://x\n"), Some("url"));
        assert_eq!(top_level_key("http://x\n"), None);
    }

    #[test]
    fn scalar_split_keeps_quotes_and_comments() {
        assert_eq!(
            split_scalar_line("version: \"0.1.0\"  # pinned\n"),
            Some(("version: ", "\"0.1.0\"", "  # pinned\n"))
        );
        assert_eq!(
            split_scalar_line("version: 0.1.0\r\n"),
            Some(("version: ", "0.1.0", "\r\n"))
        );
        assert_eq!(split_scalar_line("version:\n"), None);
        assert_eq!(unquote("'v0.1.0'"), ("v0.1.0", "'"));
        assert_eq!(unquote("v0.1.0"), ("v0.1.0", ""));
    }
}
