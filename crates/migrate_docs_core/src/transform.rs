use regex::{Captures, Regex};
use serde::Serialize;
use tracing::debug;

use crate::error::{MigrateError, Result};
use crate::evolution::strip_evolution_markers;
use crate::frontmatter::{Document, split_scalar_line, unquote};
use crate::request::DocVersion;

#[derive(Debug, Clone)]
pub struct TransformOptions {
    pub old: DocVersion,
    pub new: DocVersion,
    pub strip_evolution: bool,
    pub link_prefix: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum TransformWarning {
    MalformedFrontmatter,
    InvalidYaml(String),
}

impl std::fmt::Display for TransformWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MalformedFrontmatter => {
                f.write_str("unterminated frontmatter block; frontmatter rules skipped")
            }
            Self::InvalidYaml(message) => write!(f, "frontmatter is not valid YAML: {message}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TransformResult {
    pub original_content: String,
    pub transformed_content: String,
    pub changed: bool,
    pub rules_applied: Vec<&'static str>,
    pub warnings: Vec<TransformWarning>,
}

type RuleFn = fn(&str, &Transformer) -> String;

/// Rewrite rules in application order. Later rules never see the old version
/// where an earlier rule already replaced it.
const RULES: &[(&str, RuleFn)] = &[
    ("frontmatter-version", rewrite_frontmatter_version),
    ("frontmatter-evolves-to", strip_evolves_to),
    ("badges", rewrite_badges),
    ("absolute-links", rewrite_absolute_links),
    ("relative-links", rewrite_relative_links),
    ("inline-version", rewrite_inline_version),
    ("evolution", strip_evolution),
];

pub fn rule_names() -> impl Iterator<Item = &'static str> {
    RULES.iter().map(|(name, _)| *name)
}

/// Compiled rewrite patterns for one source/target pair.
#[derive(Debug, Clone)]
pub struct Transformer {
    options: TransformOptions,
    badge: Regex,
    absolute_link: Regex,
    relative_link: Regex,
}

impl Transformer {
    pub fn new(options: TransformOptions) -> Result<Self> {
        let old_forms = version_alternation(&options.old);
        let old_path = regex::escape(&options.old.path);
        let prefix = regex::escape(options.link_prefix.trim_end_matches('/'));
        let boundary = r#"([/)#"'>\s]|$)"#;

        let badge = compile(&format!(
            r"(!\[[^\]]*\]\([^)\s]*?/badge/version-)({old_forms})(-[^)\s]*\))"
        ))?;
        let absolute_link = compile(&format!(r"({prefix}/){old_path}{boundary}"))?;
        let relative_link = compile(&format!(
            r#"(?m)(^|[\s(\["'<=])((?:\.\./)+|\./){old_path}{boundary}"#
        ))?;

        Ok(Self {
            options,
            badge,
            absolute_link,
            relative_link,
        })
    }

    fn same_version(&self) -> bool {
        self.options.old == self.options.new
    }

    pub fn transform(&self, content: &str) -> TransformResult {
        let warnings = inspect_frontmatter(content);
        let mut current = content.to_string();
        let mut rules_applied = Vec::new();
        for (name, rule) in RULES {
            let next = rule(&current, self);
            if next != current {
                debug!(rule = *name, "rewrite rule applied");
                rules_applied.push(*name);
                current = next;
            }
        }

        TransformResult {
            changed: current != content,
            original_content: content.to_string(),
            transformed_content: current,
            rules_applied,
            warnings,
        }
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern)
        .map_err(|error| MigrateError::validation(format!("invalid rewrite pattern: {error}")))
}

/// Longest form first so `v0.1.0` wins over `0.1.0`.
fn version_alternation(version: &DocVersion) -> String {
    if version.name == version.number {
        regex::escape(&version.name)
    } else {
        format!(
            "{}|{}",
            regex::escape(&version.name),
            regex::escape(&version.number)
        )
    }
}

fn inspect_frontmatter(content: &str) -> Vec<TransformWarning> {
    match Document::parse(content) {
        Document::Plain(_) => Vec::new(),
        Document::Malformed(_) => vec![TransformWarning::MalformedFrontmatter],
        Document::Parsed { frontmatter, .. } => {
            match serde_yaml::from_str::<serde_yaml::Value>(&frontmatter.yaml()) {
                Ok(_) => Vec::new(),
                Err(error) => vec![TransformWarning::InvalidYaml(error.to_string())],
            }
        }
    }
}

/// Apply `rewrite` to the body only, keeping any frontmatter prefix verbatim.
fn map_body(content: &str, rewrite: impl FnOnce(&str) -> String) -> String {
    let body = Document::parse(content).body();
    let prefix = &content[..content.len() - body.len()];
    let mut out = String::with_capacity(content.len());
    out.push_str(prefix);
    out.push_str(&rewrite(body));
    out
}

/// Rule 1: `version:` scalar and matching `tags:` entries.
pub(crate) fn rewrite_frontmatter_version(content: &str, ctx: &Transformer) -> String {
    if ctx.same_version() {
        return content.to_string();
    }
    let Document::Parsed {
        mut frontmatter,
        body,
    } = Document::parse(content)
    else {
        return content.to_string();
    };
    let (old, new) = (&ctx.options.old, &ctx.options.new);

    if let Some(entry) = frontmatter.entry_mut("version")
        && let Some(first) = entry.lines.first_mut()
        && let Some((head, token, rest)) = split_scalar_line(first)
    {
        let (value, quote) = unquote(token);
        if let Some(replacement) = new.counterpart(old, value) {
            *first = format!("{head}{quote}{replacement}{quote}{rest}");
        }
    }

    if let Some(entry) = frontmatter.entry_mut("tags") {
        for (index, line) in entry.lines.iter_mut().enumerate() {
            let rewritten = if index == 0 {
                match line.find(':') {
                    Some(colon) => {
                        let (head, tail) = line.split_at(colon + 1);
                        format!("{head}{}", rewrite_tag_text(tail, old, new))
                    }
                    None => line.clone(),
                }
            } else {
                rewrite_tag_text(line, old, new)
            };
            *line = rewritten;
        }
    }

    frontmatter.render_with_body(body)
}

/// Replace tags equal to the old version in flow (`[a, b]`), block (`- a`) or scalar form.
fn rewrite_tag_text(text: &str, old: &DocVersion, new: &DocVersion) -> String {
    let (content, comment) = match text.find(" #") {
        Some(position) => text.split_at(position),
        None => (text, ""),
    };
    let mut out = String::with_capacity(text.len());
    let mut piece_start = 0;
    for (position, ch) in content.char_indices() {
        if matches!(ch, '[' | ']' | ',') {
            out.push_str(&rewrite_tag_piece(&content[piece_start..position], old, new));
            out.push(ch);
            piece_start = position + ch.len_utf8();
        }
    }
    out.push_str(&rewrite_tag_piece(&content[piece_start..], old, new));
    out.push_str(comment);
    out
}

fn rewrite_tag_piece(piece: &str, old: &DocVersion, new: &DocVersion) -> String {
    let leading_len = piece.len() - piece.trim_start().len();
    let (leading, rest) = piece.split_at(leading_len);
    let (marker, rest) = match rest.strip_prefix("- ") {
        Some(after) => {
            let spaces = after.len() - after.trim_start().len();
            rest.split_at(2 + spaces)
        }
        None => ("", rest),
    };
    let token = rest.trim_end();
    let trailing = &rest[token.len()..];
    let (value, quote) = unquote(token);
    match new.counterpart(old, value) {
        Some(replacement) if !value.is_empty() => {
            format!("{leading}{marker}{quote}{replacement}{quote}{trailing}")
        }
        _ => piece.to_string(),
    }
}

/// Rule 2: drop `evolves-to` when stripping evolution content.
pub(crate) fn strip_evolves_to(content: &str, ctx: &Transformer) -> String {
    if !ctx.options.strip_evolution {
        return content.to_string();
    }
    let Document::Parsed {
        mut frontmatter,
        body,
    } = Document::parse(content)
    else {
        return content.to_string();
    };
    if !frontmatter.remove("evolves-to") {
        return content.to_string();
    }
    frontmatter.render_with_body(body)
}

/// Rule 3: shield badge URLs inside Markdown image syntax.
pub(crate) fn rewrite_badges(content: &str, ctx: &Transformer) -> String {
    if ctx.same_version() {
        return content.to_string();
    }
    let (old, new) = (&ctx.options.old, &ctx.options.new);
    map_body(content, |body| {
        ctx.badge
            .replace_all(body, |captures: &Captures<'_>| {
                let replacement = new
                    .counterpart(old, &captures[2])
                    .unwrap_or(new.number.as_str());
                format!("{}{}{}", &captures[1], replacement, &captures[3])
            })
            .into_owned()
    })
}

/// Rule 4: `/docs/<old>/...` links.
pub(crate) fn rewrite_absolute_links(content: &str, ctx: &Transformer) -> String {
    if ctx.same_version() {
        return content.to_string();
    }
    let new_path = &ctx.options.new.path;
    map_body(content, |body| {
        ctx.absolute_link
            .replace_all(body, |captures: &Captures<'_>| {
                format!("{}{}{}", &captures[1], new_path, &captures[2])
            })
            .into_owned()
    })
}

/// Rule 5: `../<old>/...` and `./<old>/...` links, keeping the number of hops.
pub(crate) fn rewrite_relative_links(content: &str, ctx: &Transformer) -> String {
    if ctx.same_version() {
        return content.to_string();
    }
    let new_path = &ctx.options.new.path;
    map_body(content, |body| {
        ctx.relative_link
            .replace_all(body, |captures: &Captures<'_>| {
                format!(
                    "{}{}{}{}",
                    &captures[1], &captures[2], new_path, &captures[3]
                )
            })
            .into_owned()
    })
}

/// Rule 6: bare mentions of the old version name in prose.
pub(crate) fn rewrite_inline_version(content: &str, ctx: &Transformer) -> String {
    if ctx.same_version() {
        return content.to_string();
    }
    let (old, new) = (&ctx.options.old.name, &ctx.options.new.name);
    map_body(content, |body| replace_version_token(body, old, new))
}

/// Rule 7: evolution-only content.
pub(crate) fn strip_evolution(content: &str, ctx: &Transformer) -> String {
    if !ctx.options.strip_evolution {
        return content.to_string();
    }
    map_body(content, strip_evolution_markers)
}

/// Replace whole-token occurrences of `token`. Occurrences glued to identifiers,
/// paths or longer version numbers are left alone.
pub fn replace_version_token(text: &str, token: &str, replacement: &str) -> String {
    if token.is_empty() {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    while let Some(found) = text[cursor..].find(token) {
        let start = cursor + found;
        let end = start + token.len();
        if is_token_start(text, start) && is_token_end(text, end) {
            out.push_str(&text[cursor..start]);
            out.push_str(replacement);
        } else {
            out.push_str(&text[cursor..end]);
        }
        cursor = end;
    }
    out.push_str(&text[cursor..]);
    out
}

fn is_token_start(text: &str, start: usize) -> bool {
    match text[..start].chars().next_back() {
        Some(prev) => !(prev.is_alphanumeric() || matches!(prev, '_' | '-' | '.' | '/')),
        None => true,
    }
}

fn is_token_end(text: &str, end: usize) -> bool {
    let mut rest = text[end..].chars();
    match rest.next() {
        None => true,
        Some('.') => !rest.next().is_some_and(|ch| ch.is_ascii_digit()),
        Some(next) => !(next.is_alphanumeric() || matches!(next, '_' | '-')),
    }
}
