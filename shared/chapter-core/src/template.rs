//! Title template engine
//!
//! Templates are plain strings with `{token}` placeholders. `{{` and `}}`
//! produce literal braces. After substitution the title is tidied up: empty
//! bracket pairs left by missing fields are removed, whitespace runs collapse
//! to one space and a dangling trailing dash is stripped.

use crate::{ChapterCoreError, RecognitionResult, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// Built-in template preset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Preset {
    pub name: &'static str,
    pub format: &'static str,
    pub description: &'static str,
}

pub const PRESETS: &[Preset] = &[
    Preset { name: "default", format: "{name} - {artists}", description: "Song name and artists" },
    Preset { name: "with_trans", format: "{name}（{trans_name}）- {artists}", description: "Song name with translated name and artists" },
    Preset { name: "full", format: "{name} - {artists} [{album}]", description: "Song name, artists and album" },
    Preset { name: "simple", format: "{name}", description: "Song name only" },
    Preset { name: "artist_first", format: "{artists} - {name}", description: "Artists before song name" },
    Preset { name: "with_id", format: "{name} - {artists} (ID: {id})", description: "Song name, artists and catalog id" },
    Preset { name: "detailed", format: "{name}（{trans_name}）- {artists} | {album}", description: "Translated name, artists and album" },
    Preset { name: "japanese", format: "{name} / {artists}", description: "Slash separated, for Japanese titles" },
    Preset { name: "minimal", format: "{name} - {artist_first}", description: "Song name and first artist" },
];

pub const DEFAULT_PRESET: &str = "default";

/// Placeholder description shown by `--show-variables`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenInfo {
    pub token: &'static str,
    pub description: &'static str,
    pub example: &'static str,
}

pub const TOKENS: &[TokenInfo] = &[
    TokenInfo { token: "name", description: "Song name", example: "ハジメテノオト" },
    TokenInfo { token: "trans_name", description: "Translated song name", example: "初次之音" },
    TokenInfo { token: "artists", description: "All artists, comma separated", example: "初音ミク, malo" },
    TokenInfo { token: "artist_first", description: "First artist", example: "初音ミク" },
    TokenInfo { token: "album", description: "Album name", example: "VOCALOID" },
    TokenInfo { token: "id", description: "Catalog song id", example: "12345678" },
    TokenInfo { token: "popularity", description: "Catalog popularity score", example: "95" },
];

/// Song used to preview presets
pub fn sample_song() -> RecognitionResult {
    RecognitionResult {
        name: "ハジメテノオト".to_string(),
        artists: vec!["初音ミク".to_string(), "malo".to_string()],
        album: "VOCALOID".to_string(),
        id: "12345678".to_string(),
        translated_name: Some("初次之音".to_string()),
        popularity: Some(95.0),
    }
}

/// Fallback title when a render fails and the song has no name
pub const UNKNOWN_TITLE: &str = "Unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token {
    Name,
    TransName,
    Artists,
    ArtistFirst,
    Album,
    Id,
    Popularity,
}

impl Token {
    fn lookup(name: &str) -> Option<Token> {
        match name {
            "name" => Some(Token::Name),
            "trans_name" => Some(Token::TransName),
            "artists" => Some(Token::Artists),
            "artist_first" => Some(Token::ArtistFirst),
            "album" => Some(Token::Album),
            "id" => Some(Token::Id),
            "popularity" => Some(Token::Popularity),
            _ => None,
        }
    }

    fn value(&self, song: &RecognitionResult) -> String {
        match self {
            Token::Name => song.name.clone(),
            Token::TransName => song.translated().to_string(),
            Token::Artists => song.artists_joined(),
            Token::ArtistFirst => song.first_artist().to_string(),
            Token::Album => song.album.clone(),
            Token::Id => song.id.clone(),
            Token::Popularity => format_popularity(song.popularity),
        }
    }
}

fn format_popularity(popularity: Option<f64>) -> String {
    match popularity {
        None => String::new(),
        Some(p) if p.is_finite() && p.fract() == 0.0 => format!("{}", p as i64),
        Some(p) => p.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Token(Token),
}

fn parse_segments(format: &str) -> Result<Vec<Segment>> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut chars = format.char_indices().peekable();

    while let Some((pos, c)) = chars.next() {
        match c {
            '{' if matches!(chars.peek(), Some((_, '{'))) => {
                chars.next();
                literal.push('{');
            }
            '}' if matches!(chars.peek(), Some((_, '}'))) => {
                chars.next();
                literal.push('}');
            }
            '{' => {
                let mut name = String::new();
                let mut closed = false;
                for (_, inner) in chars.by_ref() {
                    if inner == '}' {
                        closed = true;
                        break;
                    }
                    if inner == '{' {
                        return Err(ChapterCoreError::UnbalancedBrace(pos));
                    }
                    name.push(inner);
                }
                if !closed {
                    return Err(ChapterCoreError::UnbalancedBrace(pos));
                }
                let token = Token::lookup(name.trim())
                    .ok_or_else(|| ChapterCoreError::UnknownToken(name.trim().to_string()))?;
                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(Segment::Token(token));
            }
            '}' => return Err(ChapterCoreError::UnbalancedBrace(pos)),
            other => literal.push(other),
        }
    }

    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    Ok(segments)
}

fn cleanup_rules() -> &'static [(Regex, &'static str)] {
    static RULES: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    RULES.get_or_init(|| {
        [
            (r"\(\s*\)|（\s*）|\[\s*\]|【\s*】", " "),
            (r"\s+", " "),
            (r"\s*-\s*$", ""),
        ]
        .into_iter()
        .filter_map(|(pattern, replacement)| Regex::new(pattern).ok().map(|re| (re, replacement)))
        .collect()
    })
}

const OPEN_BRACKETS: [char; 2] = ['(', '（'];
const CLOSE_BRACKETS: [char; 2] = [')', '）'];

/// A title format, either a preset's or user supplied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TitleTemplate {
    format: String,
}

impl TitleTemplate {
    pub fn new(format: impl Into<String>) -> Self {
        Self { format: format.into() }
    }

    pub fn format(&self) -> &str {
        &self.format
    }

    /// Check that the braces balance and every token is known
    pub fn validate(&self) -> Result<()> {
        parse_segments(&self.format).map(|_| ())
    }

    /// Render a title for `song`
    pub fn render(&self, song: &RecognitionResult) -> Result<String> {
        let mut segments = parse_segments(&self.format)?;

        if song.translated().trim().is_empty() {
            drop_translated_name(&mut segments);
        }

        let mut title = String::new();
        for segment in &segments {
            match segment {
                Segment::Literal(text) => title.push_str(text),
                Segment::Token(token) => title.push_str(&token.value(song)),
            }
        }

        for (re, replacement) in cleanup_rules() {
            title = re.replace_all(&title, *replacement).into_owned();
        }
        Ok(title.trim().to_string())
    }

    /// Render, falling back to the bare song name (or `Unknown`) on failure
    pub fn render_or_fallback(&self, song: &RecognitionResult) -> String {
        match self.render(song) {
            Ok(title) if !title.is_empty() => title,
            Ok(_) => fallback_title(song),
            Err(e) => {
                tracing::warn!("⚠️ Template '{}' failed to render: {}", self.format, e);
                fallback_title(song)
            }
        }
    }
}

impl fmt::Display for TitleTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format)
    }
}

fn fallback_title(song: &RecognitionResult) -> String {
    let name = song.name.trim();
    if name.is_empty() {
        UNKNOWN_TITLE.to_string()
    } else {
        name.to_string()
    }
}

/// Replace each `{trans_name}` and any bracket hugging it with one space
fn drop_translated_name(segments: &mut Vec<Segment>) {
    let mut i = 0;
    while i < segments.len() {
        if segments[i] != Segment::Token(Token::TransName) {
            i += 1;
            continue;
        }

        if i > 0 {
            if let Segment::Literal(before) = &mut segments[i - 1] {
                if before.ends_with(OPEN_BRACKETS) {
                    before.pop();
                }
            }
        }
        if let Some(Segment::Literal(after)) = segments.get_mut(i + 1) {
            if let Some(rest) = after.strip_prefix(CLOSE_BRACKETS) {
                *after = rest.to_string();
            }
        }

        segments[i] = Segment::Literal(" ".to_string());
        i += 1;
    }
}

/// Template chosen for a run: a preset name or a raw format string
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateSpec {
    Preset(String),
    Custom(String),
}

impl Default for TemplateSpec {
    fn default() -> Self {
        TemplateSpec::Preset(DEFAULT_PRESET.to_string())
    }
}

impl TemplateSpec {
    /// A non-empty custom format wins over the preset name
    pub fn from_parts(preset: Option<&str>, custom: Option<&str>) -> Self {
        match custom.map(str::trim).filter(|c| !c.is_empty()) {
            Some(custom) => TemplateSpec::Custom(custom.to_string()),
            None => TemplateSpec::Preset(preset.unwrap_or(DEFAULT_PRESET).to_string()),
        }
    }

    /// Resolve to a validated template
    pub fn resolve(&self) -> Result<TitleTemplate> {
        let template = match self {
            TemplateSpec::Preset(name) => {
                let preset = PRESETS
                    .iter()
                    .find(|p| p.name == name)
                    .ok_or_else(|| ChapterCoreError::UnknownPreset(name.clone()))?;
                TitleTemplate::new(preset.format)
            }
            TemplateSpec::Custom(format) => TitleTemplate::new(format.clone()),
        };
        template.validate()?;
        Ok(template)
    }
}
