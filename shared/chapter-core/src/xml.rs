//! Matroska chapter XML codec (the document `mkvextract chapters` produces
//! and `mkvpropedit --chapters` accepts)

use crate::{Chapter, ChapterCoreError, ChapterTime, Result};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::reader::Reader;
use quick_xml::writer::Writer;
use tracing::debug;

const ROOT: &str = "Chapters";
const EDITION: &str = "EditionEntry";
const ATOM: &str = "ChapterAtom";
const UID: &str = "ChapterUID";
const TIME_START: &str = "ChapterTimeStart";
const TIME_END: &str = "ChapterTimeEnd";
const DISPLAY: &str = "ChapterDisplay";
const STRING: &str = "ChapterString";
const LANGUAGE: &str = "ChapterLanguage";

/// Language tag written for every display string
pub const NEUTRAL_LANGUAGE: &str = "und";

#[derive(Default)]
struct AtomBuilder {
    index: usize,
    depth: usize,
    uid: Option<String>,
    start: Option<String>,
    end: Option<String>,
    title: Option<String>,
}

impl AtomBuilder {
    fn build(self) -> Result<Chapter> {
        let uid = self
            .uid
            .filter(|u| !u.is_empty())
            .ok_or(ChapterCoreError::MissingElement { index: self.index, element: UID })?;
        let start = self
            .start
            .ok_or(ChapterCoreError::MissingElement { index: self.index, element: TIME_START })?;
        let start = ChapterTime::parse(&start)?;
        let end = match self.end.as_deref() {
            Some(end) if !end.is_empty() => Some(ChapterTime::parse(end)?),
            _ => None,
        };

        Ok(Chapter::new(uid, start, end, self.title.unwrap_or_default()))
    }
}

/// Decode a chapter document into the flat, ordered chapter list.
///
/// Only `ChapterAtom`s directly under an `EditionEntry` are read; nested
/// sub-chapters are skipped. Zero chapters is a valid result.
pub fn decode(document: &str) -> Result<Vec<Chapter>> {
    let mut reader = Reader::from_str(document);

    let mut path: Vec<String> = Vec::new();
    let mut text = String::new();
    let mut atom: Option<AtomBuilder> = None;
    let mut chapters = Vec::new();
    let mut atoms_seen = 0usize;
    let mut skipped_nested = 0usize;

    loop {
        let event = reader.read_event().map_err(|e| {
            ChapterCoreError::Xml(format!("at byte {}: {}", reader.buffer_position(), e))
        })?;

        match event {
            Event::Start(start) => {
                let name = element_name(&start);
                if path.is_empty() && name != ROOT {
                    return Err(ChapterCoreError::UnexpectedRoot(name));
                }

                if name == ATOM {
                    if atom.is_none() && path.last().map(String::as_str) == Some(EDITION) {
                        atom = Some(AtomBuilder {
                            index: atoms_seen,
                            depth: path.len() + 1,
                            ..AtomBuilder::default()
                        });
                        atoms_seen += 1;
                    } else if atom.is_some() {
                        skipped_nested += 1;
                    }
                }

                path.push(name);
                text.clear();
            }
            Event::Empty(empty) => {
                let name = element_name(&empty);
                if path.is_empty() && name != ROOT {
                    return Err(ChapterCoreError::UnexpectedRoot(name));
                }
                // <ChapterString/> is an explicitly empty title
                if let Some(builder) = atom.as_mut() {
                    path.push(name);
                    assign_leaf(builder, &path, String::new());
                    path.pop();
                }
            }
            Event::Text(chunk) => {
                let unescaped = chunk
                    .unescape()
                    .map_err(|e| ChapterCoreError::Xml(e.to_string()))?;
                text.push_str(&unescaped);
            }
            Event::CData(chunk) => {
                let raw = std::str::from_utf8(&chunk)
                    .map_err(|e| ChapterCoreError::Xml(e.to_string()))?;
                text.push_str(raw);
            }
            Event::End(_) => {
                if let Some(builder) = atom.as_mut() {
                    assign_leaf(builder, &path, std::mem::take(&mut text));
                }

                let closes_atom = atom.as_ref().is_some_and(|b| b.depth == path.len());
                path.pop();

                if closes_atom {
                    if let Some(builder) = atom.take() {
                        chapters.push(builder.build()?);
                    }
                }
                text.clear();
            }
            Event::Eof => break,
            // Declarations, doctype, comments and processing instructions carry no chapter data
            _ => {}
        }
    }

    if !path.is_empty() {
        return Err(ChapterCoreError::Xml(format!(
            "document ended inside <{}>",
            path.join("/")
        )));
    }

    if skipped_nested > 0 {
        debug!("Skipped {} nested chapter atoms", skipped_nested);
    }

    Ok(chapters)
}

fn element_name(start: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(start.name().as_ref()).into_owned()
}

/// Route the text of a just-closed element into the chapter being built.
/// `path` still contains the closing element as its last entry.
fn assign_leaf(builder: &mut AtomBuilder, path: &[String], value: String) {
    let depth = builder.depth;
    let Some(leaf) = path.last().map(String::as_str) else {
        return;
    };

    if path.len() == depth + 1 {
        match leaf {
            UID => builder.uid = Some(value.trim().to_string()),
            TIME_START => builder.start = Some(value.trim().to_string()),
            TIME_END => builder.end = Some(value.trim().to_string()),
            _ => {}
        }
    } else if path.len() == depth + 2 && leaf == STRING && path[depth] == DISPLAY {
        // First display string wins when several languages are present
        if builder.title.is_none() {
            builder.title = Some(value);
        }
    }
}

/// Encode chapters as a single-edition chapter document
pub fn encode(chapters: &[Chapter]) -> Result<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

    write(&mut writer, Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    write(
        &mut writer,
        Event::DocType(BytesText::from_escaped(r#"Chapters SYSTEM "matroskachapters.dtd""#)),
    )?;
    write(&mut writer, Event::Start(BytesStart::new(ROOT)))?;
    write(&mut writer, Event::Start(BytesStart::new(EDITION)))?;

    for chapter in chapters {
        write(&mut writer, Event::Start(BytesStart::new(ATOM)))?;
        write_leaf(&mut writer, UID, chapter.uid())?;
        write_leaf(&mut writer, TIME_START, &chapter.start_time().to_string())?;
        if let Some(end) = chapter.end_time() {
            write_leaf(&mut writer, TIME_END, &end.to_string())?;
        }
        write(&mut writer, Event::Start(BytesStart::new(DISPLAY)))?;
        write_leaf(&mut writer, STRING, chapter.title())?;
        write_leaf(&mut writer, LANGUAGE, NEUTRAL_LANGUAGE)?;
        write(&mut writer, Event::End(BytesEnd::new(DISPLAY)))?;
        write(&mut writer, Event::End(BytesEnd::new(ATOM)))?;
    }

    write(&mut writer, Event::End(BytesEnd::new(EDITION)))?;
    write(&mut writer, Event::End(BytesEnd::new(ROOT)))?;

    let mut document = String::from_utf8(writer.into_inner())
        .map_err(|e| ChapterCoreError::Xml(e.to_string()))?;
    document.push('\n');
    Ok(document)
}

fn write(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<()> {
    writer
        .write_event(event)
        .map_err(|e| ChapterCoreError::Xml(e.to_string()))
}

fn write_leaf(writer: &mut Writer<Vec<u8>>, name: &str, value: &str) -> Result<()> {
    write(writer, Event::Start(BytesStart::new(name)))?;
    write(writer, Event::Text(BytesText::new(value)))?;
    write(writer, Event::End(BytesEnd::new(name)))
}
