use super::section::Section;
use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use std::fmt::Display;
use std::path::Path;
use thiserror::Error;

pub const ROOT_TAG: &str = "SMIRNOFF";

#[derive(Debug, Error)]
pub enum OffxmlError {
    #[error("File I/O error for '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("XML parsing error near byte {position}: {message}")]
    Parse { position: u64, message: String },
    #[error("XML writing error: {0}")]
    Write(String),
    #[error("Closing tag </{found}> does not match open element <{expected}>")]
    MismatchedTag { expected: String, found: String },
    #[error("Document has no root element")]
    MissingRoot,
    #[error("Document has more than one root element")]
    MultipleRoots,
    #[error("Expected root element <{ROOT_TAG}> but found <{0}>")]
    UnexpectedRoot(String),
}

/// Parses an `.offxml` document into its `<SMIRNOFF>` root section.
pub fn parse_str(xml: &str) -> Result<Section, OffxmlError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Section> = Vec::new();
    let mut root: Option<Section> = None;

    loop {
        let position = reader.buffer_position() as u64;
        let parse_error = |message: String| OffxmlError::Parse { position, message };

        match reader.read_event() {
            Ok(Event::Start(start)) => stack.push(section_from_start(&start, position)?),
            Ok(Event::Empty(start)) => {
                let section = section_from_start(&start, position)?;
                attach(&mut stack, &mut root, section)?;
            }
            Ok(Event::End(end)) => {
                let found = String::from_utf8_lossy(end.name().as_ref()).into_owned();
                let section = stack
                    .pop()
                    .ok_or_else(|| parse_error(format!("unexpected closing tag </{found}>")))?;
                if section.tag != found {
                    return Err(OffxmlError::MismatchedTag {
                        expected: section.tag,
                        found,
                    });
                }
                attach(&mut stack, &mut root, section)?;
            }
            Ok(Event::Text(text)) => {
                let text = text.unescape().map_err(|e| parse_error(e.to_string()))?;
                append_text(&mut stack, &text);
            }
            Ok(Event::CData(data)) => {
                let text = String::from_utf8_lossy(&data).into_owned();
                append_text(&mut stack, &text);
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(parse_error(e.to_string())),
        }
    }

    if let Some(open) = stack.last() {
        return Err(OffxmlError::Parse {
            position: reader.buffer_position() as u64,
            message: format!("element <{}> is never closed", open.tag),
        });
    }
    let root = root.ok_or(OffxmlError::MissingRoot)?;
    if root.tag != ROOT_TAG {
        return Err(OffxmlError::UnexpectedRoot(root.tag));
    }
    Ok(root)
}

pub fn read_file(path: &Path) -> Result<Section, OffxmlError> {
    let content = std::fs::read_to_string(path).map_err(|e| OffxmlError::Io {
        path: path.to_string_lossy().to_string(),
        source: e,
    })?;
    parse_str(&content)
}

/// Serializes a section tree as an indented XML document.
pub fn to_string(root: &Section) -> Result<String, OffxmlError> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 4);
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))
        .map_err(write_error)?;
    write_section(&mut writer, root)?;
    let mut bytes = writer.into_inner();
    bytes.push(b'\n');
    String::from_utf8(bytes).map_err(write_error)
}

pub fn write_file(root: &Section, path: &Path) -> Result<(), OffxmlError> {
    let content = to_string(root)?;
    std::fs::write(path, content).map_err(|e| OffxmlError::Io {
        path: path.to_string_lossy().to_string(),
        source: e,
    })
}

fn section_from_start(start: &BytesStart<'_>, position: u64) -> Result<Section, OffxmlError> {
    let parse_error = |message: String| OffxmlError::Parse { position, message };

    let mut section = Section::new(String::from_utf8_lossy(start.name().as_ref()).into_owned());
    for attribute in start.attributes() {
        let attribute = attribute.map_err(|e| parse_error(e.to_string()))?;
        let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
        let value = attribute
            .unescape_value()
            .map_err(|e| parse_error(e.to_string()))?
            .into_owned();
        section.attributes.push((key, value));
    }
    Ok(section)
}

fn attach(
    stack: &mut [Section],
    root: &mut Option<Section>,
    section: Section,
) -> Result<(), OffxmlError> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(section),
        None if root.is_none() => *root = Some(section),
        None => return Err(OffxmlError::MultipleRoots),
    }
    Ok(())
}

fn append_text(stack: &mut [Section], text: &str) {
    let text = text.trim();
    if text.is_empty() {
        return;
    }
    if let Some(parent) = stack.last_mut() {
        match &mut parent.text {
            Some(existing) => existing.push_str(text),
            None => parent.text = Some(text.to_string()),
        }
    }
}

fn write_section(writer: &mut Writer<Vec<u8>>, section: &Section) -> Result<(), OffxmlError> {
    let mut start = BytesStart::new(section.tag.as_str());
    for (key, value) in &section.attributes {
        start.push_attribute((key.as_str(), value.as_str()));
    }

    if section.children.is_empty() && section.text.is_none() {
        return writer.write_event(Event::Empty(start)).map_err(write_error);
    }

    writer.write_event(Event::Start(start)).map_err(write_error)?;
    if let Some(text) = &section.text {
        writer
            .write_event(Event::Text(BytesText::new(text)))
            .map_err(write_error)?;
    }
    for child in &section.children {
        write_section(writer, child)?;
    }
    writer
        .write_event(Event::End(BytesEnd::new(section.tag.as_str())))
        .map_err(write_error)
}

fn write_error(error: impl Display) -> OffxmlError {
    OffxmlError::Write(error.to_string())
}
