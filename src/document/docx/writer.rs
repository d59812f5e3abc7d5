use crate::document::DocumentError;
use crate::error::TableFillError;
use quick_xml::events::BytesEnd;
use quick_xml::events::BytesStart;
use quick_xml::events::BytesText;
use quick_xml::events::Event;
use quick_xml::Reader;
use quick_xml::Writer;
use std::collections::BTreeMap;

/// Cell key inside one part: (top-level table ordinal, row, `w:tc` index within the row)
pub(super) type CellKey = (usize, usize, usize);

#[derive(Copy, Clone, PartialEq)]
enum Slot {
    CellProperties,
    ParagraphProperties,
    RunProperties,
}

/// Formatting kept from the original cell content.
#[derive(Default)]
struct Captured {
    cell_properties: Vec<Event<'static>>,
    paragraph_properties: Vec<Event<'static>>,
    run_properties: Vec<Event<'static>>,
}

impl Captured {
    fn slot(&mut self, slot: Slot) -> &mut Vec<Event<'static>> {
        match slot {
            Slot::CellProperties => &mut self.cell_properties,
            Slot::ParagraphProperties => &mut self.paragraph_properties,
            Slot::RunProperties => &mut self.run_properties,
        }
    }
}

/// Re-streams a part, replacing the content of the edited cells of its top-level tables.
/// Everything outside those cells is written back event by event.
pub(super) fn rewrite_part(part: &str, bytes: &[u8], edits: &BTreeMap<CellKey, String>) -> Result<Vec<u8>, TableFillError> {
    let mut reader = Reader::from_reader(bytes);
    reader.config_mut().check_end_names = false;
    reader.config_mut().trim_text(false);
    let mut writer = Writer::new(Vec::with_capacity(bytes.len() + 1024));
    let mut buffer = Vec::new();
    let mut depth = 0usize;
    let mut ordinal = 0usize;
    let mut row = 0usize;
    let mut cell = 0usize;

    loop {
        buffer.clear();
        let event = reader.read_event_into(&mut buffer)?;
        let mut replacement = None;
        match &event {
            Event::Eof => break,
            Event::Start(start) => match start.local_name().as_ref() {
                b"tbl" => {
                    depth += 1;
                    if depth == 1 {
                        row = 0;
                    }
                }
                b"tr" if depth == 1 => {
                    row += 1;
                    cell = 0;
                }
                b"tc" if depth == 1 => {
                    cell += 1;
                    if let Some(text) = edits.get(&(ordinal, row.saturating_sub(1), cell - 1)) {
                        replacement = Some((prefix(start), text));
                    }
                }
                _ => (),
            },
            Event::Empty(start) if depth == 1 && start.local_name().as_ref() == b"tc" => {
                cell += 1;
                if let Some(text) = edits.get(&(ordinal, row.saturating_sub(1), cell - 1)) {
                    let prefix = prefix(start);
                    writer.write_event(Event::Start(start.borrow()))?;
                    write_paragraphs(&mut writer, &prefix, &Captured::default(), text)?;
                    writer.write_event(Event::End(BytesEnd::new(format!("{prefix}tc"))))?;
                    continue;
                }
            }
            Event::End(end) if end.local_name().as_ref() == b"tbl" => {
                if depth == 1 {
                    ordinal += 1;
                }
                depth = depth.saturating_sub(1);
            }
            _ => (),
        }
        writer.write_event(event)?;
        if let Some((prefix, text)) = replacement {
            replace_cell_content(part, &mut reader, &mut writer, &prefix, text)?;
        }
    }
    Ok(writer.into_inner())
}

/// Namespace prefix of an element including the colon, e.g. `w:`
fn prefix(start: &BytesStart) -> String {
    match start.name().prefix() {
        Some(prefix) => format!("{}:", String::from_utf8_lossy(prefix.as_ref())),
        None => String::new(),
    }
}

/// Consumes the old content of a cell up to and including its end tag, then writes
/// the kept cell properties and the new paragraphs in its place.
fn replace_cell_content(
    part: &str,
    reader: &mut Reader<&[u8]>,
    writer: &mut Writer<Vec<u8>>,
    prefix: &str,
    text: &str,
) -> Result<(), TableFillError> {
    let mut buffer = Vec::new();
    let mut path = Vec::<Vec<u8>>::new();
    let mut captured = Captured::default();
    let mut capture: Option<(Slot, usize)> = None;
    let mut paragraphs = 0usize;
    let mut runs = 0usize;

    loop {
        buffer.clear();
        let event = reader.read_event_into(&mut buffer)?;
        match event {
            Event::Eof => Err(DocumentError::InvalidPart {
                part: part.to_owned(),
                message: "unexpected end inside a table cell".to_owned(),
            })?,
            Event::Start(start) => {
                let name = start.local_name().as_ref().to_vec();
                if capture.is_none() {
                    capture = begin_capture(&path, &name, &captured, paragraphs, runs).map(|slot| (slot, path.len() + 1));
                }
                count_content(&path, &name, &mut paragraphs, &mut runs);
                if let Some((slot, _)) = capture {
                    captured.slot(slot).push(Event::Start(start.into_owned()));
                }
                path.push(name);
            }
            Event::Empty(start) => {
                let name = start.local_name().as_ref().to_vec();
                count_content(&path, &name, &mut paragraphs, &mut runs);
                match capture {
                    Some((slot, _)) => captured.slot(slot).push(Event::Empty(start.into_owned())),
                    None => if let Some(slot) = begin_capture(&path, &name, &captured, paragraphs, runs) {
                        captured.slot(slot).push(Event::Empty(start.into_owned()));
                    },
                }
            }
            Event::End(end) => {
                if path.is_empty() {
                    for event in &captured.cell_properties {
                        writer.write_event(event.borrow())?;
                    }
                    write_paragraphs(writer, prefix, &captured, text)?;
                    writer.write_event(Event::End(end))?;
                    return Ok(());
                }
                if let Some((slot, depth)) = capture {
                    captured.slot(slot).push(Event::End(end.into_owned()));
                    if path.len() == depth {
                        capture = None;
                    }
                }
                path.pop();
            }
            other => if let Some((slot, _)) = capture {
                captured.slot(slot).push(other.into_owned());
            },
        }
    }
}

/// Decides whether an element opened at `path` starts one of the kept property blocks.
fn begin_capture(path: &[Vec<u8>], name: &[u8], captured: &Captured, paragraphs: usize, runs: usize) -> Option<Slot> {
    let path: Vec<&[u8]> = path.iter().map(Vec::as_slice).collect();
    match (path.as_slice(), name) {
        ([], b"tcPr") if captured.cell_properties.is_empty() => Some(Slot::CellProperties),
        ([b"p"], b"pPr") if paragraphs == 1 && captured.paragraph_properties.is_empty() => Some(Slot::ParagraphProperties),
        ([b"p", b"r"], b"rPr") if paragraphs == 1 && runs == 1 && captured.run_properties.is_empty() => Some(Slot::RunProperties),
        _ => None,
    }
}

fn count_content(path: &[Vec<u8>], name: &[u8], paragraphs: &mut usize, runs: &mut usize) {
    if path.is_empty() && name == b"p" {
        *paragraphs += 1;
    } else if path.len() == 1 && path[0] == b"p" && name == b"r" && *paragraphs == 1 {
        *runs += 1;
    }
}

/// Writes one paragraph per line; tabs become `w:tab` elements.
fn write_paragraphs(writer: &mut Writer<Vec<u8>>, prefix: &str, captured: &Captured, text: &str) -> Result<(), TableFillError> {
    for line in text.split('\n') {
        let line = line.trim_end_matches('\r');
        writer.write_event(Event::Start(BytesStart::new(format!("{prefix}p"))))?;
        for event in &captured.paragraph_properties {
            writer.write_event(event.borrow())?;
        }
        if !line.is_empty() {
            writer.write_event(Event::Start(BytesStart::new(format!("{prefix}r"))))?;
            for event in &captured.run_properties {
                writer.write_event(event.borrow())?;
            }
            for (index, segment) in line.split('\t').enumerate() {
                if index > 0 {
                    writer.write_event(Event::Empty(BytesStart::new(format!("{prefix}tab"))))?;
                }
                if !segment.is_empty() {
                    write_text(writer, prefix, segment)?;
                }
            }
            writer.write_event(Event::End(BytesEnd::new(format!("{prefix}r"))))?;
        }
        writer.write_event(Event::End(BytesEnd::new(format!("{prefix}p"))))?;
    }
    Ok(())
}

fn write_text(writer: &mut Writer<Vec<u8>>, prefix: &str, text: &str) -> Result<(), TableFillError> {
    let mut start = BytesStart::new(format!("{prefix}t"));
    if needs_space_preserve(text) {
        start.push_attribute(("xml:space", "preserve"));
    }
    writer.write_event(Event::Start(start))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(format!("{prefix}t"))))?;
    Ok(())
}

/// Word drops leading and trailing spaces of `w:t` unless told otherwise.
fn needs_space_preserve(text: &str) -> bool {
    text.starts_with(char::is_whitespace) || text.ends_with(char::is_whitespace)
}
