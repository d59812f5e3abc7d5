use crate::document::docx::DocxCell;
use crate::document::docx::DocxRow;
use crate::document::docx::DocxTable;
use crate::document::docx::VerticalMerge;
use crate::error::TableFillError;
use crate::helpers::xml::XmlNodeHelper;
use crate::helpers::xml::XmlReader;
use crate::helpers::xml::XmlTextContextHelper;
use crate::match_xml_events;
use crate::table::TableLocation;
use quick_xml::events::BytesStart;
use quick_xml::events::Event;

// WordprocessingML local names, matched without the `w:` prefix
const TAG_TABLE: &[u8] = b"tbl";              // Table
const TAG_GRID_COLUMN: &[u8] = b"gridCol";    // Column of the table grid
const TAG_ROW: &[u8] = b"tr";                 // Table row
const TAG_HEADER_ROW: &[u8] = b"tblHeader";   // Row repeats as header on each page
const TAG_GRID_BEFORE: &[u8] = b"gridBefore"; // Grid columns skipped before the first cell
const TAG_CELL: &[u8] = b"tc";                // Table cell
const TAG_GRID_SPAN: &[u8] = b"gridSpan";     // Horizontal merge
const TAG_VERTICAL_MERGE: &[u8] = b"vMerge";  // Vertical merge
const TAG_PARAGRAPH: &[u8] = b"p";            // Paragraph
const TAG_PARAGRAPH_PROPERTIES: &[u8] = b"pPr";
const TAG_RUN: &[u8] = b"r";                  // Run of text sharing formatting
const TAG_RUN_PROPERTIES: &[u8] = b"rPr";
const TAG_BOLD: &[u8] = b"b";
const TAG_TEXT: &[u8] = b"t";
const TAG_TAB: &[u8] = b"tab";
const TAG_BREAK: &[u8] = b"br";
const TAG_CARRIAGE_RETURN: &[u8] = b"cr";

#[derive(Default)]
struct CellBuilder {
    paragraphs: Vec<String>,
    grid_span: usize,
    vertical_merge: Option<VerticalMerge>,
    nested_table: bool,
    text_runs: usize,
    bold_runs: usize,
}

impl CellBuilder {
    fn push_text(&mut self, text: &str) {
        match self.paragraphs.last_mut() {
            Some(paragraph) => paragraph.push_str(text),
            None => self.paragraphs.push(text.to_owned()),
        }
    }

    fn finish(self) -> DocxCell {
        DocxCell {
            text: self.paragraphs.join("\n"),
            bold: self.text_runs > 0 && self.bold_runs == self.text_runs,
            grid_span: self.grid_span.max(1),
            vertical_merge: self.vertical_merge,
            nested_table: self.nested_table,
        }
    }
}

#[derive(Default)]
struct RowBuilder {
    cells: Vec<CellBuilder>,
    is_header: bool,
    grid_before: usize,
}

#[derive(Default)]
struct TableBuilder {
    grid_columns: usize,
    rows: Vec<RowBuilder>,
}

impl TableBuilder {
    fn row(&mut self) -> Option<&mut RowBuilder> {
        self.rows.last_mut()
    }

    fn cell(&mut self) -> Option<&mut CellBuilder> {
        self.rows.last_mut()?.cells.last_mut()
    }
}

#[derive(Default)]
struct RunState {
    bold: bool,
    text: String,
}

/// Flags on/off properties such as `<w:b/>` and `<w:b w:val="0"/>`.
fn is_on(event: &BytesStart) -> Result<bool, TableFillError> {
    Ok(match event.local_attribute("val")? {
        Some(value) => !matches!(value.as_ref(), "0" | "false" | "off"),
        None => true,
    })
}

/// Reads the top-level tables of one part, in document order.
/// Tables nested inside a cell are not listed; they only mark their cell.
pub(super) fn read_tables(part: &str, bytes: &[u8], location: TableLocation) -> Result<Vec<DocxTable>, TableFillError> {
    let mut reader = XmlReader::new(bytes);
    let mut tables = Vec::<DocxTable>::new();
    let mut stack = Vec::<TableBuilder>::new();
    let mut run = RunState::default();
    let mut in_paragraph_properties = false;
    let mut in_run_properties = false;
    let mut in_text = false;

    match_xml_events!(reader => {
        Event::Start(event) => match event.local_name().as_ref() {
            TAG_TABLE => stack.push(TableBuilder::default()),
            TAG_GRID_COLUMN => if let Some(table) = stack.last_mut() {
                table.grid_columns += 1;
            },
            TAG_ROW => if let Some(table) = stack.last_mut() {
                table.rows.push(RowBuilder::default());
            },
            TAG_HEADER_ROW => if let Some(row) = stack.last_mut().and_then(TableBuilder::row) {
                row.is_header = is_on(&event)?;
            },
            TAG_GRID_BEFORE => if let Some(row) = stack.last_mut().and_then(TableBuilder::row) {
                row.grid_before = event.parse_local_attribute("val")?.unwrap_or(0);
            },
            TAG_CELL => if let Some(row) = stack.last_mut().and_then(TableBuilder::row) {
                row.cells.push(CellBuilder::default());
            },
            TAG_GRID_SPAN => if let Some(cell) = stack.last_mut().and_then(TableBuilder::cell) {
                cell.grid_span = event.parse_local_attribute("val")?.unwrap_or(1);
            },
            TAG_VERTICAL_MERGE => if let Some(cell) = stack.last_mut().and_then(TableBuilder::cell) {
                cell.vertical_merge = Some(match event.local_attribute("val")?.as_deref() {
                    Some("restart") => VerticalMerge::Restart,
                    _ => VerticalMerge::Continue,
                });
            },
            TAG_PARAGRAPH => if let Some(cell) = stack.last_mut().and_then(TableBuilder::cell) {
                cell.paragraphs.push(String::new());
            },
            TAG_PARAGRAPH_PROPERTIES => in_paragraph_properties = true,
            TAG_RUN => run = RunState::default(),
            TAG_RUN_PROPERTIES if !in_paragraph_properties => in_run_properties = true,
            TAG_BOLD if in_run_properties => run.bold = is_on(&event)?,
            TAG_TEXT => in_text = true,
            TAG_TAB if !in_paragraph_properties => {
                run.text.push('\t');
                if let Some(cell) = stack.last_mut().and_then(TableBuilder::cell) {
                    cell.push_text("\t");
                }
            }
            TAG_BREAK | TAG_CARRIAGE_RETURN => {
                if let Some(cell) = stack.last_mut().and_then(TableBuilder::cell) {
                    cell.push_text("\n");
                }
            }
            _ => (),
        },
        Event::End(event) => match event.local_name().as_ref() {
            TAG_TABLE => if let Some(builder) = stack.pop() {
                match stack.last_mut() {
                    Some(parent) => if let Some(cell) = parent.cell() {
                        cell.nested_table = true;
                    },
                    None => tables.push(DocxTable::new(part, tables.len(), location, builder.grid_columns, finish_rows(builder.rows))),
                }
            },
            TAG_PARAGRAPH_PROPERTIES => in_paragraph_properties = false,
            TAG_RUN_PROPERTIES => in_run_properties = false,
            TAG_TEXT => in_text = false,
            TAG_RUN => {
                if !run.text.trim().is_empty() {
                    if let Some(cell) = stack.last_mut().and_then(TableBuilder::cell) {
                        cell.text_runs += 1;
                        if run.bold {
                            cell.bold_runs += 1;
                        }
                    }
                }
                run = RunState::default();
            }
            _ => (),
        },
        Event::Text(event) if in_text => {
            let mut text = String::new();
            text.push_bytes_text(&event)?;
            run.text.push_str(&text);
            if let Some(cell) = stack.last_mut().and_then(TableBuilder::cell) {
                cell.push_text(&text);
            }
        }
        Event::GeneralRef(event) if in_text => {
            let mut text = String::new();
            text.push_bytes_ref(&event)?;
            run.text.push_str(&text);
            if let Some(cell) = stack.last_mut().and_then(TableBuilder::cell) {
                cell.push_text(&text);
            }
        }
    });
    Ok(tables)
}

fn finish_rows(rows: Vec<RowBuilder>) -> Vec<DocxRow> {
    rows.into_iter()
        .map(|row| DocxRow {
            cells: row.cells.into_iter().map(CellBuilder::finish).collect(),
            is_header: row.is_header,
            grid_before: row.grid_before,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = r#"<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>
<w:p><w:r><w:t>Before</w:t></w:r></w:p>
<w:tbl>
  <w:tblGrid><w:gridCol/><w:gridCol/><w:gridCol/></w:tblGrid>
  <w:tr><w:trPr><w:tblHeader/></w:trPr>
    <w:tc><w:p><w:r><w:t>Name</w:t></w:r></w:p></w:tc>
    <w:tc><w:tcPr><w:gridSpan w:val="2"/></w:tcPr><w:p><w:r><w:rPr><w:b/></w:rPr><w:t>Details</w:t></w:r></w:p></w:tc>
  </w:tr>
  <w:tr>
    <w:tc><w:tcPr><w:vMerge w:val="restart"/></w:tcPr><w:p><w:r><w:rPr><w:b/></w:rPr><w:t>Ann</w:t></w:r><w:r><w:t xml:space="preserve"> </w:t></w:r></w:p></w:tc>
    <w:tc><w:p><w:r><w:t>R&amp;D</w:t><w:tab/><w:t>Lab</w:t></w:r></w:p><w:p><w:r><w:t>2nd</w:t></w:r></w:p></w:tc>
    <w:tc><w:tbl><w:tr><w:tc><w:p><w:r><w:t>inner</w:t></w:r></w:p></w:tc></w:tr></w:tbl><w:p/></w:tc>
  </w:tr>
  <w:tr>
    <w:tc><w:tcPr><w:vMerge/></w:tcPr><w:p/></w:tc>
    <w:tc><w:p><w:r><w:rPr><w:b w:val="0"/></w:rPr><w:t>plain</w:t></w:r></w:p></w:tc>
  </w:tr>
</w:tbl>
</w:body></w:document>"#;

    #[test]
    fn reads_top_level_tables_only() -> Result<(), TableFillError> {
        let tables = read_tables("word/document.xml", BODY.as_bytes(), TableLocation::Body)?;
        assert_eq!(tables.len(), 1);

        let table = &tables[0];
        assert_eq!(table.rows.len(), 3);
        assert_eq!(table.columns, 3);
        assert!(table.rows[0].is_header);
        assert_eq!(table.rows[0].cells[1].grid_span, 2);
        assert_eq!(table.rows[1].cells[0].vertical_merge, Some(VerticalMerge::Restart));
        assert_eq!(table.rows[2].cells[0].vertical_merge, Some(VerticalMerge::Continue));
        assert!(table.rows[1].cells[2].nested_table);
        Ok(())
    }

    #[test]
    fn cell_text_and_bold_runs() -> Result<(), TableFillError> {
        let tables = read_tables("word/document.xml", BODY.as_bytes(), TableLocation::Body)?;
        let rows = &tables[0].rows;

        assert_eq!(rows[1].cells[1].text, "R&D\tLab\n2nd");
        assert_eq!(rows[1].cells[2].text, "");
        // whitespace-only runs do not count against bold
        assert!(rows[1].cells[0].bold);
        assert!(rows[0].cells[1].bold);
        assert!(!rows[0].cells[0].bold);
        assert!(!rows[2].cells[1].bold);
        Ok(())
    }
}
