//! ZIP archive helper utilities for Office Open XML packages (.docx)
//! Provides part lookup on read and package re-assembly on write

use crate::error::TableFillError;
use glob::Pattern;
use std::io::Cursor;
use std::io::Read;
use std::io::Seek;
use std::io::Write;
use zip::read::ZipFile;
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::CompressionMethod;
use zip::ZipArchive;
use zip::ZipWriter;

/// Helper trait for ZIP archive operations on package parts
pub(crate) trait ZipHelper<RS: Read + Seek> {
    /// Gets a file from the ZIP archive by name (case-insensitive, path separator agnostic)
    fn file(&'_ mut self, name: &str) -> Result<Option<ZipFile<'_, RS>>, TableFillError>;

    /// Reads a whole part into memory
    fn read_part(&mut self, name: &str) -> Result<Option<Vec<u8>>, TableFillError>;

    /// Lists part names matching a glob pattern, sorted by name
    fn part_names(&self, pattern: &Pattern) -> Vec<String>;

    /// Reads every entry of the archive in its stored order
    fn read_entries(&mut self) -> Result<Vec<(String, Vec<u8>)>, TableFillError>;
}

impl<RS: Read + Seek> ZipHelper<RS> for ZipArchive<RS> {
    fn file(&'_ mut self, name: &str) -> Result<Option<ZipFile<'_, RS>>, TableFillError> {
        let pattern = name.replace('\\', "/");
        let path = self.file_names()
            .find(|file_name| pattern.eq_ignore_ascii_case(*file_name))
            .map(|file_name| file_name.to_owned());
        match path.map(|file_name| self.by_name(&file_name)).transpose() {
            Ok(Some(file)) => Ok(Some(file)),
            Ok(None) | Err(ZipError::FileNotFound) => Ok(None),
            Err(error) => Err(error)?,
        }
    }

    fn read_part(&mut self, name: &str) -> Result<Option<Vec<u8>>, TableFillError> {
        match self.file(name)? {
            Some(mut file) => {
                let mut bytes = Vec::with_capacity(file.size() as usize);
                file.read_to_end(&mut bytes)?;
                Ok(Some(bytes))
            }
            None => Ok(None),
        }
    }

    fn part_names(&self, pattern: &Pattern) -> Vec<String> {
        let mut names: Vec<String> = self.file_names()
            .filter(|file_name| pattern.matches(*file_name))
            .map(|file_name| file_name.to_owned())
            .collect();
        names.sort();
        names
    }

    fn read_entries(&mut self) -> Result<Vec<(String, Vec<u8>)>, TableFillError> {
        let mut entries = Vec::with_capacity(self.len());
        for index in 0..self.len() {
            let mut file = self.by_index(index)?;
            if file.is_dir() {
                continue;
            }
            let mut bytes = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut bytes)?;
            entries.push((file.name().to_owned(), bytes));
        }
        Ok(entries)
    }
}

/// Writes a package from `(name, bytes)` entries, keeping the given order.
pub(crate) fn write_package<'a, I>(entries: I) -> Result<Vec<u8>, TableFillError>
where
    I: IntoIterator<Item = (&'a str, &'a [u8])>,
{
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    for (name, bytes) in entries {
        writer.start_file(name, options)?;
        writer.write_all(bytes)?;
    }
    Ok(writer.finish()?.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn package_round_trip() -> Result<(), TableFillError> {
        let bytes = write_package([
            ("[Content_Types].xml", b"<Types/>".as_slice()),
            ("word/document.xml", b"<w:document/>".as_slice()),
            ("word/header2.xml", b"<w:hdr/>".as_slice()),
            ("word/header1.xml", b"<w:hdr/>".as_slice()),
        ])?;
        let mut zip = ZipArchive::new(Cursor::new(bytes))?;

        assert_eq!(zip.read_part("WORD\\Document.xml")?, Some(b"<w:document/>".to_vec()));
        assert_eq!(zip.read_part("word/missing.xml")?, None);
        assert_eq!(
            zip.part_names(&Pattern::new("word/header*.xml")?),
            vec!["word/header1.xml".to_owned(), "word/header2.xml".to_owned()]
        );
        let entries = zip.read_entries()?;
        assert_eq!(entries.len(), 4);
        assert_eq!(entries[0].0, "[Content_Types].xml");
        Ok(())
    }
}
