use std::io::{Read, Write};
use std::str::FromStr;

use byteorder::{LittleEndian, WriteBytesExt};

use super::BAM_MAGIC;
use crate::bgzf;
use crate::{error::HeaderError, Result};

/// Record code whose lines hold free text instead of `TAG:VALUE` fields
const COMMENT_CODE: &str = "@CO";
const SEQUENCE_CODE: &str = "@SQ";
const READ_GROUP_CODE: &str = "@RG";

/// A named reference sequence; its id is its position in the reference list
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Reference {
    name: String,
    len: u32,
}
impl Reference {
    #[must_use]
    pub fn new(name: impl Into<String>, len: u32) -> Self {
        Self {
            name: name.into(),
            len,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn len(&self) -> u32 {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl AsRef<str> for Reference {
    fn as_ref(&self) -> &str {
        &self.name
    }
}

/// One line of the text header, without its record code
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HeaderRecord {
    /// Free text of a comment line
    Comment(String),
    /// Ordered `TAG:VALUE` attributes
    Fields(Vec<(String, String)>),
}
impl HeaderRecord {
    /// Looks up an attribute value by tag
    #[must_use]
    pub fn get(&self, tag: &str) -> Option<&str> {
        match self {
            Self::Comment(_) => None,
            Self::Fields(fields) => fields
                .iter()
                .find(|(t, _)| t == tag)
                .map(|(_, v)| v.as_str()),
        }
    }

    fn insert(fields: &mut Vec<(String, String)>, tag: &str, value: &str) {
        match fields.iter_mut().find(|(t, _)| t == tag) {
            Some((_, v)) => *v = value.to_string(),
            None => fields.push((tag.to_string(), value.to_string())),
        }
    }
}

/// The text header as an ordered mapping of record code to its lines.
///
/// Codes keep the order of their first appearance and lines keep file order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SamHeader {
    records: Vec<(String, Vec<HeaderRecord>)>,
}

impl SamHeader {
    #[must_use]
    pub fn records(&self) -> &[(String, Vec<HeaderRecord>)] {
        &self.records
    }

    /// Lines recorded under a code such as `@SQ`
    #[must_use]
    pub fn get(&self, code: &str) -> Option<&[HeaderRecord]> {
        self.records
            .iter()
            .find(|(c, _)| c == code)
            .map(|(_, lines)| lines.as_slice())
    }

    fn entry(&mut self, code: &str) -> &mut Vec<HeaderRecord> {
        let idx = match self.records.iter().position(|(c, _)| c == code) {
            Some(idx) => idx,
            None => {
                self.records.push((code.to_string(), Vec::new()));
                self.records.len() - 1
            }
        };
        &mut self.records[idx].1
    }

    /// The `ID` of every `@RG` line
    #[must_use]
    pub fn read_groups(&self) -> Vec<&str> {
        self.get(READ_GROUP_CODE)
            .unwrap_or_default()
            .iter()
            .filter_map(|line| line.get("ID"))
            .collect()
    }

    /// Serializes the header, adding `@SQ` lines for references it does not mention.
    ///
    /// Lines are joined by `\n` without a trailing newline.
    #[must_use]
    pub fn to_text(&self, references: &[Reference]) -> String {
        let mut header = self.clone();
        if header.get(SEQUENCE_CODE).is_none() {
            header.records.insert(0, (SEQUENCE_CODE.to_string(), Vec::new()));
        }
        let sequences = header.entry(SEQUENCE_CODE);
        for reference in references {
            let listed = sequences.iter().any(|line| line.get("SN") == Some(reference.name()));
            if !listed {
                sequences.push(HeaderRecord::Fields(vec![
                    ("SN".to_string(), reference.name().to_string()),
                    ("LN".to_string(), reference.len().to_string()),
                ]));
            }
        }

        let mut lines = Vec::new();
        for (code, records) in &header.records {
            for record in records {
                let mut line = code.clone();
                match record {
                    HeaderRecord::Comment(text) => {
                        line.push('\t');
                        line.push_str(text);
                    }
                    HeaderRecord::Fields(fields) => {
                        for (tag, value) in fields {
                            line.push('\t');
                            line.push_str(tag);
                            line.push(':');
                            line.push_str(value);
                        }
                    }
                }
                lines.push(line);
            }
        }
        lines.join("\n")
    }
}

impl FromStr for SamHeader {
    type Err = crate::Error;

    /// Parses header text; fields without a `:` are skipped
    fn from_str(text: &str) -> Result<Self> {
        let mut header = Self::default();
        for line in text.split('\n') {
            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                continue;
            }
            if !line.starts_with('@') {
                return Err(HeaderError::MalformedRecord(line.to_string()).into());
            }
            let (code, rest) = line.split_once('\t').unwrap_or((line, ""));
            let record = if code == COMMENT_CODE {
                HeaderRecord::Comment(rest.to_string())
            } else {
                let mut fields = Vec::new();
                for field in rest.split('\t') {
                    if let Some((tag, value)) = field.split_once(':') {
                        HeaderRecord::insert(&mut fields, tag, value);
                    }
                }
                HeaderRecord::Fields(fields)
            };
            header.entry(code).push(record);
        }
        Ok(header)
    }
}

/// The binary container header: raw header text and the reference list
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Header {
    text: String,
    references: Vec<Reference>,
}

impl Header {
    #[must_use]
    pub fn new(text: impl Into<String>, references: Vec<Reference>) -> Self {
        Self {
            text: text.into(),
            references,
        }
    }

    /// Raw header text with trailing NUL padding removed
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn references(&self) -> &[Reference] {
        &self.references
    }

    /// Parses the header text into its ordered record model
    pub fn sam_header(&self) -> Result<SamHeader> {
        self.text.parse()
    }

    /// Header text re-serialized with `@SQ` lines for every reference
    pub fn to_text(&self) -> Result<String> {
        Ok(self.sam_header()?.to_text(&self.references))
    }

    /// Reads the magic, text and reference list from the start of a stream
    pub fn read_from<R: Read>(reader: &mut bgzf::Reader<R>) -> Result<Self> {
        let mut magic = [0u8; 4];
        reader.read_exact_checked(&mut magic)?;
        if magic != BAM_MAGIC {
            return Err(HeaderError::InvalidMagic(magic).into());
        }

        let l_text = read_length(reader, "header text length")?;
        let text = reader.read_vec(l_text)?;
        let text = trim_nul(&text)?.to_string();

        let n_ref = read_length(reader, "reference count")?;
        let mut references = Vec::new();
        for _ in 0..n_ref {
            let l_name = read_length(reader, "reference name length")?;
            let name = reader.read_vec(l_name)?;
            let name = trim_nul(&name)?.to_string();
            let len = read_length(reader, "reference length")?;
            references.push(Reference::new(name, len as u32));
        }

        Ok(Self { text, references })
    }

    /// Writes the magic, text and reference list
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&BAM_MAGIC)?;
        writer.write_i32::<LittleEndian>(self.text.len() as i32)?;
        writer.write_all(self.text.as_bytes())?;
        writer.write_i32::<LittleEndian>(self.references.len() as i32)?;
        for reference in &self.references {
            writer.write_i32::<LittleEndian>(reference.name.len() as i32 + 1)?;
            writer.write_all(reference.name.as_bytes())?;
            writer.write_u8(0)?;
            writer.write_i32::<LittleEndian>(reference.len as i32)?;
        }
        Ok(())
    }
}

/// Reads a little-endian `i32` that must not be negative
fn read_length<R: Read>(reader: &mut bgzf::Reader<R>, field: &'static str) -> Result<usize> {
    let mut buf = [0u8; 4];
    reader.read_exact_checked(&mut buf)?;
    let value = i32::from_le_bytes(buf);
    usize::try_from(value).map_err(|_| HeaderError::InvalidLength { field, value }.into())
}

fn trim_nul(bytes: &[u8]) -> Result<&str> {
    let end = bytes.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    Ok(std::str::from_utf8(&bytes[..end])?)
}
