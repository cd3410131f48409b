use std::borrow::Cow;
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use log::debug;

use super::error::{Error, FormatError, Result};
use super::model::OrderedMap;

const TYPE_KEY: &str = "type";
const PATH_KEY: &str = "path";
const TITLE_KEY: &str = "title";
/// Legacy header key whose value is the comma-separated column-name row.
const DATA_KEY: &str = "data";
/// Columns to keep as text even though every cell looks like a number.
const TEXT_COLUMNS_KEY: &str = "text_columns";
const RESERVED_KEYS: [&str; 5] = [TYPE_KEY, PATH_KEY, TITLE_KEY, DATA_KEY, TEXT_COLUMNS_KEY];

pub const STIM_ID: &str = "stimID";

// ---------------------------------------------------------------------------
// StimulusType
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StimulusType {
    Image,
    Video,
}

impl StimulusType {
    pub fn as_str(self) -> &'static str {
        match self {
            StimulusType::Image => "image",
            StimulusType::Video => "video",
        }
    }
}

impl fmt::Display for StimulusType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StimulusType {
    type Err = FormatError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "image" => Ok(StimulusType::Image),
            "video" => Ok(StimulusType::Video),
            other => Err(FormatError::UnknownStimulusType(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Column – one typed column of the stimulus table
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Int(Vec<i64>),
    Float(Vec<f64>),
    Text(Vec<String>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Int(v) => v.len(),
            Column::Float(v) => v.len(),
            Column::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_int(&self) -> Option<&[i64]> {
        match self {
            Column::Int(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<&[f64]> {
        match self {
            Column::Float(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&[String]> {
        match self {
            Column::Text(v) => Some(v),
            _ => None,
        }
    }

    /// Render the cell at `row` as it appears on disk.
    ///
    /// Floats use `Debug` formatting, which is the shortest string that
    /// parses back to the same value and always keeps a fractional part or
    /// exponent, so an integral float is not re-read as an integer.
    pub fn cell(&self, row: usize) -> Option<String> {
        match self {
            Column::Int(v) => v.get(row).map(|x| x.to_string()),
            Column::Float(v) => v.get(row).map(|x| format!("{x:?}")),
            Column::Text(v) => v.get(row).cloned(),
        }
    }

    /// Whether reading this column back would pick a different type.
    /// Only text made of numeric-looking cells (or no cells at all) does.
    fn reads_back_as_number(&self) -> bool {
        match self {
            Column::Text(v) => v.iter().all(|c| c.parse::<f64>().is_ok()),
            _ => false,
        }
    }

    /// Pick the narrowest type every cell parses as: integer, then float, then text.
    fn infer(cells: Vec<String>) -> Column {
        if let Some(ints) = cells
            .iter()
            .map(|c| c.parse::<i64>().ok())
            .collect::<Option<Vec<_>>>()
        {
            return Column::Int(ints);
        }
        if let Some(floats) = cells
            .iter()
            .map(|c| c.parse::<f64>().ok())
            .collect::<Option<Vec<_>>>()
        {
            return Column::Float(floats);
        }
        Column::Text(cells)
    }
}

impl From<Vec<i64>> for Column {
    fn from(v: Vec<i64>) -> Self {
        Column::Int(v)
    }
}

impl From<Vec<f64>> for Column {
    fn from(v: Vec<f64>) -> Self {
        Column::Float(v)
    }
}

impl From<Vec<String>> for Column {
    fn from(v: Vec<String>) -> Self {
        Column::Text(v)
    }
}

impl From<Vec<&str>> for Column {
    fn from(v: Vec<&str>) -> Self {
        Column::Text(v.into_iter().map(str::to_string).collect())
    }
}

// ---------------------------------------------------------------------------
// StimulusTable – equal-length columns in insertion order
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Default)]
pub struct StimulusTable {
    columns: OrderedMap<Column>,
}

impl StimulusTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a column. Its length must match the other columns.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        column: impl Into<Column>,
    ) -> std::result::Result<(), FormatError> {
        let name = name.into();
        let column = column.into();
        if name.contains('=') {
            return Err(FormatError::ColumnName(name));
        }
        let expected = self
            .columns
            .iter()
            .find(|(n, _)| *n != name)
            .map(|(_, c)| c.len());
        if let Some(expected) = expected {
            if column.len() != expected {
                return Err(FormatError::ColumnLength {
                    name,
                    expected,
                    found: column.len(),
                });
            }
        }
        self.columns.insert(name, column);
        Ok(())
    }

    /// Builder form of [`StimulusTable::insert`].
    pub fn with_column(
        mut self,
        name: impl Into<String>,
        column: impl Into<Column>,
    ) -> std::result::Result<Self, FormatError> {
        self.insert(name, column)?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&Column> {
        self.columns.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.names()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Column)> {
        self.columns.iter()
    }

    pub fn n_rows(&self) -> usize {
        self.columns.values().next().map_or(0, Column::len)
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Stimulus – the whole record
// ---------------------------------------------------------------------------

/// A stimulus set: header fields plus one row per stimulus.
#[derive(Debug, Clone, PartialEq)]
pub struct Stimulus {
    pub stim_type: StimulusType,
    /// Directory (or file) the stimuli live in.
    pub path: Option<String>,
    pub title: Option<String>,
    /// Extra `key=value` header pairs, kept in file order.
    pub meta: OrderedMap<String>,
    pub data: StimulusTable,
}

impl Stimulus {
    pub fn new(stim_type: StimulusType, data: StimulusTable) -> Self {
        Self {
            stim_type,
            path: None,
            title: None,
            meta: OrderedMap::new(),
            data,
        }
    }

    /// The `stimID` column rendered as strings, if the table has one.
    pub fn stim_ids(&self) -> Option<Vec<String>> {
        let col = self.data.get(STIM_ID)?;
        (0..col.len()).map(|i| col.cell(i)).collect()
    }
}

// ---------------------------------------------------------------------------
// StimulusFile – the `.stim.csv` codec
// ---------------------------------------------------------------------------

/// Reader/writer for `.stim.csv` files.
///
/// ```text
/// type=image
/// path=/data/images
/// title=ImageNet subset
/// stimID,onset,RT
/// n01930112_19568.JPEG,0,3.6309
/// ```
#[derive(Debug, Clone)]
pub struct StimulusFile {
    path: PathBuf,
}

impl StimulusFile {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read(&self) -> Result<Stimulus> {
        let text = std::fs::read_to_string(&self.path).map_err(|e| Error::io(&self.path, e))?;
        let fmt_err = |e| Error::format(&self.path, e);

        // Header: leading `key=value` lines, blank lines ignored.
        let mut header: OrderedMap<String> = OrderedMap::new();
        let mut legacy_columns: Option<&str> = None;
        let mut offset = 0;
        for line in text.split_inclusive('\n') {
            let content = line.trim_end_matches(['\n', '\r']);
            if !content.trim().is_empty() {
                match parse_header_pair(content) {
                    Some((DATA_KEY, columns)) => {
                        legacy_columns = Some(columns);
                        offset += line.len();
                        break;
                    }
                    Some((key, value)) => {
                        header.insert(key, value.to_string());
                    }
                    None => break,
                }
            }
            offset += line.len();
        }

        let stim_type: StimulusType = header
            .get(TYPE_KEY)
            .ok_or(FormatError::MissingField(TYPE_KEY))
            .and_then(|t| t.trim().parse::<StimulusType>())
            .map_err(fmt_err)?;
        let text_columns = match header.get(TEXT_COLUMNS_KEY) {
            Some(value) => decode_names(value).map_err(|e| Error::csv(&self.path, e))?,
            None => Vec::new(),
        };

        let body = &text[offset..];
        let table_text = match legacy_columns {
            Some(columns) => Cow::Owned(format!("{columns}\n{body}")),
            None => Cow::Borrowed(body),
        };
        let data = self.parse_table(&table_text, stim_type, &text_columns)?;

        let mut stim = Stimulus::new(stim_type, data);
        for (key, value) in header {
            match key.as_str() {
                TYPE_KEY | TEXT_COLUMNS_KEY => {}
                PATH_KEY => stim.path = Some(value),
                TITLE_KEY => stim.title = Some(value),
                _ => {
                    stim.meta.insert(key, value);
                }
            }
        }

        debug!(
            "read {} stimuli ({} columns) from {}",
            stim.data.n_rows(),
            stim.data.n_cols(),
            self.path.display()
        );
        Ok(stim)
    }

    fn parse_table(
        &self,
        text: &str,
        stim_type: StimulusType,
        text_columns: &[String],
    ) -> Result<StimulusTable> {
        let fmt_err = |e| Error::format(&self.path, e);
        let csv_err = |e| Error::csv(&self.path, e);

        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::Headers)
            .from_reader(text.as_bytes());

        let names: Vec<String> = reader
            .headers()
            .map_err(csv_err)?
            .iter()
            .map(str::to_string)
            .collect();
        if names.is_empty() {
            return Err(fmt_err(FormatError::MissingTable));
        }
        for (i, name) in names.iter().enumerate() {
            if names[..i].contains(name) {
                return Err(fmt_err(FormatError::DuplicateColumn(name.clone())));
            }
        }

        let mut cells: Vec<Vec<String>> = vec![Vec::new(); names.len()];
        for (row, record) in reader.records().enumerate() {
            let record = record.map_err(csv_err)?;
            if record.len() != names.len() {
                return Err(fmt_err(FormatError::RowLength {
                    row: row + 1,
                    expected: names.len(),
                    found: record.len(),
                }));
            }
            for (column, value) in cells.iter_mut().zip(record.iter()) {
                column.push(value.to_string());
            }
        }

        let mut table = StimulusTable::new();
        for (name, column) in names.into_iter().zip(cells) {
            // Image stimuli are identified by file name, even numeric-looking ones.
            let is_text = (stim_type == StimulusType::Image && name == STIM_ID)
                || text_columns.contains(&name);
            let column = if is_text {
                Column::Text(column)
            } else {
                Column::infer(column)
            };
            table.insert(name, column).map_err(fmt_err)?;
        }
        Ok(table)
    }

    /// Write a stimulus file from its parts. `title` is left out when `None`.
    pub fn write(
        &self,
        stim_type: StimulusType,
        data_path: Option<&str>,
        data: &StimulusTable,
        title: Option<&str>,
    ) -> Result<()> {
        self.write_parts(stim_type, data_path, title, &OrderedMap::new(), data)
    }

    pub fn write_stimulus(&self, stim: &Stimulus) -> Result<()> {
        self.write_parts(
            stim.stim_type,
            stim.path.as_deref(),
            stim.title.as_deref(),
            &stim.meta,
            &stim.data,
        )
    }

    fn write_parts(
        &self,
        stim_type: StimulusType,
        data_path: Option<&str>,
        title: Option<&str>,
        meta: &OrderedMap<String>,
        data: &StimulusTable,
    ) -> Result<()> {
        let fmt_err = |e| Error::format(&self.path, e);
        let io_err = |e| Error::io(&self.path, e);

        if data.is_empty() {
            return Err(fmt_err(FormatError::MissingTable));
        }
        let text_columns: Vec<&str> = data
            .iter()
            .filter(|(name, column)| {
                !(stim_type == StimulusType::Image && *name == STIM_ID)
                    && column.reads_back_as_number()
            })
            .map(|(name, _)| name)
            .collect();
        let text_hint = if text_columns.is_empty() {
            None
        } else {
            Some(encode_names(&text_columns).map_err(|e| Error::csv(&self.path, e))?)
        };

        let mut header: Vec<(&str, &str)> = vec![(TYPE_KEY, stim_type.as_str())];
        header.extend(data_path.map(|p| (PATH_KEY, p)));
        header.extend(title.map(|t| (TITLE_KEY, t)));
        for (key, value) in meta.iter() {
            if !is_header_key(key) || RESERVED_KEYS.contains(&key) {
                return Err(fmt_err(FormatError::HeaderKey(key.to_string())));
            }
            header.push((key, value.as_str()));
        }
        header.extend(text_hint.as_deref().map(|h| (TEXT_COLUMNS_KEY, h)));
        if let Some((key, _)) = header.iter().find(|(_, v)| v.contains(['\n', '\r'])) {
            return Err(fmt_err(FormatError::HeaderValue(key.to_string())));
        }

        let file = File::create(&self.path).map_err(io_err)?;
        let mut out = BufWriter::new(file);
        for (key, value) in &header {
            writeln!(out, "{key}={value}").map_err(io_err)?;
        }

        let mut writer = csv::Writer::from_writer(&mut out);
        writer
            .write_record(data.names())
            .map_err(|e| Error::csv(&self.path, e))?;
        for row in 0..data.n_rows() {
            let record: Vec<String> = data
                .iter()
                .map(|(_, column)| column.cell(row).unwrap_or_default())
                .collect();
            writer
                .write_record(&record)
                .map_err(|e| Error::csv(&self.path, e))?;
        }
        writer.flush().map_err(io_err)?;
        drop(writer);
        out.flush().map_err(io_err)?;

        debug!(
            "wrote {} stimuli ({} columns) to {}",
            data.n_rows(),
            data.n_cols(),
            self.path.display()
        );
        Ok(())
    }
}

fn is_header_key(key: &str) -> bool {
    !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Split a `key=value` header line. Lines whose left side is not a plain
/// identifier (such as a column-name row) are not header lines. The key is
/// trimmed; the value is kept verbatim.
fn parse_header_pair(line: &str) -> Option<(&str, &str)> {
    let (key, value) = line.split_once('=')?;
    let key = key.trim();
    is_header_key(key).then_some((key, value))
}

/// Render column names as one CSV record, quoting names that need it.
fn encode_names(names: &[&str]) -> std::result::Result<String, csv::Error> {
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    writer.write_record(names)?;
    let bytes = writer
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))?;
    Ok(String::from_utf8_lossy(&bytes)
        .trim_end_matches('\n')
        .to_string())
}

fn decode_names(value: &str) -> std::result::Result<Vec<String>, csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_reader(value.as_bytes());
    match reader.records().next() {
        Some(record) => Ok(record?.iter().map(str::to_string).collect()),
        None => Ok(Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_pairs() {
        assert_eq!(parse_header_pair("type=image"), Some(("type", "image")));
        assert_eq!(
            parse_header_pair("title = a=b "),
            Some(("title", " a=b "))
        );
        assert_eq!(parse_header_pair("stimID,RT"), None);
        assert_eq!(parse_header_pair("a,b=c"), None);
    }

    #[test]
    fn column_inference() {
        let cells = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        assert_eq!(Column::infer(cells(&["1", "3"])), Column::Int(vec![1, 3]));
        assert_eq!(
            Column::infer(cells(&["1", "2.5"])),
            Column::Float(vec![1.0, 2.5])
        );
        assert_eq!(
            Column::infer(cells(&["1", "cat"])),
            Column::Text(cells(&["1", "cat"]))
        );
    }

    #[test]
    fn numeric_looking_text_is_flagged() {
        assert!(Column::from(vec!["001", "2.5"]).reads_back_as_number());
        assert!(Column::Text(Vec::new()).reads_back_as_number());
        assert!(!Column::from(vec!["001", "cat"]).reads_back_as_number());
        assert!(!Column::Int(vec![1]).reads_back_as_number());
    }

    #[test]
    fn name_lists_quote_commas() {
        let encoded = encode_names(&["stimID", "a,b"]).unwrap();
        assert_eq!(encoded, "stimID,\"a,b\"");
        assert_eq!(decode_names(&encoded).unwrap(), ["stimID", "a,b"]);
    }

    #[test]
    fn integral_floats_stay_floats_on_disk() {
        let col = Column::Float(vec![3.0, 0.1]);
        assert_eq!(col.cell(0).as_deref(), Some("3.0"));
        assert_eq!(col.cell(1).as_deref(), Some("0.1"));
        assert_eq!(col.cell(2), None);
    }

    #[test]
    fn table_rejects_ragged_columns() {
        let table = StimulusTable::new()
            .with_column("stimID", vec![1i64, 2, 3])
            .unwrap();
        let err = table.with_column("RT", vec![0.5, 0.7]).unwrap_err();
        assert_eq!(
            err,
            FormatError::ColumnLength {
                name: "RT".into(),
                expected: 3,
                found: 2
            }
        );
    }

    #[test]
    fn replacing_sole_column_may_change_length() {
        let mut table = StimulusTable::new();
        table.insert("stimID", vec![1i64, 2]).unwrap();
        table.insert("stimID", vec![1i64, 2, 3]).unwrap();
        assert_eq!(table.n_rows(), 3);
    }

    #[test]
    fn stimulus_type_parsing() {
        assert_eq!("video".parse::<StimulusType>(), Ok(StimulusType::Video));
        assert_eq!(
            "audio".parse::<StimulusType>(),
            Err(FormatError::UnknownStimulusType("audio".into()))
        );
    }
}
