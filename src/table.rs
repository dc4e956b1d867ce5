use crate::config::{ColumnConfig, ColumnRange};
use crate::error::AppError;
use csv::StringRecord;
use std::ops::Range;
use std::path::Path;

/// One surviving table row, validated at load time.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// 1-based line in the source file, header included.
    pub line: usize,
    pub file_name: String,
    pub coordinates: String,
    pub captured_at: Option<String>,
    pub descriptions: Vec<String>,
    pub folders: Vec<String>,
    pub identifier: Option<String>,
}

/// Column names resolved to header positions once.
#[derive(Debug, Clone)]
struct Columns {
    file_name: usize,
    coordinates: usize,
    captured_at: Option<usize>,
    identifier: Option<usize>,
    descriptions: Range<usize>,
    folders: Range<usize>,
}

impl Columns {
    fn resolve(
        headers: &StringRecord,
        config: &ColumnConfig,
        require_identifier: bool,
    ) -> Result<Self, AppError> {
        let find = |name: &str| headers.iter().position(|h| h.trim() == name);
        let require =
            |name: &str| find(name).ok_or_else(|| AppError::MissingColumn(name.to_string()));

        let identifier = match (&config.identifier, require_identifier) {
            (Some(name), true) => Some(require(name)?),
            (Some(name), false) => find(name),
            (None, true) => return Err(AppError::MissingColumn("identifier".into())),
            (None, false) => None,
        };

        Ok(Self {
            file_name: require(&config.file_name)?,
            coordinates: require(&config.coordinates)?,
            captured_at: config.captured_at.as_deref().and_then(find),
            identifier,
            descriptions: clamp(config.watermark, headers.len())?,
            folders: match config.folders {
                Some(range) => clamp(range, headers.len())?,
                None => 0..0,
            },
        })
    }
}

fn clamp(range: ColumnRange, len: usize) -> Result<Range<usize>, AppError> {
    if range.start > range.end {
        return Err(AppError::InvalidColumnRange {
            start: range.start,
            end: range.end,
        });
    }
    Ok(range.start.min(len)..range.end.min(len))
}

/// Placeholders spreadsheet exports leave in empty cells.
const MISSING_MARKERS: &[&str] = &[
    "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

fn cell(record: &StringRecord, index: usize) -> Option<String> {
    let value = record.get(index)?.trim();
    if value.is_empty() || MISSING_MARKERS.contains(&value) {
        None
    } else {
        Some(value.to_string())
    }
}

fn cells(record: &StringRecord, range: &Range<usize>) -> Vec<String> {
    range.clone().filter_map(|i| cell(record, i)).collect()
}

/// `12.0` comes out of float-typed spreadsheet columns; file names say `12`.
fn normalize_identifier(raw: String) -> String {
    match raw.parse::<f64>() {
        Ok(value)
            if raw.contains('.') && !raw.contains(['e', 'E']) && value.fract() == 0.0 =>
        {
            format!("{}", value as i64)
        }
        _ => raw,
    }
}

pub fn load_rows(
    path: &Path,
    config: &ColumnConfig,
    require_identifier: bool,
) -> Result<Vec<Row>, AppError> {
    log::info!("Loading table from {:?}", path);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)?;
    let headers = reader.headers()?.clone();
    log::debug!("Table headers: {:?}", headers);
    let columns = Columns::resolve(&headers, config, require_identifier)?;

    let mut rows = Vec::new();
    let mut dropped = 0usize;
    for (index, record) in reader.records().enumerate() {
        let record = record?;
        let line = index + 2;
        let (Some(file_name), Some(coordinates)) = (
            cell(&record, columns.file_name),
            cell(&record, columns.coordinates),
        ) else {
            log::trace!("Dropping line {}: missing file name or coordinates", line);
            dropped += 1;
            continue;
        };
        rows.push(Row {
            line,
            file_name,
            coordinates,
            captured_at: columns.captured_at.and_then(|i| cell(&record, i)),
            descriptions: cells(&record, &columns.descriptions),
            folders: cells(&record, &columns.folders),
            identifier: columns
                .identifier
                .and_then(|i| cell(&record, i))
                .map(normalize_identifier),
        });
    }

    log::info!("Loaded {} rows ({} dropped)", rows.len(), dropped);
    Ok(rows)
}
