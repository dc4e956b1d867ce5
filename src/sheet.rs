use crate::error::AppError;
use calamine::{open_workbook_auto, Data, Reader};
use std::path::Path;

fn render_cell(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(datetime) => datetime.format("%Y-%m-%d %H:%M:%S").to_string(),
            None => dt.as_f64().to_string(),
        },
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Error(e) => {
            log::debug!("Cell error {:?} exported as empty", e);
            String::new()
        }
    }
}

/// Extracts one named sheet from a workbook into a CSV file.
pub fn convert_sheet(workbook: &Path, sheet: &str, output: &Path) -> Result<usize, AppError> {
    if !workbook.exists() {
        return Err(AppError::NotFound(format!("workbook {:?}", workbook)));
    }
    log::info!("Reading sheet '{}' from {:?}", sheet, workbook);
    let mut book = open_workbook_auto(workbook)?;
    if !book.sheet_names().iter().any(|name| name == sheet) {
        return Err(AppError::NotFound(format!(
            "sheet '{}' in {:?}",
            sheet, workbook
        )));
    }
    let range = book.worksheet_range(sheet)?;

    let mut writer = csv::Writer::from_path(output)?;
    let mut rows = 0usize;
    for row in range.rows() {
        writer.write_record(row.iter().map(render_cell))?;
        rows += 1;
    }
    writer.flush()?;

    log::info!("Sheet '{}' saved to {:?} ({} rows)", sheet, output, rows);
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_xlsxwriter::{Format, Workbook};
    use std::path::PathBuf;

    // 2025-05-19 18:00:00 as an Excel serial date.
    const EVENING_SERIAL: f64 = 45796.75;

    fn write_workbook(dir: &Path) -> PathBuf {
        let path = dir.join("tracking.xlsx");
        let mut workbook = Workbook::new();
        let date_format = Format::new().set_num_format("yyyy-mm-dd hh:mm:ss");

        let cover = workbook.add_worksheet();
        cover.set_name("Cover").unwrap();
        cover.write_string(0, 0, "not the table").unwrap();

        let sheet = workbook.add_worksheet();
        sheet.set_name("Inside view").unwrap();
        for (col, header) in ["No", "File Name", "Date & Time", "Latitude"].iter().enumerate() {
            sheet.write_string(0, col as u16, *header).unwrap();
        }
        sheet.write_number(1, 0, 12.0).unwrap();
        sheet.write_string(1, 1, "site-a").unwrap();
        sheet
            .write_number_with_format(1, 2, EVENING_SERIAL, &date_format)
            .unwrap();
        sheet.write_number(1, 3, -6.25).unwrap();

        workbook.save(&path).unwrap();
        path
    }

    #[test]
    fn named_sheet_is_written_as_csv() {
        let dir = tempfile::tempdir().unwrap();
        let book = write_workbook(dir.path());
        let output = dir.path().join("table.csv");

        let rows = convert_sheet(&book, "Inside view", &output).unwrap();

        assert_eq!(rows, 2);
        let text = std::fs::read_to_string(&output).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "No,File Name,Date & Time,Latitude");
        assert_eq!(lines[1], "12,site-a,2025-05-19 18:00:00,-6.25");
        assert!(!text.contains("not the table"));
    }

    #[test]
    fn absent_sheet_in_valid_workbook_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let book = write_workbook(dir.path());
        let output = dir.path().join("table.csv");

        let err = convert_sheet(&book, "Outside view", &output).unwrap_err();

        assert!(matches!(err, AppError::NotFound(_)));
        assert!(!output.exists());
    }

    #[test]
    fn integral_floats_lose_their_fraction() {
        assert_eq!(render_cell(&Data::Float(12.0)), "12");
        assert_eq!(render_cell(&Data::Float(-6.25)), "-6.25");
        assert_eq!(render_cell(&Data::Int(7)), "7");
        assert_eq!(render_cell(&Data::Empty), "");
        assert_eq!(render_cell(&Data::String("Jl. Sudirman".into())), "Jl. Sudirman");
    }

    #[test]
    fn missing_workbook_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = convert_sheet(
            &dir.path().join("absent.xlsx"),
            "Inside view",
            &dir.path().join("out.csv"),
        )
        .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert!(!dir.path().join("out.csv").exists());
    }

    #[test]
    fn unreadable_workbook_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let book = dir.path().join("broken.xlsx");
        std::fs::write(&book, b"not a zip archive").unwrap();
        assert!(convert_sheet(&book, "Inside view", &dir.path().join("out.csv")).is_err());
    }
}
