use exif::Error as ExifError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Walkdir error: {0}")]
    Walkdir(#[from] walkdir::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("EXIF error: {0}")]
    Exif(#[from] ExifError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Workbook error: {0}")]
    Workbook(#[from] calamine::Error),

    #[error("Font error: {0}")]
    Font(#[from] ab_glyph::InvalidFont),

    #[error("Missing required column '{0}'")]
    MissingColumn(String),

    #[error("Invalid column range {start}..{end}")]
    InvalidColumnRange { start: usize, end: usize },

    #[error("{images} images but only {rows} rows in table")]
    TooManyImages { images: usize, rows: usize },

    #[error("Generic error: {0}")]
    Generic(String),

    #[error("Not found: {0}")]
    NotFound(String),
}
