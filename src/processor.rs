use crate::clock::{parse_timestamp, CaptureTime, Clock};
use crate::config::{AppConfig, Pairing, TimestampSource};
use crate::error::AppError;
use crate::geo::parse_coordinates;
use crate::metadata::{attach, MetadataBlock};
use crate::table::{load_rows, Row};
use crate::walker::{self, Paired};
use crate::watermark::{FontWatermarker, Watermarker};
use image::codecs::jpeg::JpegEncoder;
use image::ImageEncoder;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq)]
pub enum RowOutcome {
    Written {
        destinations: Vec<PathBuf>,
    },
    Skipped {
        reason: String,
    },
    /// `written` lists destinations persisted before the failure.
    Failed {
        source: PathBuf,
        error: String,
        written: Vec<PathBuf>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RowReport {
    pub line: usize,
    pub file_name: String,
    pub outcome: RowOutcome,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    pub rows: Vec<RowReport>,
}

impl BatchReport {
    pub fn files_written(&self) -> usize {
        self.rows
            .iter()
            .map(|r| match &r.outcome {
                RowOutcome::Written { destinations } => destinations.len(),
                RowOutcome::Failed { written, .. } => written.len(),
                RowOutcome::Skipped { .. } => 0,
            })
            .sum()
    }

    pub fn skipped(&self) -> usize {
        self.rows
            .iter()
            .filter(|r| matches!(r.outcome, RowOutcome::Skipped { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.rows
            .iter()
            .filter(|r| matches!(r.outcome, RowOutcome::Failed { .. }))
            .count()
    }
}

/// `[display time, raw coordinates, descriptions...]`, top line first.
pub fn watermark_lines(time: &CaptureTime, row: &Row) -> Vec<String> {
    let mut lines = Vec::with_capacity(2 + row.descriptions.len());
    lines.push(time.display());
    lines.push(row.coordinates.clone());
    lines.extend(row.descriptions.iter().cloned());
    lines
}

fn output_name(file_name: &str) -> String {
    let lower = file_name.to_lowercase();
    if lower.ends_with(".jpg") || lower.ends_with(".jpeg") {
        file_name.to_string()
    } else {
        format!("{}.jpg", file_name)
    }
}

/// One path per named folder, or directly under `output_dir` when the row names none.
pub fn destinations(output_dir: &Path, row: &Row) -> Vec<PathBuf> {
    let name = output_name(&row.file_name);
    if row.folders.is_empty() {
        vec![output_dir.join(name)]
    } else {
        row.folders
            .iter()
            .map(|folder| output_dir.join(folder).join(&name))
            .collect()
    }
}

pub struct Processor<'a, W: Watermarker> {
    pub watermarker: &'a W,
    pub output_dir: &'a Path,
    pub jpeg_quality: u8,
    pub timestamps: TimestampSource,
}

impl<W: Watermarker> Processor<'_, W> {
    fn capture_time<R: Rng>(&self, row: &Row, clock: &mut Clock, rng: &mut R) -> CaptureTime {
        if self.timestamps == TimestampSource::Table {
            match row.captured_at.as_deref().map(|t| (t, parse_timestamp(t))) {
                Some((_, Some(time))) => return CaptureTime(time),
                Some((raw, None)) => {
                    log::warn!("Line {}: unparseable timestamp '{}', synthesizing", row.line, raw)
                }
                None => log::debug!("Line {}: no timestamp, synthesizing", row.line),
            }
        }
        clock.tick(rng)
    }

    /// Opens, stamps and encodes once; the bytes are reused for every destination.
    fn render(&self, row: &Row, source: &Path, time: &CaptureTime) -> Result<Vec<u8>, AppError> {
        let bytes = fs::read(source)?;
        let mut block = MetadataBlock::read(&mut Cursor::new(&bytes))?;

        match parse_coordinates(&row.coordinates) {
            Some(coordinates) => block.apply_geotag(time, coordinates),
            None => log::warn!(
                "Line {}: unparseable coordinates '{}', geotag skipped",
                row.line,
                row.coordinates
            ),
        }

        let mut image = image::load_from_memory(&bytes)?.to_rgb8();
        self.watermarker.stamp(&mut image, &watermark_lines(time, row));

        let mut encoded = Vec::new();
        JpegEncoder::new_with_quality(&mut encoded, self.jpeg_quality).write_image(
            &image,
            image.width(),
            image.height(),
            image::ExtendedColorType::Rgb8,
        )?;
        attach(encoded, &block)
    }

    fn process_row(&self, row: &Row, source: &Path, time: &CaptureTime) -> RowOutcome {
        log::debug!("Processing line {} from {:?}", row.line, source);
        let failed = |error: AppError, written: Vec<PathBuf>| {
            log::error!("Error processing {:?}: {}", source, error);
            RowOutcome::Failed {
                source: source.to_path_buf(),
                error: error.to_string(),
                written,
            }
        };

        let rendered = match self.render(row, source, time) {
            Ok(rendered) => rendered,
            Err(e) => return failed(e, Vec::new()),
        };

        let mut written = Vec::new();
        for destination in destinations(self.output_dir, row) {
            let result = destination
                .parent()
                .map_or(Ok(()), fs::create_dir_all)
                .and_then(|_| fs::write(&destination, &rendered));
            if let Err(e) = result {
                return failed(e.into(), written);
            }
            log::info!("Watermarked: {:?}", destination);
            written.push(destination);
        }
        RowOutcome::Written {
            destinations: written,
        }
    }

    /// Rows are handled strictly in order; a failing row never stops the batch.
    pub fn process_batch<R: Rng>(
        &self,
        pairs: &[Paired<'_>],
        clock: &mut Clock,
        rng: &mut R,
    ) -> BatchReport {
        let mut report = BatchReport::default();
        for pair in pairs {
            let (row, outcome) = match pair {
                Paired::Found { row, source } => {
                    let time = self.capture_time(row, clock, rng);
                    (*row, self.process_row(row, source, &time))
                }
                Paired::Missing { row, identifier } => {
                    log::warn!(
                        "Line {}: no source image for identifier '{}', skipping",
                        row.line,
                        identifier
                    );
                    let reason = format!("no source image for identifier '{}'", identifier);
                    (*row, RowOutcome::Skipped { reason })
                }
            };
            report.rows.push(RowReport {
                line: row.line,
                file_name: row.file_name.clone(),
                outcome,
            });
        }
        report
    }
}

/// Full run: table, pairing, font and clock pre-checks, then the batch.
pub fn run(config: &AppConfig) -> Result<BatchReport, AppError> {
    let rows = load_rows(
        &config.table_file,
        &config.columns,
        config.pairing == Pairing::Identifier,
    )?;

    let pairs = match config.pairing {
        Pairing::Positional => {
            let images = walker::list_images(&config.input_dir, &config.image_extensions)?;
            walker::pair_positional(&rows, images)?
        }
        Pairing::Identifier => {
            walker::pair_by_identifier(&rows, &config.input_dir, &config.image_extensions)
        }
    };

    let watermarker = FontWatermarker::from_file(&config.font_path, config.watermark.clone())?;
    let mut clock = Clock::from_config(&config.clock)?;
    log::debug!("Clock starts at {}", clock.current());
    let processor = Processor {
        watermarker: &watermarker,
        output_dir: &config.output_dir,
        jpeg_quality: config.jpeg_quality,
        timestamps: config.timestamps,
    };

    log::info!("Processing {} rows", pairs.len());
    let report = match config.clock.seed {
        Some(seed) => processor.process_batch(&pairs, &mut clock, &mut StdRng::seed_from_u64(seed)),
        None => processor.process_batch(&pairs, &mut clock, &mut rand::rng()),
    };
    log::info!("All rows processed.");
    Ok(report)
}
