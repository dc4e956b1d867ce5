use crate::config::ClockConfig;
use crate::error::AppError;
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use rand::Rng;

const EXIF_FORMAT: &str = "%Y:%m:%d %H:%M:%S";
const DISPLAY_FORMAT: &str = "%d %b %Y %H:%M:%S";

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y:%m:%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%d %b %Y %H:%M:%S",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y"];

/// A capture time and its two textual renderings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureTime(pub NaiveDateTime);

impl CaptureTime {
    /// `YYYY:MM:DD HH:MM:SS`, as EXIF date tags expect.
    pub fn exif(&self) -> String {
        self.0.format(EXIF_FORMAT).to_string()
    }

    /// `DD Mon YYYY HH:MM:SS`, drawn into the watermark.
    pub fn display(&self) -> String {
        self.0.format(DISPLAY_FORMAT).to_string()
    }
}

/// Parses a timestamp as found in exported tracking tables.
pub fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    // Fractional seconds from spreadsheet exports are dropped.
    let text = text.split_once('.').map_or(text, |(head, _)| head);
    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .or_else(|| {
            DATE_FORMATS.iter().find_map(|format| {
                NaiveDate::parse_from_str(text, format)
                    .ok()
                    .map(|date| date.and_time(NaiveTime::MIN))
            })
        })
}

/// Running capture-time state, advanced once per processed row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clock {
    current: NaiveDateTime,
    day_start_hour: u32,
    day_end_hour: u32,
}

impl Clock {
    pub fn new(start: NaiveDateTime, day_start_hour: u32, day_end_hour: u32) -> Self {
        Self {
            current: start,
            day_start_hour,
            day_end_hour,
        }
    }

    pub fn from_config(config: &ClockConfig) -> Result<Self, AppError> {
        let start = parse_timestamp(&config.start).ok_or_else(|| {
            AppError::Generic(format!("Invalid clock start '{}'", config.start))
        })?;
        if config.day_start_hour >= config.day_end_hour || config.day_end_hour > 24 {
            return Err(AppError::Generic(format!(
                "Invalid working hours {}..{}",
                config.day_start_hour, config.day_end_hour
            )));
        }
        Ok(Self::new(start, config.day_start_hour, config.day_end_hour))
    }

    pub fn current(&self) -> NaiveDateTime {
        self.current
    }

    /// Advances by 8-36 minutes and 0-59 seconds. Landing at or past the end
    /// hour (or past midnight) moves to the next day's start hour instead.
    pub fn tick<R: Rng>(&mut self, rng: &mut R) -> CaptureTime {
        let minutes = rng.random_range(8..=36);
        let seconds = rng.random_range(0..=59);
        let candidate = self.current + Duration::minutes(minutes) + Duration::seconds(seconds);

        self.current = if candidate.hour() >= self.day_end_hour
            || candidate.date() != self.current.date()
        {
            let next_day = self.current.date() + Duration::days(1);
            let minute = rng.random_range(0..=10);
            let second = rng.random_range(0..=59);
            match next_day.and_hms_opt(self.day_start_hour, minute, second) {
                Some(rolled) => rolled,
                None => next_day.and_time(NaiveTime::MIN),
            }
        } else {
            candidate
        };

        log::trace!("Clock advanced to {}", self.current);
        CaptureTime(self.current)
    }
}
