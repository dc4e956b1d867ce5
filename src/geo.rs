use exif::Rational;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// Degrees/minutes/seconds as EXIF rationals, seconds in hundredths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dms {
    pub degrees: u32,
    pub minutes: u32,
    pub centiseconds: u32,
    pub reference: u8,
}

impl Dms {
    pub fn rationals(&self) -> Vec<Rational> {
        vec![
            Rational {
                num: self.degrees,
                denom: 1,
            },
            Rational {
                num: self.minutes,
                denom: 1,
            },
            Rational {
                num: self.centiseconds,
                denom: 100,
            },
        ]
    }
}

/// Parses `"<lat> <lon>"`, tolerating degree glyphs and a comma separator.
pub fn parse_coordinates(text: &str) -> Option<Coordinates> {
    let cleaned = text.replace('°', " ");
    let parts: Vec<&str> = cleaned
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|s| !s.is_empty())
        .collect();
    let [lat, lon] = parts.as_slice() else {
        return None;
    };
    let latitude: f64 = lat.parse().ok()?;
    let longitude: f64 = lon.parse().ok()?;
    if !latitude.is_finite() || !longitude.is_finite() {
        return None;
    }
    Some(Coordinates { latitude, longitude })
}

/// Truncating decomposition: each component is cut, never rounded, so
/// values just under a minute or second boundary do not carry.
pub fn to_dms(value: f64, positive: u8, negative: u8) -> Dms {
    let reference = if value >= 0.0 { positive } else { negative };
    let abs = value.abs();
    let degrees = abs.trunc();
    let minutes = ((abs - degrees) * 60.0).trunc();
    let centiseconds = ((abs - degrees - minutes / 60.0) * 3600.0 * 100.0).trunc();
    Dms {
        degrees: degrees as u32,
        minutes: minutes as u32,
        centiseconds: centiseconds as u32,
        reference,
    }
}

pub fn latitude_dms(latitude: f64) -> Dms {
    to_dms(latitude, b'N', b'S')
}

pub fn longitude_dms(longitude: f64) -> Dms {
    to_dms(longitude, b'E', b'W')
}
