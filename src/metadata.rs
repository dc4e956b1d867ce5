use crate::clock::CaptureTime;
use crate::error::AppError;
use crate::geo::{latitude_dms, longitude_dms, Coordinates};
use exif::experimental::Writer;
use exif::{Context, Exif, Field, In, Reader, Tag, Value};
use std::io::{BufRead, Cursor, Seek};

const EXIF_HEADER: &[u8] = b"Exif\0\0";
const SOI: [u8; 2] = [0xFF, 0xD8];
const APP0: u8 = 0xE0;
const APP1: u8 = 0xE1;

/// EXIF metadata of one image, ready to be rewritten. Primary and thumbnail
/// IFD fields share `fields`; the thumbnail's JPEG bytes live in `thumbnail`.
#[derive(Debug, Clone, Default)]
pub struct MetadataBlock {
    pub fields: Vec<Field>,
    pub thumbnail: Option<Vec<u8>>,
    pub little_endian: bool,
}

impl MetadataBlock {
    /// Reads the EXIF block of a JPEG; an image without one yields an empty block.
    pub fn read<R: BufRead + Seek>(reader: &mut R) -> Result<Self, AppError> {
        match Reader::new().read_from_container(reader) {
            Ok(exif) => {
                let fields: Vec<Field> = exif
                    .fields()
                    .filter(|f| f.ifd_num == In::PRIMARY || f.ifd_num == In::THUMBNAIL)
                    .filter(|f| !matches!(f.value, Value::Unknown(..)))
                    .filter(|f| {
                        f.tag != Tag::JPEGInterchangeFormat
                            && f.tag != Tag::JPEGInterchangeFormatLength
                    })
                    .cloned()
                    .collect();
                let thumbnail = thumbnail_bytes(&exif);
                log::trace!(
                    "Read {} EXIF fields, thumbnail: {}",
                    fields.len(),
                    thumbnail.as_ref().map_or(0, |t| t.len())
                );
                Ok(Self {
                    fields,
                    thumbnail,
                    little_endian: exif.little_endian(),
                })
            }
            Err(exif::Error::NotFound(_)) => {
                log::debug!("No EXIF data found, starting from an empty block");
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    #[cfg(test)]
    pub fn get(&self, tag: Tag) -> Option<&Field> {
        self.fields
            .iter()
            .find(|f| f.tag == tag && f.ifd_num == In::PRIMARY)
    }

    fn set(&mut self, tag: Tag, value: Value) {
        self.fields
            .retain(|f| !(f.tag == tag && f.ifd_num == In::PRIMARY));
        self.fields.push(Field {
            tag,
            ifd_num: In::PRIMARY,
            value,
        });
    }

    /// Replaces the three date tags and the whole GPS group; everything else,
    /// the thumbnail IFD included, is kept.
    pub fn apply_geotag(&mut self, time: &CaptureTime, coordinates: Coordinates) {
        let stamp = time.exif().into_bytes();
        for tag in [Tag::DateTime, Tag::DateTimeOriginal, Tag::DateTimeDigitized] {
            self.set(tag, Value::Ascii(vec![stamp.clone()]));
        }

        self.fields
            .retain(|f| !(f.tag.context() == Context::Gps && f.ifd_num == In::PRIMARY));
        let latitude = latitude_dms(coordinates.latitude);
        let longitude = longitude_dms(coordinates.longitude);
        self.set(Tag::GPSLatitudeRef, Value::Ascii(vec![vec![latitude.reference]]));
        self.set(Tag::GPSLatitude, Value::Rational(latitude.rationals()));
        self.set(Tag::GPSLongitudeRef, Value::Ascii(vec![vec![longitude.reference]]));
        self.set(Tag::GPSLongitude, Value::Rational(longitude.rationals()));
    }

    /// TIFF-structured bytes, or `None` for an empty block.
    pub fn to_tiff(&self) -> Result<Option<Vec<u8>>, AppError> {
        if self.fields.is_empty() && self.thumbnail.is_none() {
            return Ok(None);
        }
        let mut writer = Writer::new();
        for field in &self.fields {
            writer.push_field(field);
        }
        if let Some(thumbnail) = &self.thumbnail {
            writer.set_jpeg(thumbnail, In::THUMBNAIL);
        }
        let mut buf = Cursor::new(Vec::new());
        writer.write(&mut buf, self.little_endian)?;
        Ok(Some(buf.into_inner()))
    }
}

/// JPEG thumbnail referenced by IFD1, when its offset and length stay inside the block.
fn thumbnail_bytes(exif: &Exif) -> Option<Vec<u8>> {
    let offset = exif
        .get_field(Tag::JPEGInterchangeFormat, In::THUMBNAIL)?
        .value
        .get_uint(0)? as usize;
    let length = exif
        .get_field(Tag::JPEGInterchangeFormatLength, In::THUMBNAIL)?
        .value
        .get_uint(0)? as usize;
    let end = offset.checked_add(length)?;
    match exif.buf().get(offset..end) {
        Some(bytes) => Some(bytes.to_vec()),
        None => {
            log::warn!("Thumbnail at {}+{} lies outside the EXIF block, dropping it", offset, length);
            None
        }
    }
}

/// Inserts an APP1 EXIF segment after SOI, or after a leading JFIF APP0.
pub fn embed_exif(jpeg: &[u8], tiff: &[u8]) -> Result<Vec<u8>, AppError> {
    if jpeg.len() < 4 || jpeg[..2] != SOI {
        return Err(AppError::Generic("encoded image is not a JPEG".into()));
    }
    let segment_length = 2 + EXIF_HEADER.len() + tiff.len();
    let segment_length = u16::try_from(segment_length).map_err(|_| {
        AppError::Generic(format!("EXIF block too large: {} bytes", tiff.len()))
    })?;

    let mut insert_at = 2;
    if jpeg[2] == 0xFF && jpeg[3] == APP0 && jpeg.len() >= 6 {
        let app0_length = u16::from_be_bytes([jpeg[4], jpeg[5]]) as usize;
        if 4 + app0_length <= jpeg.len() {
            insert_at = 4 + app0_length;
        }
    }

    let mut out = Vec::with_capacity(jpeg.len() + segment_length as usize + 2);
    out.extend_from_slice(&jpeg[..insert_at]);
    out.extend_from_slice(&[0xFF, APP1]);
    out.extend_from_slice(&segment_length.to_be_bytes());
    out.extend_from_slice(EXIF_HEADER);
    out.extend_from_slice(tiff);
    out.extend_from_slice(&jpeg[insert_at..]);
    Ok(out)
}

/// Embeds `block` into an encoded JPEG, leaving it as is when the block is empty.
pub fn attach(jpeg: Vec<u8>, block: &MetadataBlock) -> Result<Vec<u8>, AppError> {
    match block.to_tiff()? {
        Some(tiff) => embed_exif(&jpeg, &tiff),
        None => Ok(jpeg),
    }
}
