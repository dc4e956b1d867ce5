use crate::error::AppError;
use crate::table::Row;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// A table row together with the source image it was matched to.
#[derive(Debug, Clone)]
pub enum Paired<'a> {
    Found { row: &'a Row, source: PathBuf },
    Missing { row: &'a Row, identifier: String },
}

fn has_allowed_extension(path: &Path, allowed_extensions: &HashSet<String>) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|ext| allowed_extensions.contains(&ext.to_lowercase()))
        .unwrap_or(false)
}

/// Image files directly inside `dir`, sorted by file name.
pub fn list_images(
    dir: &Path,
    allowed_extensions: &HashSet<String>,
) -> Result<Vec<PathBuf>, AppError> {
    log::info!("Listing images in {:?}", dir);
    log::debug!("Configured image extensions: {:?}", allowed_extensions);

    let mut images = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            log::trace!("Skipping non-file entry: {:?}", entry.path());
            continue;
        }
        let path = entry.path();
        if has_allowed_extension(path, allowed_extensions) {
            log::trace!("Discovered image: {:?}", path);
            images.push(path.to_path_buf());
        } else {
            log::trace!("Skipping file due to unsupported extension: {:?}", path);
        }
    }

    images.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    log::info!("Found {} images", images.len());
    Ok(images)
}

/// First `dir/<identifier>.<ext>` that exists, trying each extension lowercase then uppercase.
pub fn find_by_identifier(dir: &Path, identifier: &str, extensions: &[String]) -> Option<PathBuf> {
    extensions
        .iter()
        .flat_map(|ext| [ext.to_lowercase(), ext.to_uppercase()])
        .map(|ext| dir.join(format!("{}.{}", identifier, ext)))
        .find(|candidate| candidate.is_file())
}

/// Pairs the i-th image with the i-th row. More images than rows aborts the run.
pub fn pair_positional(rows: &[Row], images: Vec<PathBuf>) -> Result<Vec<Paired<'_>>, AppError> {
    if images.len() > rows.len() {
        return Err(AppError::TooManyImages {
            images: images.len(),
            rows: rows.len(),
        });
    }
    if rows.len() > images.len() {
        log::info!(
            "{} rows have no matching image and will not be processed",
            rows.len() - images.len()
        );
    }
    Ok(rows
        .iter()
        .zip(images)
        .map(|(row, source)| Paired::Found { row, source })
        .collect())
}

/// Looks each row's identifier up in `dir`. A miss only affects that row.
pub fn pair_by_identifier<'a>(
    rows: &'a [Row],
    dir: &Path,
    allowed_extensions: &HashSet<String>,
) -> Vec<Paired<'a>> {
    // jpg before jpeg keeps lookups stable across runs.
    let mut extensions: Vec<String> = allowed_extensions.iter().cloned().collect();
    extensions.sort_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));

    rows.iter()
        .map(|row| {
            let identifier = row.identifier.clone().unwrap_or_default();
            match find_by_identifier(dir, &identifier, &extensions) {
                Some(source) if !identifier.is_empty() => {
                    log::debug!("Row {} matched {:?}", row.line, source);
                    Paired::Found { row, source }
                }
                _ => Paired::Missing { row, identifier },
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn extensions() -> HashSet<String> {
        ["jpg", "jpeg"].iter().map(|s| s.to_string()).collect()
    }

    fn row(name: &str, identifier: Option<&str>) -> Row {
        Row {
            line: 2,
            file_name: name.into(),
            coordinates: "-6.2 106.8".into(),
            captured_at: None,
            descriptions: vec![],
            folders: vec![],
            identifier: identifier.map(String::from),
        }
    }

    #[test]
    fn lists_only_images_sorted_by_name() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.JPG", "a.jpeg", "c.png", "notes.txt"] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }
        fs::create_dir(dir.path().join("nested.jpg")).unwrap();

        let images = list_images(dir.path(), &extensions()).unwrap();
        let names: Vec<_> = images
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.jpeg", "b.JPG"]);
    }

    #[test]
    fn positional_pairing_rejects_surplus_images() {
        let rows = vec![row("one", None)];
        let images = vec![PathBuf::from("a.jpg"), PathBuf::from("b.jpg")];
        let err = pair_positional(&rows, images).unwrap_err();
        assert!(matches!(err, AppError::TooManyImages { images: 2, rows: 1 }));
    }

    #[test]
    fn positional_pairing_zips_in_order() {
        let rows = vec![row("one", None), row("two", None), row("three", None)];
        let images = vec![PathBuf::from("a.jpg"), PathBuf::from("b.jpg")];
        let paired = pair_positional(&rows, images).unwrap();
        assert_eq!(paired.len(), 2);
        match &paired[1] {
            Paired::Found { row, source } => {
                assert_eq!(row.file_name, "two");
                assert_eq!(source, &PathBuf::from("b.jpg"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn identifier_pairing_marks_misses_without_failing() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("1.jpg"), b"x").unwrap();
        fs::write(dir.path().join("3.JPEG"), b"x").unwrap();
        let rows = vec![
            row("a", Some("1")),
            row("b", Some("2")),
            row("c", Some("3")),
            row("d", None),
        ];

        let paired = pair_by_identifier(&rows, dir.path(), &extensions());
        let found: Vec<bool> = paired
            .iter()
            .map(|p| matches!(p, Paired::Found { .. }))
            .collect();
        assert_eq!(found, vec![true, false, true, false]);
        assert!(matches!(&paired[1], Paired::Missing { identifier, .. } if identifier == "2"));
    }
}
