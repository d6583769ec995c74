//! Path-derived naming: relative keys, categories and display titles.

use std::path::{Component, Path};

use once_cell::sync::Lazy;
use regex::Regex;

static CAMERA_PREFIX_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(IMG|DSC|DSCN|P|PIC|PHOTO|IMAGE)[-_]")
        .expect("camera prefix regex should compile")
});

static COMPACT_DATE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[-_]?20\d{6}[-_]?").expect("compact date regex should compile")
});

static SEPARATED_DATE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"[-_]?20\d{2}[-_](0[1-9]|1[0-2])[-_](0[1-9]|[12]\d|3[01])[-_]?",
    )
    .expect("separated date regex should compile")
});

static TIME_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[-_]?([01]\d|2[0-3])[-_:]?([0-5]\d)[-_:]?([0-5]\d)[-_]?")
        .expect("time regex should compile")
});

static LEADING_SEQUENCE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[-_]?\d{1,4}[-_]").expect("leading sequence regex should compile")
});

static TRAILING_SEQUENCE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[-_]\d{1,4}$").expect("trailing sequence regex should compile")
});

static SEPARATOR_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[-_]+").expect("separator regex should compile")
});

static COLLAPSE_WHITESPACE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("whitespace regex should compile"));

/// Forward-slash key for `path` relative to `root`. `None` when the path is
/// outside the root, is the root itself, or is not valid UTF-8.
pub fn relative_key(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let mut segments = Vec::new();
    for component in rel.components() {
        match component {
            Component::Normal(seg) => segments.push(seg.to_str()?),
            Component::CurDir => {}
            Component::ParentDir => {
                segments.pop()?;
            }
            _ => return None,
        }
    }
    if segments.is_empty() {
        None
    } else {
        Some(segments.join("/"))
    }
}

/// Top-level directory segment of a relative key. Files sitting directly at
/// the root have no category.
pub fn category_of(relative_path: &str) -> Option<&str> {
    let (head, rest) = relative_path.split_once('/')?;
    if head.is_empty() || rest.is_empty() {
        None
    } else {
        Some(head)
    }
}

/// Last segment of a relative key.
pub fn filename_of(relative_path: &str) -> &str {
    relative_path
        .rsplit_once('/')
        .map_or(relative_path, |(_, name)| name)
}

/// Whether `relative_path` lies strictly beneath the directory key `dir`.
pub fn is_beneath(relative_path: &str, dir: &str) -> bool {
    relative_path.len() > dir.len()
        && relative_path.starts_with(dir)
        && relative_path.as_bytes()[dir.len()] == b'/'
}

/// Human-readable title derived from a filename: camera prefixes, embedded
/// dates and times, and sequence numbers are stripped before title-casing.
pub fn title_from_filename(filename: &str) -> String {
    let stem = file_stem(filename);

    let name = CAMERA_PREFIX_REGEX.replace(stem, "");
    let name = COMPACT_DATE_REGEX.replace_all(&name, "_");
    let name = SEPARATED_DATE_REGEX.replace_all(&name, "_");
    let name = TIME_REGEX.replace_all(&name, "_");
    let name = LEADING_SEQUENCE_REGEX.replace(&name, "");
    let name = TRAILING_SEQUENCE_REGEX.replace(&name, "");
    let name = SEPARATOR_REGEX.replace_all(&name, " ");
    let name = COLLAPSE_WHITESPACE_REGEX.replace_all(name.trim(), " ");

    let title = title_case(&name);
    if title.is_empty() {
        title_case(&stem.replace(['_', '-'], " "))
    } else {
        title
    }
}

fn file_stem(filename: &str) -> &str {
    let name = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(filename);
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => name,
    }
}

/// Uppercase letters that follow a non-letter, lowercase the rest.
fn title_case(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut prev_cased = false;
    for ch in value.chars() {
        if ch.is_alphabetic() {
            if prev_cased {
                out.extend(ch.to_lowercase());
            } else {
                out.extend(ch.to_uppercase());
            }
            prev_cased = true;
        } else {
            out.push(ch);
            prev_cased = false;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn relative_key_normalizes_components() {
        let root = PathBuf::from("/photos");
        assert_eq!(
            relative_key(&root, &root.join("Travel/./rome.jpg")).as_deref(),
            Some("Travel/rome.jpg")
        );
        assert_eq!(relative_key(&root, &root), None);
        assert_eq!(relative_key(&root, Path::new("/elsewhere/a.jpg")), None);
    }

    #[test]
    fn category_requires_a_directory() {
        assert_eq!(category_of("Travel/rome.jpg"), Some("Travel"));
        assert_eq!(category_of("Travel/2023/rome.jpg"), Some("Travel"));
        assert_eq!(category_of("rome.jpg"), None);
        assert_eq!(filename_of("Travel/2023/rome.jpg"), "rome.jpg");
        assert_eq!(filename_of("rome.jpg"), "rome.jpg");
    }

    #[test]
    fn beneath_respects_segment_boundaries() {
        assert!(is_beneath("Travel/rome.jpg", "Travel"));
        assert!(!is_beneath("Travelling/rome.jpg", "Travel"));
        assert!(!is_beneath("Travel", "Travel"));
    }

    #[test]
    fn plain_names_are_title_cased() {
        assert_eq!(title_from_filename("beautiful_sunset.jpg"), "Beautiful Sunset");
        assert_eq!(title_from_filename("mountain-hiking-trail.jpg"), "Mountain Hiking Trail");
        assert_eq!(title_from_filename("city_lights"), "City Lights");
        assert_eq!(
            title_from_filename("/photos/landscapes/sunset_view.jpg"),
            "Sunset View"
        );
    }

    #[test]
    fn camera_prefixes_are_removed() {
        assert_eq!(title_from_filename("img_sunset.jpg"), "Sunset");
        assert_eq!(title_from_filename("DSC_photo.jpg"), "Photo");
        assert!(title_from_filename("DSCN_9012.jpg").contains("9012"));
    }

    #[test]
    fn dates_times_and_sequences_are_removed() {
        assert_eq!(title_from_filename("vacation_20230615_sunset.jpg"), "Vacation Sunset");
        assert_eq!(title_from_filename("party_2023-06-15_group.jpg"), "Party Group");
        assert_eq!(title_from_filename("event_142530_photo.jpg"), "Event Photo");
        assert_eq!(title_from_filename("001_sunset.jpg"), "Sunset");
        assert_eq!(title_from_filename("photo_123.jpg"), "Photo");
        assert_eq!(title_from_filename("beach___vacation___2023.jpg"), "Beach Vacation");
    }

    #[test]
    fn empty_result_falls_back_to_stem() {
        assert_eq!(
            title_from_filename("IMG_20230615_142530.jpg"),
            "Img 20230615 142530"
        );
    }
}
