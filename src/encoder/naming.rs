//! Output naming scheme (§4.5): insert a codec marker and release tag,
//! preserve the extension, and replace any existing different codec marker.
//! Idempotent — applying it to an already-correctly-named file is a no-op.

use crate::domain::CodecFamily;

/// Produces `(originalFilename, codecFamily, releaseTag)` -> new name.
/// Mirrors the reference naming conventions already used for release-tagged
/// filenames (e.g. `Movie.Name.2023.1080p.h265-Z3D.mkv`).
pub fn generate_encoded_filename(original: &str, family: CodecFamily, release_tag: &str) -> String {
    let (stem, ext) = match original.rsplit_once('.') {
        Some((stem, ext)) => (stem, ext),
        None => (original, ""),
    };

    let marker = family.marker();
    let mut segments: Vec<&str> = stem.split('.').collect();

    let existing_marker_idx = segments.iter().position(|s| CodecFamily::all_markers().contains(s));
    let existing_tag_idx = segments.iter().position(|s| *s == release_tag);

    if existing_marker_idx.map(|i| segments[i] == marker).unwrap_or(false) && existing_tag_idx.is_some() {
        return original.to_string();
    }

    match existing_marker_idx {
        Some(i) => segments[i] = marker,
        None => segments.push(marker),
    }

    // Drop any stale release tag before appending the current one, so a
    // re-encode under a new tag doesn't accumulate duplicates.
    if let Some(i) = segments.iter().position(|s| *s == release_tag) {
        segments.remove(i);
    }
    segments.push(release_tag);

    let new_stem = segments.join(".");
    if ext.is_empty() {
        new_stem
    } else {
        format!("{new_stem}.{ext}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inserts_marker_and_tag_for_untagged_file() {
        let name = generate_encoded_filename("Movie.2023.1080p.mkv", CodecFamily::Hevc, "Z3D");
        assert_eq!(name, "Movie.2023.1080p.h265.Z3D.mkv");
    }

    #[test]
    fn is_idempotent_when_already_correct() {
        let once = generate_encoded_filename("Movie.2023.1080p.mkv", CodecFamily::Hevc, "Z3D");
        let twice = generate_encoded_filename(&once, CodecFamily::Hevc, "Z3D");
        assert_eq!(once, twice);
    }

    #[test]
    fn replaces_existing_different_marker() {
        let name = generate_encoded_filename("Movie.2023.vp9.Z3D.mkv", CodecFamily::Hevc, "Z3D");
        assert_eq!(name, "Movie.2023.h265.Z3D.mkv");
    }

    #[test]
    fn preserves_extension() {
        let name = generate_encoded_filename("clip.webm", CodecFamily::Vp9, "Z3D");
        assert!(name.ends_with(".webm"));
    }
}
