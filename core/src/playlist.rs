//! Playlist construction: m3u parsing and directory scanning.
//!
//! The two builders are intentionally independent in how strictly they treat
//! paths: the directory scan silently skips roots that do not exist or are
//! not directories, while m3u parsing takes every listed path at face value
//! without checking existence. Both behaviors are load-bearing for the
//! appliance (a playlist may reference media that a later ingestion run will
//! deliver).

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::model::Movie;

/// Result of a directory scan: the movies plus any sidecar volume values
/// found next to them. Later roots overwrite earlier ones.
#[derive(Debug, Default)]
pub struct ScanOutcome {
    pub movies: Vec<Movie>,
    /// Raw hardware-volume string, handed to the mixer verbatim.
    pub hw_volume: Option<String>,
    /// Playback volume in millibels.
    pub sound_volume_mb: Option<i32>,
}

/// Parse m3u/m3u8 contents: one movie path per line, `#` comments and blank
/// lines ignored exactly like the filename-based repeat suffix applies.
pub fn parse_m3u(contents: &str) -> Vec<Movie> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(Movie::from_path)
        .collect()
}

/// Read and parse a playlist file.
pub fn read_m3u(path: &Path) -> io::Result<Vec<Movie>> {
    let contents = fs::read_to_string(path)?;
    Ok(parse_m3u(&contents))
}

/// Scan media roots for playable files, sorted by path.
///
/// Hidden files (leading dot) are ignored; extensions match
/// case-insensitively against `extensions` (entries without dots). When
/// configured, per-root sidecar files for hardware and playback volume are
/// read opportunistically.
pub fn scan_directories(
    roots: &[PathBuf],
    extensions: &[String],
    hw_vol_file: Option<&str>,
    sound_vol_file: Option<&str>,
) -> ScanOutcome {
    let mut outcome = ScanOutcome::default();
    for root in roots {
        if !root.is_dir() {
            debug!("Skipping missing media root {}", root.display());
            continue;
        }
        let entries = match fs::read_dir(root) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Failed to list media root {}: {}", root.display(), e);
                continue;
            }
        };
        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if is_hidden(name) || !extension_matches(name, extensions) {
                continue;
            }
            if entry.path().is_dir() {
                continue;
            }
            outcome.movies.push(Movie::from_path(entry.path()));
        }
        if let Some(file) = hw_vol_file.filter(|f| !f.is_empty()) {
            if let Some(value) = read_sidecar_line(&root.join(file)) {
                outcome.hw_volume = Some(value);
            }
        }
        if let Some(file) = sound_vol_file.filter(|f| !f.is_empty()) {
            if let Some(value) = read_sidecar_line(&root.join(file)) {
                match value.parse::<f64>() {
                    Ok(volume) => outcome.sound_volume_mb = Some(volume as i32),
                    Err(_) => warn!(
                        "Ignoring non-numeric sound volume {:?} in {}",
                        value,
                        root.display()
                    ),
                }
            }
        }
    }
    outcome.movies.sort_by(|a, b| a.path.cmp(&b.path));
    outcome
}

/// File names starting with a dot are hidden; macOS in particular litters
/// USB drives with `._*` companions.
pub fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

/// Case-insensitive extension match against a set of dotless extensions.
pub fn extension_matches(name: &str, extensions: &[String]) -> bool {
    let Some((_, ext)) = name.rsplit_once('.') else {
        return false;
    };
    extensions.iter().any(|e| e.eq_ignore_ascii_case(ext))
}

fn read_sidecar_line(path: &Path) -> Option<String> {
    if !path.is_file() {
        return None;
    }
    match fs::read_to_string(path) {
        Ok(contents) => contents.lines().next().map(|l| l.trim().to_string()),
        Err(e) => {
            warn!("Failed to read sidecar file {}: {}", path.display(), e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;

    fn touch(dir: &Path, name: &str) {
        File::create(dir.join(name)).unwrap();
    }

    fn exts() -> Vec<String> {
        vec!["mp4".into(), "mkv".into()]
    }

    #[test]
    fn m3u_keeps_nonexistent_entries() {
        let movies = parse_m3u(
            "#EXTM3U\n/media/a.mp4\n\n/media/missing.mp4\n/media/b_repeat_2x.mp4\n",
        );
        assert_eq!(movies.len(), 3);
        assert_eq!(movies[1].path, PathBuf::from("/media/missing.mp4"));
        assert_eq!(movies[2].repeats, 2);
    }

    #[test]
    fn m3u_whitespace_only_lines_are_skipped() {
        assert!(parse_m3u("   \n\t\n# comment\n").is_empty());
    }

    #[test]
    fn scan_skips_hidden_and_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "b.mp4");
        touch(dir.path(), "a.MKV");
        touch(dir.path(), ".hidden.mp4");
        touch(dir.path(), "notes.txt");
        let outcome = scan_directories(&[dir.path().to_path_buf()], &exts(), None, None);
        let titles: Vec<&str> = outcome.movies.iter().map(|m| m.title.as_str()).collect();
        assert_eq!(titles, ["a", "b"]);
    }

    #[test]
    fn scan_skips_missing_roots() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "a.mp4");
        let roots = vec![
            PathBuf::from("/does/not/exist"),
            dir.path().to_path_buf(),
        ];
        let outcome = scan_directories(&roots, &exts(), None, None);
        assert_eq!(outcome.movies.len(), 1);
    }

    #[test]
    fn scan_reads_sidecar_volumes_last_root_wins() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        let mut f = File::create(first.path().join("hw_vol")).unwrap();
        writeln!(f, "70%").unwrap();
        let mut f = File::create(second.path().join("hw_vol")).unwrap();
        writeln!(f, "55%").unwrap();
        let mut f = File::create(second.path().join("sound_vol")).unwrap();
        writeln!(f, "-600.5").unwrap();
        let roots = vec![first.path().to_path_buf(), second.path().to_path_buf()];
        let outcome = scan_directories(&roots, &exts(), Some("hw_vol"), Some("sound_vol"));
        assert_eq!(outcome.hw_volume.as_deref(), Some("55%"));
        assert_eq!(outcome.sound_volume_mb, Some(-600));
    }

    #[test]
    fn scan_ignores_non_numeric_sound_volume() {
        let dir = tempfile::tempdir().unwrap();
        let mut f = File::create(dir.path().join("sound_vol")).unwrap();
        writeln!(f, "loud").unwrap();
        let outcome =
            scan_directories(&[dir.path().to_path_buf()], &exts(), None, Some("sound_vol"));
        assert_eq!(outcome.sound_volume_mb, None);
    }

    #[test]
    fn extension_match_requires_a_dot() {
        assert!(!extension_matches("mp4", &exts()));
        assert!(extension_matches("clip.MP4", &exts()));
        assert!(!extension_matches("clip.mp3", &exts()));
    }
}
