//! Movie and playlist value types.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, Mutex};

use rand::Rng;
use regex::Regex;

static REPEAT_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)_repeat_([0-9]+)x").expect("repeat pattern is valid"));

/// Shared slot remembering the last-played playlist index across rebuilds.
///
/// Playlists are thrown away and rebuilt whenever the file source changes;
/// the slot outlives them so `resume_playlist` can pick up where the old
/// playlist left off.
pub type ResumeSlot = Arc<Mutex<Option<usize>>>;

pub fn new_resume_slot() -> ResumeSlot {
    Arc::new(Mutex::new(None))
}

/// One playable media item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Movie {
    pub path: PathBuf,
    /// File name without extension.
    pub title: String,
    /// How often the item plays before the playlist advances. Parsed from a
    /// `_repeat_<N>x` filename suffix, defaults to 1.
    pub repeats: u32,
    /// How often playback of this item has started in the current round.
    pub playcount: u32,
}

impl Movie {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        let title = Path::new(&file_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&file_name)
            .to_string();
        let repeats = REPEAT_PATTERN
            .captures(&file_name)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<u32>().ok())
            .filter(|&n| n > 0)
            .unwrap_or(1);
        Self {
            path,
            title,
            repeats,
            playcount: 0,
        }
    }

    pub fn was_played(&mut self) {
        self.playcount += 1;
    }

    pub fn clear_playcount(&mut self) {
        self.playcount = 0;
    }

    /// The current repeat round is complete.
    pub fn finished(&self) -> bool {
        self.playcount >= self.repeats
    }
}

impl fmt::Display for Movie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.repeats > 1 {
            write!(f, "{} ({}x)", self.path.display(), self.repeats)
        } else {
            write!(f, "{}", self.path.display())
        }
    }
}

/// An ordered, resumable traversal over movies.
///
/// A playlist is immutable once built; when the file source changes the
/// orchestrator discards it and builds a fresh one. Only the cursor and the
/// shared resume slot move.
#[derive(Debug)]
pub struct Playlist {
    movies: Vec<Movie>,
    index: Option<usize>,
    resume: ResumeSlot,
}

impl Playlist {
    pub fn new(movies: Vec<Movie>, resume: ResumeSlot) -> Self {
        Self {
            movies,
            index: None,
            resume,
        }
    }

    pub fn length(&self) -> usize {
        self.movies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.movies.is_empty()
    }

    /// Hand out the next movie to play, or `None` when the playlist is empty.
    ///
    /// Sequential mode advances circularly. Random mode picks uniformly but
    /// never repeats the current item when there is more than one. With
    /// `resume` enabled the first call after a (re)build starts at the
    /// remembered position instead of the beginning.
    pub fn get_next(&mut self, random: bool, resume: bool) -> Option<Movie> {
        if self.movies.is_empty() {
            return None;
        }
        let len = self.movies.len();
        let next = if random {
            let mut rng = rand::thread_rng();
            if len == 1 {
                0
            } else {
                loop {
                    let candidate = rng.gen_range(0..len);
                    if Some(candidate) != self.index {
                        break candidate;
                    }
                }
            }
        } else {
            match self.index {
                Some(current) => (current + 1) % len,
                None => {
                    let remembered = if resume {
                        *self.resume.lock().unwrap()
                    } else {
                        None
                    };
                    match remembered {
                        Some(position) if position < len => position,
                        _ => 0,
                    }
                }
            }
        };
        self.index = Some(next);
        *self.resume.lock().unwrap() = Some(next);
        Some(self.movies[next].clone())
    }
}
