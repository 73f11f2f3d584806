//! Song references and locator resolution.
//!
//! A [`Song`] names either a file inside the music directory or a remote URL. The
//! [`SongMapper`] turns it into the concrete locator string the input layer opens.

use std::path::{Path, PathBuf};

/// Where a song's bytes come from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SongLocation {
    /// Local file, relative to the music directory or absolute.
    File(PathBuf),
    /// Remote stream URL.
    Url(String),
}

/// A playable song reference.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Song {
    location: SongLocation,
}

impl Song {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            location: SongLocation::File(path.into()),
        }
    }

    pub fn url(url: impl Into<String>) -> Self {
        Self {
            location: SongLocation::Url(url.into()),
        }
    }

    /// Classify a user-supplied locator: anything with a URI scheme is a URL.
    pub fn parse(locator: &str) -> Self {
        if has_uri_scheme(locator) {
            Self::url(locator)
        } else {
            Self::file(locator)
        }
    }

    pub fn is_file(&self) -> bool {
        matches!(self.location, SongLocation::File(_))
    }

    pub fn location(&self) -> &SongLocation {
        &self.location
    }

    /// Display form used in logs and status output.
    pub fn uri(&self) -> String {
        match &self.location {
            SongLocation::File(p) => p.display().to_string(),
            SongLocation::Url(u) => u.clone(),
        }
    }
}

/// Maps songs to locators the input layer can open.
#[derive(Clone, Debug, Default)]
pub struct SongMapper {
    music_dir: Option<PathBuf>,
}

impl SongMapper {
    pub fn new(music_dir: Option<PathBuf>) -> Self {
        Self { music_dir }
    }

    pub fn music_dir(&self) -> Option<&Path> {
        self.music_dir.as_deref()
    }

    /// Resolve a song to a filesystem path (files) or its URL (streams).
    ///
    /// Relative file paths are joined onto the music directory when one is configured.
    pub fn locator(&self, song: &Song) -> String {
        match song.location() {
            SongLocation::Url(u) => u.clone(),
            SongLocation::File(p) => match &self.music_dir {
                Some(dir) if p.is_relative() => dir.join(p).display().to_string(),
                _ => p.display().to_string(),
            },
        }
    }
}

/// Filename suffix of a locator, lowercased.
///
/// Query strings, fragments and the URL authority are ignored, and only the last path
/// segment is considered, so neither `http://host.example/stream?id=3` nor
/// `http://host.example` has a suffix.
pub fn locator_suffix(locator: &str) -> Option<String> {
    let tail = locator.split(['?', '#']).next().unwrap_or(locator);
    let path = match tail.split_once("://") {
        Some((_, rest)) if has_uri_scheme(tail) => rest.split_once('/').map_or("", |(_, p)| p),
        _ => tail,
    };
    let file = path.rsplit(['/', '\\']).next().unwrap_or(path);
    let mut parts = file.rsplit('.');
    let ext = parts.next()?;
    if parts.next().is_some() && !ext.is_empty() {
        Some(ext.to_ascii_lowercase())
    } else {
        None
    }
}

fn has_uri_scheme(locator: &str) -> bool {
    let Some((scheme, _)) = locator.split_once("://") else {
        return false;
    };
    !scheme.is_empty()
        && scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}
