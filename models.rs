use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Still,
    Gif,
    Video,
}

impl MediaType {
    pub fn as_str(self) -> &'static str {
        match self {
            MediaType::Still => "still",
            MediaType::Gif => "gif",
            MediaType::Video => "video",
        }
    }
}

impl FromStr for MediaType {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "still" => Ok(MediaType::Still),
            "gif" => Ok(MediaType::Gif),
            "video" => Ok(MediaType::Video),
            other => Err(Error::Validation(format!("unknown media type '{other}'"))),
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cached probe results for a media file. Stored as one row or not at all.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Metadata {
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Duration in seconds; absent for stills.
    #[serde(rename = "length")]
    pub duration: Option<f64>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub title: Option<String>,
}

impl Metadata {
    /// Overlays every field present in `update`, leaving the rest as they were.
    pub fn merge(&mut self, update: &Metadata) {
        if update.width.is_some() {
            self.width = update.width;
        }
        if update.height.is_some() {
            self.height = update.height;
        }
        if update.duration.is_some() {
            self.duration = update.duration;
        }
        if update.artist.is_some() {
            self.artist = update.artist.clone();
        }
        if update.album.is_some() {
            self.album = update.album.clone();
        }
        if update.title.is_some() {
            self.title = update.title.clone();
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Media {
    pub hash: String,
    pub path: String,
    pub rotation: i32,
    #[serde(rename = "type")]
    pub media_type: MediaType,
    pub hash_date: i64,
    pub corrupted: bool,
    pub transcode: bool,
    pub metadata: Option<Metadata>,
    /// Sorted tag names.
    pub tags: Vec<String>,
}

impl Media {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.binary_search_by(|t| t.as_str().cmp(tag)).is_ok()
    }

    /// The directory portion of the stored path, without a trailing separator.
    pub fn directory(&self) -> &str {
        match self.path.rfind(|c: char| c == '/' || c == '\\') {
            Some(idx) => &self.path[..idx],
            None => "",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMedia {
    pub hash: String,
    pub path: String,
    #[serde(default)]
    pub rotation: i32,
    #[serde(rename = "type")]
    pub media_type: MediaType,
    pub hash_date: i64,
}

/// A partial update; only the fields that are present are touched.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MediaUpdate {
    pub path: Option<String>,
    pub rotation: Option<i32>,
    #[serde(rename = "type")]
    pub media_type: Option<MediaType>,
    pub hash_date: Option<i64>,
    pub metadata: Option<Metadata>,
    pub corrupted: Option<bool>,
    pub transcode: Option<bool>,
}

impl MediaUpdate {
    /// The fields needed to create the media when the hash is not yet cataloged.
    pub(crate) fn as_new_media(&self, hash: &str) -> Option<NewMedia> {
        Some(NewMedia {
            hash: hash.to_string(),
            path: self.path.clone()?,
            rotation: self.rotation.unwrap_or(0),
            media_type: self.media_type?,
            hash_date: self.hash_date?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tombstone {
    pub hash: String,
    /// Unix seconds.
    pub time: i64,
}

/// Result of a read whose arity is not known up front.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<T> {
    None,
    One(T),
    Many(Vec<T>),
}

impl<T> Lookup<T> {
    pub fn from_vec(mut rows: Vec<T>) -> Self {
        match rows.len() {
            0 => Lookup::None,
            1 => Lookup::One(rows.remove(0)),
            _ => Lookup::Many(rows),
        }
    }

    pub fn into_vec(self) -> Vec<T> {
        match self {
            Lookup::None => Vec::new(),
            Lookup::One(row) => vec![row],
            Lookup::Many(rows) => rows,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Lookup::None)
    }
}
