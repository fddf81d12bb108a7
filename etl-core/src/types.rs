use crate::error::ConfigError;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Placeholder stored in `author_id` when the author is deleted or unknown.
pub const AUTHOR_PLACEHOLDER: &str = "N/A";

/// Calendar format used for post and comment timestamps outside the database.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A search term that partitions extraction, artifacts and storage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Sector(String);

impl Sector {
    /// Sector labels end up in file names, so only `[A-Za-z0-9_-]` is accepted.
    pub fn new(label: impl Into<String>) -> Result<Self, ConfigError> {
        let label = label.into();
        let valid = !label.is_empty()
            && label
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');

        if valid {
            Ok(Self(label))
        } else {
            Err(ConfigError::InvalidValue {
                field: "sectors".to_string(),
                value: label,
            })
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Sector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Sector {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Sector> for String {
    fn from(sector: Sector) -> Self {
        sector.0
    }
}

/// A comment as extracted, addressed only by its position within the post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub comment_order: u32,
    #[serde(with = "timestamp")]
    pub comment_date: NaiveDateTime,
    /// `None` when the source sent something other than a string body.
    pub comment_text: Option<String>,
    pub comment_likes: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanedComment {
    #[serde(flatten)]
    pub comment: Comment,
    pub cleaned_comment_text: String,
}

/// A top-level content item with its ordered comments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostRecord<C> {
    pub post_id: String,
    pub post_title: String,
    pub post_text: String,
    #[serde(with = "timestamp")]
    pub post_date: NaiveDateTime,
    pub nbr_likes: i32,
    pub nbr_reposts: i32,
    pub nbr_characters: i32,
    pub author_id: String,
    pub comments: Vec<C>,
}

pub type Post = PostRecord<Comment>;
pub type CleanedPost = PostRecord<CleanedComment>;

impl<C> PostRecord<C> {
    /// Length of the raw body, counted in characters.
    pub fn character_count(text: &str) -> i32 {
        i32::try_from(text.chars().count()).unwrap_or(i32::MAX)
    }

    /// Rebuilds the post around a new comment list, keeping every post field.
    pub fn map_comments<D>(self, f: impl FnMut(C) -> D) -> PostRecord<D> {
        PostRecord {
            post_id: self.post_id,
            post_title: self.post_title,
            post_text: self.post_text,
            post_date: self.post_date,
            nbr_likes: self.nbr_likes,
            nbr_reposts: self.nbr_reposts,
            nbr_characters: self.nbr_characters,
            author_id: self.author_id,
            comments: self.comments.into_iter().map(f).collect(),
        }
    }
}

/// Output of the extract stage.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentSet {
    pub sector: Sector,
    pub posts: Vec<Post>,
}

impl DocumentSet {
    pub fn new(sector: Sector, posts: Vec<Post>) -> Self {
        Self { sector, posts }
    }

    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }

    pub fn comment_count(&self) -> usize {
        self.posts.iter().map(|p| p.comments.len()).sum()
    }
}

/// Output of the transform stage, handed to the loader.
#[derive(Debug, Clone, PartialEq)]
pub struct CleanedDataset {
    pub sector: Sector,
    pub posts: Vec<CleanedPost>,
}

impl CleanedDataset {
    pub fn comment_count(&self) -> usize {
        self.posts.iter().map(|p| p.comments.len()).sum()
    }

    /// One flat row per comment, posts in order, comments in `comment_order`.
    pub fn rows(&self) -> impl Iterator<Item = CommentRow> + '_ {
        self.posts.iter().flat_map(|post| {
            post.comments.iter().map(move |cleaned| CommentRow {
                post_id: post.post_id.clone(),
                post_title: post.post_title.clone(),
                post_text: post.post_text.clone(),
                post_date: post.post_date,
                nbr_likes: post.nbr_likes,
                nbr_reposts: post.nbr_reposts,
                nbr_characters: post.nbr_characters,
                author_id: post.author_id.clone(),
                comment_order: cleaned.comment.comment_order,
                comment_date: cleaned.comment.comment_date,
                comment_text: cleaned.comment.comment_text.clone(),
                comment_likes: cleaned.comment.comment_likes,
                cleaned_comment_text: cleaned.cleaned_comment_text.clone(),
            })
        })
    }
}

/// A comment joined with the scalar fields of its post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentRow {
    pub post_id: String,
    pub post_title: String,
    pub post_text: String,
    #[serde(with = "timestamp")]
    pub post_date: NaiveDateTime,
    pub nbr_likes: i32,
    pub nbr_reposts: i32,
    pub nbr_characters: i32,
    pub author_id: String,
    pub comment_order: u32,
    #[serde(with = "timestamp")]
    pub comment_date: NaiveDateTime,
    pub comment_text: Option<String>,
    pub comment_likes: i32,
    pub cleaned_comment_text: String,
}

/// Output of the load stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadReport {
    pub inserted: u64,
    /// Rows whose key already existed and were left untouched.
    pub skipped: u64,
}

impl LoadReport {
    pub fn total(&self) -> u64 {
        self.inserted + self.skipped
    }
}

/// Per-sector progress through the four stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SectorState {
    Pending,
    Extracted,
    SchemaReady,
    Transformed,
    Loaded,
}

impl SectorState {
    pub fn next(self) -> Option<SectorState> {
        match self {
            SectorState::Pending => Some(SectorState::Extracted),
            SectorState::Extracted => Some(SectorState::SchemaReady),
            SectorState::SchemaReady => Some(SectorState::Transformed),
            SectorState::Transformed => Some(SectorState::Loaded),
            SectorState::Loaded => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, SectorState::Loaded)
    }
}

impl fmt::Display for SectorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SectorState::Pending => "PENDING",
            SectorState::Extracted => "EXTRACTED",
            SectorState::SchemaReady => "SCHEMA_READY",
            SectorState::Transformed => "TRANSFORMED",
            SectorState::Loaded => "LOADED",
        };
        f.write_str(name)
    }
}

/// Serde adapter writing timestamps as `YYYY-MM-DD HH:MM:SS`.
pub mod timestamp {
    use super::TIMESTAMP_FORMAT;
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.format(TIMESTAMP_FORMAT).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&raw, TIMESTAMP_FORMAT).map_err(serde::de::Error::custom)
    }
}
