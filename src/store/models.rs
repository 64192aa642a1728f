use serde::{Deserialize, Serialize};

/// A named group of slides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Folder {
    pub id: i64,
    pub name: String,
    pub created_at: String,
    pub updated_at: String,
    /// Number of slides assigned to this folder
    pub slide_count: i64,
}

/// An uploaded slide file, optionally assigned to a folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Slide {
    pub id: i64,
    /// Sanitized file name, also the slide identifier used by tile routes
    pub filename: String,
    pub created_at: String,
    pub folder_id: Option<i64>,
    pub folder_name: Option<String>,
}

/// A free-text report attached to a slide.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    pub id: i64,
    pub title: String,
    pub content: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Body of a report save: creates a report when `id` is absent, updates it
/// otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReportInput {
    #[serde(default)]
    pub id: Option<i64>,
    pub title: String,
    #[serde(default)]
    pub content: Option<String>,
}
