use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_RESULTS: u32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ContentType {
    All,
    #[default]
    LongForm,
    Shorts,
}

impl ContentType {
    pub fn as_str(self) -> &'static str {
        match self {
            ContentType::All => "all",
            ContentType::LongForm => "longForm",
            ContentType::Shorts => "shorts",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortOrder {
    #[default]
    Latest,
    BestMatch,
    MostViews,
    TopRated,
}

impl SortOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            SortOrder::Latest => "latest",
            SortOrder::BestMatch => "bestMatch",
            SortOrder::MostViews => "mostViews",
            SortOrder::TopRated => "topRated",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown option `{0}`")]
pub struct UnknownOption(pub String);

impl FromStr for ContentType {
    type Err = UnknownOption;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [ContentType::All, ContentType::LongForm, ContentType::Shorts]
            .into_iter()
            .find(|candidate| candidate.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownOption(s.to_string()))
    }
}

impl FromStr for SortOrder {
    type Err = UnknownOption;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            SortOrder::Latest,
            SortOrder::BestMatch,
            SortOrder::MostViews,
            SortOrder::TopRated,
        ]
        .into_iter()
        .find(|candidate| candidate.as_str().eq_ignore_ascii_case(s))
        .ok_or_else(|| UnknownOption(s.to_string()))
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub query: String,
    pub content_type: Option<ContentType>,
    pub sort: Option<SortOrder>,
    pub viral_score: Option<u32>,
    pub min_views: Option<u64>,
    pub max_results: Option<u32>,
}

impl SearchQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            content_type: None,
            sort: None,
            viral_score: None,
            min_views: None,
            max_results: Some(DEFAULT_MAX_RESULTS),
        }
    }

    pub fn is_blank(&self) -> bool {
        self.query.trim().is_empty()
    }

    /// Query-string pairs in request order. Unset and zero-valued numeric
    /// filters are left out.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![("query", self.query.trim().to_string())];
        if let Some(content_type) = self.content_type {
            pairs.push(("contentType", content_type.as_str().to_string()));
        }
        if let Some(sort) = self.sort {
            pairs.push(("sort", sort.as_str().to_string()));
        }
        if let Some(score) = self.viral_score.filter(|score| *score > 0) {
            pairs.push(("viralScore", score.to_string()));
        }
        if let Some(views) = self.min_views.filter(|views| *views > 0) {
            pairs.push(("minViews", views.to_string()));
        }
        if let Some(max) = self.max_results.filter(|max| *max > 0) {
            pairs.push(("maxResults", max.to_string()));
        }
        pairs
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VideoResult {
    pub id: String,
    pub video_url: String,
    pub title: String,
    pub thumbnail: String,
    pub channel: String,
    pub channel_url: String,
    pub views: u64,
    pub subscribers: u64,
    pub outlier_score: f64,
    pub view_to_sub_ratio: f64,
    pub published_at: String,
    pub duration_mins: f64,
    pub is_short: bool,
}
