// Core data structures shared by the monitor, analytics and report layers

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::i18n::t;

/// Entity id used for national-level readings (alerts carry no entity_ref)
pub const NATIONAL_SCOPE: &str = "national";

/// Kind of metric supplied by a [`crate::source::MetricSource`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    /// Candidate support rate (fraction, 0.0 - 1.0)
    SupportRate,
    /// Candidate name recognition (fraction, 0.0 - 1.0)
    RecognitionRate,
    /// Margin between the two leading candidates in the latest poll
    PollMargin,
    /// Media coverage volume (article count)
    MediaCoverage,
    /// Campaign activity volume (event count)
    CampaignActivity,
    /// Social media sentiment (-1.0 to 1.0)
    SocialSentiment,
}

/// How a change between two readings is measured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeMeasure {
    /// `|current - previous|`, for rates and scores
    Absolute,
    /// `current / max(previous, 1)`, for volumes where spikes matter
    Ratio,
}

impl MetricKind {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SupportRate => "support_rate",
            Self::RecognitionRate => "recognition_rate",
            Self::PollMargin => "poll_margin",
            Self::MediaCoverage => "media_coverage",
            Self::CampaignActivity => "campaign_activity",
            Self::SocialSentiment => "social_sentiment",
        }
    }

    /// Get Japanese name
    pub fn japanese_name(&self) -> &'static str {
        match self {
            Self::SupportRate => "支持率",
            Self::RecognitionRate => "知名度",
            Self::PollMargin => "世論調査差",
            Self::MediaCoverage => "メディア露出",
            Self::CampaignActivity => "選挙活動",
            Self::SocialSentiment => "SNS感情",
        }
    }

    /// Get localized name
    pub fn localized_name(&self) -> String {
        match self {
            Self::SupportRate => t!("metric.support_rate").to_string(),
            Self::RecognitionRate => t!("metric.recognition_rate").to_string(),
            Self::PollMargin => t!("metric.poll_margin").to_string(),
            Self::MediaCoverage => t!("metric.media_coverage").to_string(),
            Self::CampaignActivity => t!("metric.campaign_activity").to_string(),
            Self::SocialSentiment => t!("metric.social_sentiment").to_string(),
        }
    }

    /// How changes of this metric are measured
    pub fn measure(&self) -> ChangeMeasure {
        match self {
            Self::MediaCoverage | Self::CampaignActivity => ChangeMeasure::Ratio,
            _ => ChangeMeasure::Absolute,
        }
    }

    /// Base confidence of trend readings for this metric (0.0 - 1.0)
    pub fn base_confidence(&self) -> f64 {
        match self {
            Self::SupportRate => 0.8,
            Self::RecognitionRate => 0.75,
            Self::PollMargin => 0.7,
            Self::MediaCoverage => 0.7,
            Self::CampaignActivity => 0.9,
            Self::SocialSentiment => 0.6,
        }
    }

    /// Get all metric kinds in check order
    pub fn all() -> Vec<Self> {
        vec![
            Self::SupportRate,
            Self::RecognitionRate,
            Self::PollMargin,
            Self::MediaCoverage,
            Self::CampaignActivity,
            Self::SocialSentiment,
        ]
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for MetricKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "support_rate" | "support" => Ok(Self::SupportRate),
            "recognition_rate" | "recognition" => Ok(Self::RecognitionRate),
            "poll_margin" | "poll" => Ok(Self::PollMargin),
            "media_coverage" | "media" => Ok(Self::MediaCoverage),
            "campaign_activity" | "activity" => Ok(Self::CampaignActivity),
            "social_sentiment" | "sentiment" => Ok(Self::SocialSentiment),
            other => Err(format!("unknown metric kind: {other}")),
        }
    }
}

/// Ordered set of entity ids that receive per-entity analysis
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct WatchList {
    entities: Vec<String>,
}

impl WatchList {
    /// Create a watch list, dropping duplicates while keeping first-seen order
    pub fn new<I, S>(entities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let entities = entities
            .into_iter()
            .map(Into::into)
            .filter(|id: &String| !id.trim().is_empty() && seen.insert(id.clone()))
            .collect();
        Self { entities }
    }

    /// Critical constituencies watched by default
    pub fn critical_constituencies() -> Self {
        Self::new(["13001", "13025", "14001", "23001", "27001", "40001"])
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entities.iter().map(String::as_str)
    }

    pub fn contains(&self, entity_id: &str) -> bool {
        self.entities.iter().any(|e| e == entity_id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

impl Default for WatchList {
    fn default() -> Self {
        Self::critical_constituencies()
    }
}

impl From<Vec<String>> for WatchList {
    fn from(entities: Vec<String>) -> Self {
        Self::new(entities)
    }
}

impl From<WatchList> for Vec<String> {
    fn from(list: WatchList) -> Self {
        list.entities
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_kind_roundtrip_str() {
        for kind in MetricKind::all() {
            assert_eq!(kind.as_str().parse::<MetricKind>().unwrap(), kind);
        }
        assert!("turnout".parse::<MetricKind>().is_err());
    }

    #[test]
    fn test_metric_kind_measure() {
        assert_eq!(MetricKind::SupportRate.measure(), ChangeMeasure::Absolute);
        assert_eq!(MetricKind::MediaCoverage.measure(), ChangeMeasure::Ratio);
        assert_eq!(MetricKind::CampaignActivity.measure(), ChangeMeasure::Ratio);
    }

    #[test]
    fn test_localized_names_are_distinct() {
        let names: HashSet<String> = MetricKind::all().iter().map(|k| k.localized_name()).collect();
        assert_eq!(names.len(), MetricKind::all().len());
        assert!(names.iter().all(|n| !n.starts_with("metric.")));
    }

    #[test]
    fn test_watch_list_dedup_keeps_order() {
        let list = WatchList::new(["27001", "13001", "27001", " ", "40001"]);
        let ids: Vec<_> = list.iter().collect();
        assert_eq!(ids, vec!["27001", "13001", "40001"]);
        assert!(list.contains("13001"));
        assert!(!list.contains("99999"));
    }

    #[test]
    fn test_watch_list_serde_as_array() {
        let list = WatchList::new(["13001", "14001"]);
        let json = serde_json::to_string(&list).unwrap();
        assert_eq!(json, r#"["13001","14001"]"#);

        let back: WatchList = serde_json::from_str(r#"["a","a","b"]"#).unwrap();
        assert_eq!(back.len(), 2);
    }

    #[test]
    fn test_default_watch_list() {
        let list = WatchList::default();
        assert_eq!(list.len(), 6);
        assert_eq!(list.iter().next(), Some("13001"));
    }
}
