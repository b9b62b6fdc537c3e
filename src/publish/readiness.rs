//! Local platform-constraint checks on generated content

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Hard platform limit on caption length, in characters
pub const MAX_CAPTION_LENGTH: usize = 2200;

/// Hard platform limit on hashtags per post
pub const MAX_HASHTAGS: usize = 30;

/// Captions longer than this get truncated in feed views
pub const RECOMMENDED_FEED_CAPTION_LENGTH: usize = 125;

/// Format variant a piece of content is published as
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PublishFormat {
    Feed,
    Carousel,
    Reel,
    Story,
}

impl PublishFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            PublishFormat::Feed => "feed",
            PublishFormat::Carousel => "carousel",
            PublishFormat::Reel => "reel",
            PublishFormat::Story => "story",
        }
    }

    /// Caption length beyond which the platform truncates, if it does for this format
    pub fn recommended_caption_length(self) -> Option<usize> {
        match self {
            PublishFormat::Feed | PublishFormat::Carousel => Some(RECOMMENDED_FEED_CAPTION_LENGTH),
            PublishFormat::Reel | PublishFormat::Story => None,
        }
    }
}

impl fmt::Display for PublishFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PublishFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "feed" => Ok(PublishFormat::Feed),
            "carousel" => Ok(PublishFormat::Carousel),
            "reel" => Ok(PublishFormat::Reel),
            "story" => Ok(PublishFormat::Story),
            other => Err(format!("unknown publish format '{}'", other)),
        }
    }
}

/// The measurable parts of a piece of content
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishContent {
    pub content_id: String,
    pub caption_length: usize,
    pub hashtag_count: usize,
    pub format: PublishFormat,
}

impl PublishContent {
    pub fn new(
        content_id: impl Into<String>,
        caption_length: usize,
        hashtag_count: usize,
        format: PublishFormat,
    ) -> Self {
        Self {
            content_id: content_id.into(),
            caption_length,
            hashtag_count,
            format,
        }
    }

    /// Measure a caption: characters are Unicode scalar values
    pub fn from_caption(content_id: impl Into<String>, caption: &str, format: PublishFormat) -> Self {
        Self::new(
            content_id,
            caption.chars().count(),
            count_hashtags(caption),
            format,
        )
    }
}

/// Whitespace-separated tokens of the form `#tag`
pub fn count_hashtags(caption: &str) -> usize {
    caption
        .split_whitespace()
        .filter(|token| {
            token
                .strip_prefix('#')
                .and_then(|rest| rest.chars().next())
                .is_some_and(|c| c != '#')
        })
        .count()
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(tag = "issue", rename_all = "snake_case")]
pub enum BlockingIssue {
    CaptionTooLong { length: usize, limit: usize },
    TooManyHashtags { count: usize, limit: usize },
}

impl fmt::Display for BlockingIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockingIssue::CaptionTooLong { length, limit } => {
                write!(f, "caption is {} characters (limit {})", length, limit)
            }
            BlockingIssue::TooManyHashtags { count, limit } => {
                write!(f, "{} hashtags (limit {})", count, limit)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(tag = "advisory", rename_all = "snake_case")]
pub enum Advisory {
    CaptionBeyondRecommended {
        length: usize,
        recommended: usize,
        format: PublishFormat,
    },
    EmptyCaption,
}

impl fmt::Display for Advisory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Advisory::CaptionBeyondRecommended {
                length,
                recommended,
                format,
            } => write!(
                f,
                "caption is {} characters; {} posts truncate after {}",
                length, format, recommended
            ),
            Advisory::EmptyCaption => f.write_str("caption is empty"),
        }
    }
}

/// Result of evaluating content against platform constraints
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishReadiness {
    pub caption_length: usize,
    pub hashtag_count: usize,
    pub ready: bool,
    pub blocking_issues: BTreeSet<BlockingIssue>,
    pub advisories: BTreeSet<Advisory>,
}

impl PublishReadiness {
    pub fn blocking_summary(&self) -> String {
        self.blocking_issues
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Pure, deterministic readiness evaluation
pub struct PublishReadinessGate;

impl PublishReadinessGate {
    pub fn evaluate(content: &PublishContent) -> PublishReadiness {
        let mut blocking_issues = BTreeSet::new();
        let mut advisories = BTreeSet::new();

        if content.caption_length > MAX_CAPTION_LENGTH {
            blocking_issues.insert(BlockingIssue::CaptionTooLong {
                length: content.caption_length,
                limit: MAX_CAPTION_LENGTH,
            });
        }

        if content.hashtag_count > MAX_HASHTAGS {
            blocking_issues.insert(BlockingIssue::TooManyHashtags {
                count: content.hashtag_count,
                limit: MAX_HASHTAGS,
            });
        }

        if content.caption_length == 0 {
            advisories.insert(Advisory::EmptyCaption);
        } else if let Some(recommended) = content.format.recommended_caption_length() {
            if content.caption_length > recommended {
                advisories.insert(Advisory::CaptionBeyondRecommended {
                    length: content.caption_length,
                    recommended,
                    format: content.format,
                });
            }
        }

        PublishReadiness {
            caption_length: content.caption_length,
            hashtag_count: content.hashtag_count,
            ready: blocking_issues.is_empty(),
            blocking_issues,
            advisories,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn evaluate(length: usize, hashtags: usize, format: PublishFormat) -> PublishReadiness {
        PublishReadinessGate::evaluate(&PublishContent::new("wf-1", length, hashtags, format))
    }

    #[test]
    fn test_limits_are_inclusive() {
        let readiness = evaluate(2200, 30, PublishFormat::Feed);
        assert!(readiness.ready);
        assert!(readiness.blocking_issues.is_empty());
    }

    #[test]
    fn test_caption_too_long_blocks() {
        let readiness = evaluate(2201, 30, PublishFormat::Feed);
        assert!(!readiness.ready);
        assert!(readiness.blocking_issues.contains(&BlockingIssue::CaptionTooLong {
            length: 2201,
            limit: MAX_CAPTION_LENGTH
        }));
        assert_eq!(readiness.blocking_issues.len(), 1);
    }

    #[test]
    fn test_too_many_hashtags_blocks() {
        let readiness = evaluate(100, 31, PublishFormat::Feed);
        assert!(!readiness.ready);
        assert!(readiness.blocking_issues.contains(&BlockingIssue::TooManyHashtags {
            count: 31,
            limit: MAX_HASHTAGS
        }));
    }

    #[test]
    fn test_recommended_band_is_advisory_only() {
        let readiness = evaluate(126, 3, PublishFormat::Feed);
        assert!(readiness.ready);
        assert_eq!(readiness.advisories.len(), 1);
        assert!(matches!(
            readiness.advisories.iter().next(),
            Some(Advisory::CaptionBeyondRecommended { length: 126, .. })
        ));

        let readiness = evaluate(125, 3, PublishFormat::Feed);
        assert!(readiness.advisories.is_empty());

        // Reels are not truncated at the feed band
        let readiness = evaluate(600, 3, PublishFormat::Reel);
        assert!(readiness.advisories.is_empty());
    }

    #[test]
    fn test_empty_caption_advisory() {
        let readiness = evaluate(0, 0, PublishFormat::Story);
        assert!(readiness.ready);
        assert!(readiness.advisories.contains(&Advisory::EmptyCaption));
    }

    #[test]
    fn test_evaluate_is_deterministic() {
        let content = PublishContent::new("wf-1", 3000, 45, PublishFormat::Carousel);
        assert_eq!(
            PublishReadinessGate::evaluate(&content),
            PublishReadinessGate::evaluate(&content)
        );
    }

    #[test]
    fn test_from_caption_measures() {
        let content = PublishContent::from_caption(
            "wf-1",
            "Neue Energie ✨ #energie #morgen ## #  #ruhe",
            PublishFormat::Feed,
        );
        assert_eq!(content.hashtag_count, 3);
        assert_eq!(
            content.caption_length,
            "Neue Energie ✨ #energie #morgen ## #  #ruhe".chars().count()
        );
    }

    #[test]
    fn test_format_parse() {
        assert_eq!("Feed".parse::<PublishFormat>(), Ok(PublishFormat::Feed));
        assert_eq!("reel".parse::<PublishFormat>(), Ok(PublishFormat::Reel));
        assert!("tiktok".parse::<PublishFormat>().is_err());
    }
}
