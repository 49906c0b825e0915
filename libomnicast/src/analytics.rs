//! Platform-agnostic post analytics
//!
//! Providers report metrics under their own names and each platform only
//! produces a subset of them. Everything written to a stored post passes
//! through [`clean_analytics_for_platform`], which renames provider fields to
//! canonical ones and drops anything outside the platform's allowlist.
//! Engagement is derived on read by [`calculate_engagement`] and never stored.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::{PlatformKind, PostType};

/// Metrics as reported by a provider, keyed by provider or canonical name
pub type RawMetrics = BTreeMap<String, i64>;

/// Analytics sub-document stored on a post
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostAnalytics {
    #[serde(flatten)]
    pub metrics: BTreeMap<String, i64>,
    #[serde(rename = "lastUpdated")]
    pub last_updated: i64,
}

impl PostAnalytics {
    pub fn get(&self, metric: &str) -> i64 {
        self.metrics.get(metric).copied().unwrap_or(0)
    }
}

const NO_FIELDS: &[&str] = &[];
const INSTAGRAM_FIELDS: &[&str] = &["likes", "comments", "saves", "shares", "reach", "impressions"];
const INSTAGRAM_REEL_FIELDS: &[&str] = &["plays", "views"];
const FACEBOOK_FIELDS: &[&str] = &[
    "likes",
    "comments",
    "shares",
    "reactions",
    "reach",
    "impressions",
    "clicks",
];
const FACEBOOK_VIDEO_FIELDS: &[&str] = &["views"];
const LINKEDIN_FIELDS: &[&str] = &["likes", "comments", "shares", "impressions", "clicks", "reach"];
const YOUTUBE_FIELDS: &[&str] = &[
    "views",
    "likes",
    "comments",
    "shares",
    "watchTime",
    "subscribersGained",
];

/// Provider field name → canonical metric name
const RENAMES: &[(&str, &str)] = &[
    ("saved", "saves"),
    ("like_count", "likes"),
    ("comments_count", "comments"),
    ("ig_reels_aggregated_all_plays_count", "plays"),
    ("total_video_views", "views"),
    ("post_impressions", "impressions"),
    ("post_impressions_unique", "reach"),
    ("post_clicks", "clicks"),
    ("viewCount", "views"),
    ("likeCount", "likes"),
    ("commentCount", "comments"),
    ("estimatedMinutesWatched", "watchTime"),
    ("totalShareStatistics", "shares"),
];

/// Whether `metric` can be produced for a post of this platform and type
pub fn is_allowed(platform: PlatformKind, metric: &str, post_type: PostType) -> bool {
    let (base, extra): (&[&str], &[&str]) = match platform {
        PlatformKind::Instagram => (
            INSTAGRAM_FIELDS,
            if post_type == PostType::Reel {
                INSTAGRAM_REEL_FIELDS
            } else {
                NO_FIELDS
            },
        ),
        PlatformKind::Facebook => (
            FACEBOOK_FIELDS,
            if post_type.is_video() {
                FACEBOOK_VIDEO_FIELDS
            } else {
                NO_FIELDS
            },
        ),
        PlatformKind::LinkedIn => (LINKEDIN_FIELDS, NO_FIELDS),
        PlatformKind::YouTube => (YOUTUBE_FIELDS, NO_FIELDS),
    };
    base.contains(&metric) || extra.contains(&metric)
}

fn canonical_name(field: &str) -> &str {
    RENAMES
        .iter()
        .find(|(from, _)| *from == field)
        .map(|(_, to)| *to)
        .unwrap_or(field)
}

/// Normalize raw provider metrics into the stored analytics document.
///
/// A canonical field reported directly wins over a renamed alias of it.
pub fn clean_analytics_for_platform(
    platform: PlatformKind,
    raw: &RawMetrics,
    post_type: PostType,
) -> PostAnalytics {
    let mut metrics = BTreeMap::new();

    for (field, value) in raw {
        let name = canonical_name(field);
        if !is_allowed(platform, name, post_type) {
            continue;
        }
        if name == field.as_str() {
            metrics.insert(name.to_string(), *value);
        } else {
            metrics.entry(name.to_string()).or_insert(*value);
        }
    }

    PostAnalytics {
        metrics,
        last_updated: chrono::Utc::now().timestamp(),
    }
}

/// Total interactions on a post, derived from its stored analytics
pub fn calculate_engagement(
    platform: PlatformKind,
    analytics: &PostAnalytics,
    post_type: PostType,
) -> i64 {
    let base = analytics.get("likes") + analytics.get("comments");
    match platform {
        PlatformKind::Instagram => {
            let shares = if post_type == PostType::Reel {
                analytics.get("shares")
            } else {
                0
            };
            base + analytics.get("saves") + shares
        }
        PlatformKind::Facebook | PlatformKind::LinkedIn | PlatformKind::YouTube => {
            base + analytics.get("shares")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(pairs: &[(&str, i64)]) -> RawMetrics {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_instagram_post_drops_views_and_renames_saved() {
        let cleaned = clean_analytics_for_platform(
            PlatformKind::Instagram,
            &raw(&[("views", 5), ("saved", 3)]),
            "post".parse().unwrap(),
        );

        assert_eq!(cleaned.metrics, raw(&[("saves", 3)]));
        assert!(cleaned.last_updated > 0);
    }

    #[test]
    fn test_instagram_reel_keeps_views_and_plays() {
        let cleaned = clean_analytics_for_platform(
            PlatformKind::Instagram,
            &raw(&[("views", 50), ("ig_reels_aggregated_all_plays_count", 70)]),
            PostType::Reel,
        );
        assert_eq!(cleaned.get("views"), 50);
        assert_eq!(cleaned.get("plays"), 70);
    }

    #[test]
    fn test_facebook_non_video_drops_views() {
        let cleaned = clean_analytics_for_platform(
            PlatformKind::Facebook,
            &raw(&[("views", 10)]),
            PostType::Text,
        );
        assert!(cleaned.metrics.is_empty());

        let video = clean_analytics_for_platform(
            PlatformKind::Facebook,
            &raw(&[("total_video_views", 10)]),
            PostType::Video,
        );
        assert_eq!(video.get("views"), 10);
    }

    #[test]
    fn test_youtube_renames_statistics() {
        let cleaned = clean_analytics_for_platform(
            PlatformKind::YouTube,
            &raw(&[
                ("viewCount", 100),
                ("likeCount", 7),
                ("commentCount", 2),
                ("estimatedMinutesWatched", 40),
                ("favoriteCount", 1),
            ]),
            PostType::Video,
        );
        assert_eq!(
            cleaned.metrics,
            raw(&[("comments", 2), ("likes", 7), ("views", 100), ("watchTime", 40)])
        );
    }

    #[test]
    fn test_canonical_field_wins_over_alias() {
        let cleaned = clean_analytics_for_platform(
            PlatformKind::Instagram,
            &raw(&[("like_count", 4), ("likes", 9)]),
            PostType::Image,
        );
        assert_eq!(cleaned.get("likes"), 9);
    }

    #[test]
    fn test_linkedin_drops_saves() {
        let cleaned = clean_analytics_for_platform(
            PlatformKind::LinkedIn,
            &raw(&[("likes", 1), ("saves", 5)]),
            PostType::Text,
        );
        assert_eq!(cleaned.metrics, raw(&[("likes", 1)]));
    }

    #[test]
    fn test_engagement_instagram() {
        let analytics = PostAnalytics {
            metrics: raw(&[("likes", 10), ("comments", 2), ("saves", 3), ("shares", 4)]),
            last_updated: 0,
        };
        assert_eq!(
            calculate_engagement(PlatformKind::Instagram, &analytics, PostType::Image),
            15
        );
        assert_eq!(
            calculate_engagement(PlatformKind::Instagram, &analytics, PostType::Reel),
            19
        );
    }

    #[test]
    fn test_engagement_other_platforms() {
        let analytics = PostAnalytics {
            metrics: raw(&[("likes", 10), ("comments", 2), ("saves", 3), ("shares", 4)]),
            last_updated: 0,
        };
        for platform in [
            PlatformKind::Facebook,
            PlatformKind::LinkedIn,
            PlatformKind::YouTube,
        ] {
            assert_eq!(
                calculate_engagement(platform, &analytics, PostType::Text),
                16
            );
        }
    }

    #[test]
    fn test_analytics_document_json_shape() {
        let analytics = PostAnalytics {
            metrics: raw(&[("saves", 3)]),
            last_updated: 1_700_000_000,
        };
        let json = serde_json::to_value(&analytics).unwrap();
        assert_eq!(json, serde_json::json!({"saves": 3, "lastUpdated": 1_700_000_000}));

        let back: PostAnalytics = serde_json::from_value(json).unwrap();
        assert_eq!(back, analytics);
    }
}
