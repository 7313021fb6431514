//! Data models for the feed collector.
//!
//! This module contains the core data structures shared by the fetcher,
//! the collection store and the analysis pass: posts, authors, the
//! accumulated collection and the analysis report.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

/// A single post, immutable once fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    /// Post identity, unique per author.
    #[serde(deserialize_with = "id_from_str_or_int")]
    pub id: String,
    /// Post body.
    pub text: String,
    /// Creation time (RFC 3339 on disk).
    pub created_at: DateTime<Utc>,
    /// Engagement counters (likes, reposts, replies, ...).
    #[serde(default)]
    pub metrics: BTreeMap<String, i64>,
}

/// An author and the posts observed from them, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    /// Author identity, unique across the collection.
    #[serde(deserialize_with = "id_from_str_or_int")]
    pub user_id: String,
    /// Handle without the leading `@`.
    pub username: String,
    /// Display name.
    #[serde(rename = "name", default)]
    pub display_name: String,
    /// Profile bio.
    #[serde(rename = "description", default)]
    pub bio: String,
    /// Posts in the order they were first seen.
    #[serde(default)]
    pub posts: Vec<Post>,
}

/// Oldest and newest post timestamps in a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub oldest: DateTime<Utc>,
    pub newest: DateTime<Utc>,
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "From {} to {}",
            self.oldest.to_rfc3339(),
            self.newest.to_rfc3339()
        )
    }
}

/// The accumulated, deduplicated set of posts since the last archive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collection {
    /// Authors in first-sighting order.
    #[serde(rename = "users_data", default)]
    pub users: Vec<Author>,
    /// Derived: sum of per-author post counts.
    #[serde(rename = "total_posts", default)]
    pub total_post_count: usize,
    /// Derived at analysis time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_range: Option<TimeRange>,
}

impl Collection {
    /// Create an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether any posts are waiting to be analyzed.
    pub fn has_pending(&self) -> bool {
        self.total_post_count > 0
    }

    /// Recompute `total_post_count` from the authors.
    pub fn recount(&mut self) {
        self.total_post_count = self.users.iter().map(|u| u.posts.len()).sum();
    }

    /// Merge a batch of authors into the collection.
    ///
    /// Known authors get only the posts whose identity they have not seen
    /// yet, appended in arrival order. Unknown authors are inserted with
    /// their (deduplicated) posts. Returns the number of posts added.
    pub fn merge(&mut self, batch: Vec<Author>) -> usize {
        let mut index: HashMap<String, usize> = self
            .users
            .iter()
            .enumerate()
            .map(|(i, u)| (u.user_id.clone(), i))
            .collect();

        let before = self.total_post_count;

        for incoming in batch {
            match index.get(&incoming.user_id) {
                Some(&pos) => {
                    let existing = &mut self.users[pos];
                    let mut seen: HashSet<String> =
                        existing.posts.iter().map(|p| p.id.clone()).collect();
                    for post in incoming.posts {
                        if seen.insert(post.id.clone()) {
                            existing.posts.push(post);
                        }
                    }
                }
                None => {
                    let mut author = incoming;
                    let mut seen = HashSet::new();
                    author.posts.retain(|p| seen.insert(p.id.clone()));
                    index.insert(author.user_id.clone(), self.users.len());
                    self.users.push(author);
                }
            }
        }

        self.recount();
        self.total_post_count.saturating_sub(before)
    }

    /// Compute the oldest/newest `created_at` across all posts.
    ///
    /// Returns `None` for an empty collection.
    pub fn compute_time_range(&self) -> Option<TimeRange> {
        let mut stamps: Vec<DateTime<Utc>> = self
            .users
            .iter()
            .flat_map(|u| u.posts.iter().map(|p| p.created_at))
            .collect();
        stamps.sort();

        Some(TimeRange {
            oldest: *stamps.first()?,
            newest: *stamps.last()?,
        })
    }
}

/// Result of a successful LLM analysis pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    /// Model output.
    pub analysis_text: String,
    /// Number of authors in the analyzed collection.
    pub user_count: usize,
    /// Number of posts in the analyzed collection.
    pub total_posts: usize,
    /// Time span of the analyzed posts.
    pub time_range: Option<TimeRange>,
    /// Name of the model that produced the analysis.
    pub model: String,
    /// When the analysis completed.
    pub generated_at: DateTime<Utc>,
}

/// Accept identities written either as JSON strings or integers.
fn id_from_str_or_int<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Int(u64),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(s) => s,
        RawId::Int(n) => n.to_string(),
    })
}


#[cfg(test)]
mod tests {
    use super::fixtures::{author, post};
    use super::*;

    fn pairs(collection: &Collection) -> Vec<(String, String)> {
        collection
            .users
            .iter()
            .flat_map(|u| u.posts.iter().map(|p| (u.user_id.clone(), p.id.clone())))
            .collect()
    }

    #[test]
    fn test_merge_two_authors_into_empty() {
        let mut collection = Collection::new();
        let added = collection.merge(vec![
            author("1", vec![post("a", 1), post("b", 5), post("c", 3)]),
            author("2", vec![post("d", 9), post("e", 0), post("f", 4)]),
        ]);

        assert_eq!(added, 6);
        assert_eq!(collection.total_post_count, 6);

        let range = collection.compute_time_range().unwrap();
        assert_eq!(range.oldest, post("e", 0).created_at);
        assert_eq!(range.newest, post("d", 9).created_at);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let batch = vec![
            author("1", vec![post("a", 1), post("b", 2)]),
            author("2", vec![post("c", 3)]),
        ];

        let mut once = Collection::new();
        once.merge(batch.clone());

        let mut twice = once.clone();
        let added = twice.merge(batch);

        assert_eq!(added, 0);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_merge_sequence_equals_deduplicated_union() {
        let b1 = vec![
            author("1", vec![post("a", 1), post("b", 2)]),
            author("2", vec![post("c", 3)]),
        ];
        let b2 = vec![
            author("1", vec![post("b", 2), post("x", 7)]),
            author("3", vec![post("y", 8)]),
        ];

        let mut sequential = Collection::new();
        sequential.merge(b1.clone());
        sequential.merge(b2.clone());

        let mut union = Collection::new();
        union.merge(b1.into_iter().chain(b2).collect());

        assert_eq!(sequential, union);
        assert_eq!(sequential.total_post_count, 5);
    }

    #[test]
    fn test_merge_keeps_existing_order_and_appends() {
        let mut collection = Collection::new();
        collection.merge(vec![author("1", vec![post("b", 2), post("a", 1)])]);
        collection.merge(vec![author("1", vec![post("c", 0), post("a", 1)])]);

        let ids: Vec<&str> = collection.users[0]
            .posts
            .iter()
            .map(|p| p.id.as_str())
            .collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_merge_never_duplicates_pairs() {
        let mut collection = Collection::new();
        collection.merge(vec![
            author("1", vec![post("a", 1), post("a", 1)]),
            author("1", vec![post("a", 1), post("b", 2)]),
            author("2", vec![post("a", 1)]),
        ]);
        collection.merge(vec![author("2", vec![post("a", 1), post("a", 1)])]);

        let all = pairs(&collection);
        let unique: HashSet<_> = all.iter().cloned().collect();
        assert_eq!(all.len(), unique.len());
        assert_eq!(all.len(), 3);
        assert_eq!(
            collection.total_post_count,
            collection.users.iter().map(|u| u.posts.len()).sum::<usize>()
        );
    }

    #[test]
    fn test_time_range_empty() {
        assert!(Collection::new().compute_time_range().is_none());
        let mut collection = Collection::new();
        collection.merge(vec![author("1", vec![])]);
        assert!(collection.compute_time_range().is_none());
    }

    #[test]
    fn test_parse_integer_ids() {
        let json = r#"{
            "users_data": [{
                "user_id": 12345,
                "username": "someone",
                "name": "Some One",
                "description": "bio",
                "posts": [{
                    "id": 987654321,
                    "text": "hello",
                    "created_at": "2025-03-01T12:00:00+00:00",
                    "metrics": {"like_count": 3}
                }]
            }],
            "total_posts": 1
        }"#;

        let collection: Collection = serde_json::from_str(json).unwrap();
        assert_eq!(collection.users[0].user_id, "12345");
        assert_eq!(collection.users[0].posts[0].id, "987654321");
        assert_eq!(collection.users[0].display_name, "Some One");
        assert_eq!(collection.users[0].bio, "bio");
    }

    #[test]
    fn test_serialized_field_names() {
        let mut collection = Collection::new();
        collection.merge(vec![author("1", vec![post("a", 1)])]);
        let value = serde_json::to_value(&collection).unwrap();

        assert_eq!(value["total_posts"], 1);
        assert_eq!(value["users_data"][0]["name"], "User 1");
        assert!(value.get("time_range").is_none());
    }
}
