//! Decoded stream types: commit events, repo operations, record payloads.
//!
//! The wire envelope (CBOR frames, block store) is decoded by the protocol
//! client upstream of this crate; everything here is already logical data.
//! Record payloads arrive as raw `serde_json::Value` and are validated
//! against the typed shapes below at classification time.

use serde::{Deserialize, Serialize};

/// One atomic set of record operations for a single repository.
///
/// `sequence` is strictly increasing per stream and is the resumption
/// cursor. Events are consumed in order and never persisted as-is; only
/// their derived effects reach storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitEvent {
    pub sequence: i64,
    /// DID of the actor whose repository changed.
    pub repo: String,
    pub operations: Vec<RepoOp>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpAction {
    Create,
    Update,
    Delete,
}

/// A single record operation within a commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoOp {
    pub action: OpAction,
    /// `<collection>/<rkey>`, e.g. `app.bsky.feed.post/3kabc`.
    pub path: String,
    /// Decoded record payload; absent for deletes.
    #[serde(default)]
    pub record: Option<serde_json::Value>,
    /// Content address of the record, used as an idempotency/version token.
    #[serde(default)]
    pub cid: Option<String>,
}

impl RepoOp {
    /// Full record URI for this operation within `repo`.
    pub fn uri(&self, repo: &str) -> String {
        format!("at://{}/{}", repo, self.path)
    }
}

/// Entity kinds this pipeline ingests, resolved from the path prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    Profile,
    Post,
    Like,
    Repost,
    Follow,
    Block,
    List,
    ListItem,
    FeedGenerator,
}

impl Collection {
    /// Resolve a collection from an operation path (`<collection>/<rkey>`).
    ///
    /// Returns `None` for collections this pipeline does not track.
    pub fn from_path(path: &str) -> Option<Collection> {
        let prefix = path.split('/').next()?;
        match prefix {
            "app.bsky.actor.profile" => Some(Collection::Profile),
            "app.bsky.feed.post" => Some(Collection::Post),
            "app.bsky.feed.like" => Some(Collection::Like),
            "app.bsky.feed.repost" => Some(Collection::Repost),
            "app.bsky.graph.follow" => Some(Collection::Follow),
            "app.bsky.graph.block" => Some(Collection::Block),
            "app.bsky.graph.list" => Some(Collection::List),
            "app.bsky.graph.listitem" => Some(Collection::ListItem),
            "app.bsky.feed.generator" => Some(Collection::FeedGenerator),
            _ => None,
        }
    }

    /// Only profiles, lists and feed generators ever receive `update` ops.
    pub fn supports_update(&self) -> bool {
        matches!(
            self,
            Collection::Profile | Collection::List | Collection::FeedGenerator
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Profile => "profile",
            Collection::Post => "post",
            Collection::Like => "like",
            Collection::Repost => "repost",
            Collection::Follow => "follow",
            Collection::Block => "block",
            Collection::List => "list",
            Collection::ListItem => "list-item",
            Collection::FeedGenerator => "feed-generator",
        }
    }
}

/// Extract the actor DID from an `at://` record URI.
pub fn actor_from_uri(uri: &str) -> Option<&str> {
    let rest = uri.strip_prefix("at://")?;
    let did = rest.split('/').next()?;
    if did.is_empty() {
        None
    } else {
        Some(did)
    }
}

// ---------------------------------------------------------------------------
// Typed record shapes (structural validation targets for the classifier)
// ---------------------------------------------------------------------------

/// Reference to another record by URI + content address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrongRef {
    pub uri: String,
    #[serde(default)]
    pub cid: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileRecord {
    #[serde(default, rename = "displayName")]
    pub display_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyRef {
    pub parent: StrongRef,
    pub root: StrongRef,
}

/// Post embed payloads form a closed tagged union. Shapes this pipeline
/// does not derive anything from (external links, video) fall into `Other`
/// so an exotic embed never invalidates an otherwise well-formed post.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "$type")]
pub enum PostEmbed {
    #[serde(rename = "app.bsky.embed.images")]
    Images(ImagesEmbed),
    #[serde(rename = "app.bsky.embed.record")]
    Record(RecordEmbed),
    #[serde(rename = "app.bsky.embed.recordWithMedia")]
    RecordWithMedia(RecordWithMediaEmbed),
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImagesEmbed {
    pub images: Vec<ImageItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImageItem {
    #[serde(default)]
    pub alt: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecordEmbed {
    pub record: StrongRef,
}

/// Quote post with attached media: the `record` slot carries the quote
/// target, the `media` slot may carry images.
#[derive(Debug, Clone, Deserialize)]
pub struct RecordWithMediaEmbed {
    pub record: RecordEmbed,
    pub media: MediaEmbed,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "$type")]
pub enum MediaEmbed {
    #[serde(rename = "app.bsky.embed.images")]
    Images(ImagesEmbed),
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PostRecord {
    pub text: String,
    #[serde(default)]
    pub reply: Option<ReplyRef>,
    #[serde(default)]
    pub embed: Option<PostEmbed>,
    #[serde(default, rename = "createdAt")]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LikeRecord {
    pub subject: StrongRef,
    #[serde(default, rename = "createdAt")]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RepostRecord {
    pub subject: StrongRef,
    #[serde(default, rename = "createdAt")]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FollowRecord {
    /// DID of the followed actor.
    pub subject: String,
    #[serde(default, rename = "createdAt")]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BlockRecord {
    /// DID of the blocked actor.
    pub subject: String,
    #[serde(default, rename = "createdAt")]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListRecord {
    pub name: String,
    #[serde(default)]
    pub purpose: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListItemRecord {
    /// DID of the listed actor.
    pub subject: String,
    /// URI of the owning list.
    pub list: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedGeneratorRecord {
    /// Service DID hosting the feed.
    pub did: String,
    #[serde(default, rename = "displayName")]
    pub display_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}
