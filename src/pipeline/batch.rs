//! Storage-ready entity batches produced by classification.
//!
//! One `ClassifiedBatch` per commit event: nine typed `RecordBatch` groups
//! (one per collection) plus the count of operations that failed structural
//! validation. Batches are built fresh per event and handed to fanout
//! consumers behind an `Arc`; nothing here is persisted as-is.

use serde::{Deserialize, Serialize};

/// Operations for one entity kind, split by action.
///
/// `updates` is only ever populated for the kinds that support updates
/// (profiles, lists, feed generators). `deletes` carries full record URIs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordBatch<T> {
    pub creates: Vec<T>,
    pub updates: Vec<T>,
    pub deletes: Vec<String>,
}

impl<T> RecordBatch<T> {
    pub fn new() -> Self {
        Self {
            creates: Vec::new(),
            updates: Vec::new(),
            deletes: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.creates.is_empty() && self.updates.is_empty() && self.deletes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.creates.len() + self.updates.len() + self.deletes.len()
    }
}

impl<T> Default for RecordBatch<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Actor profile, keyed by the owning DID.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileEntity {
    pub uri: String,
    pub cid: String,
    /// DID of the actor the profile describes (the commit repo).
    pub actor: String,
    pub display_name: Option<String>,
    pub description: Option<String>,
}

/// Post with fields derived from the embed union at classification time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostEntity {
    pub uri: String,
    pub cid: String,
    pub author: String,
    pub text: String,
    pub created_at: Option<String>,
    /// URI of the post this replies to, when the post is a reply.
    pub reply_parent: Option<String>,
    pub reply_root: Option<String>,
    /// URI of the quoted record, when the embed carries a record ref.
    pub quote_uri: Option<String>,
    pub image_count: i64,
    /// Per-image alt strings; `None` when the post has no images.
    pub alt_text: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LikeEntity {
    pub uri: String,
    pub cid: String,
    pub author: String,
    pub subject_uri: String,
    /// DID parsed from the subject URI; `None` if the URI is malformed.
    pub subject_author: Option<String>,
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepostEntity {
    pub uri: String,
    pub cid: String,
    pub author: String,
    pub subject_uri: String,
    pub subject_author: Option<String>,
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowEntity {
    pub uri: String,
    pub cid: String,
    pub author: String,
    /// DID of the followed actor.
    pub subject: String,
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockEntity {
    pub uri: String,
    pub cid: String,
    pub author: String,
    pub subject: String,
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListEntity {
    pub uri: String,
    pub cid: String,
    pub author: String,
    pub name: String,
    pub purpose: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListItemEntity {
    pub uri: String,
    pub cid: String,
    pub author: String,
    /// DID added to the list.
    pub subject: String,
    pub list_uri: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedGeneratorEntity {
    pub uri: String,
    pub cid: String,
    pub author: String,
    pub did: String,
    pub display_name: Option<String>,
    pub description: Option<String>,
}

/// Everything classification extracted from one commit event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifiedBatch {
    pub sequence: i64,
    pub repo: String,
    pub profiles: RecordBatch<ProfileEntity>,
    pub posts: RecordBatch<PostEntity>,
    pub likes: RecordBatch<LikeEntity>,
    pub reposts: RecordBatch<RepostEntity>,
    pub follows: RecordBatch<FollowEntity>,
    pub blocks: RecordBatch<BlockEntity>,
    pub lists: RecordBatch<ListEntity>,
    pub list_items: RecordBatch<ListItemEntity>,
    pub feed_generators: RecordBatch<FeedGeneratorEntity>,
    /// Operations dropped by structural validation or unknown collection.
    pub skipped: usize,
}

impl ClassifiedBatch {
    pub fn new(sequence: i64, repo: impl Into<String>) -> Self {
        Self {
            sequence,
            repo: repo.into(),
            profiles: RecordBatch::new(),
            posts: RecordBatch::new(),
            likes: RecordBatch::new(),
            reposts: RecordBatch::new(),
            follows: RecordBatch::new(),
            blocks: RecordBatch::new(),
            lists: RecordBatch::new(),
            list_items: RecordBatch::new(),
            feed_generators: RecordBatch::new(),
            skipped: 0,
        }
    }

    /// True when no kind has any operation (skips don't count).
    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
            && self.posts.is_empty()
            && self.likes.is_empty()
            && self.reposts.is_empty()
            && self.follows.is_empty()
            && self.blocks.is_empty()
            && self.lists.is_empty()
            && self.list_items.is_empty()
            && self.feed_generators.is_empty()
    }

    pub fn operation_count(&self) -> usize {
        self.profiles.len()
            + self.posts.len()
            + self.likes.len()
            + self.reposts.len()
            + self.follows.len()
            + self.blocks.len()
            + self.lists.len()
            + self.list_items.len()
            + self.feed_generators.len()
    }
}
