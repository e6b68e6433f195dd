//! Operation classification: one commit event in, one typed batch out.
//!
//! Pure and synchronous; no I/O. Structural validation happens here (typed
//! deserialization of the raw record payload) so that everything downstream
//! works with well-formed entities only. A malformed or unrecognised
//! operation is counted in `skipped` and never fails the event.

use crate::firehose_core::types::{
    actor_from_uri, BlockRecord, Collection, CommitEvent, FeedGeneratorRecord, FollowRecord,
    LikeRecord, ListItemRecord, ListRecord, MediaEmbed, OpAction, PostEmbed, PostRecord,
    ProfileRecord, RepoOp, RepostRecord,
};
use crate::pipeline::batch::{
    BlockEntity, ClassifiedBatch, FeedGeneratorEntity, FollowEntity, LikeEntity, ListEntity,
    ListItemEntity, PostEntity, ProfileEntity, RepostEntity,
};

/// Classify every operation of a commit event into typed entity batches.
///
/// Output order within each kind matches input operation order. Updates on
/// kinds that never receive them are dropped and counted.
pub fn classify(event: &CommitEvent) -> ClassifiedBatch {
    let mut batch = ClassifiedBatch::new(event.sequence, event.repo.clone());

    for op in &event.operations {
        let collection = match Collection::from_path(&op.path) {
            Some(collection) => collection,
            None => {
                log::debug!("Skipping untracked collection: {}", op.path);
                batch.skipped += 1;
                continue;
            }
        };

        match op.action {
            OpAction::Delete => {
                let uri = op.uri(&event.repo);
                match collection {
                    Collection::Profile => batch.profiles.deletes.push(uri),
                    Collection::Post => batch.posts.deletes.push(uri),
                    Collection::Like => batch.likes.deletes.push(uri),
                    Collection::Repost => batch.reposts.deletes.push(uri),
                    Collection::Follow => batch.follows.deletes.push(uri),
                    Collection::Block => batch.blocks.deletes.push(uri),
                    Collection::List => batch.lists.deletes.push(uri),
                    Collection::ListItem => batch.list_items.deletes.push(uri),
                    Collection::FeedGenerator => batch.feed_generators.deletes.push(uri),
                }
            }
            OpAction::Create | OpAction::Update => {
                if op.action == OpAction::Update && !collection.supports_update() {
                    log::warn!(
                        "Dropping update on {} record {} (kind never receives updates)",
                        collection.as_str(),
                        op.path
                    );
                    batch.skipped += 1;
                    continue;
                }
                if !classify_write(&mut batch, event, op, collection) {
                    batch.skipped += 1;
                }
            }
        }
    }

    batch
}

/// Validate and push one create/update. Returns false when the operation is
/// structurally invalid (missing payload or cid, or a shape mismatch).
fn classify_write(
    batch: &mut ClassifiedBatch,
    event: &CommitEvent,
    op: &RepoOp,
    collection: Collection,
) -> bool {
    let uri = op.uri(&event.repo);
    let (record, cid) = match (op.record.as_ref(), op.cid.as_ref()) {
        (Some(record), Some(cid)) => (record, cid),
        _ => {
            log::warn!("{} write without record or cid: {}", collection.as_str(), uri);
            return false;
        }
    };
    let cid = cid.clone();
    let author = event.repo.clone();
    let is_update = op.action == OpAction::Update;

    match collection {
        Collection::Profile => match serde_json::from_value::<ProfileRecord>(record.clone()) {
            Ok(rec) => {
                let entity = ProfileEntity {
                    uri,
                    cid,
                    actor: author,
                    display_name: rec.display_name,
                    description: rec.description,
                };
                if is_update {
                    batch.profiles.updates.push(entity);
                } else {
                    batch.profiles.creates.push(entity);
                }
                true
            }
            Err(e) => reject(collection, &uri, e),
        },
        Collection::Post => match serde_json::from_value::<PostRecord>(record.clone()) {
            Ok(rec) => {
                batch.posts.creates.push(derive_post(uri, cid, author, rec));
                true
            }
            Err(e) => reject(collection, &uri, e),
        },
        Collection::Like => match serde_json::from_value::<LikeRecord>(record.clone()) {
            Ok(rec) => {
                let subject_author = actor_from_uri(&rec.subject.uri).map(str::to_string);
                batch.likes.creates.push(LikeEntity {
                    uri,
                    cid,
                    author,
                    subject_uri: rec.subject.uri,
                    subject_author,
                    created_at: rec.created_at,
                });
                true
            }
            Err(e) => reject(collection, &uri, e),
        },
        Collection::Repost => match serde_json::from_value::<RepostRecord>(record.clone()) {
            Ok(rec) => {
                let subject_author = actor_from_uri(&rec.subject.uri).map(str::to_string);
                batch.reposts.creates.push(RepostEntity {
                    uri,
                    cid,
                    author,
                    subject_uri: rec.subject.uri,
                    subject_author,
                    created_at: rec.created_at,
                });
                true
            }
            Err(e) => reject(collection, &uri, e),
        },
        Collection::Follow => match serde_json::from_value::<FollowRecord>(record.clone()) {
            Ok(rec) => {
                batch.follows.creates.push(FollowEntity {
                    uri,
                    cid,
                    author,
                    subject: rec.subject,
                    created_at: rec.created_at,
                });
                true
            }
            Err(e) => reject(collection, &uri, e),
        },
        Collection::Block => match serde_json::from_value::<BlockRecord>(record.clone()) {
            Ok(rec) => {
                batch.blocks.creates.push(BlockEntity {
                    uri,
                    cid,
                    author,
                    subject: rec.subject,
                    created_at: rec.created_at,
                });
                true
            }
            Err(e) => reject(collection, &uri, e),
        },
        Collection::List => match serde_json::from_value::<ListRecord>(record.clone()) {
            Ok(rec) => {
                let entity = ListEntity {
                    uri,
                    cid,
                    author,
                    name: rec.name,
                    purpose: rec.purpose,
                    description: rec.description,
                };
                if is_update {
                    batch.lists.updates.push(entity);
                } else {
                    batch.lists.creates.push(entity);
                }
                true
            }
            Err(e) => reject(collection, &uri, e),
        },
        Collection::ListItem => match serde_json::from_value::<ListItemRecord>(record.clone()) {
            Ok(rec) => {
                batch.list_items.creates.push(ListItemEntity {
                    uri,
                    cid,
                    author,
                    subject: rec.subject,
                    list_uri: rec.list,
                });
                true
            }
            Err(e) => reject(collection, &uri, e),
        },
        Collection::FeedGenerator => {
            match serde_json::from_value::<FeedGeneratorRecord>(record.clone()) {
                Ok(rec) => {
                    let entity = FeedGeneratorEntity {
                        uri,
                        cid,
                        author,
                        did: rec.did,
                        display_name: rec.display_name,
                        description: rec.description,
                    };
                    if is_update {
                        batch.feed_generators.updates.push(entity);
                    } else {
                        batch.feed_generators.creates.push(entity);
                    }
                    true
                }
                Err(e) => reject(collection, &uri, e),
            }
        }
    }
}

fn reject(collection: Collection, uri: &str, e: serde_json::Error) -> bool {
    log::warn!("Malformed {} record {}: {}", collection.as_str(), uri, e);
    false
}

/// Derive post fields from the embed union.
///
/// Checked in fixed priority: a bare record ref yields a quote only; a
/// record+media composite yields the quote from the record slot and images
/// from the media slot; a flat images embed yields images only; anything
/// else yields neither.
fn derive_post(uri: String, cid: String, author: String, rec: PostRecord) -> PostEntity {
    let (quote_uri, image_count, alt_text) = match rec.embed {
        Some(PostEmbed::Record(embed)) => (Some(embed.record.uri), 0, None),
        Some(PostEmbed::RecordWithMedia(embed)) => {
            let quote = Some(embed.record.record.uri);
            match embed.media {
                MediaEmbed::Images(images) => {
                    let (count, alts) = image_fields(images.images);
                    (quote, count, alts)
                }
                MediaEmbed::Other => (quote, 0, None),
            }
        }
        Some(PostEmbed::Images(images)) => {
            let (count, alts) = image_fields(images.images);
            (None, count, alts)
        }
        Some(PostEmbed::Other) | None => (None, 0, None),
    };

    PostEntity {
        uri,
        cid,
        author,
        text: rec.text,
        created_at: rec.created_at,
        reply_parent: rec.reply.as_ref().map(|r| r.parent.uri.clone()),
        reply_root: rec.reply.as_ref().map(|r| r.root.uri.clone()),
        quote_uri,
        image_count,
        alt_text,
    }
}

fn image_fields(images: Vec<crate::firehose_core::types::ImageItem>) -> (i64, Option<Vec<String>>) {
    if images.is_empty() {
        return (0, None);
    }
    let alts: Vec<String> = images.iter().map(|i| i.alt.clone()).collect();
    (images.len() as i64, Some(alts))
}
