//! Entity application: turns classified batches into idempotent storage
//! writes plus their side effects (post counters, interaction ledger).
//!
//! Kinds apply in a fixed order so referenced rows land before their
//! referrers within one batch: profiles, feed generators, posts, blocks,
//! follows, likes, reposts, lists, list items. Side effects only fire
//! when the underlying write reports a real state change ("newly
//! applied" upserts, observed soft-delete transitions), which is what
//! makes replayed events harmless all the way down to the ledger.
//!
//! A single failing entity is logged with its URI and skipped; the rest
//! of the batch still applies.

use crate::firehose_core::types::actor_from_uri;
use crate::pipeline::batch::{ClassifiedBatch, LikeEntity, PostEntity, RepostEntity};
use crate::pipeline::fanout::BatchConsumer;
use crate::store_core::actor_cache::SeenActorCache;
use crate::store_core::doc_store::{DocStore, PostCounter, StoreError};
use crate::store_core::ledger::{today, InteractionDelta, InteractionLedger};
use async_trait::async_trait;
use std::sync::Arc;

pub struct EntityApplier {
    store: DocStore,
    ledger: InteractionLedger,
    actor_cache: SeenActorCache,
}

impl EntityApplier {
    pub fn new(store: DocStore, ledger: InteractionLedger) -> Self {
        Self {
            store,
            ledger,
            actor_cache: SeenActorCache::default(),
        }
    }

    pub fn with_actor_cache(mut self, cache: SeenActorCache) -> Self {
        self.actor_cache = cache;
        self
    }

    /// Apply one batch. Never fails as a whole; per-entity errors are
    /// logged and isolated.
    pub fn apply(&mut self, batch: &ClassifiedBatch) {
        if self.actor_cache.should_touch(&batch.repo) {
            if let Err(e) = self.store.touch_actor(&batch.repo) {
                log::warn!("Failed to touch actor {}: {}", batch.repo, e);
            }
        }

        let day = today();

        for profile in batch.profiles.creates.iter().chain(&batch.profiles.updates) {
            match self.store.upsert_profile(profile) {
                Ok(true) => {}
                Ok(false) => log::debug!("Replayed profile {}", profile.uri),
                Err(e) => log::error!("Failed to apply profile {}: {}", profile.uri, e),
            }
        }
        for uri in &batch.profiles.deletes {
            if let Err(e) = self.apply_profile_delete(uri) {
                log::error!("Failed to delete profile {}: {}", uri, e);
            }
        }

        for gen in batch
            .feed_generators
            .creates
            .iter()
            .chain(&batch.feed_generators.updates)
        {
            match self.store.upsert_feed_generator(gen) {
                Ok(true) => {}
                Ok(false) => log::debug!("Replayed feed generator {}", gen.uri),
                Err(e) => log::error!("Failed to apply feed generator {}: {}", gen.uri, e),
            }
        }
        for uri in &batch.feed_generators.deletes {
            if let Err(e) = self.store.delete_feed_generator(uri) {
                log::error!("Failed to delete feed generator {}: {}", uri, e);
            }
        }

        for post in &batch.posts.creates {
            if let Err(e) = self.apply_post_create(post, &day) {
                log::error!("Failed to apply post {}: {}", post.uri, e);
            }
        }
        for uri in &batch.posts.deletes {
            if let Err(e) = self.apply_post_delete(uri) {
                log::error!("Failed to delete post {}: {}", uri, e);
            }
        }

        for block in &batch.blocks.creates {
            match self.store.upsert_block(block) {
                Ok(true) => {}
                Ok(false) => log::debug!("Replayed block {}", block.uri),
                Err(e) => log::error!("Failed to apply block {}: {}", block.uri, e),
            }
        }
        for uri in &batch.blocks.deletes {
            if let Err(e) = self.store.delete_block(uri) {
                log::error!("Failed to delete block {}: {}", uri, e);
            }
        }

        for follow in &batch.follows.creates {
            match self.store.upsert_follow(follow) {
                Ok(true) => {}
                Ok(false) => log::debug!("Replayed follow {}", follow.uri),
                Err(e) => log::error!("Failed to apply follow {}: {}", follow.uri, e),
            }
        }
        for uri in &batch.follows.deletes {
            if let Err(e) = self.store.delete_follow(uri) {
                log::error!("Failed to delete follow {}: {}", uri, e);
            }
        }

        for like in &batch.likes.creates {
            if let Err(e) = self.apply_like_create(like, &day) {
                log::error!("Failed to apply like {}: {}", like.uri, e);
            }
        }
        for uri in &batch.likes.deletes {
            if let Err(e) = self.apply_like_delete(uri, &day) {
                log::error!("Failed to delete like {}: {}", uri, e);
            }
        }

        for repost in &batch.reposts.creates {
            if let Err(e) = self.apply_repost_create(repost, &day) {
                log::error!("Failed to apply repost {}: {}", repost.uri, e);
            }
        }
        for uri in &batch.reposts.deletes {
            if let Err(e) = self.apply_repost_delete(uri, &day) {
                log::error!("Failed to delete repost {}: {}", uri, e);
            }
        }

        for list in batch.lists.creates.iter().chain(&batch.lists.updates) {
            match self.store.upsert_list(list) {
                Ok(true) => {}
                Ok(false) => log::debug!("Replayed list {}", list.uri),
                Err(e) => log::error!("Failed to apply list {}: {}", list.uri, e),
            }
        }
        for uri in &batch.lists.deletes {
            if let Err(e) = self.store.delete_list(uri) {
                log::error!("Failed to delete list {}: {}", uri, e);
            }
        }

        for item in &batch.list_items.creates {
            match self.store.upsert_list_item(item) {
                Ok(true) => {}
                Ok(false) => log::debug!("Replayed list item {}", item.uri),
                Err(e) => log::error!("Failed to apply list item {}: {}", item.uri, e),
            }
        }
        for uri in &batch.list_items.deletes {
            if let Err(e) = self.store.delete_list_item(uri) {
                log::error!("Failed to delete list item {}: {}", uri, e);
            }
        }

        log::debug!(
            "Applied batch seq {} from {}: {} op(s)",
            batch.sequence,
            batch.repo,
            batch.operation_count()
        );
    }

    fn apply_profile_delete(&mut self, uri: &str) -> Result<(), StoreError> {
        let did = match actor_from_uri(uri) {
            Some(did) => did,
            None => {
                log::warn!("Profile delete with malformed URI: {}", uri);
                return Ok(());
            }
        };
        if !self.store.delete_actor(did)? {
            log::debug!("Replayed or unknown profile delete {}", uri);
        }
        Ok(())
    }

    fn apply_post_create(&mut self, post: &PostEntity, day: &str) -> Result<(), StoreError> {
        if !self.store.upsert_post(post)? {
            log::debug!("Replayed post {}", post.uri);
            return Ok(());
        }
        if let Some(parent) = &post.reply_parent {
            self.store
                .adjust_post_counter(parent, PostCounter::Replies, 1)?;
            if let Some(parent_author) = actor_from_uri(parent) {
                let characters = post.text.chars().count() as i64;
                self.ledger.record(
                    &post.author,
                    parent_author,
                    day,
                    InteractionDelta::reply(characters),
                )?;
            }
        }
        Ok(())
    }

    fn apply_post_delete(&mut self, uri: &str) -> Result<(), StoreError> {
        match self.store.delete_post(uri)? {
            Some(Some(parent)) => {
                self.store
                    .adjust_post_counter(&parent, PostCounter::Replies, -1)?;
            }
            Some(None) => {}
            None => log::debug!("Replayed or unknown post delete {}", uri),
        }
        Ok(())
    }

    fn apply_like_create(&mut self, like: &LikeEntity, day: &str) -> Result<(), StoreError> {
        if !self.store.upsert_like(like)? {
            log::debug!("Replayed like {}", like.uri);
            return Ok(());
        }
        self.store
            .adjust_post_counter(&like.subject_uri, PostCounter::Likes, 1)?;
        if let Some(subject_author) = &like.subject_author {
            self.ledger
                .record(&like.author, subject_author, day, InteractionDelta::like())?;
        }
        Ok(())
    }

    fn apply_like_delete(&mut self, uri: &str, day: &str) -> Result<(), StoreError> {
        match self.store.delete_like(uri)? {
            Some(info) => {
                self.store
                    .adjust_post_counter(&info.subject_uri, PostCounter::Likes, -1)?;
                if let Some(subject_author) = &info.subject_author {
                    self.ledger.record(
                        &info.author,
                        subject_author,
                        day,
                        InteractionDelta::unlike(),
                    )?;
                }
            }
            None => log::debug!("Replayed or unknown like delete {}", uri),
        }
        Ok(())
    }

    fn apply_repost_create(&mut self, repost: &RepostEntity, day: &str) -> Result<(), StoreError> {
        if !self.store.upsert_repost(repost)? {
            log::debug!("Replayed repost {}", repost.uri);
            return Ok(());
        }
        self.store
            .adjust_post_counter(&repost.subject_uri, PostCounter::Reposts, 1)?;
        if let Some(subject_author) = &repost.subject_author {
            self.ledger.record(
                &repost.author,
                subject_author,
                day,
                InteractionDelta::repost(),
            )?;
        }
        Ok(())
    }

    fn apply_repost_delete(&mut self, uri: &str, day: &str) -> Result<(), StoreError> {
        match self.store.delete_repost(uri)? {
            Some(info) => {
                self.store
                    .adjust_post_counter(&info.subject_uri, PostCounter::Reposts, -1)?;
                if let Some(subject_author) = &info.subject_author {
                    self.ledger.record(
                        &info.author,
                        subject_author,
                        day,
                        InteractionDelta::unrepost(),
                    )?;
                }
            }
            None => log::debug!("Replayed or unknown repost delete {}", uri),
        }
        Ok(())
    }
}

#[async_trait]
impl BatchConsumer for EntityApplier {
    fn name(&self) -> &str {
        "entity-applier"
    }

    async fn on_batch(
        &mut self,
        batch: Arc<ClassifiedBatch>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.apply(&batch);
        Ok(())
    }
}
