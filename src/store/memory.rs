//! 内存存储，用于测试和 `--dry-store`

use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use super::{Store, StoreResult};
use crate::models::{ExtractedListing, GroupSyncStats, GroupTarget, SessionRecord, UserAccount};

type UserKey = (String, String);
type PostKey = (String, String);

#[derive(Default)]
struct MemoryState {
    users: BTreeMap<UserKey, UserAccount>,
    expired: HashSet<UserKey>,
    groups: BTreeMap<UserKey, Vec<GroupTarget>>,
    processed: HashMap<String, HashSet<String>>,
    failures: HashMap<PostKey, u32>,
    listings: BTreeMap<PostKey, ExtractedListing>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

fn key(platform: &str, email: &str) -> UserKey {
    (platform.to_string(), email.to_string())
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn listings(&self) -> Vec<ExtractedListing> {
        self.state.lock().listings.values().cloned().collect()
    }

    pub fn listing_count(&self, group_id: &str) -> usize {
        self.state
            .lock()
            .listings
            .keys()
            .filter(|(g, _)| g == group_id)
            .count()
    }

    pub fn processed_count(&self, group_id: &str) -> usize {
        self.state
            .lock()
            .processed
            .get(group_id)
            .map_or(0, HashSet::len)
    }

    pub fn failure_count(&self, group_id: &str, post_id: &str) -> u32 {
        self.state
            .lock()
            .failures
            .get(&(group_id.to_string(), post_id.to_string()))
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn upsert_user(&self, user: &UserAccount) -> StoreResult<()> {
        let mut state = self.state.lock();
        let user_key = key(&user.platform, &user.email);
        match state.users.get_mut(&user_key) {
            Some(existing) => {
                if user.password.is_some() {
                    existing.password = user.password.clone();
                }
                existing.active = user.active;
                existing.settings = user.settings.clone();
            }
            None => {
                state.users.insert(user_key, user.clone());
            }
        }
        Ok(())
    }

    async fn get_user(&self, platform: &str, email: &str) -> StoreResult<Option<UserAccount>> {
        Ok(self.state.lock().users.get(&key(platform, email)).cloned())
    }

    async fn get_active_users(&self, platform: &str) -> StoreResult<Vec<UserAccount>> {
        Ok(self
            .state
            .lock()
            .users
            .values()
            .filter(|u| u.platform == platform && u.active)
            .cloned()
            .collect())
    }

    async fn get_groups(&self, platform: &str, email: &str) -> StoreResult<Vec<GroupTarget>> {
        Ok(self
            .state
            .lock()
            .groups
            .get(&key(platform, email))
            .cloned()
            .unwrap_or_default())
    }

    async fn replace_groups(
        &self,
        platform: &str,
        email: &str,
        groups: &[GroupTarget],
    ) -> StoreResult<GroupSyncStats> {
        let mut state = self.state.lock();
        let existing = state.groups.remove(&key(platform, email)).unwrap_or_default();
        let mut stats = GroupSyncStats::default();

        for group in groups {
            match existing.iter().find(|g| g.group_id == group.group_id) {
                Some(old) if old == group => {}
                Some(_) => stats.updated += 1,
                None => stats.added += 1,
            }
        }
        stats.removed = existing
            .iter()
            .filter(|old| !groups.iter().any(|g| g.group_id == old.group_id))
            .count();

        state.groups.insert(key(platform, email), groups.to_vec());
        Ok(stats)
    }

    async fn get_session(&self, platform: &str, email: &str) -> StoreResult<Option<SessionRecord>> {
        let state = self.state.lock();
        let user_key = key(platform, email);
        Ok(state.users.get(&user_key).map(|user| SessionRecord {
            blob: user.session_blob.clone(),
            last_login: user.last_login,
            expired: state.expired.contains(&user_key),
        }))
    }

    async fn save_session(
        &self,
        platform: &str,
        email: &str,
        blob: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut state = self.state.lock();
        let user_key = key(platform, email);
        let user = state
            .users
            .entry(user_key.clone())
            .or_insert_with(|| UserAccount::new(platform, email));
        user.session_blob = Some(blob.to_string());
        user.last_login = Some(at);
        state.expired.remove(&user_key);
        Ok(())
    }

    async fn expire_session(&self, platform: &str, email: &str) -> StoreResult<()> {
        self.state.lock().expired.insert(key(platform, email));
        Ok(())
    }

    async fn get_processed_ids(&self, group_id: &str) -> StoreResult<HashSet<String>> {
        Ok(self
            .state
            .lock()
            .processed
            .get(group_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn mark_processed(&self, group_id: &str, post_id: &str) -> StoreResult<()> {
        self.state
            .lock()
            .processed
            .entry(group_id.to_string())
            .or_default()
            .insert(post_id.to_string());
        Ok(())
    }

    async fn record_failure(&self, group_id: &str, post_id: &str) -> StoreResult<u32> {
        let mut state = self.state.lock();
        let attempts = state
            .failures
            .entry((group_id.to_string(), post_id.to_string()))
            .or_insert(0);
        *attempts += 1;
        Ok(*attempts)
    }

    async fn save_listing(&self, listing: &ExtractedListing) -> StoreResult<()> {
        self.state.lock().listings.insert(
            (listing.group_id.clone(), listing.post_id.clone()),
            listing.clone(),
        );
        Ok(())
    }
}
