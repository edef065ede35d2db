//! diesel + sqlite 存储
//!
//! diesel 是同步的，所有操作放到 `spawn_blocking` 中执行。

pub mod connection;
pub mod model;
pub mod schema;

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::SqliteConnection;
use tracing::info;

use self::connection::{create_pool, run_migrations, DbPool};
use self::model::{GroupRow, ListingRow, PostFailureRow, ProcessedPostRow, UserRow};
use self::schema::{listings, post_failures, processed_posts, scraper_users, user_groups};
use super::{Store, StoreResult};
use crate::config::Options;
use crate::error::StoreError;
use crate::models::{ExtractedListing, GroupSyncStats, GroupTarget, SessionRecord, UserAccount};

impl From<diesel::result::Error> for StoreError {
    fn from(e: diesel::result::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

pub struct SqliteStore {
    pool: DbPool,
}

impl SqliteStore {
    /// 打开数据库并执行迁移
    pub fn open(database_url: &str) -> StoreResult<Self> {
        let pool = create_pool(database_url)?;
        run_migrations(&pool)?;
        info!("🗄️ 数据库已就绪: {}", database_url);
        Ok(Self { pool })
    }

    async fn with_conn<T, F>(&self, op: F) -> StoreResult<T>
    where
        F: FnOnce(&mut SqliteConnection) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|e| StoreError::Connection(e.to_string()))?;
            op(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }

    fn to_user(row: UserRow) -> StoreResult<UserAccount> {
        let settings: Options = serde_json::from_str(&row.settings_json)?;
        Ok(UserAccount {
            platform: row.platform,
            email: row.email,
            password: row.password,
            active: row.active,
            settings,
            session_blob: row.session_blob,
            last_login: row.last_login.as_deref().map(parse_time).transpose()?,
        })
    }

    fn to_group(row: GroupRow) -> StoreResult<GroupTarget> {
        Ok(GroupTarget {
            platform: row.platform,
            user_email: row.user_email,
            group_id: row.group_id,
            name: row.name,
            config: serde_json::from_str(&row.config_json)?,
        })
    }

    fn group_row(group: &GroupTarget, position: usize) -> StoreResult<GroupRow> {
        Ok(GroupRow {
            platform: group.platform.clone(),
            user_email: group.user_email.clone(),
            group_id: group.group_id.clone(),
            name: group.name.clone(),
            config_json: serde_json::to_string(&group.config)?,
            position: position as i32,
        })
    }
}

fn parse_time(raw: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Serialization(e.to_string()))
}

fn find_user(conn: &mut SqliteConnection, platform: &str, email: &str) -> StoreResult<Option<UserRow>> {
    Ok(scraper_users::table
        .find((platform, email))
        .select(UserRow::as_select())
        .first(conn)
        .optional()?)
}

#[async_trait]
impl Store for SqliteStore {
    async fn upsert_user(&self, user: &UserAccount) -> StoreResult<()> {
        let row = UserRow {
            platform: user.platform.clone(),
            email: user.email.clone(),
            password: user.password.clone(),
            active: user.active,
            settings_json: serde_json::to_string(&user.settings)?,
            session_blob: user.session_blob.clone(),
            session_expired: false,
            last_login: user.last_login.map(|t| t.to_rfc3339()),
        };

        self.with_conn(move |conn| {
            conn.transaction::<_, StoreError, _>(|conn| {
                if find_user(conn, &row.platform, &row.email)?.is_none() {
                    diesel::insert_into(scraper_users::table)
                        .values(&row)
                        .execute(conn)?;
                    return Ok(());
                }

                diesel::update(scraper_users::table.find((&row.platform, &row.email)))
                    .set((
                        scraper_users::active.eq(row.active),
                        scraper_users::settings_json.eq(&row.settings_json),
                    ))
                    .execute(conn)?;
                if let Some(password) = &row.password {
                    diesel::update(scraper_users::table.find((&row.platform, &row.email)))
                        .set(scraper_users::password.eq(Some(password.clone())))
                        .execute(conn)?;
                }
                Ok(())
            })
        })
        .await
    }

    async fn get_user(&self, platform: &str, email: &str) -> StoreResult<Option<UserAccount>> {
        let (platform, email) = (platform.to_string(), email.to_string());
        self.with_conn(move |conn| {
            find_user(conn, &platform, &email)?
                .map(Self::to_user)
                .transpose()
        })
        .await
    }

    async fn get_active_users(&self, platform: &str) -> StoreResult<Vec<UserAccount>> {
        let platform = platform.to_string();
        self.with_conn(move |conn| {
            let rows = scraper_users::table
                .filter(scraper_users::platform.eq(&platform))
                .filter(scraper_users::active.eq(true))
                .order(scraper_users::email.asc())
                .select(UserRow::as_select())
                .load(conn)?;
            rows.into_iter().map(Self::to_user).collect()
        })
        .await
    }

    async fn get_groups(&self, platform: &str, email: &str) -> StoreResult<Vec<GroupTarget>> {
        let (platform, email) = (platform.to_string(), email.to_string());
        self.with_conn(move |conn| {
            let rows = user_groups::table
                .filter(user_groups::platform.eq(&platform))
                .filter(user_groups::user_email.eq(&email))
                .order(user_groups::position.asc())
                .select(GroupRow::as_select())
                .load(conn)?;
            rows.into_iter().map(Self::to_group).collect()
        })
        .await
    }

    async fn replace_groups(
        &self,
        platform: &str,
        email: &str,
        groups: &[GroupTarget],
    ) -> StoreResult<GroupSyncStats> {
        let (platform, email) = (platform.to_string(), email.to_string());
        let rows = groups
            .iter()
            .enumerate()
            .map(|(idx, group)| Self::group_row(group, idx))
            .collect::<StoreResult<Vec<_>>>()?;

        self.with_conn(move |conn| {
            conn.transaction::<_, StoreError, _>(|conn| {
                let existing: Vec<GroupRow> = user_groups::table
                    .filter(user_groups::platform.eq(&platform))
                    .filter(user_groups::user_email.eq(&email))
                    .select(GroupRow::as_select())
                    .load(conn)?;

                let mut stats = GroupSyncStats::default();
                for row in &rows {
                    match existing.iter().find(|old| old.group_id == row.group_id) {
                        Some(old) if old.name == row.name && old.config_json == row.config_json => {}
                        Some(_) => stats.updated += 1,
                        None => stats.added += 1,
                    }
                }
                stats.removed = existing
                    .iter()
                    .filter(|old| !rows.iter().any(|row| row.group_id == old.group_id))
                    .count();

                diesel::delete(
                    user_groups::table
                        .filter(user_groups::platform.eq(&platform))
                        .filter(user_groups::user_email.eq(&email)),
                )
                .execute(conn)?;
                if !rows.is_empty() {
                    diesel::insert_into(user_groups::table)
                        .values(&rows)
                        .execute(conn)?;
                }
                Ok(stats)
            })
        })
        .await
    }

    async fn get_session(&self, platform: &str, email: &str) -> StoreResult<Option<SessionRecord>> {
        let (platform, email) = (platform.to_string(), email.to_string());
        self.with_conn(move |conn| {
            let Some(row) = find_user(conn, &platform, &email)? else {
                return Ok(None);
            };
            Ok(Some(SessionRecord {
                blob: row.session_blob,
                last_login: row.last_login.as_deref().map(parse_time).transpose()?,
                expired: row.session_expired,
            }))
        })
        .await
    }

    async fn save_session(
        &self,
        platform: &str,
        email: &str,
        blob: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let (platform, email, blob) = (platform.to_string(), email.to_string(), blob.to_string());
        let at = at.to_rfc3339();

        self.with_conn(move |conn| {
            conn.transaction::<_, StoreError, _>(|conn| {
                if find_user(conn, &platform, &email)?.is_some() {
                    diesel::update(scraper_users::table.find((&platform, &email)))
                        .set((
                            scraper_users::session_blob.eq(Some(blob.clone())),
                            scraper_users::session_expired.eq(false),
                            scraper_users::last_login.eq(Some(at.clone())),
                        ))
                        .execute(conn)?;
                } else {
                    let row = UserRow {
                        platform: platform.clone(),
                        email: email.clone(),
                        password: None,
                        active: true,
                        settings_json: "{}".to_string(),
                        session_blob: Some(blob.clone()),
                        session_expired: false,
                        last_login: Some(at.clone()),
                    };
                    diesel::insert_into(scraper_users::table)
                        .values(&row)
                        .execute(conn)?;
                }
                Ok(())
            })
        })
        .await
    }

    async fn expire_session(&self, platform: &str, email: &str) -> StoreResult<()> {
        let (platform, email) = (platform.to_string(), email.to_string());
        self.with_conn(move |conn| {
            diesel::update(scraper_users::table.find((&platform, &email)))
                .set(scraper_users::session_expired.eq(true))
                .execute(conn)?;
            Ok(())
        })
        .await
    }

    async fn get_processed_ids(&self, group_id: &str) -> StoreResult<HashSet<String>> {
        let group_id = group_id.to_string();
        self.with_conn(move |conn| {
            let ids: Vec<String> = processed_posts::table
                .filter(processed_posts::group_id.eq(&group_id))
                .select(processed_posts::post_id)
                .load(conn)?;
            Ok(ids.into_iter().collect())
        })
        .await
    }

    async fn mark_processed(&self, group_id: &str, post_id: &str) -> StoreResult<()> {
        let (group_id, post_id) = (group_id.to_string(), post_id.to_string());
        self.with_conn(move |conn| {
            let row = ProcessedPostRow {
                group_id: &group_id,
                post_id: &post_id,
                processed_at: Utc::now().to_rfc3339(),
            };
            diesel::insert_or_ignore_into(processed_posts::table)
                .values(&row)
                .execute(conn)?;
            Ok(())
        })
        .await
    }

    async fn record_failure(&self, group_id: &str, post_id: &str) -> StoreResult<u32> {
        let (group_id, post_id) = (group_id.to_string(), post_id.to_string());
        self.with_conn(move |conn| {
            conn.transaction::<_, StoreError, _>(|conn| {
                let now = Utc::now().to_rfc3339();
                let row = PostFailureRow {
                    group_id: &group_id,
                    post_id: &post_id,
                    attempts: 1,
                    last_failed_at: now.clone(),
                };
                diesel::insert_into(post_failures::table)
                    .values(&row)
                    .on_conflict((post_failures::group_id, post_failures::post_id))
                    .do_update()
                    .set((
                        post_failures::attempts.eq(post_failures::attempts + 1),
                        post_failures::last_failed_at.eq(&now),
                    ))
                    .execute(conn)?;

                let attempts: i32 = post_failures::table
                    .find((&group_id, &post_id))
                    .select(post_failures::attempts)
                    .first(conn)?;
                Ok(attempts.max(0) as u32)
            })
        })
        .await
    }

    async fn save_listing(&self, listing: &ExtractedListing) -> StoreResult<()> {
        let row = ListingRow {
            group_id: listing.group_id.clone(),
            post_id: listing.post_id.clone(),
            platform: listing.platform.clone(),
            fields_json: serde_json::to_string(&listing.fields)?,
            extracted_at: listing.extracted_at.to_rfc3339(),
        };
        self.with_conn(move |conn| {
            diesel::replace_into(listings::table)
                .values(&row)
                .execute(conn)?;
            Ok(())
        })
        .await
    }
}
