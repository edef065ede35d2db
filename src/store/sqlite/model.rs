//! 数据库行结构

use diesel::prelude::*;

use super::schema::{listings, post_failures, processed_posts, scraper_users, user_groups};

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = scraper_users)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct UserRow {
    pub platform: String,
    pub email: String,
    pub password: Option<String>,
    pub active: bool,
    pub settings_json: String,
    pub session_blob: Option<String>,
    pub session_expired: bool,
    pub last_login: Option<String>,
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = user_groups)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct GroupRow {
    pub platform: String,
    pub user_email: String,
    pub group_id: String,
    pub name: Option<String>,
    pub config_json: String,
    pub position: i32,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = processed_posts)]
pub struct ProcessedPostRow<'a> {
    pub group_id: &'a str,
    pub post_id: &'a str,
    pub processed_at: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = post_failures)]
pub struct PostFailureRow<'a> {
    pub group_id: &'a str,
    pub post_id: &'a str,
    pub attempts: i32,
    pub last_failed_at: String,
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = listings)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ListingRow {
    pub group_id: String,
    pub post_id: String,
    pub platform: String,
    pub fields_json: String,
    pub extracted_at: String,
}
