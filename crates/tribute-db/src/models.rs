/// Database row types — these map directly to SQLite rows.
/// Distinct from the tribute-types API models to keep the DB layer
/// independent.

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub email: String,
    pub password: String,
    pub role: String,
    pub created_at: String,
}

pub struct VeteranRow {
    pub id: String,
    pub name: String,
    pub created_at: String,
}

pub struct FileRow {
    pub id: String,
    pub name: String,
    pub file_url: String,
    pub mime_type: String,
}

/// Unified row for stories and photos. Stories populate `text`; photos
/// populate the `photo_*` columns via a join against `files`.
pub struct PostRow {
    pub id: String,
    pub veteran_id: String,
    pub title: String,
    pub text: Option<String>,
    pub photo_file_id: Option<String>,
    pub photo_name: Option<String>,
    pub photo_url: Option<String>,
    pub photo_mime: Option<String>,
    pub status: String,
    pub response: Option<String>,
    pub created_by: String,
    pub updated_by: Option<String>,
    pub view_count: i64,
    pub salute_count: i64,
    pub share_count: i64,
    pub created_at: String,
}

pub struct NokRow {
    pub id: String,
    pub user_id: String,
    pub veteran_id: String,
    pub full_name: String,
    pub email: String,
    pub status: String,
    pub response: Option<String>,
    pub created_by: String,
    pub updated_by: Option<String>,
    pub created_at: String,
}

pub struct NotificationRow {
    pub id: String,
    pub user_id: String,
    pub kind: String,
    pub sub_kind: Option<String>,
    pub content: String,
    pub status: String,
    pub created_at: String,
}

pub struct PreferenceRow {
    pub user_id: String,
    pub story_site: bool,
    pub story_email: bool,
    pub story_mobile: bool,
    pub photo_site: bool,
    pub photo_email: bool,
    pub photo_mobile: bool,
}

// -- Insert/update payloads --

pub struct NewFile<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub file_url: &'a str,
    pub mime_type: &'a str,
}

pub struct NewStory<'a> {
    pub id: &'a str,
    pub veteran_id: &'a str,
    pub title: &'a str,
    pub text: &'a str,
    pub status: &'a str,
    pub created_by: &'a str,
}

pub struct NewPhoto<'a> {
    pub id: &'a str,
    pub veteran_id: &'a str,
    pub title: &'a str,
    pub status: &'a str,
    pub created_by: &'a str,
}

pub struct StoryPatch<'a> {
    pub veteran_id: Option<&'a str>,
    pub title: Option<&'a str>,
    pub text: Option<&'a str>,
    pub status: Option<&'a str>,
    pub updated_by: &'a str,
}

pub struct PhotoPatch<'a> {
    pub veteran_id: Option<&'a str>,
    pub title: Option<&'a str>,
    pub status: Option<&'a str>,
    pub updated_by: &'a str,
}

pub struct NewNok<'a> {
    pub id: &'a str,
    pub user_id: &'a str,
    pub veteran_id: &'a str,
    pub full_name: &'a str,
    pub email: &'a str,
    pub status: &'a str,
    pub created_by: &'a str,
}

pub struct NokPatch<'a> {
    pub full_name: Option<&'a str>,
    pub email: Option<&'a str>,
    pub status: Option<&'a str>,
    pub response: Option<&'a str>,
    pub updated_by: &'a str,
}

pub struct PreferencePatch {
    pub story_site: Option<bool>,
    pub story_email: Option<bool>,
    pub story_mobile: Option<bool>,
    pub photo_site: Option<bool>,
    pub photo_email: Option<bool>,
    pub photo_mobile: Option<bool>,
}

/// Search filters. String ids are already rendered UUIDs.
#[derive(Default)]
pub struct PostSearch {
    pub veteran_id: Option<String>,
    pub created_by: Option<String>,
    pub status: Option<String>,
    /// Restrict to these veterans (review mode). `Some(vec![])` matches
    /// nothing.
    pub veteran_in: Option<Vec<String>>,
    pub limit: u32,
    pub offset: u32,
}

#[derive(Default)]
pub struct NokSearch {
    pub veteran_id: Option<String>,
    pub user_id: Option<String>,
    pub status: Option<String>,
    pub limit: u32,
    pub offset: u32,
}

/// Outcome of an approval attempt against the partial unique index.
#[derive(Debug, PartialEq, Eq)]
pub enum NokDecision {
    Updated,
    /// Another approved next-of-kin already exists for the veteran.
    Conflict,
}
