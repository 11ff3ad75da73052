use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Moderation lifecycle shared by posts and next-of-kin requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Pending,
    Approved,
    Rejected,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Approved => "Approved",
            Self::Rejected => "Rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Pending" => Some(Self::Pending),
            "Approved" => Some(Self::Approved),
            "Rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "User",
            Self::Admin => "Admin",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "User" => Some(Self::User),
            "Admin" => Some(Self::Admin),
            _ => None,
        }
    }
}

/// The content kinds that share the moderation capability set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PostKind {
    Story,
    Photo,
}

impl PostKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Story => "Story",
            Self::Photo => "Photo",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Story" => Some(Self::Story),
            "Photo" => Some(Self::Photo),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationKind {
    Post,
    Nok,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Post => "Post",
            Self::Nok => "Nok",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Post" => Some(Self::Post),
            "Nok" => Some(Self::Nok),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationStatus {
    New,
    Read,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "New",
            Self::Read => "Read",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "New" => Some(Self::New),
            "Read" => Some(Self::Read),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Veteran {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Metadata returned by the blob store for an uploaded payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadedFile {
    pub name: String,
    pub url: String,
    pub mime_type: String,
}

/// A blob metadata row persisted alongside the content that references it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredFile {
    pub id: Uuid,
    pub name: String,
    pub url: String,
    pub mime_type: String,
}

/// Unified view of moderatable content. Stories carry `text`, photos carry
/// `photo`; everything else is shared.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: Uuid,
    pub kind: PostKind,
    pub veteran_id: Uuid,
    pub title: String,
    pub text: Option<String>,
    pub photo: Option<StoredFile>,
    pub status: Status,
    pub response: Option<String>,
    pub created_by: Uuid,
    pub updated_by: Option<Uuid>,
    pub view_count: i64,
    pub salute_count: i64,
    pub share_count: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NextOfKin {
    pub id: Uuid,
    pub user_id: Uuid,
    pub veteran_id: Uuid,
    pub full_name: String,
    pub email: String,
    pub status: Status,
    pub response: Option<String>,
    pub created_by: Uuid,
    pub updated_by: Option<Uuid>,
    pub proofs: Vec<StoredFile>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: NotificationKind,
    pub sub_kind: Option<PostKind>,
    /// Opaque JSON payload; embeds at minimum the veteran id.
    pub content: serde_json::Value,
    pub status: NotificationStatus,
    pub created_at: DateTime<Utc>,
}

/// Per-user delivery flags, one triple per post kind. Rows are created
/// lazily with every flag on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationPreference {
    pub user_id: Uuid,
    pub story_site: bool,
    pub story_email: bool,
    pub story_mobile: bool,
    pub photo_site: bool,
    pub photo_email: bool,
    pub photo_mobile: bool,
}
