use chrono::{DateTime, Utc};
use tracing::{error, warn};
use uuid::Uuid;

use tribute_db::models::{FileRow, NokRow, NotificationRow, PostRow, PreferenceRow};
use tribute_types::models::{
    NextOfKin, Notification, NotificationKind, NotificationPreference, NotificationStatus, Post,
    PostKind, Status, StoredFile,
};

pub(crate) fn parse_uuid(s: &str, what: &str) -> Uuid {
    s.parse().unwrap_or_else(|e| {
        warn!("Corrupt {} '{}': {}", what, s, e);
        Uuid::default()
    })
}

pub(crate) fn parse_datetime(s: &str, what: &str) -> DateTime<Utc> {
    s.parse::<DateTime<Utc>>()
        .or_else(|_| {
            // SQLite stores timestamps as "YYYY-MM-DD HH:MM:SS" without
            // timezone. Parse as naive UTC and convert.
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt {} '{}': {}", what, s, e);
            DateTime::default()
        })
}

fn parse_status(s: &str) -> Status {
    Status::parse(s).unwrap_or_else(|| {
        warn!("Corrupt status '{}'", s);
        Status::Pending
    })
}

pub(crate) fn post_from_row(kind: PostKind, row: PostRow) -> Post {
    let photo = match (&row.photo_file_id, &row.photo_url) {
        (Some(id), Some(url)) => Some(StoredFile {
            id: parse_uuid(id, "photo_file_id"),
            name: row.photo_name.clone().unwrap_or_default(),
            url: url.clone(),
            mime_type: row.photo_mime.clone().unwrap_or_default(),
        }),
        _ => None,
    };

    Post {
        id: parse_uuid(&row.id, "post id"),
        kind,
        veteran_id: parse_uuid(&row.veteran_id, "veteran_id"),
        title: row.title,
        text: row.text,
        photo,
        status: parse_status(&row.status),
        response: row.response,
        created_by: parse_uuid(&row.created_by, "created_by"),
        updated_by: row.updated_by.as_deref().map(|u| parse_uuid(u, "updated_by")),
        view_count: row.view_count,
        salute_count: row.salute_count,
        share_count: row.share_count,
        created_at: parse_datetime(&row.created_at, "created_at"),
    }
}

pub(crate) fn file_from_row(row: FileRow) -> StoredFile {
    StoredFile {
        id: parse_uuid(&row.id, "file id"),
        name: row.name,
        url: row.file_url,
        mime_type: row.mime_type,
    }
}

pub(crate) fn nok_from_row(row: NokRow, proofs: Vec<FileRow>) -> NextOfKin {
    NextOfKin {
        id: parse_uuid(&row.id, "nok id"),
        user_id: parse_uuid(&row.user_id, "user_id"),
        veteran_id: parse_uuid(&row.veteran_id, "veteran_id"),
        full_name: row.full_name,
        email: row.email,
        status: parse_status(&row.status),
        response: row.response,
        created_by: parse_uuid(&row.created_by, "created_by"),
        updated_by: row.updated_by.as_deref().map(|u| parse_uuid(u, "updated_by")),
        proofs: proofs.into_iter().map(file_from_row).collect(),
        created_at: parse_datetime(&row.created_at, "created_at"),
    }
}

pub(crate) fn preference_from_row(row: PreferenceRow) -> NotificationPreference {
    NotificationPreference {
        user_id: parse_uuid(&row.user_id, "user_id"),
        story_site: row.story_site,
        story_email: row.story_email,
        story_mobile: row.story_mobile,
        photo_site: row.photo_site,
        photo_email: row.photo_email,
        photo_mobile: row.photo_mobile,
    }
}

pub(crate) fn notification_from_row(row: NotificationRow) -> Notification {
    let content = serde_json::from_str(&row.content).unwrap_or_else(|e| {
        error!("Corrupt notification content on '{}': {}", row.id, e);
        serde_json::Value::Null
    });

    Notification {
        id: parse_uuid(&row.id, "notification id"),
        user_id: parse_uuid(&row.user_id, "user_id"),
        kind: NotificationKind::parse(&row.kind).unwrap_or(NotificationKind::Post),
        sub_kind: row.sub_kind.as_deref().and_then(PostKind::parse),
        content,
        status: NotificationStatus::parse(&row.status).unwrap_or(NotificationStatus::New),
        created_at: parse_datetime(&row.created_at, "created_at"),
    }
}
