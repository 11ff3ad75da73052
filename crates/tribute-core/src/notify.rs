use std::sync::Arc;

use serde_json::json;
use tracing::warn;
use uuid::Uuid;

use tribute_db::Database;
use tribute_db::models::{PreferencePatch, PreferenceRow};
use tribute_types::api::{NotificationQuery, Paged, UpdatePreferenceRequest};
use tribute_types::events::NotificationEvent;
use tribute_types::models::{
    Notification, NotificationKind, NotificationPreference, NotificationStatus, PostKind,
};

use crate::Result;
use crate::convert::{notification_from_row, parse_uuid, preference_from_row};

const DEFAULT_LIMIT: u32 = 50;
const MAX_LIMIT: u32 = 200;

/// One (recipient, payload) pair produced by the resolver, not yet filtered
/// by the recipient's delivery preferences.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub user_id: Uuid,
    pub kind: NotificationKind,
    pub sub_kind: Option<PostKind>,
    pub content: serde_json::Value,
}

/// Resolves events into recipients and dispatches site notifications,
/// filtered per recipient preference flags.
#[derive(Clone)]
pub struct Notifier {
    db: Arc<Database>,
}

impl Notifier {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Fan out an event. Best-effort: a failure here must never abort the
    /// moderation or creation action that triggered it, so errors are logged
    /// and swallowed.
    pub fn notify(&self, event: &NotificationEvent) {
        if let Err(e) = self.run(event) {
            warn!("Notification dispatch failed: {:#}", e);
        }
    }

    fn run(&self, event: &NotificationEvent) -> Result<usize> {
        let candidates = self.resolve(event)?;
        self.dispatch(candidates)
    }

    /// Expand an event into per-recipient candidates.
    fn resolve(&self, event: &NotificationEvent) -> Result<Vec<Candidate>> {
        match event {
            NotificationEvent::PostCreated {
                veteran_id, kind, ..
            } => {
                let recipients = self.db.approved_nok_user_ids(&veteran_id.to_string())?;
                Ok(recipients
                    .iter()
                    .map(|user_id| Candidate {
                        user_id: parse_uuid(user_id, "recipient"),
                        kind: NotificationKind::Post,
                        sub_kind: Some(*kind),
                        content: json!({ "veteranId": veteran_id }),
                    })
                    .collect())
            }

            NotificationEvent::PostApproved {
                veteran_id,
                recipient,
                kind,
                ..
            } => Ok(vec![Candidate {
                user_id: *recipient,
                kind: NotificationKind::Post,
                sub_kind: Some(*kind),
                content: json!({
                    "veteranId": veteran_id,
                    "text": format!("Your {} approved.", kind.as_str()),
                }),
            }]),

            NotificationEvent::NokDecided {
                veteran_id,
                recipient,
                approved,
                ..
            } => {
                let text = if *approved {
                    "Your NOK request approved"
                } else {
                    "Your NOK request rejected by admin"
                };
                Ok(vec![Candidate {
                    user_id: *recipient,
                    kind: NotificationKind::Nok,
                    sub_kind: None,
                    content: json!({ "veteranId": veteran_id, "text": text }),
                }])
            }
        }
    }

    /// Apply per-recipient preference filtering and persist what survives.
    /// A recipient without a preference row gets everything (fail-open);
    /// non-Post candidates bypass preferences entirely. Returns the number
    /// delivered.
    fn dispatch(&self, candidates: Vec<Candidate>) -> Result<usize> {
        let mut delivered = 0;
        for candidate in candidates {
            if candidate.kind == NotificationKind::Post {
                if let Some(pref) = self.db.get_preference(&candidate.user_id.to_string())? {
                    if !site_flag(&pref, candidate.sub_kind) {
                        continue;
                    }
                }
            }

            self.db.insert_notification(
                &Uuid::new_v4().to_string(),
                &candidate.user_id.to_string(),
                candidate.kind.as_str(),
                candidate.sub_kind.map(|k| k.as_str()),
                &candidate.content.to_string(),
            )?;
            delivered += 1;
        }
        Ok(delivered)
    }

    /// A user's own notification feed, defaulting to unread entries. The
    /// stored JSON payload is parsed back into an object on the way out.
    pub fn search(&self, user_id: Uuid, query: &NotificationQuery) -> Result<Paged<Notification>> {
        let status = query.status.unwrap_or(NotificationStatus::New);
        let limit = query.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
        let offset = query.offset.unwrap_or(0);

        let (rows, total) =
            self.db
                .search_notifications(&user_id.to_string(), status.as_str(), limit, offset)?;
        Ok(Paged {
            items: rows.into_iter().map(notification_from_row).collect(),
            total,
            limit,
            offset,
        })
    }

    /// Bulk mark-as-read; a no-op on an empty id list.
    pub fn mark_read(&self, user_id: Uuid, ids: &[Uuid]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let ids: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
        self.db.mark_notifications_read(&user_id.to_string(), &ids)?;
        Ok(())
    }

    /// Lazily created with every flag on.
    pub fn preferences(&self, user_id: Uuid) -> Result<NotificationPreference> {
        let row = self.db.ensure_preference(&user_id.to_string())?;
        Ok(preference_from_row(row))
    }

    pub fn update_preferences(
        &self,
        user_id: Uuid,
        req: &UpdatePreferenceRequest,
    ) -> Result<NotificationPreference> {
        let row = self.db.update_preference(
            &user_id.to_string(),
            &PreferencePatch {
                story_site: req.story_site,
                story_email: req.story_email,
                story_mobile: req.story_mobile,
                photo_site: req.photo_site,
                photo_email: req.photo_email,
                photo_mobile: req.photo_mobile,
            },
        )?;
        Ok(preference_from_row(row))
    }
}

fn site_flag(pref: &PreferenceRow, sub_kind: Option<PostKind>) -> bool {
    match sub_kind {
        Some(PostKind::Story) => pref.story_site,
        Some(PostKind::Photo) => pref.photo_site,
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tribute_db::models::{NewNok, PreferencePatch};

    struct Fixture {
        db: Arc<Database>,
        notifier: Notifier,
        veteran: Uuid,
        kin1: Uuid,
        kin2: Uuid,
    }

    fn fixture() -> Fixture {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let veteran = Uuid::new_v4();
        let kin1 = Uuid::new_v4();
        let kin2 = Uuid::new_v4();

        db.insert_veteran(&veteran.to_string(), "John Doe").unwrap();
        for (user, name) in [(kin1, "alice"), (kin2, "bob")] {
            db.create_user(
                &user.to_string(),
                name,
                &format!("{}@example.org", name),
                "hash",
                "User",
            )
            .unwrap();
            db.insert_nok(
                &NewNok {
                    id: &Uuid::new_v4().to_string(),
                    user_id: &user.to_string(),
                    veteran_id: &veteran.to_string(),
                    full_name: name,
                    email: &format!("{}@example.org", name),
                    status: "Pending",
                    created_by: &user.to_string(),
                },
                &[],
            )
            .unwrap();
        }

        let notifier = Notifier::new(db.clone());
        Fixture {
            db,
            notifier,
            veteran,
            kin1,
            kin2,
        }
    }

    fn approve_all_kins(f: &Fixture) {
        // lift the one-approved-per-veteran index for fan-out tests; the
        // resolver only cares about status
        f.db.with_conn_mut(|conn| {
            conn.execute("DROP INDEX idx_nok_one_approved", [])?;
            conn.execute("UPDATE next_of_kins SET status = 'Approved'", [])?;
            Ok(())
        })
        .unwrap();
    }

    fn unread_count(f: &Fixture, user: Uuid) -> i64 {
        let (_, total) = f
            .db
            .search_notifications(&user.to_string(), "New", 50, 0)
            .unwrap();
        total
    }

    #[test]
    fn post_created_fans_out_to_approved_kins_only() {
        let f = fixture();

        // nobody approved yet -> no recipients
        f.notifier.notify(&NotificationEvent::PostCreated {
            veteran_id: f.veteran,
            created_by: f.kin1,
            kind: PostKind::Story,
        });
        assert_eq!(unread_count(&f, f.kin1), 0);

        approve_all_kins(&f);
        f.notifier.notify(&NotificationEvent::PostCreated {
            veteran_id: f.veteran,
            created_by: f.kin1,
            kind: PostKind::Story,
        });
        assert_eq!(unread_count(&f, f.kin1), 1);
        assert_eq!(unread_count(&f, f.kin2), 1);
    }

    #[test]
    fn preference_flag_suppresses_and_missing_row_delivers() {
        let f = fixture();
        approve_all_kins(&f);

        // kin1 opts out of photo site notifications; kin2 has no row at all
        f.db.update_preference(
            &f.kin1.to_string(),
            &PreferencePatch {
                photo_site: Some(false),
                story_site: None,
                story_email: None,
                story_mobile: None,
                photo_email: None,
                photo_mobile: None,
            },
        )
        .unwrap();

        f.notifier.notify(&NotificationEvent::PostCreated {
            veteran_id: f.veteran,
            created_by: f.kin1,
            kind: PostKind::Photo,
        });

        assert_eq!(unread_count(&f, f.kin1), 0);
        assert_eq!(unread_count(&f, f.kin2), 1);
    }

    #[test]
    fn post_approved_notifies_the_creator() {
        let f = fixture();
        let creator = Uuid::new_v4();
        f.db.create_user(
            &creator.to_string(),
            "carol",
            "carol@example.org",
            "hash",
            "User",
        )
        .unwrap();

        f.notifier.notify(&NotificationEvent::PostApproved {
            veteran_id: f.veteran,
            approved_by: f.kin1,
            recipient: creator,
            kind: PostKind::Story,
        });

        let (rows, total) = f
            .db
            .search_notifications(&creator.to_string(), "New", 50, 0)
            .unwrap();
        assert_eq!(total, 1);
        let content: serde_json::Value = serde_json::from_str(&rows[0].content).unwrap();
        assert_eq!(content["text"], "Your Story approved.");
        assert_eq!(content["veteranId"], f.veteran.to_string());
    }

    #[test]
    fn nok_notifications_bypass_preferences() {
        let f = fixture();

        // every flag off; Nok candidates must still deliver
        f.db.update_preference(
            &f.kin1.to_string(),
            &PreferencePatch {
                story_site: Some(false),
                story_email: Some(false),
                story_mobile: Some(false),
                photo_site: Some(false),
                photo_email: Some(false),
                photo_mobile: Some(false),
            },
        )
        .unwrap();

        f.notifier.notify(&NotificationEvent::NokDecided {
            veteran_id: f.veteran,
            decided_by: f.kin2,
            recipient: f.kin1,
            approved: false,
        });

        let (rows, total) = f
            .db
            .search_notifications(&f.kin1.to_string(), "New", 50, 0)
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(rows[0].kind, "Nok");
        let content: serde_json::Value = serde_json::from_str(&rows[0].content).unwrap();
        assert_eq!(content["text"], "Your NOK request rejected by admin");
    }

    #[test]
    fn feed_defaults_to_unread_and_mark_read_clears_it() {
        let f = fixture();
        approve_all_kins(&f);

        f.notifier.notify(&NotificationEvent::PostCreated {
            veteran_id: f.veteran,
            created_by: f.kin2,
            kind: PostKind::Story,
        });

        let page = f
            .notifier
            .search(f.kin1, &NotificationQuery::default())
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].kind, NotificationKind::Post);

        let ids: Vec<Uuid> = page.items.iter().map(|n| n.id).collect();
        f.notifier.mark_read(f.kin1, &ids).unwrap();
        assert_eq!(
            f.notifier
                .search(f.kin1, &NotificationQuery::default())
                .unwrap()
                .total,
            0
        );

        // empty id list is a no-op
        f.notifier.mark_read(f.kin1, &[]).unwrap();
    }

    #[test]
    fn preferences_are_created_lazily_with_flags_on() {
        let f = fixture();

        let pref = f.notifier.preferences(f.kin1).unwrap();
        assert!(pref.story_site && pref.photo_site && pref.story_email);

        let pref = f
            .notifier
            .update_preferences(
                f.kin1,
                &UpdatePreferenceRequest {
                    story_site: Some(false),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(!pref.story_site);
        assert!(pref.photo_site);
    }

    #[test]
    fn notification_content_round_trips() {
        let f = fixture();
        approve_all_kins(&f);

        f.notifier.notify(&NotificationEvent::PostCreated {
            veteran_id: f.veteran,
            created_by: f.kin1,
            kind: PostKind::Story,
        });

        let (rows, _) = f
            .db
            .search_notifications(&f.kin1.to_string(), "New", 50, 0)
            .unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&rows[0].content).unwrap();
        assert_eq!(parsed, json!({ "veteranId": f.veteran.to_string() }));
    }
}
