use tribute_db::Database;
use tribute_db::models::PostSearch;
use tribute_types::api::PostQuery;
use tribute_types::models::Status;

use crate::policy::{AuthUser, can_manage};
use crate::{Error, Result};

const DEFAULT_LIMIT: u32 = 50;
const MAX_LIMIT: u32 = 200;

/// Builds the effective search filter for a viewer. Non-managers and
/// anonymous callers only ever see approved content; asking for anything
/// else is a bad request.
pub fn restrict_post_query(
    db: &Database,
    viewer: Option<&AuthUser>,
    query: &PostQuery,
) -> Result<PostSearch> {
    let mut status = query.status;

    match viewer {
        None => {
            if status.is_some() && status != Some(Status::Approved) {
                return Err(Error::bad_request(
                    "User can search only approved veteran content.",
                ));
            }
            status = Some(Status::Approved);
        }
        Some(viewer) => {
            if let Some(veteran_id) = query.veteran_id {
                match status {
                    None => status = Some(Status::Approved),
                    Some(Status::Approved) => {}
                    Some(_) => {
                        if !can_manage(db, viewer, veteran_id)? {
                            return Err(Error::bad_request(
                                "User can search only approved veteran content.",
                            ));
                        }
                    }
                }
            }
        }
    }

    let veteran_in = if query.review {
        let Some(viewer) = viewer else {
            return Err(Error::bad_request(
                "User must be logged in to make this query.",
            ));
        };
        Some(db.approved_veteran_ids(&viewer.id.to_string())?)
    } else {
        None
    };

    Ok(PostSearch {
        veteran_id: query.veteran_id.map(|v| v.to_string()),
        created_by: query.user_id.map(|u| u.to_string()),
        status: status.map(|s| s.as_str().to_string()),
        veteran_in,
        limit: query.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT),
        offset: query.offset.unwrap_or(0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tribute_db::models::NewNok;
    use tribute_types::models::Role;
    use uuid::Uuid;

    fn setup() -> (Database, Uuid, AuthUser, AuthUser) {
        let db = Database::open_in_memory().unwrap();
        let veteran = Uuid::new_v4();
        db.insert_veteran(&veteran.to_string(), "John Doe").unwrap();

        let kin = AuthUser {
            id: Uuid::new_v4(),
            role: Role::User,
        };
        db.create_user(&kin.id.to_string(), "alice", "alice@example.org", "hash", "User")
            .unwrap();
        db.insert_nok(
            &NewNok {
                id: &Uuid::new_v4().to_string(),
                user_id: &kin.id.to_string(),
                veteran_id: &veteran.to_string(),
                full_name: "Alice Kin",
                email: "alice@example.org",
                status: "Approved",
                created_by: &kin.id.to_string(),
            },
            &[],
        )
        .unwrap();

        let stranger = AuthUser {
            id: Uuid::new_v4(),
            role: Role::User,
        };
        (db, veteran, kin, stranger)
    }

    #[test]
    fn anonymous_viewers_are_forced_to_approved() {
        let (db, veteran, _, _) = setup();
        let q = PostQuery {
            veteran_id: Some(veteran),
            ..Default::default()
        };
        let filter = restrict_post_query(&db, None, &q).unwrap();
        assert_eq!(filter.status.as_deref(), Some("Approved"));

        // even with no veteran filter
        let filter = restrict_post_query(&db, None, &PostQuery::default()).unwrap();
        assert_eq!(filter.status.as_deref(), Some("Approved"));
    }

    #[test]
    fn anonymous_request_for_rejected_is_a_bad_request() {
        let (db, veteran, _, _) = setup();
        let q = PostQuery {
            veteran_id: Some(veteran),
            status: Some(Status::Rejected),
            ..Default::default()
        };
        assert!(matches!(
            restrict_post_query(&db, None, &q),
            Err(Error::BadRequest(_))
        ));
    }

    #[test]
    fn non_manager_cannot_request_unapproved_statuses() {
        let (db, veteran, _, stranger) = setup();
        let q = PostQuery {
            veteran_id: Some(veteran),
            status: Some(Status::Rejected),
            ..Default::default()
        };
        assert!(matches!(
            restrict_post_query(&db, Some(&stranger), &q),
            Err(Error::BadRequest(_))
        ));
    }

    #[test]
    fn managers_may_request_any_status() {
        let (db, veteran, kin, _) = setup();
        let q = PostQuery {
            veteran_id: Some(veteran),
            status: Some(Status::Pending),
            ..Default::default()
        };
        let filter = restrict_post_query(&db, Some(&kin), &q).unwrap();
        assert_eq!(filter.status.as_deref(), Some("Pending"));
    }

    #[test]
    fn missing_status_defaults_to_approved_for_veteran_queries() {
        let (db, veteran, kin, _) = setup();
        let q = PostQuery {
            veteran_id: Some(veteran),
            ..Default::default()
        };
        let filter = restrict_post_query(&db, Some(&kin), &q).unwrap();
        assert_eq!(filter.status.as_deref(), Some("Approved"));
    }

    #[test]
    fn review_mode_restricts_to_managed_veterans() {
        let (db, veteran, kin, stranger) = setup();
        let q = PostQuery {
            review: true,
            ..Default::default()
        };

        let filter = restrict_post_query(&db, Some(&kin), &q).unwrap();
        assert_eq!(filter.veteran_in, Some(vec![veteran.to_string()]));

        let filter = restrict_post_query(&db, Some(&stranger), &q).unwrap();
        assert_eq!(filter.veteran_in, Some(vec![]));

        assert!(matches!(
            restrict_post_query(&db, None, &q),
            Err(Error::BadRequest(_))
        ));
    }

    #[test]
    fn limits_are_capped() {
        let (db, _, kin, _) = setup();
        let q = PostQuery {
            limit: Some(10_000),
            ..Default::default()
        };
        let filter = restrict_post_query(&db, Some(&kin), &q).unwrap();
        assert_eq!(filter.limit, 200);
    }
}
