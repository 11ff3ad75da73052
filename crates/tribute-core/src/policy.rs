use uuid::Uuid;

use tribute_db::Database;
use tribute_types::models::Role;

use crate::Result;

/// An authenticated principal as the core sees it.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub id: Uuid,
    pub role: Role,
}

/// Whether the user may manage (approve, reject, see unapproved content for)
/// the veteran. Admins always may; otherwise an approved next-of-kin record
/// is required. Read-only.
pub fn can_manage(db: &Database, user: &AuthUser, veteran_id: Uuid) -> Result<bool> {
    if user.role == Role::Admin {
        return Ok(true);
    }
    let found = db.has_approved_nok(&user.id.to_string(), &veteran_id.to_string())?;
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tribute_db::models::NewNok;

    fn setup() -> (Database, Uuid, Uuid) {
        let db = Database::open_in_memory().unwrap();
        let user = Uuid::new_v4();
        let veteran = Uuid::new_v4();
        db.create_user(&user.to_string(), "alice", "alice@example.org", "hash", "User")
            .unwrap();
        db.insert_veteran(&veteran.to_string(), "John Doe").unwrap();
        (db, user, veteran)
    }

    #[test]
    fn admin_manages_everything() {
        let (db, user, veteran) = setup();
        let admin = AuthUser {
            id: user,
            role: Role::Admin,
        };
        assert!(can_manage(&db, &admin, veteran).unwrap());
        assert!(can_manage(&db, &admin, Uuid::new_v4()).unwrap());
    }

    #[test]
    fn approved_next_of_kin_manages_their_veteran() {
        let (db, user, veteran) = setup();
        db.insert_nok(
            &NewNok {
                id: &Uuid::new_v4().to_string(),
                user_id: &user.to_string(),
                veteran_id: &veteran.to_string(),
                full_name: "Alice Kin",
                email: "alice@example.org",
                status: "Approved",
                created_by: &user.to_string(),
            },
            &[],
        )
        .unwrap();

        let u = AuthUser {
            id: user,
            role: Role::User,
        };
        assert!(can_manage(&db, &u, veteran).unwrap());
        assert!(!can_manage(&db, &u, Uuid::new_v4()).unwrap());
    }

    #[test]
    fn pending_next_of_kin_does_not_manage() {
        let (db, user, veteran) = setup();
        db.insert_nok(
            &NewNok {
                id: &Uuid::new_v4().to_string(),
                user_id: &user.to_string(),
                veteran_id: &veteran.to_string(),
                full_name: "Alice Kin",
                email: "alice@example.org",
                status: "Pending",
                created_by: &user.to_string(),
            },
            &[],
        )
        .unwrap();

        let u = AuthUser {
            id: user,
            role: Role::User,
        };
        assert!(!can_manage(&db, &u, veteran).unwrap());
    }
}
