use std::sync::Arc;

use uuid::Uuid;

use tribute_db::Database;
use tribute_db::models::{NewFile, NewPhoto, NewStory, PhotoPatch, StoryPatch};
use tribute_types::api::{CreateStoryRequest, Paged, PostQuery, UpdateStoryRequest};
use tribute_types::events::NotificationEvent;
use tribute_types::models::{Post, PostKind, Role, Status};

use crate::convert::post_from_row;
use crate::notify::Notifier;
use crate::policy::{AuthUser, can_manage};
use crate::storage::{BlobStore, file_name_from_url};
use crate::visibility::restrict_post_query;
use crate::{Error, Result};

/// Raw photo payload as received by the HTTP layer.
pub struct PhotoUpload {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

pub struct CreatePhotoRequest {
    pub veteran_id: Uuid,
    pub title: String,
    pub status: Option<Status>,
}

#[derive(Default)]
pub struct UpdatePhotoRequest {
    pub veteran_id: Option<Uuid>,
    pub title: Option<String>,
    pub status: Option<Status>,
}

/// The moderation capability set (approve, reject, salute, share, view,
/// remove, search) implemented once and parameterized by [`PostKind`]
/// instead of being repeated per content kind.
#[derive(Clone)]
pub struct ModerationService {
    db: Arc<Database>,
    storage: Arc<dyn BlobStore>,
    notifier: Notifier,
}

impl ModerationService {
    pub fn new(db: Arc<Database>, storage: Arc<dyn BlobStore>, notifier: Notifier) -> Self {
        Self {
            db,
            storage,
            notifier,
        }
    }

    fn ensure_veteran(&self, id: Uuid) -> Result<()> {
        if self.db.get_veteran(&id.to_string())?.is_none() {
            return Err(Error::not_found(format!(
                "Veteran with id: {} does not exist!",
                id
            )));
        }
        Ok(())
    }

    fn fetch_post(&self, kind: PostKind, id: Uuid) -> Result<Post> {
        let row = self
            .db
            .get_post(kind, &id.to_string())?
            .ok_or_else(|| {
                Error::not_found(format!("{} with id: {} does not exist!", kind.as_str(), id))
            })?;
        Ok(post_from_row(kind, row))
    }

    /// A caller-supplied initial status is honored only when the creator
    /// already manages the veteran; everyone else starts at Pending.
    fn initial_status(
        &self,
        actor: &AuthUser,
        veteran_id: Uuid,
        requested: Option<Status>,
    ) -> Result<Status> {
        match requested {
            None | Some(Status::Pending) => Ok(Status::Pending),
            Some(status) => {
                if can_manage(&self.db, actor, veteran_id)? {
                    Ok(status)
                } else {
                    Ok(Status::Pending)
                }
            }
        }
    }

    fn gate_manage(&self, actor: &AuthUser, veteran_id: Uuid) -> Result<()> {
        if !can_manage(&self.db, actor, veteran_id)? {
            return Err(Error::forbidden(
                "User is not allowed to manage the veteran.",
            ));
        }
        Ok(())
    }

    pub async fn create_story(&self, actor: &AuthUser, req: CreateStoryRequest) -> Result<Post> {
        self.ensure_veteran(req.veteran_id)?;
        let status = self.initial_status(actor, req.veteran_id, req.status)?;

        let id = Uuid::new_v4();
        self.db.insert_story(&NewStory {
            id: &id.to_string(),
            veteran_id: &req.veteran_id.to_string(),
            title: &req.title,
            text: &req.text,
            status: status.as_str(),
            created_by: &actor.id.to_string(),
        })?;

        self.notifier.notify(&NotificationEvent::PostCreated {
            veteran_id: req.veteran_id,
            created_by: actor.id,
            kind: PostKind::Story,
        });

        self.fetch_post(PostKind::Story, id)
    }

    /// The blob goes out first; the file metadata row and the photo row then
    /// land in one transaction, so either both exist or neither does.
    pub async fn create_photo(
        &self,
        actor: &AuthUser,
        req: CreatePhotoRequest,
        upload: PhotoUpload,
    ) -> Result<Post> {
        self.ensure_veteran(req.veteran_id)?;
        let status = self.initial_status(actor, req.veteran_id, req.status)?;

        let meta = self.storage.upload(&upload.bytes, &upload.mime_type).await?;

        let id = Uuid::new_v4();
        self.db.insert_photo(
            &NewPhoto {
                id: &id.to_string(),
                veteran_id: &req.veteran_id.to_string(),
                title: &req.title,
                status: status.as_str(),
                created_by: &actor.id.to_string(),
            },
            &NewFile {
                id: &Uuid::new_v4().to_string(),
                name: &meta.name,
                file_url: &meta.url,
                mime_type: &meta.mime_type,
            },
        )?;

        self.notifier.notify(&NotificationEvent::PostCreated {
            veteran_id: req.veteran_id,
            created_by: actor.id,
            kind: PostKind::Photo,
        });

        self.fetch_post(PostKind::Photo, id)
    }

    /// Every single-item read is also a write: the view counter moves as an
    /// atomic increment at the storage layer before the row is returned.
    pub async fn get_single(&self, kind: PostKind, id: Uuid) -> Result<Post> {
        if !self.db.bump_view_count(kind, &id.to_string())? {
            return Err(Error::not_found(format!(
                "{} with id: {} does not exist!",
                kind.as_str(),
                id
            )));
        }
        self.fetch_post(kind, id)
    }

    pub async fn approve(&self, kind: PostKind, id: Uuid, actor: &AuthUser) -> Result<()> {
        let post = self.fetch_post(kind, id)?;
        self.gate_manage(actor, post.veteran_id)?;

        // recipient computation uses the pre-transition row; emission does
        // not wait for the status flip to commit
        self.notifier.notify(&NotificationEvent::PostApproved {
            veteran_id: post.veteran_id,
            approved_by: actor.id,
            recipient: post.created_by,
            kind,
        });

        self.db.set_post_status(
            kind,
            &id.to_string(),
            Status::Approved.as_str(),
            &actor.id.to_string(),
            None,
        )?;
        Ok(())
    }

    pub async fn reject(
        &self,
        kind: PostKind,
        id: Uuid,
        actor: &AuthUser,
        response: &str,
    ) -> Result<()> {
        let post = self.fetch_post(kind, id)?;
        self.gate_manage(actor, post.veteran_id)?;

        self.db.set_post_status(
            kind,
            &id.to_string(),
            Status::Rejected.as_str(),
            &actor.id.to_string(),
            Some(response),
        )?;
        Ok(())
    }

    /// Idempotent per user: the ledger row decides whether the counter moves.
    pub async fn salute(&self, kind: PostKind, id: Uuid, user_id: Uuid) -> Result<()> {
        self.fetch_post(kind, id)?;
        self.db
            .salute_post(kind, &id.to_string(), &user_id.to_string())?;
        Ok(())
    }

    pub async fn is_saluted(&self, kind: PostKind, id: Uuid, user: Option<Uuid>) -> Result<bool> {
        self.fetch_post(kind, id)?;
        let Some(user) = user else {
            return Ok(false);
        };
        let saluted = self
            .db
            .is_post_saluted(kind, &id.to_string(), &user.to_string())?;
        Ok(saluted)
    }

    pub async fn share(&self, kind: PostKind, id: Uuid) -> Result<Post> {
        if !self.db.bump_share_count(kind, &id.to_string())? {
            return Err(Error::not_found(format!(
                "{} with id: {} does not exist!",
                kind.as_str(),
                id
            )));
        }
        self.fetch_post(kind, id)
    }

    pub async fn update_story(
        &self,
        actor: &AuthUser,
        id: Uuid,
        req: UpdateStoryRequest,
    ) -> Result<Post> {
        let existing = self.fetch_post(PostKind::Story, id)?;
        if let Some(veteran_id) = req.veteran_id {
            self.ensure_veteran(veteran_id)?;
        }
        // only managers may move the status through an edit
        if req.status.is_some() {
            self.gate_manage(actor, existing.veteran_id)?;
        }

        let veteran_id = req.veteran_id.map(|v| v.to_string());
        self.db.update_story(
            &id.to_string(),
            &StoryPatch {
                veteran_id: veteran_id.as_deref(),
                title: req.title.as_deref(),
                text: req.text.as_deref(),
                status: req.status.map(|s| s.as_str()),
                updated_by: &actor.id.to_string(),
            },
        )?;

        self.fetch_post(PostKind::Story, id)
    }

    pub async fn update_photo(
        &self,
        actor: &AuthUser,
        id: Uuid,
        req: UpdatePhotoRequest,
        upload: Option<PhotoUpload>,
    ) -> Result<Post> {
        let existing = self.fetch_post(PostKind::Photo, id)?;
        if let Some(veteran_id) = req.veteran_id {
            self.ensure_veteran(veteran_id)?;
        }
        if req.status.is_some() {
            self.gate_manage(actor, existing.veteran_id)?;
        }

        let veteran_id = req.veteran_id.map(|v| v.to_string());
        self.db.update_photo(
            &id.to_string(),
            &PhotoPatch {
                veteran_id: veteran_id.as_deref(),
                title: req.title.as_deref(),
                status: req.status.map(|s| s.as_str()),
                updated_by: &actor.id.to_string(),
            },
        )?;

        if let Some(upload) = upload {
            let meta = self.storage.upload(&upload.bytes, &upload.mime_type).await?;
            let replaced = self.db.replace_photo_file(
                &id.to_string(),
                &actor.id.to_string(),
                &NewFile {
                    id: &Uuid::new_v4().to_string(),
                    name: &meta.name,
                    file_url: &meta.url,
                    mime_type: &meta.mime_type,
                },
            )?;
            if let Some(old) = replaced {
                self.storage.delete(file_name_from_url(&old.file_url)).await?;
            }
        }

        self.fetch_post(PostKind::Photo, id)
    }

    /// Removal is role-gated, not `can_manage`-gated. Blobs go first, parsed
    /// back to their storage key from the stored URL, then the row.
    pub async fn remove(&self, kind: PostKind, id: Uuid, actor: &AuthUser) -> Result<()> {
        if actor.role != Role::Admin {
            return Err(Error::forbidden(
                "You are not allowed to perform this action!",
            ));
        }

        let post = self.fetch_post(kind, id)?;
        if let Some(photo) = &post.photo {
            self.storage.delete(file_name_from_url(&photo.url)).await?;
        }
        self.db.delete_post(kind, &id.to_string())?;
        Ok(())
    }

    pub async fn search(
        &self,
        kind: PostKind,
        viewer: Option<&AuthUser>,
        query: &PostQuery,
    ) -> Result<Paged<Post>> {
        let filter = restrict_post_query(&self.db, viewer, query)?;
        let (rows, total) = self.db.search_posts(kind, &filter)?;
        Ok(Paged {
            items: rows
                .into_iter()
                .map(|row| post_from_row(kind, row))
                .collect(),
            total,
            limit: filter.limit,
            offset: filter.offset,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result as AnyResult;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tribute_db::models::NewNok;
    use tribute_types::models::UploadedFile;

    /// In-memory blob store that records deletions.
    #[derive(Default)]
    struct RecordingBlobStore {
        deleted: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl BlobStore for RecordingBlobStore {
        async fn upload(&self, _bytes: &[u8], mime_type: &str) -> AnyResult<UploadedFile> {
            let name = Uuid::new_v4().to_string();
            Ok(UploadedFile {
                url: format!("http://localhost:3000/uploads/{}", name),
                name,
                mime_type: mime_type.to_string(),
            })
        }

        async fn delete(&self, name: &str) -> AnyResult<()> {
            self.deleted.lock().unwrap().push(name.to_string());
            Ok(())
        }
    }

    struct Fixture {
        db: Arc<Database>,
        service: ModerationService,
        blobs: Arc<RecordingBlobStore>,
        veteran: Uuid,
        creator: AuthUser,
        kin: AuthUser,
        stranger: AuthUser,
        admin: AuthUser,
    }

    fn fixture() -> Fixture {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let veteran = Uuid::new_v4();
        db.insert_veteran(&veteran.to_string(), "John Doe").unwrap();

        let mut users = Vec::new();
        for (name, role) in [
            ("creator", Role::User),
            ("kin", Role::User),
            ("stranger", Role::User),
            ("admin", Role::Admin),
        ] {
            let user = AuthUser {
                id: Uuid::new_v4(),
                role,
            };
            db.create_user(
                &user.id.to_string(),
                name,
                &format!("{}@example.org", name),
                "hash",
                role.as_str(),
            )
            .unwrap();
            users.push(user);
        }
        let (creator, kin, stranger, admin) = (users[0], users[1], users[2], users[3]);

        db.insert_nok(
            &NewNok {
                id: &Uuid::new_v4().to_string(),
                user_id: &kin.id.to_string(),
                veteran_id: &veteran.to_string(),
                full_name: "Kin",
                email: "kin@example.org",
                status: "Approved",
                created_by: &kin.id.to_string(),
            },
            &[],
        )
        .unwrap();

        let blobs = Arc::new(RecordingBlobStore::default());
        let service = ModerationService::new(
            db.clone(),
            blobs.clone(),
            Notifier::new(db.clone()),
        );

        Fixture {
            db,
            service,
            blobs,
            veteran,
            creator,
            kin,
            stranger,
            admin,
        }
    }

    async fn seed_story(f: &Fixture) -> Post {
        f.service
            .create_story(
                &f.creator,
                CreateStoryRequest {
                    veteran_id: f.veteran,
                    title: "A memory".into(),
                    text: "He was kind.".into(),
                    status: None,
                },
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn creation_starts_pending_for_non_managers() {
        let f = fixture();
        let post = f
            .service
            .create_story(
                &f.creator,
                CreateStoryRequest {
                    veteran_id: f.veteran,
                    title: "A memory".into(),
                    text: "He was kind.".into(),
                    status: Some(Status::Approved),
                },
            )
            .await
            .unwrap();
        assert_eq!(post.status, Status::Pending);
    }

    #[tokio::test]
    async fn managers_may_create_approved() {
        let f = fixture();
        let post = f
            .service
            .create_story(
                &f.admin,
                CreateStoryRequest {
                    veteran_id: f.veteran,
                    title: "Official record".into(),
                    text: "Served 1944-1946.".into(),
                    status: Some(Status::Approved),
                },
            )
            .await
            .unwrap();
        assert_eq!(post.status, Status::Approved);
    }

    #[tokio::test]
    async fn creation_requires_an_existing_veteran() {
        let f = fixture();
        let err = f
            .service
            .create_story(
                &f.creator,
                CreateStoryRequest {
                    veteran_id: Uuid::new_v4(),
                    title: "A memory".into(),
                    text: "He was kind.".into(),
                    status: None,
                },
            )
            .await;
        assert!(matches!(err, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn creation_fans_out_to_approved_kins() {
        let f = fixture();
        seed_story(&f).await;

        let (_, total) = f
            .db
            .search_notifications(&f.kin.id.to_string(), "New", 50, 0)
            .unwrap();
        assert_eq!(total, 1);
    }

    #[tokio::test]
    async fn approve_is_forbidden_for_strangers_and_leaves_status() {
        let f = fixture();
        let post = seed_story(&f).await;

        let err = f
            .service
            .approve(PostKind::Story, post.id, &f.stranger)
            .await;
        assert!(matches!(err, Err(Error::Forbidden(_))));

        let unchanged = f.service.get_single(PostKind::Story, post.id).await.unwrap();
        assert_eq!(unchanged.status, Status::Pending);
    }

    #[tokio::test]
    async fn approve_flips_status_and_notifies_the_creator() {
        let f = fixture();
        let post = seed_story(&f).await;

        f.service
            .approve(PostKind::Story, post.id, &f.kin)
            .await
            .unwrap();

        let approved = f.service.get_single(PostKind::Story, post.id).await.unwrap();
        assert_eq!(approved.status, Status::Approved);
        assert_eq!(approved.updated_by, Some(f.kin.id));

        let (rows, _) = f
            .db
            .search_notifications(&f.creator.id.to_string(), "New", 50, 0)
            .unwrap();
        let texts: Vec<String> = rows
            .iter()
            .filter_map(|r| serde_json::from_str::<serde_json::Value>(&r.content).ok())
            .filter_map(|c| c["text"].as_str().map(String::from))
            .collect();
        assert!(texts.contains(&"Your Story approved.".to_string()));
    }

    #[tokio::test]
    async fn reject_records_the_response() {
        let f = fixture();
        let post = seed_story(&f).await;

        f.service
            .reject(PostKind::Story, post.id, &f.kin, "Duplicate submission")
            .await
            .unwrap();

        let rejected = f.service.get_single(PostKind::Story, post.id).await.unwrap();
        assert_eq!(rejected.status, Status::Rejected);
        assert_eq!(rejected.response.as_deref(), Some("Duplicate submission"));
    }

    #[tokio::test]
    async fn get_single_counts_every_view() {
        let f = fixture();
        let post = seed_story(&f).await;

        let first = f.service.get_single(PostKind::Story, post.id).await.unwrap();
        let second = f.service.get_single(PostKind::Story, post.id).await.unwrap();
        assert_eq!(second.view_count, first.view_count + 1);
        assert_eq!(second.title, first.title);
        assert_eq!(second.salute_count, first.salute_count);

        let err = f.service.get_single(PostKind::Story, Uuid::new_v4()).await;
        assert!(matches!(err, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn salute_never_double_counts() {
        let f = fixture();
        let post = seed_story(&f).await;

        for _ in 0..3 {
            f.service
                .salute(PostKind::Story, post.id, f.stranger.id)
                .await
                .unwrap();
        }

        let after = f.service.get_single(PostKind::Story, post.id).await.unwrap();
        assert_eq!(after.salute_count, 1);
        assert!(
            f.service
                .is_saluted(PostKind::Story, post.id, Some(f.stranger.id))
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn anonymous_is_saluted_is_always_false() {
        let f = fixture();
        let post = seed_story(&f).await;

        let saluted = f
            .service
            .is_saluted(PostKind::Story, post.id, None)
            .await
            .unwrap();
        assert!(!saluted);

        let err = f.service.is_saluted(PostKind::Story, Uuid::new_v4(), None).await;
        assert!(matches!(err, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn share_bumps_the_counter() {
        let f = fixture();
        let post = seed_story(&f).await;

        let shared = f.service.share(PostKind::Story, post.id).await.unwrap();
        assert_eq!(shared.share_count, 1);
        let shared = f.service.share(PostKind::Story, post.id).await.unwrap();
        assert_eq!(shared.share_count, 2);
    }

    #[tokio::test]
    async fn remove_is_admin_only_and_drops_the_blob() {
        let f = fixture();
        let photo = f
            .service
            .create_photo(
                &f.creator,
                CreatePhotoRequest {
                    veteran_id: f.veteran,
                    title: "In uniform".into(),
                    status: None,
                },
                PhotoUpload {
                    bytes: vec![1, 2, 3],
                    mime_type: "image/jpeg".into(),
                },
            )
            .await
            .unwrap();

        let err = f.service.remove(PostKind::Photo, photo.id, &f.creator).await;
        assert!(matches!(err, Err(Error::Forbidden(_))));

        f.service
            .remove(PostKind::Photo, photo.id, &f.admin)
            .await
            .unwrap();

        let blob_name = photo.photo.as_ref().unwrap().name.clone();
        assert_eq!(*f.blobs.deleted.lock().unwrap(), vec![blob_name]);

        let err = f.service.get_single(PostKind::Photo, photo.id).await;
        assert!(matches!(err, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn anonymous_search_sees_only_approved() {
        let f = fixture();
        seed_story(&f).await;
        let approved = f
            .service
            .create_story(
                &f.admin,
                CreateStoryRequest {
                    veteran_id: f.veteran,
                    title: "Visible".into(),
                    text: "Approved text".into(),
                    status: Some(Status::Approved),
                },
            )
            .await
            .unwrap();

        let page = f
            .service
            .search(PostKind::Story, None, &PostQuery::default())
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].id, approved.id);
    }
}
