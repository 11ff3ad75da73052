use std::sync::Arc;

use uuid::Uuid;

use tribute_db::Database;
use tribute_db::models::{NewFile, NewNok, NokDecision, NokPatch, NokSearch};
use tribute_types::api::{NokQuery, Paged};
use tribute_types::events::NotificationEvent;
use tribute_types::models::{NextOfKin, Role, Status};

use crate::convert::nok_from_row;
use crate::notify::Notifier;
use crate::policy::AuthUser;
use crate::storage::{BlobStore, file_name_from_url};
use crate::{Error, Result};

const DEFAULT_LIMIT: u32 = 50;
const MAX_LIMIT: u32 = 200;

pub struct ProofUpload {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

pub struct CreateNokRequest {
    pub user_id: Uuid,
    pub veteran_id: Uuid,
    pub full_name: String,
    pub email: String,
}

#[derive(Default)]
pub struct UpdateNokRequest {
    pub full_name: Option<String>,
    pub email: Option<String>,
}

/// Next-of-kin lifecycle: request with proof documents, admin decision,
/// requester notification.
#[derive(Clone)]
pub struct KinService {
    db: Arc<Database>,
    storage: Arc<dyn BlobStore>,
    notifier: Notifier,
}

impl KinService {
    pub fn new(db: Arc<Database>, storage: Arc<dyn BlobStore>, notifier: Notifier) -> Self {
        Self {
            db,
            storage,
            notifier,
        }
    }

    fn fetch(&self, id: Uuid) -> Result<NextOfKin> {
        let row = self.db.get_nok(&id.to_string())?.ok_or_else(|| {
            Error::not_found(format!("Next of kin with id: {} does not exist!", id))
        })?;
        let proofs = self.db.nok_proofs(&id.to_string())?;
        Ok(nok_from_row(row, proofs))
    }

    fn gate_admin(&self, actor: &AuthUser) -> Result<()> {
        if actor.role != Role::Admin {
            return Err(Error::forbidden(
                "You are not allowed to perform this action!",
            ));
        }
        Ok(())
    }

    fn check_has_approved(&self, veteran_id: Uuid) -> Result<()> {
        if self.db.approved_nok_exists(&veteran_id.to_string())? {
            return Err(Error::conflict(
                "An approved next-of-kin already exists for this veteran.",
            ));
        }
        Ok(())
    }

    /// Proof blobs go out first; the kin row, its file rows and the
    /// associations then land in one transaction.
    pub async fn create(
        &self,
        actor: &AuthUser,
        req: CreateNokRequest,
        proofs: Vec<ProofUpload>,
    ) -> Result<NextOfKin> {
        if proofs.is_empty() {
            return Err(Error::bad_request("At least one proof file is required."));
        }
        if self.db.get_user_by_id(&req.user_id.to_string())?.is_none() {
            return Err(Error::not_found(format!(
                "User with id: {} does not exist!",
                req.user_id
            )));
        }
        if self.db.get_veteran(&req.veteran_id.to_string())?.is_none() {
            return Err(Error::not_found(format!(
                "Veteran with id: {} does not exist!",
                req.veteran_id
            )));
        }
        self.check_has_approved(req.veteran_id)?;

        let mut files = Vec::with_capacity(proofs.len());
        for proof in &proofs {
            let meta = self.storage.upload(&proof.bytes, &proof.mime_type).await?;
            files.push((Uuid::new_v4().to_string(), meta));
        }
        let file_rows: Vec<NewFile> = files
            .iter()
            .map(|(id, meta)| NewFile {
                id,
                name: &meta.name,
                file_url: &meta.url,
                mime_type: &meta.mime_type,
            })
            .collect();

        let id = Uuid::new_v4();
        self.db.insert_nok(
            &NewNok {
                id: &id.to_string(),
                user_id: &req.user_id.to_string(),
                veteran_id: &req.veteran_id.to_string(),
                full_name: &req.full_name,
                email: &req.email,
                status: Status::Pending.as_str(),
                created_by: &actor.id.to_string(),
            },
            &file_rows,
        )?;

        self.fetch(id)
    }

    pub async fn get_single(&self, id: Uuid) -> Result<NextOfKin> {
        self.fetch(id)
    }

    pub async fn search(&self, query: &NokQuery) -> Result<Paged<NextOfKin>> {
        let filter = NokSearch {
            veteran_id: query.veteran_id.map(|v| v.to_string()),
            user_id: query.user_id.map(|u| u.to_string()),
            status: query.status.map(|s| s.as_str().to_string()),
            limit: query.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT),
            offset: query.offset.unwrap_or(0),
        };
        let (rows, total) = self.db.search_noks(&filter)?;

        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            let proofs = self.db.nok_proofs(&row.id)?;
            items.push(nok_from_row(row, proofs));
        }
        Ok(Paged {
            items,
            total,
            limit: filter.limit,
            offset: filter.offset,
        })
    }

    /// Replaces the proof set wholesale; superseded blobs are dropped after
    /// the transaction commits.
    pub async fn update(
        &self,
        actor: &AuthUser,
        id: Uuid,
        req: UpdateNokRequest,
        proofs: Vec<ProofUpload>,
    ) -> Result<NextOfKin> {
        if proofs.is_empty() {
            return Err(Error::bad_request("At least one proof file is required."));
        }
        self.fetch(id)?;

        let mut files = Vec::with_capacity(proofs.len());
        for proof in &proofs {
            let meta = self.storage.upload(&proof.bytes, &proof.mime_type).await?;
            files.push((Uuid::new_v4().to_string(), meta));
        }
        let file_rows: Vec<NewFile> = files
            .iter()
            .map(|(fid, meta)| NewFile {
                id: fid,
                name: &meta.name,
                file_url: &meta.url,
                mime_type: &meta.mime_type,
            })
            .collect();

        let replaced = self.db.update_nok(
            &id.to_string(),
            &NokPatch {
                full_name: req.full_name.as_deref(),
                email: req.email.as_deref(),
                status: None,
                response: None,
                updated_by: &actor.id.to_string(),
            },
            &file_rows,
        )?;

        for old in replaced {
            self.storage.delete(file_name_from_url(&old.file_url)).await?;
        }

        self.fetch(id)
    }

    pub async fn remove(&self, actor: &AuthUser, id: Uuid) -> Result<()> {
        self.gate_admin(actor)?;
        self.fetch(id)?;

        let proofs = self.db.delete_nok(&id.to_string())?;
        for old in proofs {
            self.storage.delete(file_name_from_url(&old.file_url)).await?;
        }
        Ok(())
    }

    /// Admin decision. The pre-check catches the common duplicate case; the
    /// storage-level partial unique index decides a concurrent race, so two
    /// simultaneous approvals can never both succeed.
    pub async fn approve(&self, actor: &AuthUser, id: Uuid) -> Result<()> {
        self.gate_admin(actor)?;
        let kin = self.fetch(id)?;
        self.check_has_approved(kin.veteran_id)?;

        match self.db.approve_nok(&id.to_string(), &actor.id.to_string())? {
            NokDecision::Updated => {}
            NokDecision::Conflict => {
                return Err(Error::conflict(
                    "An approved next-of-kin already exists for this veteran.",
                ));
            }
        }

        self.notifier.notify(&NotificationEvent::NokDecided {
            veteran_id: kin.veteran_id,
            decided_by: actor.id,
            recipient: kin.user_id,
            approved: true,
        });
        Ok(())
    }

    pub async fn reject(&self, actor: &AuthUser, id: Uuid, response: &str) -> Result<()> {
        self.gate_admin(actor)?;
        let kin = self.fetch(id)?;

        self.db
            .reject_nok(&id.to_string(), response, &actor.id.to_string())?;

        self.notifier.notify(&NotificationEvent::NokDecided {
            veteran_id: kin.veteran_id,
            decided_by: actor.id,
            recipient: kin.user_id,
            approved: false,
        });
        Ok(())
    }
}
