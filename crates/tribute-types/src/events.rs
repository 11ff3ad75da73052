use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::PostKind;

/// Events that feed the notification pipeline. Each moderation action emits
/// at most one of these; the resolver expands it into per-recipient
/// candidates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum NotificationEvent {
    /// A post was submitted for a veteran. Fans out to every approved
    /// next-of-kin of that veteran.
    PostCreated {
        veteran_id: Uuid,
        created_by: Uuid,
        kind: PostKind,
    },

    /// A post was approved. Goes to the submitter only.
    PostApproved {
        veteran_id: Uuid,
        approved_by: Uuid,
        recipient: Uuid,
        kind: PostKind,
    },

    /// A next-of-kin request was decided. Goes to the requester only.
    NokDecided {
        veteran_id: Uuid,
        decided_by: Uuid,
        recipient: Uuid,
        approved: bool,
    },
}
