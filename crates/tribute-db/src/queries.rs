use anyhow::Result;
use rusqlite::{OptionalExtension, params};
use tribute_types::models::PostKind;

use crate::Database;
use crate::models::{
    FileRow, NewFile, NewNok, NewPhoto, NewStory, NokDecision, NokPatch, NokRow, NokSearch,
    NotificationRow, PhotoPatch, PostRow, PostSearch, PreferencePatch, PreferenceRow, StoryPatch,
    UserRow, VeteranRow,
};

fn table(kind: PostKind) -> &'static str {
    match kind {
        PostKind::Story => "stories",
        PostKind::Photo => "photos",
    }
}

fn post_select(kind: PostKind) -> &'static str {
    match kind {
        PostKind::Story => {
            "SELECT p.id, p.veteran_id, p.title, p.text, NULL, NULL, NULL, NULL, \
             p.status, p.response, p.created_by, p.updated_by, \
             p.view_count, p.salute_count, p.share_count, p.created_at \
             FROM stories p"
        }
        PostKind::Photo => {
            "SELECT p.id, p.veteran_id, p.title, NULL, p.photo_file_id, \
             f.name, f.file_url, f.mime_type, \
             p.status, p.response, p.created_by, p.updated_by, \
             p.view_count, p.salute_count, p.share_count, p.created_at \
             FROM photos p LEFT JOIN files f ON p.photo_file_id = f.id"
        }
    }
}

fn map_post_row(row: &rusqlite::Row) -> rusqlite::Result<PostRow> {
    Ok(PostRow {
        id: row.get(0)?,
        veteran_id: row.get(1)?,
        title: row.get(2)?,
        text: row.get(3)?,
        photo_file_id: row.get(4)?,
        photo_name: row.get(5)?,
        photo_url: row.get(6)?,
        photo_mime: row.get(7)?,
        status: row.get(8)?,
        response: row.get(9)?,
        created_by: row.get(10)?,
        updated_by: row.get(11)?,
        view_count: row.get(12)?,
        salute_count: row.get(13)?,
        share_count: row.get(14)?,
        created_at: row.get(15)?,
    })
}

fn map_nok_row(row: &rusqlite::Row) -> rusqlite::Result<NokRow> {
    Ok(NokRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        veteran_id: row.get(2)?,
        full_name: row.get(3)?,
        email: row.get(4)?,
        status: row.get(5)?,
        response: row.get(6)?,
        created_by: row.get(7)?,
        updated_by: row.get(8)?,
        created_at: row.get(9)?,
    })
}

const NOK_COLUMNS: &str = "id, user_id, veteran_id, full_name, email, status, response, \
     created_by, updated_by, created_at";

fn insert_file_row(conn: &rusqlite::Connection, file: &NewFile) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO files (id, name, file_url, mime_type) VALUES (?1, ?2, ?3, ?4)",
        params![file.id, file.name, file.file_url, file.mime_type],
    )?;
    Ok(())
}

impl Database {
    // -- Users --

    pub fn create_user(
        &self,
        id: &str,
        username: &str,
        email: &str,
        password_hash: &str,
        role: &str,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, email, password, role) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, username, email, password_hash, role],
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, username, email, password, role, created_at \
                     FROM users WHERE username = ?1",
                    [username],
                    map_user_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, username, email, password, role, created_at \
                     FROM users WHERE email = ?1",
                    [email],
                    map_user_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, username, email, password, role, created_at \
                     FROM users WHERE id = ?1",
                    [id],
                    map_user_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    // -- Veterans --

    pub fn insert_veteran(&self, id: &str, name: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO veterans (id, name) VALUES (?1, ?2)",
                params![id, name],
            )?;
            Ok(())
        })
    }

    pub fn get_veteran(&self, id: &str) -> Result<Option<VeteranRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, name, created_at FROM veterans WHERE id = ?1",
                    [id],
                    |row| {
                        Ok(VeteranRow {
                            id: row.get(0)?,
                            name: row.get(1)?,
                            created_at: row.get(2)?,
                        })
                    },
                )
                .optional()?;
            Ok(row)
        })
    }

    pub fn update_veteran(&self, id: &str, name: Option<&str>) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE veterans SET name = COALESCE(?2, name) WHERE id = ?1",
                params![id, name],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn delete_veteran(&self, id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute("DELETE FROM veterans WHERE id = ?1", [id])?;
            Ok(changed > 0)
        })
    }

    pub fn search_veterans(
        &self,
        name: Option<&str>,
        limit: u32,
        offset: u32,
    ) -> Result<(Vec<VeteranRow>, i64)> {
        self.with_conn(|conn| {
            let (filter, pattern);
            if let Some(n) = name {
                pattern = format!("%{}%", n);
                filter = " WHERE name LIKE ?1";
            } else {
                pattern = String::new();
                filter = "";
            }

            let total: i64 = if name.is_some() {
                conn.query_row(
                    &format!("SELECT COUNT(*) FROM veterans{}", filter),
                    [&pattern],
                    |r| r.get(0),
                )?
            } else {
                conn.query_row("SELECT COUNT(*) FROM veterans", [], |r| r.get(0))?
            };

            let sql = format!(
                "SELECT id, name, created_at FROM veterans{} ORDER BY name LIMIT {} OFFSET {}",
                filter, limit, offset
            );
            let mut stmt = conn.prepare(&sql)?;
            let map = |row: &rusqlite::Row| -> rusqlite::Result<VeteranRow> {
                Ok(VeteranRow {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    created_at: row.get(2)?,
                })
            };
            let rows = if name.is_some() {
                stmt.query_map([&pattern], map)?
                    .collect::<std::result::Result<Vec<_>, _>>()?
            } else {
                stmt.query_map([], map)?
                    .collect::<std::result::Result<Vec<_>, _>>()?
            };

            Ok((rows, total))
        })
    }

    // -- Files --

    pub fn get_file(&self, id: &str) -> Result<Option<FileRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, name, file_url, mime_type FROM files WHERE id = ?1",
                    [id],
                    map_file_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    // -- Posts --

    pub fn insert_story(&self, story: &NewStory) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO stories (id, veteran_id, title, text, status, created_by) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    story.id,
                    story.veteran_id,
                    story.title,
                    story.text,
                    story.status,
                    story.created_by
                ],
            )?;
            Ok(())
        })
    }

    /// Photo row + file metadata row land in one transaction: either both
    /// exist afterwards or neither does.
    pub fn insert_photo(&self, photo: &NewPhoto, file: &NewFile) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            insert_file_row(&tx, file)?;
            tx.execute(
                "INSERT INTO photos (id, veteran_id, title, photo_file_id, status, created_by) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    photo.id,
                    photo.veteran_id,
                    photo.title,
                    file.id,
                    photo.status,
                    photo.created_by
                ],
            )?;
            tx.commit()?;
            Ok(())
        })
    }

    pub fn get_post(&self, kind: PostKind, id: &str) -> Result<Option<PostRow>> {
        self.with_conn(|conn| {
            let sql = format!("{} WHERE p.id = ?1", post_select(kind));
            let row = conn.query_row(&sql, [id], map_post_row).optional()?;
            Ok(row)
        })
    }

    /// Atomic counter bump; every single-item read is also a write.
    pub fn bump_view_count(&self, kind: PostKind, id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                &format!(
                    "UPDATE {} SET view_count = view_count + 1 WHERE id = ?1",
                    table(kind)
                ),
                [id],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn bump_share_count(&self, kind: PostKind, id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                &format!(
                    "UPDATE {} SET share_count = share_count + 1 WHERE id = ?1",
                    table(kind)
                ),
                [id],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn set_post_status(
        &self,
        kind: PostKind,
        id: &str,
        status: &str,
        updated_by: &str,
        response: Option<&str>,
    ) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                &format!(
                    "UPDATE {} SET status = ?2, updated_by = ?3, response = ?4 WHERE id = ?1",
                    table(kind)
                ),
                params![id, status, updated_by, response],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn update_story(&self, id: &str, patch: &StoryPatch) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE stories SET \
                 veteran_id = COALESCE(?2, veteran_id), \
                 title = COALESCE(?3, title), \
                 text = COALESCE(?4, text), \
                 status = COALESCE(?5, status), \
                 updated_by = ?6 \
                 WHERE id = ?1",
                params![
                    id,
                    patch.veteran_id,
                    patch.title,
                    patch.text,
                    patch.status,
                    patch.updated_by
                ],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn update_photo(&self, id: &str, patch: &PhotoPatch) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE photos SET \
                 veteran_id = COALESCE(?2, veteran_id), \
                 title = COALESCE(?3, title), \
                 status = COALESCE(?4, status), \
                 updated_by = ?5 \
                 WHERE id = ?1",
                params![id, patch.veteran_id, patch.title, patch.status, patch.updated_by],
            )?;
            Ok(changed > 0)
        })
    }

    /// Swap a photo's file for a freshly uploaded one. Returns the replaced
    /// file row so the caller can drop the blob after commit.
    pub fn replace_photo_file(
        &self,
        id: &str,
        updated_by: &str,
        file: &NewFile,
    ) -> Result<Option<FileRow>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let old: Option<FileRow> = tx
                .query_row(
                    "SELECT f.id, f.name, f.file_url, f.mime_type \
                     FROM photos p JOIN files f ON p.photo_file_id = f.id \
                     WHERE p.id = ?1",
                    [id],
                    map_file_row,
                )
                .optional()?;

            let Some(old) = old else {
                return Ok(None);
            };

            insert_file_row(&tx, file)?;
            tx.execute(
                "UPDATE photos SET photo_file_id = ?2, updated_by = ?3 WHERE id = ?1",
                params![id, file.id, updated_by],
            )?;
            tx.execute("DELETE FROM files WHERE id = ?1", [old.id.as_str()])?;

            tx.commit()?;
            Ok(Some(old))
        })
    }

    pub fn delete_post(&self, kind: PostKind, id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let file_id: Option<String> = if kind == PostKind::Photo {
                tx.query_row(
                    "SELECT photo_file_id FROM photos WHERE id = ?1",
                    [id],
                    |r| r.get(0),
                )
                .optional()?
            } else {
                None
            };

            let changed = tx.execute(&format!("DELETE FROM {} WHERE id = ?1", table(kind)), [id])?;
            if let Some(fid) = file_id {
                tx.execute("DELETE FROM files WHERE id = ?1", [fid])?;
            }

            tx.commit()?;
            Ok(changed > 0)
        })
    }

    pub fn search_posts(&self, kind: PostKind, q: &PostSearch) -> Result<(Vec<PostRow>, i64)> {
        self.with_conn(|conn| {
            let mut clauses: Vec<String> = Vec::new();
            let mut values: Vec<String> = Vec::new();

            if let Some(v) = &q.veteran_id {
                values.push(v.clone());
                clauses.push(format!("p.veteran_id = ?{}", values.len()));
            }
            if let Some(u) = &q.created_by {
                values.push(u.clone());
                clauses.push(format!("p.created_by = ?{}", values.len()));
            }
            if let Some(s) = &q.status {
                values.push(s.clone());
                clauses.push(format!("p.status = ?{}", values.len()));
            }
            if let Some(ids) = &q.veteran_in {
                if ids.is_empty() {
                    return Ok((vec![], 0));
                }
                let placeholders: Vec<String> = ids
                    .iter()
                    .map(|id| {
                        values.push(id.clone());
                        format!("?{}", values.len())
                    })
                    .collect();
                clauses.push(format!("p.veteran_id IN ({})", placeholders.join(", ")));
            }

            let where_sql = if clauses.is_empty() {
                String::new()
            } else {
                format!(" WHERE {}", clauses.join(" AND "))
            };

            let params: Vec<&dyn rusqlite::types::ToSql> = values
                .iter()
                .map(|v| v as &dyn rusqlite::types::ToSql)
                .collect();

            let total: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM {} p{}", table(kind), where_sql),
                params.as_slice(),
                |r| r.get(0),
            )?;

            let sql = format!(
                "{}{} ORDER BY p.created_at DESC LIMIT {} OFFSET {}",
                post_select(kind),
                where_sql,
                q.limit,
                q.offset
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params.as_slice(), map_post_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok((rows, total))
        })
    }

    // -- Salutes --

    /// The ledger insert is the exclusive gate: the unique triple decides the
    /// race, and the counter moves only when the insert wins. Returns whether
    /// this call was the winner.
    pub fn salute_post(&self, kind: PostKind, id: &str, user_id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let inserted = tx.execute(
                "INSERT OR IGNORE INTO post_salutes (user_id, post_type, post_id) \
                 VALUES (?1, ?2, ?3)",
                params![user_id, kind.as_str(), id],
            )?;
            if inserted == 1 {
                tx.execute(
                    &format!(
                        "UPDATE {} SET salute_count = salute_count + 1 WHERE id = ?1",
                        table(kind)
                    ),
                    [id],
                )?;
            }
            tx.commit()?;
            Ok(inserted == 1)
        })
    }

    pub fn is_post_saluted(&self, kind: PostKind, id: &str, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM post_salutes \
                     WHERE user_id = ?1 AND post_type = ?2 AND post_id = ?3",
                    params![user_id, kind.as_str(), id],
                    |r| r.get(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    // -- Next of kin --

    /// Kin row, proof file rows and their associations in one transaction.
    pub fn insert_nok(&self, nok: &NewNok, proofs: &[NewFile]) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO next_of_kins \
                 (id, user_id, veteran_id, full_name, email, status, created_by) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    nok.id,
                    nok.user_id,
                    nok.veteran_id,
                    nok.full_name,
                    nok.email,
                    nok.status,
                    nok.created_by
                ],
            )?;
            for file in proofs {
                insert_file_row(&tx, file)?;
                tx.execute(
                    "INSERT INTO nok_proofs (nok_id, file_id) VALUES (?1, ?2)",
                    params![nok.id, file.id],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
    }

    pub fn get_nok(&self, id: &str) -> Result<Option<NokRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    &format!("SELECT {} FROM next_of_kins WHERE id = ?1", NOK_COLUMNS),
                    [id],
                    map_nok_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    pub fn nok_proofs(&self, nok_id: &str) -> Result<Vec<FileRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT f.id, f.name, f.file_url, f.mime_type \
                 FROM nok_proofs np JOIN files f ON np.file_id = f.id \
                 WHERE np.nok_id = ?1",
            )?;
            let rows = stmt
                .query_map([nok_id], map_file_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn search_noks(&self, q: &NokSearch) -> Result<(Vec<NokRow>, i64)> {
        self.with_conn(|conn| {
            let mut clauses: Vec<String> = Vec::new();
            let mut values: Vec<String> = Vec::new();

            if let Some(v) = &q.veteran_id {
                values.push(v.clone());
                clauses.push(format!("veteran_id = ?{}", values.len()));
            }
            if let Some(u) = &q.user_id {
                values.push(u.clone());
                clauses.push(format!("user_id = ?{}", values.len()));
            }
            if let Some(s) = &q.status {
                values.push(s.clone());
                clauses.push(format!("status = ?{}", values.len()));
            }

            let where_sql = if clauses.is_empty() {
                String::new()
            } else {
                format!(" WHERE {}", clauses.join(" AND "))
            };

            let params: Vec<&dyn rusqlite::types::ToSql> = values
                .iter()
                .map(|v| v as &dyn rusqlite::types::ToSql)
                .collect();

            let total: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM next_of_kins{}", where_sql),
                params.as_slice(),
                |r| r.get(0),
            )?;

            let sql = format!(
                "SELECT {} FROM next_of_kins{} ORDER BY created_at DESC LIMIT {} OFFSET {}",
                NOK_COLUMNS, where_sql, q.limit, q.offset
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params.as_slice(), map_nok_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok((rows, total))
        })
    }

    /// Replace the kin's proof set and patch its fields. Returns the
    /// superseded file rows so the caller can drop the blobs after commit.
    pub fn update_nok(
        &self,
        id: &str,
        patch: &NokPatch,
        proofs: &[NewFile],
    ) -> Result<Vec<FileRow>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let old = query_nok_proofs(&tx, id)?;
            tx.execute("DELETE FROM nok_proofs WHERE nok_id = ?1", [id])?;
            for file in &old {
                tx.execute("DELETE FROM files WHERE id = ?1", [file.id.as_str()])?;
            }

            for file in proofs {
                insert_file_row(&tx, file)?;
                tx.execute(
                    "INSERT INTO nok_proofs (nok_id, file_id) VALUES (?1, ?2)",
                    params![id, file.id],
                )?;
            }

            tx.execute(
                "UPDATE next_of_kins SET \
                 full_name = COALESCE(?2, full_name), \
                 email = COALESCE(?3, email), \
                 status = COALESCE(?4, status), \
                 response = COALESCE(?5, response), \
                 updated_by = ?6 \
                 WHERE id = ?1",
                params![
                    id,
                    patch.full_name,
                    patch.email,
                    patch.status,
                    patch.response,
                    patch.updated_by
                ],
            )?;

            tx.commit()?;
            Ok(old)
        })
    }

    pub fn delete_nok(&self, id: &str) -> Result<Vec<FileRow>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let old = query_nok_proofs(&tx, id)?;
            tx.execute("DELETE FROM nok_proofs WHERE nok_id = ?1", [id])?;
            for file in &old {
                tx.execute("DELETE FROM files WHERE id = ?1", [file.id.as_str()])?;
            }
            tx.execute("DELETE FROM next_of_kins WHERE id = ?1", [id])?;

            tx.commit()?;
            Ok(old)
        })
    }

    pub fn approved_nok_exists(&self, veteran_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM next_of_kins WHERE veteran_id = ?1 AND status = 'Approved'",
                    [veteran_id],
                    |r| r.get(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    pub fn has_approved_nok(&self, user_id: &str, veteran_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM next_of_kins \
                     WHERE user_id = ?1 AND veteran_id = ?2 AND status = 'Approved'",
                    params![user_id, veteran_id],
                    |r| r.get(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    /// Veterans the user is an approved next-of-kin of (review mode).
    pub fn approved_veteran_ids(&self, user_id: &str) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT DISTINCT veteran_id FROM next_of_kins \
                 WHERE user_id = ?1 AND status = 'Approved'",
            )?;
            let rows = stmt
                .query_map([user_id], |r| r.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;
            Ok(rows)
        })
    }

    pub fn approved_nok_user_ids(&self, veteran_id: &str) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT DISTINCT user_id FROM next_of_kins \
                 WHERE veteran_id = ?1 AND status = 'Approved'",
            )?;
            let rows = stmt
                .query_map([veteran_id], |r| r.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;
            Ok(rows)
        })
    }

    /// Flip a kin to Approved. The partial unique index on
    /// `(veteran_id) WHERE status = 'Approved'` makes the losing writer of a
    /// concurrent approval fail here rather than both succeeding.
    pub fn approve_nok(&self, id: &str, updated_by: &str) -> Result<NokDecision> {
        self.with_conn_mut(|conn| {
            let res = conn.execute(
                "UPDATE next_of_kins \
                 SET status = 'Approved', response = NULL, updated_by = ?2 \
                 WHERE id = ?1",
                params![id, updated_by],
            );
            match res {
                Ok(_) => Ok(NokDecision::Updated),
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    Ok(NokDecision::Conflict)
                }
                Err(e) => Err(e.into()),
            }
        })
    }

    pub fn reject_nok(&self, id: &str, response: &str, updated_by: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE next_of_kins \
                 SET status = 'Rejected', response = ?2, updated_by = ?3 \
                 WHERE id = ?1",
                params![id, response, updated_by],
            )?;
            Ok(changed > 0)
        })
    }

    // -- Notifications --

    pub fn insert_notification(
        &self,
        id: &str,
        user_id: &str,
        kind: &str,
        sub_kind: Option<&str>,
        content: &str,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO notifications (id, user_id, kind, sub_kind, content, status) \
                 VALUES (?1, ?2, ?3, ?4, ?5, 'New')",
                params![id, user_id, kind, sub_kind, content],
            )?;
            Ok(())
        })
    }

    pub fn search_notifications(
        &self,
        user_id: &str,
        status: &str,
        limit: u32,
        offset: u32,
    ) -> Result<(Vec<NotificationRow>, i64)> {
        self.with_conn(|conn| {
            let total: i64 = conn.query_row(
                "SELECT COUNT(*) FROM notifications WHERE user_id = ?1 AND status = ?2",
                params![user_id, status],
                |r| r.get(0),
            )?;

            let sql = format!(
                "SELECT id, user_id, kind, sub_kind, content, status, created_at \
                 FROM notifications WHERE user_id = ?1 AND status = ?2 \
                 ORDER BY created_at DESC LIMIT {} OFFSET {}",
                limit, offset
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![user_id, status], |row| {
                    Ok(NotificationRow {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        kind: row.get(2)?,
                        sub_kind: row.get(3)?,
                        content: row.get(4)?,
                        status: row.get(5)?,
                        created_at: row.get(6)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok((rows, total))
        })
    }

    /// Bulk mark-as-read, scoped to the owning user.
    pub fn mark_notifications_read(&self, user_id: &str, ids: &[String]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }

        self.with_conn_mut(|conn| {
            let mut values: Vec<&str> = vec![user_id];
            let placeholders: Vec<String> = ids
                .iter()
                .map(|id| {
                    values.push(id.as_str());
                    format!("?{}", values.len())
                })
                .collect();
            let sql = format!(
                "UPDATE notifications SET status = 'Read' \
                 WHERE user_id = ?1 AND id IN ({})",
                placeholders.join(", ")
            );

            let params: Vec<&dyn rusqlite::types::ToSql> = values
                .iter()
                .map(|v| v as &dyn rusqlite::types::ToSql)
                .collect();
            let changed = conn.execute(&sql, params.as_slice())?;
            Ok(changed)
        })
    }

    // -- Notification preferences --

    /// Read without creating; the dispatcher treats a missing row as
    /// deliver-everything.
    pub fn get_preference(&self, user_id: &str) -> Result<Option<PreferenceRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT user_id, story_site, story_email, story_mobile, \
                     photo_site, photo_email, photo_mobile \
                     FROM notification_preferences WHERE user_id = ?1",
                    [user_id],
                    map_preference_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    /// Lazily create the row with every flag on, then return it.
    pub fn ensure_preference(&self, user_id: &str) -> Result<PreferenceRow> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO notification_preferences (user_id) VALUES (?1)",
                [user_id],
            )?;
            let row = conn.query_row(
                "SELECT user_id, story_site, story_email, story_mobile, \
                 photo_site, photo_email, photo_mobile \
                 FROM notification_preferences WHERE user_id = ?1",
                [user_id],
                map_preference_row,
            )?;
            Ok(row)
        })
    }

    pub fn update_preference(
        &self,
        user_id: &str,
        patch: &PreferencePatch,
    ) -> Result<PreferenceRow> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO notification_preferences (user_id) VALUES (?1)",
                [user_id],
            )?;
            conn.execute(
                "UPDATE notification_preferences SET \
                 story_site = COALESCE(?2, story_site), \
                 story_email = COALESCE(?3, story_email), \
                 story_mobile = COALESCE(?4, story_mobile), \
                 photo_site = COALESCE(?5, photo_site), \
                 photo_email = COALESCE(?6, photo_email), \
                 photo_mobile = COALESCE(?7, photo_mobile) \
                 WHERE user_id = ?1",
                params![
                    user_id,
                    patch.story_site,
                    patch.story_email,
                    patch.story_mobile,
                    patch.photo_site,
                    patch.photo_email,
                    patch.photo_mobile
                ],
            )?;
            let row = conn.query_row(
                "SELECT user_id, story_site, story_email, story_mobile, \
                 photo_site, photo_email, photo_mobile \
                 FROM notification_preferences WHERE user_id = ?1",
                [user_id],
                map_preference_row,
            )?;
            Ok(row)
        })
    }
}

fn map_user_row(row: &rusqlite::Row) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password: row.get(3)?,
        role: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn map_file_row(row: &rusqlite::Row) -> rusqlite::Result<FileRow> {
    Ok(FileRow {
        id: row.get(0)?,
        name: row.get(1)?,
        file_url: row.get(2)?,
        mime_type: row.get(3)?,
    })
}

fn map_preference_row(row: &rusqlite::Row) -> rusqlite::Result<PreferenceRow> {
    Ok(PreferenceRow {
        user_id: row.get(0)?,
        story_site: row.get(1)?,
        story_email: row.get(2)?,
        story_mobile: row.get(3)?,
        photo_site: row.get(4)?,
        photo_email: row.get(5)?,
        photo_mobile: row.get(6)?,
    })
}

fn query_nok_proofs(conn: &rusqlite::Connection, nok_id: &str) -> Result<Vec<FileRow>> {
    let mut stmt = conn.prepare(
        "SELECT f.id, f.name, f.file_url, f.mime_type \
         FROM nok_proofs np JOIN files f ON np.file_id = f.id \
         WHERE np.nok_id = ?1",
    )?;
    let rows = stmt
        .query_map([nok_id], map_file_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;

    fn test_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn seed_user(db: &Database, id: &str, name: &str) {
        db.create_user(id, name, &format!("{}@example.org", name), "hash", "User")
            .unwrap();
    }

    fn seed_story(db: &Database, id: &str, veteran_id: &str, created_by: &str, status: &str) {
        db.insert_story(&NewStory {
            id,
            veteran_id,
            title: "A title",
            text: "Some text",
            status,
            created_by,
        })
        .unwrap();
    }

    #[test]
    fn salute_counts_once_per_user() {
        let db = test_db();
        seed_user(&db, "u1", "alice");
        seed_user(&db, "u2", "bob");
        db.insert_veteran("v1", "John Doe").unwrap();
        seed_story(&db, "s1", "v1", "u1", "Approved");

        assert!(db.salute_post(PostKind::Story, "s1", "u1").unwrap());
        assert!(!db.salute_post(PostKind::Story, "s1", "u1").unwrap());
        assert!(!db.salute_post(PostKind::Story, "s1", "u1").unwrap());

        let post = db.get_post(PostKind::Story, "s1").unwrap().unwrap();
        assert_eq!(post.salute_count, 1);

        assert!(db.salute_post(PostKind::Story, "s1", "u2").unwrap());
        let post = db.get_post(PostKind::Story, "s1").unwrap().unwrap();
        assert_eq!(post.salute_count, 2);

        let rows: i64 = db
            .with_conn(|conn| {
                Ok(conn.query_row(
                    "SELECT COUNT(*) FROM post_salutes WHERE post_id = 's1' AND user_id = 'u1'",
                    [],
                    |r| r.get(0),
                )?)
            })
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[test]
    fn salute_ledger_is_per_kind() {
        let db = test_db();
        seed_user(&db, "u1", "alice");
        db.insert_veteran("v1", "John Doe").unwrap();
        // same id in both tables must not collide in the ledger
        seed_story(&db, "x1", "v1", "u1", "Approved");

        assert!(db.salute_post(PostKind::Story, "x1", "u1").unwrap());
        assert!(!db.is_post_saluted(PostKind::Photo, "x1", "u1").unwrap());
        assert!(db.is_post_saluted(PostKind::Story, "x1", "u1").unwrap());
    }

    #[test]
    fn second_approved_nok_loses() {
        let db = test_db();
        seed_user(&db, "u1", "alice");
        seed_user(&db, "u2", "bob");
        db.insert_veteran("v1", "John Doe").unwrap();

        for (id, user) in [("n1", "u1"), ("n2", "u2")] {
            db.insert_nok(
                &NewNok {
                    id,
                    user_id: user,
                    veteran_id: "v1",
                    full_name: "Kin",
                    email: "kin@example.org",
                    status: "Pending",
                    created_by: user,
                },
                &[],
            )
            .unwrap();
        }

        assert_eq!(db.approve_nok("n1", "admin").unwrap(), NokDecision::Updated);
        assert_eq!(db.approve_nok("n2", "admin").unwrap(), NokDecision::Conflict);

        let n2 = db.get_nok("n2").unwrap().unwrap();
        assert_eq!(n2.status, "Pending");
        assert!(db.approved_nok_exists("v1").unwrap());
        assert_eq!(db.approved_nok_user_ids("v1").unwrap(), vec!["u1"]);
    }

    #[test]
    fn reapproving_the_same_nok_is_not_a_conflict() {
        let db = test_db();
        seed_user(&db, "u1", "alice");
        db.insert_veteran("v1", "John Doe").unwrap();
        db.insert_nok(
            &NewNok {
                id: "n1",
                user_id: "u1",
                veteran_id: "v1",
                full_name: "Kin",
                email: "kin@example.org",
                status: "Pending",
                created_by: "u1",
            },
            &[],
        )
        .unwrap();

        assert_eq!(db.approve_nok("n1", "admin").unwrap(), NokDecision::Updated);
        assert_eq!(db.approve_nok("n1", "admin").unwrap(), NokDecision::Updated);
    }

    #[test]
    fn view_count_bumps_are_atomic_increments() {
        let db = test_db();
        seed_user(&db, "u1", "alice");
        db.insert_veteran("v1", "John Doe").unwrap();
        seed_story(&db, "s1", "v1", "u1", "Approved");

        assert!(db.bump_view_count(PostKind::Story, "s1").unwrap());
        assert!(db.bump_view_count(PostKind::Story, "s1").unwrap());
        assert!(!db.bump_view_count(PostKind::Story, "missing").unwrap());

        let post = db.get_post(PostKind::Story, "s1").unwrap().unwrap();
        assert_eq!(post.view_count, 2);
    }

    #[test]
    fn photo_insert_is_atomic() {
        let db = test_db();
        seed_user(&db, "u1", "alice");
        db.insert_veteran("v1", "John Doe").unwrap();

        let file = NewFile {
            id: "f1",
            name: "photo.jpg",
            file_url: "http://localhost/uploads/f1",
            mime_type: "image/jpeg",
        };
        db.insert_photo(
            &NewPhoto {
                id: "p1",
                veteran_id: "v1",
                title: "First",
                status: "Pending",
                created_by: "u1",
            },
            &file,
        )
        .unwrap();

        // reusing the file id must fail and leave no second photo behind
        let err = db.insert_photo(
            &NewPhoto {
                id: "p2",
                veteran_id: "v1",
                title: "Second",
                status: "Pending",
                created_by: "u1",
            },
            &file,
        );
        assert!(err.is_err());
        assert!(db.get_post(PostKind::Photo, "p2").unwrap().is_none());

        let p1 = db.get_post(PostKind::Photo, "p1").unwrap().unwrap();
        assert_eq!(p1.photo_url.as_deref(), Some("http://localhost/uploads/f1"));
    }

    #[test]
    fn search_filters_compose() {
        let db = test_db();
        seed_user(&db, "u1", "alice");
        seed_user(&db, "u2", "bob");
        db.insert_veteran("v1", "John Doe").unwrap();
        db.insert_veteran("v2", "Jane Doe").unwrap();
        seed_story(&db, "s1", "v1", "u1", "Approved");
        seed_story(&db, "s2", "v1", "u2", "Pending");
        seed_story(&db, "s3", "v2", "u1", "Approved");

        let (rows, total) = db
            .search_posts(
                PostKind::Story,
                &PostSearch {
                    veteran_id: Some("v1".into()),
                    status: Some("Approved".into()),
                    limit: 50,
                    offset: 0,
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(rows[0].id, "s1");

        let (rows, total) = db
            .search_posts(
                PostKind::Story,
                &PostSearch {
                    veteran_in: Some(vec!["v1".into(), "v2".into()]),
                    created_by: Some("u1".into()),
                    limit: 50,
                    offset: 0,
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(total, 2);
        assert_eq!(rows.len(), 2);

        let (rows, total) = db
            .search_posts(
                PostKind::Story,
                &PostSearch {
                    veteran_in: Some(vec![]),
                    limit: 50,
                    offset: 0,
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(total, 0);
        assert!(rows.is_empty());
    }

    #[test]
    fn mark_read_is_scoped_to_owner() {
        let db = test_db();
        seed_user(&db, "u1", "alice");
        seed_user(&db, "u2", "bob");
        db.insert_notification("n1", "u1", "Post", Some("Story"), "{}")
            .unwrap();
        db.insert_notification("n2", "u2", "Post", Some("Story"), "{}")
            .unwrap();

        let changed = db
            .mark_notifications_read("u1", &["n1".into(), "n2".into()])
            .unwrap();
        assert_eq!(changed, 1);

        let (_, unread_u2) = db.search_notifications("u2", "New", 50, 0).unwrap();
        assert_eq!(unread_u2, 1);
        let (_, unread_u1) = db.search_notifications("u1", "New", 50, 0).unwrap();
        assert_eq!(unread_u1, 0);
    }

    #[test]
    fn preference_row_defaults_on() {
        let db = test_db();
        seed_user(&db, "u1", "alice");

        assert!(db.get_preference("u1").unwrap().is_none());

        let pref = db.ensure_preference("u1").unwrap();
        assert!(pref.story_site && pref.photo_site);
        assert!(pref.story_email && pref.photo_mobile);

        let pref = db
            .update_preference(
                "u1",
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
        assert!(!pref.photo_site);
        assert!(pref.story_site);
    }
}
