use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          TEXT PRIMARY KEY,
            username    TEXT NOT NULL UNIQUE,
            email       TEXT NOT NULL UNIQUE,
            password    TEXT NOT NULL,
            role        TEXT NOT NULL DEFAULT 'User',
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS veterans (
            id          TEXT PRIMARY KEY,
            name        TEXT NOT NULL,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS files (
            id          TEXT PRIMARY KEY,
            name        TEXT NOT NULL,
            file_url    TEXT NOT NULL,
            mime_type   TEXT NOT NULL,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS next_of_kins (
            id          TEXT PRIMARY KEY,
            user_id     TEXT NOT NULL REFERENCES users(id),
            veteran_id  TEXT NOT NULL REFERENCES veterans(id),
            full_name   TEXT NOT NULL,
            email       TEXT NOT NULL,
            status      TEXT NOT NULL DEFAULT 'Pending',
            response    TEXT,
            created_by  TEXT NOT NULL,
            updated_by  TEXT,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- at most one approved next-of-kin per veteran; concurrent approvals
        -- are decided here, not by application-level checks
        CREATE UNIQUE INDEX IF NOT EXISTS idx_nok_one_approved
            ON next_of_kins(veteran_id) WHERE status = 'Approved';

        CREATE INDEX IF NOT EXISTS idx_nok_user
            ON next_of_kins(user_id, status);

        CREATE TABLE IF NOT EXISTS nok_proofs (
            nok_id      TEXT NOT NULL REFERENCES next_of_kins(id),
            file_id     TEXT NOT NULL REFERENCES files(id),
            PRIMARY KEY (nok_id, file_id)
        );

        CREATE TABLE IF NOT EXISTS stories (
            id            TEXT PRIMARY KEY,
            veteran_id    TEXT NOT NULL REFERENCES veterans(id),
            title         TEXT NOT NULL,
            text          TEXT NOT NULL,
            status        TEXT NOT NULL DEFAULT 'Pending',
            response      TEXT,
            created_by    TEXT NOT NULL,
            updated_by    TEXT,
            view_count    INTEGER NOT NULL DEFAULT 0,
            salute_count  INTEGER NOT NULL DEFAULT 0,
            share_count   INTEGER NOT NULL DEFAULT 0,
            created_at    TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_stories_veteran
            ON stories(veteran_id, status);

        CREATE TABLE IF NOT EXISTS photos (
            id             TEXT PRIMARY KEY,
            veteran_id     TEXT NOT NULL REFERENCES veterans(id),
            title          TEXT NOT NULL,
            photo_file_id  TEXT NOT NULL REFERENCES files(id),
            status         TEXT NOT NULL DEFAULT 'Pending',
            response       TEXT,
            created_by     TEXT NOT NULL,
            updated_by     TEXT,
            view_count     INTEGER NOT NULL DEFAULT 0,
            salute_count   INTEGER NOT NULL DEFAULT 0,
            share_count    INTEGER NOT NULL DEFAULT 0,
            created_at     TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_photos_veteran
            ON photos(veteran_id, status);

        -- salute ledger; the unique triple is the sole guard against
        -- double-counting
        CREATE TABLE IF NOT EXISTS post_salutes (
            user_id     TEXT NOT NULL REFERENCES users(id),
            post_type   TEXT NOT NULL,
            post_id     TEXT NOT NULL,
            created_at  TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(user_id, post_type, post_id)
        );

        CREATE INDEX IF NOT EXISTS idx_salutes_post
            ON post_salutes(post_type, post_id);

        CREATE TABLE IF NOT EXISTS notifications (
            id          TEXT PRIMARY KEY,
            user_id     TEXT NOT NULL REFERENCES users(id),
            kind        TEXT NOT NULL,
            sub_kind    TEXT,
            content     TEXT NOT NULL,
            status      TEXT NOT NULL DEFAULT 'New',
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_notifications_user
            ON notifications(user_id, status, created_at);

        CREATE TABLE IF NOT EXISTS notification_preferences (
            user_id       TEXT PRIMARY KEY REFERENCES users(id),
            story_site    INTEGER NOT NULL DEFAULT 1,
            story_email   INTEGER NOT NULL DEFAULT 1,
            story_mobile  INTEGER NOT NULL DEFAULT 1,
            photo_site    INTEGER NOT NULL DEFAULT 1,
            photo_email   INTEGER NOT NULL DEFAULT 1,
            photo_mobile  INTEGER NOT NULL DEFAULT 1
        );
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
