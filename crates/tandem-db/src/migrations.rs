use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id           TEXT PRIMARY KEY,
                username     TEXT NOT NULL UNIQUE,
                password     TEXT NOT NULL,
                display_name TEXT NOT NULL,
                avatar_url   TEXT,
                created_at   TEXT NOT NULL DEFAULT (datetime('now'))
            );

            -- One row per two-party thread. The id is the derived key; the
            -- ordered pair is the membership record.
            CREATE TABLE conversations (
                id             TEXT PRIMARY KEY,
                participant_a  TEXT NOT NULL,
                participant_b  TEXT NOT NULL,
                created_at     INTEGER NOT NULL,
                CHECK (participant_a < participant_b),
                UNIQUE (participant_a, participant_b)
            );

            CREATE INDEX idx_conversations_b ON conversations(participant_b);

            CREATE TABLE messages (
                seq              INTEGER PRIMARY KEY AUTOINCREMENT,
                id               TEXT NOT NULL UNIQUE,
                conversation_id  TEXT NOT NULL REFERENCES conversations(id),
                sender_id        TEXT NOT NULL,
                content          TEXT NOT NULL,
                kind             TEXT NOT NULL DEFAULT 'text',
                created_at       INTEGER NOT NULL,
                recalled         INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX idx_messages_conversation
                ON messages(conversation_id, created_at);
            CREATE INDEX idx_messages_created ON messages(created_at);

            CREATE TABLE read_cursors (
                conversation_id  TEXT NOT NULL REFERENCES conversations(id),
                participant_id   TEXT NOT NULL,
                last_read_at     INTEGER NOT NULL,
                PRIMARY KEY (conversation_id, participant_id)
            );

            CREATE INDEX idx_read_cursors_last_read ON read_cursors(last_read_at);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
