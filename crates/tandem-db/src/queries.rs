use std::collections::HashMap;

use crate::models::{ConversationRow, MessageRow, NewMessage, ProfileRow, UserRow};
use crate::{Database, now_millis};
use anyhow::Result;
use rusqlite::types::ToSql;
use rusqlite::{Connection, OptionalExtension, Row};

const MESSAGE_COLUMNS: &str =
    "m.id, m.conversation_id, m.sender_id, m.content, m.kind, m.created_at, m.recalled";

impl Database {
    // -- Users --

    pub fn create_user(
        &self,
        id: &str,
        username: &str,
        password_hash: &str,
        display_name: &str,
        avatar_url: Option<&str>,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, password, display_name, avatar_url)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![id, username, password_hash, display_name, avatar_url],
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "username", username))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    /// Batch-fetch directory profiles. Unknown ids are simply absent.
    pub fn get_profiles(&self, user_ids: &[String]) -> Result<Vec<ProfileRow>> {
        if user_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let sql = format!(
                "SELECT id, display_name, avatar_url FROM users WHERE id IN ({})",
                placeholders(1, user_ids.len())
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(user_ids.iter()), |row| {
                    Ok(ProfileRow {
                        id: row.get(0)?,
                        display_name: row.get(1)?,
                        avatar_url: row.get(2)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Conversations --

    pub fn get_conversation(&self, id: &str) -> Result<Option<ConversationRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, participant_a, participant_b, created_at
                     FROM conversations WHERE id = ?1",
                    [id],
                    conversation_from_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    /// All conversations the participant belongs to. Rows only exist once a
    /// message has been appended, so every result has at least one message.
    pub fn get_conversations_for(&self, participant_id: &str) -> Result<Vec<ConversationRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, participant_a, participant_b, created_at
                 FROM conversations
                 WHERE participant_a = ?1 OR participant_b = ?1",
            )?;
            let rows = stmt
                .query_map([participant_id], conversation_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Messages --

    /// Insert a message, creating its conversation row on first use.
    /// The timestamp is assigned here, under the writer lock.
    pub fn append_message(&self, new: &NewMessage<'_>) -> Result<MessageRow> {
        self.with_conn_mut(|conn| {
            let tx = conn.unchecked_transaction()?;
            let created_at = next_message_stamp(&tx)?;

            tx.execute(
                "INSERT OR IGNORE INTO conversations (id, participant_a, participant_b, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![
                    new.conversation_id,
                    new.participant_a,
                    new.participant_b,
                    created_at
                ],
            )?;
            tx.execute(
                "INSERT INTO messages (id, conversation_id, sender_id, content, kind, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    new.id,
                    new.conversation_id,
                    new.sender_id,
                    new.content,
                    new.kind,
                    created_at
                ],
            )?;
            tx.commit()?;

            Ok(MessageRow {
                id: new.id.to_string(),
                conversation_id: new.conversation_id.to_string(),
                sender_id: new.sender_id.to_string(),
                content: new.content.to_string(),
                kind: new.kind.to_string(),
                created_at,
                recalled: false,
            })
        })
    }

    /// Messages of one conversation in creation order.
    pub fn get_messages(&self, conversation_id: &str) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages m
                 WHERE m.conversation_id = ?1
                 ORDER BY m.created_at ASC, m.seq ASC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([conversation_id], message_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_message(&self, id: &str) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {MESSAGE_COLUMNS} FROM messages m WHERE m.id = ?1");
            let row = conn.query_row(&sql, [id], message_from_row).optional()?;
            Ok(row)
        })
    }

    /// Batch-fetch the newest message of each conversation in one query.
    pub fn get_latest_messages(&self, conversation_ids: &[String]) -> Result<Vec<MessageRow>> {
        if conversation_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            // seq follows insert order, and insert order is timestamp order
            let sql = format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages m
                 JOIN (
                     SELECT MAX(seq) AS seq FROM messages
                     WHERE conversation_id IN ({})
                     GROUP BY conversation_id
                 ) latest ON latest.seq = m.seq",
                placeholders(1, conversation_ids.len())
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(
                    rusqlite::params_from_iter(conversation_ids.iter()),
                    message_from_row,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Set the recalled flag. Returns false if no such message exists.
    pub fn set_recalled(&self, message_id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed =
                conn.execute("UPDATE messages SET recalled = 1 WHERE id = ?1", [message_id])?;
            Ok(changed > 0)
        })
    }

    // -- Read cursors --

    /// Advance the cursor to now, never backwards. Returns the stored value.
    pub fn upsert_read_cursor(&self, conversation_id: &str, participant_id: &str) -> Result<i64> {
        self.with_conn_mut(|conn| {
            let stamp = read_stamp(conn)?;
            let stored: i64 = conn.query_row(
                "INSERT INTO read_cursors (conversation_id, participant_id, last_read_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT (conversation_id, participant_id)
                 DO UPDATE SET last_read_at = MAX(last_read_at, excluded.last_read_at)
                 RETURNING last_read_at",
                rusqlite::params![conversation_id, participant_id, stamp],
                |row| row.get(0),
            )?;
            Ok(stored)
        })
    }

    pub fn get_read_cursor(
        &self,
        conversation_id: &str,
        participant_id: &str,
    ) -> Result<Option<i64>> {
        self.with_conn(|conn| {
            let value = conn
                .query_row(
                    "SELECT last_read_at FROM read_cursors
                     WHERE conversation_id = ?1 AND participant_id = ?2",
                    [conversation_id, participant_id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(value)
        })
    }

    /// Unread counts for many conversations in a single grouped query.
    /// Conversations with nothing unread are absent from the result.
    pub fn get_unread_counts(
        &self,
        participant_id: &str,
        conversation_ids: &[String],
    ) -> Result<HashMap<String, u64>> {
        if conversation_ids.is_empty() {
            return Ok(HashMap::new());
        }

        self.with_conn(|conn| {
            let sql = format!(
                "SELECT m.conversation_id, COUNT(*)
                 FROM messages m
                 LEFT JOIN read_cursors rc
                     ON rc.conversation_id = m.conversation_id AND rc.participant_id = ?1
                 WHERE m.conversation_id IN ({})
                   AND m.sender_id != ?1
                   AND m.created_at > COALESCE(rc.last_read_at, 0)
                 GROUP BY m.conversation_id",
                placeholders(2, conversation_ids.len())
            );

            let mut params: Vec<&dyn ToSql> = Vec::with_capacity(conversation_ids.len() + 1);
            params.push(&participant_id);
            params.extend(conversation_ids.iter().map(|id| id as &dyn ToSql));

            let mut stmt = conn.prepare(&sql)?;
            let counts = stmt
                .query_map(params.as_slice(), |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
                })?
                .map(|r| r.map(|(id, n)| (id, n.max(0) as u64)))
                .collect::<std::result::Result<HashMap<_, _>, _>>()?;
            Ok(counts)
        })
    }
}

/// Next message timestamp: strictly after every stored message and every
/// read cursor, so a message appended after a read-mark is always unread.
fn next_message_stamp(conn: &Connection) -> Result<i64> {
    let floor: i64 = conn.query_row(
        "SELECT MAX(
            COALESCE((SELECT MAX(created_at) FROM messages), 0),
            COALESCE((SELECT MAX(last_read_at) FROM read_cursors), 0)
         )",
        [],
        |row| row.get(0),
    )?;
    Ok(now_millis().max(floor + 1))
}

/// Read-mark timestamp: now, but never before the newest stored message.
fn read_stamp(conn: &Connection) -> Result<i64> {
    let newest: i64 = conn.query_row(
        "SELECT COALESCE(MAX(created_at), 0) FROM messages",
        [],
        |row| row.get(0),
    )?;
    Ok(now_millis().max(newest))
}

/// `?start, ?start+1, ...` for `count` parameters.
fn placeholders(start: usize, count: usize) -> String {
    (start..start + count)
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ")
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let sql = format!(
        "SELECT id, username, password, display_name, avatar_url
         FROM users WHERE {} = ?1",
        column
    );
    let row = conn
        .query_row(&sql, [value], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                username: row.get(1)?,
                password: row.get(2)?,
                display_name: row.get(3)?,
                avatar_url: row.get(4)?,
            })
        })
        .optional()?;
    Ok(row)
}

fn conversation_from_row(row: &Row<'_>) -> rusqlite::Result<ConversationRow> {
    Ok(ConversationRow {
        id: row.get(0)?,
        participant_a: row.get(1)?,
        participant_b: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        sender_id: row.get(2)?,
        content: row.get(3)?,
        kind: row.get(4)?,
        created_at: row.get(5)?,
        recalled: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::temp_db;

    fn new_message<'a>(id: &'a str, sender: &'a str, content: &'a str) -> NewMessage<'a> {
        NewMessage {
            id,
            conversation_id: "chat_u1_u2",
            participant_a: "u1",
            participant_b: "u2",
            sender_id: sender,
            content,
            kind: "text",
        }
    }

    #[test]
    fn first_append_creates_conversation() {
        let t = temp_db();
        assert!(t.db.get_conversation("chat_u1_u2").unwrap().is_none());

        t.db.append_message(&new_message("m1", "u1", "hello")).unwrap();

        let conv = t.db.get_conversation("chat_u1_u2").unwrap().unwrap();
        assert_eq!(conv.participant_a, "u1");
        assert_eq!(conv.participant_b, "u2");
        assert_eq!(t.db.get_conversations_for("u2").unwrap().len(), 1);
        assert!(t.db.get_conversations_for("u3").unwrap().is_empty());
    }

    #[test]
    fn message_stamps_strictly_increase() {
        let t = temp_db();
        let mut last = 0;
        for i in 0..20 {
            let id = format!("m{}", i);
            let row = t.db.append_message(&new_message(&id, "u1", "x")).unwrap();
            assert!(row.created_at > last, "{} <= {}", row.created_at, last);
            last = row.created_at;
        }

        let listed = t.db.get_messages("chat_u1_u2").unwrap();
        assert_eq!(listed.len(), 20);
        assert_eq!(listed.first().unwrap().id, "m0");
        assert_eq!(listed.last().unwrap().id, "m19");
    }

    #[test]
    fn message_after_read_mark_is_stamped_after_cursor() {
        let t = temp_db();
        t.db.append_message(&new_message("m1", "u1", "a")).unwrap();
        let cursor = t.db.upsert_read_cursor("chat_u1_u2", "u2").unwrap();
        let row = t.db.append_message(&new_message("m2", "u1", "b")).unwrap();
        assert!(row.created_at > cursor);
    }

    #[test]
    fn read_cursor_never_regresses() {
        let t = temp_db();
        t.db.append_message(&new_message("m1", "u1", "a")).unwrap();
        let first = t.db.upsert_read_cursor("chat_u1_u2", "u2").unwrap();
        let second = t.db.upsert_read_cursor("chat_u1_u2", "u2").unwrap();
        assert!(second >= first);
        assert_eq!(t.db.get_read_cursor("chat_u1_u2", "u2").unwrap(), Some(second));
        assert_eq!(t.db.get_read_cursor("chat_u1_u2", "u1").unwrap(), None);
    }

    #[test]
    fn unread_counts_exclude_own_and_read_messages() {
        let t = temp_db();
        t.db.append_message(&new_message("m1", "u1", "a")).unwrap();
        t.db.append_message(&new_message("m2", "u1", "b")).unwrap();
        t.db.append_message(&new_message("m3", "u2", "c")).unwrap();

        let ids = vec!["chat_u1_u2".to_string()];
        let counts = t.db.get_unread_counts("u2", &ids).unwrap();
        assert_eq!(counts.get("chat_u1_u2"), Some(&2));
        let counts = t.db.get_unread_counts("u1", &ids).unwrap();
        assert_eq!(counts.get("chat_u1_u2"), Some(&1));

        t.db.upsert_read_cursor("chat_u1_u2", "u2").unwrap();
        assert!(t.db.get_unread_counts("u2", &ids).unwrap().is_empty());
    }

    #[test]
    fn latest_messages_one_per_conversation() {
        let t = temp_db();
        t.db.append_message(&new_message("m1", "u1", "hello")).unwrap();
        t.db.append_message(&new_message("m2", "u2", "world")).unwrap();
        t.db.append_message(&NewMessage {
            id: "m3",
            conversation_id: "chat_u1_u3",
            participant_a: "u1",
            participant_b: "u3",
            sender_id: "u3",
            content: "hey",
            kind: "text",
        })
        .unwrap();

        let ids = vec!["chat_u1_u2".to_string(), "chat_u1_u3".to_string()];
        let mut latest = t.db.get_latest_messages(&ids).unwrap();
        latest.sort_by(|a, b| a.conversation_id.cmp(&b.conversation_id));
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[0].content, "world");
        assert_eq!(latest[1].content, "hey");
    }

    #[test]
    fn recall_flag_is_persisted() {
        let t = temp_db();
        t.db.append_message(&new_message("m1", "u1", "oops")).unwrap();
        assert!(t.db.set_recalled("m1").unwrap());
        assert!(!t.db.set_recalled("missing").unwrap());
        assert!(t.db.get_message("m1").unwrap().unwrap().recalled);
    }

    #[test]
    fn profiles_are_batch_resolved() {
        let t = temp_db();
        t.db.create_user("u1", "alice", "hash", "Alice", None).unwrap();
        t.db.create_user("u2", "bob", "hash", "Bob", Some("https://cdn/bob.png")).unwrap();

        let ids = vec!["u1".to_string(), "u2".to_string(), "ghost".to_string()];
        let profiles = t.db.get_profiles(&ids).unwrap();
        assert_eq!(profiles.len(), 2);
        assert!(t.db.get_user_by_username("alice").unwrap().is_some());
    }

    #[test]
    fn pool_counts_round_trips() {
        let t = temp_db();
        let before = t.db.stats().round_trips;
        t.db.get_conversations_for("u1").unwrap();
        t.db.get_conversations_for("u2").unwrap();
        let stats = t.db.stats();
        assert_eq!(stats.round_trips, before + 2);
        assert_eq!(stats.in_flight, 0);
        assert_eq!(stats.queued, 0);
        assert_eq!(stats.readers, 2);
    }
}
