use rusqlite::{Connection, OptionalExtension, Result as SqliteResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::domain::entities::{GuildId, RoleId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClubRole {
    pub club: String,
    pub guild_id: GuildId,
    pub role_id: RoleId,
    pub created_at: String,
}

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn new(path: impl AsRef<Path>) -> SqliteResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init_tables()?;
        Ok(db)
    }

    pub fn in_memory() -> SqliteResult<Self> {
        let db = Self {
            conn: Connection::open_in_memory()?,
        };
        db.init_tables()?;
        Ok(db)
    }

    fn init_tables(&self) -> SqliteResult<()> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS club_roles (
                club TEXT PRIMARY KEY NOT NULL,
                guild_id INTEGER NOT NULL,
                role_id INTEGER NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            )",
            [],
        )?;
        Ok(())
    }

    // Club roles
    pub fn set_club_role(&self, club: &str, guild_id: GuildId, role_id: RoleId) -> SqliteResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO club_roles (club, guild_id, role_id) VALUES (?1, ?2, ?3)",
            rusqlite::params![club, guild_id as i64, role_id as i64],
        )?;
        Ok(())
    }

    pub fn remove_club_role(&self, club: &str) -> SqliteResult<bool> {
        let rows = self.conn.execute("DELETE FROM club_roles WHERE club = ?1", [club])?;
        Ok(rows > 0)
    }

    pub fn get_club_role(&self, club: &str) -> SqliteResult<Option<ClubRole>> {
        self.conn
            .query_row(
                "SELECT club, guild_id, role_id, created_at FROM club_roles WHERE club = ?1",
                [club],
                row_to_club_role,
            )
            .optional()
    }

    pub fn list_club_roles(&self) -> SqliteResult<Vec<ClubRole>> {
        let mut stmt = self
            .conn
            .prepare("SELECT club, guild_id, role_id, created_at FROM club_roles ORDER BY club")?;

        let rows = stmt.query_map([], row_to_club_role)?;

        let mut clubs = Vec::new();
        for club in rows {
            clubs.push(club?);
        }
        Ok(clubs)
    }
}

fn row_to_club_role(row: &rusqlite::Row<'_>) -> SqliteResult<ClubRole> {
    Ok(ClubRole {
        club: row.get(0)?,
        guild_id: row.get::<_, i64>(1)? as GuildId,
        role_id: row.get::<_, i64>(2)? as RoleId,
        created_at: row.get(3)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_replaces_existing_club() {
        let db = Database::in_memory().unwrap();
        db.set_club_role("囲碁部", 1, 10).unwrap();
        db.set_club_role("囲碁部", 1, 11).unwrap();
        db.set_club_role("麻雀部", 1, 12).unwrap();

        let clubs = db.list_club_roles().unwrap();
        assert_eq!(clubs.len(), 2);
        assert_eq!(db.get_club_role("囲碁部").unwrap().unwrap().role_id, 11);
    }

    #[test]
    fn remove_reports_whether_anything_was_deleted() {
        let db = Database::in_memory().unwrap();
        db.set_club_role("麻雀部", 1, 12).unwrap();
        assert!(db.remove_club_role("麻雀部").unwrap());
        assert!(!db.remove_club_role("麻雀部").unwrap());
        assert!(db.get_club_role("麻雀部").unwrap().is_none());
    }

    #[test]
    fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("club.db");
        Database::new(&path).unwrap().set_club_role("将棋部", 2, 1_234_567_890_123).unwrap();

        let reopened = Database::new(&path).unwrap();
        let club = reopened.get_club_role("将棋部").unwrap().unwrap();
        assert_eq!((club.guild_id, club.role_id), (2, 1_234_567_890_123));
    }
}
