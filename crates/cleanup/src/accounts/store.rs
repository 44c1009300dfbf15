//! Persistent storage for users, linked accounts and sessions
//!
//! [`AccountStore`] is the interface the web backend and the messages
//! service use. [`SqliteAccountStore`] is the implementation; tests open it
//! in memory.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use log::{debug, info};
use rusqlite::{Connection, OptionalExtension, Row, params};
use rusqlite_migration::{M, Migrations};

use super::models::{AccountGrant, GoogleAccount, Session, User};

/// Email of the user provisioned when no user exists yet
pub const DEFAULT_LOCAL_USER_EMAIL: &str = "local-user@localhost";

/// Storage operations for users, accounts and sessions
pub trait AccountStore: Send + Sync {
    fn get_user(&self, user_id: i64) -> Result<Option<User>>;

    /// User with the lowest ID
    fn first_user(&self) -> Result<Option<User>>;

    fn create_user(&self, email: &str) -> Result<User>;

    /// Delete a user and, by cascade, all of their accounts
    fn delete_user(&self, user_id: i64) -> Result<bool>;

    /// Look up an account by ID and owner together
    ///
    /// Returns `None` both when the account does not exist and when it
    /// belongs to someone else.
    fn find_account(&self, user_id: i64, account_id: i64) -> Result<Option<GoogleAccount>>;

    /// Accounts owned by `user_id`, oldest first
    fn list_accounts(&self, user_id: i64) -> Result<Vec<GoogleAccount>>;

    /// Insert a new account or update the existing `(user_id, google_sub)` row
    /// in place (email, credential, scopes, last used)
    fn upsert_account(&self, grant: &AccountGrant) -> Result<GoogleAccount>;

    /// Delete an owned account; `false` when not found or not owned
    fn delete_account(&self, user_id: i64, account_id: i64) -> Result<bool>;

    fn create_session(&self) -> Result<Session>;

    fn get_session(&self, session_id: &str) -> Result<Option<Session>>;

    fn set_session_user(&self, session_id: &str, user_id: i64) -> Result<()>;

    /// Store the pending OAuth state, replacing any previous one
    fn set_oauth_state(&self, session_id: &str, state: &str) -> Result<()>;

    /// Atomically clear the pending state if it equals `state`
    ///
    /// Returns `true` exactly once per stored state.
    fn consume_oauth_state(&self, session_id: &str, state: &str) -> Result<bool>;

    fn delete_session(&self, session_id: &str) -> Result<()>;

    /// Resolve the current user, provisioning one on first touch
    ///
    /// Order: the session's user if it still exists, then the first user,
    /// then a newly created [`DEFAULT_LOCAL_USER_EMAIL`] user.
    fn current_user(&self, session_user: Option<i64>) -> Result<User> {
        if let Some(user_id) = session_user
            && let Some(user) = self.get_user(user_id)?
        {
            return Ok(user);
        }
        if let Some(user) = self.first_user()? {
            return Ok(user);
        }
        let user = self.create_user(DEFAULT_LOCAL_USER_EMAIL)?;
        info!("Provisioned local user {}", user.id);
        Ok(user)
    }
}

fn migrations() -> Migrations<'static> {
    Migrations::new(vec![
        // Migration 1: users and linked Google accounts
        M::up(
            r#"
            CREATE TABLE users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                email TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL
            );

            CREATE TABLE google_accounts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                google_sub TEXT NOT NULL,
                email TEXT NOT NULL,
                token_encrypted TEXT NOT NULL,
                scopes TEXT NOT NULL,
                created_at TEXT NOT NULL,
                last_used_at TEXT,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
                CONSTRAINT uq_google_accounts_user_sub UNIQUE (user_id, google_sub)
            );

            CREATE INDEX idx_google_accounts_user_id ON google_accounts(user_id);
            "#,
        ),
        // Migration 2: server-side sessions
        M::up(
            r#"
            CREATE TABLE sessions (
                id TEXT PRIMARY KEY,
                user_id INTEGER,
                oauth_state TEXT,
                created_at TEXT NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE SET NULL
            );
            "#,
        ),
    ])
}

const ACCOUNT_COLUMNS: &str = "id, user_id, google_sub, email, token_encrypted, scopes, created_at, last_used_at";

/// SQLite-backed [`AccountStore`]
pub struct SqliteAccountStore {
    conn: Mutex<Connection>,
}

impl SqliteAccountStore {
    /// Open (or create) the database at `db_path` and run migrations
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(db_path.as_ref())
            .with_context(|| format!("Failed to open database at {:?}", db_path.as_ref()))?;
        Self::init(conn)
    }

    /// In-memory database, for tests
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(mut conn: Connection) -> Result<Self> {
        // foreign_keys is required for ON DELETE CASCADE
        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;
            PRAGMA synchronous = NORMAL;
            "#,
        )?;

        migrations()
            .to_latest(&mut conn)
            .context("Failed to run database migrations")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("account store connection lock poisoned"))
    }

    fn load_account(conn: &Connection, account_id: i64) -> Result<Option<GoogleAccount>> {
        conn.query_row(
            &format!("SELECT {ACCOUNT_COLUMNS} FROM google_accounts WHERE id = ?"),
            [account_id],
            account_from_row,
        )
        .optional()
        .map_err(Into::into)
    }
}

fn parse_time(raw: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e)))
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        created_at: parse_time(row.get(2)?)?,
    })
}

fn account_from_row(row: &Row<'_>) -> rusqlite::Result<GoogleAccount> {
    Ok(GoogleAccount {
        id: row.get(0)?,
        user_id: row.get(1)?,
        google_sub: row.get(2)?,
        email: row.get(3)?,
        token_encrypted: row.get(4)?,
        scopes: row.get(5)?,
        created_at: parse_time(row.get(6)?)?,
        last_used_at: row
            .get::<_, Option<String>>(7)?
            .map(parse_time)
            .transpose()?,
    })
}

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<Session> {
    Ok(Session {
        id: row.get(0)?,
        user_id: row.get(1)?,
        oauth_state: row.get(2)?,
    })
}

impl AccountStore for SqliteAccountStore {
    fn get_user(&self, user_id: i64) -> Result<Option<User>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT id, email, created_at FROM users WHERE id = ?",
            [user_id],
            user_from_row,
        )
        .optional()
        .map_err(Into::into)
    }

    fn first_user(&self) -> Result<Option<User>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT id, email, created_at FROM users ORDER BY id ASC LIMIT 1",
            [],
            user_from_row,
        )
        .optional()
        .map_err(Into::into)
    }

    fn create_user(&self, email: &str) -> Result<User> {
        let conn = self.conn()?;
        let now = Utc::now();
        conn.execute(
            "INSERT INTO users (email, created_at) VALUES (?, ?)",
            params![email, now.to_rfc3339()],
        )
        .with_context(|| format!("Failed to create user {email}"))?;
        Ok(User {
            id: conn.last_insert_rowid(),
            email: email.to_string(),
            created_at: now,
        })
    }

    fn delete_user(&self, user_id: i64) -> Result<bool> {
        let conn = self.conn()?;
        Ok(conn.execute("DELETE FROM users WHERE id = ?", [user_id])? > 0)
    }

    fn find_account(&self, user_id: i64, account_id: i64) -> Result<Option<GoogleAccount>> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {ACCOUNT_COLUMNS} FROM google_accounts WHERE id = ? AND user_id = ?"),
            params![account_id, user_id],
            account_from_row,
        )
        .optional()
        .map_err(Into::into)
    }

    fn list_accounts(&self, user_id: i64) -> Result<Vec<GoogleAccount>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM google_accounts
             WHERE user_id = ? ORDER BY created_at ASC, id ASC"
        ))?;
        let accounts = stmt
            .query_map([user_id], account_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(accounts)
    }

    fn upsert_account(&self, grant: &AccountGrant) -> Result<GoogleAccount> {
        let conn = self.conn()?;
        let now = Utc::now().to_rfc3339();
        let id: i64 = conn
            .query_row(
                "INSERT INTO google_accounts
                 (user_id, google_sub, email, token_encrypted, scopes, created_at, last_used_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
                 ON CONFLICT (user_id, google_sub) DO UPDATE SET
                    email = excluded.email,
                    token_encrypted = excluded.token_encrypted,
                    scopes = excluded.scopes,
                    last_used_at = excluded.last_used_at
                 RETURNING id",
                params![
                    grant.user_id,
                    grant.google_sub,
                    grant.email,
                    grant.token_encrypted,
                    grant.scopes,
                    now,
                ],
                |row| row.get(0),
            )
            .context("Failed to upsert Google account")?;
        debug!("Upserted account {} for user {}", id, grant.user_id);

        Self::load_account(&conn, id)?.context("Upserted account disappeared")
    }

    fn delete_account(&self, user_id: i64, account_id: i64) -> Result<bool> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM google_accounts WHERE id = ? AND user_id = ?",
            params![account_id, user_id],
        )?;
        Ok(deleted > 0)
    }

    fn create_session(&self) -> Result<Session> {
        let conn = self.conn()?;
        let id = uuid::Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO sessions (id, created_at) VALUES (?, ?)",
            params![id, Utc::now().to_rfc3339()],
        )?;
        Ok(Session {
            id,
            user_id: None,
            oauth_state: None,
        })
    }

    fn get_session(&self, session_id: &str) -> Result<Option<Session>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT id, user_id, oauth_state FROM sessions WHERE id = ?",
            [session_id],
            session_from_row,
        )
        .optional()
        .map_err(Into::into)
    }

    fn set_session_user(&self, session_id: &str, user_id: i64) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE sessions SET user_id = ? WHERE id = ?",
            params![user_id, session_id],
        )?;
        Ok(())
    }

    fn set_oauth_state(&self, session_id: &str, state: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE sessions SET oauth_state = ? WHERE id = ?",
            params![state, session_id],
        )?;
        Ok(())
    }

    fn consume_oauth_state(&self, session_id: &str, state: &str) -> Result<bool> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE sessions SET oauth_state = NULL WHERE id = ? AND oauth_state = ?",
            params![session_id, state],
        )?;
        Ok(updated == 1)
    }

    fn delete_session(&self, session_id: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM sessions WHERE id = ?", [session_id])?;
        Ok(())
    }
}
