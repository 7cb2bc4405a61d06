//! Contact repository contract and SQLite implementation.
//!
//! # Responsibility
//! - Provide the store capabilities used by identify: attribute and link
//!   lookup, insert, and batch link update.
//! - Keep SQL details inside the persistence boundary.
//!
//! # Invariants
//! - Lookup results are ordered by `created_at ASC, id ASC`.
//! - No statement binds more than `MAX_BIND_VALUES` values; larger id or
//!   attribute sets are split across statements and merged by id.
//! - Write paths validate before SQL mutations.
//! - Read paths validate every decoded row.

use crate::db::migrations::latest_version;
use crate::db::DbError;
use crate::model::contact::{
    Contact, ContactId, ContactLinkUpdate, ContactValidationError, LinkPrecedence, NewContact,
};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

const CONTACT_SELECT_SQL: &str = "SELECT
    id,
    email,
    phone_number,
    link_precedence,
    linked_id,
    created_at,
    updated_at
FROM contacts";

const NOW_EPOCH_MS_SQL: &str = "CAST((julianday('now') - 2440587.5) * 86400000 AS INTEGER)";

/// Bind values per statement, well below SQLite's variable limit.
pub const MAX_BIND_VALUES: usize = 500;

const REQUIRED_COLUMNS: &[&str] = &[
    "id",
    "email",
    "phone_number",
    "link_precedence",
    "linked_id",
    "created_at",
    "updated_at",
];

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for contact persistence and lookup operations.
#[derive(Debug)]
pub enum RepoError {
    Validation(ContactValidationError),
    Db(DbError),
    NotFound(ContactId),
    InvalidData(String),
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    MissingRequiredTable(&'static str),
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "contact not found: {id}"),
            Self::InvalidData(message) => write!(f, "invalid persisted contact data: {message}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "connection schema version {actual_version} does not match expected {expected_version}; open it with db::open_db"
            ),
            Self::MissingRequiredTable(table) => write!(f, "missing required table `{table}`"),
            Self::MissingRequiredColumn { table, column } => {
                write!(f, "missing required column `{table}.{column}`")
            }
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ContactValidationError> for RepoError {
    fn from(value: ContactValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Store capabilities consumed by cluster discovery and consolidation.
pub trait ContactRepository {
    /// Returns every contact whose email is in `emails` OR whose phone number
    /// is in `phone_numbers`, ordered by creation.
    fn find_many(&self, emails: &[String], phone_numbers: &[String]) -> RepoResult<Vec<Contact>>;
    /// Returns every contact whose id is in `ids`, ordered by creation.
    fn find_by_ids(&self, ids: &[ContactId]) -> RepoResult<Vec<Contact>>;
    /// Returns every contact whose `linked_id` is in `primary_ids`, ordered by
    /// creation. Reaches secondaries that share no attribute with their
    /// primary.
    fn find_linked(&self, primary_ids: &[ContactId]) -> RepoResult<Vec<Contact>>;
    /// Inserts one contact and returns it as persisted.
    fn create_contact(&self, contact: &NewContact) -> RepoResult<Contact>;
    /// Applies one link update to every listed contact; returns rows changed.
    ///
    /// Large id sets are written in several statements; run inside a
    /// transaction when the batch must apply all-or-nothing.
    fn update_many(&self, ids: &[ContactId], update: &ContactLinkUpdate) -> RepoResult<usize>;
    /// Gets one contact by id.
    fn get_contact(&self, id: ContactId) -> RepoResult<Option<Contact>>;
}

/// SQLite-backed contact repository.
///
/// Accepts any `&Connection`, including a `rusqlite::Transaction` through
/// deref, so callers decide the transaction scope.
pub struct SqliteContactRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteContactRepository<'conn> {
    /// Constructs a repository from a migrated connection.
    ///
    /// # Errors
    /// - `UninitializedConnection` when migrations have not been applied.
    /// - `MissingRequiredTable` / `MissingRequiredColumn` when the schema is
    ///   incomplete.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn)?;
        Ok(Self { conn })
    }
}

impl SqliteContactRepository<'_> {
    /// Runs `column IN (..)` in chunks of `MAX_BIND_VALUES` and merges the
    /// rows into `found` by id.
    fn collect_where_in(
        &self,
        column: &str,
        values: &[Value],
        found: &mut HashMap<ContactId, Contact>,
    ) -> RepoResult<()> {
        for chunk in values.chunks(MAX_BIND_VALUES) {
            let sql = format!(
                "{CONTACT_SELECT_SQL} WHERE {column} IN ({});",
                placeholders(chunk.len())
            );
            let mut stmt = self.conn.prepare(&sql)?;
            let mut rows = stmt.query(params_from_iter(chunk))?;
            while let Some(row) = rows.next()? {
                let contact = parse_contact_row(row)?;
                found.insert(contact.id, contact);
            }
        }
        Ok(())
    }

    fn query_ids(&self, column: &str, ids: &[ContactId]) -> RepoResult<Vec<Contact>> {
        let values: Vec<Value> = ids.iter().copied().map(Value::Integer).collect();
        let mut found = HashMap::new();
        self.collect_where_in(column, &values, &mut found)?;
        Ok(ordered(found))
    }
}

impl ContactRepository for SqliteContactRepository<'_> {
    fn find_many(&self, emails: &[String], phone_numbers: &[String]) -> RepoResult<Vec<Contact>> {
        let emails: Vec<Value> = emails.iter().cloned().map(Value::Text).collect();
        let phone_numbers: Vec<Value> = phone_numbers.iter().cloned().map(Value::Text).collect();

        let mut found = HashMap::new();
        self.collect_where_in("email", &emails, &mut found)?;
        self.collect_where_in("phone_number", &phone_numbers, &mut found)?;
        Ok(ordered(found))
    }

    fn find_by_ids(&self, ids: &[ContactId]) -> RepoResult<Vec<Contact>> {
        self.query_ids("id", ids)
    }

    fn find_linked(&self, primary_ids: &[ContactId]) -> RepoResult<Vec<Contact>> {
        self.query_ids("linked_id", primary_ids)
    }

    fn create_contact(&self, contact: &NewContact) -> RepoResult<Contact> {
        contact.validate()?;

        self.conn.execute(
            "INSERT INTO contacts (
                email,
                phone_number,
                link_precedence,
                linked_id
            ) VALUES (?1, ?2, ?3, ?4);",
            params![
                contact.email.as_deref(),
                contact.phone_number.as_deref(),
                contact.link_precedence.as_str(),
                contact.linked_id,
            ],
        )?;

        let id = self.conn.last_insert_rowid();
        self.get_contact(id)?.ok_or(RepoError::NotFound(id))
    }

    fn update_many(&self, ids: &[ContactId], update: &ContactLinkUpdate) -> RepoResult<usize> {
        update.validate()?;

        let mut changed = 0;
        for chunk in ids.chunks(MAX_BIND_VALUES) {
            let sql = format!(
                "UPDATE contacts
                 SET
                    link_precedence = ?,
                    linked_id = ?,
                    updated_at = {NOW_EPOCH_MS_SQL}
                 WHERE id IN ({});",
                placeholders(chunk.len())
            );

            let mut bind_values: Vec<Value> = Vec::with_capacity(chunk.len() + 2);
            bind_values.push(Value::Text(update.link_precedence.as_str().to_string()));
            bind_values.push(update.linked_id.map_or(Value::Null, Value::Integer));
            bind_values.extend(chunk.iter().copied().map(Value::Integer));

            changed += self.conn.execute(&sql, params_from_iter(bind_values))?;
        }
        Ok(changed)
    }

    fn get_contact(&self, id: ContactId) -> RepoResult<Option<Contact>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{CONTACT_SELECT_SQL} WHERE id = ?1;"))?;

        let mut rows = stmt.query([id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_contact_row(row)?));
        }

        Ok(None)
    }
}

fn ordered(found: HashMap<ContactId, Contact>) -> Vec<Contact> {
    let mut contacts: Vec<Contact> = found.into_values().collect();
    contacts.sort_by_key(Contact::election_key);
    contacts
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

fn parse_contact_row(row: &Row<'_>) -> RepoResult<Contact> {
    let id: ContactId = row.get("id")?;
    let precedence_text: String = row.get("link_precedence")?;
    let link_precedence = LinkPrecedence::parse(&precedence_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid link precedence `{precedence_text}` in contacts.link_precedence for id {id}"
        ))
    })?;

    let contact = Contact {
        id,
        email: row.get("email")?,
        phone_number: row.get("phone_number")?,
        link_precedence,
        linked_id: row.get("linked_id")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    };
    contact.validate()?;
    Ok(contact)
}

fn ensure_connection_ready(conn: &Connection) -> RepoResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version < expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    if !table_exists(conn, "contacts")? {
        return Err(RepoError::MissingRequiredTable("contacts"));
    }

    for &column in REQUIRED_COLUMNS {
        if !table_has_column(conn, "contacts", column)? {
            return Err(RepoError::MissingRequiredColumn {
                table: "contacts",
                column,
            });
        }
    }

    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> RepoResult<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let current: String = row.get(1)?;
        if current == column {
            return Ok(true);
        }
    }
    Ok(false)
}
