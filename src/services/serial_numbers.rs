//! Serial number allocation for issued units.
//!
//! Serials have the form `NPC/{UNIT}/{CATEGORY_ABBR}/{NAME_ABBR}/{SEQ}`. The
//! sequence is per prefix: the next value is one past the highest suffix
//! already stored, zero padded to three digits. Allocation must run inside the
//! caller's transaction; on Postgres the prefix is additionally guarded by a
//! transaction-scoped advisory lock so concurrent issuances of the same
//! unit/category/item serialize.

use metrics::counter;
use once_cell::sync::Lazy;
use regex::Regex;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DbBackend, DbErr, EntityTrait, PaginatorTrait, QueryFilter,
    QuerySelect, Statement,
};
use tracing::{debug, error, instrument};

use crate::{config::SerialConfig, db, entities::issued_item, errors::ServiceError};

const UNKNOWN_SEGMENT: &str = "UNK";

static SEQUENCE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{3,}$").expect("valid regex"));

/// Uppercased first letter of every whitespace-separated word
pub fn abbreviate(text: &str) -> String {
    text.split_whitespace()
        .filter_map(|word| word.chars().next())
        .flat_map(char::to_uppercase)
        .collect()
}

fn segment_or_unknown(segment: String) -> String {
    if segment.is_empty() {
        UNKNOWN_SEGMENT.to_string()
    } else {
        segment
    }
}

/// Sequence number of `serial` when it belongs to `prefix`
pub fn parse_sequence(prefix: &str, serial: &str) -> Option<u32> {
    let suffix = serial.strip_prefix(prefix)?.strip_prefix('/')?;
    if !SEQUENCE_RE.is_match(suffix) {
        return None;
    }
    suffix.parse().ok()
}

pub fn format_serial(prefix: &str, sequence: u32) -> String {
    format!("{}/{:03}", prefix, sequence)
}

#[derive(Debug, Clone)]
pub struct SerialNumberAllocator {
    namespace: String,
    max_attempts: u32,
}

impl Default for SerialNumberAllocator {
    fn default() -> Self {
        Self::new(&SerialConfig::default())
    }
}

impl SerialNumberAllocator {
    pub fn new(config: &SerialConfig) -> Self {
        Self {
            namespace: config.namespace.clone(),
            max_attempts: config.max_attempts.max(1),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// `NPC/{UNIT}/{CAT}/{NAME}` with `UNK` for any missing segment
    pub fn prefix(&self, unit: Option<&str>, category: &str, item_name: &str) -> String {
        let unit = segment_or_unknown(unit.map(|u| u.trim().to_uppercase()).unwrap_or_default());
        let category = segment_or_unknown(abbreviate(category));
        let name = segment_or_unknown(abbreviate(item_name));
        format!("{}/{}/{}/{}", self.namespace, unit, category, name)
    }

    /// Produces a serial that does not exist yet in `conn`.
    ///
    /// Probes upward from the highest stored sequence for the prefix until a
    /// free value is found, giving up with `Conflict` after the retry budget.
    #[instrument(skip(self, conn))]
    pub async fn generate_serial<C: ConnectionTrait>(
        &self,
        conn: &C,
        unit: Option<&str>,
        category: &str,
        item_name: &str,
    ) -> Result<String, ServiceError> {
        let prefix = self.prefix(unit, category, item_name);
        self.lock_prefix(conn, &prefix).await.map_err(allocation_error)?;

        let highest = self.highest_sequence(conn, &prefix).await.map_err(allocation_error)?;
        let mut candidate = highest + 1;

        for _ in 0..self.max_attempts {
            let serial = format_serial(&prefix, candidate);
            if !self.exists(conn, &serial).await.map_err(allocation_error)? {
                counter!("equipment_serials.allocated", 1);
                debug!(serial = %serial, "allocated serial number");
                return Ok(serial);
            }
            candidate += 1;
        }

        error!(prefix = %prefix, "serial retry budget exhausted");
        Err(ServiceError::Conflict(format!(
            "no free serial number for prefix {} after {} attempts",
            prefix, self.max_attempts
        )))
    }

    async fn lock_prefix<C: ConnectionTrait>(&self, conn: &C, prefix: &str) -> Result<(), DbErr> {
        if conn.get_database_backend() != DbBackend::Postgres {
            // SQLite serializes writers for the whole database already.
            return Ok(());
        }
        conn.execute(Statement::from_sql_and_values(
            DbBackend::Postgres,
            "SELECT pg_advisory_xact_lock(hashtext($1))",
            [prefix.into()],
        ))
        .await
        .map(|_| ())
    }

    async fn highest_sequence<C: ConnectionTrait>(&self, conn: &C, prefix: &str) -> Result<u32, DbErr> {
        let serials: Vec<String> = issued_item::Entity::find()
            .select_only()
            .column(issued_item::Column::SerialNumber)
            .filter(issued_item::Column::SerialNumber.starts_with(format!("{}/", prefix)))
            .into_tuple()
            .all(conn)
            .await?;

        Ok(serials
            .iter()
            .filter_map(|serial| parse_sequence(prefix, serial))
            .max()
            .unwrap_or(0))
    }

    async fn exists<C: ConnectionTrait>(&self, conn: &C, serial: &str) -> Result<bool, DbErr> {
        let count = issued_item::Entity::find()
            .filter(issued_item::Column::SerialNumber.eq(serial))
            .count(conn)
            .await?;
        Ok(count > 0)
    }
}

fn allocation_error(err: DbErr) -> ServiceError {
    if db::is_unreachable(&err) {
        error!("serial allocation could not reach the store: {}", err);
        ServiceError::AllocationError(err.to_string())
    } else {
        ServiceError::DatabaseError(err)
    }
}
