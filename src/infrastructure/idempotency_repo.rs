use chrono::{DateTime, Utc};
use diesel::prelude::*;

use crate::db::DbPool;
use crate::domain::errors::DomainError;
use crate::domain::idempotency::{Claim, ResultSnapshot};
use crate::domain::ports::IdempotencyStore;
use crate::schema::idempotency_records;

use super::models::IdempotencyRow;

pub struct DieselIdempotencyStore {
    pool: DbPool,
}

impl DieselIdempotencyStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl IdempotencyStore for DieselIdempotencyStore {
    fn claim(
        &self,
        key: &str,
        fingerprint: &str,
        now: DateTime<Utc>,
        expired_before: DateTime<Utc>,
    ) -> Result<Claim, DomainError> {
        let mut conn = self.pool.get()?;

        conn.transaction::<_, DomainError, _>(|conn| {
            diesel::delete(
                idempotency_records::table
                    .find((key, fingerprint))
                    .filter(idempotency_records::created_at.lt(expired_before)),
            )
            .execute(conn)?;

            // The primary key decides which concurrent caller owns the key.
            let inserted = diesel::insert_into(idempotency_records::table)
                .values(&IdempotencyRow {
                    key: key.to_string(),
                    endpoint_fingerprint: fingerprint.to_string(),
                    response_status: None,
                    response_body: None,
                    created_at: now,
                })
                .on_conflict((
                    idempotency_records::key,
                    idempotency_records::endpoint_fingerprint,
                ))
                .do_nothing()
                .execute(conn)?;
            if inserted == 1 {
                return Ok(Claim::Acquired);
            }

            let existing = idempotency_records::table
                .find((key, fingerprint))
                .select(IdempotencyRow::as_select())
                .first(conn)
                .optional()?;
            match existing {
                Some(row) => Ok(match row.snapshot()? {
                    Some(result) => Claim::Completed(result),
                    None => Claim::InFlight,
                }),
                // Released between our insert and read; report it as busy so
                // the caller retries instead of racing again.
                None => Ok(Claim::InFlight),
            }
        })
    }

    fn complete(
        &self,
        key: &str,
        fingerprint: &str,
        result: &ResultSnapshot,
    ) -> Result<(), DomainError> {
        let mut conn = self.pool.get()?;
        let updated = diesel::update(idempotency_records::table.find((key, fingerprint)))
            .set((
                idempotency_records::response_status.eq(Some(i32::from(result.status))),
                idempotency_records::response_body.eq(Some(result.body.clone())),
            ))
            .execute(&mut conn)?;
        if updated == 0 {
            return Err(DomainError::NotFound("idempotency record"));
        }
        Ok(())
    }

    fn release(&self, key: &str, fingerprint: &str) -> Result<(), DomainError> {
        let mut conn = self.pool.get()?;
        diesel::delete(
            idempotency_records::table
                .find((key, fingerprint))
                .filter(idempotency_records::response_status.is_null()),
        )
        .execute(&mut conn)?;
        Ok(())
    }

    fn prune(&self, cutoff: DateTime<Utc>) -> Result<usize, DomainError> {
        let mut conn = self.pool.get()?;
        let deleted = diesel::delete(
            idempotency_records::table.filter(idempotency_records::created_at.lt(cutoff)),
        )
        .execute(&mut conn)?;
        Ok(deleted)
    }
}
