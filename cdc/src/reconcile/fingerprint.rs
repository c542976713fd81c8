use std::fmt;

use chrono::{Datelike, Timelike};
use sha2::{Digest, Sha256};

use crate::types::Cell;

/// Content fingerprint of a row's value columns.
///
/// SHA-256 over a canonical encoding: the column count, then per column a type tag followed by
/// a length-prefixed payload. Distinct column sequences therefore never share an encoding, and
/// the key column is never part of it.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct RowFingerprint([u8; 32]);

impl RowFingerprint {
    pub fn of(values: &[Cell]) -> RowFingerprint {
        let mut hasher = Sha256::new();
        hasher.update((values.len() as u64).to_le_bytes());
        for cell in values {
            encode_cell(cell, &mut hasher);
        }

        RowFingerprint(hasher.finalize().into())
    }
}

impl fmt::Display for RowFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }

        Ok(())
    }
}

impl fmt::Debug for RowFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RowFingerprint({self})")
    }
}

fn encode_cell(cell: &Cell, hasher: &mut Sha256) {
    let tag: u8 = match cell {
        Cell::Null => 0,
        Cell::Bool(_) => 1,
        Cell::String(_) => 2,
        Cell::I16(_) => 3,
        Cell::I32(_) => 4,
        Cell::I64(_) => 5,
        Cell::F32(_) => 6,
        Cell::F64(_) => 7,
        Cell::Numeric(_) => 8,
        Cell::Date(_) => 9,
        Cell::Time(_) => 10,
        Cell::Timestamp(_) => 11,
        Cell::TimestampTz(_) => 12,
        Cell::Uuid(_) => 13,
        Cell::Json(_) => 14,
        Cell::Bytes(_) => 15,
    };
    hasher.update([tag]);

    match cell {
        Cell::Null => write_payload(hasher, &[]),
        Cell::Bool(v) => write_payload(hasher, &[u8::from(*v)]),
        Cell::String(v) | Cell::Numeric(v) => write_payload(hasher, v.as_bytes()),
        Cell::I16(v) => write_payload(hasher, &v.to_le_bytes()),
        Cell::I32(v) => write_payload(hasher, &v.to_le_bytes()),
        Cell::I64(v) => write_payload(hasher, &v.to_le_bytes()),
        Cell::F32(v) => write_payload(hasher, &v.to_bits().to_le_bytes()),
        Cell::F64(v) => write_payload(hasher, &v.to_bits().to_le_bytes()),
        Cell::Date(v) => write_payload(hasher, &v.num_days_from_ce().to_le_bytes()),
        Cell::Time(v) => {
            let mut payload = [0u8; 8];
            payload[..4].copy_from_slice(&v.num_seconds_from_midnight().to_le_bytes());
            payload[4..].copy_from_slice(&v.nanosecond().to_le_bytes());
            write_payload(hasher, &payload);
        }
        Cell::Timestamp(v) => write_instant(hasher, v.and_utc().timestamp(), v.nanosecond()),
        Cell::TimestampTz(v) => write_instant(hasher, v.timestamp(), v.nanosecond()),
        Cell::Uuid(v) => write_payload(hasher, v.as_bytes()),
        // serde_json's default map keeps keys sorted, so equal documents serialize equally.
        Cell::Json(v) => write_payload(hasher, v.to_string().as_bytes()),
        Cell::Bytes(v) => write_payload(hasher, v),
    }
}

fn write_instant(hasher: &mut Sha256, seconds: i64, nanos: u32) {
    let mut payload = [0u8; 12];
    payload[..8].copy_from_slice(&seconds.to_le_bytes());
    payload[8..].copy_from_slice(&nanos.to_le_bytes());
    write_payload(hasher, &payload);
}

fn write_payload(hasher: &mut Sha256, payload: &[u8]) {
    hasher.update((payload.len() as u64).to_le_bytes());
    hasher.update(payload);
}
