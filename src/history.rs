// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Append-only history of balance-affecting events.
//!
//! The ledger only ever appends here (and only for expiry); it never reads
//! the log back. Exporters take records out with [`HistoryLog::drain`].

use crate::base::{EntryId, HistoryId, UserId};
use crate::entry::{EnergySource, LedgerEntry};
use chrono::{DateTime, Utc};
use crossbeam::queue::SegQueue;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Kind of balance-affecting event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryKind {
    Expired,
}

impl fmt::Display for HistoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Expired => f.write_str("expired"),
        }
    }
}

/// Metadata attached to an expiry record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpiryMetadata {
    pub ledger_id: EntryId,
    pub expired_at: DateTime<Utc>,
}

/// One history row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    pub id: HistoryId,
    pub user_id: UserId,
    /// Signed change to the balance. Negative for expiry.
    pub amount: i64,
    #[serde(rename = "type")]
    pub kind: HistoryKind,
    pub description: String,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// A thread-safe, append-only history log.
///
/// Records are kept in a [`SegQueue`] in append order; ids come from an
/// atomic counter, so concurrent sweeps never hand out the same id.
#[derive(Debug)]
pub struct HistoryLog {
    records: SegQueue<HistoryRecord>,
    next_id: AtomicU64,
}

impl HistoryLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self {
            records: SegQueue::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Appends an expiry record for the unspent remainder of `entry`.
    ///
    /// Must be called before the entry is zeroed, since the recorded amount
    /// is taken from `entry.amount`.
    pub fn record_expiry(&self, entry: &LedgerEntry, now: DateTime<Utc>) -> HistoryId {
        let metadata = ExpiryMetadata {
            ledger_id: entry.id,
            expired_at: entry.expires_at,
        };
        // Grants are capped at `LedgerEntry::MAX_AMOUNT`, so this is exact.
        let remainder = i64::try_from(entry.amount).unwrap_or(i64::MAX);
        self.append(HistoryRecord {
            id: self.allocate_id(),
            user_id: entry.user_id,
            amount: -remainder,
            kind: HistoryKind::Expired,
            description: expiry_description(entry.source),
            metadata: serde_json::to_value(metadata).unwrap_or(serde_json::Value::Null),
            created_at: now,
        })
    }

    /// Number of records not yet drained.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Removes and returns every record currently in the log, oldest first.
    pub fn drain(&self) -> Vec<HistoryRecord> {
        let mut drained = Vec::with_capacity(self.records.len());
        while let Some(record) = self.records.pop() {
            drained.push(record);
        }
        drained
    }

    fn allocate_id(&self) -> HistoryId {
        HistoryId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn append(&self, record: HistoryRecord) -> HistoryId {
        let id = record.id;
        self.records.push(record);
        id
    }
}

impl Default for HistoryLog {
    fn default() -> Self {
        Self::new()
    }
}

fn expiry_description(source: EnergySource) -> String {
    format!("Expired {source} energy")
}
