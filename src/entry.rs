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

//! Ledger entries.
//!
//! An entry records one grant of energy. It is drained in place by
//! consumption or zeroed by the expiry sweep, and is never removed:
//!
//! ```text
//!  grant ──► live (amount > 0) ──spend──► consumed (amount = 0, consumed_at set)
//!                  │
//!                  └──expires_at passes──► expired ──sweep──► consumed
//! ```

use crate::base::{EntryId, OrderId, UserId};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Origin of a grant.
///
/// The derived ordering is the consumption priority: `Free` drains before
/// `Paid`, whatever the relative age of the two entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnergySource {
    Free,
    Paid,
}

impl EnergySource {
    pub const FREE_EXPIRY_DAYS: i64 = 30;
    pub const PAID_EXPIRY_DAYS: i64 = 180;

    /// Lifetime of a grant from this source, measured from its creation.
    pub fn expiry_window(self) -> Duration {
        match self {
            Self::Free => Duration::days(Self::FREE_EXPIRY_DAYS),
            Self::Paid => Duration::days(Self::PAID_EXPIRY_DAYS),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Paid => "paid",
        }
    }
}

impl fmt::Display for EnergySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One grant of energy owned by a single user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub id: EntryId,
    pub user_id: UserId,
    pub source: EnergySource,
    /// Remaining quantity. Never increases.
    pub amount: u64,
    /// Quantity originally granted.
    pub initial_amount: u64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Set once `amount` reaches zero, by spending or by expiry.
    pub consumed_at: Option<DateTime<Utc>>,
    pub order_id: Option<OrderId>,
}

impl LedgerEntry {
    /// Largest quantity a single grant may carry. History records store the
    /// expired remainder as a negative `i64`, so an entry must fit in one.
    pub const MAX_AMOUNT: u64 = i64::MAX as u64;

    pub(crate) fn new(
        id: EntryId,
        user_id: UserId,
        amount: u64,
        source: EnergySource,
        order_id: Option<OrderId>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            user_id,
            source,
            amount,
            initial_amount: amount,
            created_at: now,
            expires_at: now + source.expiry_window(),
            consumed_at: None,
            order_id,
        }
    }

    /// Spendable at `now`: has energy left and expires strictly later.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.amount > 0 && self.expires_at > now
    }

    /// Due for the sweep at `now`: has energy left and expired strictly earlier.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.amount > 0 && self.expires_at < now
    }

    /// Key used to order live entries for consumption and breakdowns.
    pub(crate) fn priority(&self) -> (EnergySource, DateTime<Utc>, EntryId) {
        (self.source, self.created_at, self.id)
    }

    /// Takes up to `wanted` from this entry and returns how much was taken.
    pub(crate) fn take(&mut self, wanted: u64, now: DateTime<Utc>) -> u64 {
        let taken = self.amount.min(wanted);
        self.amount -= taken;
        if self.amount == 0 {
            self.consumed_at = Some(now);
        }
        taken
    }

    /// Zeroes the remaining amount and returns what was left.
    pub(crate) fn expire(&mut self, now: DateTime<Utc>) -> u64 {
        let remaining = self.amount;
        self.amount = 0;
        self.consumed_at = Some(now);
        remaining
    }
}

/// Part of a consumption drawn from a single entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumedPortion {
    pub entry_id: EntryId,
    pub source: EnergySource,
    pub amount: u64,
}
