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

//! Per-user wallet.
//!
//! A wallet owns a user's denormalized balance together with every ledger
//! entry granted to that user. All reads and writes go through one mutex, so
//! each operation (guard, selection, per-entry updates, balance update) is a
//! single atomic step with respect to other callers on the same user.
//!
//! # Example
//!
//! ```
//! use energy_ledger::{UserId, Wallet};
//!
//! let wallet = Wallet::new(UserId(1));
//! assert_eq!(wallet.balance(), 0);
//! ```

use crate::base::{EntryId, OrderId, UserId};
use crate::entry::{ConsumedPortion, EnergySource, LedgerEntry};
use crate::history::HistoryLog;
use crate::outcome::{ConsumeOutcome, Consumption, EnergyBreakdown, SweepSummary};
use crate::LedgerError;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

#[derive(Debug)]
struct WalletData {
    user_id: UserId,
    energy_balance: u64,
    /// Entries in grant order. Never removed.
    entries: Vec<LedgerEntry>,
}

impl WalletData {
    fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            energy_balance: 0,
            entries: Vec::new(),
        }
    }

    fn assert_invariants(&self) {
        debug_assert_eq!(
            self.energy_balance,
            self.entries.iter().map(|e| e.amount).sum::<u64>(),
            "Invariant violated: balance out of sync with ledger entries for user {}",
            self.user_id
        );
        debug_assert!(
            self.entries.iter().all(|e| e.amount <= e.initial_amount),
            "Invariant violated: entry amount above its initial amount"
        );
    }

    /// Indices of spendable entries, in consumption order.
    fn live_order(&self, now: DateTime<Utc>) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.entries.len())
            .filter(|&i| self.entries[i].is_live(now))
            .collect();
        order.sort_by_key(|&i| self.entries[i].priority());
        order
    }

    fn grant(
        &mut self,
        id: EntryId,
        amount: u64,
        source: EnergySource,
        order_id: Option<OrderId>,
        now: DateTime<Utc>,
    ) -> Result<LedgerEntry, LedgerError> {
        if amount == 0 || amount > LedgerEntry::MAX_AMOUNT {
            return Err(LedgerError::InvalidAmount);
        }
        let balance = self
            .energy_balance
            .checked_add(amount)
            .ok_or(LedgerError::InvalidAmount)?;

        let entry = LedgerEntry::new(id, self.user_id, amount, source, order_id, now);
        self.entries.push(entry.clone());
        self.energy_balance = balance;
        self.assert_invariants();
        Ok(entry)
    }

    fn consume(&mut self, amount: u64, now: DateTime<Utc>) -> Result<ConsumeOutcome, LedgerError> {
        if amount == 0 {
            return Err(LedgerError::InvalidAmount);
        }

        // Fast fail on the cached balance.
        let balance = self.energy_balance;
        if balance < amount {
            return Ok(ConsumeOutcome::Insufficient {
                current: balance,
                required: amount,
            });
        }

        // The balance still counts expired entries until the sweep runs.
        let order = self.live_order(now);
        let live: u64 = order.iter().map(|&i| self.entries[i].amount).sum();
        if live < amount {
            return Ok(ConsumeOutcome::Insufficient {
                current: live,
                required: amount,
            });
        }

        let mut remaining = amount;
        let mut consumed_from = Vec::new();
        for i in order {
            if remaining == 0 {
                break;
            }
            let entry = &mut self.entries[i];
            let taken = entry.take(remaining, now);
            remaining -= taken;
            consumed_from.push(ConsumedPortion {
                entry_id: entry.id,
                source: entry.source,
                amount: taken,
            });
        }
        debug_assert_eq!(remaining, 0);

        let new_balance = balance - amount;
        self.energy_balance = new_balance;
        self.assert_invariants();

        Ok(ConsumeOutcome::Consumed(Consumption {
            consumed: amount,
            consumed_from,
            new_balance,
        }))
    }

    fn breakdown(&self, now: DateTime<Utc>) -> EnergyBreakdown {
        self.live_order(now)
            .into_iter()
            .map(|i| &self.entries[i])
            .fold(EnergyBreakdown::default(), |mut acc, entry| {
                match entry.source {
                    EnergySource::Free => acc.free_energy += entry.amount,
                    EnergySource::Paid => acc.paid_energy += entry.amount,
                }
                acc.total += entry.amount;
                acc.earliest_expiry = Some(match acc.earliest_expiry {
                    Some(earliest) => earliest.min(entry.expires_at),
                    None => entry.expires_at,
                });
                acc.entry_count += 1;
                acc
            })
    }

    fn sweep_expired(&mut self, history: &HistoryLog, now: DateTime<Utc>) -> SweepSummary {
        let mut summary = SweepSummary::default();
        for entry in self.entries.iter_mut().filter(|e| e.is_expired(now)) {
            history.record_expiry(entry, now);
            let expired = entry.expire(now);
            self.energy_balance = self.energy_balance.saturating_sub(expired);
            summary.cleaned_entries += 1;
            summary.total_expired += expired;
        }
        self.assert_invariants();
        summary
    }
}

/// Energy wallet of a single user.
#[derive(Debug)]
pub struct Wallet {
    inner: Mutex<WalletData>,
}

impl Wallet {
    pub fn new(user_id: UserId) -> Self {
        Self {
            inner: Mutex::new(WalletData::new(user_id)),
        }
    }

    pub fn user_id(&self) -> UserId {
        self.inner.lock().user_id
    }

    /// The denormalized balance, including expired entries not yet swept.
    pub fn balance(&self) -> u64 {
        self.inner.lock().energy_balance
    }

    /// Snapshot of every entry, consumed and expired ones included.
    pub fn entries(&self) -> Vec<LedgerEntry> {
        self.inner.lock().entries.clone()
    }

    pub(crate) fn grant(
        &self,
        id: EntryId,
        amount: u64,
        source: EnergySource,
        order_id: Option<OrderId>,
        now: DateTime<Utc>,
    ) -> Result<LedgerEntry, LedgerError> {
        self.inner.lock().grant(id, amount, source, order_id, now)
    }

    pub(crate) fn consume(
        &self,
        amount: u64,
        now: DateTime<Utc>,
    ) -> Result<ConsumeOutcome, LedgerError> {
        self.inner.lock().consume(amount, now)
    }

    pub fn breakdown(&self, now: DateTime<Utc>) -> EnergyBreakdown {
        self.inner.lock().breakdown(now)
    }

    pub(crate) fn sweep_expired(&self, history: &HistoryLog, now: DateTime<Utc>) -> SweepSummary {
        self.inner.lock().sweep_expired(history, now)
    }
}
