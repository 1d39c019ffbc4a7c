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

//! Energy ledger.
//!
//! The [`EnergyLedger`] is the only component allowed to change a user's
//! energy balance. It grants energy, consumes it in priority order, reports
//! per-source breakdowns and sweeps expired grants.
//!
//! # Consumption order
//!
//! Spendable entries are drained by source first (`free` before `paid`) and
//! by age within a source (oldest grant first). Free energy expires sooner,
//! so it is always used up before any paid energy is touched.
//!
//! # Thread Safety
//!
//! Wallets live in a [`DashMap`] keyed by user, and each wallet serializes its
//! own operations behind a mutex. Operations on different users run in
//! parallel; operations on one user are atomic with respect to each other.

use crate::base::{EntryId, OrderId, UserId};
use crate::clock::{Clock, SystemClock};
use crate::entry::{EnergySource, LedgerEntry};
use crate::history::HistoryLog;
use crate::outcome::{ConsumeOutcome, EnergyBreakdown, SweepSummary};
use crate::wallet::Wallet;
use crate::LedgerError;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

/// Per-user ledger of expiring energy grants.
///
/// # Invariants
///
/// - A user's balance equals the sum of the remaining amounts of all of
///   that user's entries (expired entries count until they are swept).
/// - An entry's remaining amount never increases and never exceeds its
///   initial amount.
/// - A consumption either deducts the full requested amount or nothing.
pub struct EnergyLedger {
    /// Wallets indexed by user ID.
    wallets: DashMap<UserId, Wallet>,
    /// Expiry events, appended by the sweep.
    history: HistoryLog,
    clock: Arc<dyn Clock>,
    next_entry_id: AtomicU64,
}

impl EnergyLedger {
    /// Creates an empty ledger on wall-clock time.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates an empty ledger reading time from `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        EnergyLedger {
            wallets: DashMap::new(),
            history: HistoryLog::new(),
            clock,
            next_entry_id: AtomicU64::new(1),
        }
    }

    /// Opens an empty wallet for `user_id`.
    ///
    /// # Errors
    ///
    /// [`LedgerError::DuplicateUser`] if the user already has a wallet.
    pub fn register_user(&self, user_id: UserId) -> Result<(), LedgerError> {
        match self.wallets.entry(user_id) {
            Entry::Occupied(_) => Err(LedgerError::DuplicateUser(user_id)),
            Entry::Vacant(slot) => {
                slot.insert(Wallet::new(user_id));
                debug!(user = %user_id, "wallet registered");
                Ok(())
            }
        }
    }

    /// Grants `amount` energy to a user as a new ledger entry.
    ///
    /// The entry expires 30 days (free) or 180 days (paid) from now. Grants
    /// never merge: every call creates a distinct entry. `order_id` is
    /// stored as given; the ledger does not check it against `source`.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::UnknownUser`] - No wallet for the user. Nothing is written.
    /// - [`LedgerError::InvalidAmount`] - `amount` is zero, above
    ///   [`LedgerEntry::MAX_AMOUNT`], or would overflow the balance.
    pub fn grant(
        &self,
        user_id: UserId,
        amount: u64,
        source: EnergySource,
        order_id: Option<OrderId>,
    ) -> Result<LedgerEntry, LedgerError> {
        let wallet = self
            .wallets
            .get(&user_id)
            .ok_or(LedgerError::UnknownUser(user_id))?;
        let id = EntryId(self.next_entry_id.fetch_add(1, Ordering::Relaxed));
        let entry = wallet.grant(id, amount, source, order_id, self.clock.now())?;
        debug!(
            user = %user_id,
            entry = %entry.id,
            amount,
            %source,
            expires_at = %entry.expires_at,
            "energy granted"
        );
        Ok(entry)
    }

    /// Deducts `amount` energy from a user, free before paid, oldest first.
    ///
    /// Returns [`ConsumeOutcome::Insufficient`] without touching anything when
    /// the user is unknown, the balance is below `amount`, or the spendable
    /// (unexpired) entries cannot cover `amount`.
    ///
    /// # Errors
    ///
    /// [`LedgerError::InvalidAmount`] if `amount` is zero.
    pub fn consume(&self, user_id: UserId, amount: u64) -> Result<ConsumeOutcome, LedgerError> {
        if amount == 0 {
            return Err(LedgerError::InvalidAmount);
        }
        let Some(wallet) = self.wallets.get(&user_id) else {
            return Ok(ConsumeOutcome::Insufficient {
                current: 0,
                required: amount,
            });
        };

        let outcome = wallet.consume(amount, self.clock.now())?;
        match &outcome {
            ConsumeOutcome::Consumed(consumption) => debug!(
                user = %user_id,
                amount,
                entries = consumption.consumed_from.len(),
                new_balance = consumption.new_balance,
                "energy consumed"
            ),
            ConsumeOutcome::Insufficient { current, required } => debug!(
                user = %user_id,
                current,
                required,
                "consumption rejected"
            ),
        }
        Ok(outcome)
    }

    /// Spendable energy of a user split by source.
    ///
    /// Read-only. Expired entries are left out even before the sweep has run,
    /// so `total` can be below [`balance`](Self::balance). Unknown users get
    /// an empty breakdown.
    pub fn breakdown(&self, user_id: UserId) -> EnergyBreakdown {
        self.wallets
            .get(&user_id)
            .map(|wallet| wallet.breakdown(self.clock.now()))
            .unwrap_or_default()
    }

    /// Zeroes every expired entry of every user.
    ///
    /// Each expired entry gets one history record, and its remainder is
    /// taken off the owner's balance. Each user's entries are swept
    /// atomically. Running the sweep again right away finds nothing.
    pub fn cleanup_expired(&self) -> SweepSummary {
        let now = self.clock.now();
        let mut summary = SweepSummary::default();
        for wallet in self.wallets.iter() {
            let swept = wallet.sweep_expired(&self.history, now);
            if swept.cleaned_entries > 0 {
                debug!(
                    user = %wallet.key(),
                    entries = swept.cleaned_entries,
                    expired = swept.total_expired,
                    "expired energy swept"
                );
            }
            summary += swept;
        }
        info!(
            cleaned_entries = summary.cleaned_entries,
            total_expired = summary.total_expired,
            "expiry sweep finished"
        );
        summary
    }

    /// The cached balance of a user.
    ///
    /// # Errors
    ///
    /// [`LedgerError::UnknownUser`] if the user has no wallet.
    pub fn balance(&self, user_id: UserId) -> Result<u64, LedgerError> {
        self.wallets
            .get(&user_id)
            .map(|wallet| wallet.balance())
            .ok_or(LedgerError::UnknownUser(user_id))
    }

    /// Every entry of a user in grant order, consumed and expired ones included.
    ///
    /// # Errors
    ///
    /// [`LedgerError::UnknownUser`] if the user has no wallet.
    pub fn entries(&self, user_id: UserId) -> Result<Vec<LedgerEntry>, LedgerError> {
        self.wallets
            .get(&user_id)
            .map(|wallet| wallet.entries())
            .ok_or(LedgerError::UnknownUser(user_id))
    }

    /// Registered users, in no particular order.
    pub fn users(&self) -> Vec<UserId> {
        self.wallets.iter().map(|wallet| *wallet.key()).collect()
    }

    /// The history log the sweep writes to.
    pub fn history(&self) -> &HistoryLog {
        &self.history
    }

    /// Current instant according to the ledger's clock.
    pub fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.clock.now()
    }
}

impl Default for EnergyLedger {
    fn default() -> Self {
        Self::new()
    }
}
