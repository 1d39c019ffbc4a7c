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

//! # Energy Ledger
//!
//! This library tracks per-user "energy": a virtual currency granted in
//! expiring lots, either free (30 days) or paid (180 days), and spent free
//! first, oldest first.
//!
//! ## Core Components
//!
//! - [`EnergyLedger`]: Owns every balance mutation (grant, consume, expiry sweep)
//! - [`Wallet`]: One user's balance and ledger entries behind a single lock
//! - [`LedgerEntry`]: One grant, drained in place and never deleted
//! - [`HistoryLog`]: Append-only record of expiry events
//! - [`LedgerError`]: Error types for ledger operations
//!
//! ## Example
//!
//! ```
//! use energy_ledger::{EnergyLedger, EnergySource, UserId};
//!
//! let ledger = EnergyLedger::new();
//! ledger.register_user(UserId(1)).unwrap();
//!
//! ledger.grant(UserId(1), 10, EnergySource::Free, None).unwrap();
//! ledger.grant(UserId(1), 15, EnergySource::Paid, Some("order-1".into())).unwrap();
//!
//! let outcome = ledger.consume(UserId(1), 12).unwrap();
//! assert!(outcome.is_success());
//!
//! let breakdown = ledger.breakdown(UserId(1));
//! assert_eq!(breakdown.free_energy, 0);
//! assert_eq!(breakdown.paid_energy, 13);
//! ```
//!
//! ## Thread Safety
//!
//! Every operation on a user runs under that user's wallet lock, so
//! concurrent callers cannot double-spend the same entries.

mod base;
mod clock;
mod entry;
pub mod error;
mod history;
mod ledger;
mod outcome;
pub mod wallet;

pub use base::{EntryId, HistoryId, OrderId, UserId};
pub use clock::{Clock, ManualClock, SystemClock};
pub use entry::{ConsumedPortion, EnergySource, LedgerEntry};
pub use error::LedgerError;
pub use history::{ExpiryMetadata, HistoryKind, HistoryLog, HistoryRecord};
pub use ledger::EnergyLedger;
pub use outcome::{
    ConsumeOutcome, Consumption, EnergyBreakdown, INSUFFICIENT_ENERGY, SweepSummary,
};
pub use wallet::Wallet;
