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

//! Results returned by ledger operations.
//!
//! The serialized shapes are the ones API callers branch on, e.g. a consume
//! result always carries a boolean `success` field.

use crate::entry::ConsumedPortion;
use chrono::{DateTime, Utc};
use serde::ser::{Serialize, SerializeStruct, Serializer};
use std::ops::AddAssign;

/// Message carried by a rejected consumption.
pub const INSUFFICIENT_ENERGY: &str = "Insufficient energy";

/// A successful consumption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Consumption {
    /// Amount requested and deducted.
    pub consumed: u64,
    /// Entries drawn from, in the order they were drained.
    pub consumed_from: Vec<ConsumedPortion>,
    /// Balance after the deduction.
    pub new_balance: u64,
}

/// Outcome of [`EnergyLedger::consume`](crate::EnergyLedger::consume).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumeOutcome {
    Consumed(Consumption),
    /// Nothing was deducted. `current` is what the user could have spent.
    Insufficient { current: u64, required: u64 },
}

impl ConsumeOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Consumed(_))
    }

    pub fn consumption(&self) -> Option<&Consumption> {
        match self {
            Self::Consumed(consumption) => Some(consumption),
            Self::Insufficient { .. } => None,
        }
    }
}

impl Serialize for ConsumeOutcome {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Self::Consumed(consumption) => {
                let mut state = serializer.serialize_struct("ConsumeOutcome", 4)?;
                state.serialize_field("success", &true)?;
                state.serialize_field("consumed", &consumption.consumed)?;
                state.serialize_field("consumedFrom", &consumption.consumed_from)?;
                state.serialize_field("newBalance", &consumption.new_balance)?;
                state.end()
            }
            Self::Insufficient { current, required } => {
                let mut state = serializer.serialize_struct("ConsumeOutcome", 4)?;
                state.serialize_field("success", &false)?;
                state.serialize_field("error", INSUFFICIENT_ENERGY)?;
                state.serialize_field("current", current)?;
                state.serialize_field("required", required)?;
                state.end()
            }
        }
    }
}

/// Spendable energy of one user, split by source.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnergyBreakdown {
    pub total: u64,
    pub free_energy: u64,
    pub paid_energy: u64,
    pub earliest_expiry: Option<DateTime<Utc>>,
    pub entry_count: usize,
}

/// Totals of one expiry sweep.
///
/// Summing saturates: a `total_expired` of `u64::MAX` means at least that
/// much expired. The per-entry amounts are still exact in the history log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepSummary {
    pub cleaned_entries: usize,
    pub total_expired: u64,
}

impl AddAssign for SweepSummary {
    fn add_assign(&mut self, other: Self) {
        self.cleaned_entries = self.cleaned_entries.saturating_add(other.cleaned_entries);
        self.total_expired = self.total_expired.saturating_add(other.total_expired);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EnergySource, EntryId};

    #[test]
    fn consumed_serializes_success_shape() {
        let outcome = ConsumeOutcome::Consumed(Consumption {
            consumed: 5,
            consumed_from: vec![ConsumedPortion {
                entry_id: EntryId(2),
                source: EnergySource::Free,
                amount: 5,
            }],
            new_balance: 20,
        });

        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["consumed"], 5);
        assert_eq!(json["newBalance"], 20);
        assert_eq!(json["consumedFrom"][0]["entryId"], 2);
        assert_eq!(json["consumedFrom"][0]["source"], "free");
        assert_eq!(json["consumedFrom"][0]["amount"], 5);
        assert!(outcome.is_success());
    }

    #[test]
    fn insufficient_serializes_failure_shape() {
        let outcome = ConsumeOutcome::Insufficient {
            current: 3,
            required: 10,
        };

        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "Insufficient energy");
        assert_eq!(json["current"], 3);
        assert_eq!(json["required"], 10);
        assert!(outcome.consumption().is_none());
    }

    #[test]
    fn empty_breakdown_has_null_expiry() {
        let json = serde_json::to_value(EnergyBreakdown::default()).unwrap();
        assert_eq!(json["total"], 0);
        assert_eq!(json["freeEnergy"], 0);
        assert_eq!(json["paidEnergy"], 0);
        assert!(json["earliestExpiry"].is_null());
        assert_eq!(json["entryCount"], 0);
    }

    #[test]
    fn sweep_summaries_accumulate() {
        let mut total = SweepSummary::default();
        total += SweepSummary {
            cleaned_entries: 2,
            total_expired: 30,
        };
        total += SweepSummary {
            cleaned_entries: 1,
            total_expired: 5,
        };
        assert_eq!(
            total,
            SweepSummary {
                cleaned_entries: 3,
                total_expired: 35
            }
        );
    }

    #[test]
    fn sweep_summary_total_saturates() {
        let mut total = SweepSummary {
            cleaned_entries: 1,
            total_expired: u64::MAX,
        };
        total += SweepSummary {
            cleaned_entries: 1,
            total_expired: 1,
        };
        assert_eq!(total.cleaned_entries, 2);
        assert_eq!(total.total_expired, u64::MAX);
    }
}
