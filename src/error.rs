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

//! Error types for ledger operations.

use crate::base::UserId;
use thiserror::Error;

/// Ledger operation errors.
///
/// Running out of energy is not an error: [`consume`](crate::EnergyLedger::consume)
/// reports it as [`ConsumeOutcome::Insufficient`](crate::ConsumeOutcome::Insufficient).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Referenced user has no wallet
    #[error("user {0} not found")]
    UnknownUser(UserId),

    /// User already has a wallet
    #[error("user {0} already registered")]
    DuplicateUser(UserId),

    /// Amount is zero
    #[error("invalid amount (must be positive)")]
    InvalidAmount,
}
