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

use chrono::{DateTime, Utc};
use clap::Parser;
use csv::{ReaderBuilder, Trim, Writer};
use energy_ledger::{
    EnergyLedger, EnergySource, HistoryRecord, LedgerError, ManualClock, OrderId, UserId,
};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

/// Energy Ledger - Replay ledger command CSV files
///
/// Reads ledger commands from a CSV file and outputs per-user balances to stdout.
/// Supports user registration, grants, consumption, and expiry sweeps.
#[derive(Parser, Debug)]
#[command(name = "energy-ledger")]
#[command(about = "Replays energy ledger commands and reports balances", long_about = None)]
struct Args {
    /// Path to CSV file with ledger commands
    ///
    /// Expected format: op,user,amount,source,order,at
    /// Example: cargo run -- commands.csv > balances.csv
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// Write history records drained after the replay to this CSV file
    #[arg(long, env = "ENERGY_LEDGER_HISTORY", value_name = "FILE")]
    history: Option<PathBuf>,

    /// Log filter (trace, debug, info, warn, error, or an EnvFilter directive)
    #[arg(long, env = "ENERGY_LEDGER_LOG", default_value = "warn")]
    log_level: String,
}

fn main() {
    let args = Args::parse();
    init_logging(&args.log_level);

    let file = match File::open(&args.input) {
        Ok(f) => f,
        Err(e) => {
            error!(path = %args.input.display(), "error opening file: {e}");
            process::exit(1);
        }
    };

    let ledger = match replay_commands(BufReader::new(file)) {
        Ok(ledger) => ledger,
        Err(e) => {
            error!("error replaying commands: {e}");
            process::exit(1);
        }
    };

    if let Err(e) = write_balances(&ledger, std::io::stdout()) {
        error!("error writing output: {e}");
        process::exit(1);
    }

    if let Some(path) = &args.history {
        let result = File::create(path)
            .map_err(csv::Error::from)
            .and_then(|file| write_history(&ledger.history().drain(), file));
        if let Err(e) = result {
            error!(path = %path.display(), "error writing history: {e}");
            process::exit(1);
        }
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Raw CSV record matching the input format.
///
/// Fields: `op, user, amount, source, order, at`
#[derive(Debug, Deserialize)]
struct CsvRecord {
    op: String,
    #[serde(deserialize_with = "csv::invalid_option")]
    user: Option<u64>,
    #[serde(deserialize_with = "csv::invalid_option")]
    amount: Option<u64>,
    #[serde(deserialize_with = "csv::invalid_option")]
    source: Option<EnergySource>,
    order: Option<String>,
    #[serde(deserialize_with = "csv::invalid_option")]
    at: Option<DateTime<Utc>>,
}

/// A parsed ledger command.
#[derive(Debug, Clone, PartialEq)]
enum Command {
    Register {
        user_id: UserId,
    },
    Grant {
        user_id: UserId,
        amount: u64,
        source: EnergySource,
        order_id: Option<OrderId>,
    },
    Consume {
        user_id: UserId,
        amount: u64,
    },
    Sweep,
}

impl CsvRecord {
    /// Converts a CSV record to a command and the instant it runs at.
    ///
    /// Returns `None` for unknown operations or missing required fields.
    fn into_command(self) -> Option<(Command, Option<DateTime<Utc>>)> {
        let command = match self.op.to_lowercase().as_str() {
            "register" => Command::Register {
                user_id: UserId(self.user?),
            },
            "grant" => Command::Grant {
                user_id: UserId(self.user?),
                amount: self.amount?,
                source: self.source?,
                order_id: self.order.filter(|o| !o.is_empty()).map(OrderId),
            },
            "consume" => Command::Consume {
                user_id: UserId(self.user?),
                amount: self.amount?,
            },
            "sweep" => Command::Sweep,
            _ => return None,
        };
        Some((command, self.at))
    }
}

fn apply(ledger: &EnergyLedger, command: Command) -> Result<(), LedgerError> {
    match command {
        Command::Register { user_id } => ledger.register_user(user_id),
        Command::Grant {
            user_id,
            amount,
            source,
            order_id,
        } => ledger.grant(user_id, amount, source, order_id).map(|_| ()),
        Command::Consume { user_id, amount } => {
            let outcome = ledger.consume(user_id, amount)?;
            if !outcome.is_success() {
                warn!(user = %user_id, amount, "not enough energy");
            }
            Ok(())
        }
        Command::Sweep => {
            ledger.cleanup_expired();
            Ok(())
        }
    }
}

/// Replays ledger commands from a CSV reader.
///
/// The ledger runs on a manual clock that each row's `at` column moves to
/// before the command is applied; rows without `at` run at the previous
/// row's instant. Malformed rows and failed commands are skipped.
///
/// # CSV Format
///
/// Expected columns: `op, user, amount, source, order, at`
/// - `op`: register, grant, consume or sweep
/// - `user`: User ID (u64), unused by sweep
/// - `amount`: Energy amount (u64) for grant and consume
/// - `source`: free or paid, for grant
/// - `order`: Optional order reference for paid grants
/// - `at`: Optional RFC 3339 timestamp
///
/// # Example
///
/// ```csv
/// op,user,amount,source,order,at
/// register,1,,,,2025-01-01T00:00:00Z
/// grant,1,100,free,,2025-01-01T00:00:00Z
/// consume,1,30,,,2025-01-02T00:00:00Z
/// sweep,,,,,2025-03-01T00:00:00Z
/// ```
///
/// # Errors
///
/// Returns a CSV error if the reader fails or the CSV structure is invalid.
pub fn replay_commands<R: Read>(reader: R) -> Result<EnergyLedger, csv::Error> {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let ledger = EnergyLedger::with_clock(clock.clone());

    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .has_headers(true)
        .from_reader(reader);

    for result in rdr.deserialize::<CsvRecord>() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                warn!("skipping malformed row: {e}");
                continue;
            }
        };

        let Some((command, at)) = record.into_command() else {
            warn!("skipping invalid command record");
            continue;
        };

        if let Some(at) = at {
            clock.set(at);
        }

        if let Err(e) = apply(&ledger, command.clone()) {
            warn!(?command, "skipping command: {e}");
        }
    }

    Ok(ledger)
}

/// Output row for one user.
#[derive(Debug, Serialize)]
struct BalanceRow {
    user: UserId,
    balance: u64,
    free: u64,
    paid: u64,
    total: u64,
    earliest_expiry: Option<DateTime<Utc>>,
    entries: usize,
}

/// Writes per-user balances to a CSV writer, ordered by user ID.
///
/// `balance` is the cached balance; `free`, `paid` and `total` only count
/// unexpired energy at the ledger's current instant.
///
/// # CSV Format
///
/// Columns: `user, balance, free, paid, total, earliest_expiry, entries`
///
/// # Errors
///
/// Returns a CSV error if writing fails.
pub fn write_balances<W: Write>(ledger: &EnergyLedger, writer: W) -> Result<(), csv::Error> {
    let mut wtr = Writer::from_writer(writer);

    let mut users = ledger.users();
    users.sort();
    for user_id in users {
        let Ok(balance) = ledger.balance(user_id) else {
            continue;
        };
        let breakdown = ledger.breakdown(user_id);
        wtr.serialize(BalanceRow {
            user: user_id,
            balance,
            free: breakdown.free_energy,
            paid: breakdown.paid_energy,
            total: breakdown.total,
            earliest_expiry: breakdown.earliest_expiry,
            entries: breakdown.entry_count,
        })?;
    }

    wtr.flush()?;
    Ok(())
}

/// Output row for one history record. Metadata is kept as a JSON string.
#[derive(Debug, Serialize)]
struct HistoryRow<'a> {
    id: u64,
    user: UserId,
    amount: i64,
    #[serde(rename = "type")]
    kind: String,
    description: &'a str,
    metadata: String,
    created_at: DateTime<Utc>,
}

/// Writes history records to a CSV writer.
///
/// # Errors
///
/// Returns a CSV error if writing fails.
pub fn write_history<W: Write>(records: &[HistoryRecord], writer: W) -> Result<(), csv::Error> {
    let mut wtr = Writer::from_writer(writer);
    for record in records {
        wtr.serialize(HistoryRow {
            id: record.id.0,
            user: record.user_id,
            amount: record.amount,
            kind: record.kind.to_string(),
            description: &record.description,
            metadata: record.metadata.to_string(),
            created_at: record.created_at,
        })?;
    }
    wtr.flush()?;
    Ok(())
}
