use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;
use thiserror::Error;

use crate::session::Command;
use crate::{Amount, Wallet};

/// Errors that can occur when reading command files
#[derive(Debug, Error)]
pub enum CsvError {
    #[error("failed to open {path}: {source}")]
    Open { path: String, source: csv::Error },

    #[error("line {line}: failed to parse row: {source}")]
    Parse { line: usize, source: csv::Error },

    #[error("line {line}: unrecognized command '{command}'")]
    UnrecognizedCommand { line: usize, command: String },

    #[error("line {line}: {command} missing amount")]
    MissingAmount { line: usize, command: String },

    #[error("line {line}: {command} amount {value} is out of range")]
    InvalidAmount {
        line: usize,
        command: String,
        value: f64,
    },

    #[error("line {line}: {command} missing counterparty")]
    MissingCounterparty { line: usize, command: String },
}

#[derive(Debug, Deserialize)]
struct InputRow {
    command: String,
    wallet: String,
    counterparty: Option<String>,
    amount: Option<f64>,
    key: Option<String>,
}

#[derive(Debug, Serialize)]
struct OutputRow<'a> {
    wallet: &'a str,
    id: String,
    balance: String,
    currency: String,
    transactions: usize,
}

/// Read ledger commands from a csv file with the header
/// `command,wallet,counterparty,amount,key`.
pub fn read_commands(
    path: impl AsRef<Path>,
) -> Result<impl Iterator<Item = Result<Command, CsvError>>, CsvError> {
    let path = path.as_ref();
    let reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)
        .map_err(|source| CsvError::Open {
            path: path.display().to_string(),
            source,
        })?;

    Ok(reader
        .into_deserialize::<InputRow>()
        .enumerate()
        .map(|(idx, result)| {
            let line = idx + 2; // 1-indexed, skip header
            let row = result.map_err(|source| CsvError::Parse { line, source })?;
            parse_row(line, row)
        }))
}

fn parse_row(line: usize, row: InputRow) -> Result<Command, CsvError> {
    let amount = |command: &str| -> Result<Amount, CsvError> {
        let value = row.amount.ok_or_else(|| CsvError::MissingAmount {
            line,
            command: command.to_string(),
        })?;
        Amount::try_from_float(value).ok_or_else(|| CsvError::InvalidAmount {
            line,
            command: command.to_string(),
            value,
        })
    };

    match row.command.as_str() {
        "create" => Ok(Command::Create { label: row.wallet }),
        "fund" => Ok(Command::Fund {
            amount: amount("fund")?,
            label: row.wallet,
            key: row.key,
        }),
        "transfer" => {
            let amount = amount("transfer")?;
            let to = row.counterparty.ok_or_else(|| CsvError::MissingCounterparty {
                line,
                command: "transfer".to_string(),
            })?;
            Ok(Command::Transfer {
                from: row.wallet,
                to,
                amount,
            })
        }
        other => Err(CsvError::UnrecognizedCommand {
            line,
            command: other.to_string(),
        }),
    }
}

/// Write one summary row per labelled wallet in csv format
pub fn write_summary<'a>(
    wallets: impl IntoIterator<Item = (&'a str, &'a Wallet)>,
    writer: impl io::Write,
) -> Result<(), csv::Error> {
    let mut writer = csv::Writer::from_writer(writer);

    for (label, wallet) in wallets {
        let row = OutputRow {
            wallet: label,
            id: wallet.id.to_string(),
            balance: wallet.balance.to_string(),
            currency: wallet.currency.to_string(),
            transactions: wallet.transactions.len(),
        };
        writer.serialize(&row)?;
    }

    writer.flush()?;
    Ok(())
}
