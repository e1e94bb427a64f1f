// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::io::{self, BufRead, Write};
use std::process::ExitCode;

use passwerk::config::VaultConfig;
use passwerk::crypto::{encrypt_hex, MasterCredentials};
use passwerk::state::VaultState;
use passwerk::state_machine::TransactionStateMachine;
use passwerk::transaction::Transaction;
use passwerk::{init_logging, VaultResult};

const USAGE: &str = "usage: passwerk <start|clear-db|example>

  start     apply newline-delimited transactions read from stdin
  clear-db  delete the vault data directory
  example   print example transactions";

fn main() -> ExitCode {
    let config = VaultConfig::from_env();
    init_logging(config.log_format);

    let command = std::env::args().nth(1);
    let result = match command.as_deref() {
        Some("start") => start(&config),
        Some("clear-db") => clear_db(&config),
        Some("example") => example(),
        _ => {
            eprintln!("{USAGE}");
            return ExitCode::FAILURE;
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(code = e.error_code(), error = %e, "Command failed");
            ExitCode::FAILURE
        }
    }
}

/// Act as a local transport: every stdin line is one transaction, run
/// through check, deliver and commit. One JSON result per line on stdout.
fn start(config: &VaultConfig) -> VaultResult<()> {
    let state = VaultState::open(&config.paths)?;
    let machine = TransactionStateMachine::new(state);
    tracing::info!(info = %machine.info(), "Accepting transactions on stdin");

    let stdin = io::stdin();
    let mut stdout = io::stdout().lock();
    for line in stdin.lock().lines() {
        let line = line?;
        let raw = line.trim();
        if raw.is_empty() {
            continue;
        }

        let mut result = machine.check_tx(raw.as_bytes());
        if result.is_ok() {
            result = machine.deliver_tx(raw.as_bytes());
        }
        let root = machine.commit()?;

        let reply = serde_json::json!({
            "code": result.code.as_u32(),
            "log": result.log,
            "root": hex::encode(root),
        });
        writeln!(stdout, "{reply}")?;
    }

    tracing::info!(info = %machine.info(), "Input closed");
    Ok(())
}

fn clear_db(config: &VaultConfig) -> VaultResult<()> {
    let root = config.paths.root();
    match std::fs::remove_dir_all(root) {
        Ok(()) => tracing::info!(path = %root.display(), "Vault data removed"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tracing::info!(path = %root.display(), "No vault data to remove");
        }
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

/// Print a write and a matching delete for `masterUsr/masterPwd`.
fn example() -> VaultResult<()> {
    let creds = MasterCredentials::new("masterUsr", "masterPwd");
    let name = "savedName1";
    let account = creds.account_key();
    let item_hash = MasterCredentials::item_name_hash(name);
    let enc_name = encrypt_hex(&creds.index_context(), name)?;
    let enc_value = encrypt_hex(&creds.item_context(name), "savedPass1")?;

    let write = Transaction::writing(&account, &item_hash, &enc_name, enc_value);
    let delete = Transaction::deleting(account, item_hash, enc_name);
    println!("{}", write.to_wire());
    println!("{}", delete.to_wire());
    Ok(())
}
