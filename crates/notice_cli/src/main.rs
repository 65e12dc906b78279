//! CLI smoke entry point.
//!
//! # Responsibility
//! - Load `NOTICE_*` configuration, start logging and open the store.
//! - Print deterministic `key=value` status lines for quick sanity checks.

use notice_core::db::migrations::current_user_version;
use notice_core::{NoticeConfig, OffsetQuery, ReleaseRepository, SqliteReleaseRepository};
use std::process::ExitCode;

fn main() -> ExitCode {
    println!("notice_core ping={}", notice_core::ping());
    println!("notice_core version={}", notice_core::core_version());

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("notice_cli error={message}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), String> {
    let config = NoticeConfig::from_env().map_err(|err| err.to_string())?;
    let logging = config.init_logging()?;
    println!("logging enabled={logging} level={}", config.log_level);

    let mut conn = config.open_db().map_err(|err| err.to_string())?;
    let version = current_user_version(&conn).map_err(|err| err.to_string())?;
    println!("db path={} schema_version={version}", config.db_path.display());

    let repo = SqliteReleaseRepository::try_new(&mut conn).map_err(|err| err.to_string())?;
    let recent = repo
        .list_offsets(&OffsetQuery::default())
        .map_err(|err| err.to_string())?;
    println!("offsets first_page={}", recent.len());
    log::info!(
        "event=cli_probe module=cli status=ok schema_version={} offsets={}",
        version,
        recent.len()
    );
    Ok(())
}
