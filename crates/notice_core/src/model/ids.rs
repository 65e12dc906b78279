//! Identifier and clock helpers for new releases.
//!
//! - Operation ids follow `{cp_id}-{STAGE}-{epoch_ms}`.
//! - Release ids follow `{oc_id}-{uuid}` so two releases produced in the same
//!   millisecond never share an id.

use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

const SEPARATOR: &str = "-";

/// Current wall-clock time in Unix epoch milliseconds.
///
/// Clamps to `0` if the system clock is before the epoch.
pub fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

/// Timestamp for a row that must sort after `previous`.
///
/// Returns `None` when `previous` is already `i64::MAX`.
pub fn next_epoch_ms(previous: Option<i64>) -> Option<i64> {
    let now = now_epoch_ms();
    match previous {
        Some(previous) => previous.checked_add(1).map(|next| now.max(next)),
        None => Some(now),
    }
}

/// Builds a new operation id for `stage` within process `cp_id`.
pub fn new_ocid(cp_id: &str, stage: &str) -> String {
    format!(
        "{cp_id}{SEPARATOR}{}{SEPARATOR}{}",
        stage.trim().to_uppercase(),
        now_epoch_ms()
    )
}

/// Builds a new globally unique release id scoped under `oc_id`.
pub fn new_release_id(oc_id: &str) -> String {
    format!("{oc_id}{SEPARATOR}{}", Uuid::new_v4())
}
