//! Contribution recorder.
//!
//! A contribution adds to a cause's running total, joins the supporter to the
//! cause's supporter set and completes the cause once the goal is reached.
//! The write is guarded by the version that was read, so two supporters
//! contributing at the same moment can never overwrite each other.

use serde::Serialize;
use tracing::{info, instrument, warn};

use super::{
    repo,
    repo_types::{Cause, CauseStatus},
};
use crate::{
    db::Db,
    error::{AppError, AppResult},
    store::{versioned::Change, StoreError, Stored},
    timestamp,
    users::{repo_types::Counter, services as users},
    validate,
};

/// What a single contribution changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Applied {
    pub new_supporter: bool,
    pub completed_now: bool,
}

/// Apply a contribution to an in-memory cause. A completed cause stays
/// completed.
pub fn apply_contribution(cause: &mut Cause, supporter_id: &str, amount: f64) -> Applied {
    cause.current_amount += amount;
    let new_supporter = cause.supporters.insert(supporter_id.to_string());
    let completed_now = cause.status != CauseStatus::Completed && cause.current_amount >= cause.goal;
    if completed_now {
        cause.status = CauseStatus::Completed;
    }
    Applied {
        new_supporter,
        completed_now,
    }
}

#[instrument(name = "causes.ledger.record_contribution", skip(db))]
pub async fn record_contribution(
    db: &Db,
    cause_id: &str,
    supporter_id: &str,
    amount: f64,
) -> AppResult<(Stored<Cause>, Applied)> {
    let amount = validate::positive_amount("amount", amount)?;
    if supporter_id.trim().is_empty() {
        return Err(AppError::validation("supporter id is required"));
    }
    users::get_profile(db, supporter_id).await?;

    let (cause, applied) = repo::modify(db, cause_id, |c| {
        let applied = apply_contribution(c, supporter_id, amount);
        c.updated_at = timestamp::now();
        Change::Write(applied)
    })
    .await
    .map_err(|e| match e {
        StoreError::VersionConflict { .. } => {
            warn!(cause_id, "contribution gave up after repeated write conflicts");
            AppError::Conflict(format!(
                "cause {cause_id} is receiving many contributions, please retry"
            ))
        }
        other => other.into(),
    })?;

    if applied.new_supporter {
        users::bump_counter_best_effort(db, supporter_id, Counter::CausesSupported).await;
    }

    info!(
        cause_id,
        supporter_id,
        current_amount = cause.record.current_amount,
        goal = cause.record.goal,
        status = cause.record.status.as_str(),
        completed_now = applied.completed_now,
        "contribution recorded"
    );
    Ok((cause, applied))
}
