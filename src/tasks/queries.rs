//! The read patterns over tasks: per owner, due today, and due now.

use std::sync::Arc;

use chrono::{DateTime, NaiveTime, Utc};

use super::model::Task;
use crate::error::Result;
use crate::store::Database;
use crate::timezone;

/// Most tasks returned for the "today" view.
pub const TODAY_LIMIT: usize = 10;

/// Query helpers over the task store.
#[derive(Clone)]
pub struct TaskQueries {
    db: Arc<dyn Database>,
}

impl TaskQueries {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    /// All tasks of `owner`, unfinished only unless `include_finished`.
    pub async fn tasks_by_owner(&self, owner: &str, include_finished: bool) -> Result<Vec<Task>> {
        Ok(self.db.list_tasks_by_owner(owner, include_finished).await?)
    }

    /// Unfinished tasks of `owner` falling on the local calendar day of `now`
    /// in `zone`, between 00:00:01 and 23:59:59 local time. At most [`TODAY_LIMIT`].
    pub async fn tasks_due_today(
        &self,
        owner: &str,
        zone: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<Task>> {
        let (start, end) = local_day_bounds(now, zone)?;
        Ok(self
            .db
            .list_tasks_in_range(owner, start, end, TODAY_LIMIT)
            .await?)
    }

    /// Unfinished tasks of every owner with `due_on <= now`.
    pub async fn tasks_due(&self, now: DateTime<Utc>) -> Result<Vec<Task>> {
        Ok(self.db.list_due_tasks(now).await?)
    }
}

/// UTC instants of 00:00:01 and 23:59:59 on the local day containing `now`.
pub fn local_day_bounds(now: DateTime<Utc>, zone: &str) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
    let day = timezone::to_local(now, zone)?.date();
    let first = NaiveTime::from_hms_opt(0, 0, 1).unwrap_or(NaiveTime::MIN);
    let last = NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN);

    // Zones whose DST jump happens at midnight skip the first local hour.
    let start = timezone::to_utc(day.and_time(first), zone)
        .or_else(|_| timezone::to_utc(day.and_time(first) + chrono::Duration::hours(1), zone))?;
    let end = timezone::to_utc(day.and_time(last), zone)?;
    Ok((start, end))
}
