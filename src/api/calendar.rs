// Weekly community schedule. The schedule itself is static; only the next
// occurrence of each entry is computed, in UTC from the PST wall time.

use axum::{extract::State, routing::get, Json, Router};
use chrono::{DateTime, Datelike, Duration, Utc, Weekday};
use serde::Serialize;

use crate::error::Result;
use crate::middleware;
use crate::AppState;

pub fn routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/", get(get_calendar))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::require_member,
        ))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ))
}

/// Hours PST is behind UTC.
const PST_OFFSET_HOURS: i64 = 8;

struct ScheduleEntry {
    title: &'static str,
    weekday: Weekday,
    hour_pst: u32,
    minute: u32,
    duration_minutes: i64,
}

const WEEKLY_SCHEDULE: &[ScheduleEntry] = &[
    ScheduleEntry {
        title: "Monday Momentum Call",
        weekday: Weekday::Mon,
        hour_pst: 9,
        minute: 0,
        duration_minutes: 60,
    },
    ScheduleEntry {
        title: "Office Hours",
        weekday: Weekday::Wed,
        hour_pst: 12,
        minute: 0,
        duration_minutes: 90,
    },
    ScheduleEntry {
        title: "Friday Wins Roundup",
        weekday: Weekday::Fri,
        hour_pst: 10,
        minute: 30,
        duration_minutes: 45,
    },
];

/// Next occurrence of a weekly PST wall time, strictly after `now`.
fn next_occurrence(
    now: DateTime<Utc>,
    weekday: Weekday,
    hour_pst: u32,
    minute: u32,
) -> Option<DateTime<Utc>> {
    // Shift onto the PST clock, compute the date there, shift back
    let now_pst = now - Duration::hours(PST_OFFSET_HOURS);
    let today = now_pst.date_naive();

    let days_ahead = (weekday.num_days_from_monday() as i64
        - today.weekday().num_days_from_monday() as i64)
        .rem_euclid(7);
    let candidate_date = today + Duration::days(days_ahead);
    let candidate_naive = candidate_date.and_hms_opt(hour_pst, minute, 0)?;

    let candidate_utc =
        DateTime::<Utc>::from_naive_utc_and_offset(candidate_naive, Utc)
            + Duration::hours(PST_OFFSET_HOURS);

    if candidate_utc > now {
        Some(candidate_utc)
    } else {
        Some(candidate_utc + Duration::days(7))
    }
}

#[derive(Debug, Serialize)]
pub struct CalendarEntryResponse {
    pub title: String,
    pub weekday: String,
    pub time_pst: String,
    pub duration_minutes: i64,
    pub next_occurrence: DateTime<Utc>,
}

async fn get_calendar(State(_state): State<AppState>) -> Result<Json<Vec<CalendarEntryResponse>>> {
    let now = Utc::now();

    let entries = WEEKLY_SCHEDULE
        .iter()
        .filter_map(|entry| {
            let next = next_occurrence(now, entry.weekday, entry.hour_pst, entry.minute)?;
            Some(CalendarEntryResponse {
                title: entry.title.to_string(),
                weekday: format!("{:?}", entry.weekday),
                time_pst: format!("{:02}:{:02}", entry.hour_pst, entry.minute),
                duration_minutes: entry.duration_minutes,
                next_occurrence: next,
            })
        })
        .collect();

    Ok(Json(entries))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn next_occurrence_is_strictly_in_the_future() {
        // Wednesday 2026-08-05 12:00 UTC = 04:00 PST
        let now = Utc.with_ymd_and_hms(2026, 8, 5, 12, 0, 0).unwrap();

        for entry in WEEKLY_SCHEDULE {
            let next = next_occurrence(now, entry.weekday, entry.hour_pst, entry.minute).unwrap();
            assert!(next > now, "{} occurrence not in the future", entry.title);
        }
    }

    #[test]
    fn same_day_later_time_resolves_to_today() {
        // Wednesday 04:00 PST; office hours run Wednesday 12:00 PST
        let now = Utc.with_ymd_and_hms(2026, 8, 5, 12, 0, 0).unwrap();
        let next = next_occurrence(now, Weekday::Wed, 12, 0).unwrap();

        // 12:00 PST = 20:00 UTC the same day
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 8, 5, 20, 0, 0).unwrap());
    }

    #[test]
    fn same_day_earlier_time_rolls_to_next_week() {
        // Wednesday 2026-08-05 22:00 UTC = 14:00 PST, past the 12:00 call
        let now = Utc.with_ymd_and_hms(2026, 8, 5, 22, 0, 0).unwrap();
        let next = next_occurrence(now, Weekday::Wed, 12, 0).unwrap();

        assert_eq!(next, Utc.with_ymd_and_hms(2026, 8, 12, 20, 0, 0).unwrap());
    }

    #[test]
    fn pst_evening_crosses_into_the_next_utc_day() {
        // Monday 17:00 PST = Tuesday 01:00 UTC
        let now = Utc.with_ymd_and_hms(2026, 8, 5, 12, 0, 0).unwrap();
        let next = next_occurrence(now, Weekday::Mon, 17, 0).unwrap();

        assert_eq!(next, Utc.with_ymd_and_hms(2026, 8, 11, 1, 0, 0).unwrap());
    }
}
