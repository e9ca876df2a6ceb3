//! Views over a [`Forecast`] for compact display.

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Timelike, Utc};

use crate::model::{Forecast, ForecastEntry};

/// Local hour the daily outlook is centred on.
pub const OUTLOOK_HOUR: u32 = 12;
/// Entries farther than this from [`OUTLOOK_HOUR`] don't represent their day.
const OUTLOOK_TOLERANCE_MINUTES: u32 = 90;

pub const WINDOW_BEFORE: usize = 3;
pub const WINDOW_LEN: usize = 8;

fn fixed_offset(offset_secs: i64) -> FixedOffset {
    i32::try_from(offset_secs)
        .ok()
        .and_then(FixedOffset::east_opt)
        .unwrap_or_else(|| Utc.fix())
}

/// `ts` (unix seconds) shifted into a location's UTC offset.
pub fn local_time(ts: i64, offset_secs: i64) -> Option<DateTime<FixedOffset>> {
    DateTime::from_timestamp(ts, 0).map(|utc| utc.with_timezone(&fixed_offset(offset_secs)))
}

/// `dd/mm/yy HH:MM` in the location's local time.
pub fn format_local_time(ts: i64, offset_secs: i64) -> Option<String> {
    local_time(ts, offset_secs).map(|t| t.format("%d/%m/%y %H:%M").to_string())
}

/// `UTC +3.0`, `UTC -9.5`.
pub fn format_utc_offset(offset_secs: i64) -> String {
    format!("UTC {:+.1}", offset_secs as f64 / 3600.0)
}

/// One entry per day after `today`: the one nearest local noon.
///
/// Days without an entry within 90 minutes of noon (the partial first and
/// last days of the window) are skipped.
pub fn daily_outlook(forecast: &Forecast, today: NaiveDate) -> Vec<&ForecastEntry> {
    let noon = OUTLOOK_HOUR * 60;
    let mut best: BTreeMap<NaiveDate, (u32, &ForecastEntry)> = BTreeMap::new();

    for entry in &forecast.list {
        let Some(local) = local_time(entry.dt, forecast.city.timezone) else {
            continue;
        };
        let date = local.date_naive();
        if date <= today {
            continue;
        }

        let distance = (local.hour() * 60 + local.minute()).abs_diff(noon);
        if distance > OUTLOOK_TOLERANCE_MINUTES {
            continue;
        }

        best.entry(date)
            .and_modify(|current| {
                if distance < current.0 {
                    *current = (distance, entry);
                }
            })
            .or_insert((distance, entry));
    }

    best.into_values().map(|(_, entry)| entry).collect()
}

/// Up to eight consecutive entries starting three steps before `index`.
pub fn entries_around(forecast: &Forecast, index: usize) -> &[ForecastEntry] {
    let start = index.saturating_sub(WINDOW_BEFORE);
    let end = (start + WINDOW_LEN).min(forecast.list.len());
    forecast.list.get(start..end).unwrap_or(&[])
}

/// Entries at or after `now`, in order.
pub fn upcoming(forecast: &Forecast, now: DateTime<Utc>) -> impl Iterator<Item = &ForecastEntry> {
    let now = now.timestamp();
    forecast.list.iter().filter(move |entry| entry.dt >= now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{decode, fixtures};

    fn forecast(steps: i64, timezone: i64) -> Forecast {
        decode(fixtures::forecast(steps, timezone)).expect("fixture decodes")
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 10, 19).unwrap()
    }

    fn local_hours(entries: &[&ForecastEntry], offset: i64) -> Vec<String> {
        entries
            .iter()
            .filter_map(|e| local_time(e.dt, offset))
            .map(|t| t.format("%d %H:%M").to_string())
            .collect()
    }

    #[test]
    fn outlook_picks_local_noon_of_following_days() {
        let forecast = forecast(40, 10800);
        let outlook = daily_outlook(&forecast, today());

        assert_eq!(
            local_hours(&outlook, 10800),
            ["20 12:00", "21 12:00", "22 12:00", "23 12:00"]
        );
    }

    #[test]
    fn outlook_in_utc() {
        let forecast = forecast(40, 0);
        let outlook = daily_outlook(&forecast, today());

        assert_eq!(outlook.len(), 4);
        assert!(outlook.iter().all(|e| e.dt_txt.ends_with("12:00:00")));
    }

    #[test]
    fn outlook_tolerates_half_hour_offsets() {
        let forecast = forecast(40, 19800);
        let outlook = daily_outlook(&forecast, today());

        assert_eq!(
            local_hours(&outlook, 19800),
            ["20 11:30", "21 11:30", "22 11:30", "23 11:30"]
        );
    }

    #[test]
    fn outlook_is_empty_for_today_only_forecast() {
        let forecast = forecast(4, 0);
        assert!(daily_outlook(&forecast, today()).is_empty());
    }

    #[test]
    fn window_starts_three_entries_back() {
        let forecast = forecast(40, 0);

        assert_eq!(entries_around(&forecast, 0).len(), 8);
        assert_eq!(entries_around(&forecast, 0)[0], forecast.list[0]);
        assert_eq!(entries_around(&forecast, 10)[0], forecast.list[7]);
        assert_eq!(entries_around(&forecast, 38).len(), 5);
        assert!(entries_around(&forecast, 50).is_empty());
    }

    #[test]
    fn upcoming_skips_past_entries() {
        let forecast = forecast(8, 0);
        let now = DateTime::from_timestamp(1_760_832_000 + 4 * 3600, 0).unwrap();

        let first = upcoming(&forecast, now).next().expect("an upcoming entry");
        assert_eq!(first.dt_txt, "2025-10-19 06:00:00");
        assert_eq!(upcoming(&forecast, now).count(), 6);
    }

    #[test]
    fn local_time_formatting() {
        assert_eq!(format_local_time(1_760_860_800, 10800).as_deref(), Some("19/10/25 11:00"));
        assert_eq!(format_local_time(1_760_860_800, 0).as_deref(), Some("19/10/25 08:00"));
    }

    #[test]
    fn utc_offset_formatting() {
        assert_eq!(format_utc_offset(10800), "UTC +3.0");
        assert_eq!(format_utc_offset(-34200), "UTC -9.5");
        assert_eq!(format_utc_offset(0), "UTC +0.0");
    }

    #[test]
    fn out_of_range_offset_falls_back_to_utc() {
        assert_eq!(
            format_local_time(1_760_860_800, 999_999).as_deref(),
            Some("19/10/25 08:00")
        );
    }
}
