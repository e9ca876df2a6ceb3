use chrono::{DateTime, Utc};
use weather_core::{
    CurrentWeather, Forecast, ForecastEntry, LocationInfo, Precipitation, Units, WeatherCondition,
    WindInfo, summary,
};

/// Which forecast entries to print.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForecastView {
    All,
    /// One entry per upcoming day, near local noon.
    Daily,
    NextHours(i64),
    /// Entries surrounding the noon entry of the N-th upcoming day (1-based).
    AroundDay(usize),
}

pub fn location_line(location: &LocationInfo, lang: &str) -> String {
    let name = location.display_name(lang);

    let mut parts = vec![name];
    if name != location.name {
        parts.push(&location.name);
    }
    if let Some(state) = &location.state {
        parts.push(state);
    }
    parts.push(&location.country);

    format!("{} ({:.4}, {:.4})", parts.join(", "), location.lat, location.lon)
}

pub fn current_report(weather: &CurrentWeather, units: Units) -> String {
    let deg = units.temperature_symbol();
    let tz = weather.timezone;

    let mut lines = vec![
        format!("Location: {}, {}", weather.name, weather.sys.country),
        format!("Timezone: {}", summary::format_utc_offset(tz)),
        format!("Observed: {}", local(weather.dt, tz)),
        format!("Sunrise: {}", local(weather.sys.sunrise, tz)),
        format!("Sunset: {}", local(weather.sys.sunset, tz)),
        format!("Weather: {}", description(&weather.weather)),
        format!(
            "Temperature: {}{deg} (feels like {}{deg})",
            weather.main.temp, weather.main.feels_like
        ),
        format!("Min/max: {}{deg} / {}{deg}", weather.main.temp_min, weather.main.temp_max),
        format!("Humidity: {}%", weather.main.humidity),
        format!("Pressure: {} hPa", weather.main.pressure),
        wind_line(&weather.wind, units),
        format!("Clouds: {}%", weather.clouds.all),
        format!("Visibility: {} m", weather.visibility),
    ];
    lines.extend(precipitation_line("Rain", weather.rain));
    lines.extend(precipitation_line("Snow", weather.snow));

    lines.join("\n")
}

pub fn entry_line(entry: &ForecastEntry, offset_secs: i64, units: Units) -> String {
    format!(
        "{}  {:>6.1}{}  {:>3.0}%  {}",
        local(entry.dt, offset_secs),
        entry.main.temp,
        units.temperature_symbol(),
        entry.pop * 100.0,
        description(&entry.weather),
    )
}

pub fn forecast_report(
    forecast: &Forecast,
    units: Units,
    view: ForecastView,
    now: DateTime<Utc>,
) -> String {
    let offset = forecast.city.timezone;
    let header = format!(
        "Forecast for {}, {} ({})",
        forecast.city.name,
        forecast.city.country,
        summary::format_utc_offset(offset)
    );

    let entries: Vec<&ForecastEntry> = match view {
        ForecastView::All => forecast.list.iter().collect(),
        ForecastView::Daily => summary::local_time(now.timestamp(), offset)
            .map(|local| summary::daily_outlook(forecast, local.date_naive()))
            .unwrap_or_default(),
        ForecastView::NextHours(hours) => {
            let until = hours
                .checked_mul(3600)
                .and_then(|secs| now.timestamp().checked_add(secs))
                .unwrap_or(i64::MAX);
            summary::upcoming(forecast, now)
                .take_while(|entry| entry.dt <= until)
                .collect()
        }
        ForecastView::AroundDay(day) => summary::local_time(now.timestamp(), offset)
            .and_then(|local| {
                let daily = summary::daily_outlook(forecast, local.date_naive());
                let noon = daily.get(day.checked_sub(1)?)?;
                forecast.position(noon)
            })
            .map(|index| summary::entries_around(forecast, index).iter().collect())
            .unwrap_or_default(),
    };

    if entries.is_empty() {
        return format!("{header}\nNo forecast entries for this period.");
    }

    let mut lines = vec![header];
    lines.extend(entries.into_iter().map(|entry| entry_line(entry, offset, units)));
    lines.join("\n")
}

fn local(ts: i64, offset_secs: i64) -> String {
    summary::format_local_time(ts, offset_secs).unwrap_or_else(|| "-".to_string())
}

fn description(conditions: &[WeatherCondition]) -> &str {
    conditions
        .first()
        .map_or("unknown", |condition| condition.description.as_str())
}

fn wind_line(wind: &WindInfo, units: Units) -> String {
    let speed = units.speed_symbol();
    match wind.gust {
        Some(gust) => format!(
            "Wind: {} {speed}, gusts {gust} {speed}, {}°",
            wind.speed, wind.deg
        ),
        None => format!("Wind: {} {speed}, {}°", wind.speed, wind.deg),
    }
}

fn precipitation_line(label: &str, volume: Option<Precipitation>) -> Option<String> {
    let volume = volume?;
    match (volume.last_hour, volume.last_three_hours) {
        (Some(hour), _) => Some(format!("{label}: {hour} mm/1h")),
        (None, Some(three)) => Some(format!("{label}: {three} mm/3h")),
        (None, None) => None,
    }
}
