//! Records mirroring the OpenWeather JSON payloads, and the decoding entry
//! points that turn raw JSON into them.

use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};
use serde::de::{self, DeserializeOwned};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::WeatherError;

/// A record that can be decoded straight from a provider response.
pub trait Record: DeserializeOwned {
    /// Name reported in [`WeatherError::SchemaMismatch`].
    const SHAPE: &'static str;
}

/// Decode one record from a JSON value.
pub fn decode<T: Record>(value: Value) -> Result<T, WeatherError> {
    serde_json::from_value(value).map_err(|err| WeatherError::schema(T::SHAPE, err))
}

/// Decode either a single object or an array of objects into a sequence.
pub fn decode_many<T: Record>(value: Value) -> Result<Vec<T>, WeatherError> {
    match value {
        Value::Array(items) => items.into_iter().map(decode::<T>).collect(),
        object @ Value::Object(_) => decode(object).map(|record| vec![record]),
        other => Err(WeatherError::schema(
            T::SHAPE,
            format!("expected an object or an array of objects, got {}", kind_of(&other)),
        )),
    }
}

/// Parse a response body into an untyped JSON value.
pub fn parse_body(shape: &'static str, body: &str) -> Result<Value, WeatherError> {
    serde_json::from_str(body).map_err(|err| WeatherError::schema(shape, err))
}

/// Parse the plain-text `lat,lon` answer of an IP geolocation service.
pub fn parse_coordinates(text: &str) -> Result<(f64, f64), WeatherError> {
    const SHAPE: &str = "Coordinates";

    let mut parts = text.trim().split(',');
    let (Some(lat), Some(lon), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(WeatherError::schema(
            SHAPE,
            format!("expected `lat,lon`, got {text:?}"),
        ));
    };

    let parse = |field: &str, raw: &str| {
        raw.trim()
            .parse::<f64>()
            .map_err(|err| WeatherError::schema(SHAPE, format!("invalid {field} {raw:?}: {err}")))
    };

    Ok((parse("latitude", lat)?, parse("longitude", lon)?))
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn non_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    let items = Vec::<T>::deserialize(deserializer)?;
    if items.is_empty() {
        return Err(de::Error::invalid_length(0, &"at least one weather condition"));
    }
    Ok(items)
}

pub(crate) fn float_bits(value: f64) -> u64 {
    // fold -0.0 into 0.0 so equal coordinates hash equally
    (value + 0.0).to_bits()
}

fn timestamp(secs: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
}

/// A geocoding result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_names: Option<BTreeMap<String, String>>,
    pub lat: f64,
    pub lon: f64,
    pub country: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

impl LocationInfo {
    /// The localized name for `lang` if the provider sent one.
    pub fn display_name(&self, lang: &str) -> &str {
        self.local_names
            .as_ref()
            .and_then(|names| names.get(lang))
            .map_or(self.name.as_str(), String::as_str)
    }

    pub fn coordinates(&self) -> Coordinates {
        Coordinates {
            lat: self.lat,
            lon: self.lon,
        }
    }
}

impl PartialEq for LocationInfo {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.local_names == other.local_names
            && float_bits(self.lat) == float_bits(other.lat)
            && float_bits(self.lon) == float_bits(other.lon)
            && self.country == other.country
            && self.state == other.state
    }
}

impl Eq for LocationInfo {}

impl Hash for LocationInfo {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.local_names.hash(state);
        float_bits(self.lat).hash(state);
        float_bits(self.lon).hash(state);
        self.country.hash(state);
        self.state.hash(state);
    }
}

impl Record for LocationInfo {
    const SHAPE: &'static str = "LocationInfo";
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemperatureInfo {
    pub temp: f64,
    pub feels_like: f64,
    pub temp_min: f64,
    pub temp_max: f64,
    /// hPa
    pub pressure: i64,
    /// %
    pub humidity: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sea_level: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grnd_level: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_kf: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindInfo {
    pub speed: f64,
    /// Meteorological degrees.
    pub deg: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gust: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WeatherCondition {
    pub id: i64,
    pub main: String,
    pub description: String,
    /// Icon-set key such as `"01d"`.
    pub icon: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clouds {
    /// Cloud coverage, %.
    pub all: i64,
}

/// Precipitation volume in mm.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Precipitation {
    #[serde(rename = "1h", default, skip_serializing_if = "Option::is_none")]
    pub last_hour: Option<f64>,
    #[serde(rename = "3h", default, skip_serializing_if = "Option::is_none")]
    pub last_three_hours: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SysInfo {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub country: String,
    pub sunrise: i64,
    pub sunset: i64,
}

/// Response of `/data/2.5/weather`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentWeather {
    pub coord: Coordinates,
    #[serde(deserialize_with = "non_empty")]
    pub weather: Vec<WeatherCondition>,
    pub base: String,
    pub main: TemperatureInfo,
    /// Meters.
    pub visibility: i64,
    pub wind: WindInfo,
    pub clouds: Clouds,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rain: Option<Precipitation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snow: Option<Precipitation>,
    /// Observation time, unix seconds UTC.
    pub dt: i64,
    pub sys: SysInfo,
    /// Shift from UTC in seconds.
    pub timezone: i64,
    pub id: i64,
    pub name: String,
    pub cod: i64,
}

impl CurrentWeather {
    pub fn primary_condition(&self) -> Option<&WeatherCondition> {
        self.weather.first()
    }

    pub fn observed_at(&self) -> Option<DateTime<Utc>> {
        timestamp(self.dt)
    }

    pub fn sunrise_at(&self) -> Option<DateTime<Utc>> {
        timestamp(self.sys.sunrise)
    }

    pub fn sunset_at(&self) -> Option<DateTime<Utc>> {
        timestamp(self.sys.sunset)
    }
}

impl Record for CurrentWeather {
    const SHAPE: &'static str = "CurrentWeather";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PartOfDay {
    #[serde(rename = "d")]
    Day,
    #[serde(rename = "n")]
    Night,
}

impl PartOfDay {
    pub fn suffix(self) -> char {
        match self {
            PartOfDay::Day => 'd',
            PartOfDay::Night => 'n',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForecastSys {
    pub pod: PartOfDay,
}

/// One 3-hour step of the forecast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastEntry {
    pub dt: i64,
    pub main: TemperatureInfo,
    #[serde(deserialize_with = "non_empty")]
    pub weather: Vec<WeatherCondition>,
    pub clouds: Clouds,
    pub wind: WindInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rain: Option<Precipitation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snow: Option<Precipitation>,
    pub visibility: i64,
    /// Probability of precipitation, 0..=1.
    pub pop: f64,
    pub sys: ForecastSys,
    pub dt_txt: String,
}

impl ForecastEntry {
    pub fn primary_condition(&self) -> Option<&WeatherCondition> {
        self.weather.first()
    }

    pub fn at(&self) -> Option<DateTime<Utc>> {
        timestamp(self.dt)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastCity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub name: String,
    pub coord: Coordinates,
    pub country: String,
    pub timezone: i64,
    pub sunrise: i64,
    pub sunset: i64,
}

/// Response of `/data/2.5/forecast`: five days in 3-hour steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    pub cod: String,
    pub message: f64,
    pub cnt: i64,
    pub list: Vec<ForecastEntry>,
    pub city: ForecastCity,
}

impl Forecast {
    /// Index of `entry` in the forecast list.
    pub fn position(&self, entry: &ForecastEntry) -> Option<usize> {
        self.list.iter().position(|candidate| candidate == entry)
    }
}

impl Record for Forecast {
    const SHAPE: &'static str = "Forecast";
}

#[cfg(test)]
pub(crate) mod fixtures {
    use serde_json::{Value, json};

    pub fn moscow() -> Value {
        json!({
            "name": "Moscow",
            "local_names": { "ru": "Москва", "en": "Moscow" },
            "lat": 55.7504461,
            "lon": 37.6174943,
            "country": "RU",
            "state": "Moscow"
        })
    }

    pub fn current_weather() -> Value {
        json!({
            "coord": { "lon": 37.6175, "lat": 55.7504 },
            "weather": [
                { "id": 803, "main": "Clouds", "description": "облачно с прояснениями", "icon": "04d" }
            ],
            "base": "stations",
            "main": {
                "temp": 12.4,
                "feels_like": 11.2,
                "temp_min": 11,
                "temp_max": 13.9,
                "pressure": 1012,
                "humidity": 71,
                "sea_level": 1012,
                "grnd_level": 993
            },
            "visibility": 10000,
            "wind": { "speed": 4.1, "deg": 250, "gust": 7.3 },
            "clouds": { "all": 75 },
            "rain": { "1h": 0.21 },
            "dt": 1760860800,
            "sys": { "type": 2, "id": 2000314, "country": "RU", "sunrise": 1760846071, "sunset": 1760882362 },
            "timezone": 10800,
            "id": 524901,
            "name": "Moscow",
            "cod": 200
        })
    }

    pub fn forecast_entry(dt: i64, dt_txt: &str, pod: &str) -> Value {
        json!({
            "dt": dt,
            "main": {
                "temp": 9.8,
                "feels_like": 7.5,
                "temp_min": 9.1,
                "temp_max": 9.8,
                "pressure": 1014,
                "humidity": 80,
                "sea_level": 1014,
                "grnd_level": 995,
                "temp_kf": 0.7
            },
            "weather": [
                { "id": 500, "main": "Rain", "description": "небольшой дождь", "icon": format!("10{pod}") }
            ],
            "clouds": { "all": 100 },
            "wind": { "speed": 3.2, "deg": 231, "gust": 8.1 },
            "visibility": 10000,
            "pop": 0.35,
            "rain": { "3h": 0.42 },
            "sys": { "pod": pod },
            "dt_txt": dt_txt
        })
    }

    /// A forecast starting at 2025-10-19 00:00 UTC, 3-hour step, `steps` entries.
    pub fn forecast(steps: i64, timezone: i64) -> Value {
        const START: i64 = 1_760_832_000;
        let list: Vec<Value> = (0..steps)
            .map(|i| {
                let dt = START + i * 3 * 3600;
                let txt = chrono::DateTime::from_timestamp(dt, 0)
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_default();
                let hour = (i * 3) % 24;
                let pod = if (6..18).contains(&hour) { "d" } else { "n" };
                forecast_entry(dt, &txt, pod)
            })
            .collect();

        json!({
            "cod": "200",
            "message": 0,
            "cnt": steps,
            "list": list,
            "city": {
                "id": 524901,
                "name": "Moscow",
                "coord": { "lat": 55.7504, "lon": 37.6175 },
                "country": "RU",
                "population": 1000000,
                "timezone": timezone,
                "sunrise": 1760846071,
                "sunset": 1760882362
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use serde_json::json;

    #[test]
    fn current_weather_decodes_nested_records() {
        let weather: CurrentWeather = decode(current_weather()).unwrap();

        assert_eq!(weather.name, "Moscow");
        assert_eq!(weather.main.temp_min, 11.0);
        assert_eq!(weather.main.grnd_level, Some(993));
        assert_eq!(weather.main.temp_kf, None);
        assert_eq!(weather.wind.gust, Some(7.3));
        assert_eq!(weather.rain, Some(Precipitation { last_hour: Some(0.21), last_three_hours: None }));
        assert_eq!(weather.snow, None);
        assert_eq!(weather.sys.kind, Some(2));
        assert_eq!(weather.primary_condition().map(|c| c.icon.as_str()), Some("04d"));
        assert_eq!(
            weather.observed_at().map(|t| t.to_rfc3339()),
            Some("2025-10-19T08:00:00+00:00".to_string())
        );
    }

    #[test]
    fn current_weather_survives_json_round_trip() {
        let before: CurrentWeather = decode(current_weather()).unwrap();
        let encoded = serde_json::to_value(&before).unwrap();
        let decoded: CurrentWeather = decode(encoded).unwrap();

        assert_eq!(decoded, before);
    }

    #[test]
    fn missing_weather_list_is_schema_mismatch() {
        let mut payload = current_weather();
        payload.as_object_mut().unwrap().remove("weather");

        match decode::<CurrentWeather>(payload) {
            Err(WeatherError::SchemaMismatch { shape, detail }) => {
                assert_eq!(shape, "CurrentWeather");
                assert!(detail.contains("weather"), "{detail}");
            }
            other => panic!("expected SchemaMismatch, got {other:?}"),
        }
    }

    #[test]
    fn empty_weather_list_is_schema_mismatch() {
        let mut payload = current_weather();
        payload["weather"] = json!([]);

        let err = decode::<CurrentWeather>(payload).unwrap_err();
        assert!(matches!(err, WeatherError::SchemaMismatch { shape: "CurrentWeather", .. }));
        assert!(err.to_string().contains("at least one weather condition"));
    }

    #[test]
    fn empty_weather_list_in_forecast_entry_is_schema_mismatch() {
        let mut payload = forecast(2, 0);
        payload["list"][1]["weather"] = json!([]);

        let err = decode::<Forecast>(payload).unwrap_err();
        assert!(matches!(err, WeatherError::SchemaMismatch { shape: "Forecast", .. }));
    }

    #[test]
    fn numeric_strings_are_not_coerced() {
        let mut payload = current_weather();
        payload["main"]["temp"] = json!("12.4");

        let err = decode::<CurrentWeather>(payload).unwrap_err();
        assert!(matches!(err, WeatherError::SchemaMismatch { .. }));
    }

    #[test]
    fn fractional_value_for_integer_field_is_rejected() {
        let mut payload = current_weather();
        payload["main"]["humidity"] = json!(71.5);

        assert!(decode::<CurrentWeather>(payload).is_err());
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let mut payload = moscow();
        payload["population"] = json!(13_000_000);

        let location: LocationInfo = decode(payload).unwrap();
        assert_eq!(location.country, "RU");
    }

    #[test]
    fn optional_location_fields_decode_to_none() {
        let location: LocationInfo = decode(json!({
            "name": "Zelenograd",
            "lat": 55.99,
            "lon": 37.19,
            "country": "RU"
        }))
        .unwrap();

        assert_eq!(location.local_names, None);
        assert_eq!(location.state, None);
        assert_eq!(location.display_name("ru"), "Zelenograd");
    }

    #[test]
    fn display_name_prefers_localized_name() {
        let location: LocationInfo = decode(moscow()).unwrap();

        assert_eq!(location.display_name("ru"), "Москва");
        assert_eq!(location.display_name("de"), "Moscow");
    }

    #[test]
    fn single_object_and_one_element_array_decode_alike() {
        let single: Vec<LocationInfo> = decode_many(moscow()).unwrap();
        let array: Vec<LocationInfo> = decode_many(json!([moscow()])).unwrap();

        assert_eq!(single.len(), 1);
        assert_eq!(single, array);
    }

    #[test]
    fn decode_many_rejects_scalars() {
        let err = decode_many::<LocationInfo>(json!("Moscow")).unwrap_err();

        assert!(matches!(err, WeatherError::SchemaMismatch { shape: "LocationInfo", .. }));
        assert!(err.to_string().contains("a string"));
    }

    #[test]
    fn location_equality_and_hash_are_structural() {
        use std::collections::HashSet;

        let a: LocationInfo = decode(moscow()).unwrap();
        let mut b = a.clone();
        let mut set = HashSet::new();
        set.insert(a.clone());

        assert!(set.contains(&b));
        b.state = None;
        assert_ne!(a, b);
        assert!(!set.contains(&b));
    }

    #[test]
    fn negative_zero_coordinates_equal_positive_zero() {
        let mut a: LocationInfo = decode(moscow()).unwrap();
        a.lon = 0.0;
        let mut b = a.clone();
        b.lon = -0.0;

        assert_eq!(a, b);
    }

    #[test]
    fn forecast_decodes_and_finds_entries() {
        let forecast: Forecast = decode(forecast(4, 10800)).unwrap();

        assert_eq!(forecast.cnt, 4);
        assert_eq!(forecast.message, 0.0);
        assert_eq!(forecast.list[0].dt_txt, "2025-10-19 00:00:00");
        assert_eq!(forecast.list[0].sys.pod, PartOfDay::Night);
        assert_eq!(forecast.list[2].sys.pod, PartOfDay::Day);
        assert_eq!(forecast.position(&forecast.list[3]), Some(3));
        assert_eq!(forecast.city.id, Some(524901));
    }

    #[test]
    fn coordinates_parse_from_plain_text() {
        assert_eq!(parse_coordinates("55.7522,37.6156\n").unwrap(), (55.7522, 37.6156));
    }

    #[test]
    fn malformed_coordinates_are_schema_mismatch() {
        for text in ["", "55.75", "55.75,abc", "1,2,3"] {
            let err = parse_coordinates(text).unwrap_err();
            assert!(
                matches!(err, WeatherError::SchemaMismatch { shape: "Coordinates", .. }),
                "{text:?} gave {err:?}"
            );
        }
    }

    #[test]
    fn invalid_json_body_is_schema_mismatch() {
        let err = parse_body("Forecast", "<html>502</html>").unwrap_err();
        assert!(matches!(err, WeatherError::SchemaMismatch { shape: "Forecast", .. }));
    }
}
