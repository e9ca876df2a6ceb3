use std::{fmt, sync::Arc};

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;

use crate::{
    error::{TransportError, WeatherError, truncate_body},
    memo::{Clock, SystemClock, Ttl, TtlCache},
    model::{
        CurrentWeather, Forecast, LocationInfo, Record, decode, decode_many, float_bits,
        parse_body, parse_coordinates,
    },
};

use super::{Units, WeatherProvider};

pub const DEFAULT_API_BASE: &str = "https://api.openweathermap.org";
pub const DEFAULT_IP_LOCATION_URL: &str = "https://ipinfo.io/loc";

const GEOCODING_TTL: Ttl = Ttl::Forever;
const CURRENT_WEATHER_TTL: Ttl = Ttl::secs(600);
const FORECAST_TTL: Ttl = Ttl::secs(3600);
const DEVICE_COORDINATES_TTL: Ttl = Ttl::secs(1200);

const DIRECT_GEOCODING: &str = "geocoding (direct)";
const ZIP_GEOCODING: &str = "geocoding (zip)";
const REVERSE_GEOCODING: &str = "geocoding (reverse)";
const CURRENT_WEATHER: &str = "current weather";
const FORECAST: &str = "5-day forecast";
const IP_LOCATION: &str = "ip location";

/// Base URLs the client talks to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    /// Host serving `/geo/1.0/*` and `/data/2.5/*`.
    pub api_base: String,
    /// Plain-text `lat,lon` service.
    pub ip_location: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            ip_location: DEFAULT_IP_LOCATION_URL.to_string(),
        }
    }
}

impl Endpoints {
    fn api(&self, path: &str) -> String {
        format!("{}{path}", self.api_base.trim_end_matches('/'))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CityKey {
    city: String,
    country: String,
    state: Option<String>,
    limit: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ZipKey {
    zip: String,
    country: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PointKey {
    lat: u64,
    lon: u64,
    limit: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct WeatherKey {
    lat: u64,
    lon: u64,
    lang: String,
    units: Units,
}

impl WeatherKey {
    fn new(lat: f64, lon: f64, lang: &str, units: Units) -> Self {
        Self {
            lat: float_bits(lat),
            lon: float_bits(lon),
            lang: lang.to_string(),
            units,
        }
    }
}

/// OpenWeatherMap client. Every query is memoized in a cache owned by the
/// client, with the TTL fixed per endpoint.
pub struct OpenWeatherClient {
    api_key: String,
    http: Client,
    endpoints: Endpoints,
    by_city: TtlCache<CityKey, Vec<LocationInfo>>,
    by_zip: TtlCache<ZipKey, Vec<LocationInfo>>,
    by_point: TtlCache<PointKey, Vec<LocationInfo>>,
    current: TtlCache<WeatherKey, CurrentWeather>,
    forecast: TtlCache<WeatherKey, Forecast>,
    device: TtlCache<(), (f64, f64)>,
}

impl OpenWeatherClient {
    pub fn new(api_key: String) -> Self {
        Self::with_endpoints(api_key, Endpoints::default())
    }

    pub fn with_endpoints(api_key: String, endpoints: Endpoints) -> Self {
        Self::with_clock(api_key, endpoints, Arc::new(SystemClock))
    }

    pub fn with_clock(api_key: String, endpoints: Endpoints, clock: Arc<dyn Clock>) -> Self {
        Self {
            api_key,
            http: Client::new(),
            endpoints,
            by_city: TtlCache::with_clock(GEOCODING_TTL, clock.clone()),
            by_zip: TtlCache::with_clock(GEOCODING_TTL, clock.clone()),
            by_point: TtlCache::with_clock(GEOCODING_TTL, clock.clone()),
            current: TtlCache::with_clock(CURRENT_WEATHER_TTL, clock.clone()),
            forecast: TtlCache::with_clock(FORECAST_TTL, clock.clone()),
            device: TtlCache::with_clock(DEVICE_COORDINATES_TTL, clock),
        }
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    async fn send(
        &self,
        endpoint: &'static str,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<(StatusCode, String), TransportError> {
        tracing::debug!(endpoint, url, "sending request");

        let res = self
            .http
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|source| TransportError::Request { endpoint, source })?;

        let status = res.status();
        let body = res
            .text()
            .await
            .map_err(|source| TransportError::Request { endpoint, source })?;

        tracing::debug!(endpoint, %status, bytes = body.len(), "response received");
        Ok((status, body))
    }

    fn with_key<'a>(&self, mut query: Vec<(&'a str, String)>) -> Vec<(&'a str, String)> {
        query.push(("appid", self.api_key.clone()));
        query
    }

    async fn fetch_city(&self, key: &CityKey) -> Result<Vec<LocationInfo>, WeatherError> {
        let q = match &key.state {
            Some(state) => format!("{},{state},{}", key.city, key.country),
            None => format!("{},{}", key.city, key.country),
        };

        let mut query = vec![("q", q.clone())];
        if let Some(limit) = key.limit {
            query.push(("limit", limit.to_string()));
        }

        let url = self.endpoints.api("/geo/1.0/direct");
        let (status, body) = self
            .send(DIRECT_GEOCODING, &url, &self.with_key(query))
            .await?;
        let body = ensure_success(DIRECT_GEOCODING, status, body)?;

        let value = parse_body(LocationInfo::SHAPE, &body)?;
        if matches!(&value, Value::Array(items) if items.is_empty()) {
            return Err(WeatherError::LocationNotFound { query: q });
        }

        decode_many(value)
    }

    async fn fetch_zip(&self, key: &ZipKey) -> Result<Vec<LocationInfo>, WeatherError> {
        let zip = format!("{},{}", key.zip, key.country);

        let url = self.endpoints.api("/geo/1.0/zip");
        let (status, body) = self
            .send(ZIP_GEOCODING, &url, &self.with_key(vec![("zip", zip.clone())]))
            .await?;

        if reports_not_found(status, &body) {
            return Err(WeatherError::LocationNotFound { query: zip });
        }

        let body = ensure_success(ZIP_GEOCODING, status, body)?;
        decode_many(parse_body(LocationInfo::SHAPE, &body)?)
    }

    async fn fetch_point(&self, lat: f64, lon: f64, limit: Option<u32>) -> Result<Vec<LocationInfo>, WeatherError> {
        let mut query = vec![("lat", lat.to_string()), ("lon", lon.to_string())];
        if let Some(limit) = limit {
            query.push(("limit", limit.to_string()));
        }

        let url = self.endpoints.api("/geo/1.0/reverse");
        let (status, body) = self
            .send(REVERSE_GEOCODING, &url, &self.with_key(query))
            .await?;
        let body = ensure_success(REVERSE_GEOCODING, status, body)?;

        decode_many(parse_body(LocationInfo::SHAPE, &body)?)
    }

    async fn fetch_record<T: Record>(
        &self,
        endpoint: &'static str,
        path: &str,
        lat: f64,
        lon: f64,
        lang: &str,
        units: Units,
    ) -> Result<T, WeatherError> {
        let query = vec![
            ("lat", lat.to_string()),
            ("lon", lon.to_string()),
            ("units", units.as_str().to_string()),
            ("lang", lang.to_string()),
        ];

        let url = self.endpoints.api(path);
        let (status, body) = self.send(endpoint, &url, &self.with_key(query)).await?;
        let body = ensure_success(endpoint, status, body)?;

        decode(parse_body(T::SHAPE, &body)?)
    }

    async fn fetch_device_coordinates(&self) -> Result<(f64, f64), WeatherError> {
        let (status, body) = self
            .send(IP_LOCATION, &self.endpoints.ip_location, &[])
            .await?;
        let body = ensure_success(IP_LOCATION, status, body)?;

        parse_coordinates(&body)
    }
}

#[async_trait]
impl WeatherProvider for OpenWeatherClient {
    async fn locate_by_city(
        &self,
        city: &str,
        country: &str,
        state: Option<&str>,
        limit: Option<u32>,
    ) -> Result<Vec<LocationInfo>, WeatherError> {
        let key = CityKey {
            city: city.to_string(),
            country: country.to_string(),
            state: state.map(str::to_string),
            limit,
        };

        self.by_city
            .get_or_try_fetch(key.clone(), || self.fetch_city(&key))
            .await
    }

    async fn locate_by_zip(
        &self,
        zip: &str,
        country: &str,
    ) -> Result<Vec<LocationInfo>, WeatherError> {
        let key = ZipKey {
            zip: zip.to_string(),
            country: country.to_string(),
        };

        self.by_zip
            .get_or_try_fetch(key.clone(), || self.fetch_zip(&key))
            .await
    }

    async fn locate_by_coordinates(
        &self,
        lat: f64,
        lon: f64,
        limit: Option<u32>,
    ) -> Result<Vec<LocationInfo>, WeatherError> {
        let key = PointKey {
            lat: float_bits(lat),
            lon: float_bits(lon),
            limit,
        };

        self.by_point
            .get_or_try_fetch(key, || self.fetch_point(lat, lon, limit))
            .await
    }

    async fn current_weather(
        &self,
        lat: f64,
        lon: f64,
        lang: &str,
        units: Units,
    ) -> Result<CurrentWeather, WeatherError> {
        self.current
            .get_or_try_fetch(WeatherKey::new(lat, lon, lang, units), || {
                self.fetch_record(CURRENT_WEATHER, "/data/2.5/weather", lat, lon, lang, units)
            })
            .await
    }

    async fn forecast(
        &self,
        lat: f64,
        lon: f64,
        lang: &str,
        units: Units,
    ) -> Result<Forecast, WeatherError> {
        self.forecast
            .get_or_try_fetch(WeatherKey::new(lat, lon, lang, units), || {
                self.fetch_record(FORECAST, "/data/2.5/forecast", lat, lon, lang, units)
            })
            .await
    }

    async fn current_coordinates(&self) -> Result<(f64, f64), WeatherError> {
        self.device
            .get_or_try_fetch((), || self.fetch_device_coordinates())
            .await
    }
}

impl fmt::Debug for OpenWeatherClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenWeatherClient")
            .field("api_key", &"<redacted>")
            .field("endpoints", &self.endpoints)
            .field("by_city", &self.by_city)
            .field("by_zip", &self.by_zip)
            .field("by_point", &self.by_point)
            .field("current", &self.current)
            .field("forecast", &self.forecast)
            .field("device", &self.device)
            .finish()
    }
}

fn ensure_success(
    endpoint: &'static str,
    status: StatusCode,
    body: String,
) -> Result<String, TransportError> {
    if !status.is_success() {
        return Err(TransportError::Status {
            endpoint,
            status,
            body: truncate_body(&body),
        });
    }
    Ok(body)
}

/// The zip endpoint answers an unknown code with `{"cod":"404","message":"not found"}`,
/// or with a bare HTTP 404. Other `cod` values (401, 429, ...) are left to the status check.
fn reports_not_found(status: StatusCode, body: &str) -> bool {
    if status == StatusCode::NOT_FOUND {
        return true;
    }

    let Ok(Value::Object(fields)) = serde_json::from_str::<Value>(body) else {
        return false;
    };

    match fields.get("cod") {
        Some(Value::String(code)) => code.trim() == "404",
        Some(Value::Number(code)) => code.as_i64() == Some(404),
        _ => false,
    }
}
