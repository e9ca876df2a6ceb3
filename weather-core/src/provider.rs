use crate::{
    Config, WeatherError,
    model::{CurrentWeather, Forecast, LocationInfo},
    provider::openweather::OpenWeatherClient,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{fmt::Debug, str::FromStr};

pub mod openweather;

/// Unit system understood by the `units` query parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Units {
    /// Kelvin, m/s.
    Standard,
    /// Celsius, m/s.
    #[default]
    Metric,
    /// Fahrenheit, mph.
    Imperial,
}

impl Units {
    pub fn as_str(&self) -> &'static str {
        match self {
            Units::Standard => "standard",
            Units::Metric => "metric",
            Units::Imperial => "imperial",
        }
    }

    pub const fn all() -> &'static [Units] {
        &[Units::Standard, Units::Metric, Units::Imperial]
    }

    pub fn temperature_symbol(&self) -> &'static str {
        match self {
            Units::Standard => "K",
            Units::Metric => "°C",
            Units::Imperial => "°F",
        }
    }

    pub fn speed_symbol(&self) -> &'static str {
        match self {
            Units::Standard | Units::Metric => "m/s",
            Units::Imperial => "mph",
        }
    }
}

impl std::fmt::Display for Units {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Units {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let lower = value.to_lowercase();

        match lower.as_str() {
            "standard" => Ok(Units::Standard),
            "metric" => Ok(Units::Metric),
            "imperial" => Ok(Units::Imperial),
            _ => Err(anyhow::anyhow!(
                "Unknown unit system '{value}'. Supported: standard, metric, imperial."
            )),
        }
    }
}

/// Geocoding and weather queries, each memoized by the implementation.
#[async_trait]
pub trait WeatherProvider: Send + Sync + Debug {
    /// Fails with [`WeatherError::LocationNotFound`] when nothing matches.
    async fn locate_by_city(
        &self,
        city: &str,
        country: &str,
        state: Option<&str>,
        limit: Option<u32>,
    ) -> Result<Vec<LocationInfo>, WeatherError>;

    /// Fails with [`WeatherError::LocationNotFound`] for an unknown postal code.
    async fn locate_by_zip(
        &self,
        zip: &str,
        country: &str,
    ) -> Result<Vec<LocationInfo>, WeatherError>;

    async fn locate_by_coordinates(
        &self,
        lat: f64,
        lon: f64,
        limit: Option<u32>,
    ) -> Result<Vec<LocationInfo>, WeatherError>;

    async fn current_weather(
        &self,
        lat: f64,
        lon: f64,
        lang: &str,
        units: Units,
    ) -> Result<CurrentWeather, WeatherError>;

    async fn forecast(
        &self,
        lat: f64,
        lon: f64,
        lang: &str,
        units: Units,
    ) -> Result<Forecast, WeatherError>;

    /// Approximate coordinates of this machine, from IP geolocation.
    async fn current_coordinates(&self) -> Result<(f64, f64), WeatherError>;

    async fn current_weather_at(
        &self,
        location: &LocationInfo,
        lang: &str,
        units: Units,
    ) -> Result<CurrentWeather, WeatherError> {
        self.current_weather(location.lat, location.lon, lang, units).await
    }

    async fn forecast_at(
        &self,
        location: &LocationInfo,
        lang: &str,
        units: Units,
    ) -> Result<Forecast, WeatherError> {
        self.forecast(location.lat, location.lon, lang, units).await
    }
}

/// Construct the OpenWeather client from config.
pub fn provider_from_config(config: &Config) -> anyhow::Result<Box<dyn WeatherProvider>> {
    let api_key = config.api_key().ok_or_else(|| {
        anyhow::anyhow!(
            "No OpenWeather API key configured.\n\
                 Hint: run `weather configure` and enter your API key, \
                 or set OPENWEATHER_API_KEY."
        )
    })?;

    Ok(Box::new(OpenWeatherClient::new(api_key.to_owned())))
}
