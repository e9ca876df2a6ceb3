//! Core library for the `weather` CLI.
//!
//! This crate defines:
//! - A TTL-aware memoizer ([`memo`])
//! - Typed records for OpenWeather responses and their decoding ([`model`])
//! - The memoized OpenWeather client behind the [`WeatherProvider`] trait
//! - Configuration & credentials handling
//! - Icon caching and forecast summaries for display layers
//!
//! It is used by `weather-cli`, but can also be reused by other front ends.

pub mod config;
pub mod error;
pub mod icons;
pub mod memo;
pub mod model;
pub mod provider;
pub mod summary;

pub use config::Config;
pub use error::{TransportError, WeatherError};
pub use memo::{Clock, ManualClock, Memoized, SystemClock, Ttl, TtlCache};
pub use model::{
    Clouds, Coordinates, CurrentWeather, Forecast, ForecastCity, ForecastEntry, LocationInfo,
    PartOfDay, Precipitation, TemperatureInfo, WeatherCondition, WindInfo,
};
pub use provider::{
    Units, WeatherProvider,
    openweather::{Endpoints, OpenWeatherClient},
    provider_from_config,
};
