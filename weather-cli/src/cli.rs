use anyhow::{Context, Result, anyhow, bail};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use inquire::{Password, PasswordDisplayMode, Select, Text};
use serde_json::json;
use weather_core::{
    Config, LocationInfo, Units, WeatherProvider,
    icons::{IconStore, Resolution},
    model::parse_coordinates,
    provider_from_config,
};

use crate::render::{self, ForecastView};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "weather", version, about = "Current weather and 5-day forecasts from OpenWeather")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Language for condition descriptions, e.g. "en"; overrides the config.
    #[arg(long, global = true)]
    pub lang: Option<String>,

    /// Unit system: standard, metric or imperial; overrides the config.
    #[arg(long, global = true)]
    pub units: Option<Units>,

    /// Country code for city and postal-code lookups; overrides the config.
    #[arg(long, global = true)]
    pub country: Option<String>,

    /// Print raw records as JSON instead of text.
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Store the API key and display preferences.
    Configure,

    /// Look up locations by name, postal code or coordinates.
    Locate {
        #[command(subcommand)]
        by: LocateBy,
    },

    /// Show current weather.
    Now {
        #[command(flatten)]
        target: Target,
    },

    /// Show the 5-day forecast.
    Forecast {
        #[command(flatten)]
        target: Target,

        /// One line per day, around local noon.
        #[arg(long, conflicts_with = "hours")]
        days: bool,

        /// Only the next N hours.
        #[arg(long)]
        hours: Option<i64>,

        /// Hours around noon of the N-th upcoming day (1 = tomorrow).
        #[arg(long, conflicts_with_all = ["days", "hours"])]
        around: Option<usize>,
    },

    /// Download every condition icon into the icon directory.
    Icons {
        /// Fetch the @2x variants.
        #[arg(long)]
        hires: bool,
    },
}

#[derive(Debug, Subcommand)]
pub enum LocateBy {
    City {
        name: String,

        /// State code (US only).
        #[arg(long)]
        state: Option<String>,

        #[arg(long)]
        limit: Option<u32>,
    },
    Zip {
        code: String,
    },
    Coords {
        #[arg(allow_hyphen_values = true)]
        lat: f64,

        #[arg(allow_hyphen_values = true)]
        lon: f64,

        #[arg(long)]
        limit: Option<u32>,
    },
}

/// Where to show weather for; defaults to this machine's location.
#[derive(Debug, Clone, Default, Args)]
#[group(multiple = false)]
pub struct Target {
    /// City name.
    #[arg(long)]
    pub city: Option<String>,

    /// Postal code.
    #[arg(long)]
    pub zip: Option<String>,

    /// Coordinates as "LAT,LON".
    #[arg(long, value_parser = parse_lat_lon, allow_hyphen_values = true)]
    pub at: Option<(f64, f64)>,
}

fn parse_lat_lon(raw: &str) -> Result<(f64, f64), String> {
    parse_coordinates(raw).map_err(|err| err.to_string())
}

/// Preferences after applying command-line overrides to the config.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub lang: String,
    pub units: Units,
    pub country: String,
}

impl Settings {
    pub fn resolve(config: &Config, cli: &Cli) -> Self {
        Self {
            lang: cli.lang.clone().unwrap_or_else(|| config.language.clone()),
            units: cli.units.unwrap_or(config.units),
            country: cli
                .country
                .as_deref()
                .unwrap_or(&config.country)
                .trim()
                .to_uppercase(),
        }
    }
}

/// Coordinates to query, with the geocoding match when there was one.
#[derive(Debug, Clone)]
struct Place {
    lat: f64,
    lon: f64,
    location: Option<LocationInfo>,
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let config = Config::load()?;
        let settings = Settings::resolve(&config, &self);
        let as_json = self.json;
        tracing::debug!(?settings, "resolved settings");

        match self.command {
            Command::Configure => configure(config),
            Command::Icons { hires } => fetch_icons(&config, hires).await,
            Command::Locate { by } => {
                let provider = provider_from_config(&config)?;
                locate(provider.as_ref(), by, &settings, as_json).await
            }
            Command::Now { target } => {
                let provider = provider_from_config(&config)?;
                let place = resolve_target(provider.as_ref(), &target, &settings).await?;
                let weather = provider
                    .current_weather(place.lat, place.lon, &settings.lang, settings.units)
                    .await?;

                if as_json {
                    print_json(&json!({ "location": place.location, "weather": weather }))
                } else {
                    if let Some(location) = &place.location {
                        println!("{}", render::location_line(location, &settings.lang));
                    }
                    println!("{}", render::current_report(&weather, settings.units));
                    Ok(())
                }
            }
            Command::Forecast {
                target,
                days,
                hours,
                around,
            } => {
                let provider = provider_from_config(&config)?;
                let place = resolve_target(provider.as_ref(), &target, &settings).await?;
                let forecast = provider
                    .forecast(place.lat, place.lon, &settings.lang, settings.units)
                    .await?;

                if as_json {
                    return print_json(&json!({ "location": place.location, "forecast": forecast }));
                }

                let view = match (days, hours, around) {
                    (true, _, _) => ForecastView::Daily,
                    (false, Some(hours), _) => ForecastView::NextHours(hours),
                    (false, None, Some(day)) => ForecastView::AroundDay(day),
                    (false, None, None) => ForecastView::All,
                };

                if let Some(location) = &place.location {
                    println!("{}", render::location_line(location, &settings.lang));
                }
                println!("{}", render::forecast_report(&forecast, settings.units, view, Utc::now()));
                Ok(())
            }
        }
    }
}

async fn locate(
    provider: &dyn WeatherProvider,
    by: LocateBy,
    settings: &Settings,
    as_json: bool,
) -> Result<()> {
    let found = match by {
        LocateBy::City { name, state, limit } => {
            provider
                .locate_by_city(&name, &settings.country, state.as_deref(), limit)
                .await?
        }
        LocateBy::Zip { code } => provider.locate_by_zip(&code, &settings.country).await?,
        LocateBy::Coords { lat, lon, limit } => {
            provider.locate_by_coordinates(lat, lon, limit).await?
        }
    };

    if as_json {
        return print_json(&found);
    }

    if found.is_empty() {
        println!("No named places near these coordinates.");
    }
    for location in &found {
        println!("{}", render::location_line(location, &settings.lang));
    }
    Ok(())
}

async fn resolve_target(
    provider: &dyn WeatherProvider,
    target: &Target,
    settings: &Settings,
) -> Result<Place> {
    let matches = if let Some(city) = &target.city {
        provider
            .locate_by_city(city, &settings.country, None, Some(1))
            .await?
    } else if let Some(zip) = &target.zip {
        provider.locate_by_zip(zip, &settings.country).await?
    } else {
        let (lat, lon) = match target.at {
            Some(at) => at,
            None => provider
                .current_coordinates()
                .await
                .context("Failed to detect current location; pass --city, --zip or --at")?,
        };
        tracing::debug!(lat, lon, "querying by coordinates");
        return Ok(Place {
            lat,
            lon,
            location: None,
        });
    };

    let location = matches
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("The provider returned no locations"))?;
    tracing::debug!(name = %location.name, location.lat, location.lon, "resolved target");

    Ok(Place {
        lat: location.lat,
        lon: location.lon,
        location: Some(location),
    })
}

fn configure(mut config: Config) -> Result<()> {
    let key = Password::new("OpenWeather API key:")
        .with_display_mode(PasswordDisplayMode::Masked)
        .without_confirmation()
        .with_help_message("Leave empty to keep the current key")
        .prompt()
        .context("Failed to read API key")?;

    if !key.trim().is_empty() {
        config.set_api_key(key);
    } else if config.api_key().is_none() {
        bail!("An API key is required; get one at https://home.openweathermap.org/api_keys");
    }

    config.language = Text::new("Description language:")
        .with_default(&config.language)
        .prompt()
        .context("Failed to read language")?
        .trim()
        .to_string();

    let units = Units::all().to_vec();
    let cursor = units.iter().position(|u| *u == config.units).unwrap_or(0);
    config.units = Select::new("Units:", units)
        .with_starting_cursor(cursor)
        .prompt()
        .context("Failed to read unit system")?;

    config.country = Text::new("Default country code:")
        .with_default(&config.country)
        .prompt()
        .context("Failed to read country code")?
        .trim()
        .to_uppercase();

    let path = config.save()?;
    println!("Configuration saved to {}", path.display());
    Ok(())
}

async fn fetch_icons(config: &Config, hires: bool) -> Result<()> {
    let store = IconStore::new(config.icon_dir()?);
    let resolution = if hires {
        Resolution::Double
    } else {
        Resolution::Standard
    };

    let paths = store.prefetch_all(resolution).await?;
    println!("{} icons available in {}", paths.len(), store.dir().display());
    Ok(())
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{rendered}");
    Ok(())
}
