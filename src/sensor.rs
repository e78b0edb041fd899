//! Simulated temperature sensor
//!
//! Each device performs a bounded random walk around a per-location base
//! temperature, so consecutive readings look like a real sensor.

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// Largest step between two consecutive readings, in either direction
const MAX_STEP: f64 = 0.5;
/// Spread of the very first reading around the base
const INITIAL_SPREAD: f64 = 1.0;
const MIN_BELOW_BASE: f64 = 5.0;
const MAX_ABOVE_BASE: f64 = 10.0;

/// One temperature sample as published on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TemperatureReading {
    pub device_id: String,
    pub temperature: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(default = "default_unit")]
    pub unit: String,
    pub location: String,
}

fn default_unit() -> String {
    "Celsius".to_string()
}

/// Source of sensor readings
pub trait SensorSource: Send + Sync {
    fn read(&self, device_id: &str, location: &str) -> TemperatureReading;
}

/// Base temperature in Celsius for a known location; 20 otherwise
pub fn base_temperature(location: &str) -> f64 {
    match location.to_lowercase().as_str() {
        "greenhouse" => 25.0,
        "warehouse" => 20.0,
        "outdoor" => 15.0,
        "server_room" => 22.0,
        _ => 20.0,
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

struct WalkState {
    rng: StdRng,
    last: HashMap<String, f64>,
}

/// Random-walk generator keeping the last temperature per device
pub struct TemperatureGenerator {
    state: Mutex<WalkState>,
}

impl TemperatureGenerator {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Deterministic generator for tests
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            state: Mutex::new(WalkState {
                rng,
                last: HashMap::new(),
            }),
        }
    }

    fn next_temperature(&self, device_id: &str, base: f64) -> f64 {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let WalkState { rng, last } = &mut *state;

        let previous = *last
            .entry(device_id.to_string())
            .or_insert_with(|| base + rng.gen_range(-INITIAL_SPREAD..=INITIAL_SPREAD));

        let next = (previous + rng.gen_range(-MAX_STEP..=MAX_STEP))
            .clamp(base - MIN_BELOW_BASE, base + MAX_ABOVE_BASE);

        last.insert(device_id.to_string(), next);
        next
    }
}

impl Default for TemperatureGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl SensorSource for TemperatureGenerator {
    fn read(&self, device_id: &str, location: &str) -> TemperatureReading {
        let base = base_temperature(location);
        TemperatureReading {
            device_id: device_id.to_string(),
            temperature: round2(self.next_temperature(device_id, base)),
            timestamp: Utc::now(),
            unit: default_unit(),
            location: location.to_string(),
        }
    }
}
