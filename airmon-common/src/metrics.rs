//! Derived metric calculators.
//!
//! Pure functions over sensor values:
//! - [`pm25_aqi`] - US EPA air quality index for PM2.5
//! - [`aqi_category`] - AQI bucket (1-5)
//! - [`dew_point`] - Magnus formula dew point
//! - [`comfort_index`] - temperature/humidity comfort score (0-100)

/// PM2.5 breakpoint table: (upper concentration, concentration start, AQI start, AQI span, concentration span).
const AQI_BREAKPOINTS: [(f32, f32, f32, f32, f32); 5] = [
    (35.4, 12.1, 51.0, 49.0, 23.3),
    (55.4, 35.5, 101.0, 49.0, 19.9),
    (150.4, 55.5, 151.0, 49.0, 94.9),
    (250.4, 150.5, 201.0, 99.0, 99.9),
    (f32::INFINITY, 250.5, 301.0, 99.0, 249.9),
];

const AQI_FIRST_BREAKPOINT: f32 = 12.0;
const AQI_FIRST_VALUE: f32 = 50.0;

const DEWPOINT_A: f32 = 17.27;
const DEWPOINT_B: f32 = 237.7;
const DEWPOINT_HUMIDITY_RANGE: (f32, f32) = (0.1, 100.0);

const COMFORT_TEMP_OPTIMAL: f32 = 22.0;
const COMFORT_TEMP_RANGE: (f32, f32) = (18.0, 26.0);
const COMFORT_TEMP_PENALTY: f32 = 10.0;
const COMFORT_HUMIDITY_OPTIMAL: f32 = 50.0;
const COMFORT_HUMIDITY_RANGE: (f32, f32) = (30.0, 70.0);
const COMFORT_HUMIDITY_PENALTY: f32 = 2.0;
const COMFORT_SCORE_MAX: f32 = 100.0;

/// Calculate the PM2.5 air quality index (US EPA breakpoints).
pub fn pm25_aqi(pm25: u16) -> u16 {
    let pm = f32::from(pm25);

    if pm <= AQI_FIRST_BREAKPOINT {
        return (pm * AQI_FIRST_VALUE / AQI_FIRST_BREAKPOINT).round() as u16;
    }

    let (_, start, aqi_start, aqi_span, range) = AQI_BREAKPOINTS
        .iter()
        .copied()
        .find(|(upper, ..)| pm <= *upper)
        .unwrap_or(AQI_BREAKPOINTS[AQI_BREAKPOINTS.len() - 1]);

    (aqi_start + (pm - start) * aqi_span / range).round() as u16
}

/// Map an AQI value to its category (1 = good ... 5 = very unhealthy or worse).
pub fn aqi_category(aqi: u16) -> u8 {
    match aqi {
        0..=50 => 1,
        51..=100 => 2,
        101..=150 => 3,
        151..=200 => 4,
        _ => 5,
    }
}

/// Calculate the dew point in °C.
///
/// Humidity is clamped to 0.1-100 % so the result stays finite; a sensor
/// reporting 0 % yields a very low dew point instead of NaN.
pub fn dew_point(temperature: f32, humidity: f32) -> f32 {
    let (min, max) = DEWPOINT_HUMIDITY_RANGE;
    let humidity = humidity.clamp(min, max);
    let alpha = (DEWPOINT_A * temperature) / (DEWPOINT_B + temperature) + (humidity / 100.0).ln();
    (DEWPOINT_B * alpha) / (DEWPOINT_A - alpha)
}

/// Calculate the comfort index (0-100, higher is better).
///
/// Each of temperature and humidity scores 100 inside its comfort band and
/// loses points linearly with the distance from the optimum outside of it.
pub fn comfort_index(temperature: f32, humidity: f32) -> f32 {
    let temp_score = band_score(
        temperature,
        COMFORT_TEMP_RANGE,
        COMFORT_TEMP_OPTIMAL,
        COMFORT_TEMP_PENALTY,
    );
    let humidity_score = band_score(
        humidity,
        COMFORT_HUMIDITY_RANGE,
        COMFORT_HUMIDITY_OPTIMAL,
        COMFORT_HUMIDITY_PENALTY,
    );

    (temp_score + humidity_score) / 2.0
}

fn band_score(value: f32, (min, max): (f32, f32), optimal: f32, penalty: f32) -> f32 {
    if (min..=max).contains(&value) {
        COMFORT_SCORE_MAX
    } else {
        (COMFORT_SCORE_MAX - (value - optimal).abs() * penalty).max(0.0)
    }
}
