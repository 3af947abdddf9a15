// Synthetic vehicle positions for when no location server is reachable
use crate::domain::location::Location;
use crate::infrastructure::config::SimulationSettings;
use chrono::Utc;
use rand::Rng;

/// Reflecting random walk inside a square box around a reference point.
#[derive(Debug, Clone)]
pub struct RandomWalk {
    max_step: f64,
    latitude_bounds: (f64, f64),
    longitude_bounds: (f64, f64),
    latitude: f64,
    longitude: f64,
    direction: f64,
}

impl RandomWalk {
    pub fn new(settings: &SimulationSettings) -> Self {
        let extent = settings.half_extent_deg;
        Self {
            max_step: settings.max_step_deg,
            latitude_bounds: (
                settings.origin_latitude - extent,
                settings.origin_latitude + extent,
            ),
            longitude_bounds: (
                settings.origin_longitude - extent,
                settings.origin_longitude + extent,
            ),
            latitude: settings.origin_latitude,
            longitude: settings.origin_longitude,
            direction: 1.0,
        }
    }

    pub fn position(&self) -> (f64, f64) {
        (self.latitude, self.longitude)
    }

    pub fn direction(&self) -> f64 {
        self.direction
    }

    /// Uses the same bounds `step` clamps to, so every sample it returns is contained.
    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        let (lat_lo, lat_hi) = self.latitude_bounds;
        let (lon_lo, lon_hi) = self.longitude_bounds;
        (lat_lo..=lat_hi).contains(&latitude) && (lon_lo..=lon_hi).contains(&longitude)
    }

    pub fn step<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Location {
        let d_lat = rng.gen_range(-self.max_step..=self.max_step);
        let d_lon = rng.gen_range(-self.max_step..=self.max_step);

        let mut latitude = self.latitude + d_lat * self.direction;
        let mut longitude = self.longitude + d_lon * self.direction;
        if !self.contains(latitude, longitude) {
            self.direction = -self.direction;
            latitude = self.latitude + d_lat * self.direction;
            longitude = self.longitude + d_lon * self.direction;
        }

        self.latitude = latitude.clamp(self.latitude_bounds.0, self.latitude_bounds.1);
        self.longitude = longitude.clamp(self.longitude_bounds.0, self.longitude_bounds.1);

        Location::simulated(self.latitude, self.longitude, Utc::now())
    }
}
