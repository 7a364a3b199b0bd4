/// Latitude limit kept away from the poles so the Mercator projection stays finite
pub const MAX_LATITUDE: f64 = 80.0;
pub const MAX_LONGITUDE: f64 = 180.0;

/// Geographic bounds of a map region in degrees
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub lat_min: f64,
    pub lat_max: f64,
    pub lon_min: f64,
    pub lon_max: f64,
}

impl BoundingBox {
    pub fn lat_span(&self) -> f64 {
        (self.lat_max - self.lat_min).abs()
    }

    pub fn lon_span(&self) -> f64 {
        (self.lon_max - self.lon_min).abs()
    }

    /// Grows the box by `margin` degrees on every side
    pub fn padded(&self, margin: f64) -> BoundingBox {
        BoundingBox {
            lat_min: self.lat_min - margin,
            lat_max: self.lat_max + margin,
            lon_min: self.lon_min - margin,
            lon_max: self.lon_max + margin,
        }
    }
}

/// Box centered on a point. The longitude margin is widened by `1/cos(lat)` so
/// the covered ground distance is similar on both axes.
pub fn pad_point(lat: f64, lon: f64, margin: f64) -> BoundingBox {
    let margin_lon = margin / lat.to_radians().cos();
    BoundingBox {
        lat_min: lat - margin,
        lat_max: lat + margin,
        lon_min: lon - margin_lon,
        lon_max: lon + margin_lon,
    }
}

/// Pads `raw` by `margin` and widens its shorter side so both spans match.
///
/// The result is clamped to +-80 latitude and +-180 longitude afterwards. When
/// the clamp triggers the box is no longer square.
pub fn square_region(raw: &BoundingBox, margin: f64) -> BoundingBox {
    let mut region = raw.padded(margin);

    let lat_span = raw.lat_span();
    let lon_span = raw.lon_span();
    let half_diff = (lon_span - lat_span).abs() / 2.0;
    if lat_span > lon_span {
        region.lon_min -= half_diff;
        region.lon_max += half_diff;
    } else {
        region.lat_min -= half_diff;
        region.lat_max += half_diff;
    }

    region.lat_max = region.lat_max.min(MAX_LATITUDE);
    region.lat_min = region.lat_min.max(-MAX_LATITUDE);
    region.lon_max = region.lon_max.min(MAX_LONGITUDE);
    region.lon_min = region.lon_min.max(-MAX_LONGITUDE);
    region
}

/// Pads `raw` by `margin` on every side
pub fn precise_region(raw: &BoundingBox, margin: f64) -> BoundingBox {
    raw.padded(margin)
}
