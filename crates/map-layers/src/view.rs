use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
/// Camera parameters handed to the map on first render. The map's own
/// interaction handling owns it afterwards.
pub struct ViewState {
    pub latitude: f64,
    pub longitude: f64,
    pub zoom: f64,
    pub bearing: f64,
    pub pitch: f64,
}

impl ViewState {
    /// Tokyo Station, wide enough to show the 23 wards.
    pub const INITIAL: ViewState = ViewState {
        latitude: 35.681236,
        longitude: 139.767125,
        zoom: 11.0,
        bearing: 0.0,
        pitch: 0.0,
    };
}

impl Default for ViewState {
    fn default() -> Self {
        Self::INITIAL
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_camera_is_flat_and_north_up() {
        let view = ViewState::default();
        assert_eq!(view, ViewState::INITIAL);
        assert_eq!(view.bearing, 0.0);
        assert_eq!(view.pitch, 0.0);
    }
}
