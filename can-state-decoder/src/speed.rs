//! Longitudinal speed and acceleration estimate
//!
//! Constant-acceleration Kalman filter over the mean wheel speed, running with
//! precomputed steady-state gains.

/// Steady-state Kalman gain for (speed, acceleration)
const KF_GAIN: [f64; 2] = [0.12287673, 0.29666309];

/// Reset to the raw measurement when the estimate drifts this far away
const RESET_THRESHOLD: f64 = 2.0;

#[derive(Debug, Clone)]
pub struct SpeedEstimator {
    dt: f64,
    /// State vector: speed, acceleration
    x: [f64; 2],
}

impl SpeedEstimator {
    pub fn new(dt: f64) -> Self {
        Self { dt, x: [0.0, 0.0] }
    }

    /// Feed one raw speed sample and return the filtered (speed, acceleration)
    pub fn update(&mut self, raw_speed: f64) -> (f64, f64) {
        if (raw_speed - self.x[0]).abs() > RESET_THRESHOLD {
            self.x = [raw_speed, 0.0];
        }

        let predicted_speed = self.x[0] + self.dt * self.x[1];
        let innovation = raw_speed - predicted_speed;
        self.x[0] = predicted_speed + KF_GAIN[0] * innovation;
        self.x[1] += KF_GAIN[1] * innovation;

        (self.x[0], self.x[1])
    }
}
