//! Humanlike timing and interaction patterns.
//!
//! Delays come from gaussian distributions rather than uniform random:
//! uniform timing is itself a bot signature. Scrolls vary in distance
//! and occasionally backtrack the way a reading human does.

use fantoccini::Client;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use std::time::Duration;

/// Simulates organic browsing behavior over a WebDriver session.
#[derive(Debug, Clone)]
pub struct HumanBehavior {
    /// Multiplier for all delays. 1.0 = normal, 0.5 = faster, 2.0 = more cautious.
    speed_factor: f64,
}

impl Default for HumanBehavior {
    fn default() -> Self {
        HumanBehavior { speed_factor: 1.0 }
    }
}

impl HumanBehavior {
    pub fn new(speed_factor: f64) -> Self {
        HumanBehavior {
            speed_factor: speed_factor.max(0.1),
        }
    }

    /// A human-like delay drawn from N(mean, std), floored at `minimum`.
    fn gaussian_delay(&self, mean: f64, std: f64, minimum: f64) -> Duration {
        let normal = Normal::new(mean, std).expect("static distribution parameters");
        let sampled: f64 = normal.sample(&mut rand::thread_rng());
        Duration::from_secs_f64(sampled.max(minimum) * self.speed_factor)
    }

    /// Wait a human-like duration. Short waits for between-action pauses.
    pub async fn human_wait(&self, short: bool) {
        let delay = if short {
            self.gaussian_delay(1.2, 0.5, 0.5)
        } else {
            self.gaussian_delay(3.5, 1.5, 1.0)
        };
        tokio::time::sleep(delay).await;
    }

    /// Tiny pause between rapid actions.
    pub async fn micro_pause(&self) {
        tokio::time::sleep(self.gaussian_delay(0.4, 0.15, 0.1)).await;
    }

    /// Scroll the page downward with variable distance, occasionally
    /// backtracking and occasionally lingering as if reading.
    pub async fn human_scroll(&self, client: &Client) -> Result<(), fantoccini::error::CmdError> {
        let distance: i64 = rand::thread_rng().gen_range(300..900);
        client
            .execute("window.scrollBy(0, arguments[0]);", vec![distance.into()])
            .await?;
        tokio::time::sleep(self.gaussian_delay(0.8, 0.3, 0.3)).await;

        // 20% chance to scroll back up slightly (re-reading)
        if rand::thread_rng().gen_bool(0.2) {
            let back: i64 = rand::thread_rng().gen_range(50..200);
            client
                .execute("window.scrollBy(0, -arguments[0]);", vec![back.into()])
                .await?;
            tokio::time::sleep(self.gaussian_delay(1.0, 0.4, 0.3)).await;
        }

        // Occasional longer pause (reading content)
        if rand::thread_rng().gen_bool(0.15) {
            tokio::time::sleep(self.gaussian_delay(3.0, 1.0, 1.0)).await;
        }
        Ok(())
    }

    /// Click an element after a hover-length pause, the way a person
    /// confirms before committing.
    pub async fn human_click(
        &self,
        element: &fantoccini::elements::Element,
    ) -> Result<(), fantoccini::error::CmdError> {
        tokio::time::sleep(self.gaussian_delay(0.3, 0.15, 0.1)).await;
        element.click().await?;
        self.micro_pause().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_respect_minimum_floor() {
        let behavior = HumanBehavior::new(1.0);
        for _ in 0..200 {
            let d = behavior.gaussian_delay(0.5, 2.0, 0.3);
            assert!(d >= Duration::from_secs_f64(0.3));
        }
    }

    #[test]
    fn speed_factor_scales_delays() {
        let slow = HumanBehavior::new(2.0);
        let d = slow.gaussian_delay(1.0, 0.0, 1.0);
        assert!(d >= Duration::from_secs_f64(2.0) - Duration::from_millis(1));
    }

    #[test]
    fn speed_factor_is_floored() {
        let b = HumanBehavior::new(0.0);
        let d = b.gaussian_delay(1.0, 0.0, 1.0);
        assert!(d >= Duration::from_millis(100));
    }
}
