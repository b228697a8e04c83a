//! Browser fingerprint rotation.
//!
//! Generates randomized but internally-consistent browser identities:
//! the platform always matches the user agent, the screen always
//! matches the viewport. Every browser-driven component gets its
//! fingerprint from here so one site sees one coherent visitor.

use parking_lot::Mutex;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashSet;

const USER_AGENTS: &[&str] = &[
    // Chrome on macOS
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_2_1) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
    // Chrome on Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    // Edge on Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36 Edg/121.0.0.0",
];

const VIEWPORTS: &[(u32, u32)] = &[
    (1920, 1080),
    (1440, 900),
    (1536, 864),
    (1366, 768),
    (2560, 1440),
    (1680, 1050),
    (1280, 800),
];

const TIMEZONES: &[&str] = &[
    "America/New_York",
    "America/Chicago",
    "America/Denver",
    "America/Los_Angeles",
    "America/Toronto",
    "Europe/London",
    "Europe/Berlin",
];

const LOCALES: &[&str] = &["en-US", "en-GB", "en-CA"];

/// JavaScript injected after navigation to neutralize the common
/// headless-detection probes: the webdriver flag, missing chrome
/// runtime, zero plugins, and an empty language list.
pub const JS_OVERRIDES: &str = r#"
    Object.defineProperty(navigator, 'webdriver', { get: () => undefined });
    window.chrome = window.chrome || {
        runtime: {},
        loadTimes: function() {},
        csi: function() {},
        app: {}
    };
    if (navigator.permissions && navigator.permissions.query) {
        const originalQuery = navigator.permissions.query.bind(navigator.permissions);
        navigator.permissions.query = (parameters) =>
            parameters.name === 'notifications'
                ? Promise.resolve({ state: Notification.permission })
                : originalQuery(parameters);
    }
    Object.defineProperty(navigator, 'plugins', { get: () => [1, 2, 3, 4, 5] });
    Object.defineProperty(navigator, 'languages', { get: () => ['en-US', 'en'] });
"#;

/// One coherent browser identity.
#[derive(Debug, Clone)]
pub struct Fingerprint {
    pub user_agent: String,
    pub viewport: (u32, u32),
    pub timezone: String,
    pub locale: String,
    pub platform: &'static str,
    pub device_scale_factor: f32,
    /// Available screen height is viewport minus a plausible taskbar.
    pub avail_height: u32,
}

/// Generates and tracks fingerprints for the run.
#[derive(Default)]
pub struct FingerprintManager {
    used_user_agents: Mutex<HashSet<String>>,
    generated: Mutex<usize>,
}

impl FingerprintManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate a fresh identity. Platform is derived from the chosen
    /// user agent so the two never disagree.
    pub fn generate(&self) -> Fingerprint {
        let mut rng = rand::thread_rng();
        let user_agent = (*USER_AGENTS.choose(&mut rng).expect("non-empty list")).to_string();
        let viewport = *VIEWPORTS.choose(&mut rng).expect("non-empty list");
        let timezone = (*TIMEZONES.choose(&mut rng).expect("non-empty list")).to_string();
        let locale = (*LOCALES.choose(&mut rng).expect("non-empty list")).to_string();

        let platform = if user_agent.contains("Macintosh") || user_agent.contains("Mac OS") {
            "macOS"
        } else if user_agent.contains("Windows") {
            "Windows"
        } else {
            "Linux"
        };

        let fingerprint = Fingerprint {
            avail_height: viewport.1 - rng.gen_range(25..80),
            user_agent: user_agent.clone(),
            viewport,
            timezone,
            locale,
            platform,
            device_scale_factor: *[1.0, 1.5, 2.0].choose(&mut rng).expect("non-empty list"),
        };

        self.used_user_agents.lock().insert(user_agent);
        *self.generated.lock() += 1;
        fingerprint
    }

    pub fn stats(&self) -> FingerprintStats {
        FingerprintStats {
            total_generated: *self.generated.lock(),
            unique_user_agents: self.used_user_agents.lock().len(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FingerprintStats {
    pub total_generated: usize,
    pub unique_user_agents: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_always_matches_user_agent() {
        let manager = FingerprintManager::new();
        for _ in 0..50 {
            let fp = manager.generate();
            if fp.user_agent.contains("Windows") {
                assert_eq!(fp.platform, "Windows");
            } else if fp.user_agent.contains("Macintosh") {
                assert_eq!(fp.platform, "macOS");
            }
        }
    }

    #[test]
    fn avail_height_is_below_viewport() {
        let manager = FingerprintManager::new();
        for _ in 0..20 {
            let fp = manager.generate();
            assert!(fp.avail_height < fp.viewport.1);
            assert!(fp.avail_height >= fp.viewport.1 - 80);
        }
    }

    #[test]
    fn stats_count_generations() {
        let manager = FingerprintManager::new();
        manager.generate();
        manager.generate();
        let stats = manager.stats();
        assert_eq!(stats.total_generated, 2);
        assert!(stats.unique_user_agents >= 1);
    }
}
