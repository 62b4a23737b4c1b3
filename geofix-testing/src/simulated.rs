use std::time::Duration;

use chrono::Utc;
use geofix_logic::{Failure, FailureCode, Fix, LocationComponent, LocationProvider, SessionHandle};
use log::debug;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// Horizontal accuracy reported in high accuracy mode
const FINE_ACCURACY: LocationComponent = 5.0;
/// Horizontal accuracy reported otherwise
const COARSE_ACCURACY: LocationComponent = 65.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
/// How the simulated hardware answers a session
pub enum ProviderBehavior {
    /// Deliver a fix after the configured delay
    Respond,
    /// Deliver this failure after the configured delay
    Fail(FailureCode),
    /// Never deliver anything
    Silent,
    /// Refuse to start at all
    Unavailable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatedSettings {
    pub lat: LocationComponent,
    pub long: LocationComponent,
    pub altitude: Option<LocationComponent>,
    /// Time between a start and the delivery
    pub delay: Duration,
    pub behavior: ProviderBehavior,
}

impl Default for SimulatedSettings {
    fn default() -> Self {
        Self {
            lat: 37.0,
            long: -122.0,
            altitude: None,
            delay: Duration::from_secs(1),
            behavior: ProviderBehavior::Respond,
        }
    }
}

/// A [LocationProvider] that fakes the hardware on the tokio runtime, scripted through
/// [SimulatedSettings].
pub struct SimulatedProvider {
    settings: Mutex<SimulatedSettings>,
    high_accuracy: Mutex<bool>,
    running: Mutex<Option<CancellationToken>>,
}

impl SimulatedProvider {
    pub fn new(settings: SimulatedSettings) -> Self {
        Self {
            settings: Mutex::new(settings),
            high_accuracy: Mutex::new(true),
            running: Mutex::new(None),
        }
    }

    /// Takes effect on the next start
    pub fn set_behavior(&self, behavior: ProviderBehavior) {
        self.settings.lock().behavior = behavior;
    }

    pub fn settings(&self) -> SimulatedSettings {
        self.settings.lock().clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    fn make_fix(settings: &SimulatedSettings, high_accuracy: bool) -> Fix {
        let accuracy = if high_accuracy {
            FINE_ACCURACY
        } else {
            COARSE_ACCURACY
        };
        let fix = Fix::new(settings.lat, settings.long, accuracy, Utc::now());
        match settings.altitude {
            Some(altitude) => fix.with_altitude(altitude, accuracy * 2.0),
            None => fix,
        }
    }
}

impl Default for SimulatedProvider {
    fn default() -> Self {
        Self::new(SimulatedSettings::default())
    }
}

impl LocationProvider for SimulatedProvider {
    fn configure(&self, high_accuracy: bool) {
        *self.high_accuracy.lock() = high_accuracy;
    }

    fn start(&self, session: SessionHandle) -> Result<(), Failure> {
        let settings = self.settings();
        let high_accuracy = *self.high_accuracy.lock();

        if settings.behavior == ProviderBehavior::Unavailable {
            return Err(Failure::provider_unavailable());
        }

        let cancel = CancellationToken::new();
        if let Some(old) = self.running.lock().replace(cancel.clone()) {
            old.cancel();
        }

        let delivery = match settings.behavior {
            ProviderBehavior::Respond => Ok(Self::make_fix(&settings, high_accuracy)),
            ProviderBehavior::Fail(code) => Err(Failure::new(code)),
            ProviderBehavior::Silent | ProviderBehavior::Unavailable => return Ok(()),
        };

        let delay = settings.delay;
        tokio::spawn(async move {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {}

                _ = tokio::time::sleep(delay) => {
                    let accepted = match delivery {
                        Ok(fix) => session.deliver_fix(fix),
                        Err(failure) => session.deliver_failure(failure),
                    };
                    debug!("Simulated delivery for session {} accepted: {accepted}", session.id());
                }
            }
        });

        Ok(())
    }

    fn stop(&self) {
        if let Some(cancel) = self.running.lock().take() {
            cancel.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use geofix_logic::{CoordinatorPhase, LocationCoordinator, RequestConfig};
    use tokio::test;

    use super::*;

    fn mk_config(high_accuracy: bool) -> RequestConfig {
        RequestConfig::new(Duration::ZERO, Duration::from_secs(5), high_accuracy)
    }

    #[test]
    async fn test_simulated_fix_respects_accuracy() {
        tokio::time::pause();
        let coordinator = LocationCoordinator::new(SimulatedProvider::default());

        let fine = coordinator.fetch(mk_config(true)).await.expect("No fix");
        assert_eq!(fine.accuracy, FINE_ACCURACY);
        assert_eq!((fine.lat, fine.long), (37.0, -122.0));

        coordinator.clear_cache();
        let coarse = coordinator.fetch(mk_config(false)).await.expect("No fix");
        assert_eq!(coarse.accuracy, COARSE_ACCURACY);
        assert!(!coordinator.provider().is_running());
    }

    #[test]
    async fn test_simulated_failure() {
        tokio::time::pause();
        let coordinator = LocationCoordinator::new(SimulatedProvider::default());
        coordinator
            .provider()
            .set_behavior(ProviderBehavior::Fail(FailureCode::PermissionDenied));

        let res = coordinator.fetch(mk_config(true)).await;
        assert_eq!(res, Err(Failure::new(FailureCode::PermissionDenied)));
        assert!(coordinator.has_failed());
    }

    #[test]
    async fn test_silent_provider_stopped_on_timeout() {
        tokio::time::pause();
        let coordinator = LocationCoordinator::new(SimulatedProvider::default());
        coordinator.provider().set_behavior(ProviderBehavior::Silent);

        let res = coordinator.fetch(mk_config(true)).await;
        assert_eq!(res, Err(Failure::timed_out()));
        assert!(!coordinator.provider().is_running());
        assert_eq!(coordinator.phase(), CoordinatorPhase::Idle);
    }

    #[test]
    async fn test_unavailable_refuses_start() {
        let coordinator = LocationCoordinator::new(SimulatedProvider::default());
        coordinator
            .provider()
            .set_behavior(ProviderBehavior::Unavailable);

        let res = coordinator.fetch(mk_config(true)).await;
        assert_eq!(res, Err(Failure::provider_unavailable()));
        assert_eq!(coordinator.phase(), CoordinatorPhase::Idle);
    }

    #[test]
    async fn test_delivery_after_timeout_is_cancelled() {
        tokio::time::pause();
        let coordinator = LocationCoordinator::new(SimulatedProvider::new(SimulatedSettings {
            delay: Duration::from_secs(10),
            ..Default::default()
        }));

        let res = coordinator.fetch(mk_config(true)).await;
        assert_eq!(res, Err(Failure::timed_out()));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(coordinator.last_fix(), None);
        assert_eq!(coordinator.stats().rejected_deliveries, 0);
    }
}
