//! Acquisition scheduler
//!
//! Owns one group of sources (local sensors and/or the cloud API) and
//! decides each cycle which of them to poll. Local sensors are preferred and
//! their readings averaged; the API is the fallback and is rate limited by
//! its own interval.

use alloc::string::String;
use alloc::vec::Vec;

use crate::poller::{poll_source, PollSettings};
use crate::ports::{Clock, Connectivity, Platform, Transport, Watchdog};
use crate::reading::AqiReading;
use crate::source::{SensorSource, SourceKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CycleOutcome {
    /// A source produced a fresh reading, which is now current.
    Updated(AqiReading),
    /// At least one source was polled and none produced data.
    Failed,
    /// Nothing was due.
    NotDue,
}

#[derive(Debug, Clone)]
pub struct AcquisitionScheduler {
    name: String,
    locals: Vec<SensorSource>,
    api: Option<SensorSource>,
    current: Option<u16>,
    local_available: bool,
}

impl AcquisitionScheduler {
    pub fn new(name: &str, locals: Vec<SensorSource>, api: Option<SensorSource>) -> Self {
        Self {
            name: String::from(name),
            locals,
            api,
            current: None,
            local_available: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Last AQI obtained from any source, kept across failed cycles.
    pub fn current_aqi(&self) -> Option<u16> {
        self.current
    }

    /// Whether at least one local sensor answered on the most recent local
    /// poll.
    pub fn is_local_available(&self) -> bool {
        self.local_available
    }

    pub fn locals(&self) -> &[SensorSource] {
        &self.locals
    }

    pub fn api(&self) -> Option<&SensorSource> {
        self.api.as_ref()
    }

    /// Milliseconds until the next local sensor is due, `None` if there is
    /// none.
    pub fn time_until_next_local(&self, now_ms: u64) -> Option<u64> {
        self.locals
            .iter()
            .filter(|s| s.is_configured())
            .map(|s| s.time_until_due(now_ms))
            .min()
    }

    pub fn time_until_next_api(&self, now_ms: u64) -> Option<u64> {
        self.api
            .as_ref()
            .filter(|s| s.is_configured())
            .map(|s| s.time_until_due(now_ms))
    }

    /// Polls every configured local sensor that is due (all of them when
    /// `force` is set) and averages the ones that answered.
    async fn poll_locals<T, N, K, W>(
        &mut self,
        now_ms: u64,
        force: bool,
        settings: &PollSettings,
        platform: &mut Platform<T, N, K, W>,
    ) -> LocalPoll
    where
        T: Transport,
        N: Connectivity,
        K: Clock,
        W: Watchdog,
    {
        let mut polled = false;
        let mut average = LocalAverage::default();

        for local in self.locals.iter_mut() {
            if !local.is_configured() || !(force || local.is_due(now_ms)) {
                continue;
            }
            polled = true;
            let result = poll_source(local, settings, platform).await;
            local.mark_polled(now_ms);
            match result {
                Ok(aqi) => average.add(aqi),
                Err(e) => warn!(
                    "{}: local sensor {} failed: {}",
                    self.name.as_str(),
                    local.host.as_str(),
                    e
                ),
            }
        }

        if !polled {
            return LocalPoll::Skipped;
        }
        let aqi = average.value();
        self.local_available = aqi.is_some();
        aqi.map_or(LocalPoll::Failed, LocalPoll::Read)
    }

    /// Polls whatever is due, local sensors first.
    pub async fn update<T, N, K, W>(
        &mut self,
        now_ms: u64,
        settings: &PollSettings,
        platform: &mut Platform<T, N, K, W>,
    ) -> CycleOutcome
    where
        T: Transport,
        N: Connectivity,
        K: Clock,
        W: Watchdog,
    {
        let mut attempted = false;

        match self.poll_locals(now_ms, false, settings, platform).await {
            LocalPoll::Read(aqi) => {
                self.current = Some(aqi);
                // A good local reading makes the API poll unnecessary
                if let Some(api) = self.api.as_mut() {
                    api.mark_polled(now_ms);
                }
                return CycleOutcome::Updated(AqiReading::valid(aqi, SourceKind::Local, now_ms));
            }
            LocalPoll::Failed => attempted = true,
            LocalPoll::Skipped => {}
        }

        if let Some(api) = self.api.as_mut() {
            if api.is_configured() && api.is_due(now_ms) {
                attempted = true;
                let result = poll_source(api, settings, platform).await;
                api.mark_polled(now_ms);
                match result {
                    Ok(aqi) => {
                        self.current = Some(aqi);
                        return CycleOutcome::Updated(AqiReading::valid(aqi, SourceKind::CloudApi, now_ms));
                    }
                    Err(e) => warn!("{}: API failed: {}", self.name.as_str(), e),
                }
            }
        }

        if attempted {
            warn!("{}: no fresh data, keeping previous AQI", self.name.as_str());
            CycleOutcome::Failed
        } else {
            trace!("{}: nothing due", self.name.as_str());
            CycleOutcome::NotDue
        }
    }

    /// First fetch after boot. Ignores intervals: tries the local sensors,
    /// then the API if all of them failed or there are none, and restarts
    /// every interval from `now_ms`.
    pub async fn force_initial_update<T, N, K, W>(
        &mut self,
        now_ms: u64,
        settings: &PollSettings,
        platform: &mut Platform<T, N, K, W>,
    ) -> CycleOutcome
    where
        T: Transport,
        N: Connectivity,
        K: Clock,
        W: Watchdog,
    {
        info!("{}: initial update", self.name.as_str());
        let mut outcome = match self.poll_locals(now_ms, true, settings, platform).await {
            LocalPoll::Read(aqi) => {
                self.current = Some(aqi);
                CycleOutcome::Updated(AqiReading::valid(aqi, SourceKind::Local, now_ms))
            }
            LocalPoll::Failed => CycleOutcome::Failed,
            LocalPoll::Skipped => CycleOutcome::NotDue,
        };

        if !matches!(outcome, CycleOutcome::Updated(_)) {
            if let Some(api) = self.api.as_ref().filter(|s| s.is_configured()) {
                match poll_source(api, settings, platform).await {
                    Ok(aqi) => {
                        self.current = Some(aqi);
                        outcome =
                            CycleOutcome::Updated(AqiReading::valid(aqi, SourceKind::CloudApi, now_ms));
                    }
                    Err(e) => {
                        warn!("{}: initial API poll failed: {}", self.name.as_str(), e);
                        outcome = CycleOutcome::Failed;
                    }
                }
            }
        }

        if let Some(api) = self.api.as_mut() {
            api.mark_polled(now_ms);
        }
        outcome
    }
}

enum LocalPoll {
    /// No local sensor was polled.
    Skipped,
    /// Every polled sensor failed.
    Failed,
    /// Average of the sensors that answered.
    Read(u16),
}

/// Running mean of the local sensors that answered in one poll.
#[derive(Debug, Default, Clone, Copy)]
struct LocalAverage {
    sum: u32,
    count: u32,
}

impl LocalAverage {
    fn add(&mut self, aqi: u16) {
        self.sum += u32::from(aqi);
        self.count += 1;
    }

    /// Rounded half up.
    fn value(&self) -> Option<u16> {
        if self.count == 0 {
            return None;
        }
        u16::try_from((self.sum + self.count / 2) / self.count).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::testing::{platform, MockPlatform};
    use alloc::vec;
    use embassy_futures::block_on;

    const SENSOR: &str = "192.168.1.50";
    const SENSOR_B: &str = "192.168.1.51";
    const API: &str = "api.purpleair.com";
    const API_BODY: &str = r#"{"fields": ["sensor_index", "pm2.5_10minute"], "data": [[1, 55.4]]}"#;

    fn scheduler() -> AcquisitionScheduler {
        AcquisitionScheduler::new(
            "Outdoor",
            vec![SensorSource::local("Outdoor", SENSOR, 80, 60_000)],
            Some(SensorSource::cloud_api("Outdoor", API, 443, "key", &[1], 1_200_000)),
        )
    }

    fn update(s: &mut AcquisitionScheduler, now: u64, p: &mut MockPlatform) -> CycleOutcome {
        block_on(s.update(now, &PollSettings::default(), p))
    }

    #[test]
    fn test_local_first() {
        let mut p = platform();
        p.transport.respond_json(SENSOR, 200, r#"{"pm2_5_atm": 12.0}"#);
        let mut s = scheduler();

        let outcome = update(&mut s, 1_000, &mut p);
        assert_eq!(outcome, CycleOutcome::Updated(AqiReading::valid(50, SourceKind::Local, 1_000)));
        assert_eq!(p.transport.requests_to(API), 0);
        assert_eq!(s.api().unwrap().last_poll_ms, Some(1_000));
        assert!(s.is_local_available());
    }

    #[test]
    fn test_idempotent_within_interval() {
        let mut p = platform();
        p.transport.respond_json(SENSOR, 200, r#"{"pm2_5_atm": 12.0}"#);
        let mut s = scheduler();

        assert!(matches!(update(&mut s, 0, &mut p), CycleOutcome::Updated(_)));
        assert_eq!(update(&mut s, 30_000, &mut p), CycleOutcome::NotDue);
        assert_eq!(p.transport.requests.len(), 1);
        assert_eq!(s.current_aqi(), Some(50));
    }

    #[test]
    fn test_falls_back_to_api() {
        let mut p = platform();
        p.transport.set_unreachable(SENSOR);
        p.transport.respond_json(API, 200, API_BODY);
        let mut s = scheduler();

        let outcome = update(&mut s, 0, &mut p);
        assert_eq!(outcome, CycleOutcome::Updated(AqiReading::valid(150, SourceKind::CloudApi, 0)));
        assert!(!s.is_local_available());
        assert_eq!(s.locals()[0].last_poll_ms, Some(0));
        assert_eq!(s.api().unwrap().last_poll_ms, Some(0));
    }

    #[test]
    fn test_failure_keeps_previous_aqi() {
        let mut p = platform();
        p.transport.respond_json(SENSOR, 200, r#"{"pm2.5_aqi": 80}"#);
        let mut s = scheduler();
        update(&mut s, 0, &mut p);
        assert_eq!(s.current_aqi(), Some(80));

        // Local fails on all attempts, API is still inside its interval
        p.transport.respond(SENSOR, Err(TransportError::Timeout));
        assert_eq!(update(&mut s, 60_000, &mut p), CycleOutcome::Failed);
        assert_eq!(s.current_aqi(), Some(80));
        assert_eq!(p.transport.requests_to(API), 0);
    }

    #[test]
    fn test_api_polled_when_local_not_due() {
        let mut p = platform();
        p.transport.respond_json(SENSOR, 200, r#"{"pm2.5_aqi": 80}"#);
        p.transport.respond_json(API, 200, API_BODY);
        let mut s = scheduler();
        update(&mut s, 0, &mut p);

        // Lose the local sensor, then wait out the API interval while local
        // is between polls.
        p.transport.set_unreachable(SENSOR);
        update(&mut s, 1_150_000, &mut p);
        assert_eq!(p.transport.requests_to(API), 0);
        let outcome = update(&mut s, 1_200_000, &mut p);
        assert_eq!(outcome, CycleOutcome::Updated(AqiReading::valid(150, SourceKind::CloudApi, 1_200_000)));
    }

    #[test]
    fn test_api_only_group() {
        let mut p = platform();
        p.transport.respond_json(API, 200, API_BODY);
        let mut s = AcquisitionScheduler::new(
            "Indoor",
            Vec::new(),
            Some(SensorSource::cloud_api("Indoor", API, 443, "key", &[1], 1_200_000)),
        );
        assert!(matches!(update(&mut s, 0, &mut p), CycleOutcome::Updated(_)));
        assert_eq!(s.time_until_next_local(0), None);
        assert_eq!(s.time_until_next_api(600_000), Some(600_000));
    }

    #[test]
    fn test_unconfigured_group_is_never_due() {
        let mut p = platform();
        let mut s = AcquisitionScheduler::new(
            "Indoor",
            vec![SensorSource::local("Indoor", "", 80, 60_000)],
            Some(SensorSource::cloud_api("Indoor", API, 443, "", &[], 1_200_000)),
        );
        assert_eq!(update(&mut s, 0, &mut p), CycleOutcome::NotDue);
        assert_eq!(p.transport.probes + p.transport.connects, 0);
    }

    #[test]
    fn test_force_initial_update() {
        let mut p = platform();
        p.transport.set_unreachable(SENSOR);
        p.transport.respond_json(API, 200, API_BODY);
        let mut s = scheduler();

        let outcome = block_on(s.force_initial_update(5_000, &PollSettings::default(), &mut p));
        assert_eq!(outcome, CycleOutcome::Updated(AqiReading::valid(150, SourceKind::CloudApi, 5_000)));
        assert_eq!(s.time_until_next_local(5_000), Some(60_000));
        assert_eq!(s.time_until_next_api(5_000), Some(1_200_000));

        // Intervals restart from the forced fetch
        assert_eq!(update(&mut s, 6_000, &mut p), CycleOutcome::NotDue);
    }

    #[test]
    fn test_force_initial_update_local_ok_skips_api() {
        let mut p = platform();
        p.transport.respond_json(SENSOR, 200, r#"{"pm2.5_aqi": 0}"#);
        let mut s = scheduler();

        let outcome = block_on(s.force_initial_update(0, &PollSettings::default(), &mut p));
        assert_eq!(outcome, CycleOutcome::Updated(AqiReading::valid(0, SourceKind::Local, 0)));
        assert_eq!(s.current_aqi(), Some(0));
        assert_eq!(p.transport.requests_to(API), 0);
    }

    fn pair() -> AcquisitionScheduler {
        AcquisitionScheduler::new(
            "Outdoor",
            vec![
                SensorSource::local("Outdoor", SENSOR, 80, 60_000),
                SensorSource::local("Outdoor", SENSOR_B, 80, 60_000),
            ],
            Some(SensorSource::cloud_api("Outdoor", API, 443, "key", &[1], 1_200_000)),
        )
    }

    #[test]
    fn test_local_sensors_averaged() {
        let mut p = platform();
        p.transport.respond_json(SENSOR, 200, r#"{"pm2.5_aqi": 80}"#);
        p.transport.respond_json(SENSOR_B, 200, r#"{"pm2.5_aqi": 91}"#);
        let mut s = pair();

        let outcome = update(&mut s, 0, &mut p);
        assert_eq!(outcome, CycleOutcome::Updated(AqiReading::valid(86, SourceKind::Local, 0)));
        assert_eq!(p.transport.requests_to(API), 0);
    }

    #[test]
    fn test_one_local_sensor_failing() {
        let mut p = platform();
        p.transport.set_unreachable(SENSOR);
        p.transport.respond_json(SENSOR_B, 200, r#"{"pm2.5_aqi": 70}"#);
        p.transport.respond_json(API, 200, API_BODY);
        let mut s = pair();

        let outcome = update(&mut s, 0, &mut p);
        assert_eq!(outcome, CycleOutcome::Updated(AqiReading::valid(70, SourceKind::Local, 0)));
        assert!(s.is_local_available());
        assert_eq!(p.transport.requests_to(API), 0);
        assert!(s.locals().iter().all(|l| l.last_poll_ms == Some(0)));
        assert_eq!(s.time_until_next_local(10_000), Some(50_000));
    }

    #[test]
    fn test_all_local_sensors_failing_falls_back() {
        let mut p = platform();
        p.transport.set_unreachable(SENSOR);
        p.transport.set_unreachable(SENSOR_B);
        p.transport.respond_json(API, 200, API_BODY);
        let mut s = pair();

        let outcome = block_on(s.force_initial_update(0, &PollSettings::default(), &mut p));
        assert_eq!(outcome, CycleOutcome::Updated(AqiReading::valid(150, SourceKind::CloudApi, 0)));
        assert!(!s.is_local_available());
    }
}
