//! Control loop
//!
//! Ties acquisition, decision and actuation together. One call to
//! [`Controller::run_cycle`] is one cycle; [`Controller::run`] repeats
//! cycles until the configured maximum uptime.

use aqi::Category;

use crate::config::{Config, TimingConfig};
use crate::decision::{SwitchPosition, Transition, VentilationController, VentilationState};
use crate::effector::{Effector, LinkStatus};
use crate::error::ConfigError;
use crate::poller::PollSettings;
use crate::ports::{Clock, Connectivity, Indicator, Platform, RelayOutputs, SwitchInput, Transport, Watchdog};
use crate::scheduler::{AcquisitionScheduler, CycleOutcome};
use crate::telemetry::{FormLogger, LogPolicy, LogRecord};
use crate::wait::{ensure_connected, sleep_fed, ConnectTiming};

/// What happened during one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub outdoor: CycleOutcome,
    pub indoor: Option<CycleOutcome>,
    pub switch: SwitchPosition,
    pub transition: Transition,
    /// The link was down at the start of the cycle and had to be brought up.
    pub reconnected: bool,
    /// A remote log record was sent (successfully or not).
    pub logged: bool,
}

pub struct Controller<R, I> {
    outdoor: AcquisitionScheduler,
    indoor: Option<AcquisitionScheduler>,
    ventilation: VentilationController,
    effector: Effector<R, I>,
    settings: PollSettings,
    connect_timing: ConnectTiming,
    timing: TimingConfig,
    form: Option<(FormLogger, LogPolicy)>,
    started_ms: u64,
    last_countdown_ms: Option<u64>,
}

impl<R: RelayOutputs, I: Indicator> Controller<R, I> {
    pub fn new(config: &Config, effector: Effector<R, I>) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            outdoor: config.outdoor_scheduler(),
            indoor: config.indoor_scheduler(),
            ventilation: VentilationController::new(config.thresholds()?),
            effector,
            settings: config.poll_settings(),
            connect_timing: config.connect_timing(),
            timing: config.timing,
            form: config.form_logger(),
            started_ms: 0,
            last_countdown_ms: None,
        })
    }

    pub fn state(&self) -> VentilationState {
        self.ventilation.state()
    }

    pub fn outdoor(&self) -> &AcquisitionScheduler {
        &self.outdoor
    }

    pub fn indoor(&self) -> Option<&AcquisitionScheduler> {
        self.indoor.as_ref()
    }

    pub fn effector(&self) -> &Effector<R, I> {
        &self.effector
    }

    /// Brings the link up and performs the first fetch for every group,
    /// then drives the outputs to the initial state.
    pub async fn start<T, N, K, W>(&mut self, platform: &mut Platform<T, N, K, W>)
    where
        T: Transport,
        N: Connectivity,
        K: Clock,
        W: Watchdog,
    {
        self.started_ms = platform.now_ms();
        info!(
            "controller: starting, thresholds {}/{}",
            self.ventilation.thresholds().enable(),
            self.ventilation.thresholds().disable()
        );
        self.connect(platform).await;

        let now = platform.now_ms();
        self.outdoor
            .force_initial_update(now, &self.settings, platform)
            .await;
        if let Some(indoor) = self.indoor.as_mut() {
            indoor.force_initial_update(now, &self.settings, platform).await;
        }
        self.effector.apply(self.ventilation.state());
    }

    async fn connect<T, N, K, W>(&mut self, platform: &mut Platform<T, N, K, W>) -> bool
    where
        N: Connectivity,
        K: Clock,
        W: Watchdog,
    {
        if platform.connectivity.is_connected() {
            return false;
        }
        self.effector.show_link(LinkStatus::Connecting);
        ensure_connected(
            &mut platform.connectivity,
            &platform.clock,
            &mut platform.watchdog,
            self.connect_timing,
        )
        .await;
        self.effector.show_link(LinkStatus::Connected);
        true
    }

    /// Runs one cycle with the given switch position.
    pub async fn run_cycle<T, N, K, W>(
        &mut self,
        platform: &mut Platform<T, N, K, W>,
        switch: SwitchPosition,
    ) -> CycleReport
    where
        T: Transport,
        N: Connectivity,
        K: Clock,
        W: Watchdog,
    {
        platform.watchdog.feed();
        let reconnected = self.connect(platform).await;

        let now = platform.now_ms();
        let outdoor = self.outdoor.update(now, &self.settings, platform).await;
        let indoor = match self.indoor.as_mut() {
            Some(indoor) => Some(indoor.update(now, &self.settings, platform).await),
            None => None,
        };

        let transition = self.ventilation.update(switch, self.outdoor.current_aqi());
        self.effector.apply(transition.state);
        if transition.changed {
            info!(
                "ventilation {} (switch {}): {}",
                transition.state,
                switch,
                transition.reason
            );
        }

        let now = platform.now_ms();
        let logged = self.remote_log(platform, now, switch, &transition).await;
        self.countdown(now);

        CycleReport {
            outdoor,
            indoor,
            switch,
            transition,
            reconnected,
            logged,
        }
    }

    /// Loops cycles until `max_run_time_ms` of uptime, then returns so the
    /// caller can reset the device.
    pub async fn run<T, N, K, W, S>(&mut self, platform: &mut Platform<T, N, K, W>, switch: &mut S)
    where
        T: Transport,
        N: Connectivity,
        K: Clock,
        W: Watchdog,
        S: SwitchInput,
    {
        loop {
            let position = switch.read();
            self.run_cycle(platform, position).await;

            let uptime = platform.now_ms().saturating_sub(self.started_ms);
            if uptime >= self.timing.max_run_time_ms {
                info!("controller: {} ms uptime reached, stopping for restart", uptime);
                return;
            }
            sleep_fed(
                &platform.clock,
                &mut platform.watchdog,
                self.timing.loop_delay_ms,
                self.timing.watchdog_slice_ms,
            )
            .await;
        }
    }

    async fn remote_log<T, N, K, W>(
        &mut self,
        platform: &mut Platform<T, N, K, W>,
        now: u64,
        switch: SwitchPosition,
        transition: &Transition,
    ) -> bool
    where
        T: Transport,
        W: Watchdog,
    {
        let Some((logger, policy)) = self.form.as_mut() else {
            return false;
        };
        if !policy.should_log(now, transition.changed) {
            return false;
        }
        policy.logged(now);

        let record = LogRecord {
            outdoor_aqi: self.outdoor.current_aqi(),
            indoor_aqi: self.indoor.as_ref().and_then(AcquisitionScheduler::current_aqi),
            switch,
            state: transition.state,
            reason: transition.reason,
        };
        platform.watchdog.feed();
        if let Err(e) = logger.submit(&mut platform.transport, &record).await {
            warn!("form log failed: {}", e);
        }
        true
    }

    fn countdown(&mut self, now: u64) {
        let due = self
            .last_countdown_ms
            .map_or(true, |last| now.saturating_sub(last) >= self.timing.countdown_interval_ms);
        if !due {
            return;
        }
        self.last_countdown_ms = Some(now);

        for group in core::iter::once(&self.outdoor).chain(self.indoor.iter()) {
            match group.current_aqi() {
                Some(aqi) => debug!(
                    "{}: AQI {} ({})",
                    group.name(),
                    aqi,
                    Category::from_aqi(aqi).name()
                ),
                None => debug!("{}: no AQI yet", group.name()),
            }
            if let Some(ms) = group.time_until_next_local(now) {
                debug!("{}: next local poll in {} s", group.name(), ms / 1_000);
            }
            if let Some(ms) = group.time_until_next_api(now) {
                debug!("{}: next API poll in {} s", group.name(), ms / 1_000);
            }
        }
    }
}
