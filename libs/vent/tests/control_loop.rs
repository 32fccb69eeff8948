use embassy_futures::block_on;

use vent::config::FormLoggerConfig;
use vent::decision::Reason;
use vent::effector::Effector;
use vent::ports::{Clock, Rgb};
use vent::testing::{platform, MockPlatform, RecordingIndicator, RecordingRelays, ScriptedSwitch};
use vent::{Config, Controller, CycleOutcome, SwitchPosition, VentilationState};

const SENSOR: &str = "192.168.1.50";
const API: &str = "api.purpleair.com";
const FORMS: &str = "docs.google.com";

type TestController = Controller<RecordingRelays, RecordingIndicator>;

fn config() -> Config {
    let mut config = Config::default();
    config.outdoor.local_hosts = vec![SENSOR.into()];
    config.outdoor.sensor_ids = vec![1001, 1002];
    config.api.key = "test-key".into();
    config
}

fn controller(config: &Config) -> TestController {
    let effector = Effector::new(RecordingRelays::default(), RecordingIndicator::default());
    Controller::new(config, effector).unwrap()
}

fn sensor_aqi(p: &mut MockPlatform, aqi: u16) {
    p.transport
        .respond_json(SENSOR, 200, &format!(r#"{{"pm2.5_aqi": {aqi}, "pm2.5_aqi_b": {aqi}}}"#));
}

#[test]
fn test_start_and_first_cycle() {
    let mut p = platform();
    sensor_aqi(&mut p, 40);
    let mut c = controller(&config());

    block_on(c.start(&mut p));
    assert_eq!(c.outdoor().current_aqi(), Some(40));
    assert_eq!(p.transport.requests_to(API), 0);

    let report = block_on(c.run_cycle(&mut p, SwitchPosition::Auto));
    assert_eq!(report.outdoor, CycleOutcome::NotDue);
    assert_eq!(report.transition.state, VentilationState::Ventilating);
    assert_eq!(report.transition.reason, Reason::BelowEnable(40));
    assert_eq!(c.effector().relays().energised, [true, true]);
    assert_eq!(c.effector().indicator().last(), Some(Rgb(0, 50, 0)));
}

#[test]
fn test_hysteresis_over_cycles() {
    let mut p = platform();
    sensor_aqi(&mut p, 100);
    let mut c = controller(&config());
    block_on(c.start(&mut p));

    let mut states = vec![block_on(c.run_cycle(&mut p, SwitchPosition::Auto)).transition.state];
    for aqi in [125, 135, 125] {
        sensor_aqi(&mut p, aqi);
        p.clock.advance(60_000);
        let report = block_on(c.run_cycle(&mut p, SwitchPosition::Auto));
        assert!(matches!(report.outdoor, CycleOutcome::Updated(_)));
        states.push(report.transition.state);
    }

    use VentilationState::{Idle, Ventilating};
    assert_eq!(states, [Ventilating, Ventilating, Idle, Idle]);
    assert_eq!(c.effector().relays().energised, [false, false]);
    assert_eq!(c.effector().indicator().last(), Some(Rgb(50, 0, 0)));
}

#[test]
fn test_no_data_fails_open() {
    let mut p = platform();
    p.transport.set_unreachable(SENSOR);
    let mut config = config();
    config.api.key.clear();
    let mut c = controller(&config);

    block_on(c.start(&mut p));
    let report = block_on(c.run_cycle(&mut p, SwitchPosition::Auto));
    assert_eq!(report.transition.state, VentilationState::Ventilating);
    assert_eq!(report.transition.reason, Reason::NoAqiData);
    assert_eq!(c.effector().relays().energised, [true, true]);
}

#[test]
fn test_switch_overrides() {
    let mut p = platform();
    sensor_aqi(&mut p, 400);
    let mut c = controller(&config());
    block_on(c.start(&mut p));

    let report = block_on(c.run_cycle(&mut p, SwitchPosition::ForceOn));
    assert_eq!(report.transition.state, VentilationState::Ventilating);
    assert_eq!(report.transition.reason, Reason::ManualOn);

    let report = block_on(c.run_cycle(&mut p, SwitchPosition::Auto));
    assert_eq!(report.transition.state, VentilationState::Idle);

    let report = block_on(c.run_cycle(&mut p, SwitchPosition::ForceOff));
    assert_eq!(report.transition.reason, Reason::ManualOff);
    assert!(report.transition.changed);
}

#[test]
fn test_falls_back_to_api() {
    let mut p = platform();
    p.transport.set_unreachable(SENSOR);
    p.transport.respond_json(
        API,
        200,
        r#"{"fields": ["sensor_index", "pm2.5_10minute"], "data": [[1001, 150.4], [1002, null]]}"#,
    );
    let mut c = controller(&config());
    block_on(c.start(&mut p));

    assert_eq!(c.outdoor().current_aqi(), Some(200));
    assert!(!c.outdoor().is_local_available());
    let request = p.transport.requests.iter().find(|r| r.host == API).unwrap();
    assert!(request.path.contains("show_only=1001%2C1002"));

    let report = block_on(c.run_cycle(&mut p, SwitchPosition::Auto));
    assert_eq!(report.transition.state, VentilationState::Idle);
}

#[test]
fn test_reconnects_when_link_drops() {
    let mut p = platform();
    sensor_aqi(&mut p, 20);
    let mut c = controller(&config());
    block_on(c.start(&mut p));

    p.connectivity.connected = false;
    p.connectivity.failures_before_connect = 1;
    p.connectivity.begin_calls = 0;
    let report = block_on(c.run_cycle(&mut p, SwitchPosition::Auto));

    assert!(report.reconnected);
    assert_eq!(p.connectivity.begin_calls, 2);
    let history = &c.effector().indicator().history;
    let tail = &history[history.len() - 3..];
    assert_eq!(tail, [Rgb(0, 0, 50), Rgb(50, 50, 0), Rgb(0, 50, 0)]);
}

#[test]
fn test_remote_log_policy() {
    let mut p = platform();
    sensor_aqi(&mut p, 50);
    for _ in 0..3 {
        p.transport.respond_json(FORMS, 302, "");
    }
    let mut config = config();
    config.form_logger = Some(FormLoggerConfig {
        path: "/forms/d/e/test/formResponse".into(),
        ..FormLoggerConfig::default()
    });
    let mut c = controller(&config);
    block_on(c.start(&mut p));

    assert!(block_on(c.run_cycle(&mut p, SwitchPosition::Auto)).logged);
    p.clock.advance(1_000);
    assert!(!block_on(c.run_cycle(&mut p, SwitchPosition::Auto)).logged);
    p.clock.advance(1_000);
    assert!(block_on(c.run_cycle(&mut p, SwitchPosition::ForceOff)).logged);

    assert_eq!(p.transport.requests_to(FORMS), 2);
    let last = p.transport.requests.iter().rev().find(|r| r.host == FORMS).unwrap();
    assert!(last.path.contains("entry.1558449802=OFF"));
    assert!(last.path.contains("entry.589349670=Manual%20OFF"));
    assert!(last.path.contains("entry.1516636704=N%2FA"));
}

#[test]
fn test_run_returns_after_max_run_time() {
    let mut p = platform();
    p.transport.set_unreachable(SENSOR);
    let mut config = config();
    config.timing.max_run_time_ms = 10_000;
    let mut c = controller(&config);
    let mut switch = ScriptedSwitch::fixed(SwitchPosition::Auto);

    block_on(c.start(&mut p));
    block_on(c.run(&mut p, &mut switch));
    assert!(p.clock.now_ms() >= 10_000);
    assert!(p.watchdog.feeds > 100);
}

#[test]
fn test_no_connection_outlives_a_cycle() {
    let mut p = platform();
    sensor_aqi(&mut p, 30);
    p.transport
        .respond_json(SENSOR, 200, "{ truncated")
        .respond_json(SENSOR, 404, "")
        .respond_json(SENSOR, 200, "[]");
    p.transport.respond_json(API, 200, r#"{"fields": []}"#);
    let mut c = controller(&config());
    block_on(c.start(&mut p));

    p.clock.advance(1_200_000);
    let report = block_on(c.run_cycle(&mut p, SwitchPosition::Auto));
    assert_eq!(report.outdoor, CycleOutcome::Failed);
    assert_eq!(c.outdoor().current_aqi(), Some(30));
    assert_eq!(p.transport.requests_to(API), 1);
    assert_eq!(p.transport.open_connections, 0);
    assert_eq!(p.transport.max_open_connections, 1);
}
