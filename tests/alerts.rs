mod common;

use alert_board_rs::BoardError;
use alert_board_rs::config::{ALERT_COLOR, NORMAL_COLOR};
use alert_board_rs::credentials::Credentials;
use alert_board_rs::state_machine::NetworkState;
use alert_board_rs::wifi::RadioStatus;
use common::{Harness, ScriptedRadio, harness};
use embassy_futures::block_on;
use pretty_assertions::assert_eq;

/// Four pixels: region 0, region 3 twice, region 1
static PIXELS: [u16; 4] = [0, 3, 3, 1];

/// Device booted and associated at t=1, first fetch due at t=10_000
fn connected() -> Harness {
    let mut h = harness(
        Some(Credentials::new("home", "secret")),
        ScriptedRadio::new(RadioStatus::Connected),
        &PIXELS,
    );
    block_on(h.device.step(0));
    block_on(h.device.step(1));
    assert_eq!(
        h.device.state_machine().get_current_state(),
        NetworkState::Connected
    );
    h
}

#[test]
fn fetched_pattern_is_rendered_through_the_pixel_map() {
    let mut h = connected();

    block_on(h.device.step(2));
    assert_eq!(h.strip.last_frame(), Some(vec![NORMAL_COLOR; 4]));
    assert_eq!(h.device.source_mut().requests, 0);

    h.device
        .source_mut()
        .respond("HTTP/1.1 200 OK", r#"{"pattern":"IIIA"}"#);
    block_on(h.device.step(10_000));

    assert_eq!(h.device.source_mut().requests, 1);
    assert!(h.device.state_machine().alert_pattern().is_active(3));
    assert_eq!(h.device.state_machine().alert_pattern().active_count(), 1);
    assert_eq!(
        h.strip.last_frame(),
        Some(vec![NORMAL_COLOR, ALERT_COLOR, ALERT_COLOR, NORMAL_COLOR])
    );
}

#[test]
fn fetches_are_rate_limited() {
    let mut h = connected();

    h.device
        .source_mut()
        .respond("HTTP/1.1 200 OK", r#"{"pattern":"A"}"#);
    block_on(h.device.step(10_000));
    block_on(h.device.step(15_000));
    block_on(h.device.step(19_999));
    assert_eq!(h.device.source_mut().requests, 1);

    h.device
        .source_mut()
        .respond("HTTP/1.1 200 OK", r#"{"pattern":"IA"}"#);
    block_on(h.device.step(20_000));
    assert_eq!(h.device.source_mut().requests, 2);
    assert_eq!(
        h.strip.last_frame(),
        Some(vec![NORMAL_COLOR, NORMAL_COLOR, NORMAL_COLOR, ALERT_COLOR])
    );
}

#[test]
fn failed_fetches_keep_the_previous_pattern() {
    let mut h = connected();

    h.device
        .source_mut()
        .respond("HTTP/1.1 200 OK", r#"{"pattern":"AIIA"}"#);
    block_on(h.device.step(10_000));
    let rendered = h.strip.last_frame();
    assert_eq!(
        rendered,
        Some(vec![ALERT_COLOR, ALERT_COLOR, ALERT_COLOR, NORMAL_COLOR])
    );

    let source = h.device.source_mut();
    source.respond("HTTP/1.1 200 OK", r#"{"status":"ok"}"#);
    source.respond("HTTP/1.1 503 Service Unavailable", r#"{"pattern":"IIII"}"#);
    source.fail(BoardError::HttpError);
    source.respond("HTTP/1.1 200 OK", "<html>maintenance</html>");

    for round in 1..=4 {
        block_on(h.device.step(10_000 + round * 10_000));
        assert_eq!(h.strip.last_frame(), rendered);
    }
    assert_eq!(h.device.source_mut().requests, 5);
    assert_eq!(h.device.state_machine().alert_pattern().active_count(), 2);
}

#[test]
fn short_pattern_only_updates_its_prefix() {
    let mut h = connected();

    h.device
        .source_mut()
        .respond("HTTP/1.1 200 OK", r#"{"pattern":"AAAA"}"#);
    block_on(h.device.step(10_000));
    h.device
        .source_mut()
        .respond("HTTP/1.1 200 OK", r#"{"pattern":"I"}"#);
    block_on(h.device.step(20_000));

    let pattern = h.device.state_machine().alert_pattern();
    assert!(!pattern.is_active(0));
    assert!(pattern.is_active(1));
    assert!(pattern.is_active(3));
}

#[test]
fn lost_link_stops_fetching_and_keeps_the_strip() {
    let mut h = connected();

    h.device
        .source_mut()
        .respond("HTTP/1.1 200 OK", r#"{"pattern":"A"}"#);
    block_on(h.device.step(10_000));
    let frames = h.strip.frame_count();

    h.device.radio_mut().steady = RadioStatus::ConnectionLost;
    block_on(h.device.step(20_000));
    assert_eq!(
        h.device.state_machine().get_current_state(),
        NetworkState::ConnectionLost
    );
    block_on(h.device.step(30_000));
    assert_eq!(h.device.source_mut().requests, 1);
    assert_eq!(h.strip.frame_count(), frames);

    // Back online: no status fill over the alert data, fetching resumes
    h.device.radio_mut().steady = RadioStatus::Connected;
    h.device
        .source_mut()
        .respond("HTTP/1.1 200 OK", r#"{"pattern":"IA"}"#);
    block_on(h.device.step(40_000));
    assert_eq!(
        h.device.state_machine().get_current_state(),
        NetworkState::Connected
    );
    assert_eq!(h.strip.frame_count(), frames);

    block_on(h.device.step(40_100));
    assert_eq!(h.device.source_mut().requests, 2);
    assert_eq!(
        h.strip.last_frame(),
        Some(vec![NORMAL_COLOR, NORMAL_COLOR, NORMAL_COLOR, ALERT_COLOR])
    );
}

#[test]
fn unknown_radio_status_is_reported_as_fault() {
    let mut h = connected();

    h.device.radio_mut().steady = RadioStatus::Unknown;
    block_on(h.device.step(2));
    assert_eq!(
        h.device.state_machine().get_current_state(),
        NetworkState::Fault
    );
    assert_eq!(
        h.device.state_machine().get_previous_state(),
        Some(NetworkState::Connected)
    );
}
