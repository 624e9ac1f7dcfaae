use swell::config::ControlSettings;
use swell::kernel::reinforcer::{detect_pulse, detect_pump_activity, reinforce};
use swell::kernel::{DeviceKind, DeviceRecord, SessionState};

fn pump() -> DeviceRecord {
    DeviceRecord {
        device_type: DeviceKind::Pump,
        is_primary_pump: true,
        brand: "kasa".into(),
        address: "192.168.1.40".into(),
        child_id: None,
        label: Some("Pump".into()),
    }
}

fn enabled() -> ControlSettings {
    ControlSettings {
        llm_device_control: true,
        ..ControlSettings::default()
    }
}

#[test]
fn test_narrated_pump_start_gets_tag() {
    let text = "The pump begins to hum as air rushes into the tube.";
    let out = reinforce(text, &[pump()], &SessionState::default(), &enabled());

    assert!(out.reinforced);
    assert!(!out.is_pulse);
    assert_eq!(out.text, format!("{} [pump on]", text));
    assert_eq!(out.matched_phrase.as_deref(), Some("pump begins to hum"));
}

#[test]
fn test_pulse_language_uses_default_pulse_duration() {
    let settings = ControlSettings {
        llm_device_control_pulse_duration: 4,
        ..enabled()
    };
    let text = "She presses the button and the tube throbs with short bursts of air.";
    let out = reinforce(text, &[pump()], &SessionState::default(), &settings);

    assert!(out.reinforced);
    assert!(out.is_pulse);
    assert!(out.text.ends_with(" [pump:pulse:4]"));
}

#[test]
fn test_disabled_feature_is_noop() {
    let text = "The pump begins to hum.";
    let out = reinforce(text, &[pump()], &SessionState::default(), &ControlSettings::default());
    assert!(!out.reinforced);
    assert_eq!(out.text, text);
}

#[test]
fn test_explicit_tag_is_not_doubled() {
    let text = "The pump begins to hum. [pump on]";
    let out = reinforce(text, &[pump()], &SessionState::default(), &enabled());
    assert!(!out.reinforced);
    assert_eq!(out.text, text);

    let pulse = "Air rushes in. [PUMP:PULSE:2]";
    assert!(!reinforce(pulse, &[pump()], &SessionState::default(), &enabled()).reinforced);
}

#[test]
fn test_explicit_off_does_not_block_reinforcement() {
    let text = "[pump off] Then the pump starts again.";
    let out = reinforce(text, &[pump()], &SessionState::default(), &enabled());
    assert!(out.reinforced);
}

#[test]
fn test_running_pump_is_not_retriggered() {
    let mut session = SessionState::default();
    session.record_action(&pump(), "on", false);

    let out = reinforce("Air rushes into the tube.", &[pump()], &session, &enabled());
    assert!(!out.reinforced);

    let mut cycling = SessionState::default();
    cycling.record_action(&pump(), "off", true);
    assert!(!reinforce("Air rushes into the tube.", &[pump()], &cycling, &enabled()).reinforced);
}

#[test]
fn test_plain_prose_is_untouched() {
    let text = "They talk quietly about the weather.";
    assert_eq!(detect_pump_activity(text), None);
    assert!(!reinforce(text, &[pump()], &SessionState::default(), &enabled()).reinforced);
}

#[test]
fn test_pulse_detection_table() {
    assert!(detect_pulse("a rhythmic squeeze"));
    assert!(detect_pulse("waves of pressure"));
    assert!(!detect_pulse("steady flow"));
}
