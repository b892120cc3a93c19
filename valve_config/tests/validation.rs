//! TOML schema validation against realistic controller configs.

use rstest::rstest;
use valve_config::load_toml;

const FULL: &str = r#"
[[valve]]
name = "intake"
drive_pin = 5
direction_pin = 6
sense_channel = 0
region = 0

[[valve]]
name = "return"
drive_pin = 13
direction_pin = 19
sense_channel = 1
region = 1

[store]
path = "/var/lib/valves/state.bin"

[tick]
period_ms = 25

[logging]
level = "debug"
"#;

#[test]
fn full_config_parses_and_validates() {
    let cfg = load_toml(FULL).expect("parse");
    cfg.validate().expect("valid");
    assert_eq!(cfg.valves.len(), 2);
    assert_eq!(cfg.valves[0].name.as_deref(), Some("intake"));
    assert_eq!(cfg.valves[1].region, 1);
    assert_eq!(cfg.tick.period_ms, 25);
}

#[test]
fn no_valves_is_rejected() {
    let cfg = load_toml("[tick]\nperiod_ms = 20\n").expect("parse");
    assert!(cfg.validate().is_err());
}

#[test]
fn duplicate_regions_are_rejected() {
    let cfg = load_toml(
        r#"
        [[valve]]
        drive_pin = 5
        direction_pin = 6
        sense_channel = 0
        region = 2

        [[valve]]
        drive_pin = 13
        direction_pin = 19
        sense_channel = 1
        region = 2
        "#,
    )
    .expect("parse");
    let err = cfg.validate().expect_err("shared region");
    assert!(err.to_string().contains("region"));
}

#[test]
fn shared_gpio_pins_across_valves_are_rejected() {
    let cfg = load_toml(
        r#"
        [[valve]]
        drive_pin = 5
        direction_pin = 6
        sense_channel = 0
        region = 0

        [[valve]]
        drive_pin = 13
        direction_pin = 5
        sense_channel = 1
        region = 1
        "#,
    )
    .expect("parse");
    let err = cfg.validate().expect_err("shared pin");
    assert!(err.to_string().contains("pin"));
}

#[rstest]
#[case(8, "sense_channel")]
#[case(200, "sense_channel")]
fn out_of_range_sense_channel(#[case] channel: u8, #[case] needle: &str) {
    let toml = format!(
        r#"
        [[valve]]
        drive_pin = 5
        direction_pin = 6
        sense_channel = {channel}
        region = 0
        "#
    );
    let cfg = load_toml(&toml).expect("parse");
    let err = cfg.validate().expect_err("bad channel");
    assert!(err.to_string().contains(needle));
}

#[test]
fn five_valves_exceed_addressable_targets() {
    let mut toml = String::new();
    for i in 0..5u8 {
        toml.push_str(&format!(
            "[[valve]]\ndrive_pin = {}\ndirection_pin = {}\nsense_channel = {}\nregion = {}\n",
            10 + i * 2,
            11 + i * 2,
            i % 8,
            i % 4,
        ));
    }
    let cfg = load_toml(&toml).expect("parse");
    assert!(cfg.validate().is_err());
}
