#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use palaver_relay::config;

#[test]
fn ok_minimal_config() {
    let ok = r#"
version: 1
"#;
    let cfg = config::load_from_str(ok).expect("must parse");
    assert_eq!(cfg.version, 1);
    // Defaults applied.
    assert_eq!(cfg.bounce.dedup_retention_secs, 600);
    assert_eq!(cfg.bounce.dedup_max_entries, 4096);
    assert_eq!(cfg.distant.handshake_timeout_secs, 30);
    assert_eq!(cfg.relay.outbound_queue, 256);
}

#[test]
fn deny_unknown_fields_nested() {
    let bad = r#"
version: 1
bounce:
  dedup_retention_sec: 600 # typo should fail
"#;
    let err = config::load_from_str(bad).expect_err("must fail");
    assert_eq!(err.code().as_str(), "CONFIG");
}

#[test]
fn unsupported_version_is_rejected() {
    let bad = r#"
version: 2
"#;
    let err = config::load_from_str(bad).expect_err("must fail");
    assert_eq!(err.code().as_str(), "CONFIG");
}

#[test]
fn retention_below_floor_is_rejected() {
    // A tiny dedup window reopens the rebroadcast loop.
    let bad = r#"
version: 1
bounce:
  dedup_retention_secs: 5
"#;
    let err = config::load_from_str(bad).expect_err("must fail");
    assert_eq!(err.code().as_str(), "CONFIG");
}

#[test]
fn cache_cap_above_ceiling_is_rejected() {
    let bad = r#"
version: 1
bounce:
  dedup_max_entries: 10000000
"#;
    let err = config::load_from_str(bad).expect_err("must fail");
    assert_eq!(err.code().as_str(), "CONFIG");
}

#[test]
fn handshake_timeout_bounds_are_enforced() {
    let bad = r#"
version: 1
distant:
  handshake_timeout_secs: 0
"#;
    assert!(config::load_from_str(bad).is_err());

    let ok = r#"
version: 1
distant:
  handshake_timeout_secs: 120
"#;
    let cfg = config::load_from_str(ok).unwrap();
    assert_eq!(cfg.distant.handshake_timeout_secs, 120);
}
