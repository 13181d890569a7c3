use std::path::PathBuf;
use vigilance::{config::parse_override, AnalysisConfig, Band, Error, FragmentPolicy, WindowKind};

fn write_tmp(name: &str, text: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("vigilance_{name}_{}.json", std::process::id()));
    std::fs::write(&path, text).unwrap();
    path
}

#[test]
fn file_then_overrides() {
    let path = write_tmp(
        "layered",
        r#"{
            "epoch_sec": 10,
            "block": 360,
            "window": "blackman-harris",
            "bands": { "theta": [5.0, 9.0] },
            "excluded_tags": ["Art", "Move"]
        }"#,
    );
    let overrides = vec![
        parse_override("block=180").unwrap(),
        parse_override("fragment_policy = truncate").unwrap(),
    ];
    let cfg = AnalysisConfig::layered(Some(&path), &overrides).unwrap();
    assert_eq!(cfg.epoch_sec, 10.0);
    assert_eq!(cfg.block, 180, "explicit override beats the file");
    assert_eq!(cfg.window, WindowKind::BlackmanHarris);
    assert_eq!(cfg.fragment_policy, FragmentPolicy::Truncate);
    assert_eq!(cfg.bands.range(Band::Theta), [5.0, 9.0]);
    assert_eq!(cfg.bands.range(Band::Delta), [0.5, 4.0], "unlisted bands keep defaults");
    assert_eq!(cfg.excluded_tags, vec!["Art", "Move"]);
    assert_eq!(cfg.kernel_sec, 2.0);
}

#[test]
fn unknown_file_key_is_named() {
    let path = write_tmp("unknown", r#"{ "epoch_sec": 4, "epoch_len": 4 }"#);
    match AnalysisConfig::layered(Some(&path), &[]) {
        Err(Error::UnknownKey(k)) => assert_eq!(k, "epoch_len"),
        other => panic!("expected UnknownKey, got {other:?}"),
    }
}

#[test]
fn layered_result_is_validated() {
    let overrides = vec![("kernel_sec".to_string(), "8".to_string())];
    assert!(matches!(
        AnalysisConfig::layered(None, &overrides),
        Err(Error::InvalidParameter { name: "kernel_sec", .. })
    ));
    let overrides = vec![("states".to_string(), "A,B,C,D,E,F,G,H,I,J".to_string())];
    assert!(matches!(
        AnalysisConfig::layered(None, &overrides),
        Err(Error::InvalidParameter { name: "states", .. })
    ));
}

#[test]
fn bad_values_are_rejected() {
    let mut cfg = AnalysisConfig::default();
    assert!(matches!(cfg.apply_override("window", "triangle"), Err(Error::UnknownWindow(_))));
    assert!(matches!(cfg.apply_override("bands.kappa", "1,2"), Err(Error::UnknownBand(_))));
    assert!(cfg.apply_override("bands.alpha", "8").is_err());
    assert!(cfg.apply_override("epoch_sec", "four").is_err());
    assert!(parse_override("no-equals-sign").is_err());
    assert_eq!(cfg, AnalysisConfig::default());
}

#[test]
fn states_and_bins() {
    let cfg = AnalysisConfig { bin_hours: 0.5, ..AnalysisConfig::default() };
    let states = cfg.state_list();
    assert_eq!(states.len(), 3);
    assert_eq!(states[2].name, "REM");
    assert_eq!(states[2].code, 3);
    assert_eq!(cfg.bin_sec(), 1800.0);
}

#[test]
fn config_serialises_back() {
    let cfg = AnalysisConfig { window: WindowKind::Kaiser, kaiser_beta: 6.0, ..AnalysisConfig::default() };
    let text = serde_json::to_string(&cfg).unwrap();
    assert!(text.contains(r#""window":"kaiser""#));
    assert_eq!(AnalysisConfig::from_json_str(&text).unwrap(), cfg);
}
