//! Configuration loading and validation tests for freqformer-common

use freqformer_common::*;
use proptest::prelude::*;
use std::io::Write;

#[test]
fn test_decoder_config_from_json_fills_defaults() {
    let json = r#"{
        "layer": { "d_model": 16, "c_out": 7, "d_ff": 32, "activation": "gelu" },
        "n_heads": 4,
        "num_layers": 3
    }"#;

    let config = DecoderConfig::from_json_str(json).expect("valid config");
    assert_eq!(config.layer.d_model, 16);
    assert_eq!(config.layer.resolved_d_ff(), 32);
    assert_eq!(config.layer.activation().unwrap(), Activation::Gelu);
    assert_eq!(config.layer.series_decomp, 0.1);
    assert!(config.layer.use_apdc);
    assert!(config.final_norm);
    assert!(config.projection);
    assert_eq!(config.num_layers, 3);
}

#[test]
fn test_decoder_config_rejects_unknown_activation() {
    let json = r#"{ "layer": { "d_model": 16, "c_out": 7, "activation": "swish" }, "n_heads": 4 }"#;
    let err = DecoderConfig::from_json_str(json).unwrap_err();
    assert!(matches!(err, FreqformerError::Config(_)));
    assert!(err.to_string().contains("swish"));
}

#[test]
fn test_decoder_config_rejects_indivisible_heads() {
    let json = r#"{ "layer": { "d_model": 16, "c_out": 7 }, "n_heads": 5 }"#;
    assert!(matches!(DecoderConfig::from_json_str(json), Err(FreqformerError::Config(_))));
}

#[test]
fn test_malformed_json_is_serialization_error() {
    let err = DecoderConfig::from_json_str("{ not json").unwrap_err();
    assert!(matches!(err, FreqformerError::Serialization(_)));
}

#[test]
fn test_decoder_config_from_file() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    let config = DecoderConfig::new(DecoderLayerConfig::new(32, 4).with_apdc(false), 4, 2);
    write!(file, "{}", serde_json::to_string(&config).unwrap()).unwrap();

    let loaded = DecoderConfig::from_json_file(file.path()).expect("load");
    assert_eq!(loaded, config);
}

#[test]
fn test_missing_config_file_is_io_error() {
    let err = DecoderConfig::from_json_file("/nonexistent/freqformer.json").unwrap_err();
    assert!(matches!(err, FreqformerError::Io(_)));
}

proptest! {
    #[test]
    fn activation_parsing_never_falls_back(name in "[a-z]{1,10}") {
        let parsed = name.parse::<Activation>();
        match name.as_str() {
            "relu" => prop_assert_eq!(parsed.unwrap(), Activation::Relu),
            "gelu" => prop_assert_eq!(parsed.unwrap(), Activation::Gelu),
            _ => prop_assert!(matches!(parsed, Err(FreqformerError::Config(_)))),
        }
    }

    #[test]
    fn d_ff_defaults_to_four_times_d_model(d_model in 1usize..2048) {
        let config = DecoderLayerConfig::new(d_model, 1);
        prop_assert_eq!(config.resolved_d_ff(), 4 * d_model);
    }
}
