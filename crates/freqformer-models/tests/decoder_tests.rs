//! Decoder stack tests: layer chaining and trend accumulation

use candle_core::{DType, Device, Tensor};
use candle_nn::{VarBuilder, VarMap};
use freqformer_common::{DecoderConfig, DecoderLayerConfig, FreqformerError};
use freqformer_models::{Decoder, DecoderLayer, SeasonalHead};
use freqformer_ops::SeasonalLayerNorm;

const D_MODEL: usize = 16;
const C_OUT: usize = 7;

fn layer_config() -> DecoderLayerConfig {
    DecoderLayerConfig::new(D_MODEL, C_OUT).with_d_ff(32)
}

fn build_layers(varmap: &VarMap, count: usize) -> freqformer_common::Result<Vec<DecoderLayer>> {
    let vb = VarBuilder::from_varmap(varmap, DType::F32, &Device::Cpu);
    (0..count)
        .map(|i| DecoderLayer::from_config(layer_config(), 4, vb.pp(format!("layers.{i}"))))
        .collect()
}

fn inputs() -> candle_core::Result<(Tensor, Tensor)> {
    let x = Tensor::randn(0f32, 1.0, (2, 10, D_MODEL), &Device::Cpu)?;
    let cross = Tensor::randn(0f32, 1.0, (2, 12, D_MODEL), &Device::Cpu)?;
    Ok((x, cross))
}

fn max_abs_diff(a: &Tensor, b: &Tensor) -> anyhow::Result<f32> {
    Ok((a - b)?.abs()?.flatten_all()?.max(0)?.to_vec0::<f32>()?)
}

#[test]
fn test_trend_is_sum_of_chained_layer_trends() -> anyhow::Result<()> {
    let varmap = VarMap::new();
    let decoder = Decoder::new(build_layers(&varmap, 3)?, None, None)?;
    // Same variables, driven by hand.
    let manual = build_layers(&varmap, 3)?;
    let (x, cross) = inputs()?;

    let (x_out, trend_out) = decoder.forward(&x, &cross, None, None, None)?;

    let mut state = x.clone();
    let mut expected_trend: Option<Tensor> = None;
    for layer in &manual {
        let (next, residual) = layer.forward(&state, &cross, None, None)?;
        expected_trend = Some(match expected_trend {
            Some(acc) => (acc + residual)?,
            None => residual,
        });
        state = next;
    }
    let expected_trend = expected_trend.expect("three layers");

    assert_eq!(trend_out.dims(), &[2, 10, C_OUT]);
    assert!(max_abs_diff(&trend_out, &expected_trend)? < 1e-5);
    assert!(max_abs_diff(&x_out, &state)? < 1e-5);

    // Recomputing every layer on the original input gives a different sum.
    let mut independent = manual[0].forward(&x, &cross, None, None)?.1;
    for layer in &manual[1..] {
        independent = (independent + layer.forward(&x, &cross, None, None)?.1)?;
    }
    assert!(max_abs_diff(&trend_out, &independent)? > 1e-4);
    Ok(())
}

#[test]
fn test_zero_initial_trend_matches_none() -> anyhow::Result<()> {
    let varmap = VarMap::new();
    let decoder = Decoder::new(build_layers(&varmap, 2)?, None, None)?;
    let (x, cross) = inputs()?;

    let (_, from_none) = decoder.forward(&x, &cross, None, None, None)?;
    let zeros = Tensor::zeros((2, 10, C_OUT), DType::F32, &Device::Cpu)?;
    let (_, from_zeros) = decoder.forward(&x, &cross, None, None, Some(&zeros))?;
    assert!(max_abs_diff(&from_none, &from_zeros)? < 1e-6);

    let offset = Tensor::ones((2, 10, C_OUT), DType::F32, &Device::Cpu)?;
    let (_, from_ones) = decoder.forward(&x, &cross, None, None, Some(&offset))?;
    assert!(max_abs_diff(&(from_none + 1.0)?, &from_ones)? < 1e-5);
    Ok(())
}

#[test]
fn test_initial_trend_with_wrong_shape_is_rejected() -> anyhow::Result<()> {
    let varmap = VarMap::new();
    let decoder = Decoder::new(build_layers(&varmap, 1)?, None, None)?;
    let (x, cross) = inputs()?;
    let bad = Tensor::zeros((2, 10, D_MODEL), DType::F32, &Device::Cpu)?;
    assert!(matches!(
        decoder.forward(&x, &cross, None, None, Some(&bad)),
        Err(FreqformerError::ShapeMismatch { .. })
    ));
    Ok(())
}

#[test]
fn test_final_stages_touch_only_the_seasonal_state() -> anyhow::Result<()> {
    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
    let bare = Decoder::new(build_layers(&varmap, 2)?, None, None)?;

    let norm = SeasonalLayerNorm::new(D_MODEL, 1e-5, vb.pp("norm"))?;
    let projection = candle_nn::linear(D_MODEL, C_OUT, vb.pp("projection"))?;
    let headed = Decoder::new(
        build_layers(&varmap, 2)?,
        Some(Box::new(norm) as SeasonalHead),
        Some(Box::new(projection) as SeasonalHead),
    )?;

    let (x, cross) = inputs()?;
    let (bare_x, bare_trend) = bare.forward(&x, &cross, None, None, None)?;
    let (head_x, head_trend) = headed.forward(&x, &cross, None, None, None)?;

    assert_eq!(bare_x.dims(), &[2, 10, D_MODEL]);
    assert_eq!(head_x.dims(), &[2, 10, C_OUT]);
    assert!(max_abs_diff(&bare_trend, &head_trend)? < 1e-7);
    Ok(())
}

#[test]
fn test_empty_decoder_is_rejected() {
    assert!(matches!(Decoder::new(Vec::new(), None, None), Err(FreqformerError::Config(_))));
}

#[test]
fn test_from_config_builds_full_stack() -> anyhow::Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
    let config = DecoderConfig::new(layer_config().with_activation("gelu"), 4, 2);
    let decoder = Decoder::from_config(config, vb)?;
    assert_eq!(decoder.len(), 2);
    assert!(decoder.layers().iter().all(|l| l.denoise_enabled()));

    let (x, cross) = inputs()?;
    let (x_out, trend) = decoder.forward(&x, &cross, None, None, None)?;
    assert_eq!(x_out.dims(), &[2, 10, C_OUT]);
    assert_eq!(trend.dims(), &[2, 10, C_OUT]);

    let data = varmap.data().lock().unwrap();
    assert!(data.contains_key("layers.0.self_attention.q_proj.weight"));
    assert!(data.contains_key("layers.1.cross_attention.o_proj.weight"));
    assert!(data.contains_key("norm.weight"));
    assert!(data.contains_key("projection.weight"));
    Ok(())
}

#[test]
fn test_from_config_without_final_stages_keeps_d_model() -> anyhow::Result<()> {
    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
    let mut config = DecoderConfig::new(layer_config().with_apdc(false), 4, 1);
    config.final_norm = false;
    config.projection = false;
    let decoder = Decoder::from_config(config, vb)?;

    let (x, cross) = inputs()?;
    let (x_out, _) = decoder.forward(&x, &cross, None, None, None)?;
    assert_eq!(x_out.dims(), &[2, 10, D_MODEL]);
    Ok(())
}

#[test]
fn test_from_config_validates() {
    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
    let config = DecoderConfig::new(layer_config().with_activation("swish"), 4, 2);
    assert!(matches!(Decoder::from_config(config, vb), Err(FreqformerError::Config(_))));
}
