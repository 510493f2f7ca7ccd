use std::path::PathBuf;

use burn::{
    backend::{autodiff::checkpoint::strategy::BalancedCheckpointing, Autodiff, NdArray},
    module::Module,
    prelude::*,
    record::{BinBytesRecorder, FullPrecisionSettings, Recorder},
    tensor::{Distribution, Tolerance},
};

use crate::{
    error::AmdNetError,
    init::{InitConfig, LayerInitConfig},
    models::{modules::NormLayer, AmdNet},
    weights, AmdNetConfig, FusionAttention, NormConfig, SeLayerConfig, UpsampleMode,
};

pub type TestBackend = NdArray<f32>;

pub type TestAutodiffBackend = Autodiff<TestBackend>;

pub type TestCheckpointingBackend = Autodiff<TestBackend, BalancedCheckpointing>;

/// A narrow backbone with `num_stages` stages and the default per-stage settings.
fn small_config(num_stages: usize) -> AmdNetConfig {
    AmdNetConfig::new()
        .with_base_channels(4)
        .with_num_stages(num_stages)
        .with_strides(vec![1; num_stages])
        .with_enc_num_convs(vec![2; num_stages])
        .with_dec_num_convs(vec![2; num_stages - 1])
        .with_downsamples(vec![true; num_stages - 1])
        .with_enc_dilations(vec![1; num_stages])
        .with_dec_dilations(vec![1; num_stages - 1])
}

fn output_shapes<B: Backend>(outs: &[Tensor<B, 4>]) -> Vec<[usize; 4]> {
    outs.iter().map(Tensor::dims).collect()
}

fn total<B: Backend>(outs: Vec<Tensor<B, 4>>) -> Tensor<B, 1> {
    outs.into_iter()
        .map(Tensor::sum)
        .reduce(|acc, x| acc + x)
        .expect("at least one output")
}

fn batch_norm_stats<B: Backend>(model: &AmdNet<B>) -> Vec<(Vec<f32>, Vec<f32>)> {
    model
        .conv_modules()
        .into_iter()
        .filter_map(|module| match &module.norm {
            Some(NormLayer::Batch(bn)) => Some((
                bn.running_mean.value().into_data().to_vec::<f32>().unwrap(),
                bn.running_var.value().into_data().to_vec::<f32>().unwrap(),
            )),
            _ => None,
        })
        .collect()
}

#[test]
fn test_block_counts_and_widths() {
    let device = Default::default();
    let config = AmdNetConfig::new().with_base_channels(8);
    let model = config.init::<TestBackend>(&device).unwrap();

    assert_eq!(model.encoder.len(), 5);
    assert_eq!(model.num_fusion_blocks(), 4);
    assert_eq!(model.num_decoder_blocks(), 4);

    let channels = [8, 16, 32, 64, 128];
    let encoder_in = [3, 8, 16, 32, 64];
    for (i, block) in model.encoder.iter().enumerate() {
        assert_eq!(
            block.convs[0].conv.weight.dims(),
            [channels[i], encoder_in[i], 3, 3]
        );
    }
    for (k, block) in model.fusion.iter().enumerate() {
        let fused: usize = channels[..=k].iter().sum();
        assert_eq!(block.num_sources(), k + 1);
        assert_eq!(block.project.conv.weight.dims(), [channels[k], fused, 1, 1]);
    }
    for (i, block) in model.decoder.iter().enumerate() {
        assert_eq!(
            block.convs[0].conv.weight.dims(),
            [channels[i], channels[i] + channels[i + 1], 3, 3]
        );
        assert_eq!(block.convs[1].conv.weight.dims(), [channels[i], channels[i], 3, 3]);
    }
}

#[test]
fn test_output_widths_coarse_to_fine() {
    let device = Default::default();
    let model = small_config(5).init::<TestBackend>(&device).unwrap();
    let x = Tensor::<TestBackend, 4>::random([1, 3, 32, 32], Distribution::Default, &device);

    let outs = model.forward(x).unwrap();
    assert_eq!(
        output_shapes(&outs),
        vec![
            [1, 64, 2, 2],
            [1, 32, 4, 4],
            [1, 16, 8, 8],
            [1, 8, 16, 16],
            [1, 4, 32, 32],
        ]
    );
}

#[test]
fn test_reference_scenario() {
    let device = Default::default();
    let model = AmdNetConfig::new().init::<TestBackend>(&device).unwrap();
    let x = Tensor::<TestBackend, 4>::random([2, 3, 64, 64], Distribution::Default, &device);

    let outs = model.forward(x).unwrap();
    assert_eq!(
        output_shapes(&outs),
        vec![
            [2, 1024, 4, 4],
            [2, 512, 8, 8],
            [2, 256, 16, 16],
            [2, 128, 32, 32],
            [2, 64, 64, 64],
        ]
    );
}

#[test]
fn test_indivisible_input_is_rejected() {
    let device = Default::default();
    let model = small_config(5).init::<TestBackend>(&device).unwrap();
    let x = Tensor::<TestBackend, 4>::zeros([1, 3, 30, 32], &device);

    match model.forward(x) {
        Err(AmdNetError::IndivisibleInput {
            height,
            width,
            rate,
            ..
        }) => {
            assert_eq!((height, width), (30, 32));
            assert_eq!(rate, 16);
        }
        other => panic!("Expected IndivisibleInput error, got {other:?}"),
    }
}

#[test]
fn test_wrong_channel_count_is_rejected() {
    let device = Default::default();
    let model = small_config(3).init::<TestBackend>(&device).unwrap();
    let x = Tensor::<TestBackend, 4>::zeros([1, 1, 16, 16], &device);

    assert!(matches!(model.forward(x), Err(AmdNetError::InvalidTensorShape { .. })));
}

#[test]
fn test_single_stage_returns_encoder_output() {
    let device = Default::default();
    let model = small_config(1).init::<TestBackend>(&device).unwrap();
    let x = Tensor::<TestBackend, 4>::zeros([1, 3, 7, 5], &device);

    let outs = model.forward(x).unwrap();
    assert_eq!(output_shapes(&outs), vec![[1, 4, 7, 5]]);
}

#[test]
fn test_strided_stage() {
    let device = Default::default();
    let model = small_config(4)
        .with_strides(vec![1, 1, 2, 1])
        .init::<TestBackend>(&device)
        .unwrap();
    let x = Tensor::<TestBackend, 4>::random([1, 3, 16, 16], Distribution::Default, &device);

    let outs = model.forward(x).unwrap();
    assert_eq!(
        output_shapes(&outs),
        vec![[1, 32, 2, 2], [1, 16, 4, 4], [1, 8, 8, 8], [1, 4, 16, 16]]
    );
}

#[test]
fn test_disabled_downsample_keeps_resolution() {
    let device = Default::default();
    let model = small_config(3)
        .with_downsamples(vec![true, false])
        .init::<TestBackend>(&device)
        .unwrap();
    assert_eq!(model.geometry().whole_downsample_rate, 2);

    let x = Tensor::<TestBackend, 4>::random([1, 3, 6, 6], Distribution::Default, &device);
    let outs = model.forward(x).unwrap();
    assert_eq!(
        output_shapes(&outs),
        vec![[1, 16, 3, 3], [1, 8, 3, 3], [1, 4, 6, 6]]
    );
}

#[test]
fn test_attention_variants() {
    let device = Default::default();
    for attention in [
        FusionAttention::SqueezeExcitation(SeLayerConfig::new()),
        FusionAttention::None,
    ] {
        let model = small_config(3)
            .with_attention(attention)
            .init::<TestBackend>(&device)
            .unwrap();
        let x = Tensor::<TestBackend, 4>::random([1, 3, 8, 8], Distribution::Default, &device);

        let outs = model.forward(x).unwrap();
        assert_eq!(
            output_shapes(&outs),
            vec![[1, 16, 2, 2], [1, 8, 4, 4], [1, 4, 8, 8]]
        );
    }
}

#[test]
fn test_group_norm_backbone() {
    let device = Default::default();
    let model = small_config(3)
        .with_norm(NormConfig::Group(2))
        .init::<TestBackend>(&device)
        .unwrap();
    assert!(batch_norm_stats(&model).is_empty());

    let x = Tensor::<TestBackend, 4>::random([2, 3, 8, 8], Distribution::Default, &device);
    assert_eq!(model.forward(x).unwrap().len(), 3);
}

#[test]
fn test_norm_eval_freezes_running_stats() {
    let device = Default::default();
    let model = small_config(3)
        .with_upsample(UpsampleMode::Nearest)
        .with_norm_eval(true)
        .init::<TestAutodiffBackend>(&device)
        .unwrap()
        .train(true);
    assert!(model.is_training());
    assert!(model.conv_modules().iter().all(|m| m.frozen_stats()));

    let before = batch_norm_stats(&model);
    let x = Tensor::<TestAutodiffBackend, 4>::random(
        [2, 3, 8, 8],
        Distribution::Normal(2.0, 3.0),
        &device,
    );
    let grads = total(model.forward(x).unwrap()).backward();

    assert_eq!(batch_norm_stats(&model), before);
    for module in model.conv_modules() {
        assert!(module.conv.weight.grad(&grads).is_some());
        if let Some(NormLayer::Batch(bn)) = &module.norm {
            assert!(bn.gamma.grad(&grads).is_some());
            assert!(bn.beta.grad(&grads).is_some());
        }
    }
}

#[test]
fn test_training_updates_running_stats() {
    let device = Default::default();
    let model = small_config(3)
        .with_upsample(UpsampleMode::Nearest)
        .init::<TestAutodiffBackend>(&device)
        .unwrap()
        .train(true);
    assert!(model.conv_modules().iter().all(|m| !m.frozen_stats()));

    let before = batch_norm_stats(&model);
    let x = Tensor::<TestAutodiffBackend, 4>::random(
        [2, 3, 8, 8],
        Distribution::Normal(2.0, 3.0),
        &device,
    );
    let _ = model.forward(x).unwrap();

    assert_ne!(batch_norm_stats(&model), before);
}

#[test]
fn test_eval_mode_freezes_every_norm() {
    let device = Default::default();
    let model = small_config(2).init::<TestBackend>(&device).unwrap();
    assert!(model.conv_modules().iter().all(|m| !m.frozen_stats()));

    let model = model.train(false);
    assert!(!model.is_training());
    assert!(model.conv_modules().iter().all(|m| m.frozen_stats()));

    let model = model.train(true);
    assert!(model.conv_modules().iter().all(|m| !m.frozen_stats()));
}

#[test]
fn test_checkpointing_backend_matches_default_gradients() {
    let device = Default::default();
    let config = small_config(3)
        .with_with_cp(true)
        .with_upsample(UpsampleMode::Nearest);
    let recorder = BinBytesRecorder::<FullPrecisionSettings>::default();

    let model = config.init::<TestAutodiffBackend>(&device).unwrap();
    let bytes =
        Recorder::<TestAutodiffBackend>::record(&recorder, model.clone().into_record(), ())
            .unwrap();
    let record = Recorder::<TestCheckpointingBackend>::load(&recorder, bytes, &device).unwrap();
    let checkpointed = config
        .init::<TestCheckpointingBackend>(&device)
        .unwrap()
        .load_record(record);

    let input = Tensor::<TestBackend, 4>::random([1, 3, 8, 8], Distribution::Default, &device);
    let x = Tensor::<TestAutodiffBackend, 4>::from_inner(input.clone()).require_grad();
    let x_cp = Tensor::<TestCheckpointingBackend, 4>::from_inner(input).require_grad();

    let grads = total(model.forward(x.clone()).unwrap()).backward();
    let grads_cp = total(checkpointed.forward(x_cp.clone()).unwrap()).backward();

    let tolerance = Tolerance::rel_abs(1e-5, 1e-6);
    x.grad(&grads)
        .unwrap()
        .into_data()
        .assert_approx_eq::<f32>(&x_cp.grad(&grads_cp).unwrap().into_data(), tolerance);

    let weights = model.conv_modules();
    let weights_cp = checkpointed.conv_modules();
    assert_eq!(weights.len(), weights_cp.len());
    for (plain, cp) in weights.iter().zip(&weights_cp) {
        let expected = cp.conv.weight.grad(&grads_cp).unwrap().into_data();
        plain
            .conv
            .weight
            .grad(&grads)
            .unwrap()
            .into_data()
            .assert_approx_eq::<f32>(&expected, tolerance);
    }
}

#[test]
fn test_conflicting_initialization() {
    let device = Default::default();
    let result = small_config(2)
        .with_pretrained(Some("weights.mpk".to_owned()))
        .with_init(Some(InitConfig::Layers(LayerInitConfig::new())))
        .init::<TestBackend>(&device);

    assert!(matches!(result, Err(AmdNetError::ConflictingInitialization)));
}

#[test]
fn test_unsupported_weight_format() {
    let device = Default::default();
    let result = small_config(2)
        .with_init(Some(InitConfig::Pretrained(PathBuf::from("weights.onnx"))))
        .init::<TestBackend>(&device);

    match result {
        Err(AmdNetError::UnsupportedWeightFormat { format }) => assert_eq!(format, "onnx"),
        other => panic!("Expected UnsupportedWeightFormat error, got {other:?}"),
    }
}

#[test]
fn test_missing_checkpoint() {
    let device = Default::default();
    let result = small_config(2)
        .with_pretrained(Some("does-not-exist/weights.mpk".to_owned()))
        .init::<TestBackend>(&device);

    assert!(matches!(result, Err(AmdNetError::WeightLoadingFailed { .. })));
}

#[test]
fn test_pretrained_checkpoint_is_loaded() {
    let device = Default::default();
    let path = std::env::temp_dir().join(format!("amdnet-checkpoint-{}.mpk", std::process::id()));

    let trained = small_config(2).init::<TestBackend>(&device).unwrap();
    let expected = trained.encoder[0].convs[0].conv.weight.val();
    weights::save_checkpoint(trained.clone(), &path).unwrap();

    let loaded = small_config(2)
        .with_init(Some(InitConfig::Pretrained(path.clone())))
        .init::<TestBackend>(&device)
        .unwrap();
    std::fs::remove_file(&path).ok();

    loaded.encoder[0].convs[0]
        .conv
        .weight
        .val()
        .into_data()
        .assert_eq(&expected.into_data(), true);
    assert_eq!(loaded.num_params(), trained.num_params());
}

#[test]
fn test_config_json_round_trip() {
    let config = small_config(3)
        .with_attention(FusionAttention::None)
        .with_norm(NormConfig::Group(2));

    let parsed = AmdNetConfig::from_json(&config.to_string()).unwrap();
    assert_eq!(parsed.num_stages, 3);
    assert_eq!(parsed.norm, NormConfig::Group(2));
    assert!(matches!(parsed.attention, FusionAttention::None));
}
