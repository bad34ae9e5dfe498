use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use ndarray::Array2;

use intent_feedback::acquisition::{Board, SyntheticBoard, SyntheticConfig};
use intent_feedback::feedback::ConfidenceCell;
use intent_feedback::live::{confidence_of, ConfidenceSource, LiveConfig, LiveInference};
use intent_feedback::model::bundle::{InferenceModel, ModelArtifactBundle};
use intent_feedback::model::classifier::ClassifierConfig;
use intent_feedback::model::codec::{BASELINE, INTENT};
use intent_feedback::recording::Recording;
use intent_feedback::training::{TrainingConfig, TrainingOrchestrator, TrainingOutcome};
use intent_feedback::utils::log::Logger;

fn manual_board() -> SyntheticBoard {
    SyntheticBoard::new(SyntheticConfig {
        wall_clock: false,
        ..SyntheticConfig::default()
    })
    .unwrap()
}

fn small_training() -> TrainingConfig {
    TrainingConfig {
        classifier: ClassifierConfig {
            recurrent_units: vec![16],
            dense_units: vec![8],
            ..ClassifierConfig::default()
        },
        epochs: 5,
        batch_size: 16,
        ..TrainingConfig::default()
    }
}

fn train_small(recording: &Recording) -> TrainingOutcome {
    TrainingOrchestrator::new(small_training(), Logger::console_only())
        .unwrap()
        .run(recording)
        .unwrap()
}

#[test]
fn three_and_three_trials_train_to_a_usable_bundle() {
    let recording = manual_board().simulate_recording(3, 3, 2.0).unwrap();
    let outcome = train_small(&recording);
    let bundle = &outcome.bundle;

    assert_eq!(bundle.label_codec.classes(), &[BASELINE.to_string(), INTENT.to_string()]);
    assert_eq!(outcome.history.epochs.len(), 5);

    // reducer output feeds the classifier directly
    let width = bundle.feature_reducer.n_components();
    assert!(width >= 1);
    assert!(width <= bundle.feature_standardizer.input_dim());
    assert_eq!(bundle.classifier.input_dim(), width);
    let probabilities = bundle
        .classifier
        .predict_sequence(Array2::zeros((1, width)).view())
        .unwrap();
    assert!((probabilities.sum() - 1.0).abs() < 1e-5);

    // 6 trials of 500 samples, 250-sample windows with stride 18: 14 windows each
    let sequences: usize = outcome.report.per_class.iter().map(|c| c.support).sum();
    assert_eq!(sequences, (84.0f64 * 0.25).ceil() as usize);
}

#[test]
fn bundle_round_trip_is_bit_exact() {
    let recording = manual_board().simulate_recording(3, 3, 2.0).unwrap();
    let outcome = train_small(&recording);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("bundle.json");
    outcome.bundle.save(&path).unwrap();
    let loaded = ModelArtifactBundle::load(&path).unwrap();
    assert_eq!(loaded, outcome.bundle);

    // both copies classify a fresh window identically
    let mut board = manual_board();
    board.advance(400);
    board.prepare().unwrap();
    let window = board
        .current_board_data(250)
        .unwrap()
        .select(ndarray::Axis(0), &board.descriptor().eeg_channels);

    let mut a = InferenceModel::from_bundle(outcome.bundle).unwrap();
    let mut b = InferenceModel::from_bundle(loaded).unwrap();
    let pa = a.infer(window.clone()).unwrap();
    let pb = b.infer(window).unwrap();
    assert_eq!(pa, pb);

    // confidence is the winning class probability of the returned distribution
    let (best, best_p) = pa
        .probabilities
        .iter()
        .copied()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |acc, (i, p)| if p > acc.1 { (i, p) } else { acc });
    assert_eq!(pa.class_index, best);
    assert_eq!(pa.confidence, best_p);
    assert_eq!(pa.label, a.codec().classes()[best]);

    let intent = a.codec().encode(INTENT).unwrap();
    assert_eq!(
        confidence_of(&pa, ConfidenceSource::IntentProbability, Some(intent)),
        pa.probabilities[intent]
    );
    assert_eq!(confidence_of(&pa, ConfidenceSource::MaxProbability, Some(intent)), best_p);
}

#[test]
fn training_is_reproducible() {
    let recording = manual_board().simulate_recording(2, 2, 2.0).unwrap();
    let a = train_small(&recording);
    let b = train_small(&recording);
    assert_eq!(a.bundle, b.bundle);
}

#[test]
fn live_inference_backs_off_then_writes_confidence() {
    let recording = manual_board().simulate_recording(3, 3, 2.0).unwrap();
    let bundle = train_small(&recording).bundle;
    let model = InferenceModel::from_bundle(bundle).unwrap();

    let board = Box::new(SyntheticBoard::new(SyntheticConfig::default()).unwrap());
    let target = Arc::new(ConfidenceCell::new(0.0));
    let live = LiveInference::spawn(
        board,
        model,
        Arc::clone(&target),
        LiveConfig::default(),
        Logger::console_only(),
    )
    .unwrap();

    // one second of stream must accumulate before the first window exists
    let deadline = Instant::now() + Duration::from_secs(10);
    while target.load() == 0.0 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(20));
    }
    let stats = live.stop().unwrap();

    assert!(stats.predictions >= 1);
    assert!(stats.retries >= 1);
    // the cell holds exactly what the last prediction reported
    let last = stats.last.unwrap();
    assert_eq!(target.load(), last.confidence);
    assert_eq!(last.confidence, last.probabilities[last.class_index]);
}
