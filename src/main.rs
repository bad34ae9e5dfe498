use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;

use colored::Colorize;

use intent_feedback::acquisition::{Board, SyntheticBoard, SYNTHETIC_BOARD};
use intent_feedback::config::{load_config, save_config, BoardConfig, Config};
use intent_feedback::feedback::{ConfidenceCell, FeedbackConfig, FrameSlot, ManualOverride, Pixelator, RenderLoop};
use intent_feedback::live::LiveInference;
use intent_feedback::model::bundle::{InferenceModel, ModelArtifactBundle};
use intent_feedback::recording::{ConsolePrompt, ConsoleStimulus, ImageStimulus, Recorder, Recording};
use intent_feedback::training::TrainingOrchestrator;
use intent_feedback::utils::log::Logger;
use intent_feedback::visualization::{CueWindow, FeedbackWindow};
use intent_feedback::{PipelineError, Result};

const USAGE: &str =
    "usage: intent-feedback <record|train|live|demo> [config.yaml]\n       intent-feedback init-config [config.yaml] [board_id]";

fn main() {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        println!("{}", USAGE);
        return;
    }
    let config_path = args.get(2).map(PathBuf::from);

    let outcome = match args[1].as_str() {
        "init-config" => init_config(config_path.as_deref(), args.get(3).map(String::as_str)),
        command => match config(config_path.as_deref()) {
            Ok(config) => match command {
                "record" => record(&config),
                "train" => train(&config),
                "live" => live(&config),
                "demo" => demo(config),
                _ => {
                    println!("Invalid argument. {}", USAGE);
                    Ok(())
                }
            },
            Err(e) => Err(e),
        },
    };

    if let Err(e) = outcome {
        eprintln!("{} {}", "error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(p) => load_config(p),
        None => Ok(Config::default()),
    }
}

fn init_config(path: Option<&Path>, board_id: Option<&str>) -> Result<()> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let board_id = match board_id {
        Some(raw) => raw
            .parse::<i32>()
            .map_err(|_| PipelineError::invalid("config", format!("board id {:?} is not an integer", raw)))?,
        None => SYNTHETIC_BOARD,
    };
    save_config(&Config::for_board(board_id)?, path)?;
    println!("wrote default configuration to {}", path.display());
    Ok(())
}

fn open_board(config: &BoardConfig) -> Result<Box<dyn Board>> {
    match config.board_id {
        SYNTHETIC_BOARD => Ok(Box::new(SyntheticBoard::new(config.synthetic.clone())?)),
        other => Err(PipelineError::acquisition(
            "prepare",
            format!("no driver for board id {}; only the synthetic board is built in", other),
        )),
    }
}

fn record(config: &Config) -> Result<()> {
    let logger = Logger::new(config.logging.clone());
    let mut board = open_board(&config.board)?;
    let recorder = Recorder::new(config.recorder.clone(), logger.clone())?;
    let recording = if config.visualization.enabled {
        let mut stimulus = ImageStimulus::from_config(&config.recorder)?;
        let view = stimulus.view();
        let session = {
            let view = view.clone();
            thread::spawn(move || {
                let outcome = recorder.record(board.as_mut(), &mut stimulus, &mut ConsolePrompt);
                view.finish();
                outcome
            })
        };
        if let Err(e) = CueWindow::run(view, &config.visualization) {
            logger.error("record", &format!("cue window error: {}", e));
        }
        session
            .join()
            .map_err(|_| PipelineError::acquisition("record", "recording thread panicked"))??
    } else {
        recorder.record(board.as_mut(), &mut ConsoleStimulus, &mut ConsolePrompt)?
    };

    logger.info("record", &format!("saving data to {}", config.paths.recording.display()));
    recording.save(&config.paths.recording)
}

fn train(config: &Config) -> Result<()> {
    let logger = Logger::new(config.logging.clone());
    let recording = Recording::load(&config.paths.recording)?;
    train_recording(config, &recording, &logger)
}

fn train_recording(config: &Config, recording: &Recording, logger: &Logger) -> Result<()> {
    let orchestrator = TrainingOrchestrator::new(config.training.clone(), logger.clone())?;
    let outcome = orchestrator.run(recording)?;
    outcome.bundle.save(&config.paths.bundle)?;
    logger.info(
        "train",
        &format!(
            "bundle written to {} (test accuracy {:.3})",
            config.paths.bundle.display(),
            outcome.test_accuracy
        ),
    );
    Ok(())
}

fn pixelator(config: &FeedbackConfig) -> Result<Pixelator> {
    match &config.stimulus_path {
        Some(path) => Pixelator::from_path(path, config.side),
        None => Pixelator::hexagon(config.side),
    }
}

fn live(config: &Config) -> Result<()> {
    let logger = Logger::new(config.logging.clone());
    let bundle = ModelArtifactBundle::load(&config.paths.bundle)?;
    let model = InferenceModel::from_bundle(bundle)?;
    let board = open_board(&config.board)?;

    let target = Arc::new(ConfidenceCell::new(config.feedback.initial_confidence));
    let manual = Arc::new(ManualOverride::new());
    manual.set(config.feedback.initial_confidence);
    let frames: FrameSlot = Arc::new(Mutex::new(None));

    let render = RenderLoop::spawn(
        &config.feedback,
        pixelator(&config.feedback)?,
        Arc::clone(&target),
        Arc::clone(&manual),
        Box::new(Arc::clone(&frames)),
        logger.clone(),
    )?;
    let inference = LiveInference::spawn(
        board,
        model,
        Arc::clone(&target),
        config.live.clone(),
        logger.clone(),
    )?;

    if config.visualization.enabled {
        if let Err(e) = FeedbackWindow::run(frames, manual, config.visualization.clone()) {
            logger.error("live", &format!("feedback window error: {}", e));
        }
    } else {
        println!("Press enter to stop");
        let mut line = String::new();
        std::io::stdin()
            .lock()
            .read_line(&mut line)
            .map_err(|e| PipelineError::io("<stdin>", e))?;
    }

    let stats = inference.stop()?;
    render.stop();
    logger.info(
        "live",
        &format!("{} predictions, {} retries", stats.predictions, stats.retries),
    );
    Ok(())
}

/// Simulated session, training and live feedback on the synthetic board.
fn demo(mut config: Config) -> Result<()> {
    let logger = Logger::new(config.logging.clone());
    config.board.board_id = SYNTHETIC_BOARD;

    let mut simulator = SyntheticBoard::new(config.board.synthetic.clone())?;
    let recording = simulator.simulate_recording(
        config.recorder.baseline_trials,
        config.recorder.intent_trials,
        config.recorder.window_seconds,
    )?;
    logger.info("demo", "simulated recording ready, training");
    train_recording(&config, &recording, &logger)?;

    if config.board.synthetic.intent_cycle_seconds.is_none() {
        config.board.synthetic.intent_cycle_seconds = Some(5.0);
    }
    live(&config)
}
