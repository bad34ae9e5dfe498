// src/acquisition/mod.rs

pub mod synthetic;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

pub use synthetic::{SyntheticBoard, SyntheticConfig};

// -----------------------------------------------------------------------------
// BOARD DESCRIPTORS
// -----------------------------------------------------------------------------

pub const SYNTHETIC_BOARD: i32 = -1;
pub const CYTON_BOARD: i32 = 0;
pub const GANGLION_BOARD: i32 = 1;
pub const CYTON_DAISY_BOARD: i32 = 2;

/// Static facts about a board type: its rate, total row count and which rows hold EEG.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct BoardDescriptor {
    pub board_id: i32,
    pub name: String,
    pub sampling_rate: u32,
    pub row_count: usize,
    pub eeg_channels: Vec<usize>,
}

impl BoardDescriptor {
    pub fn lookup(board_id: i32) -> Result<Self> {
        let (name, sampling_rate, row_count, eeg) = match board_id {
            SYNTHETIC_BOARD => ("synthetic", 250, 32, 1..=16),
            CYTON_BOARD => ("cyton", 250, 24, 1..=8),
            GANGLION_BOARD => ("ganglion", 200, 15, 1..=4),
            CYTON_DAISY_BOARD => ("cyton_daisy", 125, 32, 1..=16),
            other => {
                return Err(PipelineError::invalid(
                    "board",
                    format!("unknown board id {}", other),
                ))
            }
        };
        Ok(Self {
            board_id,
            name: name.to_string(),
            sampling_rate,
            row_count,
            eeg_channels: eeg.collect(),
        })
    }
}

pub fn sampling_rate(board_id: i32) -> Result<u32> {
    Ok(BoardDescriptor::lookup(board_id)?.sampling_rate)
}

pub fn eeg_channels(board_id: i32) -> Result<Vec<usize>> {
    Ok(BoardDescriptor::lookup(board_id)?.eeg_channels)
}

// -----------------------------------------------------------------------------
// BOARD CONTRACT
// -----------------------------------------------------------------------------

/// A streaming acquisition device.
pub trait Board: Send {
    fn descriptor(&self) -> &BoardDescriptor;

    fn prepare(&mut self) -> Result<()>;
    fn start(&mut self) -> Result<()>;
    fn stop(&mut self) -> Result<()>;
    fn release(&mut self) -> Result<()>;

    /// The most recent `samples` columns as `[row_count, <= samples]`, without consuming
    /// them. Fewer columns means the stream has not buffered enough yet.
    fn current_board_data(&mut self, samples: usize) -> Result<Array2<f64>>;

    /// Switches the stimulus the subject is currently shown. Real boards ignore it.
    fn set_intent(&mut self, _active: bool) {}
}

/// Scoped streaming: prepares and starts on creation, stops and releases on drop.
pub struct StreamingSession<'a> {
    board: &'a mut dyn Board,
    open: bool,
}

impl<'a> StreamingSession<'a> {
    pub fn open(board: &'a mut dyn Board) -> Result<Self> {
        board.prepare()?;
        if let Err(e) = board.start() {
            let _ = board.release();
            return Err(e);
        }
        Ok(Self { board, open: true })
    }

    pub fn board(&mut self) -> &mut dyn Board {
        &mut *self.board
    }

    pub fn descriptor(&self) -> &BoardDescriptor {
        self.board.descriptor()
    }

    pub fn current_board_data(&mut self, samples: usize) -> Result<Array2<f64>> {
        self.board.current_board_data(samples)
    }

    /// Rows listed in the descriptor's `eeg_channels`, most recent `samples` columns.
    /// Short streams give `InsufficientData`.
    pub fn eeg_window(&mut self, samples: usize) -> Result<Array2<f64>> {
        let data = self.board.current_board_data(samples)?;
        if data.ncols() < samples {
            return Err(PipelineError::InsufficientData {
                requested: samples,
                available: data.ncols(),
            });
        }
        Ok(data.select(ndarray::Axis(0), &self.board.descriptor().eeg_channels))
    }

    /// Stops and releases, reporting the first failure.
    pub fn close(mut self) -> Result<()> {
        self.open = false;
        let stopped = self.board.stop();
        let released = self.board.release();
        stopped.and(released)
    }
}

impl Drop for StreamingSession<'_> {
    fn drop(&mut self) {
        if self.open {
            let _ = self.board.stop();
            let _ = self.board.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn known_boards() {
        let cyton = BoardDescriptor::lookup(CYTON_BOARD).unwrap();
        assert_eq!(cyton.sampling_rate, 250);
        assert_eq!(cyton.eeg_channels, (1..=8).collect::<Vec<_>>());
        assert_eq!(sampling_rate(CYTON_DAISY_BOARD).unwrap(), 125);
        assert_eq!(eeg_channels(SYNTHETIC_BOARD).unwrap().len(), 16);
        assert!(BoardDescriptor::lookup(99).is_err());
    }

    // Records lifecycle calls; optionally fails on start.
    struct ScriptedBoard {
        descriptor: BoardDescriptor,
        calls: Arc<Mutex<Vec<&'static str>>>,
        fail_start: bool,
    }

    impl Board for ScriptedBoard {
        fn descriptor(&self) -> &BoardDescriptor {
            &self.descriptor
        }
        fn prepare(&mut self) -> Result<()> {
            self.calls.lock().unwrap().push("prepare");
            Ok(())
        }
        fn start(&mut self) -> Result<()> {
            self.calls.lock().unwrap().push("start");
            if self.fail_start {
                Err(PipelineError::acquisition("start", "no dongle"))
            } else {
                Ok(())
            }
        }
        fn stop(&mut self) -> Result<()> {
            self.calls.lock().unwrap().push("stop");
            Ok(())
        }
        fn release(&mut self) -> Result<()> {
            self.calls.lock().unwrap().push("release");
            Ok(())
        }
        fn current_board_data(&mut self, samples: usize) -> Result<Array2<f64>> {
            Ok(Array2::zeros((self.descriptor.row_count, samples / 2)))
        }
    }

    fn scripted(fail_start: bool) -> (ScriptedBoard, Arc<Mutex<Vec<&'static str>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let board = ScriptedBoard {
            descriptor: BoardDescriptor::lookup(CYTON_BOARD).unwrap(),
            calls: Arc::clone(&calls),
            fail_start,
        };
        (board, calls)
    }

    #[test]
    fn session_stops_and_releases_on_error_path() {
        let (mut board, calls) = scripted(false);
        let result = (|| -> Result<()> {
            let mut session = StreamingSession::open(&mut board)?;
            session.eeg_window(100)?;
            Ok(())
        })();
        assert!(matches!(result, Err(PipelineError::InsufficientData { requested: 100, available: 50 })));
        assert_eq!(*calls.lock().unwrap(), vec!["prepare", "start", "stop", "release"]);
    }

    #[test]
    fn failed_start_still_releases() {
        let (mut board, calls) = scripted(true);
        assert!(StreamingSession::open(&mut board).is_err());
        assert_eq!(*calls.lock().unwrap(), vec!["prepare", "start", "release"]);
    }

    #[test]
    fn explicit_close_does_not_double_stop() {
        let (mut board, calls) = scripted(false);
        let session = StreamingSession::open(&mut board).unwrap();
        session.close().unwrap();
        assert_eq!(*calls.lock().unwrap(), vec!["prepare", "start", "stop", "release"]);
    }
}
