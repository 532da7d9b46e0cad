//! Bulk loading and storage of the per-cell clips.
//!
//! The [`ClipBank`] owns one conformed [`ClipBuffer`] per cell.
//! Loading runs on a background thread that reports [`LoaderEvent`]s; the bank folds them in
//! on [`ClipBank::poll`] and becomes ready once every cell has resolved. A cell whose clip
//! fails to load resolves to silence and is reported once.

use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread;
use std::time::{Duration, Instant};

use crate::audio_engine::audio_stream::OutputFormat;
use crate::audio_engine::clip_loader::load_clip;
use crate::audio_engine::constants::PROGRESS_MIN_INTERVAL_MS;
use crate::grid::{CellCoord, CellIndex};
use crate::messages::{ClipBuffer, LoaderEvent};

/// Path of the clip for one cell: `snd_{row}_{column}.wav`.
pub fn clip_path(audio_dir: &Path, coord: CellCoord) -> PathBuf {
    audio_dir.join(format!("snd_{}_{}.wav", coord.row, coord.column))
}

/// Throttles progress events so a large grid does not flood the channel.
struct ProgressReporter {
    tx: Sender<LoaderEvent>,
    total: usize,
    last_emit: Instant,
    min_interval: Duration,
}

impl ProgressReporter {
    fn new(tx: Sender<LoaderEvent>, total: usize) -> Self {
        let min_interval = Duration::from_millis(PROGRESS_MIN_INTERVAL_MS);
        Self {
            tx,
            total,
            last_emit: Instant::now()
                .checked_sub(min_interval)
                .unwrap_or_else(Instant::now),
            min_interval,
        }
    }

    fn emit(&mut self, resolved: usize, force: bool) {
        let now = Instant::now();
        if !force && now.duration_since(self.last_emit) < self.min_interval {
            return;
        }
        self.last_emit = now;

        let percent = if self.total == 0 {
            1.0
        } else {
            (resolved as f32 / self.total as f32).clamp(0.0, 1.0)
        };
        let _ = self.tx.send(LoaderEvent::Progress { percent });
    }
}

/// Loads every cell in index order, reporting through `tx`.
///
/// Stops as soon as the receiving bank is gone. Returns the number of cells loaded or failed.
fn run_loader(audio_dir: &Path, n: usize, format: OutputFormat, tx: &Sender<LoaderEvent>) -> usize {
    let total = n * n;
    if tx.send(LoaderEvent::Started { total }).is_err() {
        return 0;
    }

    let mut progress = ProgressReporter::new(tx.clone(), total);
    progress.emit(0, true);

    let mut failed = 0;
    let mut resolved = 0;
    for coord in CellCoord::all(n) {
        let event = match load_clip(&clip_path(audio_dir, coord), format) {
            Ok(clip) => LoaderEvent::CellLoaded { coord, clip },
            Err(err) => {
                failed += 1;
                LoaderEvent::CellFailed {
                    coord,
                    error: err.to_string(),
                }
            }
        };
        resolved += 1;

        if tx.send(event).is_err() {
            log::debug!("Clip bank dropped, loader stopping after {resolved}/{total} cells");
            return resolved;
        }
        progress.emit(resolved, resolved == total);
    }

    let _ = tx.send(LoaderEvent::Finished { failed });
    resolved
}

/// One clip per cell, addressed by the same (row, column) bijection as the grid.
pub struct ClipBank {
    n: usize,
    format: OutputFormat,
    clips: Vec<Option<ClipBuffer>>,
    failures: Vec<(CellCoord, String)>,
    resolved: usize,
    progress: f32,
    finished: bool,
    loader_rx: Option<Receiver<LoaderEvent>>,
}

impl ClipBank {
    fn empty(n: usize, format: OutputFormat, loader_rx: Receiver<LoaderEvent>) -> Self {
        Self {
            n,
            format,
            clips: vec![None; n * n],
            failures: Vec::new(),
            resolved: 0,
            progress: 0.0,
            finished: false,
            loader_rx: Some(loader_rx),
        }
    }

    /// Loads every clip on the calling thread and returns a ready bank.
    pub fn load_all(audio_dir: &Path, n: usize, format: OutputFormat) -> Self {
        let (tx, rx) = mpsc::channel();
        run_loader(audio_dir, n, format, &tx);
        drop(tx);

        let mut bank = Self::empty(n, format, rx);
        bank.poll();
        bank
    }

    /// Starts loading every clip on a background thread.
    ///
    /// The returned bank is not ready until [`ClipBank::poll`] has folded in the final event.
    pub fn load_all_async(audio_dir: PathBuf, n: usize, format: OutputFormat) -> Self {
        let (tx, rx) = mpsc::channel();

        log::info!(
            "Loading {} clips from {} ({} ch@{} Hz)",
            n * n,
            audio_dir.display(),
            format.channels,
            format.sample_rate
        );

        thread::spawn(move || {
            run_loader(&audio_dir, n, format, &tx);
        });

        Self::empty(n, format, rx)
    }

    /// Drains pending loader events. Returns the number of events processed.
    pub fn poll(&mut self) -> usize {
        let mut processed = 0;

        loop {
            let Some(loader_rx) = self.loader_rx.as_ref() else {
                return processed;
            };

            match loader_rx.try_recv() {
                Ok(event) => {
                    self.apply(event);
                    processed += 1;
                }
                Err(TryRecvError::Empty) => return processed,
                Err(TryRecvError::Disconnected) => {
                    self.loader_rx = None;
                    if !self.finished {
                        self.abandon_unresolved();
                    }
                    return processed;
                }
            }
        }
    }

    fn apply(&mut self, event: LoaderEvent) {
        match event {
            LoaderEvent::Started { total } => {
                log::debug!("Clip loader started ({total} cells)");
            }
            LoaderEvent::Progress { percent } => {
                self.progress = percent;
            }
            LoaderEvent::CellLoaded { coord, clip } => {
                self.resolve(coord, clip);
            }
            LoaderEvent::CellFailed { coord, error } => {
                log::warn!(
                    "Clip for cell ({}, {}) failed, substituting silence: {}",
                    coord.row,
                    coord.column,
                    error
                );
                self.failures.push((coord, error));
                self.resolve(coord, ClipBuffer::silent(self.format.channels));
            }
            LoaderEvent::Finished { failed } => {
                self.finished = true;
                self.progress = 1.0;
                log::info!(
                    "Clip bank ready: {} cells, {} substituted with silence",
                    self.clips.len(),
                    failed
                );
            }
        }
    }

    fn resolve(&mut self, coord: CellCoord, clip: ClipBuffer) {
        let Some(slot) = coord
            .index(self.n)
            .and_then(|index| self.clips.get_mut(index.get()))
        else {
            return;
        };

        if slot.is_none() {
            self.resolved += 1;
        }
        *slot = Some(clip);
    }

    /// The loader went away early; every unresolved cell becomes silence.
    fn abandon_unresolved(&mut self) {
        log::error!(
            "Clip loader stopped after {}/{} cells",
            self.resolved,
            self.clips.len()
        );

        for coord in CellCoord::all(self.n) {
            let unresolved = coord
                .index(self.n)
                .and_then(|index| self.clips.get(index.get()))
                .is_some_and(Option::is_none);
            if unresolved {
                self.failures.push((coord, "clip loader stopped".to_string()));
                self.resolve(coord, ClipBuffer::silent(self.format.channels));
            }
        }

        self.finished = true;
        self.progress = 1.0;
    }

    /// True once every cell has resolved to a clip or to silence.
    pub fn is_ready(&self) -> bool {
        self.finished && self.resolved == self.clips.len()
    }

    pub fn n(&self) -> usize {
        self.n
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn cell_count(&self) -> usize {
        self.clips.len()
    }

    pub fn resolved(&self) -> usize {
        self.resolved
    }

    /// Fraction of cells resolved so far (0.0..=1.0).
    pub fn progress(&self) -> f32 {
        self.progress
    }

    pub fn clip(&self, coord: CellCoord) -> Option<&ClipBuffer> {
        let index = coord.index(self.n)?;
        self.clip_at(index)
    }

    pub fn clip_at(&self, index: CellIndex) -> Option<&ClipBuffer> {
        self.clips.get(index.get())?.as_ref()
    }

    /// Cells whose clip failed to load, with the reason.
    pub fn failures(&self) -> &[(CellCoord, String)] {
        &self.failures
    }

    /// Clones every clip in index order; `None` until the bank is ready.
    pub(crate) fn clips_in_order(&self) -> Option<Vec<ClipBuffer>> {
        if !self.is_ready() {
            return None;
        }

        self.clips.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_engine::clip_loader::tests::write_pcm16_wav;

    const FORMAT: OutputFormat = OutputFormat {
        channels: 1,
        sample_rate: 8_000,
    };

    fn write_grid(dir: &Path, n: usize, skip: Option<CellCoord>) {
        for coord in CellCoord::all(n) {
            if Some(coord) == skip {
                continue;
            }
            let level = (1 + coord.row * n + coord.column) as i16 * 1_000;
            write_pcm16_wav(&clip_path(dir, coord), 1, 8_000, &[level; 16]).unwrap();
        }
    }

    #[test]
    fn test_clip_path_addressing() {
        let path = clip_path(Path::new("static/audio"), CellCoord::new(3, 5));
        assert_eq!(path, Path::new("static/audio/snd_3_5.wav"));
    }

    #[test]
    fn test_load_all_keys_clips_by_coord() {
        let tmp = tempfile::tempdir().unwrap();
        write_grid(tmp.path(), 2, None);

        let bank = ClipBank::load_all(tmp.path(), 2, FORMAT);
        assert!(bank.is_ready());
        assert!(bank.failures().is_empty());
        assert_eq!(bank.cell_count(), 4);
        assert_eq!(bank.progress(), 1.0);

        // cell (1, 0) has index 2 and was written with level 3000
        let clip = bank.clip(CellCoord::new(1, 0)).unwrap();
        assert!((clip.samples[0] - 3_000.0 / 32_768.0).abs() < 1e-4);
        assert_eq!(bank.clip_at(CellIndex(2)), Some(clip));
    }

    #[test]
    fn test_failed_cell_becomes_silence() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = CellCoord::new(0, 1);
        write_grid(tmp.path(), 2, Some(missing));

        let bank = ClipBank::load_all(tmp.path(), 2, FORMAT);
        assert!(bank.is_ready());
        assert_eq!(bank.failures().len(), 1);
        assert_eq!(bank.failures()[0].0, missing);
        assert!(bank.clip(missing).unwrap().is_silent());
        assert!(!bank.clip(CellCoord::new(1, 1)).unwrap().is_silent());
    }

    #[test]
    fn test_loader_stops_when_bank_is_dropped() {
        let tmp = tempfile::tempdir().unwrap();
        write_grid(tmp.path(), 3, None);

        let (tx, rx) = mpsc::channel();
        drop(rx);
        assert_eq!(run_loader(tmp.path(), 3, FORMAT, &tx), 0);
    }

    #[test]
    fn test_async_load_becomes_ready() {
        let tmp = tempfile::tempdir().unwrap();
        write_grid(tmp.path(), 3, None);

        let mut bank = ClipBank::load_all_async(tmp.path().to_path_buf(), 3, FORMAT);
        assert!(bank.clips_in_order().is_none());

        let deadline = Instant::now() + Duration::from_secs(10);
        while !bank.is_ready() && Instant::now() < deadline {
            bank.poll();
            thread::sleep(Duration::from_millis(5));
        }

        assert!(bank.is_ready());
        assert_eq!(bank.resolved(), 9);
        assert_eq!(bank.clips_in_order().unwrap().len(), 9);
    }

    #[test]
    fn test_disconnected_loader_resolves_to_silence() {
        let (tx, rx) = mpsc::channel();
        let mut bank = ClipBank::empty(2, FORMAT, rx);
        tx.send(LoaderEvent::CellLoaded {
            coord: CellCoord::new(0, 0),
            clip: ClipBuffer::silent(1),
        })
        .unwrap();
        drop(tx);

        bank.poll();
        assert!(bank.is_ready());
        assert_eq!(bank.failures().len(), 3);
    }
}
