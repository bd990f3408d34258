//! Background deck loader
//!
//! Decoding a track takes far longer than one audio block, so loads are
//! queued to a worker thread. The worker opens the source and commits it to
//! the target deck through its [`DeckController`]; the control side polls
//! for [`LoadOutcome`]s and surfaces failures however it likes.
//!
//! Requests are handled in order. When two loads target the same deck, the
//! one that completes last is what the deck ends up playing.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{Receiver, RecvTimeoutError, Sender};

use crate::decoder::SourceId;
use crate::engine::DeckController;
use crate::error::DeckResult;
use crate::types::DeckId;

enum LoaderCommand {
    Load { deck: DeckId, source: SourceId },
    Shutdown,
}

/// Result of one background load
#[derive(Debug)]
pub struct LoadOutcome {
    pub deck: DeckId,
    pub source: SourceId,
    pub result: DeckResult<()>,
}

/// Handle to the loader thread; shuts it down on drop
pub struct DeckLoader {
    command_tx: Sender<LoaderCommand>,
    outcome_rx: Receiver<LoadOutcome>,
    thread_handle: Option<JoinHandle<()>>,
}

impl DeckLoader {
    /// Spawn the worker, giving it the controllers it may load into
    pub fn spawn(controllers: Vec<DeckController>) -> std::io::Result<Self> {
        let (command_tx, command_rx) = crossbeam::channel::unbounded();
        let (outcome_tx, outcome_rx) = crossbeam::channel::unbounded();

        let handle = thread::Builder::new()
            .name("deck-loader".into())
            .spawn(move || run(controllers, command_rx, outcome_tx))?;

        Ok(Self {
            command_tx,
            outcome_rx,
            thread_handle: Some(handle),
        })
    }

    /// Queue a load; `false` if the worker is gone
    pub fn request(&self, deck: DeckId, source: impl Into<SourceId>) -> bool {
        let source = source.into();
        log::debug!("Queueing load of {} into {}", source, deck);
        self.command_tx
            .send(LoaderCommand::Load { deck, source })
            .is_ok()
    }

    /// Next finished load, if any
    pub fn try_recv(&self) -> Option<LoadOutcome> {
        self.outcome_rx.try_recv().ok()
    }

    /// Wait up to `timeout` for the next finished load
    pub fn recv_timeout(&self, timeout: Duration) -> Option<LoadOutcome> {
        match self.outcome_rx.recv_timeout(timeout) {
            Ok(outcome) => Some(outcome),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }
}

impl Drop for DeckLoader {
    fn drop(&mut self) {
        let _ = self.command_tx.send(LoaderCommand::Shutdown);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

fn run(
    controllers: Vec<DeckController>,
    command_rx: Receiver<LoaderCommand>,
    outcome_tx: Sender<LoadOutcome>,
) {
    log::info!("Deck loader started ({} decks)", controllers.len());

    while let Ok(command) = command_rx.recv() {
        let (deck, source) = match command {
            LoaderCommand::Load { deck, source } => (deck, source),
            LoaderCommand::Shutdown => break,
        };

        let Some(controller) = controllers.iter().find(|c| c.id() == deck) else {
            log::warn!("Load requested for {} which has no controller", deck);
            continue;
        };

        let result = controller.load(source.clone());
        if outcome_tx.send(LoadOutcome { deck, source, result }).is_err() {
            break;
        }
    }

    log::info!("Deck loader stopped");
}
