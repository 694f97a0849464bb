//! Coalescing single-runner.
//!
//! A [`Kicker`] wraps an async worker so that any number of "run now"
//! signals collapse into at most one running worker plus one queued
//! follow-up. The state machine is
//! `idle → running → running+kicked → running (again) → idle`:
//! a kick while idle starts the worker; a kick while running sets a flag
//! that triggers exactly one more run when the current one finishes. Every
//! completed run bumps a generation counter waiters can block on.

use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use parking_lot::Mutex;
use tokio::sync::watch;

type Worker = dyn Fn() -> BoxFuture<'static, ()> + Send + Sync;

pub struct Kicker {
    worker: Box<Worker>,
    state: Mutex<State>,
    generation: watch::Sender<u64>,
}

#[derive(Default)]
struct State {
    running: bool,
    kicked: bool,
}

impl Kicker {
    pub fn new<F, Fut>(worker: F) -> Arc<Self>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (generation, _) = watch::channel(0);
        Arc::new(Self {
            worker: Box::new(move || worker().boxed()),
            state: Mutex::new(State::default()),
            generation,
        })
    }

    /// Request a run. Starts the worker if idle, otherwise queues exactly
    /// one follow-up run. Returns the generation observed at kick time;
    /// pass it to [`wait`](Self::wait) to block until a run that started
    /// at or after this kick has completed.
    pub fn kick(self: &Arc<Self>) -> u64 {
        let mut state = self.state.lock();
        let observed = *self.generation.borrow();

        if state.running {
            state.kicked = true;
            return observed;
        }

        state.running = true;
        let kicker = Arc::clone(self);
        tokio::spawn(async move { kicker.run().await });
        observed
    }

    /// Block until the generation advances past `observed`.
    pub async fn wait(&self, observed: u64) {
        let mut generation = self.generation.subscribe();
        let _ = generation.wait_for(|current| *current > observed).await;
    }

    /// The number of completed worker runs.
    pub fn generation(&self) -> u64 {
        *self.generation.borrow()
    }

    async fn run(self: Arc<Self>) {
        loop {
            (self.worker)().await;
            self.generation.send_modify(|generation| *generation += 1);

            let mut state = self.state.lock();
            if state.kicked {
                state.kicked = false;
                // Loop for the coalesced follow-up run.
            } else {
                state.running = false;
                return;
            }
        }
    }
}

#[cfg(test)]
#[path = "kicker_test.rs"]
mod tests;
