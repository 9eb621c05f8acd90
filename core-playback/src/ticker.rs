//! Position ticker.
//!
//! While the device plays, a background loop advances the position estimate
//! once per period and reports it back to the engine. At most one loop runs:
//! [`PositionTicker::restart`] cancels and joins the previous loop before
//! spawning the next, and every tick carries the generation that produced it
//! so anything still in flight from an older loop can be told apart.

use core_async::sync::{mpsc, CancellationToken};
use core_async::task::JoinHandle;
use core_async::time::{sleep, Duration};
use tracing::{debug, warn};

/// Position estimate produced by a ticker loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    pub generation: u64,
    pub position_ms: i64,
}

pub struct PositionTicker {
    period: Duration,
    parent: CancellationToken,
    generation: u64,
    running: Option<(CancellationToken, JoinHandle<()>)>,
}

impl PositionTicker {
    /// Loops are children of `parent`; cancelling it stops every loop.
    pub fn new(period: Duration, parent: CancellationToken) -> Self {
        Self {
            period,
            parent,
            generation: 0,
            running: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Whether `tick` came from the loop that is running now.
    pub fn is_current(&self, tick: &Tick) -> bool {
        self.running.is_some() && tick.generation == self.generation
    }

    /// Start a loop at `start_ms`. A negative `duration_ms` means no end.
    pub async fn restart(
        &mut self,
        start_ms: i64,
        duration_ms: i64,
        ticks: mpsc::UnboundedSender<Tick>,
    ) -> u64 {
        self.stop().await;
        self.generation += 1;

        let token = self.parent.child_token();
        let handle = core_async::task::spawn(run(
            self.generation,
            start_ms.max(0),
            duration_ms,
            self.period,
            ticks,
            token.clone(),
        ));
        self.running = Some((token, handle));
        debug!("Position ticker {} started at {}ms", self.generation, start_ms);
        self.generation
    }

    /// Cancel the running loop and wait for it to exit.
    pub async fn stop(&mut self) {
        if let Some((token, handle)) = self.running.take() {
            token.cancel();
            if let Err(e) = handle.await {
                warn!("Position ticker ended abnormally: {}", e);
            }
        }
    }
}

async fn run(
    generation: u64,
    start_ms: i64,
    duration_ms: i64,
    period: Duration,
    ticks: mpsc::UnboundedSender<Tick>,
    token: CancellationToken,
) {
    let step = i64::try_from(period.as_millis()).unwrap_or(i64::MAX);
    let mut position_ms = start_ms;

    loop {
        core_async::select! {
            biased;
            _ = token.cancelled() => break,
            _ = sleep(period) => {}
        }

        position_ms = position_ms.saturating_add(step);
        if duration_ms >= 0 && position_ms > duration_ms {
            break;
        }
        if ticks
            .send(Tick {
                generation,
                position_ms,
            })
            .is_err()
        {
            break;
        }
    }
}
