use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Emitted by a running countdown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownEvent {
    /// Value after a decrement
    Tick(u32),
    /// Reached zero; sent exactly once, after the last tick
    Finished,
}

struct LiveCountdown {
    token: CancellationToken,
    events: mpsc::UnboundedReceiver<CountdownEvent>,
    handle: JoinHandle<()>,
}

/// Cancellable single-subscriber countdown. Starting a new countdown cancels
/// the previous one, and a cancelled countdown delivers nothing further.
pub struct Countdown {
    tick_interval: Duration,
    live: Option<LiveCountdown>,
}

impl Countdown {
    pub fn new(tick_interval: Duration) -> Self {
        Self {
            tick_interval,
            live: None,
        }
    }

    /// Count down from `from_seconds`, one decrement per tick interval
    pub fn start(&mut self, from_seconds: u32) {
        if self.cancel() {
            debug!("Replacing running countdown");
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let tick = self.tick_interval;

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + tick, tick);
            let mut remaining = from_seconds;

            while remaining > 0 {
                tokio::select! {
                    _ = cancelled.cancelled() => return,
                    _ = ticker.tick() => {}
                }

                remaining -= 1;
                trace!("Countdown tick: {}", remaining);
                if tx.send(CountdownEvent::Tick(remaining)).is_err() {
                    return;
                }
            }

            if !cancelled.is_cancelled() {
                let _ = tx.send(CountdownEvent::Finished);
            }
        });

        debug!("Countdown started from {}", from_seconds);
        self.live = Some(LiveCountdown {
            token,
            events: rx,
            handle,
        });
    }

    /// Stop ticking. Returns whether a countdown was running.
    pub fn cancel(&mut self) -> bool {
        match self.live.take() {
            Some(live) => {
                live.token.cancel();
                live.handle.abort();
                // Dropping the receiver discards anything already queued
                drop(live.events);
                debug!("Countdown cancelled");
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.live.is_some()
    }

    /// Wait for the next event of the running countdown. Pends forever when
    /// none is running, so it can sit in a `select!` unconditionally.
    pub async fn next_event(&mut self) -> Option<CountdownEvent> {
        let event = match self.live.as_mut() {
            Some(live) => live.events.recv().await,
            None => std::future::pending().await,
        };

        if matches!(event, Some(CountdownEvent::Finished) | None) {
            self.live = None;
        }

        event
    }
}

impl Drop for Countdown {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::timeout;

    const TICK: Duration = Duration::from_millis(10);

    async fn collect(countdown: &mut Countdown) -> Vec<CountdownEvent> {
        let mut events = Vec::new();
        while let Ok(Some(event)) = timeout(Duration::from_millis(200), countdown.next_event()).await
        {
            events.push(event);
            if event == CountdownEvent::Finished {
                break;
            }
        }
        events
    }

    #[tokio::test]
    async fn test_emits_n_ticks_then_finished() {
        let mut countdown = Countdown::new(TICK);
        countdown.start(3);

        let events = collect(&mut countdown).await;

        assert_eq!(
            events,
            vec![
                CountdownEvent::Tick(2),
                CountdownEvent::Tick(1),
                CountdownEvent::Tick(0),
                CountdownEvent::Finished,
            ]
        );
        assert!(!countdown.is_running());
    }

    #[tokio::test]
    async fn test_zero_finishes_immediately() {
        let mut countdown = Countdown::new(TICK);
        countdown.start(0);

        assert_eq!(collect(&mut countdown).await, vec![CountdownEvent::Finished]);
    }

    #[tokio::test]
    async fn test_cancel_stops_events() {
        let mut countdown = Countdown::new(TICK);
        countdown.start(5);

        assert_eq!(
            countdown.next_event().await,
            Some(CountdownEvent::Tick(4))
        );
        assert!(countdown.cancel());
        assert!(!countdown.is_running());

        // Nothing arrives after cancellation
        assert!(timeout(Duration::from_millis(100), countdown.next_event())
            .await
            .is_err());
        assert!(!countdown.cancel());
    }

    #[tokio::test]
    async fn test_restart_replaces_previous() {
        let mut countdown = Countdown::new(TICK);
        countdown.start(10);
        countdown.start(2);

        let events = collect(&mut countdown).await;
        assert_eq!(
            events,
            vec![
                CountdownEvent::Tick(1),
                CountdownEvent::Tick(0),
                CountdownEvent::Finished,
            ]
        );
    }

    #[tokio::test]
    async fn test_idle_countdown_pends() {
        let mut countdown = Countdown::new(TICK);
        assert!(timeout(Duration::from_millis(30), countdown.next_event())
            .await
            .is_err());
    }
}
