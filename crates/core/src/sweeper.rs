//! Background release of expired holds
//!
//! Correctness never depends on this task: every hold operation treats an
//! overdue hold as expired on its own. The sweeper returns that inventory
//! to the pool without waiting for someone to touch the event.

use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::office::BoxOffice;

/// Handle to a running sweep loop
pub struct Sweeper {
    shutdown_tx: broadcast::Sender<()>,
    handle: JoinHandle<()>,
}

impl Sweeper {
    /// Spawn the loop on the current tokio runtime, ticking at the
    /// configured sweep interval
    pub fn start(office: BoxOffice) -> Self {
        let interval = office.config().sweep_interval();
        Self::start_with_interval(office, interval)
    }

    pub fn start_with_interval(office: BoxOffice, interval: Duration) -> Self {
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = tokio::spawn(sweep_task(office, interval, shutdown_rx));
        info!(interval_ms = interval.as_millis() as u64, "Expiry sweeper started");
        Self {
            shutdown_tx,
            handle,
        }
    }

    /// Stop the loop and wait for an in-flight pass to finish
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        if let Err(err) = self.handle.await {
            warn!(error = %err, "Expiry sweeper ended abnormally");
        }
        info!("Expiry sweeper stopped");
    }
}

/// Run one pass off the async worker threads
pub async fn sweep_once(office: BoxOffice) -> Result<usize> {
    tokio::task::spawn_blocking(move || office.holds().sweep_expired()).await?
}

async fn sweep_task(office: BoxOffice, interval: Duration, mut shutdown_rx: broadcast::Receiver<()>) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {
                match sweep_once(office.clone()).await {
                    Ok(0) => {}
                    Ok(released) => debug!(released, "Sweep pass complete"),
                    Err(err) => warn!(error = %err, "Sweep pass failed"),
                }
            }
            _ = shutdown_rx.recv() => {
                debug!("Expiry sweeper shutting down");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::{SubsecRound, Utc};
    use uuid::Uuid;

    use crate::clock::{Clock, ManualClock};
    use crate::config::ReservationConfig;
    use crate::models::{HoldStatus, NewEvent, ReleaseCause, SeatSelection};
    use crate::storage::Database;

    fn office() -> (BoxOffice, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc::now().trunc_subsecs(6)));
        let office = BoxOffice::with_clock(
            Database::open_in_memory().unwrap(),
            ReservationConfig::default(),
            clock.clone(),
        )
        .unwrap();
        (office, clock)
    }

    fn held_event(office: &BoxOffice, clock: &ManualClock) -> (Uuid, Uuid) {
        let event = office
            .catalog()
            .create_event(NewEvent::general(
                "Matinee",
                clock.now() + chrono::Duration::days(1),
                1,
                800,
            ))
            .unwrap();
        let hold = office
            .holds()
            .create_hold(event.id, Uuid::new_v4(), SeatSelection::Quantity(1))
            .unwrap();
        (event.id, hold.id)
    }

    #[tokio::test]
    async fn test_sweep_once_releases_expired() {
        let (office, clock) = office();
        let (event_id, hold_id) = held_event(&office, &clock);

        assert_eq!(sweep_once(office.clone()).await.unwrap(), 0);

        clock.advance(chrono::Duration::minutes(10));
        assert_eq!(sweep_once(office.clone()).await.unwrap(), 1);
        assert_eq!(
            office.holds().hold(hold_id).unwrap().status,
            HoldStatus::Released(ReleaseCause::Expired)
        );
        assert_eq!(office.holds().availability(event_id).unwrap().remaining(), 1);
    }

    #[tokio::test]
    async fn test_background_loop_releases_and_stops() {
        let (office, clock) = office();
        let (_, hold_id) = held_event(&office, &clock);
        clock.advance(chrono::Duration::minutes(11));

        let sweeper = Sweeper::start_with_interval(office.clone(), Duration::from_millis(10));

        let mut released = false;
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            if office.holds().hold(hold_id).unwrap().status.is_terminal() {
                released = true;
                break;
            }
        }
        assert!(released, "sweeper never released the expired hold");

        tokio::time::timeout(Duration::from_secs(5), sweeper.shutdown())
            .await
            .expect("sweeper did not stop");
    }
}
