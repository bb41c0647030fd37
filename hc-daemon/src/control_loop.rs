//! The tick/timekeep thread pair of spec §5's concurrency model, run as a
//! pair of cooperating tokio tasks rather than OS threads: the timekeep
//! task advances the monotonic clock on a fixed wall-clock cadence, the
//! tick task drains it and drives one `Plant::run_tick` pass. Splitting
//! them this way (instead of one task doing both) keeps the tick step a
//! pure function of `now` and leaves room for a future timekeep source
//! (e.g. an external NTP-disciplined clock) to replace the wall-clock one
//! without touching the tick task.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, error, warn};

use hc_core::{Plant, Tick, Timekeep};

/// Ticks advance in one-second wall-clock steps; spec §4 only requires a
/// resolution of at least one tick per second.
const TICK_PERIOD: Duration = Duration::from_secs(1);
const TICKS_PER_PERIOD: u64 = hc_core::timekeep::TICKS_PER_SECOND;

/// Drives the plant forward until `shutdown` is set, then returns. A single
/// failed tick is logged and the loop continues (spec §7: a tick-time error
/// degrades gracefully; it never aborts the process) unless the plant
/// reports itself offline, which ends the loop immediately.
pub async fn run(plant: Arc<Mutex<Plant>>, timekeep: Arc<Timekeep>, shutdown: Arc<AtomicBool>) {
    debug!("tick loop starting");

    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        let now = match timekeep.advance(TICKS_PER_PERIOD) {
            Ok(t) => t,
            Err(e) => {
                error!("timekeep: {e}, shutting down");
                break;
            }
        };

        if let Err(e) = run_one_tick(&plant, now).await {
            warn!("tick {} failed: {e}", now.0);
        }

        tokio::time::sleep(TICK_PERIOD).await;
    }

    debug!("tick loop stopped");
}

async fn run_one_tick(plant: &Arc<Mutex<Plant>>, now: Tick) -> hc_error::Result<()> {
    let mut guard = plant.lock().await;
    guard.run_tick(now)
}
