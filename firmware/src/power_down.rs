//! Deferred power-down of an idle, configured device.

use embassy_futures::select::{Either, select};
use embassy_time::{Duration, Timer};
use ois_core::bus::Bus;
use ois_core::clock::Clock;
use ois_core::device::PeripheralHooks;
use ois_core::error::Error;
use ois_core::firmware::BlobSource;
use ois_core::power::PowerSequencer;

use crate::service::{Activity, DeviceService};

/// Result of waiting out one idle window.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum WindowOutcome {
    /// The window elapsed and the device was powered down.
    PoweredDown,
    /// The window elapsed but the device was no longer idle.
    Skipped,
    /// A teardown request claimed the device first.
    Abandoned,
    /// A request arrived before the device was powered down.
    Interrupted(Activity),
    Failed(Error),
}

/// Waits `window` for new activity, then powers the device down if it is
/// still idle.
pub async fn idle_window<B, P, S, C, H>(
    service: &DeviceService<B, P, S, C, H>,
    window: Duration,
) -> WindowOutcome
where
    B: Bus,
    P: PowerSequencer,
    S: BlobSource,
    C: Clock,
    H: PeripheralHooks,
{
    match select(Timer::after(window), service.next_activity()).await {
        Either::First(()) => {}
        Either::Second(activity) => return WindowOutcome::Interrupted(activity),
    }

    if service.exit_requested() {
        return WindowOutcome::Abandoned;
    }
    let mut device = service.lock().await;
    if service.exit_requested() {
        return WindowOutcome::Abandoned;
    }
    // A request may have run between the timer firing and the lock.
    if let Some(activity) = service.take_activity() {
        return WindowOutcome::Interrupted(activity);
    }

    match device.power_down_idle() {
        Ok(true) => WindowOutcome::PoweredDown,
        Ok(false) => WindowOutcome::Skipped,
        Err(err) => WindowOutcome::Failed(err),
    }
}

/// Drives the deferred power-down for one device forever.
pub async fn run<B, P, S, C, H>(service: &DeviceService<B, P, S, C, H>) -> !
where
    B: Bus,
    P: PowerSequencer,
    S: BlobSource,
    C: Clock,
    H: PeripheralHooks,
{
    let window = core_duration_to_embassy(service.lock().await.config().power_down_window);
    loop {
        let mut activity = service.next_activity().await;
        while activity == Activity::Idle {
            match idle_window(service, window).await {
                WindowOutcome::Interrupted(next) => activity = next,
                outcome => {
                    log_window(outcome);
                    break;
                }
            }
        }
    }
}

fn core_duration_to_embassy(duration: core::time::Duration) -> Duration {
    Duration::from_micros(u64::try_from(duration.as_micros()).unwrap_or(u64::MAX))
}

#[cfg(target_os = "none")]
fn log_window(outcome: WindowOutcome) {
    match outcome {
        WindowOutcome::PoweredDown => defmt::info!("power-down: idle window elapsed, rails off"),
        WindowOutcome::Failed(err) => defmt::warn!("power-down: failed: {}", err),
        WindowOutcome::Abandoned => defmt::debug!("power-down: abandoned for teardown"),
        WindowOutcome::Skipped | WindowOutcome::Interrupted(_) => {}
    }
}

#[cfg(not(target_os = "none"))]
fn log_window(outcome: WindowOutcome) {
    match outcome {
        WindowOutcome::PoweredDown => println!("power-down: idle window elapsed, rails off"),
        WindowOutcome::Failed(err) => println!("power-down: failed: {err}"),
        WindowOutcome::Abandoned => println!("power-down: abandoned for teardown"),
        WindowOutcome::Skipped | WindowOutcome::Interrupted(_) => {}
    }
}
