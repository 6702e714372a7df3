//! Serialized access to one actuator device.
//!
//! Every request runs under a single async mutex. After each request the
//! service publishes an [`Activity`] so the deferred power-down task can
//! restart or arm its idle window.

#[cfg(not(target_os = "none"))]
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
#[cfg(target_os = "none")]
use embassy_sync::blocking_mutex::raw::ThreadModeRawMutex;
use embassy_sync::mutex::{Mutex, MutexGuard};
use embassy_sync::signal::Signal;
use ois_core::bus::Bus;
use ois_core::clock::Clock;
use ois_core::device::{Device, NoopHooks, PeripheralHooks, Request, RequestKind, Response};
use ois_core::error::Error;
use ois_core::firmware::BlobSource;
use ois_core::power::PowerSequencer;
use portable_atomic::{AtomicBool, Ordering};

#[cfg(target_os = "none")]
type DeviceMutex = ThreadModeRawMutex;
#[cfg(not(target_os = "none"))]
type DeviceMutex = NoopRawMutex;

/// What the last request left behind.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub enum Activity {
    /// Device is powered and configured but not streaming.
    Idle,
    /// Device is unpowered, streaming, or mid-request.
    Busy,
    /// A teardown request started; pending idle windows are abandoned.
    Teardown,
}

/// Serialization lock plus the flags shared with the power-down task.
pub struct DeviceService<B, P, S, C, H = NoopHooks> {
    device: Mutex<DeviceMutex, Device<B, P, S, C, H>>,
    activity: Signal<DeviceMutex, Activity>,
    exit_requested: AtomicBool,
}

impl<B, P, S, C, H> DeviceService<B, P, S, C, H>
where
    B: Bus,
    P: PowerSequencer,
    S: BlobSource,
    C: Clock,
    H: PeripheralHooks,
{
    pub const fn new(device: Device<B, P, S, C, H>) -> Self {
        Self {
            device: Mutex::new(device),
            activity: Signal::new(),
            exit_requested: AtomicBool::new(false),
        }
    }

    /// Runs one request under the lock and publishes the resulting activity.
    pub async fn handle(&self, request: Request<'_>) -> Result<Response, Error> {
        let kind = request.kind();
        if kind.is_teardown() {
            self.exit_requested.store(true, Ordering::Release);
            self.activity.signal(Activity::Teardown);
        }

        let mut device = self.device.lock().await;
        if kind == RequestKind::Acquire {
            self.exit_requested.store(false, Ordering::Release);
        }

        let result = device.dispatch(request);
        if let Err(err) = &result {
            log_request_failed(kind, *err);
        }

        if !kind.is_teardown() {
            let activity = if device.is_idle_candidate() {
                Activity::Idle
            } else {
                Activity::Busy
            };
            self.activity.signal(activity);
        }
        result
    }

    /// Waits for the next published activity.
    pub async fn next_activity(&self) -> Activity {
        self.activity.wait().await
    }

    /// Takes a published activity without waiting. Requests publish while
    /// still holding the lock, so a caller holding it sees every request
    /// that finished before it.
    pub fn take_activity(&self) -> Option<Activity> {
        self.activity.try_take()
    }

    /// Set by teardown requests; cleared by the next acquire.
    pub fn exit_requested(&self) -> bool {
        self.exit_requested.load(Ordering::Acquire)
    }

    /// Locks the device for inspection or direct calls.
    pub async fn lock(&self) -> MutexGuard<'_, DeviceMutex, Device<B, P, S, C, H>> {
        self.device.lock().await
    }
}

#[cfg(target_os = "none")]
fn log_request_failed(kind: RequestKind, err: Error) {
    defmt::warn!("service: {} failed: {}", kind, err);
}

#[cfg(not(target_os = "none"))]
fn log_request_failed(kind: RequestKind, err: Error) {
    println!("service: {kind} failed: {err}");
}
