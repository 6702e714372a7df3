use ois_core::device::{Request, Response};

use super::BoardService;
use crate::board::BringUp;

/// Brings the actuator up and starts streaming once at reset.
#[embassy_executor::task]
pub async fn run(service: &'static BoardService) {
    let bring_up = BringUp::new();
    let buffers = bring_up.buffers();

    match service.handle(Request::Acquire).await {
        Ok(Response::Acquired(handle)) => defmt::info!("boot: acquired handle {}", handle.0),
        Ok(_) => {}
        Err(err) => {
            defmt::error!("boot: acquire failed: {}", err);
            return;
        }
    }

    if let Err(err) = service.handle(Request::Configure(&buffers)).await {
        defmt::error!("boot: configure failed: {}", err);
        return;
    }

    match service.handle(Request::Start).await {
        Ok(_) => defmt::info!("boot: streaming"),
        Err(err) => defmt::error!("boot: start failed: {}", err),
    }
}
