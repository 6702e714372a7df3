use super::BoardService;
use crate::power_down;

#[embassy_executor::task]
pub async fn run(service: &'static BoardService) -> ! {
    power_down::run(service).await
}
