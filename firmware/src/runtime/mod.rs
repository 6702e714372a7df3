use core::mem::MaybeUninit;

use cortex_m::interrupt;
use cortex_m::register::primask;
use critical_section::{self, RawRestoreState};
use defmt_rtt as _;
use embassy_executor::Spawner;
use embassy_stm32 as hal;
use embassy_stm32::gpio::{Level, Output, Speed};
use embassy_stm32::i2c::{self, I2c};
use embassy_stm32::time::Hertz;
use embedded_alloc::LlffHeap as Heap;
use ois_core::device::Device;
use ois_core::power::builtin_variants;
use static_cell::StaticCell;

use crate::blobs::StaticBlobs;
use crate::board::{self, EmbassyClock};
use crate::hw::i2c::I2cBus;
use crate::hw::power::GpioPowerSequencer;
use crate::service::DeviceService;

mod boot_task;
mod power_down_task;

pub(crate) type BoardService =
    DeviceService<I2cBus<'static>, GpioPowerSequencer<'static>, StaticBlobs, EmbassyClock>;

critical_section::set_impl!(InterruptCriticalSection);

struct InterruptCriticalSection;

unsafe impl critical_section::Impl for InterruptCriticalSection {
    unsafe fn acquire() -> RawRestoreState {
        let primask = primask::read();
        interrupt::disable();
        primask.is_active()
    }

    unsafe fn release(restore_state: RawRestoreState) {
        if restore_state {
            unsafe {
                interrupt::enable();
            }
        }
    }
}

/// Backing store for decoded operation lists and staged buffers.
const HEAP_SIZE: usize = 32 * 1024;

#[global_allocator]
static HEAP: Heap = Heap::empty();
static mut HEAP_MEM: [MaybeUninit<u8>; HEAP_SIZE] = [MaybeUninit::uninit(); HEAP_SIZE];

static SERVICE: StaticCell<BoardService> = StaticCell::new();

#[embassy_executor::main]
pub async fn main(spawner: Spawner) {
    unsafe {
        HEAP.init(core::ptr::addr_of_mut!(HEAP_MEM) as usize, HEAP_SIZE);
    }

    let config = hal::Config::default();
    let hal::Peripherals {
        I2C1,
        PB6,
        PB7,
        PA0,
        PA1,
        PA4,
        PA5,
        PA6,
        PA7,
        ..
    } = hal::init(config);

    let mut i2c_config = i2c::Config::default();
    i2c_config.frequency = Hertz(400_000);
    let bus = I2cBus::new(I2c::new_blocking(I2C1, PB6, PB7, i2c_config));
    let power = GpioPowerSequencer::new(
        Output::new(PA0, Level::Low, Speed::Low),
        Output::new(PA1, Level::Low, Speed::Low),
        Output::new(PA4, Level::Low, Speed::Low),
        Output::new(PA5, Level::Low, Speed::Low),
        Output::new(PA6, Level::Low, Speed::Low),
        Output::new(PA7, Level::High, Speed::Low),
    );

    let variants = builtin_variants().expect("variant registration");
    let device = Device::new(
        bus,
        power,
        board::IMAGES,
        EmbassyClock,
        board::device_config(),
        &variants,
    );
    let service: &'static BoardService = SERVICE.init(DeviceService::new(device));

    spawner
        .spawn(power_down_task::run(service))
        .expect("failed to spawn power-down task");

    spawner
        .spawn(boot_task::run(service))
        .expect("failed to spawn boot task");

    core::future::pending::<()>().await;
}
