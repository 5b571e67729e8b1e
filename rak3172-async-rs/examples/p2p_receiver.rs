//! Listens for raw LoRa P2P packets and prints every one received. Wire
//! the module to UART1: GPIO17 to the module RX, GPIO18 to the module TX.

#![no_std]
#![no_main]

use embassy_executor::Spawner;
use embassy_time::{Duration, Timer};
use esp_hal::clock::CpuClock;
use esp_hal::timer::systimer::SystemTimer;
use esp_hal::uart::{Config as UartConfig, Uart, UartRx};
use esp_hal::Async;
use esp_println::println;
use log::{error, info};
use rak3172_async::at::p2p::{
    Bandwidth, CodingRate, ListenWindow, P2pConfig, SpreadingFactor,
};
use rak3172_async::at::WorkingMode;
use rak3172_async::conf::Config;
use rak3172_async::{split, Ingress, ListenPump, State};

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    println!("{}", info);
    loop {}
}

// This creates a default app-descriptor required by the esp-idf bootloader.
// For more information see: <https://docs.espressif.com/projects/esp-idf/en/stable/esp32/api-reference/system/app_image_format.html#application-description>
esp_bootloader_esp_idf::esp_app_desc!();

static STATE: State = State::new();

#[embassy_executor::task]
async fn reader_task(mut ingress: Ingress<'static, UartRx<'static, Async>>) {
    if let Err(err) = ingress.run().await {
        error!("module reader stopped: {err:?}");
    }
}

#[embassy_executor::task]
async fn pump_task(mut pump: ListenPump<'static>) {
    pump.run().await;
    info!("receive window closed");
}

#[esp_hal_embassy::main]
async fn main(spawner: Spawner) {
    // Init logging
    esp_println::logger::init_logger(log::LevelFilter::Info);

    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);

    let timer0 = SystemTimer::new(peripherals.SYSTIMER);
    esp_hal_embassy::init(timer0.alarm0);

    let uart = Uart::new(
        peripherals.UART1,
        UartConfig::default().with_baudrate(115200),
    )
    .unwrap()
    .with_tx(peripherals.GPIO17)
    .with_rx(peripherals.GPIO18)
    .into_async();
    let (uart_rx, uart_tx) = uart.split();

    let (mut radio, ingress) = split(&STATE, uart_tx, uart_rx, Config::default());
    spawner.spawn(reader_task(ingress)).ok();

    radio.init().await.unwrap();
    radio.set_mode(WorkingMode::P2p).await.unwrap();

    let profile = P2pConfig {
        frequency: 868_100_000,
        spreading_factor: SpreadingFactor::Sf7,
        bandwidth: Bandwidth::Khz125,
        coding_rate: CodingRate::Cr4_5,
        preamble_length: 8,
        tx_power_dbm: 14,
    };
    radio.configure_p2p(&profile).await.unwrap();

    let pump = radio.listen(ListenWindow::Continuous).await.unwrap();
    spawner.spawn(pump_task(pump)).ok();
    info!("Listening on {} Hz", profile.frequency);

    loop {
        while let Some(packet) = radio.listen_pop() {
            println!(
                "Packet: {:02x?} ({} dBm, SNR {})",
                packet.payload.as_slice(),
                packet.rssi,
                packet.snr
            );
            if let Ok(text) = core::str::from_utf8(&packet.payload) {
                println!("As string: {}", text);
            }
        }
        Timer::after(Duration::from_millis(100)).await;
    }
}
