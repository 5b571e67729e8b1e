//! Joins a LoRaWAN network and keeps the wall clock set from the
//! clock-sync package. Wire the module to UART1: GPIO17 to the module RX,
//! GPIO18 to the module TX.

#![no_std]
#![no_main]

use embassy_executor::Spawner;
use embassy_time::{Duration, Timer};
use esp_hal::clock::CpuClock;
use esp_hal::timer::systimer::SystemTimer;
use esp_hal::uart::{Config as UartConfig, Uart, UartRx};
use esp_hal::Async;
use log::{error, info, warn};
use rak3172_applayer_async::ClockSync;
use rak3172_async::at::lorawan::{Band, DeviceClass};
use rak3172_async::at::WorkingMode;
use rak3172_async::conf::{Activation, Config, JoinOptions, LorawanConfig};
use rak3172_async::{split, Ingress, State};

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    error!("{info}");
    loop {}
}

// This creates a default app-descriptor required by the esp-idf bootloader.
// For more information see: <https://docs.espressif.com/projects/esp-idf/en/stable/esp32/api-reference/system/app_image_format.html#application-description>
esp_bootloader_esp_idf::esp_app_desc!();

// Placeholder credentials; use the values your network server issued.
const DEV_EUI: [u8; 8] = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08];
const APP_EUI: [u8; 8] = [0x00; 8];
const APP_KEY: [u8; 16] = [
    0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A, 0x0B, 0x0C, 0x0D, 0x0E,
    0x0F,
];

static STATE: State = State::new();

#[embassy_executor::task]
async fn reader_task(mut ingress: Ingress<'static, UartRx<'static, Async>>) {
    if let Err(err) = ingress.run().await {
        error!("module reader stopped: {err:?}");
    }
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
    radio.set_mode(WorkingMode::Lorawan).await.unwrap();
    let session = LorawanConfig {
        activation: Activation::Otaa {
            dev_eui: DEV_EUI,
            app_eui: APP_EUI,
            app_key: APP_KEY,
        },
        class: DeviceClass::A,
        band: Band::Eu868,
        sub_band: None,
        tx_power_dbm: 16,
        adr: true,
    };
    radio.lorawan_init(&session).await.unwrap();

    info!("Joining the network...");
    radio.join(&JoinOptions::default()).await.unwrap();
    info!("Joined");

    let mut clock = ClockSync::default();
    loop {
        match clock
            .sync_time(&mut radio, true, None, Duration::from_secs(30))
            .await
        {
            Ok(Some(now)) => info!("Network time: {now}"),
            Ok(None) => info!("No answer from the network"),
            Err(err) => warn!("Clock sync failed: {err:?}"),
        }
        // The TS003 recommendation is to resync rarely; hourly is plenty
        // for a demo.
        Timer::after(Duration::from_secs(3600)).await;
    }
}
