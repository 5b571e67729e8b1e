//! P2P radio behavior: profile programming, sends and the listening
//! subsystem.


use embassy_futures::join::join;
use embassy_time::{Duration, Timer};
use mock::{drive, test_config, MockModule};
use rak3172_async::at::p2p::{
    Bandwidth, CodingRate, ListenWindow, P2pConfig, SpreadingFactor,
};
use rak3172_async::at::{Dialect, WorkingMode};
use rak3172_async::{split, Error, State};

fn profile() -> P2pConfig {
    P2pConfig {
        frequency: 868_100_000,
        spreading_factor: SpreadingFactor::Sf7,
        bandwidth: Bandwidth::Khz125,
        coding_rate: CodingRate::Cr4_5,
        preamble_length: 8,
        tx_power_dbm: 14,
    }
}

#[test]
fn configure_writes_the_full_profile() {
    let module = MockModule::new();
    let (tx, rx) = module.split();
    let state = State::new();
    let (mut radio, mut ingress) = split(&state, tx, rx, test_config(Dialect::Rui3));

    drive(radio.configure_p2p(&profile()), ingress.run()).unwrap();
    assert_eq!(module.wire(), vec!["AT+P2P=868100000:7:125:0:8:14".to_string()]);
}

#[test]
fn legacy_bandwidth_travels_as_a_code() {
    let module = MockModule::legacy();
    let (tx, rx) = module.split();
    let state = State::new();
    let (mut radio, mut ingress) = split(&state, tx, rx, test_config(Dialect::Legacy));

    drive(
        async {
            radio.configure_p2p(&profile()).await.unwrap();
            radio.set_bandwidth(Bandwidth::Khz500).await.unwrap();
        },
        ingress.run(),
    );
    assert!(module.wire_contains("AT+P2P=868100000:7:0:0:8:14"));
    assert!(module.wire_contains("AT+PBW=2"));
}

#[test]
fn configure_validates_the_profile() {
    let module = MockModule::new();
    let (tx, rx) = module.split();
    let state = State::new();
    let (mut radio, mut ingress) = split(&state, tx, rx, test_config(Dialect::Rui3));

    drive(
        async {
            let bad_frequency = P2pConfig {
                frequency: 100_000_000,
                ..profile()
            };
            assert_eq!(
                radio.configure_p2p(&bad_frequency).await,
                Err(Error::InvalidArgument)
            );
            let bad_preamble = P2pConfig {
                preamble_length: 1,
                ..profile()
            };
            assert_eq!(
                radio.configure_p2p(&bad_preamble).await,
                Err(Error::InvalidArgument)
            );
            let bad_power = P2pConfig {
                tx_power_dbm: 23,
                ..profile()
            };
            assert_eq!(
                radio.configure_p2p(&bad_power).await,
                Err(Error::InvalidArgument)
            );
        },
        ingress.run(),
    );
    assert!(module.wire().is_empty());
}

#[test]
fn sf5_needs_current_firmware() {
    let legacy = MockModule::legacy();
    let (tx, rx) = legacy.split();
    let state = State::new();
    let (mut radio, mut ingress) = split(&state, tx, rx, test_config(Dialect::Legacy));
    drive(
        async {
            assert_eq!(
                radio.set_spreading_factor(SpreadingFactor::Sf5).await,
                Err(Error::InvalidArgument)
            );
        },
        ingress.run(),
    );
    assert!(legacy.wire().is_empty());

    let rui3 = MockModule::new();
    let (tx, rx) = rui3.split();
    let state = State::new();
    let (mut radio, mut ingress) = split(&state, tx, rx, test_config(Dialect::Rui3));
    drive(
        radio.set_spreading_factor(SpreadingFactor::Sf5),
        ingress.run(),
    )
    .unwrap();
    assert!(rui3.wire_contains("AT+PSF=5"));
}

#[test]
fn parameter_commands_and_queries() {
    let module = MockModule::new();
    let (tx, rx) = module.split();
    let state = State::new();
    let (mut radio, mut ingress) = split(&state, tx, rx, test_config(Dialect::Rui3));

    drive(
        async {
            radio.set_p2p_frequency(868_500_000).await.unwrap();
            assert_eq!(
                radio.set_p2p_frequency(10_000_000).await,
                Err(Error::InvalidArgument)
            );
            radio.set_coding_rate(CodingRate::Cr4_8).await.unwrap();
            assert_eq!(
                radio.set_preamble_length(1).await,
                Err(Error::InvalidArgument)
            );
            assert_eq!(
                radio.set_p2p_tx_power(23).await,
                Err(Error::InvalidArgument)
            );
            module.expect("AT+PFREQ=?", &["AT+PFREQ=868500000", "OK"]);
            assert_eq!(radio.p2p_frequency().await.unwrap(), 868_500_000);
            module.expect("AT+PSF=?", &["AT+PSF=9", "OK"]);
            assert_eq!(
                radio.spreading_factor().await.unwrap(),
                SpreadingFactor::Sf9
            );
            module.expect("AT+PBW=?", &["AT+PBW=250", "OK"]);
            assert_eq!(radio.bandwidth().await.unwrap(), Bandwidth::Khz250);
            module.expect("AT+PCR=?", &["AT+PCR=3", "OK"]);
            assert_eq!(radio.coding_rate().await.unwrap(), CodingRate::Cr4_8);
        },
        ingress.run(),
    );
    assert!(module.wire_contains("AT+PFREQ=868500000"));
    assert!(module.wire_contains("AT+PCR=3"));
}

#[test]
fn encryption_setup() {
    let module = MockModule::new();
    let (tx, rx) = module.split();
    let state = State::new();
    let (mut radio, mut ingress) = split(&state, tx, rx, test_config(Dialect::Rui3));

    drive(
        async {
            radio.set_p2p_encryption(true).await.unwrap();
            radio
                .set_p2p_encryption_key(&[0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08])
                .await
                .unwrap();
        },
        ingress.run(),
    );
    assert!(module.wire_contains("AT+ENCRY=1"));
    assert!(module.wire_contains("AT+ENCKEY=0102030405060708"));
}

#[test]
fn send_validates_the_payload() {
    let module = MockModule::new();
    let (tx, rx) = module.split();
    let state = State::new();
    let (mut radio, mut ingress) = split(&state, tx, rx, test_config(Dialect::Rui3));

    drive(
        async {
            assert_eq!(radio.p2p_send(b"").await, Err(Error::InvalidArgument));
            let oversize = [0u8; 501];
            assert_eq!(radio.p2p_send(&oversize).await, Err(Error::InvalidArgument));
            radio.p2p_send(b"ping").await.unwrap();
        },
        ingress.run(),
    );
    assert_eq!(module.wire(), vec!["AT+PSEND=70696e67".to_string()]);
}

#[test]
fn continuous_listen_delivers_every_packet() {
    let module = MockModule::new();
    let (tx, rx) = module.split();
    let state = State::new();
    let (mut radio, mut ingress) = split(&state, tx, rx, test_config(Dialect::Rui3));

    drive(
        async {
            let mut pump = radio.listen(ListenWindow::Continuous).await.unwrap();
            assert!(radio.is_listening());
            assert!(!radio.is_busy());
            join(pump.run(), async {
                module.inject_line("+EVT:RXP2P:-42:6:01");
                module.inject_line("+EVT:RXP2P:-43:5:02");
                Timer::after(Duration::from_millis(10)).await;
                let first = radio.listen_pop().unwrap();
                assert_eq!(first.payload.as_slice(), &[0x01]);
                assert_eq!(first.rssi, -42);
                assert_eq!(first.snr, 6);
                let second = radio.listen_pop().unwrap();
                assert_eq!(second.payload.as_slice(), &[0x02]);
                assert!(radio.listen_pop().is_none());
                radio.stop_listen().await.unwrap();
            })
            .await;
        },
        ingress.run(),
    );
    assert!(!radio.is_listening());
    let wire = module.wire();
    assert_eq!(wire.first().map(String::as_str), Some("AT+PRECV=65534"));
    assert_eq!(wire.last().map(String::as_str), Some("AT+PRECV=0"));
}

#[test]
fn single_shot_listen_closes_after_the_first_packet() {
    let module = MockModule::new();
    let (tx, rx) = module.split();
    let state = State::new();
    let (mut radio, mut ingress) = split(&state, tx, rx, test_config(Dialect::Rui3));

    drive(
        async {
            let mut pump = radio.listen(ListenWindow::Millis(5000)).await.unwrap();
            assert!(radio.is_busy());
            join(pump.run(), async {
                module.inject_line("+EVT:RXP2P:-30:7:aa55");
            })
            .await;
            let message = radio.listen_pop().unwrap();
            assert_eq!(message.payload.as_slice(), &[0xaa, 0x55]);
        },
        ingress.run(),
    );
    assert!(!radio.is_listening());
    assert!(!radio.is_busy());
    assert!(module.wire_contains("AT+PRECV=5000"));
}

#[test]
fn module_timeout_closes_the_window() {
    let module = MockModule::new();
    let (tx, rx) = module.split();
    let state = State::new();
    let (mut radio, mut ingress) = split(&state, tx, rx, test_config(Dialect::Rui3));

    drive(
        async {
            let mut pump = radio.listen(ListenWindow::Millis(100)).await.unwrap();
            join(pump.run(), async {
                Timer::after(Duration::from_millis(10)).await;
                module.inject_line("+EVT:RXP2P RECEIVE TIMEOUT");
            })
            .await;
        },
        ingress.run(),
    );
    assert!(!radio.is_listening());
    assert!(!radio.is_busy());
    assert!(radio.listen_pop().is_none());
}

#[test]
fn one_shot_receive_returns_the_packet() {
    let module = MockModule::new();
    let (tx, rx) = module.split();
    let state = State::new();
    let (mut radio, mut ingress) = split(&state, tx, rx, test_config(Dialect::Rui3));

    let message = drive(
        async {
            let (message, ()) = join(radio.p2p_receive(1000), async {
                Timer::after(Duration::from_millis(30)).await;
                module.inject_line("+EVT:RXP2P:-51:3:c0ffee");
            })
            .await;
            message.unwrap()
        },
        ingress.run(),
    );
    assert_eq!(message.payload.as_slice(), &[0xc0, 0xff, 0xee]);
    assert_eq!(message.rssi, -51);
    assert!(module.wire_contains("AT+PRECV=1000"));
}

#[test]
fn one_shot_receive_honors_the_module_timeout() {
    let module = MockModule::new();
    let (tx, rx) = module.split();
    let state = State::new();
    let (mut radio, mut ingress) = split(&state, tx, rx, test_config(Dialect::Rui3));

    let result = drive(
        async {
            let (result, ()) = join(radio.p2p_receive(100), async {
                Timer::after(Duration::from_millis(30)).await;
                module.inject_line("+EVT:RXP2P RECEIVE TIMEOUT");
            })
            .await;
            result
        },
        ingress.run(),
    );
    assert_eq!(result, Err(Error::Timeout));
}

#[test]
fn listen_rejects_bad_windows_and_states() {
    let module = MockModule::new();
    let (tx, rx) = module.split();
    let state = State::new();
    let (mut radio, mut ingress) = split(&state, tx, rx, test_config(Dialect::Rui3));

    drive(
        async {
            assert!(matches!(
                radio.listen(ListenWindow::Millis(0)).await,
                Err(Error::InvalidArgument)
            ));
            // 65534 and above collide with the stop and marker codes.
            assert!(matches!(
                radio.listen(ListenWindow::Millis(65534)).await,
                Err(Error::InvalidArgument)
            ));
            let _pump = radio.listen(ListenWindow::Continuous).await.unwrap();
            assert!(matches!(
                radio.listen(ListenWindow::Continuous).await,
                Err(Error::InvalidState)
            ));
            radio.stop_listen().await.unwrap();
        },
        ingress.run(),
    );
}

#[test]
fn stop_listen_when_idle_is_a_no_op() {
    let module = MockModule::new();
    let (tx, rx) = module.split();
    let state = State::new();
    let (mut radio, mut ingress) = split(&state, tx, rx, test_config(Dialect::Rui3));

    drive(radio.stop_listen(), ingress.run()).unwrap();
    assert!(module.wire().is_empty());
}

#[test]
fn p2p_calls_need_p2p_mode() {
    let module = MockModule::new();
    let (tx, rx) = module.split();
    let state = State::new();
    let (mut radio, mut ingress) = split(&state, tx, rx, test_config(Dialect::Rui3));

    drive(
        async {
            module.expect("AT+NWM=1", &["OK"]);
            radio.set_mode(WorkingMode::Lorawan).await.unwrap();
            assert_eq!(
                radio.configure_p2p(&profile()).await,
                Err(Error::InvalidMode)
            );
            assert_eq!(radio.p2p_send(b"x").await, Err(Error::InvalidMode));
            assert!(matches!(
                radio.listen(ListenWindow::Continuous).await,
                Err(Error::InvalidMode)
            ));
        },
        ingress.run(),
    );
}
