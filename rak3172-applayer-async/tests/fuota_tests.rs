//! Fragmented data block transport against a mocked module session.


use embassy_futures::join::join;
use embassy_time::{Duration, Timer};
use mock::{drive, test_config, MockModule, MockTx};
use rak3172_applayer_async::fuota::OutOfBounds;
use rak3172_applayer_async::{FragmentStorage, Fuota, SliceStorage};
use rak3172_async::at::{Dialect, WorkingMode};
use rak3172_async::{split, Error, Rak3172, State};

type Radio<'a> = Rak3172<'a, MockTx>;

async fn joined_session(module: &MockModule, radio: &mut Radio<'_>) {
    module.expect("AT+NWM=1", &["OK"]);
    radio.set_mode(WorkingMode::Lorawan).await.unwrap();
    module.expect("AT+NJS=?", &["AT+NJS=1", "OK"]);
    assert!(radio.refresh_joined().await.unwrap());
}

#[test]
fn slice_storage_checks_its_bounds() {
    let mut data = [0u8; 8];
    let mut storage = SliceStorage::new(&mut data);
    assert_eq!(storage.capacity(), 8);
    assert_eq!(storage.write(6, &[1, 2]), Ok(()));
    assert_eq!(storage.write(7, &[1, 2]), Err(OutOfBounds));
    let mut back = [0u8; 2];
    assert_eq!(storage.read(6, &mut back), Ok(()));
    assert_eq!(back, [1, 2]);
    assert_eq!(storage.read(7, &mut back), Err(OutOfBounds));
}

#[test]
fn full_session_assembles_the_block() {
    let module = MockModule::new();
    let (tx, rx) = module.split();
    let state = State::new();
    let (mut radio, mut ingress) = split(&state, tx, rx, test_config(Dialect::Rui3));

    let mut data = [0u8; 64];
    let mut fuota = Fuota::new(SliceStorage::new(&mut data), 201, 1);
    let result = drive(
        async {
            joined_session(&module, &mut radio).await;
            let (result, ()) = join(
                fuota.run(&mut radio, None, Duration::from_secs(2)),
                async {
                    // Session 1: three 10-byte fragments, two padding bytes.
                    Timer::after(Duration::from_millis(80)).await;
                    module.inject_line("+EVT:RX_1:UNICAST:-40:6:201:021003000a000200000000");
                    // The setup answer has gone out by now; fragments,
                    // one duplicate, and the closing delete follow.
                    Timer::after(Duration::from_millis(30)).await;
                    module.inject_line("+EVT:TX_DONE");
                    module.inject_line("+EVT:RX_1:UNICAST:-40:6:201:08014041414141414141414141");
                    module.inject_line("+EVT:RX_1:UNICAST:-40:6:201:08024042424242424242424242");
                    module.inject_line("+EVT:RX_1:UNICAST:-40:6:201:08024042424242424242424242");
                    module.inject_line("+EVT:RX_1:UNICAST:-40:6:201:0803404343434343434343430000");
                    module.inject_line("+EVT:RX_1:UNICAST:-40:6:201:0301");
                },
            )
            .await;
            result
        },
        ingress.run(),
    );
    assert_eq!(result, Ok(()));
    assert!(module.wire_contains("AT+SEND=201:0240"));
    assert!(module.wire_contains("AT+SEND=201:0301"));
    assert_eq!(fuota.received_fragments(), 3);
    assert!(fuota.is_complete());
    assert_eq!(fuota.block_len(), Some(28));

    let mut block = [0u8; 28];
    fuota.storage().read(0, &mut block).unwrap();
    let mut expected = [0u8; 28];
    expected[..10].fill(b'A');
    expected[10..20].fill(b'B');
    expected[20..].fill(b'C');
    assert_eq!(block, expected);
}

#[test]
fn oversized_session_is_refused() {
    let module = MockModule::new();
    let (tx, rx) = module.split();
    let state = State::new();
    let (mut radio, mut ingress) = split(&state, tx, rx, test_config(Dialect::Rui3));

    let mut data = [0u8; 8];
    let mut fuota = Fuota::new(SliceStorage::new(&mut data), 201, 1);
    let result = drive(
        async {
            joined_session(&module, &mut radio).await;
            let (result, ()) = join(
                fuota.run(&mut radio, None, Duration::from_secs(2)),
                async {
                    Timer::after(Duration::from_millis(80)).await;
                    module.inject_line("+EVT:RX_1:UNICAST:-40:6:201:021003000a000200000000");
                },
            )
            .await;
            result
        },
        ingress.run(),
    );
    assert_eq!(result, Err(Error::NoMemory));
    // Status answer carries the index and the no-memory bit.
    assert!(module.wire_contains("AT+SEND=201:0242"));
    assert!(!fuota.is_complete());
    assert_eq!(fuota.block_len(), None);
    assert_eq!(fuota.received_fragments(), 0);
}

#[test]
fn version_requests_are_answered_while_waiting() {
    let module = MockModule::new();
    let (tx, rx) = module.split();
    let state = State::new();
    let (mut radio, mut ingress) = split(&state, tx, rx, test_config(Dialect::Rui3));

    let mut data = [0u8; 8];
    let mut fuota = Fuota::new(SliceStorage::new(&mut data), 201, 1);
    let result = drive(
        async {
            joined_session(&module, &mut radio).await;
            let (result, ()) = join(
                fuota.run(&mut radio, None, Duration::from_millis(200)),
                async {
                    Timer::after(Duration::from_millis(80)).await;
                    module.inject_line("+EVT:RX_1:UNICAST:-40:6:201:00");
                },
            )
            .await;
            result
        },
        ingress.run(),
    );
    // The server never closed the session.
    assert_eq!(result, Err(Error::Timeout));
    assert!(module.wire_contains("AT+SEND=201:000301"));
    assert_eq!(fuota.received_fragments(), 0);
}

#[test]
fn stray_fragments_without_a_session_are_ignored() {
    let module = MockModule::new();
    let (tx, rx) = module.split();
    let state = State::new();
    let (mut radio, mut ingress) = split(&state, tx, rx, test_config(Dialect::Rui3));

    let mut data = [0u8; 64];
    let mut fuota = Fuota::new(SliceStorage::new(&mut data), 201, 1);
    let result = drive(
        async {
            joined_session(&module, &mut radio).await;
            let (result, ()) = join(
                fuota.run(&mut radio, None, Duration::from_secs(2)),
                async {
                    Timer::after(Duration::from_millis(80)).await;
                    module.inject_line("+EVT:RX_1:UNICAST:-40:6:201:08014041414141414141414141");
                    module.inject_line("+EVT:RX_1:UNICAST:-40:6:201:0300");
                },
            )
            .await;
            result
        },
        ingress.run(),
    );
    assert_eq!(result, Ok(()));
    assert_eq!(fuota.received_fragments(), 0);
    assert!(module.wire_contains("AT+SEND=201:0300"));
    assert!(!module.wire_contains("AT+SEND=201:0240"));
}
