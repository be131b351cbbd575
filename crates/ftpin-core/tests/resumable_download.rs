//! End to end per-task download: session, transfer bridge and reconnects.

mod common;

use std::io::Read;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::fake_ftp::{DownloadPlan, FakeFtp};
use ftpin_core::checksum::HashingReader;
use ftpin_core::error::FtpError;
use ftpin_core::retry::{RetryPolicy, Sleeper};
use ftpin_core::task::FtpFileInput;

#[derive(Clone, Default)]
struct RecordingSleeper(Arc<Mutex<Vec<Duration>>>);

impl Sleeper for RecordingSleeper {
    fn sleep(&self, wait: Duration) {
        self.0.lock().unwrap().push(wait);
    }
}

fn body(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 % 256) as u8).collect()
}

fn open(fake: &FakeFtp, sleeper: &RecordingSleeper) -> FtpFileInput {
    FtpFileInput::open(0, fake.client(), &common::options(), "/data/big.bin", RetryPolicy::default())
        .unwrap()
        .with_sleeper(sleeper.clone())
}

#[test]
fn clean_download_streams_whole_file_once() {
    let data = body(1000);
    let fake = FakeFtp::new().file("/data/big.bin", &data);
    let mut input = open(&fake, &RecordingSleeper::default());

    let mut hint = input.open_next().unwrap().unwrap();
    assert_eq!(hint.path, "/data/big.bin");
    let mut out = Vec::new();
    hint.stream.read_to_end(&mut out).unwrap();
    assert_eq!(out, data);
    assert!(input.open_next().unwrap().is_none());

    drop(hint);
    input.close();
    assert_eq!(fake.downloads(), vec![("/data/big.bin".to_string(), 0)]);
    assert_eq!(fake.state().disconnects, 1);
}

#[test]
fn broken_transfers_resume_at_delivered_offset() {
    let data = body(1000);
    let fake = FakeFtp::new().file("/data/big.bin", &data).plan([
        DownloadPlan::BreakAfter(300),
        DownloadPlan::BreakAfter(300),
        DownloadPlan::Complete,
    ]);
    let sleeper = RecordingSleeper::default();
    let mut input = open(&fake, &sleeper);

    let mut hint = input.open_next().unwrap().unwrap();
    let mut reader = HashingReader::new(&mut hint.stream);
    let mut out = Vec::new();
    reader.read_to_end(&mut out).unwrap();
    let (_, bytes, _) = reader.finish();

    assert_eq!(out, data);
    assert_eq!(bytes, 1000);
    assert_eq!(hint.stream.offset(), 1000);
    let offsets: Vec<u64> = fake.downloads().into_iter().map(|(_, o)| o).collect();
    assert_eq!(offsets, vec![0, 300, 600]);
    // reopens succeeded on the first attempt every time
    assert!(sleeper.0.lock().unwrap().is_empty());
}

#[test]
fn persistent_failure_gives_up_after_retry_limit() {
    let data = body(100);
    let refuse = || DownloadPlan::Refuse(FtpError::transport("connection refused"));
    let fake = FakeFtp::new().file("/data/big.bin", &data).plan([
        DownloadPlan::BreakAfter(40),
        refuse(),
        refuse(),
        refuse(),
        refuse(),
        // never reached
        DownloadPlan::Complete,
    ]);
    let sleeper = RecordingSleeper::default();
    let mut input = open(&fake, &sleeper);

    let mut hint = input.open_next().unwrap().unwrap();
    let mut out = Vec::new();
    let err = hint.stream.read_to_end(&mut out).unwrap_err();
    assert_eq!(out.len(), 40);
    match FtpError::from_io(err) {
        FtpError::RetryExhausted { attempts, .. } => assert_eq!(attempts, 4),
        other => panic!("expected RetryExhausted, got {:?}", other),
    }
    // initial download plus 4 reopen attempts
    assert_eq!(fake.downloads().len(), 5);
    assert_eq!(
        *sleeper.0.lock().unwrap(),
        vec![
            Duration::from_millis(500),
            Duration::from_millis(1000),
            Duration::from_millis(2000)
        ]
    );
}

#[test]
fn error_reply_on_reconnect_is_retried() {
    let data = body(100);
    let fake = FakeFtp::new().file("/data/big.bin", &data).plan([
        DownloadPlan::BreakAfter(40),
        DownloadPlan::Refuse(FtpError::Command {
            code: 530,
            message: "Not logged in".into(),
        }),
        DownloadPlan::Complete,
    ]);
    let sleeper = RecordingSleeper::default();
    let mut input = open(&fake, &sleeper);
    let mut hint = input.open_next().unwrap().unwrap();
    let mut out = Vec::new();
    hint.stream.read_to_end(&mut out).unwrap();
    assert_eq!(out, data);
    let offsets: Vec<u64> = fake.downloads().into_iter().map(|(_, o)| o).collect();
    assert_eq!(offsets, vec![0, 40, 40]);
    assert_eq!(*sleeper.0.lock().unwrap(), vec![Duration::from_millis(500)]);
}

#[test]
fn missing_file_is_retried_up_to_the_limit() {
    let fake = FakeFtp::new().file("/data/other.bin", b"x");
    let sleeper = RecordingSleeper::default();
    let mut input = open(&fake, &sleeper);
    let mut hint = input.open_next().unwrap().unwrap();
    let mut out = Vec::new();
    let err = FtpError::from_io(hint.stream.read_to_end(&mut out).unwrap_err());
    match err {
        FtpError::RetryExhausted { attempts, source } => {
            assert_eq!(attempts, 4);
            assert!(matches!(*source, FtpError::Command { code: 550, .. }));
        }
        other => panic!("expected RetryExhausted, got {:?}", other),
    }
    // initial RETR plus 4 reopen attempts
    assert_eq!(fake.downloads().len(), 5);
    assert_eq!(sleeper.0.lock().unwrap().len(), 3);
}

#[test]
fn early_close_releases_the_driver() {
    let data = body(64 * 1024);
    let fake = FakeFtp::new().file("/data/big.bin", &data);
    let mut input = open(&fake, &RecordingSleeper::default());

    let mut hint = input.open_next().unwrap().unwrap();
    let mut buf = [0u8; 10];
    hint.stream.read_exact(&mut buf).unwrap();
    assert_eq!(&buf[..], &data[..10]);
    hint.stream.close();
    drop(hint);
    // joins the worker; would hang if the driver stayed blocked
    input.close();
    assert!(fake.calls().iter().any(|c| c == "disconnect"));
}

#[test]
fn dropping_input_before_stream_cancels_transfer() {
    let data = body(64 * 1024);
    let fake = FakeFtp::new().file("/data/big.bin", &data);
    let mut input = open(&fake, &RecordingSleeper::default());

    let mut hint = input.open_next().unwrap().unwrap();
    let mut buf = [0u8; 10];
    hint.stream.read_exact(&mut buf).unwrap();

    let (tx, rx) = std::sync::mpsc::channel();
    std::thread::spawn(move || {
        drop(input);
        let _ = tx.send(());
    });
    rx.recv_timeout(Duration::from_secs(5))
        .expect("closing the input must not wait for the stream");

    let err = hint.stream.read(&mut buf).unwrap_err();
    assert!(FtpError::from_io(err).is_reader_closed());
    assert!(fake.calls().iter().any(|c| c == "disconnect"));
    // a cancelled stream does not reconnect
    assert_eq!(fake.downloads().len(), 1);
}

#[test]
fn fetch_to_reports_size_and_digest() {
    let fake = FakeFtp::new().file("/data/big.bin", b"hello\n");
    let mut input = open(&fake, &RecordingSleeper::default());
    let mut sink = Vec::new();
    let report = input.fetch_to(&mut sink).unwrap();
    assert_eq!(sink, b"hello\n");
    assert_eq!(report.path, "/data/big.bin");
    assert_eq!(report.bytes, 6);
    assert_eq!(
        report.sha256,
        "5891b5b522d5df086d0ff0b110fbd9d21bb4fc7163af34d08286a2e846f6be03"
    );
    assert!(input.fetch_to(&mut sink).is_err());
}
