mod common;

use common::test_helpers::dm_event;
use slashgate::prelude::*;
use std::io::Write;
use std::sync::{Arc, Mutex};

#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl Captured {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for Captured {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn failed_dispatch_logs_command_user_and_stage() {
    let captured = Captured::default();
    let writer = captured.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let client = SlashClient::builder()
        .exception_handler(slashgate::DefaultExceptionHandler::silent())
        .handler(SlashHandler::builder("report").build_fn(|_ctx| async {
            Err::<(), BoxError>("upstream timed out".into())
        }))
        .build()
        .unwrap();

    let (event, _) = dm_event("report", 77);
    assert_eq!(client.dispatch(event).await.unwrap(), ExecutionOutcome::Exception);

    let logs = captured.text();
    assert!(logs.contains("command failed"), "{logs}");
    assert!(logs.contains("upstream timed out"), "{logs}");
    assert!(logs.contains("user=77"), "{logs}");
    assert!(logs.contains("stage=\"execute\"") || logs.contains("stage=execute"), "{logs}");
}
