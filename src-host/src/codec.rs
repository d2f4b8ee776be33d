//! Browser native-messaging framing on blocking stdio.
//!
//! The browser writes length-prefixed JSON to stdin and reads the same from
//! stdout. Both ends run on dedicated threads and hand frames to the runtime
//! over channels.

use crate::native::OutboundFrame;
use native_messaging::host::{self, NmError};
use std::io::{self, Read, Write};
use std::thread;
use tokio::sync::mpsc;

/// Reads one frame body. `None` means the browser closed the pipe.
pub fn read_frame<R: Read>(reader: &mut R) -> Result<Option<String>, NmError> {
    match host::decode_message_opt(reader, host::MAX_FROM_BROWSER) {
        Ok(body) => Ok(body),
        Err(NmError::Disconnected) => Ok(None),
        Err(err) => Err(err),
    }
}

pub fn write_frame<W: Write>(writer: &mut W, frame: &OutboundFrame) -> Result<(), NmError> {
    host::send_json(writer, frame)
}

/// Forwards inbound frame bodies until stdin closes or breaks.
pub fn spawn_reader(bodies: mpsc::UnboundedSender<String>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let stdin = io::stdin();
        let mut stdin = stdin.lock();
        loop {
            match read_frame(&mut stdin) {
                Ok(Some(body)) => {
                    if bodies.send(body).is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    tracing::error!("native messaging input failed: {err}");
                    break;
                }
            }
        }
    })
}

/// Writes outbound frames until every sender is gone.
pub fn spawn_writer(mut frames: mpsc::UnboundedReceiver<OutboundFrame>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let stdout = io::stdout();
        let mut stdout = stdout.lock();
        while let Some(frame) = frames.blocking_recv() {
            if let Err(err) = write_frame(&mut stdout, &frame) {
                tracing::error!("dropping outbound frame: {err}");
            }
        }
    })
}
