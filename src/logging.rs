use std::io::Write;

use tracing::Level;
use tracing_subscriber::FmtSubscriber;
use tracing_subscriber::fmt::MakeWriter;

/// Install the global subscriber. Log lines go to stdout and, via the
/// broadcast channel, to the `/api/logs` SSE stream.
pub fn init(log_tx: tokio::sync::broadcast::Sender<String>) {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_writer(BroadcastMakeWriter { sender: log_tx })
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();
}

#[derive(Clone)]
struct BroadcastMakeWriter {
    sender: tokio::sync::broadcast::Sender<String>,
}

impl<'a> MakeWriter<'a> for BroadcastMakeWriter {
    type Writer = BroadcastWriter;

    fn make_writer(&'a self) -> Self::Writer {
        BroadcastWriter {
            sender: self.sender.clone(),
        }
    }
}

struct BroadcastWriter {
    sender: tokio::sync::broadcast::Sender<String>,
}

impl Write for BroadcastWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let line = String::from_utf8_lossy(buf).to_string();
        let _ = self.sender.send(line); // Ignored if no receivers
        std::io::stdout().write(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        std::io::stdout().flush()
    }
}
