//! Newline-delimited JSON transport over an async reader/writer pair
//!
//! Used to chain processes through pipes: every published payload becomes one
//! line on the writer, and the single subscription yields the reader's lines.
//! Channel names are not encoded on the wire.

use super::{MessageBus, MessageStream};
use crate::error::TransportError;
use async_trait::async_trait;
use std::io::BufRead;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, Mutex};
use tokio_stream::wrappers::{LinesStream, ReceiverStream};
use tokio_stream::StreamExt;

type Writer = Box<dyn AsyncWrite + Send + Unpin>;

/// Lines buffered between the blocking reader thread and the subscriber
const BLOCKING_READ_BUFFER: usize = 256;

/// Line-oriented bus over arbitrary async IO
pub struct StdioBus {
    lines: Mutex<Option<MessageStream>>,
    writer: Mutex<Writer>,
}

impl StdioBus {
    pub fn new<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let lines = LinesStream::new(BufReader::new(reader).lines())
            .map(|line| line.map_err(TransportError::from));
        Self::from_parts(Box::pin(lines), writer)
    }

    /// Bus fed by a blocking reader drained on its own thread
    ///
    /// The thread is detached: an unfinished read never holds up runtime
    /// shutdown, it just ends with the process.
    pub fn from_blocking_reader<R, W>(reader: R, writer: W) -> Self
    where
        R: BufRead + Send + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self::from_parts(blocking_lines(reader), writer)
    }

    /// Bus over the process's stdin and stdout
    ///
    /// Stdin is read on a dedicated thread so Ctrl-C stops `detect` even
    /// while an interactive terminal has no pending line.
    pub fn stdio() -> Self {
        Self::from_blocking_reader(std::io::BufReader::new(std::io::stdin()), tokio::io::stdout())
    }

    /// Publish-only bus writing to stdout
    pub fn stdout() -> Self {
        Self::new(tokio::io::empty(), tokio::io::stdout())
    }

    fn from_parts<W>(lines: MessageStream, writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            lines: Mutex::new(Some(lines)),
            writer: Mutex::new(Box::new(writer)),
        }
    }
}

fn blocking_lines<R: BufRead + Send + 'static>(reader: R) -> MessageStream {
    let (tx, rx) = mpsc::channel(BLOCKING_READ_BUFFER);

    let spawned = std::thread::Builder::new()
        .name("sentinel-stdin".to_string())
        .spawn(move || {
            for line in reader.lines() {
                let item = line.map_err(TransportError::from);
                let failed = item.is_err();
                // Receiver gone means nobody is listening any more
                if tx.blocking_send(item).is_err() || failed {
                    break;
                }
            }
        });

    if let Err(e) = spawned {
        return Box::pin(tokio_stream::once(Err(TransportError::Io(e))));
    }
    Box::pin(ReceiverStream::new(rx))
}

#[async_trait]
impl MessageBus for StdioBus {
    async fn subscribe(&self, channel: &str) -> Result<MessageStream, TransportError> {
        let lines = self.lines.lock().await.take().ok_or_else(|| {
            TransportError::Unavailable(format!(
                "input stream already consumed, cannot subscribe to '{}'",
                channel
            ))
        })?;

        Ok(Box::pin(
            lines.filter(|line| !matches!(line, Ok(l) if l.trim().is_empty())),
        ))
    }

    async fn publish(&self, channel: &str, payload: String) -> Result<usize, TransportError> {
        let mut line = payload.into_bytes();
        line.push(b'\n');

        let publish_failed = |e: std::io::Error| TransportError::Publish {
            channel: channel.to_string(),
            reason: e.to_string(),
        };

        let mut writer = self.writer.lock().await;
        writer.write_all(&line).await.map_err(publish_failed)?;
        writer.flush().await.map_err(publish_failed)?;

        Ok(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_subscribe_yields_lines() {
        let input = tokio_test::io::Builder::new()
            .read(b"{\"response_time\": 1.0, \"timestamp\": 1}\n\n")
            .read(b"{\"response_time\": 2.0, \"timestamp\": 2}\n")
            .build();
        let bus = StdioBus::new(input, tokio::io::sink());

        let stream = bus.subscribe("response_times").await.unwrap();
        let lines: Vec<String> = stream.map(|l| l.unwrap()).collect().await;

        assert_eq!(
            lines,
            vec![
                "{\"response_time\": 1.0, \"timestamp\": 1}",
                "{\"response_time\": 2.0, \"timestamp\": 2}",
            ]
        );
    }

    #[tokio::test]
    async fn test_second_subscribe_is_unavailable() {
        let bus = StdioBus::new(tokio::io::empty(), tokio::io::sink());
        let _first = bus.subscribe("response_times").await.unwrap();

        assert!(matches!(
            bus.subscribe("response_times").await,
            Err(TransportError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_publish_writes_one_line_per_message() {
        let (writer, mut reader) = tokio::io::duplex(1024);
        let bus = StdioBus::new(tokio::io::empty(), writer);

        assert_eq!(bus.publish("anomalies", "{\"a\":1}".to_string()).await.unwrap(), 1);
        bus.publish("anomalies", "{\"a\":2}".to_string()).await.unwrap();
        drop(bus);

        let mut output = String::new();
        reader.read_to_string(&mut output).await.unwrap();
        assert_eq!(output, "{\"a\":1}\n{\"a\":2}\n");
    }

    #[tokio::test]
    async fn test_blocking_reader_yields_lines_until_eof() {
        let input =
            std::io::Cursor::new(b"{\"response_time\": 3.0, \"timestamp\": 1}\n\n  \nlast\n".to_vec());
        let bus = StdioBus::from_blocking_reader(input, tokio::io::sink());

        let stream = bus.subscribe("response_times").await.unwrap();
        let lines: Vec<String> = stream.map(|l| l.unwrap()).collect().await;

        assert_eq!(lines, vec!["{\"response_time\": 3.0, \"timestamp\": 1}", "last"]);
    }

    #[tokio::test]
    async fn test_flush_failure_is_a_publish_error() {
        let bus = StdioBus::new(tokio::io::empty(), FailingFlush);

        assert!(matches!(
            bus.publish("anomalies", "{}".to_string()).await,
            Err(TransportError::Publish { channel, .. }) if channel == "anomalies"
        ));
    }

    /// Writer that accepts bytes but cannot flush them
    struct FailingFlush;

    impl AsyncWrite for FailingFlush {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<std::io::Result<usize>> {
            Poll::Ready(Ok(buf.len()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Err(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "reader went away",
            )))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_read_error_is_surfaced() {
        let input = tokio_test::io::Builder::new()
            .read_error(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone"))
            .build();
        let bus = StdioBus::new(input, tokio::io::sink());

        let mut stream = bus.subscribe("response_times").await.unwrap();
        assert!(matches!(stream.next().await, Some(Err(TransportError::Io(_)))));
    }
}
