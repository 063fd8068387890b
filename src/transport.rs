//! Byte-stream transports the bridge can run over.

use std::io;
use std::pin::Pin;
use std::process::Stdio;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tracing::info;

use crate::config::TransportConfig;

/// An ordered, reliable byte stream.
pub trait Stream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> Stream for T {}

/// Open the transport described by `config`.
///
/// The returned stream owns every resource it opened; dropping it closes
/// sockets and kills a spawned process.
pub async fn connect(config: &TransportConfig) -> io::Result<Box<dyn Stream>> {
    match config {
        TransportConfig::Stdio => {
            info!("using stdio transport");
            Ok(Box::new(PipeStream::new(
                tokio::io::stdin(),
                tokio::io::stdout(),
                None,
            )))
        }
        TransportConfig::Command { program, args } => {
            let mut child = Command::new(program)
                .args(args)
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::inherit())
                .kill_on_drop(true)
                .spawn()?;

            let stdout = child
                .stdout
                .take()
                .ok_or_else(|| io::Error::other("child stdout not captured"))?;
            let stdin = child
                .stdin
                .take()
                .ok_or_else(|| io::Error::other("child stdin not captured"))?;

            info!(program = %program.display(), pid = ?child.id(), "spawned transport process");
            Ok(Box::new(PipeStream::new(stdout, stdin, Some(child))))
        }
        TransportConfig::Tcp { addr } => {
            let stream = TcpStream::connect(addr).await?;
            stream.set_nodelay(true)?;
            info!(%addr, "connected TCP transport");
            Ok(Box::new(stream))
        }
        #[cfg(unix)]
        TransportConfig::Unix { path } => {
            let stream = tokio::net::UnixStream::connect(path).await?;
            info!(path = %path.display(), "connected Unix transport");
            Ok(Box::new(stream))
        }
        #[cfg(not(unix))]
        TransportConfig::Unix { .. } => Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "unix socket transport is not available on this platform",
        )),
    }
}

/// A reader and a writer glued into one stream, optionally owning the
/// process on the other end.
pub struct PipeStream<R, W> {
    reader: R,
    writer: W,
    _child: Option<Child>,
}

impl<R, W> PipeStream<R, W> {
    fn new(reader: R, writer: W, child: Option<Child>) -> Self {
        Self {
            reader,
            writer,
            _child: child,
        }
    }
}

impl<R: AsyncRead + Unpin, W: Unpin> AsyncRead for PipeStream<R, W> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.reader).poll_read(cx, buf)
    }
}

impl<R: Unpin, W: AsyncWrite + Unpin> AsyncWrite for PipeStream<R, W> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.writer).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.writer).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.writer).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_tcp_transport_carries_frames() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            codec::decode(&mut socket).await.unwrap()
        });

        let mut stream = connect(&TransportConfig::Tcp { addr }).await.unwrap();
        let mut scratch = bytes::BytesMut::new();
        codec::write_frame(&mut stream, b"over tcp", &mut scratch)
            .await
            .unwrap();

        assert_eq!(&server.await.unwrap()[..], b"over tcp");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_transport_echoes_through_cat() {
        let config = TransportConfig::Command {
            program: "cat".into(),
            args: vec![],
        };
        let mut stream = connect(&config).await.unwrap();

        let mut scratch = bytes::BytesMut::new();
        codec::write_frame(&mut stream, b"echo", &mut scratch)
            .await
            .unwrap();
        assert_eq!(&codec::decode(&mut stream).await.unwrap()[..], b"echo");
    }

    #[tokio::test]
    async fn test_command_transport_missing_program() {
        let config = TransportConfig::Command {
            program: "/nonexistent/vpnkit-proxy".into(),
            args: vec![],
        };
        assert!(connect(&config).await.is_err());
    }
}
