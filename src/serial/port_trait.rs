//! Trait abstraction for the byte transport to enable testing

use async_trait::async_trait;
use bytes::Bytes;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Byte-oriented link to the extruder firmware
#[async_trait]
pub trait Transport: Send {
    /// Bytes buffered and ready to read without blocking
    fn bytes_available(&mut self) -> io::Result<usize>;

    /// Read exactly `n` bytes, or `None` if the read timed out
    async fn read_exact(&mut self, n: usize) -> io::Result<Option<Bytes>>;

    /// Write all data to the port
    async fn write_all(&mut self, data: &[u8]) -> io::Result<()>;

    /// Flush the output buffer
    async fn flush(&mut self) -> io::Result<()>;
}

/// Wrapper around tokio_serial::SerialStream that implements Transport
pub struct SerialTransport {
    port: tokio_serial::SerialStream,
    device_path: String,
    read_timeout: Duration,
}

impl std::fmt::Debug for SerialTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialTransport")
            .field("device_path", &self.device_path)
            .field("read_timeout", &self.read_timeout)
            .finish_non_exhaustive()
    }
}

impl SerialTransport {
    pub fn new(port: tokio_serial::SerialStream, device_path: impl Into<String>, read_timeout: Duration) -> Self {
        Self {
            port,
            device_path: device_path.into(),
            read_timeout,
        }
    }

    /// Path of the opened serial device
    pub fn device_path(&self) -> &str {
        &self.device_path
    }
}

#[async_trait]
impl Transport for SerialTransport {
    fn bytes_available(&mut self) -> io::Result<usize> {
        use tokio_serial::SerialPort;
        self.port
            .bytes_to_read()
            .map(|n| n as usize)
            .map_err(io::Error::from)
    }

    async fn read_exact(&mut self, n: usize) -> io::Result<Option<Bytes>> {
        let mut buf = vec![0u8; n];
        match tokio::time::timeout(self.read_timeout, self.port.read_exact(&mut buf)).await {
            Ok(Ok(_)) => Ok(Some(Bytes::from(buf))),
            Ok(Err(e)) => Err(e),
            Err(_) => Ok(None),
        }
    }

    async fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.port.write_all(data).await
    }

    async fn flush(&mut self) -> io::Result<()> {
        self.port.flush().await
    }
}

#[cfg(test)]
pub mod mocks {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Mock transport for testing
    ///
    /// Incoming bytes are delivered in the chunks they were queued in, one
    /// chunk per `bytes_available` call, so tests control what the driver
    /// sees on each poll. A `read_exact` longer than what is buffered pulls
    /// further chunks, and times out when there are none. Once every chunk
    /// is consumed the mock reports a disconnect unless `hold_open` is set.
    #[derive(Clone)]
    pub struct MockTransport {
        pub chunks: Arc<Mutex<VecDeque<Vec<u8>>>>,
        pub buffered: Arc<Mutex<VecDeque<u8>>>,
        pub written_data: Arc<Mutex<Vec<Vec<u8>>>>,
        pub write_error: Arc<Mutex<Option<io::ErrorKind>>>,
        pub hold_open: bool,
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self {
                chunks: Arc::new(Mutex::new(VecDeque::new())),
                buffered: Arc::new(Mutex::new(VecDeque::new())),
                written_data: Arc::new(Mutex::new(Vec::new())),
                write_error: Arc::new(Mutex::new(None)),
                hold_open: false,
            }
        }

        pub fn with_chunks<I: IntoIterator<Item = Vec<u8>>>(chunks: I) -> Self {
            let mock = Self::new();
            mock.chunks.lock().unwrap().extend(chunks);
            mock
        }

        pub fn queue(&self, bytes: &[u8]) {
            self.chunks.lock().unwrap().push_back(bytes.to_vec());
        }

        pub fn get_written_data(&self) -> Vec<Vec<u8>> {
            self.written_data.lock().unwrap().clone()
        }

        /// Every written byte, flattened
        pub fn written_bytes(&self) -> Vec<u8> {
            self.get_written_data().concat()
        }

        pub fn set_write_error(&self, error: io::ErrorKind) {
            *self.write_error.lock().unwrap() = Some(error);
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        fn bytes_available(&mut self) -> io::Result<usize> {
            let mut buffered = self.buffered.lock().unwrap();
            if buffered.is_empty() {
                match self.chunks.lock().unwrap().pop_front() {
                    Some(chunk) => buffered.extend(chunk),
                    None if self.hold_open => {}
                    None => {
                        return Err(io::Error::new(io::ErrorKind::BrokenPipe, "Mock disconnected"));
                    }
                }
            }
            Ok(buffered.len())
        }

        async fn read_exact(&mut self, n: usize) -> io::Result<Option<Bytes>> {
            let mut buffered = self.buffered.lock().unwrap();
            while buffered.len() < n {
                match self.chunks.lock().unwrap().pop_front() {
                    Some(chunk) => buffered.extend(chunk),
                    None => return Ok(None),
                }
            }
            Ok(Some(buffered.drain(..n).collect()))
        }

        async fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
            if let Some(error) = *self.write_error.lock().unwrap() {
                return Err(io::Error::new(error, "Mock write error"));
            }
            self.written_data.lock().unwrap().push(data.to_vec());
            Ok(())
        }

        async fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_mock_delivers_chunks_in_order() {
        let mut mock = MockTransport::with_chunks([vec![1, 2], vec![3]]);

        assert_eq!(mock.bytes_available().unwrap(), 2);
        assert_eq!(mock.read_exact(2).await.unwrap().unwrap().as_ref(), &[1, 2]);
        assert_eq!(mock.bytes_available().unwrap(), 1);
        assert_eq!(mock.read_exact(2).await.unwrap(), None);
        assert_eq!(mock.read_exact(1).await.unwrap().unwrap().as_ref(), &[3]);
        assert!(mock.bytes_available().is_err());
    }

    #[tokio::test]
    async fn test_mock_records_writes() {
        let mut mock = MockTransport::new();
        mock.write_all(&[0x00]).await.unwrap();
        mock.write_all(&[0x40]).await.unwrap();
        assert_eq!(mock.written_bytes(), vec![0x00, 0x40]);

        mock.set_write_error(io::ErrorKind::BrokenPipe);
        assert!(mock.write_all(&[0x00]).await.is_err());
    }
}
