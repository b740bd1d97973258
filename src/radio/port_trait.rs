//! Trait abstraction for serial port operations to enable testing

use async_trait::async_trait;
use std::io;

/// Trait for serial port I/O operations
#[async_trait]
pub trait SerialPortIO: Send {
    /// Write all data to the port
    async fn write_all(&mut self, data: &[u8]) -> io::Result<()>;

    /// Flush the output buffer
    async fn flush(&mut self) -> io::Result<()>;

    /// Read whatever is available into `buf`, returning the byte count
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Bytes waiting in the input buffer
    fn bytes_to_read(&self) -> io::Result<usize>;
}

/// Wrapper around tokio_serial::SerialStream that implements SerialPortIO
pub struct TokioSerialPort {
    port: tokio_serial::SerialStream,
}

impl TokioSerialPort {
    pub fn new(port: tokio_serial::SerialStream) -> Self {
        Self { port }
    }
}

#[async_trait]
impl SerialPortIO for TokioSerialPort {
    async fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        use tokio::io::AsyncWriteExt;
        self.port.write_all(data).await
    }

    async fn flush(&mut self) -> io::Result<()> {
        use tokio::io::AsyncWriteExt;
        self.port.flush().await
    }

    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        use tokio::io::AsyncReadExt;
        self.port.read(buf).await
    }

    fn bytes_to_read(&self) -> io::Result<usize> {
        use tokio_serial::SerialPort;
        Ok(self.port.bytes_to_read()? as usize)
    }
}

#[cfg(test)]
pub mod mocks {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Mock serial port for testing
    ///
    /// Reads drain `incoming`; an empty queue yields `Ok(0)` after a short
    /// sleep so callers polling under a timeout make progress.
    #[derive(Clone, Default)]
    pub struct MockSerialPort {
        pub written_data: Arc<Mutex<Vec<Vec<u8>>>>,
        pub incoming: Arc<Mutex<VecDeque<u8>>>,
        pub write_error: Arc<Mutex<Option<io::ErrorKind>>>,
        pub read_error: Arc<Mutex<Option<io::ErrorKind>>>,
    }

    impl MockSerialPort {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn get_written_data(&self) -> Vec<Vec<u8>> {
            self.written_data.lock().unwrap().clone()
        }

        /// Make bytes available to the next reads
        pub fn feed(&self, bytes: &[u8]) {
            self.incoming.lock().unwrap().extend(bytes.iter().copied());
        }

        pub fn set_write_error(&self, error: io::ErrorKind) {
            *self.write_error.lock().unwrap() = Some(error);
        }

        pub fn set_read_error(&self, error: io::ErrorKind) {
            *self.read_error.lock().unwrap() = Some(error);
        }
    }

    #[async_trait]
    impl SerialPortIO for MockSerialPort {
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

        async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if let Some(error) = self.read_error.lock().unwrap().take() {
                return Err(io::Error::new(error, "Mock read error"));
            }

            let count = {
                let mut incoming = self.incoming.lock().unwrap();
                let count = incoming.len().min(buf.len());
                for (slot, byte) in buf.iter_mut().zip(incoming.drain(..count)) {
                    *slot = byte;
                }
                count
            };

            if count == 0 {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
            Ok(count)
        }

        fn bytes_to_read(&self) -> io::Result<usize> {
            Ok(self.incoming.lock().unwrap().len())
        }
    }
}
