//! Line-framed TCP relay sink.
//!
//! Wire format, one exchange per block:
//!
//! ```text
//! client: SEND <recipient> <label> <length>\n<length raw bytes>
//! relay:  OK\n            (accepted)
//!         ERR <reason>\n  (refused)
//! ```

use super::{DeliveryError, NetworkSink, SinkOutcome};
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

/// Longest relay reply line accepted.
const MAX_REPLY: u64 = 512;

/// Sends blocks to a relay over plain TCP.
#[derive(Debug, Clone)]
pub struct TcpRelaySink {
    address: String,
    timeout: Duration,
}

impl TcpRelaySink {
    pub fn new(address: impl Into<String>, timeout: Duration) -> Self {
        Self {
            address: address.into(),
            timeout,
        }
    }

    fn connect(&self) -> Result<TcpStream, DeliveryError> {
        let addrs = self
            .address
            .to_socket_addrs()
            .map_err(|e| transport(&self.address, e))?;

        let mut last_err = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.timeout) {
                Ok(stream) => return Ok(stream),
                Err(e) => last_err = Some(e),
            }
        }
        Err(match last_err {
            Some(e) => transport(&self.address, e),
            None => DeliveryError::Transport(format!("{}: no address resolved", self.address)),
        })
    }
}

impl NetworkSink for TcpRelaySink {
    fn deliver_network(
        &self,
        bytes: &[u8],
        recipient_key: &str,
        block_label: &str,
    ) -> Result<SinkOutcome, DeliveryError> {
        if recipient_key.split_whitespace().count() != 1 || block_label.contains(char::is_whitespace)
        {
            return Err(DeliveryError::Transport(
                "recipient key and label must be single tokens".to_string(),
            ));
        }

        let mut stream = self.connect()?;
        stream
            .set_read_timeout(Some(self.timeout))
            .and_then(|_| stream.set_write_timeout(Some(self.timeout)))
            .map_err(|e| transport(&self.address, e))?;

        let header = format!("SEND {recipient_key} {block_label} {}\n", bytes.len());
        stream
            .write_all(header.as_bytes())
            .and_then(|_| stream.write_all(bytes))
            .and_then(|_| stream.flush())
            .map_err(|e| transport(&self.address, e))?;

        let mut reply = String::new();
        BufReader::new((&mut stream).take(MAX_REPLY))
            .read_line(&mut reply)
            .map_err(|e| transport(&self.address, e))?;

        match reply.trim_end() {
            "OK" => {
                tracing::debug!(label = block_label, bytes = bytes.len(), "Relay accepted block");
                Ok(SinkOutcome::Delivered)
            }
            "" => Err(DeliveryError::Transport(format!(
                "{}: connection closed without reply",
                self.address
            ))),
            other => Err(DeliveryError::Transport(format!(
                "{}: relay refused block: {other}",
                self.address
            ))),
        }
    }
}

fn transport(address: &str, e: std::io::Error) -> DeliveryError {
    DeliveryError::Transport(format!("{address}: {e}"))
}
