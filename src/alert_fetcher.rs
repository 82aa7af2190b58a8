//! Alert fetcher
//!
//! Polls the remote alert endpoint and folds the returned `pattern` into the
//! [`AlertPattern`] buffer. Every failure is transient: the buffer is left as it
//! was and the next attempt happens on the normal interval.

use crate::BoardError;
use crate::alert_pattern::{AlertPattern, AlertPayload};
use crate::http::parse_response;
use log::{debug, info, warn};

/// Raw response buffer size; larger responses are cut off and fail to parse
pub const RESPONSE_BUFFER_LEN: usize = 2048;

/// Transport used to reach the alert endpoint
pub trait AlertSource {
    /// Send the GET request and read the raw HTTP response into `buf`
    ///
    /// Returns the number of bytes received.
    async fn get(&mut self, buf: &mut [u8]) -> Result<usize, BoardError>;
}

/// Result of one fetch attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Pattern applied to this many regions
    Updated(usize),
    /// Valid response without a `pattern` field
    NoData,
    /// Endpoint answered with a status other than 200
    HttpStatus(u16),
    /// Transport or parse failure
    Failed(BoardError),
}

/// Wraparound-safe "last fetch" timestamp in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollTimer {
    last_ms: u32,
    interval_ms: u32,
}

impl PollTimer {
    /// Timer whose reference point is tick zero
    pub const fn new(interval_ms: u32) -> Self {
        Self {
            last_ms: 0,
            interval_ms,
        }
    }

    /// At least one interval has passed since the last mark
    pub fn is_due(&self, now_ms: u32) -> bool {
        now_ms.wrapping_sub(self.last_ms) >= self.interval_ms
    }

    /// Record a fetch at `now_ms`
    pub fn mark(&mut self, now_ms: u32) {
        self.last_ms = now_ms;
    }

    pub fn last_ms(&self) -> u32 {
        self.last_ms
    }
}

/// Fetch the alert endpoint once and apply the result to `pattern`
pub async fn fetch_alerts<A>(source: &mut A, pattern: &mut AlertPattern) -> FetchOutcome
where
    A: AlertSource,
{
    let mut buf = [0u8; RESPONSE_BUFFER_LEN];

    let len = match source.get(&mut buf).await {
        Ok(len) => len,
        Err(e) => {
            warn!("[FETCH] Request failed: {}", e);
            return FetchOutcome::Failed(e);
        }
    };

    let response = match parse_response(&buf[..len]) {
        Ok(response) => response,
        Err(e) => {
            warn!("[FETCH] Malformed response ({} bytes)", len);
            return FetchOutcome::Failed(e);
        }
    };

    if response.status != 200 {
        warn!("[FETCH] Endpoint answered with status {}", response.status);
        return FetchOutcome::HttpStatus(response.status);
    }

    match AlertPayload::parse(response.body) {
        Ok(AlertPayload {
            pattern: Some(text),
        }) => {
            let updated = pattern.apply(text);
            info!(
                "[FETCH] Pattern applied to {} regions, {} active",
                updated,
                pattern.active_count()
            );
            FetchOutcome::Updated(updated)
        }
        Ok(AlertPayload { pattern: None }) => {
            debug!("[FETCH] Response carries no pattern field");
            FetchOutcome::NoData
        }
        Err(e) => {
            warn!("[FETCH] Response body is not an alert payload");
            FetchOutcome::Failed(e)
        }
    }
}

#[cfg(feature = "esp32c3")]
pub use board::HttpAlertSource;

#[cfg(feature = "esp32c3")]
mod board {
    use super::AlertSource;
    use crate::BoardError;
    use crate::http::{AlertUrl, format_get_request};
    use embassy_net::dns::DnsQueryType;
    use embassy_net::tcp::TcpSocket;
    use embassy_net::{IpAddress, Stack};
    use embassy_time::Duration;
    use embedded_io_async::Write;
    use log::{debug, warn};

    /// Socket I/O timeout for one request
    const SOCKET_TIMEOUT: Duration = Duration::from_secs(10);

    /// HTTP client for the alert endpoint over the station network stack
    pub struct HttpAlertSource {
        stack: Stack<'static>,
        url: &'static str,
    }

    impl HttpAlertSource {
        pub fn new(stack: Stack<'static>, url: &'static str) -> Self {
            Self { stack, url }
        }

        async fn resolve(&self, url: &AlertUrl<'_>) -> Result<IpAddress, BoardError> {
            if let Some(ip) = url.ipv4() {
                return Ok(IpAddress::Ipv4(ip));
            }
            let addresses = self
                .stack
                .dns_query(url.host, DnsQueryType::A)
                .await
                .map_err(|e| {
                    warn!("[FETCH] DNS lookup for {} failed: {:?}", url.host, e);
                    BoardError::HttpError
                })?;
            addresses.first().copied().ok_or(BoardError::HttpError)
        }
    }

    impl AlertSource for HttpAlertSource {
        async fn get(&mut self, buf: &mut [u8]) -> Result<usize, BoardError> {
            let url = AlertUrl::parse(self.url)?;
            let request = format_get_request(&url)?;
            let address = self.resolve(&url).await?;

            let mut rx_buffer = [0u8; 1536];
            let mut tx_buffer = [0u8; 512];
            let mut socket = TcpSocket::new(self.stack, &mut rx_buffer, &mut tx_buffer);
            socket.set_timeout(Some(SOCKET_TIMEOUT));

            debug!("[FETCH] Connecting to {}:{}", url.host, url.port);
            socket.connect((address, url.port)).await.map_err(|e| {
                warn!("[FETCH] Connect failed: {:?}", e);
                BoardError::HttpError
            })?;

            if let Err(e) = socket.write_all(request.as_bytes()).await {
                warn!("[FETCH] Write error: {:?}", e);
                socket.close();
                return Err(BoardError::HttpError);
            }

            let mut total = 0;
            while total < buf.len() {
                match socket.read(&mut buf[total..]).await {
                    Ok(0) => break,
                    Ok(n) => total += n,
                    Err(e) => {
                        warn!("[FETCH] Read error: {:?}", e);
                        socket.close();
                        return Err(BoardError::HttpError);
                    }
                }
            }
            socket.close();

            debug!("[FETCH] Received {} bytes", total);
            Ok(total)
        }
    }
}
