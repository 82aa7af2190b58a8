//! Provisioning portal
//!
//! Routing and form handling are plain functions so they run on the host. The
//! `esp32c3` board layer wires them into an edge-http server on the setup access
//! point, next to a DHCP server and a captive DNS responder.

use crate::BoardError;
use crate::credentials::Credentials;
use heapless::Vec;
use log::{debug, info};

/// Decoded bytes kept per form field, enough to cut at 32 bytes on a char boundary
const MAX_FIELD_BYTES: usize = 64;

/// Longest request target the portal routes; a maximally escaped
/// `/save?ssid=...&pass=...` query fits
pub const MAX_TARGET_LEN: usize = 256;

/// Where captive probes are sent
pub const PORTAL_URL: &str = "http://192.168.4.1/";

/// Paths operating systems request to detect a captive portal
pub const CAPTIVE_PROBE_PATHS: &[&str] = &[
    "/generate_204",
    "/gen_204",
    "/hotspot-detect.html",
    "/ncsi.txt",
    "/connecttest.txt",
];

pub const FORM_PAGE: &str = "<!DOCTYPE html><html><head>\
<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\
<title>Alert Map Setup</title></head><body>\
<h1>Alert Map WiFi Setup</h1>\
<form action=\"/save\" method=\"POST\">\
<label>SSID <input type=\"text\" name=\"ssid\" maxlength=\"32\"></label><br>\
<label>Password <input type=\"password\" name=\"pass\" maxlength=\"32\"></label><br>\
<input type=\"submit\" value=\"Save\">\
</form></body></html>";

pub const SAVED_PAGE: &str = "<!DOCTYPE html><html><head>\
<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\
<title>Alert Map Setup</title></head><body>\
<h1>Saved</h1><p>Credentials stored. The device restarts now.</p>\
</body></html>";

pub const NOT_FOUND_PAGE: &str = "Not Found";

const HTML: &str = "text/html; charset=utf-8";
const TEXT: &str = "text/plain";

/// Request method as far as the portal cares
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortalMethod {
    Get,
    Post,
    Other,
}

/// Response to send back, plus the submission if this request was a save
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortalReply {
    pub status: u16,
    pub reason: &'static str,
    pub content_type: &'static str,
    pub location: Option<&'static str>,
    pub body: &'static str,
    pub credentials: Option<Credentials>,
}

impl PortalReply {
    fn page(body: &'static str) -> Self {
        Self {
            status: 200,
            reason: "OK",
            content_type: HTML,
            location: None,
            body,
            credentials: None,
        }
    }

    fn redirect(location: &'static str) -> Self {
        Self {
            status: 302,
            reason: "Found",
            content_type: TEXT,
            location: Some(location),
            body: "",
            credentials: None,
        }
    }

    fn not_found() -> Self {
        Self {
            status: 404,
            reason: "Not Found",
            content_type: TEXT,
            location: None,
            body: NOT_FOUND_PAGE,
            credentials: None,
        }
    }

    pub fn uri_too_long() -> Self {
        Self {
            status: 414,
            reason: "URI Too Long",
            content_type: TEXT,
            location: None,
            body: "URI Too Long",
            credentials: None,
        }
    }
}

/// Route one portal request
///
/// `/save` accepts any method: a POST reads the urlencoded body, anything else
/// reads the query string. Fields are never validated, an empty submission is
/// stored as is.
pub fn route(method: PortalMethod, target: &str, body: &[u8]) -> PortalReply {
    if target.len() > MAX_TARGET_LEN {
        debug!("[PORTAL] Rejecting a {} byte target", target.len());
        return PortalReply::uri_too_long();
    }
    let (path, query) = target.split_once('?').unwrap_or((target, ""));
    debug!("[PORTAL] {:?} {}", method, path);

    match path {
        "/" => PortalReply::page(FORM_PAGE),
        "/save" => {
            let form = match method {
                PortalMethod::Post => utf8_prefix(body),
                _ => query,
            };
            let credentials = parse_form(form);
            info!(
                "[PORTAL] Credentials submitted for SSID: {}",
                credentials.ssid
            );
            PortalReply {
                credentials: Some(credentials),
                ..PortalReply::page(SAVED_PAGE)
            }
        }
        probe if CAPTIVE_PROBE_PATHS.contains(&probe) => PortalReply::redirect(PORTAL_URL),
        _ => PortalReply::not_found(),
    }
}

/// Decode the `ssid` and `pass` fields of an urlencoded form
///
/// A missing field decodes as empty, each field keeps at most 32 bytes.
pub fn parse_form(form: &str) -> Credentials {
    let ssid = decode_component(form_field(form, "ssid").unwrap_or(""));
    let password = decode_component(form_field(form, "pass").unwrap_or(""));
    Credentials::new(utf8_prefix(&ssid), utf8_prefix(&password))
}

fn form_field<'a>(form: &'a str, name: &str) -> Option<&'a str> {
    form.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        (key == name).then_some(value)
    })
}

/// `+` is a space, `%XX` a byte; malformed escapes are kept literally
fn decode_component(raw: &str) -> Vec<u8, MAX_FIELD_BYTES> {
    let bytes = raw.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let byte = match bytes[i] {
            b'+' => {
                i += 1;
                b' '
            }
            b'%' => match (
                bytes.get(i + 1).and_then(hex_value),
                bytes.get(i + 2).and_then(hex_value),
            ) {
                (Some(high), Some(low)) => {
                    i += 3;
                    (high << 4) | low
                }
                _ => {
                    i += 1;
                    b'%'
                }
            },
            other => {
                i += 1;
                other
            }
        };
        if out.push(byte).is_err() {
            break;
        }
    }
    out
}

fn hex_value(byte: &u8) -> Option<u8> {
    char::from(*byte).to_digit(16).map(|digit| digit as u8)
}

fn utf8_prefix(bytes: &[u8]) -> &str {
    match core::str::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => core::str::from_utf8(&bytes[..e.valid_up_to()]).unwrap_or(""),
    }
}

/// Setup portal lifecycle as seen by the device loop
pub trait Portal {
    /// Bring up the portal services; later calls are no-ops
    async fn start(&mut self) -> Result<(), BoardError>;

    /// Take a pending submission, if any
    fn poll(&mut self) -> Option<Credentials>;
}

#[cfg(feature = "esp32c3")]
pub use board::{CredentialChannel, PortalServer};

#[cfg(feature = "esp32c3")]
mod board {
    use super::{MAX_TARGET_LEN, Portal, PortalMethod, PortalReply, route};
    use crate::BoardError;
    use crate::config;
    use crate::credentials::Credentials;
    use core::fmt::{Debug, Display};
    use core::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};
    use edge_http::Method;
    use edge_http::io::Error as HttpError;
    use edge_http::io::server::{Connection, Handler, Server};
    use edge_nal::{TcpBind, UdpBind};
    use edge_nal_embassy::{Tcp, TcpBuffers, Udp, UdpBuffers};
    use embassy_executor::Spawner;
    use embassy_net::Stack;
    use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
    use embassy_sync::channel::Channel;
    use embassy_time::{Duration, Timer};
    use embedded_io_async::{Read, Write};
    use log::{error, info, warn};

    /// Submissions travel from the HTTP task to the device loop through here
    pub type CredentialChannel = Channel<CriticalSectionRawMutex, Credentials, 1>;

    const FORM_BODY_LEN: usize = 256;

    /// Portal services on the access point network stack
    pub struct PortalServer {
        spawner: Spawner,
        stack: Stack<'static>,
        channel: &'static CredentialChannel,
        started: bool,
    }

    impl PortalServer {
        pub fn new(
            spawner: Spawner,
            stack: Stack<'static>,
            channel: &'static CredentialChannel,
        ) -> Self {
            Self {
                spawner,
                stack,
                channel,
                started: false,
            }
        }
    }

    impl Portal for PortalServer {
        async fn start(&mut self) -> Result<(), BoardError> {
            if self.started {
                return Ok(());
            }
            let ip = Ipv4Addr::from(config::PORTAL_IP);

            self.spawner
                .spawn(run_dhcp(self.stack, ip))
                .map_err(|_| BoardError::PortalError)?;
            self.spawner
                .spawn(run_captive_dns(self.stack, ip))
                .map_err(|_| BoardError::PortalError)?;
            self.spawner
                .spawn(run_http_server(self.stack, self.channel))
                .map_err(|_| BoardError::PortalError)?;
            self.started = true;

            self.stack.wait_config_up().await;
            info!("[PORTAL] Setup portal ready at http://{}/", ip);
            Ok(())
        }

        fn poll(&mut self) -> Option<Credentials> {
            self.channel.try_receive().ok()
        }
    }

    struct PortalHandler {
        channel: &'static CredentialChannel,
    }

    impl Handler for PortalHandler {
        type Error<E>
            = HttpError<E>
        where
            E: Debug;

        async fn handle<T, const N: usize>(
            &self,
            _task_id: impl Display + Copy,
            conn: &mut Connection<'_, T, N>,
        ) -> Result<(), Self::Error<T::Error>>
        where
            T: Read + Write,
        {
            let headers = conn.headers()?;
            let method = match headers.method {
                Method::Get => PortalMethod::Get,
                Method::Post => PortalMethod::Post,
                _ => PortalMethod::Other,
            };
            let target: Option<heapless::String<MAX_TARGET_LEN>> =
                heapless::String::try_from(headers.path).ok();

            let mut body = [0u8; FORM_BODY_LEN];
            let mut len = 0;
            if method == PortalMethod::Post {
                while len < body.len() {
                    match conn.read(&mut body[len..]).await? {
                        0 => break,
                        n => len += n,
                    }
                }
            }

            let reply = match target {
                Some(target) => route(method, &target, &body[..len]),
                None => PortalReply::uri_too_long(),
            };
            match reply.location {
                Some(location) => {
                    conn.initiate_response(
                        reply.status,
                        Some(reply.reason),
                        &[("Location", location)],
                    )
                    .await?
                }
                None => {
                    conn.initiate_response(
                        reply.status,
                        Some(reply.reason),
                        &[("Content-Type", reply.content_type)],
                    )
                    .await?
                }
            }
            conn.write_all(reply.body.as_bytes()).await?;

            if let Some(credentials) = reply.credentials {
                self.channel.send(credentials).await;
            }
            Ok(())
        }
    }

    #[embassy_executor::task]
    async fn run_http_server(stack: Stack<'static>, channel: &'static CredentialChannel) {
        static TCP_BUFFERS: static_cell::StaticCell<TcpBuffers<1, 2048, 2048>> =
            static_cell::StaticCell::new();
        let buffers = TCP_BUFFERS.uninit().write(TcpBuffers::new());

        let tcp = Tcp::new(stack, buffers);
        let mut acceptor = match tcp
            .bind(SocketAddr::new(
                IpAddr::V4(Ipv4Addr::UNSPECIFIED),
                config::HTTP_PORT,
            ))
            .await
        {
            Ok(acceptor) => acceptor,
            Err(e) => {
                error!("[PORTAL] HTTP bind failed: {:?}", e);
                return;
            }
        };

        let handler = PortalHandler { channel };
        let mut server = Server::<1, 2048, 32>::new();
        info!("[PORTAL] HTTP server listening on port {}", config::HTTP_PORT);

        loop {
            if let Err(e) = server.run(Some(50_000), &mut acceptor, &handler).await {
                warn!("[PORTAL] HTTP server error: {:?}", e);
                Timer::after(Duration::from_millis(100)).await;
            }
        }
    }

    #[embassy_executor::task]
    async fn run_dhcp(stack: Stack<'static>, ip: Ipv4Addr) {
        use edge_dhcp::io::{self, DEFAULT_SERVER_PORT};
        use edge_dhcp::server::{Server, ServerOptions};

        let mut buf = [0u8; 1500];
        let mut gw_buf = [Ipv4Addr::UNSPECIFIED];

        static UDP_BUFFERS: static_cell::StaticCell<UdpBuffers<3, 1024, 1024, 10>> =
            static_cell::StaticCell::new();
        let buffers = UDP_BUFFERS.uninit().write(UdpBuffers::new());
        let udp = Udp::new(stack, buffers);
        let mut socket = match udp
            .bind(SocketAddr::V4(SocketAddrV4::new(
                Ipv4Addr::UNSPECIFIED,
                DEFAULT_SERVER_PORT,
            )))
            .await
        {
            Ok(socket) => socket,
            Err(e) => {
                error!("[PORTAL] DHCP bind failed: {:?}", e);
                return;
            }
        };

        loop {
            if let Err(e) = io::server::run(
                &mut Server::<_, 64>::new_with_et(ip),
                &ServerOptions::new(ip, Some(&mut gw_buf)),
                &mut socket,
                &mut buf,
            )
            .await
            {
                warn!("[PORTAL] DHCP server error: {:?}", e);
            }
            Timer::after(Duration::from_millis(500)).await;
        }
    }

    #[embassy_executor::task]
    async fn run_captive_dns(stack: Stack<'static>, ip: Ipv4Addr) {
        let mut tx_buf = [0u8; 1500];
        let mut rx_buf = [0u8; 1500];

        static UDP_BUFFERS: static_cell::StaticCell<UdpBuffers<3, 1024, 1024, 10>> =
            static_cell::StaticCell::new();
        let buffers = UDP_BUFFERS.uninit().write(UdpBuffers::new());
        let udp = Udp::new(stack, buffers);
        info!("[PORTAL] Captive DNS answering every query with {}", ip);

        loop {
            if let Err(e) = edge_captive::io::run(
                &udp,
                SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, config::DNS_PORT)),
                &mut tx_buf,
                &mut rx_buf,
                ip,
                core::time::Duration::from_secs(60),
            )
            .await
            {
                warn!("[PORTAL] Captive DNS error: {:?}", e);
            }
            Timer::after(Duration::from_millis(500)).await;
        }
    }
}
