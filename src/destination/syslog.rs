//! Syslog backend: UNIX/UDP/TCP transport with RFC3164-style framing.
//! No file locking applies to this backend.

use std::io::Write;
use std::net::{TcpStream, UdpSocket};
use std::os::unix::net::UnixDatagram;

use chrono::Utc;

use crate::error::{Error, ErrorKind, Severity};
use crate::record::Level;

use super::Backend;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyslogProtocol {
    Unix,
    Udp,
    Tcp,
}

enum Transport {
    Unix(UnixDatagram),
    Udp { socket: UdpSocket, target: String },
    Tcp(TcpStream),
}

pub struct SyslogDestination {
    transport: Transport,
    facility: u8,
    tag: String,
    hostname: String,
}

impl SyslogDestination {
    pub fn connect(protocol: SyslogProtocol, address: &str, facility: u8, tag: String) -> Result<Self, Error> {
        let transport = match protocol {
            SyslogProtocol::Unix => {
                let socket = UnixDatagram::unbound().map_err(|e| connect_err(address, e))?;
                socket.connect(address).map_err(|e| connect_err(address, e))?;
                Transport::Unix(socket)
            }
            SyslogProtocol::Udp => {
                let socket = UdpSocket::bind("0.0.0.0:0").map_err(|e| connect_err(address, e))?;
                Transport::Udp {
                    socket,
                    target: address.to_string(),
                }
            }
            SyslogProtocol::Tcp => {
                let stream = TcpStream::connect(address).map_err(|e| connect_err(address, e))?;
                Transport::Tcp(stream)
            }
        };
        Ok(SyslogDestination {
            transport,
            facility,
            tag,
            hostname: hostname(),
        })
    }

    /// Composes `<PRI>TIMESTAMP HOSTNAME TAG: MESSAGE\n`, where
    /// PRI = facility*8 | severity, and severity is derived from the
    /// record's level via [`Level::syslog_severity`].
    pub fn frame(&self, level: Level, message: &str) -> Vec<u8> {
        let pri = (self.facility as u16) * 8 + level.syslog_severity() as u16;
        let timestamp = Utc::now().to_rfc3339();
        format!(
            "<{pri}>{timestamp} {} {}: {message}\n",
            self.hostname, self.tag
        )
        .into_bytes()
    }
}

fn hostname() -> String {
    crate::process_info::get().hostname.clone()
}

fn connect_err(address: &str, e: std::io::Error) -> Error {
    Error::new(ErrorKind::SyslogConnection, "connect", Severity::Critical)
        .with_destination(address.to_string())
        .with_cause(e)
}

fn write_err(e: std::io::Error) -> Error {
    Error::new(ErrorKind::SyslogWrite, "write", Severity::Medium).with_cause(e)
}

impl Backend for SyslogDestination {
    fn write_record(&mut self, record: &crate::record::Record, bytes: &[u8]) -> Result<(), Error> {
        let message = String::from_utf8_lossy(bytes);
        let framed = self.frame(record.level, message.trim_end_matches('\n'));
        match &mut self.transport {
            Transport::Unix(socket) => {
                socket.send(&framed).map_err(write_err)?;
            }
            Transport::Udp { socket, target } => {
                socket.send_to(&framed, target.as_str()).map_err(write_err)?;
            }
            Transport::Tcp(stream) => {
                stream.write_all(&framed).map_err(write_err)?;
            }
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), Error> {
        if let Transport::Tcp(stream) = &mut self.transport {
            stream.flush().map_err(write_err)?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), Error> {
        self.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_matches_rfc3164_shape() {
        let dest = SyslogDestination {
            transport: Transport::Udp {
                socket: UdpSocket::bind("0.0.0.0:0").unwrap(),
                target: "127.0.0.1:1".to_string(),
            },
            facility: 1,
            tag: "myapp".to_string(),
            hostname: "myhost".to_string(),
        };
        let framed = String::from_utf8(dest.frame(Level::Error, "disk full")).unwrap();
        assert!(framed.starts_with(&format!("<{}>", 1 * 8 + 3)));
        assert!(framed.contains("myhost myapp: disk full"));
    }

    #[test]
    fn priority_uses_level_severity_mapping() {
        let dest = SyslogDestination {
            transport: Transport::Udp {
                socket: UdpSocket::bind("0.0.0.0:0").unwrap(),
                target: "127.0.0.1:1".to_string(),
            },
            facility: 0,
            tag: "t".to_string(),
            hostname: "h".to_string(),
        };
        assert!(dest.frame(Level::Info, "m").starts_with(b"<6>"));
        assert!(dest.frame(Level::Warn, "m").starts_with(b"<4>"));
    }
}
