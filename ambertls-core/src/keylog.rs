//! NSS key-log output for traffic analysis tooling.
//!
//! Lines follow the SSLKEYLOGFILE format consumed by Wireshark:
//! `<LABEL> <client_random hex> <secret hex>`.

use std::io::Write;
use std::sync::Mutex;

/// Key-log labels emitted during a TLS 1.3 handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyLogLabel {
    /// client_early_traffic_secret
    ClientEarlyTrafficSecret,
    /// client_handshake_traffic_secret
    ClientHandshakeTrafficSecret,
    /// server_handshake_traffic_secret
    ServerHandshakeTrafficSecret,
    /// client_application_traffic_secret_0
    ClientTrafficSecret0,
    /// server_application_traffic_secret_0
    ServerTrafficSecret0,
    /// exporter_master_secret
    ExporterSecret,
}

impl KeyLogLabel {
    /// The NSS label string.
    pub const fn as_str(self) -> &'static str {
        match self {
            KeyLogLabel::ClientEarlyTrafficSecret => "CLIENT_EARLY_TRAFFIC_SECRET",
            KeyLogLabel::ClientHandshakeTrafficSecret => "CLIENT_HANDSHAKE_TRAFFIC_SECRET",
            KeyLogLabel::ServerHandshakeTrafficSecret => "SERVER_HANDSHAKE_TRAFFIC_SECRET",
            KeyLogLabel::ClientTrafficSecret0 => "CLIENT_TRAFFIC_SECRET_0",
            KeyLogLabel::ServerTrafficSecret0 => "SERVER_TRAFFIC_SECRET_0",
            KeyLogLabel::ExporterSecret => "EXPORTER_SECRET",
        }
    }
}

/// Sink for handshake secrets.
///
/// Implementations must expect to be called from whatever thread drives
/// the connection.
pub trait KeyLog: Send + Sync {
    /// Record one secret.
    fn log(&self, label: KeyLogLabel, client_random: &[u8], secret: &[u8]);
}

/// Format one NSS key-log line (no trailing newline).
pub fn format_line(label: KeyLogLabel, client_random: &[u8], secret: &[u8]) -> String {
    let mut line = String::with_capacity(
        label.as_str().len() + 2 + client_random.len() * 2 + secret.len() * 2,
    );
    line.push_str(label.as_str());
    line.push(' ');
    for byte in client_random {
        line.push_str(&format!("{:02x}", byte));
    }
    line.push(' ');
    for byte in secret {
        line.push_str(&format!("{:02x}", byte));
    }
    line
}

/// Key log writing NSS lines to any writer (a file, stderr).
pub struct WriterKeyLog<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> std::fmt::Debug for WriterKeyLog<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriterKeyLog").finish_non_exhaustive()
    }
}

impl<W: Write + Send> WriterKeyLog<W> {
    /// Create a key log over `writer`.
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }
}

impl<W: Write + Send> KeyLog for WriterKeyLog<W> {
    fn log(&self, label: KeyLogLabel, client_random: &[u8], secret: &[u8]) {
        let line = format_line(label, client_random, secret);
        if let Ok(mut writer) = self.writer.lock() {
            // A full disk must not fail the handshake.
            let _ = writeln!(writer, "{}", line);
            let _ = writer.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex as StdMutex};

    #[test]
    fn test_line_format() {
        let line = format_line(
            KeyLogLabel::ClientHandshakeTrafficSecret,
            &[0x01, 0xAB],
            &[0xFF, 0x00],
        );
        assert_eq!(line, "CLIENT_HANDSHAKE_TRAFFIC_SECRET 01ab ff00");
    }

    #[test]
    fn test_writer_key_log_appends_lines() {
        #[derive(Clone)]
        struct Shared(Arc<StdMutex<Vec<u8>>>);
        impl Write for Shared {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                self.0.lock().unwrap().extend_from_slice(buf);
                Ok(buf.len())
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let sink = Shared(Arc::new(StdMutex::new(Vec::new())));
        let keylog = WriterKeyLog::new(sink.clone());
        keylog.log(KeyLogLabel::ServerTrafficSecret0, &[0x00], &[0x11]);
        keylog.log(KeyLogLabel::ExporterSecret, &[0x00], &[0x22]);

        let contents = String::from_utf8(sink.0.lock().unwrap().clone()).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "SERVER_TRAFFIC_SECRET_0 00 11");
        assert_eq!(lines[1], "EXPORTER_SECRET 00 22");
    }
}
