use std::fs::read_to_string;

use serde::Deserialize;

/// Listener configuration.
///
/// Every field has a default, so an empty toml document is a valid
/// configuration.
#[derive(Deserialize, Debug, Clone)]
pub struct Config {
    /// whether to verify the payload type
    ///
    /// The payload type of the first received packet becomes the
    /// reference; later packets carrying a different payload type are
    /// dropped and reported as invalid.
    #[serde(default = "Config::verify_payload_type")]
    pub verify_payload_type: bool,

    /// reception queue pressure bound
    ///
    /// How many packets may pile up in the reception queue while waiting
    /// for the next expected sequence number. Once the queue reaches this
    /// size the missing sequence number is declared lost and the stream
    /// advances.
    #[serde(default = "Config::max_buffered")]
    pub max_buffered: usize,

    /// receive buffer size for a single datagram
    ///
    /// Sized to fit a standard MTU sized payload.
    #[serde(default = "Config::buffer_size")]
    pub buffer_size: usize,

    /// kernel receive buffer size
    ///
    /// Applied to the socket with `SO_RCVBUF`. Multicast sources burst;
    /// an undersized kernel buffer drops packets before the library ever
    /// sees them.
    #[serde(default = "Config::receive_buffer")]
    pub receive_buffer: usize,

    #[serde(default)]
    pub stream: StreamConfig,
}

impl Config {
    fn verify_payload_type() -> bool {
        true
    }

    fn max_buffered() -> usize {
        25
    }

    fn buffer_size() -> usize {
        1400
    }

    fn receive_buffer() -> usize {
        1400 * 1024
    }

    /// Read the configuration from a toml file.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(&read_to_string(path)?)?)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            verify_payload_type: Self::verify_payload_type(),
            max_buffered: Self::max_buffered(),
            buffer_size: Self::buffer_size(),
            receive_buffer: Self::receive_buffer(),
            stream: StreamConfig::default(),
        }
    }
}

/// Byte stream facade configuration.
#[derive(Deserialize, Debug, Clone)]
pub struct StreamConfig {
    /// whether the stream discards its already-read prefix automatically
    #[serde(default = "StreamConfig::auto_flush")]
    pub auto_flush: bool,

    /// internal buffer size that triggers the automatic discard
    #[serde(default = "StreamConfig::auto_flush_threshold")]
    pub auto_flush_threshold: usize,
}

impl StreamConfig {
    fn auto_flush() -> bool {
        true
    }

    fn auto_flush_threshold() -> usize {
        1400 * 1024 * 15
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            auto_flush: Self::auto_flush(),
            auto_flush_threshold: Self::auto_flush_threshold(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert!(config.verify_payload_type);
        assert_eq!(config.max_buffered, 25);
        assert_eq!(config.buffer_size, 1400);
        assert_eq!(config.receive_buffer, 1400 * 1024);
        assert!(config.stream.auto_flush);
        assert_eq!(config.stream.auto_flush_threshold, 1400 * 1024 * 15);
    }

    #[test]
    fn partial_document_keeps_other_defaults() {
        let config: Config = toml::from_str(
            r#"
            max_buffered = 50

            [stream]
            auto_flush = false
            "#,
        )
        .unwrap();

        assert_eq!(config.max_buffered, 50);
        assert_eq!(config.buffer_size, 1400);
        assert!(!config.stream.auto_flush);
        assert_eq!(config.stream.auto_flush_threshold, 1400 * 1024 * 15);
    }
}
