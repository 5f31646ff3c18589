//! Stream configuration
//!
//! Plain options struct passed by value when a stream is created.

/// Default read size for `io::Read` token sources
pub const DEFAULT_CHUNK_SIZE: usize = 8192;

/// Options controlling how the driver feeds the buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamConfig {
    /// Run the collector on a node as soon as it is closed without roles
    pub collect_on_close: bool,
    /// Reject close tags whose name differs from the open element
    pub verify_close_names: bool,
    /// Skip whitespace-only text before it reaches the oracle
    pub drop_whitespace_text: bool,
    /// Bytes requested per read from an `io::Read` source
    pub read_chunk_size: usize,
}

impl StreamConfig {
    pub fn new() -> Self {
        StreamConfig {
            collect_on_close: true,
            verify_close_names: true,
            drop_whitespace_text: false,
            read_chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn with_collect_on_close(mut self, enabled: bool) -> Self {
        self.collect_on_close = enabled;
        self
    }

    pub fn with_verify_close_names(mut self, enabled: bool) -> Self {
        self.verify_close_names = enabled;
        self
    }

    pub fn with_drop_whitespace_text(mut self, enabled: bool) -> Self {
        self.drop_whitespace_text = enabled;
        self
    }

    pub fn with_read_chunk_size(mut self, size: usize) -> Self {
        self.read_chunk_size = size.max(1);
        self
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StreamConfig::default();
        assert!(config.collect_on_close);
        assert!(config.verify_close_names);
        assert!(!config.drop_whitespace_text);
        assert_eq!(config.read_chunk_size, DEFAULT_CHUNK_SIZE);
    }

    #[test]
    fn test_builder() {
        let config = StreamConfig::new()
            .with_collect_on_close(false)
            .with_drop_whitespace_text(true)
            .with_read_chunk_size(0);
        assert!(!config.collect_on_close);
        assert!(config.drop_whitespace_text);
        assert_eq!(config.read_chunk_size, 1);
    }
}
