use crate::reply::ReplyMode;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Reply builder configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplyConfig {
    /// Start Redis builders in RESP3 mode
    pub resp3: bool,

    /// Which replies are recorded for diagnostics
    pub reply_mode: ReplyMode,

    /// Number of recorded replies kept per builder
    pub record_capacity: usize,

    /// Initial capacity of the reply buffer (per connection)
    pub buffer_capacity: usize,

    /// Flush a batch early once it would grow past this many bytes.
    /// Aggregation scopes are never split.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_batch_size: Option<usize>,

    /// Scatter-gather entries accumulated before a forced flush
    pub max_iovecs: usize,
}

impl Default for ReplyConfig {
    fn default() -> Self {
        Self {
            resp3: false,
            reply_mode: ReplyMode::None,
            record_capacity: 16,
            buffer_capacity: 16 * 1024, // 16KB
            max_batch_size: None,
            max_iovecs: 1022, // IOV_MAX - 2
        }
    }
}

impl ReplyConfig {
    /// Load configuration from a TOML file
    ///
    /// # Example
    ///
    /// ```no_run
    /// use feox_reply::ReplyConfig;
    ///
    /// # fn main() -> anyhow::Result<()> {
    /// let config = ReplyConfig::from_file("reply.toml")?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: ReplyConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_iovecs < 2 {
            anyhow::bail!("max_iovecs must be >= 2");
        }

        if let Some(limit) = self.max_batch_size {
            if limit == 0 {
                anyhow::bail!("max_batch_size must be > 0");
            }
        }

        Ok(())
    }
}
