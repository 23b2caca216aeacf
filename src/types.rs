#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Default `EnvFilter` directive when `RUST_LOG` is unset.
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Which write verb a page is pushed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// PUT: upsert by the target's natural key.
    Update,
    /// POST: insert only.
    Insert,
}

impl WriteMode {
    pub fn for_natural_key(has_natural_key: bool) -> Self {
        if has_natural_key {
            WriteMode::Update
        } else {
            WriteMode::Insert
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WriteMode::Update => "update",
            WriteMode::Insert => "insert",
        }
    }
}
