use std::time::Duration;

/// Transport configuration for the OpenCode sidecar.
#[derive(Debug, Clone)]
pub struct OpencodeConfig {
    /// Executable used to launch the server.
    pub command: String,
    /// Extra arguments appended after `serve --port ... --hostname ...`.
    pub extra_args: Vec<String>,
    pub hostname: String,
    pub port: u16,
    /// Optional `provider/model` override sent with every message.
    pub model: Option<String>,
    /// How long to poll the health endpoint after spawning the server.
    pub startup_timeout: Duration,
    /// Timeout for one message round trip.
    pub request_timeout: Duration,
}

impl Default for OpencodeConfig {
    fn default() -> Self {
        Self {
            command: "opencode".to_string(),
            extra_args: Vec::new(),
            hostname: "127.0.0.1".to_string(),
            port: 4096,
            model: None,
            startup_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(120),
        }
    }
}

impl OpencodeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = command.into();
        self
    }

    pub fn with_extra_arg(mut self, arg: impl Into<String>) -> Self {
        self.extra_args.push(arg.into());
        self
    }

    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Base URL of the sidecar, e.g. `http://127.0.0.1:4096`.
    #[must_use]
    pub fn server_url(&self) -> String {
        format!("http://{}:{}", self.hostname, self.port)
    }
}
