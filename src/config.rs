use clap::Parser;

/// Serve a local terminal application in a browser.
#[derive(Parser, Debug, Clone)]
#[command(version, about)]
pub struct Config {
    /// Shell command used to launch the child application.
    #[arg(env = "GANGLION_COMMAND")]
    pub command: String,

    /// Host to bind the HTTP/websocket listener to.
    #[arg(long, env = "GANGLION_HOST", default_value = "localhost")]
    pub host: String,

    /// Port to bind the HTTP/websocket listener to.
    #[arg(long, env = "GANGLION_PORT", default_value_t = 8000)]
    pub port: u16,

    /// Public URL used to build the websocket URL shown on the landing page
    /// (defaults to `http://<host>:<port>`, or `http://<host>` for port 80).
    #[arg(long, env = "GANGLION_PUBLIC_URL")]
    pub public_url: Option<String>,

    /// Title shown on the landing page (defaults to the command string).
    #[arg(long, env = "GANGLION_TITLE")]
    pub title: Option<String>,

    /// Run the child with Textual's devtools/debug logging enabled.
    #[arg(long, env = "GANGLION_DEBUG", default_value_t = false)]
    pub debug: bool,

    /// Log level passed to the tracing env-filter.
    #[arg(long, env = "GANGLION_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON instead of human-readable text.
    #[arg(long, env = "GANGLION_LOG_JSON", default_value_t = false)]
    pub log_json: bool,
}

impl Config {
    /// Title to render on the landing page.
    pub fn effective_title(&self) -> String {
        self.title.clone().unwrap_or_else(|| self.command.clone())
    }

    /// The base `http(s)://host[:port]` URL this gateway is reachable at.
    pub fn public_url(&self) -> String {
        if let Some(ref url) = self.public_url {
            return url.clone();
        }
        if self.port == 80 {
            format!("http://{}", self.host)
        } else {
            format!("http://{}:{}", self.host, self.port)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_config(port: u16, public_url: Option<&str>) -> Config {
        Config {
            command: "echo hi".to_string(),
            host: "localhost".to_string(),
            port,
            public_url: public_url.map(str::to_string),
            title: None,
            debug: false,
            log_level: "info".to_string(),
            log_json: false,
        }
    }

    #[test]
    fn public_url_omits_port_80() {
        assert_eq!(make_config(80, None).public_url(), "http://localhost");
    }

    #[test]
    fn public_url_includes_nonstandard_port() {
        assert_eq!(make_config(8000, None).public_url(), "http://localhost:8000");
    }

    #[test]
    fn public_url_override_wins() {
        let cfg = make_config(8000, Some("https://example.com"));
        assert_eq!(cfg.public_url(), "https://example.com");
    }

    #[test]
    fn effective_title_falls_back_to_command() {
        assert_eq!(make_config(8000, None).effective_title(), "echo hi");
    }
}
