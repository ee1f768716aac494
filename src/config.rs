use std::path::PathBuf;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8600";
pub const DEV_TOKEN: &str = "modport-dev-token";

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub token: String,
}

impl ClientConfig {
    /// Resolves configuration once at construction; the client treats it as
    /// read-only afterwards.
    pub fn resolve(base_url: Option<String>, token: Option<String>) -> Self {
        let base_url = base_url
            .or_else(|| std::env::var("MODPORT_BASE_URL").ok())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let token = token
            .or_else(|| std::env::var("MODPORT_TOKEN").ok())
            .or_else(|| read_token_file().ok())
            .unwrap_or_else(|| DEV_TOKEN.to_string());

        Self {
            base_url: normalize_base_url(&base_url),
            token: token.trim().to_string(),
        }
    }

    /// Header value for `Authorization`, with exactly one `Bearer ` prefix
    /// no matter how the token was stored.
    pub fn authorization_value(&self) -> String {
        bearer_value(&self.token)
    }
}

pub fn normalize_base_url(value: &str) -> String {
    value.trim_end_matches('/').to_string()
}

pub fn bearer_value(token: &str) -> String {
    let token = token.trim();
    if let Some(rest) = token.strip_prefix("Bearer ") {
        format!("Bearer {}", rest.trim())
    } else {
        format!("Bearer {}", token)
    }
}

pub fn read_token_file() -> std::io::Result<String> {
    let token = std::fs::read_to_string(token_path())?;
    let token = token.trim().to_string();
    if token.is_empty() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "token file is empty",
        ));
    }
    Ok(token)
}

pub fn write_token_file(token: &str) -> std::io::Result<()> {
    let path = token_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(&path)?;
    use std::io::Write;
    file.write_all(token.as_bytes())
}

fn token_path() -> PathBuf {
    if let Some(home) = std::env::var_os("HOME").or_else(|| std::env::var_os("USERPROFILE")) {
        return PathBuf::from(home).join(".modport").join("token");
    }

    PathBuf::from("modport.token")
}
