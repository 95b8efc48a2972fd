use std::path::PathBuf;

pub const SHARE_DIR_ENV: &str = "WEATHER_AGENT_SHARE_DIR";

pub fn get_share_dir() -> PathBuf {
    if let Some(path) = std::env::var_os(SHARE_DIR_ENV) {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".weather-agent")
}

pub async fn ensure_share_dir() -> std::io::Result<PathBuf> {
    let dir = get_share_dir();
    tokio::fs::create_dir_all(&dir).await?;
    Ok(dir)
}
