use auth_proxy::{config::ProxyConfig, init_proxy, init_tracing};
use std::env;
use std::path::PathBuf;
use std::process;

const DEFAULT_CONFIG_PATH: &str = "config/auth-proxy.yaml";

#[tokio::main]
async fn main() {
    // Explicit path from the command line, else the default file when it exists
    let config_path = env::args().nth(1).map(PathBuf::from).or_else(|| {
        let default = PathBuf::from(DEFAULT_CONFIG_PATH);
        default.exists().then_some(default)
    });

    let config = match ProxyConfig::load(config_path.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            eprintln!("Usage: auth-proxy [config_file]");
            process::exit(1);
        }
    };

    init_tracing(&config.logging);

    if let Err(e) = init_proxy(config).await {
        eprintln!("Auth proxy error: {}", e);
        process::exit(1);
    }
}
