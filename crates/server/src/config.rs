#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub tick_rate_hz: u32,
    pub net_interval_ms: u32,
    pub max_clients: usize,
    pub cert_path: Option<String>,
    pub key_path: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: format!("0.0.0.0:{}", physx_core::DEFAULT_PORT),
            tick_rate_hz: 60,
            net_interval_ms: 100,
            max_clients: 32,
            cert_path: None,
            key_path: None,
        }
    }
}

impl ServerConfig {
    pub fn tick_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(1.0 / self.tick_rate_hz as f64)
    }

    pub fn net_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.net_interval_ms as u64)
    }
}
