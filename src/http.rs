use crate::config::HttpConfig;
use reqwest::Client;

// The analytics API rejects some non-browser agents.
const USER_AGENT: &str = "Mozilla/5.0";

pub fn build_client(config: &HttpConfig) -> reqwest::Result<Client> {
    Client::builder()
        .timeout(config.timeout)
        .connect_timeout(config.connect_timeout)
        .user_agent(USER_AGENT)
        .build()
}
