use crate::application::ports::ReachabilityProbe;
use crate::shared::config::NetworkConfig;
use crate::shared::error::AppError;
use async_trait::async_trait;
use tracing::debug;

/// Issues a `HEAD` against a known endpoint. Any response below 500 proves
/// the remote is reachable; captive portals typically fail on redirect or TLS.
pub struct HttpReachabilityProbe {
    client: reqwest::Client,
    url: String,
}

impl HttpReachabilityProbe {
    pub fn new(url: impl Into<String>, config: &NetworkConfig) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(config.probe_timeout())
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|err| AppError::Configuration(format!("probe client: {err}")))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn from_config(config: &NetworkConfig) -> Result<Option<Self>, AppError> {
        config
            .probe_url
            .as_deref()
            .map(|url| Self::new(url, config))
            .transpose()
    }
}

#[async_trait]
impl ReachabilityProbe for HttpReachabilityProbe {
    async fn probe(&self) -> bool {
        match self.client.head(&self.url).send().await {
            Ok(response) => {
                let status = response.status();
                let reachable = !status.is_server_error() && !status.is_redirection();
                debug!(
                    target: "fieldsync::network",
                    url = %self.url,
                    status = status.as_u16(),
                    reachable,
                    "reachability probe answered"
                );
                reachable
            }
            Err(err) => {
                debug!(
                    target: "fieldsync::network",
                    url = %self.url,
                    error = %err,
                    "reachability probe failed"
                );
                false
            }
        }
    }
}
