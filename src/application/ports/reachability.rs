use async_trait::async_trait;

/// Active connectivity check, independent of what the OS reports.
#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    async fn probe(&self) -> bool;
}
