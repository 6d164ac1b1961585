use async_trait::async_trait;
use reqwest::{Request, Response};

/// Minimal seam over an HTTP transport so auth wrappers can be stacked.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, req: Request) -> reqwest::Result<Response>;
}
