//! Synthesis through the server's speech endpoint

use super::SpeechSynthesizer;
use crate::api_client::ApiClient;
use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;

#[derive(Debug, Clone)]
pub struct HttpSynthesizer {
    api: ApiClient,
}

impl HttpSynthesizer {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

#[async_trait]
impl SpeechSynthesizer for HttpSynthesizer {
    async fn synthesize(&self, text: &str, voice: &str) -> Result<Bytes> {
        self.api.synthesize(text, voice).await
    }
}
