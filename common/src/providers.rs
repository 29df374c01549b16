//! Capability interfaces for external collaborators.
//!
//! The pipeline never performs network I/O itself: LLM invocation and
//! OHLCV fetch are supplied through these traits, and their retry and
//! timeout policy belongs entirely to the caller.

use crate::error::UpstreamUnavailable;
use crate::market::{Candle, Timeframe};
use async_trait::async_trait;

/// Language-model provider. Concrete providers are swappable variants.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Submit a prompt and return the raw response text. This crate never
    /// retries a failed call.
    async fn submit(&self, prompt: &str) -> Result<String, UpstreamUnavailable>;
}

/// Market-data fetcher for OHLCV series.
#[async_trait]
pub trait MarketDataFetcher: Send + Sync {
    /// Fetch up to `limit` candles, ordered oldest first.
    async fn fetch_ohlcv(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<Candle>, UpstreamUnavailable>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CannedProvider {
        response: String,
    }

    #[async_trait]
    impl LlmProvider for CannedProvider {
        async fn submit(&self, _prompt: &str) -> Result<String, UpstreamUnavailable> {
            Ok(self.response.clone())
        }
    }

    struct UnavailableFetcher;

    #[async_trait]
    impl MarketDataFetcher for UnavailableFetcher {
        async fn fetch_ohlcv(
            &self,
            _symbol: &str,
            _timeframe: Timeframe,
            _limit: usize,
        ) -> Result<Vec<Candle>, UpstreamUnavailable> {
            Err(UpstreamUnavailable::NotAvailable)
        }
    }

    #[tokio::test]
    async fn test_provider_trait_objects() {
        let provider: Box<dyn LlmProvider> = Box::new(CannedProvider {
            response: "ok".to_string(),
        });
        assert_eq!(provider.submit("prompt").await.unwrap(), "ok");

        let fetcher: Box<dyn MarketDataFetcher> = Box::new(UnavailableFetcher);
        let err = fetcher
            .fetch_ohlcv("BTC/USDT", Timeframe::H1, 50)
            .await
            .unwrap_err();
        assert_eq!(err, UpstreamUnavailable::NotAvailable);
    }
}
