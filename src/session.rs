//! Interactive conversion session.
//!
//! Models a user tweaking settings and expecting a live preview: each new
//! request supersedes the previous one. A request waits out a short debounce
//! window first, so a burst of changes triggers one conversion, not many.
//!
//! ```text
//! submit A ──┬── debounce ── (superseded) → None
//! submit B ──┴───────── debounce ── init gate ── convert → Some(result)
//! ```
//!
//! Cancellation only stops delivery: a conversion already inside a codec stage
//! runs to the end of that stage, and its result is dropped.

use crate::config::SessionConfig;
use crate::imaging::{
    CancellationToken, Codec, Conversion, ConvertError, ConvertOptions, Converter, InitError,
};
use crate::types::SourceFormat;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error(transparent)]
    Init(#[from] InitError),
    #[error(transparent)]
    Convert(#[from] ConvertError),
}

pub struct ConversionSession<C> {
    converter: Arc<Converter<C>>,
    debounce: Duration,
    current: Mutex<Option<CancellationToken>>,
}

impl<C: Codec + 'static> ConversionSession<C> {
    pub fn new(converter: Arc<Converter<C>>, debounce: Duration) -> Self {
        Self {
            converter,
            debounce,
            current: Mutex::new(None),
        }
    }

    /// A session debounced by `[session] debounce_ms`.
    pub fn from_config(converter: Arc<Converter<C>>, config: &SessionConfig) -> Self {
        Self::new(converter, config.debounce())
    }

    /// Cancel whatever request is pending.
    pub fn cancel(&self) {
        if let Some(token) = self.current.lock().take() {
            token.cancel();
        }
    }

    /// Convert `bytes` unless a newer submit arrives first.
    ///
    /// Returns `None` when this request was superseded, either during the
    /// debounce window or while converting.
    pub async fn submit(
        &self,
        bytes: Vec<u8>,
        format: SourceFormat,
        options: ConvertOptions,
    ) -> Option<Result<Conversion, SessionError>> {
        let token = CancellationToken::new();
        if let Some(previous) = self.current.lock().replace(token.clone()) {
            previous.cancel();
        }

        tokio::time::sleep(self.debounce).await;
        if token.is_cancelled() {
            log::debug!("session request superseded during debounce");
            return None;
        }

        if let Err(e) = self.converter.ensure_ready().await {
            return Some(Err(e.into()));
        }

        let result = self
            .converter
            .convert(bytes, format, options, Some(token.clone()))
            .await;

        if token.is_cancelled() {
            log::debug!("session request superseded during conversion");
            return None;
        }
        Some(result.map_err(SessionError::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::CodecError;
    use crate::imaging::backend::tests::MockCodec;

    fn session(codec: MockCodec, debounce_ms: u64) -> ConversionSession<MockCodec> {
        ConversionSession::new(
            Arc::new(Converter::new(codec)),
            Duration::from_millis(debounce_ms),
        )
    }

    #[tokio::test]
    async fn single_submit_converts() {
        let session = session(MockCodec::new(), 10);
        let result = session
            .submit(b"640x480".to_vec(), SourceFormat::Png, ConvertOptions::default())
            .await;

        let conversion = result.expect("not superseded").unwrap();
        assert_eq!(conversion.converted.as_tuple(), (640, 480));
    }

    #[tokio::test]
    async fn newer_submit_supersedes_pending_one() {
        let session = session(MockCodec::new(), 50);

        let (first, second) = tokio::join!(
            session.submit(b"100x100".to_vec(), SourceFormat::Png, ConvertOptions::default()),
            async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                session
                    .submit(b"200x100".to_vec(), SourceFormat::Png, ConvertOptions::default())
                    .await
            }
        );

        assert!(first.is_none());
        let conversion = second.expect("latest request delivers").unwrap();
        assert_eq!(conversion.original.as_tuple(), (200, 100));
    }

    #[tokio::test]
    async fn explicit_cancel_drops_pending_request() {
        let session = session(MockCodec::new(), 30);

        let (result, ()) = tokio::join!(
            session.submit(b"100x100".to_vec(), SourceFormat::Png, ConvertOptions::default()),
            async {
                tokio::time::sleep(Duration::from_millis(5)).await;
                session.cancel();
            }
        );
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn init_failure_is_reported_then_retried() {
        let session = session(MockCodec::failing_init(1), 1);

        let first = session
            .submit(b"10x10".to_vec(), SourceFormat::Png, ConvertOptions::default())
            .await;
        assert!(matches!(
            first,
            Some(Err(SessionError::Init(InitError::Codec(CodecError::Init(_)))))
        ));

        let second = session
            .submit(b"10x10".to_vec(), SourceFormat::Png, ConvertOptions::default())
            .await;
        assert!(matches!(second, Some(Ok(_))));
    }

    #[tokio::test]
    async fn conversion_error_is_delivered() {
        let session = session(MockCodec::new(), 1);
        let result = session
            .submit(b"garbage".to_vec(), SourceFormat::Jpeg, ConvertOptions::default())
            .await;
        assert!(matches!(
            result,
            Some(Err(SessionError::Convert(ConvertError::Codec(
                CodecError::Decode(_)
            ))))
        ));
    }

    #[tokio::test]
    async fn configured_debounce_is_applied() {
        let config = SessionConfig { debounce_ms: 80 };
        let session = ConversionSession::from_config(Arc::new(Converter::new(MockCodec::new())), &config);

        // The second submit lands well inside the first one's debounce window.
        let (first, second) = tokio::join!(
            session.submit(b"100x100".to_vec(), SourceFormat::Png, ConvertOptions::default()),
            async {
                tokio::time::sleep(Duration::from_millis(30)).await;
                session
                    .submit(b"300x100".to_vec(), SourceFormat::Png, ConvertOptions::default())
                    .await
            }
        );

        assert!(first.is_none());
        let conversion = second.expect("latest request delivers").unwrap();
        assert_eq!(conversion.original.as_tuple(), (300, 100));
    }

    #[tokio::test]
    async fn zero_debounce_converts_immediately() {
        let config = SessionConfig { debounce_ms: 0 };
        let session = ConversionSession::from_config(Arc::new(Converter::new(MockCodec::new())), &config);

        let started = std::time::Instant::now();
        let result = session
            .submit(b"10x10".to_vec(), SourceFormat::Png, ConvertOptions::default())
            .await;

        assert!(matches!(result, Some(Ok(_))));
        assert!(started.elapsed() < Duration::from_millis(400));
    }
}
