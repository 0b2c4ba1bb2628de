//! One-time codec initialization shared by concurrent callers.
//!
//! [`InitGate`] runs an async init routine at most once at a time. Callers
//! arriving while it runs await the same shared future. A failed attempt puts
//! the gate back to idle so the next caller retries; a successful one makes
//! every later call return immediately.
//!
//! [`Converter`] pairs a codec with its gate and is what the HTTP service and
//! the interactive session hold.

use super::backend::{Codec, CodecError};
use super::operations::{CancellationToken, Conversion, ConvertError, convert_image};
use super::params::ConvertOptions;
use crate::types::SourceFormat;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InitError {
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("initialization task failed: {0}")]
    Task(String),
}

type InitFuture = BoxFuture<'static, Result<(), InitError>>;
type InitFn = Box<dyn Fn() -> InitFuture + Send + Sync>;

enum GateState {
    Idle,
    Pending {
        generation: u64,
        future: Shared<InitFuture>,
    },
    Ready,
}

struct GateInner {
    state: GateState,
    generation: u64,
}

pub struct InitGate {
    init: InitFn,
    inner: Mutex<GateInner>,
}

impl InitGate {
    pub fn new<F>(init: F) -> Self
    where
        F: Fn() -> InitFuture + Send + Sync + 'static,
    {
        Self {
            init: Box::new(init),
            inner: Mutex::new(GateInner {
                state: GateState::Idle,
                generation: 0,
            }),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.inner.lock().state, GateState::Ready)
    }

    /// Resolve once the init routine has succeeded.
    ///
    /// Every caller waiting on the same attempt gets the same result.
    pub async fn ensure_initialized(&self) -> Result<(), InitError> {
        let (generation, future) = {
            let mut inner = self.inner.lock();
            let pending = match &inner.state {
                GateState::Ready => return Ok(()),
                GateState::Pending { generation, future } => Some((*generation, future.clone())),
                GateState::Idle => None,
            };
            match pending {
                Some(pending) => pending,
                None => {
                    inner.generation += 1;
                    let generation = inner.generation;
                    log::debug!("starting initialization attempt {generation}");
                    let future = (self.init)().shared();
                    inner.state = GateState::Pending {
                        generation,
                        future: future.clone(),
                    };
                    (generation, future)
                }
            }
        };

        let result = future.await;

        let mut inner = self.inner.lock();
        let current = matches!(
            &inner.state,
            GateState::Pending { generation: g, .. } if *g == generation
        );
        if current {
            inner.state = match &result {
                Ok(()) => GateState::Ready,
                Err(e) => {
                    log::warn!("initialization failed, will retry on next call: {e}");
                    GateState::Idle
                }
            };
        }
        result
    }
}

/// A codec plus the gate that initializes it.
pub struct Converter<C> {
    codec: Arc<C>,
    gate: InitGate,
}

impl<C: Codec + 'static> Converter<C> {
    pub fn new(codec: C) -> Self {
        let codec = Arc::new(codec);
        let for_init = Arc::clone(&codec);
        let gate = InitGate::new(move || {
            let codec = Arc::clone(&for_init);
            async move {
                log::info!("initializing {} codec", codec.name());
                tokio::task::spawn_blocking(move || codec.init())
                    .await
                    .map_err(|e| InitError::Task(e.to_string()))??;
                Ok::<(), InitError>(())
            }
            .boxed()
        });
        Self { codec, gate }
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    pub async fn ensure_ready(&self) -> Result<(), InitError> {
        self.gate.ensure_initialized().await
    }

    /// Run [`convert_image`] on the blocking pool.
    ///
    /// Does not touch the gate; call [`ensure_ready`](Self::ensure_ready) first.
    pub async fn convert<B>(
        &self,
        bytes: B,
        format: SourceFormat,
        options: ConvertOptions,
        cancel: Option<CancellationToken>,
    ) -> Result<Conversion, ConvertError>
    where
        B: AsRef<[u8]> + Send + 'static,
    {
        let codec = Arc::clone(&self.codec);
        let task = tokio::task::spawn_blocking(move || {
            convert_image(
                codec.as_ref(),
                bytes.as_ref(),
                format,
                &options,
                cancel.as_ref(),
            )
        });
        match task.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(_) => Err(ConvertError::Cancelled),
        }
    }
}
