//! Synchronous calling convention over a [`Pipeline`].

use crate::Result;
use crate::error::Error;
use crate::pipeline::Pipeline;
use crate::request::Request;
use crate::response::Response;

/// Drives a pipeline on a private current-thread runtime.
///
/// Responses come back buffered, so no body outlives the call. Must not be
/// used, or dropped, from inside an async context.
pub struct BlockingPipeline {
    pipeline: Pipeline,
    runtime: tokio::runtime::Runtime,
}

impl BlockingPipeline {
    pub fn new(pipeline: Pipeline) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|source| Error::Runtime { source })?;
        Ok(Self { pipeline, runtime })
    }

    pub fn send(&self, mut request: Request) -> Result<Response> {
        self.send_request(&mut request)
    }

    pub fn send_request(&self, request: &mut Request) -> Result<Response> {
        self.runtime.block_on(async {
            let mut response = self.pipeline.send_request(request).await?;
            response.buffer().await?;
            Ok(response)
        })
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }
}

impl std::fmt::Debug for BlockingPipeline {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("BlockingPipeline")
            .field("pipeline", &self.pipeline)
            .finish_non_exhaustive()
    }
}
