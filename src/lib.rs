//! `azpipe` is the HTTP request/response pipeline shared by service SDK
//! clients: an ordered chain of policies (retry, authorization, logging,
//! URL rewriting, user agent, cookies, request id, timeout) that every call
//! passes through on its way to the wire and back.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::time::Duration;
//! use azpipe::prelude::{RetryConfig, ServiceClient, UserAgentConfig};
//! use serde::Deserialize;
//!
//! #[derive(Debug, Deserialize)]
//! struct Secret {
//!     value: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = ServiceClient::builder("https://my-vault.vault.example.com")
//!         .bearer_token("token-from-somewhere")
//!         .user_agent(UserAgentConfig::new("my-sdk/1.0").with_platform_info())
//!         .retry(
//!             RetryConfig::standard()
//!                 .max_retries(3)
//!                 .base_delay(Duration::from_millis(100))
//!                 .max_delay(Duration::from_secs(2)),
//!         )
//!         .timeout(Duration::from_secs(10))
//!         .try_build()?;
//!
//!     let secret: Secret = client
//!         .send(client.get("/secrets/db-password").query_pair("api-version", "7.4"))
//!         .await?
//!         .json()
//!         .await?;
//!
//!     println!("fetched {} bytes", secret.value.len());
//!     Ok(())
//! }
//! ```
//!
//! # Building a pipeline by hand
//!
//! [`Pipeline::builder`] takes any [`Transport`] and an ordered list of
//! [`PolicyFactory`] values. The first policy added is the outermost: it
//! sees the request first and the response last. Put URL-shape policies
//! before anything that signs the final URL.

mod blocking;
mod body;
mod client;
mod cookie;
mod credential;
mod error;
mod headers;
#[cfg(feature = "hyper-transport")]
mod hyper_transport;
mod options;
mod pipeline;
pub mod policy;
mod request;
mod response;
mod transport;
mod url_parts;
mod util;

pub use crate::blocking::BlockingPipeline;
pub use crate::body::{BodyContent, ByteStream, RequestBody, ResponseBody};
pub use crate::client::{ClientBuilder, ServiceClient};
pub use crate::cookie::CookieStore;
pub use crate::credential::{
    AccessToken, BasicCredential, CachedTokenCredential, Credential, StaticCredential, TokenSource,
};
pub use crate::error::{BoxError, Error, ErrorCode, TransportErrorKind};
pub use crate::headers::HttpHeaders;
#[cfg(feature = "hyper-transport")]
pub use crate::hyper_transport::{HyperTransport, HyperTransportBuilder};
pub use crate::options::{LogSink, PipelineOptions, TracingLogSink};
pub use crate::pipeline::{Pipeline, PipelineBuilder};
pub use crate::policy::{PolicyFactory, RequestPolicy};
pub use crate::request::{Deadline, Request};
pub use crate::response::Response;
pub use crate::transport::Transport;
pub use crate::url_parts::UrlParts;

pub type Result<T> = std::result::Result<T, Error>;

pub mod prelude {
    #[cfg(feature = "hyper-transport")]
    pub use crate::HyperTransport;
    pub use crate::policy::{
        BearerConfig, CookieConfig, HostConfig, LogDetailLevel, LoggingConfig, PortConfig,
        ProtocolConfig, RequestIdConfig, RetryClassifier, RetryConfig, RetryDecision,
        StatusConfig, TimeoutConfig, UserAgentConfig,
    };
    pub use crate::{
        BlockingPipeline, ClientBuilder, Credential, Error, ErrorCode, HttpHeaders, LogSink,
        Pipeline, PipelineOptions, PolicyFactory, Request, RequestBody, RequestPolicy, Response,
        Result, ServiceClient, StaticCredential, Transport, TransportErrorKind,
    };
}
