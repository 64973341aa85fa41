//! OpenID Connect authorization-code + PKCE client core.
//!
//! The controller generates PKCE material and an anti-CSRF `state`, builds
//! the authorization redirect, checks the callback `state` before anything
//! touches the network, exchanges the code, and only commits an access token
//! that is unexpired and carries one of the required roles.
//!
//! Storage, HTTP and time are injected through [`KeyValueStore`],
//! [`Transport`] and [`Clock`]. Token signatures are not verified; claims are
//! trusted because the token came directly from the token endpoint.

pub mod callback;
pub mod clock;
pub mod config;
pub mod error;
pub mod flow;
pub mod request;
pub mod storage;
pub mod transport;

pub use callback::CallbackParams;
pub use clock::{Clock, SystemClock};
pub use config::{
    OidcEndpoints, DEFAULT_CLIENT_ID, OIDC_STATE_KEY, PKCE_VERIFIER_KEY, TOKEN_STORAGE_KEY,
};
pub use error::{OidcError, Result, StorageError};
pub use flow::{CallbackOutcome, FlowPhase, IdentitySync, OidcFlowController, OidcFlowOptions};
pub use request::AuthorizationRequest;
pub use storage::memory::MemoryStore;
#[cfg(feature = "sqlite")]
pub use storage::sqlite::SqliteStore;
pub use storage::traits::KeyValueStore;
#[cfg(feature = "http")]
pub use transport::http::ReqwestTransport;
pub use transport::{HttpResponse, Transport, TransportError};

pub use feed_auth::{AccessToken, ClaimsInspector, DecodedClaims, PkceMaterial, RandomSource};
pub use feed_crypto::DigestEngine;
