//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (bind address resolution, error classification)
//!     → acceptor.rs (TLS handshake, peer certificate capture)
//!         ↳ reloader.rs supplies the server certificate per handshake
//!     → Hand off to the request pipeline
//! ```
//!
//! # Design Decisions
//! - TLS is optional and handled transparently
//! - Certificate rotation never restarts the listener
//! - Existing connections keep the certificate they handshook with

pub mod acceptor;
pub mod listener;
pub mod reloader;
pub mod tls;

pub use acceptor::{ClientCertAcceptor, PeerCertificates};
pub use reloader::KeypairReloader;
pub use tls::{CertificateInfo, TlsError};
