//! Certificate issuance
//!
//! - `request`: [`CertificateRequest`] and the fluent [`RequestBuilder`] with presets
//! - `serial`: per-issuer unique serial allocation
//! - `signing`: [`CertificateBuilder`] turning requests into signed bundles

pub mod request;
pub(crate) mod serial;
pub mod signing;

pub use request::{CertificateRequest, ExtendedKeyUsage, KeyUsage, RequestBuilder, SubjectName};
pub use signing::{CertificateBuilder, IssuerRef};
