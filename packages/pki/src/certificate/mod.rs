//! X.509 certificate value type
//!
//! - `types`: immutable [`Certificate`] and the extension summaries it carries
//! - `parser`: DER/PEM decoding with x509-parser
//!
//! A [`Certificate`] is never mutated after parsing; clones share the
//! underlying DER and extracted fields.

pub(crate) mod parser;
pub mod types;

pub use types::{
    BasicConstraintsInfo, Certificate, ExtendedKeyUsageInfo, Fingerprint, KeyUsageInfo,
    SignatureAlgorithm,
};
