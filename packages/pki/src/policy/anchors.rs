//! Trust anchor set

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::certificate::{Certificate, Fingerprint};
use crate::error::StoreError;
use crate::store::import_pem_chain;

/// Root certificates trusted by a policy, keyed by fingerprint
///
/// Cloning is cheap; adding an anchor produces a new set.
#[derive(Debug, Clone, Default)]
pub struct TrustAnchorSet {
    anchors: Arc<BTreeMap<Fingerprint, Certificate>>,
}

impl TrustAnchorSet {
    /// Empty set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every certificate of a PEM bundle
    ///
    /// # Errors
    ///
    /// Returns `MalformedEncoding` if any certificate cannot be parsed
    pub fn from_pem(pem_data: &str) -> Result<Self, StoreError> {
        Ok(import_pem_chain(pem_data)?.into_iter().collect())
    }

    /// Copy of this set with `anchor` added
    #[must_use]
    pub fn with(&self, anchor: Certificate) -> Self {
        let mut anchors = BTreeMap::clone(&self.anchors);
        anchors.insert(anchor.fingerprint(), anchor);
        Self {
            anchors: Arc::new(anchors),
        }
    }

    /// Whether `certificate` is in the set
    #[must_use]
    pub fn contains(&self, certificate: &Certificate) -> bool {
        self.anchors.contains_key(&certificate.fingerprint())
    }

    /// Anchors whose subject name equals `subject_raw`
    pub fn by_subject<'a>(
        &'a self,
        subject_raw: &'a [u8],
    ) -> impl Iterator<Item = &'a Certificate> + 'a {
        self.anchors
            .values()
            .filter(move |anchor| anchor.subject_raw() == subject_raw)
    }

    /// All anchors ordered by fingerprint
    pub fn iter(&self) -> impl Iterator<Item = &Certificate> {
        self.anchors.values()
    }

    /// Number of anchors
    #[must_use]
    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    /// Whether the set is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }
}

impl FromIterator<Certificate> for TrustAnchorSet {
    fn from_iter<I: IntoIterator<Item = Certificate>>(iter: I) -> Self {
        Self {
            anchors: Arc::new(
                iter.into_iter()
                    .map(|anchor| (anchor.fingerprint(), anchor))
                    .collect(),
            ),
        }
    }
}
