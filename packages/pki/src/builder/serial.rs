//! Serial number allocation
//!
//! Serials are 128-bit random positive integers. The most recent serials of
//! each issuer key are remembered and never handed out again; older ones rely
//! on 126 bits of randomness.

use std::collections::{HashSet, VecDeque};

use dashmap::DashMap;
use rand::RngCore;
use sha2::{Digest, Sha256};

pub(crate) const SERIAL_LEN: usize = 16;

/// Serials remembered per issuer key
const REMEMBERED_SERIALS: usize = 1 << 16;

type Serial = [u8; SERIAL_LEN];

/// Identifies an issuer by the digest of its public key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct IssuerScope([u8; 32]);

impl IssuerScope {
    pub(crate) fn for_public_key(public_key_raw: &[u8]) -> Self {
        Self(Sha256::digest(public_key_raw).into())
    }
}

/// Insertion-ordered set that forgets its oldest entries past `capacity`
#[derive(Debug, Default)]
struct RecentSerials {
    order: VecDeque<Serial>,
    seen: HashSet<Serial>,
}

impl RecentSerials {
    fn remember(&mut self, serial: Serial, capacity: usize) -> bool {
        if !self.seen.insert(serial) {
            return false;
        }
        self.order.push_back(serial);
        if self.order.len() > capacity
            && let Some(oldest) = self.order.pop_front()
        {
            self.seen.remove(&oldest);
        }
        true
    }
}

#[derive(Debug)]
pub(crate) struct SerialAllocator {
    issued: DashMap<IssuerScope, RecentSerials>,
    capacity: usize,
}

impl Default for SerialAllocator {
    fn default() -> Self {
        Self::with_capacity(REMEMBERED_SERIALS)
    }
}

impl SerialAllocator {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            issued: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    pub(crate) fn allocate(&self, scope: IssuerScope) -> Serial {
        self.allocate_with(scope, || {
            let mut bytes = [0u8; SERIAL_LEN];
            rand::rng().fill_bytes(&mut bytes);
            bytes
        })
    }

    pub(crate) fn allocate_with<F>(&self, scope: IssuerScope, mut draw: F) -> Serial
    where
        F: FnMut() -> Serial,
    {
        let mut issued = self.issued.entry(scope).or_default();
        loop {
            let mut serial = draw();
            // Positive and exactly SERIAL_LEN bytes once DER-encoded
            serial[0] = (serial[0] & 0x7f) | 0x40;
            if issued.remember(serial, self.capacity) {
                return serial;
            }
            tracing::debug!("Serial collision for issuer, drawing again");
        }
    }

    #[cfg(test)]
    pub(crate) fn issued_count(&self, scope: IssuerScope) -> usize {
        self.issued.get(&scope).map_or(0, |recent| recent.seen.len())
    }
}
