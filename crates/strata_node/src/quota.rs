use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use strata_core::constants::GIB;

/// Space offered for hosting, shared between the hoster and the local API.
#[derive(Clone, Debug)]
pub struct DiskQuota(Arc<AtomicU64>);

impl DiskQuota {
    pub fn from_gib(gib: f64) -> Self {
        Self(Arc::new(AtomicU64::new(gib_to_bytes(gib))))
    }

    pub fn bytes(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }

    pub fn gib(&self) -> f64 {
        self.bytes() as f64 / GIB as f64
    }

    pub fn set_gib(&self, gib: f64) {
        self.0.store(gib_to_bytes(gib), Ordering::SeqCst);
    }
}

fn gib_to_bytes(gib: f64) -> u64 {
    if gib.is_finite() && gib > 0.0 {
        (gib * GIB as f64) as u64
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_the_limit() {
        let quota = DiskQuota::from_gib(1.0);
        let handle = quota.clone();
        assert_eq!(quota.bytes(), GIB);

        handle.set_gib(0.5);
        assert_eq!(quota.bytes(), GIB / 2);
        assert!((quota.gib() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_negative_is_zero() {
        assert_eq!(DiskQuota::from_gib(-3.0).bytes(), 0);
        assert_eq!(DiskQuota::from_gib(f64::NAN).bytes(), 0);
    }
}
