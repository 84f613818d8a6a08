//! Process-wide cache for repeated ElGamal transforms
//!
//! `rekey` and `rsk` each need a scalar multiplication by the ciphertext's
//! public key `y` (for rerandomization) and by the translated key `k * y`.
//! When many ciphertexts share the same recipient these multiplications hit
//! the same base points over and over, so a precomputed radix table pays for
//! itself after roughly twenty operations. This module keeps a bounded LRU of
//! those tables keyed on the packed point, shared by all handler threads.
//!
//! Metrics are pulled with [`EgCache::metrics`] rather than pushed to a
//! registry; the cache is called from every handler thread and must not block
//! on anything slower than its own mutex.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use lru::LruCache;
use rand::{CryptoRng, RngCore};

use crate::curve::{CurvePoint, CurveScalar, ScalarMultTable};
use crate::elgamal::{ElgamalEncryption, ElgamalTranslationKey};

const TABLE_CACHE_ENTRIES: usize = 256;

/// Usage counters for one cache family.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OfCache {
    /// Number of entries built, i.e. cache misses.
    pub generation: u64,
    /// Number of requests served.
    pub use_count: u64,
}

/// Snapshot of cache statistics, pulled by the metrics exporter.
#[derive(Clone, Copy, Debug, Default)]
pub struct Metrics {
    /// Counters of the RSK fast path.
    pub rsk: OfCache,
    /// Counters of the scalar-mult table cache.
    pub table: OfCache,
}

struct Counters {
    rsk_generation: AtomicU64,
    rsk_use: AtomicU64,
    table_generation: AtomicU64,
    table_use: AtomicU64,
}

/// Caching wrappers around the [`ElgamalEncryption`] transforms.
pub struct EgCache {
    tables: Mutex<LruCache<[u8; 32], Arc<ScalarMultTable>>>,
    counters: Counters,
}

impl EgCache {
    fn new() -> Self {
        EgCache {
            tables: Mutex::new(LruCache::new(
                NonZeroUsize::new(TABLE_CACHE_ENTRIES).expect("nonzero cache size"),
            )),
            counters: Counters {
                rsk_generation: AtomicU64::new(0),
                rsk_use: AtomicU64::new(0),
                table_generation: AtomicU64::new(0),
                table_use: AtomicU64::new(0),
            },
        }
    }

    /// The process-wide instance.
    pub fn global() -> &'static EgCache {
        static CACHE: OnceLock<EgCache> = OnceLock::new();
        CACHE.get_or_init(EgCache::new)
    }

    fn table(&self, point: &CurvePoint) -> (Arc<ScalarMultTable>, bool) {
        let key = point.pack();
        if let Some(table) = self.tables.lock().expect("table cache poisoned").get(&key) {
            return (Arc::clone(table), false);
        }
        // Build outside the lock; the radix precomputation is the expensive
        // part being cached.
        let table = Arc::new(point.scalar_mult_table());
        self.tables
            .lock()
            .expect("table cache poisoned")
            .put(key, Arc::clone(&table));
        (table, true)
    }

    /// Fetch or build the scalar-mult table for `point`. Entries are
    /// immutable after insertion and shared via `Arc`.
    pub fn scalar_mult_table(&self, point: &CurvePoint) -> Arc<ScalarMultTable> {
        self.counters.table_use.fetch_add(1, Ordering::Relaxed);
        let (table, built) = self.table(point);
        if built {
            self.counters.table_generation.fetch_add(1, Ordering::Relaxed);
        }
        table
    }

    /// Caching version of [`ElgamalEncryption::rerandomize`]: faster when
    /// called repeatedly with the same `eg.y`.
    pub fn rerandomize<R: RngCore + CryptoRng>(
        &self,
        eg: &ElgamalEncryption,
        rng: &mut R,
    ) -> ElgamalEncryption {
        let r = CurveScalar::random(rng);
        self.rerandomize_with(eg, &r)
    }

    /// Caching rerandomization with a caller-chosen scalar.
    pub fn rerandomize_with(&self, eg: &ElgamalEncryption, r: &CurveScalar) -> ElgamalEncryption {
        let y_table = self.scalar_mult_table(&eg.y);
        ElgamalEncryption {
            b: eg.b + CurvePoint::base_mult(r),
            c: eg.c + y_table.mult(r),
            y: eg.y,
        }
    }

    /// Caching version of `eg.rerandomize().rekey(k)`.
    pub fn rk<R: RngCore + CryptoRng>(
        &self,
        eg: &ElgamalEncryption,
        k: &ElgamalTranslationKey,
        rng: &mut R,
    ) -> ElgamalEncryption {
        self.rsk(eg, &CurveScalar::one(), k, rng)
    }

    /// Caching version of [`ElgamalEncryption::rsk`]. The rerandomization
    /// (`r * y`) and the key translation (`k * y`) both multiply the same
    /// cached base.
    pub fn rsk<R: RngCore + CryptoRng>(
        &self,
        eg: &ElgamalEncryption,
        s: &CurveScalar,
        k: &ElgamalTranslationKey,
        rng: &mut R,
    ) -> ElgamalEncryption {
        self.counters.rsk_use.fetch_add(1, Ordering::Relaxed);
        let (y_table, built) = self.table(&eg.y);
        if built {
            self.counters.rsk_generation.fetch_add(1, Ordering::Relaxed);
        }
        let r = CurveScalar::random(rng);
        let b = eg.b + CurvePoint::base_mult(&r);
        let c = eg.c + y_table.mult(&r);
        ElgamalEncryption {
            b: b.mult(&(*s * k.invert())),
            c: c.mult(s),
            y: y_table.mult(k),
        }
    }

    /// Pull the current counter values.
    pub fn metrics(&self) -> Metrics {
        Metrics {
            rsk: OfCache {
                generation: self.counters.rsk_generation.load(Ordering::Relaxed),
                use_count: self.counters.rsk_use.load(Ordering::Relaxed),
            },
            table: OfCache {
                generation: self.counters.table_generation.load(Ordering::Relaxed),
                use_count: self.counters.table_use.load(Ordering::Relaxed),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn cached_transforms_decrypt_like_the_plain_ones() {
        let mut rng = OsRng;
        let cache = EgCache::new();
        let (sk, pk) = ElgamalEncryption::create_key_pair(&mut rng);
        let m = CurvePoint::random(&mut rng);
        let enc = ElgamalEncryption::new(&pk, &m, &mut rng);
        let s = CurveScalar::random(&mut rng);
        let k = CurveScalar::random(&mut rng);

        assert_eq!(cache.rerandomize(&enc, &mut rng).decrypt(&sk), m);
        assert_eq!(cache.rk(&enc, &k, &mut rng).decrypt(&(k * sk)), m);
        assert_eq!(
            cache.rsk(&enc, &s, &k, &mut rng).decrypt(&(k * sk)),
            m.mult(&s)
        );
    }

    #[test]
    fn table_cache_counts_misses_once_per_point() {
        let mut rng = OsRng;
        let cache = EgCache::new();
        let p = CurvePoint::random(&mut rng);
        let before = cache.metrics();
        cache.scalar_mult_table(&p);
        cache.scalar_mult_table(&p);
        cache.scalar_mult_table(&p);
        let after = cache.metrics();
        assert_eq!(after.table.generation - before.table.generation, 1);
        assert_eq!(after.table.use_count - before.table.use_count, 3);
    }
}
