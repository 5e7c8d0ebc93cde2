//! # Row Synthesizer
//!
//! Produces batches of synthetic [`TransactionRecord`]s. The synthesizer is a
//! pure function of its random source: give it a seeded RNG and the same
//! `(start_id, batch_size)` calls yield the same rows.
//!
//! ```text
//! generate_batch(start_id = 1001, batch_size = 3)
//!
//!   id    user  product                  qty  price   timestamp
//!   1001  4821  Solar Power Bank           7  212.40  2024-03-02 11:09:51
//!   1002  1377  Robot Vacuum Cleaner      19   18.05  2023-08-17 02:44:10
//!   1003  9090  Leather Wallet Slim        2  731.99  2025-01-28 20:15:33
//! ```
//!
//! Every field except the id is drawn independently and uniformly from its
//! [`ValueDomains`] entry. Domains are validated when the synthesizer is
//! built, so a malformed catalog fails before the first batch exists.

use std::sync::Arc;

use chrono::{Duration, Local, NaiveDateTime, Timelike};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::{IntRange, ValueDomains};
use crate::error::Result;
use crate::types::{Batch, TransactionId, TransactionRecord, UnitPrice};

/// Batch generator over an injected random source.
pub struct RowSynthesizer<R> {
    rng: R,
    catalog: Vec<Arc<str>>,
    user_id: IntRange,
    quantity: IntRange,
    price_min: f64,
    price_max: f64,
    min_price: UnitPrice,
    max_price: UnitPrice,
    lookback: Duration,
    /// Fixed "now" for the lookback window; `None` reads the local clock per batch.
    anchor: Option<NaiveDateTime>,
}

impl RowSynthesizer<StdRng> {
    /// Builds a synthesizer over `StdRng`, seeded from `seed` or from the OS.
    pub fn seeded(domains: &ValueDomains, seed: Option<u64>) -> Result<Self> {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self::new(domains, rng)
    }
}

impl<R: Rng> RowSynthesizer<R> {
    /// Builds a synthesizer over `rng`.
    ///
    /// # Errors
    ///
    /// `Error::Configuration` if any domain is malformed (see
    /// [`ValueDomains::validate`]).
    pub fn new(domains: &ValueDomains, rng: R) -> Result<Self> {
        domains.validate()?;

        Ok(Self {
            rng,
            catalog: domains
                .products
                .iter()
                .map(|p| Arc::<str>::from(p.as_str()))
                .collect(),
            user_id: domains.user_id,
            quantity: domains.quantity,
            price_min: domains.unit_price.min,
            price_max: domains.unit_price.max,
            min_price: domains.unit_price.min_price(),
            max_price: domains.unit_price.max_price(),
            lookback: Duration::days(i64::from(domains.lookback_days)),
            anchor: None,
        })
    }

    /// Pins the end of the lookback window instead of reading the clock.
    pub fn with_anchor(mut self, now: NaiveDateTime) -> Self {
        self.anchor = Some(now);
        self
    }

    /// Produces exactly `batch_size` records with ids
    /// `[start_id, start_id + batch_size)`.
    pub fn generate_batch(&mut self, start_id: TransactionId, batch_size: usize) -> Batch {
        let now = self.window_end();
        let window_start = now - self.lookback;
        let window_secs = self.lookback.num_seconds();

        let records = (0..batch_size as u64)
            .map(|offset| self.sample_record(start_id.add(offset), window_start, window_secs))
            .collect();

        Batch::new(records)
    }

    fn window_end(&self) -> NaiveDateTime {
        let now = self
            .anchor
            .unwrap_or_else(|| Local::now().naive_local());
        // Sampling is in whole seconds; a sub-second "now" would let the last
        // second of the window overshoot it.
        now.with_nanosecond(0).unwrap_or(now)
    }

    fn sample_record(
        &mut self,
        transaction_id: TransactionId,
        window_start: NaiveDateTime,
        window_secs: i64,
    ) -> TransactionRecord {
        let user_id = self.rng.gen_range(self.user_id.min..=self.user_id.max);
        let product_name = Arc::clone(&self.catalog[self.rng.gen_range(0..self.catalog.len())]);
        let quantity = self.rng.gen_range(self.quantity.min..=self.quantity.max);

        let raw_price = self.rng.gen_range(self.price_min..=self.price_max);
        let unit_price = UnitPrice::from_f64_rounded(raw_price)
            .clamp(self.min_price, self.max_price);

        let offset = self.rng.gen_range(0..=window_secs);
        let transaction_timestamp = window_start + Duration::seconds(offset);

        TransactionRecord {
            transaction_id,
            user_id,
            product_name,
            quantity,
            unit_price,
            transaction_timestamp,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PriceRange;
    use crate::error::Error;
    use chrono::NaiveDate;

    fn anchor() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 6, 30)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn synthesizer(seed: u64) -> RowSynthesizer<StdRng> {
        RowSynthesizer::seeded(&ValueDomains::default(), Some(seed))
            .expect("default domains are valid")
            .with_anchor(anchor())
    }

    #[test]
    fn test_batch_has_exact_contiguous_ids() {
        let mut synth = synthesizer(1);
        let batch = synth.generate_batch(TransactionId::from_raw(1001), 1000);

        assert_eq!(batch.len(), 1000);
        assert_eq!(batch.first_id().unwrap().as_raw(), 1001);
        assert_eq!(batch.last_id().unwrap().as_raw(), 2000);
        assert!(batch.is_contiguous());
    }

    #[test]
    fn test_fields_stay_inside_domains() {
        let domains = ValueDomains::default();
        let mut synth = synthesizer(7);
        let batch = synth.generate_batch(TransactionId::FIRST, 5000);
        let window_start = anchor() - Duration::days(i64::from(domains.lookback_days));

        for r in batch.records() {
            assert!((1000..=9999).contains(&r.user_id), "user_id {}", r.user_id);
            assert!((1..=20).contains(&r.quantity), "quantity {}", r.quantity);
            assert!(
                r.unit_price.cents() >= 99 && r.unit_price.cents() <= 99_999,
                "price {}",
                r.unit_price
            );
            assert!(domains.products.iter().any(|p| p.as_str() == &*r.product_name));
            assert!(r.transaction_timestamp >= window_start);
            assert!(r.transaction_timestamp <= anchor());
        }
    }

    #[test]
    fn test_same_seed_same_rows() {
        let a = synthesizer(42).generate_batch(TransactionId::FIRST, 200);
        let b = synthesizer(42).generate_batch(TransactionId::FIRST, 200);
        let c = synthesizer(43).generate_batch(TransactionId::FIRST, 200);

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_every_product_is_reachable() {
        let mut synth = synthesizer(3);
        let batch = synth.generate_batch(TransactionId::FIRST, 5000);
        let seen: std::collections::HashSet<&str> =
            batch.records().iter().map(|r| &*r.product_name).collect();
        assert_eq!(seen.len(), 20);
    }

    #[test]
    fn test_degenerate_domains_still_sample() {
        let domains = ValueDomains {
            user_id: IntRange::new(5, 5),
            quantity: IntRange::new(3, 3),
            unit_price: PriceRange::new(9.99, 9.99),
            products: vec!["Only Thing".to_string()],
            lookback_days: 1,
        };
        let mut synth = RowSynthesizer::seeded(&domains, Some(0))
            .unwrap()
            .with_anchor(anchor());

        for r in synth.generate_batch(TransactionId::FIRST, 50).records() {
            assert_eq!(r.user_id, 5);
            assert_eq!(r.quantity, 3);
            assert_eq!(r.unit_price.to_string(), "9.99");
            assert_eq!(&*r.product_name, "Only Thing");
        }
    }

    #[test]
    fn test_empty_catalog_fails_fast() {
        let domains = ValueDomains {
            products: Vec::new(),
            ..ValueDomains::default()
        };
        let result = RowSynthesizer::seeded(&domains, Some(0));
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[test]
    fn test_inverted_price_and_huge_window_fail_fast() {
        let inverted = ValueDomains {
            unit_price: PriceRange::new(1.004, 1.001),
            ..ValueDomains::default()
        };
        assert!(matches!(
            RowSynthesizer::seeded(&inverted, Some(0)),
            Err(Error::Configuration(_))
        ));

        let huge_window = ValueDomains {
            lookback_days: 200_000_000,
            ..ValueDomains::default()
        };
        assert!(matches!(
            RowSynthesizer::seeded(&huge_window, Some(0)),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_longest_window_samples() {
        let domains = ValueDomains {
            lookback_days: crate::config::MAX_LOOKBACK_DAYS,
            ..ValueDomains::default()
        };
        let mut synth = RowSynthesizer::seeded(&domains, Some(9))
            .unwrap()
            .with_anchor(anchor());
        let batch = synth.generate_batch(TransactionId::FIRST, 100);
        assert!(batch.records().iter().all(|r| r.transaction_timestamp <= anchor()));
    }

    #[test]
    fn test_zero_sized_batch_is_empty() {
        let batch = synthesizer(0).generate_batch(TransactionId::FIRST, 0);
        assert!(batch.is_empty());
    }
}
