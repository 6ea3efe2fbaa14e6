//! Allocation of shared broker positions to strategies.
//!
//! Several strategies may each claim a slice of the same broker position.
//! Each claim is a [`StrategyLeg`]; the ledger answers how much of a
//! position is claimed and how much is still free, and serializes
//! adopt/detach per position so two concurrent adoptions can never both
//! pass the unmanaged-quantity check.

use optdesk_core::{
    weighted_entry_premium, Clock, OptionSymbol, Position, PositionSource, SystemClock,
};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::adoption::{
    AdoptionOutcome, AdoptionTarget, AdoptionWarning, AllocationError, DetachOutcome,
};
use crate::leg::StrategyLeg;

pub struct AllocationLedger {
    pub(crate) legs: RwLock<Vec<StrategyLeg>>,
    position_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    clock: Arc<dyn Clock>,
}

impl Default for AllocationLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AllocationLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AllocationLedger")
            .field("legs", &self.legs.read().len())
            .finish_non_exhaustive()
    }
}

impl AllocationLedger {
    #[must_use]
    pub fn new() -> Self {
        Self {
            legs: RwLock::new(Vec::new()),
            position_locks: Mutex::new(HashMap::new()),
            clock: Arc::new(SystemClock),
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Restores previously persisted legs.
    #[must_use]
    pub fn with_legs(self, legs: Vec<StrategyLeg>) -> Self {
        *self.legs.write() = legs;
        self
    }

    fn position_lock(&self, position_id: &str) -> Arc<Mutex<()>> {
        self.position_locks
            .lock()
            .entry(position_id.to_string())
            .or_default()
            .clone()
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Signed sum of attached leg quantities on a position.
    #[must_use]
    pub fn get_allocated_quantity(&self, position_id: &str) -> i64 {
        self.legs
            .read()
            .iter()
            .filter(|leg| leg.links(position_id))
            .map(|leg| leg.quantity)
            .sum()
    }

    /// `position_quantity - allocated`, sign preserved. A result whose sign
    /// opposes the position means more is claimed than held.
    #[must_use]
    pub fn get_unmanaged_quantity(&self, position_id: &str, position_quantity: i64) -> i64 {
        let allocated = self.get_allocated_quantity(position_id);
        let unmanaged = position_quantity - allocated;
        if unmanaged != 0 && unmanaged.signum() != position_quantity.signum() {
            warn!(
                position_id,
                position_quantity, allocated, unmanaged, "position is over-allocated"
            );
        }
        unmanaged
    }

    /// Allocated quantity for each of `position_ids` that has at least one
    /// attached leg.
    #[must_use]
    pub fn get_allocation_map(&self, position_ids: &[&str]) -> HashMap<String, i64> {
        let mut map = HashMap::new();
        for leg in self.legs.read().iter() {
            if let Some(id) = leg.position_id.as_deref() {
                if position_ids.contains(&id) {
                    *map.entry(id.to_string()).or_insert(0) += leg.quantity;
                }
            }
        }
        map
    }

    #[must_use]
    pub fn get_all_allocations(&self) -> HashMap<String, i64> {
        let mut map = HashMap::new();
        for leg in self.legs.read().iter() {
            if let Some(id) = &leg.position_id {
                *map.entry(id.clone()).or_insert(0) += leg.quantity;
            }
        }
        map
    }

    /// Every leg ever created for the strategy, detached ones included.
    #[must_use]
    pub fn legs_for_strategy(&self, strategy_id: &str) -> Vec<StrategyLeg> {
        self.legs
            .read()
            .iter()
            .filter(|leg| leg.strategy_id == strategy_id)
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn legs(&self) -> Vec<StrategyLeg> {
        self.legs.read().clone()
    }

    // =========================================================================
    // Adopt / detach
    // =========================================================================

    /// Claims `quantity` of a broker position for `target`. The strategy
    /// holds only the claimed slice, with P&L scaled to it.
    ///
    /// # Errors
    ///
    /// Returns an [`AllocationError`] when the position is missing, the
    /// quantity is zero or of the wrong sign, it exceeds the unmanaged
    /// remainder, or the strategy already holds a leg on the position.
    /// Nothing is written on error.
    pub fn adopt(
        &self,
        target: &dyn AdoptionTarget,
        source: &dyn PositionSource,
        position_id: &str,
        quantity: i64,
    ) -> Result<AdoptionOutcome, AllocationError> {
        let lock = self.position_lock(position_id);
        let _guard = lock.lock();

        let position = source
            .position(position_id)
            .ok_or_else(|| AllocationError::PositionNotFound(position_id.to_string()))?;

        if quantity == 0 {
            return Err(AllocationError::ZeroQuantity);
        }
        if quantity.signum() != position.quantity.signum() {
            return Err(AllocationError::SignMismatch {
                requested: quantity,
                position: position.quantity,
            });
        }

        let unmanaged = self.get_unmanaged_quantity(position_id, position.quantity);
        if unmanaged.signum() != quantity.signum() || quantity.abs() > unmanaged.abs() {
            return Err(AllocationError::ExceedsUnmanaged {
                requested: quantity,
                unmanaged,
            });
        }

        let strategy_id = target.strategy_id().to_string();
        let already_linked = self
            .legs
            .read()
            .iter()
            .any(|leg| leg.strategy_id == strategy_id && leg.links(position_id));
        if already_linked {
            return Err(AllocationError::AlreadyLinked {
                strategy_id,
                position_id: position_id.to_string(),
            });
        }

        let warnings = compatibility_warnings(target, &position, quantity);
        for warning in &warnings {
            warn!(%strategy_id, position_id, ?warning, "adoption warning");
        }

        let leg = StrategyLeg::new(
            strategy_id.clone(),
            position_id,
            &position.trading_symbol,
            quantity,
            self.clock.now(),
        );
        self.legs.write().push(leg.clone());

        let mut claimed = position.slice(quantity);
        claimed.strategy_id = Some(strategy_id.clone());
        let change = target.attach_position(claimed);
        if !change.changed {
            warn!(%strategy_id, position_id, "strategy already held the position");
        }
        let entry_premium = change.entry_premium;

        info!(
            %strategy_id,
            position_id,
            quantity,
            leg_id = %leg.id,
            "adopted position"
        );

        Ok(AdoptionOutcome {
            leg,
            entry_premium,
            warnings,
        })
    }

    /// Releases the strategy's claim on a position.
    ///
    /// # Errors
    ///
    /// Returns [`AllocationError::NotLinked`] when the strategy holds no
    /// attached leg on the position.
    pub fn detach(
        &self,
        target: &dyn AdoptionTarget,
        position_id: &str,
    ) -> Result<DetachOutcome, AllocationError> {
        let lock = self.position_lock(position_id);
        let _guard = lock.lock();

        let strategy_id = target.strategy_id();
        let (leg, still_referenced) = {
            let mut legs = self.legs.write();
            let leg = legs
                .iter_mut()
                .find(|leg| leg.strategy_id == strategy_id && leg.links(position_id))
                .ok_or_else(|| AllocationError::NotLinked {
                    strategy_id: strategy_id.to_string(),
                    position_id: position_id.to_string(),
                })?;
            leg.detach(self.clock.now());
            let leg = leg.clone();

            let still_referenced = legs
                .iter()
                .any(|other| other.strategy_id == strategy_id && other.links(position_id));
            (leg, still_referenced)
        };

        let entry_premium = if still_referenced {
            weighted_entry_premium(&target.positions())
        } else {
            target.release_position(position_id).entry_premium
        };

        info!(strategy_id, position_id, leg_id = %leg.id, "detached position");

        Ok(DetachOutcome {
            success: true,
            leg,
            entry_premium,
        })
    }
}

fn compatibility_warnings(
    target: &dyn AdoptionTarget,
    position: &Position,
    quantity: i64,
) -> Vec<AdoptionWarning> {
    let mut warnings = Vec::new();

    if let Some(parsed) = OptionSymbol::parse(&position.trading_symbol) {
        let expected = target.underlying().to_ascii_uppercase();
        if parsed.underlying != expected {
            warnings.push(AdoptionWarning::UnderlyingMismatch {
                expected,
                actual: parsed.underlying,
            });
        }

        let strategy_type = target.strategy_type();
        if !strategy_type.trades(parsed.option_type) {
            warnings.push(AdoptionWarning::OptionSideMismatch {
                option_type: parsed.option_type,
                strategy_type,
            });
        }
    }

    if let Some(existing) = target
        .positions()
        .iter()
        .filter(|p| p.id != position.id)
        .find(|p| p.quantity.abs() != quantity.abs())
    {
        warnings.push(AdoptionWarning::QuantityMismatch {
            adopted: quantity,
            existing: existing.quantity,
        });
    }

    warnings
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::adoption::PositionChange;
    use optdesk_core::{PositionBook, StrategyType};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::thread;

    /// Minimal strategy holding positions in memory.
    pub(crate) struct TestStrategy {
        pub id: String,
        pub strategy_type: StrategyType,
        pub underlying: String,
        pub positions: RwLock<Vec<Position>>,
        pub entry_premium: RwLock<Option<Decimal>>,
    }

    impl TestStrategy {
        pub(crate) fn new(id: &str, strategy_type: StrategyType) -> Self {
            Self {
                id: id.to_string(),
                strategy_type,
                underlying: "NIFTY".to_string(),
                positions: RwLock::new(Vec::new()),
                entry_premium: RwLock::new(None),
            }
        }
    }

    impl AdoptionTarget for TestStrategy {
        fn strategy_id(&self) -> &str {
            &self.id
        }

        fn strategy_type(&self) -> StrategyType {
            self.strategy_type
        }

        fn underlying(&self) -> &str {
            &self.underlying
        }

        fn positions(&self) -> Vec<Position> {
            self.positions.read().clone()
        }

        fn attach_position(&self, position: Position) -> PositionChange {
            let mut positions = self.positions.write();
            let changed =
                position.quantity != 0 && !positions.iter().any(|p| p.id == position.id);
            if changed {
                positions.push(position);
            }
            let entry_premium = weighted_entry_premium(&positions);
            *self.entry_premium.write() = entry_premium;
            PositionChange {
                changed,
                entry_premium,
            }
        }

        fn release_position(&self, position_id: &str) -> PositionChange {
            let mut positions = self.positions.write();
            let before = positions.len();
            positions.retain(|p| p.id != position_id);
            let entry_premium = weighted_entry_premium(&positions);
            *self.entry_premium.write() = entry_premium;
            PositionChange {
                changed: positions.len() != before,
                entry_premium,
            }
        }
    }

    fn book_with(positions: Vec<Position>) -> PositionBook {
        let book = PositionBook::new();
        for position in positions {
            book.upsert(position);
        }
        book
    }

    fn short_put(id: &str, qty: i64) -> Position {
        Position::new(id, "NIFTY24JAN22000PE", 1, qty, Some(dec!(120)))
    }

    // ==== Allocation Query Tests ====

    #[test]
    fn test_unmanaged_quantity_after_adoption() {
        let ledger = AllocationLedger::new();
        let book = book_with(vec![short_put("p-1", -1050)]);
        let a = TestStrategy::new("a", StrategyType::Straddle);

        ledger.adopt(&a, &book, "p-1", -300).unwrap();

        assert_eq!(ledger.get_allocated_quantity("p-1"), -300);
        assert_eq!(ledger.get_unmanaged_quantity("p-1", -1050), -750);
        assert!(ledger.get_allocation_map(&["p-1", "p-2"]).get("p-2").is_none());
        assert_eq!(ledger.get_all_allocations().get("p-1"), Some(&-300));
    }

    // ==== Adoption Tests ====

    #[test]
    fn test_adopt_within_unmanaged_succeeds() {
        let ledger = AllocationLedger::new();
        let book = book_with(vec![short_put("p-1", -1050)]);
        let a = TestStrategy::new("a", StrategyType::Straddle);
        let b = TestStrategy::new("b", StrategyType::Straddle);
        ledger.adopt(&a, &book, "p-1", -300).unwrap();
        assert_eq!(ledger.get_unmanaged_quantity("p-1", -1050), -750);

        let outcome = ledger.adopt(&b, &book, "p-1", -300).unwrap();

        assert_eq!(ledger.get_allocated_quantity("p-1"), -600);
        assert_eq!(outcome.entry_premium, Some(dec!(120)));
        assert_eq!(*b.entry_premium.read(), Some(dec!(120)));
        assert_eq!(b.positions()[0].strategy_id.as_deref(), Some("b"));
    }

    #[test]
    fn test_adopted_position_is_the_claimed_slice() {
        let ledger = AllocationLedger::new();
        let book = book_with(vec![short_put("p-1", -1050).with_unrealized_pnl(dec!(-2100))]);
        let a = TestStrategy::new("a", StrategyType::Straddle);

        ledger.adopt(&a, &book, "p-1", -300).unwrap();

        let held = a.positions();
        assert_eq!(held[0].quantity, -300);
        assert_eq!(held[0].unrealized_pnl, Some(dec!(-600)));
        assert_eq!(book.position("p-1").unwrap().quantity, -1050);
    }

    #[test]
    fn test_adopt_exceeding_unmanaged_fails_without_leg() {
        let ledger = AllocationLedger::new();
        let book = book_with(vec![short_put("p-1", -1050)]);
        let a = TestStrategy::new("a", StrategyType::Straddle);
        let b = TestStrategy::new("b", StrategyType::Straddle);
        ledger.adopt(&a, &book, "p-1", -300).unwrap();

        let err = ledger.adopt(&b, &book, "p-1", -900).unwrap_err();

        assert_eq!(
            err,
            AllocationError::ExceedsUnmanaged {
                requested: -900,
                unmanaged: -750
            }
        );
        assert!(ledger.legs_for_strategy("b").is_empty());
        assert!(b.positions().is_empty());
        assert_eq!(ledger.get_allocated_quantity("p-1"), -300);
    }

    #[test]
    fn test_adopt_validation_errors() {
        let ledger = AllocationLedger::new();
        let book = book_with(vec![short_put("p-1", -100)]);
        let a = TestStrategy::new("a", StrategyType::Straddle);

        assert_eq!(
            ledger.adopt(&a, &book, "missing", -50).unwrap_err(),
            AllocationError::PositionNotFound("missing".to_string())
        );
        assert_eq!(
            ledger.adopt(&a, &book, "p-1", 0).unwrap_err(),
            AllocationError::ZeroQuantity
        );
        assert!(matches!(
            ledger.adopt(&a, &book, "p-1", 50).unwrap_err(),
            AllocationError::SignMismatch { .. }
        ));

        ledger.adopt(&a, &book, "p-1", -50).unwrap();
        assert!(matches!(
            ledger.adopt(&a, &book, "p-1", -50).unwrap_err(),
            AllocationError::AlreadyLinked { .. }
        ));
    }

    #[test]
    fn test_adopt_warns_on_incompatible_side() {
        let ledger = AllocationLedger::new();
        let book = book_with(vec![short_put("p-1", -50)]);
        let calls_only = TestStrategy::new("a", StrategyType::BearCallSpread);

        let outcome = ledger.adopt(&calls_only, &book, "p-1", -50).unwrap();

        assert_eq!(
            outcome.warnings,
            vec![AdoptionWarning::OptionSideMismatch {
                option_type: optdesk_core::OptionType::Pe,
                strategy_type: StrategyType::BearCallSpread,
            }]
        );
    }

    #[test]
    fn test_adopt_warns_on_underlying_and_quantity() {
        let ledger = AllocationLedger::new();
        let book = book_with(vec![
            short_put("p-1", -50),
            Position::new("p-2", "BANKNIFTY24JAN45000CE", 2, -15, Some(dec!(300))),
        ]);
        let a = TestStrategy::new("a", StrategyType::Straddle);
        ledger.adopt(&a, &book, "p-1", -50).unwrap();

        let outcome = ledger.adopt(&a, &book, "p-2", -15).unwrap();

        assert!(outcome
            .warnings
            .contains(&AdoptionWarning::UnderlyingMismatch {
                expected: "NIFTY".to_string(),
                actual: "BANKNIFTY".to_string(),
            }));
        assert!(outcome
            .warnings
            .contains(&AdoptionWarning::QuantityMismatch {
                adopted: -15,
                existing: -50,
            }));
        // (120 * 50 + 300 * 15) / 65
        let expected = (dec!(120) * dec!(50) + dec!(300) * dec!(15)) / dec!(65);
        assert_eq!(outcome.entry_premium, Some(expected));
    }

    // ==== Detach Tests ====

    #[test]
    fn test_detach_is_inverse_of_adopt() {
        let ledger = AllocationLedger::new();
        let book = book_with(vec![short_put("p-1", -1050)]);
        let a = TestStrategy::new("a", StrategyType::Straddle);
        let before = ledger.get_allocated_quantity("p-1");

        ledger.adopt(&a, &book, "p-1", -300).unwrap();
        let outcome = ledger.detach(&a, "p-1").unwrap();

        assert!(outcome.success);
        assert_eq!(ledger.get_allocated_quantity("p-1"), before);
        assert!(a.positions().is_empty());
        assert_eq!(outcome.entry_premium, None);
        assert_eq!(*a.entry_premium.read(), None);
        // Audit trail kept.
        assert_eq!(ledger.legs_for_strategy("a").len(), 1);
        assert!(!ledger.legs_for_strategy("a")[0].is_attached());
    }

    #[test]
    fn test_detach_without_leg_fails() {
        let ledger = AllocationLedger::new();
        let a = TestStrategy::new("a", StrategyType::Straddle);

        assert!(matches!(
            ledger.detach(&a, "p-1").unwrap_err(),
            AllocationError::NotLinked { .. }
        ));
    }

    // ==== Concurrency Tests ====

    #[test]
    fn test_concurrent_adopts_never_over_allocate() {
        let ledger = Arc::new(AllocationLedger::new());
        let book = Arc::new(book_with(vec![short_put("p-1", -500)]));

        let successes: usize = thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|i| {
                    let ledger = ledger.clone();
                    let book = book.clone();
                    scope.spawn(move || {
                        let strategy = TestStrategy::new(&format!("s-{i}"), StrategyType::Straddle);
                        ledger.adopt(&strategy, book.as_ref(), "p-1", -100).is_ok()
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| usize::from(h.join().unwrap()))
                .sum()
        });

        assert_eq!(successes, 5);
        assert_eq!(ledger.get_allocated_quantity("p-1"), -500);
    }
}
