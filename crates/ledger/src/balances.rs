//! Signed per-member balances (cents).
//!
//! Positive = is owed, negative = owes. Every mutation moves value between
//! members by equal and opposite amounts, so `total() + orphaned() == 0`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use splitter_core::{Address, Cents, DomainError};

/// Outcome of splitting one expense equally.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Split {
    /// What every member (payer included) bears: `floor(amount / n)`.
    pub share: Cents,
    /// What the payer is credited: `share * (n - 1)`.
    pub payer_credit: Cents,
    /// Truncation remainder, absorbed by the payer and never tracked as debt.
    pub remainder: Cents,
}

/// Split `amount` equally over `member_count` members.
///
/// ```
/// use splitter_ledger::split_equally;
///
/// let split = split_equally(100, 3).unwrap();
/// assert_eq!((split.share, split.payer_credit, split.remainder), (33, 66, 1));
/// ```
pub fn split_equally(amount: Cents, member_count: usize) -> Result<Split, DomainError> {
    if amount <= 0 {
        return Err(DomainError::InvalidAmount(amount));
    }
    if member_count == 0 {
        return Err(DomainError::invariant("cannot split over an empty group"));
    }
    let n = Cents::try_from(member_count)
        .map_err(|_| DomainError::validation("member count exceeds balance range"))?;
    let share = amount / n;
    let payer_credit = share * (n - 1);
    Ok(Split {
        share,
        payer_credit,
        remainder: amount - share * n,
    })
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BalanceSheet {
    balances: HashMap<Address, Cents>,
    orphaned: Cents,
}

impl BalanceSheet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current net position; 0 for an unknown address.
    pub fn balance(&self, address: &Address) -> Cents {
        self.balances.get(address).copied().unwrap_or(0)
    }

    /// Start tracking a member at zero.
    pub fn open(&mut self, address: Address) {
        self.balances.entry(address).or_insert(0);
    }

    /// Stop tracking a member. A non-zero balance is forfeited into
    /// `orphaned` rather than redistributed.
    pub fn close(&mut self, address: &Address) -> Cents {
        let balance = self.balances.remove(address).unwrap_or(0);
        self.orphaned += balance;
        balance
    }

    /// Check that crediting `split` to `payer` and debiting every other
    /// member stays within range.
    pub fn check_split(
        &self,
        payer: &Address,
        split: &Split,
        members: &[Address],
    ) -> Result<(), DomainError> {
        let overflow = || DomainError::validation("expense overflows a member balance");
        for member in members {
            let current = self.balance(member);
            if member == payer {
                current.checked_add(split.payer_credit).ok_or_else(overflow)?;
            } else {
                current.checked_sub(split.share).ok_or_else(overflow)?;
            }
        }
        Ok(())
    }

    /// Credit `payer_credit` to the payer and debit `share` from every other
    /// member. Amounts come from a validated [`Split`].
    pub fn apply_split(
        &mut self,
        payer: &Address,
        share: Cents,
        payer_credit: Cents,
        members: &[Address],
    ) {
        for member in members {
            let entry = self.balances.entry(*member).or_insert(0);
            if member == payer {
                *entry += payer_credit;
            } else {
                *entry -= share;
            }
        }
    }

    /// Debtor pays `amount` towards what it owes; creditor is owed that much less.
    pub fn record_repayment(&mut self, debtor: &Address, creditor: &Address, amount: Cents) {
        *self.balances.entry(*debtor).or_insert(0) += amount;
        *self.balances.entry(*creditor).or_insert(0) -= amount;
    }

    /// Sum over tracked members (widened so it cannot overflow).
    pub fn total(&self) -> i128 {
        self.balances.values().map(|b| i128::from(*b)).sum()
    }

    /// Sum of balances dropped by removals.
    pub fn orphaned(&self) -> Cents {
        self.orphaned
    }

    pub fn is_zero_sum(&self) -> bool {
        self.total() + i128::from(self.orphaned) == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u64) -> Address {
        Address::from_low_u64(n)
    }

    #[test]
    fn two_way_split_has_no_remainder() {
        let split = split_equally(1000, 2).unwrap();
        assert_eq!(split.share, 500);
        assert_eq!(split.payer_credit, 500);
        assert_eq!(split.remainder, 0);
    }

    #[test]
    fn single_member_expense_moves_nothing() {
        let split = split_equally(999, 1).unwrap();
        assert_eq!(split.share, 999);
        assert_eq!(split.payer_credit, 0);
    }

    #[test]
    fn non_positive_amount_is_rejected() {
        assert_eq!(split_equally(0, 2), Err(DomainError::InvalidAmount(0)));
        assert_eq!(split_equally(-5, 2), Err(DomainError::InvalidAmount(-5)));
    }

    #[test]
    fn three_way_split_keeps_zero_sum() {
        let members = [addr(1), addr(2), addr(3)];
        let mut sheet = BalanceSheet::new();
        for m in members {
            sheet.open(m);
        }

        let split = split_equally(100, members.len()).unwrap();
        sheet.apply_split(&addr(1), split.share, split.payer_credit, &members);

        assert_eq!(sheet.balance(&addr(1)), 66);
        assert_eq!(sheet.balance(&addr(2)), -33);
        assert_eq!(sheet.balance(&addr(3)), -33);
        assert!(sheet.is_zero_sum());
    }

    #[test]
    fn closing_non_zero_balance_is_tracked_as_orphaned() {
        let members = [addr(1), addr(2)];
        let mut sheet = BalanceSheet::new();
        let split = split_equally(200, 2).unwrap();
        sheet.apply_split(&addr(1), split.share, split.payer_credit, &members);

        assert_eq!(sheet.close(&addr(2)), -100);
        assert_eq!(sheet.orphaned(), -100);
        assert_eq!(sheet.total(), 100);
        assert!(sheet.is_zero_sum());
    }

    #[test]
    fn overflowing_split_is_detected() {
        let members = [addr(1), addr(2)];
        let mut sheet = BalanceSheet::new();
        sheet.apply_split(&addr(1), Cents::MAX - 10, Cents::MAX - 10, &members);

        let split = split_equally(100, 2).unwrap();
        assert!(matches!(
            sheet.check_split(&addr(1), &split, &members),
            Err(DomainError::Validation(_))
        ));
    }
}
