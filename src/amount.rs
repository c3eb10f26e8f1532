//! Multi-asset amounts
//!
//! An [`AmountMap`] is a sorted map from asset id to a signed amount where an
//! absent key means zero. Zero entries are pruned on every write, so two maps
//! describing the same balances are always structurally equal.
//!
//! Ordering is partial: `a <= b` holds iff it holds for every asset present
//! in either map, and `a < b` additionally needs one asset to be strictly
//! smaller. Maps over disjoint non-zero assets are unordered.

use crate::confidential::AssetId;
use crate::constants::MAX_MONEY;
use crate::types::Amount;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::ops::{Add, AddAssign, Div, Mul, Sub, SubAssign};

/// MoneyRange: ℤ → 𝔹
pub fn money_range(amount: Amount) -> bool {
    (0..=MAX_MONEY).contains(&amount)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<AssetId, Amount>", into = "BTreeMap<AssetId, Amount>")]
pub struct AmountMap(BTreeMap<AssetId, Amount>);

impl AmountMap {
    pub fn new() -> Self {
        AmountMap(BTreeMap::new())
    }

    /// A map holding a single entry
    pub fn single(asset: AssetId, amount: Amount) -> Self {
        let mut map = AmountMap::new();
        map.set(asset, amount);
        map
    }

    /// Amount for `asset`, zero when absent
    pub fn get(&self, asset: &AssetId) -> Amount {
        self.0.get(asset).copied().unwrap_or(0)
    }

    pub fn set(&mut self, asset: AssetId, amount: Amount) {
        if amount == 0 {
            self.0.remove(&asset);
        } else {
            self.0.insert(asset, amount);
        }
    }

    /// Add `amount` to the entry for `asset`, saturating at the i64 bounds
    pub fn add_amount(&mut self, asset: AssetId, amount: Amount) {
        let current = self.get(&asset);
        self.set(asset, current.saturating_add(amount));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&AssetId, &Amount)> {
        self.0.iter()
    }

    pub fn assets(&self) -> impl Iterator<Item = &AssetId> {
        self.0.keys()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when every balance is zero
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// MoneyRange over every entry
    pub fn money_range(&self) -> bool {
        self.0.values().all(|&v| money_range(v))
    }

    fn union_keys<'a>(&'a self, other: &'a AmountMap) -> impl Iterator<Item = &'a AssetId> {
        let mut keys: Vec<&AssetId> = self.0.keys().chain(other.0.keys()).collect();
        keys.sort();
        keys.dedup();
        keys.into_iter()
    }

    fn zip_with(&self, other: &AmountMap, f: impl Fn(Amount, Amount) -> Amount) -> AmountMap {
        let mut out = AmountMap::new();
        for asset in self.union_keys(other) {
            out.set(*asset, f(self.get(asset), other.get(asset)));
        }
        out
    }

    fn map_values(&self, f: impl Fn(Amount) -> Amount) -> AmountMap {
        let mut out = AmountMap::new();
        for (asset, value) in &self.0 {
            out.set(*asset, f(*value));
        }
        out
    }
}

impl From<BTreeMap<AssetId, Amount>> for AmountMap {
    fn from(map: BTreeMap<AssetId, Amount>) -> Self {
        map.into_iter().collect()
    }
}

impl From<AmountMap> for BTreeMap<AssetId, Amount> {
    fn from(map: AmountMap) -> Self {
        map.0
    }
}

impl FromIterator<(AssetId, Amount)> for AmountMap {
    fn from_iter<I: IntoIterator<Item = (AssetId, Amount)>>(iter: I) -> Self {
        let mut map = AmountMap::new();
        for (asset, amount) in iter {
            map.add_amount(asset, amount);
        }
        map
    }
}

impl fmt::Display for AmountMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (asset, amount)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}: {}", asset, amount)?;
        }
        f.write_str("}")
    }
}

impl PartialOrd for AmountMap {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        let mut all_le = true;
        let mut all_ge = true;
        for asset in self.union_keys(other) {
            match self.get(asset).cmp(&other.get(asset)) {
                Ordering::Less => all_ge = false,
                Ordering::Greater => all_le = false,
                Ordering::Equal => {}
            }
        }
        match (all_le, all_ge) {
            (true, true) => Some(Ordering::Equal),
            (true, false) => Some(Ordering::Less),
            (false, true) => Some(Ordering::Greater),
            (false, false) => None,
        }
    }
}

impl<'a> Add<&'a AmountMap> for &'a AmountMap {
    type Output = AmountMap;

    fn add(self, rhs: &'a AmountMap) -> AmountMap {
        self.zip_with(rhs, Amount::saturating_add)
    }
}

impl Add for AmountMap {
    type Output = AmountMap;

    fn add(self, rhs: AmountMap) -> AmountMap {
        &self + &rhs
    }
}

impl<'a> Sub<&'a AmountMap> for &'a AmountMap {
    type Output = AmountMap;

    fn sub(self, rhs: &'a AmountMap) -> AmountMap {
        self.zip_with(rhs, Amount::saturating_sub)
    }
}

impl Sub for AmountMap {
    type Output = AmountMap;

    fn sub(self, rhs: AmountMap) -> AmountMap {
        &self - &rhs
    }
}

impl AddAssign<&AmountMap> for AmountMap {
    fn add_assign(&mut self, rhs: &AmountMap) {
        for (asset, amount) in &rhs.0 {
            self.add_amount(*asset, *amount);
        }
    }
}

impl SubAssign<&AmountMap> for AmountMap {
    fn sub_assign(&mut self, rhs: &AmountMap) {
        for (asset, amount) in &rhs.0 {
            let current = self.get(asset);
            self.set(*asset, current.saturating_sub(*amount));
        }
    }
}

impl Mul<Amount> for &AmountMap {
    type Output = AmountMap;

    fn mul(self, rhs: Amount) -> AmountMap {
        self.map_values(|v| v.saturating_mul(rhs))
    }
}

impl Mul<Amount> for AmountMap {
    type Output = AmountMap;

    fn mul(self, rhs: Amount) -> AmountMap {
        &self * rhs
    }
}

/// # Panics
///
/// Panics on division by zero.
impl Div<Amount> for &AmountMap {
    type Output = AmountMap;

    fn div(self, rhs: Amount) -> AmountMap {
        self.map_values(|v| v / rhs)
    }
}

impl Div<Amount> for AmountMap {
    type Output = AmountMap;

    fn div(self, rhs: Amount) -> AmountMap {
        &self / rhs
    }
}
