//! Recipes: reagent -> quantity maps describing the relative composition of a
//! mixture, or absolute volumes once scaled.
//!
//! A recipe never holds a zero or negative quantity; any operation that would
//! produce one drops the entry instead. Mixture keys stay mixtures until
//! [`Recipe::flatten`] expands them into pure reagents.

use crate::error::{Result, SynbioError};
use crate::reagent::Reagent;
use crate::units::approx_eq;
use std::collections::BTreeMap;
use std::fmt;
use std::ops::{Add, Div, Mul, Sub};

#[derive(Clone, Default)]
pub struct Recipe {
    parts: BTreeMap<Reagent, f64>,
}

impl Recipe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a recipe from literal parts. Repeated reagents are summed, zero
    /// quantities are skipped and negative or non-finite ones are rejected.
    pub fn from_parts<I>(parts: I) -> Result<Self>
    where
        I: IntoIterator<Item = (Reagent, f64)>,
    {
        let mut ret = Self::new();
        for (reagent, quantity) in parts {
            if !quantity.is_finite() || quantity < 0.0 {
                return Err(SynbioError::InvalidRecipe(format!(
                    "quantity {quantity} for '{}' must be a finite, nonnegative number",
                    reagent.name()
                )));
            }
            ret.accumulate(&reagent, quantity);
        }
        Ok(ret)
    }

    /// The recipe of a pure reagent: one part of itself.
    pub fn unit(reagent: &Reagent) -> Self {
        let mut ret = Self::new();
        ret.parts.insert(reagent.clone(), 1.0);
        ret
    }

    pub fn get(&self, reagent: &Reagent) -> Option<f64> {
        self.parts.get(reagent).copied()
    }

    pub fn contains(&self, reagent: &Reagent) -> bool {
        self.parts.contains_key(reagent)
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Reagent, f64)> {
        self.parts.iter().map(|(r, q)| (r, *q))
    }

    pub fn reagents(&self) -> impl Iterator<Item = &Reagent> {
        self.parts.keys()
    }

    pub fn total(&self) -> f64 {
        self.parts.values().sum()
    }

    fn accumulate(&mut self, reagent: &Reagent, quantity: f64) {
        let entry = self.parts.entry(reagent.clone()).or_insert(0.0);
        *entry += quantity;
        if !(*entry > 0.0 && entry.is_finite()) {
            self.parts.remove(reagent);
        }
    }

    pub fn add(&self, other: &Recipe) -> Recipe {
        let mut ret = self.clone();
        for (reagent, quantity) in other.iter() {
            ret.accumulate(reagent, quantity);
        }
        ret
    }

    pub fn subtract(&self, other: &Recipe) -> Recipe {
        let mut ret = self.clone();
        for (reagent, quantity) in other.iter() {
            if ret.contains(reagent) {
                ret.accumulate(reagent, -quantity);
            }
        }
        ret
    }

    /// Multiplies every quantity by `factor`. Products that are not positive
    /// and finite are dropped.
    pub fn scale(&self, factor: f64) -> Recipe {
        let mut ret = Self::new();
        for (reagent, quantity) in self.iter() {
            ret.accumulate(reagent, quantity * factor);
        }
        ret
    }

    /// Divides every quantity by `divisor`, which must be positive and finite.
    pub fn checked_div(&self, divisor: f64) -> Result<Recipe> {
        if !divisor.is_finite() || divisor <= 0.0 {
            return Err(SynbioError::InvalidParameter(format!(
                "recipe divisor {divisor} must be a positive, finite number"
            )));
        }
        Ok(self.scale(1.0 / divisor))
    }

    pub fn normalize(&self) -> Recipe {
        let total = self.total();
        if total <= 0.0 {
            return Self::new();
        }
        self.scale(1.0 / total)
    }

    /// Expands every mixture key into its pure reagents, weighted by the
    /// mixture's quantity.
    ///
    /// Mixtures can only be built from reagents that already exist, so the
    /// composition graph is acyclic and the recursion terminates.
    pub fn flatten(&self) -> Recipe {
        let mut ret = Self::new();
        for (reagent, quantity) in self.iter() {
            match reagent.components() {
                None => ret.accumulate(reagent, quantity),
                Some(inner) => {
                    let expanded = inner.flatten().normalize().scale(quantity);
                    for (pure, amount) in expanded.iter() {
                        ret.accumulate(pure, amount);
                    }
                }
            }
        }
        ret
    }

    pub fn is_flat(&self) -> bool {
        self.reagents().all(|r| !r.is_mixture())
    }

    /// Compares the flattened forms quantity by quantity.
    pub fn approx_eq(&self, other: &Recipe) -> bool {
        let left = self.flatten();
        let right = other.flatten();
        left.reagents()
            .chain(right.reagents())
            .all(|r| approx_eq(left.get(r).unwrap_or(0.0), right.get(r).unwrap_or(0.0)))
    }

    pub fn to_named_map(&self) -> BTreeMap<String, f64> {
        self.iter()
            .map(|(r, q)| (r.name().to_string(), q))
            .collect()
    }
}

/// Sums any number of recipes.
pub fn add_recipes<'a, I>(recipes: I) -> Recipe
where
    I: IntoIterator<Item = &'a Recipe>,
{
    recipes
        .into_iter()
        .fold(Recipe::new(), |acc, recipe| acc.add(recipe))
}

impl PartialEq for Recipe {
    fn eq(&self, other: &Self) -> bool {
        self.approx_eq(other)
    }
}

impl fmt::Debug for Recipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.parts.iter().map(|(r, q)| (r.name(), q)))
            .finish()
    }
}

impl Add for &Recipe {
    type Output = Recipe;

    fn add(self, rhs: &Recipe) -> Recipe {
        Recipe::add(self, rhs)
    }
}

impl Sub for &Recipe {
    type Output = Recipe;

    fn sub(self, rhs: &Recipe) -> Recipe {
        self.subtract(rhs)
    }
}

impl Mul<f64> for &Recipe {
    type Output = Recipe;

    fn mul(self, rhs: f64) -> Recipe {
        self.scale(rhs)
    }
}

impl Mul<f64> for Recipe {
    type Output = Recipe;

    fn mul(self, rhs: f64) -> Recipe {
        self.scale(rhs)
    }
}

/// A non-positive divisor yields an empty recipe; use
/// [`Recipe::checked_div`] to reject it instead.
impl Div<f64> for &Recipe {
    type Output = Recipe;

    fn div(self, rhs: f64) -> Recipe {
        self.scale(1.0 / rhs)
    }
}

impl Div<f64> for Recipe {
    type Output = Recipe;

    fn div(self, rhs: f64) -> Recipe {
        self.scale(1.0 / rhs)
    }
}
