//! Reagents, mixtures and the registry that owns their names.
//!
//! A reagent is identified by its name within one [`ReagentRegistry`]. The
//! registry is passed explicitly to everything that creates reagents; there
//! is no process-wide default inside the library.

use crate::error::{Result, SynbioError};
use crate::recipe::Recipe;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

static NEXT_REGISTRY_ID: AtomicU64 = AtomicU64::new(1);

/// Names of the PURE cell-free expression system components with their parts.
pub const PURE_SYSTEM: [(&str, f64); 5] = [
    ("Sol-A", 4.0),
    ("Sol-B", 3.0),
    ("DNA", 1.0),
    ("RNase-Inh", 1.0),
    ("H2O", 1.0),
];

pub const PURE_SYSTEM_NAME: &str = "PURE";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RegistryId(u64);

impl RegistryId {
    fn next() -> Self {
        Self(NEXT_REGISTRY_ID.fetch_add(1, AtomicOrdering::Relaxed))
    }
}

struct ReagentInner {
    registry: RegistryId,
    name: String,
    recipe: Option<Recipe>,
}

/// A named chemical or biological input. Mixtures are reagents that carry a
/// recipe over other reagents of the same registry.
#[derive(Clone)]
pub struct Reagent(Arc<ReagentInner>);

impl Reagent {
    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn registry_id(&self) -> RegistryId {
        self.0.registry
    }

    pub fn is_mixture(&self) -> bool {
        self.0.recipe.is_some()
    }

    /// The composition of a mixture, `None` for a pure reagent.
    pub fn components(&self) -> Option<&Recipe> {
        self.0.recipe.as_ref()
    }

    /// Relative parts of this reagent; a pure reagent is one part of itself.
    pub fn recipe(&self) -> Recipe {
        match &self.0.recipe {
            Some(recipe) => recipe.clone(),
            None => Recipe::unit(self),
        }
    }

    /// The pure reagents this reagent is ultimately made of.
    pub fn pure_reagents(&self) -> BTreeSet<Reagent> {
        self.recipe().flatten().reagents().cloned().collect()
    }

    /// Splits `total_vol` over the pure reagents of this reagent.
    pub fn reagent_volumes(&self, total_vol: f64) -> Recipe {
        calculate_reagent_volumes(self, total_vol)
    }
}

pub fn calculate_reagent_volumes(reagent: &Reagent, total_vol: f64) -> Recipe {
    reagent.recipe().flatten().normalize().scale(total_vol)
}

impl PartialEq for Reagent {
    fn eq(&self, other: &Self) -> bool {
        self.0.registry == other.0.registry && self.0.name == other.0.name
    }
}

impl Eq for Reagent {}

impl Hash for Reagent {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.registry.hash(state);
        self.0.name.hash(state);
    }
}

impl PartialOrd for Reagent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Reagent {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .registry
            .cmp(&other.0.registry)
            .then_with(|| self.0.name.cmp(&other.0.name))
    }
}

impl fmt::Debug for Reagent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_mixture() { "Mixture" } else { "Reagent" };
        write!(f, "{kind}('{}')", self.name())
    }
}

impl fmt::Display for Reagent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Owns reagent names. A name is defined once; redefining a mixture with the
/// same relative composition returns the existing reagent, anything else is
/// rejected.
#[derive(Debug)]
pub struct ReagentRegistry {
    id: RegistryId,
    reagents: BTreeMap<String, Reagent>,
}

impl Default for ReagentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ReagentRegistry {
    pub fn new() -> Self {
        Self {
            id: RegistryId::next(),
            reagents: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> RegistryId {
        self.id
    }

    pub fn len(&self) -> usize {
        self.reagents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reagents.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.reagents.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<Reagent> {
        self.reagents.get(name).cloned()
    }

    pub fn require(&self, name: &str) -> Result<Reagent> {
        self.get(name)
            .ok_or_else(|| SynbioError::UnknownReagent(name.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Reagent> {
        self.reagents.values()
    }

    pub fn owns(&self, reagent: &Reagent) -> bool {
        reagent.registry_id() == self.id && self.reagents.contains_key(reagent.name())
    }

    fn check_name(name: &str) -> Result<String> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(SynbioError::InvalidRecipe(
                "reagent name must not be empty".to_string(),
            ));
        }
        Ok(trimmed.to_string())
    }

    /// Returns the pure reagent `name`, defining it on first use.
    pub fn reagent(&mut self, name: &str) -> Result<Reagent> {
        let name = Self::check_name(name)?;
        if let Some(existing) = self.reagents.get(&name) {
            if existing.is_mixture() {
                return Err(SynbioError::DuplicateReagent(name));
            }
            return Ok(existing.clone());
        }
        let reagent = Reagent(Arc::new(ReagentInner {
            registry: self.id,
            name: name.clone(),
            recipe: None,
        }));
        self.reagents.insert(name, reagent.clone());
        Ok(reagent)
    }

    /// Defines the mixture `name` from reagents already in this registry.
    pub fn mixture(&mut self, name: &str, recipe: Recipe) -> Result<Reagent> {
        let name = Self::check_name(name)?;
        if recipe.is_empty() {
            return Err(SynbioError::InvalidRecipe(format!(
                "mixture '{name}' needs at least one component"
            )));
        }
        if let Some(foreign) = recipe.reagents().find(|r| !self.owns(r)) {
            return Err(SynbioError::ForeignReagent(foreign.name().to_string()));
        }
        if let Some(existing) = self.reagents.get(&name) {
            return match existing.components() {
                Some(current) if current.normalize() == recipe.normalize() => {
                    Ok(existing.clone())
                }
                _ => Err(SynbioError::DuplicateReagent(name)),
            };
        }
        let reagent = Reagent(Arc::new(ReagentInner {
            registry: self.id,
            name: name.clone(),
            recipe: Some(recipe),
        }));
        self.reagents.insert(name, reagent.clone());
        Ok(reagent)
    }

    /// Defines a mixture whose components are given by name.
    pub fn mixture_from_names(
        &mut self,
        name: &str,
        parts: &BTreeMap<String, f64>,
    ) -> Result<Reagent> {
        let mut resolved = Vec::with_capacity(parts.len());
        for (component, quantity) in parts {
            resolved.push((self.require(component)?, *quantity));
        }
        let recipe = Recipe::from_parts(resolved)?;
        self.mixture(name, recipe)
    }

    /// Defines every mixture of a recipe book (mixture name -> component
    /// name -> parts). Definitions may reference each other in any order;
    /// names that are neither in the book nor in the registry become pure
    /// reagents.
    pub fn mixtures_from_recipes(
        &mut self,
        book: &BTreeMap<String, BTreeMap<String, f64>>,
    ) -> Result<BTreeMap<String, Reagent>> {
        let mut resolved = BTreeMap::new();
        let mut path = vec![];
        for name in book.keys() {
            self.resolve_book_entry(name, book, &mut path, &mut resolved)?;
        }
        Ok(resolved)
    }

    /// Depth-first resolution; `path` holds the mixtures currently being
    /// defined, so meeting one of them again means the book has a cycle.
    fn resolve_book_entry(
        &mut self,
        name: &str,
        book: &BTreeMap<String, BTreeMap<String, f64>>,
        path: &mut Vec<String>,
        resolved: &mut BTreeMap<String, Reagent>,
    ) -> Result<Reagent> {
        if let Some(done) = resolved.get(name) {
            return Ok(done.clone());
        }
        if let Some(pos) = path.iter().position(|p| p == name) {
            let mut cycle = path[pos..].to_vec();
            cycle.push(name.to_string());
            return Err(SynbioError::CyclicMixture(cycle));
        }
        let Some(parts) = book.get(name) else {
            return match self.get(name) {
                Some(existing) => Ok(existing),
                None => self.reagent(name),
            };
        };

        path.push(name.to_string());
        let mut components = Vec::with_capacity(parts.len());
        for (component, quantity) in parts {
            match self.resolve_book_entry(component, book, path, resolved) {
                Ok(reagent) => components.push((reagent, *quantity)),
                Err(e) => {
                    path.pop();
                    return Err(e);
                }
            }
        }
        path.pop();

        let mixture = self.mixture(name, Recipe::from_parts(components)?)?;
        resolved.insert(name.to_string(), mixture.clone());
        Ok(mixture)
    }

    /// Defines the PURE cell-free system and its components.
    pub fn define_pure_system(&mut self) -> Result<Reagent> {
        let mut parts = Vec::with_capacity(PURE_SYSTEM.len());
        for (name, quantity) in PURE_SYSTEM {
            parts.push((self.reagent(name)?, quantity));
        }
        let recipe = Recipe::from_parts(parts)?;
        self.mixture(PURE_SYSTEM_NAME, recipe)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book(entries: &[(&str, &[(&str, f64)])]) -> BTreeMap<String, BTreeMap<String, f64>> {
        entries
            .iter()
            .map(|(name, parts)| {
                (
                    name.to_string(),
                    parts
                        .iter()
                        .map(|(c, q)| (c.to_string(), *q))
                        .collect::<BTreeMap<_, _>>(),
                )
            })
            .collect()
    }

    #[test]
    fn test_identity_is_name_within_registry() {
        let mut registry = ReagentRegistry::new();
        let a1 = registry.reagent("H2O").unwrap();
        let a2 = registry.reagent("H2O").unwrap();
        assert_eq!(a1, a2);

        let mut other = ReagentRegistry::new();
        let b = other.reagent("H2O").unwrap();
        assert_ne!(a1, b);
    }

    #[test]
    fn test_redefinition_with_different_recipe_is_rejected() {
        let mut registry = ReagentRegistry::new();
        let a = registry.reagent("A").unwrap();
        let b = registry.reagent("B").unwrap();
        let first = Recipe::from_parts([(a.clone(), 1.0), (b.clone(), 1.0)]).unwrap();
        let same = Recipe::from_parts([(a.clone(), 2.0), (b.clone(), 2.0)]).unwrap();
        let different = Recipe::from_parts([(a.clone(), 1.0), (b.clone(), 3.0)]).unwrap();

        let mix = registry.mixture("AB", first).unwrap();
        assert!(mix.is_mixture());
        // Parts are relative, so 2:2 describes the same mixture as 1:1.
        assert_eq!(registry.mixture("AB", same).unwrap(), mix);
        assert!(registry.mixture("AB", different).is_err());
        assert!(matches!(
            registry.mixture("A", Recipe::unit(&b)),
            Err(SynbioError::DuplicateReagent(_))
        ));
        assert!(matches!(
            registry.reagent("AB"),
            Err(SynbioError::DuplicateReagent(_))
        ));
    }

    #[test]
    fn test_identical_redefinition_returns_existing() {
        let mut registry = ReagentRegistry::new();
        let a = registry.reagent("A").unwrap();
        let recipe = Recipe::from_parts([(a.clone(), 2.0)]).unwrap();
        let first = registry.mixture("M", recipe.clone()).unwrap();
        let second = registry.mixture("M", recipe).unwrap();
        assert_eq!(first, second);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_foreign_reagent_rejected() {
        let mut registry = ReagentRegistry::new();
        let mut other = ReagentRegistry::new();
        let foreign = other.reagent("X").unwrap();
        let err = registry
            .mixture("M", Recipe::unit(&foreign))
            .unwrap_err();
        assert!(matches!(err, SynbioError::ForeignReagent(name) if name == "X"));
    }

    #[test]
    fn test_empty_name_rejected() {
        let mut registry = ReagentRegistry::new();
        assert!(registry.reagent("   ").is_err());
    }

    #[test]
    fn test_recipe_book_any_order() {
        let mut registry = ReagentRegistry::new();
        let defs = book(&[
            ("outer", &[("inner", 1.0), ("H2O", 1.0)]),
            ("inner", &[("A", 2.0), ("B", 1.0)]),
        ]);
        let mixtures = registry.mixtures_from_recipes(&defs).unwrap();
        let outer = &mixtures["outer"];
        let flat = outer.recipe().flatten();
        let a = registry.require("A").unwrap();
        let h2o = registry.require("H2O").unwrap();
        assert!(crate::units::approx_eq(flat.normalize().get(&a).unwrap(), 1.0 / 3.0));
        assert!(crate::units::approx_eq(flat.normalize().get(&h2o).unwrap(), 0.5));
        assert!(registry.require("inner").unwrap().is_mixture());
    }

    #[test]
    fn test_recipe_book_cycle_detected() {
        let mut registry = ReagentRegistry::new();
        let defs = book(&[
            ("X", &[("Y", 1.0), ("A", 1.0)]),
            ("Y", &[("Z", 1.0)]),
            ("Z", &[("X", 1.0)]),
        ]);
        let err = registry.mixtures_from_recipes(&defs).unwrap_err();
        match err {
            SynbioError::CyclicMixture(path) => {
                assert_eq!(path, vec!["X", "Y", "Z", "X"]);
            }
            other => panic!("unexpected error {other}"),
        }
        assert!(!registry.contains("X"));
    }

    #[test]
    fn test_self_reference_is_a_cycle() {
        let mut registry = ReagentRegistry::new();
        let defs = book(&[("X", &[("X", 1.0)])]);
        assert!(matches!(
            registry.mixtures_from_recipes(&defs),
            Err(SynbioError::CyclicMixture(_))
        ));
    }

    #[test]
    fn test_pure_system_volumes() {
        let mut registry = ReagentRegistry::new();
        let pure = registry.define_pure_system().unwrap();
        assert_eq!(pure.pure_reagents().len(), 5);
        let volumes = pure.reagent_volumes(10.0);
        let sol_a = registry.require("Sol-A").unwrap();
        let h2o = registry.require("H2O").unwrap();
        assert!(crate::units::approx_eq(volumes.get(&sol_a).unwrap(), 4.0));
        assert!(crate::units::approx_eq(volumes.get(&h2o).unwrap(), 1.0));
        assert!(crate::units::approx_eq(volumes.total(), 10.0));
    }

    #[test]
    fn test_pure_reagent_volumes_are_itself() {
        let mut registry = ReagentRegistry::new();
        let h2o = registry.reagent("H2O").unwrap();
        let volumes = calculate_reagent_volumes(&h2o, 12.5);
        assert_eq!(volumes.len(), 1);
        assert_eq!(volumes.get(&h2o), Some(12.5));
    }
}
