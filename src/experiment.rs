//! Experiments: named conditions placed on a destination plate, and the
//! Echo workflow that stages a source plate and plans the transfers.

use crate::config::SynbioParameters;
use crate::error::Result;
use crate::plate::{Plate, PlatePreset, WellVolumes};
use crate::plate_map::PlateMap;
use crate::planner::{Protocol, generate_protocol};
use crate::reagent::{Reagent, ReagentRegistry, calculate_reagent_volumes};
use crate::recipe::{Recipe, add_recipes};
use crate::staging::{
    SizingConfig, SourceAllocation, layout_source_plate, size_source_wells, stage_source_plate,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::info;

pub const DEFAULT_CONDITION_VOLUME: f64 = 10.0;
pub const DEFAULT_REPLICATES: usize = 3;

/// A content dispensed at a fixed volume into each of `replicates` wells.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub content: Reagent,
    pub volume: f64,
    pub replicates: usize,
}

impl Condition {
    pub fn new(content: Reagent, volume: f64) -> Self {
        Self {
            content,
            volume,
            replicates: DEFAULT_REPLICATES,
        }
    }

    pub fn with_replicates(mut self, replicates: usize) -> Self {
        self.replicates = replicates;
        self
    }

    /// Pure-reagent volumes over all replicates.
    pub fn reagent_volumes(&self) -> Recipe {
        calculate_reagent_volumes(&self.content, self.volume * self.replicates as f64)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Experiment {
    pub name: String,
    pub conditions: Vec<(String, Condition)>,
}

impl Experiment {
    pub fn new(name: &str, conditions: Vec<(String, Condition)>) -> Self {
        Self {
            name: name.to_string(),
            conditions,
        }
    }

    pub fn condition(&self, name: &str) -> Option<&Condition> {
        self.conditions
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, c)| c)
    }

    pub fn reagents(&self) -> BTreeSet<Reagent> {
        self.conditions
            .iter()
            .flat_map(|(_, c)| c.content.pure_reagents())
            .collect()
    }

    pub fn reagent_volumes(&self) -> Recipe {
        let recipes = self
            .conditions
            .iter()
            .map(|(_, c)| c.reagent_volumes())
            .collect::<Vec<_>>();
        add_recipes(&recipes)
    }
}

fn default_condition_volume() -> f64 {
    DEFAULT_CONDITION_VOLUME
}

fn default_source_preset() -> PlatePreset {
    PlatePreset::Well384
}

fn default_destination_preset() -> PlatePreset {
    PlatePreset::Well96
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionSpec {
    pub content: String,
    #[serde(default = "default_condition_volume")]
    pub volume: f64,
}

/// JSON description of an experiment: a recipe book, the conditions a plate
/// map may name, and the plate presets to use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentSpec {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub mixtures: BTreeMap<String, BTreeMap<String, f64>>,
    #[serde(default)]
    pub conditions: BTreeMap<String, ConditionSpec>,
    #[serde(default = "default_source_preset")]
    pub source_preset: PlatePreset,
    #[serde(default = "default_destination_preset")]
    pub destination_preset: PlatePreset,
}

impl ExperimentSpec {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Defines the recipe book in `registry` and resolves every condition's
    /// content. Names outside the book become pure reagents.
    pub fn resolve_conditions(
        &self,
        registry: &mut ReagentRegistry,
    ) -> Result<BTreeMap<String, Condition>> {
        registry.mixtures_from_recipes(&self.mixtures)?;
        let mut ret = BTreeMap::new();
        for (name, spec) in &self.conditions {
            let content = match registry.get(&spec.content) {
                Some(existing) => existing,
                None => registry.reagent(&spec.content)?,
            };
            ret.insert(name.clone(), Condition::new(content, spec.volume));
        }
        Ok(ret)
    }

    pub fn source_plate(&self) -> Plate {
        Plate::from_preset(self.source_preset, None)
    }

    pub fn destination_plate(&self) -> Plate {
        Plate::from_preset(self.destination_preset, None)
    }
}

/// A destination plate populated from a plate map, the source plate staged
/// to feed it, and the transfers between them.
#[derive(Debug, Clone)]
pub struct EchoExperiment {
    pub experiment: Experiment,
    pub source: Plate,
    pub destination: Plate,
    pub allocations: BTreeMap<Reagent, SourceAllocation>,
    pub protocol: Protocol,
}

impl EchoExperiment {
    /// Loads the destination from `destination_map`, assigns source wells
    /// from `source_map`, loads them with the sized volumes and plans.
    pub fn from_plate_maps(
        spec: &ExperimentSpec,
        source_map: &PlateMap,
        destination_map: &PlateMap,
        registry: &mut ReagentRegistry,
        params: &SynbioParameters,
    ) -> Result<Self> {
        let (experiment, destination) = Self::load_destination(spec, destination_map, registry)?;
        let mut source = spec.source_plate();
        source.load_reagent_map(source_map, registry)?;
        let allocations = size_source_wells(
            &destination.reagent_volumes(),
            &source.well_volumes()?,
            &params.sizing,
        )?;
        stage_source_plate(&mut source, &allocations)?;
        Self::plan(experiment, source, destination, allocations, params)
    }

    /// Like [`EchoExperiment::from_plate_maps`], but lays the sized source
    /// wells out automatically in plate order.
    pub fn from_destination_map(
        spec: &ExperimentSpec,
        destination_map: &PlateMap,
        registry: &mut ReagentRegistry,
        params: &SynbioParameters,
    ) -> Result<Self> {
        let (experiment, destination) = Self::load_destination(spec, destination_map, registry)?;
        let mut source = spec.source_plate();
        let allocations = size_source_wells(
            &destination.reagent_volumes(),
            &source.well_volumes()?,
            &params.sizing,
        )?;
        layout_source_plate(&mut source, &allocations)?;
        Self::plan(experiment, source, destination, allocations, params)
    }

    fn load_destination(
        spec: &ExperimentSpec,
        destination_map: &PlateMap,
        registry: &mut ReagentRegistry,
    ) -> Result<(Experiment, Plate)> {
        let conditions = spec.resolve_conditions(registry)?;
        let mut destination = spec.destination_plate();
        let applied = destination.apply_plate_map(destination_map, &conditions)?;
        Ok((Experiment::new(&spec.name, applied), destination))
    }

    fn plan(
        experiment: Experiment,
        source: Plate,
        destination: Plate,
        allocations: BTreeMap<Reagent, SourceAllocation>,
        params: &SynbioParameters,
    ) -> Result<Self> {
        let protocol = generate_protocol(&source, &destination, &params.planner)?;
        info!(
            "experiment '{}': {} condition(s), {} source well(s), {} transfer(s)",
            experiment.name,
            experiment.conditions.len(),
            allocations.values().map(|a| a.wells).sum::<usize>(),
            protocol.len()
        );
        Ok(Self {
            experiment,
            source,
            destination,
            allocations,
            protocol,
        })
    }
}

/// Per-reagent volume to load into each source well for `conditions`.
pub fn simulate(
    conditions: &[Condition],
    geometry: &WellVolumes,
    config: &SizingConfig,
) -> Result<BTreeMap<Reagent, f64>> {
    let recipes = conditions
        .iter()
        .map(Condition::reagent_volumes)
        .collect::<Vec<_>>();
    Ok(size_source_wells(&add_recipes(&recipes), geometry, config)?
        .into_iter()
        .map(|(reagent, allocation)| (reagent, allocation.volume_per_well))
        .collect())
}
