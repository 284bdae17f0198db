//! Source-plate preparation: how many wells each reagent needs and how much
//! to load into each of them.

use crate::error::{Result, SynbioError};
use crate::plate::{Plate, WellVolumes};
use crate::reagent::Reagent;
use crate::recipe::Recipe;
use crate::units::round_to;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SizingConfig {
    /// Extra volume (uL) added to every reagent requirement.
    pub buffer_vol: f64,
    pub decimals: u32,
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            buffer_vol: 0.1,
            decimals: 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SourceAllocation {
    pub wells: usize,
    /// Volume to load into each well, dead volume included.
    pub volume_per_well: f64,
}

/// Computes how many source wells each reagent needs and the volume to load
/// into each one so that `volume + buffer` is available above the dead
/// volume.
pub fn size_source_wells(
    reagent_vols: &Recipe,
    geometry: &WellVolumes,
    config: &SizingConfig,
) -> Result<BTreeMap<Reagent, SourceAllocation>> {
    if geometry.working_vol <= 0.0 {
        return Err(SynbioError::InconsistentGeometry(format!(
            "source wells have no working volume (max {} uL, dead {} uL)",
            geometry.max_vol, geometry.dead_vol
        )));
    }
    if !config.buffer_vol.is_finite() || config.buffer_vol < 0.0 {
        return Err(SynbioError::InvalidParameter(format!(
            "buffer volume must be finite and nonnegative, got {}",
            config.buffer_vol
        )));
    }
    Ok(reagent_vols
        .iter()
        .map(|(reagent, volume)| {
            let padded = volume + config.buffer_vol;
            let wells = (padded / geometry.working_vol).ceil().max(1.0) as usize;
            let volume_per_well = round_to(
                padded / wells as f64 + geometry.dead_vol,
                config.decimals,
            );
            (
                reagent.clone(),
                SourceAllocation {
                    wells,
                    volume_per_well,
                },
            )
        })
        .collect())
}

/// Loads a source plate whose wells were already assigned by a plate map.
/// Every reagent must occupy exactly the number of wells sizing asks for.
pub fn stage_source_plate(
    source: &mut Plate,
    allocations: &BTreeMap<Reagent, SourceAllocation>,
) -> Result<()> {
    let assigned = source.locations_by_content();
    for (reagent, allocation) in allocations {
        let found = assigned.get(reagent).map_or(0, Vec::len);
        if found != allocation.wells {
            return Err(SynbioError::SourceLayoutMismatch {
                reagent: reagent.name().to_string(),
                expected: allocation.wells,
                found,
            });
        }
    }
    for (reagent, locations) in &assigned {
        if !allocations.contains_key(reagent) {
            return Err(SynbioError::SourceLayoutMismatch {
                reagent: reagent.name().to_string(),
                expected: 0,
                found: locations.len(),
            });
        }
    }

    for (reagent, allocation) in allocations {
        for location in &assigned[reagent] {
            source.well_mut(location)?.set_volume(allocation.volume_per_well)?;
        }
        info!(
            "staged {} well(s) of '{}' at {} uL",
            allocation.wells,
            reagent.name(),
            allocation.volume_per_well
        );
    }
    Ok(())
}

/// Places each reagent's wells into the empty wells of `source`, in plate
/// order, and loads them.
pub fn layout_source_plate(
    source: &mut Plate,
    allocations: &BTreeMap<Reagent, SourceAllocation>,
) -> Result<()> {
    let needed = allocations.values().map(|a| a.wells).sum::<usize>();
    let free = source
        .wells()
        .filter(|w| w.content().is_none() && w.is_empty())
        .map(|w| w.location().to_string())
        .collect::<Vec<_>>();
    if free.len() < needed {
        return Err(SynbioError::InvalidParameter(format!(
            "source plate '{}' has {} free well(s), {needed} needed",
            source.name(),
            free.len()
        )));
    }
    let mut free = free.into_iter();
    for (reagent, allocation) in allocations {
        let locations = free.by_ref().take(allocation.wells).collect::<Vec<_>>();
        let refs = locations.iter().map(String::as_str).collect::<Vec<_>>();
        source.fill_wells(reagent, allocation.volume_per_well, &refs)?;
        info!(
            "laid out '{}' in {}",
            reagent.name(),
            locations.join(", ")
        );
    }
    Ok(())
}
