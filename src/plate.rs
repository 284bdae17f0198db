//! Wells and plates.
//!
//! A plate is a fixed grid of wells created eagerly, stored row-major, with
//! spreadsheet-style row letters (`A`..`Z`, `AA`, ...) and 1-based column
//! numbers. All wells of one plate share the same maximum and dead volume.
//! Volumes are microliters.

use crate::error::{Result, SynbioError};
use crate::reagent::{Reagent, ReagentRegistry};
use crate::recipe::{Recipe, add_recipes};
use crate::units::{VOLUME_DECIMALS, VOLUME_EPSILON, round_to};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::LazyLock;

static LOCATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z]*)(\d+)$").expect("valid well location regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlatePreset {
    #[serde(rename = "96")]
    Well96,
    #[serde(rename = "384")]
    Well384,
    #[serde(rename = "384LDV")]
    Well384Ldv,
    #[serde(rename = "1536LDV")]
    Well1536Ldv,
}

impl PlatePreset {
    pub fn all() -> [Self; 4] {
        [
            Self::Well96,
            Self::Well384,
            Self::Well384Ldv,
            Self::Well1536Ldv,
        ]
    }

    pub fn default_name(self) -> &'static str {
        match self {
            Self::Well96 => "96well",
            Self::Well384 => "384well",
            Self::Well384Ldv => "384LDV",
            Self::Well1536Ldv => "1536LDV",
        }
    }

    pub fn shape(self) -> (usize, usize) {
        match self {
            Self::Well96 => (8, 12),
            Self::Well384 | Self::Well384Ldv => (16, 24),
            Self::Well1536Ldv => (32, 48),
        }
    }

    pub fn max_vol(self) -> f64 {
        match self {
            Self::Well96 => 200.0,
            Self::Well384 => 65.0,
            Self::Well384Ldv => 14.0,
            Self::Well1536Ldv => 5.5,
        }
    }

    pub fn dead_vol(self) -> f64 {
        match self {
            Self::Well96 => 40.0,
            Self::Well384 => 20.0,
            Self::Well384Ldv => 6.0,
            Self::Well1536Ldv => 1.0,
        }
    }

    pub fn parse(text: &str) -> Option<Self> {
        let norm = text.trim().to_ascii_uppercase();
        match norm.as_str() {
            "96" | "96WELL" => Some(Self::Well96),
            "384" | "384WELL" => Some(Self::Well384),
            "384LDV" | "384_LDV" => Some(Self::Well384Ldv),
            "1536LDV" | "1536_LDV" | "1536" => Some(Self::Well1536Ldv),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WellVolumes {
    pub max_vol: f64,
    pub dead_vol: f64,
    pub working_vol: f64,
}

impl WellVolumes {
    pub fn new(max_vol: f64, dead_vol: f64) -> Self {
        Self {
            max_vol,
            dead_vol,
            working_vol: round_to(max_vol - dead_vol, VOLUME_DECIMALS).max(0.0),
        }
    }
}

/// Spreadsheet-style row names: `A`..`Z`, then `AA`, `AB`, ...
pub fn row_names(count: usize) -> Vec<String> {
    (0..count).map(row_name).collect()
}

pub fn row_name(index: usize) -> String {
    let mut letters = vec![];
    let mut n = index + 1;
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

pub fn col_names(count: usize) -> Vec<String> {
    (1..=count).map(|c| c.to_string()).collect()
}

/// Sort key placing `A2` before `A10` and `A10` before `B1`.
pub fn location_sort_key(location: &str) -> (String, u64) {
    match LOCATION_RE.captures(location.trim()) {
        Some(caps) => (
            caps[1].to_ascii_uppercase(),
            caps[2].parse::<u64>().unwrap_or(u64::MAX),
        ),
        None => (location.to_string(), 0),
    }
}

#[derive(Clone, Debug)]
pub struct Well {
    name: String,
    location: String,
    row: usize,
    col: usize,
    content: Option<Reagent>,
    volume: f64,
    max_vol: f64,
    dead_vol: f64,
}

impl Well {
    fn new(location: String, row: usize, col: usize, max_vol: f64, dead_vol: f64) -> Self {
        Self {
            name: location.clone(),
            location,
            row,
            col,
            content: None,
            volume: 0.0,
            max_vol,
            dead_vol,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn row(&self) -> usize {
        self.row
    }

    pub fn col(&self) -> usize {
        self.col
    }

    pub fn content(&self) -> Option<&Reagent> {
        self.content.as_ref()
    }

    pub fn set_content(&mut self, content: Option<Reagent>) {
        self.content = content;
    }

    pub fn max_vol(&self) -> f64 {
        self.max_vol
    }

    pub fn dead_vol(&self) -> f64 {
        self.dead_vol
    }

    pub fn volume(&self) -> f64 {
        round_to(self.volume, VOLUME_DECIMALS)
    }

    /// Fails without touching the well when `volume` is negative, not finite
    /// or above `max_vol`.
    pub fn set_volume(&mut self, volume: f64) -> Result<()> {
        if !volume.is_finite() || volume < -VOLUME_EPSILON {
            return Err(SynbioError::Range {
                well: self.location.clone(),
                volume,
            });
        }
        if volume > self.max_vol + VOLUME_EPSILON {
            return Err(SynbioError::Capacity {
                well: self.location.clone(),
                volume,
                max_vol: self.max_vol,
            });
        }
        self.volume = volume.clamp(0.0, self.max_vol);
        Ok(())
    }

    pub fn working_vol(&self) -> f64 {
        round_to(self.max_vol - self.dead_vol, VOLUME_DECIMALS).max(0.0)
    }

    /// Volume above the dead-volume floor.
    pub fn available_vol(&self) -> f64 {
        round_to(self.volume() - self.dead_vol, VOLUME_DECIMALS).max(0.0)
    }

    /// Unrounded volume above the dead-volume floor, for planning bookkeeping.
    pub(crate) fn drawable_vol(&self) -> f64 {
        (self.volume - self.dead_vol).max(0.0)
    }

    pub fn is_empty(&self) -> bool {
        self.volume() == 0.0
    }

    pub fn reagents(&self) -> BTreeSet<Reagent> {
        self.content
            .as_ref()
            .map(|c| c.pure_reagents())
            .unwrap_or_default()
    }

    /// Pure-reagent volumes held by this well.
    pub fn reagent_volumes(&self) -> Recipe {
        match &self.content {
            Some(content) => content.reagent_volumes(self.volume()),
            None => Recipe::new(),
        }
    }

    pub(crate) fn draw(&mut self, amount: f64) -> Result<()> {
        self.set_volume(self.volume - amount)
    }
}

impl fmt::Display for Well {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Well @ {}('{}', {} uL)", self.location, self.name, self.volume())
    }
}

#[derive(Clone, Debug)]
pub struct Plate {
    name: String,
    rows: usize,
    cols: usize,
    wells: Vec<Well>,
    by_location: HashMap<String, usize>,
}

impl Plate {
    pub fn new(name: &str, shape: (usize, usize), max_vol: f64, dead_vol: f64) -> Result<Self> {
        let (rows, cols) = shape;
        if rows == 0 || cols == 0 {
            return Err(SynbioError::InvalidParameter(format!(
                "plate shape {rows}x{cols} has no wells"
            )));
        }
        if !max_vol.is_finite() || !dead_vol.is_finite() || max_vol < 0.0 || dead_vol < 0.0 {
            return Err(SynbioError::InvalidParameter(format!(
                "well volumes must be finite and nonnegative (max {max_vol}, dead {dead_vol})"
            )));
        }
        if dead_vol > max_vol {
            return Err(SynbioError::InconsistentGeometry(format!(
                "dead volume {dead_vol} uL is larger than max volume {max_vol} uL"
            )));
        }

        let row_labels = row_names(rows);
        let col_labels = col_names(cols);
        let mut wells = Vec::with_capacity(rows * cols);
        let mut by_location = HashMap::with_capacity(rows * cols);
        for (i, r) in row_labels.iter().enumerate() {
            for (j, c) in col_labels.iter().enumerate() {
                let location = format!("{r}{c}");
                by_location.insert(location.clone(), wells.len());
                wells.push(Well::new(location, i, j, max_vol, dead_vol));
            }
        }
        Ok(Self {
            name: name.to_string(),
            rows,
            cols,
            wells,
            by_location,
        })
    }

    pub fn from_preset(preset: PlatePreset, name: Option<&str>) -> Self {
        let name = name.unwrap_or(preset.default_name());
        Self::new(name, preset.shape(), preset.max_vol(), preset.dead_vol())
            .expect("preset plate geometry is valid")
    }

    pub fn make_96_well(name: Option<&str>) -> Self {
        Self::from_preset(PlatePreset::Well96, name)
    }

    pub fn make_384_well(name: Option<&str>) -> Self {
        Self::from_preset(PlatePreset::Well384, name)
    }

    pub fn make_384_ldv_well(name: Option<&str>) -> Self {
        Self::from_preset(PlatePreset::Well384Ldv, name)
    }

    pub fn make_1536_ldv_well(name: Option<&str>) -> Self {
        Self::from_preset(PlatePreset::Well1536Ldv, name)
    }

    /// An empty plate with this plate's shape and well geometry.
    pub fn like(&self, name: Option<&str>) -> Result<Self> {
        let volumes = self.well_volumes()?;
        let default_name = format!("like_{}", self.name);
        Self::new(
            name.unwrap_or(&default_name),
            self.shape(),
            volumes.max_vol,
            volumes.dead_vol,
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn num_wells(&self) -> usize {
        self.wells.len()
    }

    pub fn wells(&self) -> impl Iterator<Item = &Well> {
        self.wells.iter()
    }

    fn index_of(&self, location: &str) -> Option<usize> {
        let key = location.trim();
        self.by_location
            .get(key)
            .or_else(|| self.by_location.get(&key.to_ascii_uppercase()))
            .copied()
    }

    pub fn get(&self, location: &str) -> Option<&Well> {
        self.index_of(location).map(|idx| &self.wells[idx])
    }

    pub fn well(&self, location: &str) -> Result<&Well> {
        self.get(location)
            .ok_or_else(|| SynbioError::UnknownWell(location.to_string()))
    }

    pub fn well_mut(&mut self, location: &str) -> Result<&mut Well> {
        match self.index_of(location) {
            Some(idx) => Ok(&mut self.wells[idx]),
            None => Err(SynbioError::UnknownWell(location.to_string())),
        }
    }

    pub fn at(&self, row: usize, col: usize) -> Option<&Well> {
        if row >= self.rows || col >= self.cols {
            return None;
        }
        self.wells.get(row * self.cols + col)
    }

    pub fn at_mut(&mut self, row: usize, col: usize) -> Option<&mut Well> {
        if row >= self.rows || col >= self.cols {
            return None;
        }
        self.wells.get_mut(row * self.cols + col)
    }

    /// Wells holding a nonzero volume, in plate order.
    pub fn full_wells(&self) -> Vec<&Well> {
        self.wells.iter().filter(|w| !w.is_empty()).collect()
    }

    pub fn empty_wells(&self) -> Vec<&Well> {
        self.wells.iter().filter(|w| w.is_empty()).collect()
    }

    pub fn contents(&self) -> BTreeSet<Reagent> {
        self.wells
            .iter()
            .filter(|w| !w.is_empty())
            .filter_map(|w| w.content().cloned())
            .collect()
    }

    /// Full wells grouped by their exact content (mixtures are not expanded).
    pub fn wells_by_content(&self) -> BTreeMap<Reagent, Vec<&Well>> {
        let mut ret: BTreeMap<Reagent, Vec<&Well>> = BTreeMap::new();
        for well in self.wells.iter().filter(|w| !w.is_empty()) {
            if let Some(content) = well.content() {
                ret.entry(content.clone()).or_default().push(well);
            }
        }
        ret
    }

    /// Locations grouped by assigned content, including wells that hold no
    /// volume yet.
    pub fn locations_by_content(&self) -> BTreeMap<Reagent, Vec<String>> {
        let mut ret: BTreeMap<Reagent, Vec<String>> = BTreeMap::new();
        for well in &self.wells {
            if let Some(content) = well.content() {
                ret.entry(content.clone())
                    .or_default()
                    .push(well.location.clone());
            }
        }
        ret
    }

    /// `(location, volume)` for every well, in plate order.
    pub fn volume_snapshot(&self) -> Vec<(String, f64)> {
        self.wells
            .iter()
            .map(|w| (w.location.clone(), w.volume()))
            .collect()
    }

    pub fn content_volumes(&self) -> BTreeMap<Reagent, f64> {
        self.wells_by_content()
            .into_iter()
            .map(|(content, wells)| (content, wells.iter().map(|w| w.volume()).sum()))
            .collect()
    }

    /// Aspirable volume per content, summed over its wells.
    pub fn available_volumes(&self) -> BTreeMap<Reagent, f64> {
        self.wells_by_content()
            .into_iter()
            .map(|(content, wells)| (content, wells.iter().map(|w| w.available_vol()).sum()))
            .collect()
    }

    pub(crate) fn drawable_volumes(&self) -> BTreeMap<Reagent, f64> {
        self.wells_by_content()
            .into_iter()
            .map(|(content, wells)| (content, wells.iter().map(|w| w.drawable_vol()).sum()))
            .collect()
    }

    /// Pure reagents across all full wells, with mixtures expanded.
    pub fn reagents(&self) -> BTreeSet<Reagent> {
        self.contents()
            .iter()
            .flat_map(|c| c.pure_reagents())
            .collect()
    }

    /// Total pure-reagent volume required to fill every full well.
    pub fn reagent_volumes(&self) -> Recipe {
        let per_well = self
            .wells
            .iter()
            .filter(|w| !w.is_empty())
            .map(|w| w.reagent_volumes())
            .collect::<Vec<_>>();
        add_recipes(&per_well)
    }

    pub fn well_volumes(&self) -> Result<WellVolumes> {
        let mut geometries = self.wells.iter().map(|w| (w.max_vol, w.dead_vol));
        let Some((max_vol, dead_vol)) = geometries.next() else {
            return Err(SynbioError::InconsistentGeometry(format!(
                "plate '{}' has no wells",
                self.name
            )));
        };
        if geometries.any(|(m, d)| m != max_vol || d != dead_vol) {
            return Err(SynbioError::InconsistentGeometry(format!(
                "plate '{}' wells have inconsistent volumes",
                self.name
            )));
        }
        if dead_vol > max_vol {
            return Err(SynbioError::InconsistentGeometry(format!(
                "dead volume {dead_vol} uL is larger than max volume {max_vol} uL"
            )));
        }
        Ok(WellVolumes::new(max_vol, dead_vol))
    }

    /// Applies a new geometry to every well. Rejected as a whole when any
    /// well already holds more than the new maximum.
    pub fn set_well_volumes(&mut self, max_vol: f64, dead_vol: f64) -> Result<WellVolumes> {
        if !max_vol.is_finite() || !dead_vol.is_finite() || max_vol < 0.0 || dead_vol < 0.0 {
            return Err(SynbioError::InvalidParameter(format!(
                "well volumes must be finite and nonnegative (max {max_vol}, dead {dead_vol})"
            )));
        }
        if dead_vol > max_vol {
            return Err(SynbioError::InconsistentGeometry(format!(
                "dead volume {dead_vol} uL is larger than max volume {max_vol} uL"
            )));
        }
        if let Some(well) = self
            .wells
            .iter()
            .find(|w| w.volume > max_vol + VOLUME_EPSILON)
        {
            return Err(SynbioError::Capacity {
                well: well.location.clone(),
                volume: well.volume(),
                max_vol,
            });
        }
        for well in self.wells.iter_mut() {
            well.max_vol = max_vol;
            well.dead_vol = dead_vol;
        }
        let expected = WellVolumes::new(max_vol, dead_vol);
        let actual = self.well_volumes()?;
        if actual != expected {
            return Err(SynbioError::InconsistentGeometry(format!(
                "volume reassignment failed: expected {expected:?}, found {actual:?}"
            )));
        }
        Ok(actual)
    }

    /// Fills each location with `content` at `volume`, naming the well after
    /// the content. Nothing changes when any location or the volume is invalid.
    pub fn fill_wells(&mut self, content: &Reagent, volume: f64, locations: &[&str]) -> Result<()> {
        let mut indices = Vec::with_capacity(locations.len());
        for location in locations {
            let idx = self
                .index_of(location)
                .ok_or_else(|| SynbioError::UnknownWell(location.to_string()))?;
            indices.push(idx);
        }
        if let Some(&idx) = indices.first() {
            self.wells[idx].clone().set_volume(volume)?;
        }
        for idx in indices {
            let well = &mut self.wells[idx];
            well.set_volume(volume)?;
            well.set_name(content.name());
            well.set_content(Some(content.clone()));
        }
        Ok(())
    }

    /// Combines two plates of identical geometry well by well. Wells filled
    /// on both plates hold a mixture of both contents weighted by volume and
    /// the summed volume.
    pub fn overlay(&self, other: &Plate, registry: &mut ReagentRegistry) -> Result<Plate> {
        if self.shape() != other.shape() {
            return Err(SynbioError::InconsistentGeometry(format!(
                "cannot combine {:?} plate '{}' with {:?} plate '{}'",
                self.shape(),
                self.name,
                other.shape(),
                other.name
            )));
        }
        if self.well_volumes()? != other.well_volumes()? {
            return Err(SynbioError::InconsistentGeometry(format!(
                "plates '{}' and '{}' have different well volumes",
                self.name, other.name
            )));
        }

        let mut ret = self.like(Some(&format!("{} + {}", self.name, other.name)))?;
        for (idx, (this, that)) in self.wells.iter().zip(other.wells.iter()).enumerate() {
            let target = &mut ret.wells[idx];
            match (this.content(), that.content()) {
                (None, None) => {}
                (Some(content), None) | (None, Some(content)) => {
                    let source = if this.content().is_some() { this } else { that };
                    target.set_volume(source.volume())?;
                    target.set_name(source.name());
                    target.set_content(Some(content.clone()));
                }
                (Some(a), Some(b)) => {
                    target.set_volume(this.volume() + that.volume())?;
                    if a == b {
                        target.set_name(this.name());
                        target.set_content(Some(a.clone()));
                        continue;
                    }
                    let mixture_name = if this.volume() == that.volume() {
                        format!("{a} + {b}")
                    } else {
                        format!("{a} ({} uL) + {b} ({} uL)", this.volume(), that.volume())
                    };
                    let weights = if this.volume() + that.volume() > 0.0 {
                        (this.volume(), that.volume())
                    } else {
                        (1.0, 1.0)
                    };
                    let recipe = Recipe::from_parts([(a.clone(), weights.0), (b.clone(), weights.1)])?;
                    let mixture = registry.mixture(&mixture_name, recipe)?;
                    target.set_name(&format!("{} + {}", this.name(), that.name()));
                    target.set_content(Some(mixture));
                }
            }
        }
        Ok(ret)
    }
}

impl fmt::Display for Plate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let volumes = self
            .well_volumes()
            .map(|v| format!("max_vol={} uL, dead_vol={} uL", v.max_vol, v.dead_vol))
            .unwrap_or_else(|e| e.to_string());
        write!(
            f,
            "Plate(name=\"{}\", shape=({}, {}), {} full wells, {})",
            self.name,
            self.rows,
            self.cols,
            self.full_wells().len(),
            volumes
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::approx_eq;

    #[test]
    fn test_row_names_spreadsheet_style() {
        assert_eq!(row_names(3), vec!["A", "B", "C"]);
        let many = row_names(30);
        assert_eq!(many[25], "Z");
        assert_eq!(many[26], "AA");
        assert_eq!(many[29], "AD");
        assert_eq!(row_name(26 + 26 * 26), "AAA");
        assert_eq!(col_names(3), vec!["1", "2", "3"]);
    }

    #[test]
    fn test_location_sort_key() {
        let mut locs = vec!["B1", "A10", "A2", "AA1", "A1"];
        locs.sort_by_key(|l| location_sort_key(l));
        assert_eq!(locs, vec!["A1", "A2", "A10", "AA1", "B1"]);
    }

    #[test]
    fn test_custom_plate_init() {
        let plate = Plate::new("test_plate", (3, 4), 30.0, 5.0).unwrap();
        assert_eq!(plate.num_wells(), 12);
        assert_eq!(plate.at(2, 3).unwrap().location(), "C4");
        assert_eq!(plate.well("b2").unwrap().location(), "B2");
        assert!(plate.get("D1").is_none());
        assert!(plate.full_wells().is_empty());
        assert!(Plate::new("bad", (0, 4), 30.0, 5.0).is_err());
        assert!(matches!(
            Plate::new("bad", (2, 2), 5.0, 30.0),
            Err(SynbioError::InconsistentGeometry(_))
        ));
    }

    #[test]
    fn test_presets() {
        let plate = Plate::make_1536_ldv_well(None);
        assert_eq!(plate.shape(), (32, 48));
        assert_eq!(plate.name(), "1536LDV");
        assert_eq!(plate.wells().last().unwrap().location(), "AF48");
        assert_eq!(PlatePreset::parse("384ldv"), Some(PlatePreset::Well384Ldv));
        assert_eq!(
            Plate::make_96_well(Some("dest")).well_volumes().unwrap(),
            WellVolumes::new(200.0, 40.0)
        );
    }

    #[test]
    fn test_well_volumes_getter_and_setter() {
        let mut plate = Plate::make_384_ldv_well(None);
        assert_eq!(
            plate.well_volumes().unwrap(),
            WellVolumes {
                max_vol: 14.0,
                dead_vol: 6.0,
                working_vol: 8.0
            }
        );
        plate.set_well_volumes(200.0, 50.0).unwrap();
        let well = plate.at(4, 2).unwrap();
        assert_eq!(well.max_vol(), 200.0);
        assert_eq!(well.dead_vol(), 50.0);
        assert_eq!(well.working_vol(), 150.0);
    }

    #[test]
    fn test_set_well_volumes_refuses_overfull_wells() {
        let mut registry = ReagentRegistry::new();
        let h2o = registry.reagent("H2O").unwrap();
        let mut plate = Plate::make_96_well(None);
        plate.fill_wells(&h2o, 150.0, &["A1"]).unwrap();
        assert!(matches!(
            plate.set_well_volumes(100.0, 10.0),
            Err(SynbioError::Capacity { .. })
        ));
        assert_eq!(plate.well_volumes().unwrap().max_vol, 200.0);
    }

    #[test]
    fn test_inconsistent_geometry_detected() {
        let mut plate = Plate::make_96_well(None);
        plate.wells[5].dead_vol = 1.0;
        assert!(matches!(
            plate.well_volumes(),
            Err(SynbioError::InconsistentGeometry(_))
        ));
    }

    #[test]
    fn test_well_volume_setter_is_atomic() {
        let mut plate = Plate::make_384_ldv_well(None);
        let well = plate.well_mut("A1").unwrap();
        well.set_volume(10.0).unwrap();
        assert!(matches!(
            well.set_volume(14.5),
            Err(SynbioError::Capacity { .. })
        ));
        assert_eq!(well.volume(), 10.0);
        assert!(matches!(well.set_volume(-1.0), Err(SynbioError::Range { .. })));
        assert!(matches!(
            well.set_volume(f64::NAN),
            Err(SynbioError::Range { .. })
        ));
        assert_eq!(well.volume(), 10.0);
        well.set_volume(14.0).unwrap();
        assert_eq!(well.available_vol(), 8.0);
        well.set_volume(3.0).unwrap();
        assert_eq!(well.available_vol(), 0.0);
    }

    #[test]
    fn test_volume_reads_are_rounded() {
        let mut plate = Plate::make_96_well(None);
        let well = plate.well_mut("A1").unwrap();
        well.set_volume(0.1 + 0.2).unwrap();
        assert_eq!(well.volume(), 0.3);
    }

    #[test]
    fn test_fill_wells_unknown_location_changes_nothing() {
        let mut registry = ReagentRegistry::new();
        let h2o = registry.reagent("H2O").unwrap();
        let mut plate = Plate::new("p", (3, 4), 30.0, 5.0).unwrap();
        assert!(plate.fill_wells(&h2o, 10.0, &["A1", "Z9"]).is_err());
        assert!(plate.full_wells().is_empty());
        assert!(plate.fill_wells(&h2o, 31.0, &["A1"]).is_err());
        assert!(plate.full_wells().is_empty());
    }

    #[test]
    fn test_aggregate_views() {
        let mut registry = ReagentRegistry::new();
        let h2o = registry.reagent("H2O").unwrap();
        let pure = registry.define_pure_system().unwrap();
        let mut plate = Plate::new("p", (3, 4), 30.0, 5.0).unwrap();
        plate.fill_wells(&h2o, 10.0, &["A1", "B3", "C4"]).unwrap();
        plate.fill_wells(&pure, 20.0, &["A2", "C1"]).unwrap();

        assert_eq!(plate.full_wells().len(), 5);
        assert_eq!(plate.empty_wells().len(), 7);
        assert_eq!(plate.contents().len(), 2);

        let by_content = plate.wells_by_content();
        assert_eq!(by_content[&h2o].len(), 3);
        assert_eq!(by_content[&pure].len(), 2);
        assert_eq!(plate.content_volumes()[&pure], 40.0);
        assert_eq!(plate.available_volumes()[&h2o], 15.0);

        assert_eq!(plate.reagents().len(), 5);
        let volumes = plate.reagent_volumes();
        // 30 uL of plain water plus 1/10 of 40 uL PURE.
        assert!(approx_eq(volumes.get(&h2o).unwrap(), 34.0));
        let sol_a = registry.require("Sol-A").unwrap();
        assert!(approx_eq(volumes.get(&sol_a).unwrap(), 16.0));
        assert!(approx_eq(volumes.total(), 70.0));
    }

    #[test]
    fn test_like_copies_geometry() {
        let plate = Plate::make_384_well(Some("src"));
        let copy = plate.like(None).unwrap();
        assert_eq!(copy.name(), "like_src");
        assert_eq!(copy.shape(), (16, 24));
        assert_eq!(copy.well_volumes().unwrap(), plate.well_volumes().unwrap());
    }

    #[test]
    fn test_overlay_plates() {
        let mut registry = ReagentRegistry::new();
        let h2o = registry.reagent("H2O").unwrap();
        let pure = registry.define_pure_system().unwrap();
        let mut left = Plate::new("test_plate1", (3, 4), 30.0, 5.0).unwrap();
        left.fill_wells(&h2o, 10.0, &["A1", "B3", "C4"]).unwrap();
        let mut right = Plate::new("test_plate2", (3, 4), 30.0, 5.0).unwrap();
        right.fill_wells(&pure, 10.0, &["C1", "B3", "A4"]).unwrap();

        let combined = left.overlay(&right, &mut registry).unwrap();
        assert_eq!(combined.name(), "test_plate1 + test_plate2");

        let b3 = combined.well("B3").unwrap();
        assert_eq!(b3.volume(), 20.0);
        let expected = Recipe::from_parts([(h2o.clone(), 1.0), (pure.clone(), 1.0)]).unwrap();
        assert_eq!(b3.content().unwrap().recipe().normalize(), expected.normalize());
        assert!(b3.content().unwrap().pure_reagents().contains(&h2o));
        assert_eq!(b3.content().unwrap().name(), "H2O + PURE");

        assert_eq!(combined.well("A1").unwrap().content(), Some(&h2o));
        assert_eq!(combined.well("C4").unwrap().volume(), 10.0);
        assert_eq!(combined.well("A4").unwrap().content(), Some(&pure));
        assert_eq!(combined.well("C1").unwrap().volume(), 10.0);
        assert!(combined.well("A2").unwrap().content().is_none());
    }

    #[test]
    fn test_overlay_rejects_mismatched_plates() {
        let mut registry = ReagentRegistry::new();
        let a = Plate::make_96_well(None);
        let b = Plate::make_384_well(None);
        assert!(a.overlay(&b, &mut registry).is_err());
    }
}
