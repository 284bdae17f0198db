//! Plate maps: CSV grids naming what goes into each well.
//!
//! The first header cell is `Rows/Cols` and the first column holds row
//! labels. Every other cell is a condition or reagent name, or `-` for an
//! unused well.

use crate::error::{Result, SynbioError};
use crate::experiment::Condition;
use crate::plate::Plate;
use crate::reagent::ReagentRegistry;
use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;
use tracing::debug;

pub const PLATE_MAP_CORNER: &str = "Rows/Cols";
pub const UNUSED_WELL: &str = "-";

#[derive(Debug, Clone, PartialEq)]
pub struct PlateMap {
    row_labels: Vec<String>,
    col_labels: Vec<String>,
    cells: Vec<Vec<Option<String>>>,
}

/// One used well of a map with its replicate label.
#[derive(Debug, Clone, PartialEq)]
pub struct PlateMapEntry {
    pub row: usize,
    pub col: usize,
    pub name: String,
    pub replicate: usize,
}

impl PlateMapEntry {
    pub fn label(&self) -> String {
        format!("{}_{}", self.name, self.replicate)
    }
}

impl PlateMap {
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);
        let headers = rdr.headers()?.clone();
        if headers.get(0) != Some(PLATE_MAP_CORNER) {
            return Err(SynbioError::PlateMapFormat(format!(
                "first header cell must be '{PLATE_MAP_CORNER}', found '{}'",
                headers.get(0).unwrap_or_default()
            )));
        }
        let col_labels = headers.iter().skip(1).map(str::to_string).collect::<Vec<_>>();

        let mut row_labels = vec![];
        let mut cells = vec![];
        for (line, record) in rdr.records().enumerate() {
            let record = record?;
            if record.len() != headers.len() {
                return Err(SynbioError::PlateMapFormat(format!(
                    "row {} has {} cell(s), header has {}",
                    line + 1,
                    record.len(),
                    headers.len()
                )));
            }
            row_labels.push(record.get(0).unwrap_or_default().to_string());
            cells.push(
                record
                    .iter()
                    .skip(1)
                    .map(|cell| match cell {
                        "" | UNUSED_WELL => None,
                        name => Some(name.to_string()),
                    })
                    .collect(),
            );
        }
        Ok(Self {
            row_labels,
            col_labels,
            cells,
        })
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.row_labels.len(), self.col_labels.len())
    }

    pub fn row_labels(&self) -> &[String] {
        &self.row_labels
    }

    pub fn col_labels(&self) -> &[String] {
        &self.col_labels
    }

    pub fn get(&self, row: usize, col: usize) -> Option<&str> {
        self.cells.get(row)?.get(col)?.as_deref()
    }

    /// Distinct names in order of first appearance.
    pub fn names(&self) -> Vec<String> {
        let mut ret: Vec<String> = vec![];
        for name in self.cells.iter().flatten().flatten() {
            if !ret.contains(name) {
                ret.push(name.clone());
            }
        }
        ret
    }

    /// Used wells in row-major order, numbering repeated names from 1.
    pub fn entries(&self) -> Vec<PlateMapEntry> {
        let mut counters: BTreeMap<&str, usize> = BTreeMap::new();
        let mut ret = vec![];
        for (row, cells) in self.cells.iter().enumerate() {
            for (col, cell) in cells.iter().enumerate() {
                let Some(name) = cell else {
                    continue;
                };
                let counter = counters.entry(name.as_str()).or_default();
                *counter += 1;
                ret.push(PlateMapEntry {
                    row,
                    col,
                    name: name.clone(),
                    replicate: *counter,
                });
            }
        }
        ret
    }

    /// Number of wells carrying each name.
    pub fn replicate_counts(&self) -> BTreeMap<String, usize> {
        let mut ret = BTreeMap::new();
        for entry in self.entries() {
            *ret.entry(entry.name).or_default() += 1;
        }
        ret
    }

    fn check_fits(&self, plate: &Plate) -> Result<()> {
        let (map_rows, map_cols) = self.shape();
        let (plate_rows, plate_cols) = plate.shape();
        if map_rows > plate_rows || map_cols > plate_cols {
            return Err(SynbioError::PlateMapShape {
                map_rows,
                map_cols,
                plate_rows,
                plate_cols,
            });
        }
        Ok(())
    }
}

impl Plate {
    /// Fills the wells named by `map` with their condition's content and
    /// volume and labels them `name_replicate`. Returns the conditions with
    /// their replicate counts filled in, in order of first appearance.
    pub fn apply_plate_map(
        &mut self,
        map: &PlateMap,
        conditions: &BTreeMap<String, Condition>,
    ) -> Result<Vec<(String, Condition)>> {
        map.check_fits(self)?;
        let names = map.names();
        if let Some(missing) = names.iter().find(|n| !conditions.contains_key(*n)) {
            return Err(SynbioError::UnknownCondition(missing.clone()));
        }
        for name in &names {
            let volume = conditions[name].volume;
            if let Some(max_vol) = self.at(0, 0).map(|w| w.max_vol()) {
                if !volume.is_finite() || volume < 0.0 || volume > max_vol {
                    return Err(SynbioError::Capacity {
                        well: name.clone(),
                        volume,
                        max_vol,
                    });
                }
            }
        }

        for entry in map.entries() {
            let condition = &conditions[&entry.name];
            let Some(well) = self.at_mut(entry.row, entry.col) else {
                continue;
            };
            well.set_volume(condition.volume)?;
            well.set_content(Some(condition.content.clone()));
            well.set_name(&entry.label());
        }
        let counts = map.replicate_counts();
        debug!("applied plate map with {} condition(s) to '{}'", names.len(), self.name());
        Ok(names
            .into_iter()
            .map(|name| {
                let mut condition = conditions[&name].clone();
                condition.replicates = counts.get(&name).copied().unwrap_or(0);
                (name, condition)
            })
            .collect())
    }

    /// Assigns contents from `map` without touching volumes. Names resolve
    /// in `registry`; unknown names become pure reagents.
    pub fn load_reagent_map(&mut self, map: &PlateMap, registry: &mut ReagentRegistry) -> Result<()> {
        map.check_fits(self)?;
        let mut resolved = BTreeMap::new();
        for name in map.names() {
            let reagent = match registry.get(&name) {
                Some(existing) => existing,
                None => registry.reagent(&name)?,
            };
            resolved.insert(name, reagent);
        }
        for entry in map.entries() {
            let Some(well) = self.at_mut(entry.row, entry.col) else {
                continue;
            };
            well.set_content(Some(resolved[&entry.name].clone()));
            well.set_name(&entry.label());
        }
        debug!("loaded {} reagent(s) into '{}'", resolved.len(), self.name());
        Ok(())
    }
}
