//! Transfer planning for acoustic liquid handlers.
//!
//! Given a source plate holding pure reagents and a destination plate whose
//! wells carry their target content and volume, the planner derives the
//! list of source -> destination transfers that fills every destination
//! well without drawing a source well below its dead volume.

use crate::error::{ReagentDeficit, Result, SynbioError};
use crate::plate::{Plate, location_sort_key};
use crate::reagent::Reagent;
use crate::recipe::Recipe;
use crate::units::{VOLUME_EPSILON, VolumeUnit, is_close, round_to};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use synbio_protocol::{ECHO_COLUMNS, ProtocolDocument, TransferRecord};
use tracing::{debug, info, warn};

/// Which candidate source well is drawn from next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CandidateOrder {
    /// Last candidate in plate order first.
    #[default]
    Lifo,
    /// Lowest well location first.
    Ascending,
}

impl CandidateOrder {
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim().to_ascii_lowercase().as_str() {
            "lifo" => Some(Self::Lifo),
            "ascending" | "asc" => Some(Self::Ascending),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    pub output_decimals: u32,
    pub output_unit: VolumeUnit,
    pub source_plate_label: String,
    pub destination_plate_label: String,
    pub candidate_order: CandidateOrder,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            output_decimals: 4,
            output_unit: VolumeUnit::Nanoliter,
            source_plate_label: "1".to_string(),
            destination_plate_label: "1".to_string(),
            candidate_order: CandidateOrder::Lifo,
        }
    }
}

/// Outcome of comparing what the destination needs with what the source holds.
#[derive(Debug, Clone)]
pub struct FeasibilityReport {
    pub source_full: usize,
    pub destination_full: usize,
    pub required: Recipe,
    pub available: BTreeMap<Reagent, f64>,
    pub deficits: Vec<ReagentDeficit>,
    /// Destination wells holding volume but no content.
    pub unassigned: Vec<String>,
}

impl FeasibilityReport {
    fn empty_mismatch(&self) -> bool {
        self.destination_full == 0 && self.source_full > 0
    }

    pub fn is_feasible(&self) -> bool {
        !self.empty_mismatch() && self.unassigned.is_empty() && self.deficits.is_empty()
    }

    pub fn into_result(self) -> Result<()> {
        if self.empty_mismatch() {
            return Err(SynbioError::EmptyPlateMismatch {
                source_full: self.source_full,
                destination_full: self.destination_full,
            });
        }
        if !self.unassigned.is_empty() {
            return Err(SynbioError::InvalidParameter(format!(
                "destination well(s) {} hold volume but no content",
                self.unassigned.join(", ")
            )));
        }
        if !self.deficits.is_empty() {
            return Err(SynbioError::InsufficientSourceVolume {
                deficits: self.deficits,
            });
        }
        Ok(())
    }
}

/// Checks that every pure reagent the destination needs is available in
/// sufficient volume in source wells holding exactly that reagent.
pub fn feasibility_check(source: &Plate, destination: &Plate) -> FeasibilityReport {
    let available = source.available_volumes();
    // Compared unrounded, the same way the allocation loop draws.
    let drawable = source.drawable_volumes();
    let required = destination.reagent_volumes();
    let deficits = required
        .iter()
        .filter_map(|(reagent, needed)| {
            let have = drawable.get(reagent).copied().unwrap_or(0.0);
            (have + VOLUME_EPSILON < needed).then(|| ReagentDeficit {
                reagent: reagent.name().to_string(),
                available: available.get(reagent).copied().unwrap_or(0.0),
                required: needed,
            })
        })
        .collect();
    let unassigned = destination
        .full_wells()
        .into_iter()
        .filter(|w| w.content().is_none())
        .map(|w| w.location().to_string())
        .collect();
    FeasibilityReport {
        source_full: source.full_wells().len(),
        destination_full: destination.full_wells().len(),
        required,
        available,
        deficits,
        unassigned,
    }
}

fn next_candidate(plate: &Plate, reagent: &Reagent, order: CandidateOrder) -> Option<String> {
    let mut candidates = plate
        .wells()
        .filter(|w| w.content() == Some(reagent) && w.drawable_vol() > 0.0)
        .map(|w| w.location());
    match order {
        CandidateOrder::Lifo => candidates.last(),
        CandidateOrder::Ascending => candidates.min_by_key(|loc| location_sort_key(loc)),
    }
    .map(str::to_string)
}

/// Plans the transfers that populate `destination` from `source`.
///
/// Volume bookkeeping runs on a private copy of the source plate; `source`
/// itself is never modified.
pub fn generate_protocol(
    source: &Plate,
    destination: &Plate,
    config: &PlannerConfig,
) -> Result<Protocol> {
    if let Err(e) = feasibility_check(source, destination).into_result() {
        warn!("feasibility check failed for '{}' -> '{}': {e}", source.name(), destination.name());
        return Err(e);
    }

    let mut scratch = source.clone();
    let mut raw: Vec<TransferRecord> = vec![];
    for dest_well in destination.full_wells() {
        for (reagent, required) in dest_well.reagent_volumes().iter() {
            let mut remaining = required;
            while remaining > VOLUME_EPSILON {
                let Some(location) = next_candidate(&scratch, reagent, config.candidate_order)
                else {
                    debug!(
                        "no candidate left for '{}' into {} ({remaining} uL outstanding)",
                        reagent.name(),
                        dest_well.location()
                    );
                    return Err(SynbioError::PlanningInvariant(format!(
                        "no source well with '{}' left for {} ({remaining} uL outstanding)",
                        reagent.name(),
                        dest_well.location()
                    )));
                };
                let well = scratch.well_mut(&location)?;
                let volume = remaining.min(well.drawable_vol());
                well.draw(volume)?;
                remaining -= volume;
                debug!(
                    "{} -> {}: {volume} uL of '{}'",
                    location,
                    dest_well.location(),
                    reagent.name()
                );
                raw.push(TransferRecord {
                    source_well: location,
                    destination_well: dest_well.location().to_string(),
                    reagent: reagent.name().to_string(),
                    volume,
                });
            }
        }
    }

    let protocol = Protocol::from_raw_transfers(raw, config);
    info!(
        "planned {} transfer(s) from '{}' to '{}'",
        protocol.len(),
        source.name(),
        destination.name()
    );
    Ok(protocol)
}

/// An ordered list of transfers in the protocol's output unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Protocol {
    unit: VolumeUnit,
    decimals: u32,
    source_plate: String,
    destination_plate: String,
    transfers: Vec<TransferRecord>,
}

impl Protocol {
    /// Converts microliter transfers to the output unit, rounds them, sorts
    /// them by source well and drops rows that rounded to zero.
    fn from_raw_transfers(raw: Vec<TransferRecord>, config: &PlannerConfig) -> Self {
        let mut transfers = raw
            .into_iter()
            .map(|mut t| {
                t.volume = round_to(
                    config.output_unit.from_microliters(t.volume),
                    config.output_decimals,
                );
                t
            })
            .filter(|t| t.volume > 0.0)
            .collect::<Vec<_>>();
        transfers.sort_by_key(|t| location_sort_key(&t.source_well));
        Self {
            unit: config.output_unit,
            decimals: config.output_decimals,
            source_plate: config.source_plate_label.clone(),
            destination_plate: config.destination_plate_label.clone(),
            transfers,
        }
    }

    pub fn unit(&self) -> VolumeUnit {
        self.unit
    }

    pub fn transfers(&self) -> &[TransferRecord] {
        &self.transfers
    }

    pub fn len(&self) -> usize {
        self.transfers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transfers.is_empty()
    }

    pub fn total_volume(&self) -> f64 {
        self.transfers.iter().map(|t| t.volume).sum()
    }

    pub fn totals_by_reagent(&self) -> BTreeMap<String, f64> {
        let mut ret: BTreeMap<String, f64> = BTreeMap::new();
        for t in &self.transfers {
            *ret.entry(t.reagent.clone()).or_default() += t.volume;
        }
        ret
    }

    pub fn totals_by_destination(&self) -> BTreeMap<String, f64> {
        let mut ret: BTreeMap<String, f64> = BTreeMap::new();
        for t in &self.transfers {
            *ret.entry(t.destination_well.clone()).or_default() += t.volume;
        }
        ret
    }

    /// Checks that every full destination well receives its volume, up to
    /// the output rounding of each transfer.
    pub fn verify(&self, destination: &Plate) -> Result<()> {
        let received = self.totals_by_destination();
        let step = 0.5 * 10f64.powi(-(self.decimals as i32));
        for well in destination.full_wells() {
            let expected = self.unit.from_microliters(well.volume());
            let got = received.get(well.location()).copied().unwrap_or(0.0);
            let count = self
                .transfers
                .iter()
                .filter(|t| t.destination_well == well.location())
                .count();
            if !is_close(got, expected, 1e-9, step * count.max(1) as f64) {
                return Err(SynbioError::PlanningInvariant(format!(
                    "destination well {} receives {got} {} but needs {expected} {}",
                    well.location(),
                    self.unit.symbol(),
                    self.unit.symbol()
                )));
            }
        }
        if let Some(extra) = received
            .keys()
            .find(|loc| destination.get(loc).is_none_or(|w| w.is_empty()))
        {
            return Err(SynbioError::PlanningInvariant(format!(
                "transfer targets {extra}, which should stay empty"
            )));
        }
        Ok(())
    }

    pub fn to_document(&self) -> ProtocolDocument {
        ProtocolDocument::new(
            self.unit,
            &self.source_plate,
            &self.destination_plate,
            self.transfers.clone(),
        )
    }

    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut wtr = csv::Writer::from_writer(writer);
        let rows = self.to_document().echo_rows();
        if rows.is_empty() {
            wtr.write_record(ECHO_COLUMNS)?;
        }
        for row in rows {
            wtr.serialize(row)?;
        }
        wtr.flush()?;
        Ok(())
    }

    pub fn write_csv_path<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = std::fs::File::create(path)?;
        self.write_csv(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reagent::ReagentRegistry;
    use crate::units::approx_eq;

    fn water_plates(registry: &mut ReagentRegistry, src_vols: &[(&str, f64)]) -> (Plate, Plate) {
        let h2o = registry.reagent("H2O").unwrap();
        let mut dest = Plate::make_96_well(None);
        dest.fill_wells(&h2o, 10.0, &["A1"]).unwrap();
        let mut src = Plate::make_384_ldv_well(None);
        for (loc, vol) in src_vols {
            src.fill_wells(&h2o, *vol, &[loc]).unwrap();
        }
        (src, dest)
    }

    #[test]
    fn test_single_well_is_insufficient() {
        let mut registry = ReagentRegistry::new();
        let (src, dest) = water_plates(&mut registry, &[("A1", 14.0)]);
        let report = feasibility_check(&src, &dest);
        assert!(!report.is_feasible());
        assert_eq!(report.deficits.len(), 1);
        assert_eq!(report.deficits[0].reagent, "H2O");
        assert_eq!(report.deficits[0].available, 8.0);
        assert!(approx_eq(report.deficits[0].shortfall(), 2.0));
        assert!(matches!(
            generate_protocol(&src, &dest, &PlannerConfig::default()),
            Err(SynbioError::InsufficientSourceVolume { .. })
        ));
        assert_eq!(src.well("A1").unwrap().volume(), 14.0);
    }

    #[test]
    fn test_two_wells_cover_requirement() {
        let mut registry = ReagentRegistry::new();
        let (src, dest) = water_plates(&mut registry, &[("A1", 14.0), ("A2", 9.0)]);
        assert!(feasibility_check(&src, &dest).is_feasible());
        let protocol = generate_protocol(&src, &dest, &PlannerConfig::default()).unwrap();
        assert_eq!(protocol.len(), 2);
        assert!(protocol.transfers().iter().all(|t| t.destination_well == "A1"));
        assert!(approx_eq(protocol.total_volume(), 10_000.0));
        // LIFO drains A2 (3 uL available) before topping up from A1.
        let by_source = protocol
            .transfers()
            .iter()
            .map(|t| (t.source_well.as_str(), t.volume))
            .collect::<Vec<_>>();
        assert_eq!(by_source, vec![("A1", 7000.0), ("A2", 3000.0)]);
        assert_eq!(src.well("A1").unwrap().volume(), 14.0);
        assert_eq!(src.well("A2").unwrap().volume(), 9.0);
        protocol.verify(&dest).unwrap();
    }

    #[test]
    fn test_ascending_order_draws_first_well_first() {
        let mut registry = ReagentRegistry::new();
        let (src, dest) = water_plates(&mut registry, &[("A1", 14.0), ("A2", 9.0)]);
        let config = PlannerConfig {
            candidate_order: CandidateOrder::Ascending,
            output_unit: VolumeUnit::Microliter,
            ..PlannerConfig::default()
        };
        let protocol = generate_protocol(&src, &dest, &config).unwrap();
        let by_source = protocol
            .transfers()
            .iter()
            .map(|t| (t.source_well.as_str(), t.volume))
            .collect::<Vec<_>>();
        assert_eq!(by_source, vec![("A1", 8.0), ("A2", 2.0)]);
    }

    #[test]
    fn test_fractional_mixture_drains_source_exactly() {
        let mut registry = ReagentRegistry::new();
        let h2o = registry.reagent("H2O").unwrap();
        let x = registry.reagent("X").unwrap();
        let mix = registry
            .mixture("M", Recipe::from_parts([(h2o.clone(), 1.0), (x.clone(), 2.0)]).unwrap())
            .unwrap();

        let mut dest = Plate::make_96_well(None);
        let targets = dest
            .wells()
            .take(24)
            .map(|w| w.location().to_string())
            .collect::<Vec<_>>();
        let targets = targets.iter().map(String::as_str).collect::<Vec<_>>();
        dest.fill_wells(&mix, 1.0, &targets).unwrap();

        // One water well holds exactly the 24 x 1/3 uL the plate needs.
        let mut src = Plate::make_384_ldv_well(None);
        src.fill_wells(&h2o, 14.0, &["A1"]).unwrap();
        src.fill_wells(&x, 14.0, &["B1", "B2", "B3"]).unwrap();

        assert!(feasibility_check(&src, &dest).is_feasible());
        let protocol = generate_protocol(&src, &dest, &PlannerConfig::default()).unwrap();
        protocol.verify(&dest).unwrap();
        let totals = protocol.totals_by_reagent();
        assert!((totals["H2O"] - 8000.0).abs() < 0.01);
        assert!((totals["X"] - 16_000.0).abs() < 0.01);
        assert!(protocol.transfers().iter().filter(|t| t.reagent == "H2O").all(|t| t.source_well == "A1"));
    }

    #[test]
    fn test_destination_volume_without_content_is_rejected() {
        let mut registry = ReagentRegistry::new();
        let (src, mut dest) = water_plates(&mut registry, &[("A1", 14.0), ("A2", 9.0)]);
        dest.well_mut("C3").unwrap().set_volume(5.0).unwrap();

        let report = feasibility_check(&src, &dest);
        assert!(!report.is_feasible());
        assert_eq!(report.unassigned, vec!["C3".to_string()]);
        let err = generate_protocol(&src, &dest, &PlannerConfig::default()).unwrap_err();
        assert!(matches!(err, SynbioError::InvalidParameter(ref msg) if msg.contains("C3")));
    }

    #[test]
    fn test_empty_plates() {
        let src = Plate::make_384_ldv_well(None);
        let dest = Plate::make_96_well(None);
        let protocol = generate_protocol(&src, &dest, &PlannerConfig::default()).unwrap();
        assert!(protocol.is_empty());

        let mut registry = ReagentRegistry::new();
        let h2o = registry.reagent("H2O").unwrap();
        let mut full_src = src.clone();
        full_src.fill_wells(&h2o, 10.0, &["A1"]).unwrap();
        assert!(matches!(
            feasibility_check(&full_src, &dest).into_result(),
            Err(SynbioError::EmptyPlateMismatch { source_full: 1, destination_full: 0 })
        ));

        let mut full_dest = dest.clone();
        full_dest.fill_wells(&h2o, 10.0, &["A1"]).unwrap();
        assert!(matches!(
            feasibility_check(&src, &full_dest).into_result(),
            Err(SynbioError::InsufficientSourceVolume { .. })
        ));
    }

    #[test]
    fn test_mixture_destination_conserves_reagents() {
        let mut registry = ReagentRegistry::new();
        let pure = registry.define_pure_system().unwrap();
        let mut dest = Plate::make_96_well(None);
        dest.fill_wells(&pure, 10.0, &["A1", "A2", "B1"]).unwrap();

        let mut src = Plate::make_384_ldv_well(None);
        let all = src
            .wells()
            .map(|w| w.location().to_string())
            .collect::<Vec<_>>();
        let mut locations = all.iter();
        for component in pure.pure_reagents() {
            for _ in 0..3 {
                let loc = locations.next().unwrap();
                src.fill_wells(&component, 14.0, &[loc.as_str()]).unwrap();
            }
        }
        let before = src.volume_snapshot();

        let protocol = generate_protocol(&src, &dest, &PlannerConfig::default()).unwrap();
        protocol.verify(&dest).unwrap();
        let totals = protocol.totals_by_reagent();
        let required = dest.reagent_volumes();
        for (reagent, volume) in required.iter() {
            let got = totals[reagent.name()];
            assert!((got - volume * 1000.0).abs() < 1e-3, "{reagent:?}: {got}");
        }
        for t in protocol.transfers() {
            assert!(t.volume <= 8000.0 + 1e-6);
        }
        assert_eq!(src.volume_snapshot(), before);

        let keys = protocol
            .transfers()
            .iter()
            .map(|t| location_sort_key(&t.source_well))
            .collect::<Vec<_>>();
        assert!(keys.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_mixture_in_source_is_not_expanded() {
        let mut registry = ReagentRegistry::new();
        let pure = registry.define_pure_system().unwrap();
        let mut dest = Plate::make_96_well(None);
        dest.fill_wells(&pure, 10.0, &["A1"]).unwrap();
        let mut src = Plate::make_96_well(None);
        src.fill_wells(&pure, 200.0, &["A1"]).unwrap();
        let report = feasibility_check(&src, &dest);
        assert_eq!(report.deficits.len(), 5);
    }

    #[test]
    fn test_write_csv_columns() {
        let mut registry = ReagentRegistry::new();
        let (src, dest) = water_plates(&mut registry, &[("A1", 14.0), ("A2", 9.0)]);
        let protocol = generate_protocol(&src, &dest, &PlannerConfig::default()).unwrap();
        let mut out = vec![];
        protocol.write_csv(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "Source plate name,Source well,Destination plate name,Destination well,XferVol"
        );
        assert_eq!(lines.next().unwrap(), "1,A1,1,A1,7000.0");
        assert_eq!(lines.next().unwrap(), "1,A2,1,A1,3000.0");
        assert!(lines.next().is_none());
    }

    #[test]
    fn test_verify_flags_missing_volume() {
        let mut registry = ReagentRegistry::new();
        let (src, dest) = water_plates(&mut registry, &[("A1", 14.0), ("A2", 9.0)]);
        let protocol = generate_protocol(&src, &dest, &PlannerConfig::default()).unwrap();
        let mut bigger = dest.clone();
        let h2o = registry.require("H2O").unwrap();
        bigger.fill_wells(&h2o, 5.0, &["B1"]).unwrap();
        assert!(protocol.verify(&bigger).is_err());
    }

    #[test]
    fn test_candidate_order_parse() {
        assert_eq!(CandidateOrder::parse("LIFO"), Some(CandidateOrder::Lifo));
        assert_eq!(CandidateOrder::parse("asc"), Some(CandidateOrder::Ascending));
        assert_eq!(CandidateOrder::parse("random"), None);
    }
}
