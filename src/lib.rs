//! Reagent recipes, microplates and liquid-transfer planning for acoustic
//! dispensers.

pub mod about;
pub mod config;
pub mod error;
pub mod experiment;
pub mod overhangs;
pub mod planner;
pub mod plate;
pub mod plate_map;
pub mod reagent;
pub mod recipe;
pub mod staging;
pub mod units;

pub use error::{Result, SynbioError};
pub use plate::{Plate, PlatePreset, Well, WellVolumes};
pub use planner::{Protocol, feasibility_check, generate_protocol};
pub use reagent::{Reagent, ReagentRegistry};
pub use recipe::Recipe;
