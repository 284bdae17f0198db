//! Machine-readable contracts shared by the planner and its consumers.
//!
//! Everything here is plain serde data: transfer records as produced by the
//! planner, the row layout expected by Echo-style acoustic liquid handlers,
//! and the volume units a protocol can be expressed in.

use serde::{Deserialize, Serialize};

pub const ECHO_PROTOCOL_SCHEMA: &str = "synbio.echo_protocol.v1";

/// Column headers of an Echo pick list, in output order.
pub const ECHO_COLUMNS: [&str; 5] = [
    "Source plate name",
    "Source well",
    "Destination plate name",
    "Destination well",
    "XferVol",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum VolumeUnit {
    #[serde(rename = "nL")]
    #[default]
    Nanoliter,
    #[serde(rename = "uL")]
    Microliter,
    #[serde(rename = "mL")]
    Milliliter,
}

impl VolumeUnit {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Nanoliter => "nL",
            Self::Microliter => "uL",
            Self::Milliliter => "mL",
        }
    }

    pub fn parse(text: &str) -> Option<Self> {
        match text.trim().to_ascii_lowercase().as_str() {
            "nl" | "nanoliter" | "nanoliters" => Some(Self::Nanoliter),
            "ul" | "µl" | "microliter" | "microliters" => Some(Self::Microliter),
            "ml" | "milliliter" | "milliliters" => Some(Self::Milliliter),
            _ => None,
        }
    }

    /// How many of this unit make up one microliter.
    pub fn per_microliter(self) -> f64 {
        match self {
            Self::Nanoliter => 1000.0,
            Self::Microliter => 1.0,
            Self::Milliliter => 0.001,
        }
    }

    pub fn from_microliters(self, microliters: f64) -> f64 {
        microliters * self.per_microliter()
    }

    pub fn to_microliters(self, value: f64) -> f64 {
        value / self.per_microliter()
    }
}

/// One liquid move. `volume` is expressed in the unit of the owning protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferRecord {
    pub source_well: String,
    pub destination_well: String,
    pub reagent: String,
    pub volume: f64,
}

/// A single row of an Echo pick list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EchoTransferRow {
    #[serde(rename = "Source plate name")]
    pub source_plate: String,
    #[serde(rename = "Source well")]
    pub source_well: String,
    #[serde(rename = "Destination plate name")]
    pub destination_plate: String,
    #[serde(rename = "Destination well")]
    pub destination_well: String,
    #[serde(rename = "XferVol")]
    pub volume: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolDocument {
    pub schema: String,
    pub unit: VolumeUnit,
    pub source_plate: String,
    pub destination_plate: String,
    pub transfers: Vec<TransferRecord>,
}

impl ProtocolDocument {
    pub fn new(
        unit: VolumeUnit,
        source_plate: &str,
        destination_plate: &str,
        transfers: Vec<TransferRecord>,
    ) -> Self {
        Self {
            schema: ECHO_PROTOCOL_SCHEMA.to_string(),
            unit,
            source_plate: source_plate.to_string(),
            destination_plate: destination_plate.to_string(),
            transfers,
        }
    }

    pub fn echo_rows(&self) -> Vec<EchoTransferRow> {
        self.transfers
            .iter()
            .map(|t| EchoTransferRow {
                source_plate: self.source_plate.clone(),
                source_well: t.source_well.clone(),
                destination_plate: self.destination_plate.clone(),
                destination_well: t.destination_well.clone(),
                volume: t.volume,
            })
            .collect()
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}
