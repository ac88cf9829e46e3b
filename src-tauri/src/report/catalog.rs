// Report section catalog: which metrics are shown, under which label and unit
use crate::file_manager::{read_json_file, StoreError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to parse report catalog: {0}")]
    Parse(#[from] serde_json::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("report catalog has no sections")]
    Empty,
    #[error("report catalog section {section:?} repeats key {key:?}")]
    DuplicateKey { section: String, key: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportField {
    pub key: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSection {
    pub name: String,
    pub fields: Vec<ReportField>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportCatalog {
    pub version: u32,
    pub sections: Vec<ReportSection>,
}

type FieldSpec = (&'static str, &'static str, Option<&'static str>);

const OVERVIEW: &[FieldSpec] = &[
    ("PDK_VARIANT", "PDK Variant", None),
    ("runtime", "Runtime", None),
    ("Peak_Memory_Usage_MB", "Peak Memory Usage", Some("Mb")),
    ("cell_count", "Cell Count", None),
    ("CellPer_mm^2", "Area Per Cell", Some("mm^2")),
    ("DIEAREA_mm^2", "Die Area", Some("mm^2")),
    ("(Cell/mm^2)/Core_Util", "Area Per Cell/Core Util", None),
    ("OpenDP_Util", "OpenDP Util", None),
];

const REGRESSION_VARIABLES: &[FieldSpec] = &[
    ("GLB_RT_ADJUSTMENT", "GLB_RT_ADJUSTMENT", None),
    ("PL_TARGET_DENSITY", "PL_TARGET_DENSITY", None),
    ("FP_CORE_UTIL", "FP_CORE_UTIL", None),
    ("FP_ASPECT_RATIO", "FP_ASPECT_RATIO", None),
    ("FP_PDN_VPITCH", "FP_PDN_VPITCH", None),
    ("FP_PDN_HPITCH", "FP_PDN_HPITCH", None),
    ("SYNTH_MAX_FANOUT", "SYNTH_MAX_FANOUT", None),
    ("SYNTH_STRATEGY", "SYNTH_STRATEGY", None),
    ("ROUTING_STRATEGY", "ROUTING_STRATEGY", None),
    ("CELL_PAD", "CELL_PAD", None),
];

const VIOLATIONS: &[FieldSpec] = &[
    ("tritonRoute_violations", "TritonRoute", None),
    ("Short_violations", "Short", None),
    ("MetSpc_violations", "MetSpc", None),
    ("OffGrid_violations", "OffGrid", None),
    ("MinHole_violations", "MinHole", None),
    ("Magic_violations", "Magic", None),
    ("antenna_violations", "Antenna", None),
    ("Other_violations", "Other", None),
];

const DESIGN_METRICS: &[FieldSpec] = &[
    ("wires_count", "Wire Count", None),
    ("wire_length", "Wire Length", None),
    ("wire_bits", "Wire Bits", None),
    ("vias", "Vias", None),
    ("wns", "WNS", None),
    ("HPWL", "HPWL", None),
    ("public_wires_count", "Public Wires Count", None),
    ("public_wire_bits", "Public Wire Bits", None),
    ("memories_count", "Memory Count", None),
    ("memory_bits", "Memory Bits", None),
    ("processes_count", "Processes Count", None),
    ("cells_pre_abc", "Cells Pre abc", None),
];

const LOGIC_GATES: &[FieldSpec] = &[
    ("AND", "AND", None),
    ("DFF", "DFF", None),
    ("NAND", "NAND", None),
    ("NOR", "NOR", None),
    ("OR", "OR", None),
    ("XOR", "XOR", None),
    ("XNOR", "XNOR", None),
    ("MUX", "MUX", None),
];

const OTHER: &[FieldSpec] = &[
    ("inputs", "Inputs", None),
    ("outputs", "Outputs", None),
    ("level", "Level", None),
    ("EndCaps", "EndCaps", None),
    ("TapCells", "TapCells", None),
    ("Diodes", "Diodes", None),
    ("Total_Physical_Cells", "Total Physical Cells", None),
    ("CLOCK_PERIOD", "Clock Period", None),
];

fn section(name: &str, fields: &[FieldSpec]) -> ReportSection {
    ReportSection {
        name: name.to_string(),
        fields: fields
            .iter()
            .map(|(key, label, unit)| ReportField {
                key: key.to_string(),
                label: label.to_string(),
                unit: unit.map(str::to_string),
            })
            .collect(),
    }
}

impl ReportCatalog {
    /// Catalog matching the metrics emitted by the current flow
    pub fn builtin() -> Self {
        Self {
            version: 1,
            sections: vec![
                section("Overview", OVERVIEW),
                section("Regression Variables", REGRESSION_VARIABLES),
                section("Violations", VIOLATIONS),
                section("Design Metrics", DESIGN_METRICS),
                section("Logic Gates", LOGIC_GATES),
                section("Other", OTHER),
            ],
        }
    }

    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let catalog: ReportCatalog = serde_json::from_str(json)?;
        catalog.validate()
    }

    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let catalog: ReportCatalog = read_json_file(path)?;
        log::info!(
            "Loaded report catalog v{} from {:?}",
            catalog.version,
            path
        );
        catalog.validate()
    }

    fn validate(self) -> Result<Self, CatalogError> {
        if self.sections.is_empty() {
            return Err(CatalogError::Empty);
        }
        for section in &self.sections {
            let mut seen = HashSet::new();
            for field in &section.fields {
                if !seen.insert(field.key.as_str()) {
                    return Err(CatalogError::DuplicateKey {
                        section: section.name.clone(),
                        key: field.key.clone(),
                    });
                }
            }
        }
        Ok(self)
    }

    pub fn field(&self, key: &str) -> Option<&ReportField> {
        self.sections
            .iter()
            .flat_map(|s| s.fields.iter())
            .find(|f| f.key == key)
    }
}
