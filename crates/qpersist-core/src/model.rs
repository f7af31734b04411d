use std::borrow::Cow;
use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};

use crate::error::{Error, Result};
use crate::value::{Complex, DictBuilder, DomainObject, NdArray, Timestamp, ToValue, Value};

/// Rebuild a domain object from parsed JSON.
///
/// The parsed value is the only input; no schema is checked before this call.
pub trait FromDict: Sized {
    fn from_dict(value: serde_json::Value) -> Result<Self>;
}

fn from_dict_via_serde<T: DeserializeOwned>(
    type_name: &'static str,
    value: serde_json::Value,
) -> Result<T> {
    serde_json::from_value(value).map_err(|source| Error::Reconstruct { type_name, source })
}

type Entries<'a> = Vec<(Cow<'a, str>, Value<'a>)>;

/// Unrecognised keys of a mapping, kept in file order.
pub type Extra = serde_json::Map<String, serde_json::Value>;

// -------- Backend calibration data --------

/// Name / date / unit / value: one measured device parameter.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Nduv {
    pub date: Timestamp,
    pub name: String,
    pub unit: String,
    pub value: f64,
}

impl Nduv {
    /// Value converted to base SI units (`us` -> `s`, `GHz` -> `Hz`, ...).
    /// Units without a known prefix are returned unchanged.
    pub fn si_value(&self) -> f64 {
        self.value * unit_scale(&self.unit)
    }
}

fn unit_scale(unit: &str) -> f64 {
    let base = ["s", "Hz"]
        .into_iter()
        .find(|b| unit.len() > b.len() && unit.ends_with(b));
    let Some(base) = base else {
        return 1.0;
    };
    match &unit[..unit.len() - base.len()] {
        "p" => 1e-12,
        "n" => 1e-9,
        "u" | "µ" => 1e-6,
        "m" => 1e-3,
        "k" => 1e3,
        "M" => 1e6,
        "G" => 1e9,
        "T" => 1e12,
        _ => 1.0,
    }
}

impl DomainObject for Nduv {
    fn type_name(&self) -> &str {
        "Nduv"
    }

    fn to_dict(&self) -> Option<Entries<'_>> {
        Some(
            DictBuilder::new()
                .entry("date", self.date.to_value())
                .entry("name", self.name.to_value())
                .entry("unit", self.unit.to_value())
                .entry("value", self.value.to_value())
                .build(),
        )
    }
}

impl ToValue for Nduv {
    fn to_value(&self) -> Value<'_> {
        Value::Object(self)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Gate {
    pub gate: String,
    pub qubits: Vec<u32>,
    pub parameters: Vec<Nduv>,
    #[serde(default)]
    pub name: Option<String>,
}

impl Gate {
    pub fn parameter(&self, name: &str) -> Option<&Nduv> {
        self.parameters.iter().find(|p| p.name == name)
    }
}

impl DomainObject for Gate {
    fn type_name(&self) -> &str {
        "Gate"
    }

    fn to_dict(&self) -> Option<Entries<'_>> {
        Some(
            DictBuilder::new()
                .entry("qubits", self.qubits.to_value())
                .entry("gate", self.gate.to_value())
                .entry("parameters", self.parameters.to_value())
                .optional("name", self.name.as_ref())
                .build(),
        )
    }
}

impl ToValue for Gate {
    fn to_value(&self) -> Value<'_> {
        Value::Object(self)
    }
}

/// Device characterisation snapshot of a quantum backend.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BackendProperties {
    pub backend_name: String,
    pub backend_version: String,
    pub last_update_date: Timestamp,
    pub qubits: Vec<Vec<Nduv>>,
    pub gates: Vec<Gate>,
    #[serde(default)]
    pub general: Vec<Nduv>,
    /// Keys not modelled above, written back unchanged.
    #[serde(flatten)]
    pub extra: Extra,
}

impl BackendProperties {
    pub fn qubit_property(&self, qubit: usize, name: &str) -> Option<&Nduv> {
        self.qubits.get(qubit)?.iter().find(|p| p.name == name)
    }

    pub fn gate_property(&self, gate: &str, qubits: &[u32], name: &str) -> Option<&Nduv> {
        self.gates
            .iter()
            .find(|g| g.gate == gate && g.qubits == qubits)?
            .parameter(name)
    }

    /// T1 in seconds.
    pub fn t1(&self, qubit: usize) -> Option<f64> {
        self.qubit_property(qubit, "T1").map(Nduv::si_value)
    }

    /// T2 in seconds.
    pub fn t2(&self, qubit: usize) -> Option<f64> {
        self.qubit_property(qubit, "T2").map(Nduv::si_value)
    }

    /// Qubit frequency in Hz.
    pub fn frequency(&self, qubit: usize) -> Option<f64> {
        self.qubit_property(qubit, "frequency").map(Nduv::si_value)
    }

    pub fn readout_error(&self, qubit: usize) -> Option<f64> {
        self.qubit_property(qubit, "readout_error").map(|p| p.value)
    }

    pub fn gate_error(&self, gate: &str, qubits: &[u32]) -> Option<f64> {
        self.gate_property(gate, qubits, "gate_error").map(|p| p.value)
    }

    /// Gate duration in seconds.
    pub fn gate_length(&self, gate: &str, qubits: &[u32]) -> Option<f64> {
        self.gate_property(gate, qubits, "gate_length").map(Nduv::si_value)
    }

    /// A qubit without an `operational` entry counts as operational.
    pub fn is_qubit_operational(&self, qubit: usize) -> bool {
        self.qubit_property(qubit, "operational")
            .is_none_or(|p| p.value != 0.0)
    }

    pub fn faulty_qubits(&self) -> Vec<usize> {
        (0..self.qubits.len())
            .filter(|&q| !self.is_qubit_operational(q))
            .collect()
    }
}

impl FromDict for BackendProperties {
    fn from_dict(value: serde_json::Value) -> Result<Self> {
        from_dict_via_serde("BackendProperties", value)
    }
}

impl DomainObject for BackendProperties {
    fn type_name(&self) -> &str {
        "BackendProperties"
    }

    fn to_dict(&self) -> Option<Entries<'_>> {
        Some(
            DictBuilder::new()
                .entry("backend_name", self.backend_name.to_value())
                .entry("backend_version", self.backend_version.to_value())
                .entry("last_update_date", self.last_update_date.to_value())
                .entry("qubits", self.qubits.to_value())
                .entry("gates", self.gates.to_value())
                .entry("general", self.general.to_value())
                .extend(&self.extra)
                .build(),
        )
    }
}

impl ToValue for BackendProperties {
    fn to_value(&self) -> Value<'_> {
        Value::Object(self)
    }
}

// -------- Execution results --------

/// Shot count, or a `[start, end]` range for partial results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Shots {
    Count(u64),
    Range(u64, u64),
}

impl Shots {
    pub fn total(&self) -> u64 {
        match *self {
            Shots::Count(n) => n,
            Shots::Range(start, end) => end.saturating_sub(start),
        }
    }
}

impl ToValue for Shots {
    fn to_value(&self) -> Value<'_> {
        match *self {
            Shots::Count(n) => Value::UInt(n),
            Shots::Range(start, end) => Value::List(vec![Value::UInt(start), Value::UInt(end)]),
        }
    }
}

/// Per-shot memory.
///
/// Classified measurements (`meas_level` 2) store one hex string per shot;
/// kerneled and raw levels store nested numbers or `[re, im]` pairs.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Memory {
    Hex(Vec<String>),
    Raw(serde_json::Value),
}

impl Memory {
    pub fn as_hex(&self) -> Option<&[String]> {
        match self {
            Memory::Hex(shots) => Some(shots),
            Memory::Raw(_) => None,
        }
    }
}

impl ToValue for Memory {
    fn to_value(&self) -> Value<'_> {
        match self {
            Memory::Hex(shots) => shots.to_value(),
            Memory::Raw(raw) => raw.to_value(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ExperimentData {
    /// Hex outcome (`"0x3"`) -> number of hits.
    #[serde(default)]
    pub counts: Option<BTreeMap<String, u64>>,
    #[serde(default)]
    pub memory: Option<Memory>,
    #[serde(default, deserialize_with = "complex_vector")]
    pub statevector: Option<NdArray>,
    #[serde(default, deserialize_with = "complex_matrix")]
    pub unitary: Option<NdArray>,
    /// Snapshots and other backend-specific entries.
    #[serde(flatten)]
    pub extra: Extra,
}

fn complex_vector<'de, D: Deserializer<'de>>(
    d: D,
) -> std::result::Result<Option<NdArray>, D::Error> {
    let items: Option<Vec<Complex>> = Option::deserialize(d)?;
    Ok(items.map(NdArray::from_vec))
}

fn complex_matrix<'de, D: Deserializer<'de>>(
    d: D,
) -> std::result::Result<Option<NdArray>, D::Error> {
    let rows: Option<Vec<Vec<Complex>>> = Option::deserialize(d)?;
    rows.map(NdArray::from_rows)
        .transpose()
        .map_err(serde::de::Error::custom)
}

impl DomainObject for ExperimentData {
    fn type_name(&self) -> &str {
        "ExperimentResultData"
    }

    fn to_dict(&self) -> Option<Entries<'_>> {
        Some(
            DictBuilder::new()
                .optional("counts", self.counts.as_ref())
                .optional("memory", self.memory.as_ref())
                .optional("statevector", self.statevector.as_ref())
                .optional("unitary", self.unitary.as_ref())
                .extend(&self.extra)
                .build(),
        )
    }
}

impl ToValue for ExperimentData {
    fn to_value(&self) -> Value<'_> {
        Value::Object(self)
    }
}

/// Outcome of one circuit inside a job.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ExperimentResult {
    pub shots: Shots,
    pub success: bool,
    pub data: ExperimentData,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub seed: Option<i64>,
    #[serde(default)]
    pub meas_level: Option<u8>,
    #[serde(default)]
    pub header: Option<serde_json::Value>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl ExperimentResult {
    pub fn name(&self) -> Option<&str> {
        self.header.as_ref()?.get("name")?.as_str()
    }

    /// Counts keyed by bitstring instead of hex.
    ///
    /// Bitstrings are zero-padded to the wider of `header.memory_slots` and
    /// the summed `header.creg_sizes`, then split into space-separated
    /// registers following `creg_sizes`.
    pub fn counts_bitstrings(&self) -> Option<BTreeMap<String, u64>> {
        let counts = self.data.counts.as_ref()?;
        let header = self.header.as_ref();
        let memory_slots = header
            .and_then(|h| h.get("memory_slots"))
            .and_then(serde_json::Value::as_u64)
            .map(|n| n as usize);
        let creg_sizes: Vec<usize> = header
            .and_then(|h| h.get("creg_sizes"))
            .and_then(serde_json::Value::as_array)
            .map(|regs| {
                regs.iter()
                    .filter_map(|r| r.get(1).and_then(serde_json::Value::as_u64))
                    .map(|n| n as usize)
                    .collect()
            })
            .unwrap_or_default();
        let mut out = BTreeMap::new();
        for (key, n) in counts {
            let bits = hex_to_bitstring(key, memory_slots, &creg_sizes);
            *out.entry(bits).or_insert(0) += *n;
        }
        Some(out)
    }
}

fn hex_to_bitstring(key: &str, memory_slots: Option<usize>, creg_sizes: &[usize]) -> String {
    let Some(hex) = key.strip_prefix("0x") else {
        return key.to_string();
    };
    let Ok(n) = u128::from_str_radix(hex, 16) else {
        return key.to_string();
    };
    let width = memory_slots.unwrap_or(0).max(creg_sizes.iter().sum());
    let bits = format!("{n:0width$b}");
    if creg_sizes.is_empty() {
        return bits;
    }
    let mut groups = Vec::with_capacity(creg_sizes.len());
    let mut at = 0;
    for &size in creg_sizes.iter().rev() {
        let end = (at + size).min(bits.len());
        groups.push(&bits[at.min(end)..end]);
        at = end;
    }
    groups.join(" ")
}

impl DomainObject for ExperimentResult {
    fn type_name(&self) -> &str {
        "ExperimentResult"
    }

    fn to_dict(&self) -> Option<Entries<'_>> {
        Some(
            DictBuilder::new()
                .entry("shots", self.shots.to_value())
                .entry("success", self.success.to_value())
                .entry("data", self.data.to_value())
                .optional("status", self.status.as_ref())
                .optional("seed", self.seed.as_ref())
                .optional("meas_level", self.meas_level.as_ref())
                .optional("header", self.header.as_ref())
                .extend(&self.extra)
                .build(),
        )
    }
}

impl ToValue for ExperimentResult {
    fn to_value(&self) -> Value<'_> {
        Value::Object(self)
    }
}

/// Result of an executed job: one `ExperimentResult` per circuit.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct JobResult {
    pub backend_name: String,
    pub backend_version: String,
    pub qobj_id: String,
    pub job_id: String,
    pub success: bool,
    pub results: Vec<ExperimentResult>,
    #[serde(default)]
    pub date: Option<Timestamp>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub header: Option<serde_json::Value>,
    /// `time_taken`, `metadata` and other top-level keys.
    #[serde(flatten)]
    pub extra: Extra,
}

impl JobResult {
    pub fn experiment(&self, name: &str) -> Option<&ExperimentResult> {
        self.results.iter().find(|r| r.name() == Some(name))
    }

    pub fn get_counts(&self, index: usize) -> Option<&BTreeMap<String, u64>> {
        self.results.get(index)?.data.counts.as_ref()
    }

    pub fn get_statevector(&self, index: usize) -> Option<&NdArray> {
        self.results.get(index)?.data.statevector.as_ref()
    }
}

impl FromDict for JobResult {
    fn from_dict(value: serde_json::Value) -> Result<Self> {
        from_dict_via_serde("Result", value)
    }
}

impl DomainObject for JobResult {
    fn type_name(&self) -> &str {
        "Result"
    }

    fn to_dict(&self) -> Option<Entries<'_>> {
        Some(
            DictBuilder::new()
                .entry("backend_name", self.backend_name.to_value())
                .entry("backend_version", self.backend_version.to_value())
                .optional("date", self.date.as_ref())
                .optional("header", self.header.as_ref())
                .entry("qobj_id", self.qobj_id.to_value())
                .entry("job_id", self.job_id.to_value())
                .optional("status", self.status.as_ref())
                .entry("success", self.success.to_value())
                .entry("results", self.results.to_value())
                .extend(&self.extra)
                .build(),
        )
    }
}

impl ToValue for JobResult {
    fn to_value(&self) -> Value<'_> {
        Value::Object(self)
    }
}
