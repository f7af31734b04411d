//! qpersist-core: save and reload quantum SDK objects as JSON files
//!
//! This crate focuses on a small, well-factored surface:
//! - `Value` graph with complex numbers, timestamps and array-like buffers
//! - Recursive encoder to `serde_json::Value` with a fixed fallback order
//! - `save_to_json` for anything implementing `ToValue`
//! - `load_properties` / `load_result` rebuilding backend calibration data and
//!   job results (`load_result` returns `Loaded::Single` or `Loaded::Many`
//!   depending on the stored JSON)
//!
pub mod encode;
pub mod error;
pub mod json;
pub mod model;
pub mod value;

pub use encode::encode;
pub use error::{EncodeError, Error, Result};
pub use json::{
    Loaded, SaveOpts, find_json_files, load_from_json, load_one_or_many, load_properties,
    load_result, load_results_dir, save_to_json, save_to_json_with, to_json_string,
    to_json_value,
};
pub use model::{
    BackendProperties, ExperimentData, ExperimentResult, Extra, FromDict, Gate, JobResult, Memory,
    Nduv, Shots,
};
pub use value::{Complex, DictBuilder, DomainObject, Element, NdArray, Timestamp, ToValue, Value};
