use std::borrow::Cow;
use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde_json::json;
use tempfile::tempdir;

use qpersist_core::{
    BackendProperties, Complex, EncodeError, Error, ExperimentData, ExperimentResult, Gate,
    JobResult, Loaded, Memory, NdArray, Nduv, SaveOpts, Shots, Timestamp, ToValue, Value,
};

fn ts(y: i32, m: u32, d: u32, h: u32) -> Timestamp {
    NaiveDate::from_ymd_opt(y, m, d)
        .unwrap()
        .and_hms_opt(h, 0, 0)
        .unwrap()
        .into()
}

fn nduv(name: &str, unit: &str, value: f64) -> Nduv {
    Nduv {
        date: ts(2024, 5, 1, 6),
        name: name.to_string(),
        unit: unit.to_string(),
        value,
    }
}

fn sample_properties() -> BackendProperties {
    BackendProperties {
        backend_name: "fake_lima".into(),
        backend_version: "1.0.2".into(),
        last_update_date: ts(2024, 5, 1, 7),
        qubits: vec![
            vec![
                nduv("T1", "us", 105.5),
                nduv("T2", "us", 80.25),
                nduv("frequency", "GHz", 5.03),
                nduv("readout_error", "", 0.0125),
            ],
            vec![
                nduv("T1", "us", 90.0),
                nduv("readout_error", "", 0.03),
                nduv("operational", "", 0.0),
            ],
        ],
        gates: vec![
            Gate {
                gate: "sx".into(),
                qubits: vec![0],
                parameters: vec![nduv("gate_error", "", 0.00025), nduv("gate_length", "ns", 35.5)],
                name: Some("sx0".into()),
            },
            Gate {
                gate: "cx".into(),
                qubits: vec![0, 1],
                parameters: vec![nduv("gate_error", "", 0.0075), nduv("gate_length", "ns", 400.0)],
                name: None,
            },
        ],
        general: vec![],
        extra: Default::default(),
    }
}

fn sample_result(job_id: &str) -> JobResult {
    let mut counts = BTreeMap::new();
    counts.insert("0x0".to_string(), 510);
    counts.insert("0x3".to_string(), 514);
    JobResult {
        backend_name: "aer_simulator".into(),
        backend_version: "0.13.0".into(),
        qobj_id: "qobj-1".into(),
        job_id: job_id.into(),
        success: true,
        results: vec![ExperimentResult {
            shots: Shots::Count(1024),
            success: true,
            data: ExperimentData {
                counts: Some(counts),
                memory: None,
                statevector: Some(NdArray::from_vec(vec![
                    Complex::new(0.5, 0.0),
                    Complex::new(0.0, 0.5),
                    Complex::new(-0.5, 0.0),
                    Complex::new(0.0, -0.5),
                ])),
                unitary: None,
                extra: Default::default(),
            },
            status: Some("DONE".into()),
            seed: Some(42),
            meas_level: Some(2),
            header: Some(json!({
                "name": "bell",
                "memory_slots": 2,
                "creg_sizes": [["c", 2]]
            })),
            extra: Default::default(),
        }],
        date: Some(ts(2024, 1, 1, 0)),
        status: Some("COMPLETED".into()),
        header: None,
        extra: Default::default(),
    }
}

const RESULT_JSON: &str = r#"{
  "backend_name": "aer_simulator",
  "backend_version": "0.13.0",
  "qobj_id": "q",
  "job_id": "JOBID",
  "success": true,
  "date": "2024-01-01T00:00:00",
  "results": [
    {"shots": 100, "success": true, "data": {"counts": {"0x1": 60, "0x0": 40}},
     "header": {"name": "circ"}}
  ]
}"#;

#[test]
fn complex_and_timestamp_encode_to_plain_json() {
    let c = qpersist_core::to_json_value(&Complex::new(3.0, 4.0)).unwrap();
    assert_eq!(c, json!([3.0, 4.0]));
    assert_eq!(c[0].as_f64(), Some(3.0));
    assert_eq!(c[1].as_f64(), Some(4.0));

    let t = qpersist_core::to_json_value(&ts(2024, 1, 1, 0)).unwrap();
    assert_eq!(t, json!("2024-01-01T00:00:00"));
}

#[test]
fn properties_survive_save_and_load() {
    let dir = tempdir().unwrap();
    let p = dir.path().join("props.json");
    let props = sample_properties();
    qpersist_core::save_to_json(&props, &p).expect("save");

    let text = std::fs::read_to_string(&p).unwrap();
    assert!(text.contains("\"last_update_date\":\"2024-05-01T07:00:00\""));
    assert!(text.starts_with("{\"backend_name\""));

    let loaded = qpersist_core::load_properties(&p).expect("load");
    assert_eq!(loaded, props);
    assert_eq!(loaded.faulty_qubits(), vec![1]);
    assert!(loaded.is_qubit_operational(0));
}

#[test]
fn calibration_lookups_use_si_units() {
    let props = sample_properties();
    let t1 = props.t1(0).unwrap();
    assert!((t1 - 105.5e-6).abs() < 1e-12);
    let freq = props.frequency(0).unwrap();
    assert!((freq - 5.03e9).abs() < 1.0);
    assert_eq!(props.readout_error(1), Some(0.03));
    assert_eq!(props.gate_error("cx", &[0, 1]), Some(0.0075));
    assert!(props.gate_error("cx", &[1, 0]).is_none());
    let len = props.gate_length("sx", &[0]).unwrap();
    assert!((len - 35.5e-9).abs() < 1e-15);
    assert!(props.t2(1).is_none());
}

#[test]
fn single_result_file_loads_as_single() {
    let dir = tempdir().unwrap();
    let p = dir.path().join("result.json");
    let res = sample_result("job-a");
    qpersist_core::save_to_json(&res, &p).unwrap();

    let loaded = qpersist_core::load_result(&p).unwrap();
    assert!(loaded.is_single());
    let back = loaded.single().expect("single");
    assert_eq!(back, res);
    assert_eq!(back.experiment("bell").unwrap().shots.total(), 1024);
    assert_eq!(back.get_statevector(0).unwrap().len(), 4);
}

#[test]
fn result_list_file_loads_many_in_order() {
    let dir = tempdir().unwrap();
    let p = dir.path().join("results.json");
    let results = vec![
        sample_result("job-1"),
        sample_result("job-2"),
        sample_result("job-3"),
    ];
    qpersist_core::save_to_json(&results, &p).unwrap();

    let loaded = qpersist_core::load_result(&p).unwrap();
    let Loaded::Many(items) = &loaded else {
        panic!("expected many, got {:?}", loaded);
    };
    let ids: Vec<&str> = items.iter().map(|r| r.job_id.as_str()).collect();
    assert_eq!(ids, ["job-1", "job-2", "job-3"]);
    assert_eq!(loaded.len(), 3);
}

#[test]
fn result_written_by_hand_is_readable() {
    let dir = tempdir().unwrap();
    let p = dir.path().join("hand.json");
    std::fs::write(&p, RESULT_JSON).unwrap();

    let res = qpersist_core::load_result(&p).unwrap().single().unwrap();
    assert_eq!(res.job_id, "JOBID");
    assert_eq!(res.date.unwrap().to_iso(), "2024-01-01T00:00:00");
    assert_eq!(res.get_counts(0).unwrap()["0x1"], 60);
    assert_eq!(res.results[0].name(), Some("circ"));
    assert!(res.results[0].data.statevector.is_none());
}

#[test]
fn counts_convert_to_register_bitstrings() {
    let res = sample_result("job-bits");
    let bits = res.results[0].counts_bitstrings().unwrap();
    assert_eq!(bits.get("00"), Some(&510));
    assert_eq!(bits.get("11"), Some(&514));
}

const KERNELED_JSON: &str = r#"{
  "backend_name": "b",
  "backend_version": "1",
  "qobj_id": "q",
  "job_id": "kern",
  "success": true,
  "results": [
    {"shots": 2, "success": true, "meas_level": 1,
     "data": {"memory": [[[0.1, 0.2]], [[0.3, 0.4]]]}}
  ]
}"#;

#[test]
fn kerneled_memory_loads_and_saves_unchanged() {
    let dir = tempdir().unwrap();
    let p = dir.path().join("kerneled.json");
    std::fs::write(&p, KERNELED_JSON).unwrap();

    let res = qpersist_core::load_result(&p).unwrap().single().unwrap();
    let exp = &res.results[0];
    assert_eq!(exp.meas_level, Some(1));
    let memory = exp.data.memory.as_ref().unwrap();
    assert!(memory.as_hex().is_none());
    assert_eq!(*memory, Memory::Raw(json!([[[0.1, 0.2]], [[0.3, 0.4]]])));

    let out = qpersist_core::to_json_value(&res).unwrap();
    assert_eq!(
        out["results"][0]["data"]["memory"],
        json!([[[0.1, 0.2]], [[0.3, 0.4]]])
    );
}

#[test]
fn classified_memory_reads_as_hex() {
    let mut res = sample_result("job-mem");
    res.results[0].data.memory = Some(Memory::Hex(vec!["0x0".into(), "0x3".into()]));
    let dir = tempdir().unwrap();
    let p = dir.path().join("mem.json");
    qpersist_core::save_to_json(&res, &p).unwrap();

    let back = qpersist_core::load_result(&p).unwrap().single().unwrap();
    let memory = back.results[0].data.memory.as_ref().unwrap();
    assert_eq!(memory.as_hex().unwrap(), ["0x0", "0x3"]);
    assert_eq!(back, res);
}

const EXTRA_KEYS_JSON: &str = r#"{
  "backend_name": "b",
  "backend_version": "1",
  "qobj_id": "q",
  "job_id": "extra",
  "success": true,
  "time_taken": 1.5,
  "metadata": {"parallel_experiments": 1, "omp_enabled": true},
  "results": [
    {"shots": 10, "success": true, "time_taken": 0.25,
     "data": {"counts": {"0x0": 10}, "snapshots": {"statevector": {"s0": [[[1, 0]]]}}}}
  ]
}"#;

#[test]
fn unknown_keys_survive_load_and_save() {
    let dir = tempdir().unwrap();
    let src = dir.path().join("in.json");
    let out = dir.path().join("out.json");
    std::fs::write(&src, EXTRA_KEYS_JSON).unwrap();

    let res = qpersist_core::load_result(&src).unwrap().single().unwrap();
    assert_eq!(res.extra["time_taken"], json!(1.5));
    qpersist_core::save_to_json(&res, &out).unwrap();

    let written: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(written["time_taken"], json!(1.5));
    assert_eq!(
        written["metadata"],
        json!({"parallel_experiments": 1, "omp_enabled": true})
    );
    assert_eq!(written["results"][0]["time_taken"], json!(0.25));
    assert_eq!(
        written["results"][0]["data"]["snapshots"],
        json!({"statevector": {"s0": [[[1, 0]]]}})
    );
    assert_eq!(written["results"][0]["data"]["counts"], json!({"0x0": 10}));

    let again = qpersist_core::load_result(&out).unwrap().single().unwrap();
    assert_eq!(again, res);
}

#[test]
fn bitstrings_pad_to_register_sizes_without_memory_slots() {
    let mut res = sample_result("job-regs");
    let exp = &mut res.results[0];
    let mut counts = BTreeMap::new();
    counts.insert("0x1".to_string(), 2);
    exp.data.counts = Some(counts);
    exp.header = Some(json!({"name": "regs", "creg_sizes": [["a", 1], ["b", 1]]}));

    let bits = exp.counts_bitstrings().unwrap();
    assert_eq!(bits.len(), 1);
    assert_eq!(bits.get("0 1"), Some(&2));
}

#[test]
fn saved_statevector_is_list_of_pairs() {
    let res = sample_result("job-sv");
    let v = qpersist_core::to_json_value(&res).unwrap();
    assert_eq!(
        v["results"][0]["data"]["statevector"],
        json!([[0.5, 0.0], [0.0, 0.5], [-0.5, 0.0], [0.0, -0.5]])
    );
    assert_eq!(v["results"][0]["shots"], json!(1024));
    assert_eq!(v["date"], json!("2024-01-01T00:00:00"));
}

#[derive(Debug)]
struct Run {
    label: String,
}

impl ToValue for Run {
    fn to_value(&self) -> Value<'_> {
        Value::Dict(vec![
            (Cow::Borrowed("label"), self.label.to_value()),
            (Cow::Borrowed("backend"), Value::opaque("BackendHandle")),
        ])
    }
}

#[test]
fn unsupported_value_fails_without_touching_file() {
    let dir = tempdir().unwrap();
    let fresh = dir.path().join("fresh.json");
    let existing = dir.path().join("existing.json");
    std::fs::write(&existing, "{\"keep\":true}").unwrap();

    let run = Run {
        label: "r1".into(),
    };
    let err = qpersist_core::save_to_json(&run, &fresh).unwrap_err();
    match &err {
        Error::Encode(EncodeError::Unsupported { type_name, path }) => {
            assert_eq!(type_name, "BackendHandle");
            assert_eq!(path, "/backend");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.is_encode());
    assert!(!fresh.exists());

    assert!(qpersist_core::save_to_json(&run, &existing).is_err());
    assert_eq!(std::fs::read_to_string(&existing).unwrap(), "{\"keep\":true}");
}

#[test]
fn non_finite_calibration_value_is_rejected() {
    let mut props = sample_properties();
    props.qubits[0][0].value = f64::INFINITY;
    let err = qpersist_core::to_json_value(&props).unwrap_err();
    match err {
        Error::Encode(EncodeError::NonFinite { path, .. }) => {
            assert_eq!(path, "/qubits/0/0/value");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn load_errors_are_classified() {
    let dir = tempdir().unwrap();

    let missing = dir.path().join("missing.json");
    assert!(matches!(
        qpersist_core::load_properties(&missing),
        Err(Error::Io { .. })
    ));

    let broken = dir.path().join("broken.json");
    std::fs::write(&broken, "{\"backend_name\": ").unwrap();
    assert!(matches!(
        qpersist_core::load_result(&broken),
        Err(Error::Parse { .. })
    ));

    let wrong = dir.path().join("wrong.json");
    std::fs::write(&wrong, r#"{"backend_name": "x"}"#).unwrap();
    match qpersist_core::load_properties(&wrong) {
        Err(Error::Reconstruct { type_name, .. }) => assert_eq!(type_name, "BackendProperties"),
        other => panic!("unexpected: {other:?}"),
    }

    // One bad element fails the whole list.
    let mixed = dir.path().join("mixed.json");
    std::fs::write(&mixed, format!("[{RESULT_JSON}, {{\"job_id\": 3}}]")).unwrap();
    assert!(matches!(
        qpersist_core::load_result(&mixed),
        Err(Error::Reconstruct { .. })
    ));
}

#[test]
fn save_into_missing_directory_is_io_error() {
    let dir = tempdir().unwrap();
    let p = dir.path().join("no/such/dir/out.json");
    let err = qpersist_core::save_to_json(&sample_properties(), &p).unwrap_err();
    assert!(matches!(err, Error::Io { .. }));
}

#[test]
fn pretty_output_parses_to_same_value() {
    let dir = tempdir().unwrap();
    let p = dir.path().join("pretty.json");
    let res = sample_result("job-pretty");
    qpersist_core::save_to_json_with(&res, &p, SaveOpts { pretty: true }).unwrap();
    let text = std::fs::read_to_string(&p).unwrap();
    assert!(text.contains("\n  \"backend_name\""));

    let compact = qpersist_core::to_json_string(&res, SaveOpts::default()).unwrap();
    let a: serde_json::Value = serde_json::from_str(&text).unwrap();
    let b: serde_json::Value = serde_json::from_str(&compact).unwrap();
    assert_eq!(a, b);
}

#[test]
fn results_directory_loads_each_file() {
    let dir = tempdir().unwrap();
    qpersist_core::save_to_json(&sample_result("a"), dir.path().join("a.json")).unwrap();
    qpersist_core::save_to_json(
        &vec![sample_result("b1"), sample_result("b2")],
        dir.path().join("b.json"),
    )
    .unwrap();
    std::fs::write(dir.path().join("c.json"), "not json").unwrap();
    std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

    let loaded = qpersist_core::load_results_dir(dir.path());
    let names: Vec<String> = loaded
        .iter()
        .map(|(p, _)| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, ["a.json", "b.json", "c.json"]);
    assert_eq!(loaded[0].1.as_ref().unwrap().len(), 1);
    assert_eq!(loaded[1].1.as_ref().unwrap().len(), 2);
    assert!(matches!(loaded[2].1, Err(Error::Parse { .. })));
}
