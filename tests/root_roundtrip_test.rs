//! Root contract tests, run against both bundled roots

use std::sync::Arc;
use std::thread;

use serde_json::json;
use tempfile::TempDir;
use trueno_track::codec::Compression;
use trueno_track::root::{DirRoot, MemoryRoot, Root, RunSet};
use trueno_track::run::Run;
use trueno_track::tensor::Tensor;
use trueno_track::value::Value;

fn write_runs(root: &Arc<dyn Root>, count: usize) -> Vec<String> {
    (0..count)
        .map(|i| {
            let mut run = Run::builder(root.clone())
                .experiment("sweep")
                .config(&json!({"seed": i, "lr": 0.1}))
                .build();
            for step in 0..3 {
                run.track([("loss", 1.0 / (step + i + 1) as f64)], None).unwrap();
            }
            run.write().unwrap();
            run.uuid().to_string()
        })
        .collect()
}

fn check_contract(root: Arc<dyn Root>) {
    let uuids = write_runs(&root, 3);

    // native order is commit order
    assert_eq!(root.uuids(None).unwrap(), uuids);

    // unknown uuids are silently excluded, requested order kept
    let requested = vec![uuids[2].clone(), "missing".to_string(), uuids[0].clone()];
    let data = root.get(Some(&requested)).unwrap();
    assert_eq!(data.uuids(), vec![uuids[2].as_str(), uuids[0].as_str()]);
    assert_eq!(data.configs[0]["seed"], json!(2));
    assert_eq!(data.logs[1].len(), 3);

    let configs = root.configs(None).unwrap();
    assert_eq!(configs.len(), 3);
    assert!(root.run("missing").unwrap().is_none());
    assert!(root.config("missing").unwrap().is_none());
}

#[test]
fn test_memory_root_contract() {
    check_contract(Arc::new(MemoryRoot::new()));
}

#[test]
fn test_dir_root_contract() {
    let tmp = TempDir::new().unwrap();
    check_contract(Arc::new(DirRoot::open(tmp.path()).unwrap()));
}

/// Finite f64s spread over the whole exponent range.
fn awkward_floats(count: usize) -> Vec<f64> {
    let mut state: u64 = 0x9E37_79B9_7F4A_7C15;
    let mut out = Vec::with_capacity(count);
    while out.len() < count {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        let x = f64::from_bits(state);
        if x.is_finite() {
            out.push(x);
        }
    }
    out.extend([1.071_566_039_146_582_6e-75, 0.1, f64::MIN_POSITIVE, f64::MAX]);
    out
}

fn check_floats_exact(root: Arc<dyn Root>) {
    for x in awkward_floats(100) {
        let mut run = Run::builder(root.clone()).config(&json!({"lr": x})).build();
        run.set_info("score", x).unwrap();
        run.write().unwrap();

        let config = root.config(run.uuid()).unwrap().unwrap();
        let stored = config["lr"].as_f64().unwrap();
        assert_eq!(stored.to_bits(), x.to_bits(), "config lr {x:e} came back as {stored:e}");

        let data = root.run(run.uuid()).unwrap().unwrap();
        let score = data.info().get("score").and_then(|v| v.as_f64()).unwrap();
        assert_eq!(score.to_bits(), x.to_bits(), "info score {x:e} came back as {score:e}");
        assert_eq!(data.config(), run.config());
        assert_eq!(data.info(), run.info());
    }
}

#[test]
fn test_memory_root_keeps_config_floats_exact() {
    check_floats_exact(Arc::new(MemoryRoot::new()));
}

#[test]
fn test_dir_root_keeps_config_floats_exact() {
    let tmp = TempDir::new().unwrap();
    check_floats_exact(Arc::new(DirRoot::open(tmp.path()).unwrap()));
}

#[test]
fn test_dir_root_survives_reopen_with_tensor_values() {
    let tmp = TempDir::new().unwrap();
    let tensor = Tensor::from_i64(vec![2, 3], &[1, 2, 3, 4, 5, 6]).unwrap();
    let uuid = {
        let root = Arc::new(
            DirRoot::builder(tmp.path())
                .compression(Compression::Zstd)
                .open()
                .unwrap(),
        );
        let mut run = Run::new(root);
        run.track([("weights", tensor.clone())], None).unwrap();
        run.track([("note", "warmup")], None).unwrap();
        run.write().unwrap();
        run.uuid().to_string()
    };

    let root = DirRoot::open(tmp.path()).unwrap();
    let stored = root.run(&uuid).unwrap().unwrap();
    assert_eq!(stored.log()[0]["weights"].to_tensor().unwrap(), tensor);
    assert_eq!(stored.log()[0]["note"], Value::Str("warmup".to_string()));
}

#[test]
fn test_dir_root_concurrent_writers() {
    let tmp = TempDir::new().unwrap();
    DirRoot::open(tmp.path()).unwrap();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let path = tmp.path().to_path_buf();
            thread::spawn(move || {
                // one handle per writer, like separate processes
                let root: Arc<dyn Root> = Arc::new(DirRoot::open(&path).unwrap());
                write_runs(&root, 5)
            })
        })
        .collect();

    let mut written: Vec<String> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();
    written.sort();

    let root = DirRoot::open(tmp.path()).unwrap();
    let mut listed = root.uuids(None).unwrap();
    listed.sort();
    assert_eq!(listed, written);
    for uuid in &listed {
        assert_eq!(root.run(uuid).unwrap().unwrap().log().len(), 3);
    }
}

#[test]
fn test_write_to_copies_between_roots() {
    let tmp = TempDir::new().unwrap();
    let memory = Arc::new(MemoryRoot::new());
    let dir = DirRoot::open(tmp.path()).unwrap();

    let mut run = Run::new(memory.clone());
    run.track([("loss", 0.1)], None).unwrap();
    run.write().unwrap();
    run.write_to(&dir).unwrap();

    assert_eq!(memory.uuids(None).unwrap(), dir.uuids(None).unwrap());
    assert_eq!(
        memory.run(run.uuid()).unwrap().unwrap().log(),
        dir.run(run.uuid()).unwrap().unwrap().log()
    );
    assert_eq!(
        memory.run(run.uuid()).unwrap().unwrap().info(),
        dir.run(run.uuid()).unwrap().unwrap().info()
    );
}
