use std::path::PathBuf;
use std::process::Command;

fn seqvid_bin() -> String {
    std::env::var("CARGO_BIN_EXE_seqvid").unwrap_or_else(|_| {
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("../../target/debug/seqvid")
            .to_string_lossy()
            .to_string()
    })
}

fn frames_dir(name: &str, files: &[&str]) -> PathBuf {
    let root = std::env::temp_dir().join(format!("seqvid_cli_{}_{}", name, std::process::id()));
    let _ = std::fs::remove_dir_all(&root);
    let frames = root.join("frames");
    std::fs::create_dir_all(&frames).unwrap();
    for f in files {
        std::fs::write(frames.join(f), b"px").unwrap();
    }
    frames
}

#[test]
fn detect_json_reports_sequence_and_gaps() {
    let dir = frames_dir(
        "json",
        &["render.0001.png", "render.0002.png", "render.0004.png", "readme.txt"],
    );

    let output = Command::new(seqvid_bin())
        .arg("detect")
        .arg(&dir)
        .arg("--json")
        .env("RUST_LOG", "off")
        .output()
        .expect("failed to run seqvid detect");
    assert!(output.status.success(), "detect failed: {:?}", output);

    let stdout = String::from_utf8(output.stdout).expect("stdout not utf-8");
    let value: serde_json::Value = serde_json::from_str(&stdout).expect("stdout is not JSON");
    let list = value.as_array().expect("expected a JSON array");
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["prefix"], "render.");
    assert_eq!(list[0]["frames"], 3);
    assert_eq!(list[0]["is_contiguous"], false);
    assert_eq!(list[0]["gaps"], serde_json::json!([[3, 3]]));
    assert_eq!(list[0]["base_name"], "render");

    let _ = std::fs::remove_dir_all(dir.parent().unwrap());
}

#[test]
fn detect_ambiguous_then_select() {
    let dir = frames_dir(
        "ambiguous",
        &["a_01.png", "a_02.png", "b_01.exr", "b_02.exr"],
    );

    let output = Command::new(seqvid_bin())
        .arg("convert")
        .arg(&dir)
        .arg("--dry-run")
        .env("RUST_LOG", "off")
        .output()
        .expect("failed to run seqvid convert");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("pick one by prefix"), "stderr: {stderr}");

    let output = Command::new(seqvid_bin())
        .args(["detect", "--json", "--sequence", "b_"])
        .arg(&dir)
        .env("RUST_LOG", "off")
        .output()
        .expect("failed to run seqvid detect");
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value[0]["extension"], "exr");

    let _ = std::fs::remove_dir_all(dir.parent().unwrap());
}

#[test]
fn setup_only_writes_versioned_artifact() {
    let dir = frames_dir("setup", &["plate_001.png", "plate_002.png", "plate_003.png"]);
    let root = dir.parent().unwrap().to_path_buf();

    for _ in 0..2 {
        let output = Command::new(seqvid_bin())
            .arg("convert")
            .arg(&dir)
            .args(["--backend", "host", "--action", "setup-only", "--codec", "vp9"])
            .env("RUST_LOG", "off")
            .output()
            .expect("failed to run seqvid convert");
        assert!(output.status.success(), "convert failed: {:?}", output);
    }

    let setup_dir = root.join("setup_files");
    assert!(setup_dir.join("plate_v001_setup.json").is_file());
    assert!(setup_dir.join("plate_v002_setup.json").is_file());
    let setup: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(setup_dir.join("plate_v002_setup.json")).unwrap(),
    )
    .unwrap();
    assert!(setup["output_path"]
        .as_str()
        .unwrap()
        .ends_with("plate_v002.webm"));

    let _ = std::fs::remove_dir_all(&root);
}
