use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

fn bin_path() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_memperf"))
}

fn tmp_path(filename: &str) -> PathBuf {
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos();
    let mut p = std::env::temp_dir();
    p.push(format!("memperf_cli_run_{}_{}_{}", std::process::id(), nanos, filename));
    p
}

fn run(args: &[&str]) -> Output {
    Command::new(bin_path())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("failed to run {:?} {:?}: {}", bin_path(), args, e))
}

fn s(p: &Path) -> String {
    p.to_string_lossy().into_owned()
}

fn generate(channel: &str, n: usize, seed: u64) -> PathBuf {
    let events = tmp_path(&format!("{channel}_events.jsonl"));
    let out = run(&[
        "generate",
        "--channel",
        channel,
        "--signal",
        "-n",
        &n.to_string(),
        "--seed",
        &seed.to_string(),
        "-o",
        &s(&events),
    ]);
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(out.status.success(), "generate failed, stderr={stderr}");
    events
}

fn write_config(name: &str, body: &str) -> PathBuf {
    let path = tmp_path(name);
    std::fs::write(&path, body).unwrap();
    path
}

const DILEPTON_CONFIG: &str = "\
channel: dilepton
process: signal
fake_rates:
  bjet_lead: 0.1
  bjet_sublead: 0.1
smearing:
  jet:
    enabled: true
    coeff: 1.0
  met:
    enabled: true
    sigma_x: 10.0
    sigma_y: 10.0
";

fn summary_of(config: &Path, events: &Path, extra: &[&str]) -> (serde_json::Value, PathBuf) {
    let out_dir = tmp_path("out");
    let summary = tmp_path("summary.json");
    let mut args = vec![
        "run".to_string(),
        "-c".into(),
        s(config),
        "-i".into(),
        s(events),
        "-o".into(),
        s(&out_dir),
        "--summary".into(),
        s(&summary),
    ];
    args.extend(extra.iter().map(|a| a.to_string()));
    let argv: Vec<&str> = args.iter().map(String::as_str).collect();
    let out = run(&argv);
    assert!(out.status.success(), "run failed, stderr={}", String::from_utf8_lossy(&out.stderr));
    let v: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&summary).unwrap()).expect("summary should be JSON");
    (v, out_dir)
}

#[test]
fn generate_then_run_writes_variant_files() {
    let events = generate("dilepton", 200, 3);
    let config = write_config("dilepton.yaml", DILEPTON_CONFIG);
    let (v, out_dir) = summary_of(&config, &events, &[]);

    assert_eq!(v.get("analyzed").and_then(|x| x.as_u64()), Some(200));
    let selected = v.get("selected").and_then(|x| x.as_u64()).unwrap();
    assert!(selected > 0, "no event selected: {v}");

    let rows = v["cut_flow"]["rows"].as_array().expect("cut-flow rows");
    assert_eq!(rows[0]["events"].as_u64(), Some(200));
    for pair in rows.windows(2) {
        assert!(pair[1]["events"].as_u64() <= pair[0]["events"].as_u64());
    }
    assert_eq!(rows.last().unwrap()["events"].as_u64(), Some(selected));

    for name in ["mem", "mem_missingBJet"] {
        let text = std::fs::read_to_string(out_dir.join(format!("{name}.jsonl"))).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len() as u64, selected, "{name}");
        let rec: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(rec["variant"].as_str(), Some(name));
        assert!(rec["memLR"].as_f64().is_some());
    }
}

#[test]
fn summary_is_reproducible_for_a_fixed_seed() {
    let events = generate("single_lepton", 150, 9);
    let config = write_config(
        "single.yaml",
        "channel: single_lepton\nprocess: signal\nfake_rates:\n  wjet_sublead: 0.3\n",
    );
    let (a, dir_a) = summary_of(&config, &events, &["--seed", "77"]);
    let (b, dir_b) = summary_of(&config, &events, &["--seed", "77"]);

    assert_eq!(a, b);

    let read =
        |d: &Path| std::fs::read_to_string(d.join("mem_missingWJet.jsonl")).unwrap_or_default();
    let drop_time = |text: String| -> Vec<serde_json::Value> {
        text.lines()
            .map(|l| {
                let mut v: serde_json::Value = serde_json::from_str(l).unwrap();
                v.as_object_mut().unwrap().remove("memCpuTime");
                v
            })
            .collect()
    };
    assert_eq!(drop_time(read(&dir_a)), drop_time(read(&dir_b)));
}

#[test]
fn allow_list_and_selected_events_file() {
    let events = generate("dilepton", 50, 5);
    let allow = tmp_path("allow.txt");
    std::fs::write(&allow, "# wanted\n1:1:3\n1:1:7\n1:1:12\n").unwrap();
    let picked = tmp_path("picked.txt");
    let config = write_config("dilepton.yaml", DILEPTON_CONFIG);

    let (v, _) = summary_of(
        &config,
        &events,
        &["--allow-list", &s(&allow), "--selected-events", &s(&picked)],
    );
    assert!(v["analyzed"].as_u64().unwrap() <= 12);
    let rows = v["cut_flow"]["rows"].as_array().unwrap();
    assert_eq!(rows[0]["events"].as_u64(), Some(3));

    let written = std::fs::read_to_string(&picked).unwrap();
    for line in written.lines() {
        assert!(["1:1:3", "1:1:7", "1:1:12"].contains(&line), "unexpected {line}");
    }
    assert_eq!(written.lines().count() as u64, v["selected"].as_u64().unwrap());
}

#[test]
fn invalid_config_fails() {
    let events = generate("dilepton", 5, 1);
    let config = write_config("bad.yaml", "fake_rates:\n  bjet_lead: 1.5\n");
    let out = run(&["run", "-c", &s(&config), "-i", &s(&events), "-o", &s(&tmp_path("out"))]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("invalid configuration"));
}

#[test]
fn malformed_input_aborts() {
    let events = tmp_path("broken.jsonl");
    std::fs::write(&events, "{\"run\": 1, \"lumi\": 1, \"event\": 1}\nnot json\n").unwrap();
    let out = run(&["run", "-i", &s(&events), "-o", &s(&tmp_path("out"))]);
    assert!(!out.status.success());
}

#[test]
fn version_prints_crate_version() {
    let out = run(&["version"]);
    assert!(out.status.success());
    assert!(String::from_utf8_lossy(&out.stdout).starts_with("memperf "));
}
