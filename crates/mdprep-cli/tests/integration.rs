#![cfg(unix)]
#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use tempfile::TempDir;

fn mdprep(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("mdprep").unwrap();
    cmd.current_dir(dir.path())
        .env("MDPREP_ROOT", dir.path())
        .env_remove("RUST_LOG");
    cmd
}

fn add_system(dir: &TempDir, name: &str) -> PathBuf {
    let sys = dir.path().join(name);
    std::fs::create_dir_all(&sys).unwrap();
    std::fs::write(sys.join("receptor.pdb"), "ATOM      1  N   MET A   1       0.000   0.000   0.000\nEND\n").unwrap();
    sys
}

fn fake_tool(dir: &TempDir, name: &str, body: &str) -> String {
    let bin = dir.path().join("bin");
    std::fs::create_dir_all(&bin).unwrap();
    let path = bin.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path.to_string_lossy().into_owned()
}

fn write_config(dir: &TempDir, yaml: &str) {
    std::fs::write(dir.path().join("mdprep.yaml"), yaml).unwrap();
}

fn json_output(cmd: &mut Command) -> serde_json::Value {
    let out = cmd.assert().success().get_output().stdout.clone();
    serde_json::from_slice(&out).unwrap()
}

const FAKE_TLEAP: &str = "\
echo 'Total unperturbed charge:   2.000000' >> leap.log
touch pro.prmtop pro.inpcrd pro-dry.pdb pro-sol.prmtop pro-sol.inpcrd pro-sol.pdb
";

const FAKE_PYTHON: &str = "\
printf '[ moleculetype ]\\nsystem1 3\\n\\n[ atoms ]\\n1 N\\n\\n[ moleculetype ]\\nWAT 3\\n\\n[ system ]\\nx\\n' > \"$5\"
echo gro > \"$6\"
";

const FAKE_GMX: &str = "\
case \"$1\" in
  genrestr)
    if [ \"$5\" = /dev/null ]; then
      echo 'Group     1 (        Protein) has    20 elements'
      exit 1
    fi
    read g
    printf '; posre\\n\\n[ position_restraints ]\\n; i\\n1 1 1000 1000 1000\\n' > \"$5\"
    ;;
  grompp) touch \"${11}\" ;;
  mdrun) touch \"$4.gro\" ;;
esac
";

fn toolchain_config(dir: &TempDir) {
    let tleap = fake_tool(dir, "tleap", FAKE_TLEAP);
    let python = fake_tool(dir, "python", FAKE_PYTHON);
    let gmx = fake_tool(dir, "gmx", FAKE_GMX);
    write_config(
        dir,
        &format!(
            "version: 1\ntools:\n  tleap: '{tleap}'\n  python: '{python}'\n  gmx: '{gmx}'\nequilibration:\n  gpus: [0]\n"
        ),
    );
}

fn stage_of(dir: &TempDir, system: &str) -> String {
    let statuses = json_output(mdprep(dir).args(["status", "--json"]));
    statuses
        .as_array()
        .unwrap()
        .iter()
        .find(|s| s["system"] == system)
        .map(|s| s["stage"].as_str().unwrap().to_string())
        .unwrap()
}

// ---------------------------------------------------------------------------
// mdprep init
// ---------------------------------------------------------------------------

#[test]
fn init_creates_config_folders_and_templates() {
    let dir = TempDir::new().unwrap();
    add_system(&dir, "system1");
    mdprep(&dir).arg("init").assert().success();

    assert!(dir.path().join("mdprep.yaml").exists());
    for sub in ["ligprep", "parameters", "mdp"] {
        assert!(dir.path().join("system1").join(sub).is_dir());
    }
    for mdp in ["em", "nvt", "npt"] {
        assert!(dir.path().join(format!("system1/mdp/{mdp}.mdp")).exists());
    }
}

#[test]
fn init_is_idempotent_and_keeps_templates() {
    let dir = TempDir::new().unwrap();
    add_system(&dir, "system1");
    mdprep(&dir).arg("init").assert().success();
    std::fs::write(dir.path().join("system1/mdp/em.mdp"), "dt = 0.001\n").unwrap();
    mdprep(&dir)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("exists:"));
    let em = std::fs::read_to_string(dir.path().join("system1/mdp/em.mdp")).unwrap();
    assert_eq!(em, "dt = 0.001\n");
}

#[test]
fn init_without_systems_succeeds_with_hint() {
    let dir = TempDir::new().unwrap();
    mdprep(&dir)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("No system* folders"));
    assert!(dir.path().join("mdprep.yaml").exists());
}

// ---------------------------------------------------------------------------
// mdprep status
// ---------------------------------------------------------------------------

#[test]
fn status_without_systems_fails() {
    let dir = TempDir::new().unwrap();
    mdprep(&dir)
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("no system directories"));
}

#[test]
fn status_reports_pending_stage_per_system() {
    let dir = TempDir::new().unwrap();
    add_system(&dir, "system1");
    let lig = add_system(&dir, "system2");
    std::fs::write(lig.join("ligand.sdf"), "").unwrap();

    assert_eq!(stage_of(&dir, "system1"), "topology");
    assert_eq!(stage_of(&dir, "system2"), "ligand_qm");

    mdprep(&dir)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("SYSTEM"))
        .stdout(predicate::str::contains("Gaussian job not submitted"));
}

// ---------------------------------------------------------------------------
// mdprep config / doctor
// ---------------------------------------------------------------------------

#[test]
fn config_show_prints_defaults() {
    let dir = TempDir::new().unwrap();
    mdprep(&dir)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("gmx_mpi"))
        .stdout(predicate::str::contains("OPCBOX"));
}

#[test]
fn config_validate_rejects_empty_gpu_list() {
    let dir = TempDir::new().unwrap();
    write_config(&dir, "equilibration:\n  gpus: []\n");
    mdprep(&dir)
        .args(["config", "validate"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("[error]"));
}

#[test]
fn config_validate_accepts_defaults() {
    let dir = TempDir::new().unwrap();
    mdprep(&dir)
        .args(["config", "validate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Config is valid"));
}

#[test]
fn doctor_flags_missing_tools() {
    let dir = TempDir::new().unwrap();
    write_config(&dir, "tools:\n  gaussian: __no_such_g16__\n");
    mdprep(&dir)
        .arg("doctor")
        .assert()
        .failure()
        .stderr(predicate::str::contains("gaussian"));
}

#[test]
fn doctor_passes_when_everything_resolves() {
    let dir = TempDir::new().unwrap();
    write_config(
        &dir,
        "tools:\n  antechamber: sh\n  parmchk2: sh\n  tleap: sh\n  gaussian: sh\n  gmx: sh\n  python: sh\n",
    );
    mdprep(&dir).arg("doctor").assert().success();
}

// ---------------------------------------------------------------------------
// mdprep ligand / resp
// ---------------------------------------------------------------------------

#[test]
fn ligand_submit_without_sdf_fails() {
    let dir = TempDir::new().unwrap();
    add_system(&dir, "system1");
    mdprep(&dir)
        .args(["ligand", "submit"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no ligand SDF"));
}

#[test]
fn ligand_submit_generates_input_and_launches_job() {
    let dir = TempDir::new().unwrap();
    let sys = add_system(&dir, "system1");
    std::fs::write(sys.join("ligand.sdf"), "lig\n\n\n  0  0\nM  CHG  1   1   1\nM  END\n").unwrap();
    let antechamber = fake_tool(&dir, "antechamber", "echo \"$@\" > args.txt\ntouch lig.gjf\n");
    let g16 = fake_tool(&dir, "g16", "exit 0\n");
    write_config(
        &dir,
        &format!("tools:\n  antechamber: '{antechamber}'\n  gaussian: '{g16}'\n"),
    );

    let reports = json_output(mdprep(&dir).args(["ligand", "submit", "--json"]));
    assert_eq!(reports[0]["system"], "system1");
    assert_eq!(reports[0]["outcome"], "submitted");
    assert_eq!(reports[0]["charge"], 1);

    let args = std::fs::read_to_string(sys.join("ligprep/args.txt")).unwrap();
    assert!(args.contains("-nc 1"));
    assert!(args.contains("-rn MOL"));
}

#[test]
fn ligand_check_summarises_logs() {
    let dir = TempDir::new().unwrap();
    let sys = add_system(&dir, "system1");
    std::fs::write(sys.join("ligand.sdf"), "").unwrap();
    std::fs::create_dir_all(sys.join("ligprep")).unwrap();
    std::fs::write(sys.join("ligprep/lig.log"), " Normal termination of Gaussian 16\n").unwrap();
    mdprep(&dir)
        .args(["ligand", "check"])
        .assert()
        .success()
        .stdout(predicate::str::contains("All jobs completed."));

    std::fs::write(sys.join("ligprep/lig.log"), " Error termination via Lnk1e\n").unwrap();
    mdprep(&dir)
        .args(["ligand", "check"])
        .assert()
        .success()
        .stdout(predicate::str::contains("failed"));
}

#[test]
fn resp_fails_when_a_fit_fails() {
    let dir = TempDir::new().unwrap();
    let sys = add_system(&dir, "system1");
    std::fs::write(sys.join("ligand.sdf"), "").unwrap();
    std::fs::create_dir_all(sys.join("ligprep")).unwrap();
    std::fs::write(sys.join("ligprep/lig.log"), " Normal termination of Gaussian 16\n").unwrap();
    write_config(&dir, "tools:\n  antechamber: 'false'\n");
    mdprep(&dir)
        .arg("resp")
        .assert()
        .failure()
        .stderr(predicate::str::contains("charge fitting failed for 1 system(s)"));
}

// ---------------------------------------------------------------------------
// mdprep topology / convert / run
// ---------------------------------------------------------------------------

#[test]
fn topology_neutralises_with_counter_ions() {
    let dir = TempDir::new().unwrap();
    let sys = add_system(&dir, "system1");
    toolchain_config(&dir);

    let reports = json_output(mdprep(&dir).args(["topology", "--json"]));
    assert_eq!(reports[0]["kind"], "protein");
    assert_eq!(reports[0]["charge"], 2.0);
    assert_eq!(reports[0]["ions"]["ion"], "Cl-");
    assert_eq!(reports[0]["ions"]["count"], 2);

    let script = std::fs::read_to_string(sys.join("parameters/tleap_protein.in")).unwrap();
    assert!(script.contains("pro = loadpdb ../receptor.pdb"));
    assert!(script.contains("addionsrand pro Cl- 2"));
}

#[test]
fn convert_amber_reports_missing_inputs() {
    let dir = TempDir::new().unwrap();
    add_system(&dir, "system1");
    toolchain_config(&dir);
    mdprep(&dir)
        .args(["convert", "amber", "complex.prmtop", "complex.inpcrd"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("FAILED"));
}

#[test]
fn run_rejects_unknown_kind() {
    let dir = TempDir::new().unwrap();
    add_system(&dir, "system1");
    mdprep(&dir)
        .args(["run", "membrane"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid system kind"));
}

#[test]
fn run_protein_end_to_end() {
    let dir = TempDir::new().unwrap();
    let sys = add_system(&dir, "system1");
    toolchain_config(&dir);
    mdprep(&dir).arg("init").assert().success();

    let outcome = json_output(mdprep(&dir).args(["run", "protein", "--json"]));
    assert_eq!(outcome["status"], "completed");
    let summary = &outcome["summary"];
    assert_eq!(summary["restraints"][0]["outcome"], "restrained");
    assert_eq!(summary["restraints"][0]["includes_added"][0], "posre1.itp");
    assert_eq!(summary["equilibration"][0]["outcome"], "completed");
    assert_eq!(summary["equilibration"][0]["gpu"], 0);

    let top = std::fs::read_to_string(sys.join("parameters/gmx.top")).unwrap();
    assert!(top.contains("#include \"posre1.itp\""));
    assert!(sys.join("parameters/posre1.itp").exists());
    assert!(!sys.join("parameters/posre2.itp").exists());
    assert!(sys.join("npt3/npt3.gro").exists());
    assert!(dir.path().join("master.log").exists());
    assert_eq!(stage_of(&dir, "system1"), "done");
}

#[test]
fn run_complex_stops_after_submission_with_no_wait() {
    let dir = TempDir::new().unwrap();
    let sys = add_system(&dir, "system1");
    std::fs::write(sys.join("ligand.sdf"), "lig\n\n\n  0  0\nM  END\n").unwrap();
    let antechamber = fake_tool(&dir, "antechamber", "touch lig.gjf\n");
    let g16 = fake_tool(&dir, "g16", "exit 0\n");
    write_config(
        &dir,
        &format!("tools:\n  antechamber: '{antechamber}'\n  gaussian: '{g16}'\n"),
    );

    mdprep(&dir)
        .args(["run", "complex", "--no-wait"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Submitted Gaussian jobs for 1 ligand(s)"));
    assert!(sys.join("ligprep/lig.gjf").exists());
}
