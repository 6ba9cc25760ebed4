//! End-to-end pipeline tests: configuration text in, resolved aggregate
//! and execution descriptor out.

use std::fs;
use std::path::{Path, PathBuf};

use varde_config::workflows::HookStage;
use varde_config::Config;

fn write(dir: &Path, file: &str, body: &str) -> PathBuf {
    let path = dir.join(file);
    fs::write(&path, body).unwrap();
    path
}

#[test]
fn full_pipeline_emits_descriptor_json() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "echo.job",
        "EXECUTABLE /bin/echo\nSTDOUT echo.out\nARGLIST <MSG> <CASE>\nDEFAULT <MSG> silence\n",
    );
    let config_path = write(
        dir.path(),
        "study.vrd",
        "NUM_REALIZATIONS 2\n\
         DEFINE <CASE> smoke_test\n\
         SETENV STUDY <CASE>\n\
         INSTALL_JOB echo echo.job\n\
         FORWARD_MODEL echo(<MSG>=hello)\n\
         FORWARD_MODEL echo\n",
    );

    let config = Config::from_file(&config_path).unwrap();
    let descriptor = config.forward_model_data("run-42", 1, 0).unwrap();
    let json = serde_json::to_value(&descriptor).unwrap();

    assert_eq!(json["run_id"], "run-42");
    assert_eq!(json["config_file"], "study.vrd");
    assert_eq!(json["global_environment"]["STUDY"], "smoke_test");

    let jobs = json["jobs"].as_array().unwrap();
    assert_eq!(jobs.len(), 2);
    // First invocation carries its private argument; second falls back to
    // the job's declared default.
    assert_eq!(jobs[0]["arg_list"][0], "hello");
    assert_eq!(jobs[1]["arg_list"][0], "silence");
    assert_eq!(jobs[0]["arg_list"][1], "smoke_test");
    // Streams are suffixed with the step index.
    assert_eq!(jobs[0]["stdout"], "echo.out.0");
    assert_eq!(jobs[1]["stdout"], "echo.out.1");
}

#[test]
fn invocations_do_not_leak_arguments_between_steps() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "echo.job", "EXECUTABLE /bin/echo\nARGLIST <MSG>\n");
    let config_path = write(
        dir.path(),
        "study.vrd",
        "NUM_REALIZATIONS 1\n\
         INSTALL_JOB echo echo.job\n\
         FORWARD_MODEL echo(<MSG>=first)\n\
         FORWARD_MODEL echo(<MSG>=second)\n\
         FORWARD_MODEL echo\n",
    );

    let config = Config::from_file(&config_path).unwrap();
    let descriptor = config.forward_model_data("run-1", 0, 0).unwrap();
    assert_eq!(descriptor.jobs[0].arg_list, vec!["first"]);
    assert_eq!(descriptor.jobs[1].arg_list, vec!["second"]);
    // The third invocation sees neither private argument.
    assert_eq!(descriptor.jobs[2].arg_list, vec!["<MSG>"]);
}

#[test]
fn descriptor_is_pinned_per_realization() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "echo.job", "EXECUTABLE /bin/echo\nARGLIST <RUNPATH>\n");
    let config_path = write(
        dir.path(),
        "study.vrd",
        "NUM_REALIZATIONS 4\n\
         RUNPATH out/real-<REAL>/iter-<ITER>\n\
         INSTALL_JOB echo echo.job\n\
         FORWARD_MODEL echo\n",
    );

    let config = Config::from_file(&config_path).unwrap();
    let first = config.forward_model_data("run-1", 0, 0).unwrap();
    let second = config.forward_model_data("run-1", 3, 2).unwrap();
    assert_eq!(first.jobs[0].arg_list, vec!["out/real-0/iter-0"]);
    assert_eq!(second.jobs[0].arg_list, vec!["out/real-3/iter-2"]);
    // Emission must not mutate the stored table.
    assert!(!config.substitution.contains_key("<REAL>"));
}

#[test]
fn independent_mistakes_surface_together() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = write(
        dir.path(),
        "study.vrd",
        "NUM_REALIZATIONS 1\n\
         SUMMARY FOPR\n\
         QUEUE_OPTION LOCAL MAX_RUNNING many\n",
    );

    let err = Config::from_file(&config_path).unwrap_err();
    assert_eq!(err.len(), 2);
    let message = err.cli_message();
    assert!(message.contains("ECLBASE"));
    assert!(message.contains("MAX_RUNNING"));
}

#[test]
fn hook_workflow_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "export.wfjob", "EXECUTABLE /bin/export\n");
    let flow = write(dir.path(), "nightly.wf", "export <CONFIG_FILE_BASE>.csv\n");
    let config_path = write(
        dir.path(),
        "study.vrd",
        &format!(
            "NUM_REALIZATIONS 1\n\
             LOAD_WORKFLOW_JOB export.wfjob export\n\
             LOAD_WORKFLOW {} nightly\n\
             HOOK_WORKFLOW nightly POST_SIMULATION\n",
            flow.display()
        ),
    );

    let config = Config::from_file(&config_path).unwrap();
    assert_eq!(
        config.hooked_workflows[&HookStage::PostSimulation],
        vec!["nightly"]
    );
    // Workflow arguments are expanded at load time.
    assert_eq!(config.workflows["nightly"].steps[0].args, vec!["study.csv"]);
}

#[test]
fn dangling_hook_is_a_hard_error() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = write(
        dir.path(),
        "study.vrd",
        "NUM_REALIZATIONS 1\nHOOK_WORKFLOW nonexistent PRE_SIMULATION\n",
    );

    let err = Config::from_file(&config_path).unwrap_err();
    assert!(err.cli_message().contains("nonexistent"));
}

#[test]
fn path_defaults_are_relative_to_config_dir() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = write(dir.path(), "study.vrd", "NUM_REALIZATIONS 1\n");

    let config = Config::from_file(&config_path).unwrap();
    assert_eq!(config.ens_path, dir.path().join("storage"));
    assert_eq!(config.runpath_file, dir.path().join(".runpath_list"));
    assert_eq!(
        config.substitution.get("<RUNPATH_FILE>"),
        Some(dir.path().join(".runpath_list").to_str().unwrap())
    );
}

#[test]
fn job_directory_installation_and_duplicate_warning() {
    let dir = tempfile::tempdir().unwrap();
    let jobs_dir = dir.path().join("jobs");
    fs::create_dir(&jobs_dir).unwrap();
    write(&jobs_dir, "copy", "EXECUTABLE /bin/cp\n");
    write(&jobs_dir, "move", "EXECUTABLE /bin/mv\n");
    write(dir.path(), "copy.job", "EXECUTABLE /usr/local/bin/cp\n");

    let config_path = write(
        dir.path(),
        "study.vrd",
        "NUM_REALIZATIONS 1\n\
         INSTALL_JOB_DIRECTORY jobs\n\
         INSTALL_JOB copy copy.job\n",
    );

    let config = Config::from_file(&config_path).unwrap();
    assert_eq!(config.jobs.len(), 2);
    // INSTALL_JOB declarations install before directory scans regardless
    // of textual order, so the directory entry lands last and wins, with
    // a duplicate warning.
    assert_eq!(config.jobs.get("copy").unwrap().executable, "/bin/cp");
    assert_eq!(config.warnings.len(), 1);
    assert!(config.warnings[0].message.contains("duplicate"));
}

#[test]
fn non_utf8_config_is_a_fatal_encoding_error() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("study.vrd");
    fs::write(&config_path, [b'N', b'U', b'M', 0xff, b'\n']).unwrap();

    let err = Config::from_file(&config_path).unwrap_err();
    assert_eq!(err.len(), 1);
    assert!(err.cli_message().contains("0xff"));
}
