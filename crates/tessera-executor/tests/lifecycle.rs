// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Prolog, InstantiateCommand and Epilog against a temporary job home.

use indexmap::IndexMap;
use serde_json::{Value as Json, json};
use std::fs;
use std::path::Path;
use tempfile::TempDir;
use tessera_executor::local::{JOB_INFO, JOB_INPUT};
use tessera_executor::{Action, ExecutorError, JobInfo, LocalJobMeta, Outcome, TaskExecutor};
use tessera_ir::{
    Attributes, InstanceType, InstanceTypeCatalog, Parameter, Requirement, Requirements, Task,
    Type,
};

fn catalog() -> InstanceTypeCatalog {
    let shape = |name: &str, memory_mb, cpu, price| InstanceType {
        name: name.to_string(),
        memory_mb,
        disk_gb: 50,
        cpu,
        gpu: false,
        price,
    };
    InstanceTypeCatalog::new(vec![
        shape("small", 2_048, 1, 0.1),
        shape("large", 32_768, 8, 0.8),
    ])
}

/// Counts the lines of `reads`, needing `memory`.
fn count_task(memory: Option<Requirement>) -> Task {
    let mut output_exprs = IndexMap::new();
    output_exprs.insert("n".to_string(), "read_int(stdout())".to_string());
    Task {
        name: "count".into(),
        language: "wdl,1.0".into(),
        inputs: vec![
            Parameter::new("reads", Type::File),
            Parameter::new("mem_gb", Type::optional(Type::Int)),
        ],
        outputs: vec![Parameter::new("n", Type::Int)],
        input_exprs: IndexMap::new(),
        output_exprs,
        command: "wc -l < {{ reads }}".into(),
        requirements: Requirements {
            memory,
            ..Default::default()
        },
        container: None,
        attributes: Attributes::default(),
        native: None,
    }
}

struct Job {
    home: TempDir,
    _data: TempDir,
}

impl Job {
    fn new(task: Task, instance_type: &str, extra_inputs: Json) -> Self {
        let home = tempfile::tempdir().unwrap();
        let data = tempfile::tempdir().unwrap();
        let reads = data.path().join("reads.txt");
        fs::write(&reads, "a\nb\nc\n").unwrap();

        let info = JobInfo {
            job_id: "job-parent".into(),
            instance_type: instance_type.into(),
            catalog: catalog(),
            task,
            type_aliases: IndexMap::new(),
        };
        fs::write(
            home.path().join(JOB_INFO),
            serde_json::to_string(&info).unwrap(),
        )
        .unwrap();

        let mut inputs = json!({"reads": {"$file": format!("file://{}", reads.display())}});
        if let (Some(map), Some(extra)) = (inputs.as_object_mut(), extra_inputs.as_object()) {
            map.extend(extra.clone());
        }
        fs::write(home.path().join(JOB_INPUT), inputs.to_string()).unwrap();
        Self { home, _data: data }
    }

    fn meta(&self) -> LocalJobMeta {
        LocalJobMeta::new(self.home.path())
    }

    fn path(&self, relative: &str) -> std::path::PathBuf {
        self.home.path().join(relative)
    }

    /// Stand in for running `meta/command.sh`.
    fn finish_command(&self, stdout: &str, rc: i32) {
        fs::write(self.path("meta/stdout"), stdout).unwrap();
        fs::write(self.path("meta/rc"), format!("{}\n", rc)).unwrap();
    }
}

#[test]
fn test_under_provisioned_instance_relaunches() {
    let job = Job::new(
        count_task(Some(Requirement::Const(json!("8 GiB")))),
        "small",
        json!({}),
    );
    let meta = job.meta();
    let executor = TaskExecutor::new(&meta);

    let outcome = executor.run(Action::Prolog).unwrap();
    let Outcome::Relaunched { child, .. } = &outcome else {
        panic!("expected a relaunch, got {:?}", outcome);
    };
    assert_eq!(outcome.to_string(), "success Prolog");
    assert_eq!(meta.children().unwrap(), vec![child.clone()]);

    let child_request: Json = serde_json::from_str(
        &fs::read_to_string(job.path(&format!("children/{}.json", child))).unwrap(),
    )
    .unwrap();
    assert_eq!(child_request["instanceType"], "large");
    assert!(child_request["input"]["reads"]["$file"].is_string());

    let outputs = meta.outputs().unwrap().unwrap();
    assert_eq!(outputs["n"], json!({"$jobLink": {"job": child, "field": "n"}}));

    // Later phases do nothing and no script is ever written.
    let outcome = executor.run(Action::InstantiateCommand).unwrap();
    assert!(outcome.is_relaunch());
    assert!(!job.path("meta/command.sh").exists());

    executor.run(Action::Prolog).unwrap();
    assert_eq!(meta.children().unwrap().len(), 1);
}

#[test]
fn test_sized_instance_writes_command() {
    let job = Job::new(
        count_task(Some(Requirement::Const(json!("1 GiB")))),
        "small",
        json!({}),
    );
    let meta = job.meta();
    let executor = TaskExecutor::new(&meta);

    assert_eq!(
        executor.run(Action::Prolog).unwrap(),
        Outcome::Done(Action::Prolog)
    );
    assert!(meta.children().unwrap().is_empty());
    assert!(job.path("inputs/0/reads.txt").is_file());

    let outcome = executor.run(Action::InstantiateCommand).unwrap();
    assert_eq!(outcome.to_string(), "success InstantiateCommand");
    let script = fs::read_to_string(job.path("meta/command.sh")).unwrap();
    assert!(!script.is_empty());
    let staged = job.path("inputs/0/reads.txt");
    assert!(script.contains(&format!("wc -l < {}", staged.display())));
    assert!(script.contains("/meta/rc"));

    use std::os::unix::fs::PermissionsExt;
    let mode = fs::metadata(job.path("meta/command.sh")).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o755);
}

#[test]
fn test_interrupted_relaunch_reuses_the_launched_child() {
    let job = Job::new(
        count_task(Some(Requirement::Const(json!("8 GiB")))),
        "small",
        json!({}),
    );
    // A previous Prolog launched a child and died before recording it.
    fs::create_dir_all(job.path("meta")).unwrap();
    fs::create_dir_all(job.path("children")).unwrap();
    fs::write(
        job.path("meta/relaunch_pending.json"),
        json!({"instanceType": "large"}).to_string(),
    )
    .unwrap();
    fs::write(
        job.path("children/job-earlier.json"),
        json!({"jobId": "job-earlier", "instanceType": "large", "input": {}}).to_string(),
    )
    .unwrap();

    let meta = job.meta();
    let outcome = TaskExecutor::new(&meta).run(Action::Prolog).unwrap();
    assert_eq!(
        outcome,
        Outcome::Relaunched {
            action: Action::Prolog,
            child: "job-earlier".into()
        }
    );
    assert_eq!(meta.children().unwrap(), vec!["job-earlier".to_string()]);
    assert!(!job.path("meta/relaunch_pending.json").exists());
    assert!(job.path("meta/relaunched.json").is_file());
    let outputs = meta.outputs().unwrap().unwrap();
    assert_eq!(outputs["n"], json!({"$jobLink": {"job": "job-earlier", "field": "n"}}));
}

#[test]
fn test_pending_relaunch_without_child_launches_once() {
    let job = Job::new(
        count_task(Some(Requirement::Const(json!("8 GiB")))),
        "small",
        json!({}),
    );
    fs::create_dir_all(job.path("meta")).unwrap();
    fs::write(
        job.path("meta/relaunch_pending.json"),
        json!({"instanceType": "large"}).to_string(),
    )
    .unwrap();

    let meta = job.meta();
    let executor = TaskExecutor::new(&meta);
    let outcome = executor.run(Action::Relaunch).unwrap();
    assert!(outcome.is_relaunch());
    executor.run(Action::Relaunch).unwrap();
    assert_eq!(meta.children().unwrap().len(), 1);
}

#[test]
fn test_deferred_defaults_run_in_dependency_order() {
    let extra = tempfile::tempdir().unwrap();
    let notes = extra.path().join("notes.txt");
    fs::write(&notes, "remember").unwrap();

    let mut task = count_task(None);
    task.inputs.extend([
        Parameter::new("path", Type::optional(Type::String)),
        Parameter::new("stem", Type::optional(Type::String)),
        Parameter::new("copy", Type::optional(Type::File)),
        Parameter::new("notes", Type::optional(Type::File)),
    ]);
    // Evaluation order: each default after the defaults it reads.
    task.input_exprs = IndexMap::from([
        ("stem".to_string(), "(\"run\" ~ \"_out\")".to_string()),
        ("path".to_string(), "(stem ~ \".txt\")".to_string()),
        ("copy".to_string(), "reads".to_string()),
        ("notes".to_string(), format!("\"{}\"", notes.display())),
    ]);
    task.command = "cat {{ notes }} {{ copy }} > {{ path }}".into();

    let job = Job::new(task, "small", json!({}));
    let meta = job.meta();
    let executor = TaskExecutor::new(&meta);
    executor.run(Action::Prolog).unwrap();
    executor.run(Action::InstantiateCommand).unwrap();

    let script = fs::read_to_string(job.path("meta/command.sh")).unwrap();
    let staged_notes = job.path("inputs/1/notes.txt");
    assert_eq!(fs::read_to_string(&staged_notes).unwrap(), "remember");
    assert!(!job.path("inputs/2").exists());
    let expected = format!(
        "cat {} {} > run_out.txt",
        staged_notes.display(),
        job.path("inputs/0/reads.txt").display()
    );
    assert!(script.contains(&expected), "script was {}", script);
}

#[test]
fn test_requirement_from_inputs() {
    let requirement = Some(Requirement::Expr("(mem_gb ~ \" GiB\")".into()));

    let job = Job::new(count_task(requirement.clone()), "small", json!({"mem_gb": 16}));
    let meta = job.meta();
    let outcome = TaskExecutor::new(&meta).run(Action::Prolog).unwrap();
    assert!(outcome.is_relaunch());

    let job = Job::new(count_task(requirement), "large", json!({"mem_gb": 16}));
    let meta = job.meta();
    let executor = TaskExecutor::new(&meta);
    assert!(!executor.run(Action::Prolog).unwrap().is_relaunch());
    assert_eq!(
        executor.run(Action::CheckInstanceType).unwrap(),
        Outcome::InstanceChecked { satisfied: true }
    );
}

#[test]
fn test_epilog_publishes_outputs() {
    let job = Job::new(count_task(None), "small", json!({}));
    let meta = job.meta();
    let executor = TaskExecutor::new(&meta);
    executor.run(Action::Prolog).unwrap();
    executor.run(Action::InstantiateCommand).unwrap();
    job.finish_command("3\n", 0);

    assert_eq!(
        executor.run(Action::Epilog).unwrap(),
        Outcome::Done(Action::Epilog)
    );
    assert_eq!(meta.outputs().unwrap().unwrap()["n"], json!(3));
}

#[test]
fn test_epilog_fails_on_non_zero_exit() {
    let job = Job::new(count_task(None), "small", json!({}));
    let meta = job.meta();
    let executor = TaskExecutor::new(&meta);
    executor.run(Action::Prolog).unwrap();
    executor.run(Action::InstantiateCommand).unwrap();
    fs::write(job.path("meta/stderr"), "wc: reads.txt: Permission denied\n").unwrap();
    job.finish_command("", 1);

    let err = executor.run(Action::Epilog).unwrap_err();
    assert_eq!(err.action(), Some(Action::Epilog));
    assert_eq!(err.error_code(), "RUNTIME_EXECUTION");
    assert!(err.to_string().contains("Permission denied"));
    assert!(meta.outputs().unwrap().is_none());
}

#[test]
fn test_file_outputs_are_uploaded() {
    let mut task = count_task(None);
    task.outputs = vec![
        Parameter::new("report", Type::File),
        Parameter::new("extra", Type::optional(Type::File)),
    ];
    task.output_exprs = IndexMap::from([
        ("report".to_string(), "\"report.txt\"".to_string()),
        ("extra".to_string(), "\"missing.txt\"".to_string()),
    ]);
    let job = Job::new(task, "small", json!({}));
    let meta = job.meta();
    let executor = TaskExecutor::new(&meta);
    executor.run(Action::Prolog).unwrap();
    fs::write(job.path("work/report.txt"), "done").unwrap();
    job.finish_command("", 0);

    executor.run(Action::Epilog).unwrap();
    let outputs = meta.outputs().unwrap().unwrap();
    let uri = outputs["report"]["$file"].as_str().unwrap();
    let uploaded = Path::new(uri.strip_prefix("file://").unwrap());
    assert_eq!(fs::read_to_string(uploaded).unwrap(), "done");
    assert_eq!(outputs["extra"], Json::Null);
}

#[test]
fn test_phase_errors() {
    let job = Job::new(count_task(None), "small", json!({}));
    let meta = job.meta();
    let executor = TaskExecutor::new(&meta);

    let err = executor.run(Action::Epilog).unwrap_err();
    assert!(matches!(
        err,
        ExecutorError::Phase { action: Action::Epilog, ref source }
            if matches!(**source, ExecutorError::MissingState(_))
    ));

    fs::write(job.path(JOB_INPUT), "{}").unwrap();
    let err = executor.run(Action::Prolog).unwrap_err();
    assert_eq!(err.error_code(), "MISSING_INPUT");
}
