//! End-to-end tests for the reelflow pipeline engine.
//!
//! Each test runs a full pipeline on the dry-run engine: parse JSON ->
//! validate -> schedule -> archive -> inspect the report and events.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use reelflow_media::DryRunEngine;
use reelflow_pipeline::{
    PipelineConfig, PipelineDefinition, PipelineEvent, PipelineExecutor, Runtime,
};
use reelflow_types::{ReelflowError, StepStatus};
use tempfile::TempDir;
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct Fixture {
    dir: TempDir,
    engine: Arc<DryRunEngine>,
    executor: PipelineExecutor,
}

impl Fixture {
    fn new(inputs: &[&str], engine: DryRunEngine) -> Self {
        let dir = TempDir::new().unwrap();
        let config = PipelineConfig {
            workspace_dir: dir.path().join("workspace"),
            input_dir: dir.path().join("input"),
            output_dir: dir.path().join("output"),
            ..Default::default()
        };
        std::fs::create_dir_all(&config.input_dir).unwrap();
        for name in inputs {
            std::fs::write(config.input_dir.join(name), b"media").unwrap();
        }
        let engine = Arc::new(engine);
        let executor = PipelineExecutor::new(Runtime::new(config, engine.clone()));
        Self {
            dir,
            engine,
            executor,
        }
    }

    fn output_dir(&self) -> PathBuf {
        self.dir.path().join("output")
    }

    fn events(&self) -> broadcast::Receiver<PipelineEvent> {
        self.executor.runtime().events().subscribe()
    }
}

fn pipeline(json: &str) -> PipelineDefinition {
    PipelineDefinition::from_json(json).expect("pipeline JSON should parse")
}

fn file_name(path: &Path) -> String {
    path.file_name().unwrap().to_string_lossy().into_owned()
}

fn drain(rx: &mut broadcast::Receiver<PipelineEvent>) -> Vec<PipelineEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

// ---------------------------------------------------------------------------
// Chained steps
// ---------------------------------------------------------------------------

#[tokio::test]
async fn output_of_one_step_feeds_the_next() {
    let fx = Fixture::new(&["clip.mp4"], DryRunEngine::new());
    let def = pipeline(
        r#"{"name": "chain", "steps": [
            {"id": 2, "type": "instruction", "name": "speed",
             "args": {"input": ["@step-1:output"], "multiplier": 2}, "archive": {}},
            {"id": 1, "type": "instruction", "name": "segment",
             "args": {"input": ["clip.mp4"], "startTime": 3, "duration": 10}}
        ]}"#,
    );

    let report = fx.executor.run(&def).await.expect("pipeline should succeed");

    assert_eq!(report.step(1).unwrap().status, StepStatus::Ended);
    assert_eq!(report.step(2).unwrap().status, StepStatus::Ended);
    let archived: Vec<_> = report.archived.iter().map(|p| file_name(p)).collect();
    assert_eq!(archived, vec!["2-speed-output.mp4"]);
    assert!(fx.output_dir().join("2-speed-output.mp4").is_file());

    let jobs = fx.engine.jobs();
    assert_eq!(jobs.len(), 2);
    assert_eq!(file_name(&jobs[0].inputs[0]), "clip.mp4");
    assert_eq!(file_name(&jobs[1].inputs[0]), "1-segment-output.mp4");
}

#[tokio::test]
async fn statuses_advance_one_stage_at_a_time() {
    let fx = Fixture::new(&["clip.mp4"], DryRunEngine::new());
    let mut rx = fx.events();
    // Step 2 is declared first so its order cannot follow declaration order.
    let def = pipeline(
        r#"{"steps": [
            {"id": 2, "type": "instruction", "name": "framerate", "args": {"input": ["@step-1:output"], "ips": 12}},
            {"id": 1, "type": "instruction", "name": "framerate", "args": {"input": ["clip.mp4"], "ips": 25}}
        ]}"#,
    );
    let report = fx.executor.run(&def).await.unwrap();

    let mut order: Vec<(u32, StepStatus)> = Vec::new();
    let mut seen: HashMap<u32, Vec<StepStatus>> = HashMap::new();
    for event in drain(&mut rx) {
        if let PipelineEvent::StepStatusChanged { step_id, status } = event {
            order.push((step_id, status));
            seen.entry(step_id).or_default().push(status);
        }
    }

    let expected = vec![StepStatus::Resolved, StepStatus::Processing, StepStatus::Ended];
    assert_eq!(seen[&1], expected);
    assert_eq!(seen[&2], expected);

    let position = |entry: (u32, StepStatus)| order.iter().position(|e| *e == entry).unwrap();
    assert!(
        position((1, StepStatus::Ended)) < position((2, StepStatus::Resolved)),
        "{order:?}"
    );
    assert!(
        position((1, StepStatus::Ended)) < position((2, StepStatus::Processing)),
        "{order:?}"
    );

    // Step 2 consumed exactly what step 1 reported.
    let step1_outputs: Vec<String> = report
        .step(1)
        .unwrap()
        .outputs
        .iter()
        .map(|p| file_name(p))
        .collect();
    let jobs = fx.engine.jobs();
    assert_eq!(jobs.len(), 2);
    let step2_inputs: Vec<String> = jobs[1].inputs.iter().map(|p| file_name(p)).collect();
    assert_eq!(step2_inputs, step1_outputs);
    assert_eq!(step2_inputs, vec!["1-framerate-output.mp4"]);
}

// ---------------------------------------------------------------------------
// Foreach
// ---------------------------------------------------------------------------

#[tokio::test]
async fn foreach_runs_body_once_per_item() {
    let fx = Fixture::new(&["a.mp4", "b.mp4", "c.mp4", "song.mp3"], DryRunEngine::new());
    let mut rx = fx.events();
    let def = pipeline(
        r#"{"steps": [
            {"id": 1, "type": "statement", "name": "foreach", "args": {
                "input": ["@resources:videos"],
                "steps": [
                    {"id": 1, "type": "instruction", "name": "resize",
                     "args": {"input": ["@parent:item"], "width": 640, "height": 360}}
                ]
            }}
        ]}"#,
    );

    let report = fx.executor.run(&def).await.unwrap();
    assert_eq!(report.step(1).unwrap().status, StepStatus::Ended);

    let items: Vec<(usize, String)> = drain(&mut rx)
        .into_iter()
        .filter_map(|e| match e {
            PipelineEvent::LoopIteration { index, item, .. } => Some((index, file_name(&item))),
            _ => None,
        })
        .collect();
    assert_eq!(
        items,
        vec![(0, "a.mp4".into()), (1, "b.mp4".into()), (2, "c.mp4".into())]
    );

    // Each iteration only saw its own item.
    let inputs: Vec<Vec<String>> = fx
        .engine
        .jobs()
        .iter()
        .map(|j| j.inputs.iter().map(|p| file_name(p)).collect())
        .collect();
    assert_eq!(inputs, vec![vec!["a.mp4"], vec!["b.mp4"], vec!["c.mp4"]]);
}

#[tokio::test]
async fn foreach_body_starts_each_iteration_with_empty_dirs() {
    let fx = Fixture::new(
        &["a.mp4", "b.mp4", "c.mp4"],
        DryRunEngine::new().with_scratch_files(),
    );
    let def = pipeline(
        r#"{"steps": [
            {"id": 1, "type": "statement", "name": "foreach", "args": {
                "input": ["@resources:videos"],
                "steps": [
                    {"id": 1, "type": "instruction", "name": "framerate",
                     "args": {"input": ["@parent:item"], "ips": 24}}
                ]
            }}
        ]}"#,
    );

    fx.executor.run(&def).await.unwrap();
    assert_eq!(fx.engine.jobs().len(), 3);

    // Only the last iteration's files survive in the nested step's folders.
    let nested = fx.dir.path().join("workspace/step-1/step-1");
    let mut outputs: Vec<String> = std::fs::read_dir(nested.join("output"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    outputs.sort();
    assert_eq!(outputs, vec!["1-framerate-output.mp4", "scratch-3.tmp"]);

    let inputs: Vec<String> = std::fs::read_dir(nested.join("input"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(inputs, vec!["c.mp4"]);
}

#[tokio::test]
async fn nested_steps_deliver_into_processing_parent() {
    let fx = Fixture::new(&["a.mp4", "b.mp4"], DryRunEngine::new());
    let mut rx = fx.events();
    let def = pipeline(
        r#"{"steps": [
            {"id": 5, "type": "statement", "name": "foreach",
             "args": {
                "input": ["@resources:mp4"],
                "steps": [
                    {"id": 1, "type": "instruction", "name": "speed",
                     "args": {"input": ["@parent:item"], "multiplier": 0.5},
                     "archive": {"target": "@parent"}}
                ]
             },
             "archive": {"filter": "videos"}}
        ]}"#,
    );

    let report = fx.executor.run(&def).await.unwrap();

    let foreach = report.step(5).unwrap();
    let outputs: Vec<_> = foreach.outputs.iter().map(|p| file_name(p)).collect();
    assert_eq!(outputs, vec!["5-loop-output-1.mp4", "5-loop-output-2.mp4"]);
    assert_eq!(report.archived.len(), 2);
    assert!(fx.output_dir().join("5-loop-output-2.mp4").is_file());

    let forwarded = drain(&mut rx)
        .into_iter()
        .filter(|e| matches!(e, PipelineEvent::FilesForwarded { to_step: 5, .. }))
        .count();
    assert_eq!(forwarded, 2);
}

// ---------------------------------------------------------------------------
// Resources
// ---------------------------------------------------------------------------

#[tokio::test]
async fn resources_filtered_by_duration() {
    let engine = DryRunEngine::new()
        .with_duration("long.mp4", 95.0)
        .with_duration("short.mp4", 12.0)
        .with_duration("intro-long.mov", 300.0);
    let fx = Fixture::new(&["long.mp4", "short.mp4", "intro-long.mov", "song.mp3"], engine);
    let def = pipeline(
        r#"{"steps": [
            {"id": 1, "type": "statement", "name": "foreach", "args": {
                "input": ["@resources:videos:duration>60:endwith=long"],
                "steps": [
                    {"id": 2, "type": "instruction", "name": "framerate",
                     "args": {"input": ["@parent:item"], "ips": 24}, "archive": {}}
                ]
            }}
        ]}"#,
    );

    let report = fx.executor.run(&def).await.unwrap();

    let inputs: Vec<String> = fx
        .engine
        .jobs()
        .iter()
        .map(|j| file_name(&j.inputs[0]))
        .collect();
    assert_eq!(inputs, vec!["intro-long.mov", "long.mp4"]);
    assert_eq!(report.archived.len(), 2);
    let names: Vec<_> = report.archived.iter().map(|p| file_name(p)).collect();
    assert_eq!(names, vec!["2-framerate-output.mp4", "2-framerate-output-1.mp4"]);
}

#[tokio::test]
async fn archive_filter_drops_other_kinds() {
    let fx = Fixture::new(&["clip.mp4"], DryRunEngine::new().with_default_duration(10.0));
    let def = pipeline(
        r#"{"steps": [
            {"id": 1, "type": "instruction", "name": "split",
             "args": {"input": ["clip.mp4"], "nbSegments": 2}, "archive": {"filter": "audios"}}
        ]}"#,
    );

    let report = fx.executor.run(&def).await.unwrap();
    assert_eq!(report.step(1).unwrap().outputs.len(), 2);
    assert!(report.archived.is_empty());
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn duplicate_ids_rejected_before_running() {
    let fx = Fixture::new(&["clip.mp4"], DryRunEngine::new());
    let def = pipeline(
        r#"{"steps": [
            {"id": 1, "type": "instruction", "name": "framerate", "args": {"input": ["clip.mp4"], "ips": 25}},
            {"id": 1, "type": "instruction", "name": "framerate", "args": {"input": ["clip.mp4"], "ips": 30}}
        ]}"#,
    );

    let err = fx.executor.run(&def).await.unwrap_err();
    match err {
        ReelflowError::ValidationError(msg) => assert!(msg.contains("Step id 1"), "{msg}"),
        other => panic!("expected a validation error, got {other}"),
    }
    assert!(fx.engine.jobs().is_empty());
}

#[tokio::test]
async fn missing_step_reference_is_a_definition_error() {
    let fx = Fixture::new(&["clip.mp4"], DryRunEngine::new());
    let def = pipeline(
        r#"{"steps": [
            {"id": 1, "type": "instruction", "name": "framerate", "args": {"input": ["@step-3:output"], "ips": 25}}
        ]}"#,
    );

    let err = fx.executor.run(&def).await.unwrap_err();
    assert!(err.is_definition_error());
    assert!(err.to_string().contains("step 3"), "{err}");
}

#[tokio::test]
async fn failing_step_fails_the_run_and_its_dependents() {
    let fx = Fixture::new(&["clip.mp4"], DryRunEngine::new().failing_on("segment"));
    let mut rx = fx.events();
    let def = pipeline(
        r#"{"steps": [
            {"id": 1, "type": "instruction", "name": "segment", "args": {"input": ["clip.mp4"], "startTime": 0}},
            {"id": 2, "type": "instruction", "name": "framerate", "args": {"input": ["@step-1:output"], "ips": 25},
             "archive": {}}
        ]}"#,
    );

    assert!(fx.executor.run(&def).await.is_err());

    let events = drain(&mut rx);
    let failed: Vec<(u32, String)> = events
        .iter()
        .filter_map(|e| match e {
            PipelineEvent::StepFailed { step_id, error } => Some((*step_id, error.clone())),
            _ => None,
        })
        .collect();
    assert!(failed
        .iter()
        .any(|(id, err)| *id == 1 && err.contains("simulated failure")));
    assert!(failed.iter().any(|(id, _)| *id == 2));
    assert!(events
        .iter()
        .any(|e| matches!(e, PipelineEvent::PipelineFailed { .. })));
    assert!(!events
        .iter()
        .any(|e| matches!(e, PipelineEvent::FilesArchived { .. })));
    assert!(!fx.output_dir().join("2-framerate-output.mp4").exists());
}
