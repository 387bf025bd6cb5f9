//! End-to-end reconciliation over a real output directory, without engines.

use prasc_core::{
    Delimiter, FieldMap, OutputFiles, PrascConfig, PriorSource, QuestionScorer, StimuliLocation,
    TableIo, combine_files, files_needing_work, load_questions_prior, merge,
};
use prasc_proto::question::{questions_table, summaries_table};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const CONFIG_JSON: &str = r#"{
    "wide_format": false,
    "trial_output": {"filename": {"header": "subject"}},
    "region_output": {
        "filename": {"header": "file"},
        "item_id": {"header": "item"},
        "item_condition": {"header": "condition"},
        "region": {"header": "region"}
    }
}"#;

fn write_recording(dir: &Path, name: &str, response: &str) -> PathBuf {
    let path = dir.join(name);
    let log = format!(
        "** CONVERTED FROM EDF\nMSG 100 TRIALID E1I3D0\nEFIX R 120 300 180\nMSG 150 QUESTION_ANSWER A\nMSG 400 TRIAL_RESULT {response}\n"
    );
    std::fs::write(&path, log).unwrap();
    path
}

fn setup() -> (TempDir, PrascConfig, FieldMap) {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("config.json"), CONFIG_JSON).unwrap();
    std::fs::write(
        dir.path().join("prasc.yml"),
        "asc_files_dir: recordings\nconfig_json_loc: config\noutput_dir: out\nfile_encoding: utf-8\n",
    )
    .unwrap();
    std::fs::create_dir_all(dir.path().join("recordings")).unwrap();
    std::fs::create_dir_all(dir.path().join("out")).unwrap();

    let mut config = PrascConfig::from_file(dir.path().join("prasc.yml")).unwrap();
    config.normalize();
    config.validate().unwrap();
    let fields = FieldMap::load(config.column_config_path()).unwrap();
    (dir, config, fields)
}

#[test]
fn question_results_accumulate_across_runs() {
    let (dir, config, fields) = setup();
    let io = TableIo::new(config.file_encoding);
    let files = OutputFiles::new(config.output_dir());
    let scorer = QuestionScorer::new(config.start_flag, config.file_encoding);
    let rec_dir = config.asc_dir();

    let first = vec![write_recording(&rec_dir, "s1_fa.asc", "A")];
    let scores = scorer.score_all(&first).unwrap();
    io.write(
        &files.questions(),
        &questions_table(&scores.records, "subject", "item").unwrap(),
        Delimiter::Space,
    )
    .unwrap();
    io.write(
        &files.summary(),
        &summaries_table(&scores.summaries, "subject").unwrap(),
        Delimiter::Space,
    )
    .unwrap();

    let second = write_recording(&rec_dir, "s2_fa.asc", "B");
    let all = vec![first[0].clone(), second.clone()];
    let prior = load_questions_prior(&io, &files, &fields).unwrap();
    assert_eq!(prior.source, PriorSource::StageFiles);

    let work = files_needing_work(&all, Some(&prior), &fields, false);
    assert_eq!(work.pending, vec![second]);

    let scores = scorer.score_all(&work.pending).unwrap();
    let incoming = summaries_table(&scores.summaries, "subject").unwrap();
    let merged = merge(&prior.summary, &incoming, "subject").unwrap();
    assert_eq!(merged.len(), 2);
    assert_eq!(merged.rows()[1][3], "0.0");

    // merging the same batch again changes nothing
    assert_eq!(merge(&merged, &incoming, "subject").unwrap(), merged);
    drop(dir);
}

#[test]
fn combine_joins_aliased_stimuli_and_cleans_up() {
    let (dir, config, fields) = setup();
    let io = TableIo::new(config.file_encoding);
    let files = OutputFiles::new(config.output_dir());

    std::fs::write(
        files.results(),
        "subject,item,condition,region,first_fixation\nrecordings/s1_fa.asc,3,1,1,180\nrecordings/s1_fa.asc,3,1,2,NA\n",
    )
    .unwrap();
    std::fs::write(
        files.questions(),
        "subject question_type item correct_answer response was_response_correct response_RT\n\"C:\\data\\s1_fa.asc\" 1 3 A A TRUE 300\n",
    )
    .unwrap();
    std::fs::write(
        files.summary(),
        "subject s_number_questions s_num_correct_answers s_total_prop_correct\n\"C:\\data\\s1_fa.asc\" 1 1 1.0\n",
    )
    .unwrap();
    std::fs::write(
        dir.path().join("Exp-formatted.csv"),
        "item_id,item_condition,sentence\n3,1,\"The horse raced past the barn, fell.\"\n",
    )
    .unwrap();

    let StimuliLocation::Found(stimuli) = config.stimuli_location() else {
        panic!("stimuli file not discovered");
    };
    let report = combine_files(&io, &files, &fields, Some(&stimuli), false).unwrap();
    assert!(report.skipped.is_empty(), "{:?}", report.skipped);
    assert_eq!(report.rows, 2);
    assert_eq!(report.deleted.len(), 3);

    let combined = io.read(&files.combined(), Delimiter::Comma).unwrap();
    assert_eq!(
        &combined.headers()[..5],
        ["subject", "item", "condition", "region", "first_fixation"]
    );
    let sentence = combined.column_index("sentence").unwrap();
    assert_eq!(combined.rows()[0][sentence], "The horse raced past the barn, fell.");
    // the only question was a filler, so question columns are padded
    let rt = combined.column_index("response_RT").unwrap();
    assert_eq!(combined.rows()[0][rt], "NA");
    // the summary still joins on the recording
    let summary = combined.column_index("s_number_questions").unwrap();
    assert_eq!(combined.rows()[0][summary], "1");
    assert_eq!(combined.rows()[1][summary], "1");
}
