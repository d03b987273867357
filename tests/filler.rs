use arrow::array::{ArrayRef, Float32Array, Int32Array};
use entrytree::registry::{CHANNEL_INDEX_FIELD_ID, ONES_FIELD_ID};
use entrytree::testing::{record_batch, sample_hits_batch, sample_hits_with_label};
use entrytree::*;
use std::sync::Arc;

fn hits_options() -> FillerOptions {
    FillerOptions {
        group_name: "hits".into(),
        trigger_field: Some("event_id".into()),
        ..FillerOptions::default()
    }
}

fn fill_memory(
    batch: arrow::record_batch::RecordBatch,
    options: FillerOptions,
    max_rows: Option<usize>,
) -> Result<(FillReport, MemoryContainerSink, Configuration)> {
    let mut registry = Configuration::new();
    let mut sink = MemoryContainerSink::new();
    let report =
        ContainerFiller::new(BatchSource::new(batch), &mut sink, options).fill(&mut registry, max_rows)?;
    Ok((report, sink, registry))
}

#[test]
fn trigger_groups_rows_into_entries() -> anyhow::Result<()> {
    let (report, sink, _) = fill_memory(sample_hits_batch(), hits_options(), None)?;

    assert_eq!(sink.entry_sizes(), vec![2, 3, 1]);
    assert_eq!(
        report,
        FillReport {
            group: "hits".into(),
            rows: 6,
            entries: 3,
            channels: 6,
        }
    );
    assert!(sink.finished);
    Ok(())
}

#[test]
fn channel_values_follow_field_ids() -> anyhow::Result<()> {
    let (_, sink, registry) = fill_memory(sample_hits_batch(), hits_options(), None)?;
    let group = registry.require_group("hits")?;
    let energy = group.field_id("energy")?;
    let adc = group.field_id("adc")?;
    let plane = group.field_id("plane")?;
    let saturated = group.field_id("saturated")?;

    let second = &sink.entries[1];
    let ch = &second.channels()[2];
    assert_eq!(ch.value(energy), -1.0);
    assert_eq!(ch.value(adc), 500.0);
    assert_eq!(ch.value(saturated), 1.0);
    // Int8 flags read back as 0 or 1
    assert_eq!(ch.value(plane), 1.0);
    assert_eq!(ch.value(ONES_FIELD_ID), 1.0);
    assert_eq!(ch.value(CHANNEL_INDEX_FIELD_ID), 2.0);
    Ok(())
}

#[test]
fn rows_per_entry_without_trigger() -> anyhow::Result<()> {
    let options = FillerOptions {
        rows_per_entry: Some(4),
        ..FillerOptions::default()
    };
    let (report, sink, registry) = fill_memory(sample_hits_batch(), options, None)?;
    assert_eq!(sink.entry_sizes(), vec![4, 2]);
    assert_eq!(report.group, "records");
    assert!(registry.group("records").is_some());
    Ok(())
}

#[test]
fn trigger_and_rows_per_entry_combine() -> anyhow::Result<()> {
    let options = FillerOptions {
        rows_per_entry: Some(2),
        ..hits_options()
    };
    let (_, sink, _) = fill_memory(sample_hits_batch(), options, None)?;
    assert_eq!(sink.entry_sizes(), vec![2, 2, 1, 1]);
    Ok(())
}

#[test]
fn without_any_rule_the_stream_is_one_entry() -> anyhow::Result<()> {
    let (report, sink, _) = fill_memory(sample_hits_batch(), FillerOptions::default(), None)?;
    assert_eq!(sink.entry_sizes(), vec![6]);
    assert_eq!(report.entries, 1);
    assert_eq!(report.channels, 6);
    Ok(())
}

#[test]
fn empty_trigger_name_means_no_trigger() -> anyhow::Result<()> {
    let options = FillerOptions {
        trigger_field: Some(String::new()),
        rows_per_entry: Some(3),
        ..FillerOptions::default()
    };
    let (_, sink, _) = fill_memory(sample_hits_batch(), options, None)?;
    assert_eq!(sink.entry_sizes(), vec![3, 3]);
    Ok(())
}

#[test]
fn max_rows_limits_the_run() -> anyhow::Result<()> {
    let (report, sink, _) = fill_memory(sample_hits_batch(), hits_options(), Some(4))?;
    assert_eq!(sink.entry_sizes(), vec![2, 2]);
    assert_eq!(report.rows, 4);

    let (report, _, _) = fill_memory(sample_hits_batch(), hits_options(), Some(100))?;
    assert_eq!(report.rows, 6);
    Ok(())
}

#[test]
fn empty_input_commits_one_empty_entry() -> anyhow::Result<()> {
    let batch = record_batch(vec![
        ("event_id", Arc::new(Int32Array::from(Vec::<i32>::new())) as ArrayRef),
        ("energy", Arc::new(Float32Array::from(Vec::<f32>::new())) as ArrayRef),
    ])?;
    let (report, sink, _) = fill_memory(batch, hits_options(), None)?;
    assert_eq!(report.entries, 1);
    assert_eq!(report.channels, 0);
    assert_eq!(sink.entry_sizes(), vec![0]);
    Ok(())
}

#[test]
fn trigger_value_is_truncated() -> anyhow::Result<()> {
    let batch = record_batch(vec![(
        "t",
        Arc::new(Float32Array::from(vec![1.2, 1.9, 2.1, -0.5, 0.4])) as ArrayRef,
    )])?;
    let options = FillerOptions {
        trigger_field: Some("t".into()),
        ..FillerOptions::default()
    };
    let (_, sink, _) = fill_memory(batch, options, None)?;
    assert_eq!(sink.entry_sizes(), vec![2, 1, 2]);
    Ok(())
}

#[test]
fn exec_threads_the_trigger_value() -> anyhow::Result<()> {
    let mut registry = Configuration::new();
    let mut sink = MemoryContainerSink::new();
    let mut session = ContainerFiller::new(BatchSource::new(sample_hits_batch()), &mut sink, hits_options())
        .init(&mut registry)?;
    assert_eq!(session.state(), FillerState::Ready);

    let previous = session.exec(0, UNSET_TRIGGER)?;
    assert_eq!(previous, 5);
    assert_eq!(session.state(), FillerState::Running);
    let previous = session.exec(1, previous)?;
    assert_eq!(session.current_entry().len(), 2);
    let previous = session.exec(2, previous)?;
    assert_eq!(previous, 7);
    assert_eq!(session.current_entry().len(), 1);

    let report = session.finish()?;
    assert_eq!(report.entries, 1);
    assert_eq!(sink.entry_sizes(), vec![2]);
    Ok(())
}

#[test]
fn missing_trigger_field_is_a_lookup_error() -> anyhow::Result<()> {
    let options = FillerOptions {
        trigger_field: Some("evt".into()),
        ..FillerOptions::default()
    };
    let err = fill_memory(sample_hits_batch(), options, None).err();
    match err {
        Some(FillError::Lookup { name, .. }) => assert_eq!(name, "evt"),
        other => anyhow::bail!("expected lookup error, got {other:?}"),
    }

    // An ignored trigger is not retained either.
    let options = FillerOptions {
        fields_to_ignore: ["event_id".to_string()].into(),
        ..hits_options()
    };
    let err = fill_memory(sample_hits_batch(), options, None).err();
    assert!(matches!(err, Some(FillError::Lookup { .. })));
    Ok(())
}

#[test]
fn unsupported_retained_field_is_a_type_error() -> anyhow::Result<()> {
    let err = fill_memory(sample_hits_with_label(), hits_options(), None).err();
    match err {
        Some(FillError::Type { field, type_name }) => {
            assert_eq!(field, "label");
            assert_eq!(type_name, "Utf8");
        }
        other => anyhow::bail!("expected type error, got {other:?}"),
    }

    let options = FillerOptions {
        fields_to_ignore: ["label".to_string()].into(),
        ..hits_options()
    };
    let (report, _, _) = fill_memory(sample_hits_with_label(), options, None)?;
    assert_eq!(report.entries, 3);

    let options = FillerOptions {
        fields_to_preserve: ["event_id".to_string(), "energy".to_string()].into(),
        ..hits_options()
    };
    let (_, sink, registry) = fill_memory(sample_hits_with_label(), options, None)?;
    assert_eq!(registry.require_group("hits")?.width(), 2);
    assert_eq!(sink.entry_sizes(), vec![2, 3, 1]);
    Ok(())
}

#[test]
fn invalid_options_are_configuration_errors() {
    let options = FillerOptions {
        fields_to_ignore: ["adc".to_string()].into(),
        fields_to_preserve: ["energy".to_string()].into(),
        ..FillerOptions::default()
    };
    let err = fill_memory(sample_hits_batch(), options, None).err();
    assert!(matches!(err, Some(FillError::Configuration(_))));

    let options = FillerOptions {
        rows_per_entry: Some(0),
        ..FillerOptions::default()
    };
    let err = fill_memory(sample_hits_batch(), options, None).err();
    assert!(matches!(err, Some(FillError::Configuration(_))));
}

#[test]
fn failed_init_leaves_registry_untouched() {
    let mut registry = Configuration::new();
    let mut sink = MemoryContainerSink::new();
    let result = ContainerFiller::new(BatchSource::new(sample_hits_with_label()), &mut sink, hits_options())
        .init(&mut registry);
    assert!(matches!(result, Err(FillError::Type { .. })));
    assert_eq!(registry.groups().count(), 0);
    assert!(sink.group.is_none());
}

#[test]
fn two_fillers_share_one_registry() -> anyhow::Result<()> {
    let mut registry = Configuration::new();
    let mut hits = MemoryContainerSink::new();
    let mut tracks = MemoryContainerSink::new();

    let first = ContainerFiller::new(BatchSource::new(sample_hits_batch()), &mut hits, hits_options())
        .init(&mut registry)?;
    let options = FillerOptions {
        group_name: "tracks".into(),
        fields_to_preserve: ["energy".to_string()].into(),
        ..FillerOptions::default()
    };
    let second = ContainerFiller::new(BatchSource::new(sample_hits_batch()), &mut tracks, options)
        .init(&mut registry)?;
    registry.freeze();

    first.run(None)?;
    second.run(None)?;

    assert_eq!(registry.require_group("hits")?.id(), 0);
    assert_eq!(registry.require_group("tracks")?.id(), 1);
    assert_eq!(hits.entry_sizes(), vec![2, 3, 1]);
    assert_eq!(tracks.entry_sizes(), vec![6]);

    // Sealed: a third filler cannot register.
    let mut other = MemoryContainerSink::new();
    let options = FillerOptions {
        group_name: "late".into(),
        ..FillerOptions::default()
    };
    let err = ContainerFiller::new(BatchSource::new(sample_hits_batch()), &mut other, options)
        .fill(&mut registry, None)
        .err();
    assert!(matches!(err, Some(FillError::Configuration(_))));
    Ok(())
}

#[test]
fn duplicate_group_name_is_rejected() -> anyhow::Result<()> {
    let mut registry = Configuration::new();
    let mut sink = MemoryContainerSink::new();
    ContainerFiller::new(BatchSource::new(sample_hits_batch()), &mut sink, hits_options())
        .fill(&mut registry, None)?;
    let mut again = MemoryContainerSink::new();
    let err = ContainerFiller::new(BatchSource::new(sample_hits_batch()), &mut again, hits_options())
        .fill(&mut registry, None)
        .err();
    assert!(matches!(err, Some(FillError::Configuration(_))));
    Ok(())
}

#[test]
fn missing_input_file_is_an_io_error() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let err = BatchSource::open_parquet(tmp.path().join("absent.parquet")).err();
    assert!(matches!(err, Some(FillError::Io { .. })));
    Ok(())
}
