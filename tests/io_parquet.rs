use arrow::array::{Array, ArrayRef, AsArray, Float32Array, Int32Array};
use arrow::datatypes::{DataType, Float32Type, Int32Type};
use entrytree::io::parquet::{CHANNELS_COLUMN, read_table_manifest};
use entrytree::testing::{TempDirPath, record_batch, sample_hits_batch, write_parquet_batch};
use entrytree::*;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use std::fs::File;
use std::sync::Arc;

fn hits_options() -> FillerOptions {
    FillerOptions {
        group_name: "hits".into(),
        trigger_field: Some("event_id".into()),
        ..FillerOptions::default()
    }
}

#[test]
fn container_round_trip() -> anyhow::Result<()> {
    let dir = TempDirPath::new()?;
    let input = dir.file("raw/hits.parquet");
    let output = dir.file("out/entries.parquet");
    write_parquet_batch(&input, &sample_hits_batch())?;

    let mut registry = Configuration::new();
    let writer = ParquetContainerWriter::new(&output).with_batch_rows(1);
    let report = ContainerFiller::new(BatchSource::open_parquet(&input)?, writer, hits_options())
        .fill(&mut registry, None)?;
    assert_eq!(report.entries, 3);

    let mut memory = MemoryContainerSink::new();
    ContainerFiller::new(BatchSource::new(sample_hits_batch()), &mut memory, hits_options())
        .fill(&mut Configuration::new(), None)?;

    let reader = ContainerReader::open(&output)?;
    assert_eq!(reader.configuration(), &registry);
    assert_eq!(reader.group().name(), "hits");
    let entries = reader.read_all()?;
    assert_eq!(entries, memory.entries);
    Ok(())
}

#[test]
fn container_columns_are_lists_per_field() -> anyhow::Result<()> {
    let dir = TempDirPath::new()?;
    let output = dir.file("entries.parquet");
    let mut registry = Configuration::new();
    ContainerFiller::new(
        BatchSource::new(sample_hits_batch()),
        ParquetContainerWriter::new(&output),
        hits_options(),
    )
    .fill(&mut registry, None)?;

    let builder = ParquetRecordBatchReaderBuilder::try_new(File::open(&output)?)?;
    let schema = builder.schema().clone();
    let names: Vec<&str> = schema.fields().iter().map(|f| f.name().as_str()).collect();
    assert_eq!(
        names,
        [CHANNELS_COLUMN, "event_id", "energy", "adc", "saturated", "plane"]
    );
    assert!(matches!(schema.field(2).data_type(), DataType::List(item) if item.data_type() == &DataType::Float32));
    assert!(matches!(schema.field(1).data_type(), DataType::List(item) if item.data_type() == &DataType::Int32));

    let batch = builder.build()?.next().transpose()?.ok_or_else(|| anyhow::anyhow!("no batch"))?;
    assert_eq!(batch.num_rows(), 3);
    let sizes = batch.column(0).as_primitive::<arrow::datatypes::UInt32Type>();
    assert_eq!(sizes.values().to_vec(), vec![2, 3, 1]);
    let energy = batch.column(2).as_list::<i32>().value(1);
    let energy = energy.as_primitive::<Float32Type>();
    assert_eq!(energy.len(), 3);
    assert_eq!(energy.value(0), 0.25);
    Ok(())
}

#[test]
fn empty_input_round_trips_as_one_empty_entry() -> anyhow::Result<()> {
    let dir = TempDirPath::new()?;
    let output = dir.file("entries.parquet");
    let empty = sample_hits_batch().slice(0, 0);
    ContainerFiller::new(
        BatchSource::new(empty),
        ParquetContainerWriter::new(&output),
        hits_options(),
    )
    .fill(&mut Configuration::new(), None)?;

    let entries = ContainerReader::open(&output)?.read_all()?;
    assert_eq!(entries.len(), 1);
    assert!(entries[0].is_empty());
    Ok(())
}

#[test]
fn flatten_writes_typed_table_with_manifest() -> anyhow::Result<()> {
    let dir = TempDirPath::new()?;
    let container = dir.file("entries.parquet");
    let table = dir.file("flat.parquet");
    ContainerFiller::new(
        BatchSource::new(sample_hits_batch()),
        ParquetContainerWriter::new(&container),
        hits_options(),
    )
    .fill(&mut Configuration::new(), None)?;

    let projection = FieldProjection::default()
        .add_group("hits")
        .preserve(["event_id", "energy", "channel_index"])
        .rename("event_id", "event")
        .prepend_group_name(true);
    let report = flatten(
        ContainerReader::open(&container)?,
        projection,
        ParquetTableWriter::new(&table).with_batch_rows(4),
    )?;
    assert_eq!(report.rows, 6);

    let builder = ParquetRecordBatchReaderBuilder::try_new(File::open(&table)?)?;
    let schema = builder.schema().clone();
    let names: Vec<&str> = schema.fields().iter().map(|f| f.name().as_str()).collect();
    assert_eq!(names, ["hits_energy", "hits_channel_index", "hits_event"]);
    assert_eq!(schema.field(0).data_type(), &DataType::Float32);
    assert_eq!(schema.field(2).data_type(), &DataType::Int32);

    let mut events = Vec::new();
    for batch in builder.build()? {
        let batch = batch?;
        events.extend(batch.column(2).as_primitive::<Int32Type>().values().iter().copied());
    }
    assert_eq!(events, vec![5, 5, 7, 7, 7, 3]);

    let manifest: serde_json::Value = serde_json::from_str(&read_table_manifest(&table)?)?;
    assert_eq!(manifest["group"], "hits");
    assert_eq!(manifest["options"]["prepend_group_name"], true);
    assert_eq!(manifest["schema"]["columns"][2]["source_field"], "event_id");
    Ok(())
}

#[test]
fn plain_parquet_is_not_a_container() -> anyhow::Result<()> {
    let dir = TempDirPath::new()?;
    let input = dir.file("hits.parquet");
    write_parquet_batch(&input, &sample_hits_batch())?;
    let err = ContainerReader::open(&input).err();
    assert!(matches!(err, Some(FillError::Configuration(_))));
    Ok(())
}

#[test]
fn writer_rejects_use_before_open() {
    let mut writer = ParquetContainerWriter::new("never-created.parquet");
    let err = writer.commit(&Entry::new(0)).err();
    assert!(matches!(err, Some(FillError::Configuration(_))));
    assert!(!std::path::Path::new("never-created.parquet").exists());
}

#[test]
fn channel_count_column_name_is_reserved() -> anyhow::Result<()> {
    let dir = TempDirPath::new()?;
    let output = dir.file("entries.parquet");
    let batch = record_batch(vec![
        ("event_id", Arc::new(Int32Array::from(vec![1, 1, 2])) as ArrayRef),
        (CHANNELS_COLUMN, Arc::new(Float32Array::from(vec![0.5, 1.5, 2.5])) as ArrayRef),
    ])?;

    let mut registry = Configuration::new();
    let err = ContainerFiller::new(BatchSource::new(batch), ParquetContainerWriter::new(&output), hits_options())
        .fill(&mut registry, None)
        .err();
    assert!(matches!(err, Some(FillError::Configuration(_))));
    assert_eq!(registry.groups().count(), 0);
    assert!(!output.exists());
    Ok(())
}

#[test]
fn mismatched_row_leaves_columns_aligned() -> anyhow::Result<()> {
    let dir = TempDirPath::new()?;
    let table = dir.file("flat.parquet");
    let mut registry = Configuration::new();
    ContainerFiller::new(BatchSource::new(sample_hits_batch()), MemoryContainerSink::new(), hits_options())
        .fill(&mut registry, None)?;
    let (schema, _) = FieldProjection::default()
        .add_group("hits")
        .preserve(["energy", "adc"])
        .build_schema(&registry)?;
    assert_eq!(schema.names().collect::<Vec<_>>(), ["energy", "adc"]);

    let mut writer = ParquetTableWriter::new(&table);
    writer.open(&schema, "{}")?;
    // First value fits its column, second does not.
    let err = writer
        .append_row(&[OutputValue::Float32(1.0), OutputValue::Float32(2.0)])
        .err();
    assert!(matches!(err, Some(FillError::Type { .. })));
    writer.append_row(&[OutputValue::Float32(1.5), OutputValue::Int32(100)])?;
    writer.finish()?;

    let batches = ParquetRecordBatchReaderBuilder::try_new(File::open(&table)?)?
        .build()?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    let rows: usize = batches.iter().map(|b| b.num_rows()).sum();
    assert_eq!(rows, 1);
    assert_eq!(batches[0].column(0).as_primitive::<Float32Type>().value(0), 1.5);
    assert_eq!(batches[0].column(1).as_primitive::<Int32Type>().value(0), 100);
    Ok(())
}
