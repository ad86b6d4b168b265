//! Integration tests for the full feature build
//!
//! These tests write real Parquet sources and tab-separated manifests into
//! temporary output directories and run the pipeline end to end.

#[cfg(test)]
mod tests {
    use crate::{
        catalog::{Aggregation, FEATURE_CATALOG, FeatureCatalog, FeatureSpec},
        config::{DONE_SAMPLE_FILE, FEATURES_DIR, OUTPUT_FILE, RUN_KEY, SAMPLE_KEY},
        error::FeatureError,
        formats::{SourceSpec, TableReader, parquet::ParquetTableReader},
        runner::{BuildArgs, BuildResult, PipelineConfigBuilder, run_build, run_pipeline},
        table::IndexedTable,
    };
    use arrow::array::{Array, ArrayRef, Float64Array, Int64Array, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use arrow::record_batch::RecordBatch;
    use parquet::arrow::ArrowWriter;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;
    use tempfile::TempDir;

    // ============ Test Helpers ============

    /// Numeric catalog columns per source; every value is 1.0
    const SOURCE_COLUMNS: &[(&str, &[&str])] = &[
        ("fastq_screen", &["rRNA_pct_reads_mapped"]),
        ("atropos", &["too_short"]),
        ("hisat2", &["num_multimappers", "per_alignment"]),
        ("aln_stats", &["reads_MQ0", "average_quality"]),
        (
            "rnaseqmetrics",
            &[
                "Percent Reverse",
                "percent_utr_bases",
                "percent_intronic_bases",
                "percent_intergenic_bases",
                "percent_mrna_bases",
                "median_cv_coverage",
            ],
        ),
        ("markduplicates", &["percent_duplication"]),
        (
            "count_summary",
            &[
                "number_genic_reads",
                "percent_genes_on",
                "number_junction_reads",
                "number_junctions_on",
            ],
        ),
    ];

    /// Write a Parquet source with a leading `srr` column
    fn write_source(path: &Path, runs: &[&str], columns: Vec<(String, ArrayRef)>) {
        let mut fields = vec![Field::new(RUN_KEY, DataType::Utf8, false)];
        let mut arrays: Vec<ArrayRef> = vec![Arc::new(StringArray::from(runs.to_vec()))];
        for (name, array) in columns {
            fields.push(Field::new(name, array.data_type().clone(), true));
            arrays.push(array);
        }

        let schema = Arc::new(Schema::new(fields));
        let batch = RecordBatch::try_new(schema.clone(), arrays).unwrap();
        let file = std::fs::File::create(path).unwrap();
        let mut writer = ArrowWriter::try_new(file, schema, None).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();
    }

    fn constant(value: f64, len: usize) -> ArrayRef {
        Arc::new(Float64Array::from(vec![value; len]))
    }

    /// Populate `<outdir>/Features` with all nine sources covering `runs`
    ///
    /// `num_reads` is an Int64 column holding 10, 20, 30, ... in run order and
    /// every coverage position is 1.0.
    fn write_features_dir(outdir: &Path, runs: &[&str]) -> PathBuf {
        let dir = outdir.join(FEATURES_DIR);
        std::fs::create_dir_all(&dir).unwrap();
        let len = runs.len();

        write_source(
            &dir.join("layout.parquet"),
            runs,
            vec![(
                "layout".to_string(),
                Arc::new(StringArray::from(vec!["PE"; len])) as ArrayRef,
            )],
        );

        for (source, columns) in SOURCE_COLUMNS {
            let mut arrays: Vec<(String, ArrayRef)> = columns
                .iter()
                .map(|column| (column.to_string(), constant(1.0, len)))
                .collect();
            if *source == "hisat2" {
                let reads = Int64Array::from_iter_values((1..=len as i64).map(|i| i * 10));
                arrays.push(("num_reads".to_string(), Arc::new(reads)));
            }
            write_source(&dir.join(format!("{source}.parquet")), runs, arrays);
        }

        let coverage = (0..101)
            .map(|position| (format!("pos_{position}"), constant(1.0, len)))
            .collect();
        write_source(&dir.join("genebody_coverage.parquet"), runs, coverage);

        dir
    }

    fn write_text(path: &Path, content: &str) {
        std::fs::write(path, content).unwrap();
    }

    /// Grouped manifest R1,R2 -> S1 and R3 -> S2 with completion list R1..R3
    fn grouped_layout(outdir: &Path, source_runs: &[&str]) -> PathBuf {
        let features_dir = write_features_dir(outdir, source_runs);
        write_text(
            &features_dir.join(DONE_SAMPLE_FILE),
            "srr\tfinished\nR1\tyes\nR2\tyes\nR3\tyes\n",
        );
        let manifest = outdir.join("srx2srr.txt");
        write_text(&manifest, "srx\tsrr\nS1\tR1\nS1\tR2\nS2\tR3\n");
        manifest
    }

    fn build_args(manifest_path: PathBuf, outdir: &Path) -> BuildArgs {
        BuildArgs {
            manifest_path,
            output_dir: outdir.to_path_buf(),
            worker_count: 3,
            quiet: true,
            dry_run: false,
        }
    }

    fn output_path(outdir: &Path) -> PathBuf {
        outdir.join(FEATURES_DIR).join(OUTPUT_FILE)
    }

    async fn read_output(result: &BuildResult, index: &str) -> IndexedTable {
        let path = result.output_path.as_ref().unwrap();
        ParquetTableReader::new(index)
            .read_table(&SourceSpec::new("features", path))
            .await
            .unwrap()
    }

    fn feature_error(err: &anyhow::Error) -> &FeatureError {
        err.downcast_ref::<FeatureError>()
            .unwrap_or_else(|| panic!("not a feature error: {err:#}"))
    }

    // ============ Tests ============

    #[tokio::test]
    async fn test_grouped_build_sums_reads_and_pads_missing_runs() {
        let outdir = TempDir::new().unwrap();
        let manifest = grouped_layout(outdir.path(), &["R1", "R2"]);

        let result = run_build(build_args(manifest, outdir.path())).await.unwrap();

        assert_eq!(result.mode, "per sample");
        assert_eq!(result.runs_requested, 3);
        assert_eq!(result.rows, 2);

        let table = read_output(&result, SAMPLE_KEY).await;
        assert_eq!(table.index(), ["S1", "S2"]);
        assert_eq!(table.column_names(), FeatureCatalog::builtin().public_names());

        let reads = table.float_column("number_reads").unwrap();
        assert_eq!(reads.value(0), 30.0);
        assert!(reads.is_null(1));

        let duplication = table.float_column("percent_duplication").unwrap();
        assert_eq!(duplication.value(0), 1.0);
        assert!(duplication.is_null(1));
    }

    #[tokio::test]
    async fn test_coverage_tertiles_replace_positions() {
        let outdir = TempDir::new().unwrap();
        let manifest = grouped_layout(outdir.path(), &["R1", "R2", "R3"]);

        let result = run_build(build_args(manifest, outdir.path())).await.unwrap();
        let table = read_output(&result, SAMPLE_KEY).await;

        assert!(table.column_names().iter().all(|name| !name.starts_with("pos_")));
        for sample in 0..2 {
            let five = table.float_column("gene_body_five_prime").unwrap().value(sample);
            let middle = table.float_column("gene_body_middle").unwrap().value(sample);
            let three = table.float_column("gene_body_three_prime").unwrap().value(sample);
            assert_eq!((five, middle, three), (33.0, 35.0, 33.0));
            assert_eq!(five + middle + three, 101.0);
        }
    }

    #[tokio::test]
    async fn test_ungrouped_build_keeps_run_rows_and_types() {
        let outdir = TempDir::new().unwrap();
        let features_dir = write_features_dir(outdir.path(), &["R1", "R2", "R3"]);
        write_text(
            &features_dir.join(DONE_SAMPLE_FILE),
            "srr\nR3\nR1\nR4\nR1\n",
        );
        let manifest = outdir.path().join("runs.txt");
        write_text(&manifest, "srr\nR1\nR2\nR3\nR4\n");

        let result = run_build(build_args(manifest, outdir.path())).await.unwrap();
        assert_eq!(result.mode, "per run");
        assert_eq!(result.rows, 4);

        let table = read_output(&result, RUN_KEY).await;
        assert_eq!(table.index(), ["R3", "R1", "R4", "R1"]);
        assert_eq!(table.index_name(), RUN_KEY);

        let reads = table.column("number_reads").unwrap();
        assert_eq!(reads.data_type(), &DataType::Int64);
        let reads = table.float_column("number_reads").unwrap();
        assert_eq!(reads.value(0), 30.0);
        assert_eq!(reads.value(1), 10.0);
        assert!(reads.is_null(2));
        assert_eq!(reads.value(3), 10.0);
    }

    #[tokio::test]
    async fn test_completed_runs_without_sample_are_dropped() {
        let outdir = TempDir::new().unwrap();
        let manifest = grouped_layout(outdir.path(), &["R1", "R2", "R3"]);
        write_text(&manifest, "srx\tsrr\nS9\tR1\n\tR2\n");

        let result = run_build(build_args(manifest, outdir.path())).await.unwrap();
        let table = read_output(&result, SAMPLE_KEY).await;

        assert_eq!(table.index(), ["S9"]);
        assert_eq!(table.float_column("number_reads").unwrap().value(0), 10.0);
    }

    #[tokio::test]
    async fn test_samples_outside_completion_list_are_not_output() {
        let outdir = TempDir::new().unwrap();
        let manifest = grouped_layout(outdir.path(), &["R1", "R2", "R3", "R9"]);
        write_text(&manifest, "srx\tsrr\nS1\tR1\nS1\tR2\nS2\tR3\nS3\tR9\n");

        let result = run_build(build_args(manifest, outdir.path())).await.unwrap();
        assert_eq!(result.runs_requested, 3);
        assert_eq!(result.rows, 2);

        let table = read_output(&result, SAMPLE_KEY).await;
        assert_eq!(table.index(), ["S1", "S2"]);
    }

    #[tokio::test]
    async fn test_missing_completion_list_writes_nothing() {
        let outdir = TempDir::new().unwrap();
        let manifest = grouped_layout(outdir.path(), &["R1", "R2"]);
        std::fs::remove_file(outdir.path().join(FEATURES_DIR).join(DONE_SAMPLE_FILE)).unwrap();

        let err = run_build(build_args(manifest, outdir.path())).await.unwrap_err();

        assert!(format!("{err:#}").contains("Failed to read completion list"));
        assert!(!output_path(outdir.path()).exists());
    }

    #[tokio::test]
    async fn test_dry_run_writes_nothing() {
        let outdir = TempDir::new().unwrap();
        let manifest = grouped_layout(outdir.path(), &["R1", "R2"]);

        let mut args = build_args(manifest, outdir.path());
        args.dry_run = true;
        let result = run_build(args).await.unwrap();

        assert_eq!(result.rows, 2);
        assert_eq!(result.features.len(), FEATURE_CATALOG.len());
        assert!(result.output_path.is_none());
        assert!(!output_path(outdir.path()).exists());
    }

    #[tokio::test]
    async fn test_column_collision_writes_nothing() {
        let outdir = TempDir::new().unwrap();
        let manifest = grouped_layout(outdir.path(), &["R1", "R2"]);
        write_source(
            &outdir.path().join(FEATURES_DIR).join("aln_stats.parquet"),
            &["R1", "R2"],
            vec![
                ("reads_MQ0".to_string(), constant(1.0, 2)),
                ("average_quality".to_string(), constant(1.0, 2)),
                ("num_reads".to_string(), constant(5.0, 2)),
            ],
        );

        let err = run_build(build_args(manifest, outdir.path())).await.unwrap_err();

        match feature_error(&err) {
            FeatureError::ColumnCollision {
                column,
                first,
                second,
            } => {
                assert_eq!(column, "num_reads");
                assert_eq!(first, "hisat2");
                assert_eq!(second, "aln_stats");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!output_path(outdir.path()).exists());
    }

    #[tokio::test]
    async fn test_missing_source_writes_nothing() {
        let outdir = TempDir::new().unwrap();
        let manifest = grouped_layout(outdir.path(), &["R1", "R2"]);
        std::fs::remove_file(outdir.path().join(FEATURES_DIR).join("markduplicates.parquet"))
            .unwrap();

        let err = run_build(build_args(manifest, outdir.path())).await.unwrap_err();

        assert!(matches!(
            feature_error(&err),
            FeatureError::MissingSource { source_name, .. } if source_name == "markduplicates"
        ));
        assert!(!output_path(outdir.path()).exists());
    }

    #[tokio::test]
    async fn test_missing_catalog_column_is_reported() {
        let outdir = TempDir::new().unwrap();
        let manifest = grouped_layout(outdir.path(), &["R1", "R2"]);
        write_source(
            &outdir.path().join(FEATURES_DIR).join("markduplicates.parquet"),
            &["R1", "R2"],
            vec![("optical_duplicates".to_string(), constant(0.0, 2))],
        );

        let err = run_build(build_args(manifest, outdir.path())).await.unwrap_err();

        match feature_error(&err) {
            FeatureError::MissingColumns { columns, .. } => {
                assert_eq!(columns, &vec!["percent_duplication".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_missing_coverage_is_reported() {
        let outdir = TempDir::new().unwrap();
        let manifest = grouped_layout(outdir.path(), &["R1", "R2"]);
        write_source(
            &outdir.path().join(FEATURES_DIR).join("genebody_coverage.parquet"),
            &["R1", "R2"],
            vec![("median_coverage".to_string(), constant(2.0, 2))],
        );

        let err = run_build(build_args(manifest, outdir.path())).await.unwrap_err();

        match feature_error(&err) {
            FeatureError::MissingColumns { context, columns } => {
                assert_eq!(context, "gene body coverage");
                assert_eq!(columns.len(), 101);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_conflicting_sample_mapping_fails() {
        let outdir = TempDir::new().unwrap();
        let manifest = grouped_layout(outdir.path(), &["R1", "R2"]);
        write_text(&manifest, "srx\tsrr\nS1\tR1\nS2\tR1\n");

        let err = run_build(build_args(manifest, outdir.path())).await.unwrap_err();

        assert!(matches!(
            feature_error(&err),
            FeatureError::ConflictingSample { run, .. } if run == "R1"
        ));
        assert!(!output_path(outdir.path()).exists());
    }

    #[tokio::test]
    async fn test_pipeline_with_custom_catalog_and_sources() {
        let dir = TempDir::new().unwrap();
        let hisat2 = dir.path().join("hisat2.parquet");
        write_source(
            &hisat2,
            &["R1", "R2", "R3"],
            vec![
                (
                    "num_reads".to_string(),
                    Arc::new(Int64Array::from(vec![100, 200, 300])) as ArrayRef,
                ),
                (
                    "per_alignment".to_string(),
                    Arc::new(Float64Array::from(vec![Some(80.0), None, Some(95.0)])) as ArrayRef,
                ),
            ],
        );
        let manifest = dir.path().join("manifest.tsv");
        write_text(&manifest, "sample\trun\nA\tR1\nA\tR2\nB\tR3\n");
        let completion = dir.path().join("done.tsv");
        write_text(&completion, "srr\nR1\nR2\nR3\n");
        let output = dir.path().join("out.parquet");

        let catalog = FeatureCatalog::new(vec![
            FeatureSpec::renamed("num_reads", Aggregation::Sum, "reads"),
            FeatureSpec::new("per_alignment", Aggregation::Max),
        ])
        .unwrap();
        let config = PipelineConfigBuilder::default()
            .manifest_path(&manifest)
            .completion_list_path(&completion)
            .sources(vec![SourceSpec::new("hisat2", &hisat2)])
            .output_path(&output)
            .worker_count(2)
            .quiet(true)
            .catalog(catalog)
            .build()
            .unwrap();

        let result = run_pipeline(&config).await.unwrap();
        assert_eq!(result.features, vec!["reads", "per_alignment"]);

        let table = read_output(&result, SAMPLE_KEY).await;
        assert_eq!(table.index(), ["A", "B"]);
        let reads = table.float_column("reads").unwrap();
        assert_eq!((reads.value(0), reads.value(1)), (300.0, 300.0));
        let alignment = table.float_column("per_alignment").unwrap();
        assert_eq!((alignment.value(0), alignment.value(1)), (80.0, 95.0));
    }
}
