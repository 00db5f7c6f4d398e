use dsfusion::{
    ConfusionMatrixCalculator, ConfusionMatrixFile, ConfusionMatrixMeasurements,
    DefinitionMethod, DsFusionFilter, FusionParams, LabelMap,
};
use ndarray::{array, Array2};
use tempfile::TempDir;

#[test]
fn test_calculator_to_file_to_fusion() {
    let _ = env_logger::builder().is_test(true).try_init();

    let temp_dir = TempDir::new().expect("Failed to create temp directory");

    let reference = Array2::from_shape_fn((6, 6), |(i, _)| if i < 3 { 10 } else { 20 });
    let classifier_a = Array2::from_shape_fn((6, 6), |(i, j)| {
        if (i + j) % 5 == 0 { 30 - reference[[i, j]] } else { reference[[i, j]] }
    });
    let classifier_b = Array2::from_shape_fn((6, 6), |(i, j)| {
        if j == 0 { 30 - reference[[i, j]] } else { reference[[i, j]] }
    });

    let mut paths = Vec::new();
    for (name, produced) in [("a", &classifier_a), ("b", &classifier_b)] {
        let calc = ConfusionMatrixCalculator::compute(reference.view(), produced.view(), Some(&0))
            .expect("Failed to compute confusion matrix");
        assert_eq!(calc.number_of_samples(), 36);

        let path = temp_dir.path().join(format!("confusion_{}.csv", name));
        ConfusionMatrixFile::write(&path, calc.confusion_matrix(), calc.label_map())
            .expect("Failed to write confusion matrix");
        paths.push(path);
    }

    let mut matrices = Vec::new();
    let mut label_maps = Vec::new();
    for path in &paths {
        let (matrix, labels) =
            ConfusionMatrixFile::read::<i32, _>(path).expect("Failed to read confusion matrix");
        assert_eq!(labels.labels(), &[10, 20]);
        assert_eq!(matrix.sum(), 36);
        matrices.push(matrix);
        label_maps.push(labels);
    }

    // classifier b mislabels exactly one column
    assert_eq!(matrices[1], array![[15, 3], [3, 15]]);
    let measurements = ConfusionMatrixMeasurements::compute(&matrices[1]).unwrap();
    assert_eq!(measurements.overall_accuracy(), 30.0 / 36.0);

    let filter = DsFusionFilter::new(FusionParams {
        definition_method: DefinitionMethod::Recall,
        no_data_label: 0,
        undecided_label: 99,
        ..Default::default()
    })
    .with_confusion_matrices(matrices)
    .with_label_maps(label_maps);

    let fused = filter
        .apply(&[classifier_a.view(), classifier_b.view()], None)
        .expect("Fusion failed");

    assert_eq!(fused.dim(), (6, 6));
    assert!(fused.iter().all(|&l| l == 10 || l == 20 || l == 99));
    // both classifiers agree away from column 0 and the (i + j) % 5 diagonal
    assert_eq!(fused[[1, 2]], 10);
    assert_eq!(fused[[4, 2]], 20);
}

#[test]
fn test_written_file_layout() {
    let matrix = array![[8, 2], [1, 9]];
    let labels = LabelMap::from_labels(vec![3, 7]).unwrap();

    let text = ConfusionMatrixFile::to_csv_string(&matrix, &labels).unwrap();
    assert_eq!(
        text,
        "#Reference labels (rows):3,7\n#Produced labels (columns):3,7\n8,2\n1,9\n"
    );

    let (parsed, parsed_labels) = ConfusionMatrixFile::parse::<i32>(&text).unwrap();
    assert_eq!(parsed, matrix);
    assert_eq!(parsed_labels, labels);
}
