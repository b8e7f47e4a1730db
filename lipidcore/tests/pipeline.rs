use context_error::StaticErrorContent;
use context_error::FullErrorContent;
use lipidcore::prelude::*;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

const HEAD_GROUP: f64 = 184.0733;

fn library() -> MassLibrary {
    MassLibrary::new([
        LibraryEntry::new(732.5538, "", "PC|32:1|(16:0~16:1)".parse().unwrap()).fragment(HEAD_GROUP),
        LibraryEntry::new(734.5694, "", "PC|32:0|(16:0~16:0)".parse().unwrap()).fragment(HEAD_GROUP),
        LibraryEntry::new(678.5068, "", "PC|28:0|(14:0~14:0)".parse().unwrap())
            .fragment(HEAD_GROUP)
            .internal_standard(),
        LibraryEntry::new(703.5754, "", "SM|34:1|".parse().unwrap()),
    ])
    .unwrap()
}

fn raw() -> Dataset {
    Dataset::from_records([
        MassRecord::new("s1", 732.5538, Some(HEAD_GROUP), 1000.0),
        MassRecord::new("s1", 734.5694, Some(HEAD_GROUP), 200.0),
        MassRecord::new("s1", 678.5068, Some(HEAD_GROUP), 500.0),
        MassRecord::new("s1", 600.0, None, 3.0),
        MassRecord::new("s1", 650.1234, None, 50.0),
        MassRecord::new("s1", 703.5754, None, 40.0),
        MassRecord::new("s2", 732.5538, Some(HEAD_GROUP), 100.0),
    ])
}

fn pipeline() -> Pipeline {
    Pipeline::new(
        ReferenceTables::new(library()),
        PipelineConfig::default().filter(FilterPolicy::Absolute, 5.0, 0.0),
    )
    .unwrap()
}

#[test]
fn full_run() {
    init_logging();
    let raw = raw();
    let before = raw.clone();
    let output = pipeline().run(&raw);
    assert_eq!(raw, before);

    let rows = output.dataset.rows();
    assert_eq!(
        rows.iter().map(|r| r.index).collect::<Vec<_>>(),
        vec![0, 1, 2, 4, 5, 6]
    );
    assert_eq!(rows[0].identification.to_string(), "PC|32:1|(16:1~16:0)");
    assert_eq!(
        rows[0].formula.as_ref().map(MolecularFormula::hill_notation),
        Some("C40H78NO8P".to_string())
    );
    assert!(rows[2].is_internal_standard);
    assert!(rows[3].identification.is_unknown());
    assert!(rows[4].identification.is_unknown());

    // The M+2 isotopologue of PC 32:1 overlaps with PC 32:0
    let p2 = IsotopeDistributionCalculator::default()
        .distribution_for(40)
        .probability(2);
    assert!((p2 - 0.059_337).abs() < 1e-5);
    assert_eq!(rows[0].corrected_intensity, Some(1000.0));
    assert!((rows[1].corrected_intensity.unwrap() - (200.0 - 1000.0 * p2)).abs() < 1e-9);
    assert_eq!(rows[2].corrected_intensity, Some(500.0));
    assert_eq!(rows[3].corrected_intensity, Some(50.0));

    assert_eq!(rows[0].normalized_intensity, Some(2.0));
    assert_eq!(rows[2].normalized_intensity, Some(1.0));
    assert_eq!(rows[5].normalized_intensity, None);

    assert_eq!(rows[0].saturation, Some(Saturation::Unsaturated));
    assert_eq!(rows[1].saturation, Some(Saturation::Saturated));
    assert_eq!(rows[3].saturation, Some(Saturation::Unknown));

    assert_eq!(
        output
            .warnings
            .iter()
            .map(|w| (w.row, w.kind))
            .collect::<Vec<_>>(),
        vec![
            (Some(5), LipidErrorKind::UnsupportedGroup),
            (Some(6), LipidErrorKind::MissingStandard),
        ]
    );
}

#[test]
fn stages_are_checkpoints() {
    init_logging();
    let pipeline = pipeline();
    let raw = raw();
    let filtered = pipeline.noise_filter().filter(&raw);
    let (named, _) = pipeline.namer().name(&filtered);
    let distributions = pipeline.isotope_calculator().distributions(&named);
    let (corrected, _) = pipeline.corrector().correct(&named, &distributions);
    let (normalized, _) = pipeline.normalizer().normalize(&corrected);
    let checked = SaturationChecker::check(&normalized);
    assert_eq!(checked, pipeline.run(&raw).dataset);
}

#[test]
fn named_standard_and_fragment_tolerance() {
    init_logging();
    let config = PipelineConfig::default()
        .fragment_tolerance(Tolerance::new_absolute(0.001))
        .internal_standard_name(Some("PC|32:1|(16:0~16:1)".to_string()), 10.0);
    let pipeline = Pipeline::new(ReferenceTables::new(library()), config).unwrap();
    let output = pipeline.run(&Dataset::from_records([
        MassRecord::new("s1", 732.5538, Some(HEAD_GROUP), 100.0),
        MassRecord::new("s1", 678.5068, Some(HEAD_GROUP + 0.01), 50.0),
    ]));
    let rows = output.dataset.rows();
    assert_eq!(rows[0].normalized_intensity, Some(10.0));
    // The fragment is outside the fragment tolerance
    assert!(rows[1].identification.is_unknown());
    assert_eq!(rows[1].normalized_intensity, Some(5.0));
    assert!(output.warnings.is_empty());
}

#[test]
fn invalid_configuration() {
    for config in [
        PipelineConfig::default().filter(FilterPolicy::Relative, 0.0, 1.5),
        PipelineConfig::default().isotopes(1.0, 0.05),
        PipelineConfig::default().internal_standard_name(Some("PC".to_string()), 1.0),
    ] {
        let error = Pipeline::new(ReferenceTables::new(library()), config).unwrap_err();
        assert_eq!(error.get_kind(), LipidErrorKind::Config);
    }
}

#[test]
fn tables_from_json() {
    init_logging();
    let library = MassLibrary::from_json(
        r#"[
            {"precursor_mass": 520.34, "formula": "C39H68O2", "lipid_name": "CE|12:0|(12:0)"},
            {"precursor_mass": 806.74, "formula": "", "lipid_name": "TAG|48:0|",
             "tolerance": {"Absolute": 0.01}, "is_internal_standard": true}
        ]"#,
    )
    .unwrap();
    assert_eq!(library.len(), 2);
    let tables = ReferenceTables {
        library,
        masses: AtomicMassTable::from_json(
            r#"{"C": 12.0, "H": 1.00782503223, "O": 15.99491461957}"#,
        )
        .unwrap(),
        abundances: NaturalAbundanceTable::from_json(
            r#"{"C": [{"mass_shift": 1.00335483534, "abundance": 0.011}]}"#,
        )
        .unwrap(),
        rules: ChemistryRuleTable::from_json(
            r#"{"TAG": {"base": "C3H5O3", "chain_count": 3, "chain_hydrogen": -1, "chain_extra": "O"}}"#,
        )
        .unwrap(),
    };
    let config = PipelineConfig::from_json(r#"{"match_tolerance": {"Relative": 5.0}}"#).unwrap();
    let pipeline = Pipeline::new(tables, config).unwrap();
    assert_eq!(pipeline.isotope_calculator().carbon13(), 0.011);

    let output = pipeline.run(&Dataset::from_records([
        MassRecord::new("s1", 520.341, None, 10.0),
        MassRecord::new("s1", 806.745, None, 20.0),
    ]));
    let rows = output.dataset.rows();
    assert_eq!(rows[0].identification.to_string(), "CE|12:0|(12:0)");
    assert!((rows[0].monoisotopic_mass.unwrap() - 568.521_931_4).abs() < 1e-4);
    assert_eq!(rows[1].identification.to_string(), "TAG|48:0|");
    assert!((rows[1].monoisotopic_mass.unwrap() - 806.736_340_9).abs() < 1e-4);
    assert_eq!(rows[0].normalized_intensity, Some(0.5));

    let serialised = serde_json::to_string(&output).unwrap();
    assert!(serialised.contains("\"CE|12:0|(12:0)\""));
}

#[test]
fn overflowing_library_formula() {
    init_logging();
    let library = MassLibrary::new([
        LibraryEntry::new(520.34, "C2147483647C1", "CE|12:0|(12:0)".parse().unwrap()),
        LibraryEntry::new(678.5068, "", "PC|28:0|(14:0~14:0)".parse().unwrap()).internal_standard(),
    ])
    .unwrap();
    let pipeline = Pipeline::new(ReferenceTables::new(library), PipelineConfig::default()).unwrap();
    let output = pipeline.run(&Dataset::from_records([
        MassRecord::new("s1", 520.34, None, 10.0),
        MassRecord::new("s1", 678.5068, None, 20.0),
    ]));
    let rows = output.dataset.rows();
    assert_eq!(rows.len(), 2);
    assert!(rows[0].identification.is_unknown());
    assert_eq!(rows[0].normalized_intensity, Some(0.5));
    assert_eq!(
        output
            .warnings
            .iter()
            .map(|w| (w.row, w.kind))
            .collect::<Vec<_>>(),
        vec![(Some(0), LipidErrorKind::MalformedFormula)]
    );
}

#[test]
fn empty_dataset() {
    let output = pipeline().run(&Dataset::default());
    assert!(output.dataset.is_empty());
    assert!(output.warnings.is_empty());
}
