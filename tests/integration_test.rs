use pedigree_compatibility::*;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

const PEDIGREE_CSV: &str = "\
id,name,sex,sire,dam,hd,active
S,Sire,male,-,-,A,true
D1,Dam One,female,-,-,A,true
D2,Dam Two,female,-,-,B,true
X,,male,S,D1,A,true
Y,,female,S,D1,B,true
H,,female,S,D2,A,true
OUT,,female,-,-,A,true
LATE,,female,-,-,A,false
";

fn load_engine(dir: &TempDir) -> (Arc<InMemoryPedigree>, PedigreeEngine) {
    let path = dir.path().join("pedigree.csv");
    fs::write(&path, PEDIGREE_CSV).unwrap();

    let pedigree = Arc::new(PedigreeFileParser::new().load(&path).unwrap());
    let engine = PedigreeEngine::with_lookup_timeout(
        Arc::clone(&pedigree),
        Arc::new(InMemoryPolicyStore::new()),
        EngineSettings::default(),
    )
    .unwrap();
    (pedigree, engine)
}

#[test]
fn test_full_siblings_are_rejected() {
    let dir = TempDir::new().unwrap();
    let (_, engine) = load_engine(&dir);

    let report = engine.evaluate_compatibility("X", "Y").unwrap();
    assert!(report.gender_compatible);
    assert_eq!(report.relatedness, 50.0);
    assert_eq!(report.basis, RelationshipBasis::FullSiblings);
    assert!(!report.relatedness_compatible);
    assert!(report.dysplasia_compatible);
    assert!(!report.overall_compatible);
}

#[test]
fn test_relatedness_shortcuts() {
    let dir = TempDir::new().unwrap();
    let (_, engine) = load_engine(&dir);

    let parent = engine.compute_relatedness("S", "X").unwrap();
    assert_eq!(parent.relatedness, 50.0);
    assert_eq!(parent.basis, RelationshipBasis::ParentChild);

    let half = engine.compute_relatedness("X", "H").unwrap();
    assert_eq!(half.relatedness, 25.0);
    assert_eq!(half.basis, RelationshipBasis::HalfSiblings);

    let same = engine.compute_relatedness("X", "X").unwrap();
    assert_eq!(same.relatedness, 100.0);

    let none = engine.compute_relatedness("X", "OUT").unwrap();
    assert_eq!(none.relatedness, 0.0);
    assert_eq!(none.basis, RelationshipBasis::Unrelated);
}

#[test]
fn test_relatedness_is_symmetric() {
    let dir = TempDir::new().unwrap();
    let (_, engine) = load_engine(&dir);

    for (a, b) in [("X", "H"), ("S", "Y"), ("D2", "X"), ("OUT", "Y")] {
        let forward = engine.compute_relatedness(a, b).unwrap();
        let backward = engine.compute_relatedness(b, a).unwrap();
        assert_eq!(forward.relatedness.to_bits(), backward.relatedness.to_bits());
    }
}

#[test]
fn test_dysplasia_policy_round_trip_through_engine() {
    let dir = TempDir::new().unwrap();
    let (_, engine) = load_engine(&dir);

    assert!(engine.evaluate_dysplasia("A", "B").unwrap());
    assert!(!engine.evaluate_dysplasia("B", "C").unwrap());

    let mut matrix = engine.active_policy().unwrap().dysplasia_matrix;
    matrix.set_symmetric(DysplasiaGrade::B, DysplasiaGrade::C, true);
    engine
        .replace_policy(&PolicyUpdate {
            dysplasia_matrix: Some(matrix),
            ..Default::default()
        })
        .unwrap();

    assert!(engine.evaluate_dysplasia("B", "C").unwrap());
    assert!(engine.evaluate_dysplasia("c", "b").unwrap());
}

#[test]
fn test_find_partners_ranks_unrelated_first() {
    let dir = TempDir::new().unwrap();
    let (pedigree, engine) = load_engine(&dir);

    let candidates = pedigree.active_ids();
    assert!(!candidates.iter().any(|id| id.as_str() == "LATE"));

    let ranked = engine.find_partners("X", &candidates, &|| {}).unwrap();
    assert_eq!(ranked.len(), candidates.len() - 1);
    assert!(ranked.iter().all(|r| r.animal_b.as_str() != "X"));

    let compatible: Vec<&str> = ranked
        .iter()
        .take_while(|r| r.overall_compatible)
        .map(|r| r.animal_b.as_str())
        .collect();
    assert_eq!(compatible, vec!["D2", "OUT"]);
}

#[test]
fn test_errors_at_the_boundary() {
    let dir = TempDir::new().unwrap();
    let (_, engine) = load_engine(&dir);

    assert!(matches!(
        engine.evaluate_compatibility("X", "NOPE"),
        Err(PedigreeError::NotFound(_))
    ));
    assert!(matches!(
        engine.compute_relatedness("X", "  "),
        Err(PedigreeError::InvalidInput(_))
    ));
    assert!(matches!(
        engine.evaluate_dysplasia("A", "F"),
        Err(PedigreeError::InvalidInput(_))
    ));
}

#[test]
fn test_json_pedigree_and_config_file() {
    let dir = TempDir::new().unwrap();
    let pedigree_path = dir.path().join("pedigree.json");
    fs::write(
        &pedigree_path,
        r#"[
            {"id": "G", "gender": "male", "dysplasia_grade": "A"},
            {"id": "C1", "gender": "male", "sire": "G", "dysplasia_grade": "A"},
            {"id": "C2", "gender": "female", "dam": "G", "dysplasia_grade": "A"},
            {"id": "GC1", "gender": "female", "dam": "C1", "dysplasia_grade": "A"},
            {"id": "GC2", "gender": "male", "sire": "C2", "dysplasia_grade": "A"},
            {"id": "X", "gender": "male", "sire": "GC1", "dysplasia_grade": "A"},
            {"id": "Y", "gender": "female", "dam": "GC2", "dysplasia_grade": "B"}
        ]"#,
    )
    .unwrap();

    let config_path = dir.path().join("pedigree.toml");
    fs::write(&config_path, "[policy]\ninbreeding_limit = 1.5\n").unwrap();

    let config = PedigreeConfig::load_or_default(Some(&config_path)).unwrap();
    let pedigree = PedigreeFileParser::new().load(&pedigree_path).unwrap();
    assert_eq!(pedigree.len(), 7);

    let engine = PedigreeEngine::new(
        Arc::new(pedigree),
        Arc::new(InMemoryPolicyStore::with_policy(config.initial_policy().unwrap())),
        config.engine,
    );

    let report = engine.evaluate_compatibility("X", "Y").unwrap();
    assert_eq!(report.relatedness, 1.5625);
    assert_eq!(report.rounded_relatedness(), 1.56);
    assert!(!report.relatedness_compatible);
    assert!(!report.overall_compatible);
}
