use ism::{Analysis, Cluster, Error, Factor, Factors, FactorSet, Relation, ReachabilityMatrix, Ssim};

fn factors(ids: &[&str]) -> Factors {
    Factors::from_factors(ids.iter().map(|id| Factor::new(*id, format!("factor {}", id)))).unwrap()
}

fn judged(ids: &[&str], judgments: &[(&str, &str, Relation)]) -> Ssim {
    let mut ssim = Ssim::new(factors(ids));
    for &(row, column, relation) in judgments {
        ssim.judge(row, column, relation).unwrap();
    }
    ssim
}

fn abc() -> Ssim {
    judged(
        &["A", "B", "C"],
        &[
            ("A", "B", Relation::Drives),
            ("A", "C", Relation::Unrelated),
            ("B", "C", Relation::Drives),
        ],
    )
}

#[test]
fn three_factor_chain() {
    let ssim = abc();
    let analysis = Analysis::new(&ssim).unwrap();
    let (a, b, c) = (0, 1, 2);

    let initial = &analysis.initial().matrix;
    for f in 0..3 {
        assert!(initial.reaches(f, f));
    }
    assert_eq!((initial.get(a, b), initial.get(b, a)), (1, 0));
    assert_eq!((initial.get(a, c), initial.get(c, a)), (0, 0));
    assert_eq!((initial.get(b, c), initial.get(c, b)), (1, 0));
    assert_eq!(analysis.initial().powers.driving, vec![2, 2, 1]);
    assert_eq!(analysis.initial().powers.dependence, vec![1, 2, 2]);

    assert_eq!(analysis.changes().iter().copied().collect::<Vec<_>>(), vec![(a, c)]);
    assert!(analysis.closed().matrix.reaches(a, c));
    assert_eq!(analysis.closed().powers.driving, vec![3, 2, 1]);
    assert_eq!(analysis.closed().powers.dependence, vec![1, 2, 3]);

    let levels: Vec<_> = analysis
        .partition()
        .levels()
        .iter()
        .map(|level| (level.level, level.factors.clone()))
        .collect();
    assert_eq!(
        levels,
        vec![
            (1, FactorSet::new(&[c])),
            (2, FactorSet::new(&[b])),
            (3, FactorSet::new(&[a])),
        ]
    );
}

#[test]
fn three_factor_trace() {
    let ssim = abc();
    let analysis = Analysis::new(&ssim).unwrap();
    let iterations = analysis.partition().iterations();
    assert_eq!(iterations.len(), 3);

    let first = &iterations[0];
    assert_eq!(first.iteration, 1);
    assert_eq!(first.remaining, FactorSet::new(&[0, 1, 2]));
    let c = first.partition_set(2).unwrap();
    assert_eq!(c.reachability, FactorSet::new(&[2]));
    assert_eq!(c.antecedent, FactorSet::new(&[0, 1, 2]));
    assert_eq!(c.intersection, FactorSet::new(&[2]));
    assert!(c.qualifies());
    assert!(!first.partition_set(0).unwrap().qualifies());
    assert!(!first.partition_set(1).unwrap().qualifies());
    assert_eq!(first.level_factors, FactorSet::new(&[2]));

    let second = &iterations[1];
    assert_eq!(second.remaining, FactorSet::new(&[0, 1]));
    assert!(second.partition_set(2).is_none());
    let b = second.partition_set(1).unwrap();
    assert_eq!(b.reachability, FactorSet::new(&[1]));
    assert_eq!(b.antecedent, FactorSet::new(&[0, 1]));
    assert_eq!(second.level_factors, FactorSet::new(&[1]));

    let third = &iterations[2];
    assert_eq!(third.remaining, FactorSet::new(&[0]));
    assert_eq!(third.level_factors, FactorSet::new(&[0]));
}

#[test]
fn mutual_factors_share_a_level() {
    let ssim = judged(
        &["P", "Q", "R", "S"],
        &[
            ("P", "Q", Relation::Mutual),
            ("P", "R", Relation::Drives),
            ("P", "S", Relation::Unrelated),
            ("Q", "R", Relation::Unrelated),
            ("Q", "S", Relation::Unrelated),
            ("S", "R", Relation::Drives),
        ],
    );
    let analysis = Analysis::new(&ssim).unwrap();

    assert_eq!(analysis.level_of("R"), Some(1));
    assert_eq!(analysis.level_of("P"), Some(2));
    assert_eq!(analysis.level_of("Q"), Some(2));
    assert_eq!(analysis.level_of("S"), Some(2));
    assert_eq!(analysis.level_of("T"), None);

    // Q → R only exists through P.
    assert!(analysis.changes().contains(&(1, 2)));
    assert_eq!(analysis.changes().len(), 1);
}

#[test]
fn judgments_are_stored_canonically() {
    let mut ssim = Ssim::new(factors(&["A", "B"]));
    ssim.judge("B", "A", Relation::DrivenBy).unwrap();
    assert_eq!(ssim.relation("A", "B").unwrap(), Some(Relation::Drives));

    // A later judgment of the same pair from either side replaces the earlier one.
    ssim.judge("A", "B", Relation::Unrelated).unwrap();
    assert_eq!(ssim.relation("B", "A").unwrap(), Some(Relation::Unrelated));

    let initial = ssim.initial_reachability().unwrap();
    assert_eq!(initial.matrix, ReachabilityMatrix::identity(2));
}

#[test]
fn missing_relation_is_rejected() {
    let ssim = judged(
        &["A", "B", "C"],
        &[("A", "B", Relation::Drives), ("B", "C", Relation::Drives)],
    );
    assert!(!ssim.is_complete());
    assert_eq!(ssim.missing_pairs().collect::<Vec<_>>(), vec![(0, 2)]);

    let expected = Error::IncompleteRelation {
        row: "A".to_string(),
        column: "C".to_string(),
    };
    assert_eq!(ssim.initial_reachability().err(), Some(expected.clone()));
    assert_eq!(Analysis::new(&ssim).err(), Some(expected));
}

#[test]
fn too_few_factors_are_rejected() {
    let empty = Ssim::new(Factors::new());
    assert!(empty.is_complete());
    assert_eq!(
        Analysis::new(&empty).err(),
        Some(Error::TooFewFactors { count: 0 })
    );

    let single = Ssim::new(factors(&["A"]));
    assert_eq!(
        Analysis::new(&single).err(),
        Some(Error::TooFewFactors { count: 1 })
    );
}

#[test]
fn invalid_judgments_are_rejected() {
    let mut ssim = Ssim::new(factors(&["A", "B"]));
    assert_eq!(
        ssim.judge("A", "Z", Relation::Drives).err(),
        Some(Error::UnknownFactor { id: "Z".to_string() })
    );
    assert_eq!(
        ssim.judge("A", "A", Relation::Drives).err(),
        Some(Error::SelfRelation { id: "A".to_string() })
    );
    assert_eq!(
        ssim.relation("Y", "A").err(),
        Some(Error::UnknownFactor { id: "Y".to_string() })
    );
    assert_eq!(
        "VX".parse::<Relation>(),
        Err(Error::InvalidRelation { value: "VX".to_string() })
    );
    assert_eq!(" o ".parse::<Relation>(), Ok(Relation::Unrelated));
}

#[test]
fn unclosed_cycle_stalls() {
    let cycle = ReachabilityMatrix::from_edges(4, &[(0, 1), (1, 2), (2, 0), (3, 0)]);
    let stalled = cycle.partition().unwrap_err();
    assert_eq!(stalled.remaining, FactorSet::new(&[0, 1, 2, 3]));
    assert!(stalled.levels.is_empty());
    assert_eq!(stalled.iterations.len(), 1);
    assert!(stalled.iterations[0].level_factors.is_empty());

    // Once closed, the cycle collapses into a single level.
    let (closed, _) = cycle.closure();
    let partition = closed.partition().unwrap();
    let levels: Vec<_> = partition.levels().iter().map(|l| l.factors.clone()).collect();
    assert_eq!(levels, vec![FactorSet::new(&[0, 1, 2]), FactorSet::new(&[3])]);
}

#[test]
fn stall_after_first_level_keeps_trace() {
    // 3 is a sink; 0, 1 and 2 form an unclosed cycle above it.
    let matrix = ReachabilityMatrix::from_edges(4, &[(0, 1), (1, 2), (2, 0), (0, 3)]);
    let stalled = matrix.partition().unwrap_err();
    assert_eq!(stalled.levels.len(), 1);
    assert_eq!(stalled.levels[0].factors, FactorSet::new(&[3]));
    assert_eq!(stalled.remaining, FactorSet::new(&[0, 1, 2]));
    assert_eq!(stalled.iterations.len(), 2);
    assert_eq!(stalled.iterations[1].remaining, stalled.remaining);
}

#[test]
fn clusters_follow_closed_powers() {
    let ssim = judged(
        &["D", "L1", "L2", "E", "U"],
        &[
            ("D", "L1", Relation::Drives),
            ("D", "L2", Relation::Unrelated),
            ("D", "E", Relation::Unrelated),
            ("D", "U", Relation::Unrelated),
            ("L1", "L2", Relation::Mutual),
            ("L1", "E", Relation::Unrelated),
            ("L1", "U", Relation::Unrelated),
            ("L2", "E", Relation::Drives),
            ("L2", "U", Relation::Unrelated),
            ("E", "U", Relation::Unrelated),
        ],
    );
    let analysis = Analysis::new(&ssim).unwrap();
    let powers = &analysis.closed().powers;
    // D reaches everything but U; E is reached by everything but U.
    assert_eq!(powers.driving, vec![4, 3, 3, 1, 1]);
    assert_eq!(powers.dependence, vec![1, 3, 3, 4, 1]);
    assert_eq!(powers.max_power(), 4);
    assert_eq!(
        analysis.clusters(),
        vec![
            Cluster::Independent,
            Cluster::Linkage,
            Cluster::Linkage,
            Cluster::Dependent,
            Cluster::Autonomous,
        ]
    );
}

#[test]
fn digraph_links_adjacent_levels() {
    let ssim = judged(
        &["A", "B", "C", "D"],
        &[
            ("A", "B", Relation::Drives),
            ("A", "C", Relation::Drives),
            ("A", "D", Relation::Unrelated),
            ("B", "C", Relation::Unrelated),
            ("B", "D", Relation::Drives),
            ("C", "D", Relation::Drives),
        ],
    );
    let analysis = Analysis::new(&ssim).unwrap();
    assert_eq!(analysis.level_of("D"), Some(1));
    assert_eq!(analysis.level_of("B"), Some(2));
    assert_eq!(analysis.level_of("C"), Some(2));
    assert_eq!(analysis.level_of("A"), Some(3));
    assert_eq!(analysis.digraph_edges(), vec![(0, 1), (0, 2), (1, 3), (2, 3)]);
}

#[test]
fn relations_round_trip_through_serde() {
    let factor = Factor::new("A", "Funding");
    let json = serde_json::to_string(&(factor.clone(), Relation::Mutual)).unwrap();
    assert_eq!(json, r#"[{"id":"A","name":"Funding"},"X"]"#);
    let back: (Factor, Relation) = serde_json::from_str(&json).unwrap();
    assert_eq!(back, (factor, Relation::Mutual));
    assert!(serde_json::from_str::<Relation>(r#""Q""#).is_err());
}

#[test]
fn factor_indices_follow_presentation_order() {
    let mut list = Factors::new();
    assert_eq!(list.add(Factor::new("Z", "last letter")).unwrap(), 0);
    assert_eq!(list.add(Factor::new("A", "first letter")).unwrap(), 1);
    assert_eq!(
        list.add(Factor::new("Z", "again")).err(),
        Some(Error::DuplicateFactor { id: "Z".to_string() })
    );
    assert_eq!(list.len(), 2);
    assert_eq!(list.index_of("Z"), Some(0));
    assert_eq!(list.index_of("A"), Some(1));
    assert_eq!(list.index_of("M"), None);
    assert_eq!((list.id(1), list.name(1)), ("A", "first letter"));
    assert_eq!(list.ids().collect::<Vec<_>>(), vec!["Z", "A"]);
}

#[test]
fn stalled_error_keeps_levels_and_trace() {
    let list = factors(&["A", "B", "C", "D"]);
    let matrix = ReachabilityMatrix::from_edges(4, &[(0, 1), (1, 2), (2, 0), (0, 3)]);
    match matrix.partition().unwrap_err().into_error(&list) {
        Error::StalledPartition {
            remaining,
            levels,
            iterations,
        } => {
            assert_eq!(remaining, vec!["A", "B", "C"]);
            assert_eq!(levels.len(), 1);
            assert_eq!(levels[0].factors, FactorSet::new(&[3]));
            assert_eq!(iterations.len(), 2);
            assert!(iterations[1].level_factors.is_empty());
        }
        other => panic!("unexpected error {}", other),
    }
}

#[test]
fn clusters_serialize_lowercase() {
    let json = serde_json::to_string(&[Cluster::Linkage, Cluster::Independent]).unwrap();
    assert_eq!(json, r#"["linkage","independent"]"#);
}
