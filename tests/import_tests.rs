use std::{fs, path::Path};

use contentgraph::{
    ChunkConfig, GraphStore, HashScheme, Stoichiometry, Table, edge_hash_fn,
    import::{
        ChebiImporter, ImportOptions, OntologyImporter, RheaImporter, TaxonomyImporter,
        run_import,
    },
    lookup_synonyms, reaction_hash_fn, synonym_hash_fn, taxonomy_hash_fn,
};
use tempfile::{TempDir, tempdir};

const NODES_DMP: &str = "1\t|\t1\t|\tno rank\t|\t\t|\n\
83333\t|\t1\t|\tspecies\t|\t\t|\n\
511145\t|\t83333\t|\tstrain\t|\t\t|\n\
999\t|\n";

const NAMES_DMP: &str = "1\t|\troot\t|\t\t|\tscientific name\t|\n\
83333\t|\tEscherichia coli K-12\t|\t\t|\tscientific name\t|\n\
511145\t|\tEscherichia coli str. K-12 substr. MG1655\t|\t\t|\tscientific name\t|\n\
511145\t|\tE. coli MG1655\t|\t\t|\tequivalent name\t|\n";

const CHEBI_SDF: &str = "
  Marvin

M  END
> <ChEBI ID>
CHEBI:15377

> <ChEBI Name>
water

> <InChIKey>
XLYOFNOQVPJJNP-UHFFFAOYSA-N

$$$$

  Marvin

M  END
> <ChEBI ID>
CHEBI:16236

> <ChEBI Name>
ethanol

> <InChIKey>
LFQSCWFLJHTTHZ-UHFFFAOYSA-N

$$$$

  Marvin

M  END
> <ChEBI Name>
nameless

$$$$
";

const REACTIONS: &str = r#"{"uid": "100", "display_name": "water = ethanol", "participants": [{"chebi_xref": "CHEBI:15377", "coefficient": 1.0, "side": "left"}, {"chebi_xref": "CHEBI:16236", "coefficient": 1.0, "side": "right"}]}
{"uid": "101", "display_name": "ethanol = water", "participants": [{"chebi_xref": "CHEBI:16236", "coefficient": 1.0, "side": "left"}, {"chebi_xref": "CHEBI:15377", "coefficient": 1.0, "side": "right"}]}
{"uid": "102", "display_name": "unknown", "participants": [{"chebi_xref": "CHEBI:99999", "coefficient": 1.0, "side": "left"}]}
"#;

const ONTOLOGY: &str = "format-version: 1.2

[Term]
id: CHEBI:16236
name: ethanol
is_a: CHEBI:15377 ! water

[Term]
id: CHEBI:15377
name: water
relationship: has_role CHEBI:48360 ! solvent
";

fn write(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path
}

fn writing() -> ImportOptions {
    ImportOptions {
        chunk: ChunkConfig::with_chunk_size(2),
        ..ImportOptions::writing()
    }
}

fn load_chebi(store: &GraphStore, sdf: &Path) {
    run_import(store, &ChebiImporter::new(sdf), &writing()).unwrap();
}

#[test]
fn test_taxonomy_import_twice_yields_one_entity_each() {
    let dir = tempdir().unwrap();
    let importer = TaxonomyImporter::new(
        write(&dir, "nodes.dmp", NODES_DMP),
        write(&dir, "names.dmp", NAMES_DMP),
    );
    let store = GraphStore::open_in_memory().unwrap();

    let first = run_import(&store, &importer, &writing()).unwrap();
    assert_eq!(first.records, 2);
    assert_eq!(first.skipped, 1);
    assert_eq!(first.node_history_rows, 4);
    assert_eq!(first.edge_history_rows, 3);

    let second = run_import(&store, &importer, &writing()).unwrap();
    assert_eq!(second.nodes.as_ref().map(|n| n.inserted), Some(0));
    assert_eq!(second.edges.as_ref().map(|e| e.inserted), Some(0));
    assert_eq!(second.node_history_rows, 0);
    assert_eq!(second.edge_history_rows, 0);

    // two taxa plus their ncbi_taxonomy synonyms
    assert_eq!(store.count(Table::Node).unwrap(), 4);
    assert_eq!(store.count(Table::Edge).unwrap(), 3);

    let strain = store.node_by_hash(&taxonomy_hash_fn("511145")).unwrap().unwrap();
    let species = store.node_by_hash(&taxonomy_hash_fn("83333")).unwrap().unwrap();
    assert_eq!(strain.node_type_id, "taxonomy");
    assert_eq!(strain.data["name"], "Escherichia coli str. K-12 substr. MG1655");
    assert_eq!(strain.data["rank"], "strain");

    let parent = store
        .edge_by_hash(&edge_hash_fn(&strain.hash, &species.hash, "has_parent"))
        .unwrap()
        .unwrap();
    assert_eq!(parent.source_id, strain.id);
    assert_eq!(parent.destination_id, species.id);

    let synonym_hash = synonym_hash_fn(&strain.hash, "ncbi_taxonomy", "511145");
    let synonym = store.node_by_hash(&synonym_hash).unwrap().unwrap();
    assert!(
        store
            .edge_by_hash(&edge_hash_fn(&strain.hash, &synonym_hash, "has_synonym"))
            .unwrap()
            .is_some()
    );

    for id in [strain.id, species.id, synonym.id] {
        assert_eq!(store.history(Table::NodeHistory, id).unwrap().len(), 1);
    }
    assert_eq!(store.history(Table::EdgeHistory, parent.id).unwrap().len(), 1);

    let owners = lookup_synonyms(
        &store,
        "ncbi_taxonomy",
        &["511145".to_string()],
        &ChunkConfig::default(),
    )
    .unwrap();
    assert_eq!(owners["511145"].id, strain.id);
}

#[test]
fn test_parse_only_import_writes_nothing() {
    let dir = tempdir().unwrap();
    let importer = TaxonomyImporter::new(
        write(&dir, "nodes.dmp", NODES_DMP),
        write(&dir, "names.dmp", NAMES_DMP),
    );
    let store = GraphStore::open_in_memory().unwrap();
    let report = run_import(&store, &importer, &ImportOptions::default()).unwrap();
    assert!(!report.written);
    assert_eq!(report.node_candidates, 4);
    assert_eq!(report.edge_candidates, 3);
    assert_eq!(store.count(Table::Node).unwrap(), 0);
}

#[test]
fn test_limit_caps_records() {
    let dir = tempdir().unwrap();
    let importer = TaxonomyImporter::new(
        write(&dir, "nodes.dmp", NODES_DMP),
        write(&dir, "names.dmp", NAMES_DMP),
    );
    let store = GraphStore::open_in_memory().unwrap();
    let options = ImportOptions {
        limit: Some(1),
        ..writing()
    };
    let report = run_import(&store, &importer, &options).unwrap();
    assert_eq!(report.records, 1);
    assert_eq!(store.count(Table::Node).unwrap(), 2);
}

#[test]
fn test_missing_source_file_is_parse_error() {
    let store = GraphStore::open_in_memory().unwrap();
    let importer = ChebiImporter::new("/nonexistent/chebi.sdf");
    let err = run_import(&store, &importer, &writing()).unwrap_err();
    assert!(err.to_string().starts_with("parse error"));
}

#[test]
fn test_chebi_import_skips_records_without_id() {
    let dir = tempdir().unwrap();
    let sdf = write(&dir, "chebi.sdf", CHEBI_SDF);
    let store = GraphStore::open_in_memory().unwrap();
    let report = run_import(&store, &ChebiImporter::new(&sdf), &writing()).unwrap();
    assert_eq!(report.records, 2);
    assert_eq!(report.skipped, 1);
    assert_eq!(store.count(Table::Node).unwrap(), 4);

    let owners = lookup_synonyms(
        &store,
        "chebi",
        &["15377".to_string(), "16236".to_string()],
        &ChunkConfig::default(),
    )
    .unwrap();
    let water = store.node_by_hash(&owners["15377"].hash).unwrap().unwrap();
    assert_eq!(water.data["name"], "water");
    assert_eq!(water.hash, HashScheme::CURRENT.chemical("XLYOFNOQVPJJNP-UHFFFAOYSA-N"));
}

#[test]
fn test_reaction_and_its_reverse_load_as_one_entity() {
    let dir = tempdir().unwrap();
    let sdf = write(&dir, "chebi.sdf", CHEBI_SDF);
    let reactions = write(&dir, "rhea.jsonl", REACTIONS);
    let store = GraphStore::open_in_memory().unwrap();
    load_chebi(&store, &sdf);

    let report = run_import(&store, &RheaImporter::new(&reactions), &writing()).unwrap();
    assert_eq!(report.records, 2);
    assert_eq!(report.skipped, 1);

    let owners = lookup_synonyms(
        &store,
        "rhea",
        &["100".to_string(), "101".to_string()],
        &ChunkConfig::default(),
    )
    .unwrap();
    assert_eq!(owners["100"].id, owners["101"].id);

    let chemicals = lookup_synonyms(
        &store,
        "chebi",
        &["15377".to_string(), "16236".to_string()],
        &ChunkConfig::default(),
    )
    .unwrap();
    let expected = reaction_hash_fn(&[
        Stoichiometry::new(chemicals["15377"].hash.clone(), -1.0),
        Stoichiometry::new(chemicals["16236"].hash.clone(), 1.0),
    ]);
    assert_eq!(owners["100"].hash, expected);

    let reaction = store.node_by_hash(&expected).unwrap().unwrap();
    assert_eq!(reaction.node_type_id, "reaction");
    let participant = store
        .edge_by_hash(&edge_hash_fn(
            &expected,
            &chemicals["16236"].hash,
            "has_reaction_participant",
        ))
        .unwrap()
        .unwrap();
    assert_eq!(participant.data.unwrap()["coefficient"], 1.0);

    let rerun = run_import(&store, &RheaImporter::new(&reactions), &writing()).unwrap();
    assert_eq!(rerun.nodes.map(|n| n.inserted), Some(0));
}

#[test]
fn test_reaction_limit_counts_accepted_reactions() {
    let dir = tempdir().unwrap();
    let sdf = write(&dir, "chebi.sdf", CHEBI_SDF);
    let unresolved_first: String = REACTIONS.lines().rev().collect::<Vec<_>>().join("\n");
    let reactions = write(&dir, "rhea.jsonl", &unresolved_first);
    let store = GraphStore::open_in_memory().unwrap();
    load_chebi(&store, &sdf);

    let options = ImportOptions {
        limit: Some(1),
        ..writing()
    };
    let report = run_import(&store, &RheaImporter::new(&reactions), &options).unwrap();
    assert_eq!(report.records, 1);
    assert_eq!(report.skipped, 1);
    // the reaction node and one rhea synonym
    assert_eq!(report.nodes.map(|n| n.inserted), Some(2));
}

#[test]
fn test_ontology_links_known_chemicals() {
    let dir = tempdir().unwrap();
    let sdf = write(&dir, "chebi.sdf", CHEBI_SDF);
    let obo = write(&dir, "chebi.obo", ONTOLOGY);
    let store = GraphStore::open_in_memory().unwrap();
    load_chebi(&store, &sdf);
    let edges_before = store.count(Table::Edge).unwrap();

    let report = run_import(&store, &OntologyImporter::new(&obo), &writing()).unwrap();
    assert_eq!(report.records, 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.edge_history_rows, 1);
    assert_eq!(store.count(Table::Edge).unwrap(), edges_before + 1);

    let water = HashScheme::CURRENT.chemical("XLYOFNOQVPJJNP-UHFFFAOYSA-N");
    let ethanol = HashScheme::CURRENT.chemical("LFQSCWFLJHTTHZ-UHFFFAOYSA-N");
    assert!(
        store
            .edge_by_hash(&edge_hash_fn(&ethanol, &water, "is_a"))
            .unwrap()
            .is_some()
    );
}
