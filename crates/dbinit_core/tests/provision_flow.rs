use dbinit_core::schema::profiles::{PROBLEMS, USERS};
use dbinit_core::{
    CollectionState, Connector, Direction, IndexField, IndexSpec, IndexState, MemoryConnector,
    Operation, Profile, ProvisionError, Provisioner, Reachability, RetryPolicy, SchemaStore,
    StoreError,
};
use std::collections::BTreeMap;
use std::time::Duration;

fn provisioner() -> Provisioner {
    Provisioner::new(RetryPolicy::new(5, Duration::ZERO))
}

fn index_names(snapshot: &BTreeMap<String, Vec<IndexSpec>>, collection: &str) -> Vec<&'static str> {
    snapshot[collection].iter().map(|index| index.name).collect()
}

#[test]
fn fresh_database_gets_every_declared_collection_and_index() {
    let connector = MemoryConnector::new();
    let schema = Profile::Annaforces.schema();

    let report = provisioner().run(&connector, &schema, &mut |_| {}).unwrap();

    assert_eq!(report.database, "annaforces_db");
    assert_eq!(report.created_collections(), vec!["users", "problems"]);
    let snapshot = connector.snapshot("annaforces_db");
    assert_eq!(snapshot.len(), 2);
    assert_eq!(
        index_names(&snapshot, "users"),
        vec!["_id_", "idx_username_unique", "idx_email_unique"]
    );
    assert_eq!(
        index_names(&snapshot, "problems"),
        vec!["_id_", "idx_difficulty", "idx_tags"]
    );
    assert!(snapshot["users"][1..].iter().all(|index| index.unique));
    assert!(snapshot["problems"][1..].iter().all(|index| !index.unique));
}

#[test]
fn judge_profile_provisions_submissions_into_data_database() {
    let connector = MemoryConnector::new();

    provisioner()
        .run(&connector, &Profile::Judge.schema(), &mut |_| {})
        .unwrap();

    let snapshot = connector.snapshot("data");
    assert_eq!(
        snapshot.keys().map(String::as_str).collect::<Vec<_>>(),
        vec!["problems", "submissions", "users"]
    );
    assert_eq!(
        index_names(&snapshot, "submissions"),
        vec![
            "_id_",
            "idx_username",
            "idx_problem_id",
            "idx_verdict",
            "idx_username_problem_id",
            "idx_username_verdict",
            "idx_problem_id_verdict",
        ]
    );
    let compound = snapshot["submissions"]
        .iter()
        .find(|index| index.name == "idx_username_problem_id")
        .unwrap();
    assert_eq!(
        compound.fields.iter().map(|field| field.name).collect::<Vec<_>>(),
        vec!["username", "problem_id"]
    );
    assert!(connector.snapshot("annaforces_db").is_empty());
}

#[test]
fn second_run_is_a_noop_with_identical_schema() {
    let connector = MemoryConnector::new();
    let schema = Profile::Judge.schema();

    provisioner().run(&connector, &schema, &mut |_| {}).unwrap();
    let after_first = connector.snapshot("data");
    let writes_after_first = connector.schema_writes();

    let mut lines = Vec::new();
    let second = provisioner()
        .run(&connector, &schema, &mut |p| lines.push(p.to_string()))
        .unwrap();

    assert_eq!(connector.snapshot("data"), after_first);
    assert_eq!(connector.schema_writes(), writes_after_first);
    assert!(second.is_noop());
    assert!(second
        .collections
        .iter()
        .all(|collection| collection.state == CollectionState::Existing
            && collection.indexes.iter().all(|index| index.state == IndexState::Existing)));
    assert!(lines.contains(&"Collection 'users' already exists.".to_string()));
}

#[test]
fn progress_lines_follow_the_run_in_order() {
    let connector = MemoryConnector::new();
    let mut lines = Vec::new();

    provisioner()
        .run(&connector, &Profile::Annaforces.schema(), &mut |p| {
            lines.push(p.to_string())
        })
        .unwrap();

    assert_eq!(
        lines,
        vec![
            "MongoDB connection successful.",
            "Collection 'users' created.",
            "Indexes created/ensured for 'users' collection.",
            "Collection 'problems' created.",
            "Indexes created/ensured for 'problems' collection.",
            "Database initialization complete!",
            "MongoDB connection closed.",
        ]
    );
}

#[test]
fn unreachable_database_exhausts_budget_without_writes() {
    let connector = MemoryConnector::with_reachability(Reachability::Unreachable);

    let err = provisioner()
        .run(&connector, &Profile::Annaforces.schema(), &mut |_| {})
        .unwrap_err();

    assert!(matches!(err, ProvisionError::ConnectionExhausted { attempts: 5 }));
    assert_eq!(connector.connect_attempts(), 5);
    assert_eq!(connector.schema_writes(), 0);
    assert!(connector.snapshot("annaforces_db").is_empty());
    // Every half-open attempt was released, none left behind.
    assert_eq!(connector.closes(), 5);
}

#[test]
fn transient_outage_is_retried_then_provisioned() {
    let connector = MemoryConnector::with_reachability(Reachability::UnreachableFor(3));

    let report = provisioner()
        .run(&connector, &Profile::Annaforces.schema(), &mut |_| {})
        .unwrap();

    assert_eq!(connector.connect_attempts(), 4);
    assert_eq!(report.created_collections().len(), 2);
    assert_eq!(connector.closes(), 4);
}

#[test]
fn successful_run_closes_the_connection_once() {
    let connector = MemoryConnector::new();

    provisioner()
        .run(&connector, &Profile::Annaforces.schema(), &mut |_| {})
        .unwrap();

    assert_eq!(connector.connect_attempts(), 1);
    assert_eq!(connector.closes(), 1);
}

#[test]
fn conflicting_index_definition_fails_and_still_closes() {
    const MAIL: IndexField = IndexField {
        name: "mail",
        direction: Direction::Ascending,
    };
    const STALE_EMAIL_INDEX: IndexSpec = IndexSpec {
        name: "idx_email_unique",
        fields: &[MAIL],
        unique: true,
    };
    let connector = MemoryConnector::new();
    connector.seed("annaforces_db", "users", &[STALE_EMAIL_INDEX]);
    let mut lines = Vec::new();

    let err = provisioner()
        .run(&connector, &Profile::Annaforces.schema(), &mut |p| {
            lines.push(p.to_string())
        })
        .unwrap_err();

    match err {
        ProvisionError::Index {
            collection,
            index,
            source: StoreError::IndexConflict { .. },
        } => {
            assert_eq!(collection, "users");
            assert_eq!(index, "idx_email_unique");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(connector.closes(), 1);
    assert!(lines
        .iter()
        .any(|line| line.starts_with("An error occurred during database initialization")));
    assert_eq!(lines.last().unwrap(), "MongoDB connection closed.");
    // Provisioning stopped at the conflict; later collections are untouched.
    assert!(!connector.snapshot("annaforces_db").contains_key("problems"));
}

#[test]
fn invalid_schema_is_rejected_before_connecting() {
    const BROKEN: &[dbinit_core::CollectionSpec] = &[USERS, USERS];
    let connector = MemoryConnector::new();

    let err = provisioner()
        .run(
            &connector,
            &dbinit_core::Schema::new("annaforces_db", BROKEN),
            &mut |_| {},
        )
        .unwrap_err();

    assert!(matches!(err, ProvisionError::Schema(_)));
    assert_eq!(connector.connect_attempts(), 0);
}

#[test]
fn preexisting_collection_is_kept_and_indexed() {
    let connector = MemoryConnector::new();
    connector
        .connect("annaforces_db")
        .unwrap()
        .create_collection("problems")
        .unwrap();

    let report = provisioner()
        .run(&connector, &Profile::Annaforces.schema(), &mut |_| {})
        .unwrap();

    let problems = report
        .collections
        .iter()
        .find(|collection| collection.name == PROBLEMS.name)
        .unwrap();
    assert_eq!(problems.state, CollectionState::Existing);
    assert!(problems
        .indexes
        .iter()
        .all(|index| index.state == IndexState::Created));
}

#[test]
fn rejected_ping_fails_at_once_without_retry_or_writes() {
    let connector = MemoryConnector::with_reachability(Reachability::Rejecting);

    let err = provisioner()
        .run(&connector, &Profile::Annaforces.schema(), &mut |_| {})
        .unwrap_err();

    assert!(matches!(err, ProvisionError::Connect(StoreError::Rejected(_))));
    assert_eq!(err.code(), "connect_failed");
    assert_eq!(connector.connect_attempts(), 1);
    assert_eq!(connector.closes(), 1);
    assert_eq!(connector.schema_writes(), 0);
}

#[test]
fn failing_collection_create_is_returned_and_closes_once() {
    let connector = MemoryConnector::new();
    connector.fail_on(Operation::CreateCollection);
    let mut lines = Vec::new();

    let err = provisioner()
        .run(&connector, &Profile::Annaforces.schema(), &mut |p| {
            lines.push(p.to_string())
        })
        .unwrap_err();

    match err {
        ProvisionError::Collection {
            collection,
            source: StoreError::Rejected(_),
        } => assert_eq!(collection, "users"),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(connector.closes(), 1);
    assert_eq!(connector.schema_writes(), 0);
    assert_eq!(lines.last().unwrap(), "MongoDB connection closed.");
}

#[test]
fn failing_index_listing_is_reported_as_index_work_and_closes_once() {
    let connector = MemoryConnector::new();
    connector.fail_on(Operation::IndexNames);

    let err = provisioner()
        .run(&connector, &Profile::Annaforces.schema(), &mut |_| {})
        .unwrap_err();

    match &err {
        ProvisionError::IndexList {
            collection,
            source: StoreError::Rejected(_),
        } => assert_eq!(collection, "users"),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(err.code(), "index_list_failed");
    assert_eq!(connector.closes(), 1);
    // The collection was created before index work began.
    assert!(connector.snapshot("annaforces_db").contains_key("users"));
}
